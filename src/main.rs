use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{backend::CrosstermBackend, prelude::*};

mod app;
mod error;
mod fields;
mod launch;
mod scrape;
mod session;
mod settings;
mod ui;
mod workbook;

use app::{App, AppMode, PromptKind};
use launch::CommandHost;
use scrape::StatusBridge;
use settings::Settings;

#[derive(Parser, Debug)]
#[command(author, version, about = "Spreadsheet row form editor")]
struct Args {
    /// Workbook (.xlsx) to open at startup
    #[arg(value_name = "XLSX_PATH")]
    path: Option<PathBuf>,

    /// Worksheet to edit (defaults to the first sheet)
    #[arg(short, long)]
    sheet: Option<String>,

    /// Settings file
    #[arg(long, value_name = "PATH")]
    settings: Option<PathBuf>,

    /// Log file (RUST_LOG controls the level)
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Start status polling as soon as a probe is configured
    #[arg(long)]
    poll: bool,

    /// Probe the status page once, print the result and exit
    #[arg(long)]
    status_once: bool,
}

/// Logs go to a file so they stay off the alternate screen. Runs before the
/// terminal is taken over, so failures can still be printed.
fn init_logging(path: &Path) {
    if let Some(parent) = path.parent()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        eprintln!("logging disabled: cannot create {}: {e}", parent.display());
        return;
    }
    let file = match File::create(path) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("logging disabled: cannot create {}: {e}", path.display());
            return;
        }
    };
    if let Err(e) = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(file)))
        .try_init()
    {
        eprintln!("logging disabled: {e}");
    }
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

fn restore_terminal(mut terminal: Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

fn start_bridge(settings: &Settings) -> Option<StatusBridge> {
    if settings.probe_command.is_empty() {
        return None;
    }
    match CommandHost::new(
        settings.probe_command.clone(),
        settings.browser,
        settings.script_timeout(),
    ) {
        Ok(host) => Some(StatusBridge::spawn(host, settings.status_script.clone())),
        Err(e) => {
            log::warn!("status probe disabled: {e:#}");
            None
        }
    }
}

fn status_once(settings: &Settings, bridge: Option<StatusBridge>) -> Result<()> {
    let Some(mut bridge) = bridge else {
        anyhow::bail!("no probe command configured");
    };
    let Some(url) = settings.status_url.as_deref() else {
        anyhow::bail!("no status URL configured");
    };
    bridge.load_url(url);
    println!("{}", bridge.request_status(settings.script_timeout()));
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let settings_path = args.settings.clone().unwrap_or_else(Settings::default_path);
    let log_path = args
        .log_file
        .clone()
        .unwrap_or_else(|| settings_path.with_file_name("editor.log"));
    init_logging(&log_path);

    let settings = Settings::load(&settings_path);
    let bridge = start_bridge(&settings);

    if args.status_once {
        return status_once(&settings, bridge);
    }

    let mut app = App::new(settings, settings_path, args.sheet.clone(), bridge);
    if let Some(path) = args.path.clone() {
        app.load_file(path);
    }
    if args.poll {
        app.toggle_polling();
    }

    let mut terminal = setup_terminal()?;

    let mut last_tick = Instant::now();
    let tick_rate = Duration::from_millis(100);

    let res = run_app(&mut terminal, &mut app, tick_rate, &mut last_tick);

    restore_terminal(terminal)?;
    if let Err(e) = res {
        eprintln!("Error: {e:?}");
    }
    Ok(())
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    tick_rate: Duration,
    last_tick: &mut Instant,
) -> Result<()> {
    // Redraw only when state changes or on tick
    let mut dirty = true;
    loop {
        // Process any status probe answers without blocking
        if app.drain_bridge() {
            dirty = true;
        }

        let tick_due = last_tick.elapsed() >= tick_rate;
        if tick_due {
            app.on_tick(Instant::now());
        }
        if dirty || tick_due {
            terminal.draw(|f| ui::draw(f, app))?;
            dirty = false;
            if tick_due {
                *last_tick = Instant::now();
            }
        }

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::from_secs(0));

        if event::poll(timeout)?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            dirty = true;
            if app.notice.is_some() {
                app.dismiss_notice();
                continue;
            }
            match app.mode {
                AppMode::Normal => handle_key_normal(app, key.code),
                AppMode::Editing(_) => handle_key_editing(app, key),
                AppMode::Prompt(_) => handle_key_prompt(app, key),
            }
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

fn handle_key_normal(app: &mut App, code: KeyCode) {
    if app.show_help && code != KeyCode::Char('q') {
        app.toggle_help();
        return;
    }
    match code {
        KeyCode::Char('q') => {
            app.should_quit = true;
        }
        KeyCode::Char('?') => app.toggle_help(),
        KeyCode::Tab => app.focus_next(),
        KeyCode::BackTab => app.focus_prev(),
        KeyCode::Up | KeyCode::Char('k') => app.focus_up(),
        KeyCode::Down | KeyCode::Char('j') => app.focus_down(),
        KeyCode::Left => {
            if is_dropdown(app) {
                app.cycle_choice(false)
            } else {
                app.focus_prev()
            }
        }
        KeyCode::Right => {
            if is_dropdown(app) {
                app.cycle_choice(true)
            } else {
                app.focus_next()
            }
        }
        KeyCode::Enter | KeyCode::Char('e') => app.begin_edit(),
        KeyCode::Char('n') => app.save_next(),
        KeyCode::Char('b') => app.back(),
        KeyCode::Char('w') => app.save(),
        KeyCode::Char('r') => app.reload(),
        KeyCode::Char('g') => app.begin_prompt(PromptKind::GoToRow),
        KeyCode::Char('o') => app.begin_prompt(PromptKind::OpenFile),
        KeyCode::Char('x') => app.open_externally(),
        KeyCode::Char('p') => app.pull_status(),
        KeyCode::Char('P') => app.toggle_polling(),
        KeyCode::Char('B') => app.cycle_browser(),
        _ => {}
    }
}

fn is_dropdown(app: &App) -> bool {
    matches!(app.focused(), app::FieldId::Config | app::FieldId::BuildState)
}

fn handle_key_editing(app: &mut App, key: crossterm::event::KeyEvent) {
    match key.code {
        KeyCode::Enter => app.submit_edit(),
        KeyCode::Esc => app.cancel_edit(),
        _ => handle_line_input(app, key),
    }
}

fn handle_key_prompt(app: &mut App, key: crossterm::event::KeyEvent) {
    match key.code {
        KeyCode::Enter => app.submit_prompt(),
        KeyCode::Esc => app.cancel_prompt(),
        _ => handle_line_input(app, key),
    }
}

fn handle_line_input(app: &mut App, key: crossterm::event::KeyEvent) {
    let input = &mut app.input;
    match key.code {
        KeyCode::Backspace => input.backspace(),
        KeyCode::Delete => input.delete(),
        KeyCode::Left => input.left(),
        KeyCode::Right => input.right(),
        KeyCode::Home => input.home(),
        KeyCode::End => input.end(),
        // ignore control chars in insert
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => input.insert(c),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_logging_survives_unwritable_path() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        // parent is a regular file, so the directory cannot be created
        init_logging(&blocker.join("sub").join("editor.log"));
        assert!(!blocker.join("sub").exists());
    }
}
