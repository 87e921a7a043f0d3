use std::path::PathBuf;
use std::time::Instant;

use crate::error::EditorError;
use crate::fields::{Group, SLOTS};
use crate::launch;
use crate::scrape::{BridgeResponse, DESIGN_APPROVED, DesignStatus, StatusBridge, StatusPoller, parse_status};
use crate::session::EditSession;
use crate::settings::Settings;

/// One input of the form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldId {
    Slot(Group, usize),
    Config,
    BuildState,
}

impl FieldId {
    /// Focus order: the four group rows slot by slot, then the two dropdowns.
    pub fn all() -> Vec<FieldId> {
        let mut ids: Vec<FieldId> = Group::ALL
            .iter()
            .flat_map(|g| (0..SLOTS).map(move |i| FieldId::Slot(*g, i)))
            .collect();
        ids.push(FieldId::Config);
        ids.push(FieldId::BuildState);
        ids
    }

    pub fn label(self) -> String {
        match self {
            FieldId::Slot(g, i) => format!("{} {}", g.label(), i + 1),
            FieldId::Config => "Config".into(),
            FieldId::BuildState => "Build State".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    GoToRow,
    OpenFile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    Normal,
    Editing(FieldId),
    Prompt(PromptKind),
}

/// Single-line text input with a byte cursor kept on char boundaries.
#[derive(Debug, Clone, Default)]
pub struct LineInput {
    pub buffer: String,
    pub cursor: usize,
}

impl LineInput {
    pub fn with_text(text: &str) -> Self {
        Self {
            buffer: text.to_string(),
            cursor: text.len(),
        }
    }

    pub fn insert(&mut self, ch: char) {
        self.buffer.insert(self.cursor, ch);
        self.cursor += ch.len_utf8();
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            let prev = prev_boundary(&self.buffer, self.cursor);
            self.buffer.drain(prev..self.cursor);
            self.cursor = prev;
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.buffer.len() {
            let next = next_boundary(&self.buffer, self.cursor);
            self.buffer.drain(self.cursor..next);
        }
    }

    pub fn left(&mut self) {
        self.cursor = prev_boundary(&self.buffer, self.cursor);
    }

    pub fn right(&mut self) {
        self.cursor = next_boundary(&self.buffer, self.cursor);
    }

    pub fn home(&mut self) {
        self.cursor = 0;
    }

    pub fn end(&mut self) {
        self.cursor = self.buffer.len();
    }
}

fn prev_boundary(s: &str, idx: usize) -> usize {
    s[..idx].char_indices().next_back().map_or(0, |(i, _)| i)
}

fn next_boundary(s: &str, idx: usize) -> usize {
    s[idx..].chars().next().map_or(idx, |c| idx + c.len_utf8())
}

/// Modal message; the UI keeps it on screen until a key is pressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub body: String,
}

pub struct App {
    pub should_quit: bool,

    // UI state
    pub mode: AppMode,
    pub status: String,
    pub focus: usize,
    pub input: LineInput,
    pub notice: Option<Notice>,
    pub show_help: bool,

    pub session: EditSession,
    pub sheet: Option<String>,
    pub settings: Settings,
    settings_path: PathBuf,

    // Status page
    pub design_status: Option<DesignStatus>,
    pub poller: StatusPoller,
    bridge: Option<StatusBridge>,
    page_loaded: bool,
}

impl App {
    pub fn new(
        settings: Settings,
        settings_path: PathBuf,
        sheet: Option<String>,
        bridge: Option<StatusBridge>,
    ) -> Self {
        let poller = StatusPoller::new(settings.poll_interval(), settings.script_timeout());
        Self {
            should_quit: false,
            mode: AppMode::Normal,
            status: "No file loaded. Press o to open a workbook, ? for help.".into(),
            focus: 0,
            input: LineInput::default(),
            notice: None,
            show_help: false,
            session: EditSession::new(settings.aliases.clone()),
            sheet,
            settings,
            settings_path,
            design_status: None,
            poller,
            bridge,
            page_loaded: false,
        }
    }

    pub fn focused(&self) -> FieldId {
        let ids = FieldId::all();
        ids[self.focus.min(ids.len() - 1)]
    }

    pub fn field_value(&self, id: FieldId) -> &str {
        let fields = &self.session.fields;
        match id {
            FieldId::Slot(g, i) => &fields.slots(g)[i],
            FieldId::Config => &fields.config,
            FieldId::BuildState => &fields.build_state,
        }
    }

    fn field_value_mut(&mut self, id: FieldId) -> &mut String {
        let fields = &mut self.session.fields;
        match id {
            FieldId::Slot(g, i) => &mut fields.slots_mut(g)[i],
            FieldId::Config => &mut fields.config,
            FieldId::BuildState => &mut fields.build_state,
        }
    }

    fn report(&mut self, title: &str, err: impl std::fmt::Display) {
        log::warn!("{title}: {err}");
        self.status = format!("{title}: {err}");
        self.notice = Some(Notice {
            title: title.to_string(),
            body: err.to_string(),
        });
    }

    fn info(&mut self, title: &str, body: impl Into<String>) {
        let body = body.into();
        self.status = body.clone();
        self.notice = Some(Notice {
            title: title.to_string(),
            body,
        });
    }

    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }

    pub fn toggle_help(&mut self) {
        self.show_help = !self.show_help;
    }

    // ===== File and row navigation =====

    pub fn load_file(&mut self, path: PathBuf) {
        match self.session.load(&path, self.sheet.clone()) {
            Ok(()) => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| path.display().to_string());
                self.status = format!("File loaded: {name}");
                self.focus = 0;
            }
            Err(e) => self.report("Failed to load file", e),
        }
    }

    pub fn save_next(&mut self) {
        match self.session.next() {
            Ok(adv) => {
                let saved = adv
                    .saved
                    .map(|r| format!("Saved ({} cells). ", r.written))
                    .unwrap_or_default();
                self.status = if !adv.moved {
                    format!("{saved}Row {} is a new row; fill it in to append", adv.row)
                } else if self.session.is_new_row() {
                    format!("{saved}Row {}: new row", adv.row)
                } else {
                    format!("{saved}Row {}", adv.row)
                };
            }
            Err(e) => self.report("Failed to save and move to next row", e),
        }
    }

    pub fn back(&mut self) {
        match self.session.previous() {
            Ok(row) => self.status = format!("Row {row}"),
            Err(EditorError::AtFirstRow) => self.info("Info", "Already at the first row."),
            Err(e) => self.report("Failed to load previous row", e),
        }
    }

    pub fn save(&mut self) {
        match self.session.save() {
            Ok(report) => {
                let row = self.session.cursor().unwrap_or_default();
                self.status = format!("Saved row {row} ({} cells changed)", report.written);
            }
            Err(e) => self.report("Failed to save row data", e),
        }
    }

    pub fn reload(&mut self) {
        match self.session.reload() {
            Ok(()) => self.status = "Row reloaded from disk".into(),
            Err(e) => self.report("Failed to reload row", e),
        }
    }

    pub fn open_externally(&mut self) {
        let Some(path) = self.session.path().map(|p| p.to_path_buf()) else {
            self.report("Warning", EditorError::NoFileLoaded);
            return;
        };
        match launch::open_workbook_externally(&path, self.settings.spreadsheet_app.as_deref()) {
            Ok(()) => self.status = format!("Opened {} externally", path.display()),
            Err(e) => self.report("Failed to open file", format!("{e:#}")),
        }
    }

    // ===== Prompts =====

    pub fn begin_prompt(&mut self, kind: PromptKind) {
        if kind == PromptKind::GoToRow && self.session.cursor().is_none() {
            self.report("Warning", EditorError::NoFileLoaded);
            return;
        }
        self.input = LineInput::default();
        self.mode = AppMode::Prompt(kind);
        self.status = match kind {
            PromptKind::GoToRow => "Go to row: type a number, Enter to go, Esc to cancel".into(),
            PromptKind::OpenFile => "Open workbook: type a path, Enter to load, Esc to cancel".into(),
        };
    }

    pub fn submit_prompt(&mut self) {
        let AppMode::Prompt(kind) = self.mode else {
            return;
        };
        self.mode = AppMode::Normal;
        let text = std::mem::take(&mut self.input).buffer;
        if text.trim().is_empty() {
            self.status = "Cancelled".into();
            return;
        }
        match kind {
            PromptKind::GoToRow => match self.session.go_to_input(&text) {
                Ok(row) => self.status = format!("Row {row}"),
                Err(e @ EditorError::InvalidInput(_)) => {
                    self.report("Please enter a valid row number", e)
                }
                Err(e) => self.report("Failed to load specified row", e),
            },
            PromptKind::OpenFile => self.load_file(PathBuf::from(text.trim())),
        }
    }

    pub fn cancel_prompt(&mut self) {
        self.mode = AppMode::Normal;
        self.input = LineInput::default();
        self.status = "Cancelled".into();
    }

    // ===== Form focus and editing =====

    pub fn focus_next(&mut self) {
        self.focus = (self.focus + 1) % FieldId::all().len();
    }

    pub fn focus_prev(&mut self) {
        let n = FieldId::all().len();
        self.focus = (self.focus + n - 1) % n;
    }

    /// Move between form rows: four group rows, then the dropdown row.
    pub fn focus_down(&mut self) {
        self.focus = match self.focused() {
            FieldId::Slot(Group::Vendor, i) => SLOTS * 4 + i.min(1),
            FieldId::Slot(_, _) => self.focus + SLOTS,
            FieldId::Config => 0,
            FieldId::BuildState => 1,
        };
    }

    pub fn focus_up(&mut self) {
        self.focus = match self.focused() {
            FieldId::Slot(Group::Pid, i) => SLOTS * 4 + i.min(1),
            FieldId::Slot(_, _) => self.focus - SLOTS,
            FieldId::Config => SLOTS * 3,
            FieldId::BuildState => SLOTS * 3 + 1,
        };
    }

    pub fn begin_edit(&mut self) {
        if self.session.cursor().is_none() {
            self.report("Warning", EditorError::NoFileLoaded);
            return;
        }
        let field = self.focused();
        if field == FieldId::Config {
            self.status = "Config is a dropdown: use ←/→ to choose".into();
            return;
        }
        self.input = LineInput::with_text(self.field_value(field));
        self.mode = AppMode::Editing(field);
        self.status = format!("Editing {}: Enter to keep, Esc to cancel", field.label());
    }

    pub fn submit_edit(&mut self) {
        let AppMode::Editing(field) = self.mode else {
            return;
        };
        self.mode = AppMode::Normal;
        let text = std::mem::take(&mut self.input).buffer;
        *self.field_value_mut(field) = text;
        self.status = format!("{} updated (not saved yet)", field.label());
    }

    pub fn cancel_edit(&mut self) {
        self.mode = AppMode::Normal;
        self.input = LineInput::default();
        self.status = "Edit cancelled".into();
    }

    /// Step the focused dropdown through its presets.
    pub fn cycle_choice(&mut self, forward: bool) {
        if self.session.cursor().is_none() {
            return;
        }
        let field = self.focused();
        let options = match field {
            FieldId::Config => self.settings.config_options.clone(),
            FieldId::BuildState => self.settings.build_states.clone(),
            FieldId::Slot(..) => return,
        };
        if options.is_empty() {
            return;
        }
        let current = self.field_value(field);
        let next = match options.iter().position(|o| o == current) {
            Some(i) if forward => (i + 1) % options.len(),
            Some(i) => (i + options.len() - 1) % options.len(),
            None => 0,
        };
        *self.field_value_mut(field) = options[next].clone();
    }

    // ===== Status page =====

    pub fn pull_status(&mut self) {
        if self.ensure_page()
            && let Some(bridge) = &mut self.bridge
        {
            self.status = if bridge.send_probe() {
                "Pulling design status...".into()
            } else {
                "Status host is still busy with the previous pull".into()
            };
        }
    }

    pub fn toggle_polling(&mut self) {
        if self.poller.is_active() {
            self.poller.cancel();
            self.status = "Status polling stopped".into();
        } else if self.ensure_page() {
            self.poller.start();
            self.status = format!(
                "Polling design status every {}s",
                self.settings.poll_interval().as_secs()
            );
        }
    }

    fn ensure_page(&mut self) -> bool {
        let Some(bridge) = &self.bridge else {
            self.info("Status page", "No probe command configured in settings.");
            return false;
        };
        if !self.page_loaded {
            let Some(url) = self.settings.status_url.clone() else {
                self.info("Status page", "No status URL configured in settings.");
                return false;
            };
            bridge.load_url(&url);
            self.page_loaded = true;
        }
        true
    }

    /// Fire the poll timer if due.
    pub fn on_tick(&mut self, now: Instant) {
        if self.poller.fire_if_due(now)
            && let Some(bridge) = &mut self.bridge
        {
            bridge.send_probe();
        }
    }

    /// Drain any finished bridge work. Returns true if something changed.
    pub fn drain_bridge(&mut self) -> bool {
        let mut changed = false;
        loop {
            let Some(resp) = self.bridge.as_ref().and_then(StatusBridge::try_recv) else {
                break;
            };
            changed = true;
            match resp {
                BridgeResponse::Loaded => self.status = "Status page loaded".into(),
                BridgeResponse::Status(raw) => self.apply_status(parse_status(&raw)),
                BridgeResponse::Error(e) => {
                    log::warn!("status probe failed: {e}");
                    self.apply_status(DesignStatus::NotFound);
                }
            }
        }
        changed
    }

    pub fn apply_status(&mut self, status: DesignStatus) {
        let stopped = self.poller.observe(&status);
        let mut message = match &status {
            DesignStatus::Approved => {
                self.set_design_approved();
                "Status updated: Design Approved detected and set".into()
            }
            DesignStatus::Identified { .. } if status.matches(&self.session.fields) => {
                format!("Design status: {status} (matches current row)")
            }
            DesignStatus::Identified { .. } => {
                format!("Design status: {status} (does NOT match current row)")
            }
            other => format!("Design status: {other}"),
        };
        if stopped {
            message.push_str("; polling stopped");
        }
        self.status = message;
        self.design_status = Some(status);
    }

    fn set_design_approved(&mut self) {
        if !self.settings.build_states.iter().any(|s| s == DESIGN_APPROVED) {
            self.settings.build_states.push(DESIGN_APPROVED.to_string());
        }
        if self.session.cursor().is_some() {
            self.session.fields.build_state = DESIGN_APPROVED.to_string();
        }
    }

    pub fn cycle_browser(&mut self) {
        self.settings.browser = self.settings.browser.next();
        match self.settings.save(&self.settings_path) {
            Ok(()) => {
                self.status = format!("Preferred browser: {}", self.settings.browser.label())
            }
            Err(e) => self.report("Failed to save settings", format!("{e:#}")),
        }
    }
}
