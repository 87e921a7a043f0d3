use std::io::{Read, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};

use crate::scrape::ScriptHost;
use crate::settings::BrowserChoice;

/// Open the workbook in a spreadsheet application without waiting for it.
/// An explicit Excel binary gets its read-only switch.
pub fn open_workbook_externally(path: &Path, app: Option<&str>) -> Result<()> {
    match app {
        Some(app) => {
            let mut cmd = Command::new(app);
            if app.to_lowercase().contains("excel") {
                cmd.arg("/r");
            }
            cmd.arg(path)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()
                .with_context(|| format!("failed to start {app}"))?;
        }
        None => open::that_detached(path)
            .with_context(|| format!("no application to open {}", path.display()))?,
    }
    log::info!("opened {} externally", path.display());
    Ok(())
}

pub fn open_in_browser(url: &str, browser: BrowserChoice) -> Result<()> {
    match browser.app_name() {
        Some(app) => open::with_detached(url, app),
        None => open::that_detached(url),
    }
    .with_context(|| format!("failed to open {url} in {}", browser.label()))
}

/// How often a running probe program is checked for exit.
const WAIT_STEP: Duration = Duration::from_millis(20);

/// Script host backed by an external probe program: the program gets the page
/// URL as its last argument and the script on stdin, and prints the result.
/// A program still running after `timeout` is killed.
pub struct CommandHost {
    argv: Vec<String>,
    browser: BrowserChoice,
    timeout: Duration,
    url: Option<String>,
}

impl CommandHost {
    pub fn new(argv: Vec<String>, browser: BrowserChoice, timeout: Duration) -> Result<Self> {
        if argv.is_empty() {
            bail!("probe command is empty");
        }
        Ok(Self {
            argv,
            browser,
            timeout,
            url: None,
        })
    }
}

impl ScriptHost for CommandHost {
    fn load_url(&mut self, url: &str) -> Result<()> {
        self.url = Some(url.to_string());
        if let Err(e) = open_in_browser(url, self.browser) {
            log::warn!("{e:#}");
        }
        Ok(())
    }

    fn run_script(&mut self, script: &str) -> Result<String> {
        let url = self.url.as_deref().ok_or_else(|| anyhow!("no page loaded"))?;
        let program = &self.argv[0];
        let mut child = Command::new(program)
            .args(&self.argv[1..])
            .arg(url)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to start {program}"))?;
        if let Some(mut stdin) = child.stdin.take()
            && let Err(e) = stdin.write_all(script.as_bytes())
        {
            log::debug!("{program} did not take the script: {e}");
        }

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("{program} has no stdout"))?;
        let reader = std::thread::spawn(move || {
            let mut out = String::new();
            stdout.read_to_string(&mut out).map(|_| out)
        });

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                if let Err(e) = child.kill() {
                    log::warn!("failed to kill {program}: {e}");
                }
                let _ = child.wait();
                bail!("{program} gave no answer within {:?}", self.timeout);
            }
            std::thread::sleep(WAIT_STEP);
        };
        if !status.success() {
            bail!("{program} exited with {status}");
        }
        let stdout = reader
            .join()
            .map_err(|_| anyhow!("reading {program} output panicked"))??;
        Ok(stdout
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .unwrap_or_default()
            .to_string())
    }
}
