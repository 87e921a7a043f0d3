// Editor settings
// Loaded from <config dir>/xlsx-row-editor/settings.json

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::fields::FieldAliases;

/// Browser used to show the status page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserChoice {
    /// OS default handler
    #[default]
    Default,
    Chrome,
    Firefox,
    Edge,
}

impl BrowserChoice {
    pub fn next(self) -> Self {
        match self {
            BrowserChoice::Default => BrowserChoice::Chrome,
            BrowserChoice::Chrome => BrowserChoice::Firefox,
            BrowserChoice::Firefox => BrowserChoice::Edge,
            BrowserChoice::Edge => BrowserChoice::Default,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            BrowserChoice::Default => "system default",
            BrowserChoice::Chrome => "Chrome",
            BrowserChoice::Firefox => "Firefox",
            BrowserChoice::Edge => "Edge",
        }
    }

    /// Application name understood by the platform launcher.
    pub fn app_name(self) -> Option<&'static str> {
        let (windows, mac, other) = match self {
            BrowserChoice::Default => return None,
            BrowserChoice::Chrome => ("chrome", "Google Chrome", "google-chrome"),
            BrowserChoice::Firefox => ("firefox", "Firefox", "firefox"),
            BrowserChoice::Edge => ("msedge", "Microsoft Edge", "microsoft-edge"),
        };
        Some(if cfg!(windows) {
            windows
        } else if cfg!(target_os = "macos") {
            mac
        } else {
            other
        })
    }
}

/// Returns the status cell's neighbour text, or the not-found sentinel.
const DEFAULT_STATUS_SCRIPT: &str = r#"(function() {
    let cell = [...document.querySelectorAll('td')].find(td => td.innerText.includes('Design Status'));
    if (cell && cell.nextElementSibling) {
        return cell.nextElementSibling.innerText.trim();
    }
    return "Status Not Found";
})();"#;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub browser: BrowserChoice,

    // Status page
    pub status_url: Option<String>,
    /// argv of a program that loads the URL (last argument) and evaluates the
    /// script read from stdin, printing the result.
    pub probe_command: Vec<String>,
    pub status_script: String,
    pub poll_interval_secs: u64,
    pub script_timeout_secs: u64,

    /// Explicit spreadsheet application for "open externally"; OS default when unset.
    pub spreadsheet_app: Option<String>,

    // Dropdown presets
    pub config_options: Vec<String>,
    pub build_states: Vec<String>,

    pub aliases: FieldAliases,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            browser: BrowserChoice::Default,
            status_url: None,
            probe_command: Vec::new(),
            status_script: DEFAULT_STATUS_SCRIPT.to_string(),
            poll_interval_secs: 5,
            script_timeout_secs: 10,
            spreadsheet_app: None,
            config_options: ["1x1", "2x2", "4x4", "N/A"].map(String::from).to_vec(),
            build_states: [
                "In Design",
                "In Progress",
                "Does Not Exist",
                "PRO-I",
                "Design Approved",
            ]
            .map(String::from)
            .to_vec(),
            aliases: FieldAliases::default(),
        }
    }
}

impl Settings {
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("xlsx-row-editor")
            .join("settings.json")
    }

    /// Load settings, falling back to defaults. A missing file is created.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            let settings = Self::default();
            if let Err(e) = settings.save(path) {
                log::warn!("could not write default settings to {}: {e}", path.display());
            }
            return settings;
        }

        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(settings) => settings,
                Err(e) => {
                    log::warn!("error parsing {}: {e}; using defaults", path.display());
                    Self::default()
                }
            },
            Err(e) => {
                log::warn!("error reading {}: {e}; using defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn script_timeout(&self) -> Duration {
        Duration::from_secs(self.script_timeout_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let settings = Settings::load(&path);
        assert_eq!(settings, Settings::default());
        assert!(path.exists());
        assert_eq!(Settings::load(&path), settings);
    }

    #[test]
    fn partial_file_keeps_defaults_for_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{ "browser": "firefox", "aliases": { "buildState": ["STATE"] } }"#,
        )
        .unwrap();
        let settings = Settings::load(&path);
        assert_eq!(settings.browser, BrowserChoice::Firefox);
        assert_eq!(settings.aliases.build_state, vec!["STATE".to_string()]);
        assert_eq!(settings.aliases.pid, FieldAliases::default().pid);
        assert_eq!(settings.poll_interval(), Duration::from_secs(5));
    }

    #[test]
    fn invalid_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(Settings::load(&path), Settings::default());
    }

    #[test]
    fn browser_choice_round_trips_through_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut settings = Settings::default();
        settings.browser = settings.browser.next().next();
        settings.save(&path).unwrap();
        assert_eq!(Settings::load(&path).browser, BrowserChoice::Firefox);
    }

    #[test]
    fn browser_cycle_wraps() {
        let mut b = BrowserChoice::Default;
        for _ in 0..4 {
            b = b.next();
        }
        assert_eq!(b, BrowserChoice::Default);
        assert!(BrowserChoice::Default.app_name().is_none());
        assert!(BrowserChoice::Edge.app_name().is_some());
    }
}
