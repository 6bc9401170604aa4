//! User settings persistence.
//!
//! Preferences that outlive a process: which detection mode to use when a
//! request does not name one, and how listings and screenshots are shaped.

use crate::element::DEFAULT_MAX_LISTED;
use crate::error::Result;
use crate::mode::DetectionMode;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// User-configurable settings persisted between sessions.
///
/// Settings are stored as JSON in the user's config directory
/// (e.g., `~/.config/ui-target/settings.json` on Linux).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Detection mode for requests that do not specify one.
    #[serde(default)]
    pub default_mode: DetectionMode,
    /// Elements listed in the formatted summary before "... and N more".
    #[serde(default = "default_max_listed")]
    pub max_listed_elements: usize,
    /// Annotate screenshots unless told otherwise.
    #[serde(default)]
    pub annotate_by_default: bool,
}

fn default_max_listed() -> usize {
    DEFAULT_MAX_LISTED
}

impl Settings {
    /// Returns the path to the settings file.
    ///
    /// Creates the config directory if it doesn't exist.
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "ui-target").map(|dirs| {
            let config_dir = dirs.config_dir();
            if !config_dir.exists() {
                let _ = fs::create_dir_all(config_dir);
            }
            config_dir.join("settings.json")
        })
    }

    /// Loads settings from disk, falling back to defaults if not found.
    pub fn load() -> Self {
        Self::config_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
    }

    /// Loads settings from `path`; unreadable or invalid files give defaults.
    pub fn load_from(path: &Path) -> Self {
        fs::read_to_string(path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default()
    }

    /// Persists settings to disk.
    ///
    /// # Errors
    /// Returns an error if serialization or file writing fails.
    pub fn save(&self) -> Result<()> {
        if let Some(path) = Self::config_path() {
            self.save_to(&path)?;
        }
        Ok(())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_mode: DetectionMode::Tree,
            max_listed_elements: DEFAULT_MAX_LISTED,
            annotate_by_default: false,
        }
    }
}
