//! User settings persistence.
//!
//! Preferences that outlive a single run: which service to talk to, where
//! downloaded results go, and whether to open them afterwards.

use crate::error::Result;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// User-configurable settings persisted between sessions.
///
/// Settings are stored as JSON in the user's config directory
/// (e.g., `~/.config/storyface/settings.json` on Linux).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Service base address; the environment takes precedence.
    #[serde(default)]
    pub service_url: Option<String>,
    /// Directory downloaded results are written to.
    #[serde(default)]
    pub download_dir: Option<PathBuf>,
    /// Open the result in the system viewer once it is ready.
    #[serde(default)]
    pub open_after_download: bool,
}

impl Settings {
    /// Returns the path to the settings file.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "storyface", "storyface")
            .map(|dirs| dirs.config_dir().join("settings.json"))
    }

    /// Loads settings from disk, falling back to defaults if not found
    /// or unreadable.
    pub fn load() -> Self {
        Self::config_path()
            .and_then(|path| fs::read_to_string(&path).ok())
            .and_then(|content| Self::from_json(&content))
            .unwrap_or_default()
    }

    fn from_json(content: &str) -> Option<Self> {
        serde_json::from_str(content).ok()
    }

    /// Persists settings to disk, creating the config directory if needed.
    ///
    /// # Errors
    /// Returns an error if serialization or file writing fails.
    pub fn save(&self) -> Result<()> {
        if let Some(path) = Self::config_path() {
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir)?;
            }
            let json = serde_json::to_string_pretty(self)?;
            fs::write(path, json)?;
        }
        Ok(())
    }
}
