//! Persisted message and font size.
//!
//! Both values live in one small JSON file, `{"message": "...", "fontsize": 2}`.
//! They are read once at startup and written together after every accepted
//! submission.

use crate::glyph::FontSize;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Shown until the first message is submitted.
pub const DEFAULT_MESSAGE: &str = "Hello World!";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("settings file I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("settings file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    pub message: String,
    pub font_size: FontSize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            message: DEFAULT_MESSAGE.to_string(),
            font_size: FontSize::default(),
        }
    }
}

/// On-disk shape; every key is optional so a partial file still loads.
#[derive(Debug, Default, Deserialize, Serialize)]
struct StoredSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fontsize: Option<i64>,
}

/// JSON file holding [`Settings`].
#[derive(Clone, Debug)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored settings, filling anything missing or invalid with defaults.
    ///
    /// Never fails: an unreadable file is logged and treated as empty.
    pub fn load(&self) -> Settings {
        let stored = match self.read() {
            Ok(stored) => stored,
            Err(StorageError::Io(err)) if err.kind() == io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no saved settings, using defaults");
                StoredSettings::default()
            }
            Err(err) => {
                warn!(path = %self.path.display(), %err, "could not read saved settings, using defaults");
                StoredSettings::default()
            }
        };

        let mut settings = Settings::default();
        if let Some(message) = stored.message {
            info!("loaded saved message: {message}");
            settings.message = message;
        }
        if let Some(index) = stored.fontsize {
            match FontSize::from_index(index) {
                Some(size) => {
                    info!(font_size = index, "loaded saved font size");
                    settings.font_size = size;
                }
                None => warn!(font_size = index, "saved font size out of range, using default"),
            }
        }
        settings
    }

    fn read(&self) -> Result<StoredSettings, StorageError> {
        let contents = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Write both values at once.
    ///
    /// The file is written next to the target and renamed over it, so a reader never
    /// sees one value updated without the other.
    pub fn save(&self, settings: &Settings) -> Result<(), StorageError> {
        let stored = StoredSettings {
            message: Some(settings.message.clone()),
            fontsize: Some(i64::from(settings.font_size.index())),
        };
        let json = serde_json::to_string_pretty(&stored)?;

        let mut staging = self.path.clone().into_os_string();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);

        fs::write(&staging, json)?;
        fs::rename(&staging, &self.path)?;
        info!(path = %self.path.display(), "message and font size saved");
        Ok(())
    }
}
