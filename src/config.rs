//! Configuration management for the linemark server

use std::path::PathBuf;

use serde::Deserialize;

use crate::tracker::DEFAULT_DEBOUNCE;

/// Default bookmark file name, looked up from the working directory upward.
const DEFAULT_FILE_NAME: &str = ".bookmarks";

/// Server configuration.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Bookmark file configuration
    pub file: FileConfig,
    /// Change-tracker configuration
    pub tracker: TrackerConfig,
    /// Workspace configuration
    pub workspace: WorkspaceConfig,
}

/// Bookmark file configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// File name of the bookmark file
    pub name: String,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_FILE_NAME.to_string(),
        }
    }
}

/// Change-tracker configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Debounce delay in milliseconds
    pub debounce_ms: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE.as_millis() as u64,
        }
    }
}

/// Workspace configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Explicit workspace root; discovered from the working directory when
    /// absent
    pub root: Option<PathBuf>,
}

impl Config {
    /// Parse configuration from initialization options
    pub fn from_init_options(options: Option<serde_json::Value>) -> Self {
        match options {
            Some(value) => serde_json::from_value(value).unwrap_or_default(),
            None => Self::default(),
        }
    }
}
