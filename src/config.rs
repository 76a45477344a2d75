use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Tunables for a debug session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Options {
    /// Radius used by `list` when no argument is given.
    pub list_radius: usize,
    /// Radius used by `where`.
    pub where_radius: usize,
    pub prompt: String,
    /// Pause on the first executed line. When off, the target runs until a breakpoint.
    pub stop_on_entry: bool,
    /// Echo commands taken from the pending queue after the prompt.
    pub echo_queued: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            list_radius: 5,
            where_radius: 2,
            prompt: "(ldb) ".to_string(),
            stop_on_entry: true,
            echo_queued: true,
        }
    }
}

impl Options {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        Self::from_json(&text)
    }
}
