use crate::encoding::EncodingId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Host preferences persisted in `Tidy Preferences.yaml`.
///
/// Option values are stored as a flat name → string map in config syntax,
/// so any key-value store can hold them. Keys stay lowercase snake case so
/// environment overrides can address them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub options: IndexMap<String, String>,

    /// Options forwarded to the engine; empty means all of them.
    pub options_in_use: Vec<String>,
    pub input_encoding: EncodingId,
    pub output_encoding: EncodingId,

    /// Sanity check the declared input encoding when loading bytes.
    pub check_input_encoding: bool,

    pub log: LogSettings,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            options: IndexMap::new(),
            options_in_use: Vec::new(),
            input_encoding: EncodingId::Utf8,
            output_encoding: EncodingId::Utf8,
            check_input_encoding: true,
            log: LogSettings::default(),
        }
    }
}

/// Where and how verbosely to log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub directory: String,
    pub file_prefix: String,
    pub debug_mode: bool,

    /// Also log to the console.
    pub console: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            directory: "logs".to_string(),
            file_prefix: "tidy-bridge".to_string(),
            debug_mode: false,
            console: false,
        }
    }
}
