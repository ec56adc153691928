//! The seam to the external tidy engine.
//!
//! The engine owns the actual normalization algorithm and its option table;
//! this crate only describes what it needs from it. Hosts implement
//! [`TidyEngine`] over their binding of the engine library. Calls are treated
//! as synchronous, blocking and single-shot: nothing is carried between calls
//! except the full option values re-supplied on every run.

use crate::models::{OptionCategory, OptionValue, Severity};

/// Value domain of an option as the engine declares it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOptionKind {
    Boolean,
    Integer { min: i64, max: i64 },
    PickList(Vec<String>),
    String,
    Encoding,
}

/// One row of the engine's option table. Defaults are in config syntax.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptionSpec {
    pub name: String,
    pub category: OptionCategory,
    pub kind: EngineOptionKind,
    pub default: String,
    pub read_only: bool,
    pub description: String,
}

/// A diagnostic as emitted by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineDiagnostic {
    pub severity: Severity,
    pub line: u32,
    pub column: u32,
    pub text: String,
}

/// What the engine detected about the document it processed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DocumentProfile {
    /// 0 when unknown, otherwise 2, 3, 4 or 5.
    pub html_version: u8,
    pub is_xhtml: bool,
    pub is_generic_xml: bool,
}

/// Everything one normalization call produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineReport {
    /// 0 clean, 1 warnings, 2 errors; negative values are fatal.
    pub status: i32,
    pub output: String,
    pub diagnostics: Vec<EngineDiagnostic>,
    pub profile: DocumentProfile,
}

impl EngineReport {
    /// A fatal status means `output` and `diagnostics` must not be used.
    pub fn is_fatal(&self) -> bool {
        self.status < 0
    }
}

/// The external normalization engine.
#[cfg_attr(test, mockall::automock)]
pub trait TidyEngine: Send + Sync {
    /// The engine's canonical option table.
    fn option_specs(&self) -> Vec<EngineOptionSpec>;

    /// Normalizes `source` with the given option values.
    fn normalize(&self, source: &str, options: &[(String, OptionValue)]) -> EngineReport;

    fn library_version(&self) -> String {
        String::from("unknown")
    }

    fn release_date(&self) -> String {
        String::from("unknown")
    }
}
