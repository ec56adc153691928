use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Severity of an engine diagnostic. Declaration order is the sort rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
    Other,
}

impl Severity {
    pub fn rank(self) -> u8 {
        self as u8
    }

    pub fn description(self) -> &'static str {
        match self {
            Severity::Info => "Info",
            Severity::Warning => "Warning",
            Severity::Error => "Error",
            Severity::Other => "Other",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// One issue reported by the engine during a run.
///
/// Equality (and hashing) consider line, column and text only; two reports
/// of the same problem at different severities are the same message. Display
/// order additionally ranks severity, see [`DiagnosticMessage::display_order`].
/// `Ord` is deliberately not implemented because it could not agree with `Eq`.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticMessage {
    severity: Severity,
    line: u32,
    column: u32,
    text: String,
}

impl DiagnosticMessage {
    pub fn new(severity: Severity, line: u32, column: u32, text: impl Into<String>) -> Self {
        Self {
            severity,
            line,
            column,
            text: text.into(),
        }
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// 1-based line, 0 when not applicable.
    pub fn line(&self) -> u32 {
        self.line
    }

    /// 1-based column, 0 when not applicable.
    pub fn column(&self) -> u32 {
        self.column
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// `line L column C`, or an empty string for document-wide messages.
    pub fn location(&self) -> String {
        match (self.line, self.column) {
            (0, _) => String::new(),
            (line, 0) => format!("line {}", line),
            (line, column) => format!("line {} column {}", line, column),
        }
    }

    /// Sort key: line, column, severity rank, text.
    pub fn sort_key(&self) -> (u32, u32, Severity, &str) {
        (self.line, self.column, self.severity, &self.text)
    }

    /// Total order used for display and duplicate checks.
    pub fn display_order(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl PartialEq for DiagnosticMessage {
    fn eq(&self, other: &Self) -> bool {
        self.line == other.line && self.column == other.column && self.text == other.text
    }
}

impl Eq for DiagnosticMessage {}

impl Hash for DiagnosticMessage {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.line.hash(state);
        self.column.hash(state);
        self.text.hash(state);
    }
}

/// Traditional listing format: `line 4 column 2 - Warning: text`.
impl fmt::Display for DiagnosticMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let location = self.location();
        if location.is_empty() {
            write!(f, "{}: {}", self.severity, self.text)
        } else {
            write!(f, "{} - {}: {}", location, self.severity, self.text)
        }
    }
}

/// The sorted, immutable message batch of one run.
///
/// Cloning shares the underlying slice, so a batch can be swapped into a
/// model and read elsewhere without copying.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    messages: Arc<[DiagnosticMessage]>,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            messages: Arc::from(Vec::new()),
        }
    }
}

impl Diagnostics {
    pub fn messages(&self) -> &[DiagnosticMessage] {
        &self.messages
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DiagnosticMessage> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.messages.iter().filter(|m| m.severity == severity).count()
    }

    /// True when both batches hold the same messages at the same severities.
    pub fn same_as(&self, other: &Diagnostics) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .zip(other.iter())
                .all(|(a, b)| a.display_order(b) == Ordering::Equal)
    }

    /// All messages in traditional listing format, one per line.
    pub fn error_text(&self) -> String {
        self.messages
            .iter()
            .map(|m| format!("{}\n", m))
            .collect()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a DiagnosticMessage;
    type IntoIter = std::slice::Iter<'a, DiagnosticMessage>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}

/// Collects diagnostics for a single run. Holds no state between runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct MessageBuilder;

/// Messages recorded so far in one run.
#[derive(Debug, Default)]
pub struct RunHandle {
    messages: Vec<DiagnosticMessage>,
}

impl RunHandle {
    pub fn record(&mut self, severity: Severity, line: u32, column: u32, text: impl Into<String>) {
        self.messages
            .push(DiagnosticMessage::new(severity, line, column, text));
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl MessageBuilder {
    pub fn begin_run(&self) -> RunHandle {
        RunHandle::default()
    }

    /// Sorts the run's messages into display order and freezes them.
    pub fn end_run(&self, run: RunHandle) -> Diagnostics {
        let mut messages = run.messages;
        messages.sort_by(DiagnosticMessage::display_order);
        Diagnostics {
            messages: messages.into(),
        }
    }
}
