// Document state
//
// The TidyModel owns one document's source text, option values and last run
// results, and reports every change as TidyEvent values.

pub mod options;

pub use options::{
    ConfigTextError, OptionHandle, OptionInstance, OptionSet, PersistReport, StepDirection,
    parse_config_text,
};

use crate::encoding::{Anomaly, CatalogError, DecodeOutcome, EncodingCatalog, EncodingId};
use crate::engine::{DocumentProfile, EngineReport, TidyEngine};
use crate::metrics::Metrics;
use crate::models::{Diagnostics, MessageBuilder, OptionError, OptionValue, Preferences, Severity};
use crate::registry::OptionRegistry;
use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::broadcast;

const INPUT_ENCODING: &str = "input-encoding";
const OUTPUT_ENCODING: &str = "output-encoding";
const CHAR_ENCODING: &str = "char-encoding";

/// Change events emitted by [`TidyModel`] mutators.
///
/// Every mutator returns the events it caused and also sends them on the
/// model's broadcast channel. Mutators only produce events for actual
/// changes; every successful run reports both of its results.
#[derive(Clone, Debug, PartialEq)]
pub enum TidyEvent {
    /// An option value changed
    OptionChanged { name: String },

    /// The source text changed
    SourceTextChanged,

    /// A successful run replaced the tidy text
    TidyTextChanged,

    /// A successful run replaced the diagnostics
    DiagnosticsChanged { count: usize },

    /// Source bytes look wrong under the declared encoding. Nothing was
    /// changed; the caller accepts or declines the suggestion.
    EncodingIssueDetected {
        current: EncodingId,
        suggested: EncodingId,
    },

    /// The declared input encoding changed
    InputEncodingChanged {
        previous: EncodingId,
        current: EncodingId,
    },

    /// The engine reported a fatal status; previous results are kept
    RunFailed { status: i32 },
}

/// Where a model stands relative to its last successful run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelState {
    /// Results match the current inputs
    Idle,
    /// Source text or an in-use option changed since the last successful run
    Dirty,
    /// A run has been prepared and not yet completed or abandoned
    Running,
    /// The last run failed and nothing changed since
    Failed { status: i32 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    #[error("Nothing changed since the last successful run")]
    NotDirty,

    #[error("A run is already in progress")]
    AlreadyRunning,

    #[error("No run is in progress")]
    NotRunning,

    #[error("Run {generation} was superseded by a later run")]
    StaleRun { generation: u64 },

    #[error("Engine reported fatal status {status}")]
    EngineFailure { status: i32 },

    #[error("Engine run timed out after {0:?}")]
    Timeout(Duration),

    #[error("Engine worker failed: {0}")]
    Worker(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingWorkflowError {
    #[error("No encoding issue is pending")]
    NoPendingIssue,

    #[error("No previous input encoding to revert to")]
    NothingToRevert,

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// A suspect decode awaiting the caller's decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncodingIssue {
    pub current: EncodingId,
    pub suggested: EncodingId,
    pub anomaly: Anomaly,
}

/// Status and statistics of the last successful run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub status: i32,
    pub errors: usize,
    pub warnings: usize,
    pub info: usize,
    pub other: usize,
    pub profile: DocumentProfile,
}

/// Results of one successful run, replaced as a whole.
#[derive(Clone, Debug, Default)]
pub struct RunOutput {
    pub tidy_text: String,
    pub diagnostics: Diagnostics,
    pub summary: RunSummary,
}

/// Inputs a run was computed from.
#[derive(Clone, Debug, PartialEq)]
struct RunInputs {
    source: String,
    options: Vec<(String, OptionValue)>,
}

/// A snapshot of the model's inputs, ready to hand to the engine.
///
/// Produced by [`TidyModel::prepare_run`]. Executing it does not touch the
/// model, so it can run on a blocking worker.
pub struct RunRequest {
    generation: u64,
    engine: Arc<dyn TidyEngine>,
    engine_options: Vec<(String, OptionValue)>,
    inputs: RunInputs,
}

impl RunRequest {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Calls the engine. Blocks for as long as the engine does.
    pub fn execute(self) -> RunResponse {
        let started = Instant::now();
        let report = self
            .engine
            .normalize(&self.inputs.source, &self.engine_options);
        RunResponse {
            generation: self.generation,
            report,
            inputs: self.inputs,
            elapsed: started.elapsed(),
        }
    }
}

/// The engine's answer to a [`RunRequest`], applied with
/// [`TidyModel::complete_run`].
pub struct RunResponse {
    generation: u64,
    report: EngineReport,
    inputs: RunInputs,
    elapsed: Duration,
}

impl RunResponse {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn report(&self) -> &EngineReport {
        &self.report
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct EncodingHandles {
    input: Option<OptionHandle>,
    output: Option<OptionHandle>,
}

/// One document: source text, option values, and the results of the last
/// successful engine run over them.
///
/// A model has a single writer. Read accessors return whole values that are
/// replaced atomically at the end of a run, so a clone of
/// [`last_run`](Self::last_run) can be handed to other threads.
///
/// # Usage
///
/// - mutate with [`set_source_text`](Self::set_source_text),
///   [`set_source_bytes`](Self::set_source_bytes) and
///   [`set_option`](Self::set_option)
/// - call [`run`](Self::run), or drive the run from a worker with
///   [`crate::services::TidyRunner`]
/// - [`subscribe`](Self::subscribe) to follow changes
pub struct TidyModel {
    engine: Arc<dyn TidyEngine>,
    catalog: Arc<EncodingCatalog>,
    options: OptionSet,
    handles: EncodingHandles,

    source_text: String,
    source_bytes: Option<Vec<u8>>,
    source_path: Option<Utf8PathBuf>,

    input_encoding: EncodingId,
    output_encoding: EncodingId,
    last_encoding: Option<EncodingId>,
    pending_issue: Option<EncodingIssue>,
    check_input_encoding: bool,

    last_run: Arc<RunOutput>,
    last_inputs: Option<RunInputs>,
    running: Option<u64>,
    failure: Option<i32>,
    generation: u64,
    builder: MessageBuilder,

    event_tx: broadcast::Sender<TidyEvent>,
    metrics: Option<Arc<Metrics>>,
}

impl TidyModel {
    /// An empty document with every option at its default.
    pub fn new(engine: Arc<dyn TidyEngine>, registry: Arc<OptionRegistry>) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        let catalog = Arc::clone(registry.catalog());
        let options = OptionSet::new(registry);

        let encoding_of = |name: &str| match options.get(name) {
            Some(OptionValue::Encoding(id)) => Some(*id),
            _ => None,
        };
        let input_encoding = encoding_of(INPUT_ENCODING).unwrap_or(EncodingId::Utf8);
        let output_encoding = encoding_of(OUTPUT_ENCODING).unwrap_or(EncodingId::Utf8);
        let handles = EncodingHandles {
            input: options.handle(INPUT_ENCODING),
            output: options.handle(OUTPUT_ENCODING),
        };

        Self {
            engine,
            catalog,
            options,
            handles,
            source_text: String::new(),
            source_bytes: None,
            source_path: None,
            input_encoding,
            output_encoding,
            last_encoding: None,
            pending_issue: None,
            check_input_encoding: true,
            last_run: Arc::new(RunOutput::default()),
            last_inputs: None,
            running: None,
            failure: None,
            generation: 0,
            builder: MessageBuilder,
            event_tx,
            metrics: None,
        }
    }

    /// A document holding `text`, trusted verbatim.
    pub fn with_text(
        engine: Arc<dyn TidyEngine>,
        registry: Arc<OptionRegistry>,
        text: impl Into<String>,
    ) -> Self {
        let mut model = Self::new(engine, registry);
        model.source_text = text.into();
        model
    }

    /// An empty document sharing `other`'s engine and registry, with its
    /// option values, options in use and encodings.
    pub fn from_model(other: &TidyModel) -> Self {
        let mut model = Self::new(Arc::clone(&other.engine), Arc::clone(other.options.registry()));
        if other.options.iter().any(|i| !i.is_in_use()) {
            model.options.restrict_to(&other.options.in_use_names());
        }
        model.options.copy_values_from(&other.options);
        model.input_encoding = other.input_encoding;
        model.output_encoding = other.output_encoding;
        model.check_input_encoding = other.check_input_encoding;
        model
    }

    /// A document loaded from `path` with the default input encoding.
    pub fn from_file(
        engine: Arc<dyn TidyEngine>,
        registry: Arc<OptionRegistry>,
        path: &Utf8Path,
    ) -> anyhow::Result<Self> {
        let mut model = Self::new(engine, registry);
        model.set_source_file(path)?;
        Ok(model)
    }

    /// Count runs and events in `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn metrics(&self) -> Option<&Arc<Metrics>> {
        self.metrics.as_ref()
    }

    /// Subscribe to change events
    ///
    /// Returns a receiver that gets every event emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<TidyEvent> {
        self.event_tx.subscribe()
    }

    // Reading

    pub fn source_text(&self) -> &str {
        &self.source_text
    }

    pub fn source_path(&self) -> Option<&Utf8Path> {
        self.source_path.as_deref()
    }

    pub fn tidy_text(&self) -> &str {
        &self.last_run.tidy_text
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.last_run.diagnostics
    }

    pub fn summary(&self) -> &RunSummary {
        &self.last_run.summary
    }

    /// Shared handle to the last successful run's results.
    pub fn last_run(&self) -> Arc<RunOutput> {
        Arc::clone(&self.last_run)
    }

    /// Diagnostics in "line L column C - Severity: text" form.
    pub fn error_text(&self) -> String {
        self.last_run.diagnostics.error_text()
    }

    pub fn options(&self) -> &OptionSet {
        &self.options
    }

    pub fn registry(&self) -> &Arc<OptionRegistry> {
        self.options.registry()
    }

    pub fn input_encoding(&self) -> EncodingId {
        self.input_encoding
    }

    pub fn output_encoding(&self) -> EncodingId {
        self.output_encoding
    }

    /// The encoding a revert would return to.
    pub fn last_encoding(&self) -> Option<EncodingId> {
        self.last_encoding
    }

    pub fn pending_encoding_issue(&self) -> Option<&EncodingIssue> {
        self.pending_issue.as_ref()
    }

    pub fn check_input_encoding(&self) -> bool {
        self.check_input_encoding
    }

    pub fn set_check_input_encoding(&mut self, enabled: bool) {
        self.check_input_encoding = enabled;
    }

    pub fn library_version(&self) -> String {
        self.engine.library_version()
    }

    pub fn release_date(&self) -> String {
        self.engine.release_date()
    }

    /// True when the source text differs from the tidy text, or when the
    /// inputs changed since the last successful run. Computed on every call.
    pub fn is_dirty(&self) -> bool {
        self.output_differs_from_source() || self.needs_run()
    }

    /// Content comparison of source and tidy text.
    pub fn output_differs_from_source(&self) -> bool {
        self.source_text != self.last_run.tidy_text
    }

    /// True when the source text or the in-use option values differ from
    /// the inputs of the last successful run. A model that never ran needs
    /// a run. This gates [`TidyModel::run`] and drives [`ModelState::Dirty`].
    pub fn needs_run(&self) -> bool {
        match &self.last_inputs {
            None => true,
            Some(inputs) => {
                inputs.source != self.source_text || inputs.options != self.options.in_use_values()
            }
        }
    }

    pub fn state(&self) -> ModelState {
        if self.running.is_some() {
            ModelState::Running
        } else if let Some(status) = self.failure {
            ModelState::Failed { status }
        } else if self.needs_run() {
            ModelState::Dirty
        } else {
            ModelState::Idle
        }
    }

    // Source text

    /// Replaces the source text verbatim. Any retained source bytes and
    /// pending encoding issue are discarded.
    pub fn set_source_text(&mut self, text: impl Into<String>) -> Vec<TidyEvent> {
        self.source_bytes = None;
        self.pending_issue = None;
        let events = self.replace_source(text.into());
        self.emit(&events);
        events
    }

    /// Decodes `bytes` with the input encoding.
    ///
    /// When the decode looks wrong and input checking is enabled, the source
    /// text is left unchanged and [`TidyEvent::EncodingIssueDetected`] is
    /// returned; resolve it with
    /// [`accept_encoding_suggestion`](Self::accept_encoding_suggestion) or
    /// [`decline_encoding_suggestion`](Self::decline_encoding_suggestion).
    pub fn set_source_bytes(&mut self, bytes: impl Into<Vec<u8>>) -> Result<Vec<TidyEvent>, CatalogError> {
        let bytes = bytes.into();
        let decoded = self.catalog.decode(&bytes, self.input_encoding)?;
        self.source_bytes = Some(bytes);
        self.pending_issue = None;

        let events = match decoded.outcome {
            DecodeOutcome::Suspect { anomaly, suggested } if self.check_input_encoding => {
                let current = self.input_encoding;
                self.pending_issue = Some(EncodingIssue {
                    current,
                    suggested,
                    anomaly,
                });
                if let Some(metrics) = &self.metrics {
                    metrics.record_encoding_issue();
                }
                vec![TidyEvent::EncodingIssueDetected { current, suggested }]
            }
            _ => self.replace_source(decoded.text),
        };

        self.emit(&events);
        Ok(events)
    }

    /// Reads `path` and loads it as source bytes.
    pub fn set_source_file(&mut self, path: &Utf8Path) -> anyhow::Result<Vec<TidyEvent>> {
        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read source file: {}", path))?;
        let events = self
            .set_source_bytes(bytes)
            .with_context(|| format!("Failed to decode source file: {}", path))?;

        tracing::info!("Loaded source file {} as {}", path, self.input_encoding);
        self.source_path = Some(path.to_owned());
        Ok(events)
    }

    /// Switches to the suggested encoding and decodes the retained bytes
    /// with it. The previous encoding becomes revertible.
    pub fn accept_encoding_suggestion(&mut self) -> Result<Vec<TidyEvent>, EncodingWorkflowError> {
        let issue = self
            .pending_issue
            .take()
            .ok_or(EncodingWorkflowError::NoPendingIssue)?;

        let events = if issue.suggested == self.input_encoding {
            self.redecode_source()
        } else {
            self.apply_input_encoding(issue.suggested, true)
        };
        self.emit(&events);
        Ok(events)
    }

    /// Keeps the declared encoding and decodes the retained bytes with it.
    pub fn decline_encoding_suggestion(&mut self) -> Result<Vec<TidyEvent>, EncodingWorkflowError> {
        self.pending_issue
            .take()
            .ok_or(EncodingWorkflowError::NoPendingIssue)?;

        let events = self.redecode_source();
        self.emit(&events);
        Ok(events)
    }

    /// Returns to the encoding in use before the last switch. Only one level
    /// is remembered.
    pub fn revert_input_encoding(&mut self) -> Result<Vec<TidyEvent>, EncodingWorkflowError> {
        let previous = self
            .last_encoding
            .take()
            .ok_or(EncodingWorkflowError::NothingToRevert)?;

        let events = self.apply_input_encoding(previous, false);
        self.emit(&events);
        Ok(events)
    }

    /// Declares a new input encoding. Retained source bytes are decoded
    /// again with it, without a sanity check.
    pub fn set_input_encoding(&mut self, id: EncodingId) -> Result<Vec<TidyEvent>, CatalogError> {
        self.catalog.resolve(id)?;
        let events = self.apply_input_encoding(id, true);
        self.emit(&events);
        Ok(events)
    }

    pub fn set_output_encoding(&mut self, id: EncodingId) -> Result<Vec<TidyEvent>, CatalogError> {
        self.catalog.resolve(id)?;
        let events = self.apply_output_encoding(id);
        self.emit(&events);
        Ok(events)
    }

    // Options

    pub fn set_option(
        &mut self,
        name: &str,
        value: impl Into<OptionValue>,
    ) -> Result<Vec<TidyEvent>, OptionError> {
        let events = self.options.set(name, value)?.into_iter().collect();
        Ok(self.absorb_option_events(events))
    }

    pub fn reset_option(&mut self, name: &str) -> Result<Vec<TidyEvent>, OptionError> {
        let events = self.options.reset_to_default(name)?.into_iter().collect();
        Ok(self.absorb_option_events(events))
    }

    pub fn reset_all_options(&mut self) -> Vec<TidyEvent> {
        let events = self.options.reset_all_to_default();
        self.absorb_option_events(events)
    }

    pub fn step_option(
        &mut self,
        name: &str,
        direction: StepDirection,
    ) -> Result<Vec<TidyEvent>, OptionError> {
        let events = self.options.step(name, direction)?.into_iter().collect();
        Ok(self.absorb_option_events(events))
    }

    /// Limits the options passed to the engine to `names`.
    pub fn restrict_options_to<S: AsRef<str>>(&mut self, names: &[S]) -> Vec<TidyEvent> {
        let events = self.options.restrict_to(names);
        self.failure = None;
        self.absorb_option_events(events)
    }

    pub fn use_all_options(&mut self) {
        self.options.use_all();
        self.failure = None;
    }

    /// Copies option values by name from another document.
    pub fn copy_options_from(&mut self, other: &TidyModel) -> Vec<TidyEvent> {
        let events = self.options.copy_values_from(&other.options);
        self.absorb_option_events(events)
    }

    pub fn apply_persisted_map(
        &mut self,
        map: &IndexMap<String, String>,
        prefix: Option<&str>,
    ) -> PersistReport {
        let mut report = self.options.from_persisted_map(map, prefix);
        report.events = self.absorb_option_events(std::mem::take(&mut report.events));
        report
    }

    pub fn apply_config_text(&mut self, text: &str) -> Result<PersistReport, ConfigTextError> {
        let map = parse_config_text(text)?;
        Ok(self.apply_persisted_map(&map, None))
    }

    /// Config text for the current options with a header naming the source
    /// file.
    pub fn config_file_text(&self) -> String {
        let base_name = self
            .source_path
            .as_deref()
            .and_then(Utf8Path::file_name)
            .unwrap_or("untitled");
        self.options.to_config_file(base_name)
    }

    // Preferences

    /// Applies host preferences: options in use, option values, encodings
    /// and the input check flag. Explicit encodings win over encoding
    /// options in the map.
    pub fn apply_preferences(&mut self, prefs: &Preferences) -> PersistReport {
        let mut events = if prefs.options_in_use.is_empty() {
            self.options.use_all();
            Vec::new()
        } else {
            self.options.restrict_to(&prefs.options_in_use)
        };
        self.check_input_encoding = prefs.check_input_encoding;

        let mut report = self.options.from_persisted_map(&prefs.options, None);
        events.append(&mut report.events);
        self.failure = None;
        let mut all = self.absorb_option_events(events);

        let mut encoding_events = Vec::new();
        for (id, is_input) in [(prefs.input_encoding, true), (prefs.output_encoding, false)] {
            if !self.catalog.contains(id) {
                tracing::warn!("Preferred encoding {} is not in the catalog; ignoring", id);
                continue;
            }
            if is_input {
                encoding_events.extend(self.apply_input_encoding(id, false));
            } else {
                encoding_events.extend(self.apply_output_encoding(id));
            }
        }
        self.emit(&encoding_events);
        all.extend(encoding_events);

        tracing::info!(
            "Applied preferences: {} option(s) changed, {} rejected",
            all.len(),
            report.failures.len()
        );
        report.events = all;
        report
    }

    /// Writes the model's option state into `prefs`, leaving the rest alone.
    pub fn capture_preferences(&self, prefs: &mut Preferences) {
        prefs.options = self.options.to_persisted_map(None);
        prefs.options_in_use = if self.options.iter().all(OptionInstance::is_in_use) {
            Vec::new()
        } else {
            self.options
                .in_use_names()
                .into_iter()
                .map(str::to_string)
                .collect()
        };
        prefs.input_encoding = self.input_encoding;
        prefs.output_encoding = self.output_encoding;
        prefs.check_input_encoding = self.check_input_encoding;
    }

    // Running

    /// Snapshots the inputs and enters [`ModelState::Running`].
    ///
    /// Encoding options are passed to the engine as UTF-8: the engine
    /// always receives decoded text, and output encoding is applied by
    /// [`tidy_text_as_bytes`](Self::tidy_text_as_bytes).
    pub fn prepare_run(&mut self) -> Result<RunRequest, RunError> {
        if self.running.is_some() {
            return Err(RunError::AlreadyRunning);
        }
        if !self.needs_run() {
            return Err(RunError::NotDirty);
        }

        self.generation += 1;
        self.running = Some(self.generation);

        let engine_options = self
            .options
            .iter()
            .filter(|i| i.is_in_use())
            .map(|i| {
                let value = if i.descriptor().is_encoding_option() {
                    OptionValue::Encoding(EncodingId::Utf8)
                } else {
                    i.get().clone()
                };
                (i.name().to_string(), value)
            })
            .collect();

        tracing::debug!("Prepared run {}", self.generation);
        Ok(RunRequest {
            generation: self.generation,
            engine: Arc::clone(&self.engine),
            engine_options,
            inputs: RunInputs {
                source: self.source_text.clone(),
                options: self.options.in_use_values(),
            },
        })
    }

    /// Applies a finished run.
    ///
    /// On success the output text and diagnostics are replaced together. On
    /// a fatal engine status they are left untouched, the model enters
    /// [`ModelState::Failed`] and [`RunError::EngineFailure`] is returned.
    pub fn complete_run(&mut self, response: RunResponse) -> Result<Vec<TidyEvent>, RunError> {
        match self.running {
            None => return Err(RunError::NotRunning),
            Some(generation) if generation != response.generation => {
                return Err(RunError::StaleRun {
                    generation: response.generation,
                });
            }
            Some(_) => self.running = None,
        }

        let RunResponse {
            report,
            inputs,
            elapsed,
            ..
        } = response;

        if report.is_fatal() {
            tracing::error!("Engine run failed with status {}", report.status);
            self.failure = Some(report.status);
            if let Some(metrics) = &self.metrics {
                metrics.record_run_failed();
            }
            let events = vec![TidyEvent::RunFailed {
                status: report.status,
            }];
            self.emit(&events);
            return Err(RunError::EngineFailure {
                status: report.status,
            });
        }

        let mut run = self.builder.begin_run();
        for d in report.diagnostics {
            run.record(d.severity, d.line, d.column, d.text);
        }
        let diagnostics = self.builder.end_run(run);
        let summary = RunSummary {
            status: report.status,
            errors: diagnostics.count(Severity::Error),
            warnings: diagnostics.count(Severity::Warning),
            info: diagnostics.count(Severity::Info),
            other: diagnostics.count(Severity::Other),
            profile: report.profile,
        };

        let events = vec![
            TidyEvent::TidyTextChanged,
            TidyEvent::DiagnosticsChanged {
                count: diagnostics.len(),
            },
        ];

        self.last_run = Arc::new(RunOutput {
            tidy_text: report.output,
            diagnostics,
            summary,
        });
        self.last_inputs = Some(inputs);
        self.failure = None;

        if let Some(metrics) = &self.metrics {
            metrics.record_run_completed(elapsed);
        }
        tracing::info!(
            "Run completed in {:?}: status {}, {} error(s), {} warning(s)",
            elapsed,
            summary.status,
            summary.errors,
            summary.warnings
        );

        self.emit(&events);
        Ok(events)
    }

    /// Leaves [`ModelState::Running`] without applying anything.
    pub fn abandon_run(&mut self) -> Result<(), RunError> {
        let generation = self.running.take().ok_or(RunError::NotRunning)?;
        tracing::warn!("Run {} abandoned", generation);
        Ok(())
    }

    /// Runs the engine synchronously. Valid when the model
    /// [needs a run](Self::needs_run), including after a failed run.
    pub fn run(&mut self) -> Result<Vec<TidyEvent>, RunError> {
        let request = self.prepare_run()?;
        let response = request.execute();
        self.complete_run(response)
    }

    // Output

    /// Output text encoded with the output encoding.
    pub fn tidy_text_as_bytes(&self) -> Result<Vec<u8>, CatalogError> {
        self.catalog
            .encode(&self.last_run.tidy_text, self.output_encoding)
    }

    pub fn write_tidy_text(&self, path: &Utf8Path) -> anyhow::Result<()> {
        let bytes = self
            .tidy_text_as_bytes()
            .with_context(|| format!("Failed to encode output as {}", self.output_encoding))?;
        std::fs::write(path, bytes)
            .with_context(|| format!("Failed to write output file: {}", path))?;

        tracing::info!("Wrote tidy output to {}", path);
        Ok(())
    }

    // Internals

    fn emit(&self, events: &[TidyEvent]) {
        for event in events {
            tracing::debug!("Broadcasting {:?}", event);
            // Ignore send errors - it's OK if no one is listening
            let _ = self.event_tx.send(event.clone());
            if let Some(metrics) = &self.metrics {
                metrics.record_event_broadcast();
            }
        }
    }

    fn replace_source(&mut self, text: String) -> Vec<TidyEvent> {
        if text == self.source_text {
            return Vec::new();
        }
        self.source_text = text;
        self.failure = None;
        vec![TidyEvent::SourceTextChanged]
    }

    fn redecode_source(&mut self) -> Vec<TidyEvent> {
        self.pending_issue = None;
        let Some(bytes) = self.source_bytes.as_deref() else {
            return Vec::new();
        };

        let decoded = self.catalog.decode(bytes, self.input_encoding);
        match decoded {
            Ok(decoded) => self.replace_source(decoded.text),
            Err(e) => {
                tracing::warn!("Could not decode source as {}: {}", self.input_encoding, e);
                Vec::new()
            }
        }
    }

    fn apply_input_encoding(&mut self, id: EncodingId, remember: bool) -> Vec<TidyEvent> {
        if id == self.input_encoding {
            return Vec::new();
        }
        let previous = std::mem::replace(&mut self.input_encoding, id);
        if remember {
            self.last_encoding = Some(previous);
        }
        tracing::info!("Input encoding changed from {} to {}", previous, id);

        let mut events = vec![TidyEvent::InputEncodingChanged {
            previous,
            current: id,
        }];
        events.extend(self.sync_encoding_option(self.handles.input, id));
        events.extend(self.redecode_source());
        events
    }

    fn apply_output_encoding(&mut self, id: EncodingId) -> Vec<TidyEvent> {
        if id == self.output_encoding {
            return Vec::new();
        }
        self.output_encoding = id;
        tracing::info!("Output encoding set to {}", id);
        self.sync_encoding_option(self.handles.output, id)
            .into_iter()
            .collect()
    }

    fn sync_encoding_option(
        &mut self,
        handle: Option<OptionHandle>,
        id: EncodingId,
    ) -> Option<TidyEvent> {
        match self.options.set_at(handle?, id) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!("Encoding option left unchanged: {}", e);
                None
            }
        }
    }

    /// Follows option changes with the encoding fields they drive, then
    /// broadcasts everything.
    fn absorb_option_events(&mut self, events: Vec<TidyEvent>) -> Vec<TidyEvent> {
        let mut all = Vec::with_capacity(events.len());
        for event in events {
            let changed = match &event {
                TidyEvent::OptionChanged { name } => Some(name.clone()),
                _ => None,
            };
            all.push(event);

            if let Some(name) = changed {
                if let Some(metrics) = &self.metrics {
                    metrics.record_option_change();
                }
                all.extend(self.follow_encoding_option(&name));
            }
        }

        if !all.is_empty() {
            self.failure = None;
        }
        self.emit(&all);
        all
    }

    fn follow_encoding_option(&mut self, name: &str) -> Vec<TidyEvent> {
        let Some(OptionValue::Encoding(id)) = self.options.get(name).cloned() else {
            return Vec::new();
        };
        match name {
            INPUT_ENCODING => self.apply_input_encoding(id, true),
            OUTPUT_ENCODING => self.apply_output_encoding(id),
            CHAR_ENCODING => {
                let mut events = self.apply_input_encoding(id, true);
                events.extend(self.apply_output_encoding(id));
                events
            }
            _ => Vec::new(),
        }
    }
}
