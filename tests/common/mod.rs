//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tidy_bridge::encoding::EncodingCatalog;
use tidy_bridge::engine::{
    DocumentProfile, EngineDiagnostic, EngineOptionKind, EngineOptionSpec, EngineReport, TidyEngine,
};
use tidy_bridge::models::{OptionCategory, OptionValue, Severity};
use tidy_bridge::{OptionRegistry, TidyModel};

/// A stand-in engine with a small but realistic option table.
///
/// Output is the trimmed source (upper-cased with `uppercase-tags`). A
/// missing doctype and `<font>` elements produce warnings unless
/// `show-warnings` is off. Sources containing `<fatal>` fail with status -1.
pub struct FakeEngine {
    delay: Duration,
    calls: AtomicUsize,
    last_options: Mutex<Vec<(String, OptionValue)>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::slow(Duration::ZERO)
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            calls: AtomicUsize::new(0),
            last_options: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_options(&self) -> Vec<(String, OptionValue)> {
        self.last_options.lock().unwrap().clone()
    }
}

fn spec(
    name: &str,
    category: OptionCategory,
    kind: EngineOptionKind,
    default: &str,
    read_only: bool,
) -> EngineOptionSpec {
    EngineOptionSpec {
        name: name.to_string(),
        category,
        kind,
        default: default.to_string(),
        read_only,
        description: format!("The {} option", name),
    }
}

fn pick(values: &[&str]) -> EngineOptionKind {
    EngineOptionKind::PickList(values.iter().map(|v| v.to_string()).collect())
}

impl TidyEngine for FakeEngine {
    fn option_specs(&self) -> Vec<EngineOptionSpec> {
        use EngineOptionKind::*;
        use OptionCategory::*;
        vec![
            spec("alt-text", Markup, String, "", false),
            spec("doctype", Markup, pick(&["auto", "omit", "html5", "strict", "loose"]), "auto", false),
            spec("doctype-mode", Markup, String, "auto", true),
            spec("uppercase-tags", Markup, Boolean, "no", false),
            spec("quiet", Diagnostics, Boolean, "no", false),
            spec("show-warnings", Diagnostics, Boolean, "yes", false),
            spec("indent", PrettyPrint, pick(&["no", "yes", "auto"]), "no", false),
            spec("indent-spaces", PrettyPrint, Integer { min: 0, max: 32 }, "2", false),
            spec("wrap", PrettyPrint, Integer { min: 0, max: 10_000 }, "68", false),
            spec("char-encoding", OptionCategory::Encoding, EngineOptionKind::Encoding, "utf8", false),
            spec("input-encoding", OptionCategory::Encoding, EngineOptionKind::Encoding, "utf8", false),
            spec("output-encoding", OptionCategory::Encoding, EngineOptionKind::Encoding, "utf8", false),
            spec("tidy-mark", Miscellaneous, Boolean, "yes", false),
        ]
    }

    fn normalize(&self, source: &str, options: &[(String, OptionValue)]) -> EngineReport {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_options.lock().unwrap() = options.to_vec();
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        if source.contains("<fatal>") {
            return EngineReport {
                status: -1,
                ..EngineReport::default()
            };
        }

        let flag = |name: &str| {
            options
                .iter()
                .any(|(n, v)| n == name && *v == OptionValue::Boolean(true))
        };
        let warnings_enabled = !options
            .iter()
            .any(|(n, v)| n == "show-warnings" && *v == OptionValue::Boolean(false));

        let mut diagnostics = vec![EngineDiagnostic {
            severity: Severity::Info,
            line: 0,
            column: 0,
            text: "Document content looks like HTML5".to_string(),
        }];
        if warnings_enabled {
            if !source.to_ascii_lowercase().contains("<!doctype") {
                diagnostics.push(EngineDiagnostic {
                    severity: Severity::Warning,
                    line: 1,
                    column: 1,
                    text: "missing <!DOCTYPE> declaration".to_string(),
                });
            }
            for (idx, line) in source.lines().enumerate() {
                if let Some(col) = line.find("<font") {
                    diagnostics.push(EngineDiagnostic {
                        severity: Severity::Warning,
                        line: idx as u32 + 1,
                        column: col as u32 + 1,
                        text: "<font> element is deprecated".to_string(),
                    });
                }
            }
        }

        let trimmed = source.trim();
        let output = if flag("uppercase-tags") {
            trimmed.to_uppercase()
        } else {
            trimmed.to_string()
        };
        let status = if diagnostics.len() > 1 { 1 } else { 0 };

        EngineReport {
            status,
            output: format!("{}\n", output),
            diagnostics,
            profile: DocumentProfile {
                html_version: 5,
                is_xhtml: false,
                is_generic_xml: false,
            },
        }
    }

    fn library_version(&self) -> String {
        "5.8.0".to_string()
    }

    fn release_date(&self) -> String {
        "2021.07.10".to_string()
    }
}

pub fn registry(engine: &FakeEngine) -> Arc<OptionRegistry> {
    Arc::new(OptionRegistry::load_from_engine(engine, Arc::new(EncodingCatalog::new())).unwrap())
}

/// A model over a fresh fake engine, returning the engine for inspection.
pub fn model_with_text(text: &str) -> (Arc<FakeEngine>, TidyModel) {
    let engine = Arc::new(FakeEngine::new());
    let registry = registry(&engine);
    let model = TidyModel::with_text(engine.clone(), registry, text);
    (engine, model)
}
