// tidy-bridge - Typed option, encoding and diagnostics layer over an HTML tidy engine
//
// The engine itself is external (see engine::TidyEngine). This crate owns the
// option registry, per-document option sets, the encoding sanity workflow and
// the diagnostics of each run.

pub mod config;
pub mod encoding;
pub mod engine;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod registry;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use encoding::{DecodeOutcome, EncodingCatalog, EncodingId};
pub use engine::{EngineReport, TidyEngine};
pub use metrics::Metrics;
pub use models::{DiagnosticMessage, OptionError, OptionValue, Preferences, Severity};
pub use registry::{OptionRegistry, RegistryError};
pub use services::TidyRunner;
pub use state::{ModelState, OptionSet, RunError, TidyEvent, TidyModel};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
