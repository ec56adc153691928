//! Data models shared by the registry, the option set and the tidy model.
//!
//! - [`OptionDescriptor`], [`OptionType`], [`OptionValue`]: typed option metadata and values,
//!   with the per-variant coercion rules in [`OptionDescriptor::coerce`]
//! - [`DiagnosticMessage`], [`Diagnostics`], [`MessageBuilder`]: the engine's messages for one run
//! - [`Preferences`]: host preferences persisted as YAML by [`ConfigManager`](crate::config::ConfigManager)

pub mod message;
pub mod option;
pub mod preferences;

pub use message::{DiagnosticMessage, Diagnostics, MessageBuilder, RunHandle, Severity};
pub use option::{OptionCategory, OptionDescriptor, OptionError, OptionType, OptionValue};
pub use preferences::{LogSettings, Preferences};
