//! Option descriptor registry.
//!
//! Mirrors the engine's option table into typed [`OptionDescriptor`]s once per
//! process. The registry is immutable afterwards and shared as
//! `Arc<OptionRegistry>` by every option set.

use crate::encoding::EncodingCatalog;
use crate::engine::{EngineOptionKind, EngineOptionSpec, TidyEngine};
use crate::models::{OptionDescriptor, OptionError, OptionType, OptionValue};
use indexmap::IndexMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while building or querying the registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("The engine reported no options")]
    Empty,

    #[error("The engine reported option {0} more than once")]
    DuplicateOption(String),

    #[error("Option {name} is malformed: {reason}")]
    InvalidDescriptor { name: String, reason: String },

    #[error("Default value of option {name} is invalid: {source}")]
    InvalidDefault {
        name: String,
        #[source]
        source: OptionError,
    },

    #[error("Unknown option: {0}")]
    UnknownOption(String),
}

/// Immutable table of option descriptors, keyed by name, in engine order.
#[derive(Debug)]
pub struct OptionRegistry {
    descriptors: IndexMap<String, Arc<OptionDescriptor>>,
    catalog: Arc<EncodingCatalog>,
}

impl OptionRegistry {
    /// Reads the engine's option table. Fails if the engine reports no
    /// options or any row cannot be typed.
    pub fn load_from_engine(
        engine: &dyn TidyEngine,
        catalog: Arc<EncodingCatalog>,
    ) -> Result<Self, RegistryError> {
        Self::from_specs(engine.option_specs(), catalog)
    }

    /// Builds the registry from option rows already obtained from the engine.
    pub fn from_specs(
        specs: Vec<EngineOptionSpec>,
        catalog: Arc<EncodingCatalog>,
    ) -> Result<Self, RegistryError> {
        if specs.is_empty() {
            tracing::error!("Option registry initialization failed: engine reported no options");
            return Err(RegistryError::Empty);
        }

        let mut descriptors = IndexMap::with_capacity(specs.len());
        for spec in specs {
            let descriptor = build_descriptor(spec, &catalog)?;
            if descriptors.contains_key(&descriptor.name) {
                return Err(RegistryError::DuplicateOption(descriptor.name));
            }
            descriptors.insert(descriptor.name.clone(), Arc::new(descriptor));
        }

        tracing::info!("Option registry loaded with {} options", descriptors.len());
        Ok(Self {
            descriptors,
            catalog,
        })
    }

    pub fn describe(&self, name: &str) -> Result<&Arc<OptionDescriptor>, RegistryError> {
        self.descriptors
            .get(name)
            .ok_or_else(|| RegistryError::UnknownOption(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.descriptors.contains_key(name)
    }

    pub fn count(&self) -> usize {
        self.descriptors.len()
    }

    /// Option names in engine order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.descriptors.keys().map(String::as_str)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &Arc<OptionDescriptor>> {
        self.descriptors.values()
    }

    pub fn catalog(&self) -> &Arc<EncodingCatalog> {
        &self.catalog
    }

    /// One human-readable line per option, for export and troubleshooting.
    pub fn dump_descriptions(&self) -> Vec<(String, String)> {
        self.descriptors
            .values()
            .map(|d| {
                let mut text = format!(
                    "[{}] {}, default {}",
                    d.category,
                    describe_type(&d.value_type),
                    d.default_value
                );
                if d.read_only {
                    text.push_str(", read-only");
                }
                if !d.description.is_empty() {
                    text.push_str(": ");
                    text.push_str(&d.description);
                }
                (d.name.clone(), text)
            })
            .collect()
    }

    /// Keeps the names the engine supports, in the given order. Unknown
    /// names are logged and dropped.
    pub fn filter_supported<S: AsRef<str>>(&self, names: &[S]) -> Vec<String> {
        names
            .iter()
            .map(|name| name.as_ref())
            .filter(|name| {
                let known = self.contains(name);
                if !known {
                    tracing::warn!("Ignoring unsupported option name: {}", name);
                }
                known
            })
            .map(str::to_string)
            .collect()
    }

    /// Factory defaults of every writable option as a flat string map,
    /// keys optionally namespaced with `prefix`.
    pub fn default_persisted_map(&self, prefix: Option<&str>) -> IndexMap<String, String> {
        self.descriptors
            .values()
            .filter(|d| !d.read_only)
            .map(|d| {
                let key = format!("{}{}", prefix.unwrap_or(""), d.name);
                (key, d.default_value.to_string())
            })
            .collect()
    }
}

fn build_descriptor(
    spec: EngineOptionSpec,
    catalog: &EncodingCatalog,
) -> Result<OptionDescriptor, RegistryError> {
    let value_type = match spec.kind {
        EngineOptionKind::Boolean => OptionType::Boolean,
        EngineOptionKind::Integer { min, max } if min > max => {
            return Err(RegistryError::InvalidDescriptor {
                name: spec.name,
                reason: format!("integer bounds {}..={} are empty", min, max),
            });
        }
        EngineOptionKind::Integer { min, max } => OptionType::Integer { min, max },
        EngineOptionKind::PickList(values) if values.is_empty() => {
            return Err(RegistryError::InvalidDescriptor {
                name: spec.name,
                reason: "pick list is empty".to_string(),
            });
        }
        EngineOptionKind::PickList(values) => OptionType::Enum(values),
        EngineOptionKind::String => OptionType::String,
        EngineOptionKind::Encoding => OptionType::Encoding,
    };

    if spec.name.trim().is_empty() {
        return Err(RegistryError::InvalidDescriptor {
            name: spec.name,
            reason: "name is empty".to_string(),
        });
    }

    let mut descriptor = OptionDescriptor {
        name: spec.name,
        category: spec.category,
        value_type,
        // Replaced below once the default has been typed.
        default_value: OptionValue::String(String::new()),
        read_only: spec.read_only,
        description: spec.description,
    };

    descriptor.default_value = descriptor
        .coerce(OptionValue::String(spec.default), catalog)
        .map_err(|source| RegistryError::InvalidDefault {
            name: descriptor.name.clone(),
            source,
        })?;

    Ok(descriptor)
}

fn describe_type(value_type: &OptionType) -> String {
    match value_type {
        OptionType::Integer { min, max } => format!("integer {}..={}", min, max),
        OptionType::Enum(values) => format!("one of {}", values.join("|")),
        other => other.type_name().to_string(),
    }
}
