use crate::models::Preferences;
use crate::registry::OptionRegistry;
use crate::state::{OptionSet, parse_config_text};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use std::fs;

/// Prefix of environment variables overriding preference values, e.g.
/// `TIDY_BRIDGE_LOG__DEBUG_MODE=true`.
pub const ENV_PREFIX: &str = "TIDY_BRIDGE";

/// Configuration manager for the files a tidy host keeps on disk.
///
/// - Preferences (`Tidy Preferences.yaml`): persisted option map, options in
///   use, encodings, logging
/// - Engine config files: `name: value` lines in the engine's own syntax
/// - Options-in-use lists: one option name per line
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    preferences_path: Utf8PathBuf,
    env_prefix: String,
}

impl ConfigManager {
    /// Create a new ConfigManager with the specified configuration directory.
    ///
    /// The directory is created if it doesn't exist.
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            preferences_path: config_dir.join("Tidy Preferences.yaml"),
            config_dir,
            env_prefix: ENV_PREFIX.to_string(),
        })
    }

    /// Read environment overrides from variables starting with `prefix`
    /// instead of [`ENV_PREFIX`].
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn preferences_path(&self) -> &Utf8Path {
        &self.preferences_path
    }

    /// Load preferences, layering environment overrides over the YAML file.
    ///
    /// A missing file yields defaults plus any overrides.
    pub fn load_preferences(&self) -> Result<Preferences> {
        if !self.preferences_path.exists() {
            tracing::warn!(
                "Preferences file not found at {}, using defaults",
                self.preferences_path
            );
        }

        let settings = config::Config::builder()
            .add_source(
                config::File::from(self.preferences_path.as_std_path())
                    .format(config::FileFormat::Yaml)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix(&self.env_prefix)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .with_context(|| format!("Failed to read preferences: {}", self.preferences_path))?;

        let prefs: Preferences = settings
            .try_deserialize()
            .with_context(|| format!("Failed to parse preferences: {}", self.preferences_path))?;

        tracing::info!("Loaded preferences from {}", self.preferences_path);
        Ok(prefs)
    }

    pub fn save_preferences(&self, prefs: &Preferences) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(prefs).context("Failed to serialize preferences to YAML")?;

        fs::write(&self.preferences_path, yaml_string)
            .with_context(|| format!("Failed to write preferences: {}", self.preferences_path))?;

        tracing::info!("Saved preferences to {}", self.preferences_path);
        Ok(())
    }

    /// Write `set` as an engine config file for the document `base_name`.
    /// Relative paths are resolved against the config directory.
    pub fn write_engine_config(&self, path: &Utf8Path, set: &OptionSet, base_name: &str) -> Result<()> {
        let path = self.resolve(path);
        fs::write(&path, set.to_config_file(base_name))
            .with_context(|| format!("Failed to write engine config: {}", path))?;

        tracing::info!("Saved engine config for {} to {}", base_name, path);
        Ok(())
    }

    /// Read an engine config file into a persisted option map.
    pub fn load_engine_config(&self, path: &Utf8Path) -> Result<IndexMap<String, String>> {
        let path = self.resolve(path);
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read engine config: {}", path))?;

        let map = parse_config_text(&contents)
            .with_context(|| format!("Failed to parse engine config: {}", path))?;

        tracing::info!("Loaded {} option(s) from {}", map.len(), path);
        Ok(map)
    }

    /// Read an options-in-use list, keeping only names `registry` knows.
    pub fn load_options_in_use(&self, path: &Utf8Path, registry: &OptionRegistry) -> Result<Vec<String>> {
        let path = self.resolve(path);
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read options list: {}", path))?;

        let names: Vec<&str> = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with("//"))
            .collect();

        let supported = registry.filter_supported(&names);
        tracing::info!(
            "Loaded {} of {} option name(s) from {}",
            supported.len(),
            names.len(),
            path
        );
        Ok(supported)
    }

    /// Write an options-in-use list, one name per line.
    pub fn save_options_in_use<S: AsRef<str>>(&self, path: &Utf8Path, names: &[S]) -> Result<()> {
        let path = self.resolve(path);
        let contents: String = names
            .iter()
            .map(|name| format!("{}\n", name.as_ref()))
            .collect();

        fs::write(&path, contents)
            .with_context(|| format!("Failed to write options list: {}", path))?;

        tracing::info!("Saved {} option name(s) to {}", names.len(), path);
        Ok(())
    }

    fn resolve(&self, path: &Utf8Path) -> Utf8PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config_dir.join(path)
        }
    }
}
