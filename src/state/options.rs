//! Live option values.
//!
//! An [`OptionSet`] holds one [`OptionInstance`] per registry descriptor.
//! Every mutation goes through the same validated path (read-only, in-use,
//! coercion) and reports a [`TidyEvent::OptionChanged`] only when the stored
//! value actually changed.

use super::TidyEvent;
use crate::models::{OptionDescriptor, OptionError, OptionType, OptionValue};
use crate::registry::OptionRegistry;
use indexmap::IndexMap;
use regex::Regex;
use std::borrow::Cow;
use std::sync::{Arc, LazyLock};
use thiserror::Error;

static CONFIG_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z][A-Za-z0-9_-]*)\s*:\s*(.*?)\s*$").expect("Invalid config line regex")
});

/// A config text line that is neither `name: value`, blank, nor a comment.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Malformed config line {line}: {content:?}")]
pub struct ConfigTextError {
    pub line: usize,
    pub content: String,
}

/// Parses `name: value` lines into a persisted map. Blank lines and lines
/// starting with `#` or `//` are ignored; later duplicates win. One pair of
/// surrounding double quotes is stripped from a value.
pub fn parse_config_text(text: &str) -> Result<IndexMap<String, String>, ConfigTextError> {
    let mut map = IndexMap::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
            continue;
        }
        let caps = CONFIG_LINE.captures(line).ok_or_else(|| ConfigTextError {
            line: idx + 1,
            content: raw.to_string(),
        })?;
        map.insert(caps[1].to_string(), unquote_value(&caps[2]).to_string());
    }
    Ok(map)
}

/// Wraps values whose edges would be lost to line trimming in double quotes.
/// Values that already look quoted are wrapped too, so unquoting is exact.
fn quote_value(value: &str) -> Cow<'_, str> {
    if value.trim() != value || is_quoted(value) {
        Cow::Owned(format!("\"{}\"", value))
    } else {
        Cow::Borrowed(value)
    }
}

fn unquote_value(value: &str) -> &str {
    if is_quoted(value) {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

fn is_quoted(value: &str) -> bool {
    value.len() >= 2 && value.starts_with('"') && value.ends_with('"')
}

/// Direction for [`OptionSet::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDirection {
    Increment,
    Decrement,
}

/// Non-owning reference to an instance inside its [`OptionSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OptionHandle(usize);

/// A validated value bound to its descriptor.
#[derive(Debug, Clone)]
pub struct OptionInstance {
    descriptor: Arc<OptionDescriptor>,
    value: OptionValue,
    in_use: bool,
}

impl OptionInstance {
    fn new(descriptor: Arc<OptionDescriptor>) -> Self {
        Self {
            value: descriptor.default_value.clone(),
            descriptor,
            in_use: true,
        }
    }

    pub fn descriptor(&self) -> &OptionDescriptor {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn get(&self) -> &OptionValue {
        &self.value
    }

    pub fn is_default(&self) -> bool {
        self.value == self.descriptor.default_value
    }

    pub fn is_in_use(&self) -> bool {
        self.in_use
    }

    /// `name: value` in the engine's config syntax. Values with leading or
    /// trailing whitespace are written in double quotes.
    pub fn config_string(&self) -> String {
        let value = self.value.to_string();
        format!("{}: {}", self.descriptor.name, quote_value(&value))
    }

    /// All-or-nothing setter. Returns whether the stored value changed.
    fn set(
        &mut self,
        value: OptionValue,
        registry: &OptionRegistry,
    ) -> Result<bool, OptionError> {
        if self.descriptor.read_only {
            return Err(OptionError::ReadOnly(self.descriptor.name.clone()));
        }
        if !self.in_use {
            return Err(OptionError::NotInUse(self.descriptor.name.clone()));
        }

        let coerced = self.descriptor.coerce(value, registry.catalog())?;
        if coerced == self.value {
            return Ok(false);
        }
        self.value = coerced;
        Ok(true)
    }

    fn reset_to_default(&mut self) -> bool {
        if self.is_default() {
            return false;
        }
        self.value = self.descriptor.default_value.clone();
        true
    }

    /// The value one step away from the current one, if any.
    fn stepped(&self, direction: StepDirection, registry: &OptionRegistry) -> Option<OptionValue> {
        let forward = direction == StepDirection::Increment;
        match (&self.descriptor.value_type, &self.value) {
            (OptionType::Boolean, OptionValue::Boolean(b)) => Some(OptionValue::Boolean(!b)),
            (OptionType::Integer { min, max }, OptionValue::Integer(i)) => {
                let next = if forward { i.saturating_add(1) } else { i.saturating_sub(1) };
                Some(OptionValue::Integer(next.clamp(*min, *max)))
            }
            (OptionType::Enum(pick_list), OptionValue::Enum(current)) => {
                let pos = pick_list.iter().position(|v| v == current)?;
                let len = pick_list.len();
                let next = if forward { (pos + 1) % len } else { (pos + len - 1) % len };
                Some(OptionValue::Enum(pick_list[next].clone()))
            }
            (OptionType::Encoding, OptionValue::Encoding(id)) => registry
                .catalog()
                .neighbour(*id, forward)
                .map(OptionValue::Encoding),
            _ => None,
        }
    }
}

/// Outcome of applying a persisted map: changes made and per-entry failures.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PersistReport {
    pub events: Vec<TidyEvent>,
    pub failures: Vec<(String, OptionError)>,
}

impl PersistReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// One instance per registry descriptor, in registry order.
#[derive(Debug, Clone)]
pub struct OptionSet {
    registry: Arc<OptionRegistry>,
    options: IndexMap<String, OptionInstance>,
}

impl OptionSet {
    /// Every option at its default value, all in use.
    pub fn new(registry: Arc<OptionRegistry>) -> Self {
        let options = registry
            .descriptors()
            .map(|d| (d.name.clone(), OptionInstance::new(Arc::clone(d))))
            .collect();
        Self { registry, options }
    }

    pub fn registry(&self) -> &Arc<OptionRegistry> {
        &self.registry
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OptionInstance> {
        self.options.values()
    }

    pub fn instance(&self, name: &str) -> Option<&OptionInstance> {
        self.options.get(name)
    }

    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.options.get(name).map(OptionInstance::get)
    }

    pub fn handle(&self, name: &str) -> Option<OptionHandle> {
        self.options.get_index_of(name).map(OptionHandle)
    }

    pub fn instance_at(&self, handle: OptionHandle) -> Option<&OptionInstance> {
        self.options.get_index(handle.0).map(|(_, instance)| instance)
    }

    /// Validates and stores `value`. Fails without changing anything.
    pub fn set(
        &mut self,
        name: &str,
        value: impl Into<OptionValue>,
    ) -> Result<Option<TidyEvent>, OptionError> {
        let instance = self
            .options
            .get_mut(name)
            .ok_or_else(|| OptionError::UnknownOption(name.to_string()))?;

        let changed = instance.set(value.into(), &self.registry)?;
        Ok(changed.then(|| {
            tracing::debug!("Option changed: {}", instance.config_string());
            TidyEvent::OptionChanged {
                name: name.to_string(),
            }
        }))
    }

    /// [`set`](Self::set) addressed by handle.
    pub fn set_at(
        &mut self,
        handle: OptionHandle,
        value: impl Into<OptionValue>,
    ) -> Result<Option<TidyEvent>, OptionError> {
        let name = self
            .options
            .get_index(handle.0)
            .map(|(name, _)| name.clone())
            .ok_or_else(|| OptionError::UnknownOption(format!("#{}", handle.0)))?;
        self.set(&name, value)
    }

    pub fn reset_to_default(&mut self, name: &str) -> Result<Option<TidyEvent>, OptionError> {
        let instance = self
            .options
            .get_mut(name)
            .ok_or_else(|| OptionError::UnknownOption(name.to_string()))?;

        Ok(instance.reset_to_default().then(|| TidyEvent::OptionChanged {
            name: name.to_string(),
        }))
    }

    pub fn reset_all_to_default(&mut self) -> Vec<TidyEvent> {
        self.options
            .values_mut()
            .filter_map(|instance| {
                instance.reset_to_default().then(|| TidyEvent::OptionChanged {
                    name: instance.name().to_string(),
                })
            })
            .collect()
    }

    /// Moves an option to its next or previous value: booleans toggle,
    /// integers move by one within bounds, enums and encodings cycle.
    /// String options have no neighbours and are left alone.
    pub fn step(
        &mut self,
        name: &str,
        direction: StepDirection,
    ) -> Result<Option<TidyEvent>, OptionError> {
        let instance = self
            .options
            .get(name)
            .ok_or_else(|| OptionError::UnknownOption(name.to_string()))?;

        match instance.stepped(direction, &self.registry) {
            Some(next) => self.set(name, next),
            None => Ok(None),
        }
    }

    /// Copies values by name from `other`. Names missing on either side,
    /// read-only or unused options, and values that fail validation here are
    /// skipped; failures are logged.
    pub fn copy_values_from(&mut self, other: &OptionSet) -> Vec<TidyEvent> {
        let mut events = Vec::new();
        for source in other.iter() {
            let Some(target) = self.options.get(source.name()) else {
                continue;
            };
            if target.descriptor.read_only || !target.in_use {
                continue;
            }
            match self.set(source.name(), source.get().clone()) {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {}
                Err(e) => tracing::warn!("Skipping option copy for {}: {}", source.name(), e),
            }
        }
        events
    }

    /// Marks exactly `names` as in use. Options leaving use return to their
    /// defaults; unknown names are ignored. Returns the resulting changes.
    pub fn restrict_to<S: AsRef<str>>(&mut self, names: &[S]) -> Vec<TidyEvent> {
        let supported = self.registry.filter_supported(names);
        let mut events = Vec::new();
        for instance in self.options.values_mut() {
            instance.in_use = supported.iter().any(|n| n == instance.name());
            if !instance.in_use && instance.reset_to_default() {
                events.push(TidyEvent::OptionChanged {
                    name: instance.name().to_string(),
                });
            }
        }
        tracing::info!(
            "Options in use restricted to {} of {}",
            supported.len(),
            self.options.len()
        );
        events
    }

    /// Puts every option back in use.
    pub fn use_all(&mut self) {
        for instance in self.options.values_mut() {
            instance.in_use = true;
        }
    }

    pub fn in_use_names(&self) -> Vec<&str> {
        self.iter()
            .filter(|i| i.in_use)
            .map(OptionInstance::name)
            .collect()
    }

    /// Values forwarded to the engine on a run, in registry order.
    pub fn in_use_values(&self) -> Vec<(String, OptionValue)> {
        self.iter()
            .filter(|i| i.in_use)
            .map(|i| (i.name().to_string(), i.value.clone()))
            .collect()
    }

    /// In-use, writable options whose value differs from the default,
    /// ordered by category then name.
    fn non_default_writable(&self) -> Vec<&OptionInstance> {
        let mut selected: Vec<&OptionInstance> = self
            .iter()
            .filter(|i| i.in_use && !i.descriptor.read_only && !i.is_default())
            .collect();
        selected.sort_by(|a, b| {
            (a.descriptor.category, a.name()).cmp(&(b.descriptor.category, b.name()))
        });
        selected
    }

    /// `name: value` lines for every in-use, writable, non-default option.
    pub fn to_config_text(&self) -> String {
        self.non_default_writable()
            .into_iter()
            .map(|i| format!("{}\n", i.config_string()))
            .collect()
    }

    /// [`to_config_text`](Self::to_config_text) with a comment header naming
    /// the document the configuration belongs to.
    pub fn to_config_file(&self, base_name: &str) -> String {
        format!(
            "// Configuration for {}\n// Options at their default values are omitted.\n\n{}",
            base_name,
            self.to_config_text()
        )
    }

    /// Every in-use, writable value as a flat map for a preference store,
    /// keys optionally namespaced with `prefix`.
    pub fn to_persisted_map(&self, prefix: Option<&str>) -> IndexMap<String, String> {
        self.iter()
            .filter(|i| i.in_use && !i.descriptor.read_only)
            .map(|i| {
                (
                    format!("{}{}", prefix.unwrap_or(""), i.name()),
                    i.value.to_string(),
                )
            })
            .collect()
    }

    /// Applies a persisted map through the normal setter. With a prefix,
    /// keys without it belong to someone else and are skipped. Failing
    /// entries are collected, not fatal.
    pub fn from_persisted_map(
        &mut self,
        map: &IndexMap<String, String>,
        prefix: Option<&str>,
    ) -> PersistReport {
        let mut report = PersistReport::default();
        for (key, raw) in map {
            let name = match prefix {
                Some(p) => match key.strip_prefix(p) {
                    Some(name) => name,
                    None => continue,
                },
                None => key.as_str(),
            };

            match self.set(name, OptionValue::String(raw.clone())) {
                Ok(Some(event)) => report.events.push(event),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("Rejected persisted option {}: {}", name, e);
                    report.failures.push((name.to_string(), e));
                }
            }
        }
        report
    }

    /// Parses config text and applies it as a persisted map.
    pub fn apply_config_text(&mut self, text: &str) -> Result<PersistReport, ConfigTextError> {
        let map = parse_config_text(text)?;
        Ok(self.from_persisted_map(&map, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::{EncodingCatalog, EncodingId};
    use crate::engine::{EngineOptionKind, EngineOptionSpec};
    use crate::models::OptionCategory;

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
            description: String::new(),
        }
    }

    fn registry() -> Arc<OptionRegistry> {
        let specs = vec![
            spec("wrap", OptionCategory::PrettyPrint, EngineOptionKind::Integer { min: 0, max: 500 }, "68", false),
            spec(
                "indent",
                OptionCategory::PrettyPrint,
                EngineOptionKind::PickList(vec!["no".into(), "yes".into(), "auto".into()]),
                "no",
                false,
            ),
            spec("quiet", OptionCategory::Diagnostics, EngineOptionKind::Boolean, "no", false),
            spec("alt-text", OptionCategory::Markup, EngineOptionKind::String, "", false),
            spec("doctype-mode", OptionCategory::Markup, EngineOptionKind::String, "auto", true),
            spec("output-encoding", OptionCategory::Encoding, EngineOptionKind::Encoding, "utf8", false),
        ];
        Arc::new(OptionRegistry::from_specs(specs, Arc::new(EncodingCatalog::new())).unwrap())
    }

    #[test]
    fn test_new_set_holds_defaults() {
        let set = OptionSet::new(registry());
        assert_eq!(set.len(), 6);
        assert!(set.iter().all(|i| i.is_default() && i.is_in_use()));
        assert_eq!(set.get("wrap"), Some(&OptionValue::Integer(68)));
    }

    #[test]
    fn test_set_reports_change_once() {
        let mut set = OptionSet::new(registry());

        let event = set.set("wrap", 80).unwrap();
        assert_eq!(event, Some(TidyEvent::OptionChanged { name: "wrap".into() }));

        let again = set.set("wrap", "80").unwrap();
        assert_eq!(again, None);
    }

    #[test]
    fn test_rejections_leave_value_untouched() {
        let mut set = OptionSet::new(registry());

        assert!(matches!(set.set("doctype-mode", "strict"), Err(OptionError::ReadOnly(_))));
        assert!(matches!(set.set("wrap", 9_999), Err(OptionError::OutOfRange { .. })));
        assert!(matches!(set.set("indent", "sometimes"), Err(OptionError::NotInPickList { .. })));
        assert!(matches!(set.set("quiet", "perhaps"), Err(OptionError::TypeMismatch { .. })));
        assert!(matches!(set.set("nope", true), Err(OptionError::UnknownOption(_))));

        assert!(set.iter().all(OptionInstance::is_default));
    }

    #[test]
    fn test_step_cycles_values() {
        let mut set = OptionSet::new(registry());

        set.step("indent", StepDirection::Increment).unwrap();
        assert_eq!(set.get("indent"), Some(&OptionValue::Enum("yes".into())));
        set.step("indent", StepDirection::Decrement).unwrap();
        set.step("indent", StepDirection::Decrement).unwrap();
        assert_eq!(set.get("indent"), Some(&OptionValue::Enum("auto".into())));

        set.step("quiet", StepDirection::Increment).unwrap();
        assert_eq!(set.get("quiet"), Some(&OptionValue::Boolean(true)));

        set.set("wrap", 500).unwrap();
        assert_eq!(set.step("wrap", StepDirection::Increment).unwrap(), None);

        assert_eq!(set.step("alt-text", StepDirection::Increment).unwrap(), None);
        assert!(set.step("doctype-mode", StepDirection::Increment).is_ok());
    }

    #[test]
    fn test_step_encoding_follows_catalog_order() {
        let mut set = OptionSet::new(registry());
        let expected = set
            .registry()
            .catalog()
            .neighbour(EncodingId::Utf8, true)
            .unwrap();

        set.step("output-encoding", StepDirection::Increment).unwrap();
        assert_eq!(set.get("output-encoding"), Some(&OptionValue::Encoding(expected)));
    }

    #[test]
    fn test_restrict_resets_and_blocks_unused() {
        let mut set = OptionSet::new(registry());
        set.set("quiet", true).unwrap();
        set.set("wrap", 90).unwrap();

        let events = set.restrict_to(&["wrap", "indent", "not-an-option"]);
        assert_eq!(events, vec![TidyEvent::OptionChanged { name: "quiet".into() }]);
        assert_eq!(set.in_use_names(), vec!["wrap", "indent"]);
        assert_eq!(set.get("wrap"), Some(&OptionValue::Integer(90)));
        assert!(matches!(set.set("quiet", true), Err(OptionError::NotInUse(_))));

        let forwarded: Vec<String> = set.in_use_values().into_iter().map(|(n, _)| n).collect();
        assert_eq!(forwarded, vec!["wrap".to_string(), "indent".to_string()]);

        set.use_all();
        assert!(set.set("quiet", true).is_ok());
    }

    #[test]
    fn test_config_text_order_and_content() {
        let mut set = OptionSet::new(registry());
        set.set("wrap", 72).unwrap();
        set.set("indent", "auto").unwrap();
        set.set("quiet", "yes").unwrap();
        set.set("alt-text", "image").unwrap();
        set.set("output-encoding", "latin1").unwrap();

        assert_eq!(
            set.to_config_text(),
            "alt-text: image\nquiet: yes\nindent: auto\nwrap: 72\noutput-encoding: latin1\n"
        );
    }

    #[test]
    fn test_config_file_header_parses_back() {
        let mut set = OptionSet::new(registry());
        set.set("wrap", 72).unwrap();

        let text = set.to_config_file("index.html");
        assert!(text.starts_with("// Configuration for index.html"));

        let mut fresh = OptionSet::new(registry());
        let report = fresh.apply_config_text(&text).unwrap();
        assert!(report.is_clean());
        assert_eq!(fresh.get("wrap"), Some(&OptionValue::Integer(72)));
    }

    #[test]
    fn test_from_persisted_map_collects_failures() {
        let mut set = OptionSet::new(registry());
        let mut map = IndexMap::new();
        map.insert("tidy.wrap".to_string(), "100".to_string());
        map.insert("tidy.quiet".to_string(), "loud".to_string());
        map.insert("tidy.bogus".to_string(), "1".to_string());
        map.insert("window.width".to_string(), "800".to_string());

        let report = set.from_persisted_map(&map, Some("tidy."));
        assert_eq!(report.events.len(), 1);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].0, "quiet");
        assert!(matches!(report.failures[1].1, OptionError::UnknownOption(_)));
        assert_eq!(set.get("wrap"), Some(&OptionValue::Integer(100)));
    }

    #[test]
    fn test_persisted_map_skips_read_only() {
        let set = OptionSet::new(registry());
        let map = set.to_persisted_map(Some("tidy."));
        assert_eq!(map.len(), 5);
        assert!(!map.contains_key("tidy.doctype-mode"));
        assert_eq!(map.get("tidy.quiet").map(String::as_str), Some("no"));
    }

    #[test]
    fn test_copy_values_between_sets() {
        let mut source = OptionSet::new(registry());
        source.set("wrap", 120).unwrap();
        source.set("indent", "yes").unwrap();

        let mut target = OptionSet::new(registry());
        target.restrict_to(&["wrap", "quiet"]);
        let events = target.copy_values_from(&source);

        assert_eq!(events, vec![TidyEvent::OptionChanged { name: "wrap".into() }]);
        assert_eq!(target.get("indent"), Some(&OptionValue::Enum("no".into())));
    }

    #[test]
    fn test_reset_all() {
        let mut set = OptionSet::new(registry());
        set.set("wrap", 1).unwrap();
        set.set("quiet", true).unwrap();

        assert_eq!(set.reset_all_to_default().len(), 2);
        assert!(set.iter().all(OptionInstance::is_default));
        assert!(set.reset_all_to_default().is_empty());
    }

    #[test]
    fn test_handles_resolve_instances() {
        let set = OptionSet::new(registry());
        let handle = set.handle("quiet").unwrap();
        assert_eq!(set.instance_at(handle).map(OptionInstance::name), Some("quiet"));
        assert!(set.handle("missing").is_none());
    }

    #[test]
    fn test_parse_config_text() {
        let text = "# comment\n\n// another\nwrap: 80\nindent :  auto  \n";
        let map = parse_config_text(text).unwrap();
        assert_eq!(map.get("wrap").map(String::as_str), Some("80"));
        assert_eq!(map.get("indent").map(String::as_str), Some("auto"));

        let err = parse_config_text("wrap: 80\nthis is not valid\n").unwrap_err();
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_padded_strings_survive_config_text() {
        for value in [" logo ", "\tlogo", "\"quoted\"", "\"", "a \"b\" c"] {
            let mut set = OptionSet::new(registry());
            set.set("alt-text", value).unwrap();

            let text = set.to_config_text();
            let map = parse_config_text(&text).unwrap();
            assert_eq!(map.get("alt-text").map(String::as_str), Some(value), "text: {:?}", text);

            let mut restored = OptionSet::new(registry());
            assert!(restored.apply_config_text(&text).unwrap().is_clean());
            assert_eq!(restored.get("alt-text"), set.get("alt-text"));
        }
    }

    #[test]
    fn test_multi_line_strings_rejected() {
        let mut set = OptionSet::new(registry());
        set.set("alt-text", "logo").unwrap();

        let result = set.set("alt-text", "first\nsecond");
        assert!(matches!(result, Err(OptionError::TypeMismatch { .. })));
        assert_eq!(set.get("alt-text"), Some(&OptionValue::String("logo".into())));
        assert_eq!(set.to_config_text(), "alt-text: logo\n");
    }
}
