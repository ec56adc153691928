//! Integration tests for option sets over the engine's option table
//!
//! These tests verify:
//! - set/get coercion and all-or-nothing rejection
//! - reset to defaults
//! - the config text round trip and its idempotence
//! - persisted maps with a namespace prefix

mod common;

use common::FakeEngine;
use proptest::prelude::*;
use tidy_bridge::models::OptionValue;
use tidy_bridge::state::{OptionInstance, OptionSet, parse_config_text};
use tidy_bridge::{EncodingId, OptionError, TidyEvent};

fn fresh_set() -> OptionSet {
    OptionSet::new(common::registry(&FakeEngine::new()))
}

#[test]
fn test_set_then_get_returns_coerced_value() {
    let mut set = fresh_set();

    set.set("indent", "AUTO").unwrap();
    set.set("wrap", " 120 ").unwrap();
    set.set("quiet", "y").unwrap();
    set.set("output-encoding", "ISO-8859-1").unwrap();

    assert_eq!(set.get("indent"), Some(&OptionValue::Enum("auto".into())));
    assert_eq!(set.get("wrap"), Some(&OptionValue::Integer(120)));
    assert_eq!(set.get("quiet"), Some(&OptionValue::Boolean(true)));
    assert_eq!(set.get("output-encoding"), Some(&OptionValue::Encoding(EncodingId::Latin1)));
}

#[test]
fn test_rejections_name_the_rule() {
    let mut set = fresh_set();

    let err = set.set("indent-spaces", 64).unwrap_err();
    assert_eq!(
        err,
        OptionError::OutOfRange {
            name: "indent-spaces".into(),
            value: 64,
            min: 0,
            max: 32
        }
    );
    assert_eq!(err.option_name(), "indent-spaces");
    assert!(err.to_string().contains("0..=32"));

    let err = set.set("doctype", "transitional").unwrap_err();
    assert!(err.to_string().contains("auto, omit, html5, strict, loose"));

    assert!(matches!(set.set("doctype-mode", "html5"), Err(OptionError::ReadOnly(_))));
    assert!(matches!(
        set.set("output-encoding", "klingon"),
        Err(OptionError::NotInPickList { .. })
    ));
}

#[test]
fn test_reset_all_restores_defaults() {
    let mut set = fresh_set();
    set.set("wrap", 0).unwrap();
    set.set("tidy-mark", false).unwrap();
    set.set("alt-text", "picture").unwrap();

    let events = set.reset_all_to_default();
    assert_eq!(events.len(), 3);
    for instance in set.iter() {
        assert_eq!(instance.get(), &instance.descriptor().default_value);
    }
}

#[test]
fn test_config_text_skips_defaults_and_read_only() {
    let mut set = fresh_set();
    assert_eq!(set.to_config_text(), "");

    set.set("wrap", 68).unwrap();
    assert_eq!(set.to_config_text(), "");

    set.set("tidy-mark", "no").unwrap();
    set.set("doctype", "html5").unwrap();
    assert_eq!(set.to_config_text(), "doctype: html5\ntidy-mark: no\n");
}

#[test]
fn test_persisted_map_with_prefix_round_trip() {
    let mut set = fresh_set();
    set.set("indent", "yes").unwrap();
    set.set("char-encoding", "mac").unwrap();

    let map = set.to_persisted_map(Some("tidy."));
    assert!(map.keys().all(|k| k.starts_with("tidy.")));
    assert!(!map.contains_key("tidy.doctype-mode"));

    let mut restored = fresh_set();
    let report = restored.from_persisted_map(&map, Some("tidy."));
    assert!(report.is_clean());
    assert_eq!(report.events.len(), 2);
    assert_eq!(restored.get("char-encoding"), Some(&OptionValue::Encoding(EncodingId::MacRoman)));
}

#[test]
fn test_persisted_failures_do_not_abort() {
    let mut set = fresh_set();
    let map = parse_config_text("wrap: lots\nindent: yes\nfrobnicate: 1\n").unwrap();

    let report = set.from_persisted_map(&map, None);
    assert_eq!(report.events, vec![TidyEvent::OptionChanged { name: "indent".into() }]);
    let failed: Vec<&str> = report.failures.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(failed, vec!["wrap", "frobnicate"]);
}

fn option_edit() -> impl Strategy<Value = (&'static str, String)> {
    prop_oneof![
        (0i64..=10_000).prop_map(|n| ("wrap", n.to_string())),
        (0i64..=32).prop_map(|n| ("indent-spaces", n.to_string())),
        prop::sample::select(vec!["no", "yes", "auto"]).prop_map(|v| ("indent", v.to_string())),
        prop::sample::select(vec!["auto", "omit", "html5", "strict", "loose"])
            .prop_map(|v| ("doctype", v.to_string())),
        any::<bool>().prop_map(|b| ("quiet", b.to_string())),
        any::<bool>().prop_map(|b| ("uppercase-tags", b.to_string())),
        "[ a-z\"\t]{0,12}".prop_map(|s| ("alt-text", s)),
        prop::sample::select(vec!["utf8", "latin1", "win1252", "mac", "ascii", "utf16le"])
            .prop_map(|v| ("output-encoding", v.to_string())),
    ]
}

proptest! {
    #[test]
    fn prop_config_text_round_trip(edits in prop::collection::vec(option_edit(), 0..12)) {
        let mut original = fresh_set();
        for (name, value) in &edits {
            original.set(name, value.as_str()).unwrap();
        }

        let text = original.to_config_text();
        let map = parse_config_text(&text).unwrap();

        let mut restored = fresh_set();
        let first = restored.from_persisted_map(&map, None);
        prop_assert!(first.is_clean());
        for instance in original.iter() {
            prop_assert_eq!(restored.get(instance.name()), Some(instance.get()));
        }

        let second = restored.from_persisted_map(&map, None);
        prop_assert!(second.events.is_empty());
        prop_assert_eq!(restored.to_config_text(), text);
    }

    #[test]
    fn prop_invalid_wrap_leaves_value(current in 0i64..=10_000, bad in 10_001i64..1_000_000) {
        let mut set = fresh_set();
        set.set("wrap", current).unwrap();

        prop_assert!(set.set("wrap", bad).is_err());
        prop_assert!(set.set("wrap", -bad).is_err());
        prop_assert_eq!(set.get("wrap"), Some(&OptionValue::Integer(current)));
    }
}

#[test]
fn test_padded_alt_text_round_trips() {
    let mut original = fresh_set();
    original.set("alt-text", " logo ").unwrap();
    assert_eq!(original.to_config_text(), "alt-text: \" logo \"\n");

    let mut restored = fresh_set();
    let report = restored.apply_config_text(&original.to_config_text()).unwrap();
    assert!(report.is_clean());
    assert_eq!(restored.get("alt-text"), Some(&OptionValue::String(" logo ".into())));
}

#[test]
fn test_line_breaks_rejected_in_strings() {
    let mut set = fresh_set();
    let err = set.set("alt-text", "first\nsecond").unwrap_err();

    assert!(matches!(err, OptionError::TypeMismatch { .. }));
    assert_eq!(err.option_name(), "alt-text");
    assert_eq!(set.to_config_text(), "");
}

#[test]
fn test_instances_report_default_state() {
    let mut set = fresh_set();
    set.set("wrap", 72).unwrap();

    let non_default: Vec<&str> = set
        .iter()
        .filter(|i| !i.is_default())
        .map(OptionInstance::name)
        .collect();
    assert_eq!(non_default, vec!["wrap"]);
    assert_eq!(set.instance("wrap").unwrap().config_string(), "wrap: 72");
}
