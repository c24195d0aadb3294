//! Schema-typed conversion between configuration text and [`ConfigDocument`].
//!
//! Parsing groups repeated keys and repeated sections, then coerces each
//! key's values according to the [`TypeIndex`]:
//!
//! | type          | result                                 |
//! |---------------|----------------------------------------|
//! | bool + array  | every value as a boolean, in order     |
//! | bool          | last value as a boolean                |
//! | int + array   | every value as an integer, in order    |
//! | int           | last value as an integer               |
//! | array         | every value as a string, in order      |
//! | (none)        | last value as a string                 |
//!
//! Rendering sorts sections and keys and writes one line per list element
//! and one block per repeated section.
pub mod value;

use std::collections::btree_map::Entry;

use crate::config::ini::{self, RawSection};
use crate::error::ParseError;
use crate::schema::{ConfigKind, RepeatableSections, TypeIndex, TypeInfo};

pub use value::{ConfigDocument, Entries, Section, Value};

/// Parse configuration text into a document.
///
/// # Errors
///
/// Returns a [`ParseError`] for structurally unreadable text: an
/// unterminated or empty header, an entry before the first header, or a line
/// without `=`. Value irregularities are coerced, never reported.
///
/// # Examples
///
/// ```
/// use networkd_manager::convert::{Section, Value, to_document};
/// use networkd_manager::schema::{ConfigKind, RepeatableSections, TypeIndex};
///
/// let doc = to_document(
///     "[Match]\nName=eth0\n",
///     &TypeIndex::default(),
///     &RepeatableSections::default(),
///     ConfigKind::Network,
/// )
/// .unwrap();
/// let Section::Single(entries) = &doc["Match"] else { panic!() };
/// assert_eq!(entries["Name"], Value::from("eth0"));
/// ```
pub fn to_document(
    text: &str,
    types: &TypeIndex,
    repeatable: &RepeatableSections,
    kind: ConfigKind,
) -> Result<ConfigDocument, ParseError> {
    let mut document = ConfigDocument::new();
    for raw in ini::parse_sections_from_str(text)? {
        let entries = typed_entries(&raw, types, kind);
        match document.entry(raw.name) {
            Entry::Occupied(mut slot) => slot.get_mut().push(entries),
            Entry::Vacant(slot) => {
                let section = if repeatable.contains(kind, slot.key()) {
                    Section::Repeated(vec![entries])
                } else {
                    Section::Single(entries)
                };
                slot.insert(section);
            }
        }
    }
    Ok(document)
}

/// Render a document as configuration text.
///
/// Strings stored under a bool-typed key are normalized to `true`/`false`.
///
/// # Errors
///
/// Returns [`ParseError::Unrenderable`] if a section name, key or value
/// would not read back as written, e.g. a value with an embedded newline.
pub fn to_text(
    document: &ConfigDocument,
    types: &TypeIndex,
    kind: ConfigKind,
) -> Result<String, ParseError> {
    let mut sections = Vec::new();
    for (name, section) in document {
        for block in section.blocks() {
            let mut raw = RawSection::new(name.clone());
            for (key, value) in block {
                let info = types.lookup(kind, name, key);
                render_value(value, info, &mut |line| {
                    raw.entries.push((key.clone(), line));
                });
            }
            sections.push(raw);
        }
    }
    ini::render_sections(&sections)
}

/// Case-insensitive systemd boolean: `1`, `yes`, `true` and `on` are true.
#[must_use]
pub fn parse_bool(text: &str) -> bool {
    ["1", "yes", "true", "on"]
        .iter()
        .any(|t| text.trim().eq_ignore_ascii_case(t))
}

/// Decimal integer, `0` when unparsable.
#[must_use]
pub fn parse_int(text: &str) -> i64 {
    text.trim().parse().unwrap_or(0)
}

/// Coerce every key of one raw section according to its type.
fn typed_entries(raw: &RawSection, types: &TypeIndex, kind: ConfigKind) -> Entries {
    raw.grouped()
        .into_iter()
        .filter_map(|(key, values)| {
            let info = types.lookup(kind, &raw.name, key);
            typed_value(info, &values).map(|value| (key.to_string(), value))
        })
        .collect()
}

fn typed_value(info: TypeInfo, values: &[&str]) -> Option<Value> {
    let coerce = |text: &str| -> Value {
        if info.is_bool {
            Value::Bool(parse_bool(text))
        } else if info.is_int {
            Value::Integer(parse_int(text))
        } else {
            Value::from(text)
        }
    };
    if info.is_array {
        Some(Value::List(values.iter().map(|v| coerce(v)).collect()))
    } else {
        values.last().map(|v| coerce(v))
    }
}

/// Emit the rendered line(s) for one value.
fn render_value(value: &Value, info: TypeInfo, emit: &mut impl FnMut(String)) {
    match value {
        Value::List(items) => {
            for item in items {
                render_value(item, info, emit);
            }
        }
        Value::String(s) if info.is_bool => emit(parse_bool(s).to_string()),
        scalar => emit(scalar.to_string()),
    }
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};

    fn types() -> TypeIndex {
        let info = |is_array, is_bool, is_int| TypeInfo {
            is_array,
            is_bool,
            is_int,
        };
        let mut index = TypeIndex::default();
        index.insert(
            ConfigKind::Network,
            BTreeMap::from([
                (
                    "Network".to_string(),
                    BTreeMap::from([
                        ("DNS".to_string(), info(true, false, false)),
                        ("IPv6AcceptRA".to_string(), info(false, true, false)),
                        ("IPv6HopLimit".to_string(), info(false, false, true)),
                        ("VRFTable".to_string(), info(true, false, true)),
                        ("Flags".to_string(), info(true, true, false)),
                    ]),
                ),
                (
                    "Route".to_string(),
                    BTreeMap::from([("Metric".to_string(), info(false, false, true))]),
                ),
            ]),
        );
        index
    }

    fn repeatable() -> RepeatableSections {
        let mut sections = RepeatableSections::default();
        sections.insert(
            ConfigKind::Network,
            BTreeSet::from(["Address".to_string(), "Route".to_string()]),
        );
        sections
    }

    fn parse(text: &str) -> ConfigDocument {
        to_document(text, &types(), &repeatable(), ConfigKind::Network).expect("parse")
    }

    fn single<'a>(doc: &'a ConfigDocument, section: &str) -> &'a Entries {
        match &doc[section] {
            Section::Single(entries) => entries,
            Section::Repeated(_) => panic!("{section} should be single"),
        }
    }

    // -----------------------------------------------------------------------
    // to_document
    // -----------------------------------------------------------------------

    #[test]
    fn array_key_collects_all_values_in_order() {
        let doc = parse("[Network]\nDNS=1.1.1.1\nDNS=8.8.8.8\nDNS=9.9.9.9\n");
        assert_eq!(
            single(&doc, "Network")["DNS"],
            Value::from(vec!["1.1.1.1", "8.8.8.8", "9.9.9.9"])
        );
    }

    #[test]
    fn scalar_key_last_value_wins() {
        let doc = parse("[Network]\nDHCP=no\nDHCP=yes\n");
        assert_eq!(single(&doc, "Network")["DHCP"], Value::from("yes"));
    }

    #[test]
    fn bool_key_accepts_systemd_spellings() {
        for (text, expected) in [
            ("1", true),
            ("yes", true),
            ("TRUE", true),
            ("On", true),
            ("0", false),
            ("no", false),
            ("off", false),
            ("maybe", false),
        ] {
            let doc = parse(&format!("[Network]\nIPv6AcceptRA={text}\n"));
            assert_eq!(
                single(&doc, "Network")["IPv6AcceptRA"],
                Value::Bool(expected),
                "spelling {text}"
            );
        }
    }

    #[test]
    fn int_keys_coerce_with_zero_fallback() {
        let doc = parse(
            "[Network]\nIPv6HopLimit=64\nVRFTable=10\nVRFTable=abc\nVRFTable=-3\n",
        );
        let network = single(&doc, "Network");
        assert_eq!(network["IPv6HopLimit"], Value::Integer(64));
        assert_eq!(network["VRFTable"], Value::from(vec![10_i64, 0, -3]));
    }

    #[test]
    fn bool_array_key_parses_every_value() {
        let doc = parse("[Network]\nFlags=yes\nFlags=off\n");
        assert_eq!(single(&doc, "Network")["Flags"], Value::from(vec![true, false]));
    }

    #[test]
    fn repeated_sections_become_list() {
        let doc = parse("[Address]\nAddress=10.0.0.1/24\n\n[Address]\nAddress=10.0.1.1/24\n");
        let Section::Repeated(blocks) = &doc["Address"] else {
            panic!("Address should be repeated");
        };
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1]["Address"], Value::from("10.0.1.1/24"));
    }

    #[test]
    fn single_block_of_repeatable_section_is_list() {
        let doc = parse("[Route]\nGateway=10.0.0.1\nMetric=100\n");
        let Section::Repeated(blocks) = &doc["Route"] else {
            panic!("Route should be repeated");
        };
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0]["Metric"], Value::Integer(100));
    }

    #[test]
    fn duplicate_non_repeatable_section_is_promoted() {
        let doc = parse("[Match]\nName=eth0\n[Match]\nName=eth1\n[Match]\nName=eth2\n");
        assert_eq!(doc["Match"].blocks().len(), 3);
        assert_eq!(doc["Match"].blocks()[2]["Name"], Value::from("eth2"));
    }

    #[test]
    fn unknown_sections_pass_through_as_strings() {
        let doc = parse("[Bogus]\nFlag=yes\nCount=5\n");
        let bogus = single(&doc, "Bogus");
        assert_eq!(bogus["Flag"], Value::from("yes"));
        assert_eq!(bogus["Count"], Value::from("5"));
    }

    #[test]
    fn structural_errors_carry_line_numbers() {
        let err = to_document(
            "[Match]\nName=eth0\nbroken line\n",
            &types(),
            &repeatable(),
            ConfigKind::Network,
        )
        .unwrap_err();
        assert!(matches!(err, ParseError::MissingSeparator { line: 3, .. }));
    }

    // -----------------------------------------------------------------------
    // to_text
    // -----------------------------------------------------------------------

    #[test]
    fn renders_sorted_blocks() {
        let doc = parse(
            "[Network]\nIPv6AcceptRA=yes\nDNS=9.9.9.9\nDNS=1.1.1.1\n\n[Match]\nName=eth0\n\n[Address]\nAddress=10.0.0.1/24\n[Address]\nAddress=10.0.1.1/24\n",
        );
        let text = to_text(&doc, &types(), ConfigKind::Network).unwrap();
        insta::assert_snapshot!(text, @r"
[Address]
Address = 10.0.0.1/24

[Address]
Address = 10.0.1.1/24

[Match]
Name = eth0

[Network]
DNS = 9.9.9.9
DNS = 1.1.1.1
IPv6AcceptRA = true
");
    }

    #[test]
    fn string_under_bool_key_is_canonicalized() {
        let mut doc = ConfigDocument::new();
        doc.insert(
            "Network".to_string(),
            Section::Single(Entries::from([
                ("IPv6AcceptRA".to_string(), Value::from("on")),
                ("Flags".to_string(), Value::from(vec!["NO", "1"])),
                ("Description".to_string(), Value::from("yes")),
            ])),
        );
        assert_eq!(
            to_text(&doc, &types(), ConfigKind::Network).unwrap(),
            "[Network]\nDescription = yes\nFlags = false\nFlags = true\nIPv6AcceptRA = true\n"
        );
    }

    #[test]
    fn values_cannot_inject_sections() {
        let mut doc = ConfigDocument::new();
        doc.insert(
            "Network".to_string(),
            Section::Single(Entries::from([(
                "Description".to_string(),
                Value::from("uplink\n[Route]\nGateway=6.6.6.6"),
            )])),
        );
        let err = to_text(&doc, &types(), ConfigKind::Network).unwrap_err();
        assert!(matches!(err, ParseError::Unrenderable { ref section, .. } if section == "Network"));
    }

    #[test]
    fn list_element_with_trailing_backslash_is_rejected() {
        let mut doc = ConfigDocument::new();
        doc.insert(
            "Network".to_string(),
            Section::Single(Entries::from([
                ("DNS".to_string(), Value::from(vec!["1.1.1.1", "ends\\"])),
                ("IPv6HopLimit".to_string(), Value::Integer(64)),
            ])),
        );
        assert!(to_text(&doc, &types(), ConfigKind::Network).is_err());
    }

    #[test]
    fn keys_with_separators_are_rejected() {
        let mut doc = ConfigDocument::new();
        doc.insert(
            "Network".to_string(),
            Section::Single(Entries::from([("DNS=8.8.8.8\nX".to_string(), Value::from("y"))])),
        );
        assert!(to_text(&doc, &types(), ConfigKind::Network).is_err());
    }

    #[test]
    fn empty_document_renders_empty() {
        assert_eq!(to_text(&ConfigDocument::new(), &types(), ConfigKind::Network).unwrap(), "");
    }

    // -----------------------------------------------------------------------
    // Round trip
    // -----------------------------------------------------------------------

    #[test]
    fn round_trip_preserves_typed_document() {
        let doc = parse(
            "[Match]\nName=eth0\n[Network]\nDNS=1.1.1.1\nDNS=8.8.8.8\nIPv6AcceptRA=no\nIPv6HopLimit=64\nVRFTable=1\n[Route]\nGateway=10.0.0.1\nMetric=100\n[Route]\nGateway=10.0.1.1\n",
        );
        let text = to_text(&doc, &types(), ConfigKind::Network).unwrap();
        assert_eq!(parse(&text), doc);
    }

    #[test]
    fn round_trip_normalizes_single_repeatable_section() {
        let mut doc = ConfigDocument::new();
        doc.insert(
            "Address".to_string(),
            Section::Single(Entries::from([(
                "Address".to_string(),
                Value::from("10.0.0.1/24"),
            )])),
        );
        let reparsed = parse(&to_text(&doc, &types(), ConfigKind::Network).unwrap());
        assert_eq!(reparsed["Address"].blocks(), doc["Address"].blocks());
        assert!(matches!(reparsed["Address"], Section::Repeated(_)));
    }

    #[test]
    fn bool_rendering_is_idempotent() {
        for spelling in ["1", "yes", "true", "on", "0", "no", "false", "off"] {
            let first = to_text(
                &parse(&format!("[Network]\nIPv6AcceptRA={spelling}\n")),
                &types(),
                ConfigKind::Network,
            )
            .unwrap();
            let second = to_text(&parse(&first), &types(), ConfigKind::Network).unwrap();
            assert_eq!(first, second);
            assert!(first.ends_with("= true\n") || first.ends_with("= false\n"));
        }
    }

    // -----------------------------------------------------------------------
    // Value helpers
    // -----------------------------------------------------------------------

    #[test]
    fn parse_helpers() {
        assert!(parse_bool(" YES "));
        assert!(!parse_bool(""));
        assert_eq!(parse_int(" 42 "), 42);
        assert_eq!(parse_int("+7"), 7);
        assert_eq!(parse_int("1k"), 0);
    }
}
