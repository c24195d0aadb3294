#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::wildcard_imports,
    clippy::indexing_slicing,
    clippy::panic
)]
//! Integration tests for schema-typed conversion.
//!
//! These tests build a schema generation from the shared test documents and
//! verify that:
//! - parsing then rendering then parsing again is stable
//! - every accepted boolean spelling renders as `true`/`false`
//! - array keys collect every line while scalar keys keep the last one
//! - repeatable sections are always lists, including configured fallbacks

mod common;

use networkd_manager::convert::{ConfigDocument, Entries, Section, Value, to_document, to_text};
use networkd_manager::schema::{ConfigKind, RepeatableSections, SchemaGeneration};

fn repeatable(generation: &SchemaGeneration) -> RepeatableSections {
    generation
        .repeatable
        .merged_with(&["Address".to_string(), "Route".to_string(), "RoutingPolicyRule".to_string()])
}

fn parse(text: &str, kind: ConfigKind) -> ConfigDocument {
    let generation = common::generation();
    to_document(text, &generation.types, &repeatable(&generation), kind).expect("parse")
}

fn render(document: &ConfigDocument, kind: ConfigKind) -> String {
    to_text(document, &common::generation().types, kind).expect("render")
}

fn single<'a>(document: &'a ConfigDocument, section: &str) -> &'a Entries {
    match &document[section] {
        Section::Single(entries) => entries,
        Section::Repeated(_) => panic!("{section} should be a single section"),
    }
}

fn blocks<'a>(document: &'a ConfigDocument, section: &str) -> &'a [Entries] {
    match &document[section] {
        Section::Repeated(blocks) => blocks,
        Section::Single(_) => panic!("{section} should be a repeated section"),
    }
}

const BRIDGE_PORT: &str = "\
[Match]
Name=eth0

[Network]
DHCP=ipv4
DNS=1.1.1.1
DNS=9.9.9.9
DNS=2606:4700:4700::1111
LinkLocalAddressing=no
IPv6AcceptRA=Yes

[Address]
Address=192.168.1.10/24

[Address]
Address=fd00::10/64
PreferredLifetime=0

[Route]
Gateway=192.168.1.1
Metric=100
";

// ---------------------------------------------------------------------------
// Round trip
// ---------------------------------------------------------------------------

/// Rendering a parsed document and parsing it again yields the same document.
#[test]
fn network_round_trip_is_stable() {
    let first = parse(BRIDGE_PORT, ConfigKind::Network);
    let text = render(&first, ConfigKind::Network);
    let second = parse(&text, ConfigKind::Network);
    assert_eq!(first, second);
    assert_eq!(render(&second, ConfigKind::Network), text);
}

/// Rendered text sorts sections and keys and writes one line per element.
#[test]
fn network_renders_canonically() {
    let document = parse(BRIDGE_PORT, ConfigKind::Network);
    insta::assert_snapshot!(render(&document, ConfigKind::Network), @r"
    [Address]
    Address = 192.168.1.10/24

    [Address]
    Address = fd00::10/64
    PreferredLifetime = 0

    [Match]
    Name = eth0

    [Network]
    DHCP = ipv4
    DNS = 1.1.1.1
    DNS = 9.9.9.9
    DNS = 2606:4700:4700::1111
    IPv6AcceptRA = true
    LinkLocalAddressing = false

    [Route]
    Gateway = 192.168.1.1
    Metric = 100
    ");
}

/// A document read from JSON renders the same as one parsed from text.
#[test]
fn json_document_renders() {
    let document: ConfigDocument = serde_json::from_str(
        r#"{
            "NetDev": { "Name": "vlan10", "Kind": "vlan" },
            "VLAN": { "Id": 10 }
        }"#,
    )
    .unwrap();
    let text = render(&document, ConfigKind::NetDev);
    assert_eq!(text, "[NetDev]\nKind = vlan\nName = vlan10\n\n[VLAN]\nId = 10\n");
    assert_eq!(parse(&text, ConfigKind::NetDev), document);
}

// ---------------------------------------------------------------------------
// Typing
// ---------------------------------------------------------------------------

/// All systemd boolean spellings parse and render as `true`/`false`.
#[test]
fn boolean_spellings_normalize() {
    for (spelling, expected) in [
        ("1", true),
        ("yes", true),
        ("TRUE", true),
        ("On", true),
        ("0", false),
        ("no", false),
        ("false", false),
        ("off", false),
        ("garbage", false),
    ] {
        let document = parse(&format!("[Network]\nLinkLocalAddressing={spelling}\n"), ConfigKind::Network);
        assert_eq!(
            single(&document, "Network")["LinkLocalAddressing"],
            Value::Bool(expected),
            "spelling {spelling:?}"
        );
        assert_eq!(
            render(&document, ConfigKind::Network),
            format!("[Network]\nLinkLocalAddressing = {expected}\n")
        );
    }
}

/// Three `DNS=` lines give a three-element list; a repeated scalar keeps the
/// last value.
#[test]
fn arrays_collect_and_scalars_keep_last() {
    let document = parse(BRIDGE_PORT, ConfigKind::Network);
    let network = single(&document, "Network");
    assert_eq!(
        network["DNS"],
        Value::from(vec!["1.1.1.1", "9.9.9.9", "2606:4700:4700::1111"])
    );

    let document = parse("[Network]\nDHCP=yes\nDHCP=no\n", ConfigKind::Network);
    assert_eq!(single(&document, "Network")["DHCP"], Value::from("no"));
}

/// Integer keys coerce, with unparsable values becoming zero.
#[test]
fn integers_coerce() {
    let document = parse("[NetDev]\nMTUBytes=9000\n[VLAN]\nId=ten\n", ConfigKind::NetDev);
    assert_eq!(single(&document, "NetDev")["MTUBytes"], Value::Integer(9000));
    assert_eq!(single(&document, "VLAN")["Id"], Value::Integer(0));
}

/// Keys and sections unknown to the schema pass through as strings.
#[test]
fn unknown_keys_pass_through() {
    let document = parse("[Network]\nFutureOption=42\n[Bogus]\nX=yes\n", ConfigKind::Network);
    assert_eq!(single(&document, "Network")["FutureOption"], Value::from("42"));
    assert_eq!(single(&document, "Bogus")["X"], Value::from("yes"));
}

// ---------------------------------------------------------------------------
// Repeatable sections
// ---------------------------------------------------------------------------

/// Two `[Address]` blocks give a two-element list in file order.
#[test]
fn repeated_address_blocks_form_list() {
    let document = parse(BRIDGE_PORT, ConfigKind::Network);
    let addresses = blocks(&document, "Address");
    assert_eq!(addresses.len(), 2);
    assert_eq!(addresses[0]["Address"], Value::from("192.168.1.10/24"));
    assert_eq!(addresses[1]["PreferredLifetime"], Value::from("0"));
}

/// A single block of a repeatable section is still a list, whether the
/// section is repeatable by schema or by the configured fallback.
#[test]
fn single_repeatable_block_is_list() {
    let document = parse(
        "[Address]\nAddress=10.0.0.2/24\n[RoutingPolicyRule]\nTable=100\n",
        ConfigKind::Network,
    );
    assert_eq!(blocks(&document, "Address").len(), 1);
    assert_eq!(blocks(&document, "RoutingPolicyRule").len(), 1);
}

/// A section outside the repeatable set that appears twice is promoted to a
/// list rather than losing a block.
#[test]
fn unexpected_repeat_is_kept() {
    let document = parse("[Match]\nName=eth0\n[Match]\nName=eth1\n", ConfigKind::Network);
    assert_eq!(blocks(&document, "Match").len(), 2);
}

/// Structurally broken text is reported, not coerced.
#[test]
fn malformed_text_is_error() {
    let generation = common::generation();
    for text in ["[Match\nName=eth0\n", "Name=eth0\n", "[Match]\nName\n", "[]\n"] {
        assert!(
            to_document(text, &generation.types, &repeatable(&generation), ConfigKind::Network).is_err(),
            "{text:?} should not parse"
        );
    }
}
