//
// Copyright (c) The Nacre Core Contributors
//
// SPDX-License-Identifier: MIT
//

use nacre_datastore::tree::ConfigTree;
use nacre_datastore::validate::{self, AlwaysTrue, Diagnostic};
use nacre_datastore::xml;
use nacre_yang::{LeafType, NodeSpec, SchemaContext};

//
// Helper functions.
//

fn schema() -> SchemaContext {
    let mut ctx = SchemaContext::new();
    let module = ctx
        .add_module("cfg", "urn:example:cfg", Some("2024-01-10"))
        .unwrap();
    let root = ctx.insert(module, None, NodeSpec::container("cfg")).unwrap();
    ctx.insert(module, Some(root), NodeSpec::leaf("x", LeafType::uint8()))
        .unwrap();
    ctx.insert(
        module,
        Some(root),
        NodeSpec::leaf(
            "id",
            LeafType::string_pattern("[a-z]+").unwrap(),
        ),
    )
    .unwrap();
    let server = ctx
        .insert(
            module,
            Some(root),
            NodeSpec::list("server", &["name"])
                .max_elements(2)
                .unique(&["port"]),
        )
        .unwrap();
    ctx.insert(
        module,
        Some(server),
        NodeSpec::leaf("name", LeafType::string()),
    )
    .unwrap();
    ctx.insert(
        module,
        Some(server),
        NodeSpec::leaf("port", LeafType::uint16()).mandatory(),
    )
    .unwrap();
    ctx.insert(
        module,
        Some(root),
        NodeSpec::leaf(
            "default-server",
            LeafType::Leafref {
                path: "/cfg/server/name".to_owned(),
            },
        ),
    )
    .unwrap();
    ctx
}

fn parse(data: &str) -> ConfigTree {
    xml::parse(data.as_bytes()).unwrap()
}

fn check(data: &str) -> Vec<Diagnostic> {
    validate::validate(&parse(data), &schema(), &AlwaysTrue)
}

//
// Tests.
//

#[test]
fn test_valid_tree() {
    let diagnostics = check(
        "<cfg><x>1</x><id>abc</id>\
         <server><name>a</name><port>80</port></server></cfg>",
    );
    assert!(diagnostics.is_empty(), "{diagnostics:?}");
}

#[test]
fn test_empty_tree_is_valid() {
    assert!(check("<cfg></cfg>").is_empty());
}

#[test]
fn test_unknown_element() {
    let diagnostics = check("<cfg><bogus>1</bogus></cfg>");
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].tag, "unknown-element");
    assert_eq!(diagnostics[0].path, "/cfg/bogus");
}

#[test]
fn test_missing_mandatory_leaf() {
    let diagnostics =
        check("<cfg><server><name>a</name></server></cfg>");
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].tag, "operation-failed");
    assert_eq!(diagnostics[0].app_tag.as_deref(), Some("missing-element"));
    assert_eq!(diagnostics[0].path, "/cfg/server[name='a']/port");
}

#[test]
fn test_leaf_range_violation() {
    let diagnostics = check("<cfg><x>300</x></cfg>");
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].tag, "invalid-value");
}

#[test]
fn test_leaf_type_parse_failure() {
    let diagnostics = check("<cfg><x>abc</x></cfg>");
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].tag, "invalid-value");
}

#[test]
fn test_pattern_violation() {
    let diagnostics = check("<cfg><id>ABC123</id></cfg>");
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].tag, "invalid-value");
}

#[test]
fn test_max_elements_violation() {
    let diagnostics = check(
        "<cfg><server><name>a</name><port>1</port></server>\
         <server><name>b</name><port>2</port></server>\
         <server><name>c</name><port>3</port></server></cfg>",
    );
    assert!(
        diagnostics.iter().any(|diagnostic| {
            diagnostic.app_tag.as_deref() == Some("too-many-elements")
        }),
        "{diagnostics:?}"
    );
}

#[test]
fn test_unique_violation_carries_info() {
    let diagnostics = check(
        "<cfg><server><name>a</name><port>80</port></server>\
         <server><name>b</name><port>80</port></server></cfg>",
    );
    let unique = diagnostics
        .iter()
        .find(|diagnostic| {
            diagnostic.app_tag.as_deref() == Some("data-not-unique")
        })
        .expect("expected a data-not-unique diagnostic");
    assert_eq!(unique.info.len(), 2);
    assert!(unique.info.iter().all(|(name, _)| name == "non-unique"));
}

#[test]
fn test_duplicate_list_keys() {
    let diagnostics = check(
        "<cfg><server><name>a</name><port>80</port></server>\
         <server><name>a</name><port>81</port></server></cfg>",
    );
    assert!(
        diagnostics.iter().any(|diagnostic| {
            diagnostic.app_tag.as_deref() == Some("data-not-unique")
        }),
        "{diagnostics:?}"
    );
}

#[test]
fn test_leafref_target_present() {
    let diagnostics = check(
        "<cfg><server><name>a</name><port>80</port></server>\
         <default-server>a</default-server></cfg>",
    );
    assert!(diagnostics.is_empty(), "{diagnostics:?}");
}

#[test]
fn test_leafref_target_missing() {
    let diagnostics = check("<cfg><default-server>zzz</default-server></cfg>");
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].tag, "data-missing");
    assert_eq!(
        diagnostics[0].app_tag.as_deref(),
        Some("instance-required")
    );
}

#[test]
fn test_min_elements_violation() {
    let mut ctx = SchemaContext::new();
    let module = ctx
        .add_module("cfg", "urn:example:cfg", None)
        .unwrap();
    let root = ctx.insert(module, None, NodeSpec::container("cfg")).unwrap();
    ctx.insert(
        module,
        Some(root),
        NodeSpec::leaf_list("dns", LeafType::string()).min_elements(1),
    )
    .unwrap();

    let diagnostics =
        validate::validate(&parse("<cfg></cfg>"), &ctx, &AlwaysTrue);
    assert!(
        diagnostics.iter().any(|diagnostic| {
            diagnostic.app_tag.as_deref() == Some("too-few-elements")
        }),
        "{diagnostics:?}"
    );
}
