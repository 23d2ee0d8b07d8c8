//
// Copyright (c) The Nacre Core Contributors
//
// SPDX-License-Identifier: MIT
//

use nacre_datastore::diff::{self, ChangeOp};
use nacre_datastore::tree::ConfigTree;
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
    let server = ctx
        .insert(module, Some(root), NodeSpec::list("server", &["name"]))
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
        NodeSpec::leaf("port", LeafType::uint16()),
    )
    .unwrap();
    ctx
}

fn parse(data: &str) -> ConfigTree {
    xml::parse(data.as_bytes()).unwrap()
}

fn changes(old: &str, new: &str) -> Vec<(ChangeOp, String)> {
    let ctx = schema();
    diff::diff(&parse(old), &parse(new), &ctx)
        .iter()
        .map(|change| (change.op, change.path.clone()))
        .collect()
}

//
// Tests.
//

#[test]
fn test_equal_trees_empty_diff() {
    let ctx = schema();
    let tree = "<cfg><x>1</x><server><name>a</name><port>80</port></server></cfg>";
    assert!(diff::diff(&parse(tree), &parse(tree), &ctx).is_empty());
}

#[test]
fn test_changed_leaf() {
    assert_eq!(
        changes("<cfg><x>1</x></cfg>", "<cfg><x>2</x></cfg>"),
        vec![(ChangeOp::Changed, "/cfg/x".to_owned())]
    );
}

#[test]
fn test_added_subtree_expands_per_element() {
    let result = changes(
        "<cfg><x>1</x></cfg>",
        "<cfg><x>1</x><server><name>a</name><port>80</port></server></cfg>",
    );
    assert_eq!(
        result,
        vec![
            (ChangeOp::Added, "/cfg/server[name='a']".to_owned()),
            (ChangeOp::Added, "/cfg/server[name='a']/name".to_owned()),
            (ChangeOp::Added, "/cfg/server[name='a']/port".to_owned()),
        ]
    );
}

#[test]
fn test_removed_subtree() {
    let result = changes(
        "<cfg><server><name>a</name><port>80</port></server></cfg>",
        "<cfg></cfg>",
    );
    assert!(
        result
            .iter()
            .all(|(op, _)| *op == ChangeOp::Removed)
    );
    assert!(
        result
            .iter()
            .any(|(_, path)| path == "/cfg/server[name='a']")
    );
}

#[test]
fn test_list_identity_by_key() {
    // Renaming a key is a remove plus an add, not a change.
    let result = changes(
        "<cfg><server><name>a</name><port>80</port></server></cfg>",
        "<cfg><server><name>b</name><port>80</port></server></cfg>",
    );
    assert!(
        result
            .iter()
            .any(|(op, path)| *op == ChangeOp::Added
                && path == "/cfg/server[name='b']")
    );
    assert!(
        result
            .iter()
            .any(|(op, path)| *op == ChangeOp::Removed
                && path == "/cfg/server[name='a']")
    );
}

#[test]
fn test_changed_list_member_leaf() {
    let result = changes(
        "<cfg><server><name>a</name><port>80</port></server></cfg>",
        "<cfg><server><name>a</name><port>90</port></server></cfg>",
    );
    assert_eq!(
        result,
        vec![(ChangeOp::Changed, "/cfg/server[name='a']/port".to_owned())]
    );
}

#[test]
fn test_schema_declared_ordering() {
    // `x` is declared before `server`, so its change is reported first
    // even though the document order differs.
    let result = changes(
        "<cfg><server><name>a</name><port>80</port></server><x>1</x></cfg>",
        "<cfg><server><name>a</name><port>90</port></server><x>2</x></cfg>",
    );
    assert_eq!(
        result,
        vec![
            (ChangeOp::Changed, "/cfg/x".to_owned()),
            (ChangeOp::Changed, "/cfg/server[name='a']/port".to_owned()),
        ]
    );
}

#[test]
fn test_touches() {
    let ctx = schema();
    let changeset = diff::diff(
        &parse("<cfg><x>1</x></cfg>"),
        &parse("<cfg><x>2</x></cfg>"),
        &ctx,
    );
    assert!(changeset.touches("/cfg"));
    assert!(changeset.touches("/cfg/x"));
    assert!(!changeset.touches("/cfg/server"));
}
