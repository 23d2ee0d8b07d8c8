//
// Copyright (c) The Nacre Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Structural schema validation.
//!
//! Checks a configuration tree against the loaded schema and returns a list
//! of diagnostics whose fields map directly onto RFC 6241 error documents.
//! Validation never mutates the tree or the datastore it came from.

use std::collections::HashMap;

use nacre_yang::{LeafType, SchemaContext, SchemaNode, SchemaNodeKind};

use crate::diff;
use crate::tree::{ConfigTree, NodeId};

/// Seam to the external XPath engine used for `when`/`must` evaluation.
pub trait XPathEvaluator: Send + Sync {
    fn eval_boolean(
        &self,
        tree: &ConfigTree,
        node: NodeId,
        expr: &str,
    ) -> Result<bool, String>;
}

/// Evaluator that satisfies every expression. Used when no XPath engine is
/// wired in.
#[derive(Debug, Default)]
pub struct AlwaysTrue;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Severity {
    Error,
    Warning,
}

/// A single validation finding, carrying the RFC 6241 error fields.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub severity: Severity,
    pub tag: String,
    pub app_tag: Option<String>,
    pub path: String,
    pub message: String,
    pub info: Vec<(String, String)>,
}

// ===== impl XPathEvaluator =====

impl XPathEvaluator for AlwaysTrue {
    fn eval_boolean(
        &self,
        _tree: &ConfigTree,
        _node: NodeId,
        _expr: &str,
    ) -> Result<bool, String> {
        Ok(true)
    }
}

// ===== impl Diagnostic =====

impl Diagnostic {
    fn error(tag: &str, path: &str, message: String) -> Diagnostic {
        Diagnostic {
            severity: Severity::Error,
            tag: tag.to_owned(),
            app_tag: None,
            path: path.to_owned(),
            message,
            info: Vec::new(),
        }
    }

    fn with_app_tag(mut self, app_tag: &str) -> Diagnostic {
        self.app_tag = Some(app_tag.to_owned());
        self
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

// ===== global functions =====

/// Validates a tree against the schema. An empty diagnostic list means the
/// tree is schema-valid.
pub fn validate(
    tree: &ConfigTree,
    ctx: &SchemaContext,
    xpath: &dyn XPathEvaluator,
) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    validate_children(
        tree,
        tree.root_ids(),
        ctx,
        None,
        "",
        xpath,
        &mut diagnostics,
    );
    diagnostics
}

// ===== helper functions =====

fn validate_children(
    tree: &ConfigTree,
    children: &[NodeId],
    ctx: &SchemaContext,
    parent_snode: Option<SchemaNode<'_>>,
    prefix: &str,
    xpath: &dyn XPathEvaluator,
    diagnostics: &mut Vec<Diagnostic>,
) {
    // Presence and cardinality checks are per schema child.
    let schema_children: Vec<SchemaNode<'_>> = match parent_snode {
        Some(snode) => snode.children().collect(),
        None => ctx.roots().collect(),
    };
    for schema_child in &schema_children {
        let instances: Vec<NodeId> = children
            .iter()
            .filter(|id| tree.node(**id).name() == schema_child.name())
            .copied()
            .collect();

        if parent_snode.is_some()
            && schema_child.is_mandatory()
            && instances.is_empty()
        {
            diagnostics.push(
                Diagnostic::error(
                    "operation-failed",
                    &format!("{prefix}/{}", schema_child.name()),
                    format!(
                        "mandatory element '{}' is missing",
                        schema_child.name()
                    ),
                )
                .with_app_tag("missing-element"),
            );
        }

        if matches!(
            schema_child.kind(),
            SchemaNodeKind::List | SchemaNodeKind::LeafList
        ) {
            check_cardinality(&instances, *schema_child, prefix, diagnostics);
        }
        if schema_child.kind() == SchemaNodeKind::List {
            check_duplicates(tree, &instances, *schema_child, prefix, diagnostics);
            check_uniques(tree, &instances, *schema_child, prefix, diagnostics);
        }
    }

    // Per-element checks.
    for id in children {
        let name = tree.node(*id).name();
        let snode = match parent_snode {
            Some(snode) => snode.find_child(name),
            None => ctx.roots().find(|root| root.name() == name),
        };
        validate_node(tree, *id, ctx, snode, prefix, xpath, diagnostics);
    }
}

fn validate_node(
    tree: &ConfigTree,
    id: NodeId,
    ctx: &SchemaContext,
    snode: Option<SchemaNode<'_>>,
    prefix: &str,
    xpath: &dyn XPathEvaluator,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let path = format!("{prefix}/{}", diff::segment(tree, id, snode));

    let Some(snode) = snode else {
        diagnostics.push(Diagnostic::error(
            "unknown-element",
            &path,
            format!("unknown element '{}'", tree.node(id).name()),
        ));
        return;
    };

    if !snode.is_config() {
        diagnostics.push(Diagnostic::error(
            "bad-element",
            &path,
            format!(
                "element '{}' does not represent configuration",
                tree.node(id).name()
            ),
        ));
        return;
    }

    // when/must conditions are delegated to the XPath engine.
    if let Some(when) = snode.when() {
        match xpath.eval_boolean(tree, id, when) {
            Ok(true) => (),
            Ok(false) => diagnostics.push(Diagnostic::error(
                "unknown-element",
                &path,
                format!("when condition '{when}' is not satisfied"),
            )),
            Err(error) => diagnostics.push(Diagnostic::error(
                "operation-failed",
                &path,
                format!("failed to evaluate '{when}': {error}"),
            )),
        }
    }
    for must in snode.musts() {
        match xpath.eval_boolean(tree, id, must) {
            Ok(true) => (),
            Ok(false) => diagnostics.push(
                Diagnostic::error(
                    "operation-failed",
                    &path,
                    format!("must condition '{must}' is not satisfied"),
                )
                .with_app_tag("must-violation"),
            ),
            Err(error) => diagnostics.push(Diagnostic::error(
                "operation-failed",
                &path,
                format!("failed to evaluate '{must}': {error}"),
            )),
        }
    }

    match snode.kind() {
        SchemaNodeKind::Leaf | SchemaNodeKind::LeafList => {
            check_leaf_value(tree, id, snode, &path, diagnostics);
        }
        SchemaNodeKind::Container | SchemaNodeKind::List => {
            if snode.kind() == SchemaNodeKind::List {
                check_keys(tree, id, snode, &path, diagnostics);
            }
            let children: Vec<NodeId> =
                tree.node(id).children().map(|child| child.id()).collect();
            validate_children(
                tree,
                &children,
                ctx,
                Some(snode),
                &path,
                xpath,
                diagnostics,
            );
        }
        // RPC and notification schema nodes never appear in datastores.
        SchemaNodeKind::Rpc | SchemaNodeKind::Notification => {
            diagnostics.push(Diagnostic::error(
                "unknown-element",
                &path,
                format!(
                    "element '{}' is not a data node",
                    tree.node(id).name()
                ),
            ));
        }
    }
}

fn check_leaf_value(
    tree: &ConfigTree,
    id: NodeId,
    snode: SchemaNode<'_>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let value = tree.node(id).body().unwrap_or_default();

    let Some(leaf_type) = snode.leaf_type() else {
        return;
    };
    if let Err(message) = leaf_type.check(value) {
        diagnostics.push(Diagnostic::error(
            "invalid-value",
            path,
            message,
        ));
        return;
    }

    // leafref targets must exist in the same tree.
    if let LeafType::Leafref { path: target } = leaf_type {
        let exists = tree
            .find(target)
            .iter()
            .any(|target_id| {
                tree.node(*target_id).body() == Some(value)
            });
        if !exists {
            diagnostics.push(
                Diagnostic::error(
                    "data-missing",
                    path,
                    format!(
                        "required leafref instance '{value}' is missing"
                    ),
                )
                .with_app_tag("instance-required"),
            );
        }
    }
}

fn check_keys(
    tree: &ConfigTree,
    id: NodeId,
    snode: SchemaNode<'_>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for key in snode.keys() {
        if tree.node(id).child_body(key).is_none() {
            diagnostics.push(
                Diagnostic::error(
                    "operation-failed",
                    &format!("{path}/{key}"),
                    format!("list key '{key}' is missing"),
                )
                .with_app_tag("missing-element"),
            );
        }
    }
}

fn check_cardinality(
    instances: &[NodeId],
    snode: SchemaNode<'_>,
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let count = instances.len() as u32;
    if let Some(min) = snode.min_elements()
        && count < min
    {
        diagnostics.push(
            Diagnostic::error(
                "operation-failed",
                &format!("{prefix}/{}", snode.name()),
                format!(
                    "'{}' requires at least {min} elements, found {count}",
                    snode.name()
                ),
            )
            .with_app_tag("too-few-elements"),
        );
    }
    if let Some(max) = snode.max_elements()
        && count > max
    {
        diagnostics.push(
            Diagnostic::error(
                "operation-failed",
                &format!("{prefix}/{}", snode.name()),
                format!(
                    "'{}' allows at most {max} elements, found {count}",
                    snode.name()
                ),
            )
            .with_app_tag("too-many-elements"),
        );
    }
}

// Two list entries must not share the same key tuple.
fn check_duplicates(
    tree: &ConfigTree,
    instances: &[NodeId],
    snode: SchemaNode<'_>,
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let mut seen: HashMap<Vec<String>, NodeId> = HashMap::new();
    for id in instances {
        let tuple: Vec<String> = snode
            .keys()
            .iter()
            .map(|key| {
                tree.node(*id).child_body(key).unwrap_or_default().to_owned()
            })
            .collect();
        if seen.insert(tuple, *id).is_some() {
            let path = format!(
                "{prefix}/{}",
                diff::segment(tree, *id, Some(snode))
            );
            diagnostics.push(
                Diagnostic::error(
                    "operation-failed",
                    &path,
                    "duplicate list entry".to_owned(),
                )
                .with_app_tag("data-not-unique"),
            );
        }
    }
}

// RFC 7950 `unique' constraints: the tuples of the named descendant leaves
// must be unique across all entries.
fn check_uniques(
    tree: &ConfigTree,
    instances: &[NodeId],
    snode: SchemaNode<'_>,
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for unique in snode.uniques() {
        let mut seen: HashMap<Vec<String>, NodeId> = HashMap::new();
        for id in instances {
            let tuple: Vec<String> = unique
                .iter()
                .map(|leaf| {
                    tree.node(*id)
                        .child_body(leaf)
                        .unwrap_or_default()
                        .to_owned()
                })
                .collect();
            if let Some(first) = seen.insert(tuple, *id) {
                let path = format!(
                    "{prefix}/{}",
                    diff::segment(tree, *id, Some(snode))
                );
                let first_path = format!(
                    "{prefix}/{}",
                    diff::segment(tree, first, Some(snode))
                );
                let mut diagnostic = Diagnostic::error(
                    "operation-failed",
                    &path,
                    format!(
                        "unique constraint '{}' is violated",
                        unique.join(" ")
                    ),
                )
                .with_app_tag("data-not-unique");
                diagnostic
                    .info
                    .push(("non-unique".to_owned(), first_path));
                diagnostic.info.push(("non-unique".to_owned(), path));
                diagnostics.push(diagnostic);
            }
        }
    }
}
