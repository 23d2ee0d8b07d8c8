//
// Copyright (c) The Nacre Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Change detection between two configuration trees.
//!
//! The computed changeset decomposes the difference into per-element
//! added/removed/changed records, ordered depth-first following the
//! schema-declared child order. Two trees are equal iff their changeset is
//! empty.

use itertools::Itertools;
use nacre_yang::{SchemaContext, SchemaNode, SchemaNodeKind};
use serde::{Deserialize, Serialize};

use crate::tree::{ConfigTree, NodeId};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOp {
    Added,
    Removed,
    Changed,
}

/// A single element-level difference.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct Change {
    pub op: ChangeOp,
    pub path: String,
}

/// The `{added, removed, changed}` decomposition of source-vs-target.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct ChangeSet {
    changes: Vec<Change>,
}

// ===== impl ChangeSet =====

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Change> {
        self.changes.iter()
    }

    /// Whether any change falls under the given path prefix. Plugins use
    /// this to skip work when their subtree is untouched.
    pub fn touches(&self, prefix: &str) -> bool {
        self.changes
            .iter()
            .any(|change| change.path.starts_with(prefix))
    }

    fn push(&mut self, op: ChangeOp, path: String) {
        self.changes.push(Change { op, path });
    }
}

// ===== global functions =====

/// Computes the changeset that turns `old` into `new`.
pub fn diff(
    old: &ConfigTree,
    new: &ConfigTree,
    ctx: &SchemaContext,
) -> ChangeSet {
    let mut changeset = ChangeSet::default();
    diff_level(
        old,
        old.root_ids(),
        new,
        new.root_ids(),
        ctx,
        None,
        "",
        &mut changeset,
    );
    changeset
}

// ===== helper functions =====

fn diff_level(
    old: &ConfigTree,
    old_children: &[NodeId],
    new: &ConfigTree,
    new_children: &[NodeId],
    ctx: &SchemaContext,
    parent_snode: Option<SchemaNode<'_>>,
    prefix: &str,
    changeset: &mut ChangeSet,
) {
    // Group both sides by element name, visiting names in schema-declared
    // order first and unmodeled names afterwards.
    for name in child_names(old, old_children, new, new_children, ctx, parent_snode)
    {
        let snode = resolve_child(ctx, parent_snode, &name);
        let old_items = identify(old, old_children, &name, ctx, snode);
        let new_items = identify(new, new_children, &name, ctx, snode);

        for (identity, new_id) in &new_items {
            let path =
                format!("{prefix}/{}", segment(new, *new_id, snode));
            match old_items
                .iter()
                .find(|(old_identity, _)| old_identity == identity)
            {
                Some((_, old_id)) => {
                    let old_body = old.node(*old_id).body();
                    let new_body = new.node(*new_id).body();
                    if old_body != new_body {
                        changeset.push(ChangeOp::Changed, path.clone());
                    }
                    diff_level(
                        old,
                        &child_ids(old, *old_id),
                        new,
                        &child_ids(new, *new_id),
                        ctx,
                        snode,
                        &path,
                        changeset,
                    );
                }
                None => {
                    record_subtree(
                        new, *new_id, ctx, snode, prefix, ChangeOp::Added,
                        changeset,
                    );
                }
            }
        }
        for (identity, old_id) in &old_items {
            if !new_items
                .iter()
                .any(|(new_identity, _)| new_identity == identity)
            {
                record_subtree(
                    old, *old_id, ctx, snode, prefix, ChangeOp::Removed,
                    changeset,
                );
            }
        }
    }
}

// Records every element of a subtree as added or removed, depth-first.
fn record_subtree(
    tree: &ConfigTree,
    id: NodeId,
    ctx: &SchemaContext,
    snode: Option<SchemaNode<'_>>,
    prefix: &str,
    op: ChangeOp,
    changeset: &mut ChangeSet,
) {
    let path = format!("{prefix}/{}", segment(tree, id, snode));
    changeset.push(op, path.clone());
    for child in child_ids(tree, id) {
        let child_snode =
            resolve_child(ctx, snode, tree.node(child).name());
        record_subtree(tree, child, ctx, child_snode, &path, op, changeset);
    }
}

// Child element names present on either side, schema-declared order first.
fn child_names(
    old: &ConfigTree,
    old_children: &[NodeId],
    new: &ConfigTree,
    new_children: &[NodeId],
    ctx: &SchemaContext,
    parent_snode: Option<SchemaNode<'_>>,
) -> Vec<String> {
    let mut present: Vec<String> = old_children
        .iter()
        .map(|id| old.node(*id).name().to_owned())
        .chain(new_children.iter().map(|id| new.node(*id).name().to_owned()))
        .collect();
    present.sort();
    present.dedup();

    let mut names = Vec::new();
    if let Some(snode) = parent_snode {
        for child in snode.children() {
            if let Some(pos) =
                present.iter().position(|name| name == child.name())
            {
                names.push(present.remove(pos));
            }
        }
    } else {
        for root in ctx.roots() {
            if let Some(pos) =
                present.iter().position(|name| name == root.name())
            {
                names.push(present.remove(pos));
            }
        }
    }
    names.extend(present);
    names
}

// Pairs each element of the given name with its identity: the key tuple for
// list entries, the body for leaf-list entries, the instance index
// otherwise.
fn identify(
    tree: &ConfigTree,
    children: &[NodeId],
    name: &str,
    ctx: &SchemaContext,
    snode: Option<SchemaNode<'_>>,
) -> Vec<(String, NodeId)> {
    children
        .iter()
        .filter(|id| tree.node(**id).name() == name)
        .enumerate()
        .map(|(index, id)| {
            let identity = match snode.map(|snode| snode.kind()) {
                Some(SchemaNodeKind::List) => snode
                    .unwrap()
                    .keys()
                    .iter()
                    .map(|key| {
                        tree.node(*id).child_body(key).unwrap_or_default()
                    })
                    .join("\u{0}"),
                Some(SchemaNodeKind::LeafList) => {
                    tree.node(*id).body().unwrap_or_default().to_owned()
                }
                _ => index.to_string(),
            };
            (identity, *id)
        })
        .collect()
}

fn resolve_child<'a>(
    ctx: &'a SchemaContext,
    parent_snode: Option<SchemaNode<'a>>,
    name: &str,
) -> Option<SchemaNode<'a>> {
    match parent_snode {
        Some(snode) => snode.find_child(name),
        None => ctx.roots().find(|root| root.name() == name),
    }
}

// Path segment of an element, with key predicates for list entries.
pub(crate) fn segment(
    tree: &ConfigTree,
    id: NodeId,
    snode: Option<SchemaNode<'_>>,
) -> String {
    let node = tree.node(id);
    let mut segment = node.name().to_owned();
    if let Some(snode) = snode
        && snode.kind() == SchemaNodeKind::List
    {
        for key in snode.keys() {
            if let Some(value) = node.child_body(key) {
                segment.push_str(&format!("[{key}='{value}']"));
            }
        }
    }
    segment
}

fn child_ids(tree: &ConfigTree, id: NodeId) -> Vec<NodeId> {
    tree.node(id).children().map(|child| child.id()).collect()
}
