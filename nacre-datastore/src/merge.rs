//
// Copyright (c) The Nacre Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! RFC 6241 configuration merge.
//!
//! Containers and leaves from the source override or extend the
//! destination; list entries are identified by their key tuple and merged
//! element-wise; leaf-list entries behave as a set. A per-element
//! `operation` attribute overrides the inherited default operation.

use nacre_yang::{SchemaContext, SchemaNode, SchemaNodeKind};

use crate::tree::{ConfigTree, NodeId};

// Attribute carrying the RFC 6241 edit operation.
const OPERATION_ATTR: &str = "operation";

/// RFC 6241 edit operations (§7.2).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Operation {
    Merge,
    Replace,
    Create,
    Delete,
    Remove,
    None,
}

// Merge errors.
#[derive(Debug)]
pub enum MergeError {
    DataExists(String),
    DataMissing(String),
    BadOperation(String),
}

// ===== impl Operation =====

impl std::str::FromStr for Operation {
    type Err = ();

    fn from_str(s: &str) -> Result<Operation, ()> {
        match s {
            "merge" => Ok(Operation::Merge),
            "replace" => Ok(Operation::Replace),
            "create" => Ok(Operation::Create),
            "delete" => Ok(Operation::Delete),
            "remove" => Ok(Operation::Remove),
            "none" => Ok(Operation::None),
            _ => Err(()),
        }
    }
}

// ===== impl MergeError =====

impl std::fmt::Display for MergeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MergeError::DataExists(path) => {
                write!(f, "data already exists: {path}")
            }
            MergeError::DataMissing(path) => {
                write!(f, "data is missing: {path}")
            }
            MergeError::BadOperation(operation) => {
                write!(f, "unknown edit operation: {operation}")
            }
        }
    }
}

impl std::error::Error for MergeError {}

// ===== global functions =====

/// Merges `src` into `dst` with the default `merge` operation.
pub fn merge(
    dst: &mut ConfigTree,
    src: &ConfigTree,
    ctx: &SchemaContext,
) -> Result<(), MergeError> {
    merge_with_default(dst, src, ctx, Operation::Merge)
}

/// Merges `src` into `dst` using the given default operation, honoring
/// per-element `operation` attributes.
pub fn merge_with_default(
    dst: &mut ConfigTree,
    src: &ConfigTree,
    ctx: &SchemaContext,
    default_op: Operation,
) -> Result<(), MergeError> {
    for src_root in src.root_ids().to_vec() {
        let snode = ctx
            .roots()
            .find(|snode| snode.name() == src.node(src_root).name());
        merge_node(dst, None, src, src_root, ctx, snode, default_op)?;
    }
    Ok(())
}

// ===== helper functions =====

fn merge_node(
    dst: &mut ConfigTree,
    dst_parent: Option<NodeId>,
    src: &ConfigTree,
    src_id: NodeId,
    ctx: &SchemaContext,
    snode: Option<SchemaNode<'_>>,
    default_op: Operation,
) -> Result<(), MergeError> {
    let operation = match src.node(src_id).attr(OPERATION_ATTR) {
        Some(value) => value
            .parse::<Operation>()
            .map_err(|_| MergeError::BadOperation(value.to_owned()))?,
        None => default_op,
    };
    let existing = find_match(dst, dst_parent, src, src_id, ctx, snode);

    match operation {
        Operation::Merge => match existing {
            Some(dst_id) => {
                if let Some(body) = src.node(src_id).body() {
                    let body = body.to_owned();
                    dst.set_body(dst_id, &body);
                }
                merge_children(
                    dst, dst_id, src, src_id, ctx, snode, operation,
                )?;
            }
            None => {
                copy_subtree(dst, dst_parent, src, src_id);
            }
        },
        Operation::Replace => {
            if let Some(dst_id) = existing {
                dst.remove(dst_id);
            }
            copy_subtree(dst, dst_parent, src, src_id);
        }
        Operation::Create => match existing {
            Some(_) => {
                return Err(MergeError::DataExists(
                    src.node(src_id).path(ctx),
                ));
            }
            None => {
                copy_subtree(dst, dst_parent, src, src_id);
            }
        },
        Operation::Delete => match existing {
            Some(dst_id) => dst.remove(dst_id),
            None => {
                return Err(MergeError::DataMissing(
                    src.node(src_id).path(ctx),
                ));
            }
        },
        Operation::Remove => {
            if let Some(dst_id) = existing {
                dst.remove(dst_id);
            }
        }
        Operation::None => match existing {
            Some(dst_id) => {
                merge_children(
                    dst, dst_id, src, src_id, ctx, snode, operation,
                )?;
            }
            None => {
                if subtree_requires(src, src_id, Operation::Delete) {
                    return Err(MergeError::DataMissing(
                        src.node(src_id).path(ctx),
                    ));
                }
                if subtree_creates(src, src_id) {
                    // Interior elements are instantiated so that deeper
                    // create/merge operations have a place to land.
                    let dst_id =
                        dst.add(dst_parent, src.node(src_id).name());
                    if let Some(namespace) = src.node(src_id).namespace() {
                        let namespace = namespace.to_owned();
                        dst.set_namespace(dst_id, &namespace);
                    }
                    merge_children(
                        dst, dst_id, src, src_id, ctx, snode, operation,
                    )?;
                }
            }
        },
    }

    Ok(())
}

fn merge_children(
    dst: &mut ConfigTree,
    dst_id: NodeId,
    src: &ConfigTree,
    src_id: NodeId,
    ctx: &SchemaContext,
    snode: Option<SchemaNode<'_>>,
    default_op: Operation,
) -> Result<(), MergeError> {
    let children = src
        .node(src_id)
        .children()
        .map(|child| child.id())
        .collect::<Vec<_>>();
    for child in children {
        let child_snode = snode
            .and_then(|snode| snode.find_child(src.node(child).name()));
        merge_node(
            dst,
            Some(dst_id),
            src,
            child,
            ctx,
            child_snode,
            default_op,
        )?;
    }
    Ok(())
}

// Finds the destination element matching a source element: by key tuple for
// list entries, by body for leaf-list entries, by name otherwise.
fn find_match(
    dst: &ConfigTree,
    dst_parent: Option<NodeId>,
    src: &ConfigTree,
    src_id: NodeId,
    ctx: &SchemaContext,
    snode: Option<SchemaNode<'_>>,
) -> Option<NodeId> {
    let src_node = src.node(src_id);
    let candidates: Vec<NodeId> = match dst_parent {
        Some(parent) => dst
            .node(parent)
            .children()
            .filter(|child| child.name() == src_node.name())
            .map(|child| child.id())
            .collect(),
        None => dst
            .roots()
            .filter(|root| root.name() == src_node.name())
            .map(|root| root.id())
            .collect(),
    };

    match snode.map(|snode| snode.kind()) {
        Some(SchemaNodeKind::List) => {
            let keys = snode.unwrap().keys();
            candidates.into_iter().find(|candidate| {
                keys.iter().all(|key| {
                    dst.node(*candidate).child_body(key)
                        == src_node.child_body(key)
                })
            })
        }
        Some(SchemaNodeKind::LeafList) => {
            candidates.into_iter().find(|candidate| {
                dst.node(*candidate).body() == src_node.body()
            })
        }
        _ => candidates.into_iter().next(),
    }
}

// Deep-copies a source subtree, stripping edit operation attributes.
fn copy_subtree(
    dst: &mut ConfigTree,
    dst_parent: Option<NodeId>,
    src: &ConfigTree,
    src_id: NodeId,
) -> NodeId {
    let new_id = dst.import(dst_parent, src, src_id);
    let copied = dst
        .node(new_id)
        .traverse()
        .iter()
        .map(|node| node.id())
        .collect::<Vec<_>>();
    for id in copied {
        dst.remove_attr(id, OPERATION_ATTR);
    }
    new_id
}

fn subtree_requires(
    src: &ConfigTree,
    src_id: NodeId,
    operation: Operation,
) -> bool {
    src.node(src_id).traverse().iter().any(|node| {
        node.attr(OPERATION_ATTR)
            .and_then(|value| value.parse::<Operation>().ok())
            == Some(operation)
    })
}

fn subtree_creates(src: &ConfigTree, src_id: NodeId) -> bool {
    src.node(src_id).traverse().iter().any(|node| {
        matches!(
            node.attr(OPERATION_ATTR)
                .and_then(|value| value.parse::<Operation>().ok()),
            Some(Operation::Create)
                | Some(Operation::Merge)
                | Some(Operation::Replace)
        )
    })
}
