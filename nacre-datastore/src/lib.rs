//
// Copyright (c) The Nacre Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Configuration datastores.
//!
//! The building blocks of the transactional backend: an arena-allocated
//! configuration tree, its XML persisted form, RFC 6241 merge semantics,
//! source-vs-target change detection, structural schema validation, and the
//! named-datastore registry with copy/lock/cache semantics.

pub mod diff;
pub mod merge;
pub mod registry;
pub mod tree;
pub mod validate;
pub mod xml;

pub use diff::{Change, ChangeOp, ChangeSet};
pub use registry::{DatastoreName, DatastoreRegistry, LockRecord};
pub use tree::{ConfigTree, NodeId, NodeRef};
