//
// Copyright (c) The Nacre Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;

use nacre_yang::{SchemaContext, SchemaNode, SchemaNodeId, SchemaNodeKind};

/// Handle to an element in the tree arena.
pub type NodeId = usize;

/// An ordered tree of configuration elements.
///
/// Elements live in an arena and refer to each other through integer
/// handles, so parent back-references never form owning cycles. Detached
/// elements stay in the arena as unreachable slots; they are dropped when
/// the tree itself is dropped.
#[derive(Clone, Debug, Default)]
pub struct ConfigTree {
    nodes: Vec<ElementData>,
    roots: Vec<NodeId>,
}

#[derive(Clone, Debug)]
struct ElementData {
    name: String,
    namespace: Option<String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    body: Option<String>,
    attrs: BTreeMap<String, String>,
    snode: Option<SchemaNodeId>,
}

/// Borrowed view of a tree element.
#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
    tree: &'a ConfigTree,
    id: NodeId,
}

// ===== impl ConfigTree =====

impl ConfigTree {
    pub fn new() -> ConfigTree {
        Default::default()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn roots(&self) -> impl Iterator<Item = NodeRef<'_>> {
        self.roots.iter().map(|id| self.node(*id))
    }

    pub fn root_ids(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn node(&self, id: NodeId) -> NodeRef<'_> {
        NodeRef { tree: self, id }
    }

    /// Adds a new element under `parent`, or as a root element.
    pub fn add(&mut self, parent: Option<NodeId>, name: &str) -> NodeId {
        let namespace =
            parent.and_then(|parent| self.nodes[parent].namespace.clone());
        let id = self.nodes.len();
        self.nodes.push(ElementData {
            name: name.to_owned(),
            namespace,
            parent,
            children: Vec::new(),
            body: None,
            attrs: BTreeMap::new(),
            snode: None,
        });
        match parent {
            Some(parent) => self.nodes[parent].children.push(id),
            None => self.roots.push(id),
        }
        id
    }

    /// Adds a new leaf element with a body.
    pub fn add_leaf(
        &mut self,
        parent: Option<NodeId>,
        name: &str,
        body: &str,
    ) -> NodeId {
        let id = self.add(parent, name);
        self.nodes[id].body = Some(body.to_owned());
        id
    }

    /// Detaches an element (and its subtree) from the tree.
    pub fn remove(&mut self, id: NodeId) {
        match self.nodes[id].parent {
            Some(parent) => {
                self.nodes[parent].children.retain(|child| *child != id)
            }
            None => self.roots.retain(|root| *root != id),
        }
        self.nodes[id].parent = None;
    }

    pub fn set_body(&mut self, id: NodeId, body: &str) {
        self.nodes[id].body = Some(body.to_owned());
    }

    pub fn append_body(&mut self, id: NodeId, text: &str) {
        match &mut self.nodes[id].body {
            Some(body) => body.push_str(text),
            None => self.nodes[id].body = Some(text.to_owned()),
        }
    }

    pub fn clear_body(&mut self, id: NodeId) {
        self.nodes[id].body = None;
    }

    pub fn set_namespace(&mut self, id: NodeId, namespace: &str) {
        self.nodes[id].namespace = Some(namespace.to_owned());
    }

    pub(crate) fn set_namespace_raw(
        &mut self,
        id: NodeId,
        namespace: Option<String>,
    ) {
        self.nodes[id].namespace = namespace;
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        self.nodes[id]
            .attrs
            .insert(name.to_owned(), value.to_owned());
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) {
        self.nodes[id].attrs.remove(name);
    }

    /// Deep-copies a subtree from another tree, attaching it under `parent`.
    /// Returns the handle of the copied subtree root.
    pub fn import(
        &mut self,
        parent: Option<NodeId>,
        src: &ConfigTree,
        src_id: NodeId,
    ) -> NodeId {
        let src_node = &src.nodes[src_id];
        let id = self.add(parent, &src_node.name);
        self.nodes[id].namespace = src_node.namespace.clone();
        self.nodes[id].body = src_node.body.clone();
        self.nodes[id].attrs = src_node.attrs.clone();
        self.nodes[id].snode = src_node.snode;
        for child in &src_node.children {
            self.import(Some(id), src, *child);
        }
        id
    }

    /// Deep-copies every root of `src` into this tree.
    pub fn import_all(&mut self, src: &ConfigTree) {
        for root in &src.roots {
            self.import(None, src, *root);
        }
    }

    /// Finds all elements matching a slash-separated path. Path segments may
    /// carry `[name='value']` predicates to select list entries.
    pub fn find(&self, path: &str) -> Vec<NodeId> {
        let segments = path
            .trim_matches('/')
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(parse_segment)
            .collect::<Vec<_>>();
        if segments.is_empty() {
            return Vec::new();
        }

        let mut matches = self.roots.clone();
        for (name, predicates) in &segments[..1] {
            matches.retain(|id| self.segment_matches(*id, name, predicates));
        }
        for (name, predicates) in &segments[1..] {
            matches = matches
                .iter()
                .flat_map(|id| self.nodes[*id].children.iter().copied())
                .filter(|id| self.segment_matches(*id, name, predicates))
                .collect();
        }
        matches
    }

    /// Finds the first element matching a path.
    pub fn find_one(&self, path: &str) -> Option<NodeId> {
        self.find(path).into_iter().next()
    }

    fn segment_matches(
        &self,
        id: NodeId,
        name: &str,
        predicates: &[(String, String)],
    ) -> bool {
        let node = &self.nodes[id];
        let local = name.split_once(':').map_or(name, |(_, local)| local);
        if node.name != local {
            return false;
        }
        predicates.iter().all(|(key, value)| {
            self.node(id)
                .child_body(key)
                .is_some_and(|body| body == value)
        })
    }

    /// Resolves and stores the schema back-reference of every element.
    /// Elements with no corresponding schema node are left unresolved.
    pub fn bind_schema(&mut self, ctx: &SchemaContext) {
        let roots = self.roots.clone();
        for root in roots {
            let snode = ctx
                .roots()
                .find(|snode| snode.name() == self.nodes[root].name)
                .map(|snode| snode.id());
            self.bind_subtree(ctx, root, snode);
        }
    }

    fn bind_subtree(
        &mut self,
        ctx: &SchemaContext,
        id: NodeId,
        snode: Option<SchemaNodeId>,
    ) {
        self.nodes[id].snode = snode;
        let children = self.nodes[id].children.clone();
        for child in children {
            let child_snode = snode.and_then(|snode| {
                ctx.node(snode)
                    .find_child(&self.nodes[child].name)
                    .map(|snode| snode.id())
            });
            self.bind_subtree(ctx, child, child_snode);
        }
    }
}

impl PartialEq for ConfigTree {
    fn eq(&self, other: &ConfigTree) -> bool {
        self.roots.len() == other.roots.len()
            && self
                .roots()
                .zip(other.roots())
                .all(|(a, b)| subtree_eq(a, b))
    }
}

impl Eq for ConfigTree {}

// ===== impl NodeRef =====

impl<'a> NodeRef<'a> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn tree(&self) -> &'a ConfigTree {
        self.tree
    }

    fn data(&self) -> &'a ElementData {
        &self.tree.nodes[self.id]
    }

    pub fn name(&self) -> &'a str {
        &self.data().name
    }

    pub fn namespace(&self) -> Option<&'a str> {
        self.data().namespace.as_deref()
    }

    pub fn body(&self) -> Option<&'a str> {
        self.data().body.as_deref()
    }

    pub fn attr(&self, name: &str) -> Option<&'a str> {
        self.data().attrs.get(name).map(String::as_str)
    }

    pub fn attrs(&self) -> impl Iterator<Item = (&'a str, &'a str)> {
        self.data()
            .attrs
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn parent(&self) -> Option<NodeRef<'a>> {
        self.data().parent.map(|id| self.tree.node(id))
    }

    pub fn children(&self) -> impl Iterator<Item = NodeRef<'a>> {
        let tree = self.tree;
        self.data().children.iter().map(move |id| tree.node(*id))
    }

    pub fn has_children(&self) -> bool {
        !self.data().children.is_empty()
    }

    /// First child with the given name.
    pub fn child(&self, name: &str) -> Option<NodeRef<'a>> {
        self.children().find(|child| child.name() == name)
    }

    /// Body of the first child with the given name.
    pub fn child_body(&self, name: &str) -> Option<&'a str> {
        self.child(name).and_then(|child| child.body())
    }

    pub fn snode_id(&self) -> Option<SchemaNodeId> {
        self.data().snode
    }

    pub fn snode<'b>(
        &self,
        ctx: &'b SchemaContext,
    ) -> Option<SchemaNode<'b>> {
        self.data().snode.map(|id| ctx.node(id))
    }

    /// Value tuple of the key leaves defined by the schema, in key order.
    /// Non-list elements yield an empty tuple.
    pub fn key_tuple(&self, ctx: &SchemaContext) -> Vec<String> {
        match self.snode(ctx) {
            Some(snode) if snode.kind() == SchemaNodeKind::List => snode
                .keys()
                .iter()
                .map(|key| {
                    self.child_body(key).unwrap_or_default().to_owned()
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Data path of this element, with key predicates on list entries when
    /// the schema binding is available.
    pub fn path(&self, ctx: &SchemaContext) -> String {
        let mut segments = Vec::new();
        let mut node = Some(*self);
        while let Some(current) = node {
            segments.push(current);
            node = current.parent();
        }

        let mut path = String::new();
        for node in segments.iter().rev() {
            path.push('/');
            path.push_str(node.name());
            if let Some(snode) = node.snode(ctx)
                && snode.kind() == SchemaNodeKind::List
            {
                for key in snode.keys() {
                    if let Some(value) = node.child_body(key) {
                        path.push_str(&format!("[{key}='{value}']"));
                    }
                }
            }
        }
        path
    }

    /// Depth-first traversal of this subtree, including the element itself.
    pub fn traverse(&self) -> Vec<NodeRef<'a>> {
        let mut nodes = vec![*self];
        let mut pos = 0;
        while pos < nodes.len() {
            let node = nodes[pos];
            nodes.extend(node.children());
            pos += 1;
        }
        nodes
    }
}

impl std::fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRef")
            .field("name", &self.name())
            .field("body", &self.body())
            .finish()
    }
}

// ===== helper functions =====

fn subtree_eq(a: NodeRef<'_>, b: NodeRef<'_>) -> bool {
    a.name() == b.name()
        && a.namespace() == b.namespace()
        && a.body() == b.body()
        && a.attrs().eq(b.attrs())
        && a.children().count() == b.children().count()
        && a.children().zip(b.children()).all(|(a, b)| subtree_eq(a, b))
}

fn parse_segment(segment: &str) -> (String, Vec<(String, String)>) {
    match segment.find('[') {
        None => (segment.to_owned(), Vec::new()),
        Some(pos) => {
            let name = segment[..pos].to_owned();
            let mut predicates = Vec::new();
            for predicate in segment[pos..].split('[') {
                let predicate = predicate.trim_end_matches(']');
                if let Some((key, value)) = predicate.split_once('=') {
                    let value = value.trim_matches('\'').trim_matches('"');
                    predicates.push((key.to_owned(), value.to_owned()));
                }
            }
            (name, predicates)
        }
    }
}
