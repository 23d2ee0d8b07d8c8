//
// Copyright (c) The Nacre Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Schema oracle for the configuration backend.
//!
//! The YANG text parser is an external collaborator: modules reach the
//! context either programmatically (plugins, tests) or through a
//! [`SchemaLoader`] implementation backed by a real parser. The context
//! itself only holds the resolved schema: a module table and an arena of
//! schema nodes addressed by integer handles.

use std::path::{Path, PathBuf};

use enum_as_inner::EnumAsInner;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Handle to a node in the schema arena.
pub type SchemaNodeId = usize;

/// A loaded schema: modules plus the tree of schema nodes they define.
#[derive(Debug, Default)]
pub struct SchemaContext {
    modules: Vec<Module>,
    nodes: Vec<SchemaNodeData>,
    roots: Vec<SchemaNodeId>,
}

/// A loaded module and its revision state.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Module {
    pub name: String,
    pub namespace: String,
    pub revision: Option<String>,
}

/// Persisted per-module revision state, compared across boots to decide
/// whether upgrade callbacks need to run.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct ModuleState {
    pub name: String,
    pub namespace: String,
    pub revision: Option<String>,
}

/// A module whose revision state differs from the persisted snapshot.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ModuleUpgrade {
    pub name: String,
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SchemaNodeKind {
    Container,
    List,
    Leaf,
    LeafList,
    Rpc,
    Notification,
}

/// Leaf and leaf-list value types.
#[derive(Clone, Debug, EnumAsInner)]
pub enum LeafType {
    String {
        patterns: Vec<Regex>,
        length: Option<(usize, usize)>,
    },
    Int {
        min: i64,
        max: i64,
    },
    Uint {
        min: u64,
        max: u64,
    },
    Boolean,
    Enumeration(Vec<String>),
    Empty,
    Leafref {
        path: String,
    },
    Union(Vec<LeafType>),
}

#[derive(Debug)]
struct SchemaNodeData {
    name: String,
    module: usize,
    kind: SchemaNodeKind,
    parent: Option<SchemaNodeId>,
    children: Vec<SchemaNodeId>,
    config: bool,
    mandatory: bool,
    keys: Vec<String>,
    min_elements: Option<u32>,
    max_elements: Option<u32>,
    uniques: Vec<Vec<String>>,
    default: Option<String>,
    leaf_type: Option<LeafType>,
    when: Option<String>,
    musts: Vec<String>,
}

/// Borrowed view of a schema node.
#[derive(Clone, Copy)]
pub struct SchemaNode<'a> {
    ctx: &'a SchemaContext,
    id: SchemaNodeId,
}

/// Declarative node description consumed by [`SchemaContext::insert`].
#[derive(Debug)]
pub struct NodeSpec {
    name: String,
    kind: SchemaNodeKind,
    config: bool,
    mandatory: bool,
    keys: Vec<String>,
    min_elements: Option<u32>,
    max_elements: Option<u32>,
    uniques: Vec<Vec<String>>,
    default: Option<String>,
    leaf_type: Option<LeafType>,
    when: Option<String>,
    musts: Vec<String>,
}

/// Seam to an external YANG parser. Implementations read module files from
/// the configured search directories and populate the context.
pub trait SchemaLoader: Send {
    fn load(
        &self,
        ctx: &mut SchemaContext,
        search_dirs: &[PathBuf],
        main_file: Option<&Path>,
    ) -> Result<()>;
}

/// Loader that contributes no modules. Used when the schema is provided
/// programmatically.
#[derive(Debug, Default)]
pub struct NullLoader;

// Schema errors.
#[derive(Debug)]
pub enum Error {
    DuplicateModule(String),
    DuplicateNode(String),
    UnknownModule(String),
    InvalidPattern(String, regex::Error),
    Load(String),
}

pub type Result<T> = std::result::Result<T, Error>;

// ===== impl SchemaContext =====

impl SchemaContext {
    pub fn new() -> SchemaContext {
        Default::default()
    }

    /// Registers a module and returns its index.
    pub fn add_module(
        &mut self,
        name: &str,
        namespace: &str,
        revision: Option<&str>,
    ) -> Result<usize> {
        if self.modules.iter().any(|module| module.name == name) {
            return Err(Error::DuplicateModule(name.to_owned()));
        }
        self.modules.push(Module {
            name: name.to_owned(),
            namespace: namespace.to_owned(),
            revision: revision.map(str::to_owned),
        });
        Ok(self.modules.len() - 1)
    }

    /// Inserts a schema node under `parent` (or as a module top-level node).
    pub fn insert(
        &mut self,
        module: usize,
        parent: Option<SchemaNodeId>,
        spec: NodeSpec,
    ) -> Result<SchemaNodeId> {
        if module >= self.modules.len() {
            return Err(Error::UnknownModule(format!("#{module}")));
        }
        let siblings = match parent {
            Some(parent) => &self.nodes[parent].children,
            None => &self.roots,
        };
        if siblings
            .iter()
            .any(|sibling| self.nodes[*sibling].name == spec.name)
        {
            return Err(Error::DuplicateNode(spec.name));
        }

        let id = self.nodes.len();
        self.nodes.push(SchemaNodeData {
            name: spec.name,
            module,
            kind: spec.kind,
            parent,
            children: Vec::new(),
            config: spec.config,
            mandatory: spec.mandatory,
            keys: spec.keys,
            min_elements: spec.min_elements,
            max_elements: spec.max_elements,
            uniques: spec.uniques,
            default: spec.default,
            leaf_type: spec.leaf_type,
            when: spec.when,
            musts: spec.musts,
        });
        match parent {
            Some(parent) => self.nodes[parent].children.push(id),
            None => self.roots.push(id),
        }
        Ok(id)
    }

    pub fn node(&self, id: SchemaNodeId) -> SchemaNode<'_> {
        SchemaNode { ctx: self, id }
    }

    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.iter()
    }

    /// Top-level data nodes of all modules.
    pub fn roots(&self) -> impl Iterator<Item = SchemaNode<'_>> {
        self.roots.iter().map(|id| self.node(*id))
    }

    /// Resolves a slash-separated schema path, e.g. `/cfg/servers/server`.
    /// The first segment may carry a `module:` qualifier. List predicates
    /// (`[name='x']`) are accepted and ignored.
    pub fn find_path(&self, path: &str) -> Option<SchemaNode<'_>> {
        let mut segments = path
            .trim_matches('/')
            .split('/')
            .map(strip_predicates)
            .filter(|segment| !segment.is_empty());

        let first = segments.next()?;
        let (module, name) = match first.split_once(':') {
            Some((module, name)) => (Some(module), name),
            None => (None, first),
        };
        let mut node = self.roots().find(|root| {
            root.name() == name
                && module.is_none_or(|module| root.module().name == module)
        })?;

        for segment in segments {
            let name = segment.split_once(':').map_or(segment, |(_, n)| n);
            node = node.children().find(|child| child.name() == name)?;
        }
        Some(node)
    }

    /// Snapshot of the per-module revision state, persisted across boots.
    pub fn module_state(&self) -> Vec<ModuleState> {
        let mut state = self
            .modules
            .iter()
            .map(|module| ModuleState {
                name: module.name.clone(),
                namespace: module.namespace.clone(),
                revision: module.revision.clone(),
            })
            .collect::<Vec<_>>();
        state.sort_by(|a, b| a.name.cmp(&b.name));
        state
    }
}

// ===== impl SchemaNode =====

impl<'a> SchemaNode<'a> {
    fn data(&self) -> &'a SchemaNodeData {
        &self.ctx.nodes[self.id]
    }

    pub fn id(&self) -> SchemaNodeId {
        self.id
    }

    pub fn name(&self) -> &'a str {
        &self.data().name
    }

    pub fn module(&self) -> &'a Module {
        &self.ctx.modules[self.data().module]
    }

    pub fn kind(&self) -> SchemaNodeKind {
        self.data().kind
    }

    pub fn parent(&self) -> Option<SchemaNode<'a>> {
        self.data().parent.map(|id| self.ctx.node(id))
    }

    pub fn children(&self) -> impl Iterator<Item = SchemaNode<'a>> + use<'a> {
        let ctx = self.ctx;
        self.data().children.iter().map(move |id| ctx.node(*id))
    }

    pub fn find_child(&self, name: &str) -> Option<SchemaNode<'a>> {
        self.children().find(|child| child.name() == name)
    }

    pub fn is_config(&self) -> bool {
        self.data().config
    }

    pub fn is_mandatory(&self) -> bool {
        self.data().mandatory
    }

    /// Key leaf names, in schema key order (lists only).
    pub fn keys(&self) -> &'a [String] {
        &self.data().keys
    }

    pub fn is_list_key(&self) -> bool {
        self.parent().is_some_and(|parent| {
            parent.keys().iter().any(|key| key == self.name())
        })
    }

    pub fn min_elements(&self) -> Option<u32> {
        self.data().min_elements
    }

    pub fn max_elements(&self) -> Option<u32> {
        self.data().max_elements
    }

    pub fn uniques(&self) -> &'a [Vec<String>] {
        &self.data().uniques
    }

    pub fn default_value(&self) -> Option<&'a str> {
        self.data().default.as_deref()
    }

    pub fn leaf_type(&self) -> Option<&'a LeafType> {
        self.data().leaf_type.as_ref()
    }

    pub fn when(&self) -> Option<&'a str> {
        self.data().when.as_deref()
    }

    pub fn musts(&self) -> &'a [String] {
        &self.data().musts
    }

    /// Schema path of this node, e.g. `/cfg:servers/server`.
    pub fn data_path(&self) -> String {
        let mut segments = Vec::new();
        let mut node = Some(*self);
        while let Some(current) = node {
            segments.push(current);
            node = current.parent();
        }
        let mut path = String::new();
        for (pos, node) in segments.iter().rev().enumerate() {
            path.push('/');
            if pos == 0 {
                path.push_str(&node.module().name);
                path.push(':');
            }
            path.push_str(node.name());
        }
        path
    }
}

impl std::fmt::Debug for SchemaNode<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaNode")
            .field("id", &self.id)
            .field("path", &self.data_path())
            .finish()
    }
}

// ===== impl NodeSpec =====

impl NodeSpec {
    fn new(name: &str, kind: SchemaNodeKind) -> NodeSpec {
        NodeSpec {
            name: name.to_owned(),
            kind,
            config: true,
            mandatory: false,
            keys: Vec::new(),
            min_elements: None,
            max_elements: None,
            uniques: Vec::new(),
            default: None,
            leaf_type: None,
            when: None,
            musts: Vec::new(),
        }
    }

    pub fn container(name: &str) -> NodeSpec {
        NodeSpec::new(name, SchemaNodeKind::Container)
    }

    pub fn list(name: &str, keys: &[&str]) -> NodeSpec {
        let mut spec = NodeSpec::new(name, SchemaNodeKind::List);
        spec.keys = keys.iter().map(|key| (*key).to_owned()).collect();
        spec
    }

    pub fn leaf(name: &str, leaf_type: LeafType) -> NodeSpec {
        let mut spec = NodeSpec::new(name, SchemaNodeKind::Leaf);
        spec.leaf_type = Some(leaf_type);
        spec
    }

    pub fn leaf_list(name: &str, leaf_type: LeafType) -> NodeSpec {
        let mut spec = NodeSpec::new(name, SchemaNodeKind::LeafList);
        spec.leaf_type = Some(leaf_type);
        spec
    }

    pub fn rpc(name: &str) -> NodeSpec {
        NodeSpec::new(name, SchemaNodeKind::Rpc)
    }

    pub fn notification(name: &str) -> NodeSpec {
        NodeSpec::new(name, SchemaNodeKind::Notification)
    }

    #[must_use]
    pub fn config(mut self, config: bool) -> NodeSpec {
        self.config = config;
        self
    }

    #[must_use]
    pub fn mandatory(mut self) -> NodeSpec {
        self.mandatory = true;
        self
    }

    #[must_use]
    pub fn default_value(mut self, value: &str) -> NodeSpec {
        self.default = Some(value.to_owned());
        self
    }

    #[must_use]
    pub fn min_elements(mut self, min: u32) -> NodeSpec {
        self.min_elements = Some(min);
        self
    }

    #[must_use]
    pub fn max_elements(mut self, max: u32) -> NodeSpec {
        self.max_elements = Some(max);
        self
    }

    #[must_use]
    pub fn unique(mut self, leaves: &[&str]) -> NodeSpec {
        self.uniques
            .push(leaves.iter().map(|leaf| (*leaf).to_owned()).collect());
        self
    }

    #[must_use]
    pub fn when(mut self, expr: &str) -> NodeSpec {
        self.when = Some(expr.to_owned());
        self
    }

    #[must_use]
    pub fn must(mut self, expr: &str) -> NodeSpec {
        self.musts.push(expr.to_owned());
        self
    }
}

// ===== impl LeafType =====

impl LeafType {
    pub fn string() -> LeafType {
        LeafType::String {
            patterns: Vec::new(),
            length: None,
        }
    }

    pub fn string_pattern(pattern: &str) -> Result<LeafType> {
        let regex = Regex::new(&anchor(pattern)).map_err(|error| {
            Error::InvalidPattern(pattern.to_owned(), error)
        })?;
        Ok(LeafType::String {
            patterns: vec![regex],
            length: None,
        })
    }

    pub fn int(min: i64, max: i64) -> LeafType {
        LeafType::Int { min, max }
    }

    pub fn uint(min: u64, max: u64) -> LeafType {
        LeafType::Uint { min, max }
    }

    pub fn uint8() -> LeafType {
        LeafType::Uint {
            min: 0,
            max: u8::MAX as u64,
        }
    }

    pub fn uint16() -> LeafType {
        LeafType::Uint {
            min: 0,
            max: u16::MAX as u64,
        }
    }

    pub fn uint32() -> LeafType {
        LeafType::Uint {
            min: 0,
            max: u32::MAX as u64,
        }
    }

    /// Checks a scalar body against this type. Returns a description of the
    /// violation, if any.
    pub fn check(&self, value: &str) -> std::result::Result<(), String> {
        match self {
            LeafType::String { patterns, length } => {
                if let Some((min, max)) = length {
                    let len = value.chars().count();
                    if len < *min || len > *max {
                        return Err(format!(
                            "length {len} outside of range {min}..{max}"
                        ));
                    }
                }
                for pattern in patterns {
                    if !pattern.is_match(value) {
                        return Err(format!(
                            "value does not match pattern '{}'",
                            pattern.as_str()
                        ));
                    }
                }
                Ok(())
            }
            LeafType::Int { min, max } => {
                let parsed = value
                    .parse::<i64>()
                    .map_err(|_| format!("'{value}' is not an integer"))?;
                if parsed < *min || parsed > *max {
                    return Err(format!(
                        "value {parsed} outside of range {min}..{max}"
                    ));
                }
                Ok(())
            }
            LeafType::Uint { min, max } => {
                let parsed = value.parse::<u64>().map_err(|_| {
                    format!("'{value}' is not an unsigned integer")
                })?;
                if parsed < *min || parsed > *max {
                    return Err(format!(
                        "value {parsed} outside of range {min}..{max}"
                    ));
                }
                Ok(())
            }
            LeafType::Boolean => match value {
                "true" | "false" => Ok(()),
                _ => Err(format!("'{value}' is not a boolean")),
            },
            LeafType::Enumeration(variants) => {
                if variants.iter().any(|variant| variant == value) {
                    Ok(())
                } else {
                    Err(format!("'{value}' is not a known enum value"))
                }
            }
            LeafType::Empty => {
                if value.is_empty() {
                    Ok(())
                } else {
                    Err("type empty does not take a value".to_owned())
                }
            }
            // Leafref target existence is a reference check, performed by the
            // validator with the whole tree at hand.
            LeafType::Leafref { .. } => Ok(()),
            LeafType::Union(types) => {
                if types.iter().any(|ty| ty.check(value).is_ok()) {
                    Ok(())
                } else {
                    Err(format!("'{value}' does not match any union member"))
                }
            }
        }
    }
}

// ===== impl NullLoader =====

impl SchemaLoader for NullLoader {
    fn load(
        &self,
        _ctx: &mut SchemaContext,
        _search_dirs: &[PathBuf],
        _main_file: Option<&Path>,
    ) -> Result<()> {
        Ok(())
    }
}

// ===== impl Error =====

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::DuplicateModule(name) => {
                write!(f, "module already loaded: {name}")
            }
            Error::DuplicateNode(name) => {
                write!(f, "schema node already defined: {name}")
            }
            Error::UnknownModule(name) => {
                write!(f, "unknown module: {name}")
            }
            Error::InvalidPattern(pattern, error) => {
                write!(f, "invalid pattern '{pattern}': {error}")
            }
            Error::Load(reason) => {
                write!(f, "failed to load schema: {reason}")
            }
        }
    }
}

impl std::error::Error for Error {}

// ===== global functions =====

/// Compares the persisted module state against the backend's loaded state
/// and returns the modules whose revisions differ, in alphabetical order.
pub fn module_state_diff(
    old: &[ModuleState],
    new: &[ModuleState],
) -> Vec<ModuleUpgrade> {
    let mut upgrades = Vec::new();

    for module in new {
        match old.iter().find(|old| old.name == module.name) {
            Some(old) if old.revision == module.revision => (),
            Some(old) => upgrades.push(ModuleUpgrade {
                name: module.name.clone(),
                from: old.revision.clone(),
                to: module.revision.clone(),
            }),
            None => upgrades.push(ModuleUpgrade {
                name: module.name.clone(),
                from: None,
                to: module.revision.clone(),
            }),
        }
    }
    for module in old {
        if !new.iter().any(|new| new.name == module.name) {
            upgrades.push(ModuleUpgrade {
                name: module.name.clone(),
                from: module.revision.clone(),
                to: None,
            });
        }
    }

    upgrades.sort_by(|a, b| a.name.cmp(&b.name));
    upgrades
}

// ===== helper functions =====

fn strip_predicates(segment: &str) -> &str {
    match segment.find('[') {
        Some(pos) => &segment[..pos],
        None => segment,
    }
}

// YANG patterns match the complete value.
fn anchor(pattern: &str) -> String {
    format!("^(?:{pattern})$")
}

// ===== tests =====
