//
// Copyright (c) The Nacre Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! XML persisted form of configuration trees.

use std::io::Cursor;

use xml::reader::{EventReader, ParserConfig, XmlEvent as ReaderEvent};
use xml::writer::{EmitterConfig, XmlEvent as WriterEvent};

use crate::tree::{ConfigTree, NodeId, NodeRef};

// Wrapper element of persisted datastore files.
const DATASTORE_WRAPPER: &str = "config";

// Parse errors.
#[derive(Debug)]
pub enum ParseError {
    Xml(xml::reader::Error),
    UnexpectedEnd,
}

// Serialization errors.
#[derive(Debug)]
pub enum WriteError {
    Xml(xml::writer::Error),
}

// ===== global functions =====

/// Parses an XML document into a configuration tree.
pub fn parse(data: &[u8]) -> Result<ConfigTree, ParseError> {
    let config = ParserConfig::new()
        .trim_whitespace(true)
        .ignore_comments(true)
        .cdata_to_characters(true);
    let reader = EventReader::new_with_config(Cursor::new(data), config);

    let mut tree = ConfigTree::new();
    let mut stack: Vec<NodeId> = Vec::new();

    for event in reader {
        match event.map_err(ParseError::Xml)? {
            ReaderEvent::StartElement {
                name, attributes, ..
            } => {
                let id = tree.add(stack.last().copied(), &name.local_name);
                tree.set_namespace_raw(id, name.namespace);
                for attr in attributes {
                    tree.set_attr(id, &attr.name.local_name, &attr.value);
                }
                stack.push(id);
            }
            ReaderEvent::Characters(text) => {
                // Entity references split the body into multiple events.
                if let Some(id) = stack.last() {
                    tree.append_body(*id, &text);
                }
            }
            ReaderEvent::EndElement { .. } => {
                if stack.pop().is_none() {
                    return Err(ParseError::UnexpectedEnd);
                }
            }
            _ => (),
        }
    }

    Ok(tree)
}

/// Serializes a tree as an XML document. With `pretty` enabled the output
/// is indented for human consumption.
pub fn serialize(
    tree: &ConfigTree,
    pretty: bool,
) -> Result<Vec<u8>, WriteError> {
    let mut output = Vec::new();
    let mut writer = emitter_config(pretty).create_writer(&mut output);
    for root in tree.roots() {
        write_subtree(&mut writer, root, None).map_err(WriteError::Xml)?;
    }
    Ok(output)
}

/// Parses a persisted datastore file. The on-disk form wraps the tree's
/// root elements in a `<config>` element; empty files denote an empty
/// datastore.
pub fn parse_datastore(data: &[u8]) -> Result<ConfigTree, ParseError> {
    if data.iter().all(|byte| byte.is_ascii_whitespace()) {
        return Ok(ConfigTree::new());
    }

    let document = parse(data)?;
    let wrapped = match document.roots().next() {
        Some(root) => root.name() == DATASTORE_WRAPPER && document.root_ids().len() == 1,
        None => false,
    };
    if wrapped {
        let root = document.roots().next().unwrap();
        let mut tree = ConfigTree::new();
        for child in root.children() {
            tree.import(None, &document, child.id());
        }
        Ok(tree)
    } else {
        Ok(document)
    }
}

/// Serializes a tree into the persisted datastore form.
pub fn serialize_datastore(
    tree: &ConfigTree,
    pretty: bool,
) -> Result<Vec<u8>, WriteError> {
    let mut output = Vec::new();
    let mut writer = emitter_config(pretty).create_writer(&mut output);
    writer
        .write(WriterEvent::start_element(DATASTORE_WRAPPER))
        .map_err(WriteError::Xml)?;
    for root in tree.roots() {
        write_subtree(&mut writer, root, None).map_err(WriteError::Xml)?;
    }
    writer
        .write(WriterEvent::end_element())
        .map_err(WriteError::Xml)?;
    Ok(output)
}

// ===== helper functions =====

fn emitter_config(pretty: bool) -> EmitterConfig {
    EmitterConfig::new()
        .perform_indent(pretty)
        .write_document_declaration(false)
}

fn write_subtree<W: std::io::Write>(
    writer: &mut xml::writer::EventWriter<W>,
    node: NodeRef<'_>,
    inherited_ns: Option<&str>,
) -> xml::writer::Result<()> {
    let mut start = WriterEvent::start_element(node.name());
    if node.namespace() != inherited_ns
        && let Some(namespace) = node.namespace()
    {
        start = start.default_ns(namespace);
    }
    for (name, value) in node.attrs() {
        start = start.attr(name, value);
    }
    writer.write(start)?;

    if let Some(body) = node.body() {
        writer.write(WriterEvent::characters(body))?;
    }
    for child in node.children() {
        write_subtree(writer, child, node.namespace())?;
    }

    writer.write(WriterEvent::end_element())
}

// ===== impl ParseError =====

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::Xml(error) => {
                write!(f, "malformed XML: {error}")
            }
            ParseError::UnexpectedEnd => {
                write!(f, "malformed XML: unexpected end of element")
            }
        }
    }
}

impl std::error::Error for ParseError {}

// ===== impl WriteError =====

impl std::fmt::Display for WriteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteError::Xml(error) => {
                write!(f, "failed to serialize XML: {error}")
            }
        }
    }
}

impl std::error::Error for WriteError {}
