//! Entry-point extraction
//!
//! Locates the bundle body between the runtime header and the final
//! `_Platform_export(...)` call, and reads the program table passed to that
//! call. The table is parsed on its own so the program nodes can borrow from
//! a small tree instead of the whole bundle.

use std::sync::LazyLock;

use log::debug;
use regex::Regex;
use tree_sitter::{Node, Tree};

use crate::{
    ambient_globals::AmbientGlobals,
    error::{Result, SplitError},
    syntax::{named_children, node_text, parse},
    types::FxIndexSet,
    visitors::ReferenceCollector,
};

/// Marker of the program export call
pub const ENTRY_TABLE_MARKER: &str = "_Platform_export(";

/// Closing text of the bundle IIFE
pub const BUNDLE_TRAILER: &str = "}(this));";

static HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\(function\s*\(\s*scope\s*\)\s*\{\s*['"]use strict['"];"#)
        .expect("header pattern is valid")
});

/// Byte offsets of the bundle regions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BundleLayout {
    /// End of the header; the body starts here
    pub body_start: usize,
    /// Start of the export call; the body ends here
    pub table_start: usize,
    /// Start of the trailer; the export call ends here
    pub table_end: usize,
}

impl BundleLayout {
    /// Find the first header and the last export call in `source`
    pub fn locate(source: &str) -> Result<Self> {
        let header = HEADER.find(source).ok_or(SplitError::MissingHeader)?;
        let table_start =
            source
                .rfind(ENTRY_TABLE_MARKER)
                .ok_or(SplitError::MissingEntryTable {
                    marker: ENTRY_TABLE_MARKER,
                })?;
        if table_start < header.end() {
            return Err(SplitError::MalformedEntryTable {
                reason: "export call precedes the bundle header".to_owned(),
                offset: table_start,
            });
        }
        let table_end = source[table_start..]
            .rfind(BUNDLE_TRAILER)
            .map(|offset| table_start + offset)
            .ok_or_else(|| SplitError::MalformedEntryTable {
                reason: format!("bundle trailer `{BUNDLE_TRAILER}` not found"),
                offset: table_start,
            })?;

        debug!(
            "Bundle layout: body {}..{table_start}, entry table {table_start}..{table_end}",
            header.end()
        );
        Ok(Self {
            body_start: header.end(),
            table_start,
            table_end,
        })
    }

    pub fn body<'s>(&self, source: &'s str) -> &'s str {
        &source[self.body_start..self.table_start]
    }
}

/// One program listed in the entry table
#[derive(Debug, Clone)]
pub struct ProgramNode<'t> {
    /// Dotted program name, e.g. `Page.Home`
    pub name: String,
    /// Initializer expression
    pub init: Node<'t>,
}

/// The parsed `_Platform_export(...)` call
#[derive(Debug)]
pub struct EntryTable {
    text: String,
    offset: usize,
    tree: Tree,
}

impl EntryTable {
    /// Parse the export call located by `layout`
    pub fn parse(source: &str, layout: &BundleLayout) -> Result<Self> {
        let text = source[layout.table_start..layout.table_end].trim_end().to_owned();
        let tree = parse(&text)?;
        if tree.root_node().has_error() {
            return Err(SplitError::MalformedEntryTable {
                reason: "export call does not parse".to_owned(),
                offset: layout.table_start,
            });
        }
        Ok(Self {
            text,
            offset: layout.table_start,
            tree,
        })
    }

    pub fn text_of(&self, node: Node<'_>) -> &str {
        node_text(node, &self.text)
    }

    /// Programs in table order, nested namespaces flattened to dotted names
    pub fn programs(&self) -> Result<Vec<ProgramNode<'_>>> {
        let table = self.table_object()?;
        let mut programs = Vec::new();
        self.collect_programs(table, "", &mut programs)?;
        if programs.is_empty() {
            return Err(self.malformed(table, "no programs in the entry table"));
        }
        Ok(programs)
    }

    /// Free names of a program initializer, ambient globals excluded
    pub fn init_needs(
        &self,
        program: &ProgramNode<'_>,
        ambient: &AmbientGlobals,
    ) -> Result<FxIndexSet<String>> {
        let mut collector = ReferenceCollector::new(&self.text);
        Ok(collector
            .collect_expression(program.init)?
            .into_iter()
            .map(|reference| reference.name)
            .filter(|name| !ambient.contains(name))
            .collect())
    }

    /// The object literal passed to the export call
    fn table_object(&self) -> Result<Node<'_>> {
        let root = self.tree.root_node();
        let call = named_children(root)
            .into_iter()
            .find(|node| node.kind() == "expression_statement")
            .and_then(|statement| statement.named_child(0))
            .filter(|node| node.kind() == "call_expression")
            .ok_or_else(|| self.malformed(root, "expected a single call statement"))?;

        let function = call.child_by_field_name("function");
        if function.map(|f| self.text_of(f)) != Some(ENTRY_TABLE_MARKER.trim_end_matches('(')) {
            return Err(self.malformed(call, "call target is not the export function"));
        }
        let arguments: Vec<Node<'_>> = call
            .child_by_field_name("arguments")
            .map(named_children)
            .unwrap_or_default()
            .into_iter()
            .filter(|node| node.kind() != "comment")
            .collect();
        match arguments.as_slice() {
            [object] if object.kind() == "object" => Ok(*object),
            _ => Err(self.malformed(call, "expected exactly one object literal argument")),
        }
    }

    fn collect_programs<'t>(
        &'t self,
        object: Node<'t>,
        prefix: &str,
        programs: &mut Vec<ProgramNode<'t>>,
    ) -> Result<()> {
        let pairs = self.pairs(object)?;
        if let Some((_, init)) = pairs.iter().find(|(key, _)| key == "init") {
            if prefix.is_empty() {
                return Err(self.malformed(object, "`init` outside of a program entry"));
            }
            programs.push(ProgramNode {
                name: prefix.to_owned(),
                init: *init,
            });
            return Ok(());
        }

        for (key, value) in pairs {
            if value.kind() != "object" {
                return Err(self.malformed(value, format!("entry `{key}` is not an object")));
            }
            let name = if prefix.is_empty() {
                key
            } else {
                format!("{prefix}.{key}")
            };
            self.collect_programs(value, &name, programs)?;
        }
        Ok(())
    }

    /// Key text and value node of every property of an object literal
    fn pairs<'t>(&'t self, object: Node<'t>) -> Result<Vec<(String, Node<'t>)>> {
        let mut pairs = Vec::new();
        for property in named_children(object) {
            match property.kind() {
                "pair" => {
                    let (Some(key), Some(value)) = (
                        property.child_by_field_name("key"),
                        property.child_by_field_name("value"),
                    ) else {
                        return Err(self.malformed(property, "incomplete property"));
                    };
                    let key = match key.kind() {
                        "property_identifier" => self.text_of(key).to_owned(),
                        "string" => self.text_of(key).trim_matches(['\'', '"']).to_owned(),
                        _ => return Err(self.malformed(key, "computed entry table key")),
                    };
                    pairs.push((key, value));
                }
                "comment" => {}
                _ => return Err(self.malformed(property, "expected `key: value` properties")),
            }
        }
        Ok(pairs)
    }

    fn malformed(&self, node: Node<'_>, reason: impl Into<String>) -> SplitError {
        SplitError::MalformedEntryTable {
            reason: reason.into(),
            offset: self.offset + node.start_byte(),
        }
    }
}
