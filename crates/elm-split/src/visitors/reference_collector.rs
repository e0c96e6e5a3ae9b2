//! Scope-aware collection of free identifier references
//!
//! The collector walks any subtree, opening frames in a [`ScopeArena`] the
//! way the language scopes names, and returns every identifier occurrence
//! that is not bound by the subtree itself. The graph builder uses the names
//! as dependency edges; the chunk assembler uses the positions to rewrite
//! references that cross into the shared module.

use tree_sitter::Node;

use crate::{
    error::{Result, SplitError},
    syntax::{NodeCategory, named_children},
    types::Span,
    visitors::scope::{BindingKind, FrameKind, Reference, ReferenceKind, ScopeArena},
};

/// Visitor that records unbound identifier occurrences with their positions
#[derive(Debug)]
pub struct ReferenceCollector<'s> {
    /// Full text, used to report error locations
    full: &'s str,
    /// Text the traversed tree was parsed from
    source: &'s str,
    /// Offset of `source` inside `full`; added to every reported position
    base: usize,
    scopes: ScopeArena,
}

impl<'s> ReferenceCollector<'s> {
    /// Collector for a tree parsed from the whole of `source`
    pub fn new(source: &'s str) -> Self {
        Self::for_segment(source, 0)
    }

    /// Collector for a tree parsed from `full[base..]`
    pub fn for_segment(full: &'s str, base: usize) -> Self {
        Self {
            full,
            source: &full[base..],
            base,
            scopes: ScopeArena::new(),
        }
    }

    /// Free references of a whole program tree
    pub fn collect_program(&mut self, root: Node<'_>) -> Result<Vec<Reference>> {
        self.collect_isolated(&[], |collector| collector.visit_children(root))
    }

    /// Free references of a single expression or statement
    pub fn collect_expression(&mut self, node: Node<'_>) -> Result<Vec<Reference>> {
        self.collect_isolated(&[], |collector| collector.visit(node))
    }

    /// Run `visit` inside a fresh root frame that already binds `bound`
    pub fn collect_isolated<F>(&mut self, bound: &[&str], visit: F) -> Result<Vec<Reference>>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        debug_assert!(self.scopes.current().is_none(), "collector frames leaked");
        self.scopes.open(FrameKind::Function);
        for name in bound {
            self.scopes.declare(name, BindingKind::Lexical);
        }
        match visit(self) {
            Ok(()) => Ok(self.scopes.close()),
            Err(err) => {
                self.scopes = ScopeArena::new();
                Err(err)
            }
        }
    }

    /// Text of `node` in the traversed source
    pub fn text(&self, node: Node<'_>) -> &'s str {
        &self.source[node.byte_range()]
    }

    /// Range of `node` in the full text
    pub fn span(&self, node: Node<'_>) -> Span {
        Span::new(node.start_byte(), node.end_byte()).shifted(self.base)
    }

    /// The full text positions are reported against
    pub fn full_text(&self) -> &'s str {
        self.full
    }

    pub(crate) fn unsupported(&self, node: Node<'_>) -> SplitError {
        SplitError::unsupported(node.kind(), self.full, self.base + node.start_byte())
    }

    pub(crate) fn malformed(&self, node: Node<'_>, reason: impl Into<String>) -> SplitError {
        SplitError::malformed(node.kind(), reason, self.full, self.base + node.start_byte())
    }

    pub(crate) fn required_field<'t>(&self, node: Node<'t>, field: &str) -> Result<Node<'t>> {
        node.child_by_field_name(field)
            .ok_or_else(|| self.malformed(node, format!("missing `{field}`")))
    }

    /// Visit one node, dispatching on its category
    pub(crate) fn visit(&mut self, node: Node<'_>) -> Result<()> {
        match NodeCategory::of(node.kind()) {
            NodeCategory::VarDeclaration => self.visit_declaration(node, BindingKind::Hoisted),
            NodeCategory::LexicalDeclaration => {
                self.visit_declaration(node, BindingKind::Lexical)
            }
            NodeCategory::FunctionDeclaration => {
                let name = self.text(self.required_field(node, "name")?);
                self.scopes.declare(name, BindingKind::Lexical);
                self.visit_function(node)
            }
            NodeCategory::ClassDeclaration => {
                let name = self.text(self.required_field(node, "name")?);
                self.scopes.declare(name, BindingKind::Lexical);
                self.visit_class(node)
            }
            NodeCategory::Scoped => {
                self.in_frame(FrameKind::Block, |collector| collector.visit_children(node))
            }
            NodeCategory::ForIn => self.visit_for_in(node),
            NodeCategory::CatchClause => self.visit_catch(node),
            NodeCategory::ExportStatement => self.visit_export(node),
            NodeCategory::ExportSpecifier => {
                let name = self.required_field(node, "name")?;
                if name.kind() == "identifier" {
                    self.record(name, ReferenceKind::Read);
                }
                Ok(())
            }
            NodeCategory::Function => self.visit_function(node),
            NodeCategory::Class => self.visit_class(node),
            NodeCategory::MethodDefinition => {
                let name = self.required_field(node, "name")?;
                if name.kind() == "computed_property_name" {
                    self.visit(name)?;
                }
                self.visit_function(node)
            }
            NodeCategory::Assignment => {
                let left = self.required_field(node, "left")?;
                let right = self.required_field(node, "right")?;
                self.visit_target(left)?;
                self.visit(right)
            }
            NodeCategory::Update => {
                let argument = self.required_field(node, "argument")?;
                self.visit_target(argument)
            }
            NodeCategory::Identifier => {
                self.record(node, ReferenceKind::Read);
                Ok(())
            }
            NodeCategory::ShorthandProperty => {
                self.record(node, ReferenceKind::Shorthand);
                Ok(())
            }
            NodeCategory::Composite => self.visit_children(node),
            NodeCategory::Leaf => Ok(()),
            NodeCategory::Unsupported => Err(self.unsupported(node)),
        }
    }

    fn visit_children(&mut self, node: Node<'_>) -> Result<()> {
        for child in named_children(node) {
            self.visit(child)?;
        }
        Ok(())
    }

    fn in_frame<F>(&mut self, kind: FrameKind, visit: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        self.scopes.open(kind);
        let outcome = visit(self);
        self.scopes.close();
        outcome
    }

    fn record(&mut self, node: Node<'_>, kind: ReferenceKind) {
        let reference = Reference {
            name: self.text(node).to_owned(),
            start: self.base + node.start_byte(),
            end: self.base + node.end_byte(),
            kind,
        };
        self.scopes.reference(reference);
    }

    fn visit_declaration(&mut self, node: Node<'_>, binding: BindingKind) -> Result<()> {
        let mut declarators = 0;
        for declarator in named_children(node) {
            match declarator.kind() {
                "variable_declarator" => {
                    let name = self.required_field(declarator, "name")?;
                    if let Some(value) = declarator.child_by_field_name("value") {
                        self.visit(value)?;
                    }
                    self.bind_pattern(name, binding)?;
                    declarators += 1;
                }
                "comment" => {}
                _ => return Err(self.malformed(declarator, "expected a variable declarator")),
            }
        }
        if declarators == 0 {
            return Err(self.malformed(node, "binding statement without declarators"));
        }
        Ok(())
    }

    /// Parameters and body of any function-like node, in a function frame
    fn visit_function(&mut self, node: Node<'_>) -> Result<()> {
        self.in_frame(FrameKind::Function, |collector| {
            // a named function expression can see its own name
            if NodeCategory::of(node.kind()) == NodeCategory::Function
                && let Some(name) = node.child_by_field_name("name")
            {
                let name = collector.text(name);
                collector.scopes.declare(name, BindingKind::Lexical);
            }
            if let Some(parameter) = node.child_by_field_name("parameter") {
                collector.bind_pattern(parameter, BindingKind::Lexical)?;
            }
            if let Some(parameters) = node.child_by_field_name("parameters") {
                for parameter in named_children(parameters) {
                    collector.bind_pattern(parameter, BindingKind::Lexical)?;
                }
            }
            let body = collector.required_field(node, "body")?;
            if body.kind() == "statement_block" {
                collector.visit_children(body)
            } else {
                collector.visit(body)
            }
        })
    }

    fn visit_class(&mut self, node: Node<'_>) -> Result<()> {
        let name = node.child_by_field_name("name");
        self.in_frame(FrameKind::Block, |collector| {
            if let Some(name) = name {
                let name = collector.text(name);
                collector.scopes.declare(name, BindingKind::Lexical);
            }
            for child in named_children(node) {
                if name.is_some_and(|name| name.id() == child.id()) {
                    continue;
                }
                collector.visit(child)?;
            }
            Ok(())
        })
    }

    fn visit_for_in(&mut self, node: Node<'_>) -> Result<()> {
        self.in_frame(FrameKind::Block, |collector| {
            let left = collector.required_field(node, "left")?;
            match node.child_by_field_name("kind") {
                Some(kind) => {
                    let binding = if collector.text(kind) == "var" {
                        BindingKind::Hoisted
                    } else {
                        BindingKind::Lexical
                    };
                    collector.bind_pattern(left, binding)?;
                }
                None if matches!(
                    left.kind(),
                    "variable_declaration" | "lexical_declaration"
                ) =>
                {
                    collector.visit(left)?;
                }
                None => collector.visit_target(left)?,
            }
            let right = collector.required_field(node, "right")?;
            collector.visit(right)?;
            let body = collector.required_field(node, "body")?;
            collector.visit(body)
        })
    }

    fn visit_catch(&mut self, node: Node<'_>) -> Result<()> {
        self.in_frame(FrameKind::Block, |collector| {
            if let Some(parameter) = node.child_by_field_name("parameter") {
                collector.bind_pattern(parameter, BindingKind::Lexical)?;
            }
            let body = collector.required_field(node, "body")?;
            collector.visit_children(body)
        })
    }

    fn visit_export(&mut self, node: Node<'_>) -> Result<()> {
        if node.child_by_field_name("source").is_some() {
            return Err(self.unsupported(node));
        }
        if let Some(declaration) = node.child_by_field_name("declaration") {
            return self.visit(declaration);
        }
        if let Some(value) = node.child_by_field_name("value") {
            return self.visit(value);
        }
        self.visit_children(node)
    }

    /// Bind every identifier of a declaration or parameter pattern
    fn bind_pattern(&mut self, node: Node<'_>, binding: BindingKind) -> Result<()> {
        match node.kind() {
            "identifier" | "shorthand_property_identifier_pattern" => {
                let name = self.text(node);
                self.scopes.declare(name, binding);
                Ok(())
            }
            "object_pattern" | "array_pattern" => {
                for child in named_children(node) {
                    self.bind_pattern(child, binding)?;
                }
                Ok(())
            }
            "pair_pattern" => {
                let key = self.required_field(node, "key")?;
                if key.kind() == "computed_property_name" {
                    self.visit(key)?;
                }
                let value = self.required_field(node, "value")?;
                self.bind_pattern(value, binding)
            }
            "assignment_pattern" | "object_assignment_pattern" => {
                let left = self.required_field(node, "left")?;
                let right = self.required_field(node, "right")?;
                self.visit(right)?;
                self.bind_pattern(left, binding)
            }
            "rest_pattern" => match named_children(node).first() {
                Some(&inner) => self.bind_pattern(inner, binding),
                None => Err(self.malformed(node, "rest element without a binding")),
            },
            "comment" => Ok(()),
            _ => Err(self.malformed(node, "unexpected node in binding position")),
        }
    }

    /// Record the identifiers an assignment writes to
    fn visit_target(&mut self, node: Node<'_>) -> Result<()> {
        match node.kind() {
            "identifier" | "shorthand_property_identifier_pattern" => {
                self.record(node, ReferenceKind::Write);
                Ok(())
            }
            "object_pattern" | "array_pattern" | "parenthesized_expression" | "rest_pattern" => {
                for child in named_children(node) {
                    self.visit_target(child)?;
                }
                Ok(())
            }
            "pair_pattern" => {
                let key = self.required_field(node, "key")?;
                if key.kind() == "computed_property_name" {
                    self.visit(key)?;
                }
                let value = self.required_field(node, "value")?;
                self.visit_target(value)
            }
            "assignment_pattern" | "object_assignment_pattern" => {
                let left = self.required_field(node, "left")?;
                let right = self.required_field(node, "right")?;
                self.visit_target(left)?;
                self.visit(right)
            }
            "comment" => Ok(()),
            _ => self.visit(node),
        }
    }
}
