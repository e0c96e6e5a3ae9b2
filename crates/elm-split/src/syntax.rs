//! Thin layer over the tree-sitter JavaScript grammar
//!
//! The parser itself is an external collaborator. This module loads the
//! grammar, parses text, and maps every node kind onto the closed
//! [`NodeCategory`] sum type so that the traversal in
//! [`crate::visitors::ReferenceCollector`] is an exhaustive match instead of
//! a chain of string comparisons with a catch-all.

use tree_sitter::{Language, Node, Parser, Tree};

use crate::error::{Result, SplitError};

/// The JavaScript grammar
pub fn javascript() -> Language {
    tree_sitter_javascript::LANGUAGE.into()
}

/// Parse `source` into a syntax tree
pub fn parse(source: &str) -> Result<Tree> {
    let mut parser = Parser::new();
    parser
        .set_language(&javascript())
        .map_err(|e| SplitError::Parser(e.to_string()))?;
    parser
        .parse(source, None)
        .ok_or_else(|| SplitError::Parser("tree-sitter returned no tree".to_owned()))
}

/// Source text covered by `node`
pub fn node_text<'s>(node: Node<'_>, source: &'s str) -> &'s str {
    &source[node.byte_range()]
}

/// Named children of `node`, collected so callers can recurse freely
pub fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

/// First `ERROR` or `MISSING` node below `node` in document order
pub fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if !node.has_error() {
        return None;
    }

    let mut cursor = node.walk();
    loop {
        let current = cursor.node();
        if current.is_error() || current.is_missing() {
            return Some(current);
        }
        if current.has_error() && cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return None;
            }
        }
    }
}

/// Human readable description of an error node
pub fn error_kind(node: Node<'_>) -> String {
    if node.is_missing() {
        format!("MISSING {}", node.kind())
    } else {
        node.kind().to_owned()
    }
}

/// Every node kind the reference collector knows how to traverse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeCategory {
    /// `var` statement; bindings hoist to the nearest function frame
    VarDeclaration,
    /// `let` / `const` statement; bindings stay in the current frame
    LexicalDeclaration,
    /// `function f() {}` and generator declarations
    FunctionDeclaration,
    /// `class C {}`
    ClassDeclaration,
    /// Statements that open a non-function frame around all their children
    Scoped,
    /// `for (x in y)` / `for (x of y)`
    ForIn,
    /// `catch (e) { ... }`
    CatchClause,
    /// `export ...`
    ExportStatement,
    /// `a as b` inside an export clause
    ExportSpecifier,
    /// Function expressions and arrow functions
    Function,
    /// Class expressions
    Class,
    /// Methods in class bodies and object literals
    MethodDefinition,
    /// `a = b`, `a += b`
    Assignment,
    /// `a++`, `--a`
    Update,
    /// A bare identifier in expression position
    Identifier,
    /// `{ a }` in an object literal
    ShorthandProperty,
    /// Nodes whose references are exactly those of their named children
    Composite,
    /// Nodes that never contain references
    Leaf,
    /// Anything without a rule
    Unsupported,
}

impl NodeCategory {
    /// Classify a tree-sitter node kind
    pub fn of(kind: &str) -> Self {
        match kind {
            "variable_declaration" => Self::VarDeclaration,
            "lexical_declaration" => Self::LexicalDeclaration,
            "function_declaration" | "generator_function_declaration" => {
                Self::FunctionDeclaration
            }
            "class_declaration" => Self::ClassDeclaration,
            "statement_block" | "if_statement" | "for_statement" | "while_statement"
            | "do_statement" | "switch_statement" | "try_statement" | "labeled_statement" => {
                Self::Scoped
            }
            "for_in_statement" => Self::ForIn,
            "catch_clause" => Self::CatchClause,
            "export_statement" => Self::ExportStatement,
            "export_specifier" => Self::ExportSpecifier,
            "function_expression" | "function" | "generator_function" | "arrow_function" => {
                Self::Function
            }
            "class" => Self::Class,
            "method_definition" => Self::MethodDefinition,
            "assignment_expression" | "augmented_assignment_expression" => Self::Assignment,
            "update_expression" => Self::Update,
            "identifier" => Self::Identifier,
            "shorthand_property_identifier" => Self::ShorthandProperty,
            "expression_statement"
            | "parenthesized_expression"
            | "sequence_expression"
            | "call_expression"
            | "new_expression"
            | "arguments"
            | "member_expression"
            | "subscript_expression"
            | "binary_expression"
            | "unary_expression"
            | "ternary_expression"
            | "await_expression"
            | "yield_expression"
            | "spread_element"
            | "array"
            | "object"
            | "pair"
            | "computed_property_name"
            | "template_string"
            | "template_substitution"
            | "return_statement"
            | "throw_statement"
            | "else_clause"
            | "finally_clause"
            | "switch_body"
            | "switch_case"
            | "switch_default"
            | "class_heritage"
            | "class_body"
            | "class_static_block"
            | "field_definition"
            | "export_clause" => Self::Composite,
            "comment"
            | "html_comment"
            | "hash_bang_line"
            | "number"
            | "string"
            | "string_fragment"
            | "escape_sequence"
            | "regex"
            | "true"
            | "false"
            | "null"
            | "undefined"
            | "this"
            | "super"
            | "property_identifier"
            | "private_property_identifier"
            | "statement_identifier"
            | "break_statement"
            | "continue_statement"
            | "empty_statement"
            | "debugger_statement"
            | "meta_property"
            | "optional_chain" => Self::Leaf,
            _ => Self::Unsupported,
        }
    }
}
