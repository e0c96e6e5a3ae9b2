//! Declaration-level dependency map of a bundle body
//!
//! Every top-level binding becomes a [`Declaration`] recording the byte range
//! of its statement and the free names it references. Top-level statements
//! without a binding (effect manager registrations, feature checks) become
//! [`UnnamedChunk`]s, which always run and are therefore always live.

use crate::{
    ambient_globals::AmbientGlobals,
    error::{Result, SplitError},
    graph_builder::GraphBuilder,
    types::{FxIndexMap, FxIndexSet, Span},
};

/// A named top-level binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub name: String,
    /// Range in the body text
    pub span: Span,
    /// Free names referenced, in first-use order, ambient globals excluded
    pub needs: FxIndexSet<String>,
    /// Free names assigned to (subset of `needs`)
    pub writes: FxIndexSet<String>,
    /// Keyword to re-wrap a declarator split out of a multi-binding statement
    pub detached_keyword: Option<String>,
    /// Kept verbatim without analysis; its text does not parse
    pub opaque: bool,
}

impl Declaration {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
            needs: FxIndexSet::default(),
            writes: FxIndexSet::default(),
            detached_keyword: None,
            opaque: false,
        }
    }
}

/// A top-level statement with side effects and no binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnnamedChunk {
    pub span: Span,
    pub needs: FxIndexSet<String>,
}

/// All declarations and unnamed chunks of one body text
#[derive(Debug, Default)]
pub struct DependencyMap {
    /// Declarations keyed by name, in source order
    pub declarations: FxIndexMap<String, Declaration>,
    /// Unnamed chunks in source order
    pub unnamed: Vec<UnnamedChunk>,
}

impl DependencyMap {
    /// Build the map for `source` with the built-in ambient globals
    pub fn build(source: &str) -> Result<Self> {
        GraphBuilder::new(&AmbientGlobals::default()).build(source)
    }

    pub fn get(&self, name: &str) -> Option<&Declaration> {
        self.declarations.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.declarations.contains_key(name)
    }

    /// Union of the needs of every unnamed chunk, in source order
    pub fn unnamed_needs(&self) -> FxIndexSet<String> {
        self.unnamed
            .iter()
            .flat_map(|chunk| chunk.needs.iter().cloned())
            .collect()
    }

    /// Forget every declaration and unnamed chunk starting at or after
    /// `offset`
    pub(crate) fn discard_from(&mut self, offset: usize) {
        while self
            .declarations
            .last()
            .is_some_and(|(_, declaration)| declaration.span.start >= offset)
        {
            self.declarations.pop();
        }
        while self
            .unnamed
            .last()
            .is_some_and(|chunk| chunk.span.start >= offset)
        {
            self.unnamed.pop();
        }
    }

    /// Add a declaration; a second binding of the same name is rejected
    pub(crate) fn insert(&mut self, declaration: Declaration, source: &str) -> Result<()> {
        if self.declarations.contains_key(&declaration.name) {
            return Err(SplitError::malformed(
                "declaration",
                format!("duplicate top-level binding `{}`", declaration.name),
                source,
                declaration.span.start,
            ));
        }
        self.declarations
            .insert(declaration.name.clone(), declaration);
        Ok(())
    }
}
