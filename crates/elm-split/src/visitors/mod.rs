//! AST visitors for elm-split
//!
//! This module contains the scope arena and the scope-aware traversal that
//! turns a syntax subtree into its set of free identifier references.

mod reference_collector;
mod scope;

pub use reference_collector::ReferenceCollector;
pub use scope::{BindingKind, FrameKind, Reference, ReferenceKind, ScopeArena, ScopeId};
