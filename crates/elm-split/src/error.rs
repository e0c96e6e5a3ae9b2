//! Error types for bundle analysis and splitting
//!
//! Every condition here is fatal. The analysis is fail-closed: a guess would
//! produce modules that load fine and then misbehave, so each ambiguity is
//! surfaced with enough positional context to find it in the bundle.

use thiserror::Error;

/// Result type alias using [`SplitError`]
pub type Result<T> = std::result::Result<T, SplitError>;

/// Position of a byte offset inside a source text (1-based line and column)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl Location {
    /// Compute the line and column of `offset` in `source`
    pub fn of(source: &str, offset: usize) -> Self {
        let offset = offset.min(source.len());
        let before = &source.as_bytes()[..offset];
        let line = before.iter().filter(|&&b| b == b'\n').count() + 1;
        let line_start = before
            .iter()
            .rposition(|&b| b == b'\n')
            .map_or(0, |idx| idx + 1);
        Self {
            offset,
            line,
            column: offset - line_start + 1,
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "line {}, column {} (byte {})",
            self.line, self.column, self.offset
        )
    }
}

/// Errors raised while analyzing or splitting a bundle
#[derive(Debug, Error)]
pub enum SplitError {
    /// A node category the graph builder has no rule for
    #[error("unsupported syntax `{kind}` at {location}")]
    UnsupportedSyntax { kind: String, location: Location },

    /// A recognized node category with an unexpected internal shape
    #[error("malformed `{kind}` at {location}: {reason}")]
    MalformedDeclaration {
        kind: String,
        reason: String,
        location: Location,
    },

    /// A reachable name with no declaration that is not an ambient global
    #[error("unknown identifier `{name}` referenced by `{referenced_by}`")]
    UnknownIdentifier { name: String, referenced_by: String },

    /// The bundle header that opens the runtime IIFE was not found
    #[error("bundle header `(function(scope){{ 'use strict';` not found")]
    MissingHeader,

    /// The program export call was not found
    #[error("entry table marker `{marker}` not found")]
    MissingEntryTable { marker: &'static str },

    /// The program export call was found but does not have the expected shape
    #[error("malformed entry table at byte {offset}: {reason}")]
    MalformedEntryTable { reason: String, offset: usize },

    /// The JavaScript grammar could not be loaded or parsing was aborted
    #[error("parser failure: {0}")]
    Parser(String),
}

impl SplitError {
    pub(crate) fn malformed(
        kind: &str,
        reason: impl Into<String>,
        source: &str,
        offset: usize,
    ) -> Self {
        Self::MalformedDeclaration {
            kind: kind.to_owned(),
            reason: reason.into(),
            location: Location::of(source, offset),
        }
    }

    pub(crate) fn unsupported(kind: &str, source: &str, offset: usize) -> Self {
        Self::UnsupportedSyntax {
            kind: kind.to_owned(),
            location: Location::of(source, offset),
        }
    }

    /// Re-anchor a location computed inside `source[base..]` onto `source`
    #[must_use]
    pub fn relocate(self, source: &str, base: usize) -> Self {
        match self {
            Self::UnsupportedSyntax { kind, location } => Self::UnsupportedSyntax {
                kind,
                location: Location::of(source, base + location.offset),
            },
            Self::MalformedDeclaration {
                kind,
                reason,
                location,
            } => Self::MalformedDeclaration {
                kind,
                reason,
                location: Location::of(source, base + location.offset),
            },
            other => other,
        }
    }
}
