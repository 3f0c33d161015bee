//! The compiler front end as seen by the engine.

use crate::error::Diag;
use crate::names::{SnippetId, SymbolRef};
use crate::snippet::{SnippetKind, Status};

/// Result of parsing a raw source fragment.
pub enum Parsed<U> {
    /// A syntactically complete unit with its preliminary classification.
    /// Expressions may be reclassified by `compile` once their type is known.
    Unit { unit: U, kind: SnippetKind },
    Erroneous { diagnostics: Vec<Diag> },
}

/// Where in a declaration an unresolved name occurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Needed to validate the declaration's own signature or supertypes.
    Shape,
    /// Only inside a body or initializer.
    Body,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unresolved {
    pub symbol: SymbolRef,
    pub scope: Scope,
}

/// Another active snippet visible to a compilation.
pub struct LiveUnit<'a, U> {
    pub id: SnippetId,
    pub unit: &'a U,
    pub kind: &'a SnippetKind,
    pub status: Status,
}

pub struct CompileRequest<'a, U> {
    pub id: SnippetId,
    pub unit: &'a U,
    /// Active snippets other than the one being compiled, in id order. The
    /// holder of the unit's own declaration key is never included.
    pub live: &'a [LiveUnit<'a, U>],
}

#[derive(Debug, Clone)]
pub struct CompileReport {
    pub kind: SnippetKind,
    pub defines: Vec<SymbolRef>,
    pub references: Vec<SymbolRef>,
    pub unresolved: Vec<Unresolved>,
    pub diagnostics: Vec<Diag>,
    /// Canonical text of the declaration's externally visible shape.
    pub signature: String,
}

impl CompileReport {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diag::is_error)
    }

    pub fn blocks_shape(&self) -> bool {
        self.unresolved.iter().any(|u| u.scope == Scope::Shape)
    }
}

/// Parses and compiles snippets against the live program state.
///
/// Unresolved names must be corralled: a declaration that mentions a name
/// nobody defines still compiles, with the name reported in `unresolved`.
pub trait SymbolOracle {
    type Unit: Clone;

    fn parse(&self, source: &str) -> Parsed<Self::Unit>;

    fn compile(&self, request: &CompileRequest<'_, Self::Unit>) -> CompileReport;
}
