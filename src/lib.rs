//! Pawn-dialect compiler front-end.
//!
//! Two tightly-coupled subsystems:
//!
//! - a recursive-descent [`parser`] that turns a token stream into an
//!   arena-allocated syntax tree, disambiguating the legacy old-style
//!   declaration grammar from the new-style one with bounded lookahead, and
//!   recovering from errors instead of aborting;
//! - a tree-walking [`codegen`] that lowers type-checked expressions into a
//!   two-register (PRI/ALT) stack-machine instruction stream, honoring the
//!   l-value/r-value protocol, short-circuit evaluation, chained
//!   comparisons, heap-scoped temporaries, and user-defined operator
//!   overloads.
//!
//! The type checker sits between the two and is an external collaborator:
//! the parser leaves a `value` payload slot on every expression, and the
//! generator consumes a [`sema`] tree whose descriptors the checker filled.

pub mod ast;
pub mod codegen;
pub mod dump;
pub mod emitter;
pub mod error;
pub mod parser;
pub mod scanner;
pub mod sema;
pub mod token;
pub mod value;

pub use parser::{ParseOptions, Parser};

use crate::ast::{AstArena, ParseTree};
use crate::error::ParseFailure;

/// A successfully parsed translation unit.
#[derive(Debug)]
pub struct Parsed {
    pub arena: AstArena,
    pub tree: ParseTree,
}

/// Parses a source file in the relaxed-terminator dialect.
///
/// Returns the tree when no diagnostics were recorded, or a
/// [`ParseFailure`] carrying the partial tree plus every diagnostic.
pub fn parse_source(input: &str) -> Result<Parsed, ParseFailure> {
    parse_source_with(input, ParseOptions::default())
}

/// Parses a source file with explicit dialect options.
pub fn parse_source_with(input: &str, opts: ParseOptions) -> Result<Parsed, ParseFailure> {
    let mut parser = Parser::new(input, opts);
    let tree = parser.parse();
    let (arena, reporter) = parser.into_parts();

    if reporter.is_empty() {
        return Ok(Parsed { arena, tree });
    }

    let (diags, codes) = reporter.into_parts();
    Err(ParseFailure {
        partial: Some(tree),
        diags,
        codes,
    })
}
