//! Shared plumbing used across the Candor toolchain: interned identifiers,
//! source locations, diagnostics, typed index vectors, and the `DefId`
//! used to name top-level definitions.
//!
//! Nothing here is Candor-specific language semantics — that lives in
//! `candor-lex`, `candor-par`, `candor-sem`, and downstream crates, all of
//! which depend on this one.

pub mod def_id;
pub mod diagnostic;
pub mod error;
pub mod index_vec;
pub mod span;
pub mod symbol;

pub use def_id::{DefId, DefIdGenerator};
pub use diagnostic::{Diagnostic, DiagnosticCode, Handler, Level};
pub use error::{DiagnosticError, IndexVecError, SourceMapError, SymbolError};
// `define_idx!` is `#[macro_export]`ed from `index_vec` and is therefore
// already visible at the crate root as `candor_util::define_idx!`.
pub use index_vec::{Idx, IndexVec};
pub use span::{FileId, Span, SourceFile, SourceMap};
pub use symbol::Symbol;
