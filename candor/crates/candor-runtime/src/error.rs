//! Errors the embedding API surfaces, covering every stage between
//! source text and a callable `Function` (spec.md §7): syntax errors
//! reported through `candor_util::Handler`, and the heap/codegen
//! failures that can occur while materializing the compiled result.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    /// One or more syntax errors were reported while parsing; `messages`
    /// carries each diagnostic rendered against its source span via
    /// `candor_util::SourceMap::format_span`.
    #[error("compile error:\n{}", messages.join("\n"))]
    Compile { messages: Vec<String> },

    #[error("heap error: {0}")]
    Gc(#[from] candor_gc::GcError),

    #[error("codegen error: {0}")]
    CodeGen(#[from] candor_codegen::CodeGenError),

    /// A call crossed the embedding boundary with a value that didn't
    /// have the shape the callee expected (spec.md §6.1's `Is<T>`/`As<T>`
    /// contract — e.g. calling a non-function, or `Unwrap<T>` against a
    /// `CData` with the wrong `CWrapper` magic).
    #[error("type error: {0}")]
    TypeError(String),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
