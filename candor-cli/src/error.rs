//! Error handling for the `candor` driver/REPL (spec.md §7).
//!
//! This module provides the CLI-level error type using `thiserror`; the
//! heavier compile/heap/codegen error variants live in
//! `candor_runtime::RuntimeError` and are wrapped here rather than
//! re-declared.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("{0}")]
    Compile(#[from] candor_runtime::RuntimeError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CliError>;
