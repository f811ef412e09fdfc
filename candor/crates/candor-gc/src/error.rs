//! Error types for the heap, collector, and handle registry.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GcError {
    #[error("out of memory: requested {requested} bytes, heap exhausted after escalation to old space")]
    OutOfMemory { requested: usize },

    #[error("failed to map {size} bytes for a heap page: {reason}")]
    PageMapFailed { size: usize, reason: String },

    #[error("handle scope stack is empty; no scope to exit")]
    NoActiveScope,

    #[error("attempted to dereference a handle outside any active scope")]
    HandleOutOfScope,

    #[error("invalid heap configuration: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, GcError>;
