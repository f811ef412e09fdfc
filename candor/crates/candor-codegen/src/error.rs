//! Error types for machine-code emission, page allocation, and chunk
//! placement.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodeGenError {
    /// A LIR block referenced by a jump/branch was never laid out.
    #[error("block '{0:?}' not found in layout order")]
    BlockNotFound(String),

    /// A vreg had no allocation recorded for it by `candor_lir::allocate`.
    #[error("vreg {0:?} has no register or spill-slot assignment")]
    UnallocatedValue(String),

    /// `mmap` failed to reserve a code page or its guard page.
    #[error("failed to map {size} bytes for a code page: {reason}")]
    PageMapFailed { size: usize, reason: String },

    /// Flipping a page from writable to executable failed.
    #[error("failed to mark code page executable: {0}")]
    ProtectFailed(String),

    /// A chunk didn't fit in any existing page and a fresh page still
    /// couldn't hold it (larger than the configured page size).
    #[error("compiled chunk of {size} bytes exceeds the code page size")]
    ChunkTooLarge { size: usize },

    /// A relocation's target offset fell outside the chunk being placed.
    #[error("relocation at offset {0} falls outside the chunk")]
    RelocationOutOfRange(usize),

    #[error("{0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, CodeGenError>;
