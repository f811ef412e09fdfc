//! Low-level IR and x86-64 register allocation (spec.md §4.6, §4.7).
//!
//! `lir` defines the instruction set lowered into by `lower`; `allocate`
//! assigns every virtual register a home (a physical register or a
//! spill slot) via linear scan, consulting `calling_convention` and
//! `stack_frame` for the System V AMD64 layout.

pub mod allocate;
pub mod calling_convention;
pub mod lir;
pub mod lower;
pub mod stack_frame;
#[cfg(test)]
mod tests;

pub use allocate::*;
pub use calling_convention::*;
pub use lir::*;
pub use lower::*;
pub use stack_frame::*;
