//! Scope analysis: resolves every variable reference in a Candor
//! program to a stack slot, a context slot some number of function
//! hops up, or a global property, before any HIR is built
//! (spec.md §4.4).
//!
//! Candor has no declaration keyword: a name is a local of the
//! nearest enclosing function the first time it's assigned, unless an
//! outer function already owns it, in which case the assignment
//! mutates that outer binding and the enclosing function's binding is
//! promoted to a context slot so nested closures can reach it after
//! their defining frame has returned. `scope { a, b }` forces context
//! allocation up front regardless of whether anything captures it.

mod analysis;
pub mod scope;

pub use analysis::analyze;
pub use scope::{FunctionScope, ScopeChain, Slot, SlotKind};

#[cfg(test)]
mod edge_cases;
