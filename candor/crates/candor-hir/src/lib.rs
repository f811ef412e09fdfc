//! SSA-form HIR: the output of lowering a scope-resolved AST into a
//! control-flow graph of basic blocks over a flat instruction arena,
//! with phi nodes at every join (spec.md §4.5). This is the input the
//! LIR lowering pass in `candor-lir` consumes.

mod builder;
mod function;
mod ids;
mod instr;

pub use function::{BasicBlock, HirFunction};
pub use ids::{BlockId, FunctionId, ValueId};
pub use instr::{InstKind, PropertyKey, Terminator};

use candor_par::ast::Program;

/// Builds the HIR for an entire compiled unit: the implicit top-level
/// function the CLI/REPL runs a script as, with every function
/// literal reachable from it lowered into `nested` recursively.
pub fn build(program: &Program, scope: &candor_sem::FunctionScope) -> HirFunction {
    builder::build_function(&[], &program.body, candor_sem::ScopeChain::new(scope))
}

#[cfg(test)]
mod edge_cases;
