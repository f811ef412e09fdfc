//! The compiled shape of one Candor function: a CFG of basic blocks
//! over an arena of SSA values, plus the independently-compiled HIR
//! roots of every function literal it allocates (spec.md §4.5, §4.3's
//! "nested function literals lower to `AllocateFunction`, compiled
//! into their own HIR graph sharing the enclosing code page").

use candor_util::{IndexVec, Span};

use crate::ids::{BlockId, ValueId};
use crate::instr::{InstKind, Terminator};

#[derive(Debug, Default)]
pub struct BasicBlock {
    pub insts: Vec<ValueId>,
    pub preds: Vec<BlockId>,
    pub term: Option<Terminator>,
}

#[derive(Debug)]
pub struct HirFunction {
    pub param_count: usize,
    pub context_slot_count: u32,
    pub entry: BlockId,
    pub blocks: IndexVec<BlockId, BasicBlock>,
    pub values: IndexVec<ValueId, InstKind>,
    /// Source location each value was lowered from, parallel to
    /// `values` (spec.md §4.5: "each instruction records its source
    /// AST offset; the source map later uses this").
    pub spans: IndexVec<ValueId, Span>,
    pub nested: Vec<HirFunction>,
}

impl HirFunction {
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id]
    }

    pub fn inst(&self, id: ValueId) -> &InstKind {
        &self.values[id]
    }

    pub fn span(&self, id: ValueId) -> Span {
        self.spans[id]
    }

    /// Walks blocks in a stable reverse-postorder-ish traversal
    /// suitable for LIR lowering: entry first, each block's
    /// successors discovered through its terminator and visited after
    /// it, never revisiting one already emitted.
    pub fn blocks_in_layout_order(&self) -> Vec<BlockId> {
        let mut order = Vec::with_capacity(self.blocks.len());
        let mut seen = vec![false; self.blocks.len()];
        let mut stack = vec![self.entry];
        while let Some(id) = stack.pop() {
            if seen[id.0 as usize] {
                continue;
            }
            seen[id.0 as usize] = true;
            order.push(id);
            if let Some(term) = &self.blocks[id].term {
                match term {
                    Terminator::Goto(target) => stack.push(*target),
                    Terminator::Branch { then_block, else_block, .. } => {
                        stack.push(*else_block);
                        stack.push(*then_block);
                    }
                    Terminator::Return(_) => {}
                }
            }
        }
        order
    }
}
