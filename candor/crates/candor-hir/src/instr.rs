//! HIR instruction and terminator shapes (spec.md §4.5).
//!
//! Every instruction yields exactly one SSA value, including the
//! store-shaped ones (`StoreContextSlot`, `StoreProperty`, ...): Candor
//! assignment is an expression, so a store's value is simply the value
//! it stored, and `Delete` yields `nil`. Reads and writes of *stack*
//! slots never appear here — those are pure SSA locals, threaded
//! through `Phi` at joins instead of memory instructions.

use candor_par::ast::{BinOp, UnaryOp};
use candor_util::Symbol;

use crate::ids::{BlockId, FunctionId, ValueId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKey {
    Ident(Symbol),
    Computed(ValueId),
}

#[derive(Debug, Clone)]
pub enum InstKind {
    ConstNil,
    ConstBool(bool),
    ConstNumber(u64), // f64 bits, so InstKind stays Eq-free-but-hashable-free; see `bits`/`value` helpers below
    ConstNan,
    ConstString(Symbol),

    LoadContextSlot { depth: i32, index: u32 },
    StoreContextSlot { depth: i32, index: u32, value: ValueId },
    LoadGlobal(Symbol),
    StoreGlobal { name: Symbol, value: ValueId },
    LoadProperty { object: ValueId, key: PropertyKey },
    StoreProperty { object: ValueId, key: PropertyKey, value: ValueId },
    Delete { object: ValueId, key: PropertyKey },

    AllocateArray(Vec<ValueId>),
    AllocateObject(Vec<(PropertyKey, ValueId)>),
    AllocateFunction(FunctionId),

    Binary { op: BinOp, lhs: ValueId, rhs: ValueId },
    Unary { op: UnaryOp, operand: ValueId },
    Call { callee: ValueId, args: Vec<ValueId> },
    Clone(ValueId),

    /// Operands are in the owning block's `preds` order.
    Phi(Vec<ValueId>),
}

impl InstKind {
    pub fn const_number(value: f64) -> InstKind {
        InstKind::ConstNumber(value.to_bits())
    }

    pub fn number_value(bits: u64) -> f64 {
        f64::from_bits(bits)
    }
}

#[derive(Debug, Clone)]
pub enum Terminator {
    Goto(BlockId),
    Branch {
        cond: ValueId,
        then_block: BlockId,
        else_block: BlockId,
    },
    Return(Option<ValueId>),
}
