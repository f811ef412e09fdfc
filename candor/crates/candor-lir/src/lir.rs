//! Low-level IR: a linear instruction sequence per block, with typed
//! operand uses and fixed register constraints (spec.md §4.6).
//!
//! LIR is target-agnostic at the instruction level: operators and
//! operands name *what* has to happen (load a property, call a stub,
//! add two words) and the register allocator decides *where* each
//! virtual value lives. Only `candor-codegen`'s emitter knows how a
//! given `LirOp` becomes x86-64 bytes.

use rustc_hash::FxHashMap;

use candor_par::ast::{BinOp, UnaryOp};
use candor_util::{define_idx, Span, Symbol};

define_idx!(LirBlockId);

/// One SSA-numbered virtual value. Never reused across a function —
/// the register allocator is what gives these a physical home.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VReg(pub u32);

impl VReg {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// The eight integer argument/return registers Candor's generated
/// code actually touches. Candor values are always one tagged word,
/// so there is no separate float register file: heap-boxed doubles
/// are addressed through a GP register like any other pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhysicalRegister {
    Rax,
    Rbx,
    Rcx,
    Rdx,
    Rsi,
    Rdi,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
}

impl PhysicalRegister {
    /// Registers the allocator is allowed to hand out for general
    /// values, in the fixed tie-break order spec.md §4.7 requires
    /// ("when two registers are equally good, the lower index wins").
    /// `Rax`/`Rdx` are excluded: they're clobbered by the div/mod slow
    /// stubs and kept free as scratch for parallel-move cycle breaks.
    /// `R13`/`R14`/`R15` are excluded too: `candor-codegen::emit`
    /// reserves them as the running function's self pointer, its own
    /// context, and the shared `StubContext*`, none of which the
    /// allocator may ever hand to an ordinary vreg. `R10` is reserved
    /// as well: `emit_call` writes the callee's own `Function` pointer
    /// there immediately before every call, a write the allocator's
    /// interval builder never sees since it isn't backed by a `LirOp`
    /// of its own, so a vreg assigned to `R10` and live across a call
    /// would get silently clobbered.
    pub const ALLOCATABLE: [PhysicalRegister; 8] = [
        PhysicalRegister::Rbx,
        PhysicalRegister::Rcx,
        PhysicalRegister::Rsi,
        PhysicalRegister::Rdi,
        PhysicalRegister::R8,
        PhysicalRegister::R9,
        PhysicalRegister::R11,
        PhysicalRegister::R12,
    ];

    /// System V AMD64 integer argument registers, in order.
    pub const ARG_REGS: [PhysicalRegister; 6] = [
        PhysicalRegister::Rdi,
        PhysicalRegister::Rsi,
        PhysicalRegister::Rdx,
        PhysicalRegister::Rcx,
        PhysicalRegister::R8,
        PhysicalRegister::R9,
    ];

    pub const RETURN_REG: PhysicalRegister = PhysicalRegister::Rax;

    pub fn is_callee_saved(self) -> bool {
        matches!(
            self,
            PhysicalRegister::Rbx
                | PhysicalRegister::R12
                | PhysicalRegister::R13
                | PhysicalRegister::R14
                | PhysicalRegister::R15
        )
    }

    /// Stable index used only to break allocation ties deterministically.
    pub fn tie_break_index(self) -> u8 {
        self as u8
    }
}

/// What an instruction requires of one of its operands, before
/// allocation (spec.md §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UseKind {
    /// May end up in a register, a spill slot, or rematerialized as a
    /// constant at the use site.
    Any,
    /// Must be in *some* register at this program point.
    Register,
    /// Must be in one specific architectural register (an ABI
    /// argument/result register). Modeled, per spec.md §4.6, by
    /// giving the value its own short-lived pre-assigned interval and
    /// inserting a move to/from the logical value.
    Fixed(PhysicalRegister),
}

#[derive(Debug, Clone, Copy)]
pub struct Use {
    pub value: VReg,
    pub kind: UseKind,
}

impl Use {
    pub fn any(value: VReg) -> Use {
        Use { value, kind: UseKind::Any }
    }
    pub fn register(value: VReg) -> Use {
        Use { value, kind: UseKind::Register }
    }
    pub fn fixed(value: VReg, reg: PhysicalRegister) -> Use {
        Use { value, kind: UseKind::Fixed(reg) }
    }
}

/// A physical operand, assigned by the register allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Register(PhysicalRegister),
    /// Spill slot index (word-sized, counted from the frame's spill
    /// area — `candor-lir::stack_frame` turns this into a concrete
    /// `rbp`-relative offset).
    Slot(u32),
    /// A small integer rematerialized directly at the use site
    /// instead of occupying a register or slot for its whole life
    /// (spec.md §4.7's "constants may be rematerialized").
    Immediate(i64),
}

/// The operator an instruction performs. Operands are carried
/// out-of-band in `LirInst::inputs`/`output` so the allocator can stay
/// generic over what an instruction *does*.
#[derive(Debug, Clone)]
pub enum LirOp {
    Move,
    /// The `i`-th incoming argument, pinned via `LirFunction::fixed_outputs`
    /// when `i < 6`; otherwise read from the incoming stack frame by the
    /// emitter's prologue.
    EntryArg(u32),
    ImmediateWord(i64),
    Nil,
    /// Index into `LirFunction::root_constants` (spec §3.2's per-function
    /// root context, reached at depth −2).
    RootConstant(u32),
    LoadGlobal(Symbol),
    StoreGlobal(Symbol),
    LoadContextSlot { depth: i32, index: u32 },
    StoreContextSlot { depth: i32, index: u32 },
    LoadPropertyKeyed,
    StorePropertyKeyed,
    DeletePropertyKeyed,
    /// `site` indexes this call site's `Pic` cell (component I).
    LoadPropertyNamed { name: Symbol, site: u32 },
    StorePropertyNamed { name: Symbol, site: u32 },
    DeletePropertyNamed(Symbol),
    AllocateArray { elem_count: u32 },
    AllocateObjectNamed { keys: Vec<Symbol> },
    /// Index into the chunk's table of nested, independently compiled
    /// HIR roots sharing this code page (spec.md §4.5's "placed on the
    /// same code page").
    AllocateFunction { nested_index: u32 },
    Binary(BinOp),
    Unary(UnaryOp),
    Clone,
    Call { arg_count: u32 },
    CollectGarbage,
    GetStackTrace,
}

#[derive(Debug, Clone)]
pub struct LirInst {
    pub op: LirOp,
    pub inputs: Vec<Use>,
    pub output: Option<VReg>,
    pub span: Span,
}

/// A phi, still in SSA form prior to allocation. `inputs[i]` is the
/// value flowing in from `LirBlock::preds[i]`. Phis are not real
/// instructions with their own program point; they are eliminated by
/// the allocator inserting a move into the right edge's gap for each
/// operand (spec.md §4.7, §9's parallel-move design note).
#[derive(Debug, Clone)]
pub struct Phi {
    pub output: VReg,
    pub inputs: Vec<VReg>,
}

#[derive(Debug, Clone)]
pub enum LirTerm {
    Goto(LirBlockId),
    Branch { cond: Use, then_block: LirBlockId, else_block: LirBlockId },
    Return(Option<Use>),
}

#[derive(Debug, Default)]
pub struct LirBlock {
    pub preds: Vec<LirBlockId>,
    pub phis: Vec<Phi>,
    pub insts: Vec<LirInst>,
    pub term: Option<LirTerm>,
    /// Parallel moves the allocator resolves data flow into, per the
    /// edge-assignment rule of spec.md §4.7: a block's `gap_in` holds
    /// moves for edges from predecessors with more than one successor
    /// (those can't share a single gap at the predecessor), everything
    /// else lands in the predecessor's `gap_out`.
    pub gap_in: Vec<(Operand, Operand)>,
    pub gap_out: Vec<(Operand, Operand)>,
}

/// A value interned into a function's root context (spec §3.2, reached
/// at depth −2). Booleans intern into the two process-wide singletons;
/// everything else is boxed per-function the first time it's seen.
#[derive(Debug, Clone, PartialEq)]
pub enum RootConstantValue {
    True,
    False,
    /// f64 bits of a heap-boxed Number too large, fractional, or
    /// non-finite to fit the SMI range (spec glossary's "unboxed
    /// integer" vs. "Number (heap-boxed double)" distinction).
    Number(u64),
    String(Symbol),
}

#[derive(Debug)]
pub struct LirFunction {
    pub name: Symbol,
    pub param_count: usize,
    pub blocks: candor_util::IndexVec<LirBlockId, LirBlock>,
    pub entry: LirBlockId,
    pub vreg_count: u32,
    /// Set once `candor_lir::allocate::allocate` has run.
    pub frame_size: u32,
    pub spill_slot_count: u32,
    /// Virtual registers whose entire live range must occupy one
    /// specific architectural register: ABI entry arguments, outgoing
    /// call arguments/results (spec.md §4.6's "modeled by giving the
    /// value its own short-lived pre-assigned interval"). The
    /// allocator pre-colors these before running the free/blocked
    /// search over everything else.
    pub fixed_outputs: FxHashMap<VReg, PhysicalRegister>,
    /// Every vreg's final home, filled in by `candor_lir::allocate::allocate`.
    pub allocation: FxHashMap<VReg, Operand>,
    pub root_constants: Vec<RootConstantValue>,
    /// Function literals this function allocates, compiled
    /// independently and placed on the same code page (spec.md §4.5).
    pub nested: Vec<LirFunction>,
    /// How many of this function's own locals are captured by a nested
    /// closure and therefore live in a heap `Context` instead of a
    /// stack slot. Zero means the prologue skips allocating one at all
    /// and just reuses the parent's running context for depth-0 loads.
    pub context_slot_count: u32,
}

impl LirFunction {
    pub fn new_vreg(&mut self) -> VReg {
        let id = VReg(self.vreg_count);
        self.vreg_count += 1;
        id
    }

    /// Interns a root-context constant, deduplicating identical values
    /// within the same function.
    pub fn intern_root_constant(&mut self, value: RootConstantValue) -> u32 {
        if let Some(pos) = self.root_constants.iter().position(|v| *v == value) {
            return pos as u32;
        }
        self.root_constants.push(value);
        (self.root_constants.len() - 1) as u32
    }

    /// Blocks in the order they were built, which is already a valid
    /// reverse-postorder-ish layout since `candor-hir` builds blocks
    /// the same way (entry first, each successor discovered and
    /// visited once) and lowering preserves block identity 1:1.
    pub fn blocks_in_layout_order(&self) -> Vec<LirBlockId> {
        (0..self.blocks.len() as u32).map(LirBlockId).collect()
    }
}
