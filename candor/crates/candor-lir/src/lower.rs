//! HIR to LIR lowering (spec.md §4.6).
//!
//! Every pre-existing HIR value keeps its identity: `VReg(id.index())`
//! names the same logical value as `ValueId(id)` did in the HIR. This
//! means most instructions translate one-to-one with no bookkeeping.
//! The one place that isn't true is anywhere the System V ABI pins a
//! value to a specific register — entry arguments, call arguments, and
//! call results. Those get a short-lived *pinned* vreg (allocated past
//! the identity range, registered in `fixed_outputs`) plus an explicit
//! `Move` that lands the value back in (or out of) its identity vreg,
//! exactly as spec.md §4.6 describes: "modeled by giving the value its
//! own short-lived pre-assigned interval and inserting a move."

use rustc_hash::FxHashMap;

use candor_gc::Word;
use candor_hir::{BlockId, HirFunction, InstKind, PropertyKey, Terminator, ValueId};
use candor_util::{Idx, IndexVec};

use crate::lir::{
    LirBlock, LirBlockId, LirFunction, LirInst, LirOp, LirTerm, Phi, PhysicalRegister,
    RootConstantValue, Use, VReg,
};

pub fn lower_function(hir: &HirFunction) -> LirFunction {
    let mut lowerer = Lowerer::new(hir);
    lowerer.lower_all_blocks();
    lowerer.finish()
}

fn identity_vreg(id: ValueId) -> VReg {
    VReg(id.index() as u32)
}

struct Lowerer<'h> {
    hir: &'h HirFunction,
    func: LirFunction,
    /// `HirFunction::blocks_in_layout_order()`'s `BlockId`s map to
    /// `LirBlockId`s of the same index — lowering preserves block
    /// identity 1:1, so there is no separate translation table.
    next_call_site: u32,
}

impl<'h> Lowerer<'h> {
    fn new(hir: &'h HirFunction) -> Self {
        let block_count = hir.blocks.len();
        let mut blocks = IndexVec::with_capacity(block_count);
        for _ in 0..block_count {
            blocks.push(LirBlock::default());
        }
        let func = LirFunction {
            name: candor_util::Symbol::intern("<function>"),
            param_count: hir.param_count,
            blocks,
            entry: LirBlockId(hir.entry.index() as u32),
            // Identity range reserves one vreg per HIR value up front;
            // `new_vreg` hands out everything past it.
            vreg_count: hir.values.len() as u32,
            frame_size: 0,
            spill_slot_count: 0,
            fixed_outputs: FxHashMap::default(),
            allocation: FxHashMap::default(),
            root_constants: Vec::new(),
            nested: Vec::new(),
            context_slot_count: hir.context_slot_count,
        };
        Lowerer { hir, func, next_call_site: 0 }
    }

    fn lower_all_blocks(&mut self) {
        for block_id in self.hir.blocks.indices() {
            self.lower_block(block_id);
        }
        // Entry-parameter placeholders are the first `param_count`
        // values pushed by `candor_hir::builder::seal_entry` before
        // anything else runs in the entry block, so they occupy the
        // first `param_count` identity vregs in order.
        self.pin_entry_args();
        for nested in &self.hir.nested {
            self.func.nested.push(lower_function(nested));
        }
    }

    fn lir_block_id(id: BlockId) -> LirBlockId {
        LirBlockId(id.index() as u32)
    }

    fn pin_entry_args(&mut self) {
        let entry = Self::lir_block_id(self.hir.entry);
        let mut prelude = Vec::with_capacity(self.hir.param_count);
        for i in 0..self.hir.param_count {
            let identity = identity_vreg(ValueId(i as u32));
            let pinned = self.func.new_vreg();
            let inst = LirInst {
                op: LirOp::EntryArg(i as u32),
                inputs: Vec::new(),
                output: Some(pinned),
                span: self.hir.span(ValueId(i as u32)),
            };
            if let Some(&reg) = PhysicalRegister::ARG_REGS.get(i) {
                self.func.fixed_outputs.insert(pinned, reg);
            }
            prelude.push(inst);
            prelude.push(LirInst {
                op: LirOp::Move,
                inputs: vec![Use::any(pinned)],
                output: Some(identity),
                span: self.hir.span(ValueId(i as u32)),
            });
        }
        // Entry-arg prelude goes before whatever the entry block
        // already lowered to (the `ConstNil` placeholders themselves
        // lower to nothing — see `lower_inst`'s early return on them
        // when the value index is below `param_count`).
        let block = &mut self.func.blocks[entry];
        prelude.extend(std::mem::take(&mut block.insts));
        block.insts = prelude;
    }

    fn lower_block(&mut self, id: BlockId) {
        let hir_block = self.hir.block(id);
        let lir_id = Self::lir_block_id(id);

        let preds = hir_block.preds.iter().map(|p| Self::lir_block_id(*p)).collect();
        self.func.blocks[lir_id].preds = preds;

        for &value_id in &hir_block.insts {
            // The param-placeholder `ConstNil`s seeded by `seal_entry`
            // carry no work of their own; `pin_entry_args` supplies
            // their identity vreg directly via a Move.
            if id == self.hir.entry && (value_id.index() as usize) < self.hir.param_count {
                continue;
            }
            match self.hir.inst(value_id) {
                InstKind::Phi(inputs) => {
                    let phi_inputs = inputs.iter().map(|&v| identity_vreg(v)).collect();
                    self.func.blocks[lir_id]
                        .phis
                        .push(Phi { output: identity_vreg(value_id), inputs: phi_inputs });
                }
                inst => {
                    let lowered = self.lower_inst(value_id, inst);
                    self.func.blocks[lir_id].insts.extend(lowered);
                }
            }
        }

        if let Some(term) = &hir_block.term {
            self.func.blocks[lir_id].term = Some(self.lower_term(term));
        }
    }

    fn lower_term(&self, term: &Terminator) -> LirTerm {
        match term {
            Terminator::Goto(target) => LirTerm::Goto(Self::lir_block_id(*target)),
            Terminator::Branch { cond, then_block, else_block } => LirTerm::Branch {
                cond: Use::any(identity_vreg(*cond)),
                then_block: Self::lir_block_id(*then_block),
                else_block: Self::lir_block_id(*else_block),
            },
            Terminator::Return(value) => LirTerm::Return(value.map(|v| Use::any(identity_vreg(v)))),
        }
    }

    /// Lowers one HIR value into zero or more LIR instructions, all
    /// sharing its span. Returns a `Vec` because call sites expand
    /// into several argument-pinning moves plus the call itself plus
    /// a result-unpinning move.
    fn lower_inst(&mut self, value_id: ValueId, inst: &InstKind) -> Vec<LirInst> {
        let span = self.hir.span(value_id);
        let out = identity_vreg(value_id);
        let mk = |op: LirOp, inputs: Vec<Use>| LirInst { op, inputs, output: Some(out), span };

        match inst {
            InstKind::ConstNil => vec![mk(LirOp::Nil, Vec::new())],
            InstKind::ConstBool(b) => {
                let idx = self.func.intern_root_constant(if *b {
                    RootConstantValue::True
                } else {
                    RootConstantValue::False
                });
                vec![mk(LirOp::RootConstant(idx), Vec::new())]
            }
            InstKind::ConstNumber(bits) => {
                let value = InstKind::number_value(*bits);
                if value.fract() == 0.0 && value >= Word::SMI_MIN as f64 && value <= Word::SMI_MAX as f64 {
                    vec![mk(LirOp::ImmediateWord(value as i64), Vec::new())]
                } else {
                    let idx = self.func.intern_root_constant(RootConstantValue::Number(*bits));
                    vec![mk(LirOp::RootConstant(idx), Vec::new())]
                }
            }
            InstKind::ConstNan => {
                let idx = self.func.intern_root_constant(RootConstantValue::Number(f64::NAN.to_bits()));
                vec![mk(LirOp::RootConstant(idx), Vec::new())]
            }
            InstKind::ConstString(sym) => {
                let idx = self.func.intern_root_constant(RootConstantValue::String(*sym));
                vec![mk(LirOp::RootConstant(idx), Vec::new())]
            }

            InstKind::LoadContextSlot { depth, index } => {
                vec![mk(LirOp::LoadContextSlot { depth: *depth, index: *index }, Vec::new())]
            }
            InstKind::StoreContextSlot { depth, index, value } => vec![mk(
                LirOp::StoreContextSlot { depth: *depth, index: *index },
                vec![Use::any(identity_vreg(*value))],
            )],
            InstKind::LoadGlobal(name) => vec![mk(LirOp::LoadGlobal(*name), Vec::new())],
            InstKind::StoreGlobal { name, value } => {
                vec![mk(LirOp::StoreGlobal(*name), vec![Use::any(identity_vreg(*value))])]
            }

            InstKind::LoadProperty { object, key } => match key {
                PropertyKey::Ident(name) => {
                    let site = self.next_call_site();
                    vec![mk(
                        LirOp::LoadPropertyNamed { name: *name, site },
                        vec![Use::any(identity_vreg(*object))],
                    )]
                }
                PropertyKey::Computed(key_value) => vec![mk(
                    LirOp::LoadPropertyKeyed,
                    vec![Use::any(identity_vreg(*object)), Use::any(identity_vreg(*key_value))],
                )],
            },
            InstKind::StoreProperty { object, key, value } => match key {
                PropertyKey::Ident(name) => {
                    let site = self.next_call_site();
                    vec![mk(
                        LirOp::StorePropertyNamed { name: *name, site },
                        vec![Use::any(identity_vreg(*object)), Use::any(identity_vreg(*value))],
                    )]
                }
                PropertyKey::Computed(key_value) => vec![mk(
                    LirOp::StorePropertyKeyed,
                    vec![
                        Use::any(identity_vreg(*object)),
                        Use::any(identity_vreg(*key_value)),
                        Use::any(identity_vreg(*value)),
                    ],
                )],
            },
            InstKind::Delete { object, key } => match key {
                PropertyKey::Ident(name) => {
                    vec![mk(LirOp::DeletePropertyNamed(*name), vec![Use::any(identity_vreg(*object))])]
                }
                PropertyKey::Computed(key_value) => vec![mk(
                    LirOp::DeletePropertyKeyed,
                    vec![Use::any(identity_vreg(*object)), Use::any(identity_vreg(*key_value))],
                )],
            },

            InstKind::AllocateArray(elems) => {
                let inputs = elems.iter().map(|&e| Use::any(identity_vreg(e))).collect();
                vec![mk(LirOp::AllocateArray { elem_count: elems.len() as u32 }, inputs)]
            }
            InstKind::AllocateObject(props) => {
                let keys = props
                    .iter()
                    .map(|(key, _)| match key {
                        PropertyKey::Ident(name) => *name,
                        // Object-literal keys are always static; `candor-sem`
                        // never produces a computed key here.
                        PropertyKey::Computed(_) => unreachable!("object literal keys are always idents"),
                    })
                    .collect();
                let inputs = props.iter().map(|(_, v)| Use::any(identity_vreg(*v))).collect();
                vec![mk(LirOp::AllocateObjectNamed { keys }, inputs)]
            }
            InstKind::AllocateFunction(nested_index) => {
                vec![mk(LirOp::AllocateFunction { nested_index: nested_index.index() as u32 }, Vec::new())]
            }

            InstKind::Binary { op, lhs, rhs } => {
                vec![mk(LirOp::Binary(*op), vec![Use::any(identity_vreg(*lhs)), Use::any(identity_vreg(*rhs))])]
            }
            InstKind::Unary { op, operand } => {
                vec![mk(LirOp::Unary(*op), vec![Use::any(identity_vreg(*operand))])]
            }
            InstKind::Clone(operand) => vec![mk(LirOp::Clone, vec![Use::any(identity_vreg(*operand))])],

            InstKind::Call { callee, args } => self.lower_call(value_id, *callee, args, span),

            InstKind::Phi(_) => unreachable!("phis are extracted in lower_block before reaching here"),
        }
    }

    fn next_call_site(&mut self) -> u32 {
        let site = self.next_call_site;
        self.next_call_site += 1;
        site
    }

    /// Call arguments and results cross the System V boundary, so each
    /// gets pinned to its ABI register via a `Move` either side of the
    /// `Call` itself (spec.md §4.6). Arguments past the sixth have no
    /// fixed register — they are passed on the outgoing stack and the
    /// emitter (`candor-codegen`) places them using
    /// `calling_convention::is_stack_arg`/`get_stack_arg_offset`.
    fn lower_call(&mut self, value_id: ValueId, callee: ValueId, args: &[ValueId], span: candor_util::Span) -> Vec<LirInst> {
        let mut out = Vec::new();

        let mut call_inputs = vec![Use::any(identity_vreg(callee))];
        for (i, &arg) in args.iter().enumerate() {
            match PhysicalRegister::ARG_REGS.get(i) {
                Some(&reg) => {
                    let pinned = self.func.new_vreg();
                    self.func.fixed_outputs.insert(pinned, reg);
                    out.push(LirInst {
                        op: LirOp::Move,
                        inputs: vec![Use::any(identity_vreg(arg))],
                        output: Some(pinned),
                        span,
                    });
                    call_inputs.push(Use::fixed(pinned, reg));
                }
                None => call_inputs.push(Use::any(identity_vreg(arg))),
            }
        }

        let pinned_result = self.func.new_vreg();
        self.func.fixed_outputs.insert(pinned_result, PhysicalRegister::RETURN_REG);
        out.push(LirInst {
            op: LirOp::Call { arg_count: args.len() as u32 },
            inputs: call_inputs,
            output: Some(pinned_result),
            span,
        });
        out.push(LirInst {
            op: LirOp::Move,
            inputs: vec![Use::fixed(pinned_result, PhysicalRegister::RETURN_REG)],
            output: Some(identity_vreg(value_id)),
            span,
        });
        out
    }

    fn finish(self) -> LirFunction {
        self.func
    }
}
