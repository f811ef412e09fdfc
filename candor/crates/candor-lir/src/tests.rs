//! Integration tests for HIR→LIR lowering and register allocation.

use candor_hir::{BasicBlock, HirFunction, InstKind, Terminator};
use candor_par::ast::BinOp;
use candor_util::{IndexVec, Span, Symbol};

use crate::allocate::allocate;
use crate::lir::{LirBlock, LirFunction, LirTerm, Operand, Phi, PhysicalRegister, Use, VReg};
use crate::lower::lower_function;

/// `function(a) { return a + 1; }`, built by hand the way
/// `candor_hir::builder::seal_entry` would: the entry block opens
/// with one `ConstNil` placeholder per parameter.
fn add_one_function() -> HirFunction {
    let mut values = IndexVec::new();
    let mut spans = IndexVec::new();
    let mut blocks = IndexVec::new();

    let param = values.push(InstKind::ConstNil);
    spans.push(Span::DUMMY);
    let one = values.push(InstKind::const_number(1.0));
    spans.push(Span::DUMMY);
    let sum = values.push(InstKind::Binary { op: BinOp::Add, lhs: param, rhs: one });
    spans.push(Span::DUMMY);

    let entry = blocks.push(BasicBlock {
        insts: vec![param, one, sum],
        preds: Vec::new(),
        term: Some(Terminator::Return(Some(sum))),
    });

    HirFunction { param_count: 1, context_slot_count: 0, entry, blocks, values, spans, nested: Vec::new() }
}

#[test]
fn entry_param_lowers_to_a_pinned_move() {
    let hir = add_one_function();
    let lir = lower_function(&hir);

    assert_eq!(lir.param_count, 1);
    let entry_insts = &lir.blocks[lir.entry].insts;
    assert!(matches!(entry_insts[0].op, crate::lir::LirOp::EntryArg(0)));
    let pinned = entry_insts[0].output.unwrap();
    assert_eq!(lir.fixed_outputs.get(&pinned), Some(&PhysicalRegister::Rdi));

    // The next instruction moves it into the identity vreg of the
    // original ConstNil placeholder (ValueId 0).
    assert!(matches!(entry_insts[1].op, crate::lir::LirOp::Move));
    assert_eq!(entry_insts[1].output, Some(VReg(0)));
}

#[test]
fn call_arguments_and_result_are_pinned_around_the_call() {
    let mut values = IndexVec::new();
    let mut spans = IndexVec::new();
    let mut blocks = IndexVec::new();

    let callee = values.push(InstKind::LoadGlobal(Symbol::intern("f")));
    spans.push(Span::DUMMY);
    let arg = values.push(InstKind::const_number(2.0));
    spans.push(Span::DUMMY);
    let call = values.push(InstKind::Call { callee, args: vec![arg] });
    spans.push(Span::DUMMY);

    let entry = blocks.push(BasicBlock {
        insts: vec![callee, arg, call],
        preds: Vec::new(),
        term: Some(Terminator::Return(Some(call))),
    });

    let hir = HirFunction { param_count: 0, context_slot_count: 0, entry, blocks, values, spans, nested: Vec::new() };
    let lir = lower_function(&hir);

    let insts = &lir.blocks[lir.entry].insts;
    let call_inst = insts.iter().find(|i| matches!(i.op, crate::lir::LirOp::Call { .. })).unwrap();
    // callee + one pinned argument.
    assert_eq!(call_inst.inputs.len(), 2);
    let result_move = insts.last().unwrap();
    assert!(matches!(result_move.op, crate::lir::LirOp::Move));
    assert_eq!(result_move.output, Some(VReg(call.0)));
}

fn empty_block(term: LirTerm) -> LirBlock {
    LirBlock { term: Some(term), ..Default::default() }
}

/// `entry` branches to `left`/`right`; `left` falls through into
/// `right`, so `right` ends up with two predecessors, one of them
/// (`entry`) reached over an edge whose source has more than one
/// successor — the one case `allocate::split_critical_edges` exists
/// to handle.
#[test]
fn critical_edges_are_split_before_resolving_phis() {
    let mut func = LirFunction {
        name: Symbol::intern("diamond"),
        param_count: 0,
        blocks: IndexVec::new(),
        entry: crate::lir::LirBlockId(0),
        vreg_count: 2,
        frame_size: 0,
        spill_slot_count: 0,
        fixed_outputs: Default::default(),
        allocation: Default::default(),
        root_constants: Vec::new(),
        nested: Vec::new(),
    };

    let entry = func.blocks.push(empty_block(LirTerm::Branch {
        cond: Use::any(VReg(0)),
        then_block: crate::lir::LirBlockId(1),
        else_block: crate::lir::LirBlockId(2),
    }));
    let left = func.blocks.push(empty_block(LirTerm::Goto(crate::lir::LirBlockId(2))));
    let right = func.blocks.push(empty_block(LirTerm::Return(None)));
    func.entry = entry;
    func.blocks[left].preds = vec![entry];
    func.blocks[right].preds = vec![entry, left];
    func.blocks[right].phis.push(Phi { output: VReg(1), inputs: vec![VReg(0), VReg(0)] });

    let block_count_before = func.blocks.len();
    allocate(&mut func);

    assert_eq!(func.blocks.len(), block_count_before + 1, "the entry->right critical edge should be split");
    assert!(!func.blocks[left].preds.contains(&entry));
    let edge_block = func.blocks[right].preds.iter().copied().find(|&p| p != left).unwrap();
    assert!(!func.blocks[edge_block].gap_out.is_empty());
}

#[test]
fn every_vreg_gets_a_home() {
    let hir = add_one_function();
    let mut lir = lower_function(&hir);
    allocate(&mut lir);

    for block in lir.blocks.as_slice() {
        for inst in &block.insts {
            if let Some(out) = inst.output {
                assert!(lir.allocation.contains_key(&out), "{:?} has no allocation", out);
            }
            for input in &inst.inputs {
                assert!(lir.allocation.contains_key(&input.value), "{:?} has no allocation", input.value);
            }
        }
    }
    assert_eq!(lir.frame_size % 16, 0);
}

#[test]
fn fixed_outputs_keep_their_pinned_register() {
    let hir = add_one_function();
    let mut lir = lower_function(&hir);
    let pinned: Vec<VReg> = lir.fixed_outputs.keys().copied().collect();
    allocate(&mut lir);
    for vreg in pinned {
        let expected = lir.fixed_outputs[&vreg];
        assert_eq!(lir.allocation.get(&vreg), Some(&Operand::Register(expected)));
    }
}
