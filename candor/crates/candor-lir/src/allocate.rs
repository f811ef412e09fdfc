//! Linear-scan register allocation (spec.md §4.7), grounded on
//! `original_source/lir-allocator.cc`/`lir-allocator.h`'s
//! `LIRInterval`/`AllocateFreeReg`/`AllocateBlockedReg` shape. Unlike
//! the original, intervals here are not split mid-life: a blocked
//! interval either wins a free register or is spilled for its entire
//! range. This keeps the implementation's correctness argument simple
//! (one home per vreg) at the cost of some register pressure the
//! original's `SplitAndSpill` would have relieved.

use std::collections::HashSet;

use rustc_hash::FxHashMap;

use candor_util::Idx;

use crate::lir::{LirBlockId, LirFunction, LirTerm, Operand, PhysicalRegister, UseKind, VReg};
use crate::stack_frame::StackFrame;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LiveRange {
    start: u32,
    end: u32,
}

#[derive(Debug, Default)]
struct Interval {
    ranges: Vec<LiveRange>,
    /// Positions where this vreg is used with `UseKind::Register` or
    /// `UseKind::Fixed`, for next-use-distance spill heuristics.
    register_uses: Vec<u32>,
}

impl Interval {
    fn start(&self) -> u32 {
        self.ranges.iter().map(|r| r.start).min().unwrap_or(u32::MAX)
    }

    fn end(&self) -> u32 {
        self.ranges.iter().map(|r| r.end).max().unwrap_or(0)
    }

    fn overlaps(&self, other_start: u32, other_end: u32) -> bool {
        self.ranges.iter().any(|r| r.start < other_end && other_start < r.end)
    }

    fn add_range(&mut self, start: u32, end: u32) {
        if start >= end {
            return;
        }
        self.ranges.push(LiveRange { start, end });
    }

    /// Narrows the earliest range so the interval starts exactly at a
    /// definition point, the usual bottom-up interval-building move
    /// (`original_source/lir-allocator.cc`'s `AddLiveRange` called
    /// from the last instruction towards the first).
    fn set_from(&mut self, pos: u32) {
        if let Some(r) = self.ranges.iter_mut().min_by_key(|r| r.start) {
            r.start = pos;
        } else {
            self.ranges.push(LiveRange { start: pos, end: pos + 1 });
        }
    }

    fn next_use_after(&self, pos: u32) -> u32 {
        self.register_uses.iter().filter(|&&u| u >= pos).min().copied().unwrap_or(u32::MAX)
    }
}

/// Splits every edge whose predecessor has more than one successor
/// *and* whose successor has more than one predecessor — the only
/// case where a single shared `gap_out`/`gap_in` per block can't
/// unambiguously hold that edge's resolving moves.
fn split_critical_edges(func: &mut LirFunction) {
    let block_ids: Vec<LirBlockId> = func.blocks.indices().collect();
    for &b in &block_ids {
        let successors = successors_of(&func.blocks[b].term);
        if successors.len() < 2 {
            continue;
        }
        for s in successors {
            if func.blocks[s].preds.len() < 2 {
                continue;
            }
            let edge = func.blocks.push(crate::lir::LirBlock {
                preds: vec![b],
                term: Some(LirTerm::Goto(s)),
                ..Default::default()
            });
            if let Some(term) = &mut func.blocks[b].term {
                retarget(term, s, edge);
            }
            if let Some(slot) = func.blocks[s].preds.iter_mut().find(|p| **p == b) {
                *slot = edge;
            }
        }
    }
}

fn successors_of(term: &Option<LirTerm>) -> Vec<LirBlockId> {
    match term {
        Some(LirTerm::Goto(t)) => vec![*t],
        Some(LirTerm::Branch { then_block, else_block, .. }) => vec![*then_block, *else_block],
        Some(LirTerm::Return(_)) | None => Vec::new(),
    }
}

fn retarget(term: &mut LirTerm, from: LirBlockId, to: LirBlockId) {
    match term {
        LirTerm::Goto(t) if *t == from => *t = to,
        LirTerm::Branch { then_block, else_block, .. } => {
            if *then_block == from {
                *then_block = to;
            }
            if *else_block == from {
                *else_block = to;
            }
        }
        _ => {}
    }
}

struct Positions {
    /// One slot per block (where its phis are deemed to happen),
    /// followed by one slot per instruction, one slot for the
    /// terminator's uses.
    block_start: FxHashMap<LirBlockId, u32>,
    block_end: FxHashMap<LirBlockId, u32>,
    inst_pos: Vec<Vec<u32>>,
    term_pos: FxHashMap<LirBlockId, u32>,
    order: Vec<LirBlockId>,
}

fn number_positions(func: &LirFunction) -> Positions {
    let order = func.blocks_in_layout_order();
    let mut block_start = FxHashMap::default();
    let mut block_end = FxHashMap::default();
    let mut term_pos = FxHashMap::default();
    let mut inst_pos = vec![Vec::new(); func.blocks.len()];
    let mut pos = 0u32;

    for &b in &order {
        block_start.insert(b, pos);
        pos += 1; // phis
        let block = &func.blocks[b];
        let positions = &mut inst_pos[b.index()];
        for _ in &block.insts {
            positions.push(pos);
            pos += 1;
        }
        term_pos.insert(b, pos);
        pos += 1;
        block_end.insert(b, pos);
    }

    Positions { block_start, block_end, inst_pos, term_pos, order }
}

fn compute_liveness(func: &LirFunction, pos: &Positions) -> (FxHashMap<LirBlockId, HashSet<VReg>>, FxHashMap<LirBlockId, HashSet<VReg>>) {
    let mut live_in: FxHashMap<LirBlockId, HashSet<VReg>> = FxHashMap::default();
    let mut live_out: FxHashMap<LirBlockId, HashSet<VReg>> = FxHashMap::default();
    for &b in &pos.order {
        live_in.insert(b, HashSet::new());
        live_out.insert(b, HashSet::new());
    }

    let uses_of = |block: &crate::lir::LirBlock| -> HashSet<VReg> {
        let mut s = HashSet::new();
        for inst in &block.insts {
            for u in &inst.inputs {
                s.insert(u.value);
            }
        }
        if let Some(term) = &block.term {
            match term {
                LirTerm::Branch { cond, .. } => {
                    s.insert(cond.value);
                }
                LirTerm::Return(Some(v)) => {
                    s.insert(v.value);
                }
                _ => {}
            }
        }
        s
    };
    let defs_of = |block: &crate::lir::LirBlock| -> HashSet<VReg> {
        let mut s = HashSet::new();
        for phi in &block.phis {
            s.insert(phi.output);
        }
        for inst in &block.insts {
            if let Some(o) = inst.output {
                s.insert(o);
            }
        }
        s
    };

    let mut changed = true;
    while changed {
        changed = false;
        for &b in pos.order.iter().rev() {
            let block = &func.blocks[b];
            let mut out = HashSet::new();
            for s in successors_of(&block.term) {
                let s_block = &func.blocks[s];
                let s_in = &live_in[&s];
                for &v in s_in {
                    if !s_block.phis.iter().any(|p| p.output == v) {
                        out.insert(v);
                    }
                }
                if let Some(edge_index) = s_block.preds.iter().position(|&p| p == b) {
                    for phi in &s_block.phis {
                        out.insert(phi.inputs[edge_index]);
                    }
                }
            }
            let uses = uses_of(block);
            let defs = defs_of(block);
            let mut new_in = uses.clone();
            for &v in &out {
                if !defs.contains(&v) {
                    new_in.insert(v);
                }
            }
            if new_in != live_in[&b] {
                live_in.insert(b, new_in);
                changed = true;
            }
            if out != live_out[&b] {
                live_out.insert(b, out);
                changed = true;
            }
        }
    }

    (live_in, live_out)
}

fn build_intervals(
    func: &LirFunction,
    pos: &Positions,
    live_out: &FxHashMap<LirBlockId, HashSet<VReg>>,
) -> FxHashMap<VReg, Interval> {
    let mut intervals: FxHashMap<VReg, Interval> = FxHashMap::default();

    for &b in pos.order.iter().rev() {
        let block = &func.blocks[b];
        let start = pos.block_start[&b];
        let end = pos.block_end[&b];
        let mut live: HashSet<VReg> = live_out[&b].clone();

        for &v in &live {
            intervals.entry(v).or_default().add_range(start, end);
        }

        if let Some(term) = &block.term {
            let term_pos = pos.term_pos[&b];
            match term {
                LirTerm::Branch { cond, .. } => {
                    let iv = intervals.entry(cond.value).or_default();
                    iv.add_range(start, term_pos + 1);
                    iv.register_uses.push(term_pos);
                    live.insert(cond.value);
                }
                LirTerm::Return(Some(v)) => {
                    let iv = intervals.entry(v.value).or_default();
                    iv.add_range(start, term_pos + 1);
                    iv.register_uses.push(term_pos);
                    live.insert(v.value);
                }
                _ => {}
            }
        }

        for (i, inst) in block.insts.iter().enumerate().rev() {
            let p = pos.inst_pos[b.index()][i];
            if let Some(out) = inst.output {
                let iv = intervals.entry(out).or_default();
                iv.set_from(p);
                live.remove(&out);
            }
            for u in &inst.inputs {
                let iv = intervals.entry(u.value).or_default();
                iv.add_range(start, p + 1);
                if matches!(u.kind, UseKind::Register | UseKind::Fixed(_)) {
                    iv.register_uses.push(p);
                }
                live.insert(u.value);
            }
        }

        for phi in &block.phis {
            if let Some(iv) = intervals.get_mut(&phi.output) {
                iv.set_from(start);
            }
            live.remove(&phi.output);
        }
    }

    intervals
}

/// Assigns every vreg a register or spill slot and lays out the
/// frame, mutating `func` in place.
pub fn allocate(func: &mut LirFunction) {
    split_critical_edges(func);
    let pos = number_positions(func);
    let (_live_in, live_out) = compute_liveness(func, &pos);
    let intervals = build_intervals(func, &pos, &live_out);

    let mut order: Vec<VReg> = intervals.keys().copied().collect();
    order.sort_by_key(|v| intervals[v].start());

    let mut assignment: FxHashMap<VReg, Operand> = FxHashMap::default();
    let mut active: Vec<(VReg, PhysicalRegister)> = Vec::new();
    let mut frame = StackFrame::new();
    let mut spill_slots: FxHashMap<VReg, i32> = FxHashMap::default();
    let mut clobbered: HashSet<PhysicalRegister> = HashSet::new();

    for vreg in order {
        let interval = &intervals[&vreg];
        let start = interval.start();
        let end = interval.end();
        if start == u32::MAX {
            continue;
        }

        active.retain(|(v, _)| intervals[v].end() > start);

        if let Some(&fixed) = func.fixed_outputs.get(&vreg) {
            assignment.insert(vreg, Operand::Register(fixed));
            active.push((vreg, fixed));
            clobbered.insert(fixed);
            continue;
        }

        let occupied: HashSet<PhysicalRegister> =
            active.iter().filter(|(v, _)| intervals[v].overlaps(start, end)).map(|(_, r)| *r).collect();
        // Registers pinned elsewhere in the function for an ABI
        // purpose may still overlap a normal interval's range; treat
        // any fixed_outputs assignment that overlaps as occupied too.
        let fixed_occupied: HashSet<PhysicalRegister> = func
            .fixed_outputs
            .iter()
            .filter(|(v, _)| intervals.get(v).is_some_and(|iv| iv.overlaps(start, end)))
            .map(|(_, r)| *r)
            .collect();

        let free_reg = PhysicalRegister::ALLOCATABLE
            .iter()
            .find(|r| !occupied.contains(r) && !fixed_occupied.contains(r))
            .copied();

        match free_reg {
            Some(reg) => {
                assignment.insert(vreg, Operand::Register(reg));
                active.push((vreg, reg));
                clobbered.insert(reg);
            }
            None => {
                // AllocateBlockedReg: spill whichever of the current
                // interval or an active blocker has the furthest next
                // use; the loser gets a stack slot for its whole life.
                let blocker = active
                    .iter()
                    .filter(|(v, _)| intervals[v].overlaps(start, end))
                    .min_by_key(|(v, _)| intervals[v].next_use_after(start));
                let spill_vreg = match blocker {
                    Some(&(blocker_vreg, reg))
                        if intervals[&blocker_vreg].next_use_after(start) < interval.next_use_after(start) =>
                    {
                        active.retain(|(v, _)| *v != blocker_vreg);
                        assignment.insert(vreg, Operand::Register(reg));
                        active.push((vreg, reg));
                        blocker_vreg
                    }
                    _ => vreg,
                };
                let slot = *spill_slots.entry(spill_vreg).or_insert_with(|| frame.allocate_spill_slot());
                assignment.insert(spill_vreg, Operand::Slot(slot as u32));
            }
        }
    }

    let callee_saved: Vec<PhysicalRegister> =
        clobbered.iter().copied().filter(|r| r.is_callee_saved()).collect();
    frame.layout(spill_slots.len() as u32, &callee_saved);

    resolve_phis(func, &assignment);

    func.allocation = assignment;
    func.frame_size = frame.frame_size;
    func.spill_slot_count = spill_slots.len() as u32;
}

/// Materializes phi semantics as parallel moves on block edges
/// (spec.md §4.7). Every edge into a phi-bearing block is now
/// unambiguous: either the predecessor has a single successor (use
/// its `gap_out`) or the successor has a single predecessor thanks to
/// `split_critical_edges` (use the successor's `gap_in`).
fn resolve_phis(func: &mut LirFunction, assignment: &FxHashMap<VReg, Operand>) {
    let loc = |v: VReg| -> Operand { assignment.get(&v).copied().unwrap_or(Operand::Immediate(0)) };

    let block_ids: Vec<LirBlockId> = func.blocks.indices().collect();
    for &s in &block_ids {
        let phis = func.blocks[s].phis.clone();
        let preds = func.blocks[s].preds.clone();
        if phis.is_empty() {
            continue;
        }
        for (edge_index, &pred) in preds.iter().enumerate() {
            let moves: Vec<(Operand, Operand)> = phis
                .iter()
                .map(|phi| (loc(phi.inputs[edge_index]), loc(phi.output)))
                .filter(|(from, to)| from != to)
                .collect();
            if moves.is_empty() {
                continue;
            }
            let pred_has_one_successor = successors_of(&func.blocks[pred].term).len() == 1;
            if pred_has_one_successor {
                func.blocks[pred].gap_out.extend(moves);
            } else {
                func.blocks[s].gap_in.extend(moves);
            }
        }
    }
}

/// Turns a function's `Operand::Slot` assignments and fixed-register
/// uses into concrete offsets/registers the emitter reads directly;
/// exposed so `candor-codegen` doesn't need to re-derive frame layout.
pub fn frame_for(func: &LirFunction) -> StackFrame {
    let clobbered: Vec<PhysicalRegister> = func
        .allocation
        .values()
        .filter_map(|op| match op {
            Operand::Register(r) if r.is_callee_saved() => Some(*r),
            _ => None,
        })
        .collect();
    let mut frame = StackFrame::new();
    frame.layout(func.spill_slot_count, &clobbered);
    frame
}
