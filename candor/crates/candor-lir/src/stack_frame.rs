//! Stack frame layout for one compiled function: where the prologue
//! saves callee-saved registers and where spill slots live, expressed
//! as `rbp`-relative byte offsets the emitter turns into real
//! `mov [rbp - N], reg` instructions (spec.md §4.7's "spill slot").

use crate::calling_convention::SystemVAbi;
use crate::lir::PhysicalRegister;

#[derive(Debug, Clone)]
pub struct StackFrame {
    pub frame_size: u32,
    pub saved_rbp_offset: i32,
    pub return_addr_offset: i32,
    pub spill_base_offset: i32,
    pub saved_callee_regs: Vec<(PhysicalRegister, i32)>,
    pub next_spill_slot: i32,
}

impl StackFrame {
    pub fn new() -> Self {
        StackFrame {
            frame_size: 0,
            saved_rbp_offset: 0,
            return_addr_offset: 8,
            spill_base_offset: 0,
            saved_callee_regs: Vec::new(),
            next_spill_slot: 0,
        }
    }

    /// Lays out the frame once the allocator knows how many spill
    /// slots it needs and which callee-saved registers this function
    /// clobbers.
    pub fn layout(&mut self, spill_slot_count: u32, clobbered_callee_saved: &[PhysicalRegister]) {
        let mut size: i32 = 8; // saved rbp
        self.saved_rbp_offset = 0;

        self.saved_callee_regs.clear();
        for &reg in clobbered_callee_saved {
            self.saved_callee_regs.push((reg, size));
            size += 8;
        }

        size = (size + 15) & !15;
        self.spill_base_offset = size;
        self.next_spill_slot = 0;
        size += spill_slot_count as i32 * 8;

        size = (size + 15) & !15;
        self.frame_size = size as u32;
    }

    /// Allocates the next spill slot, returning its index (not an
    /// offset — use `spill_offset` for the `rbp`-relative address).
    pub fn allocate_spill_slot(&mut self) -> i32 {
        let slot = self.next_spill_slot;
        self.next_spill_slot += 1;
        slot
    }

    pub fn spill_offset(&self, slot_index: i32) -> i32 {
        -(self.spill_base_offset + slot_index * 8)
    }

    pub fn get_saved_reg_offset(&self, reg: PhysicalRegister) -> Option<i32> {
        self.saved_callee_regs.iter().find(|(r, _)| *r == reg).map(|(_, offset)| -*offset)
    }
}

impl Default for StackFrame {
    fn default() -> Self {
        Self::new()
    }
}

/// Where an argument beyond the sixth lives in the caller's outgoing
/// stack area, relative to `rbp` after the callee's prologue runs.
pub fn incoming_stack_arg_offset(arg_index: usize) -> i32 {
    16 + SystemVAbi::get_stack_arg_offset(arg_index) - 8
}

#[derive(Debug, Clone, Copy)]
pub enum ParamLocation {
    Register(PhysicalRegister),
    Stack(i32),
}

#[derive(Debug, Clone, Copy)]
pub struct ParamAssignment {
    pub param_index: usize,
    pub location: ParamLocation,
}

impl ParamAssignment {
    pub fn from_systemv(param_index: usize) -> Self {
        let location = match SystemVAbi::get_arg_register(param_index) {
            Some(reg) => ParamLocation::Register(reg),
            None => ParamLocation::Stack(incoming_stack_arg_offset(param_index)),
        };
        ParamAssignment { param_index, location }
    }
}

#[cfg(test)]
mod stack_frame_tests {
    use super::*;

    #[test]
    fn frame_creation() {
        let frame = StackFrame::new();
        assert_eq!(frame.frame_size, 0);
        assert_eq!(frame.return_addr_offset, 8);
    }

    #[test]
    fn frame_layout_aligns_to_16() {
        let mut frame = StackFrame::new();
        frame.layout(3, &[PhysicalRegister::Rbx, PhysicalRegister::R12]);
        assert_eq!(frame.frame_size % 16, 0);
        assert!(frame.saved_callee_regs.iter().any(|(r, _)| *r == PhysicalRegister::Rbx));
    }

    #[test]
    fn spill_slots_are_distinct() {
        let mut frame = StackFrame::new();
        frame.layout(2, &[]);
        let slot1 = frame.allocate_spill_slot();
        let slot2 = frame.allocate_spill_slot();
        assert_ne!(frame.spill_offset(slot1), frame.spill_offset(slot2));
    }

    #[test]
    fn seventh_param_is_on_the_stack() {
        let assign = ParamAssignment::from_systemv(0);
        assert!(matches!(assign.location, ParamLocation::Register(PhysicalRegister::Rdi)));
        let seventh = ParamAssignment::from_systemv(6);
        assert!(matches!(seventh.location, ParamLocation::Stack(_)));
    }
}
