//! System V AMD64 calling convention used for both outgoing Candor
//! calls and the one entry point each compiled function exposes to a
//! caller (spec.md §4.6, §6.2's native callback ABI).
//!
//! Every Candor value is a single tagged word, so unlike a
//! statically-typed ABI there is no float register class to classify
//! arguments into — everything is an integer/pointer argument.

use crate::lir::PhysicalRegister;

pub struct SystemVAbi;

impl SystemVAbi {
    pub const ARG_REGS: [PhysicalRegister; 6] = PhysicalRegister::ARG_REGS;
    pub const RET_REG: PhysicalRegister = PhysicalRegister::RETURN_REG;

    pub fn get_arg_register(index: usize) -> Option<PhysicalRegister> {
        Self::ARG_REGS.get(index).copied()
    }

    pub fn is_stack_arg(arg_index: usize) -> bool {
        arg_index >= Self::ARG_REGS.len()
    }

    /// Offset of an outgoing/incoming stack argument relative to `rsp`
    /// at the call instruction (first stack arg sits right after the
    /// return address the `call` instruction pushes).
    pub fn get_stack_arg_offset(arg_index: usize) -> i32 {
        debug_assert!(Self::is_stack_arg(arg_index));
        let stack_idx = arg_index - Self::ARG_REGS.len();
        8 + (stack_idx as i32 * 8)
    }

    /// Registers the callee must preserve across the call, per the
    /// ABI (`rbp`/`rsp` are frame-pointer registers the emitter
    /// manages directly and are not part of `PhysicalRegister`'s
    /// allocatable set). `R13`/`R14`/`R15` are never allocated to a
    /// vreg, so they never show up in a function's actual clobber set,
    /// but they're still genuinely callee-saved: that's what lets the
    /// self pointer, running context, and stub context survive a call
    /// into an ordinary `extern "C"` stub without this port having to
    /// save and restore them by hand at every call site.
    pub fn get_callee_saved_regs() -> Vec<PhysicalRegister> {
        PhysicalRegister::ALLOCATABLE
            .iter()
            .copied()
            .filter(|r| r.is_callee_saved())
            .chain([PhysicalRegister::R13, PhysicalRegister::R14, PhysicalRegister::R15])
            .collect()
    }
}

#[cfg(test)]
mod abi_tests {
    use super::*;

    #[test]
    fn arg_registers() {
        assert_eq!(SystemVAbi::get_arg_register(0), Some(PhysicalRegister::Rdi));
        assert_eq!(SystemVAbi::get_arg_register(5), Some(PhysicalRegister::R9));
        assert_eq!(SystemVAbi::get_arg_register(6), None);
    }

    #[test]
    fn stack_arg_detection() {
        assert!(!SystemVAbi::is_stack_arg(0));
        assert!(!SystemVAbi::is_stack_arg(5));
        assert!(SystemVAbi::is_stack_arg(6));
        assert_eq!(SystemVAbi::get_stack_arg_offset(6), 8);
        assert_eq!(SystemVAbi::get_stack_arg_offset(7), 16);
    }

    #[test]
    fn callee_saved_regs() {
        let saved = SystemVAbi::get_callee_saved_regs();
        assert!(saved.contains(&PhysicalRegister::Rbx));
        assert!(saved.contains(&PhysicalRegister::R15));
        assert!(!saved.contains(&PhysicalRegister::Rax));
    }
}
