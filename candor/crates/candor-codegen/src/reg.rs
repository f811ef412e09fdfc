//! Maps `candor_lir`'s target-agnostic `PhysicalRegister` onto the
//! concrete x86-64 encoding the assembler needs: a 4-bit register
//! number (3 bits in the ModRM/SIB byte, the high bit folded into the
//! REX prefix) (`original_source/x64/assembler-x64-inl.h`'s
//! `emit_rex_if_high`/`emit_modrm`).

use candor_lir::lir::PhysicalRegister;

/// `(low 3 bits, REX.B/R/X extension bit)` for one general-purpose
/// register, per the System V/AMD64 encoding table. `rsp`/`rbp` are
/// not represented here: the emitter manages the frame pointer and
/// stack pointer directly rather than through the allocator.
pub fn encoding(reg: PhysicalRegister) -> (u8, bool) {
    match reg {
        PhysicalRegister::Rax => (0, false),
        PhysicalRegister::Rcx => (1, false),
        PhysicalRegister::Rdx => (2, false),
        PhysicalRegister::Rbx => (3, false),
        PhysicalRegister::Rsi => (6, false),
        PhysicalRegister::Rdi => (7, false),
        PhysicalRegister::R8 => (0, true),
        PhysicalRegister::R9 => (1, true),
        PhysicalRegister::R10 => (2, true),
        PhysicalRegister::R11 => (3, true),
        PhysicalRegister::R12 => (4, true),
        PhysicalRegister::R13 => (5, true),
        PhysicalRegister::R14 => (6, true),
        PhysicalRegister::R15 => (7, true),
    }
}

/// The synthetic encodings for `rsp`/`rbp`, used only by the emitter's
/// own prologue/epilogue and spill-slot addressing, never handed out
/// by the register allocator.
pub const RSP: u8 = 4;
pub const RBP: u8 = 5;
