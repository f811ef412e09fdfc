//! A minimal x86-64 byte-emitting assembler, grounded on
//! `original_source/x64/assembler-x64-inl.h`'s REX/ModRM construction
//! and raw little-endian `emitb`/`emitw`/`emitl`/`emitq` helpers.
//!
//! Unlike the original this only emits the instruction shapes the
//! LIR lowering in `emit.rs` actually needs: register moves, memory
//! loads/stores relative to `rbp`, integer arithmetic/compare,
//! `call`/`jmp`/`jcc` through forward-patchable labels, and `push`/
//! `pop`/`ret`. There's no general operand-kind dispatch because LIR
//! never asks for one.

use crate::reg::{self, RBP, RSP};
use candor_lir::lir::PhysicalRegister;
use candor_util::Span;

/// An opaque jump target, bound to a byte offset once the block it
/// names has been emitted. Forward references are common (a branch
/// always precedes at least one of its targets), so binding and
/// reference are two separate steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(pub usize);

/// Condition codes used by `jcc`, named after the comparison that sets them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cond {
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Zero,
    NotZero,
}

impl Cond {
    fn tttn(self) -> u8 {
        match self {
            Cond::Equal | Cond::Zero => 0x4,
            Cond::NotEqual | Cond::NotZero => 0x5,
            Cond::Less => 0xC,
            Cond::GreaterEqual => 0xD,
            Cond::LessEqual => 0xE,
            Cond::Greater => 0xF,
        }
    }
}

/// What a chunk-level relocation resolves to once the chunk's home
/// page address and the function's allocated root constants are both
/// known (spec.md §4.8: "relocation entries are patched against the
/// chunk's final address").
#[derive(Debug, Clone, Copy)]
pub enum RelocPurpose {
    /// Absolute address of `root_constants[index]`'s heap value.
    RootConstant(u32),
    /// Absolute entry address of `nested[index]`, placed on the same page.
    NestedFunctionEntry(u32),
    /// Absolute address of a shared runtime stub.
    Stub(crate::stubs::StubId),
    /// Absolute address of this call site's PIC cell, read by `PICMiss`.
    PicCell(u32),
}

#[derive(Debug, Clone, Copy)]
pub struct Relocation {
    pub offset: usize,
    pub purpose: RelocPurpose,
}

/// One `(jit_offset, source_span)` pair recorded in emission order
/// (spec.md §4.10); turned into absolute-address source-map entries
/// once the chunk is placed.
#[derive(Debug, Clone, Copy)]
pub struct SourceMapEntry {
    pub jit_offset: usize,
    pub span: Span,
}

#[derive(Default)]
pub struct Assembler {
    buf: Vec<u8>,
    labels: Vec<Option<usize>>,
    /// `(patch_offset, label)` for every `jmp`/`jcc` whose rel32
    /// immediate couldn't be filled in until its target was bound.
    fixups: Vec<(usize, Label)>,
    pub relocations: Vec<Relocation>,
    pub source_map: Vec<SourceMapEntry>,
}

impl Assembler {
    pub fn new() -> Assembler {
        Assembler::default()
    }

    pub fn offset(&self) -> usize {
        self.buf.len()
    }

    pub fn record_source(&mut self, span: Span) {
        self.source_map.push(SourceMapEntry { jit_offset: self.offset(), span });
    }

    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    pub fn bind(&mut self, label: Label) {
        self.labels[label.0] = Some(self.offset());
    }

    // ---- raw byte emission -----------------------------------------

    fn emitb(&mut self, b: u8) {
        self.buf.push(b);
    }

    fn emitl(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn emitq(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// REX prefix for a 64-bit-operand instruction: `0100WRXB`, `W`
    /// always set since every Candor word is 64 bits.
    fn emit_rexw(&mut self, reg_high: bool, rm_high: bool) {
        self.emitb(0x48 | ((reg_high as u8) << 2) | (rm_high as u8));
    }

    /// ModRM byte for a register-direct operand (`mod = 11`).
    fn modrm_reg(&mut self, reg_bits: u8, rm_bits: u8) {
        self.emitb(0xC0 | (reg_bits << 3) | rm_bits);
    }

    /// ModRM (+ optional disp8/disp32) for `[rbp + disp]`; `rbp` never
    /// needs a SIB byte since it isn't `rsp`.
    fn modrm_rbp_disp(&mut self, reg_bits: u8, disp: i32) {
        if disp == 0 {
            self.emitb(0x40 | (reg_bits << 3) | RBP);
            self.emitb(0);
        } else if (-128..=127).contains(&disp) {
            self.emitb(0x40 | (reg_bits << 3) | RBP);
            self.emitb(disp as i8 as u8);
        } else {
            self.emitb(0x80 | (reg_bits << 3) | RBP);
            self.emitl(disp as u32);
        }
    }

    // ---- register moves ----------------------------------------------

    pub fn mov_reg_reg(&mut self, dst: PhysicalRegister, src: PhysicalRegister) {
        let (dst_bits, dst_hi) = reg::encoding(dst);
        let (src_bits, src_hi) = reg::encoding(src);
        self.emit_rexw(src_hi, dst_hi);
        self.emitb(0x89); // mov r/m64, r64
        self.modrm_reg(src_bits, dst_bits);
    }

    /// Captures the current `rsp` into `dst`, used only to snapshot the
    /// base of a just-pushed native-callback argument list (spec.md
    /// §6.2) before the push sequence that follows shifts it.
    pub fn mov_reg_rsp(&mut self, dst: PhysicalRegister) {
        let (dst_bits, dst_hi) = reg::encoding(dst);
        self.emit_rexw(false, dst_hi);
        self.emitb(0x89); // mov r/m64, r64
        self.modrm_reg(RSP, dst_bits);
    }

    /// `movabs dst, imm64` — the only way to materialize a full 64-bit
    /// constant (a tagged SMI, a heap address, a stub address).
    pub fn mov_reg_imm64(&mut self, dst: PhysicalRegister, imm: u64) {
        let (dst_bits, dst_hi) = reg::encoding(dst);
        self.emit_rexw(false, dst_hi);
        self.emitb(0xB8 | dst_bits);
        self.emitq(imm);
    }

    /// Loads `dst` from `[rbp + disp]` (a spill slot or an incoming
    /// stack argument).
    pub fn mov_reg_rbp(&mut self, dst: PhysicalRegister, disp: i32) {
        let (dst_bits, dst_hi) = reg::encoding(dst);
        self.emit_rexw(dst_hi, false);
        self.emitb(0x8B); // mov r64, r/m64
        self.modrm_rbp_disp(dst_bits, disp);
    }

    pub fn mov_rbp_reg(&mut self, disp: i32, src: PhysicalRegister) {
        let (src_bits, src_hi) = reg::encoding(src);
        self.emit_rexw(src_hi, false);
        self.emitb(0x89);
        self.modrm_rbp_disp(src_bits, disp);
    }

    /// Loads `dst` from `[base + disp]` — a heap object field.
    pub fn mov_reg_mem(&mut self, dst: PhysicalRegister, base: PhysicalRegister, disp: i32) {
        let (dst_bits, dst_hi) = reg::encoding(dst);
        let (base_bits, base_hi) = reg::encoding(base);
        self.emit_rexw(dst_hi, base_hi);
        self.emitb(0x8B);
        self.modrm_mem_disp(dst_bits, base_bits, disp);
    }

    pub fn mov_mem_reg(&mut self, base: PhysicalRegister, disp: i32, src: PhysicalRegister) {
        let (src_bits, src_hi) = reg::encoding(src);
        let (base_bits, base_hi) = reg::encoding(base);
        self.emit_rexw(src_hi, base_hi);
        self.emitb(0x89);
        self.modrm_mem_disp(src_bits, base_bits, disp);
    }

    fn modrm_mem_disp(&mut self, reg_bits: u8, base_bits: u8, disp: i32) {
        if disp == 0 && base_bits != RBP {
            self.emitb((reg_bits << 3) | base_bits);
        } else if (-128..=127).contains(&disp) {
            self.emitb(0x40 | (reg_bits << 3) | base_bits);
            self.emitb(disp as i8 as u8);
        } else {
            self.emitb(0x80 | (reg_bits << 3) | base_bits);
            self.emitl(disp as u32);
        }
    }

    // ---- arithmetic / compare -----------------------------------------

    fn binary_rr(&mut self, opcode: u8, dst: PhysicalRegister, src: PhysicalRegister) {
        let (dst_bits, dst_hi) = reg::encoding(dst);
        let (src_bits, src_hi) = reg::encoding(src);
        self.emit_rexw(src_hi, dst_hi);
        self.emitb(opcode);
        self.modrm_reg(src_bits, dst_bits);
    }

    pub fn add_reg_reg(&mut self, dst: PhysicalRegister, src: PhysicalRegister) {
        self.binary_rr(0x01, dst, src);
    }
    pub fn sub_reg_reg(&mut self, dst: PhysicalRegister, src: PhysicalRegister) {
        self.binary_rr(0x29, dst, src);
    }
    pub fn and_reg_reg(&mut self, dst: PhysicalRegister, src: PhysicalRegister) {
        self.binary_rr(0x21, dst, src);
    }
    pub fn or_reg_reg(&mut self, dst: PhysicalRegister, src: PhysicalRegister) {
        self.binary_rr(0x09, dst, src);
    }
    pub fn xor_reg_reg(&mut self, dst: PhysicalRegister, src: PhysicalRegister) {
        self.binary_rr(0x31, dst, src);
    }
    pub fn cmp_reg_reg(&mut self, lhs: PhysicalRegister, rhs: PhysicalRegister) {
        self.binary_rr(0x39, lhs, rhs);
    }
    pub fn test_reg_reg(&mut self, a: PhysicalRegister, b: PhysicalRegister) {
        self.binary_rr(0x85, a, b);
    }

    /// `imul dst, src` (two-operand form, `0F AF`).
    pub fn imul_reg_reg(&mut self, dst: PhysicalRegister, src: PhysicalRegister) {
        let (dst_bits, dst_hi) = reg::encoding(dst);
        let (src_bits, src_hi) = reg::encoding(src);
        self.emit_rexw(dst_hi, src_hi);
        self.emitb(0x0F);
        self.emitb(0xAF);
        self.modrm_reg(dst_bits, src_bits);
    }

    /// `sar dst, imm8` — strips the SMI tag bit before a raw-integer
    /// slow path, or restores it by pairing with `shl`/`or`.
    pub fn sar_reg_imm8(&mut self, dst: PhysicalRegister, imm: u8) {
        let (dst_bits, dst_hi) = reg::encoding(dst);
        self.emit_rexw(false, dst_hi);
        self.emitb(0xC1);
        self.modrm_reg(7, dst_bits);
        self.emitb(imm);
    }

    pub fn shl_reg_imm8(&mut self, dst: PhysicalRegister, imm: u8) {
        let (dst_bits, dst_hi) = reg::encoding(dst);
        self.emit_rexw(false, dst_hi);
        self.emitb(0xC1);
        self.modrm_reg(4, dst_bits);
        self.emitb(imm);
    }

    pub fn or_reg_imm8(&mut self, dst: PhysicalRegister, imm: u8) {
        let (dst_bits, dst_hi) = reg::encoding(dst);
        self.emit_rexw(false, dst_hi);
        self.emitb(0x83);
        self.modrm_reg(1, dst_bits);
        self.emitb(imm);
    }

    // ---- stack --------------------------------------------------------

    pub fn push_reg(&mut self, src: PhysicalRegister) {
        let (bits, hi) = reg::encoding(src);
        if hi {
            self.emitb(0x41);
        }
        self.emitb(0x50 | bits);
    }

    pub fn pop_reg(&mut self, dst: PhysicalRegister) {
        let (bits, hi) = reg::encoding(dst);
        if hi {
            self.emitb(0x41);
        }
        self.emitb(0x58 | bits);
    }

    pub fn push_rbp(&mut self) {
        self.emitb(0x55);
    }
    pub fn pop_rbp(&mut self) {
        self.emitb(0x5D);
    }
    pub fn mov_rbp_rsp(&mut self) {
        self.emit_rexw(false, false);
        self.emitb(0x89);
        self.modrm_reg(RSP, RBP);
    }
    pub fn mov_rsp_rbp(&mut self) {
        self.emit_rexw(false, false);
        self.emitb(0x89);
        self.modrm_reg(RBP, RSP);
    }

    pub fn sub_rsp_imm32(&mut self, imm: i32) {
        self.emit_rexw(false, false);
        self.emitb(0x81);
        self.modrm_reg(5, RSP);
        self.emitl(imm as u32);
    }
    pub fn add_rsp_imm32(&mut self, imm: i32) {
        self.emit_rexw(false, false);
        self.emitb(0x81);
        self.modrm_reg(0, RSP);
        self.emitl(imm as u32);
    }

    pub fn ret(&mut self) {
        self.emitb(0xC3);
    }

    // ---- control flow ---------------------------------------------------

    pub fn jmp(&mut self, label: Label) {
        self.emitb(0xE9);
        self.fixups.push((self.offset(), label));
        self.emitl(0);
    }

    pub fn jcc(&mut self, cond: Cond, label: Label) {
        self.emitb(0x0F);
        self.emitb(0x80 | cond.tttn());
        self.fixups.push((self.offset(), label));
        self.emitl(0);
    }

    pub fn call_reg(&mut self, target: PhysicalRegister) {
        let (bits, hi) = reg::encoding(target);
        if hi {
            self.emitb(0x41);
        }
        self.emitb(0xFF);
        self.modrm_reg(2, bits);
    }

    /// Indirect call through a 64-bit immediate: `movabs scratch, addr;
    /// call scratch`. Calls to shared stubs and to sibling nested
    /// functions use this rather than a `rel32 call` because the
    /// target and the code page are not guaranteed to be within 2 GiB
    /// of each other once pages are placed by the allocator.
    pub fn call_abs(&mut self, scratch: PhysicalRegister, purpose: RelocPurpose) {
        self.mov_reg_reloc(scratch, purpose);
        self.call_reg(scratch);
    }

    /// `movabs dst, <relocatable address>` without the trailing call.
    pub fn mov_reg_reloc(&mut self, dst: PhysicalRegister, purpose: RelocPurpose) {
        let (bits, hi) = reg::encoding(dst);
        self.emit_rexw(false, hi);
        self.emitb(0xB8 | bits);
        self.relocations.push(Relocation { offset: self.offset(), purpose });
        self.emitq(0);
    }

    pub fn int3(&mut self) {
        self.emitb(0xCC);
    }

    /// Resolves every jump's rel32 immediate now that every label has
    /// been bound, and returns the finished byte buffer alongside the
    /// relocations and source map collected during emission (both
    /// still relative to offset 0 — chunk placement turns them into
    /// absolute addresses).
    pub fn finish(mut self) -> (Vec<u8>, Vec<Relocation>, Vec<SourceMapEntry>) {
        for (patch_at, label) in &self.fixups {
            let target = self.labels[label.0].expect("label referenced but never bound");
            let rel = target as i64 - (*patch_at as i64 + 4);
            let bytes = (rel as i32).to_le_bytes();
            self.buf[*patch_at..*patch_at + 4].copy_from_slice(&bytes);
        }
        (self.buf, self.relocations, self.source_map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mov_reg_reg_encodes_rex_and_modrm() {
        let mut asm = Assembler::new();
        asm.mov_reg_reg(PhysicalRegister::Rax, PhysicalRegister::Rbx);
        let (bytes, _, _) = asm.finish();
        // 48 89 D8  => REX.W, mov r/m64 r64, modrm(11 011 000)
        assert_eq!(bytes, vec![0x48, 0x89, 0xD8]);
    }

    #[test]
    fn movabs_high_register_sets_rex_b() {
        let mut asm = Assembler::new();
        asm.mov_reg_imm64(PhysicalRegister::R9, 0x42);
        let (bytes, _, _) = asm.finish();
        assert_eq!(bytes[0], 0x49); // REX.WB
        assert_eq!(bytes[1], 0xB9); // B8 | 1
        assert_eq!(&bytes[2..10], &0x42u64.to_le_bytes());
    }

    #[test]
    fn forward_jump_patches_after_bind() {
        let mut asm = Assembler::new();
        let target = asm.new_label();
        asm.jmp(target);
        let before_nop_region = asm.offset();
        asm.mov_reg_reg(PhysicalRegister::Rax, PhysicalRegister::Rax);
        asm.bind(target);
        let (bytes, _, _) = asm.finish();
        let rel = i32::from_le_bytes(bytes[1..5].try_into().unwrap());
        assert_eq!(rel, (before_nop_region as i32 + 3) - 5);
    }

    #[test]
    fn call_abs_emits_a_relocation_site() {
        let mut asm = Assembler::new();
        asm.call_abs(PhysicalRegister::Rax, RelocPurpose::RootConstant(0));
        let (bytes, relocs, _) = asm.finish();
        assert_eq!(relocs.len(), 1);
        assert!(bytes.len() > 10);
    }
}
