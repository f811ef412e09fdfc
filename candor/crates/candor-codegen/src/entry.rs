//! Host-to-JIT entry trampoline (spec.md §4.8's `Entry` stub): the one
//! place outside JIT-emitted code that establishes the `r15`/`r10`
//! register convention `emit.rs` assumes on entry and jumps into
//! compiled machine code. Everything below the embedding boundary
//! (`candor_runtime::Value::call`) reaches this instead of hand-writing
//! the same `asm!` block at every call site.
//!
//! `original_source/stubs.h`'s `Entry` stub is itself a few bytes of
//! hand-assembled prologue; this is its Rust-native equivalent, callable
//! directly rather than addressed through the stub table, since nothing
//! JIT-emitted ever calls it — only host code crossing into Candor does.

use candor_gc::object::function::FunctionView;
use candor_gc::Word;

use crate::stubs::StubContext;

/// Invokes a compiled (non-binding) `Function` with up to six
/// positional arguments, exactly the registers `LirOp::EntryArg` reads
/// out of (`candor-lir::SystemVAbi::ARG_REGS`). A seventh argument
/// would need the outgoing-stack-slot convention Candor-to-Candor
/// calls use, which this trampoline — built only for the host
/// boundary — does not implement.
///
/// # Safety
/// `function` must be a heap `Function` whose `entry` is real machine
/// code placed by `candor_codegen::link::link` on a page still mapped
/// executable, not a binding's native function pointer.
pub unsafe fn call_entry(ctx: *mut StubContext, function: Word, args: &[Word]) -> Word {
    assert!(args.len() <= 6, "call_entry: at most six register arguments are supported");
    let ptr = function.as_ptr().expect("call_entry: function must be a heap object") as *mut u8;
    assert!(!FunctionView::is_binding(ptr), "call_entry: bindings go through StubId::CallBinding's (argc, argv) convention");
    let entry = FunctionView::entry(ptr);

    let mut regs = [0u64; 6];
    for (slot, word) in regs.iter_mut().zip(args.iter()) {
        *slot = word.raw();
    }

    let result: u64;
    std::arch::asm!(
        // `call` itself requires 16-byte stack alignment at the
        // instruction; nothing guarantees that held at this arbitrary
        // point inside a Rust function body, so realign around it.
        "mov r11, rsp",
        "and rsp, -16",
        "call {entry}",
        "mov rsp, r11",
        entry = in(reg) entry,
        in("r15") ctx as u64,
        in("r10") function.raw(),
        in("rdi") regs[0],
        in("rsi") regs[1],
        in("rdx") regs[2],
        in("rcx") regs[3],
        in("r8") regs[4],
        in("r9") regs[5],
        lateout("rax") result,
        out("r11") _,
        clobber_abi("C"),
    );
    Word::from_raw(result)
}
