//! The native callback ABI (spec.md §6.2): a binding `Function` wraps
//! a host `extern "C" fn(argc, argv) -> Word` behind the exact same
//! heap layout a compiled closure uses, distinguished only by the
//! `BINDING_SENTINEL` `FunctionView::init_binding` writes into its
//! parent-context slot — `emit.rs::emit_call` and
//! `candor_codegen::stubs::stub_call_binding` dispatch on that marker
//! without this crate doing anything extra at the call site.

use candor_gc::object::function::{FunctionView, SIZE as FUNCTION_SIZE};
use candor_gc::Word;

use crate::handle::HandleScope;
use crate::value::Value;

/// A host function callable from Candor code. The stack-grows-down
/// layout `emit.rs::emit_native_call` builds on the Candor-to-host
/// call path — `argv[i] = *(argv - i - 1)` — is mirrored by
/// `candor_codegen::stubs::call_binding` on the host-to-host path, so
/// the same signature serves both directions; [`arg`] reads out of
/// either.
pub type NativeFunction = extern "C" fn(argc: i64, argv: *const Word) -> Word;

/// Reads the `index`th argument out of a native callback's `argv`,
/// honoring the `argv[i] = *(argv - i - 1)` convention (spec.md
/// §6.2). `index` must be less than the callback's own `argc`.
///
/// # Safety
/// `argv` must be the pointer a binding `Function` call received, and
/// `index` must be in bounds for the `argc` that came with it.
pub unsafe fn arg(argv: *const Word, index: i64) -> Word {
    *argv.offset(-(index + 1))
}

impl Value {
    /// Wraps `callback` as a callable Candor `Function` (spec.md
    /// §6.2's `Function::New`).
    pub fn native_function(scope: &mut HandleScope, callback: NativeFunction) -> Value {
        let word = unsafe {
            let ptr = scope.isolate().alloc(FUNCTION_SIZE).expect("allocator exhausted");
            FunctionView::init_binding(ptr, callback as usize as u64, Word::NIL, 0);
            Word::from_ptr(ptr)
        };
        scope.local(word)
    }
}
