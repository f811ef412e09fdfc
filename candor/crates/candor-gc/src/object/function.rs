//! Function layout (spec.md §3.2): parent context, entry address, root
//! context, declared argument count. Native (binding) functions are
//! marked by a sentinel tag stored in the parent-context slot so the
//! GC and the call path can tell a JIT function from a native callback
//! without a separate discriminant byte.

use crate::object::header::{RawHeader, HEADER_SIZE};
use crate::value::{Tag, Word};

pub const PARENT_CTX_OFFSET: usize = HEADER_SIZE;
pub const ENTRY_OFFSET: usize = HEADER_SIZE + 8;
pub const ROOT_CTX_OFFSET: usize = HEADER_SIZE + 16;
pub const ARGC_OFFSET: usize = HEADER_SIZE + 24;

pub const SIZE: usize = HEADER_SIZE + 32;

/// Sentinel written into the parent-context slot of a binding
/// function. Not a valid heap pointer (odd, tagged as if it were a
/// small integer) so ordinary tracing skips it like any other smi.
pub const BINDING_SENTINEL: Word = Word::smi(-1);

pub struct FunctionView(pub *mut u8);

impl FunctionView {
    pub unsafe fn init(ptr: *mut u8, parent_context: Word, entry: u64, root_context: Word, argc: u32) {
        RawHeader::init(ptr, Tag::Function, 0, ((SIZE - HEADER_SIZE) / 8) as u32, 0);
        *(ptr.add(PARENT_CTX_OFFSET) as *mut Word) = parent_context;
        *(ptr.add(ENTRY_OFFSET) as *mut u64) = entry;
        *(ptr.add(ROOT_CTX_OFFSET) as *mut Word) = root_context;
        *(ptr.add(ARGC_OFFSET) as *mut u64) = argc as u64;
    }

    pub unsafe fn init_binding(ptr: *mut u8, native_fn: u64, root_context: Word, argc: u32) {
        Self::init(ptr, BINDING_SENTINEL, native_fn, root_context, argc);
    }

    #[inline]
    pub unsafe fn parent_context(ptr: *const u8) -> Word {
        *(ptr.add(PARENT_CTX_OFFSET) as *const Word)
    }
    #[inline]
    pub unsafe fn is_binding(ptr: *const u8) -> bool {
        Self::parent_context(ptr) == BINDING_SENTINEL
    }
    #[inline]
    pub unsafe fn entry(ptr: *const u8) -> u64 {
        *(ptr.add(ENTRY_OFFSET) as *const u64)
    }
    #[inline]
    pub unsafe fn set_entry(ptr: *mut u8, entry: u64) {
        *(ptr.add(ENTRY_OFFSET) as *mut u64) = entry;
    }
    #[inline]
    pub unsafe fn root_context(ptr: *const u8) -> Word {
        *(ptr.add(ROOT_CTX_OFFSET) as *const Word)
    }
    #[inline]
    pub unsafe fn argc(ptr: *const u8) -> u32 {
        *(ptr.add(ARGC_OFFSET) as *const u64) as u32
    }
}
