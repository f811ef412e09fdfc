//! Raw host-owned byte buffers and the `CWrapper` pattern for hiding a
//! native Rust value behind a `Value` (spec.md §6.1 `CData`), grounded
//! on `original_source/test/test-api.cc`'s `WrapTest`/`SubWrapTest`
//! and `CWrapper::HasClass`/`Unwrap`.
//!
//! A `CWrapper` stashes a magic tag in the first eight bytes of a
//! `CData`'s contents; `unwrap`/`unwrap_mut` refuse to hand back a
//! reference unless the tag matches, so a `Value` arriving from script
//! code can't be reinterpreted as the wrong native type. The
//! original's `Ref`/`Unref` manual refcounting has no counterpart here
//! — the wrapped value's destructor runs when its owning `CData`'s
//! backing bytes are reclaimed is not modeled (this heap never runs
//! Drop on reclaimed bytes, spec.md §9); wrap only `Copy`-cheap or
//! otherwise drop-trivial types.

use candor_gc::object::scalar::CDataView;
use candor_gc::{Tag, Word};

use crate::error::{Result, RuntimeError};
use crate::handle::HandleScope;
use crate::value::Value;

impl Value {
    /// Allocates an opaque `len`-byte buffer (spec.md §6.1 `CData::New`).
    pub fn cdata(scope: &mut HandleScope, len: usize) -> Value {
        let word = unsafe {
            let ptr = scope.isolate().alloc(CDataView::bytes_for_len(len)).expect("allocator exhausted");
            CDataView::init(ptr, len);
            Word::from_ptr(ptr)
        };
        scope.local(word)
    }

    /// The raw bytes of a `CData` value, or `None` if this isn't one
    /// (spec.md §6.1 `CData::GetContents`).
    pub fn cdata_contents(&self) -> Option<&mut [u8]> {
        let ptr = self.word().as_ptr()?;
        if unsafe { candor_gc::object::RawHeader::tag(ptr) } != Tag::CData {
            return None;
        }
        Some(unsafe { CDataView::contents(ptr) })
    }
}

/// Implemented by a native Rust type that wants to travel through
/// script code as an opaque `Value`.
pub trait CWrapper: Sized {
    /// Distinct per wrapped type; pick any value not already used by
    /// another `CWrapper` sharing an `Isolate`.
    const MAGIC: u64;

    /// Wraps `self` behind a `CData` value tagged with `Self::MAGIC`.
    fn wrap(self, scope: &mut HandleScope) -> Value {
        let value = Value::cdata(scope, 8 + std::mem::size_of::<Self>());
        let contents = value.cdata_contents().expect("just allocated as CData");
        contents[0..8].copy_from_slice(&Self::MAGIC.to_ne_bytes());
        unsafe { std::ptr::write(contents[8..].as_mut_ptr() as *mut Self, self) };
        value
    }

    /// Checks the magic tag without touching the payload (spec.md's
    /// `CWrapper::HasClass`).
    fn has_class(value: &Value) -> bool {
        match value.cdata_contents() {
            Some(bytes) if bytes.len() >= 8 => u64::from_ne_bytes(bytes[0..8].try_into().expect("checked len")) == Self::MAGIC,
            _ => false,
        }
    }

    /// Borrows the wrapped value, failing if `value` isn't a `CData`
    /// tagged with `Self::MAGIC` (spec.md's `CWrapper::Unwrap`).
    fn unwrap(value: &Value) -> Result<&Self> {
        if !Self::has_class(value) {
            return Err(RuntimeError::TypeError("CData does not match the expected CWrapper type".to_string()));
        }
        let bytes = value.cdata_contents().expect("checked by has_class");
        Ok(unsafe { &*(bytes[8..].as_ptr() as *const Self) })
    }

    /// Mutably borrows the wrapped value, same check as [`unwrap`](Self::unwrap).
    fn unwrap_mut(value: &Value) -> Result<&mut Self> {
        if !Self::has_class(value) {
            return Err(RuntimeError::TypeError("CData does not match the expected CWrapper type".to_string()));
        }
        let bytes = value.cdata_contents().expect("checked by has_class");
        Ok(unsafe { &mut *(bytes[8..].as_mut_ptr() as *mut Self) })
    }
}
