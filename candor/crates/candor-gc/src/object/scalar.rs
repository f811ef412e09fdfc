//! Boxed Number/Boolean and the opaque CData byte buffer.

use crate::object::header::{RawHeader, HEADER_SIZE};
use crate::value::Tag;

pub const NUMBER_SIZE: usize = HEADER_SIZE + 8;
pub const BOOLEAN_SIZE: usize = HEADER_SIZE + 8;

pub struct NumberView(pub *mut u8);

impl NumberView {
    pub unsafe fn init(ptr: *mut u8, value: f64) {
        RawHeader::init(ptr, Tag::Number, 0, 1, 0);
        *(ptr.add(HEADER_SIZE) as *mut f64) = value;
    }
    #[inline]
    pub unsafe fn value(ptr: *const u8) -> f64 {
        *(ptr.add(HEADER_SIZE) as *const f64)
    }
}

pub struct BooleanView(pub *mut u8);

impl BooleanView {
    pub unsafe fn init(ptr: *mut u8, value: bool) {
        RawHeader::init(ptr, Tag::Boolean, 0, 1, 0);
        *ptr.add(HEADER_SIZE) = value as u8;
    }
    #[inline]
    pub unsafe fn value(ptr: *const u8) -> bool {
        *ptr.add(HEADER_SIZE) != 0
    }
}

/// A raw byte buffer whose lifetime is tied to the Value that owns it
/// (spec.md §6.1 CData). `CWrapper` layers a magic tag inside the
/// first 8 bytes of the buffer so `HasClass`/`Unwrap` can validate a
/// native pointer's type before casting it.
pub struct CDataView(pub *mut u8);

impl CDataView {
    const LENGTH_OFFSET: usize = HEADER_SIZE;
    const BYTES_OFFSET: usize = HEADER_SIZE + 8;

    pub fn bytes_for_len(len: usize) -> usize {
        HEADER_SIZE + 8 + (len + 7) / 8 * 8
    }

    pub unsafe fn init(ptr: *mut u8, len: usize) {
        let size_words = ((Self::bytes_for_len(len) - HEADER_SIZE) / 8) as u32;
        RawHeader::init(ptr, Tag::CData, 0, size_words, 0);
        *(ptr.add(Self::LENGTH_OFFSET) as *mut u64) = len as u64;
    }

    #[inline]
    pub unsafe fn len(ptr: *const u8) -> usize {
        *(ptr.add(Self::LENGTH_OFFSET) as *const u64) as usize
    }

    #[inline]
    pub unsafe fn contents<'a>(ptr: *const u8) -> &'a mut [u8] {
        std::slice::from_raw_parts_mut(ptr.add(Self::BYTES_OFFSET) as *mut u8, Self::len(ptr))
    }
}
