//! Object and Array layout (spec.md §3.2).
//!
//! Both carry a cached hash mask, a pointer to their backing `Map`,
//! and a proto pointer; arrays additionally track a length and use the
//! dense fast path while `size <= dense_length_max`.

use crate::object::header::{RawHeader, HEADER_SIZE};
use crate::value::{Tag, Word};

const MAP_OFFSET: usize = HEADER_SIZE;
const PROTO_OFFSET: usize = HEADER_SIZE + 8;
const HASH_MASK_OFFSET: usize = HEADER_SIZE + 16;
const ARRAY_LENGTH_OFFSET: usize = HEADER_SIZE + 24;

pub const OBJECT_SIZE: usize = HEADER_SIZE + 24; // map, proto, hash_mask (padded to a word)
pub const ARRAY_SIZE: usize = HEADER_SIZE + 32; // + length

#[derive(Clone, Copy)]
pub struct ObjectView(pub *mut u8);

impl ObjectView {
    pub unsafe fn init(ptr: *mut u8, map: Word, proto: Word) {
        RawHeader::init(ptr, Tag::Object, 0, ((OBJECT_SIZE - HEADER_SIZE) / 8) as u32, 0);
        Self::set_map(ptr, map);
        Self::set_proto(ptr, proto);
        Self::set_hash_mask(ptr, 0);
    }

    #[inline]
    pub unsafe fn map(ptr: *const u8) -> Word {
        *(ptr.add(MAP_OFFSET) as *const Word)
    }
    #[inline]
    pub unsafe fn set_map(ptr: *mut u8, map: Word) {
        *(ptr.add(MAP_OFFSET) as *mut Word) = map;
    }
    #[inline]
    pub unsafe fn proto(ptr: *const u8) -> Word {
        *(ptr.add(PROTO_OFFSET) as *const Word)
    }
    #[inline]
    pub unsafe fn set_proto(ptr: *mut u8, proto: Word) {
        *(ptr.add(PROTO_OFFSET) as *mut Word) = proto;
    }
    #[inline]
    pub unsafe fn hash_mask(ptr: *const u8) -> u64 {
        *(ptr.add(HASH_MASK_OFFSET) as *const u64)
    }
    #[inline]
    pub unsafe fn set_hash_mask(ptr: *mut u8, mask: u64) {
        *(ptr.add(HASH_MASK_OFFSET) as *mut u64) = mask;
    }
}

#[derive(Clone, Copy)]
pub struct ArrayView(pub *mut u8);

impl ArrayView {
    pub unsafe fn init(ptr: *mut u8, map: Word, proto: Word) {
        RawHeader::init(ptr, Tag::Array, 0, ((ARRAY_SIZE - HEADER_SIZE) / 8) as u32, 0);
        *(ptr.add(MAP_OFFSET) as *mut Word) = map;
        *(ptr.add(PROTO_OFFSET) as *mut Word) = proto;
        *(ptr.add(HASH_MASK_OFFSET) as *mut u64) = 0;
        *(ptr.add(ARRAY_LENGTH_OFFSET) as *mut u64) = 0;
    }

    #[inline]
    pub unsafe fn map(ptr: *const u8) -> Word {
        *(ptr.add(MAP_OFFSET) as *const Word)
    }
    #[inline]
    pub unsafe fn set_map(ptr: *mut u8, map: Word) {
        *(ptr.add(MAP_OFFSET) as *mut Word) = map;
    }
    #[inline]
    pub unsafe fn proto(ptr: *const u8) -> Word {
        *(ptr.add(PROTO_OFFSET) as *const Word)
    }
    #[inline]
    pub unsafe fn set_proto(ptr: *mut u8, proto: Word) {
        *(ptr.add(PROTO_OFFSET) as *mut Word) = proto;
    }
    #[inline]
    pub unsafe fn length(ptr: *const u8) -> u64 {
        *(ptr.add(ARRAY_LENGTH_OFFSET) as *const u64)
    }
    #[inline]
    pub unsafe fn set_length(ptr: *mut u8, len: u64) {
        *(ptr.add(ARRAY_LENGTH_OFFSET) as *mut u64) = len;
    }

    /// An array is dense iff its backing map's capacity is at most
    /// `dense_length_max` and every key so far has been a small
    /// integer index; beyond that it degrades to the hash-probing path
    /// exactly as any Object would.
    pub unsafe fn is_dense(ptr: *const u8, dense_length_max: usize) -> bool {
        use crate::object::map::MapView;
        MapView::capacity(Self::map(ptr).as_ptr().expect("array map")) <= dense_length_max as u64
    }
}
