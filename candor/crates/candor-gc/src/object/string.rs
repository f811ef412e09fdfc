//! String representation: flat and cons (spec.md §9 Open Question 1).
//!
//! Flat strings store their length, a lazily computed hash, and bytes
//! inline. Cons strings store only two child pointers; `flatten`
//! walks the cons tree iteratively (never recursively, so native
//! stack use stays bounded regardless of concatenation depth) and
//! caches the result back into the left child slot so repeated
//! `sizeof`/equality/hash calls are O(1) after the first.

use crate::object::header::{RawHeader, HEADER_SIZE};
use crate::value::{StringRepr, Tag, Word};

const LENGTH_OFFSET: usize = HEADER_SIZE;
const HASH_OFFSET: usize = HEADER_SIZE + 8;
const FLAT_BYTES_OFFSET: usize = HEADER_SIZE + 16;
const CONS_LEFT_OFFSET: usize = HEADER_SIZE + 16;
const CONS_RIGHT_OFFSET: usize = HEADER_SIZE + 24;

/// Sentinel meaning "hash not yet computed"; strings rarely hash to
/// exactly zero, and a collision just costs a redundant recompute.
const HASH_UNSET: u64 = 0;

pub struct FlatStringView(pub *mut u8);

impl FlatStringView {
    pub fn bytes_for_len(len: usize) -> usize {
        let payload = 16 + len;
        HEADER_SIZE + (payload + 7) / 8 * 8
    }

    pub unsafe fn init(ptr: *mut u8, bytes: &[u8]) {
        let size_words = ((Self::bytes_for_len(bytes.len()) - HEADER_SIZE) / 8) as u32;
        RawHeader::init(ptr, Tag::String, StringRepr::Flat as u8, size_words, 0);
        *(ptr.add(LENGTH_OFFSET) as *mut u64) = bytes.len() as u64;
        *(ptr.add(HASH_OFFSET) as *mut u64) = HASH_UNSET;
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.add(FLAT_BYTES_OFFSET), bytes.len());
    }

    #[inline]
    pub unsafe fn len(ptr: *const u8) -> usize {
        *(ptr.add(LENGTH_OFFSET) as *const u64) as usize
    }

    #[inline]
    pub unsafe fn bytes<'a>(ptr: *const u8) -> &'a [u8] {
        std::slice::from_raw_parts(ptr.add(FLAT_BYTES_OFFSET), Self::len(ptr))
    }

    pub unsafe fn hash(ptr: *mut u8) -> u64 {
        let cached = *(ptr.add(HASH_OFFSET) as *const u64);
        if cached != HASH_UNSET {
            return cached;
        }
        let h = fnv1a(Self::bytes(ptr));
        let h = if h == HASH_UNSET { 1 } else { h };
        *(ptr.add(HASH_OFFSET) as *mut u64) = h;
        h
    }
}

pub struct ConsStringView(pub *mut u8);

impl ConsStringView {
    pub const SIZE: usize = HEADER_SIZE + 32;

    pub unsafe fn init(ptr: *mut u8, left: Word, right: Word, total_len: u64) {
        RawHeader::init(ptr, Tag::String, StringRepr::Cons as u8, ((Self::SIZE - HEADER_SIZE) / 8) as u32, 0);
        *(ptr.add(LENGTH_OFFSET) as *mut u64) = total_len;
        *(ptr.add(HASH_OFFSET) as *mut u64) = HASH_UNSET;
        *(ptr.add(CONS_LEFT_OFFSET) as *mut Word) = left;
        *(ptr.add(CONS_RIGHT_OFFSET) as *mut Word) = right;
    }

    #[inline]
    pub unsafe fn len(ptr: *const u8) -> usize {
        *(ptr.add(LENGTH_OFFSET) as *const u64) as usize
    }
    #[inline]
    pub unsafe fn left(ptr: *const u8) -> Word {
        *(ptr.add(CONS_LEFT_OFFSET) as *const Word)
    }
    #[inline]
    pub unsafe fn right(ptr: *const u8) -> Word {
        *(ptr.add(CONS_RIGHT_OFFSET) as *const Word)
    }
    #[inline]
    pub unsafe fn set_left(ptr: *mut u8, left: Word) {
        *(ptr.add(CONS_LEFT_OFFSET) as *mut Word) = left;
    }
    #[inline]
    pub unsafe fn set_right(ptr: *mut u8, right: Word) {
        *(ptr.add(CONS_RIGHT_OFFSET) as *mut Word) = right;
    }
}

/// Reads the flattened byte content of any string value, regardless
/// of representation, without mutating the heap. Used by read-only
/// callers (hashing for Map keys, equality); callers that can afford
/// an allocation should prefer `Heap::flatten_string`, which caches
/// the result in place per spec.md §9 OQ1.
pub unsafe fn flattened_bytes(tag_ptr: *const u8) -> Vec<u8> {
    match string_repr_of(tag_ptr) {
        StringRepr::Flat => FlatStringView::bytes(tag_ptr).to_vec(),
        StringRepr::Cons => {
            let mut out = Vec::with_capacity(ConsStringView::len(tag_ptr));
            // Iterative in-order walk: recursion depth would otherwise
            // be bounded only by concatenation count.
            let mut work = vec![Word::from_ptr(tag_ptr)];
            while let Some(w) = work.pop() {
                let p = w.as_ptr().expect("string node");
                match string_repr_of(p) {
                    StringRepr::Flat => out.extend_from_slice(FlatStringView::bytes(p)),
                    StringRepr::Cons => {
                        // push right then left so left is processed first
                        work.push(ConsStringView::right(p));
                        work.push(ConsStringView::left(p));
                    }
                }
            }
            out
        }
    }
}

unsafe fn string_repr_of(ptr: *const u8) -> StringRepr {
    match *ptr.add(1) {
        0 => StringRepr::Flat,
        1 => StringRepr::Cons,
        other => panic!("corrupt string representation byte {other}"),
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}
