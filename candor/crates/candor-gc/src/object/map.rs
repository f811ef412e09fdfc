//! Hidden maps: open-addressed key/value tables backing Objects and
//! Arrays (spec.md §3.2, §4.9).
//!
//! Layout after the header: `capacity: u64`, `occupied: u64`,
//! `pic_id: u64`, then `capacity` key words followed by `capacity`
//! value words. A slot is empty iff its key is nil; P3 (spec §8.1)
//! requires the paired value slot to be nil too.
//!
//! `pic_id` has no bearing on lookup/insert/remove; it exists purely
//! so `candor-codegen`'s inline caches have a stable identity for this
//! map that survives a moving collection (the map's own address
//! doesn't). A freshly initialized map carries [`NO_PIC_ID`] until a
//! PIC call site first touches it and lazily assigns one.

use crate::object::header::{RawHeader, HEADER_SIZE};
use crate::value::{Tag, Word};

const CAP_OFFSET: usize = HEADER_SIZE;
const OCC_OFFSET: usize = HEADER_SIZE + 8;
const PIC_ID_OFFSET: usize = HEADER_SIZE + 16;
pub(crate) const SLOTS_OFFSET: usize = HEADER_SIZE + 24;

pub const INITIAL_CAPACITY: u64 = 4;

/// Sentinel `pic_id` meaning "no inline-cache identity assigned yet".
pub const NO_PIC_ID: u64 = u64::MAX;

/// A typed, non-owning view over a Map object's bytes.
#[derive(Clone, Copy)]
pub struct MapView(pub *mut u8);

impl MapView {
    /// Bytes needed to hold a map of the given key capacity.
    pub fn bytes_for_capacity(capacity: u64) -> usize {
        HEADER_SIZE + 24 + (capacity as usize) * 16
    }

    /// Initializes a freshly allocated, all-nil map of `capacity` slots.
    pub unsafe fn init(ptr: *mut u8, capacity: u64) {
        let size_words = ((Self::bytes_for_capacity(capacity) - HEADER_SIZE) / 8) as u32;
        RawHeader::init(ptr, Tag::Map, 0, size_words, 0);
        *(ptr.add(CAP_OFFSET) as *mut u64) = capacity;
        *(ptr.add(OCC_OFFSET) as *mut u64) = 0;
        *(ptr.add(PIC_ID_OFFSET) as *mut u64) = NO_PIC_ID;
        for i in 0..capacity {
            Self::key_slot(ptr, i).write(Word::NIL);
            Self::value_slot(ptr, i).write(Word::NIL);
        }
    }

    /// This map's stable inline-cache identity, or [`NO_PIC_ID`] if
    /// none has been assigned yet.
    #[inline]
    pub unsafe fn pic_id(ptr: *const u8) -> u64 {
        *(ptr.add(PIC_ID_OFFSET) as *const u64)
    }

    #[inline]
    pub unsafe fn set_pic_id(ptr: *mut u8, id: u64) {
        *(ptr.add(PIC_ID_OFFSET) as *mut u64) = id;
    }

    #[inline]
    pub unsafe fn capacity(ptr: *const u8) -> u64 {
        *(ptr.add(CAP_OFFSET) as *const u64)
    }

    #[inline]
    pub unsafe fn occupied(ptr: *const u8) -> u64 {
        *(ptr.add(OCC_OFFSET) as *const u64)
    }

    #[inline]
    unsafe fn set_occupied(ptr: *mut u8, n: u64) {
        *(ptr.add(OCC_OFFSET) as *mut u64) = n;
    }

    #[inline]
    unsafe fn key_slot(ptr: *mut u8, index: u64) -> *mut Word {
        (ptr.add(SLOTS_OFFSET) as *mut Word).add(index as usize)
    }

    #[inline]
    unsafe fn value_slot(ptr: *mut u8, index: u64) -> *mut Word {
        let cap = Self::capacity(ptr);
        (ptr.add(SLOTS_OFFSET) as *mut Word).add((cap + index) as usize)
    }

    /// Whether inserting one more entry would exceed the configured
    /// load factor and require a grow-and-rehash.
    pub unsafe fn needs_growth(ptr: *const u8, load_factor_16: usize) -> bool {
        let cap = Self::capacity(ptr);
        if cap == 0 {
            return true;
        }
        let occ = Self::occupied(ptr) + 1;
        (occ as u128) * 16 > (cap as u128) * (load_factor_16 as u128)
    }

    fn hash_key(key: Word) -> u64 {
        // Small integers hash to themselves; heap keys (strings) hash
        // by their raw word, which is sufficient because map keys are
        // compared for exact identity/equality before use by callers.
        key.raw().wrapping_mul(0x9E3779B97F4A7C15)
    }

    /// Looks up `key`'s slot index via linear probing. Returns the
    /// index of an existing entry, or `None` if the map is full and
    /// the key is absent (caller must grow first).
    pub unsafe fn probe(ptr: *const u8, key: Word, key_eq: impl Fn(Word, Word) -> bool) -> Option<u64> {
        let cap = Self::capacity(ptr);
        if cap == 0 {
            return None;
        }
        let mask = cap - 1;
        let mut i = Self::hash_key(key) & mask;
        for _ in 0..cap {
            let slot_key = *Self::key_slot(ptr as *mut u8, i);
            if slot_key.is_nil() || key_eq(slot_key, key) {
                return Some(i);
            }
            i = (i + 1) & mask;
        }
        None
    }

    pub unsafe fn get(ptr: *const u8, key: Word, key_eq: impl Fn(Word, Word) -> bool) -> Word {
        match Self::probe(ptr, key, key_eq) {
            Some(i) if !(*Self::key_slot(ptr as *mut u8, i)).is_nil() => {
                *Self::value_slot(ptr as *mut u8, i)
            }
            _ => Word::NIL,
        }
    }

    /// Inserts or overwrites `key -> value`. Caller must have already
    /// grown the map if `needs_growth` would return true for a new key.
    pub unsafe fn insert(ptr: *mut u8, key: Word, value: Word, key_eq: impl Fn(Word, Word) -> bool) {
        let slot = Self::probe(ptr, key, &key_eq).expect("insert into full map without growth");
        let was_empty = (*Self::key_slot(ptr, slot)).is_nil();
        Self::key_slot(ptr, slot).write(key);
        Self::value_slot(ptr, slot).write(value);
        if was_empty {
            Self::set_occupied(ptr, Self::occupied(ptr) + 1);
        }
    }

    /// Removes `key` if present, restoring the P3 invariant (key nil
    /// iff value nil) by re-inserting the probe chain after it.
    pub unsafe fn remove(ptr: *mut u8, key: Word, key_eq: impl Fn(Word, Word) -> bool) {
        let cap = Self::capacity(ptr);
        let Some(mut hole) = Self::probe(ptr, key, &key_eq) else { return };
        if (*Self::key_slot(ptr, hole)).is_nil() {
            return;
        }
        Self::key_slot(ptr, hole).write(Word::NIL);
        Self::value_slot(ptr, hole).write(Word::NIL);
        Self::set_occupied(ptr, Self::occupied(ptr) - 1);

        // Close the probe chain: classic open-addressing deletion.
        let mask = cap - 1;
        let mut i = (hole + 1) & mask;
        loop {
            let k = *Self::key_slot(ptr, i);
            if k.is_nil() {
                break;
            }
            let ideal = Self::hash_key(k) & mask;
            let displaced = if i >= hole { ideal <= hole || ideal > i } else { ideal <= hole && ideal > i };
            if displaced {
                let v = *Self::value_slot(ptr, i);
                Self::key_slot(ptr, hole).write(k);
                Self::value_slot(ptr, hole).write(v);
                Self::key_slot(ptr, i).write(Word::NIL);
                Self::value_slot(ptr, i).write(Word::NIL);
                hole = i;
            }
            i = (i + 1) & mask;
        }
    }

    /// Slot index of `key` if present directly in this map (not a
    /// prototype's). Used by the PIC fast path to record a cache entry
    /// without re-probing on the next hit.
    pub unsafe fn find(ptr: *const u8, key: Word, key_eq: impl Fn(Word, Word) -> bool) -> Option<u64> {
        match Self::probe(ptr, key, &key_eq) {
            Some(i) if !(*Self::key_slot(ptr as *mut u8, i)).is_nil() => Some(i),
            _ => None,
        }
    }

    /// Byte offset of slot `index`'s value word from this map
    /// object's own address. Stable until the map grows or is
    /// replaced, which is exactly the lifetime a PIC entry needs.
    #[inline]
    pub unsafe fn value_slot_offset(ptr: *const u8, index: u64) -> u32 {
        (Self::value_slot(ptr as *mut u8, index) as usize - ptr as usize) as u32
    }

    /// Copies every occupied `(key, value)` pair into a fresh, larger
    /// backing table. Returns the entries for the new map's caller to
    /// write via `insert`.
    pub unsafe fn entries(ptr: *const u8) -> Vec<(Word, Word)> {
        let cap = Self::capacity(ptr);
        let mut out = Vec::new();
        for i in 0..cap {
            let k = *Self::key_slot(ptr as *mut u8, i);
            if !k.is_nil() {
                out.push((k, *Self::value_slot(ptr as *mut u8, i)));
            }
        }
        out
    }

    pub fn next_capacity(current: u64) -> u64 {
        if current == 0 {
            INITIAL_CAPACITY
        } else {
            current * 2
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eq(a: Word, b: Word) -> bool {
        a == b
    }

    #[test]
    fn insert_get_remove_roundtrip() {
        let mut buf = vec![0u8; MapView::bytes_for_capacity(4)];
        let ptr = buf.as_mut_ptr();
        unsafe {
            MapView::init(ptr, 4);
            MapView::insert(ptr, Word::smi(1), Word::smi(100), eq);
            MapView::insert(ptr, Word::smi(2), Word::smi(200), eq);
            assert_eq!(MapView::get(ptr, Word::smi(1), eq), Word::smi(100));
            assert_eq!(MapView::get(ptr, Word::smi(2), eq), Word::smi(200));
            MapView::remove(ptr, Word::smi(1), eq);
            assert_eq!(MapView::get(ptr, Word::smi(1), eq), Word::NIL);
            assert_eq!(MapView::get(ptr, Word::smi(2), eq), Word::smi(200));
        }
    }

    #[test]
    fn growth_threshold_trips_at_load_factor() {
        let mut buf = vec![0u8; MapView::bytes_for_capacity(4)];
        let ptr = buf.as_mut_ptr();
        unsafe {
            MapView::init(ptr, 4);
            assert!(!MapView::needs_growth(ptr, 12));
            MapView::insert(ptr, Word::smi(1), Word::smi(1), eq);
            MapView::insert(ptr, Word::smi(2), Word::smi(1), eq);
            assert!(MapView::needs_growth(ptr, 12));
        }
    }
}
