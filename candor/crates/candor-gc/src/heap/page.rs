//! A single bump-allocated heap page.
//!
//! Each page is one `mmap`'d, read/write region. Allocation never
//! crosses a page boundary: a request that doesn't fit in the current
//! page's remaining room fails and the space moves on (or asks the
//! collector to run).

use crate::error::{GcError, Result};
use memmap2::MmapMut;

pub struct Page {
    map: MmapMut,
    top: usize,
    generation: u16,
}

impl Page {
    pub fn new(size: usize, generation: u16) -> Result<Page> {
        let map = MmapMut::map_anon(size).map_err(|e| GcError::PageMapFailed {
            size,
            reason: e.to_string(),
        })?;
        Ok(Page {
            map,
            top: 0,
            generation,
        })
    }

    #[inline]
    pub fn start(&self) -> *mut u8 {
        self.map.as_ptr() as *mut u8
    }

    #[inline]
    pub fn limit(&self) -> usize {
        self.map.len()
    }

    #[inline]
    pub fn used(&self) -> usize {
        self.top
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.limit() - self.top
    }

    #[inline]
    pub fn generation(&self) -> u16 {
        self.generation
    }

    pub fn contains(&self, ptr: *const u8) -> bool {
        let start = self.start() as usize;
        let addr = ptr as usize;
        addr >= start && addr < start + self.limit()
    }

    /// Bumps the pointer by `size` bytes (word-aligned up) if it fits,
    /// returning the start of the new allocation.
    pub fn try_allocate(&mut self, size: usize) -> Option<*mut u8> {
        let size = (size + 7) & !7;
        if self.remaining() < size {
            return None;
        }
        let ptr = unsafe { self.start().add(self.top) };
        self.top += size;
        Some(ptr)
    }

    /// Resets the bump pointer to the start, discarding all objects.
    /// Used after a collection empties a from-space page.
    pub fn reset(&mut self) {
        self.top = 0;
    }
}
