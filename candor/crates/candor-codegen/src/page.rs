//! Executable code pages and the chunks placed on them
//! (spec.md §4.8, grounded on `original_source/code-space.cc`'s
//! `CodePage`/`CodeChunk`).
//!
//! A page is one `mmap`'d region carrying both the writable/executable
//! code area and an immediately following `PROT_NONE` guard page — any
//! overshoot past the end of the last chunk faults instead of
//! executing garbage. `memmap2::MmapMut` can't express mixed
//! protections within one mapping, so pages are managed with raw
//! `libc::mmap`/`mprotect`/`munmap` calls, the same narrow
//! `unsafe`-scoped layer `candor-gc`'s `heap::page` keeps for the
//! managed heap (spec.md §9's design note on exposing typed views over
//! a small unsafe core).

use std::rc::Rc;
use std::cell::RefCell;

use crate::error::{CodeGenError, Result};

/// One mapped region: `size` bytes of RWX code space followed by
/// `guard_size` bytes of `PROT_NONE`.
pub struct CodePage {
    base: *mut u8,
    size: usize,
    guard_size: usize,
    top: usize,
}

impl CodePage {
    pub fn new(size: usize) -> Result<CodePage> {
        let guard_size = page_size::get();
        let total = size + guard_size;
        let base = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                total,
                libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
                libc::MAP_ANON | libc::MAP_PRIVATE,
                -1,
                0,
            )
        };
        if base == libc::MAP_FAILED {
            return Err(CodeGenError::PageMapFailed {
                size: total,
                reason: std::io::Error::last_os_error().to_string(),
            });
        }
        let base = base as *mut u8;
        // Filling with `int3` (0xCC) means a stray jump into
        // uninitialized code space traps instead of executing
        // whatever garbage happened to be there.
        unsafe {
            std::ptr::write_bytes(base, 0xCC, size);
        }
        let guard_rc = unsafe {
            libc::mprotect(base.add(size) as *mut libc::c_void, guard_size, libc::PROT_NONE)
        };
        if guard_rc != 0 {
            unsafe {
                libc::munmap(base as *mut libc::c_void, total);
            }
            return Err(CodeGenError::ProtectFailed(std::io::Error::last_os_error().to_string()));
        }
        Ok(CodePage { base, size, guard_size, top: 0 })
    }

    pub fn remaining(&self) -> usize {
        self.size - self.top
    }

    /// Copies `code` into the page at the current bump offset, aligned
    /// up to 16 bytes (the System V stack-alignment boundary most
    /// JIT-generated entry points are called against), returning its
    /// absolute start address.
    pub fn place(&mut self, code: &[u8]) -> Result<*const u8> {
        let aligned_top = (self.top + 15) & !15;
        if aligned_top + code.len() > self.size {
            return Err(CodeGenError::ChunkTooLarge { size: code.len() });
        }
        let dst = unsafe { self.base.add(aligned_top) };
        unsafe {
            std::ptr::copy_nonoverlapping(code.as_ptr(), dst, code.len());
        }
        self.top = aligned_top + code.len();
        Ok(dst as *const u8)
    }

    pub fn contains(&self, addr: *const u8) -> bool {
        let start = self.base as usize;
        let a = addr as usize;
        a >= start && a < start + self.size
    }
}

impl Drop for CodePage {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.base as *mut libc::c_void, self.size + self.guard_size);
        }
    }
}

/// One compilation unit's placed code: the function this chunk holds,
/// the page it lives on (kept alive for as long as any chunk
/// references it), and the source text it was compiled from (needed
/// by `GetStackTrace` to report `{filename, source, line, column}`).
pub struct CodeChunk {
    pub filename: String,
    pub source: Rc<str>,
    pub entry: *const u8,
    pub size: usize,
    page: Rc<RefCell<CodePage>>,
}

impl CodeChunk {
    pub fn new(filename: String, source: Rc<str>, entry: *const u8, size: usize, page: Rc<RefCell<CodePage>>) -> CodeChunk {
        CodeChunk { filename, source, entry, size, page }
    }

    pub fn page(&self) -> Rc<RefCell<CodePage>> {
        self.page.clone()
    }
}

/// Finds an existing page with room for `size` bytes, or maps a fresh
/// one sized to the configured page size (or to `size` if larger).
pub fn find_or_create_page(pages: &mut Vec<Rc<RefCell<CodePage>>>, size: usize, default_page_size: usize) -> Result<Rc<RefCell<CodePage>>> {
    for page in pages.iter() {
        if page.borrow().remaining() >= size {
            return Ok(page.clone());
        }
    }
    let page_size = size.max(default_page_size);
    let page = Rc::new(RefCell::new(CodePage::new(page_size)?));
    pages.push(page.clone());
    Ok(page)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn places_code_and_reports_remaining() {
        let mut page = CodePage::new(4096).unwrap();
        let code = [0x90u8; 16];
        let addr = page.place(&code).unwrap();
        assert!(page.contains(addr));
        assert_eq!(page.remaining(), 4096 - 16);
    }

    #[test]
    fn chunk_too_large_is_rejected() {
        let mut page = CodePage::new(64).unwrap();
        let code = vec![0x90u8; 128];
        assert!(page.place(&code).is_err());
    }
}
