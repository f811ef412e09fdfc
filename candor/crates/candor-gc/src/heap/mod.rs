//! Heap & spaces (component A, spec.md §4.1).

pub mod page;

use crate::config::HeapConfig;
use crate::error::Result;
use page::Page;

/// What the mutator has asked the collector to do before the next
/// allocation can proceed. Set by a space when it can't satisfy a
/// request from any of its pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcRequest {
    None,
    NewSpace,
    OldSpace,
}

/// A sequence of fixed-granularity pages, all belonging to the same
/// generation. Allocation scans forward from the current page; when
/// none have room a fresh page is mapped, up to `max_pages`.
pub struct Space {
    pages: Vec<Page>,
    current: usize,
    page_size: usize,
    max_pages: usize,
    generation: u16,
}

impl Space {
    pub fn new(page_size: usize, initial_pages: usize, max_pages: usize, generation: u16) -> Result<Space> {
        let mut pages = Vec::with_capacity(initial_pages.max(1));
        for _ in 0..initial_pages.max(1) {
            pages.push(Page::new(page_size, generation)?);
        }
        Ok(Space {
            pages,
            current: 0,
            page_size,
            max_pages: max_pages.max(initial_pages.max(1)),
            generation,
        })
    }

    pub fn try_allocate(&mut self, size: usize) -> Option<*mut u8> {
        if size > self.page_size {
            return None; // no large-object space; caller must size pages accordingly
        }
        loop {
            if let Some(p) = self.pages.get_mut(self.current).and_then(|p| p.try_allocate(size)) {
                return Some(p);
            }
            if self.current + 1 < self.pages.len() {
                self.current += 1;
                continue;
            }
            if self.pages.len() >= self.max_pages {
                return None;
            }
            match Page::new(self.page_size, self.generation) {
                Ok(page) => {
                    self.pages.push(page);
                    self.current = self.pages.len() - 1;
                }
                Err(_) => return None,
            }
        }
    }

    /// Drops every page's contents and resets bump pointers to the
    /// start, without unmapping. Used to recycle the space just
    /// collected out of (its survivors have already been copied
    /// elsewhere).
    pub fn reset(&mut self) {
        for page in &mut self.pages {
            page.reset();
        }
        self.current = 0;
    }

    pub fn contains(&self, ptr: *const u8) -> bool {
        self.pages.iter().any(|p| p.contains(ptr))
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn used_bytes(&self) -> usize {
        self.pages.iter().map(|p| p.used()).sum()
    }

    pub fn capacity_bytes(&self) -> usize {
        self.pages.len() * self.page_size
    }
}

/// Owns both generations. `needs_gc` is the process-wide flag runtime
/// stubs check at every safepoint (spec.md §4.8).
pub struct Heap {
    pub config: HeapConfig,
    pub new_space: Space,
    pub old_space: Space,
    pub needs_gc: GcRequest,
    /// Set by native code immediately before calling back into a C
    /// helper, so the collector knows where to start walking the
    /// mutator stack (spec.md §4.1, §4.2 root source 2).
    pub last_stack: Option<usize>,
    pub last_frame: Option<usize>,
}

impl Heap {
    pub fn new(config: HeapConfig) -> Result<Heap> {
        config.validate()?;
        let new_space = Space::new(config.page_size, config.new_space_pages, config.new_space_pages * 4, 0)?;
        let old_space = Space::new(
            config.page_size,
            config.old_space_pages,
            config.old_space_pages * 8,
            config.old_space_generation,
        )?;
        Ok(Heap {
            config,
            new_space,
            old_space,
            needs_gc: GcRequest::None,
            last_stack: None,
            last_frame: None,
        })
    }

    pub fn space_of(&self, ptr: *const u8) -> Option<&Space> {
        if self.new_space.contains(ptr) {
            Some(&self.new_space)
        } else if self.old_space.contains(ptr) {
            Some(&self.old_space)
        } else {
            None
        }
    }
}
