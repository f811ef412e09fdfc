//! Candor's managed heap: tagged values, two-generation copying
//! collection, and the handle registry that roots host references
//! into it (spec.md §2 components A, B, C).
//!
//! This crate has no notion of mutator threads, write barriers, or
//! incremental marking: collection is always a stop-the-world trace
//! from roots, triggered at a safepoint (spec.md §5).

pub mod config;
pub mod error;
pub mod gc;
pub mod handle;
pub mod heap;
pub mod logging;
pub mod object;
pub mod stats;
pub mod value;

pub use config::HeapConfig;
pub use error::{GcError, Result};
pub use gc::{Collector, Generation, NoStackRoots, RootSource};
pub use handle::{HandleRegistry, ScopeId};
pub use heap::{GcRequest, Heap};
pub use value::{Tag, Word};

/// Ties a `Heap` and its `HandleRegistry` together with the allocate
/// retry policy of spec.md §4.1: try new space, else run a minor
/// collection and retry, else escalate to old space, else give up.
pub struct Gc {
    pub heap: Heap,
    pub handles: HandleRegistry,
    pub stats: stats::GcStats,
}

impl Gc {
    pub fn new(config: HeapConfig) -> Result<Gc> {
        Ok(Gc {
            heap: Heap::new(config)?,
            handles: HandleRegistry::new(),
            stats: stats::GcStats::default(),
        })
    }

    /// Allocates `size` bytes, running collections as needed. Returns
    /// an error only once old-space escalation has also failed, which
    /// per spec.md §4.2 is unrecoverable and the runtime should abort.
    pub fn allocate(&mut self, size: usize, stack: &dyn RootSource) -> Result<*mut u8> {
        if self.heap.config.stress_every_allocation {
            self.heap.needs_gc = GcRequest::NewSpace;
            Collector::collect_minor(&mut self.heap, &mut self.handles, stack)?;
            self.stats.record_minor(self.heap.new_space.capacity_bytes() as u64 - self.heap.new_space.used_bytes() as u64);
        }
        if let Some(ptr) = self.heap.new_space.try_allocate(size) {
            return Ok(ptr);
        }
        logging::allocation_failure(size);
        self.heap.needs_gc = GcRequest::NewSpace;
        Collector::collect_minor(&mut self.heap, &mut self.handles, stack)?;
        self.stats.record_minor(self.heap.new_space.capacity_bytes() as u64 - self.heap.new_space.used_bytes() as u64);
        if let Some(ptr) = self.heap.new_space.try_allocate(size) {
            return Ok(ptr);
        }

        self.heap.needs_gc = GcRequest::OldSpace;
        Collector::collect_major(&mut self.heap, &mut self.handles, stack)?;
        self.stats.record_major(self.heap.old_space.capacity_bytes() as u64 - self.heap.old_space.used_bytes() as u64);
        if let Some(ptr) = self.heap.old_space.try_allocate(size) {
            return Ok(ptr);
        }
        Err(GcError::OutOfMemory { requested: size })
    }

    pub fn collect(&mut self, stack: &dyn RootSource) -> Result<()> {
        Collector::collect_minor(&mut self.heap, &mut self.handles, stack)
    }

    /// Allocates directly in old space, running a major collection
    /// inline if needed. Minor collections never move a cross-space
    /// object (`gc::Collector::trace_slot`'s soft-mark branch), so
    /// anything placed here survives every new-space collection that
    /// happens afterward untouched — the one exception a raw address
    /// baked into generated code (`candor_runtime::compile`'s root
    /// constants) can tolerate without a relocation scheme of its own.
    pub fn allocate_old(&mut self, size: usize, stack: &dyn RootSource) -> Result<*mut u8> {
        if let Some(ptr) = self.heap.old_space.try_allocate(size) {
            return Ok(ptr);
        }
        Collector::collect_major(&mut self.heap, &mut self.handles, stack)?;
        self.stats.record_major(self.heap.old_space.capacity_bytes() as u64 - self.heap.old_space.used_bytes() as u64);
        self.heap
            .old_space
            .try_allocate(size)
            .ok_or(GcError::OutOfMemory { requested: size })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_retries_after_minor_collection() {
        let config = HeapConfig {
            page_size: 4096,
            new_space_pages: 1,
            ..HeapConfig::default()
        };
        let mut gc = Gc::new(config).unwrap();
        // Fill new space until it must collect to make room again.
        for _ in 0..1000 {
            let _ = gc.allocate(64, &NoStackRoots);
        }
        assert!(gc.stats.minor_collections > 0);
    }
}
