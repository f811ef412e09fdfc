//! Heap configuration.
//!
//! Mirrors the teacher's `fgc::config` shape: a plain struct with
//! documented defaults, overridable by the embedder or the CLI.

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde-config", derive(serde::Serialize, serde::Deserialize))]
pub struct HeapConfig {
    /// Bytes per heap page (both spaces). Matches the host page size by
    /// default so pages can be mapped with `mmap` directly.
    pub page_size: usize,
    /// Number of pages initially reserved for new space.
    pub new_space_pages: usize,
    /// Number of pages initially reserved for old space.
    pub old_space_pages: usize,
    /// Generation counter at or above which an object is considered to
    /// live in old space for tracing purposes.
    pub old_space_generation: u32,
    /// Arrays with at most this many occupied slots stay dense
    /// (integer keys index directly instead of hashing through the map).
    pub dense_length_max: usize,
    /// Load factor (numerator over 16) past which a Map's backing table
    /// doubles and rehashes.
    pub map_load_factor_16: usize,
    /// Runs a minor collection before every single allocation instead
    /// of only once new space is exhausted. Exercises the moving
    /// collector far harder than ordinary runs do, for scenarios that
    /// need a collection forced after every allocating instruction.
    pub stress_every_allocation: bool,
}

impl Default for HeapConfig {
    fn default() -> Self {
        let page_size = page_size::get().max(4096);
        HeapConfig {
            page_size,
            new_space_pages: 4,
            old_space_pages: 16,
            old_space_generation: 1,
            dense_length_max: 256,
            map_load_factor_16: 12, // 75%
            stress_every_allocation: false,
        }
    }
}

impl HeapConfig {
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.page_size == 0 || self.page_size % page_size::get().max(1) != 0 {
            return Err(crate::error::GcError::Configuration(format!(
                "page_size {} is not a multiple of the system page size",
                self.page_size
            )));
        }
        if self.new_space_pages == 0 {
            return Err(crate::error::GcError::Configuration(
                "new_space_pages must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
