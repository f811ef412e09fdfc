//! Polymorphic inline caches (spec.md §4.9), grounded on
//! `original_source/pic.h`/`pic.cc`.
//!
//! Each property-access call site owns one [`PicSite`]: a small,
//! bounded table of `(hidden map identity, offset)` pairs recorded as
//! shapes are observed. A site starts empty, fills as it sees new
//! shapes, and once it would overflow `MAX_PIC_ENTRIES` it is marked
//! megamorphic and falls back to the generic [`crate::stubs::StubId::LookupProperty`]
//! stub for good — spec.md P7: "a PIC, once megamorphic, never reverts."
//! Consulted live from `crate::stubs::stub_pic_load_property`/
//! `stub_pic_store_property`, the bodies behind `StubId::PicMiss`/
//! `PicStoreMiss` that `emit.rs` routes every `LoadPropertyNamed`/
//! `StorePropertyNamed` through.
//!
//! Unlike the original's proto-slot-sentinel invalidation (a cache
//! entry holds a pointer straight into a prototype's property slot,
//! invalidated implicitly whenever that slot moves), this port gives
//! every [`HiddenMapId`] a monotonically increasing version counter:
//! a cached entry also records the version it was built against, and
//! a lookup that finds a stale version treats it as a miss. This
//! trades one extra integer comparison per hit for not needing a
//! pointer into GC-managed memory to stay valid across a moving
//! collection — recorded as a resolved Open Question in DESIGN.md.

use std::collections::HashMap;

/// Identifies a hidden map (an object shape) independent of where its
/// backing allocation currently lives after a moving collection — the
/// map's original allocation order, assigned once and never reused.
pub type HiddenMapId = u64;

pub const MAX_PIC_ENTRIES: usize = 5;

#[derive(Debug, Clone, Copy)]
pub struct PicEntry {
    pub map_id: HiddenMapId,
    pub map_version: u32,
    pub offset: u32,
}

#[derive(Debug, Default)]
pub struct PicSite {
    entries: Vec<PicEntry>,
    megamorphic: bool,
}

impl PicSite {
    pub fn lookup(&self, map_id: HiddenMapId, current_version: u32) -> Option<u32> {
        self.entries
            .iter()
            .find(|e| e.map_id == map_id && e.map_version == current_version)
            .map(|e| e.offset)
    }

    /// Records a newly observed shape. Once a site has seen
    /// `MAX_PIC_ENTRIES` distinct, live shapes it goes megamorphic and
    /// stops recording — that transition is monotonic (P7).
    pub fn record(&mut self, map_id: HiddenMapId, map_version: u32, offset: u32) {
        if self.megamorphic {
            return;
        }
        if let Some(existing) = self.entries.iter_mut().find(|e| e.map_id == map_id) {
            existing.map_version = map_version;
            existing.offset = offset;
            return;
        }
        if self.entries.len() >= MAX_PIC_ENTRIES {
            self.megamorphic = true;
            self.entries.clear();
            return;
        }
        self.entries.push(PicEntry { map_id, map_version, offset });
    }

    pub fn is_megamorphic(&self) -> bool {
        self.megamorphic
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

/// One table per [`crate::code_space::CodeSpace`], indexed by the
/// call-site id the emitter assigned each `LoadPropertyNamed`/
/// `StorePropertyNamed` instruction (`candor_lir::lir::LirOp`'s
/// `site: u32` field).
#[derive(Default)]
pub struct PicTable {
    sites: HashMap<u32, PicSite>,
    next_map_id: HiddenMapId,
    map_versions: HashMap<HiddenMapId, u32>,
}

impl PicTable {
    pub fn new() -> PicTable {
        PicTable::default()
    }

    pub fn site(&mut self, site_id: u32) -> &mut PicSite {
        self.sites.entry(site_id).or_default()
    }

    pub fn allocate_map_id(&mut self) -> HiddenMapId {
        let id = self.next_map_id;
        self.next_map_id += 1;
        self.map_versions.insert(id, 0);
        id
    }

    pub fn current_version(&self, map_id: HiddenMapId) -> u32 {
        *self.map_versions.get(&map_id).unwrap_or(&0)
    }

    /// Bumps a map's version, invalidating every PIC entry that
    /// references it without having to walk every site (spec.md §4.9's
    /// invalidation requirement, met lazily: stale entries are simply
    /// never matched again by `lookup`).
    pub fn invalidate(&mut self, map_id: HiddenMapId) {
        *self.map_versions.entry(map_id).or_insert(0) += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_site_misses() {
        let mut table = PicTable::new();
        assert_eq!(table.site(0).lookup(1, 0), None);
    }

    #[test]
    fn records_and_hits() {
        let mut table = PicTable::new();
        table.site(0).record(1, 0, 16);
        assert_eq!(table.site(0).lookup(1, 0), Some(16));
    }

    #[test]
    fn overflow_goes_megamorphic_and_never_reverts() {
        let mut table = PicTable::new();
        for i in 0..(MAX_PIC_ENTRIES as u64 + 1) {
            table.site(0).record(i, 0, i as u32);
        }
        assert!(table.site(0).is_megamorphic());
        table.site(0).record(999, 0, 1);
        assert!(table.site(0).is_megamorphic());
        assert_eq!(table.site(0).entry_count(), 0);
    }

    #[test]
    fn invalidation_stales_out_existing_entries() {
        let mut table = PicTable::new();
        let map_id = table.allocate_map_id();
        table.site(0).record(map_id, table.current_version(map_id), 8);
        assert_eq!(table.site(0).lookup(map_id, table.current_version(map_id)), Some(8));
        table.invalidate(map_id);
        assert_eq!(table.site(0).lookup(map_id, table.current_version(map_id)), None);
    }
}
