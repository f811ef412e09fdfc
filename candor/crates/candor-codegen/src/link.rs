//! Placing a register-allocated function tree onto a code page and
//! patching every relocation against the page's final addresses
//! (spec.md §4.8: "relocation entries are patched against the chunk's
//! final address").
//!
//! `emit::emit_function` only ever sees offsets relative to its own
//! function's start — it has no idea where on a page it will end up,
//! what address a sibling nested closure gets, or where a given root
//! constant's heap value lives. This module is the one place all
//! three of those become known at once: after every function in the
//! tree has been allocated, emitted, and copied onto a page, its
//! `Relocation`s are patched in place by writing the resolved 8-byte
//! absolute address directly into the page's executable memory.

use candor_gc::object::scalar::{BooleanView, NumberView, BOOLEAN_SIZE, NUMBER_SIZE};
use candor_gc::object::string::FlatStringView;
use candor_gc::{Gc, NoStackRoots, Word};
use candor_lir::{LirFunction, RootConstantValue};

use crate::asm::RelocPurpose;
use crate::emit::{emit_function, EmittedFunction};
use crate::error::{CodeGenError, Result};
use crate::page::CodePage;
use crate::source_map::ChunkSourceMap;
use crate::stubs::StubTable;

/// Allocates the heap value a root constant names. Interned at
/// compile time, once per function, directly in old space: a minor
/// collection never moves a cross-space object (`candor_gc::gc::Collector::trace_slot`'s
/// soft-mark branch), so the raw address baked into `RootConstant`'s
/// `movabs` stays valid across every collection this chunk's own
/// execution triggers, short of an old-space compaction.
fn materialize_root_constant(gc: &mut Gc, value: &RootConstantValue) -> Result<Word> {
    unsafe {
        match value {
            RootConstantValue::True => {
                let ptr = gc
                    .allocate_old(BOOLEAN_SIZE, &NoStackRoots)
                    .map_err(|e| CodeGenError::Internal(e.to_string()))?;
                BooleanView::init(ptr, true);
                Ok(Word::from_ptr(ptr))
            }
            RootConstantValue::False => {
                let ptr = gc
                    .allocate_old(BOOLEAN_SIZE, &NoStackRoots)
                    .map_err(|e| CodeGenError::Internal(e.to_string()))?;
                BooleanView::init(ptr, false);
                Ok(Word::from_ptr(ptr))
            }
            RootConstantValue::Number(bits) => {
                let ptr = gc
                    .allocate_old(NUMBER_SIZE, &NoStackRoots)
                    .map_err(|e| CodeGenError::Internal(e.to_string()))?;
                NumberView::init(ptr, f64::from_bits(*bits));
                Ok(Word::from_ptr(ptr))
            }
            RootConstantValue::String(symbol) => {
                let bytes = symbol.as_str().as_bytes();
                let ptr = gc
                    .allocate_old(FlatStringView::bytes_for_len(bytes.len()), &NoStackRoots)
                    .map_err(|e| CodeGenError::Internal(e.to_string()))?;
                FlatStringView::init(ptr, bytes);
                Ok(Word::from_ptr(ptr))
            }
        }
    }
}

/// One function's emitted bytes, its materialized root constants, and
/// its nested function literals' own `LoweredUnit`s — built
/// bottom-up, `nested[i]` in this vector matching `AllocateFunction { nested_index: i }`.
struct LoweredUnit {
    emitted: EmittedFunction,
    root_constants: Vec<Word>,
    children: Vec<LoweredUnit>,
}

fn lower_and_emit(func: &mut LirFunction, gc: &mut Gc) -> Result<LoweredUnit> {
    candor_lir::allocate(func);
    let emitted = emit_function(func)?;
    let mut root_constants = Vec::with_capacity(func.root_constants.len());
    for value in &func.root_constants {
        root_constants.push(materialize_root_constant(gc, value)?);
    }
    let mut children = Vec::with_capacity(func.nested.len());
    for nested in &mut func.nested {
        children.push(lower_and_emit(nested, gc)?);
    }
    Ok(LoweredUnit { emitted, root_constants, children })
}

/// A unit's code copied onto a page, alongside everything a
/// relocation patch or a source map needs once its final address is
/// known.
struct PlacedUnit {
    entry: *const u8,
    size: usize,
    root_constants: Vec<Word>,
    relocations: Vec<crate::asm::Relocation>,
    source_map: ChunkSourceMap,
    children: Vec<PlacedUnit>,
}

fn place_unit(unit: LoweredUnit, page: &std::rc::Rc<std::cell::RefCell<CodePage>>) -> Result<PlacedUnit> {
    let entry = page.borrow_mut().place(&unit.emitted.code)?;
    let source_map = ChunkSourceMap::from_relative(entry as usize, &unit.emitted.source_map);
    let mut children = Vec::with_capacity(unit.children.len());
    for child in unit.children {
        children.push(place_unit(child, page)?);
    }
    Ok(PlacedUnit {
        entry,
        size: unit.emitted.code.len(),
        root_constants: unit.root_constants,
        relocations: unit.emitted.relocations,
        source_map,
        children,
    })
}

/// Writes `addr` as a little-endian `u64` at `base + offset`, into
/// memory `CodePage::place` already proved belongs to this page.
unsafe fn patch(base: *const u8, offset: usize, addr: u64) {
    let dst = (base as usize + offset) as *mut u64;
    std::ptr::write_unaligned(dst, addr);
}

fn patch_unit(unit: &PlacedUnit, stubs: &StubTable) -> Result<()> {
    for reloc in &unit.relocations {
        if reloc.offset + 8 > unit.size {
            return Err(CodeGenError::RelocationOutOfRange(reloc.offset));
        }
        let addr = match reloc.purpose {
            RelocPurpose::RootConstant(idx) => unit
                .root_constants
                .get(idx as usize)
                .ok_or_else(|| CodeGenError::Internal(format!("root constant {idx} out of range")))?
                .raw(),
            RelocPurpose::NestedFunctionEntry(idx) => unit
                .children
                .get(idx as usize)
                .ok_or_else(|| CodeGenError::Internal(format!("nested function {idx} out of range")))?
                .entry as u64,
            RelocPurpose::Stub(id) => stubs.address(id),
            RelocPurpose::PicCell(_) => {
                // No emitted instruction references this purpose yet —
                // `emit.rs`'s property-access lowering always takes
                // the generic stub path (DESIGN.md's PIC fast-path
                // simplification).
                return Err(CodeGenError::Internal("PicCell relocation has no backing emitter support".into()));
            }
        };
        unsafe { patch(unit.entry, reloc.offset, addr) };
    }
    for child in &unit.children {
        patch_unit(child, stubs)?;
    }
    Ok(())
}

/// Result of placing and linking one top-level compiled function
/// (and everything it nests) onto a page.
pub struct LinkedChunk {
    pub entry: *const u8,
    /// Byte size of the top-level function's own code, not counting
    /// any nested closures placed alongside it on the same page.
    pub size: usize,
    pub source_map: ChunkSourceMap,
}

/// Register-allocates, emits, places, and relocates an entire
/// function tree, returning the top-level entry point and a combined
/// source map covering it and every nested closure (`ChunkSourceMap::merge`).
pub fn link(func: &mut LirFunction, gc: &mut Gc, stubs: &StubTable, page: &std::rc::Rc<std::cell::RefCell<CodePage>>) -> Result<LinkedChunk> {
    let lowered = lower_and_emit(func, gc)?;
    let placed = place_unit(lowered, page)?;
    patch_unit(&placed, stubs)?;
    let size = placed.size;
    let source_map = ChunkSourceMap::merge(collect_source_maps(&placed));
    Ok(LinkedChunk { entry: placed.entry, size, source_map })
}

fn collect_source_maps(unit: &PlacedUnit) -> Vec<ChunkSourceMap> {
    let mut maps = vec![unit.source_map.clone()];
    for child in &unit.children {
        maps.extend(collect_source_maps(child));
    }
    maps
}
