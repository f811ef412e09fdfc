//! Runtime helper stubs (spec.md §4.8): the shared, generated-once
//! routines JIT-emitted code calls into for anything beyond a bare
//! register move — allocation, property access, per-operator binary
//! ops, introspection, and the PIC miss path.
//!
//! `original_source/stubs.h`'s `STUBS_LIST`/`BINARY_STUBS_LIST`
//! stubs are themselves hand-assembled machine code, generated once
//! into a code page exactly like any compiled function. This port
//! takes a different, Rust-native route for the *stub bodies*: they
//! are ordinary `extern "C" fn`s compiled once by `rustc`, and the
//! "stub table" holds their addresses exactly as spec.md describes —
//! "generated once per process and shared". Only the generation
//! mechanism changes (rustc instead of a hand-rolled `MacroAssembler`
//! pass); the call-site contract (indirect call through a shared
//! address, `needs_gc` safepoint check on any allocating path) is
//! unchanged. `emit.rs`'s inline fast paths are what's genuinely
//! hand-assembled; these are the slow paths every fast path falls
//! back to.
//!
//! Every stub receives a [`StubContext`] pointer (kept in `r15` for
//! the whole of a compiled function's execution, spec.md §9's "push
//! the tag tests into accessor methods" narrow unsafe layer) plus up
//! to three `Word` arguments; unused arguments are nil.

use std::collections::HashMap;

use candor_gc::object::{ArrayView, ContextView, FunctionView, MapView, NumberView, ObjectView};
use candor_gc::{Gc, Tag, Word};
use candor_util::Symbol;

use crate::pic::{HiddenMapId, PicTable};

/// Threaded through every stub call: the heap/handle owner, the PIC
/// table stub misses rewrite, and the global object `LoadGlobal`/
/// `StoreGlobal` resolve against. Not a thread-local — spec.md §9's
/// design note reserves thread-local lookup for the embedding
/// boundary (`Isolate::current()`), so every runtime helper takes its
/// context explicitly instead. One `StubContext` is shared by every
/// function a given `Isolate` runs: it is kept in `r15` for a compiled
/// function's entire execution and never rewritten mid-call, unlike
/// the per-function self pointer and running context in `r13`/`r14`
/// (`candor-codegen::emit`).
#[repr(C)]
pub struct StubContext {
    pub gc: *mut Gc,
    pub pics: *mut PicTable,
    pub needs_gc: bool,
    /// The Isolate's global object. `emit.rs` reads this field's
    /// offset via `std::mem::offset_of!` rather than a hand-maintained
    /// constant.
    pub globals: Word,
}

impl StubContext {
    /// Allocates `size` bytes, running a minor collection inline if
    /// needed (spec.md §4.8: "Safepoints occur implicitly at the end
    /// of each allocating stub"). Stack roots are empty here: this
    /// port never walks raw native frames (§9's design note on
    /// replacing global mutable state with explicit context — the
    /// mutator's roots in this codegen are the handle registry and
    /// whatever vregs the register allocator has pinned live across
    /// the call, which the caller is responsible for re-reading from
    /// its own spill slots after any call that might collect).
    unsafe fn alloc(&mut self, size: usize) -> *mut u8 {
        let gc = &mut *self.gc;
        gc.allocate(size, &candor_gc::NoStackRoots).expect("allocator exhausted after escalation")
    }
}

macro_rules! stub_list {
    ($($variant:ident),* $(,)?) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum StubId {
            $($variant,)*
        }
        pub const ALL_STUBS: &[StubId] = &[$(StubId::$variant),*];
    };
}

stub_list! {
    Entry,
    Allocate,
    AllocateObject,
    AllocateFunction,
    AllocateContext,
    CallBinding,
    CollectGarbage,
    Typeof,
    Sizeof,
    Keysof,
    LookupProperty,
    StoreProperty,
    DeleteProperty,
    PicMiss,
    PicStoreMiss,
    CoerceToBoolean,
    CloneObject,
    HashValue,
    StackTrace,
    LoadVarArg,
    StoreVarArg,
    BinaryAdd,
    BinarySub,
    BinaryMul,
    BinaryDiv,
    BinaryMod,
    BinaryEq,
    BinaryNe,
    BinaryLt,
    BinaryLe,
    BinaryGt,
    BinaryGe,
}

/// Every stub's address, computed once from its Rust function
/// pointer. `candor-codegen`'s relocation resolution looks addresses
/// up here the same way it looks up a root constant's heap address.
pub struct StubTable {
    addrs: HashMap<StubId, u64>,
}

impl StubTable {
    pub fn new() -> StubTable {
        let mut addrs = HashMap::new();
        addrs.insert(StubId::Allocate, stub_allocate as u64);
        addrs.insert(StubId::AllocateObject, stub_allocate_object as u64);
        addrs.insert(StubId::AllocateFunction, stub_allocate_function as u64);
        addrs.insert(StubId::AllocateContext, stub_allocate_context as u64);
        addrs.insert(StubId::CallBinding, stub_call_binding as u64);
        addrs.insert(StubId::CollectGarbage, stub_collect_garbage as u64);
        addrs.insert(StubId::Typeof, stub_typeof as u64);
        addrs.insert(StubId::Sizeof, stub_sizeof as u64);
        addrs.insert(StubId::Keysof, stub_keysof as u64);
        addrs.insert(StubId::LookupProperty, stub_lookup_property as u64);
        addrs.insert(StubId::StoreProperty, stub_store_property as u64);
        addrs.insert(StubId::DeleteProperty, stub_delete_property as u64);
        addrs.insert(StubId::PicMiss, stub_pic_load_property as u64);
        addrs.insert(StubId::PicStoreMiss, stub_pic_store_property as u64);
        addrs.insert(StubId::CoerceToBoolean, stub_coerce_to_boolean as u64);
        addrs.insert(StubId::CloneObject, stub_clone_object as u64);
        addrs.insert(StubId::HashValue, stub_hash_value as u64);
        addrs.insert(StubId::BinaryAdd, stub_binary_add as u64);
        addrs.insert(StubId::BinarySub, stub_binary_sub as u64);
        addrs.insert(StubId::BinaryMul, stub_binary_mul as u64);
        addrs.insert(StubId::BinaryDiv, stub_binary_div as u64);
        addrs.insert(StubId::BinaryMod, stub_binary_mod as u64);
        addrs.insert(StubId::BinaryEq, stub_binary_eq as u64);
        addrs.insert(StubId::BinaryNe, stub_binary_ne as u64);
        addrs.insert(StubId::BinaryLt, stub_binary_lt as u64);
        addrs.insert(StubId::BinaryLe, stub_binary_le as u64);
        addrs.insert(StubId::BinaryGt, stub_binary_gt as u64);
        addrs.insert(StubId::BinaryGe, stub_binary_ge as u64);
        StubTable { addrs }
    }

    pub fn address(&self, id: StubId) -> u64 {
        *self.addrs.get(&id).unwrap_or_else(|| panic!("stub {id:?} has no generated body yet"))
    }
}

impl Default for StubTable {
    fn default() -> Self {
        Self::new()
    }
}

// ---- allocation -------------------------------------------------------

unsafe extern "C" fn stub_allocate(ctx: *mut StubContext, size_smi: Word, _b: Word, _c: Word) -> Word {
    let size = size_smi.as_smi().expect("Allocate stub's size argument must be an unboxed integer") as usize;
    let ptr = (*ctx).alloc(size);
    Word::from_ptr(ptr)
}

unsafe extern "C" fn stub_allocate_object(ctx: *mut StubContext, proto: Word, _b: Word, _c: Word) -> Word {
    use candor_gc::object::container::OBJECT_SIZE;
    let map_ptr = (*ctx).alloc(MapView::bytes_for_capacity(MapView::INITIAL_CAPACITY));
    MapView::init(map_ptr, MapView::INITIAL_CAPACITY);
    let obj_ptr = (*ctx).alloc(OBJECT_SIZE);
    ObjectView::init(obj_ptr, Word::from_ptr(map_ptr), proto);
    Word::from_ptr(obj_ptr)
}

/// Same allocation as [`stub_allocate_object`], usable before a
/// [`StubContext`] exists to hand it — `Isolate::new` needs a globals
/// object to put the context's `globals` field on before there is a
/// context to put it in.
pub fn allocate_object(gc: &mut candor_gc::Gc, proto: Word) -> candor_gc::Result<Word> {
    use candor_gc::object::container::OBJECT_SIZE;
    use candor_gc::NoStackRoots;
    unsafe {
        let map_ptr = gc.allocate(MapView::bytes_for_capacity(MapView::INITIAL_CAPACITY), &NoStackRoots)?;
        MapView::init(map_ptr, MapView::INITIAL_CAPACITY);
        let obj_ptr = gc.allocate(OBJECT_SIZE, &NoStackRoots)?;
        ObjectView::init(obj_ptr, Word::from_ptr(map_ptr), proto);
        Ok(Word::from_ptr(obj_ptr))
    }
}

unsafe extern "C" fn stub_allocate_function(ctx: *mut StubContext, parent_context: Word, entry_word: Word, root_context: Word, argc: Word) -> Word {
    use candor_gc::object::function::SIZE;
    let entry = entry_word.raw();
    let argc = argc.as_smi().expect("AllocateFunction stub's argc argument must be an unboxed integer") as u32;
    let ptr = (*ctx).alloc(SIZE);
    FunctionView::init(ptr, parent_context, entry, root_context, argc);
    Word::from_ptr(ptr)
}

/// Dispatches to a native callback through the embedding ABI (spec.md
/// §6.2): `entry` on a binding function is not code, it's the host's
/// `extern "C" fn(argc, argv) -> Word` pointer, stored there verbatim
/// by `candor_runtime`'s `Function::from_native`.
unsafe extern "C" fn stub_call_binding(_ctx: *mut StubContext, function: Word, argc: Word, argv: Word) -> Word {
    let ptr = function.as_ptr().expect("CallBinding stub's function argument must be a heap object");
    let entry = FunctionView::entry(ptr);
    let native: extern "C" fn(i64, *const Word) -> Word = std::mem::transmute(entry);
    let argc = argc.as_smi().expect("CallBinding stub's argc argument must be an unboxed integer");
    native(argc, argv.raw() as *const Word)
}

/// Allocates the fresh per-activation `Context` a compiled function
/// establishes in its own prologue whenever it declares at least one
/// context slot (`candor-codegen::emit`'s `emit_establish_running_context`).
unsafe extern "C" fn stub_allocate_context(ctx: *mut StubContext, parent: Word, slot_count_smi: Word, _c: Word) -> Word {
    let slot_count = slot_count_smi.as_smi().expect("AllocateContext stub's slot count must be an unboxed integer") as u32;
    let ptr = (*ctx).alloc(ContextView::bytes_for_slots(slot_count));
    ContextView::init(ptr, parent, slot_count);
    Word::from_ptr(ptr)
}

unsafe extern "C" fn stub_collect_garbage(ctx: *mut StubContext, _a: Word, _b: Word, _c: Word) -> Word {
    let gc = &mut *(*ctx).gc;
    gc.collect(&candor_gc::NoStackRoots).expect("collection failed");
    Word::NIL
}

// ---- introspection ------------------------------------------------------

unsafe extern "C" fn stub_typeof(_ctx: *mut StubContext, value: Word, _b: Word, _c: Word) -> Word {
    let name = type_name(value);
    intern_string_word(_ctx, name)
}

fn type_name(value: Word) -> &'static str {
    if value.is_nil() {
        return "nil";
    }
    if value.is_smi() {
        return "number";
    }
    let ptr = value.as_ptr().unwrap();
    match unsafe { candor_gc::object::header::RawHeader::tag(ptr) } {
        Tag::Boolean => "boolean",
        Tag::Number => "number",
        Tag::String => "string",
        Tag::Object => "object",
        Tag::Array => "array",
        Tag::Function => "function",
        _ => "object",
    }
}

unsafe extern "C" fn stub_sizeof(_ctx: *mut StubContext, value: Word, _b: Word, _c: Word) -> Word {
    if value.is_nil() {
        return Word::smi(0);
    }
    let Some(ptr) = value.as_ptr() else { return Word::smi(0) };
    let size = match candor_gc::object::header::RawHeader::tag(ptr) {
        Tag::Array => ArrayView::length(ptr) as i64,
        Tag::Object => MapView::occupied(ObjectView::map(ptr).as_ptr().unwrap()) as i64,
        Tag::String => candor_gc::object::string::flattened_bytes(ptr).len() as i64,
        _ => 0,
    };
    Word::smi(size)
}

unsafe extern "C" fn stub_keysof(ctx: *mut StubContext, value: Word, _b: Word, _c: Word) -> Word {
    let Some(ptr) = value.as_ptr() else { return Word::NIL };
    if candor_gc::object::header::RawHeader::tag(ptr) != Tag::Object {
        return Word::NIL;
    }
    let map_ptr = ObjectView::map(ptr).as_ptr().unwrap();
    let entries = MapView::entries(map_ptr);
    let array_ptr = (*ctx).alloc(candor_gc::object::container::ARRAY_SIZE);
    ArrayView::init(array_ptr, allocate_fresh_map(ctx), Word::NIL);
    let array_map = ArrayView::map(array_ptr).as_ptr().unwrap();
    for (i, (k, _)) in entries.iter().enumerate() {
        MapView::insert(array_map, Word::smi(i as i64), *k, |a, b| a == b);
    }
    ArrayView::set_length(array_ptr, entries.len() as u64);
    Word::from_ptr(array_ptr)
}

unsafe fn allocate_fresh_map(ctx: *mut StubContext) -> Word {
    let map_ptr = (*ctx).alloc(MapView::bytes_for_capacity(MapView::INITIAL_CAPACITY));
    MapView::init(map_ptr, MapView::INITIAL_CAPACITY);
    Word::from_ptr(map_ptr)
}

// ---- property access ----------------------------------------------------

/// Generic (non-PIC) property lookup: walks the object's own map, then
/// its proto chain, then falls back to `nil` (spec.md §4.9's fallback
/// path every PIC stub eventually takes).
unsafe extern "C" fn stub_lookup_property(_ctx: *mut StubContext, object: Word, key: Word, _c: Word) -> Word {
    let mut cur = object;
    loop {
        let Some(ptr) = cur.as_ptr() else { return Word::NIL };
        match candor_gc::object::header::RawHeader::tag(ptr) {
            Tag::Array => {
                if let Some(idx) = key.as_smi() {
                    if idx >= 0 && (idx as u64) < ArrayView::length(ptr) {
                        let map_ptr = ArrayView::map(ptr).as_ptr().unwrap();
                        let v = MapView::get(map_ptr, key, |a, b| a == b);
                        if !v.is_nil() {
                            return v;
                        }
                    }
                }
                cur = ArrayView::proto(ptr);
            }
            Tag::Object => {
                let map_ptr = ObjectView::map(ptr).as_ptr().unwrap();
                let v = MapView::get(map_ptr, key, |a, b| a == b);
                if !v.is_nil() {
                    return v;
                }
                cur = ObjectView::proto(ptr);
            }
            _ => return Word::NIL,
        }
        if cur.is_nil() {
            return Word::NIL;
        }
    }
}

/// This map's stable PIC identity, lazily assigning one the first
/// time a call site ever touches it (`MapView::init` only reserves
/// the field; nothing before the first PIC consult needs an id).
unsafe fn map_pic_id(ctx: *mut StubContext, map_ptr: *mut u8) -> HiddenMapId {
    let existing = MapView::pic_id(map_ptr);
    if existing != MapView::NO_PIC_ID {
        return existing;
    }
    let id = (*(*ctx).pics).allocate_map_id();
    MapView::set_pic_id(map_ptr, id);
    id
}

/// PIC-aware named property load (spec.md §4.9): consults the call
/// site's cache keyed on the object's own map identity, reading
/// straight through the cached offset on a hit. A miss that resolves
/// directly against the object's own map (not a prototype's) records
/// a fresh entry; anything else falls back to the generic proto-chain
/// walk without touching the cache.
unsafe extern "C" fn stub_pic_load_property(ctx: *mut StubContext, object: Word, key: Word, site_smi: Word) -> Word {
    let site = site_smi.as_smi().expect("PicMiss stub's site argument must be an unboxed integer") as u32;
    if let Some(obj_ptr) = object.as_ptr() {
        if candor_gc::object::header::RawHeader::tag(obj_ptr) == Tag::Object {
            let map_ptr = ObjectView::map(obj_ptr).as_ptr().unwrap();
            let map_id = map_pic_id(ctx, map_ptr);
            let pics = &mut *(*ctx).pics;
            let version = pics.current_version(map_id);
            if let Some(offset) = pics.site(site).lookup(map_id, version) {
                return *(map_ptr.add(offset as usize) as *const Word);
            }
            if let Some(idx) = MapView::find(map_ptr, key, |a, b| a == b) {
                let offset = MapView::value_slot_offset(map_ptr, idx);
                pics.site(site).record(map_id, version, offset);
                return *(map_ptr.add(offset as usize) as *const Word);
            }
        }
    }
    stub_lookup_property(ctx, object, key, Word::NIL)
}

/// PIC-aware named property store, mirroring
/// [`stub_pic_load_property`]'s cache. Growth allocates a brand-new
/// map (`grow_if_needed`), so its freshly (lazily) assigned id already
/// misses every entry cached against the old one — no explicit
/// invalidation needed on that path.
unsafe extern "C" fn stub_pic_store_property(ctx: *mut StubContext, object: Word, key: Word, value: Word, site_smi: Word) -> Word {
    let site = site_smi.as_smi().expect("PicStoreMiss stub's site argument must be an unboxed integer") as u32;
    let Some(obj_ptr) = object.as_ptr() else { return stub_store_property(ctx, object, key, value) };
    if candor_gc::object::header::RawHeader::tag(obj_ptr) != Tag::Object {
        return stub_store_property(ctx, object, key, value);
    }
    let map_ptr = ObjectView::map(obj_ptr).as_ptr().unwrap();
    let map_id = map_pic_id(ctx, map_ptr);
    let version = (*(*ctx).pics).current_version(map_id);
    if let Some(offset) = (*(*ctx).pics).site(site).lookup(map_id, version) {
        *(map_ptr.add(offset as usize) as *mut Word) = value;
        return value;
    }
    let grew = MapView::needs_growth(map_ptr, 12);
    grow_if_needed(ctx, obj_ptr, false);
    let map_ptr = ObjectView::map(obj_ptr).as_ptr().unwrap();
    MapView::insert(map_ptr, key, value, |a, b| a == b);
    if !grew {
        if let Some(idx) = MapView::find(map_ptr, key, |a, b| a == b) {
            let offset = MapView::value_slot_offset(map_ptr, idx);
            (*(*ctx).pics).site(site).record(map_id, version, offset);
        }
    }
    value
}

unsafe extern "C" fn stub_store_property(ctx: *mut StubContext, object: Word, key: Word, value: Word) -> Word {
    let Some(ptr) = object.as_ptr() else { return Word::NIL };
    match candor_gc::object::header::RawHeader::tag(ptr) {
        Tag::Array => {
            let map_ptr = ArrayView::map(ptr).as_ptr().unwrap();
            grow_if_needed(ctx, ptr, true);
            let map_ptr = ArrayView::map(ptr).as_ptr().unwrap();
            MapView::insert(map_ptr, key, value, |a, b| a == b);
            if let Some(idx) = key.as_smi() {
                if idx >= 0 && (idx as u64) >= ArrayView::length(ptr) {
                    ArrayView::set_length(ptr, idx as u64 + 1);
                }
            }
            let _ = map_ptr;
        }
        Tag::Object => {
            grow_if_needed(ctx, ptr, false);
            let map_ptr = ObjectView::map(ptr).as_ptr().unwrap();
            MapView::insert(map_ptr, key, value, |a, b| a == b);
        }
        _ => {}
    }
    value
}

/// Grows an Object/Array's backing map in place when the next insert
/// would exceed the configured load factor (spec.md §8.3: "a map that
/// fills past its load factor rehashes once and all prior keys remain
/// retrievable").
unsafe fn grow_if_needed(ctx: *mut StubContext, container_ptr: *mut u8, is_array: bool) {
    let map_word = if is_array { ArrayView::map(container_ptr) } else { ObjectView::map(container_ptr) };
    let map_ptr = map_word.as_ptr().unwrap() as *mut u8;
    if !MapView::needs_growth(map_ptr, 12) {
        return;
    }
    let new_cap = MapView::next_capacity(MapView::capacity(map_ptr));
    let new_map_ptr = (*ctx).alloc(MapView::bytes_for_capacity(new_cap));
    MapView::init(new_map_ptr, new_cap);
    for (k, v) in MapView::entries(map_ptr) {
        MapView::insert(new_map_ptr, k, v, |a, b| a == b);
    }
    if is_array {
        ArrayView::set_map(container_ptr, Word::from_ptr(new_map_ptr));
    } else {
        ObjectView::set_map(container_ptr, Word::from_ptr(new_map_ptr));
    }
}

/// Deleting can relocate *other* surviving keys' slot offsets within
/// the same, address-and-id-unchanged map (`MapView::remove`'s
/// probe-chain closing) — the one case a stable map identity alone
/// doesn't catch, so every cached offset against this map is
/// invalidated unconditionally.
unsafe extern "C" fn stub_delete_property(ctx: *mut StubContext, object: Word, key: Word, _c: Word) -> Word {
    let Some(ptr) = object.as_ptr() else { return Word::NIL };
    let map_word = match candor_gc::object::header::RawHeader::tag(ptr) {
        Tag::Array => ArrayView::map(ptr),
        Tag::Object => ObjectView::map(ptr),
        _ => return Word::NIL,
    };
    let map_ptr = map_word.as_ptr().unwrap() as *mut u8;
    MapView::remove(map_ptr, key, |a, b| a == b);
    let existing = MapView::pic_id(map_ptr);
    if existing != MapView::NO_PIC_ID {
        (*(*ctx).pics).invalidate(existing);
    }
    Word::NIL
}

unsafe extern "C" fn stub_clone_object(ctx: *mut StubContext, object: Word, _b: Word, _c: Word) -> Word {
    let Some(ptr) = object.as_ptr() else { return Word::NIL };
    if candor_gc::object::header::RawHeader::tag(ptr) != Tag::Object {
        return object;
    }
    use candor_gc::object::container::OBJECT_SIZE;
    let src_map = ObjectView::map(ptr).as_ptr().unwrap();
    let entries = MapView::entries(src_map);
    let cap = MapView::bytes_for_capacity(MapView::capacity(src_map).max(MapView::INITIAL_CAPACITY));
    let new_map = (*ctx).alloc(cap);
    MapView::init(new_map, MapView::capacity(src_map).max(MapView::INITIAL_CAPACITY));
    for (k, v) in entries {
        MapView::insert(new_map, k, v, |a, b| a == b);
    }
    let clone_ptr = (*ctx).alloc(OBJECT_SIZE);
    ObjectView::init(clone_ptr, Word::from_ptr(new_map), ObjectView::proto(ptr));
    Word::from_ptr(clone_ptr)
}

// ---- coercion / hashing ---------------------------------------------------

unsafe extern "C" fn stub_coerce_to_boolean(_ctx: *mut StubContext, value: Word, _b: Word, _c: Word) -> Word {
    Word::smi(is_truthy(value) as i64)
}

pub unsafe fn is_truthy(value: Word) -> bool {
    if value.is_nil() {
        return false;
    }
    if let Some(i) = value.as_smi() {
        return i != 0;
    }
    let ptr = value.as_ptr().unwrap();
    match candor_gc::object::header::RawHeader::tag(ptr) {
        Tag::Boolean => candor_gc::object::scalar::BooleanView::value(ptr),
        Tag::Number => candor_gc::object::scalar::NumberView::value(ptr) != 0.0,
        Tag::String => !candor_gc::object::string::flattened_bytes(ptr).is_empty(),
        _ => true,
    }
}

unsafe extern "C" fn stub_hash_value(_ctx: *mut StubContext, value: Word, _b: Word, _c: Word) -> Word {
    if let Some(i) = value.as_smi() {
        return Word::smi(i);
    }
    let Some(ptr) = value.as_ptr() else { return Word::smi(0) };
    if candor_gc::object::header::RawHeader::tag(ptr) == Tag::String {
        let bytes = candor_gc::object::string::flattened_bytes(ptr);
        let mut hash: u64 = 0xcbf29ce484222325;
        for b in bytes {
            hash ^= b as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        return Word::smi((hash & (Word::SMI_MAX as u64)) as i64);
    }
    Word::smi(value.raw() as i64 & Word::SMI_MAX)
}

// ---- numeric/string value helpers used by the binary stubs --------------

unsafe fn number_value(ctx: *mut StubContext, value: Word) -> f64 {
    if let Some(i) = value.as_smi() {
        return i as f64;
    }
    let ptr = value.as_ptr().expect("numeric operand must be a number or smi");
    debug_assert_eq!(candor_gc::object::header::RawHeader::tag(ptr), Tag::Number);
    let _ = ctx;
    NumberView::value(ptr)
}

unsafe fn boxed_number(ctx: *mut StubContext, value: f64) -> Word {
    use candor_gc::object::scalar::NUMBER_SIZE;
    let ptr = (*ctx).alloc(NUMBER_SIZE);
    NumberView::init(ptr, value);
    Word::from_ptr(ptr)
}

unsafe fn numeric_result(ctx: *mut StubContext, value: f64) -> Word {
    if value.fract() == 0.0 && value >= Word::SMI_MIN as f64 && value <= Word::SMI_MAX as f64 {
        Word::smi(value as i64)
    } else {
        boxed_number(ctx, value)
    }
}

unsafe fn boxed_boolean(ctx: *mut StubContext, value: bool) -> Word {
    use candor_gc::object::scalar::BOOLEAN_SIZE;
    let ptr = (*ctx).alloc(BOOLEAN_SIZE);
    candor_gc::object::scalar::BooleanView::init(ptr, value);
    Word::from_ptr(ptr)
}

unsafe fn is_string(value: Word) -> bool {
    value.as_ptr().map(|p| candor_gc::object::header::RawHeader::tag(p) == Tag::String).unwrap_or(false)
}

/// Builds a cons string joining `lhs`/`rhs` (spec.md §9 OQ1's
/// representation choice); never eagerly flattens.
unsafe fn concat_strings(ctx: *mut StubContext, lhs: Word, rhs: Word) -> Word {
    use candor_gc::object::string::ConsStringView;
    let lhs_len = string_len(lhs);
    let rhs_len = string_len(rhs);
    let ptr = (*ctx).alloc(ConsStringView::SIZE);
    ConsStringView::init(ptr, lhs, rhs, (lhs_len + rhs_len) as u64);
    Word::from_ptr(ptr)
}

unsafe fn string_len(value: Word) -> usize {
    let ptr = value.as_ptr().unwrap();
    candor_gc::object::string::flattened_bytes(ptr).len()
}

unsafe fn values_equal(value_a: Word, value_b: Word) -> bool {
    if value_a == value_b {
        return true;
    }
    match (value_a.as_smi(), value_b.as_smi()) {
        (Some(_), _) | (_, Some(_)) => return false,
        _ => {}
    }
    match (value_a.as_ptr(), value_b.as_ptr()) {
        (Some(a), Some(b)) => {
            let (ta, tb) = (candor_gc::object::header::RawHeader::tag(a), candor_gc::object::header::RawHeader::tag(b));
            if ta != tb {
                return false;
            }
            match ta {
                Tag::String => candor_gc::object::string::flattened_bytes(a) == candor_gc::object::string::flattened_bytes(b),
                Tag::Number => NumberView::value(a) == NumberView::value(b),
                Tag::Boolean => candor_gc::object::scalar::BooleanView::value(a) == candor_gc::object::scalar::BooleanView::value(b),
                _ => a == b,
            }
        }
        _ => false,
    }
}

unsafe fn intern_string_word(ctx: *mut StubContext, s: &str) -> Word {
    use candor_gc::object::string::FlatStringView;
    let ptr = (*ctx).alloc(FlatStringView::bytes_for_len(s.len()));
    FlatStringView::init(ptr, s.as_bytes());
    Word::from_ptr(ptr)
}

// ---- per-operator binary stubs --------------------------------------------

unsafe extern "C" fn stub_binary_add(ctx: *mut StubContext, lhs: Word, rhs: Word, _c: Word) -> Word {
    if is_string(lhs) || is_string(rhs) {
        return concat_strings(ctx, lhs, rhs);
    }
    if let (Some(a), Some(b)) = (lhs.as_smi(), rhs.as_smi()) {
        if !Word::smi_add_overflows(a, b) {
            return Word::smi(a + b);
        }
    }
    numeric_result(ctx, number_value(ctx, lhs) + number_value(ctx, rhs))
}

macro_rules! arith_stub {
    ($name:ident, $op:tt) => {
        unsafe extern "C" fn $name(ctx: *mut StubContext, lhs: Word, rhs: Word, _c: Word) -> Word {
            numeric_result(ctx, number_value(ctx, lhs) $op number_value(ctx, rhs))
        }
    };
}

arith_stub!(stub_binary_sub, -);
arith_stub!(stub_binary_mul, *);
arith_stub!(stub_binary_div, /);

unsafe extern "C" fn stub_binary_mod(ctx: *mut StubContext, lhs: Word, rhs: Word, _c: Word) -> Word {
    numeric_result(ctx, number_value(ctx, lhs) % number_value(ctx, rhs))
}

unsafe extern "C" fn stub_binary_eq(ctx: *mut StubContext, lhs: Word, rhs: Word, _c: Word) -> Word {
    boxed_boolean(ctx, values_equal(lhs, rhs))
}
unsafe extern "C" fn stub_binary_ne(ctx: *mut StubContext, lhs: Word, rhs: Word, _c: Word) -> Word {
    boxed_boolean(ctx, !values_equal(lhs, rhs))
}

macro_rules! compare_stub {
    ($name:ident, $op:tt) => {
        unsafe extern "C" fn $name(ctx: *mut StubContext, lhs: Word, rhs: Word, _c: Word) -> Word {
            boxed_boolean(ctx, number_value(ctx, lhs) $op number_value(ctx, rhs))
        }
    };
}

compare_stub!(stub_binary_lt, <);
compare_stub!(stub_binary_le, <=);
compare_stub!(stub_binary_gt, >);
compare_stub!(stub_binary_ge, >=);

// ---- embedding API helpers (candor_runtime::Value) ------------------------
//
// `candor_runtime` needs exactly the same property-access/coercion/
// allocation behavior a compiled function's stub calls get, just
// invoked directly from host Rust instead of through a `call_abs` in
// emitted code. These wrap the private stub bodies above rather than
// duplicate their logic, the same way `allocate_object` already does
// for the one call site (`Isolate::new`) that runs before a
// `StubContext` exists.

/// # Safety
/// `ctx` must point at a live `StubContext`.
pub unsafe fn lookup_property(ctx: *mut StubContext, object: Word, key: Word) -> Word {
    stub_lookup_property(ctx, object, key, Word::NIL)
}

/// # Safety
/// `ctx` must point at a live `StubContext`.
pub unsafe fn store_property(ctx: *mut StubContext, object: Word, key: Word, value: Word) -> Word {
    stub_store_property(ctx, object, key, value)
}

/// # Safety
/// `ctx` must point at a live `StubContext`.
pub unsafe fn delete_property(ctx: *mut StubContext, object: Word, key: Word) -> Word {
    stub_delete_property(ctx, object, key, Word::NIL)
}

/// # Safety
/// `ctx` must point at a live `StubContext`.
pub unsafe fn clone_object(ctx: *mut StubContext, object: Word) -> Word {
    stub_clone_object(ctx, object, Word::NIL, Word::NIL)
}

/// # Safety
/// `ctx` must point at a live `StubContext`.
pub unsafe fn keysof(ctx: *mut StubContext, object: Word) -> Word {
    stub_keysof(ctx, object, Word::NIL, Word::NIL)
}

/// # Safety
/// `ctx` must point at a live `StubContext`.
pub unsafe fn type_of(ctx: *mut StubContext, value: Word) -> Word {
    stub_typeof(ctx, value, Word::NIL, Word::NIL)
}

/// # Safety
/// `ctx` must point at a live `StubContext`.
pub unsafe fn size_of(ctx: *mut StubContext, value: Word) -> Word {
    stub_sizeof(ctx, value, Word::NIL, Word::NIL)
}

/// # Safety
/// `value` must be a valid `Word` (always true by construction).
pub unsafe fn coerce_to_boolean(value: Word) -> bool {
    is_truthy(value)
}

/// # Safety
/// `ctx` must point at a live `StubContext`.
pub unsafe fn allocate_array(ctx: *mut StubContext) -> Word {
    use candor_gc::object::container::ARRAY_SIZE;
    let map_ptr = allocate_fresh_map(ctx);
    let arr_ptr = (*ctx).alloc(ARRAY_SIZE);
    ArrayView::init(arr_ptr, map_ptr, Word::NIL);
    Word::from_ptr(arr_ptr)
}

/// # Safety
/// `ctx` must point at a live `StubContext`.
pub unsafe fn intern_string(ctx: *mut StubContext, s: &str) -> Word {
    intern_string_word(ctx, s)
}

/// # Safety
/// `ctx` must point at a live `StubContext`.
pub unsafe fn boxed_number_value(ctx: *mut StubContext, v: f64) -> Word {
    boxed_number(ctx, v)
}

/// # Safety
/// `ctx` must point at a live `StubContext`.
pub unsafe fn boxed_boolean_value(ctx: *mut StubContext, v: bool) -> Word {
    boxed_boolean(ctx, v)
}

/// # Safety
/// `ptr` must be a live, correctly tagged heap object.
pub unsafe fn value_equal(a: Word, b: Word) -> bool {
    values_equal(a, b)
}

/// # Safety
/// `ptr` must be a live string object.
pub unsafe fn flattened_string_bytes(ptr: *const u8) -> Vec<u8> {
    candor_gc::object::string::flattened_bytes(ptr)
}

/// Invokes a binding `Function` from host code, building the same
/// stack-grows-down `argv` layout (`argv[i] = *(argv - i - 1)`) a
/// compiled call site builds before jumping to `stub_call_binding`.
/// `ctx` isn't read by `stub_call_binding` (bindings don't touch the
/// GC or PIC table directly), so this passes a null one.
///
/// # Safety
/// `function` must be a heap `Function` for which
/// `FunctionView::is_binding` holds.
pub unsafe fn call_binding(function: Word, args: &[Word]) -> Word {
    let mut storage = vec![Word::NIL; args.len()];
    for (i, w) in args.iter().enumerate() {
        storage[args.len() - 1 - i] = *w;
    }
    let argv = storage.as_ptr().add(storage.len());
    stub_call_binding(std::ptr::null_mut(), function, Word::smi(args.len() as i64), Word::from_raw(argv as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use candor_gc::HeapConfig;

    fn fresh_ctx() -> (Box<Gc>, Box<PicTable>) {
        (Box::new(Gc::new(HeapConfig::default()).unwrap()), Box::new(PicTable::new()))
    }

    #[test]
    fn add_stays_unboxed_within_smi_range() {
        let (mut gc, mut pics) = fresh_ctx();
        let mut ctx = StubContext { gc: &mut *gc, pics: &mut *pics, needs_gc: false, globals: Word::NIL };
        let result = unsafe { stub_binary_add(&mut ctx, Word::smi(2), Word::smi(3), Word::NIL) };
        assert_eq!(result.as_smi(), Some(5));
    }

    #[test]
    fn add_overflow_boxes_into_a_number() {
        let (mut gc, mut pics) = fresh_ctx();
        let mut ctx = StubContext { gc: &mut *gc, pics: &mut *pics, needs_gc: false, globals: Word::NIL };
        let result = unsafe { stub_binary_add(&mut ctx, Word::smi(Word::SMI_MAX), Word::smi(1), Word::NIL) };
        assert!(result.is_heap_object());
    }

    #[test]
    fn typeof_empty_object_is_object() {
        let (mut gc, mut pics) = fresh_ctx();
        let mut ctx = StubContext { gc: &mut *gc, pics: &mut *pics, needs_gc: false, globals: Word::NIL };
        let obj = unsafe { stub_allocate_object(&mut ctx, Word::NIL, Word::NIL, Word::NIL) };
        let ty = unsafe { stub_typeof(&mut ctx, obj, Word::NIL, Word::NIL) };
        let ptr = ty.as_ptr().unwrap();
        assert_eq!(unsafe { candor_gc::object::string::flattened_bytes(ptr) }, b"object");
    }

    #[test]
    fn pic_store_then_load_hits_the_same_site() {
        let (mut gc, mut pics) = fresh_ctx();
        let mut ctx = StubContext { gc: &mut *gc, pics: &mut *pics, needs_gc: false, globals: Word::NIL };
        let obj = unsafe { stub_allocate_object(&mut ctx, Word::NIL, Word::NIL, Word::NIL) };
        let key = Word::smi(7);
        unsafe {
            stub_pic_store_property(&mut ctx, obj, key, Word::smi(42), Word::smi(0));
        }
        assert_eq!(unsafe { (*ctx.pics).site(0).entry_count() }, 1);
        let loaded = unsafe { stub_pic_load_property(&mut ctx, obj, key, Word::smi(0)) };
        assert_eq!(loaded.as_smi(), Some(42));
    }

    #[test]
    fn pic_load_records_a_hit_against_an_already_populated_map() {
        let (mut gc, mut pics) = fresh_ctx();
        let mut ctx = StubContext { gc: &mut *gc, pics: &mut *pics, needs_gc: false, globals: Word::NIL };
        let obj = unsafe { stub_allocate_object(&mut ctx, Word::NIL, Word::NIL, Word::NIL) };
        let key = Word::smi(9);
        unsafe { stub_store_property(&mut ctx, obj, key, Word::smi(11)) };
        assert_eq!(unsafe { (*ctx.pics).site(3).entry_count() }, 0);
        let loaded = unsafe { stub_pic_load_property(&mut ctx, obj, key, Word::smi(3)) };
        assert_eq!(loaded.as_smi(), Some(11));
        assert_eq!(unsafe { (*ctx.pics).site(3).entry_count() }, 1);
    }

    #[test]
    fn deleting_a_key_invalidates_cached_offsets_on_its_map() {
        let (mut gc, mut pics) = fresh_ctx();
        let mut ctx = StubContext { gc: &mut *gc, pics: &mut *pics, needs_gc: false, globals: Word::NIL };
        let obj = unsafe { stub_allocate_object(&mut ctx, Word::NIL, Word::NIL, Word::NIL) };
        let key_a = Word::smi(1);
        let key_b = Word::smi(2);
        unsafe {
            stub_pic_store_property(&mut ctx, obj, key_a, Word::smi(100), Word::smi(0));
            stub_pic_store_property(&mut ctx, obj, key_b, Word::smi(200), Word::smi(1));
            stub_delete_property(&mut ctx, obj, key_a, Word::NIL);
        }
        let map_ptr = unsafe { ObjectView::map(obj.as_ptr().unwrap()).as_ptr().unwrap() };
        let map_id = unsafe { MapView::pic_id(map_ptr) };
        let version = unsafe { (*ctx.pics).current_version(map_id) };
        assert_eq!(unsafe { (*ctx.pics).site(1).lookup(map_id, version) }, None);
        let reloaded = unsafe { stub_pic_load_property(&mut ctx, obj, key_b, Word::smi(1)) };
        assert_eq!(reloaded.as_smi(), Some(200));
    }
}
