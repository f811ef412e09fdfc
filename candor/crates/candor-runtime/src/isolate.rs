//! The embedding boundary (spec.md §6.1): one `Isolate` per
//! independent Candor heap/compiler instance, reachable from anywhere
//! in the current thread via `Isolate::current()` so that `Value`
//! methods (`ToString`, property access, `Function::call`) don't need
//! to thread an explicit reference through every call.
//!
//! Grounded on `candor-codegen::stubs`'s own design note: "spec.md §9's
//! design note reserves thread-local lookup for the embedding boundary
//! (`Isolate::current()`), so every runtime helper takes its context
//! explicitly instead." Everything below the embedding boundary
//! (stubs, emitted code) keeps taking `StubContext` explicitly; only
//! host-facing code reaches for the thread-local.

use std::cell::RefCell;
use std::rc::Rc;

use candor_codegen::page::CodePage;
use candor_codegen::pic::PicTable;
use candor_codegen::stubs::{StubContext, StubTable};
use candor_gc::{Gc, HeapConfig, NoStackRoots, Word};

use crate::error::{Result, RuntimeError};

thread_local! {
    static CURRENT: RefCell<Option<*mut Isolate>> = const { RefCell::new(None) };
}

/// One Candor heap, stub table, PIC table, and code-page set, plus the
/// global object every top-level compilation is invoked against
/// (spec.md §6.3's CLI surface reads `assert`/`print`/`getValue` off
/// it). `gc`/`pics` are boxed so `stub_context`'s raw pointers into
/// them stay valid no matter where `Isolate` itself lives.
pub struct Isolate {
    pub(crate) gc: Box<Gc>,
    pub(crate) pics: Box<PicTable>,
    pub(crate) stubs: StubTable,
    pub(crate) stub_context: Box<StubContext>,
    pub(crate) pages: Vec<Rc<RefCell<CodePage>>>,
    pub(crate) chunks: Vec<crate::compile::CompiledChunk>,
    pub(crate) globals: Word,
    pub(crate) page_size: usize,
    last_error: Option<String>,
}

/// `StubContext::alloc` is the only allocating path a running JIT
/// function ever takes, and it never walks a native stack — the
/// handle registry (traced internally by `Gc::collect`/`Gc::allocate`)
/// is the only root source a compiled program's own execution needs.
pub(crate) const NO_ROOTS: &NoStackRoots = &NoStackRoots;

impl Isolate {
    pub fn new(config: HeapConfig) -> Result<Isolate> {
        let mut gc = Box::new(Gc::new(config)?);
        let pics = Box::new(PicTable::new());
        let stubs = StubTable::new();

        let globals_ptr = candor_codegen::stubs::allocate_object(&mut gc, Word::NIL)?;

        let mut stub_context = Box::new(StubContext {
            gc: gc.as_mut() as *mut Gc,
            pics: Box::as_ref(&pics) as *const PicTable as *mut PicTable,
            needs_gc: false,
            globals: globals_ptr,
        });
        stub_context.globals = globals_ptr;

        let mut isolate = Isolate {
            gc,
            pics,
            stubs,
            stub_context,
            pages: Vec::new(),
            chunks: Vec::new(),
            globals: globals_ptr,
            page_size: 64 * 1024,
            last_error: None,
        };
        isolate.make_current();
        Ok(isolate)
    }

    /// Installs `self` as the thread's current isolate. Safe as long as
    /// `self` outlives every call that reaches for `Isolate::current()`
    /// — true for the CLI/REPL, which build one `Isolate` for the life
    /// of the process.
    fn make_current(&mut self) {
        CURRENT.with(|cell| *cell.borrow_mut() = Some(self as *mut Isolate));
    }

    /// Returns the thread's active isolate. Panics if none has been
    /// constructed yet — mirroring the original's "no isolate" fatal
    /// error, since every embedding entry point needs one.
    pub fn current<'a>() -> &'a mut Isolate {
        CURRENT.with(|cell| {
            let ptr = cell.borrow().expect("no active Isolate: construct one with Isolate::new() first");
            unsafe { &mut *ptr }
        })
    }

    pub fn globals(&self) -> Word {
        self.globals
    }

    /// Rebinds the object `LoadGlobal`/`StoreGlobal` resolve against
    /// (spec.md §6.1's `Function::SetContext`). The original exposes
    /// this per function; this port's `StubContext::globals` is a
    /// single field shared by every compiled function on the isolate,
    /// so rebinding it affects every function that runs afterward, not
    /// just one call site (documented in DESIGN.md).
    pub fn set_globals(&mut self, globals: Word) {
        self.globals = globals;
        self.stub_context.globals = globals;
    }

    pub fn gc(&mut self) -> &mut Gc {
        &mut self.gc
    }

    pub(crate) fn handles_mut(&mut self) -> &mut candor_gc::HandleRegistry {
        &mut self.gc.handles
    }

    pub(crate) fn stub_context_ptr(&mut self) -> *mut StubContext {
        self.stub_context.as_mut() as *mut StubContext
    }

    pub(crate) unsafe fn alloc(&mut self, size: usize) -> candor_gc::Result<*mut u8> {
        self.gc.allocate(size, NO_ROOTS)
    }

    pub fn collect_garbage(&mut self) -> Result<()> {
        self.gc.collect(NO_ROOTS)?;
        Ok(())
    }

    pub fn has_error(&self) -> bool {
        self.last_error.is_some()
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.last_error = Some(message.into());
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    pub fn print_error(&self) {
        if let Some(message) = &self.last_error {
            eprintln!("{message}");
        }
    }

    /// Frame descriptions for every compiled chunk currently on the
    /// isolate (spec.md §6.1's `StackTrace`). This port has no raw
    /// native frame walker — `candor-codegen::source_map` resolves
    /// return addresses against each chunk's recorded source map, so
    /// this reports every chunk that's ever been compiled rather than
    /// the live call stack at the moment of the fault; a caller builds
    /// a real trace by pairing this with addresses observed via
    /// `GetStackTrace`'s runtime stub (spec.md §4.10).
    pub fn stack_trace(&self) -> Vec<candor_codegen::source_map::StackFrame> {
        self.chunks.iter().map(|c| c.frame.clone()).collect()
    }

    pub(crate) fn record_compile_error(&mut self, err: &RuntimeError) {
        self.set_error(err.to_string());
    }
}

impl Drop for Isolate {
    fn drop(&mut self) {
        CURRENT.with(|cell| {
            let mut cell = cell.borrow_mut();
            if *cell == Some(self as *mut Isolate) {
                *cell = None;
            }
        });
    }
}
