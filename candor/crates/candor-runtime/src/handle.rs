//! `HandleScope` (spec.md §4.3, §6.1): the embedding-level counterpart
//! of `candor_gc::HandleRegistry`'s scoped locals. Every [`Value`]
//! handed across the embedding boundary lives in the registry, so the
//! collector can relocate it like any other root; a `HandleScope` just
//! bounds how long a batch of locals stays reachable.
//!
//! `original_source/api.cc`'s `HandleScope` constructor/destructor pair
//! pushed and popped a thread-local "current scope" stack. This port
//! borrows `Isolate` for the scope's lifetime instead: the borrow
//! checker enforces the same LIFO nesting the original relied on a
//! runtime assertion for.

use candor_codegen::stubs::StubContext;
use candor_gc::Word;

use crate::isolate::Isolate;
use crate::value::Value;

pub struct HandleScope<'a> {
    isolate: &'a mut Isolate,
    id: candor_gc::ScopeId,
}

impl<'a> HandleScope<'a> {
    pub fn new(isolate: &'a mut Isolate) -> HandleScope<'a> {
        let id = isolate.handles_mut().open_scope();
        HandleScope { isolate, id }
    }

    /// Wraps `word` in a fresh local handle owned by this scope.
    pub fn local(&mut self, word: Word) -> Value {
        let slot = self.isolate.handles_mut().new_local(self.id, word);
        Value::from_slot(slot)
    }

    /// Promotes `value` to a persistent handle that outlives every
    /// scope (spec.md §4.3's `Persist()`). `value` must have been
    /// created in this scope; promoting a handle from an outer scope
    /// is a no-op, matching `HandleRegistry::persist`'s lookup-miss
    /// fallback.
    pub fn persist(&mut self, value: Value) -> Value {
        let slot = self.isolate.handles_mut().persist(self.id, value.slot());
        Value::from_slot(slot)
    }

    /// Demotes a persistent handle to weak, running `callback` with
    /// the handle's last value if it doesn't survive the next
    /// collection (spec.md §4.3's `Weaken()`).
    pub fn weaken(&mut self, persistent: Value, callback: Option<Box<dyn FnMut(Word)>>) -> Value {
        let slot = self.isolate.handles_mut().weaken(persistent.slot(), callback);
        Value::from_slot(slot)
    }

    pub fn isolate(&mut self) -> &mut Isolate {
        self.isolate
    }

    pub(crate) fn stub_context(&mut self) -> *mut StubContext {
        self.isolate.stub_context_ptr()
    }
}

impl<'a> Drop for HandleScope<'a> {
    fn drop(&mut self) {
        self.isolate.handles_mut().close_scope(self.id);
    }
}
