//! `Value`: an opaque handle into the managed heap, the embedder's
//! only view of a Candor value (spec.md §6.1). Grounded on
//! `original_source/api.cc`/`candor.h` and their usage in
//! `original_source/test/test-api.cc`; the generic `Is<T>()`/`As<T>()`
//! pair becomes concrete `is_*`/coercion methods here, which reads more
//! idiomatically than a marker-type-parameterized cast in Rust and
//! avoids a `Value` generic over the kind it happens to hold.
//!
//! A `Value` is nothing but the address of a handle slot owned by some
//! `HandleScope`'s `candor_gc::HandleRegistry` — it carries no
//! lifetime of its own beyond "at least as long as the scope that
//! produced it," which every method that can allocate takes as an
//! explicit `&mut HandleScope` argument rather than assume a hidden
//! thread-local "current scope".

use candor_codegen::entry::call_entry;
use candor_codegen::stubs::{
    allocate_array, boxed_boolean_value, boxed_number_value, call_binding, clone_object, coerce_to_boolean, delete_property,
    flattened_string_bytes, intern_string, keysof, lookup_property, store_property, value_equal,
};
use candor_gc::object::{ArrayView, BooleanView, FunctionView, NumberView, RawHeader};
use candor_gc::{Tag, Word};

use crate::error::{Result, RuntimeError};
use crate::handle::HandleScope;

#[derive(Clone, Copy)]
pub struct Value(*mut Word);

impl Value {
    pub(crate) fn from_slot(slot: *mut Word) -> Value {
        Value(slot)
    }

    pub(crate) fn slot(&self) -> *mut Word {
        self.0
    }

    pub fn word(&self) -> Word {
        unsafe { *self.0 }
    }

    // ---- construction ---------------------------------------------------

    pub fn nil(scope: &mut HandleScope) -> Value {
        scope.local(Word::NIL)
    }

    pub fn boolean(scope: &mut HandleScope, value: bool) -> Value {
        let ctx = scope.stub_context();
        let word = unsafe { boxed_boolean_value(ctx, value) };
        scope.local(word)
    }

    /// Stays an unboxed small integer whenever the value fits
    /// (spec.md §3.1); only escapes to a boxed `Number` outside the
    /// smi range or with a fractional part.
    pub fn number(scope: &mut HandleScope, value: f64) -> Value {
        if value.fract() == 0.0 && value.is_finite() && value >= Word::SMI_MIN as f64 && value <= Word::SMI_MAX as f64 {
            return scope.local(Word::smi(value as i64));
        }
        let ctx = scope.stub_context();
        let word = unsafe { boxed_number_value(ctx, value) };
        scope.local(word)
    }

    pub fn integer(scope: &mut HandleScope, value: i64) -> Value {
        scope.local(Word::smi(value))
    }

    pub fn string(scope: &mut HandleScope, s: &str) -> Value {
        let ctx = scope.stub_context();
        let word = unsafe { intern_string(ctx, s) };
        scope.local(word)
    }

    pub fn object(scope: &mut HandleScope) -> Value {
        let word = candor_codegen::stubs::allocate_object(scope.isolate().gc(), Word::NIL).expect("allocator exhausted");
        scope.local(word)
    }

    pub fn array(scope: &mut HandleScope) -> Value {
        let ctx = scope.stub_context();
        let word = unsafe { allocate_array(ctx) };
        scope.local(word)
    }

    // ---- type tests (spec.md §6.1's `Is<T>()`) ---------------------------

    pub fn is_nil(&self) -> bool {
        self.word().is_nil()
    }
    pub fn is_number(&self) -> bool {
        let w = self.word();
        w.is_smi() || tag_is(w, Tag::Number)
    }
    pub fn is_boolean(&self) -> bool {
        tag_is(self.word(), Tag::Boolean)
    }
    pub fn is_string(&self) -> bool {
        tag_is(self.word(), Tag::String)
    }
    pub fn is_object(&self) -> bool {
        tag_is(self.word(), Tag::Object)
    }
    pub fn is_array(&self) -> bool {
        tag_is(self.word(), Tag::Array)
    }
    pub fn is_function(&self) -> bool {
        tag_is(self.word(), Tag::Function)
    }
    pub fn is_cdata(&self) -> bool {
        tag_is(self.word(), Tag::CData)
    }

    pub fn equals(&self, other: &Value) -> bool {
        unsafe { value_equal(self.word(), other.word()) }
    }

    // ---- coercion (spec.md §6.1's `As<T>()`/`ToBoolean`/`ToString`/`ToNumber`) ---

    pub fn to_boolean(&self) -> bool {
        unsafe { coerce_to_boolean(self.word()) }
    }

    pub fn to_number(&self) -> f64 {
        let w = self.word();
        if let Some(i) = w.as_smi() {
            return i as f64;
        }
        match w.as_ptr() {
            Some(ptr) if tag_is(w, Tag::Number) => unsafe { NumberView::value(ptr) },
            _ => 0.0,
        }
    }

    pub fn to_integer(&self) -> i64 {
        self.to_number() as i64
    }

    /// Matches `original_source/api.cc`'s `ToString`: strings pass
    /// through unchanged, everything else gets a short textual
    /// rendering (used by the CLI's `print`/`getValue` globals).
    pub fn to_string_value(&self) -> String {
        let w = self.word();
        if w.is_nil() {
            return "nil".to_string();
        }
        if let Some(i) = w.as_smi() {
            return i.to_string();
        }
        let ptr = w.as_ptr().expect("checked above");
        match unsafe { RawHeader::tag(ptr) } {
            Tag::String => String::from_utf8_lossy(&unsafe { flattened_string_bytes(ptr) }).into_owned(),
            Tag::Number => format_number(unsafe { NumberView::value(ptr) }),
            Tag::Boolean => (unsafe { BooleanView::value(ptr) }).to_string(),
            Tag::Array => "[array]".to_string(),
            Tag::Function => "[function]".to_string(),
            _ => "[object]".to_string(),
        }
    }

    // ---- object / array operations ---------------------------------------

    pub fn get(&self, scope: &mut HandleScope, key: &str) -> Value {
        let ctx = scope.stub_context();
        let key_word = unsafe { intern_string(ctx, key) };
        let result = unsafe { lookup_property(ctx, self.word(), key_word) };
        scope.local(result)
    }

    pub fn set(&self, scope: &mut HandleScope, key: &str, value: Value) {
        let ctx = scope.stub_context();
        let key_word = unsafe { intern_string(ctx, key) };
        unsafe { store_property(ctx, self.word(), key_word, value.word()) };
    }

    pub fn delete(&self, scope: &mut HandleScope, key: &str) {
        let ctx = scope.stub_context();
        let key_word = unsafe { intern_string(ctx, key) };
        unsafe { delete_property(ctx, self.word(), key_word) };
    }

    pub fn has_property(&self, scope: &mut HandleScope, key: &str) -> bool {
        !self.get(scope, key).is_nil()
    }

    pub fn keys(&self, scope: &mut HandleScope) -> Value {
        let ctx = scope.stub_context();
        let result = unsafe { keysof(ctx, self.word()) };
        scope.local(result)
    }

    /// Shallow-copies an Object's own properties onto a fresh Object
    /// sharing its proto (spec.md §4.8's `CloneObject` stub); Arrays
    /// and other tags pass through unchanged, matching
    /// `stub_clone_object`'s fallback.
    pub fn clone_value(&self, scope: &mut HandleScope) -> Value {
        let ctx = scope.stub_context();
        let result = unsafe { clone_object(ctx, self.word()) };
        scope.local(result)
    }

    pub fn get_index(&self, scope: &mut HandleScope, index: u32) -> Value {
        let ctx = scope.stub_context();
        let result = unsafe { lookup_property(ctx, self.word(), Word::smi(index as i64)) };
        scope.local(result)
    }

    pub fn set_index(&self, scope: &mut HandleScope, index: u32, value: Value) {
        let ctx = scope.stub_context();
        unsafe { store_property(ctx, self.word(), Word::smi(index as i64), value.word()) };
    }

    pub fn push(&self, scope: &mut HandleScope, value: Value) {
        let index = self.length();
        self.set_index(scope, index, value);
    }

    pub fn length(&self) -> u32 {
        match self.word().as_ptr() {
            Some(ptr) if self.is_array() => unsafe { ArrayView::length(ptr) as u32 },
            _ => 0,
        }
    }

    // ---- function calls ---------------------------------------------------

    /// Invokes a `Function` value, dispatching to the JIT entry
    /// trampoline or the native-callback ABI depending on
    /// `FunctionView::is_binding` — the same branch `emit.rs::emit_call`
    /// takes for a Candor-to-Candor call.
    pub fn call(&self, scope: &mut HandleScope, args: &[Value]) -> Result<Value> {
        if !self.is_function() {
            return Err(RuntimeError::TypeError("value is not callable".to_string()));
        }
        let word = self.word();
        let ptr = word.as_ptr().expect("checked by is_function") as *mut u8;
        let arg_words: Vec<Word> = args.iter().map(Value::word).collect();
        let result = unsafe {
            if FunctionView::is_binding(ptr) {
                call_binding(word, &arg_words)
            } else {
                call_entry(scope.stub_context(), word, &arg_words)
            }
        };
        Ok(scope.local(result))
    }

    /// Rebinds the global object unqualified identifiers resolve
    /// against before calling this function (spec.md §6.1's
    /// `Function::SetContext`). See `Isolate::set_globals` for the
    /// per-isolate-not-per-function caveat this port carries.
    pub fn set_context(&self, scope: &mut HandleScope, global: Value) {
        scope.isolate().set_globals(global.word());
    }
}

fn tag_is(word: Word, tag: Tag) -> bool {
    word.as_ptr().map(|p| unsafe { RawHeader::tag(p) } == tag).unwrap_or(false)
}

fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.is_finite() && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}
