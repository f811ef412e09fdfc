//! Scope-analysis edge case tests.

use crate::{analyze, SlotKind};
use candor_par::parse_program;
use candor_util::{FileId, Handler, Symbol};

fn analyze_source(source: &str) -> crate::FunctionScope {
    let handler = Handler::new();
    let program = parse_program(source, FileId::DUMMY, &handler).expect("parse failed");
    assert!(!handler.has_errors(), "unexpected parse errors for {source:?}");
    analyze(&program)
}

#[test]
fn plain_assignment_is_a_stack_slot() {
    let scope = analyze_source("a = 1; return a");
    let a = Symbol::intern("a");
    assert_eq!(scope.stack_slots.get(&a).copied(), Some(0));
    assert!(scope.context_slots.get(&a).is_none());
}

#[test]
fn scope_decl_forces_context_even_without_capture() {
    let scope = analyze_source("scope { a, b } a = 1; return a");
    let a = Symbol::intern("a");
    let b = Symbol::intern("b");
    assert_eq!(scope.context_slots.get(&a).copied(), Some(0));
    assert_eq!(scope.context_slots.get(&b).copied(), Some(1));
    assert!(scope.stack_slots.is_empty());
}

#[test]
fn counter_closure_promotes_captured_local_to_context() {
    // spec.md §8.4 scenario 4: the returned closure mutates the
    // defining function's `x` after that function has returned, so
    // `x` cannot live on `counter`'s stack frame.
    let scope = analyze_source(
        "counter() { x = 0; return () { x = x + 1; return x } } \
         c = counter(); c(); c(); return c()",
    );
    let counter = scope
        .stack_slots
        .get(&Symbol::intern("counter"))
        .is_some();
    assert!(counter, "counter itself is an ordinary top-level local");

    let inner = &scope.children[0];
    let x = Symbol::intern("x");
    assert!(
        inner.context_slots.contains_key(&x),
        "x must be promoted to a context slot in counter()'s scope"
    );
    assert!(inner.stack_slots.get(&x).is_none());

    // the nested closure itself declares nothing of its own and reads
    // x purely through the parent context, at depth 1.
    let closure = &inner.children[0];
    assert!(closure.stack_slots.is_empty());
    assert!(closure.context_slots.is_empty());
}

#[test]
fn unescaped_local_stays_on_the_stack_even_with_sibling_closures() {
    let scope = analyze_source(
        "make() { a = 1; b = 2; f = () { return b }; return f } \
         return make()",
    );
    let inner = &scope.children[0];
    let a = Symbol::intern("a");
    let b = Symbol::intern("b");
    assert!(inner.stack_slots.contains_key(&a), "a is never captured");
    assert!(inner.context_slots.contains_key(&b), "b is captured by f");
}

#[test]
fn nested_function_parameter_shadows_outer_binding() {
    let scope = analyze_source("x = 1; f = (x) { return x }; return f(2)");
    let root_x_slot = scope.resolve_local(Symbol::intern("x"));
    assert_eq!(root_x_slot.unwrap().kind, SlotKind::Stack);

    let inner = &scope.children[0];
    let inner_x = inner.resolve_local(Symbol::intern("x")).unwrap();
    assert_eq!(inner_x.kind, SlotKind::Stack);
    // the parameter is a separate binding from the root's x: the
    // inner function never needed to capture the outer one.
    assert!(!scope.context_slots.contains_key(&Symbol::intern("x")));
}

#[test]
fn unresolved_name_is_left_for_global_lookup() {
    let scope = analyze_source("return unknownGlobal");
    let name = Symbol::intern("unknownGlobal");
    assert!(scope.stack_slots.get(&name).is_none());
    assert!(scope.context_slots.get(&name).is_none());
}

#[test]
fn reassigning_a_captured_outer_variable_from_a_grandchild_closure() {
    let scope = analyze_source(
        "outer() { x = 0; middle = () { inner = () { x = x + 1 }; return inner }; \
         return middle() } \
         return outer()",
    );
    let middle = &scope.children[0].children[0];
    let inner = &middle.children[0];
    let x = Symbol::intern("x");
    assert!(scope.children[0].context_slots.contains_key(&x));
    assert!(!middle.stack_slots.contains_key(&x));
    assert!(!middle.context_slots.contains_key(&x));
    assert!(!inner.stack_slots.contains_key(&x));
}

#[test]
fn function_params_occupy_their_own_slots() {
    let scope = analyze_source("add(a, b) { return a + b }; return add(1, 2)");
    let inner = &scope.children[0];
    assert_eq!(inner.param_count, 2);
    assert_eq!(inner.param_names, vec![Symbol::intern("a"), Symbol::intern("b")]);
    assert!(inner.stack_slots.contains_key(&Symbol::intern("a")));
    assert!(inner.stack_slots.contains_key(&Symbol::intern("b")));
}
