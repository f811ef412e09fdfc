//! Slot assignment: the output of scope analysis (spec.md §4.4).
//!
//! Every declared name ends up in exactly one `FunctionScope`, either as
//! a stack slot (lives in the function's own frame) or a context slot
//! (lives in a heap `Context` record, reachable from nested closures by
//! walking parent pointers). `scope { a, b }` forces eager context
//! allocation; anything else is promoted to context only if some nested
//! function literal actually references it.

use candor_util::Symbol;
use indexmap::IndexMap;

/// Where a resolved variable reference lives, per spec.md §4.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    /// Lives in the executing function's own stack frame.
    Stack,
    /// Lives in a `Context` record, `depth` parent-hops up.
    Context,
    /// Not declared in any enclosing function: a property of the
    /// global object. `depth` is always `-1` for this kind.
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub kind: SlotKind,
    /// Context-slot or stack-slot index; unused (`0`) for `Global`.
    pub index: u32,
    /// Parent-context hop count for `Context` slots (`0` means "this
    /// function's own context"); `-1` for `Global`. Stack slots are
    /// always depth `0` since they never cross a function boundary.
    pub depth: i32,
    pub name: Symbol,
}

impl Slot {
    pub fn stack(index: u32, name: Symbol) -> Slot {
        Slot { kind: SlotKind::Stack, index, depth: 0, name }
    }

    pub fn context(index: u32, depth: i32, name: Symbol) -> Slot {
        Slot { kind: SlotKind::Context, index, depth, name }
    }

    pub fn global(name: Symbol) -> Slot {
        Slot { kind: SlotKind::Global, index: 0, depth: -1, name }
    }
}

/// The finalized slot layout for one function (or the implicit
/// top-level function the CLI/REPL compiles a script as), plus the
/// scopes of every function literal nested directly or transitively
/// inside its body, in the same left-to-right order the HIR builder
/// will encounter their `Expr::Function` nodes.
#[derive(Debug, Default)]
pub struct FunctionScope {
    pub param_count: usize,
    pub param_names: Vec<Symbol>,
    pub stack_slots: IndexMap<Symbol, u32>,
    pub context_slots: IndexMap<Symbol, u32>,
    pub children: Vec<FunctionScope>,
}

impl FunctionScope {
    pub fn context_slot_count(&self) -> u32 {
        self.context_slots.len() as u32
    }

    pub fn resolve_local(&self, name: Symbol) -> Option<Slot> {
        if let Some(&idx) = self.context_slots.get(&name) {
            return Some(Slot::context(idx, 0, name));
        }
        if let Some(&idx) = self.stack_slots.get(&name) {
            return Some(Slot::stack(idx, name));
        }
        None
    }
}

/// A stack of enclosing function scopes, innermost last, used by the
/// HIR builder to resolve a name reference against the function it
/// occurs in and every lexically enclosing function.
#[derive(Clone)]
pub struct ScopeChain<'a> {
    chain: Vec<&'a FunctionScope>,
}

impl<'a> ScopeChain<'a> {
    pub fn new(root: &'a FunctionScope) -> Self {
        ScopeChain { chain: vec![root] }
    }

    pub fn push(&mut self, scope: &'a FunctionScope) {
        self.chain.push(scope);
    }

    pub fn pop(&mut self) {
        self.chain.pop();
    }

    pub fn current(&self) -> &'a FunctionScope {
        self.chain.last().expect("scope chain is never empty")
    }

    /// Resolves `name` against the innermost function first, then each
    /// enclosing function's context in turn, per spec.md §4.4's depth
    /// convention (`-1` global, a non-negative depth = parent hops).
    /// Any name a descendant reaches here was already promoted to a
    /// context slot in its owner during analysis, so only
    /// `context_slots` is consulted past the innermost function.
    pub fn resolve(&self, name: Symbol) -> Slot {
        if let Some(slot) = self.current().resolve_local(name) {
            return slot;
        }
        for (depth, scope) in self.chain.iter().rev().enumerate().skip(1) {
            if let Some(&idx) = scope.context_slots.get(&name) {
                return Slot::context(idx, depth as i32, name);
            }
        }
        Slot::global(name)
    }
}
