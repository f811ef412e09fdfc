//! Builds the `FunctionScope` tree for a whole program (spec.md §4.4).
//!
//! Candor has no `let`: a name becomes a local the first time it is
//! assigned without already resolving to an enclosing function's
//! binding. This walks every function body exactly once, outside-in,
//! threading an arena of in-progress scopes so a reference can walk
//! its parent chain and, when it lands on an ancestor's binding
//! instead of its own, mark that ancestor's copy of the name for
//! context promotion (the closure in spec.md §8.4's `counter()`
//! example: the returned function's `x = x + 1` must resolve to the
//! outer `x`, not shadow it with a fresh local).
//!
//! A name that resolves nowhere in the chain is left alone here and
//! becomes a global property reference at HIR-build time; it never
//! occupies a slot.

use candor_par::ast::*;
use candor_util::Symbol;
use indexmap::IndexSet;
use std::collections::HashSet;

use crate::scope::FunctionScope;

struct Node<'ast> {
    params: &'ast [Symbol],
    declared: IndexSet<Symbol>,
    scope_forced: HashSet<Symbol>,
    escaped: HashSet<Symbol>,
    parent: Option<usize>,
    children: Vec<usize>,
}

struct Builder<'ast> {
    arena: Vec<Node<'ast>>,
}

pub fn analyze(program: &Program) -> FunctionScope {
    let mut builder = Builder { arena: Vec::new() };
    let root = builder.new_node(&[], None);
    builder.build_block(root, &program.body);
    finalize(&builder.arena, root)
}

impl<'ast> Builder<'ast> {
    fn new_node(&mut self, params: &'ast [Symbol], parent: Option<usize>) -> usize {
        self.arena.push(Node {
            params,
            declared: params.iter().copied().collect(),
            scope_forced: HashSet::new(),
            escaped: HashSet::new(),
            parent,
            children: Vec::new(),
        });
        self.arena.len() - 1
    }

    fn declare_local(&mut self, idx: usize, name: Symbol) {
        self.arena[idx].declared.insert(name);
    }

    /// A plain read. Resolving to the current function needs nothing
    /// further; resolving to an ancestor marks that ancestor's binding
    /// as escaped; resolving nowhere leaves it as a future global.
    fn resolve_reference(&mut self, idx: usize, name: Symbol) {
        if self.arena[idx].declared.contains(&name) {
            return;
        }
        let mut cur = self.arena[idx].parent;
        while let Some(anc) = cur {
            if self.arena[anc].declared.contains(&name) {
                self.arena[anc].escaped.insert(name);
                return;
            }
            cur = self.arena[anc].parent;
        }
    }

    /// An assignment target. Same resolution order as a read, except
    /// that finding the name nowhere in the chain declares it as a
    /// brand-new local of the current function rather than leaving it
    /// as a global (Candor's only binding form).
    fn resolve_assignment_target(&mut self, idx: usize, name: Symbol) {
        if self.arena[idx].declared.contains(&name) {
            return;
        }
        let mut cur = self.arena[idx].parent;
        while let Some(anc) = cur {
            if self.arena[anc].declared.contains(&name) {
                self.arena[anc].escaped.insert(name);
                return;
            }
            cur = self.arena[anc].parent;
        }
        self.declare_local(idx, name);
    }

    fn build_block(&mut self, idx: usize, block: &'ast Block) {
        for stmt in &block.stmts {
            self.build_stmt(idx, stmt);
        }
    }

    fn build_stmt(&mut self, idx: usize, stmt: &'ast Stmt) {
        match stmt {
            Stmt::Expr(e) => self.build_expr(idx, e),
            Stmt::Return(Some(e), _) => self.build_expr(idx, e),
            Stmt::Return(None, _) | Stmt::Break(_) | Stmt::Continue(_) => {}
            Stmt::If {
                cond,
                then_branch,
                else_branch,
                ..
            } => {
                self.build_expr(idx, cond);
                self.build_block(idx, then_branch);
                if let Some(e) = else_branch {
                    self.build_block(idx, e);
                }
            }
            Stmt::While { cond, body, .. } => {
                self.build_expr(idx, cond);
                self.build_block(idx, body);
            }
            Stmt::Block(b) => self.build_block(idx, b),
            Stmt::ScopeDecl(names, _) => {
                for n in names {
                    self.declare_local(idx, *n);
                    self.arena[idx].scope_forced.insert(*n);
                }
            }
        }
    }

    fn build_expr(&mut self, idx: usize, expr: &'ast Expr) {
        match expr {
            Expr::Ident(name, _) => self.resolve_reference(idx, *name),
            Expr::Assign { target, value, .. } => {
                if let Expr::Ident(name, _) = target.as_ref() {
                    self.resolve_assignment_target(idx, *name);
                } else {
                    self.build_expr(idx, target);
                }
                self.build_expr(idx, value);
            }
            Expr::PreIncDec { operand, .. } | Expr::PostIncDec { operand, .. } => {
                // `x++` both reads and writes an existing binding; it
                // never introduces one, unlike a bare assignment.
                if let Expr::Ident(name, _) = operand.as_ref() {
                    self.resolve_reference(idx, *name);
                } else {
                    self.build_expr(idx, operand);
                }
            }
            Expr::Function(f) => {
                if let Some(name) = f.name {
                    self.declare_local(idx, name);
                }
                let child = self.new_node(&f.params, Some(idx));
                self.arena[idx].children.push(child);
                self.build_block(child, &f.body);
            }
            Expr::Array(items, _) => {
                for i in items {
                    self.build_expr(idx, i);
                }
            }
            Expr::Object(props, _) => {
                for (_, v) in props {
                    self.build_expr(idx, v);
                }
            }
            Expr::Member { object, key, .. } => {
                self.build_expr(idx, object);
                if let MemberKey::Computed(k) = key {
                    self.build_expr(idx, k);
                }
            }
            Expr::Call { callee, args, .. } => {
                self.build_expr(idx, callee);
                for a in args {
                    self.build_expr(idx, a);
                }
            }
            Expr::Unary { operand, .. } | Expr::Clone(operand, _) | Expr::Delete(operand, _) => {
                self.build_expr(idx, operand);
            }
            Expr::Binary { lhs, rhs, .. } | Expr::Logical { lhs, rhs, .. } => {
                self.build_expr(idx, lhs);
                self.build_expr(idx, rhs);
            }
            Expr::Nil(_)
            | Expr::Bool(..)
            | Expr::Number(..)
            | Expr::Nan(_)
            | Expr::Str(..) => {}
        }
    }
}

/// Partitions a node's declared names into context and stack slots
/// and recurses into its children, in the order they were
/// encountered (the same order the HIR builder will walk
/// `Expr::Function` literals in).
fn finalize(arena: &[Node<'_>], idx: usize) -> FunctionScope {
    let node = &arena[idx];
    let mut scope = FunctionScope {
        param_count: node.params.len(),
        param_names: node.params.to_vec(),
        stack_slots: indexmap::IndexMap::new(),
        context_slots: indexmap::IndexMap::new(),
        children: Vec::with_capacity(node.children.len()),
    };
    for &name in node.declared.iter() {
        if node.escaped.contains(&name) || node.scope_forced.contains(&name) {
            let next = scope.context_slots.len() as u32;
            scope.context_slots.insert(name, next);
        } else {
            let next = scope.stack_slots.len() as u32;
            scope.stack_slots.insert(name, next);
        }
    }
    for &child in &node.children {
        scope.children.push(finalize(arena, child));
    }
    scope
}
