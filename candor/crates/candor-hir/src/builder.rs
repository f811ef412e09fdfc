//! Builds SSA HIR directly from the AST and a resolved `FunctionScope`
//! tree, one function at a time (spec.md §4.5).
//!
//! Only stack slots are tracked as SSA locals (an `env: Vec<ValueId>`
//! indexed by slot, rebound on assignment and merged with `Phi` at
//! joins); context and global storage are real memory and always go
//! through `LoadContextSlot`/`StoreContextSlot`/`LoadGlobal`/
//! `StoreGlobal` instructions instead. `while` loops insert a phi for
//! every stack slot eagerly in the header, seeded with the value on
//! entry, and patch the second operand in once the body's back edge
//! is known — this avoids needing a second pass over the block graph
//! to discover which slots the body actually reassigns.

use candor_par::ast::*;
use candor_sem::ScopeChain;
use candor_util::{Idx, IndexVec, Span, Symbol};

use crate::function::{BasicBlock, HirFunction};
use crate::ids::{BlockId, FunctionId, ValueId};
use crate::instr::{InstKind, PropertyKey, Terminator};

/// `chain` is the full stack of enclosing scopes, innermost (this
/// function's own) last — every nested `Expr::Function` extends it
/// with its own child scope before recursing, so `read_slot`/
/// `write_slot` can resolve a captured name to the right parent-hop
/// count instead of assuming it always lives one frame up.
pub fn build_function(params: &[Symbol], body: &Block, chain: ScopeChain<'_>) -> HirFunction {
    log::trace!(
        "lowering function: {} params, {} stack slots, {} context slots",
        params.len(),
        chain.current().stack_slots.len(),
        chain.current().context_slot_count(),
    );
    let mut b = Builder::new(chain);
    let entry = b.new_block();
    b.seal_entry(entry, params);
    b.current = entry;
    b.build_block(body);
    b.terminate_fallthrough_return();
    let f = b.finish();
    log::trace!("lowered function into {} blocks, {} nested", f.blocks.len(), f.nested.len());
    f
}

struct Builder<'s> {
    chain: ScopeChain<'s>,
    blocks: IndexVec<BlockId, BasicBlock>,
    values: IndexVec<ValueId, InstKind>,
    spans: IndexVec<ValueId, Span>,
    nested: Vec<HirFunction>,
    current: BlockId,
    /// Source location attributed to values pushed with no AST node of
    /// their own to hand (entry-block argument placeholders, the
    /// synthetic `+1`/`-1` of `++`/`--`, phi insertion).
    current_span: Span,
    env: Vec<Option<ValueId>>,
    /// (break_target, continue_target, header phi ids) stack for
    /// nested loops; a `continue` is itself a back edge into the
    /// header and must feed the header's phis the same way the
    /// implicit fallthrough at the end of the loop body does.
    loops: Vec<(BlockId, BlockId, Vec<Option<ValueId>>)>,
}

impl<'s> Builder<'s> {
    fn new(chain: ScopeChain<'s>) -> Self {
        let stack_slot_count = chain.current().stack_slots.len();
        Builder {
            chain,
            blocks: IndexVec::new(),
            values: IndexVec::new(),
            spans: IndexVec::new(),
            nested: Vec::new(),
            current: BlockId(0),
            current_span: Span::DUMMY,
            env: vec![None; stack_slot_count],
            loops: Vec::new(),
        }
    }

    fn new_block(&mut self) -> BlockId {
        self.blocks.push(BasicBlock::default())
    }

    fn push(&mut self, inst: InstKind) -> ValueId {
        let id = self.values.push(inst);
        let span_id = self.spans.push(self.current_span);
        debug_assert_eq!(id, span_id);
        self.blocks[self.current].insts.push(id);
        id
    }

    fn set_terminator(&mut self, block: BlockId, term: Terminator) {
        self.blocks[block].term = Some(term);
    }

    fn add_pred(&mut self, block: BlockId, pred: BlockId) {
        self.blocks[block].preds.push(pred);
    }

    fn is_terminated(&self, block: BlockId) -> bool {
        self.blocks[block].term.is_some()
    }

    /// Seeds the entry block's environment: every parameter occupies
    /// its already-known stack slot (params never resolve to context
    /// in the entry block itself — a param that escapes still starts
    /// life on the stack and is written into its context cell here).
    fn seal_entry(&mut self, entry: BlockId, params: &[Symbol]) {
        self.current = entry;
        for name in params {
            // A synthetic per-param "argument" value: lowering assigns
            // it register slot `i` directly at the LIR stage, so the
            // HIR only needs a placeholder it can reference by slot.
            let arg = self.push(InstKind::ConstNil);
            if let Some(&slot) = self.chain.current().stack_slots.get(name) {
                self.env[slot as usize] = Some(arg);
            } else if let Some(&slot) = self.chain.current().context_slots.get(name) {
                self.push(InstKind::StoreContextSlot { depth: 0, index: slot, value: arg });
            }
        }
    }

    /// Resolves `name` against this function first, then walks
    /// enclosing functions' contexts outward (spec.md §4.4) — a name
    /// captured from two function literals up correctly gets `depth:
    /// 2`, not the innermost parent's slot layout.
    fn read_slot(&mut self, name: Symbol) -> ValueId {
        let slot = self.chain.resolve(name);
        match slot.kind {
            candor_sem::SlotKind::Stack => {
                self.env[slot.index as usize].unwrap_or_else(|| self.push(InstKind::ConstNil))
            }
            candor_sem::SlotKind::Context => {
                self.push(InstKind::LoadContextSlot { depth: slot.depth, index: slot.index })
            }
            candor_sem::SlotKind::Global => self.push(InstKind::LoadGlobal(name)),
        }
    }

    fn write_slot(&mut self, name: Symbol, value: ValueId) {
        let slot = self.chain.resolve(name);
        match slot.kind {
            candor_sem::SlotKind::Stack => {
                self.env[slot.index as usize] = Some(value);
            }
            candor_sem::SlotKind::Context => {
                self.push(InstKind::StoreContextSlot { depth: slot.depth, index: slot.index, value });
            }
            candor_sem::SlotKind::Global => {
                self.push(InstKind::StoreGlobal { name, value });
            }
        }
    }

    fn build_block(&mut self, block: &Block) {
        for stmt in &block.stmts {
            if self.is_terminated(self.current) {
                break;
            }
            self.build_stmt(stmt);
        }
    }

    fn build_stmt(&mut self, stmt: &Stmt) {
        self.current_span = stmt.span();
        match stmt {
            Stmt::Expr(e) => {
                self.build_expr(e);
            }
            Stmt::Return(value, _) => {
                let v = value.as_ref().map(|e| self.build_expr(e));
                self.set_terminator(self.current, Terminator::Return(v));
            }
            Stmt::Break(_) => {
                if let Some(&(target, _, _)) = self.loops.last() {
                    self.add_pred(target, self.current);
                    self.set_terminator(self.current, Terminator::Goto(target));
                }
            }
            Stmt::Continue(_) => {
                if let Some((_, target, phis)) = self.loops.last().cloned() {
                    self.add_pred(target, self.current);
                    self.set_terminator(self.current, Terminator::Goto(target));
                    self.patch_header_phis(&phis);
                }
            }
            Stmt::If { cond, then_branch, else_branch, .. } => self.build_if(cond, then_branch, else_branch.as_ref()),
            Stmt::While { cond, body, .. } => self.build_while(cond, body),
            Stmt::Block(b) => self.build_block(b),
            // Names are already resolved to context slots by scope
            // analysis; nothing to emit here but initialize storage
            // the same way other context-bound locals are: lazily, on
            // first write.
            Stmt::ScopeDecl(..) => {}
        }
    }

    fn build_if(&mut self, cond: &Expr, then_branch: &Block, else_branch: Option<&Block>) {
        let cond_v = self.build_expr(cond);
        let then_blk = self.new_block();
        let else_blk = self.new_block();
        self.add_pred(then_blk, self.current);
        self.add_pred(else_blk, self.current);
        self.set_terminator(
            self.current,
            Terminator::Branch { cond: cond_v, then_block: then_blk, else_block: else_blk },
        );

        let env_before = self.env.clone();

        self.current = then_blk;
        self.build_block(then_branch);
        let then_end = self.current;
        let then_env = self.env.clone();
        let then_terminated = self.is_terminated(then_end);

        self.env = env_before.clone();
        self.current = else_blk;
        if let Some(else_b) = else_branch {
            self.build_block(else_b);
        }
        let else_end = self.current;
        let else_env = self.env.clone();
        let else_terminated = self.is_terminated(else_end);

        if then_terminated && else_terminated {
            // Both arms return/break/continue; no merge block needed,
            // `self.current` stays unreachable and any following
            // statements are simply never lowered (build_block checks
            // `is_terminated` before emitting another statement).
            self.current = else_end;
            return;
        }

        let merge = self.new_block();
        if !then_terminated {
            self.add_pred(merge, then_end);
            self.set_terminator(then_end, Terminator::Goto(merge));
        }
        if !else_terminated {
            self.add_pred(merge, else_end);
            self.set_terminator(else_end, Terminator::Goto(merge));
        }

        let mut merged_env = Vec::with_capacity(self.env.len());
        for slot in 0..self.env.len() {
            let a = if then_terminated { None } else { then_env[slot] };
            let b = if else_terminated { None } else { else_env[slot] };
            merged_env.push(match (a, b) {
                (Some(x), Some(y)) if x == y => Some(x),
                (Some(x), Some(y)) => {
                    self.current = merge;
                    Some(self.push(InstKind::Phi(vec![x, y])))
                }
                (Some(x), None) => Some(x),
                (None, Some(y)) => Some(y),
                (None, None) => None,
            });
        }
        self.env = merged_env;
        self.current = merge;
    }

    /// Feeds the current `env`'s value for each slot as one more
    /// operand of that slot's header phi. Called once for the
    /// implicit fallthrough back edge at the end of a loop body, and
    /// once more for every `continue` reached along the way — each is
    /// a distinct predecessor of the header.
    fn patch_header_phis(&mut self, phis: &[Option<ValueId>]) {
        for (slot, phi) in phis.iter().enumerate() {
            if let (Some(phi_v), Some(back_v)) = (*phi, self.env[slot]) {
                if let InstKind::Phi(ops) = &mut self.values[phi_v] {
                    ops.push(back_v);
                }
            }
        }
    }

    fn build_while(&mut self, cond: &Expr, body: &Block) {
        let header = self.new_block();
        let body_blk = self.new_block();
        let exit = self.new_block();

        self.add_pred(header, self.current);
        self.set_terminator(self.current, Terminator::Goto(header));

        let env_before = self.env.clone();
        self.current = header;
        let mut phis = Vec::with_capacity(env_before.len());
        for slot in env_before.iter() {
            phis.push(slot.map(|v| self.push(InstKind::Phi(vec![v]))));
        }
        self.env = phis.clone();

        let cond_v = self.build_expr(cond);
        self.add_pred(body_blk, header);
        self.add_pred(exit, header);
        self.set_terminator(
            header,
            Terminator::Branch { cond: cond_v, then_block: body_blk, else_block: exit },
        );

        self.loops.push((exit, header, phis.clone()));
        self.current = body_blk;
        self.build_block(body);
        let body_end = self.current;
        let body_terminated = self.is_terminated(body_end);
        self.loops.pop();

        if !body_terminated {
            self.add_pred(header, body_end);
            self.set_terminator(body_end, Terminator::Goto(header));
            self.patch_header_phis(&phis);
        }

        self.env = phis;
        self.current = exit;
    }

    fn build_expr(&mut self, expr: &Expr) -> ValueId {
        self.current_span = expr.span();
        match expr {
            Expr::Nil(_) => self.push(InstKind::ConstNil),
            Expr::Bool(v, _) => self.push(InstKind::ConstBool(*v)),
            Expr::Number(v, _) => self.push(InstKind::const_number(*v)),
            Expr::Nan(_) => self.push(InstKind::ConstNan),
            Expr::Str(s, _) => self.push(InstKind::ConstString(*s)),
            Expr::Ident(name, _) => self.read_slot(*name),
            Expr::Array(items, _) => {
                let vals = items.iter().map(|i| self.build_expr(i)).collect();
                self.push(InstKind::AllocateArray(vals))
            }
            Expr::Object(props, _) => {
                let vals = props
                    .iter()
                    .map(|(k, v)| (self.prop_key_static(k), self.build_expr(v)))
                    .collect();
                self.push(InstKind::AllocateObject(vals))
            }
            Expr::Function(f) => {
                let child_scope = self.next_child_scope();
                let mut child_chain = self.chain.clone();
                child_chain.push(child_scope);
                let child = build_function(&f.params, &f.body, child_chain);
                let fn_id = FunctionId::from_usize(self.nested.len());
                self.nested.push(child);
                let value = self.push(InstKind::AllocateFunction(fn_id));
                if let Some(name) = f.name {
                    self.write_slot(name, value);
                }
                value
            }
            Expr::Member { object, key, .. } => {
                let obj = self.build_expr(object);
                let k = self.build_member_key(key);
                self.push(InstKind::LoadProperty { object: obj, key: k })
            }
            Expr::Call { callee, args, .. } => {
                let callee_v = self.build_expr(callee);
                let arg_vs = args.iter().map(|a| self.build_expr(a)).collect();
                self.push(InstKind::Call { callee: callee_v, args: arg_vs })
            }
            Expr::Unary { op, operand, .. } => {
                let v = self.build_expr(operand);
                self.push(InstKind::Unary { op: *op, operand: v })
            }
            Expr::PreIncDec { op, operand, .. } => self.build_inc_dec(*op, operand, true),
            Expr::PostIncDec { op, operand, .. } => self.build_inc_dec(*op, operand, false),
            Expr::Binary { op, lhs, rhs, .. } => {
                let l = self.build_expr(lhs);
                let r = self.build_expr(rhs);
                self.push(InstKind::Binary { op: *op, lhs: l, rhs: r })
            }
            Expr::Logical { op, lhs, rhs, .. } => self.build_logical(*op, lhs, rhs),
            Expr::Assign { op, target, value, .. } => self.build_assign(*op, target, value),
            Expr::Clone(operand, _) => {
                let v = self.build_expr(operand);
                self.push(InstKind::Clone(v))
            }
            Expr::Delete(operand, _) => {
                if let Expr::Member { object, key, .. } = operand.as_ref() {
                    let obj = self.build_expr(object);
                    let k = self.build_member_key(key);
                    self.push(InstKind::Delete { object: obj, key: k })
                } else {
                    self.push(InstKind::ConstNil)
                }
            }
        }
    }

    fn prop_key_static(&mut self, key: &PropKey) -> PropertyKey {
        match key {
            PropKey::Ident(s) | PropKey::Str(s) => PropertyKey::Ident(*s),
            PropKey::Number(n) => PropertyKey::Ident(Symbol::intern(&format!("{n}"))),
        }
    }

    fn build_member_key(&mut self, key: &MemberKey) -> PropertyKey {
        match key {
            MemberKey::Ident(s) => PropertyKey::Ident(*s),
            MemberKey::Computed(e) => {
                let v = self.build_expr(e);
                PropertyKey::Computed(v)
            }
        }
    }

    /// `a++`/`--a` etc: read, apply a `+1`/`-1` binary op, write back,
    /// and yield the pre- or post- value per spec.md's increment
    /// semantics.
    fn build_inc_dec(&mut self, op: IncDecOp, operand: &Expr, is_pre: bool) -> ValueId {
        let bin_op = match op {
            IncDecOp::Inc => BinOp::Add,
            IncDecOp::Dec => BinOp::Sub,
        };
        if let Expr::Ident(name, _) = operand {
            let old = self.read_slot(*name);
            let one = self.push(InstKind::const_number(1.0));
            let updated = self.push(InstKind::Binary { op: bin_op, lhs: old, rhs: one });
            self.write_slot(*name, updated);
            if is_pre { updated } else { old }
        } else if let Expr::Member { object, key, .. } = operand {
            let obj = self.build_expr(object);
            let k = self.build_member_key(key);
            let old = self.push(InstKind::LoadProperty { object: obj, key: k });
            let one = self.push(InstKind::const_number(1.0));
            let updated = self.push(InstKind::Binary { op: bin_op, lhs: old, rhs: one });
            self.push(InstKind::StoreProperty { object: obj, key: k, value: updated });
            if is_pre { updated } else { old }
        } else {
            self.build_expr(operand)
        }
    }

    /// `&&`/`||` short-circuit via diamond + phi (spec.md §4.5): the
    /// right operand is only evaluated in its own block, reached only
    /// when the left operand doesn't already decide the result.
    fn build_logical(&mut self, op: LogicalOp, lhs: &Expr, rhs: &Expr) -> ValueId {
        let l = self.build_expr(lhs);
        let rhs_blk = self.new_block();
        let merge = self.new_block();
        let short_circuit_pred = self.current;

        let (then_block, else_block) = match op {
            LogicalOp::And => (rhs_blk, merge),
            LogicalOp::Or => (merge, rhs_blk),
        };
        self.add_pred(then_block, short_circuit_pred);
        self.add_pred(else_block, short_circuit_pred);
        self.set_terminator(
            short_circuit_pred,
            Terminator::Branch { cond: l, then_block, else_block },
        );

        self.current = rhs_blk;
        let r = self.build_expr(rhs);
        self.add_pred(merge, rhs_blk);
        self.set_terminator(rhs_blk, Terminator::Goto(merge));

        self.current = merge;
        self.push(InstKind::Phi(vec![l, r]))
    }

    fn build_assign(&mut self, op: AssignOp, target: &Expr, value: &Expr) -> ValueId {
        let rhs = self.build_expr(value);
        let combined = if op == AssignOp::Assign {
            rhs
        } else {
            let bin_op = match op {
                AssignOp::AddAssign => BinOp::Add,
                AssignOp::SubAssign => BinOp::Sub,
                AssignOp::MulAssign => BinOp::Mul,
                AssignOp::DivAssign => BinOp::Div,
                AssignOp::ModAssign => BinOp::Mod,
                AssignOp::Assign => unreachable!(),
            };
            let old = self.build_expr(target);
            self.push(InstKind::Binary { op: bin_op, lhs: old, rhs })
        };

        match target {
            Expr::Ident(name, _) => self.write_slot(*name, combined),
            Expr::Member { object, key, .. } => {
                let obj = self.build_expr(object);
                let k = self.build_member_key(key);
                self.push(InstKind::StoreProperty { object: obj, key: k, value: combined });
            }
            // Not a valid assignment target; spec.md §7 treats this as
            // a runtime condition rather than a compile error, so the
            // write is simply dropped and the assigned value still
            // flows through as the expression's result.
            _ => {}
        }
        combined
    }

    /// `child_scopes` are consumed in the same left-to-right order
    /// `Expr::Function` literals are encountered, matching how
    /// `candor-sem::analyze` appended them.
    fn next_child_scope(&mut self) -> &'s candor_sem::FunctionScope {
        let idx = self.nested.len();
        &self.chain.current().children[idx]
    }

    fn terminate_fallthrough_return(&mut self) {
        if !self.is_terminated(self.current) {
            self.set_terminator(self.current, Terminator::Return(None));
        }
    }

    fn finish(self) -> HirFunction {
        HirFunction {
            param_count: self.chain.current().param_count,
            context_slot_count: self.chain.current().context_slot_count(),
            entry: BlockId(0),
            blocks: self.blocks,
            values: self.values,
            spans: self.spans,
            nested: self.nested,
        }
    }
}
