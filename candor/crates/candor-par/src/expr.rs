//! Expression parsing: precedence-climbing binary operators over a
//! unary/postfix/primary chain, grounded on `original_source/parser.cc`'s
//! `BINOP_PRI1..6` priority ladder (lowest `||`/`&&` down to `*`/`/`;
//! Candor's lexer has no bitwise or strict-eq operators so those tiers
//! are dropped) plus the function-literal-vs-call disambiguation from
//! `ParseExpression`'s `kParenOpen` handling.

use crate::ast::*;
use crate::Parser;
use candor_lex::TokenKind;
use candor_util::Span;

impl<'a> Parser<'a> {
    pub(crate) fn parse_expr(&mut self) -> Option<Expr> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Option<Expr> {
        let lhs = self.parse_logical_or()?;
        let op = match self.current_kind() {
            TokenKind::Assign => AssignOp::Assign,
            TokenKind::PlusEq => AssignOp::AddAssign,
            TokenKind::MinusEq => AssignOp::SubAssign,
            TokenKind::StarEq => AssignOp::MulAssign,
            TokenKind::SlashEq => AssignOp::DivAssign,
            TokenKind::PercentEq => AssignOp::ModAssign,
            _ => return Some(lhs),
        };
        self.bump();
        // An unassignable target (e.g. `1 = 2`) is accepted here and
        // rejected later by the HIR builder, which lowers it to the
        // runtime-surfaceable nil of spec.md §7 rather than a parse
        // error — "incorrect left-hand side" is not a compile error.
        let rhs = self.parse_assignment()?;
        let span = lhs.span().merge(rhs.span());
        Some(Expr::Assign {
            op,
            target: Box::new(lhs),
            value: Box::new(rhs),
            span,
        })
    }

    fn parse_logical_or(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_logical_and()?;
        while matches!(self.current_kind(), TokenKind::OrOr) {
            self.bump();
            let rhs = self.parse_logical_and()?;
            let span = lhs.span().merge(rhs.span());
            lhs = Expr::Logical {
                op: LogicalOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
        Some(lhs)
    }

    fn parse_logical_and(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_equality()?;
        while matches!(self.current_kind(), TokenKind::AndAnd) {
            self.bump();
            let rhs = self.parse_equality()?;
            let span = lhs.span().merge(rhs.span());
            lhs = Expr::Logical {
                op: LogicalOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
        Some(lhs)
    }

    fn parse_equality(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = match self.current_kind() {
                TokenKind::EqEq => BinOp::Eq,
                TokenKind::NotEq => BinOp::Ne,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_relational()?;
            let span = lhs.span().merge(rhs.span());
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
        Some(lhs)
    }

    fn parse_relational(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.current_kind() {
                TokenKind::Lt => BinOp::Lt,
                TokenKind::Le => BinOp::Le,
                TokenKind::Gt => BinOp::Gt,
                TokenKind::Ge => BinOp::Ge,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_additive()?;
            let span = lhs.span().merge(rhs.span());
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
        Some(lhs)
    }

    fn parse_additive(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.current_kind() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_multiplicative()?;
            let span = lhs.span().merge(rhs.span());
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
        Some(lhs)
    }

    fn parse_multiplicative(&mut self) -> Option<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.current_kind() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Percent => BinOp::Mod,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_unary()?;
            let span = lhs.span().merge(rhs.span());
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
        Some(lhs)
    }

    fn parse_unary(&mut self) -> Option<Expr> {
        let start = self.current_span();
        macro_rules! prefix_unop {
            ($op:expr) => {{
                self.bump();
                let operand = self.parse_unary()?;
                let span = start.merge(operand.span());
                Some(Expr::Unary {
                    op: $op,
                    operand: Box::new(operand),
                    span,
                })
            }};
        }
        match self.current_kind() {
            TokenKind::Not => prefix_unop!(UnaryOp::Not),
            TokenKind::Minus => prefix_unop!(UnaryOp::Neg),
            TokenKind::Typeof => prefix_unop!(UnaryOp::Typeof),
            TokenKind::Sizeof => prefix_unop!(UnaryOp::Sizeof),
            TokenKind::Keysof => prefix_unop!(UnaryOp::Keysof),
            TokenKind::Clone => {
                self.bump();
                let operand = self.parse_unary()?;
                let span = start.merge(operand.span());
                Some(Expr::Clone(Box::new(operand), span))
            }
            TokenKind::Delete => {
                self.bump();
                let operand = self.parse_unary()?;
                let span = start.merge(operand.span());
                Some(Expr::Delete(Box::new(operand), span))
            }
            TokenKind::PlusPlus => {
                self.bump();
                let operand = self.parse_unary()?;
                let span = start.merge(operand.span());
                Some(Expr::PreIncDec {
                    op: IncDecOp::Inc,
                    operand: Box::new(operand),
                    span,
                })
            }
            TokenKind::MinusMinus => {
                self.bump();
                let operand = self.parse_unary()?;
                let span = start.merge(operand.span());
                Some(Expr::PreIncDec {
                    op: IncDecOp::Dec,
                    operand: Box::new(operand),
                    span,
                })
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Option<Expr> {
        // Anonymous function literal: `(params) { body }` with no
        // preceding callee, distinguished from a parenthesized
        // grouping expression by scanning to the matching `)` and
        // checking for a trailing `{`.
        if matches!(self.current_kind(), TokenKind::LParen) && self.looks_like_fn_literal() {
            return self.parse_fn_literal(None);
        }

        let mut expr = self.parse_primary()?;
        loop {
            match self.current_kind() {
                TokenKind::Dot => {
                    self.bump();
                    let name = match self.ident_symbol() {
                        Some(s) => s,
                        None => {
                            self.error("expected property name after `.`", self.current_span());
                            return None;
                        }
                    };
                    let end = self.current_span();
                    self.bump();
                    let span = expr.span().merge(end);
                    expr = Expr::Member {
                        object: Box::new(expr),
                        key: MemberKey::Ident(name),
                        span,
                    };
                }
                TokenKind::LBracket => {
                    self.bump();
                    let index = self.parse_expr()?;
                    let end_tok = self.expect(&TokenKind::RBracket)?;
                    let span = expr.span().merge(end_tok.span);
                    expr = Expr::Member {
                        object: Box::new(expr),
                        key: MemberKey::Computed(Box::new(index)),
                        span,
                    };
                }
                TokenKind::LParen => {
                    if self.looks_like_fn_literal() {
                        let name = match &expr {
                            Expr::Ident(s, _) => Some(*s),
                            _ => None,
                        };
                        expr = self.parse_fn_literal(name)?;
                    } else {
                        let args = self.parse_args()?;
                        let end = self.current_span();
                        let span = expr.span().merge(end);
                        expr = Expr::Call {
                            callee: Box::new(expr),
                            args,
                            span,
                        };
                    }
                }
                TokenKind::PlusPlus => {
                    let end = self.current_span();
                    self.bump();
                    let span = expr.span().merge(end);
                    expr = Expr::PostIncDec {
                        op: IncDecOp::Inc,
                        operand: Box::new(expr),
                        span,
                    };
                }
                TokenKind::MinusMinus => {
                    let end = self.current_span();
                    self.bump();
                    let span = expr.span().merge(end);
                    expr = Expr::PostIncDec {
                        op: IncDecOp::Dec,
                        operand: Box::new(expr),
                        span,
                    };
                }
                _ => break,
            }
        }
        Some(expr)
    }

    fn parse_primary(&mut self) -> Option<Expr> {
        let start = self.current_span();
        match self.current_kind().clone() {
            TokenKind::Nil => {
                self.bump();
                Some(Expr::Nil(start))
            }
            TokenKind::True => {
                self.bump();
                Some(Expr::Bool(true, start))
            }
            TokenKind::False => {
                self.bump();
                Some(Expr::Bool(false, start))
            }
            TokenKind::Nan => {
                self.bump();
                Some(Expr::Nan(start))
            }
            TokenKind::Number(n) => {
                self.bump();
                Some(Expr::Number(n, start))
            }
            TokenKind::Str(s) => {
                self.bump();
                Some(Expr::Str(s, start))
            }
            TokenKind::Ident(s) => {
                self.bump();
                Some(Expr::Ident(s, start))
            }
            TokenKind::LParen => {
                self.bump();
                let inner = self.parse_expr()?;
                self.expect(&TokenKind::RParen)?;
                Some(inner)
            }
            TokenKind::LBracket => self.parse_array_literal(start),
            TokenKind::LBrace => self.parse_object_literal(start),
            other => {
                self.error(format!("expected expression, found {}", other.describe()), start);
                None
            }
        }
    }

    fn parse_array_literal(&mut self, start: Span) -> Option<Expr> {
        self.bump(); // `[`
        let mut items = Vec::new();
        while !self.check(&TokenKind::RBracket) && !self.at_eof() {
            items.push(self.parse_expr()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        let end = self.expect(&TokenKind::RBracket)?;
        Some(Expr::Array(items, start.merge(end.span)))
    }

    fn parse_object_literal(&mut self, start: Span) -> Option<Expr> {
        self.bump(); // `{`
        let mut props = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_eof() {
            let key = match self.current_kind().clone() {
                TokenKind::Ident(s) => {
                    self.bump();
                    PropKey::Ident(s)
                }
                TokenKind::Str(s) => {
                    self.bump();
                    PropKey::Str(s)
                }
                TokenKind::Number(n) => {
                    self.bump();
                    PropKey::Number(n)
                }
                other => {
                    self.error(
                        format!("expected property key, found {}", other.describe()),
                        self.current_span(),
                    );
                    return None;
                }
            };
            self.expect(&TokenKind::Colon)?;
            let value = self.parse_expr()?;
            props.push((key, value));
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        let end = self.expect(&TokenKind::RBrace)?;
        Some(Expr::Object(props, start.merge(end.span)))
    }

    fn parse_args(&mut self) -> Option<Vec<Expr>> {
        self.bump(); // `(`
        let mut args = Vec::new();
        while !self.check(&TokenKind::RParen) && !self.at_eof() {
            args.push(self.parse_expr()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen)?;
        Some(args)
    }

    fn parse_fn_literal(&mut self, name: Option<candor_util::Symbol>) -> Option<Expr> {
        let start = self.current_span();
        self.bump(); // `(`
        let mut params = Vec::new();
        while !self.check(&TokenKind::RParen) && !self.at_eof() {
            match self.ident_symbol() {
                Some(p) => {
                    self.bump();
                    params.push(p);
                }
                None => {
                    self.error(
                        "expected parameter name",
                        self.current_span(),
                    );
                    return None;
                }
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen)?;
        let body = self.parse_block()?;
        let span = start.merge(body.span);
        Some(Expr::Function(Box::new(FunctionLiteral {
            name,
            params,
            body,
            span,
        })))
    }

    /// Scans from the current `(` to its matching `)` (tracking paren
    /// depth only — nested `[`/`{` inside a normal call's arguments
    /// don't affect the match) and reports whether a `{` immediately
    /// follows. That single bit of lookahead is exactly what
    /// `original_source/parser.cc`'s `ParseExpression` uses its
    /// backtracking `Position` save/restore for for: a `(` is a
    /// function literal's parameter list iff a block follows its
    /// close-paren, otherwise it's a call's argument list or a
    /// grouping expression.
    fn looks_like_fn_literal(&self) -> bool {
        let mut depth: i32 = 0;
        let mut i = 0usize;
        loop {
            match self.peek_kind_at(i) {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        return matches!(self.peek_kind_at(i + 1), TokenKind::LBrace);
                    }
                }
                TokenKind::Eof => return false,
                _ => {}
            }
            i += 1;
        }
    }
}
