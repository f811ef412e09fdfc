//! Statement parsing: `if`/`while`/`break`/`continue`/`return`, blocks,
//! `scope { .. }` declarations, and expression statements (which cover
//! assignment and function declarations — Candor has no `let`).

use crate::ast::*;
use crate::Parser;
use candor_lex::TokenKind;
use candor_util::Symbol;

impl<'a> Parser<'a> {
    pub(crate) fn parse_stmt(&mut self) -> Option<Stmt> {
        let start = self.current_span();
        match self.current_kind().clone() {
            TokenKind::Return => {
                self.bump();
                let value = if self.stmt_ends_here() {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                let span = start.merge(self.current_span());
                Some(Stmt::Return(value, span))
            }
            TokenKind::Break => {
                self.bump();
                Some(Stmt::Break(start))
            }
            TokenKind::Continue => {
                self.bump();
                Some(Stmt::Continue(start))
            }
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::Scope => self.parse_scope_decl(),
            TokenKind::LBrace => Some(Stmt::Block(self.parse_block()?)),
            _ => {
                let expr = self.parse_expr()?;
                Some(Stmt::Expr(expr))
            }
        }
    }

    /// Statement terminators for a bare `return`: `;`, `}`, or EOF all
    /// mean "no return value", matching `original_source/parser.cc`'s
    /// `kEnd`/`kCr` check (a newline-or-`}`-terminated grammar; this
    /// port uses explicit `;` instead of significant newlines).
    fn stmt_ends_here(&self) -> bool {
        matches!(
            self.current_kind(),
            TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof
        )
    }

    fn parse_if(&mut self) -> Option<Stmt> {
        let start = self.current_span();
        self.bump(); // `if`
        self.expect(&TokenKind::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(&TokenKind::RParen)?;
        let then_branch = self.parse_block()?;
        let else_branch = if self.eat(&TokenKind::Else) {
            if matches!(self.current_kind(), TokenKind::If) {
                let inner = self.parse_if()?;
                let span = inner.span();
                Some(Block {
                    stmts: vec![inner],
                    span,
                })
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };
        let span = start.merge(self.current_span());
        Some(Stmt::If {
            cond,
            then_branch,
            else_branch,
            span,
        })
    }

    fn parse_while(&mut self) -> Option<Stmt> {
        let start = self.current_span();
        self.bump(); // `while`
        self.expect(&TokenKind::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(&TokenKind::RParen)?;
        let body = self.parse_block()?;
        let span = start.merge(self.current_span());
        Some(Stmt::While { cond, body, span })
    }

    fn parse_scope_decl(&mut self) -> Option<Stmt> {
        let start = self.current_span();
        self.bump(); // `scope`
        self.expect(&TokenKind::LBrace)?;
        let mut names = Vec::new();
        loop {
            match self.current_kind().clone() {
                TokenKind::Ident(sym) => {
                    self.bump();
                    names.push(sym);
                }
                _ => break,
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBrace)?;
        self.skip_semi();
        let span = start.merge(self.current_span());
        Some(Stmt::ScopeDecl(names, span))
    }

    pub(crate) fn parse_block(&mut self) -> Option<Block> {
        let start = self.current_span();
        self.expect(&TokenKind::LBrace)?;
        let mut stmts = Vec::new();
        self.skip_semi();
        while !self.check(&TokenKind::RBrace) && !self.at_eof() {
            stmts.push(self.parse_stmt()?);
            self.skip_semi();
        }
        self.expect(&TokenKind::RBrace)?;
        let span = start.merge(self.current_span());
        Some(Block { stmts, span })
    }

    /// Candor uses `;` as an optional statement separator (unlike the
    /// original's significant-newline grammar); consume one if present.
    pub(crate) fn skip_semi(&mut self) {
        while self.eat(&TokenKind::Semicolon) {}
    }

    pub(crate) fn ident_symbol(&self) -> Option<Symbol> {
        match self.current_kind() {
            TokenKind::Ident(s) => Some(*s),
            _ => None,
        }
    }
}
