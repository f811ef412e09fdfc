//! Recursive-descent parser producing the Candor AST that
//! `candor-sem`/`candor-hir` consume (spec.md §1 names this an
//! external collaborator; this crate exists only to drive the core
//! pipeline end to end for the CLI and test scenarios in spec.md §8.4).
//!
//! Grounded on `original_source/parser.cc`'s statement/expression split
//! and its `ParsePrimary`/`ParseMember`/`ParseExpression` precedence
//! chain, adapted to Candor's flat (no bitwise, no strict-eq) operator
//! set as already lexed by `candor-lex`.

pub mod ast;
mod expr;
mod stmt;
#[cfg(test)]
mod edge_cases;

pub use ast::*;

use candor_lex::{tokenize, Token, TokenKind};
use candor_util::{FileId, Handler, Span};

/// Parses a full program, reporting syntax errors through `handler`
/// rather than panicking (spec.md §7's compile-error path). Returns
/// `None` once a syntax error has been reported — callers check
/// `handler.has_errors()` to decide whether to keep the broken AST.
pub fn parse_program(source: &str, file_id: FileId, handler: &Handler) -> Option<Program> {
    let tokens = tokenize(source, file_id, handler);
    let mut parser = Parser::new(tokens, handler);
    parser.parse_program()
}

pub struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    handler: &'a Handler,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: Vec<Token>, handler: &'a Handler) -> Self {
        Parser {
            tokens,
            pos: 0,
            handler,
        }
    }

    pub fn parse_program(&mut self) -> Option<Program> {
        let start = self.current_span();
        let body = self.parse_stmt_list_until_eof()?;
        let span = start.merge(self.current_span());
        Some(Program {
            body: Block { stmts: body, span },
        })
    }

    fn parse_stmt_list_until_eof(&mut self) -> Option<Vec<Stmt>> {
        let mut stmts = Vec::new();
        self.skip_semi();
        while !self.at_eof() {
            let stmt = self.parse_stmt()?;
            stmts.push(stmt);
            self.skip_semi();
        }
        Some(stmts)
    }

    // ---- token cursor helpers -------------------------------------

    pub(crate) fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    pub(crate) fn current_kind(&self) -> &TokenKind {
        &self.current().kind
    }

    pub(crate) fn current_span(&self) -> Span {
        self.current().span
    }

    pub(crate) fn peek_kind_at(&self, offset: usize) -> &TokenKind {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    pub(crate) fn at_eof(&self) -> bool {
        matches!(self.current_kind(), TokenKind::Eof)
    }

    pub(crate) fn bump(&mut self) -> Token {
        let tok = *self.current();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    pub(crate) fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.current_kind()) == std::mem::discriminant(kind)
    }

    pub(crate) fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, kind: &TokenKind) -> Option<Token> {
        if self.check(kind) {
            Some(self.bump())
        } else {
            let span = self.current_span();
            self.error(
                format!(
                    "expected {}, found {}",
                    kind.describe(),
                    self.current_kind().describe()
                ),
                span,
            );
            None
        }
    }

    pub(crate) fn error(&self, message: impl Into<String>, span: Span) {
        self.handler.error(message, span);
    }
}
