//! Tokenizer for Candor source text.
//!
//! Candor's lexical grammar is small: a dozen keywords, identifiers,
//! numeric literals (always stored as `f64`, boxed or unboxed is a
//! later concern), single- or double-quoted strings with a handful of
//! escapes, and a flat set of operators and punctuators. There is no
//! significant whitespace, no string interpolation, and no nested
//! comment syntax beyond `//` and `/* */`.
//!
//! # Examples
//!
//! ```
//! use candor_lex::{Lexer, TokenKind};
//! use candor_util::{FileId, Handler};
//!
//! let handler = Handler::new();
//! let mut lexer = Lexer::new("a + 1", FileId::DUMMY, &handler);
//! assert!(matches!(lexer.next_token().kind, TokenKind::Ident(_)));
//! assert!(matches!(lexer.next_token().kind, TokenKind::Plus));
//! assert!(matches!(lexer.next_token().kind, TokenKind::Number(n) if n == 1.0));
//! assert!(!handler.has_errors());
//! ```

use candor_util::diagnostic::{
    E_LEXER_INVALID_NUMBER, E_LEXER_UNEXPECTED_CHAR, E_LEXER_UNKNOWN_TOKEN,
    E_LEXER_UNTERMINATED_STRING,
};
use candor_util::{FileId, Handler, Span, Symbol};

/// One lexical token: its kind plus the source range it covers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

/// The kinds of token Candor's grammar distinguishes.
///
/// Keywords get their own variant rather than riding along as
/// `Ident` with a side table, since every consumer (parser, scope
/// analyzer) needs to match on them directly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TokenKind {
    Eof,

    Ident(Symbol),
    Number(f64),
    Str(Symbol),

    // Keywords
    If,
    Else,
    While,
    Break,
    Continue,
    Return,
    True,
    False,
    Nil,
    Nan,
    Clone,
    Delete,
    Typeof,
    Sizeof,
    Keysof,
    New,
    Scope,

    // Punctuators
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    Colon,
    Dot,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    PlusPlus,
    MinusMinus,
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
    PercentEq,
    Assign,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Not,
}

impl TokenKind {
    /// A short, human-facing name for error messages (`"identifier"`,
    /// not `Ident(Symbol(..))`).
    pub fn describe(&self) -> &'static str {
        match self {
            TokenKind::Eof => "end of file",
            TokenKind::Ident(_) => "identifier",
            TokenKind::Number(_) => "number",
            TokenKind::Str(_) => "string",
            TokenKind::If => "`if`",
            TokenKind::Else => "`else`",
            TokenKind::While => "`while`",
            TokenKind::Break => "`break`",
            TokenKind::Continue => "`continue`",
            TokenKind::Return => "`return`",
            TokenKind::True => "`true`",
            TokenKind::False => "`false`",
            TokenKind::Nil => "`nil`",
            TokenKind::Nan => "`nan`",
            TokenKind::Clone => "`clone`",
            TokenKind::Delete => "`delete`",
            TokenKind::Typeof => "`typeof`",
            TokenKind::Sizeof => "`sizeof`",
            TokenKind::Keysof => "`keysof`",
            TokenKind::New => "`new`",
            TokenKind::Scope => "`scope`",
            TokenKind::LParen => "`(`",
            TokenKind::RParen => "`)`",
            TokenKind::LBrace => "`{`",
            TokenKind::RBrace => "`}`",
            TokenKind::LBracket => "`[`",
            TokenKind::RBracket => "`]`",
            TokenKind::Comma => "`,`",
            TokenKind::Semicolon => "`;`",
            TokenKind::Colon => "`:`",
            TokenKind::Dot => "`.`",
            TokenKind::Plus => "`+`",
            TokenKind::Minus => "`-`",
            TokenKind::Star => "`*`",
            TokenKind::Slash => "`/`",
            TokenKind::Percent => "`%`",
            TokenKind::PlusPlus => "`++`",
            TokenKind::MinusMinus => "`--`",
            TokenKind::PlusEq => "`+=`",
            TokenKind::MinusEq => "`-=`",
            TokenKind::StarEq => "`*=`",
            TokenKind::SlashEq => "`/=`",
            TokenKind::PercentEq => "`%=`",
            TokenKind::Assign => "`=`",
            TokenKind::EqEq => "`==`",
            TokenKind::NotEq => "`!=`",
            TokenKind::Lt => "`<`",
            TokenKind::Le => "`<=`",
            TokenKind::Gt => "`>`",
            TokenKind::Ge => "`>=`",
            TokenKind::AndAnd => "`&&`",
            TokenKind::OrOr => "`||`",
            TokenKind::Not => "`!`",
        }
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b'$'
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

/// Scans a source string into tokens, reporting lexical errors through
/// a [`Handler`] rather than failing outright: a bad character is
/// reported once and skipped, so one typo doesn't mask the rest of the
/// file's errors.
pub struct Lexer<'a> {
    bytes: &'a [u8],
    pos: usize,
    line: u32,
    column: u32,
    file_id: FileId,
    handler: &'a Handler,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str, file_id: FileId, handler: &'a Handler) -> Self {
        Lexer {
            bytes: source.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
            file_id,
            handler,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(b)
    }

    fn here(&self) -> Span {
        Span::with_file(self.pos, self.pos, self.file_id, self.line, self.column)
    }

    fn span_from(&self, start: usize, start_line: u32, start_column: u32) -> Span {
        Span::with_file(start, self.pos, self.file_id, start_line, start_column)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(b' ') | Some(b'\t') | Some(b'\r') | Some(b'\n') => {
                    self.advance();
                }
                Some(b'/') if self.peek_at(1) == Some(b'/') => {
                    while !matches!(self.peek(), None | Some(b'\n')) {
                        self.advance();
                    }
                }
                Some(b'/') if self.peek_at(1) == Some(b'*') => {
                    self.advance();
                    self.advance();
                    loop {
                        match self.peek() {
                            None => break,
                            Some(b'*') if self.peek_at(1) == Some(b'/') => {
                                self.advance();
                                self.advance();
                                break;
                            }
                            _ => {
                                self.advance();
                            }
                        }
                    }
                }
                _ => break,
            }
        }
    }

    fn lex_identifier(&mut self, start: usize, start_line: u32, start_column: u32) -> Token {
        while self.peek().map(is_ident_continue).unwrap_or(false) {
            self.advance();
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos]).unwrap();
        let span = self.span_from(start, start_line, start_column);
        let kind = match Symbol::intern_known(text) {
            Some(Symbol::KW_IF) => TokenKind::If,
            Some(Symbol::KW_ELSE) => TokenKind::Else,
            Some(Symbol::KW_WHILE) => TokenKind::While,
            Some(Symbol::KW_BREAK) => TokenKind::Break,
            Some(Symbol::KW_CONTINUE) => TokenKind::Continue,
            Some(Symbol::KW_RETURN) => TokenKind::Return,
            Some(Symbol::KW_TRUE) => TokenKind::True,
            Some(Symbol::KW_FALSE) => TokenKind::False,
            Some(Symbol::KW_NIL) => TokenKind::Nil,
            Some(Symbol::KW_NAN) => TokenKind::Nan,
            Some(Symbol::KW_CLONE) => TokenKind::Clone,
            Some(Symbol::KW_DELETE) => TokenKind::Delete,
            Some(Symbol::KW_TYPEOF) => TokenKind::Typeof,
            Some(Symbol::KW_SIZEOF) => TokenKind::Sizeof,
            Some(Symbol::KW_KEYSOF) => TokenKind::Keysof,
            Some(Symbol::KW_NEW) => TokenKind::New,
            Some(Symbol::KW_SCOPE) => TokenKind::Scope,
            Some(_) | None => TokenKind::Ident(Symbol::intern(text)),
        };
        Token { kind, span }
    }

    fn lex_number(&mut self, start: usize, start_line: u32, start_column: u32) -> Token {
        while self.peek().map(|b| b.is_ascii_digit()).unwrap_or(false) {
            self.advance();
        }
        if self.peek() == Some(b'.') && self.peek_at(1).map(|b| b.is_ascii_digit()).unwrap_or(false)
        {
            self.advance();
            while self.peek().map(|b| b.is_ascii_digit()).unwrap_or(false) {
                self.advance();
            }
        }
        if matches!(self.peek(), Some(b'e') | Some(b'E')) {
            let mut lookahead = 1;
            if matches!(self.peek_at(1), Some(b'+') | Some(b'-')) {
                lookahead = 2;
            }
            if self.peek_at(lookahead).map(|b| b.is_ascii_digit()).unwrap_or(false) {
                for _ in 0..=lookahead {
                    self.advance();
                }
                while self.peek().map(|b| b.is_ascii_digit()).unwrap_or(false) {
                    self.advance();
                }
            }
        }
        let span = self.span_from(start, start_line, start_column);
        let text = std::str::from_utf8(&self.bytes[start..self.pos]).unwrap();
        match text.parse::<f64>() {
            Ok(value) => Token {
                kind: TokenKind::Number(value),
                span,
            },
            Err(_) => {
                self.handler
                    .build_error(span, format!("invalid numeric literal `{text}`"))
                    .code(E_LEXER_INVALID_NUMBER)
                    .emit(self.handler);
                Token {
                    kind: TokenKind::Number(0.0),
                    span,
                }
            }
        }
    }

    fn lex_string(&mut self, quote: u8, start: usize, start_line: u32, start_column: u32) -> Token {
        self.advance(); // opening quote
        let mut value = String::new();
        loop {
            match self.peek() {
                None | Some(b'\n') => {
                    let span = self.span_from(start, start_line, start_column);
                    self.handler
                        .build_error(span, "unterminated string literal")
                        .code(E_LEXER_UNTERMINATED_STRING)
                        .emit(self.handler);
                    break;
                }
                Some(b) if b == quote => {
                    self.advance();
                    break;
                }
                Some(b'\\') => {
                    self.advance();
                    match self.advance() {
                        Some(b'n') => value.push('\n'),
                        Some(b't') => value.push('\t'),
                        Some(b'r') => value.push('\r'),
                        Some(b'0') => value.push('\0'),
                        Some(b'\\') => value.push('\\'),
                        Some(b'\'') => value.push('\''),
                        Some(b'"') => value.push('"'),
                        Some(other) => value.push(other as char),
                        None => break,
                    }
                }
                Some(_) => {
                    let ch_start = self.pos;
                    self.advance();
                    let mut end = self.pos;
                    // Pull in any UTF-8 continuation bytes so multi-byte
                    // characters survive round trip.
                    while end < self.bytes.len() && self.bytes[end] & 0xC0 == 0x80 {
                        end += 1;
                        self.pos = end;
                    }
                    value.push_str(std::str::from_utf8(&self.bytes[ch_start..end]).unwrap_or("?"));
                }
            }
        }
        let span = self.span_from(start, start_line, start_column);
        Token {
            kind: TokenKind::Str(Symbol::intern(&value)),
            span,
        }
    }

    fn lex_operator(&mut self, start: usize, start_line: u32, start_column: u32) -> Token {
        let first = self.advance().expect("caller peeked a byte");
        let kind = match first {
            b'(' => TokenKind::LParen,
            b')' => TokenKind::RParen,
            b'{' => TokenKind::LBrace,
            b'}' => TokenKind::RBrace,
            b'[' => TokenKind::LBracket,
            b']' => TokenKind::RBracket,
            b',' => TokenKind::Comma,
            b';' => TokenKind::Semicolon,
            b':' => TokenKind::Colon,
            b'.' => TokenKind::Dot,
            b'+' => match self.peek() {
                Some(b'+') => {
                    self.advance();
                    TokenKind::PlusPlus
                }
                Some(b'=') => {
                    self.advance();
                    TokenKind::PlusEq
                }
                _ => TokenKind::Plus,
            },
            b'-' => match self.peek() {
                Some(b'-') => {
                    self.advance();
                    TokenKind::MinusMinus
                }
                Some(b'=') => {
                    self.advance();
                    TokenKind::MinusEq
                }
                _ => TokenKind::Minus,
            },
            b'*' => match self.peek() {
                Some(b'=') => {
                    self.advance();
                    TokenKind::StarEq
                }
                _ => TokenKind::Star,
            },
            b'/' => match self.peek() {
                Some(b'=') => {
                    self.advance();
                    TokenKind::SlashEq
                }
                _ => TokenKind::Slash,
            },
            b'%' => match self.peek() {
                Some(b'=') => {
                    self.advance();
                    TokenKind::PercentEq
                }
                _ => TokenKind::Percent,
            },
            b'=' => match self.peek() {
                Some(b'=') => {
                    self.advance();
                    TokenKind::EqEq
                }
                _ => TokenKind::Assign,
            },
            b'!' => match self.peek() {
                Some(b'=') => {
                    self.advance();
                    TokenKind::NotEq
                }
                _ => TokenKind::Not,
            },
            b'<' => match self.peek() {
                Some(b'=') => {
                    self.advance();
                    TokenKind::Le
                }
                _ => TokenKind::Lt,
            },
            b'>' => match self.peek() {
                Some(b'=') => {
                    self.advance();
                    TokenKind::Ge
                }
                _ => TokenKind::Gt,
            },
            b'&' if self.peek() == Some(b'&') => {
                self.advance();
                TokenKind::AndAnd
            }
            b'|' if self.peek() == Some(b'|') => {
                self.advance();
                TokenKind::OrOr
            }
            other => {
                let span = self.span_from(start, start_line, start_column);
                if other.is_ascii() {
                    self.handler
                        .build_error(span, format!("unexpected character `{}`", other as char))
                        .code(E_LEXER_UNEXPECTED_CHAR)
                        .emit(self.handler);
                } else {
                    self.handler
                        .build_error(span, "unexpected byte in source")
                        .code(E_LEXER_UNKNOWN_TOKEN)
                        .emit(self.handler);
                }
                return self.next_token();
            }
        };
        Token {
            kind,
            span: self.span_from(start, start_line, start_column),
        }
    }

    /// Scans and returns the next token, skipping whitespace and
    /// comments first. Returns `TokenKind::Eof` repeatedly once the
    /// source is exhausted.
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace_and_comments();
        let start = self.pos;
        let start_line = self.line;
        let start_column = self.column;
        match self.peek() {
            None => Token {
                kind: TokenKind::Eof,
                span: self.here(),
            },
            Some(b) if is_ident_start(b) => self.lex_identifier(start, start_line, start_column),
            Some(b) if b.is_ascii_digit() => self.lex_number(start, start_line, start_column),
            Some(b @ b'\'') | Some(b @ b'"') => {
                self.lex_string(b, start, start_line, start_column)
            }
            _ => self.lex_operator(start, start_line, start_column),
        }
    }

    /// Current byte offset, mainly useful for tests and diagnostics.
    pub fn position(&self) -> usize {
        self.pos
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        let token = self.next_token();
        if matches!(token.kind, TokenKind::Eof) {
            None
        } else {
            Some(token)
        }
    }
}

/// Convenience entry point: scans all of `source` into a vector of
/// tokens, not including the trailing `Eof`. Errors are reported
/// through `handler`; callers should check `handler.has_errors()`
/// before trusting the result.
pub fn tokenize(source: &str, file_id: FileId, handler: &Handler) -> Vec<Token> {
    Lexer::new(source, file_id, handler).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let handler = Handler::new();
        let tokens = tokenize(source, FileId::DUMMY, &handler);
        tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn scenario_one_arithmetic() {
        assert_eq!(
            kinds("return 1 + 2 * 3"),
            vec![
                TokenKind::Return,
                TokenKind::Number(1.0),
                TokenKind::Plus,
                TokenKind::Number(2.0),
                TokenKind::Star,
                TokenKind::Number(3.0),
            ]
        );
    }

    #[test]
    fn object_literal_and_member_access() {
        assert_eq!(
            kinds("a = {a:1,b:2,c:3}; return a.c"),
            vec![
                TokenKind::Ident(Symbol::intern("a")),
                TokenKind::Assign,
                TokenKind::LBrace,
                TokenKind::Ident(Symbol::intern("a")),
                TokenKind::Colon,
                TokenKind::Number(1.0),
                TokenKind::Comma,
                TokenKind::Ident(Symbol::intern("b")),
                TokenKind::Colon,
                TokenKind::Number(2.0),
                TokenKind::Comma,
                TokenKind::Ident(Symbol::intern("c")),
                TokenKind::Colon,
                TokenKind::Number(3.0),
                TokenKind::RBrace,
                TokenKind::Semicolon,
                TokenKind::Return,
                TokenKind::Ident(Symbol::intern("a")),
                TokenKind::Dot,
                TokenKind::Ident(Symbol::intern("c")),
            ]
        );
    }

    #[test]
    fn anonymous_function_literal() {
        assert_eq!(
            kinds("() { return x }"),
            vec![
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::LBrace,
                TokenKind::Return,
                TokenKind::Ident(Symbol::intern("x")),
                TokenKind::RBrace,
            ]
        );
    }

    #[test]
    fn postfix_decrement_in_while_condition() {
        assert_eq!(
            kinds("while (i--) {}"),
            vec![
                TokenKind::While,
                TokenKind::LParen,
                TokenKind::Ident(Symbol::intern("i")),
                TokenKind::MinusMinus,
                TokenKind::RParen,
                TokenKind::LBrace,
                TokenKind::RBrace,
            ]
        );
    }

    #[test]
    fn string_literal_with_escapes() {
        let handler = Handler::new();
        let tokens = tokenize(r"'a\nb'", FileId::DUMMY, &handler);
        assert_eq!(tokens.len(), 1);
        match tokens[0].kind {
            TokenKind::Str(sym) => assert_eq!(sym.as_str(), "a\nb"),
            other => panic!("expected string token, got {other:?}"),
        }
        assert!(!handler.has_errors());
    }

    #[test]
    fn unterminated_string_reports_one_error() {
        let handler = Handler::new();
        let _ = tokenize("'abc", FileId::DUMMY, &handler);
        assert_eq!(handler.error_count(), 1);
    }

    #[test]
    fn line_comment_is_skipped() {
        assert_eq!(
            kinds("1 // trailing comment\n+ 2"),
            vec![TokenKind::Number(1.0), TokenKind::Plus, TokenKind::Number(2.0)]
        );
    }

    #[test]
    fn block_comment_is_skipped() {
        assert_eq!(
            kinds("1 /* inline */ + 2"),
            vec![TokenKind::Number(1.0), TokenKind::Plus, TokenKind::Number(2.0)]
        );
    }

    #[test]
    fn keywords_are_not_identifiers() {
        assert_eq!(
            kinds("if else while break continue return true false nil nan clone delete typeof sizeof keysof new scope"),
            vec![
                TokenKind::If,
                TokenKind::Else,
                TokenKind::While,
                TokenKind::Break,
                TokenKind::Continue,
                TokenKind::Return,
                TokenKind::True,
                TokenKind::False,
                TokenKind::Nil,
                TokenKind::Nan,
                TokenKind::Clone,
                TokenKind::Delete,
                TokenKind::Typeof,
                TokenKind::Sizeof,
                TokenKind::Keysof,
                TokenKind::New,
                TokenKind::Scope,
            ]
        );
    }

    #[test]
    fn unexpected_character_is_reported_and_skipped() {
        let handler = Handler::new();
        let tokens = tokenize("1 @ 2", FileId::DUMMY, &handler);
        assert_eq!(handler.error_count(), 1);
        assert_eq!(
            tokens.into_iter().map(|t| t.kind).collect::<Vec<_>>(),
            vec![TokenKind::Number(1.0), TokenKind::Number(2.0)]
        );
    }

    #[test]
    fn compound_assignment_operators() {
        assert_eq!(
            kinds("+= -= *= /= %= == != <= >= && ||"),
            vec![
                TokenKind::PlusEq,
                TokenKind::MinusEq,
                TokenKind::StarEq,
                TokenKind::SlashEq,
                TokenKind::PercentEq,
                TokenKind::EqEq,
                TokenKind::NotEq,
                TokenKind::Le,
                TokenKind::Ge,
                TokenKind::AndAnd,
                TokenKind::OrOr,
            ]
        );
    }
}
