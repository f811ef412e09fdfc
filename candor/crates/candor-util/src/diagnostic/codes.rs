//! Diagnostic codes for categorizing compiler errors.
//!
//! This module provides the [`DiagnosticCode`] type for uniquely identifying
//! diagnostic messages. Candor only ever reports two families of compile
//! error (syntax errors from the lexer/parser, and unresolved scope
//! references from the scope analyzer) per the error model in the
//! specification; runtime-surfaceable conditions never reach this path.
//!
//! # Examples
//!
//! ```
//! use candor_util::diagnostic::DiagnosticCode;
//!
//! let code = DiagnosticCode::E0001;
//! assert_eq!(code.prefix(), "E");
//! assert_eq!(code.number(), 1);
//! assert_eq!(code.as_str(), "E0001");
//! ```

/// A unique code identifying a diagnostic message
///
/// Diagnostic codes follow the format `{prefix}{number}` where:
/// - `prefix` is typically "E" for errors or "W" for warnings
/// - `number` is a 4-digit number (padded with zeros)
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagnosticCode {
    /// The prefix (e.g., "E" for error, "W" for warning)
    pub prefix: &'static str,
    /// The numeric identifier
    pub number: u32,
}

impl DiagnosticCode {
    /// Create a new diagnostic code
    #[inline]
    pub const fn new(prefix: &'static str, number: u32) -> Self {
        Self { prefix, number }
    }

    #[inline]
    pub const fn prefix(&self) -> &'static str {
        self.prefix
    }

    #[inline]
    pub const fn number(&self) -> u32 {
        self.number
    }

    /// Get the full code string (e.g., "E0001")
    pub fn as_str(&self) -> String {
        format!("{}{:04}", self.prefix, self.number)
    }

    // =========================================================================
    // COMPILE ERRORS (spec.md §7): syntax errors and unresolved references.
    // =========================================================================

    /// E0001: generic syntax error
    pub const E0001: Self = Self::new("E", 1);

    /// E1001: Lexer - unexpected character
    pub const E_LEXER_UNEXPECTED_CHAR: Self = Self::new("E", 1001);
    /// E1002: Lexer - unterminated string literal
    pub const E_LEXER_UNTERMINATED_STRING: Self = Self::new("E", 1002);
    /// E1003: Lexer - invalid numeric literal
    pub const E_LEXER_INVALID_NUMBER: Self = Self::new("E", 1003);
    /// E1004: Lexer - unknown token
    pub const E_LEXER_UNKNOWN_TOKEN: Self = Self::new("E", 1004);

    /// E2001: Parser - unexpected token
    pub const E_PARSER_UNEXPECTED_TOKEN: Self = Self::new("E", 2001);
    /// E2002: Parser - expected a specific token
    pub const E_PARSER_EXPECTED_TOKEN: Self = Self::new("E", 2002);
    /// E2003: Parser - unexpected end of file
    pub const E_PARSER_UNEXPECTED_EOF: Self = Self::new("E", 2003);
    /// E2004: Parser - break/continue outside a loop
    pub const E_PARSER_LOOP_CONTROL_OUTSIDE_LOOP: Self = Self::new("E", 2004);

    /// E3001: Scope analyzer - unresolved identifier
    pub const E_SCOPE_UNRESOLVED: Self = Self::new("E", 3001);
    /// E3002: Scope analyzer - incorrect left-hand side of assignment
    pub const E_SCOPE_INVALID_LHS: Self = Self::new("E", 3002);
}

impl std::fmt::Debug for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DiagnosticCode({})", self.as_str())
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

pub const E0001: DiagnosticCode = DiagnosticCode::E0001;
pub const E_LEXER_UNEXPECTED_CHAR: DiagnosticCode = DiagnosticCode::E_LEXER_UNEXPECTED_CHAR;
pub const E_LEXER_UNTERMINATED_STRING: DiagnosticCode = DiagnosticCode::E_LEXER_UNTERMINATED_STRING;
pub const E_LEXER_INVALID_NUMBER: DiagnosticCode = DiagnosticCode::E_LEXER_INVALID_NUMBER;
pub const E_LEXER_UNKNOWN_TOKEN: DiagnosticCode = DiagnosticCode::E_LEXER_UNKNOWN_TOKEN;
pub const E_PARSER_UNEXPECTED_TOKEN: DiagnosticCode = DiagnosticCode::E_PARSER_UNEXPECTED_TOKEN;
pub const E_PARSER_EXPECTED_TOKEN: DiagnosticCode = DiagnosticCode::E_PARSER_EXPECTED_TOKEN;
pub const E_PARSER_UNEXPECTED_EOF: DiagnosticCode = DiagnosticCode::E_PARSER_UNEXPECTED_EOF;
pub const E_PARSER_LOOP_CONTROL_OUTSIDE_LOOP: DiagnosticCode =
    DiagnosticCode::E_PARSER_LOOP_CONTROL_OUTSIDE_LOOP;
pub const E_SCOPE_UNRESOLVED: DiagnosticCode = DiagnosticCode::E_SCOPE_UNRESOLVED;
pub const E_SCOPE_INVALID_LHS: DiagnosticCode = DiagnosticCode::E_SCOPE_INVALID_LHS;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_as_prefix_and_four_digits() {
        assert_eq!(DiagnosticCode::new("E", 1).as_str(), "E0001");
        assert_eq!(DiagnosticCode::new("E", 1001).as_str(), "E1001");
    }

    #[test]
    fn display_matches_as_str() {
        let code = DiagnosticCode::E_PARSER_UNEXPECTED_TOKEN;
        assert_eq!(format!("{code}"), code.as_str());
    }

    #[test]
    fn equality_is_by_prefix_and_number() {
        assert_eq!(DiagnosticCode::new("E", 1001), DiagnosticCode::new("E", 1001));
        assert_ne!(DiagnosticCode::new("E", 1001), DiagnosticCode::new("E", 1002));
    }

    #[test]
    fn scope_codes_are_distinct() {
        assert_ne!(
            DiagnosticCode::E_SCOPE_UNRESOLVED,
            DiagnosticCode::E_SCOPE_INVALID_LHS
        );
    }
}
