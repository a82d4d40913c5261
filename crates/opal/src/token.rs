//! Token definitions for the lexer.
//!
//! Tokens carry positions into the original source buffer rather than owning
//! their lexeme text; substrings are materialized only when a later phase
//! needs them (identifiers, string literals).

use strum::Display;

/// Every kind of token the lexer can produce.
///
/// The alphabet is closed: keywords, identifiers, number and string literals,
/// punctuation, operators and compound assignments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum TokenKind {
    // Punctuation
    OpenParen,
    CloseParen,
    OpenBrace,
    CloseBrace,
    OpenBracket,
    CloseBracket,
    Comma,
    Semicolon,
    Dot,

    // Literals
    Int,
    Float,
    Str,

    // Identifiers and keywords
    Identifier,
    Var,
    Func,
    Class,
    If,
    Else,
    While,
    For,
    In,
    Return,
    True,
    False,
    Static,

    // Operators
    Eq,
    AddEq,
    SubEq,
    MulEq,
    DivEq,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Bang,
    EqEq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    AndAnd,
    OrOr,
    Range,

    Eof,
}

/// A single token: a kind plus its position in the source buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset of the first character of the lexeme.
    pub offset: u32,
    /// Byte length of the lexeme.
    pub length: u32,
    /// 1-based source line.
    pub line: u32,
    /// 0-based column on that line.
    pub col: u32,
}

impl Token {
    pub fn new(kind: TokenKind, offset: u32, length: u32, line: u32, col: u32) -> Self {
        Self {
            kind,
            offset,
            length,
            line,
            col,
        }
    }

    /// Materializes the lexeme text out of the source buffer.
    pub fn lexeme<'s>(&self, source: &'s str) -> &'s str {
        let start = self.offset as usize;
        let end = start + self.length as usize;
        &source[start..end]
    }

    /// Returns true for `+=`, `-=`, `*=`, `/=`.
    pub fn is_compound_assign(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::AddEq | TokenKind::SubEq | TokenKind::MulEq | TokenKind::DivEq
        )
    }

    /// Maps a compound assignment to the binary operator it desugars to.
    pub fn compound_base(&self) -> Option<TokenKind> {
        match self.kind {
            TokenKind::AddEq => Some(TokenKind::Add),
            TokenKind::SubEq => Some(TokenKind::Sub),
            TokenKind::MulEq => Some(TokenKind::Mul),
            TokenKind::DivEq => Some(TokenKind::Div),
            _ => None,
        }
    }
}

/// Resolves an identifier lexeme to a keyword kind, if it is one.
pub fn keyword_kind(lexeme: &str) -> Option<TokenKind> {
    let kind = match lexeme {
        "var" => TokenKind::Var,
        "func" => TokenKind::Func,
        "class" => TokenKind::Class,
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "while" => TokenKind::While,
        "for" => TokenKind::For,
        "in" => TokenKind::In,
        "return" => TokenKind::Return,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "static" => TokenKind::Static,
        _ => return None,
    };
    Some(kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexeme_slices_source() {
        let source = "var count = 3";
        let token = Token::new(TokenKind::Identifier, 4, 5, 1, 4);
        assert_eq!(token.lexeme(source), "count");
    }

    #[test]
    fn keywords_resolve() {
        assert_eq!(keyword_kind("while"), Some(TokenKind::While));
        assert_eq!(keyword_kind("whale"), None);
    }

    #[test]
    fn compound_assign_desugars() {
        let token = Token::new(TokenKind::AddEq, 0, 2, 1, 0);
        assert!(token.is_compound_assign());
        assert_eq!(token.compound_base(), Some(TokenKind::Add));
    }
}
