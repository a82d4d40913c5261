//! The lexer: source text to a finite token stream.
//!
//! Scanning is done in one pass over a byte cursor that tracks line and
//! column. The whole token vector is produced up front (the parser indexes
//! into it freely), terminated by a single `Eof` token. Characters that
//! cannot start any token are recorded as lexical errors and skipped.

use crate::diagnostics::{Diagnostics, Phase};
use crate::token::{keyword_kind, Token, TokenKind};

/// Byte cursor over the source with line/column tracking.
struct CharStream<'s> {
    source: &'s [u8],
    pos: usize,
    line: u32,
    col: u32,
}

impl<'s> CharStream<'s> {
    fn new(source: &'s str) -> Self {
        Self {
            source: source.as_bytes(),
            pos: 0,
            line: 1,
            col: 0,
        }
    }

    fn eof(&self) -> bool {
        self.pos >= self.source.len()
    }

    fn peek(&self) -> u8 {
        if self.eof() {
            0
        } else {
            self.source[self.pos]
        }
    }

    fn peek_next(&self) -> u8 {
        if self.pos + 1 >= self.source.len() {
            0
        } else {
            self.source[self.pos + 1]
        }
    }

    fn advance(&mut self) -> u8 {
        let byte = self.peek();
        self.pos += 1;
        if byte == b'\n' {
            self.line += 1;
            self.col = 0;
        } else {
            self.col += 1;
        }
        byte
    }
}

/// Scans `source` into tokens, recording lexical errors into `diags`.
///
/// Always returns a token vector ending in `Eof`, even when errors were
/// recorded; the parser decides whether to proceed.
pub fn tokenize(source: &str, diags: &mut Diagnostics) -> Vec<Token> {
    let mut stream = CharStream::new(source);
    let mut tokens = Vec::new();

    loop {
        skip_trivia(&mut stream);
        if stream.eof() {
            break;
        }

        let line = stream.line;
        let col = stream.col;
        let start = stream.pos;
        let byte = stream.peek();

        let kind = if is_string_quote(byte) {
            scan_string(&mut stream, diags)
        } else if byte.is_ascii_digit() {
            scan_number(&mut stream)
        } else if is_identifier_start(byte) {
            scan_identifier(&mut stream, source)
        } else {
            scan_operator(&mut stream, diags)
        };

        let Some(kind) = kind else {
            continue;
        };

        // String tokens span only their contents, not the quotes.
        let (offset, length) = if kind == TokenKind::Str {
            (start + 1, stream.pos.saturating_sub(start + 2))
        } else {
            (start, stream.pos - start)
        };
        tokens.push(Token::new(kind, offset as u32, length as u32, line, col));
    }

    tokens.push(Token::new(TokenKind::Eof, stream.pos as u32, 0, stream.line, stream.col));
    tokens
}

fn skip_trivia(stream: &mut CharStream) {
    while !stream.eof() {
        let byte = stream.peek();
        if byte.is_ascii_whitespace() {
            stream.advance();
        } else if byte == b'#' {
            while !stream.eof() && stream.peek() != b'\n' {
                stream.advance();
            }
        } else {
            break;
        }
    }
}

fn is_string_quote(byte: u8) -> bool {
    byte == b'"' || byte == b'\''
}

fn is_identifier_start(byte: u8) -> bool {
    byte.is_ascii_alphabetic() || byte == b'_'
}

fn is_identifier_part(byte: u8) -> bool {
    is_identifier_start(byte) || byte.is_ascii_digit()
}

fn scan_string(stream: &mut CharStream, diags: &mut Diagnostics) -> Option<TokenKind> {
    let quote = stream.advance();
    let line = stream.line;
    let col = stream.col;
    let offset = stream.pos;
    while !stream.eof() && stream.peek() != quote {
        stream.advance();
    }
    if stream.eof() {
        diags.error_at(Phase::Lexical, line, col, offset as u32, "Unterminated string literal");
        return None;
    }
    stream.advance();
    Some(TokenKind::Str)
}

fn scan_number(stream: &mut CharStream) -> Option<TokenKind> {
    while stream.peek().is_ascii_digit() {
        stream.advance();
    }
    // A decimal point only belongs to the number when a digit follows, so
    // `0..n` stays an int followed by the range operator.
    if stream.peek() == b'.' && stream.peek_next().is_ascii_digit() {
        stream.advance();
        while stream.peek().is_ascii_digit() {
            stream.advance();
        }
        return Some(TokenKind::Float);
    }
    Some(TokenKind::Int)
}

fn scan_identifier(stream: &mut CharStream, source: &str) -> Option<TokenKind> {
    let start = stream.pos;
    while is_identifier_part(stream.peek()) {
        stream.advance();
    }
    let lexeme = &source[start..stream.pos];
    Some(keyword_kind(lexeme).unwrap_or(TokenKind::Identifier))
}

fn scan_operator(stream: &mut CharStream, diags: &mut Diagnostics) -> Option<TokenKind> {
    let line = stream.line;
    let col = stream.col;
    let offset = stream.pos;
    let byte = stream.advance();
    let kind = match byte {
        b'(' => TokenKind::OpenParen,
        b')' => TokenKind::CloseParen,
        b'{' => TokenKind::OpenBrace,
        b'}' => TokenKind::CloseBrace,
        b'[' => TokenKind::OpenBracket,
        b']' => TokenKind::CloseBracket,
        b',' => TokenKind::Comma,
        b';' => TokenKind::Semicolon,
        b'.' => {
            if stream.peek() == b'.' {
                stream.advance();
                TokenKind::Range
            } else {
                TokenKind::Dot
            }
        }
        b'+' => two_char(stream, b'=', TokenKind::AddEq, TokenKind::Add),
        b'-' => two_char(stream, b'=', TokenKind::SubEq, TokenKind::Sub),
        b'*' => two_char(stream, b'=', TokenKind::MulEq, TokenKind::Mul),
        b'/' => two_char(stream, b'=', TokenKind::DivEq, TokenKind::Div),
        b'%' => TokenKind::Mod,
        b'=' => two_char(stream, b'=', TokenKind::EqEq, TokenKind::Eq),
        b'!' => two_char(stream, b'=', TokenKind::NotEq, TokenKind::Bang),
        b'<' => two_char(stream, b'=', TokenKind::LtEq, TokenKind::Lt),
        b'>' => two_char(stream, b'=', TokenKind::GtEq, TokenKind::Gt),
        b'&' => {
            if stream.peek() == b'&' {
                stream.advance();
                TokenKind::AndAnd
            } else {
                diags.error_at(Phase::Lexical, line, col, offset as u32, "Unrecognized character '&'");
                return None;
            }
        }
        b'|' => {
            if stream.peek() == b'|' {
                stream.advance();
                TokenKind::OrOr
            } else {
                diags.error_at(Phase::Lexical, line, col, offset as u32, "Unrecognized character '|'");
                return None;
            }
        }
        other => {
            diags.error_at(
                Phase::Lexical,
                line,
                col,
                offset as u32,
                format!("Unrecognized character '{}'", other as char),
            );
            return None;
        }
    };
    Some(kind)
}

fn two_char(stream: &mut CharStream, second: u8, matched: TokenKind, single: TokenKind) -> TokenKind {
    if stream.peek() == second {
        stream.advance();
        matched
    } else {
        single
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let mut diags = Diagnostics::new();
        let tokens = tokenize(source, &mut diags);
        assert!(!diags.has_errors(), "unexpected lex errors: {}", diags.render(source));
        tokens.iter().map(|t| t.kind).collect()
    }

    #[test]
    fn scans_declaration() {
        assert_eq!(
            kinds("var x = 1;"),
            vec![
                TokenKind::Var,
                TokenKind::Identifier,
                TokenKind::Eq,
                TokenKind::Int,
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn scans_operators_and_compounds() {
        assert_eq!(
            kinds("a += b * c <= d && !e"),
            vec![
                TokenKind::Identifier,
                TokenKind::AddEq,
                TokenKind::Identifier,
                TokenKind::Mul,
                TokenKind::Identifier,
                TokenKind::LtEq,
                TokenKind::Identifier,
                TokenKind::AndAnd,
                TokenKind::Bang,
                TokenKind::Identifier,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn float_versus_range() {
        assert_eq!(kinds("1.5"), vec![TokenKind::Float, TokenKind::Eof]);
        assert_eq!(
            kinds("0..10"),
            vec![TokenKind::Int, TokenKind::Range, TokenKind::Int, TokenKind::Eof]
        );
        assert_eq!(
            kinds("xs.map"),
            vec![TokenKind::Identifier, TokenKind::Dot, TokenKind::Identifier, TokenKind::Eof]
        );
    }

    #[test]
    fn string_token_excludes_quotes() {
        let source = "'hi there'";
        let mut diags = Diagnostics::new();
        let tokens = tokenize(source, &mut diags);
        assert_eq!(tokens[0].kind, TokenKind::Str);
        assert_eq!(tokens[0].lexeme(source), "hi there");
    }

    #[test]
    fn comments_and_positions() {
        let source = "# heading\nvar x";
        let mut diags = Diagnostics::new();
        let tokens = tokenize(source, &mut diags);
        assert_eq!(tokens[0].kind, TokenKind::Var);
        assert_eq!(tokens[0].line, 2);
        assert_eq!(tokens[0].col, 0);
    }

    #[test]
    fn unknown_character_is_counted_and_skipped() {
        let mut diags = Diagnostics::new();
        let tokens = tokenize("var @ x", &mut diags);
        assert_eq!(diags.error_count(), 1);
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(kinds, vec![TokenKind::Var, TokenKind::Identifier, TokenKind::Eof]);
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let mut diags = Diagnostics::new();
        tokenize("\"oops", &mut diags);
        assert_eq!(diags.error_count(), 1);
    }
}
