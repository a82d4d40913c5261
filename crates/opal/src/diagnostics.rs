//! Compile-time error collection and rendering.
//!
//! Each phase (lexer, parser, resolver, code generator) pushes into a shared
//! `Diagnostics` collector and checks the count when it finishes; the pipeline
//! short-circuits before the next phase if anything was recorded. Rendering
//! follows the diagnostics contract:
//!
//! ```text
//! line 3: error: Undeclared identifier foo
//!         var x = foo + 1
//!                 ^
//! ```

use std::fmt::Write;

use crate::token::Token;

/// The phase that produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Lexical,
    Syntax,
    Semantic,
    Codegen,
}

/// One recorded compile error.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub phase: Phase,
    pub line: u32,
    pub col: u32,
    pub offset: u32,
    pub message: String,
}

/// Accumulates compile errors across phases.
#[derive(Debug, Default)]
pub struct Diagnostics {
    errors: Vec<Diagnostic>,
}

/// Indentation used before the excerpt line, mirrored by the caret line.
const EXCERPT_INDENT: &str = "        ";

/// Maximum number of bytes shown on either side of the offending column.
const EXCERPT_WIDTH: usize = 40;

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an error at an explicit position.
    pub fn error_at(&mut self, phase: Phase, line: u32, col: u32, offset: u32, message: impl Into<String>) {
        self.errors.push(Diagnostic {
            phase,
            line,
            col,
            offset,
            message: message.into(),
        });
    }

    /// Records an error at a token's position.
    pub fn error(&mut self, phase: Phase, token: Token, message: impl Into<String>) {
        self.error_at(phase, token.line, token.col, token.offset, message);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[Diagnostic] {
        &self.errors
    }

    /// Renders every recorded diagnostic against the source buffer.
    pub fn render(&self, source: &str) -> String {
        let mut out = String::new();
        for diag in &self.errors {
            write_diagnostic(&mut out, diag, source);
        }
        out
    }
}

fn write_diagnostic(out: &mut String, diag: &Diagnostic, source: &str) {
    let _ = writeln!(out, "line {}: error: {}", diag.line, diag.message);

    let bytes = source.as_bytes();
    let offset = (diag.offset as usize).min(bytes.len().saturating_sub(1));
    if bytes.is_empty() {
        return;
    }

    // Walk outwards from the offending offset to the line boundaries, capped
    // so very long lines stay readable.
    let mut start = offset;
    while start > 0 && offset - start < EXCERPT_WIDTH && !is_line_break(bytes[start - 1]) {
        start -= 1;
    }
    let mut end = offset;
    while end < bytes.len() && end - offset < EXCERPT_WIDTH && !is_line_break(bytes[end]) {
        end += 1;
    }

    let excerpt = &source[start..end];
    let _ = writeln!(out, "{EXCERPT_INDENT}{excerpt}");

    // The caret column counts tabs one-for-one with how they were printed.
    let caret_col = offset - start;
    let mut caret_line = String::with_capacity(EXCERPT_INDENT.len() + caret_col + 1);
    caret_line.push_str(EXCERPT_INDENT);
    for byte in &bytes[start..offset] {
        caret_line.push(if *byte == b'\t' { '\t' } else { ' ' });
    }
    caret_line.push('^');
    let _ = writeln!(out, "{caret_line}");
}

fn is_line_break(byte: u8) -> bool {
    byte == b'\n' || byte == b'\r'
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::token::TokenKind;

    #[test]
    fn renders_line_and_caret() {
        let source = "var x = 1\nvar y = oops + 1\n";
        let mut diags = Diagnostics::new();
        // `oops` starts at offset 18, line 2, col 8.
        let token = Token::new(TokenKind::Identifier, 18, 4, 2, 8);
        diags.error(Phase::Semantic, token, "Undeclared identifier oops");

        let rendered = diags.render(source);
        assert_eq!(
            rendered,
            "line 2: error: Undeclared identifier oops\n        var y = oops + 1\n                ^\n"
        );
    }

    #[test]
    fn counts_errors() {
        let mut diags = Diagnostics::new();
        assert!(!diags.has_errors());
        diags.error_at(Phase::Lexical, 1, 0, 0, "Unrecognized character");
        assert_eq!(diags.error_count(), 1);
    }
}
