//! Pratt parser: token stream to AST.
//!
//! Table-driven precedence climbing: every token kind maps to a
//! `(prefix, infix, precedence)` rule. Statements and declarations are
//! recursive descent on top of the expression parser.
//!
//! Error recovery is token-by-token: an error is recorded, the offending
//! token is consumed, and parsing continues; failed subtrees surface as
//! `None` children which later passes skip.

use crate::ast::{
    Block, FuncDeclNode, Literal, LoopKind, LoopNode, Node, Param, PostfixNode, PostfixOp, VarDeclNode, VarRef,
};
use crate::diagnostics::{Diagnostics, Phase};
use crate::token::{Token, TokenKind};

/// Binding powers, low to high.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Prec {
    Lowest,
    Assign,
    Or,
    And,
    Comp,
    Range,
    Term,
    Factor,
    Unary,
    Call,
}

type PrefixFn = for<'a, 's, 'd> fn(&'a mut Parser<'s, 'd>, Token) -> Option<Node>;
type InfixFn = for<'a, 's, 'd> fn(&'a mut Parser<'s, 'd>, Node, Token) -> Option<Node>;

struct Rule {
    prefix: Option<PrefixFn>,
    infix: Option<InfixFn>,
    prec: Prec,
}

fn rule(kind: TokenKind) -> Rule {
    use TokenKind as T;
    let (prefix, infix, prec): (Option<PrefixFn>, Option<InfixFn>, Prec) = match kind {
        T::OpenParen => (Some(parse_grouping), Some(parse_postfix), Prec::Call),
        T::OpenBracket => (Some(parse_array), Some(parse_postfix), Prec::Call),
        T::Dot => (None, Some(parse_postfix), Prec::Call),

        T::Int | T::Float => (Some(parse_number), None, Prec::Lowest),
        T::Str => (Some(parse_string), None, Prec::Lowest),
        T::True | T::False => (Some(parse_bool), None, Prec::Lowest),
        T::Identifier => (Some(parse_identifier), None, Prec::Lowest),
        T::Func => (Some(parse_func_expr), None, Prec::Lowest),

        T::Eq | T::AddEq | T::SubEq | T::MulEq | T::DivEq => (None, Some(parse_assign), Prec::Assign),

        T::Bang => (Some(parse_unary), None, Prec::Unary),
        T::Sub => (Some(parse_unary), Some(parse_infix), Prec::Term),
        T::Add => (None, Some(parse_infix), Prec::Term),
        T::Mul | T::Div | T::Mod => (None, Some(parse_infix), Prec::Factor),
        T::Range => (None, Some(parse_infix), Prec::Range),

        T::AndAnd => (None, Some(parse_infix), Prec::And),
        T::OrOr => (None, Some(parse_infix), Prec::Or),
        T::EqEq | T::NotEq | T::Lt | T::Gt | T::LtEq | T::GtEq => (None, Some(parse_infix), Prec::Comp),

        _ => (None, None, Prec::Lowest),
    };
    Rule { prefix, infix, prec }
}

pub struct Parser<'s, 'd> {
    tokens: Vec<Token>,
    source: &'s str,
    diags: &'d mut Diagnostics,
    current: usize,
}

/// Parses the token stream into the root block.
///
/// The returned block is always usable: statements that failed to parse are
/// simply absent from it, with their errors recorded in `diags`.
pub fn parse(tokens: Vec<Token>, source: &str, diags: &mut Diagnostics) -> Block {
    let mut parser = Parser {
        tokens,
        source,
        diags,
        current: 0,
    };
    let mut stmts = Vec::new();
    while !parser.at_end() {
        if let Some(node) = parser.parse_decl() {
            stmts.push(Some(node));
        }
    }
    Block { stmts, is_root: true }
}

impl<'s, 'd> Parser<'s, 'd> {
    fn peek(&self) -> Token {
        self.tokens[self.current]
    }

    fn previous(&self) -> Token {
        self.tokens[self.current.saturating_sub(1)]
    }

    fn at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn advance(&mut self) -> Token {
        let token = self.peek();
        if self.current + 1 < self.tokens.len() {
            self.current += 1;
        }
        token
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error(&mut self, token: Token, message: impl Into<String>) {
        self.diags.error(Phase::Syntax, token, message);
    }

    /// Consumes the expected token or records an error and consumes whatever
    /// was there instead.
    fn expect(&mut self, kind: TokenKind, what: &str) -> Option<Token> {
        if self.check(kind) {
            return Some(self.advance());
        }
        let next = self.peek();
        let got = if next.kind == TokenKind::Eof {
            "end of file".to_owned()
        } else {
            format!("'{}'", next.lexeme(self.source))
        };
        self.error(next, format!("Expected {what} but got {got}"));
        self.advance();
        None
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    fn parse_expression(&mut self) -> Option<Node> {
        self.parse_precedence(Prec::Lowest)
    }

    fn parse_precedence(&mut self, prec: Prec) -> Option<Node> {
        let token = self.advance();
        let Some(prefix) = rule(token.kind).prefix else {
            self.error(token, format!("Expected an expression but got '{}'", token.lexeme(self.source)));
            return None;
        };

        let mut left = prefix(self, token)?;
        while !self.at_end() {
            let next = rule(self.peek().kind);
            if prec >= next.prec {
                break;
            }
            let Some(infix) = next.infix else {
                break;
            };
            let token = self.advance();
            left = infix(self, left, token)?;
        }
        Some(left)
    }

    fn parse_call_args(&mut self) -> Vec<Option<Node>> {
        let mut args = Vec::new();
        if self.matches(TokenKind::CloseParen) {
            return args;
        }
        loop {
            args.push(self.parse_expression());
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::CloseParen, "')' after arguments");
        args
    }

    // ========================================================================
    // Statements and declarations
    // ========================================================================

    fn parse_decl(&mut self) -> Option<Node> {
        let is_static = self.matches(TokenKind::Static);

        if self.matches(TokenKind::Var) {
            return self.parse_var_decl(is_static);
        }
        if self.matches(TokenKind::Func) {
            return self.parse_func_decl(is_static);
        }
        if self.matches(TokenKind::Class) {
            if is_static {
                let token = self.previous();
                self.error(token, "Classes cannot be static");
            }
            return self.parse_class_decl();
        }
        if is_static {
            let token = self.peek();
            self.error(token, "Expected a variable or function after 'static'");
        }
        self.parse_stmt()
    }

    fn parse_stmt(&mut self) -> Option<Node> {
        if self.matches(TokenKind::If) {
            return self.parse_if();
        }
        if self.matches(TokenKind::While) {
            return self.parse_while();
        }
        if self.matches(TokenKind::For) {
            return self.parse_for();
        }
        if self.matches(TokenKind::Return) {
            return self.parse_return();
        }
        let node = self.parse_expression();
        self.matches(TokenKind::Semicolon);
        node
    }

    fn parse_var_decl(&mut self, is_static: bool) -> Option<Node> {
        let name_token = match self.expect(TokenKind::Identifier, "an identifier after 'var'") {
            Some(token) => token,
            None => return None,
        };
        let name = name_token.lexeme(self.source).to_owned();

        let init = if self.matches(TokenKind::Eq) {
            self.parse_expression().map(Box::new)
        } else {
            None
        };
        self.matches(TokenKind::Semicolon);

        Some(Node::VarDecl(VarDeclNode {
            token: name_token,
            name,
            is_static,
            init,
            place: None,
        }))
    }

    fn parse_func_decl(&mut self, is_static: bool) -> Option<Node> {
        let name_token = match self.expect(TokenKind::Identifier, "an identifier after 'func'") {
            Some(token) => token,
            None => return None,
        };
        let name = name_token.lexeme(self.source).to_owned();

        self.expect(TokenKind::OpenParen, "'(' after function name");
        let params = self.parse_params();
        let body = self.parse_block();

        let func = Node::FuncDecl(FuncDeclNode {
            token: name_token,
            name: name.clone(),
            params,
            body,
            upvalues: Vec::new(),
            is_method: false,
        });
        // Named functions declare a variable holding the closure.
        Some(Node::VarDecl(VarDeclNode {
            token: name_token,
            name,
            is_static,
            init: Some(Box::new(func)),
            place: None,
        }))
    }

    fn parse_params(&mut self) -> Vec<Param> {
        let mut params = Vec::new();
        if self.matches(TokenKind::CloseParen) {
            return params;
        }
        loop {
            if let Some(token) = self.expect(TokenKind::Identifier, "a parameter name") {
                params.push(Param {
                    token,
                    name: token.lexeme(self.source).to_owned(),
                });
            }
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::CloseParen, "')' after parameters");
        params
    }

    fn parse_class_decl(&mut self) -> Option<Node> {
        let name_token = match self.expect(TokenKind::Identifier, "an identifier after 'class'") {
            Some(token) => token,
            None => return None,
        };
        let name = name_token.lexeme(self.source).to_owned();

        let body = self.parse_block();

        Some(Node::ClassDecl(crate::ast::ClassDeclNode {
            token: name_token,
            name,
            members: body.stmts,
            num_instance_vars: 0,
            num_static_vars: 0,
            constructor: None,
            member_map: indexmap::IndexMap::new(),
            global_slot: None,
        }))
    }

    fn parse_if(&mut self) -> Option<Node> {
        let token = self.previous();
        self.expect(TokenKind::OpenParen, "'(' after 'if'");
        let cond = self.parse_expression().map(Box::new);
        self.expect(TokenKind::CloseParen, "')' after condition");

        let then = self.parse_block();

        let els = if self.matches(TokenKind::Else) {
            if self.matches(TokenKind::If) {
                self.parse_if().map(Box::new)
            } else {
                Some(Box::new(Node::Block(self.parse_block())))
            }
        } else {
            None
        };

        Some(Node::If { token, cond, then, els })
    }

    fn parse_while(&mut self) -> Option<Node> {
        let token = self.previous();
        self.expect(TokenKind::OpenParen, "'(' after 'while'");
        let cond = self.parse_expression().map(Box::new);
        self.expect(TokenKind::CloseParen, "')' after condition");
        let body = self.parse_block();

        Some(Node::Loop(LoopNode {
            kind: LoopKind::While,
            token,
            init: None,
            cond,
            inc: None,
            body,
            seq_slot: None,
            idx_slot: None,
        }))
    }

    fn parse_for(&mut self) -> Option<Node> {
        let token = self.previous();

        if self.matches(TokenKind::OpenParen) {
            // for (INIT; COND; INC) BLOCK
            let init = if self.matches(TokenKind::Semicolon) {
                None
            } else if self.matches(TokenKind::Var) {
                // The declaration consumes its own ';'.
                self.parse_var_decl(false).map(Box::new)
            } else {
                let expr = self.parse_expression().map(Box::new);
                self.expect(TokenKind::Semicolon, "';' after loop initializer");
                expr
            };

            let cond = self.parse_expression().map(Box::new);
            self.expect(TokenKind::Semicolon, "';' after loop condition");

            let inc = if self.check(TokenKind::CloseParen) {
                None
            } else {
                self.parse_expression().map(Box::new)
            };
            self.expect(TokenKind::CloseParen, "')' after loop clauses");

            let body = self.parse_block();
            return Some(Node::Loop(LoopNode {
                kind: LoopKind::CFor,
                token,
                init,
                cond,
                inc,
                body,
                seq_slot: None,
                idx_slot: None,
            }));
        }

        // for NAME in EXPR BLOCK
        let name_token = match self.expect(TokenKind::Identifier, "a loop variable after 'for'") {
            Some(token) => token,
            None => return None,
        };
        let name = name_token.lexeme(self.source).to_owned();
        self.expect(TokenKind::In, "'in' after loop variable");
        let seq = self.parse_expression().map(Box::new);
        let body = self.parse_block();

        Some(Node::Loop(LoopNode {
            kind: LoopKind::ForIn,
            token,
            init: Some(Box::new(Node::VarDecl(VarDeclNode {
                token: name_token,
                name,
                is_static: false,
                init: None,
                place: None,
            }))),
            cond: seq,
            inc: None,
            body,
            seq_slot: None,
            idx_slot: None,
        }))
    }

    fn parse_return(&mut self) -> Option<Node> {
        let token = self.previous();
        let expr = if self.check(TokenKind::Semicolon) || self.check(TokenKind::CloseBrace) {
            None
        } else {
            self.parse_expression().map(Box::new)
        };
        self.matches(TokenKind::Semicolon);
        Some(Node::Return { token, expr })
    }

    fn parse_block(&mut self) -> Block {
        let mut stmts = Vec::new();
        self.expect(TokenKind::OpenBrace, "'{'");

        while !self.check(TokenKind::CloseBrace) {
            if self.at_end() {
                let token = self.peek();
                self.error(token, "Unexpected end of file while parsing a block");
                return Block { stmts, is_root: false };
            }
            if let Some(node) = self.parse_decl() {
                stmts.push(Some(node));
            }
        }
        self.expect(TokenKind::CloseBrace, "'}'");
        Block { stmts, is_root: false }
    }
}

// ============================================================================
// Prefix rules
// ============================================================================

fn parse_number(parser: &mut Parser, token: Token) -> Option<Node> {
    let text = token.lexeme(parser.source);
    let value = if token.kind == TokenKind::Int {
        match text.parse::<i64>() {
            Ok(v) => Literal::Int(v),
            Err(_) => {
                parser.error(token, format!("Integer literal {text} is out of range"));
                return None;
            }
        }
    } else {
        match text.parse::<f64>() {
            Ok(v) => Literal::Float(v),
            Err(_) => {
                parser.error(token, format!("Malformed float literal {text}"));
                return None;
            }
        }
    };
    Some(Node::Literal { token, value })
}

fn parse_string(parser: &mut Parser, token: Token) -> Option<Node> {
    let value = Literal::Str(token.lexeme(parser.source).to_owned());
    Some(Node::Literal { token, value })
}

fn parse_bool(_parser: &mut Parser, token: Token) -> Option<Node> {
    Some(Node::Literal {
        token,
        value: Literal::Bool(token.kind == TokenKind::True),
    })
}

fn parse_identifier(parser: &mut Parser, token: Token) -> Option<Node> {
    Some(Node::Var(VarRef {
        token,
        name: token.lexeme(parser.source).to_owned(),
        is_assign: false,
        resolution: None,
    }))
}

fn parse_grouping(parser: &mut Parser, _token: Token) -> Option<Node> {
    let expr = parser.parse_expression();
    parser.expect(TokenKind::CloseParen, "')' after expression");
    expr
}

fn parse_array(parser: &mut Parser, token: Token) -> Option<Node> {
    let mut items = Vec::new();
    if parser.matches(TokenKind::CloseBracket) {
        return Some(Node::List { token, items });
    }
    loop {
        items.push(parser.parse_expression());
        if !parser.matches(TokenKind::Comma) {
            break;
        }
    }
    parser.expect(TokenKind::CloseBracket, "']' after array elements");
    Some(Node::List { token, items })
}

fn parse_unary(parser: &mut Parser, token: Token) -> Option<Node> {
    let operand = parser.parse_precedence(Prec::Unary).map(Box::new);
    Some(Node::Unary { op: token, operand })
}

/// `func (params) { ... }` in expression position: an anonymous function.
fn parse_func_expr(parser: &mut Parser, token: Token) -> Option<Node> {
    // A name is allowed (it only labels the closure), matching named
    // function arguments like `xs.map(func sq(x) { ... })`.
    let name = if parser.check(TokenKind::Identifier) {
        let name_token = parser.advance();
        name_token.lexeme(parser.source).to_owned()
    } else {
        "{anonymous func}".to_owned()
    };

    parser.expect(TokenKind::OpenParen, "'(' after 'func'");
    let params = parser.parse_params();
    let body = parser.parse_block();

    Some(Node::FuncDecl(FuncDeclNode {
        token,
        name,
        params,
        body,
        upvalues: Vec::new(),
        is_method: false,
    }))
}

// ============================================================================
// Infix rules
// ============================================================================

fn parse_infix(parser: &mut Parser, left: Node, token: Token) -> Option<Node> {
    let right = parser.parse_precedence(rule(token.kind).prec).map(Box::new);
    Some(Node::Binary {
        op: token,
        left: Some(Box::new(left)),
        right,
    })
}

fn parse_assign(parser: &mut Parser, left: Node, token: Token) -> Option<Node> {
    // Right-associative: the RHS consumes further assignments.
    let mut right = parser.parse_expression()?;

    if token.is_compound_assign() {
        if postfix_contains_call(&left) {
            parser.error(token, "Compound assignment target must not contain a call");
            return None;
        }
        let base = token.compound_base().expect("checked is_compound_assign");
        let op = Token { kind: base, ..token };
        right = Node::Binary {
            op,
            left: Some(Box::new(left.clone())),
            right: Some(Box::new(right)),
        };
    }

    let mut target = left;
    if !mark_assign_target(&mut target) {
        parser.error(token, "Invalid assignment target");
        return None;
    }

    Some(Node::Binary {
        op: Token {
            kind: TokenKind::Eq,
            ..token
        },
        left: Some(Box::new(target)),
        right: Some(Box::new(right)),
    })
}

fn parse_postfix(parser: &mut Parser, left: Node, token: Token) -> Option<Node> {
    let mut ops = Vec::new();
    push_postfix_op(parser, &mut ops, token);

    loop {
        let next = parser.peek();
        match next.kind {
            TokenKind::Dot | TokenKind::OpenParen | TokenKind::OpenBracket => {
                let token = parser.advance();
                push_postfix_op(parser, &mut ops, token);
            }
            _ => break,
        }
    }

    Some(Node::Postfix(PostfixNode {
        target: Some(Box::new(left)),
        ops,
        is_assign: false,
    }))
}

fn push_postfix_op(parser: &mut Parser, ops: &mut Vec<PostfixOp>, token: Token) {
    match token.kind {
        TokenKind::OpenParen => {
            let args = parser.parse_call_args();
            ops.push(PostfixOp::Call { paren: token, args });
        }
        TokenKind::Dot => {
            if let Some(name_token) = parser.expect(TokenKind::Identifier, "a property name after '.'") {
                ops.push(PostfixOp::Access {
                    token: name_token,
                    name: name_token.lexeme(parser.source).to_owned(),
                });
            }
        }
        TokenKind::OpenBracket => {
            let index = parser.parse_expression().map(Box::new);
            parser.expect(TokenKind::CloseBracket, "']' after subscript");
            ops.push(PostfixOp::Subscript { bracket: token, index });
        }
        _ => unreachable!("postfix op dispatched on unexpected token"),
    }
}

fn mark_assign_target(node: &mut Node) -> bool {
    match node {
        Node::Var(var) => {
            var.is_assign = true;
            true
        }
        Node::Postfix(postfix) => match postfix.ops.last() {
            Some(PostfixOp::Access { .. } | PostfixOp::Subscript { .. }) => {
                postfix.is_assign = true;
                true
            }
            _ => false,
        },
        _ => false,
    }
}

fn postfix_contains_call(node: &Node) -> bool {
    match node {
        Node::Postfix(postfix) => postfix.ops.iter().any(|op| matches!(op, PostfixOp::Call { .. })),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::lexer::tokenize;

    fn parse_source(source: &str) -> (Block, Diagnostics) {
        let mut diags = Diagnostics::new();
        let tokens = tokenize(source, &mut diags);
        let ast = parse(tokens, source, &mut diags);
        (ast, diags)
    }

    fn parse_ok(source: &str) -> Block {
        let (ast, diags) = parse_source(source);
        assert!(!diags.has_errors(), "unexpected errors: {}", diags.render(source));
        ast
    }

    #[test]
    fn precedence_and_associativity() {
        let ast = parse_ok("1 + 2 * 3;");
        let Some(Node::Binary { op, right, .. }) = ast.stmts[0].as_ref() else {
            panic!("expected binary root");
        };
        assert_eq!(op.kind, TokenKind::Add);
        let Some(Node::Binary { op: mul, .. }) = right.as_deref() else {
            panic!("expected mul on the right");
        };
        assert_eq!(mul.kind, TokenKind::Mul);
    }

    #[test]
    fn assignment_marks_target() {
        let ast = parse_ok("x = 1;");
        let Some(Node::Binary { left, .. }) = ast.stmts[0].as_ref() else {
            panic!("expected assignment");
        };
        let Some(Node::Var(var)) = left.as_deref() else {
            panic!("expected var target");
        };
        assert!(var.is_assign);
    }

    #[test]
    fn compound_assignment_desugars() {
        let ast = parse_ok("x += 2;");
        let Some(Node::Binary { op, right, .. }) = ast.stmts[0].as_ref() else {
            panic!("expected assignment");
        };
        assert_eq!(op.kind, TokenKind::Eq);
        let Some(Node::Binary { op: add, .. }) = right.as_deref() else {
            panic!("expected desugared add");
        };
        assert_eq!(add.kind, TokenKind::Add);
    }

    #[test]
    fn compound_assignment_rejects_call_target() {
        let (_, diags) = parse_source("obj.get().x += 1;");
        assert!(diags.has_errors());
    }

    #[test]
    fn postfix_chain_collects_ops() {
        let ast = parse_ok("a.b(1)[2];");
        let Some(Node::Postfix(postfix)) = ast.stmts[0].as_ref() else {
            panic!("expected postfix");
        };
        assert_eq!(postfix.ops.len(), 3);
        assert!(matches!(postfix.ops[0], PostfixOp::Access { .. }));
        assert!(matches!(postfix.ops[1], PostfixOp::Call { .. }));
        assert!(matches!(postfix.ops[2], PostfixOp::Subscript { .. }));
    }

    #[test]
    fn named_function_wraps_in_var_decl() {
        let ast = parse_ok("func add(a, b) { return a + b; }");
        let Some(Node::VarDecl(decl)) = ast.stmts[0].as_ref() else {
            panic!("expected var decl wrapper");
        };
        assert_eq!(decl.name, "add");
        let Some(Node::FuncDecl(func)) = decl.init.as_deref() else {
            panic!("expected function initializer");
        };
        assert_eq!(func.params.len(), 2);
    }

    #[test]
    fn else_if_chains() {
        let ast = parse_ok("if (a) { } else if (b) { } else { }");
        let Some(Node::If { els, .. }) = ast.stmts[0].as_ref() else {
            panic!("expected if");
        };
        assert!(matches!(els.as_deref(), Some(Node::If { .. })));
    }

    #[test]
    fn for_variants() {
        let ast = parse_ok("for (var i = 0; i < 3; i += 1) { } for x in [1, 2] { }");
        let Some(Node::Loop(cfor)) = ast.stmts[0].as_ref() else {
            panic!("expected cfor");
        };
        assert_eq!(cfor.kind, LoopKind::CFor);
        assert!(cfor.inc.is_some());
        let Some(Node::Loop(forin)) = ast.stmts[1].as_ref() else {
            panic!("expected for-in");
        };
        assert_eq!(forin.kind, LoopKind::ForIn);
    }

    #[test]
    fn recovers_and_keeps_parsing() {
        let (ast, diags) = parse_source("var = 3; var ok = 1;");
        assert!(diags.has_errors());
        // The second declaration still parses.
        assert!(ast
            .stmts
            .iter()
            .flatten()
            .any(|node| matches!(node, Node::VarDecl(d) if d.name == "ok")));
    }

    #[test]
    fn range_binds_tighter_than_comparison() {
        let ast = parse_ok("a < 1..5;");
        let Some(Node::Binary { op, .. }) = ast.stmts[0].as_ref() else {
            panic!("expected binary");
        };
        assert_eq!(op.kind, TokenKind::Lt);
    }
}
