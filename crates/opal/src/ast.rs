//! Abstract syntax tree node types.
//!
//! Nodes are built by the parser and decorated in place by the resolver:
//! every variable reference receives a [`Resolution`], function declarations
//! receive their upvalue descriptor lists, class declarations their member
//! layout. After resolution the code generator never consults a symbol table.
//!
//! Children that failed to parse are `None`; later passes skip them.

use std::fmt::Write;

use indexmap::IndexMap;

use crate::token::Token;

/// Where a resolved variable reference lives, and how to reach it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Slot in the 256-entry global table.
    Global(u8),
    /// Slot in the current function's local frame.
    Local(u8),
    /// Index into the current closure's upvalue vector.
    Upvalue(u8),
    /// Instance field slot, reached through `self` at local slot 0.
    Field(u8),
    /// Instance method, dispatched by name through `self`.
    Method,
    /// Static field: the class's global slot plus the static slot.
    StaticField { class_slot: u8, slot: u8 },
    /// Static method, dispatched by name through the class's global slot.
    StaticMethod { class_slot: u8 },
}

/// Where a declaration's storage was assigned by the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclPlace {
    Global(u8),
    Local(u8),
    Field(u8),
    StaticField(u8),
    Method,
    StaticMethod,
}

/// One upvalue captured by a function.
///
/// `is_direct` means the capture reads a local of the immediately enclosing
/// function; otherwise `index` names an upvalue of the enclosing function
/// that re-captures the same variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpvalueDesc {
    pub is_direct: bool,
    pub index: u8,
    pub symbol: String,
}

/// How a class member participates in the object layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassMember {
    InstanceField(u8),
    StaticField(u8),
    Method,
    StaticMethod,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

#[derive(Debug, Clone)]
pub struct VarRef {
    pub token: Token,
    pub name: String,
    /// Set by the parser when this reference is the target of `=`.
    pub is_assign: bool,
    pub resolution: Option<Resolution>,
}

#[derive(Debug, Clone)]
pub struct VarDeclNode {
    /// The identifier token, used for diagnostics.
    pub token: Token,
    pub name: String,
    pub is_static: bool,
    pub init: Option<Box<Node>>,
    pub place: Option<DeclPlace>,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub token: Token,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct FuncDeclNode {
    pub token: Token,
    pub name: String,
    pub params: Vec<Param>,
    pub body: Block,
    /// Capture plan, filled by the resolver; stable in first-reference order.
    pub upvalues: Vec<UpvalueDesc>,
    /// True when this function is a class member (implicit `self` at slot 0).
    pub is_method: bool,
}

#[derive(Debug, Clone)]
pub struct ClassDeclNode {
    pub token: Token,
    pub name: String,
    /// Member declarations in source order; every well-formed member is a
    /// `Node::VarDecl` (functions arrive wrapped in one).
    pub members: Vec<Option<Node>>,
    pub num_instance_vars: u8,
    pub num_static_vars: u8,
    /// Index into `members` of the constructor, when one is declared.
    pub constructor: Option<usize>,
    /// Member layout in declaration order, recorded by the resolver.
    pub member_map: IndexMap<String, ClassMember>,
    /// The class's slot in the global table.
    pub global_slot: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    While,
    CFor,
    ForIn,
}

#[derive(Debug, Clone)]
pub struct LoopNode {
    pub kind: LoopKind,
    pub token: Token,
    /// `CFor`: the init statement. `ForIn`: the loop variable declaration.
    pub init: Option<Box<Node>>,
    /// `While`/`CFor`: the condition. `ForIn`: the sequence expression.
    pub cond: Option<Box<Node>>,
    /// `CFor` only: the increment expression.
    pub inc: Option<Box<Node>>,
    pub body: Block,
    /// `ForIn`: synthetic local holding the sequence.
    pub seq_slot: Option<u8>,
    /// `ForIn`: synthetic local holding the running index.
    pub idx_slot: Option<u8>,
}

#[derive(Debug, Clone)]
pub enum PostfixOp {
    Call { paren: Token, args: Vec<Option<Node>> },
    Access { token: Token, name: String },
    Subscript { bracket: Token, index: Option<Box<Node>> },
}

#[derive(Debug, Clone)]
pub struct PostfixNode {
    pub target: Option<Box<Node>>,
    pub ops: Vec<PostfixOp>,
    pub is_assign: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Block {
    pub stmts: Vec<Option<Node>>,
    pub is_root: bool,
}

#[derive(Debug, Clone)]
pub enum Node {
    Literal {
        token: Token,
        value: Literal,
    },
    Var(VarRef),
    Unary {
        op: Token,
        operand: Option<Box<Node>>,
    },
    Binary {
        op: Token,
        left: Option<Box<Node>>,
        right: Option<Box<Node>>,
    },
    Postfix(PostfixNode),
    List {
        token: Token,
        items: Vec<Option<Node>>,
    },
    VarDecl(VarDeclNode),
    FuncDecl(FuncDeclNode),
    ClassDecl(ClassDeclNode),
    Block(Block),
    If {
        token: Token,
        cond: Option<Box<Node>>,
        then: Block,
        els: Option<Box<Node>>,
    },
    Loop(LoopNode),
    Return {
        token: Token,
        expr: Option<Box<Node>>,
    },
}

impl Node {
    /// The token this node should report diagnostics against.
    pub fn token(&self) -> Token {
        match self {
            Self::Literal { token, .. }
            | Self::List { token, .. }
            | Self::If { token, .. }
            | Self::Return { token, .. } => *token,
            Self::Var(v) => v.token,
            Self::Unary { op, .. } | Self::Binary { op, .. } => *op,
            Self::Postfix(p) => match p.target.as_deref() {
                Some(target) => target.token(),
                None => match &p.ops[0] {
                    PostfixOp::Call { paren, .. } => *paren,
                    PostfixOp::Access { token, .. } => *token,
                    PostfixOp::Subscript { bracket, .. } => *bracket,
                },
            },
            Self::VarDecl(d) => d.token,
            Self::FuncDecl(f) => f.token,
            Self::ClassDecl(c) => c.token,
            Self::Block(block) => block
                .stmts
                .iter()
                .flatten()
                .next()
                .map_or(Token::new(crate::token::TokenKind::Eof, 0, 0, 1, 0), Node::token),
            Self::Loop(l) => l.token,
        }
    }
}

/// Renders the tree in the `--show-ast` format.
pub fn dump(root: &Block) -> String {
    let mut out = String::new();
    dump_block(&mut out, root, 0);
    out
}

fn tabs(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push('\t');
    }
}

fn dump_block(out: &mut String, block: &Block, depth: usize) {
    let _ = writeln!(out, "[block] nstmts: {}", block.stmts.len());
    for stmt in block.stmts.iter().flatten() {
        tabs(out, depth);
        dump_node(out, stmt, depth + 1);
    }
}

fn dump_opt(out: &mut String, node: &Option<Box<Node>>, depth: usize) {
    match node {
        Some(node) => dump_node(out, node, depth),
        None => {
            let _ = writeln!(out, "[missing]");
        }
    }
}

fn dump_node(out: &mut String, node: &Node, depth: usize) {
    match node {
        Node::Literal { value, .. } => match value {
            Literal::Int(v) => {
                let _ = writeln!(out, "[literal] int: {v}");
            }
            Literal::Float(v) => {
                let _ = writeln!(out, "[literal] float: {v}");
            }
            Literal::Str(v) => {
                let _ = writeln!(out, "[literal] string: {v}");
            }
            Literal::Bool(v) => {
                let _ = writeln!(out, "[literal] bool: {v}");
            }
        },
        Node::Var(v) => {
            let _ = writeln!(out, "[var] name: {}", v.name);
        }
        Node::Unary { op, operand } => {
            let _ = writeln!(out, "[unary] op: {}", op.kind);
            tabs(out, depth);
            dump_opt(out, operand, depth + 1);
        }
        Node::Binary { op, left, right } => {
            let _ = writeln!(out, "[binary] op: {}", op.kind);
            tabs(out, depth);
            dump_opt(out, left, depth + 1);
            tabs(out, depth);
            dump_opt(out, right, depth + 1);
        }
        Node::Postfix(postfix) => {
            let _ = write!(out, "[postfix] target: ");
            dump_opt(out, &postfix.target, depth + 1);
            tabs(out, depth);
            let _ = writeln!(out, "postfix-exprs ({}):", postfix.ops.len());
            for op in &postfix.ops {
                tabs(out, depth + 1);
                match op {
                    PostfixOp::Call { args, .. } => {
                        let _ = writeln!(out, "[post-call] args: {}", args.len());
                        for arg in args.iter().flatten() {
                            tabs(out, depth + 2);
                            dump_node(out, arg, depth + 3);
                        }
                    }
                    PostfixOp::Access { name, .. } => {
                        let _ = writeln!(out, "[post-access]: {name}");
                    }
                    PostfixOp::Subscript { index, .. } => {
                        let _ = write!(out, "[post-subscript]: ");
                        dump_opt(out, index, depth + 2);
                    }
                }
            }
        }
        Node::List { items, .. } => {
            let _ = writeln!(out, "[list] nitems: {}", items.len());
            for item in items.iter().flatten() {
                tabs(out, depth);
                dump_node(out, item, depth + 1);
            }
        }
        Node::VarDecl(decl) => {
            let _ = writeln!(
                out,
                "[var_decl] ident: {}{}",
                decl.name,
                if decl.is_static { ", storage: static" } else { "" }
            );
            if let Some(init) = &decl.init {
                tabs(out, depth);
                let _ = write!(out, "var-init: ");
                dump_node(out, init, depth + 1);
            }
        }
        Node::FuncDecl(func) => {
            let _ = writeln!(out, "[func_decl] ident: {}", func.name);
            if !func.params.is_empty() {
                tabs(out, depth);
                let names: Vec<&str> = func.params.iter().map(|p| p.name.as_str()).collect();
                let _ = writeln!(out, "func-params: {}", names.join(", "));
            }
            tabs(out, depth);
            let _ = write!(out, "func-body: ");
            dump_block(out, &func.body, depth + 1);
        }
        Node::ClassDecl(class) => {
            let _ = writeln!(out, "[class_decl] ident: {}", class.name);
            tabs(out, depth);
            let _ = writeln!(out, "class-decls:");
            for member in class.members.iter().flatten() {
                tabs(out, depth);
                dump_node(out, member, depth + 1);
            }
        }
        Node::Block(block) => dump_block(out, block, depth),
        Node::If { cond, then, els, .. } => {
            let _ = writeln!(out, "[if]");
            tabs(out, depth);
            let _ = write!(out, "if-condition: ");
            dump_opt(out, cond, depth + 1);
            tabs(out, depth);
            let _ = write!(out, "if-then: ");
            dump_block(out, then, depth + 1);
            if let Some(els) = els {
                tabs(out, depth);
                let _ = write!(out, "if-else: ");
                dump_node(out, els, depth + 1);
            }
        }
        Node::Loop(l) => {
            let _ = writeln!(out, "[loop] kind: {:?}", l.kind);
            if let Some(init) = &l.init {
                tabs(out, depth);
                let _ = write!(out, "loop-init: ");
                dump_node(out, init, depth + 1);
            }
            tabs(out, depth);
            let _ = write!(out, "loop-condition: ");
            dump_opt(out, &l.cond, depth + 1);
            if let Some(inc) = &l.inc {
                tabs(out, depth);
                let _ = write!(out, "loop-inc: ");
                dump_node(out, inc, depth + 1);
            }
            tabs(out, depth);
            let _ = write!(out, "loop-body: ");
            dump_block(out, &l.body, depth + 1);
        }
        Node::Return { expr, .. } => {
            let _ = write!(out, "[return]: ");
            match expr {
                Some(expr) => dump_node(out, expr, depth + 1),
                None => {
                    let _ = writeln!(out, "(no value)");
                }
            }
        }
    }
}
