//! Bytecode compiler: decorated AST to function objects.
//!
//! Walks the resolved tree emitting into a `CodeBuilder` per function.
//! Nested functions compile recursively and land in the program's function
//! table; classes build their property tables here and synthesize `$init`
//! from field initializers plus the user constructor.
//!
//! Notable conventions:
//! - stores leave the assigned value on the stack; statements never pop,
//!   frame truncation on return reclaims temporaries
//! - a method call is an access with `keep = 1` immediately followed by
//!   `CALL nargs+1`, so the receiver rides along as argument 0
//! - `var x;` stores the `null` constant so every local materializes its
//!   stack slot in declaration order

use tracing::debug;

use super::builder::{CodeBuilder, JumpLabel, JumpOverflow, PoolOverflow};
use super::code::{Function, FunctionId};
use super::op;
use crate::ast::{
    Block, ClassDeclNode, DeclPlace, FuncDeclNode, Literal, LoopKind, LoopNode, Node, PostfixOp, Resolution,
    VarDeclNode,
};
use crate::class::{Class, ClassId};
use crate::core::{self, CoreRegistry};
use crate::intern::InternerBuilder;
use crate::program::Program;
use crate::token::{Token, TokenKind};
use crate::value::Value;

/// Operand bytes cap call arity; method calls spend one slot on the receiver.
const MAX_CALL_ARGS: usize = 255;

/// Error that aborts code generation (an encoding limit was exceeded).
#[derive(Debug, Clone)]
pub struct CompileError {
    pub message: String,
    pub token: Token,
}

impl CompileError {
    fn new(message: impl Into<String>, token: Token) -> Self {
        Self {
            message: message.into(),
            token,
        }
    }
}

pub struct Compiler {
    functions: Vec<Function>,
    classes: Vec<Class>,
    interns: InternerBuilder,
    globals_init: Vec<Value>,
}

/// Compiles the resolved root block into a runnable program.
///
/// The core registry seeds the function and class tables; user functions
/// and classes are appended after the builtins.
pub fn compile_program(ast: &Block, core: CoreRegistry) -> Result<Program, CompileError> {
    let CoreRegistry {
        functions,
        classes,
        globals,
    } = core;
    let mut compiler = Compiler {
        functions,
        classes,
        interns: InternerBuilder::new(),
        globals_init: globals,
    };

    let mut builder = CodeBuilder::new();
    for stmt in ast.stmts.iter().flatten() {
        compiler.compile_stmt(stmt, &mut builder)?;
    }
    builder.emit(op::HALT);

    let main = FunctionId::new(compiler.functions.len());
    compiler.functions.push(Function::script("$main", 0, builder.build()));
    debug!(
        functions = compiler.functions.len(),
        classes = compiler.classes.len(),
        "code generation finished"
    );

    Ok(Program {
        functions: compiler.functions,
        classes: compiler.classes,
        interns: compiler.interns.build(),
        globals_init: compiler.globals_init,
        main,
    })
}

impl Compiler {
    // ========================================================================
    // Statements
    // ========================================================================

    fn compile_stmt(&mut self, node: &Node, b: &mut CodeBuilder) -> Result<(), CompileError> {
        match node {
            Node::VarDecl(decl) => self.compile_var_decl(decl, b),
            Node::ClassDecl(class) => self.compile_class(class, b),
            Node::Block(block) => self.compile_block(block, b),
            Node::If { token, cond, then, els } => self.compile_if(*token, cond, then, els.as_deref(), b),
            Node::Loop(l) => self.compile_loop(l, b),
            Node::Return { expr, .. } => {
                match expr {
                    Some(expr) => {
                        self.compile_expr(expr, b)?;
                        b.emit(op::RETURN);
                    }
                    None => b.emit(op::RET0),
                }
                Ok(())
            }
            // Everything else is an expression statement; its value lingers
            // until the frame returns.
            expr => self.compile_expr(expr, b),
        }
    }

    fn compile_block(&mut self, block: &Block, b: &mut CodeBuilder) -> Result<(), CompileError> {
        for stmt in block.stmts.iter().flatten() {
            self.compile_stmt(stmt, b)?;
        }
        Ok(())
    }

    fn compile_var_decl(&mut self, decl: &VarDeclNode, b: &mut CodeBuilder) -> Result<(), CompileError> {
        match &decl.init {
            Some(init) => self.compile_expr(init, b)?,
            None => {
                // Materialize the slot so later declarations stay dense.
                let idx = self.add_const(b, Value::Null, decl.token)?;
                b.emit_u8(op::LOADK, idx);
            }
        }
        match decl.place {
            Some(DeclPlace::Local(slot)) => b.emit_u8(op::STOREL, slot),
            Some(DeclPlace::Global(slot)) => b.emit_u8(op::STOREG, slot),
            _ => return Err(CompileError::new("Unresolved declaration", decl.token)),
        }
        Ok(())
    }

    fn compile_if(
        &mut self,
        token: Token,
        cond: &Option<Box<Node>>,
        then: &Block,
        els: Option<&Node>,
        b: &mut CodeBuilder,
    ) -> Result<(), CompileError> {
        self.compile_expr_opt(cond.as_deref(), token, b)?;
        let skip_then = b.emit_jump(op::JIF);
        self.compile_block(then, b)?;

        match els {
            Some(els) => {
                let skip_else = b.emit_jump(op::JMP);
                self.patch(b, skip_then, token)?;
                self.compile_stmt(els, b)?;
                self.patch(b, skip_else, token)?;
            }
            None => self.patch(b, skip_then, token)?,
        }
        Ok(())
    }

    fn compile_loop(&mut self, l: &LoopNode, b: &mut CodeBuilder) -> Result<(), CompileError> {
        match l.kind {
            LoopKind::While => {
                let start = b.current_offset();
                self.compile_expr_opt(l.cond.as_deref(), l.token, b)?;
                let exit = b.emit_jump(op::JIF);
                self.compile_block(&l.body, b)?;
                self.patch_loop(b, start, l.token)?;
                self.patch(b, exit, l.token)?;
            }
            LoopKind::CFor => {
                if let Some(init) = &l.init {
                    self.compile_stmt(init, b)?;
                }
                let start = b.current_offset();
                self.compile_expr_opt(l.cond.as_deref(), l.token, b)?;
                let exit = b.emit_jump(op::JIF);
                self.compile_block(&l.body, b)?;
                if let Some(inc) = &l.inc {
                    self.compile_expr(inc, b)?;
                }
                self.patch_loop(b, start, l.token)?;
                self.patch(b, exit, l.token)?;
            }
            LoopKind::ForIn => self.compile_forin(l, b)?,
        }
        Ok(())
    }

    /// `for x in seq` lowers to an index loop over `seq.size()` and
    /// `seq[idx]`, using two synthetic locals assigned by the resolver.
    fn compile_forin(&mut self, l: &LoopNode, b: &mut CodeBuilder) -> Result<(), CompileError> {
        let (Some(seq_slot), Some(idx_slot)) = (l.seq_slot, l.idx_slot) else {
            return Err(CompileError::new("Unresolved loop temporaries", l.token));
        };
        let Some(Node::VarDecl(var_decl)) = l.init.as_deref() else {
            return Err(CompileError::new("Malformed for-in loop", l.token));
        };

        self.compile_expr_opt(l.cond.as_deref(), l.token, b)?;
        b.emit_u8(op::STOREL, seq_slot);
        b.emit_u8(op::LOADI, 0);
        b.emit_u8(op::STOREL, idx_slot);

        let start = b.current_offset();

        // idx < seq.size()
        b.emit_u8(op::LOADL, idx_slot);
        b.emit_u8(op::LOADL, seq_slot);
        let size_name = self.string_const(b, "size", l.token)?;
        b.emit_u8(op::LOADK, size_name);
        b.emit_u8(op::LOADF, 1);
        b.emit_u8(op::CALL, 1);
        b.emit(op::LT);
        let exit = b.emit_jump(op::JIF);

        // x = seq[idx]
        b.emit_u8(op::LOADL, seq_slot);
        b.emit_u8(op::LOADL, idx_slot);
        b.emit(op::LOADA);
        match var_decl.place {
            Some(DeclPlace::Local(slot)) => b.emit_u8(op::STOREL, slot),
            Some(DeclPlace::Global(slot)) => b.emit_u8(op::STOREG, slot),
            _ => return Err(CompileError::new("Unresolved loop variable", var_decl.token)),
        }

        self.compile_block(&l.body, b)?;

        // idx = idx + 1
        b.emit_u8(op::LOADL, idx_slot);
        b.emit_u8(op::LOADI, 1);
        b.emit(op::ADD);
        b.emit_u8(op::STOREL, idx_slot);

        self.patch_loop(b, start, l.token)?;
        self.patch(b, exit, l.token)?;
        Ok(())
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    fn compile_expr_opt(
        &mut self,
        node: Option<&Node>,
        token: Token,
        b: &mut CodeBuilder,
    ) -> Result<(), CompileError> {
        match node {
            Some(node) => self.compile_expr(node, b),
            None => Err(CompileError::new("Missing expression", token)),
        }
    }

    fn compile_expr(&mut self, node: &Node, b: &mut CodeBuilder) -> Result<(), CompileError> {
        match node {
            Node::Literal { token, value } => self.compile_literal(*token, value, b),
            Node::Var(var) => self.compile_var_load(var, b),
            Node::Unary { op: op_token, operand } => {
                self.compile_expr_opt(operand.as_deref(), *op_token, b)?;
                match op_token.kind {
                    TokenKind::Bang => b.emit(op::NOT),
                    TokenKind::Sub => b.emit(op::NEG),
                    _ => return Err(CompileError::new("Unknown unary operator", *op_token)),
                }
                Ok(())
            }
            Node::Binary { op: op_token, left, right } => {
                if op_token.kind == TokenKind::Eq {
                    self.compile_expr_opt(right.as_deref(), *op_token, b)?;
                    let Some(target) = left.as_deref() else {
                        return Err(CompileError::new("Missing assignment target", *op_token));
                    };
                    return self.compile_store(target, *op_token, b);
                }
                self.compile_expr_opt(left.as_deref(), *op_token, b)?;
                self.compile_expr_opt(right.as_deref(), *op_token, b)?;
                b.emit(binary_opcode(*op_token)?);
                Ok(())
            }
            Node::Postfix(postfix) => self.compile_postfix_load(postfix, b),
            Node::List { token, items } => {
                if items.len() > MAX_CALL_ARGS {
                    return Err(CompileError::new(
                        format!("Array literal has more than {MAX_CALL_ARGS} elements"),
                        *token,
                    ));
                }
                for item in items {
                    self.compile_expr_opt(item.as_ref(), *token, b)?;
                }
                b.emit_u8(op::NEWARR, items.len() as u8);
                Ok(())
            }
            Node::FuncDecl(func) => self.compile_func_value(func, b),
            other => Err(CompileError::new("Expected an expression", other.token())),
        }
    }

    fn compile_literal(&mut self, token: Token, literal: &Literal, b: &mut CodeBuilder) -> Result<(), CompileError> {
        match literal {
            // Inline fast path for small non-negative integers.
            Literal::Int(n) if (0..=255).contains(n) => {
                b.emit_u8(op::LOADI, *n as u8);
                Ok(())
            }
            Literal::Int(n) => {
                let idx = self.add_const(b, Value::Int(*n), token)?;
                b.emit_u8(op::LOADK, idx);
                Ok(())
            }
            Literal::Float(f) => {
                let idx = self.add_const(b, Value::Float(*f), token)?;
                b.emit_u8(op::LOADK, idx);
                Ok(())
            }
            Literal::Bool(v) => {
                let idx = self.add_const(b, Value::Bool(*v), token)?;
                b.emit_u8(op::LOADK, idx);
                Ok(())
            }
            Literal::Str(s) => {
                let id = self.interns.intern(s);
                let idx = self.add_const(b, Value::Str(id), token)?;
                b.emit_u8(op::LOADK, idx);
                Ok(())
            }
        }
    }

    fn compile_var_load(&mut self, var: &crate::ast::VarRef, b: &mut CodeBuilder) -> Result<(), CompileError> {
        match var.resolution {
            Some(Resolution::Global(slot)) => b.emit_u8(op::LOADG, slot),
            Some(Resolution::Local(slot)) => b.emit_u8(op::LOADL, slot),
            Some(Resolution::Upvalue(index)) => b.emit_u8(op::LOADU, index),
            Some(Resolution::Field(slot)) => {
                b.emit_u8(op::LOADL, 0);
                b.emit_u8(op::LOADI, slot);
                b.emit_u8(op::LOADF, 0);
            }
            Some(Resolution::Method) => {
                b.emit_u8(op::LOADL, 0);
                let name = self.string_const(b, &var.name, var.token)?;
                b.emit_u8(op::LOADK, name);
                b.emit_u8(op::LOADF, 0);
            }
            Some(Resolution::StaticField { class_slot, slot }) => {
                b.emit_u8(op::LOADG, class_slot);
                b.emit_u8(op::LOADI, slot);
                b.emit_u8(op::LOADF, 0);
            }
            Some(Resolution::StaticMethod { class_slot }) => {
                b.emit_u8(op::LOADG, class_slot);
                let name = self.string_const(b, &var.name, var.token)?;
                b.emit_u8(op::LOADK, name);
                b.emit_u8(op::LOADF, 0);
            }
            None => return Err(CompileError::new(format!("Unresolved identifier {}", var.name), var.token)),
        }
        Ok(())
    }

    /// Emits a store into the already-compiled RHS value on the stack.
    fn compile_store(&mut self, target: &Node, eq_token: Token, b: &mut CodeBuilder) -> Result<(), CompileError> {
        match target {
            Node::Var(var) => match var.resolution {
                Some(Resolution::Global(slot)) => b.emit_u8(op::STOREG, slot),
                Some(Resolution::Local(slot)) => b.emit_u8(op::STOREL, slot),
                Some(Resolution::Upvalue(index)) => b.emit_u8(op::STOREU, index),
                Some(Resolution::Field(slot)) => {
                    b.emit_u8(op::LOADL, 0);
                    b.emit_u8(op::LOADI, slot);
                    b.emit(op::STOREF);
                }
                Some(Resolution::StaticField { class_slot, slot }) => {
                    b.emit_u8(op::LOADG, class_slot);
                    b.emit_u8(op::LOADI, slot);
                    b.emit(op::STOREF);
                }
                Some(Resolution::Method | Resolution::StaticMethod { .. }) => {
                    return Err(CompileError::new("Cannot assign to a method", var.token));
                }
                None => {
                    return Err(CompileError::new(format!("Unresolved identifier {}", var.name), var.token));
                }
            },
            Node::Postfix(postfix) => {
                let Some(target) = postfix.target.as_deref() else {
                    return Err(CompileError::new("Missing assignment target", eq_token));
                };
                let (last, init) = postfix
                    .ops
                    .split_last()
                    .ok_or_else(|| CompileError::new("Invalid assignment target", eq_token))?;

                self.compile_expr(target, b)?;
                self.compile_postfix_ops(init, b)?;

                match last {
                    PostfixOp::Access { token, name } => {
                        let name = self.string_const(b, name, *token)?;
                        b.emit_u8(op::LOADK, name);
                        b.emit(op::STOREF);
                    }
                    PostfixOp::Subscript { bracket, index } => {
                        self.compile_expr_opt(index.as_deref(), *bracket, b)?;
                        b.emit(op::STOREA);
                    }
                    PostfixOp::Call { paren, .. } => {
                        return Err(CompileError::new("Cannot assign to a call result", *paren));
                    }
                }
            }
            other => return Err(CompileError::new("Invalid assignment target", other.token())),
        }
        Ok(())
    }

    fn compile_postfix_load(&mut self, postfix: &crate::ast::PostfixNode, b: &mut CodeBuilder) -> Result<(), CompileError> {
        let Some(target) = postfix.target.as_deref() else {
            return Err(CompileError::new("Missing postfix target", postfix.ops_token()));
        };

        // A bare method name followed by a call carries its implicit
        // receiver (self, or the class for statics).
        let mut start = 0;
        if let (Node::Var(var), Some(PostfixOp::Call { paren, args })) = (target, postfix.ops.first()) {
            match var.resolution {
                Some(Resolution::Method) => {
                    b.emit_u8(op::LOADL, 0);
                    let name = self.string_const(b, &var.name, var.token)?;
                    b.emit_u8(op::LOADK, name);
                    b.emit_u8(op::LOADF, 1);
                    self.compile_method_args(args, *paren, b)?;
                    start = 1;
                }
                Some(Resolution::StaticMethod { class_slot }) => {
                    b.emit_u8(op::LOADG, class_slot);
                    let name = self.string_const(b, &var.name, var.token)?;
                    b.emit_u8(op::LOADK, name);
                    b.emit_u8(op::LOADF, 1);
                    self.compile_method_args(args, *paren, b)?;
                    start = 1;
                }
                _ => {}
            }
        }
        if start == 0 {
            self.compile_expr(target, b)?;
        }

        self.compile_postfix_ops(&postfix.ops[start..], b)
    }

    /// Emits a run of postfix operations as loads, fusing
    /// access-then-call pairs into the method-call protocol.
    fn compile_postfix_ops(&mut self, ops: &[PostfixOp], b: &mut CodeBuilder) -> Result<(), CompileError> {
        let mut i = 0;
        while i < ops.len() {
            match &ops[i] {
                PostfixOp::Access { token: name_token, name } => {
                    if let Some(PostfixOp::Call { paren, args }) = ops.get(i + 1) {
                        // Method call: keep the receiver below the method.
                        let name = self.string_const(b, name, *name_token)?;
                        b.emit_u8(op::LOADK, name);
                        b.emit_u8(op::LOADF, 1);
                        self.compile_method_args(args, *paren, b)?;
                        i += 2;
                    } else {
                        let name = self.string_const(b, name, *name_token)?;
                        b.emit_u8(op::LOADK, name);
                        b.emit_u8(op::LOADF, 0);
                        i += 1;
                    }
                }
                PostfixOp::Call { paren, args } => {
                    if args.len() > MAX_CALL_ARGS {
                        return Err(CompileError::new(
                            format!("More than {MAX_CALL_ARGS} arguments in a call"),
                            *paren,
                        ));
                    }
                    for arg in args {
                        self.compile_expr_opt(arg.as_ref(), *paren, b)?;
                    }
                    b.emit_u8(op::CALL, args.len() as u8);
                    i += 1;
                }
                PostfixOp::Subscript { bracket, index } => {
                    self.compile_expr_opt(index.as_deref(), *bracket, b)?;
                    b.emit(op::LOADA);
                    i += 1;
                }
            }
        }
        Ok(())
    }

    fn compile_method_args(
        &mut self,
        args: &[Option<Node>],
        paren: Token,
        b: &mut CodeBuilder,
    ) -> Result<(), CompileError> {
        if args.len() + 1 > MAX_CALL_ARGS {
            return Err(CompileError::new(
                format!("More than {} arguments in a method call", MAX_CALL_ARGS - 1),
                paren,
            ));
        }
        for arg in args {
            self.compile_expr_opt(arg.as_ref(), paren, b)?;
        }
        b.emit_u8(op::CALL, args.len() as u8 + 1);
        Ok(())
    }

    // ========================================================================
    // Functions and closures
    // ========================================================================

    /// Compiles a function body into the function table.
    fn compile_function(&mut self, func: &FuncDeclNode) -> Result<FunctionId, CompileError> {
        let mut fb = CodeBuilder::new();
        self.compile_block(&func.body, &mut fb)?;
        fb.emit(op::RET0);

        let id = FunctionId::new(self.functions.len());
        self.functions
            .push(Function::script(func.name.clone(), func.upvalues.len() as u8, fb.build()));
        Ok(id)
    }

    /// Emits a closure value for a function declaration: the function
    /// constant, `CLOSURE`, then one `NEWUP` per planned capture.
    fn compile_func_value(&mut self, func: &FuncDeclNode, b: &mut CodeBuilder) -> Result<(), CompileError> {
        let fid = self.compile_function(func)?;
        let idx = self.add_const(b, Value::Func(fid), func.token)?;
        b.emit_u8(op::LOADK, idx);
        b.emit(op::CLOSURE);
        for upvalue in &func.upvalues {
            b.emit_u8_u8(op::NEWUP, u8::from(upvalue.is_direct), upvalue.index);
        }
        Ok(())
    }

    // ========================================================================
    // Classes
    // ========================================================================

    /// Builds the class and its metaclass, compiles members, synthesizes
    /// `$init`, and emits the declaration plus static initializers into the
    /// enclosing code.
    fn compile_class(&mut self, class: &ClassDeclNode, b: &mut CodeBuilder) -> Result<(), CompileError> {
        let Some(class_slot) = class.global_slot else {
            return Err(CompileError::new("Unresolved class declaration", class.token));
        };

        let meta_id = ClassId::new(self.classes.len());
        let mut meta = Class::new(format!("{} metaclass", class.name), Some(core::CLASS_CLASS), None);

        let class_id = ClassId::new(self.classes.len() + 1);
        let mut new_class = Class::new(class.name.clone(), Some(core::CLASS_OBJECT), Some(meta_id));
        new_class.num_vars = class.num_instance_vars;
        new_class.static_vars = vec![Value::Null; class.num_static_vars as usize];

        let mut field_inits: Vec<(u8, &Node)> = Vec::new();
        let mut static_inits: Vec<(u8, &Node)> = Vec::new();
        let mut constructor: Option<&FuncDeclNode> = None;

        for (index, member) in class.members.iter().enumerate() {
            let Some(Node::VarDecl(decl)) = member else {
                continue;
            };
            match decl.place {
                Some(DeclPlace::Field(slot)) => {
                    new_class.bind(decl.name.clone(), Value::Int(i64::from(slot)));
                    if let Some(init) = decl.init.as_deref() {
                        field_inits.push((slot, init));
                    }
                }
                Some(DeclPlace::StaticField(slot)) => {
                    meta.bind(decl.name.clone(), Value::Int(i64::from(slot)));
                    if let Some(init) = decl.init.as_deref() {
                        static_inits.push((slot, init));
                    }
                }
                Some(DeclPlace::Method) => {
                    let Some(Node::FuncDecl(func)) = decl.init.as_deref() else {
                        continue;
                    };
                    if class.constructor == Some(index) {
                        constructor = Some(func);
                        continue;
                    }
                    let fid = self.compile_function(func)?;
                    new_class.bind(decl.name.clone(), Value::Func(fid));
                }
                Some(DeclPlace::StaticMethod) => {
                    let Some(Node::FuncDecl(func)) = decl.init.as_deref() else {
                        continue;
                    };
                    let fid = self.compile_function(func)?;
                    meta.bind(decl.name.clone(), Value::Func(fid));
                }
                _ => {}
            }
        }

        // $init runs on every new instance: field initializers in
        // declaration order, then the user constructor body.
        let mut ib = CodeBuilder::new();
        for (slot, init) in &field_inits {
            self.compile_expr(init, &mut ib)?;
            ib.emit_u8(op::LOADL, 0);
            ib.emit_u8(op::LOADI, *slot);
            ib.emit(op::STOREF);
        }
        if let Some(func) = constructor {
            self.compile_block(&func.body, &mut ib)?;
        }
        ib.emit(op::RET0);
        let init_id = FunctionId::new(self.functions.len());
        self.functions.push(Function::script("$init", 0, ib.build()));
        new_class.bind("$init", Value::Func(init_id));

        self.classes.push(meta);
        self.classes.push(new_class);
        debug_assert_eq!(self.classes.len(), class_id.index() + 1);

        // Store the class into its global slot.
        let idx = self.add_const(b, Value::Class(class_id), class.token)?;
        b.emit_u8(op::LOADK, idx);
        b.emit_u8(op::STOREG, class_slot);

        // Static initializers run once, at the declaration site.
        for (slot, init) in &static_inits {
            self.compile_expr(init, b)?;
            b.emit_u8(op::LOADG, class_slot);
            b.emit_u8(op::LOADI, *slot);
            b.emit(op::STOREF);
        }
        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn add_const(&mut self, b: &mut CodeBuilder, value: Value, token: Token) -> Result<u8, CompileError> {
        b.add_const(value)
            .map_err(|PoolOverflow| CompileError::new("Too many constants in one function", token))
    }

    fn string_const(&mut self, b: &mut CodeBuilder, s: &str, token: Token) -> Result<u8, CompileError> {
        let id = self.interns.intern(s);
        self.add_const(b, Value::Str(id), token)
    }

    fn patch(&mut self, b: &mut CodeBuilder, label: JumpLabel, token: Token) -> Result<(), CompileError> {
        b.patch_jump(label)
            .map_err(|JumpOverflow| CompileError::new("Branch body exceeds the 255-byte jump range", token))
    }

    fn patch_loop(&mut self, b: &mut CodeBuilder, target: usize, token: Token) -> Result<(), CompileError> {
        b.emit_loop(target)
            .map_err(|JumpOverflow| CompileError::new("Loop body exceeds the 255-byte jump range", token))
    }
}

impl crate::ast::PostfixNode {
    /// A token for diagnostics when the chain has no target.
    fn ops_token(&self) -> Token {
        match &self.ops[0] {
            PostfixOp::Call { paren, .. } => *paren,
            PostfixOp::Access { token, .. } => *token,
            PostfixOp::Subscript { bracket, .. } => *bracket,
        }
    }
}

fn binary_opcode(token: Token) -> Result<crate::bytecode::op::Opcode, CompileError> {
    let opcode = match token.kind {
        TokenKind::Add => op::ADD,
        TokenKind::Sub => op::SUB,
        TokenKind::Mul => op::MUL,
        TokenKind::Div => op::DIV,
        TokenKind::Mod => op::MOD,
        TokenKind::AndAnd => op::AND,
        TokenKind::OrOr => op::OR,
        TokenKind::EqEq => op::EQ,
        TokenKind::NotEq => op::NEQ,
        TokenKind::Lt => op::LT,
        TokenKind::Gt => op::GT,
        TokenKind::LtEq => op::LTE,
        TokenKind::GtEq => op::GTE,
        TokenKind::Range => op::NEWRANGE,
        _ => return Err(CompileError::new("Unknown binary operator", token)),
    };
    Ok(opcode)
}
