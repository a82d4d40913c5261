//! Semantic resolver: two passes over the AST.
//!
//! Pass one visits only the top-level declarations of the root block and
//! assigns global slots (the core builtins are pre-registered at slots
//! 0..11). Pass two walks every body with a context stack of enclosing
//! function/class/root scopes and decorates each variable reference with a
//! [`Resolution`], plans upvalue captures onto function declarations, and
//! records class member layout.
//!
//! After this module runs, code generation never consults a symbol table.

use crate::ast::{
    Block, ClassDeclNode, ClassMember, DeclPlace, FuncDeclNode, LoopKind, LoopNode, Node, Resolution, UpvalueDesc,
    VarDeclNode, VarRef,
};
use crate::diagnostics::{Diagnostics, Phase};
use crate::symtable::SymbolTable;
use crate::token::Token;
use indexmap::IndexMap;

/// Locals are addressed with a single byte.
const MAX_LOCALS: u16 = 255;
/// The global table has 256 slots.
const MAX_GLOBALS: u16 = 256;
/// Upvalue indices are a single byte.
const MAX_UPVALUES: usize = 255;

struct FuncScope {
    table: SymbolTable,
    upvalues: Vec<UpvalueDesc>,
    is_method: bool,
    is_static: bool,
}

struct ClassScope {
    global_slot: u8,
    members: IndexMap<String, ClassMember>,
}

#[derive(Clone, Copy)]
enum Ctx {
    Root,
    Func(usize),
    Class(usize),
}

pub struct Resolver<'d> {
    diags: &'d mut Diagnostics,
    globals: SymbolTable,
    /// Synthetic loop slots of the main function (root-level `for ... in`).
    root_locals: SymbolTable,
    ctx: Vec<Ctx>,
    funcs: Vec<FuncScope>,
    classes: Vec<ClassScope>,
}

/// Resolves the whole program in place.
///
/// `core_globals` lists the builtin global names in slot order; they are
/// registered before any user declaration so references to them resolve as
/// ordinary globals.
pub fn resolve(ast: &mut Block, core_globals: &[&str], diags: &mut Diagnostics) {
    let mut resolver = Resolver {
        diags,
        globals: SymbolTable::new(),
        root_locals: SymbolTable::new(),
        ctx: Vec::new(),
        funcs: Vec::new(),
        classes: Vec::new(),
    };
    for name in core_globals {
        resolver.globals.add_local(name);
    }

    resolver.pass_globals(ast);
    if resolver.diags.has_errors() {
        return;
    }
    resolver.pass_bodies(ast);
}

impl Resolver<'_> {
    fn error(&mut self, token: Token, message: impl Into<String>) {
        self.diags.error(Phase::Semantic, token, message);
    }

    // ========================================================================
    // Pass 1: global surface
    // ========================================================================

    fn pass_globals(&mut self, root: &mut Block) {
        for stmt in root.stmts.iter_mut().flatten() {
            match stmt {
                Node::VarDecl(decl) => {
                    if let Some(slot) = self.declare_global(decl.token, &decl.name) {
                        decl.place = Some(DeclPlace::Global(slot));
                    }
                }
                Node::ClassDecl(class) => self.declare_global_class(class),
                _ => {}
            }
        }
    }

    fn declare_global(&mut self, token: Token, name: &str) -> Option<u8> {
        if self.globals.lookup(name).is_some() {
            self.error(token, format!("{name} is already defined"));
            return None;
        }
        if self.globals.local_count() >= MAX_GLOBALS {
            self.error(token, "Maximum number of globals reached");
            return None;
        }
        Some(self.globals.add_local(name) as u8)
    }

    fn declare_global_class(&mut self, class: &mut ClassDeclNode) {
        if let Some(slot) = self.declare_global(class.token, &class.name) {
            class.global_slot = Some(slot);
        }

        // Lay out the members in source order.
        for index in 0..class.members.len() {
            let Some(member) = &mut class.members[index] else {
                continue;
            };
            let decl = match member {
                Node::VarDecl(decl) => decl,
                other => {
                    let token = other.token();
                    self.error(token, "Class declarations must be a variable or function");
                    continue;
                }
            };

            if class.member_map.contains_key(&decl.name) {
                let token = decl.token;
                let name = decl.name.clone();
                self.error(token, format!("{name} is already defined in class {}", class.name));
                continue;
            }

            let is_func = matches!(decl.init.as_deref(), Some(Node::FuncDecl(_)));
            let is_constructor = is_func && decl.name == class.name;

            let kind = match (decl.is_static, is_func) {
                (false, false) => {
                    if class.num_instance_vars == u8::MAX {
                        self.error(decl.token, format!("Too many fields in class {}", class.name));
                        continue;
                    }
                    let slot = class.num_instance_vars;
                    class.num_instance_vars += 1;
                    decl.place = Some(DeclPlace::Field(slot));
                    ClassMember::InstanceField(slot)
                }
                (false, true) => {
                    decl.place = Some(DeclPlace::Method);
                    ClassMember::Method
                }
                (true, false) => {
                    if class.num_static_vars == u8::MAX {
                        self.error(decl.token, format!("Too many static variables in class {}", class.name));
                        continue;
                    }
                    let slot = class.num_static_vars;
                    class.num_static_vars += 1;
                    decl.place = Some(DeclPlace::StaticField(slot));
                    ClassMember::StaticField(slot)
                }
                (true, true) => {
                    decl.place = Some(DeclPlace::StaticMethod);
                    ClassMember::StaticMethod
                }
            };

            if is_constructor {
                class.constructor = Some(index);
                // The constructor is reachable only through the class call
                // protocol; references to the class name resolve globally.
                continue;
            }
            class.member_map.insert(decl.name.clone(), kind);
        }
    }

    // ========================================================================
    // Pass 2: bodies
    // ========================================================================

    fn pass_bodies(&mut self, root: &mut Block) {
        self.ctx.push(Ctx::Root);
        for stmt in root.stmts.iter_mut().flatten() {
            self.visit_node(stmt);
        }
        self.ctx.pop();

        if self.root_locals.local_count() > MAX_LOCALS {
            self.diags.error_at(
                Phase::Semantic,
                1,
                0,
                0,
                "Maximum number of loop temporaries reached at the top level",
            );
        }
    }

    fn visit_node(&mut self, node: &mut Node) {
        match node {
            Node::Literal { .. } => {}
            Node::Var(var) => self.visit_var(var),
            Node::Unary { operand, .. } => self.visit_opt(operand),
            Node::Binary { left, right, .. } => {
                self.visit_opt(left);
                self.visit_opt(right);
            }
            Node::Postfix(postfix) => {
                self.visit_opt(&mut postfix.target);
                for op in &mut postfix.ops {
                    match op {
                        crate::ast::PostfixOp::Call { args, .. } => {
                            for arg in args.iter_mut().flatten() {
                                self.visit_node(arg);
                            }
                        }
                        crate::ast::PostfixOp::Subscript { index, .. } => self.visit_opt(index),
                        crate::ast::PostfixOp::Access { .. } => {}
                    }
                }
            }
            Node::List { items, .. } => {
                for item in items.iter_mut().flatten() {
                    self.visit_node(item);
                }
            }
            Node::VarDecl(decl) => self.visit_var_decl(decl),
            Node::FuncDecl(func) => self.visit_func(func, false, false),
            Node::ClassDecl(class) => self.visit_class(class),
            Node::Block(block) => self.visit_block(block),
            Node::If { cond, then, els, .. } => {
                self.visit_opt(cond);
                self.visit_block(then);
                if let Some(els) = els {
                    self.visit_node(els);
                }
            }
            Node::Loop(l) => self.visit_loop(l),
            Node::Return { expr, .. } => self.visit_opt(expr),
        }
    }

    fn visit_opt(&mut self, node: &mut Option<Box<Node>>) {
        if let Some(node) = node {
            self.visit_node(node);
        }
    }

    fn visit_block(&mut self, block: &mut Block) {
        self.enter_scope();
        for stmt in block.stmts.iter_mut().flatten() {
            self.visit_node(stmt);
        }
        self.exit_scope();
    }

    /// The table new declarations and scopes go into: the innermost enclosing
    /// function's, or the global surface at the root.
    fn innermost_func(&self) -> Option<usize> {
        self.ctx.iter().rev().find_map(|ctx| match ctx {
            Ctx::Func(i) => Some(*i),
            _ => None,
        })
    }

    fn enter_scope(&mut self) {
        match self.innermost_func() {
            Some(i) => self.funcs[i].table.enter_scope(),
            None => self.globals.enter_scope(),
        }
    }

    fn exit_scope(&mut self) {
        match self.innermost_func() {
            Some(i) => {
                self.funcs[i].table.exit_scope();
            }
            None => {
                self.globals.exit_scope();
            }
        }
    }

    /// Allocates a synthetic local slot (loop temporaries).
    fn add_synthetic_local(&mut self, name: &str) -> u16 {
        match self.innermost_func() {
            Some(i) => self.funcs[i].table.add_local(name),
            None => self.root_locals.add_local(name),
        }
    }

    fn visit_var_decl(&mut self, decl: &mut VarDeclNode) {
        if decl.is_static {
            self.error(decl.token, "'static' is only allowed inside a class body");
        }

        // The initializer resolves against the surrounding bindings, so a
        // declaration can shadow an outer variable it reads from.
        if let Some(init) = &mut decl.init {
            self.visit_node(init);
        }

        match self.innermost_func() {
            Some(i) => {
                if self.funcs[i].table.lookup_current_scope(&decl.name).is_some() {
                    let token = decl.token;
                    let name = decl.name.clone();
                    self.error(token, format!("Variable {name} is already defined"));
                    return;
                }
                let slot = self.funcs[i].table.add_local(&decl.name);
                decl.place = Some(DeclPlace::Local(slot.min(MAX_LOCALS) as u8));
            }
            None => {
                // Top-level declarations were pre-assigned in pass one;
                // declarations in nested root blocks get their slot here.
                if decl.place.is_none() {
                    if let Some(slot) = self.declare_global(decl.token, &decl.name) {
                        decl.place = Some(DeclPlace::Global(slot));
                    }
                }
            }
        }
    }

    fn visit_func(&mut self, func: &mut FuncDeclNode, is_method: bool, is_static: bool) {
        let mut table = SymbolTable::new();
        if is_method {
            table.add_local("self");
        }
        for param in &func.params {
            if table.lookup_current_scope(&param.name).is_some() {
                let token = param.token;
                let name = param.name.clone();
                self.error(token, format!("Parameter {name} is already defined"));
                continue;
            }
            table.add_local(&param.name);
        }
        func.is_method = is_method;

        let idx = self.funcs.len();
        self.funcs.push(FuncScope {
            table,
            upvalues: Vec::new(),
            is_method,
            is_static,
        });
        self.ctx.push(Ctx::Func(idx));

        // The body shares the outermost scope with the parameters.
        for stmt in func.body.stmts.iter_mut().flatten() {
            self.visit_node(stmt);
        }

        self.ctx.pop();
        let scope = self.funcs.pop().expect("function scope pushed above");

        if scope.table.local_count() > MAX_LOCALS {
            let token = func.token;
            let name = func.name.clone();
            self.error(
                token,
                format!("Maximum number of local variables reached in function {name}"),
            );
        }
        if scope.upvalues.len() > MAX_UPVALUES {
            let token = func.token;
            let name = func.name.clone();
            self.error(token, format!("Maximum number of upvalues reached in function {name}"));
        }
        func.upvalues = scope.upvalues;
    }

    fn visit_class(&mut self, class: &mut ClassDeclNode) {
        let idx = self.classes.len();
        self.classes.push(ClassScope {
            global_slot: class.global_slot.unwrap_or(0),
            members: class.member_map.clone(),
        });
        self.ctx.push(Ctx::Class(idx));

        for member in class.members.iter_mut().flatten() {
            let Node::VarDecl(decl) = member else {
                continue;
            };
            match decl.place {
                Some(DeclPlace::Method) => {
                    if let Some(Node::FuncDecl(func)) = decl.init.as_deref_mut() {
                        self.visit_func(func, true, false);
                    }
                }
                Some(DeclPlace::StaticMethod) => {
                    if let Some(Node::FuncDecl(func)) = decl.init.as_deref_mut() {
                        self.visit_func(func, true, true);
                    }
                }
                Some(DeclPlace::Field(_)) => {
                    // Field initializers run inside the synthesized $init, so
                    // they resolve like method bodies with an implicit self.
                    if let Some(init) = &mut decl.init {
                        let mut table = SymbolTable::new();
                        table.add_local("self");
                        let fi = self.funcs.len();
                        self.funcs.push(FuncScope {
                            table,
                            upvalues: Vec::new(),
                            is_method: true,
                            is_static: false,
                        });
                        self.ctx.push(Ctx::Func(fi));
                        self.visit_node(init);
                        self.ctx.pop();
                        self.funcs.pop();
                    }
                }
                Some(DeclPlace::StaticField(_)) => {
                    // Static initializers run in the enclosing code, with no
                    // instance receiver available.
                    if let Some(init) = &mut decl.init {
                        self.visit_node(init);
                    }
                }
                _ => {}
            }
        }

        self.ctx.pop();
        self.classes.pop();
    }

    fn visit_loop(&mut self, l: &mut LoopNode) {
        match l.kind {
            LoopKind::While => {
                self.visit_opt(&mut l.cond);
                self.visit_block(&mut l.body);
            }
            LoopKind::CFor => {
                self.enter_scope();
                self.visit_opt(&mut l.init);
                self.visit_opt(&mut l.cond);
                self.visit_opt(&mut l.inc);
                self.visit_block(&mut l.body);
                self.exit_scope();
            }
            LoopKind::ForIn => {
                self.enter_scope();
                // The sequence expression cannot see the loop variable.
                self.visit_opt(&mut l.cond);
                self.visit_opt(&mut l.init);

                let seq = self.add_synthetic_local("$seq");
                let idx = self.add_synthetic_local("$idx");
                if seq > MAX_LOCALS || idx > MAX_LOCALS {
                    let token = l.token;
                    self.error(token, "Maximum number of local variables reached");
                } else {
                    l.seq_slot = Some(seq as u8);
                    l.idx_slot = Some(idx as u8);
                }

                self.visit_block(&mut l.body);
                self.exit_scope();
            }
        }
    }

    // ========================================================================
    // Variable references
    // ========================================================================

    fn visit_var(&mut self, var: &mut VarRef) {
        let mut funcs_traversed: u16 = 0;

        for pos in (0..self.ctx.len()).rev() {
            match self.ctx[pos] {
                Ctx::Func(fi) => {
                    funcs_traversed += 1;
                    if let Some(slot) = self.funcs[fi].table.lookup(&var.name) {
                        if funcs_traversed == 1 {
                            var.resolution = Some(Resolution::Local(slot.min(MAX_LOCALS) as u8));
                        } else {
                            let index = self.thread_upvalue(pos, slot, &var.name);
                            var.resolution = Some(Resolution::Upvalue(index));
                        }
                        return;
                    }
                }
                Ctx::Class(ci) => {
                    if let Some(member) = self.classes[ci].members.get(&var.name).copied() {
                        let class_slot = self.classes[ci].global_slot;
                        let resolution = match member {
                            ClassMember::InstanceField(slot) => {
                                if !self.instance_receiver_available(funcs_traversed) {
                                    let token = var.token;
                                    let name = var.name.clone();
                                    self.error(token, format!("Cannot reference instance member {name} here"));
                                    return;
                                }
                                Resolution::Field(slot)
                            }
                            ClassMember::Method => {
                                if !self.instance_receiver_available(funcs_traversed) {
                                    let token = var.token;
                                    let name = var.name.clone();
                                    self.error(token, format!("Cannot reference instance member {name} here"));
                                    return;
                                }
                                Resolution::Method
                            }
                            ClassMember::StaticField(slot) => Resolution::StaticField { class_slot, slot },
                            ClassMember::StaticMethod => Resolution::StaticMethod { class_slot },
                        };
                        var.resolution = Some(resolution);
                        return;
                    }
                }
                Ctx::Root => {
                    if let Some(slot) = self.globals.lookup(&var.name) {
                        var.resolution = Some(Resolution::Global(slot as u8));
                        return;
                    }
                }
            }
        }

        let token = var.token;
        let name = var.name.clone();
        self.error(token, format!("Undeclared identifier {name}"));
    }

    /// Instance members need `self` at local slot 0: only the immediate body
    /// of an instance method (not a nested function, not a static context)
    /// has it.
    fn instance_receiver_available(&self, funcs_traversed: u16) -> bool {
        if funcs_traversed != 1 {
            return false;
        }
        match self.innermost_func() {
            Some(i) => self.funcs[i].is_method && !self.funcs[i].is_static,
            None => false,
        }
    }

    /// Threads an upvalue capture from the owning function down to the
    /// innermost one, returning the innermost descriptor index.
    ///
    /// The function directly inside the owner captures the owner's local
    /// (`is_direct`); every function further in re-captures its enclosing
    /// function's upvalue by index.
    fn thread_upvalue(&mut self, owner_pos: usize, owner_slot: u16, symbol: &str) -> u8 {
        let chain: Vec<usize> = self.ctx[owner_pos + 1..]
            .iter()
            .filter_map(|ctx| match ctx {
                Ctx::Func(i) => Some(*i),
                _ => None,
            })
            .collect();

        let mut index = owner_slot.min(MAX_LOCALS) as u8;
        let mut is_direct = true;
        for fi in chain {
            index = add_upvalue(&mut self.funcs[fi], is_direct, index, symbol);
            is_direct = false;
        }
        index
    }
}

fn add_upvalue(scope: &mut FuncScope, is_direct: bool, index: u8, symbol: &str) -> u8 {
    if let Some(existing) = scope.upvalues.iter().position(|u| u.symbol == symbol) {
        return existing as u8;
    }
    scope.upvalues.push(UpvalueDesc {
        is_direct,
        index,
        symbol: symbol.to_owned(),
    });
    (scope.upvalues.len() - 1).min(MAX_UPVALUES) as u8
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::parse;

    const TEST_GLOBALS: &[&str] = &[
        "println", "print", "Object", "Class", "Bool", "Int", "Float", "Null", "String", "Closure", "Instance",
        "Array",
    ];

    fn resolve_source(source: &str) -> (Block, Diagnostics) {
        let mut diags = Diagnostics::new();
        let tokens = tokenize(source, &mut diags);
        let mut ast = parse(tokens, source, &mut diags);
        assert!(!diags.has_errors(), "parse errors: {}", diags.render(source));
        resolve(&mut ast, TEST_GLOBALS, &mut diags);
        (ast, diags)
    }

    fn resolve_ok(source: &str) -> Block {
        let (ast, diags) = resolve_source(source);
        assert!(!diags.has_errors(), "unexpected errors: {}", diags.render(source));
        ast
    }

    /// Finds the declared function body for a top-level `func NAME`.
    fn func_decl<'a>(ast: &'a Block, name: &str) -> &'a FuncDeclNode {
        ast.stmts
            .iter()
            .flatten()
            .find_map(|node| match node {
                Node::VarDecl(d) if d.name == name => match d.init.as_deref() {
                    Some(Node::FuncDecl(f)) => Some(f),
                    _ => None,
                },
                _ => None,
            })
            .expect("function not found")
    }

    #[test]
    fn globals_start_after_builtins() {
        let ast = resolve_ok("var first = 1; var second = 2;");
        let slots: Vec<_> = ast
            .stmts
            .iter()
            .flatten()
            .filter_map(|node| match node {
                Node::VarDecl(d) => d.place,
                _ => None,
            })
            .collect();
        assert_eq!(slots, vec![DeclPlace::Global(12), DeclPlace::Global(13)]);
    }

    #[test]
    fn builtin_references_resolve_as_globals() {
        let ast = resolve_ok("println(1);");
        let Some(Node::Postfix(postfix)) = ast.stmts[0].as_ref() else {
            panic!("expected call");
        };
        let Some(Node::Var(var)) = postfix.target.as_deref() else {
            panic!("expected var target");
        };
        assert_eq!(var.resolution, Some(Resolution::Global(0)));
    }

    #[test]
    fn params_and_locals_are_dense() {
        let ast = resolve_ok("func f(a, b) { var c = a; }");
        let func = func_decl(&ast, "f");
        let Some(Node::VarDecl(c)) = func.body.stmts[0].as_ref() else {
            panic!("expected decl");
        };
        assert_eq!(c.place, Some(DeclPlace::Local(2)));
        let Some(Node::Var(a)) = c.init.as_deref() else {
            panic!("expected init var");
        };
        assert_eq!(a.resolution, Some(Resolution::Local(0)));
    }

    #[test]
    fn direct_upvalue_capture() {
        let ast = resolve_ok("func make() { var c = 0; func inc() { c = c + 1; return c; } return inc; }");
        let make = func_decl(&ast, "make");
        let Some(Node::VarDecl(inc_decl)) = make.body.stmts[1].as_ref() else {
            panic!("expected inc decl");
        };
        let Some(Node::FuncDecl(inc)) = inc_decl.init.as_deref() else {
            panic!("expected inc function");
        };
        assert_eq!(inc.upvalues.len(), 1);
        assert!(inc.upvalues[0].is_direct);
        assert_eq!(inc.upvalues[0].index, 0);
        assert_eq!(inc.upvalues[0].symbol, "c");
    }

    #[test]
    fn two_level_capture_threads_through_middle() {
        let ast = resolve_ok(
            "func outer() { var x = 7; func middle() { func inner() { return x; } return inner; } return middle; }",
        );
        let outer = func_decl(&ast, "outer");
        let Some(Node::VarDecl(middle_decl)) = outer.body.stmts[1].as_ref() else {
            panic!("expected middle decl");
        };
        let Some(Node::FuncDecl(middle)) = middle_decl.init.as_deref() else {
            panic!("expected middle function");
        };
        // The intervening function re-captures on behalf of the inner one.
        assert_eq!(middle.upvalues.len(), 1);
        assert!(middle.upvalues[0].is_direct);
        assert_eq!(middle.upvalues[0].index, 0);

        let Some(Node::VarDecl(inner_decl)) = middle.body.stmts[0].as_ref() else {
            panic!("expected inner decl");
        };
        let Some(Node::FuncDecl(inner)) = inner_decl.init.as_deref() else {
            panic!("expected inner function");
        };
        assert_eq!(inner.upvalues.len(), 1);
        assert!(!inner.upvalues[0].is_direct);
        assert_eq!(inner.upvalues[0].index, 0);
    }

    #[test]
    fn class_members_are_laid_out_densely() {
        let ast = resolve_ok("class Point { var x; var y; static var count = 0; func norm() { return x; } }");
        let Some(Node::ClassDecl(class)) = ast
            .stmts
            .iter()
            .flatten()
            .find(|node| matches!(node, Node::ClassDecl(_))) else {
            panic!("expected class");
        };
        assert_eq!(class.num_instance_vars, 2);
        assert_eq!(class.num_static_vars, 1);
        assert_eq!(class.member_map.get("x"), Some(&ClassMember::InstanceField(0)));
        assert_eq!(class.member_map.get("y"), Some(&ClassMember::InstanceField(1)));
        assert_eq!(class.member_map.get("count"), Some(&ClassMember::StaticField(0)));
        assert_eq!(class.member_map.get("norm"), Some(&ClassMember::Method));
    }

    #[test]
    fn constructor_is_recorded_not_mapped() {
        let ast = resolve_ok("class A { func A() { } }");
        let Some(Node::ClassDecl(class)) = ast
            .stmts
            .iter()
            .flatten()
            .find(|node| matches!(node, Node::ClassDecl(_))) else {
            panic!("expected class");
        };
        assert_eq!(class.constructor, Some(0));
        assert!(!class.member_map.contains_key("A"));
    }

    #[test]
    fn field_reference_in_method_resolves() {
        let ast = resolve_ok("class P { var x; func get() { return x; } }");
        let Some(Node::ClassDecl(class)) = ast
            .stmts
            .iter()
            .flatten()
            .find(|node| matches!(node, Node::ClassDecl(_))) else {
            panic!("expected class");
        };
        let Some(Node::VarDecl(get_decl)) = class.members[1].as_ref() else {
            panic!("expected method decl");
        };
        let Some(Node::FuncDecl(get)) = get_decl.init.as_deref() else {
            panic!("expected method");
        };
        let Some(Node::Return { expr, .. }) = get.body.stmts[0].as_ref() else {
            panic!("expected return");
        };
        let Some(Node::Var(x)) = expr.as_deref() else {
            panic!("expected var");
        };
        assert_eq!(x.resolution, Some(Resolution::Field(0)));
    }

    #[test]
    fn undeclared_identifier_errors() {
        let (_, diags) = resolve_source("var x = missing;");
        assert!(diags.has_errors());
    }

    #[test]
    fn duplicate_global_errors() {
        let (_, diags) = resolve_source("var a = 1; var a = 2;");
        assert!(diags.has_errors());
    }

    #[test]
    fn duplicate_local_errors() {
        let (_, diags) = resolve_source("func f() { var a = 1; var a = 2; }");
        assert!(diags.has_errors());
    }

    #[test]
    fn static_outside_class_errors() {
        let (_, diags) = resolve_source("static var a = 1;");
        assert!(diags.has_errors());
    }

    #[test]
    fn instance_member_from_static_method_errors() {
        let (_, diags) = resolve_source("class C { var x; static func f() { return x; } }");
        assert!(diags.has_errors());
    }

    #[test]
    fn forin_allocates_synthetic_slots() {
        let ast = resolve_ok("func f(xs) { for x in xs { println(x); } }");
        let func = func_decl(&ast, "f");
        let Some(Node::Loop(l)) = func.body.stmts[0].as_ref() else {
            panic!("expected loop");
        };
        // Param xs = 0, loop var x declared before the temporaries.
        assert_eq!(l.seq_slot, Some(2));
        assert_eq!(l.idx_slot, Some(3));
    }
}
