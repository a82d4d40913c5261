#![doc = include_str!("../README.md")]
mod ast;
mod bytecode;
mod class;
mod core;
mod diagnostics;
mod heap;
mod intern;
mod io;
mod lexer;
mod parser;
mod program;
mod resolver;
mod symtable;
mod token;
mod value;
mod vm;

use thiserror::Error;

pub use crate::io::{CollectStringPrint, NoPrint, PrintWriter, StdPrint};
pub use crate::program::Program;
pub use crate::vm::{RuntimeError, Vm};

/// All diagnostics of a failed compilation, already rendered.
#[derive(Debug, Clone, Error)]
#[error("{rendered}")]
pub struct CompileErrors {
    pub count: usize,
    rendered: String,
}

impl CompileErrors {
    fn from_diags(diags: &diagnostics::Diagnostics, source: &str) -> Self {
        Self {
            count: diags.error_count(),
            rendered: diags.render(source),
        }
    }
}

/// Compiles source text into a runnable [`Program`].
///
/// The pipeline short-circuits after the first phase that records errors:
/// lexing, parsing, resolution, code generation.
pub fn compile(source: &str) -> Result<Program, CompileErrors> {
    let mut diags = diagnostics::Diagnostics::new();

    let tokens = lexer::tokenize(source, &mut diags);
    if diags.has_errors() {
        return Err(CompileErrors::from_diags(&diags, source));
    }

    let mut ast = parser::parse(tokens, source, &mut diags);
    if diags.has_errors() {
        return Err(CompileErrors::from_diags(&diags, source));
    }

    resolver::resolve(&mut ast, &core::GLOBAL_NAMES, &mut diags);
    if diags.has_errors() {
        return Err(CompileErrors::from_diags(&diags, source));
    }

    bytecode::compiler::compile_program(&ast, core::CoreRegistry::new()).map_err(|err| {
        diags.error(diagnostics::Phase::Codegen, err.token, err.message);
        CompileErrors::from_diags(&diags, source)
    })
}

/// Parses source text and renders the syntax tree (`--show-ast`).
pub fn ast_dump(source: &str) -> Result<String, CompileErrors> {
    let mut diags = diagnostics::Diagnostics::new();
    let tokens = lexer::tokenize(source, &mut diags);
    if diags.has_errors() {
        return Err(CompileErrors::from_diags(&diags, source));
    }
    let ast = parser::parse(tokens, source, &mut diags);
    if diags.has_errors() {
        return Err(CompileErrors::from_diags(&diags, source));
    }
    Ok(ast::dump(&ast))
}
