//! The compiled program artifact.
//!
//! Everything the VM needs to run: the function table (natives and compiled
//! script functions, `$main` last), the class table (builtins followed by
//! user classes), interned strings, and the initial global table.

use crate::bytecode::code::{Function, FunctionId};
use crate::bytecode::disasm;
use crate::class::Class;
use crate::intern::Interns;
use crate::value::Value;

#[derive(Debug)]
pub struct Program {
    pub(crate) functions: Vec<Function>,
    pub(crate) classes: Vec<Class>,
    pub(crate) interns: Interns,
    /// Values of the pre-populated global slots (the core builtins).
    pub(crate) globals_init: Vec<Value>,
    pub(crate) main: FunctionId,
}

impl Program {
    pub fn main(&self) -> FunctionId {
        self.main
    }

    pub fn function(&self, id: FunctionId) -> &Function {
        &self.functions[id.index()]
    }

    /// Disassembles the main function and, recursively, every function
    /// constant reachable from it.
    pub fn disassemble(&self) -> String {
        disasm::disassemble(self, self.main)
    }

    /// Dumps the main function's constant pool.
    pub fn dump_constants(&self) -> String {
        disasm::dump_constants(self, self.main)
    }
}
