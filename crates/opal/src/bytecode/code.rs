//! Compiled function objects: bytecode, constant pools, native callables.

use crate::value::Value;
use crate::vm::{RuntimeError, Vm};

/// Unique identifier for a function in the program's function table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(u32);

impl FunctionId {
    pub fn new(index: usize) -> Self {
        Self(index.try_into().expect("function table overflow"))
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Host callable backing a native function.
///
/// Arguments are copied out of the value stack before the call; the return
/// value replaces the callee slot. Natives may re-enter the VM through
/// [`Vm::run_closure`].
pub type NativeFn = for<'a, 'b> fn(&'b mut Vm<'a>, &[Value]) -> Result<Value, RuntimeError>;

/// Raw bytecode plus the constant pool it indexes.
#[derive(Debug, Clone, Default)]
pub struct Code {
    pub bytecode: Vec<u8>,
    pub constants: ConstPool,
}

/// A compiled or native function.
#[derive(Debug, Clone)]
pub struct Function {
    /// Used by the disassembler, `Closure.name` and error messages.
    pub name: String,
    pub num_upvalues: u8,
    pub kind: FunctionKind,
}

#[derive(Debug, Clone)]
pub enum FunctionKind {
    Script(Code),
    Native(NativeFn),
}

impl Function {
    pub fn script(name: impl Into<String>, num_upvalues: u8, code: Code) -> Self {
        Self {
            name: name.into(),
            num_upvalues,
            kind: FunctionKind::Script(code),
        }
    }

    pub fn native(name: impl Into<String>, func: NativeFn) -> Self {
        Self {
            name: name.into(),
            num_upvalues: 0,
            kind: FunctionKind::Native(func),
        }
    }

    /// The code of a script function.
    ///
    /// # Panics
    ///
    /// Panics on native functions; the VM never fetches bytecode from one.
    pub fn code(&self) -> &Code {
        match &self.kind {
            FunctionKind::Script(code) => code,
            FunctionKind::Native(_) => panic!("native function has no bytecode"),
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self.kind, FunctionKind::Native(_))
    }
}

/// Per-function constant pool.
///
/// Insertion deduplicates by tag and payload, so equal literals share an
/// index; this is the compiler's only automatic optimization.
#[derive(Debug, Clone, Default)]
pub struct ConstPool {
    values: Vec<Value>,
}

/// The pool index is a single bytecode operand.
pub const MAX_CONSTANTS: usize = 256;

impl ConstPool {
    /// Adds a constant, reusing the index of an equal existing entry.
    ///
    /// Returns `None` when the pool is full.
    pub fn add(&mut self, value: Value) -> Option<u8> {
        if let Some(existing) = self.values.iter().position(|v| v.const_eq(&value)) {
            return Some(existing as u8);
        }
        if self.values.len() >= MAX_CONSTANTS {
            return None;
        }
        let index = self.values.len() as u8;
        self.values.push(value);
        Some(index)
    }

    #[inline]
    pub fn get(&self, index: u8) -> Value {
        self.values[index as usize]
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.values.iter()
    }
}
