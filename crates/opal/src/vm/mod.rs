//! The stack virtual machine.
//!
//! A fetch-decode-execute loop over `(function, ip)` with three explicit
//! stacks: the value stack (locals live in their frame's slots, statement
//! temporaries accumulate above them and are reclaimed on return), the call
//! stack of suspended frames, and a sorted open-upvalue list.
//!
//! Upvalue cells live in a VM-owned arena and hold either a stack slot
//! (open) or an owned value (closed); because they are indices, stack
//! growth never invalidates them. Returning from a frame closes every cell
//! at or above the frame's base.
//!
//! Natives may re-enter the VM through [`Vm::run_closure`]; the nested
//! execution runs until its root frame pops and never beyond.

use thiserror::Error;
use tracing::{debug, trace};

use crate::bytecode::code::{FunctionId, FunctionKind};
use crate::bytecode::op::{self, Opcode};
use crate::class::{lookup_property, ClassId};
use crate::core;
use crate::heap::{Closure, Heap, HeapData, Instance};
use crate::io::PrintWriter;
use crate::program::Program;
use crate::value::Value;

/// Terminal runtime failure; the program stops and the host reports it.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct RuntimeError(String);

impl RuntimeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Index of an upvalue cell in the VM's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpvalueId(u32);

impl UpvalueId {
    fn new(index: usize) -> Self {
        Self(index.try_into().expect("upvalue arena overflow"))
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One upvalue cell: open while its variable is still on the stack, closed
/// (owning the value) once the declaring frame returned.
#[derive(Debug, Clone, Copy)]
pub enum Upvalue {
    Open(usize),
    Closed(Value),
}

/// A suspended caller: where to resume when the active frame returns.
#[derive(Debug, Clone, Copy)]
struct Frame {
    fid: FunctionId,
    ip: usize,
    closure: Option<crate::heap::HeapId>,
    bp: usize,
}

/// Bound on call nesting; exceeding it is a runtime error.
const MAX_FRAMES: usize = 10_000;

/// The number of global slots.
const GLOBALS_SIZE: usize = 256;

pub struct Vm<'a> {
    pub(crate) program: Program,
    pub(crate) heap: Heap,
    pub(crate) print: &'a mut dyn PrintWriter,

    globals: Vec<Value>,
    stack: Vec<Value>,
    frames: Vec<Frame>,
    upvalues: Vec<Upvalue>,
    /// Ids of open cells, sorted by their stack slot.
    open_upvalues: Vec<UpvalueId>,

    // Registers of the active frame.
    fid: FunctionId,
    ip: usize,
    closure: Option<crate::heap::HeapId>,
    bp: usize,
}

impl<'a> Vm<'a> {
    pub fn new(program: Program, print: &'a mut dyn PrintWriter) -> Self {
        let mut globals = vec![Value::Null; GLOBALS_SIZE];
        globals[..program.globals_init.len()].copy_from_slice(&program.globals_init);
        let fid = program.main();
        Self {
            program,
            heap: Heap::new(),
            print,
            globals,
            stack: Vec::with_capacity(64),
            frames: Vec::new(),
            upvalues: Vec::new(),
            open_upvalues: Vec::new(),
            fid,
            ip: 0,
            closure: None,
            bp: 0,
        }
    }

    /// Runs the main function to completion.
    pub fn run(&mut self) -> Result<(), RuntimeError> {
        debug!(function = %self.program.function(self.fid).name, "vm run");
        self.fid = self.program.main();
        self.ip = 0;
        self.bp = 0;
        self.closure = None;

        let result = self.run_until(usize::MAX);
        self.stack.clear();
        result
    }

    // ========================================================================
    // Dispatch loop
    // ========================================================================

    /// Executes until `HALT`, a top-level `return`, or - for nested
    /// executions - until the call stack shrinks back to `stop_depth`.
    fn run_until(&mut self, stop_depth: usize) -> Result<(), RuntimeError> {
        loop {
            let opcode = Opcode::from(self.read_byte());
            trace!(ip = self.ip - 1, op = op::name(opcode), depth = self.stack.len());
            match opcode {
                op::NOP => {}
                op::HALT => return Ok(()),

                op::LOADL => {
                    let slot = self.bp + self.read_byte() as usize;
                    let value = self.stack.get(slot).copied().unwrap_or(Value::Null);
                    self.stack.push(value);
                }
                op::LOADI => {
                    let n = self.read_byte();
                    self.stack.push(Value::Int(i64::from(n)));
                }
                op::LOADK => {
                    let idx = self.read_byte();
                    let value = self.current_constants(idx);
                    self.stack.push(value);
                }
                op::LOADU => {
                    let idx = self.read_byte() as usize;
                    let value = self.upvalue_get(idx)?;
                    self.stack.push(value);
                }
                op::LOADG => {
                    let slot = self.read_byte() as usize;
                    self.stack.push(self.globals[slot]);
                }
                op::LOADF => {
                    let keep = self.read_byte() == 1;
                    let accessor = self.pop()?;
                    let object = self.pop()?;
                    let value = self.load_property(object, accessor)?;
                    self.stack.push(value);
                    if keep {
                        self.stack.push(object);
                    }
                }
                op::LOADA => {
                    let key = self.pop()?;
                    let container = self.pop()?;
                    let value = self.dispatch_accessor("$loadat", &[container, key], || {
                        format!("{} is not subscriptable", container.type_name())
                    })?;
                    self.stack.push(value);
                }

                op::STOREL => {
                    let slot = self.bp + self.read_byte() as usize;
                    let value = self.peek()?;
                    if slot >= self.stack.len() {
                        self.stack.resize(slot + 1, Value::Null);
                    }
                    self.stack[slot] = value;
                }
                op::STOREU => {
                    let idx = self.read_byte() as usize;
                    let value = self.peek()?;
                    self.upvalue_set(idx, value)?;
                }
                op::STOREG => {
                    let slot = self.read_byte() as usize;
                    self.globals[slot] = self.peek()?;
                }
                op::STOREF => {
                    let accessor = self.pop()?;
                    let object = self.pop()?;
                    let value = self.peek()?;
                    self.store_property(object, accessor, value)?;
                }
                op::STOREA => {
                    let key = self.pop()?;
                    let container = self.pop()?;
                    let value = self.peek()?;
                    self.dispatch_accessor("$storeat", &[container, key, value], || {
                        format!("{} is not subscriptable", container.type_name())
                    })?;
                }

                op::CLOSURE => self.make_closure()?,
                op::NEWUP => {
                    return Err(RuntimeError::new("Stray NEWUP outside a CLOSURE sequence"));
                }
                op::CALL => {
                    let nargs = self.read_byte();
                    self.call_value(nargs)?;
                }

                op::JMP => {
                    let offset = self.operand_at_ip() as usize;
                    self.ip += offset;
                }
                op::LOOP => {
                    let offset = self.operand_at_ip() as usize;
                    self.ip -= offset;
                }
                op::JIF => {
                    let offset = self.operand_at_ip() as usize;
                    let cond = self.pop()?;
                    let Value::Bool(cond) = cond else {
                        return Err(RuntimeError::new(format!(
                            "Condition must be a bool, got {}",
                            cond.type_name()
                        )));
                    };
                    if cond {
                        self.ip += 1;
                    } else {
                        self.ip += offset;
                    }
                }

                op::RETURN => {
                    let result = self.pop()?;
                    if self.return_from_frame(result, stop_depth)? {
                        return Ok(());
                    }
                }
                op::RET0 => {
                    if self.return_from_frame(Value::Null, stop_depth)? {
                        return Ok(());
                    }
                }

                op::ADD | op::SUB | op::MUL | op::DIV | op::MOD => self.binary_arith(opcode)?,
                op::AND | op::OR => self.binary_logic(opcode)?,
                op::LT | op::GT | op::LTE | op::GTE => self.binary_compare(opcode)?,
                op::EQ | op::NEQ => self.binary_equality(opcode)?,

                op::NOT => {
                    let value = self.pop()?;
                    let Value::Bool(value) = value else {
                        return Err(RuntimeError::new(format!("Cannot negate a {}", value.type_name())));
                    };
                    self.stack.push(Value::Bool(!value));
                }
                op::NEG => {
                    let value = self.pop()?;
                    let negated = match value {
                        Value::Int(v) => Value::Int(v.wrapping_neg()),
                        Value::Float(v) => Value::Float(-v),
                        other => {
                            return Err(RuntimeError::new(format!("Cannot negate a {}", other.type_name())));
                        }
                    };
                    self.stack.push(negated);
                }

                op::NEWARR => {
                    let count = self.read_byte() as usize;
                    if self.stack.len() < count {
                        return Err(RuntimeError::new("Stack underflow building an array"));
                    }
                    let elements = self.stack.split_off(self.stack.len() - count);
                    let id = self.heap.alloc(HeapData::Array(elements));
                    self.stack.push(Value::Array(id));
                }
                op::NEWRANGE => {
                    let end = self.pop()?;
                    let start = self.pop()?;
                    let (Value::Int(start), Value::Int(end)) = (start, end) else {
                        return Err(RuntimeError::new("Range bounds must be ints"));
                    };
                    let id = self.heap.alloc(HeapData::Range(crate::heap::Range { start, end }));
                    self.stack.push(Value::Range(id));
                }

                other => {
                    return Err(RuntimeError::new(format!("Unknown opcode {}", u8::from(other))));
                }
            }
        }
    }

    /// Finishes the active frame. Returns true when the dispatch loop that
    /// called us should stop (top-level return, or a nested execution's root
    /// frame completed).
    fn return_from_frame(&mut self, result: Value, stop_depth: usize) -> Result<bool, RuntimeError> {
        self.close_upvalues(self.bp);

        if self.frames.is_empty() {
            // A return at the top level ends the program like HALT.
            return Ok(true);
        }

        // The callee slot sits just below the frame base and receives the
        // call's result; everything above it is reclaimed.
        let dest = self.bp - 1;
        self.stack.truncate(dest);
        self.stack.push(result);

        let frame = self.frames.pop().expect("checked non-empty");
        self.fid = frame.fid;
        self.ip = frame.ip;
        self.closure = frame.closure;
        self.bp = frame.bp;

        Ok(self.frames.len() == stop_depth)
    }

    // ========================================================================
    // Fetch helpers
    // ========================================================================

    fn read_byte(&mut self) -> u8 {
        let byte = self.program.function(self.fid).code().bytecode[self.ip];
        self.ip += 1;
        byte
    }

    /// The operand byte the ip currently points at (jump encoding is
    /// relative to this position).
    fn operand_at_ip(&self) -> u8 {
        self.program.function(self.fid).code().bytecode[self.ip]
    }

    fn current_constants(&self, idx: u8) -> Value {
        self.program.function(self.fid).code().constants.get(idx)
    }

    fn pop(&mut self) -> Result<Value, RuntimeError> {
        self.stack.pop().ok_or_else(|| RuntimeError::new("Stack underflow"))
    }

    fn peek(&self) -> Result<Value, RuntimeError> {
        self.stack.last().copied().ok_or_else(|| RuntimeError::new("Stack underflow"))
    }

    // ========================================================================
    // Upvalues
    // ========================================================================

    fn current_closure_upvalue(&self, idx: usize) -> Result<UpvalueId, RuntimeError> {
        let Some(closure) = self.closure else {
            return Err(RuntimeError::new("No upvalues in this frame"));
        };
        let HeapData::Closure(closure) = self.heap.get(closure) else {
            return Err(RuntimeError::new("Corrupt closure reference"));
        };
        closure
            .upvalues
            .get(idx)
            .copied()
            .ok_or_else(|| RuntimeError::new("Upvalue index out of range"))
    }

    fn upvalue_get(&self, idx: usize) -> Result<Value, RuntimeError> {
        let id = self.current_closure_upvalue(idx)?;
        Ok(match self.upvalues[id.index()] {
            Upvalue::Open(slot) => self.stack[slot],
            Upvalue::Closed(value) => value,
        })
    }

    fn upvalue_set(&mut self, idx: usize, value: Value) -> Result<(), RuntimeError> {
        let id = self.current_closure_upvalue(idx)?;
        match self.upvalues[id.index()] {
            Upvalue::Open(slot) => self.stack[slot] = value,
            Upvalue::Closed(_) => self.upvalues[id.index()] = Upvalue::Closed(value),
        }
        Ok(())
    }

    /// Finds the open cell for a stack slot or inserts a new one, keeping
    /// the open list sorted by slot.
    fn capture_upvalue(&mut self, slot: usize) -> UpvalueId {
        let upvalues = &self.upvalues;
        let search = self.open_upvalues.binary_search_by_key(&slot, |id| {
            match upvalues[id.index()] {
                Upvalue::Open(s) => s,
                // Closed cells are never on the open list.
                Upvalue::Closed(_) => usize::MAX,
            }
        });
        match search {
            Ok(pos) => self.open_upvalues[pos],
            Err(pos) => {
                let id = UpvalueId::new(self.upvalues.len());
                self.upvalues.push(Upvalue::Open(slot));
                self.open_upvalues.insert(pos, id);
                id
            }
        }
    }

    /// Seals every open cell at or above `from`: the value is copied out of
    /// the stack and the cell leaves the open list.
    fn close_upvalues(&mut self, from: usize) {
        while let Some(&id) = self.open_upvalues.last() {
            let Upvalue::Open(slot) = self.upvalues[id.index()] else {
                self.open_upvalues.pop();
                continue;
            };
            if slot < from {
                break;
            }
            self.upvalues[id.index()] = Upvalue::Closed(self.stack[slot]);
            self.open_upvalues.pop();
        }
    }

    /// `CLOSURE`: pop a function constant and build a closure, consuming one
    /// `NEWUP is_direct index` per planned upvalue.
    fn make_closure(&mut self) -> Result<(), RuntimeError> {
        let callee = self.pop()?;
        let Value::Func(fid) = callee else {
            return Err(RuntimeError::new("CLOSURE expects a function constant"));
        };
        let count = self.program.function(fid).num_upvalues as usize;

        let mut captured = Vec::with_capacity(count);
        for _ in 0..count {
            let opcode = Opcode::from(self.read_byte());
            if opcode != op::NEWUP {
                return Err(RuntimeError::new("Expected instruction NEWUP"));
            }
            let is_direct = self.read_byte() == 1;
            let index = self.read_byte() as usize;
            if is_direct {
                let id = self.capture_upvalue(self.bp + index);
                captured.push(id);
            } else {
                captured.push(self.current_closure_upvalue(index)?);
            }
        }

        let id = self.heap.alloc(HeapData::Closure(Closure {
            function: fid,
            upvalues: captured,
        }));
        self.stack.push(Value::Closure(id));
        Ok(())
    }

    // ========================================================================
    // Calls
    // ========================================================================

    /// `CALL nargs`: the callee sits below the arguments.
    fn call_value(&mut self, nargs: u8) -> Result<(), RuntimeError> {
        let argc = nargs as usize;
        if self.stack.len() < argc + 1 {
            return Err(RuntimeError::new("Stack underflow in call"));
        }
        let callee_idx = self.stack.len() - argc - 1;
        let callee = self.stack[callee_idx];

        match callee {
            Value::Func(fid) => self.invoke(fid, None, callee_idx),
            Value::Closure(id) => {
                let HeapData::Closure(closure) = self.heap.get(id) else {
                    return Err(RuntimeError::new("Corrupt closure reference"));
                };
                let fid = closure.function;
                self.invoke(fid, Some(id), callee_idx)
            }
            Value::Class(cid) => self.construct(cid, callee_idx),
            other => Err(RuntimeError::new(format!("Cannot call a {} value", other.type_name()))),
        }
    }

    fn invoke(
        &mut self,
        fid: FunctionId,
        closure: Option<crate::heap::HeapId>,
        callee_idx: usize,
    ) -> Result<(), RuntimeError> {
        match &self.program.function(fid).kind {
            FunctionKind::Script(_) => {
                if self.frames.len() >= MAX_FRAMES {
                    return Err(RuntimeError::new("Call stack overflow"));
                }
                self.frames.push(Frame {
                    fid: self.fid,
                    ip: self.ip,
                    closure: self.closure,
                    bp: self.bp,
                });
                self.fid = fid;
                self.ip = 0;
                self.closure = closure;
                self.bp = callee_idx + 1;
                Ok(())
            }
            FunctionKind::Native(native) => {
                let native = *native;
                let args: Vec<Value> = self.stack[callee_idx + 1..].to_vec();
                let result = native(self, &args)?;
                self.stack.truncate(callee_idx);
                self.stack.push(result);
                Ok(())
            }
        }
    }

    /// `CALL` on a class value: `$new` on the metaclass chain wins;
    /// otherwise allocate an instance and run `$init` on it.
    fn construct(&mut self, cid: ClassId, callee_idx: usize) -> Result<(), RuntimeError> {
        let metaclass = self.program.classes[cid.index()].metaclass;
        let ctor = metaclass.and_then(|meta| lookup_property(&self.program.classes, meta, "$new"));

        if let Some(ctor) = ctor {
            let mut args = vec![Value::Class(cid)];
            args.extend_from_slice(&self.stack[callee_idx + 1..]);
            let result = self.run_closure(ctor, &args)?;
            self.stack.truncate(callee_idx);
            self.stack.push(result);
            return Ok(());
        }

        let num_vars = self.program.classes[cid.index()].num_vars as usize;
        let instance = self.heap.alloc(HeapData::Instance(Instance {
            class: cid,
            vars: vec![Value::Null; num_vars],
        }));

        if let Some(init) = lookup_property(&self.program.classes, cid, "$init") {
            let mut args = vec![Value::Instance(instance)];
            args.extend_from_slice(&self.stack[callee_idx + 1..]);
            self.run_closure(init, &args)?;
        }

        self.stack.truncate(callee_idx);
        self.stack.push(Value::Instance(instance));
        Ok(())
    }

    /// Runs a callable to completion inside the current execution and
    /// returns its result. Used by natives (`Array.map`, user `string`
    /// methods) and by the constructor protocol.
    pub fn run_closure(&mut self, callee: Value, args: &[Value]) -> Result<Value, RuntimeError> {
        let base = self.stack.len();
        self.stack.push(callee);
        self.stack.extend_from_slice(args);

        let floor = self.frames.len();
        self.call_value(args.len() as u8)?;
        if self.frames.len() > floor {
            // A script callee: run until its frame pops back off.
            self.run_until(floor)?;
        }

        let result = self.stack.get(base).copied().unwrap_or(Value::Null);
        self.stack.truncate(base);
        Ok(result)
    }

    // ========================================================================
    // Property dispatch
    // ========================================================================

    /// Resolves `object.accessor` for `LOADF`.
    ///
    /// An int accessor is a direct slot (instance fields, or statics when
    /// the receiver is a class). A string accessor resolves against the
    /// receiver's class walking superclasses, falling back to `$loadfield`.
    fn load_property(&mut self, object: Value, accessor: Value) -> Result<Value, RuntimeError> {
        match accessor {
            Value::Int(slot) => self.load_slot(object, slot),
            Value::Str(_) | Value::HeapStr(_) => {
                let name = self
                    .value_str(accessor)
                    .ok_or_else(|| RuntimeError::new("Corrupt property name"))?;
                let cid = self.class_of(object);
                match lookup_property(&self.program.classes, cid, &name) {
                    Some(Value::Int(slot)) => self.load_slot(object, slot),
                    Some(method) => Ok(method),
                    None => self.dispatch_accessor("$loadfield", &[object, accessor], || {
                        format!("Undefined property '{}' on {}", name, object.type_name())
                    }),
                }
            }
            other => Err(RuntimeError::new(format!(
                "Property accessor must be a string or int, got {}",
                other.type_name()
            ))),
        }
    }

    pub(crate) fn load_slot(&self, object: Value, slot: i64) -> Result<Value, RuntimeError> {
        let slot = usize::try_from(slot).map_err(|_| RuntimeError::new("Negative field slot"))?;
        match object {
            Value::Instance(id) => {
                let HeapData::Instance(instance) = self.heap.get(id) else {
                    return Err(RuntimeError::new("Corrupt instance reference"));
                };
                instance
                    .vars
                    .get(slot)
                    .copied()
                    .ok_or_else(|| RuntimeError::new("Field slot out of range"))
            }
            Value::Class(cid) => self.program.classes[cid.index()]
                .static_vars
                .get(slot)
                .copied()
                .ok_or_else(|| RuntimeError::new("Static slot out of range")),
            other => Err(RuntimeError::new(format!(
                "Cannot read a field of a {}",
                other.type_name()
            ))),
        }
    }

    fn store_property(&mut self, object: Value, accessor: Value, value: Value) -> Result<(), RuntimeError> {
        match accessor {
            Value::Int(slot) => self.store_slot(object, slot, value),
            Value::Str(_) | Value::HeapStr(_) => {
                let name = self
                    .value_str(accessor)
                    .ok_or_else(|| RuntimeError::new("Corrupt property name"))?;
                let cid = self.class_of(object);
                match lookup_property(&self.program.classes, cid, &name) {
                    Some(Value::Int(slot)) => self.store_slot(object, slot, value),
                    Some(_) => Err(RuntimeError::new(format!("Cannot assign to method '{name}'"))),
                    None => {
                        self.dispatch_accessor("$storefield", &[object, accessor, value], || {
                            format!("Undefined property '{}' on {}", name, object.type_name())
                        })?;
                        Ok(())
                    }
                }
            }
            other => Err(RuntimeError::new(format!(
                "Property accessor must be a string or int, got {}",
                other.type_name()
            ))),
        }
    }

    pub(crate) fn store_slot(&mut self, object: Value, slot: i64, value: Value) -> Result<(), RuntimeError> {
        let slot = usize::try_from(slot).map_err(|_| RuntimeError::new("Negative field slot"))?;
        match object {
            Value::Instance(id) => {
                let HeapData::Instance(instance) = self.heap.get_mut(id) else {
                    return Err(RuntimeError::new("Corrupt instance reference"));
                };
                match instance.vars.get_mut(slot) {
                    Some(var) => {
                        *var = value;
                        Ok(())
                    }
                    None => Err(RuntimeError::new("Field slot out of range")),
                }
            }
            Value::Class(cid) => {
                match self.program.classes[cid.index()].static_vars.get_mut(slot) {
                    Some(var) => {
                        *var = value;
                        Ok(())
                    }
                    None => Err(RuntimeError::new("Static slot out of range")),
                }
            }
            other => Err(RuntimeError::new(format!(
                "Cannot write a field of a {}",
                other.type_name()
            ))),
        }
    }

    /// Resolves a named accessor (`$loadat`, `$storeat`, `$loadfield`,
    /// `$storefield`) on the first argument's class and invokes it; a miss
    /// is a runtime error with the caller's message.
    fn dispatch_accessor(
        &mut self,
        name: &str,
        args: &[Value],
        missing: impl FnOnce() -> String,
    ) -> Result<Value, RuntimeError> {
        let cid = self.class_of(args[0]);
        match lookup_property(&self.program.classes, cid, name) {
            Some(method @ (Value::Func(_) | Value::Closure(_))) => self.run_closure(method, args),
            _ => Err(RuntimeError::new(missing())),
        }
    }

    // ========================================================================
    // Operators
    // ========================================================================

    fn binary_arith(&mut self, opcode: Opcode) -> Result<(), RuntimeError> {
        let b = self.pop()?;
        let a = self.pop()?;

        // Inline fast path for numeric operands. Modulo has no float form:
        // it falls through to method dispatch so the error below names the
        // real operand types.
        let fast = match (a, b) {
            (Value::Int(x), Value::Int(y)) => Some(self.int_arith(opcode, x, y)?),
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) if opcode == op::MOD => None,
            (Value::Int(x), Value::Float(y)) => Some(self.float_arith(opcode, x as f64, y)?),
            (Value::Float(x), Value::Int(y)) => Some(self.float_arith(opcode, x, y as f64)?),
            (Value::Float(x), Value::Float(y)) => Some(self.float_arith(opcode, x, y)?),
            _ => None,
        };
        if let Some(result) = fast {
            self.stack.push(result);
            return Ok(());
        }

        // Dispatch through the operator method on the left operand's class.
        let name = match opcode {
            op::ADD => "$add",
            op::SUB => "$sub",
            op::MUL => "$mul",
            op::DIV => "$div",
            _ => "$mod",
        };
        let cid = self.class_of(a);
        match lookup_property(&self.program.classes, cid, name) {
            Some(method @ (Value::Func(_) | Value::Closure(_))) => {
                let result = self.run_closure(method, &[a, b])?;
                self.stack.push(result);
                Ok(())
            }
            _ => Err(RuntimeError::new(format!(
                "Unsupported operands for '{}': {} and {}",
                arith_symbol(opcode),
                a.type_name(),
                b.type_name()
            ))),
        }
    }

    fn int_arith(&self, opcode: Opcode, a: i64, b: i64) -> Result<Value, RuntimeError> {
        let result = match opcode {
            op::ADD => a.wrapping_add(b),
            op::SUB => a.wrapping_sub(b),
            op::MUL => a.wrapping_mul(b),
            op::DIV => {
                if b == 0 {
                    return Err(RuntimeError::new("Division by zero"));
                }
                a.wrapping_div(b)
            }
            _ => {
                if b == 0 {
                    return Err(RuntimeError::new("Modulo by zero"));
                }
                a.wrapping_rem(b)
            }
        };
        Ok(Value::Int(result))
    }

    fn float_arith(&self, opcode: Opcode, a: f64, b: f64) -> Result<Value, RuntimeError> {
        let result = match opcode {
            op::ADD => a + b,
            op::SUB => a - b,
            op::MUL => a * b,
            op::DIV => {
                if b == 0.0 {
                    return Err(RuntimeError::new("Division by zero"));
                }
                a / b
            }
            // Modulo skips the float fast path in binary_arith.
            _ => unreachable!("no float fast path for this opcode"),
        };
        Ok(Value::Float(result))
    }

    fn binary_logic(&mut self, opcode: Opcode) -> Result<(), RuntimeError> {
        let b = self.pop()?;
        let a = self.pop()?;
        let (Value::Bool(a), Value::Bool(b)) = (a, b) else {
            return Err(RuntimeError::new(format!(
                "Logical operands must be bools, got {} and {}",
                a.type_name(),
                b.type_name()
            )));
        };
        let result = if opcode == op::AND { a && b } else { a || b };
        self.stack.push(Value::Bool(result));
        Ok(())
    }

    fn binary_compare(&mut self, opcode: Opcode) -> Result<(), RuntimeError> {
        let b = self.pop()?;
        let a = self.pop()?;
        let (x, y) = match (a, b) {
            (Value::Int(x), Value::Int(y)) => {
                let result = match opcode {
                    op::LT => x < y,
                    op::GT => x > y,
                    op::LTE => x <= y,
                    _ => x >= y,
                };
                self.stack.push(Value::Bool(result));
                return Ok(());
            }
            (Value::Int(x), Value::Float(y)) => (x as f64, y),
            (Value::Float(x), Value::Int(y)) => (x, y as f64),
            (Value::Float(x), Value::Float(y)) => (x, y),
            _ => {
                return Err(RuntimeError::new(format!(
                    "Cannot compare {} and {}",
                    a.type_name(),
                    b.type_name()
                )));
            }
        };
        let result = match opcode {
            op::LT => x < y,
            op::GT => x > y,
            op::LTE => x <= y,
            _ => x >= y,
        };
        self.stack.push(Value::Bool(result));
        Ok(())
    }

    fn binary_equality(&mut self, opcode: Opcode) -> Result<(), RuntimeError> {
        let b = self.pop()?;
        let a = self.pop()?;

        let equal = match (a, b) {
            (Value::Int(x), Value::Int(y)) => x == y,
            (Value::Int(x), Value::Float(y)) => (x as f64) == y,
            (Value::Float(x), Value::Int(y)) => x == (y as f64),
            (Value::Float(x), Value::Float(y)) => x == y,
            _ => {
                // $eqeq on the left operand's class; Object supplies
                // identity, String supplies content comparison.
                let cid = self.class_of(a);
                match lookup_property(&self.program.classes, cid, "$eqeq") {
                    Some(method @ (Value::Func(_) | Value::Closure(_))) => {
                        let result = self.run_closure(method, &[a, b])?;
                        match result {
                            Value::Bool(v) => v,
                            other => {
                                return Err(RuntimeError::new(format!(
                                    "$eqeq must return a bool, got {}",
                                    other.type_name()
                                )));
                            }
                        }
                    }
                    _ => {
                        return Err(RuntimeError::new(format!(
                            "Cannot compare {} and {}",
                            a.type_name(),
                            b.type_name()
                        )));
                    }
                }
            }
        };
        let result = if opcode == op::EQ { equal } else { !equal };
        self.stack.push(Value::Bool(result));
        Ok(())
    }

    // ========================================================================
    // Values
    // ========================================================================

    /// The class that defines a value's operations.
    pub fn class_of(&self, value: Value) -> ClassId {
        match value {
            Value::Null => core::CLASS_NULL,
            Value::Bool(_) => core::CLASS_BOOL,
            Value::Int(_) => core::CLASS_INT,
            Value::Float(_) => core::CLASS_FLOAT,
            Value::Str(_) | Value::HeapStr(_) => core::CLASS_STRING,
            Value::Func(_) | Value::Closure(_) => core::CLASS_CLOSURE,
            Value::Array(_) => core::CLASS_ARRAY,
            Value::Range(_) => core::CLASS_RANGE,
            Value::Instance(id) => match self.heap.get(id) {
                HeapData::Instance(instance) => instance.class,
                _ => core::CLASS_INSTANCE,
            },
            Value::Class(cid) => self.program.classes[cid.index()]
                .metaclass
                .unwrap_or(core::CLASS_CLASS),
        }
    }

    /// String contents of a string value (interned or heap), cloned out.
    pub fn value_str(&self, value: Value) -> Option<String> {
        match value {
            Value::Str(id) => Some(self.program.interns.get(id).to_owned()),
            Value::HeapStr(id) => match self.heap.get(id) {
                HeapData::Str(s) => Some(s.clone()),
                _ => None,
            },
            _ => None,
        }
    }

    /// Allocates a runtime string.
    pub fn alloc_str(&mut self, s: String) -> Value {
        Value::HeapStr(self.heap.alloc(HeapData::Str(s)))
    }

    /// Stringifies a value for printing: a `string` method on the value's
    /// class wins (Object supplies the default rendering).
    pub fn stringify(&mut self, value: Value) -> Result<String, RuntimeError> {
        let cid = self.class_of(value);
        if let Some(method @ (Value::Func(_) | Value::Closure(_))) =
            lookup_property(&self.program.classes, cid, "string")
        {
            let result = self.run_closure(method, &[value])?;
            return self
                .value_str(result)
                .ok_or_else(|| RuntimeError::new("string method must return a string"));
        }
        self.default_repr(value)
    }

    /// The built-in rendering of a value.
    pub fn default_repr(&mut self, value: Value) -> Result<String, RuntimeError> {
        Ok(match value {
            Value::Null => "null".to_owned(),
            Value::Bool(v) => v.to_string(),
            Value::Int(v) => v.to_string(),
            Value::Float(v) => format!("{v:.6}"),
            Value::Str(_) | Value::HeapStr(_) => self
                .value_str(value)
                .ok_or_else(|| RuntimeError::new("Corrupt string reference"))?,
            Value::Func(fid) => {
                let function = self.program.function(fid);
                if function.is_native() {
                    "{native func}".to_owned()
                } else {
                    format!("{{func {}}}", function.name)
                }
            }
            Value::Closure(id) => {
                let HeapData::Closure(closure) = self.heap.get(id) else {
                    return Err(RuntimeError::new("Corrupt closure reference"));
                };
                let function = self.program.function(closure.function);
                if function.is_native() {
                    "{native func}".to_owned()
                } else {
                    format!("{{func {}}}", function.name)
                }
            }
            Value::Class(cid) => format!("{{class {}}}", self.program.classes[cid.index()].name),
            Value::Instance(id) => {
                let HeapData::Instance(instance) = self.heap.get(id) else {
                    return Err(RuntimeError::new("Corrupt instance reference"));
                };
                format!("{{instance {}}}", self.program.classes[instance.class.index()].name)
            }
            Value::Array(id) => {
                let HeapData::Array(elements) = self.heap.get(id) else {
                    return Err(RuntimeError::new("Corrupt array reference"));
                };
                let elements = elements.clone();
                let mut parts = Vec::with_capacity(elements.len());
                for element in elements {
                    parts.push(self.stringify(element)?);
                }
                format!("[{}]", parts.join(", "))
            }
            Value::Range(id) => {
                let HeapData::Range(range) = self.heap.get(id) else {
                    return Err(RuntimeError::new("Corrupt range reference"));
                };
                format!("{}..{}", range.start, range.end)
            }
        })
    }

    /// Identity comparison: same tag, same payload. Object's `$eqeq`.
    pub fn identity_eq(&self, a: Value, b: Value) -> bool {
        a.const_eq(&b)
    }
}

fn arith_symbol(opcode: Opcode) -> &'static str {
    match opcode {
        op::ADD => "+",
        op::SUB => "-",
        op::MUL => "*",
        op::DIV => "/",
        _ => "%",
    }
}
