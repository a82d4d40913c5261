//! Builder for emitting bytecode during compilation.
//!
//! Handles encoding opcodes and operands into raw bytes and patching
//! forward jumps. Jump offsets are a single unsigned byte relative to the
//! operand's own position; a branch that does not fit is a compile-time
//! error, never a silent truncation.

use super::code::{Code, ConstPool};
use super::op::{self, Opcode};
use crate::value::Value;

/// Error raised when a branch body outgrows the single-byte jump encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JumpOverflow;

/// Error raised when a function accumulates more than 256 constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolOverflow;

#[derive(Debug, Default)]
pub struct CodeBuilder {
    bytecode: Vec<u8>,
    constants: ConstPool,
}

/// Label for a forward jump that needs patching: the offset of the jump's
/// operand byte.
#[derive(Debug, Clone, Copy)]
pub struct JumpLabel(usize);

impl CodeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emits a no-operand instruction.
    pub fn emit(&mut self, op: Opcode) {
        self.bytecode.push(op.into());
    }

    /// Emits an instruction with a single u8 operand.
    pub fn emit_u8(&mut self, op: Opcode, operand: u8) {
        self.bytecode.push(op.into());
        self.bytecode.push(operand);
    }

    /// Emits an instruction with two u8 operands (`NEWUP`).
    pub fn emit_u8_u8(&mut self, op: Opcode, operand1: u8, operand2: u8) {
        self.bytecode.push(op.into());
        self.bytecode.push(operand1);
        self.bytecode.push(operand2);
    }

    /// Emits a forward jump with a placeholder offset to patch later.
    #[must_use]
    pub fn emit_jump(&mut self, op: Opcode) -> JumpLabel {
        self.bytecode.push(op.into());
        let label = JumpLabel(self.bytecode.len());
        self.bytecode.push(0);
        label
    }

    /// Patches a forward jump to land at the current offset.
    ///
    /// The encoded offset is `target - operand_pos`, so at runtime
    /// `ip = operand_pos + offset`.
    pub fn patch_jump(&mut self, label: JumpLabel) -> Result<(), JumpOverflow> {
        let distance = self.bytecode.len() - label.0;
        let offset = u8::try_from(distance).map_err(|_| JumpOverflow)?;
        self.bytecode[label.0] = offset;
        Ok(())
    }

    /// Emits a backward jump to a known target offset.
    pub fn emit_loop(&mut self, target: usize) -> Result<(), JumpOverflow> {
        self.bytecode.push(op::LOOP.into());
        let operand_pos = self.bytecode.len();
        let offset = u8::try_from(operand_pos - target).map_err(|_| JumpOverflow)?;
        self.bytecode.push(offset);
        Ok(())
    }

    /// Current bytecode offset; used to record loop starts.
    #[must_use]
    pub fn current_offset(&self) -> usize {
        self.bytecode.len()
    }

    /// Adds a constant to the pool (deduplicated), returning its index.
    pub fn add_const(&mut self, value: Value) -> Result<u8, PoolOverflow> {
        self.constants.add(value).ok_or(PoolOverflow)
    }

    /// Consumes the builder into a finished code object.
    #[must_use]
    pub fn build(self) -> Code {
        Code {
            bytecode: self.bytecode,
            constants: self.constants,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::value::Value;

    #[test]
    fn emit_basic() {
        let mut builder = CodeBuilder::new();
        builder.emit(op::ADD);
        builder.emit_u8(op::LOADL, 3);

        let code = builder.build();
        assert_eq!(code.bytecode, vec![op::ADD.into(), op::LOADL.into(), 3]);
    }

    #[test]
    fn forward_jump_offsets_from_operand() {
        let mut builder = CodeBuilder::new();
        let jump = builder.emit_jump(op::JIF);
        builder.emit(op::NOP);
        builder.emit(op::NOP);
        builder.patch_jump(jump).unwrap();
        builder.emit(op::RETURN);

        let code = builder.build();
        // Operand at offset 1; target at offset 4; encoded offset 3.
        assert_eq!(
            code.bytecode,
            vec![op::JIF.into(), 3, op::NOP.into(), op::NOP.into(), op::RETURN.into()]
        );
    }

    #[test]
    fn backward_jump_offsets_from_operand() {
        let mut builder = CodeBuilder::new();
        let start = builder.current_offset();
        builder.emit(op::NOP);
        builder.emit_loop(start).unwrap();

        let code = builder.build();
        // Operand at offset 2; target 0; encoded offset 2.
        assert_eq!(code.bytecode, vec![op::NOP.into(), op::LOOP.into(), 2]);
    }

    #[test]
    fn jump_overflow_is_detected() {
        let mut builder = CodeBuilder::new();
        let jump = builder.emit_jump(op::JMP);
        for _ in 0..255 {
            builder.emit(op::NOP);
        }
        assert_eq!(builder.patch_jump(jump), Err(JumpOverflow));
    }

    #[test]
    fn jump_at_exact_limit_is_admissible() {
        let mut builder = CodeBuilder::new();
        let jump = builder.emit_jump(op::JMP);
        for _ in 0..254 {
            builder.emit(op::NOP);
        }
        assert!(builder.patch_jump(jump).is_ok());
        assert_eq!(builder.build().bytecode[1], 255);
    }

    #[test]
    fn constants_are_deduplicated() {
        let mut builder = CodeBuilder::new();
        let a = builder.add_const(Value::Int(300)).unwrap();
        let b = builder.add_const(Value::Int(300)).unwrap();
        let c = builder.add_const(Value::Int(301)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
