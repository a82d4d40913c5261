//! Opcode definitions for the bytecode VM.
//!
//! Bytecode is stored as raw `Vec<u8>`. Opcodes are defined as constants
//! with no data - operands are fetched separately from the byte stream.
//!
//! # Operand Encoding
//!
//! - 0 bytes: arithmetic/comparison ops, `RETURN`, `HALT`
//! - 1 byte: slot/index operands (`LOADL`, `LOADK`, ...), jump offsets
//!   (`JMP`, `LOOP`, `JIF`; unsigned, relative to the operand's own offset),
//!   call arity (`CALL`), array length (`NEWARR`), keep flag (`LOADF`)
//! - 2 bytes: `NEWUP is_direct index`, consumed only by the `CLOSURE`
//!   handler (one per captured upvalue)

/// Simple wrapper for a u8 used to make types clear when using opcodes.
///
/// Should be completely transparent and removed at compile time.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Opcode(u8);

impl From<u8> for Opcode {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl From<Opcode> for u8 {
    fn from(value: Opcode) -> Self {
        value.0
    }
}

// === Returns ===
/// Return with no value; the call slot receives null.
pub const RET0: Opcode = Opcode(0);
/// No operation.
pub const NOP: Opcode = Opcode(1);

// === Loads ===
/// Push local slot. Operand: u8 slot.
pub const LOADL: Opcode = Opcode(2);
/// Push inline integer. Operand: u8 value (0..=255).
pub const LOADI: Opcode = Opcode(3);
/// Push constant. Operand: u8 pool index.
pub const LOADK: Opcode = Opcode(4);
/// Push upvalue value. Operand: u8 upvalue index.
pub const LOADU: Opcode = Opcode(5);
/// Pop accessor then object; push the property value. Operand: u8 keep -
/// when 1, re-push the object above the value (method-call receiver).
pub const LOADF: Opcode = Opcode(6);
/// Push global. Operand: u8 slot.
pub const LOADG: Opcode = Opcode(7);
/// Pop key then container; push the element ($loadat dispatch).
pub const LOADA: Opcode = Opcode(8);

// === Stores (all leave the assigned value on the stack) ===
/// Store top of stack to a local slot. Operand: u8 slot.
pub const STOREL: Opcode = Opcode(9);
/// Store top of stack through an upvalue. Operand: u8 upvalue index.
pub const STOREU: Opcode = Opcode(10);
/// Pop accessor then object, store the value below them.
pub const STOREF: Opcode = Opcode(11);
/// Store top of stack to a global. Operand: u8 slot.
pub const STOREG: Opcode = Opcode(12);
/// Pop key then container, store the value below them ($storeat dispatch).
pub const STOREA: Opcode = Opcode(13);

// === Closures & calls ===
/// Upvalue-capture pseudo-instruction. Operands: u8 is_direct, u8 index.
pub const NEWUP: Opcode = Opcode(14);
/// Pop a function constant, build a closure consuming one NEWUP per upvalue.
pub const CLOSURE: Opcode = Opcode(15);
/// Call the value at stacktop - nargs - 1. Operand: u8 nargs.
pub const CALL: Opcode = Opcode(16);

// === Control flow ===
/// Unconditional forward jump. Operand: u8 offset from the operand byte.
pub const JMP: Opcode = Opcode(17);
/// Backward jump. Operand: u8 offset back from the operand byte.
pub const LOOP: Opcode = Opcode(18);
/// Pop a bool; jump forward when false. Operand: u8 offset.
pub const JIF: Opcode = Opcode(19);
/// Return the top of stack from the current function.
pub const RETURN: Opcode = Opcode(20);

// === Arithmetic (numeric fast path, $op method fallback) ===
pub const ADD: Opcode = Opcode(21);
pub const SUB: Opcode = Opcode(22);
pub const MUL: Opcode = Opcode(23);
pub const DIV: Opcode = Opcode(24);
pub const MOD: Opcode = Opcode(25);

// === Logic & comparison ===
pub const AND: Opcode = Opcode(26);
pub const OR: Opcode = Opcode(27);
pub const NOT: Opcode = Opcode(28);
pub const NEG: Opcode = Opcode(29);
pub const LT: Opcode = Opcode(30);
pub const GT: Opcode = Opcode(31);
pub const LTE: Opcode = Opcode(32);
pub const GTE: Opcode = Opcode(33);
pub const EQ: Opcode = Opcode(34);
pub const NEQ: Opcode = Opcode(35);

// === Aggregates ===
/// Pop n values, push a new array. Operand: u8 count.
pub const NEWARR: Opcode = Opcode(36);
/// Pop end then start (both ints), push a new range.
pub const NEWRANGE: Opcode = Opcode(37);

/// Terminate execution (main function only).
pub const HALT: Opcode = Opcode(38);

/// Mnemonic for the disassembler.
pub fn name(op: Opcode) -> &'static str {
    match op {
        RET0 => "ret0",
        NOP => "nop",
        LOADL => "loadl",
        LOADI => "loadi",
        LOADK => "loadk",
        LOADU => "loadu",
        LOADF => "loadf",
        LOADG => "loadg",
        LOADA => "loada",
        STOREL => "storel",
        STOREU => "storeu",
        STOREF => "storef",
        STOREG => "storeg",
        STOREA => "storea",
        NEWUP => "newup",
        CLOSURE => "closure",
        CALL => "call",
        JMP => "jmp",
        LOOP => "loop",
        JIF => "jif",
        RETURN => "return",
        ADD => "add",
        SUB => "sub",
        MUL => "mul",
        DIV => "div",
        MOD => "mod",
        AND => "and",
        OR => "or",
        NOT => "not",
        NEG => "neg",
        LT => "lt",
        GT => "gt",
        LTE => "lte",
        GTE => "gte",
        EQ => "eq",
        NEQ => "neq",
        NEWARR => "newarr",
        NEWRANGE => "newrange",
        HALT => "halt",
        _ => "??",
    }
}

/// Number of operand bytes following the opcode.
pub fn operand_count(op: Opcode) -> usize {
    match op {
        LOADL | LOADI | LOADK | LOADU | LOADF | LOADG | STOREL | STOREU | STOREG | CALL | JMP | LOOP | JIF
        | NEWARR => 1,
        NEWUP => 2,
        _ => 0,
    }
}
