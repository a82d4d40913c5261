//! Human-readable bytecode and constant-pool dumps.

use std::fmt::Write;

use super::code::{FunctionId, FunctionKind};
use super::op::{self, Opcode};
use crate::program::Program;
use crate::value::Value;

/// Disassembles a function and, recursively, every function constant it
/// references.
pub fn disassemble(program: &Program, fid: FunctionId) -> String {
    let mut out = String::new();
    let mut pending = vec![fid];
    let mut seen = vec![];

    while let Some(fid) = pending.pop() {
        if seen.contains(&fid) {
            continue;
        }
        seen.push(fid);
        disassemble_one(program, fid, &mut out, &mut pending);
    }
    out
}

fn disassemble_one(program: &Program, fid: FunctionId, out: &mut String, pending: &mut Vec<FunctionId>) {
    let function = program.function(fid);
    let FunctionKind::Script(code) = &function.kind else {
        let _ = writeln!(out, "-- {} (native)\n", function.name);
        return;
    };

    let _ = writeln!(
        out,
        "-- {} (upvalues: {}, constants: {}, bytes: {})",
        function.name,
        function.num_upvalues,
        code.constants.len(),
        code.bytecode.len()
    );

    let bytes = &code.bytecode;
    let mut offset = 0;
    while offset < bytes.len() {
        let opcode = Opcode::from(bytes[offset]);
        let _ = write!(out, "{offset:04}  {:<8}", op::name(opcode));

        let operands = op::operand_count(opcode);
        for i in 0..operands {
            if let Some(byte) = bytes.get(offset + 1 + i) {
                let _ = write!(out, " {byte}");
            }
        }

        // Annotate constant loads with the constant itself.
        if opcode == op::LOADK {
            if let Some(&idx) = bytes.get(offset + 1) {
                let value = code.constants.get(idx);
                let _ = write!(out, "    ; {}", const_repr(program, value));
                if let Value::Func(nested) = value {
                    pending.push(nested);
                }
            }
        }

        let _ = writeln!(out);
        offset += 1 + operands;
    }
    let _ = writeln!(out);
}

/// Dumps a function's constant pool, one entry per line.
pub fn dump_constants(program: &Program, fid: FunctionId) -> String {
    let function = program.function(fid);
    let FunctionKind::Script(code) = &function.kind else {
        return format!("-- {} (native)\n", function.name);
    };

    let mut out = String::new();
    let _ = writeln!(out, "-- constant pool of {} ({} entries)", function.name, code.constants.len());
    for (index, value) in code.constants.iter().enumerate() {
        let _ = writeln!(out, "{index:>4}  {}", const_repr(program, *value));
    }
    out
}

fn const_repr(program: &Program, value: Value) -> String {
    match value {
        Value::Null => "null".to_owned(),
        Value::Bool(v) => v.to_string(),
        Value::Int(v) => v.to_string(),
        Value::Float(v) => format!("{v:?}"),
        Value::Str(id) => format!("\"{}\"", program.interns.get(id)),
        Value::HeapStr(_) => "<heap string>".to_owned(),
        Value::Func(fid) => format!("{{func {}}}", program.function(fid).name),
        Value::Closure(_) => "{closure}".to_owned(),
        Value::Class(cid) => format!("{{class {}}}", program.classes[cid.index()].name),
        Value::Instance(_) => "{instance}".to_owned(),
        Value::Array(_) => "{array}".to_owned(),
        Value::Range(_) => "{range}".to_owned(),
    }
}
