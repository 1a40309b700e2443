//! Human-readable listings of assembly bytecode.

use crate::chunk::{Assembly, NO_LABEL};
use crate::opcode::Opcode;
use crate::value::Value;
use std::fmt::Write as _;

/// Renders the whole chunk, one instruction per line.
pub fn disassemble(asm: &Assembly, name: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "== {name} ==");
    let mut offset = 0;
    while offset < asm.bytecode().len() {
        offset = disassemble_instruction(asm, offset, &mut out);
    }
    out
}

/// Renders one instruction; returns the offset of the next.
pub fn disassemble_instruction(asm: &Assembly, offset: usize, out: &mut String) -> usize {
    let code = asm.bytecode();
    let lines = asm.line_info();
    let _ = write!(out, "{offset:04} ");
    if offset > 0 && offset < lines.len() && lines[offset] == lines[offset - 1] {
        let _ = write!(out, "   | ");
    } else {
        let line = lines.get(offset).copied().unwrap_or(0);
        let _ = write!(out, "{line:4} ");
    }

    let byte = code[offset];
    let Ok(op) = Opcode::try_from(byte) else {
        let _ = writeln!(out, "Unknown opcode {byte}");
        return offset + 1;
    };

    match op {
        Opcode::Constant => constant_instruction(asm, op, offset, out),
        Opcode::String
        | Opcode::Class
        | Opcode::Struct
        | Opcode::Enum
        | Opcode::Method
        | Opcode::StaticMethod
        | Opcode::MatchEnumCase
        | Opcode::Super => string_instruction(asm, op, offset, out),
        Opcode::GetGlobal
        | Opcode::SetGlobal
        | Opcode::DefineGlobal
        | Opcode::GetProperty
        | Opcode::SetProperty
        | Opcode::OptionalChain => string_instruction(asm, op, offset, out),
        Opcode::GetLocal
        | Opcode::SetLocal
        | Opcode::GetUpvalue
        | Opcode::SetUpvalue
        | Opcode::Function
        | Opcode::Call
        | Opcode::Array
        | Opcode::Dict
        | Opcode::GetAssociated
        | Opcode::Protocol => short_instruction(asm, op, offset, out),
        Opcode::Jump | Opcode::JumpIfFalse | Opcode::JumpIfNil => {
            jump_instruction(asm, op, 1, offset, out)
        }
        Opcode::Loop => jump_instruction(asm, op, -1, offset, out),
        Opcode::Closure => closure_instruction(asm, offset, out),
        Opcode::CallNamed => {
            let argc = read_short(code, offset + 1);
            let _ = writeln!(out, "{:<20} {argc}", op.name());
            offset + 3 + argc as usize * 4
        }
        Opcode::StructMethod => {
            let idx = read_short(code, offset + 1);
            let mutating = code[offset + 3] != 0;
            let _ = writeln!(
                out,
                "{:<20} {idx:4} '{}' ({})",
                op.name(),
                string_at(asm, idx),
                if mutating { "mutating" } else { "non-mutating" }
            );
            offset + 4
        }
        Opcode::DefineProperty => {
            let idx = read_short(code, offset + 1);
            let flags = code[offset + 3];
            let _ = writeln!(
                out,
                "{:<20} {idx:4} '{}' (flags 0x{flags:02x})",
                op.name(),
                string_at(asm, idx)
            );
            offset + 4
        }
        Opcode::ComputedProperty => {
            let idx = read_short(code, offset + 1);
            let has_setter = code[offset + 3] != 0;
            let _ = writeln!(
                out,
                "{:<20} {idx:4} '{}' ({})",
                op.name(),
                string_at(asm, idx),
                if has_setter { "get/set" } else { "get" }
            );
            offset + 4
        }
        Opcode::EnumCase => {
            let idx = read_short(code, offset + 1);
            let assoc = code[offset + 3] as usize;
            let _ = writeln!(
                out,
                "{:<20} {idx:4} '{}' (assoc {assoc})",
                op.name(),
                string_at(asm, idx)
            );
            offset + 4 + assoc * 2
        }
        Opcode::Tuple => {
            let count = read_short(code, offset + 1) as usize;
            let mut labels = Vec::new();
            for i in 0..count {
                let l = read_short(code, offset + 3 + i * 2);
                labels.push(if l == NO_LABEL {
                    "_".to_string()
                } else {
                    string_at(asm, l)
                });
            }
            let _ = writeln!(out, "{:<20} {count} ({})", op.name(), labels.join(", "));
            offset + 3 + count * 2
        }
        _ => {
            let _ = writeln!(out, "{}", op.name());
            offset + 1
        }
    }
}

fn read_short(code: &[u8], offset: usize) -> u16 {
    ((code[offset] as u16) << 8) | code[offset + 1] as u16
}

fn string_at(asm: &Assembly, idx: u16) -> String {
    asm.strings
        .get(idx as usize)
        .cloned()
        .unwrap_or_else(|| format!("<bad string {idx}>"))
}

fn constant_instruction(asm: &Assembly, op: Opcode, offset: usize, out: &mut String) -> usize {
    let idx = read_short(asm.bytecode(), offset + 1);
    let repr = match asm.constant_pool().get(idx as usize) {
        Some(Value::Int(i)) => i.to_string(),
        Some(Value::Float(f)) => f.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Null) => "nil".to_string(),
        Some(Value::Undefined) => "undefined".to_string(),
        Some(Value::Obj(_)) => "<object>".to_string(),
        None => format!("<bad constant {idx}>"),
    };
    let _ = writeln!(out, "{:<20} {idx:4} '{repr}'", op.name());
    offset + 3
}

fn string_instruction(asm: &Assembly, op: Opcode, offset: usize, out: &mut String) -> usize {
    let idx = read_short(asm.bytecode(), offset + 1);
    let _ = writeln!(out, "{:<20} {idx:4} '{}'", op.name(), string_at(asm, idx));
    offset + 3
}

fn short_instruction(asm: &Assembly, op: Opcode, offset: usize, out: &mut String) -> usize {
    let value = read_short(asm.bytecode(), offset + 1);
    let _ = writeln!(out, "{:<20} {value}", op.name());
    offset + 3
}

fn jump_instruction(asm: &Assembly, op: Opcode, sign: i64, offset: usize, out: &mut String) -> usize {
    let jump = read_short(asm.bytecode(), offset + 1) as i64;
    let target = offset as i64 + 3 + sign * jump;
    let _ = writeln!(out, "{:<20} {offset:4} -> {target}", op.name());
    offset + 3
}

fn closure_instruction(asm: &Assembly, offset: usize, out: &mut String) -> usize {
    let code = asm.bytecode();
    let idx = read_short(code, offset + 1);
    let proto = asm.functions.get(idx as usize);
    let upvalue_count = proto.map(|p| p.upvalues.len()).unwrap_or(0);
    let name = proto.map(|p| p.name.as_str()).unwrap_or("<bad function>");
    let _ = writeln!(
        out,
        "{:<20} {idx:4} '{name}' ({upvalue_count} upvalues)",
        Opcode::Closure.name()
    );
    offset + 3 + upvalue_count * 2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_simple_instructions_with_lines() {
        let mut asm = Assembly::new();
        asm.write_op(Opcode::Constant, 1);
        asm.write_short(0, 1);
        asm.write_op(Opcode::Print, 1);
        asm.write_op(Opcode::Halt, 2);
        asm.add_constant(Value::Int(7));
        let text = disassemble(&asm, "script");
        assert!(text.contains("== script =="));
        assert!(text.contains("OP_CONSTANT"));
        assert!(text.contains("'7'"));
        assert!(text.contains("OP_HALT"));
    }

    #[test]
    fn jump_targets_are_resolved() {
        let mut asm = Assembly::new();
        let jump = asm.emit_jump(Opcode::JumpIfFalse, 1);
        asm.write_op(Opcode::Nil, 1);
        asm.patch_jump(jump).unwrap();
        let text = disassemble(&asm, "jumps");
        assert!(text.contains("OP_JUMP_IF_FALSE"));
        assert!(text.contains("-> 4"));
    }
}
