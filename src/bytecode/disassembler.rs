//! Bytecode disassembler for debugging.

use crate::bytecode::chunk::Chunk;
use crate::bytecode::instruction::OpCode;
use crate::vm::heap::Heap;
use crate::vm::object::Object;
use crate::vm::value::Value;

/// Disassemble a whole chunk under a `== name ==` header.
pub fn disassemble_chunk(heap: &Heap, chunk: &Chunk, name: &str) -> String {
    let mut output = format!("== {} ==\n", name);
    let mut offset = 0;
    while offset < chunk.code.len() {
        offset = disassemble_instruction(heap, chunk, offset, &mut output);
    }
    output
}

/// Disassemble the instruction at `offset`, returning the next offset.
pub fn disassemble_instruction(heap: &Heap, chunk: &Chunk, offset: usize, output: &mut String) -> usize {
    output.push_str(&format!("{:04} ", offset));

    // Line number, or | if same as previous
    let line = chunk.get_line(offset);
    if offset > 0 && line == chunk.get_line(offset - 1) {
        output.push_str("   | ");
    } else {
        output.push_str(&format!("{:4} ", line));
    }

    let byte = chunk.code[offset];
    let Some(opcode) = OpCode::from_u8(byte) else {
        output.push_str(&format!("Unknown opcode {}\n", byte));
        return offset + 1;
    };
    let name = opcode.name();

    match opcode {
        OpCode::Constant
        | OpCode::GetGlobal
        | OpCode::DefineGlobal
        | OpCode::SetGlobal
        | OpCode::GetProperty
        | OpCode::SetProperty
        | OpCode::GetSuper
        | OpCode::Class
        | OpCode::Method => {
            let index = chunk.code[offset + 1];
            let constant = constant_str(heap, chunk, index);
            output.push_str(&format!("{:<16} {:4} '{}'\n", name, index, constant));
            offset + 2
        }

        OpCode::GetLocal
        | OpCode::SetLocal
        | OpCode::GetUpvalue
        | OpCode::SetUpvalue
        | OpCode::Call
        | OpCode::BuildList => {
            let operand = chunk.code[offset + 1];
            output.push_str(&format!("{:<16} {:4}\n", name, operand));
            offset + 2
        }

        OpCode::Jump | OpCode::JumpIfFalse => {
            let jump = chunk.read_u16(offset + 1) as usize;
            let target = offset + 3 + jump;
            output.push_str(&format!("{:<16} {:4} -> {}\n", name, offset, target));
            offset + 3
        }
        OpCode::Loop => {
            let jump = chunk.read_u16(offset + 1) as usize;
            let target = (offset + 3).saturating_sub(jump);
            output.push_str(&format!("{:<16} {:4} -> {}\n", name, offset, target));
            offset + 3
        }

        OpCode::Invoke | OpCode::SuperInvoke => {
            let index = chunk.code[offset + 1];
            let arg_count = chunk.code[offset + 2];
            let constant = constant_str(heap, chunk, index);
            output.push_str(&format!(
                "{:<16} ({} args) {:4} '{}'\n",
                name, arg_count, index, constant
            ));
            offset + 3
        }

        OpCode::Closure => {
            let index = chunk.code[offset + 1];
            let constant = constant_str(heap, chunk, index);
            output.push_str(&format!("{:<16} {:4} {}\n", name, index, constant));

            let upvalue_count = match chunk.constants.get(index as usize) {
                Some(Value::Obj(function)) => match heap.get(*function) {
                    Object::Function(function) => function.upvalue_count,
                    _ => 0,
                },
                _ => 0,
            };

            let mut next = offset + 2;
            for _ in 0..upvalue_count {
                let is_local = chunk.code[next] != 0;
                let index = chunk.code[next + 1];
                output.push_str(&format!(
                    "{:04}      |                     {} {}\n",
                    next,
                    if is_local { "local" } else { "upvalue" },
                    index
                ));
                next += 2;
            }
            next
        }

        OpCode::Nil
        | OpCode::True
        | OpCode::False
        | OpCode::Pop
        | OpCode::Equal
        | OpCode::Greater
        | OpCode::Less
        | OpCode::Add
        | OpCode::Subtract
        | OpCode::Multiply
        | OpCode::Divide
        | OpCode::BitwiseAnd
        | OpCode::BitwiseOr
        | OpCode::BitwiseXor
        | OpCode::LeftShift
        | OpCode::RightShift
        | OpCode::Not
        | OpCode::Negate
        | OpCode::CloseUpvalue
        | OpCode::Return
        | OpCode::IndexSubscript
        | OpCode::StoreSubscript
        | OpCode::Inherit => {
            output.push_str(name);
            output.push('\n');
            offset + 1
        }
    }
}

fn constant_str(heap: &Heap, chunk: &Chunk, index: u8) -> String {
    match chunk.constants.get(index as usize) {
        Some(value) => heap.display_value(*value),
        None => format!("?{}", index),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::config::VmConfig;
    use crate::vm::vm::Vm;

    fn disassemble_source(source: &str) -> String {
        let mut vm = Vm::with_config(VmConfig::captured());
        let script = compile(&mut vm, source).expect("source compiles");
        let chunk = &vm.heap().as_function(script).chunk;
        disassemble_chunk(vm.heap(), chunk, "<script>")
    }

    #[test]
    fn test_disassemble_simple() {
        let output = disassemble_source("var x = 42;");
        assert!(output.starts_with("== <script> ==\n"));
        assert!(output.contains("OP_CONSTANT"));
        assert!(output.contains("'42'"));
        assert!(output.contains("OP_DEFINE_GLOBAL"));
        assert!(output.contains("'x'"));
    }

    #[test]
    fn test_disassemble_jump_targets() {
        let output = disassemble_source("if (true) nil;");
        assert!(output.contains("OP_JUMP_IF_FALSE"));
        assert!(output.contains("->"));
    }

    #[test]
    fn test_disassemble_closure_captures() {
        let output = disassemble_source("{ var a = 1; fun f() { return a; } }");
        assert!(output.contains("OP_CLOSURE"));
        assert!(output.contains("<fn f>"));
        assert!(output.contains("local 1"));
    }

    #[test]
    fn test_unknown_opcode() {
        let heap = Heap::new(1 << 20, false);
        let mut chunk = Chunk::new();
        chunk.write(250, 1);
        let mut output = String::new();
        let next = disassemble_instruction(&heap, &chunk, 0, &mut output);
        assert_eq!(next, 1);
        assert!(output.contains("Unknown opcode 250"));
    }
}
