//! Human-readable chunk dump, shared by the compiler's `print_code` feature
//! and the VM's `trace_execution` feature.

use crate::chunk::{Chunk, OpCode};

pub fn disassemble_chunk(chunk: &Chunk, name: &str) {
    println!("== {name} ==");
    let mut offset = 0;
    while offset < chunk.code.len() {
        offset = disassemble_instruction(chunk, offset);
    }
}

/// Disassembles the instruction at `offset` and returns the offset of the
/// next one.
pub fn disassemble_instruction(chunk: &Chunk, offset: usize) -> usize {
    print!("{offset:04} ");

    if offset > 0 && chunk.lines[offset] == chunk.lines[offset - 1] {
        print!("   | ");
    } else {
        print!("{:4} ", chunk.lines[offset]);
    }

    let byte = chunk.code[offset];
    match OpCode::try_from(byte) {
        Ok(OpCode::Constant) => constant_instruction("OP_CONSTANT", chunk, offset),
        Ok(OpCode::Nil) => simple_instruction("OP_NIL", offset),
        Ok(OpCode::True) => simple_instruction("OP_TRUE", offset),
        Ok(OpCode::False) => simple_instruction("OP_FALSE", offset),
        Ok(OpCode::Pop) => simple_instruction("OP_POP", offset),
        Ok(OpCode::GetLocal) => byte_instruction("OP_GET_LOCAL", chunk, offset),
        Ok(OpCode::SetLocal) => byte_instruction("OP_SET_LOCAL", chunk, offset),
        Ok(OpCode::GetGlobal) => constant_instruction("OP_GET_GLOBAL", chunk, offset),
        Ok(OpCode::DefineGlobal) => constant_instruction("OP_DEFINE_GLOBAL", chunk, offset),
        Ok(OpCode::SetGlobal) => constant_instruction("OP_SET_GLOBAL", chunk, offset),
        Ok(OpCode::Equal) => simple_instruction("OP_EQUAL", offset),
        Ok(OpCode::Greater) => simple_instruction("OP_GREATER", offset),
        Ok(OpCode::Less) => simple_instruction("OP_LESS", offset),
        Ok(OpCode::Add) => simple_instruction("OP_ADD", offset),
        Ok(OpCode::Subtract) => simple_instruction("OP_SUBTRACT", offset),
        Ok(OpCode::Multiply) => simple_instruction("OP_MULTIPLY", offset),
        Ok(OpCode::Divide) => simple_instruction("OP_DIVIDE", offset),
        Ok(OpCode::Not) => simple_instruction("OP_NOT", offset),
        Ok(OpCode::Negate) => simple_instruction("OP_NEGATE", offset),
        Ok(OpCode::Print) => simple_instruction("OP_PRINT", offset),
        Ok(OpCode::Jump) => jump_instruction("OP_JUMP", 1, chunk, offset),
        Ok(OpCode::JumpIfFalse) => jump_instruction("OP_JUMP_IF_FALSE", 1, chunk, offset),
        Ok(OpCode::Loop) => jump_instruction("OP_LOOP", -1, chunk, offset),
        Ok(OpCode::Return) => simple_instruction("OP_RETURN", offset),
        Err(()) => {
            println!("Unknown opcode {byte}");
            offset + 1
        }
    }
}

fn simple_instruction(name: &str, offset: usize) -> usize {
    println!("{name}");
    offset + 1
}

fn byte_instruction(name: &str, chunk: &Chunk, offset: usize) -> usize {
    let slot = chunk.code[offset + 1];
    println!("{name:<16} {slot:4}");
    offset + 2
}

fn constant_instruction(name: &str, chunk: &Chunk, offset: usize) -> usize {
    let index = chunk.code[offset + 1] as usize;
    println!("{name:<16} {index:4} '{}'", chunk.constants[index]);
    offset + 2
}

fn jump_instruction(name: &str, sign: i32, chunk: &Chunk, offset: usize) -> usize {
    let jump = u16::from_be_bytes([chunk.code[offset + 1], chunk.code[offset + 2]]) as i32;
    let target = offset as i32 + 3 + sign * jump;
    println!("{name:<16} {offset:4} -> {target}");
    offset + 3
}
