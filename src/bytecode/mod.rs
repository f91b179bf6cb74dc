//! Bytecode representation for the Roto VM.
//!
//! # Architecture
//!
//! - `instruction`: OpCode definitions for the bytecode instruction set
//! - `chunk`: Bytecode chunks holding code, line numbers and constants
//! - `disassembler`: Debug output for bytecode inspection

pub mod chunk;
pub mod disassembler;
pub mod instruction;

pub use chunk::Chunk;
pub use disassembler::{disassemble_chunk, disassemble_instruction};
pub use instruction::OpCode;
