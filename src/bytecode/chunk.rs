//! Bytecode chunk containing instructions and constants.

use crate::vm::value::Value;

/// Smallest non-zero capacity of a chunk's code array.
const MIN_CAPACITY: usize = 8;

/// Largest number of constants one chunk can address with a one-byte operand.
pub const MAX_CONSTANTS: usize = u8::MAX as usize + 1;

/// A chunk of bytecode containing instructions and metadata.
#[derive(Debug, Clone, Default)]
pub struct Chunk {
    /// The bytecode instructions.
    pub code: Vec<u8>,
    /// Source line of every byte in `code`.
    pub lines: Vec<usize>,
    /// The constant pool. Indices are stable once handed out.
    pub constants: Vec<Value>,
}

impl Chunk {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one byte with its source line.
    pub fn write(&mut self, byte: u8, line: usize) {
        if self.code.len() == self.code.capacity() {
            let target = grow_capacity(self.code.capacity());
            self.code.reserve_exact(target - self.code.len());
            self.lines.reserve_exact(target - self.lines.len());
        }
        self.code.push(byte);
        self.lines.push(line);
    }

    /// Add a constant to the pool and return its index.
    ///
    /// The caller checks the index against [`MAX_CONSTANTS`].
    pub fn add_constant(&mut self, value: Value) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }

    /// Read a big-endian 16-bit operand at `offset`.
    pub fn read_u16(&self, offset: usize) -> u16 {
        u16::from_be_bytes([self.code[offset], self.code[offset + 1]])
    }

    /// Overwrite the two placeholder bytes at `offset` with `value`.
    pub fn patch_u16(&mut self, offset: usize, value: u16) {
        let [hi, lo] = value.to_be_bytes();
        self.code[offset] = hi;
        self.code[offset + 1] = lo;
    }

    /// Get the line number at a given offset.
    pub fn get_line(&self, offset: usize) -> usize {
        self.lines.get(offset).copied().unwrap_or(0)
    }

    /// Approximate heap footprint of the chunk's arrays, for GC accounting.
    pub fn heap_size(&self) -> usize {
        self.code.capacity()
            + self.lines.capacity() * std::mem::size_of::<usize>()
            + self.constants.capacity() * std::mem::size_of::<Value>()
    }
}

fn grow_capacity(capacity: usize) -> usize {
    if capacity < MIN_CAPACITY {
        MIN_CAPACITY
    } else {
        capacity * 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::instruction::OpCode;

    #[test]
    fn test_capacity_doubles_from_eight() {
        let mut chunk = Chunk::new();
        chunk.write(OpCode::Nil as u8, 1);
        assert_eq!(chunk.code.capacity(), 8);
        for _ in 0..8 {
            chunk.write(OpCode::Pop as u8, 1);
        }
        assert_eq!(chunk.code.capacity(), 16);
        assert_eq!(chunk.code.len(), chunk.lines.len());
    }

    #[test]
    fn test_lines_follow_bytes() {
        let mut chunk = Chunk::new();
        chunk.write(OpCode::Constant as u8, 1);
        chunk.write(0, 1);
        chunk.write(OpCode::Return as u8, 2);
        assert_eq!(chunk.get_line(1), 1);
        assert_eq!(chunk.get_line(2), 2);
        assert_eq!(chunk.get_line(99), 0);
    }

    #[test]
    fn test_constant_indices_are_stable() {
        let mut chunk = Chunk::new();
        assert_eq!(chunk.add_constant(Value::Number(1.0)), 0);
        assert_eq!(chunk.add_constant(Value::Number(1.0)), 1);
        assert_eq!(chunk.add_constant(Value::Nil), 2);
        assert_eq!(chunk.constants[0], Value::Number(1.0));
    }

    #[test]
    fn test_patch_is_big_endian() {
        let mut chunk = Chunk::new();
        chunk.write(OpCode::Jump as u8, 1);
        chunk.write(0xff, 1);
        chunk.write(0xff, 1);
        chunk.patch_u16(1, 0x0102);
        assert_eq!(&chunk.code[1..], &[0x01, 0x02]);
        assert_eq!(chunk.read_u16(1), 0x0102);
    }
}
