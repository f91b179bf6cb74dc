//! Bytecode instruction definitions for the Roto VM.

/// Opcodes for the bytecode virtual machine.
///
/// Operands follow the opcode byte directly. Jump offsets are two bytes,
/// big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    // ============ Constants & Stack ============
    /// Push a constant: CONSTANT <index:u8>
    Constant = 0,
    /// Push nil
    Nil,
    /// Push true
    True,
    /// Push false
    False,
    /// Discard the top value
    Pop,

    // ============ Variables ============
    /// Push a local slot: GET_LOCAL <slot:u8>
    GetLocal,
    /// Store into a local slot, leaving the value: SET_LOCAL <slot:u8>
    SetLocal,
    /// Push a global: GET_GLOBAL <name:u8>
    GetGlobal,
    /// Pop into a new or existing global: DEFINE_GLOBAL <name:u8>
    DefineGlobal,
    /// Assign an existing global: SET_GLOBAL <name:u8>
    SetGlobal,
    /// Push a captured variable: GET_UPVALUE <index:u8>
    GetUpvalue,
    /// Assign a captured variable: SET_UPVALUE <index:u8>
    SetUpvalue,

    // ============ Properties ============
    /// Read a field or bind a method: GET_PROPERTY <name:u8>
    GetProperty,
    /// Write a field: SET_PROPERTY <name:u8>
    SetProperty,
    /// Bind a superclass method to `this`: GET_SUPER <name:u8>
    GetSuper,

    // ============ Comparison ============
    /// a == b
    Equal,
    /// a > b
    Greater,
    /// a < b
    Less,

    // ============ Arithmetic ============
    /// Numbers are added, strings concatenated
    Add,
    /// a - b
    Subtract,
    /// a * b
    Multiply,
    /// a / b
    Divide,
    /// a & b on 32-bit integers
    BitwiseAnd,
    /// a | b on 32-bit integers
    BitwiseOr,
    /// a ^ b on 32-bit integers
    BitwiseXor,
    /// a << b on 32-bit integers
    LeftShift,
    /// a >> b on 32-bit integers
    RightShift,
    /// Logical not of truthiness
    Not,
    /// -a
    Negate,

    // ============ Control Flow ============
    /// Unconditional forward jump: JUMP <offset:u16>
    Jump,
    /// Jump forward if the top value is falsey, without popping: JUMP_IF_FALSE <offset:u16>
    JumpIfFalse,
    /// Unconditional backward jump: LOOP <offset:u16>
    Loop,

    // ============ Calls ============
    /// Call the value below the arguments: CALL <argc:u8>
    Call,
    /// Call a method by name: INVOKE <name:u8> <argc:u8>
    Invoke,
    /// Call a superclass method: SUPER_INVOKE <name:u8> <argc:u8>
    SuperInvoke,
    /// Create a closure: CLOSURE <function:u8> then (is_local:u8, index:u8) per upvalue
    Closure,
    /// Close the upvalue for the top slot and pop it
    CloseUpvalue,
    /// Return from the current function
    Return,

    // ============ Lists ============
    /// Collect the top n values into a list: BUILD_LIST <count:u8>
    BuildList,
    /// list[index]
    IndexSubscript,
    /// list[index] = item, leaving item
    StoreSubscript,

    // ============ Classes ============
    /// Create a class: CLASS <name:u8>
    Class,
    /// Copy the superclass's methods into the subclass
    Inherit,
    /// Bind the closure on top to the class below it: METHOD <name:u8>
    Method,
}

impl OpCode {
    const ALL: [OpCode; 44] = [
        OpCode::Constant,
        OpCode::Nil,
        OpCode::True,
        OpCode::False,
        OpCode::Pop,
        OpCode::GetLocal,
        OpCode::SetLocal,
        OpCode::GetGlobal,
        OpCode::DefineGlobal,
        OpCode::SetGlobal,
        OpCode::GetUpvalue,
        OpCode::SetUpvalue,
        OpCode::GetProperty,
        OpCode::SetProperty,
        OpCode::GetSuper,
        OpCode::Equal,
        OpCode::Greater,
        OpCode::Less,
        OpCode::Add,
        OpCode::Subtract,
        OpCode::Multiply,
        OpCode::Divide,
        OpCode::BitwiseAnd,
        OpCode::BitwiseOr,
        OpCode::BitwiseXor,
        OpCode::LeftShift,
        OpCode::RightShift,
        OpCode::Not,
        OpCode::Negate,
        OpCode::Jump,
        OpCode::JumpIfFalse,
        OpCode::Loop,
        OpCode::Call,
        OpCode::Invoke,
        OpCode::SuperInvoke,
        OpCode::Closure,
        OpCode::CloseUpvalue,
        OpCode::Return,
        OpCode::BuildList,
        OpCode::IndexSubscript,
        OpCode::StoreSubscript,
        OpCode::Class,
        OpCode::Inherit,
        OpCode::Method,
    ];

    /// Decode a byte into an opcode.
    pub fn from_u8(byte: u8) -> Option<OpCode> {
        Self::ALL.get(byte as usize).copied()
    }

    /// Number of operand bytes that follow the opcode.
    ///
    /// `Closure` is variable-length; this returns only its fixed part.
    pub fn operand_size(self) -> usize {
        match self {
            OpCode::Constant
            | OpCode::GetLocal
            | OpCode::SetLocal
            | OpCode::GetGlobal
            | OpCode::DefineGlobal
            | OpCode::SetGlobal
            | OpCode::GetUpvalue
            | OpCode::SetUpvalue
            | OpCode::GetProperty
            | OpCode::SetProperty
            | OpCode::GetSuper
            | OpCode::Call
            | OpCode::Closure
            | OpCode::BuildList
            | OpCode::Class
            | OpCode::Method => 1,

            OpCode::Jump
            | OpCode::JumpIfFalse
            | OpCode::Loop
            | OpCode::Invoke
            | OpCode::SuperInvoke => 2,

            _ => 0,
        }
    }

    /// Mnemonic used by the disassembler.
    pub fn name(self) -> &'static str {
        match self {
            OpCode::Constant => "OP_CONSTANT",
            OpCode::Nil => "OP_NIL",
            OpCode::True => "OP_TRUE",
            OpCode::False => "OP_FALSE",
            OpCode::Pop => "OP_POP",
            OpCode::GetLocal => "OP_GET_LOCAL",
            OpCode::SetLocal => "OP_SET_LOCAL",
            OpCode::GetGlobal => "OP_GET_GLOBAL",
            OpCode::DefineGlobal => "OP_DEFINE_GLOBAL",
            OpCode::SetGlobal => "OP_SET_GLOBAL",
            OpCode::GetUpvalue => "OP_GET_UPVALUE",
            OpCode::SetUpvalue => "OP_SET_UPVALUE",
            OpCode::GetProperty => "OP_GET_PROPERTY",
            OpCode::SetProperty => "OP_SET_PROPERTY",
            OpCode::GetSuper => "OP_GET_SUPER",
            OpCode::Equal => "OP_EQUAL",
            OpCode::Greater => "OP_GREATER",
            OpCode::Less => "OP_LESS",
            OpCode::Add => "OP_ADD",
            OpCode::Subtract => "OP_SUBTRACT",
            OpCode::Multiply => "OP_MULTIPLY",
            OpCode::Divide => "OP_DIVIDE",
            OpCode::BitwiseAnd => "OP_BITWISE_AND",
            OpCode::BitwiseOr => "OP_BITWISE_OR",
            OpCode::BitwiseXor => "OP_BITWISE_XOR",
            OpCode::LeftShift => "OP_LEFT_SHIFT",
            OpCode::RightShift => "OP_RIGHT_SHIFT",
            OpCode::Not => "OP_NOT",
            OpCode::Negate => "OP_NEGATE",
            OpCode::Jump => "OP_JUMP",
            OpCode::JumpIfFalse => "OP_JUMP_IF_FALSE",
            OpCode::Loop => "OP_LOOP",
            OpCode::Call => "OP_CALL",
            OpCode::Invoke => "OP_INVOKE",
            OpCode::SuperInvoke => "OP_SUPER_INVOKE",
            OpCode::Closure => "OP_CLOSURE",
            OpCode::CloseUpvalue => "OP_CLOSE_UPVALUE",
            OpCode::Return => "OP_RETURN",
            OpCode::BuildList => "OP_BUILD_LIST",
            OpCode::IndexSubscript => "OP_INDEX_SUBSCR",
            OpCode::StoreSubscript => "OP_STORE_SUBSCR",
            OpCode::Class => "OP_CLASS",
            OpCode::Inherit => "OP_INHERIT",
            OpCode::Method => "OP_METHOD",
        }
    }
}

impl From<OpCode> for u8 {
    fn from(op: OpCode) -> u8 {
        op as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_matches_discriminants() {
        for (byte, op) in OpCode::ALL.iter().enumerate() {
            assert_eq!(*op as u8, byte as u8);
            assert_eq!(OpCode::from_u8(byte as u8), Some(*op));
        }
        assert_eq!(OpCode::from_u8(OpCode::ALL.len() as u8), None);
        assert_eq!(OpCode::from_u8(255), None);
    }

    #[test]
    fn test_operand_sizes() {
        assert_eq!(OpCode::Return.operand_size(), 0);
        assert_eq!(OpCode::Constant.operand_size(), 1);
        assert_eq!(OpCode::Jump.operand_size(), 2);
        assert_eq!(OpCode::Invoke.operand_size(), 2);
    }
}
