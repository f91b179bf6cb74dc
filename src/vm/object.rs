//! Heap object variants.

use std::fmt;
use std::mem;

use crate::bytecode::chunk::Chunk;
use crate::vm::table::Table;
use crate::vm::upvalue::Upvalue;
use crate::vm::value::{ObjRef, Value};
use crate::vm::vm::Vm;

/// Signature of a host function. Arguments are a copy of the caller's
/// argument window; for list methods the receiver comes first.
pub type NativeFn = fn(&mut Vm, &[Value]) -> Result<Value, String>;

/// An interned, immutable string.
#[derive(Debug, Clone)]
pub struct RotoString {
    pub chars: Box<str>,
    pub hash: u32,
}

impl RotoString {
    pub fn new(chars: impl Into<Box<str>>) -> Self {
        let chars = chars.into();
        let hash = hash_string(&chars);
        Self { chars, hash }
    }
}

/// A compiled function.
#[derive(Debug, Clone, Default)]
pub struct Function {
    pub arity: u8,
    pub upvalue_count: usize,
    pub chunk: Chunk,
    /// `None` for the top-level script.
    pub name: Option<ObjRef>,
}

impl Function {
    pub fn new(name: Option<ObjRef>) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }
}

#[derive(Clone)]
pub struct Native {
    pub name: &'static str,
    pub function: NativeFn,
}

impl fmt::Debug for Native {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Native").field("name", &self.name).finish()
    }
}

/// A function together with the variables it captured.
#[derive(Debug, Clone)]
pub struct Closure {
    pub function: ObjRef,
    pub upvalues: Vec<ObjRef>,
}

#[derive(Debug, Clone)]
pub struct Class {
    pub name: ObjRef,
    pub methods: Table,
}

#[derive(Debug, Clone)]
pub struct Instance {
    pub class: ObjRef,
    pub fields: Table,
}

/// A method closure paired with the receiver it was read from.
#[derive(Debug, Clone)]
pub struct BoundMethod {
    pub receiver: Value,
    pub method: ObjRef,
}

#[derive(Debug, Clone, Default)]
pub struct List {
    pub items: Vec<Value>,
}

/// Every kind of heap object.
#[derive(Debug, Clone)]
pub enum Object {
    String(RotoString),
    Function(Function),
    Native(Native),
    Closure(Closure),
    Upvalue(Upvalue),
    Class(Class),
    Instance(Instance),
    BoundMethod(BoundMethod),
    List(List),
}

impl Object {
    /// Short name of the variant, used in GC logs.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Object::String(_) => "string",
            Object::Function(_) => "function",
            Object::Native(_) => "native",
            Object::Closure(_) => "closure",
            Object::Upvalue(_) => "upvalue",
            Object::Class(_) => "class",
            Object::Instance(_) => "instance",
            Object::BoundMethod(_) => "bound method",
            Object::List(_) => "list",
        }
    }

    /// Bytes attributed to this object for collection scheduling: the
    /// object record plus whatever arrays it owns.
    pub fn heap_size(&self) -> usize {
        let owned = match self {
            Object::String(s) => s.chars.len(),
            Object::Function(f) => f.chunk.heap_size(),
            Object::Closure(c) => c.upvalues.capacity() * mem::size_of::<ObjRef>(),
            Object::Class(c) => c.methods.heap_size(),
            Object::Instance(i) => i.fields.heap_size(),
            Object::List(l) => l.items.capacity() * mem::size_of::<Value>(),
            Object::Native(_) | Object::Upvalue(_) | Object::BoundMethod(_) => 0,
        };
        mem::size_of::<Object>() + owned
    }
}

/// 32-bit FNV-1a.
pub fn hash_string(s: &str) -> u32 {
    let mut hash: u32 = 2_166_136_261;
    for byte in s.bytes() {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(16_777_619);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fnv1a_known_values() {
        assert_eq!(hash_string(""), 2_166_136_261);
        assert_eq!(hash_string("a"), 0xe40c_292c);
        assert_eq!(hash_string("foobar"), 0xbf9c_f968);
    }

    #[test]
    fn test_size_includes_owned_arrays() {
        let short = Object::String(RotoString::new("a"));
        let long = Object::String(RotoString::new("a".repeat(100)));
        assert_eq!(long.heap_size() - short.heap_size(), 99);
    }
}
