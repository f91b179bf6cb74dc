//! Bytecode VM for Roto: executes compiled chunks on a value stack and owns
//! the garbage-collected heap.

pub mod gc;
pub mod heap;
pub mod natives;
pub mod object;
pub mod table;
pub mod upvalue;
pub mod value;
#[allow(clippy::module_inception)]
pub mod vm;
pub mod vm_calls;
pub mod vm_classes;
pub mod vm_lists;

#[cfg(test)]
mod tests;

pub use heap::Heap;
pub use object::NativeFn;
pub use value::{ObjRef, Value};
pub use vm::{InterpretResult, Vm};
