//! Captured variables and their open/closed lifecycle.

use crate::vm::object::Object;
use crate::vm::value::{ObjRef, Value};
use crate::vm::vm::Vm;

/// An upvalue captures a variable from an enclosing scope.
///
/// While the variable is still on the stack the upvalue is open and names
/// the stack slot. When the slot goes out of scope the value moves into the
/// upvalue itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Upvalue {
    /// Points to a live stack slot.
    Open(usize),
    /// Holds the captured value after the enclosing scope exits.
    Closed(Value),
}

/// Emitted by the compiler for each variable a closure captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpvalueDescriptor {
    /// True when capturing a local of the immediately enclosing function,
    /// false when re-capturing one of its upvalues.
    pub is_local: bool,
    pub index: u8,
}

impl Vm {
    /// Find the open upvalue for `slot`, or create one.
    ///
    /// `open_upvalues` is kept sorted by slot, highest last, so closures that
    /// capture the same variable share one upvalue object.
    pub(crate) fn capture_upvalue(&mut self, slot: usize) -> ObjRef {
        let mut insert_at = self.open_upvalues.len();
        for (i, &upvalue) in self.open_upvalues.iter().enumerate().rev() {
            let open_slot = self.open_slot(upvalue);
            if open_slot == slot {
                return upvalue;
            }
            if open_slot < slot {
                break;
            }
            insert_at = i;
        }

        let created = self.alloc(Object::Upvalue(Upvalue::Open(slot)));
        self.open_upvalues.insert(insert_at, created);
        created
    }

    /// Close every open upvalue at or above `boundary`.
    pub(crate) fn close_upvalues(&mut self, boundary: usize) {
        while let Some(&upvalue) = self.open_upvalues.last() {
            let slot = self.open_slot(upvalue);
            if slot < boundary {
                break;
            }
            let value = self.stack[slot];
            *self.heap.as_upvalue_mut(upvalue) = Upvalue::Closed(value);
            self.open_upvalues.pop();
        }
    }

    pub(crate) fn read_upvalue(&self, upvalue: ObjRef) -> Value {
        match *self.heap.as_upvalue(upvalue) {
            Upvalue::Open(slot) => self.stack[slot],
            Upvalue::Closed(value) => value,
        }
    }

    pub(crate) fn write_upvalue(&mut self, upvalue: ObjRef, value: Value) {
        match self.heap.as_upvalue_mut(upvalue) {
            Upvalue::Open(slot) => {
                let slot = *slot;
                self.stack[slot] = value;
            }
            Upvalue::Closed(closed) => *closed = value,
        }
    }

    fn open_slot(&self, upvalue: ObjRef) -> usize {
        match *self.heap.as_upvalue(upvalue) {
            Upvalue::Open(slot) => slot,
            // Only open upvalues are kept in the list.
            Upvalue::Closed(_) => unreachable!("closed upvalue in open list"),
        }
    }
}
