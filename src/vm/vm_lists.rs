//! List construction and subscripting.

use crate::error::RuntimeError;
use crate::vm::object::{List, Object};
use crate::vm::value::{ObjRef, Value};
use crate::vm::vm::Vm;

impl Vm {
    /// BUILD_LIST: replace the top `count` values with a list of them.
    pub(crate) fn build_list(&mut self, count: usize) {
        let start = self.stack.len() - count;
        // Items stay on the stack while the list is allocated.
        let items = self.stack[start..].to_vec();
        let list = self.alloc(Object::List(List { items }));
        self.stack.truncate(start);
        self.push(Value::Obj(list));
    }

    /// INDEX_SUBSCR: `list[index]`.
    pub(crate) fn index_subscript(&mut self) -> Result<(), RuntimeError> {
        let index = self.peek(0);
        let Some(list) = self.list_operand(self.peek(1)) else {
            return Err(self.runtime_error("Invalid type to index into."));
        };
        let Value::Number(index) = index else {
            return Err(self.runtime_error("List index is not a number."));
        };

        let items = &self.heap.as_list(list).items;
        let item = match list_position(index, items.len()) {
            Some(position) => items[position],
            None => return Err(self.runtime_error("List index out of range.")),
        };

        self.pop();
        self.pop();
        self.push(item);
        Ok(())
    }

    /// STORE_SUBSCR: `list[index] = item`, leaving the item.
    pub(crate) fn store_subscript(&mut self) -> Result<(), RuntimeError> {
        let item = self.peek(0);
        let index = self.peek(1);
        let Some(list) = self.list_operand(self.peek(2)) else {
            return Err(self.runtime_error("Cannot store value in a non-list."));
        };
        let Value::Number(index) = index else {
            return Err(self.runtime_error("List index is not a number."));
        };

        let items = &mut self.heap.as_list_mut(list).items;
        match list_position(index, items.len()) {
            Some(position) => items[position] = item,
            None => return Err(self.runtime_error("Invalid list index.")),
        }

        self.pop();
        self.pop();
        self.pop();
        self.push(item);
        Ok(())
    }

    pub(crate) fn list_operand(&self, value: Value) -> Option<ObjRef> {
        match value {
            Value::Obj(obj) if matches!(self.heap.get(obj), Object::List(_)) => Some(obj),
            _ => None,
        }
    }
}

/// Map a numeric index onto `0..len`, truncating toward zero.
pub(crate) fn list_position(index: f64, len: usize) -> Option<usize> {
    let index = index.trunc();
    if index >= 0.0 && index < len as f64 {
        Some(index as usize)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_position() {
        assert_eq!(list_position(0.0, 3), Some(0));
        assert_eq!(list_position(2.9, 3), Some(2));
        assert_eq!(list_position(3.0, 3), None);
        assert_eq!(list_position(-1.0, 3), None);
        assert_eq!(list_position(-0.5, 3), Some(0));
        assert_eq!(list_position(f64::NAN, 3), None);
        assert_eq!(list_position(0.0, 0), None);
    }
}
