//! Function call dispatch for the VM.

use crate::error::RuntimeError;
use crate::vm::object::{Closure, Instance, NativeFn, Object};
use crate::vm::table::Table;
use crate::vm::value::{ObjRef, Value};
use crate::vm::vm::{CallFrame, Vm, FRAMES_MAX};

impl Vm {
    /// Call a value with `arg_count` arguments on the stack.
    /// The callee sits just below the arguments.
    pub(crate) fn call_value(&mut self, callee: Value, arg_count: usize) -> Result<(), RuntimeError> {
        if let Value::Obj(obj) = callee {
            match self.heap.get(obj) {
                Object::Closure(_) => return self.call_closure(obj, arg_count),
                Object::Native(native) => {
                    let function = native.function;
                    return self.call_native(function, arg_count, 0);
                }
                Object::Class(_) => return self.call_class(obj, arg_count),
                Object::BoundMethod(bound) => {
                    let (receiver, method) = (bound.receiver, bound.method);
                    let callee_slot = self.stack.len() - arg_count - 1;
                    self.stack[callee_slot] = receiver;
                    return self.call_closure(method, arg_count);
                }
                _ => {}
            }
        }
        Err(self.runtime_error("Can only call functions and classes."))
    }

    /// Push a frame for `closure`. Its arguments are already on the stack.
    pub(crate) fn call_closure(&mut self, closure: ObjRef, arg_count: usize) -> Result<(), RuntimeError> {
        let function = self.heap.as_closure(closure).function;
        let arity = self.heap.as_function(function).arity as usize;
        if arg_count != arity {
            let message = format!("Expected {} arguments but got {}.", arity, arg_count);
            return Err(self.runtime_error(message));
        }
        if self.frames.len() == FRAMES_MAX {
            return Err(self.runtime_error("Stack overflow."));
        }

        self.frames.push(CallFrame {
            closure,
            function,
            ip: 0,
            slot_base: self.stack.len() - arg_count - 1,
        });
        Ok(())
    }

    /// Run a host function over the top `arg_count + extra` values and
    /// replace the whole call region, callee slot included, with its result.
    ///
    /// `extra` is 1 for list methods, whose receiver occupies the callee slot
    /// and is passed as the first argument.
    pub(crate) fn call_native(
        &mut self,
        function: NativeFn,
        arg_count: usize,
        extra: usize,
    ) -> Result<(), RuntimeError> {
        let start = self.stack.len() - arg_count - extra;
        // The arguments stay on the stack, so they remain rooted during the call.
        let args = self.stack[start..].to_vec();
        match function(self, &args) {
            Ok(result) => {
                self.stack.truncate(start + extra - 1);
                self.push(result);
                Ok(())
            }
            Err(message) => Err(self.runtime_error(message)),
        }
    }

    fn call_class(&mut self, class: ObjRef, arg_count: usize) -> Result<(), RuntimeError> {
        let instance = self.alloc(Object::Instance(Instance {
            class,
            fields: Table::new(),
        }));
        let callee_slot = self.stack.len() - arg_count - 1;
        self.stack[callee_slot] = Value::Obj(instance);

        let init_key = self.heap.key(self.init_string);
        match self.heap.as_class(class).methods.get(init_key) {
            Some(Value::Obj(initializer)) => self.call_closure(initializer, arg_count),
            _ if arg_count != 0 => {
                let message = format!("Expected 0 arguments but got {}.", arg_count);
                Err(self.runtime_error(message))
            }
            _ => Ok(()),
        }
    }

    /// `receiver.name(args)` without materializing a bound method.
    pub(crate) fn invoke(&mut self, name: ObjRef, arg_count: usize) -> Result<(), RuntimeError> {
        let receiver = self.peek(arg_count);
        let key = self.heap.key(name);

        let Value::Obj(obj) = receiver else {
            return Err(self.runtime_error("Only instances and lists have methods."));
        };
        match self.heap.get(obj) {
            Object::List(_) => match self.list_methods.get(key) {
                Some(Value::Obj(method)) => {
                    let Object::Native(native) = self.heap.get(method) else {
                        unreachable!("list methods are natives");
                    };
                    let function = native.function;
                    self.call_native(function, arg_count, 1)
                }
                _ => {
                    let message = format!("Undefined property '{}'.", self.string_chars(name));
                    Err(self.runtime_error(message))
                }
            },
            Object::Instance(instance) => {
                let class = instance.class;
                // A field holding a callable shadows a method of the same name.
                if let Some(field) = instance.fields.get(key) {
                    let callee_slot = self.stack.len() - arg_count - 1;
                    self.stack[callee_slot] = field;
                    return self.call_value(field, arg_count);
                }
                self.invoke_from_class(class, name, arg_count)
            }
            _ => Err(self.runtime_error("Only instances and lists have methods.")),
        }
    }

    pub(crate) fn invoke_from_class(
        &mut self,
        class: ObjRef,
        name: ObjRef,
        arg_count: usize,
    ) -> Result<(), RuntimeError> {
        let key = self.heap.key(name);
        match self.heap.as_class(class).methods.get(key) {
            Some(Value::Obj(method)) => self.call_closure(method, arg_count),
            _ => {
                let message = format!("Undefined property '{}'.", self.string_chars(name));
                Err(self.runtime_error(message))
            }
        }
    }

    /// CLOSURE: wrap a function constant, capturing the listed variables.
    pub(crate) fn make_closure(&mut self) {
        let function = match self.read_constant() {
            Value::Obj(function) => function,
            other => unreachable!("closure operand is not a function: {:?}", other),
        };
        let upvalue_count = self.heap.as_function(function).upvalue_count;
        let (enclosing, slot_base) = {
            let frame = self.frames.last().expect("no active call frame");
            (frame.closure, frame.slot_base)
        };

        let mut upvalues = Vec::with_capacity(upvalue_count);
        for _ in 0..upvalue_count {
            let is_local = self.read_byte() == 1;
            let index = self.read_byte() as usize;
            let upvalue = if is_local {
                self.capture_upvalue(slot_base + index)
            } else {
                self.heap.as_closure(enclosing).upvalues[index]
            };
            upvalues.push(upvalue);
        }

        let closure = self.alloc(Object::Closure(Closure { function, upvalues }));
        self.push(Value::Obj(closure));
    }
}
