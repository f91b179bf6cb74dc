//! Class, instance and property operations for the VM.

use crate::error::RuntimeError;
use crate::vm::object::{BoundMethod, Object};
use crate::vm::value::{ObjRef, Value};
use crate::vm::vm::Vm;

impl Vm {
    /// GET_PROPERTY: fields shadow methods; methods come back bound to the
    /// receiver.
    pub(crate) fn get_property(&mut self, name: ObjRef) -> Result<(), RuntimeError> {
        let receiver = self.peek(0);
        let key = self.heap.key(name);

        let instance = match receiver {
            Value::Obj(obj) => match self.heap.get(obj) {
                Object::Instance(instance) => instance,
                _ => return Err(self.runtime_error("Only instances have properties.")),
            },
            _ => return Err(self.runtime_error("Only instances have properties.")),
        };

        let (field, class) = (instance.fields.get(key), instance.class);
        match field {
            Some(value) => {
                self.pop();
                self.push(value);
                Ok(())
            }
            None => self.bind_method(class, name),
        }
    }

    /// SET_PROPERTY: `instance.name = value`, leaving the value.
    pub(crate) fn set_property(&mut self, name: ObjRef) -> Result<(), RuntimeError> {
        let value = self.peek(0);
        let instance = match self.peek(1) {
            Value::Obj(obj) if matches!(self.heap.get(obj), Object::Instance(_)) => obj,
            _ => return Err(self.runtime_error("Only instances have fields.")),
        };

        let key = self.heap.key(name);
        self.heap.as_instance_mut(instance).fields.set(key, value);
        self.track_growth(instance);

        self.pop();
        self.pop();
        self.push(value);
        Ok(())
    }

    /// Replace the receiver on top of the stack with `class.name` bound to it.
    pub(crate) fn bind_method(&mut self, class: ObjRef, name: ObjRef) -> Result<(), RuntimeError> {
        let key = self.heap.key(name);
        let Some(Value::Obj(method)) = self.heap.as_class(class).methods.get(key) else {
            let message = format!("Undefined property '{}'.", self.string_chars(name));
            return Err(self.runtime_error(message));
        };

        // The receiver stays on the stack until the bound method replaces it.
        let bound = self.alloc(Object::BoundMethod(BoundMethod {
            receiver: self.peek(0),
            method,
        }));
        self.pop();
        self.push(Value::Obj(bound));
        Ok(())
    }

    /// METHOD: add the closure on top of the stack to the class below it.
    pub(crate) fn define_method(&mut self, name: ObjRef) {
        let method = self.peek(0);
        let Value::Obj(class) = self.peek(1) else {
            unreachable!("METHOD without a class below the closure");
        };
        let key = self.heap.key(name);
        self.heap.as_class_mut(class).methods.set(key, method);
        self.track_growth(class);
        self.pop();
    }

    /// INHERIT: copy the superclass's methods into the subclass on top of the
    /// stack, then pop the subclass. Methods defined afterwards override the
    /// copies.
    pub(crate) fn inherit(&mut self) -> Result<(), RuntimeError> {
        let superclass = match self.peek(1) {
            Value::Obj(obj) if matches!(self.heap.get(obj), Object::Class(_)) => obj,
            _ => return Err(self.runtime_error("Superclass must be a class.")),
        };
        let Value::Obj(subclass) = self.peek(0) else {
            unreachable!("INHERIT without a subclass on the stack");
        };

        let inherited = self.heap.as_class(superclass).methods.clone();
        inherited.add_all(&mut self.heap.as_class_mut(subclass).methods);
        self.track_growth(subclass);
        self.pop();
        Ok(())
    }
}
