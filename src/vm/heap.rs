//! Object registry and memory accounting.
//!
//! Every object lives in a slot of the heap and is named by an [`ObjRef`]
//! index. Freed slots go on a free list and are reused. The heap also owns
//! the weak string intern set and the gray stack used while tracing.

use colored::Colorize;

use crate::vm::object::{
    BoundMethod, Class, Closure, Function, Instance, List, Native, Object, RotoString,
};
use crate::vm::table::{StrKey, Table};
use crate::vm::upvalue::Upvalue;
use crate::vm::value::{format_number, ObjRef, Value};

/// Lists nested deeper than this print as `[...]`.
const MAX_DISPLAY_DEPTH: usize = 16;

#[derive(Debug)]
struct HeapEntry {
    object: Object,
    is_marked: bool,
    /// Bytes charged to `bytes_allocated` for this object.
    size: usize,
}

#[derive(Debug)]
enum Slot {
    Live(HeapEntry),
    Free,
}

#[derive(Debug)]
pub struct Heap {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
    bytes_allocated: usize,
    next_gc: usize,
    pub(crate) gray_stack: Vec<ObjRef>,
    /// Intern set. Keys are every live string; values are unused.
    pub(crate) strings: Table,
    pub(crate) log_gc: bool,
}

impl Heap {
    pub fn new(initial_threshold: usize, log_gc: bool) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            bytes_allocated: 0,
            next_gc: initial_threshold,
            gray_stack: Vec::new(),
            strings: Table::new(),
            log_gc,
        }
    }

    /// Number of live objects.
    pub fn object_count(&self) -> usize {
        self.live
    }

    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    pub fn next_gc(&self) -> usize {
        self.next_gc
    }

    pub(crate) fn set_next_gc(&mut self, next_gc: usize) {
        self.next_gc = next_gc;
    }

    /// Whether allocating `additional` more bytes crosses the threshold.
    pub fn should_collect(&self, additional: usize) -> bool {
        self.bytes_allocated + additional > self.next_gc
    }

    /// Register an object. Collection decisions are made by the caller.
    pub fn insert(&mut self, object: Object) -> ObjRef {
        let size = object.heap_size();
        let kind = object.kind_name();
        self.bytes_allocated += size;
        self.live += 1;

        let entry = HeapEntry {
            object,
            is_marked: false,
            size,
        };
        let obj = match self.free.pop() {
            Some(index) => {
                self.slots[index as usize] = Slot::Live(entry);
                ObjRef(index)
            }
            None => {
                self.slots.push(Slot::Live(entry));
                ObjRef((self.slots.len() - 1) as u32)
            }
        };

        if self.log_gc {
            eprintln!("{}", format!("{} allocate {} for {}", obj, size, kind).cyan());
        }
        obj
    }

    /// Recompute the size charged to `obj` after its owned arrays changed.
    pub fn refresh_size(&mut self, obj: ObjRef) {
        let entry = self.entry_mut(obj);
        let size = entry.object.heap_size();
        let old = std::mem::replace(&mut entry.size, size);
        self.bytes_allocated = self.bytes_allocated + size - old;
    }

    pub fn get(&self, obj: ObjRef) -> &Object {
        &self.entry(obj).object
    }

    pub fn get_mut(&mut self, obj: ObjRef) -> &mut Object {
        &mut self.entry_mut(obj).object
    }

    fn entry(&self, obj: ObjRef) -> &HeapEntry {
        match &self.slots[obj.index()] {
            Slot::Live(entry) => entry,
            Slot::Free => panic!("use of freed object {}", obj),
        }
    }

    fn entry_mut(&mut self, obj: ObjRef) -> &mut HeapEntry {
        match &mut self.slots[obj.index()] {
            Slot::Live(entry) => entry,
            Slot::Free => panic!("use of freed object {}", obj),
        }
    }

    // ============ Typed access ============

    pub fn as_string(&self, obj: ObjRef) -> &RotoString {
        match self.get(obj) {
            Object::String(s) => s,
            other => panic!("expected string, found {}", other.kind_name()),
        }
    }

    pub fn as_function(&self, obj: ObjRef) -> &Function {
        match self.get(obj) {
            Object::Function(f) => f,
            other => panic!("expected function, found {}", other.kind_name()),
        }
    }

    pub fn as_closure(&self, obj: ObjRef) -> &Closure {
        match self.get(obj) {
            Object::Closure(c) => c,
            other => panic!("expected closure, found {}", other.kind_name()),
        }
    }

    pub fn as_upvalue(&self, obj: ObjRef) -> &Upvalue {
        match self.get(obj) {
            Object::Upvalue(u) => u,
            other => panic!("expected upvalue, found {}", other.kind_name()),
        }
    }

    pub fn as_upvalue_mut(&mut self, obj: ObjRef) -> &mut Upvalue {
        match self.get_mut(obj) {
            Object::Upvalue(u) => u,
            other => panic!("expected upvalue, found {}", other.kind_name()),
        }
    }

    pub fn as_class(&self, obj: ObjRef) -> &Class {
        match self.get(obj) {
            Object::Class(c) => c,
            other => panic!("expected class, found {}", other.kind_name()),
        }
    }

    pub fn as_class_mut(&mut self, obj: ObjRef) -> &mut Class {
        match self.get_mut(obj) {
            Object::Class(c) => c,
            other => panic!("expected class, found {}", other.kind_name()),
        }
    }

    pub fn as_instance_mut(&mut self, obj: ObjRef) -> &mut Instance {
        match self.get_mut(obj) {
            Object::Instance(i) => i,
            other => panic!("expected instance, found {}", other.kind_name()),
        }
    }

    pub fn as_list(&self, obj: ObjRef) -> &List {
        match self.get(obj) {
            Object::List(l) => l,
            other => panic!("expected list, found {}", other.kind_name()),
        }
    }

    pub fn as_list_mut(&mut self, obj: ObjRef) -> &mut List {
        match self.get_mut(obj) {
            Object::List(l) => l,
            other => panic!("expected list, found {}", other.kind_name()),
        }
    }

    /// The chars of `value` if it is a string.
    pub fn str_value(&self, value: Value) -> Option<&str> {
        match value {
            Value::Obj(obj) => match self.get(obj) {
                Object::String(s) => Some(&s.chars),
                _ => None,
            },
            _ => None,
        }
    }

    /// Intern-table key for a string object.
    pub fn key(&self, obj: ObjRef) -> StrKey {
        StrKey::new(obj, self.as_string(obj).hash)
    }

    /// The interned string with these contents, if one exists.
    pub fn find_interned(&self, chars: &str, hash: u32) -> Option<ObjRef> {
        self.strings
            .find_string(hash, |obj| &*self.as_string(obj).chars == chars)
    }

    // ============ Display ============

    /// Render a value the way `print` shows it.
    pub fn display_value(&self, value: Value) -> String {
        let mut out = String::new();
        self.write_value(&mut out, value, 0);
        out
    }

    fn write_value(&self, out: &mut String, value: Value, depth: usize) {
        match value {
            Value::Bool(b) => out.push_str(if b { "true" } else { "false" }),
            Value::Nil => out.push_str("nil"),
            Value::Number(n) => out.push_str(&format_number(n)),
            Value::Obj(obj) => self.write_object(out, obj, depth),
        }
    }

    fn write_object(&self, out: &mut String, obj: ObjRef, depth: usize) {
        match self.get(obj) {
            Object::String(s) => out.push_str(&s.chars),
            Object::Function(f) => self.write_function(out, f),
            Object::Native(Native { .. }) => out.push_str("<native fn>"),
            Object::Closure(c) => self.write_function(out, self.as_function(c.function)),
            Object::Upvalue(_) => out.push_str("upvalue"),
            Object::Class(c) => out.push_str(&self.as_string(c.name).chars),
            Object::Instance(Instance { class, .. }) => {
                let name = &self.as_string(self.as_class(*class).name).chars;
                out.push_str(name);
                out.push_str(" instance");
            }
            Object::BoundMethod(BoundMethod { method, .. }) => {
                let function = self.as_closure(*method).function;
                self.write_function(out, self.as_function(function));
            }
            Object::List(list) => {
                if depth >= MAX_DISPLAY_DEPTH {
                    out.push_str("[...]");
                    return;
                }
                out.push('[');
                for (i, item) in list.items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.write_value(out, *item, depth + 1);
                }
                out.push(']');
            }
        }
    }

    fn write_function(&self, out: &mut String, function: &Function) {
        match function.name {
            Some(name) => {
                out.push_str("<fn ");
                out.push_str(&self.as_string(name).chars);
                out.push('>');
            }
            None => out.push_str("<script>"),
        }
    }

    /// Name of a function for backtraces; `None` for the script.
    pub fn function_name(&self, function: ObjRef) -> Option<String> {
        self.as_function(function)
            .name
            .map(|name| self.as_string(name).chars.to_string())
    }

    // ============ Collection ============

    pub fn is_marked(&self, obj: ObjRef) -> bool {
        self.entry(obj).is_marked
    }

    pub fn mark_value(&mut self, value: Value) {
        if let Value::Obj(obj) = value {
            self.mark_object(obj);
        }
    }

    /// Mark `obj` gray. Already-marked objects are skipped, which is what
    /// stops tracing on cycles.
    pub fn mark_object(&mut self, obj: ObjRef) {
        let log_gc = self.log_gc;
        let entry = self.entry_mut(obj);
        if entry.is_marked {
            return;
        }
        entry.is_marked = true;
        if log_gc {
            let kind = entry.object.kind_name();
            eprintln!("{}", format!("{} mark {}", obj, kind).yellow());
        }
        self.gray_stack.push(obj);
    }

    pub fn mark_table(&mut self, table: &Table) {
        for (key, value) in table.iter() {
            self.mark_object(key.obj);
            self.mark_value(value);
        }
    }

    /// Drain the gray stack, blackening each object.
    pub fn trace_references(&mut self) {
        let mut children = Vec::new();
        while let Some(obj) = self.gray_stack.pop() {
            self.blacken(obj, &mut children);
        }
    }

    fn blacken(&mut self, obj: ObjRef, children: &mut Vec<Value>) {
        children.clear();
        let object = self.get(obj);
        if self.log_gc {
            eprintln!("{}", format!("{} blacken {}", obj, object.kind_name()).yellow());
        }
        match object {
            Object::String(_) | Object::Native(_) => {}
            Object::Upvalue(upvalue) => {
                if let Upvalue::Closed(value) = upvalue {
                    children.push(*value);
                }
            }
            Object::Function(function) => {
                children.extend(function.name.map(Value::Obj));
                children.extend_from_slice(&function.chunk.constants);
            }
            Object::Closure(closure) => {
                children.push(Value::Obj(closure.function));
                children.extend(closure.upvalues.iter().copied().map(Value::Obj));
            }
            Object::Class(class) => {
                children.push(Value::Obj(class.name));
                push_table(children, &class.methods);
            }
            Object::Instance(instance) => {
                children.push(Value::Obj(instance.class));
                push_table(children, &instance.fields);
            }
            Object::BoundMethod(bound) => {
                children.push(bound.receiver);
                children.push(Value::Obj(bound.method));
            }
            Object::List(list) => children.extend_from_slice(&list.items),
        }
        for &child in children.iter() {
            self.mark_value(child);
        }
    }

    /// Purge unmarked strings from the intern set.
    pub fn remove_white_strings(&mut self) {
        let slots = &self.slots;
        self.strings.remove_white(|obj| match &slots[obj.index()] {
            Slot::Live(entry) => entry.is_marked,
            Slot::Free => false,
        });
    }

    /// Free every unmarked object and clear the marks on survivors.
    /// Returns the number of objects freed.
    pub fn sweep(&mut self) -> usize {
        let mut freed = 0;
        for index in 0..self.slots.len() {
            let slot = &mut self.slots[index];
            let Slot::Live(entry) = slot else {
                continue;
            };
            if entry.is_marked {
                entry.is_marked = false;
                continue;
            }
            if self.log_gc {
                eprintln!(
                    "{}",
                    format!("#{} free {}", index, entry.object.kind_name()).blue()
                );
            }
            self.bytes_allocated -= entry.size;
            *slot = Slot::Free;
            self.free.push(index as u32);
            self.live -= 1;
            freed += 1;
        }
        freed
    }
}

fn push_table(children: &mut Vec<Value>, table: &Table) {
    for (key, value) in table.iter() {
        children.push(Value::Obj(key.obj));
        children.push(value);
    }
}
