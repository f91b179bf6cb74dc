//! Tri-color mark-sweep collection.
//!
//! Roots are marked gray, the gray stack is drained by blackening each
//! object's children, unmarked strings are dropped from the intern set, and
//! whatever is still white gets swept.

use colored::Colorize;

use crate::vm::vm::Vm;

impl Vm {
    /// Run a full collection and reschedule the next one.
    pub fn collect_garbage(&mut self) {
        let before = self.heap.bytes_allocated();
        if self.config.log_gc {
            eprintln!("{}", "-- gc begin".green());
        }

        self.mark_roots();
        self.heap.trace_references();
        self.heap.remove_white_strings();
        let freed = self.heap.sweep();

        let after = self.heap.bytes_allocated();
        let next_gc = after.saturating_mul(self.config.gc_growth_factor);
        self.heap.set_next_gc(next_gc);

        if self.config.log_gc {
            eprintln!("{}", "-- gc end".green());
            eprintln!(
                "{}",
                format!(
                    "   collected {} bytes ({} objects) (from {} to {}) next at {}",
                    before - after,
                    freed,
                    before,
                    after,
                    next_gc
                )
                .green()
            );
        }
    }

    fn mark_roots(&mut self) {
        for &value in &self.stack {
            self.heap.mark_value(value);
        }
        for frame in &self.frames {
            self.heap.mark_object(frame.closure);
        }
        for &upvalue in &self.open_upvalues {
            self.heap.mark_object(upvalue);
        }
        self.heap.mark_table(&self.globals);
        self.heap.mark_table(&self.list_methods);
        for &value in &self.compiler_roots {
            self.heap.mark_value(value);
        }
        self.heap.mark_object(self.init_string);
    }
}

#[cfg(test)]
mod tests {
    use crate::config::VmConfig;
    use crate::vm::object::{hash_string, List, Object};
    use crate::vm::value::Value;
    use crate::vm::vm::Vm;

    #[test]
    fn test_unreachable_objects_are_freed() {
        let mut vm = Vm::with_config(VmConfig::captured());
        let baseline = vm.heap().object_count();

        vm.alloc(Object::List(List::default()));
        vm.intern("temporary");
        assert_eq!(vm.heap().object_count(), baseline + 2);

        vm.collect_garbage();
        assert_eq!(vm.heap().object_count(), baseline);
        // The intern set does not keep strings alive.
        assert_eq!(vm.heap().find_interned("temporary", hash_string("temporary")), None);
    }

    #[test]
    fn test_stack_values_survive() {
        let mut vm = Vm::with_config(VmConfig::captured());
        let kept = vm.intern("kept");
        vm.push(Value::Obj(kept));
        vm.collect_garbage();
        assert_eq!(vm.heap().as_string(kept).chars.as_ref(), "kept");
        // Still interned: the same handle comes back.
        assert_eq!(vm.intern("kept"), kept);
        vm.pop();
    }

    #[test]
    fn test_growth_past_threshold_collects() {
        let mut vm = Vm::with_config(VmConfig::captured());
        let list = vm.alloc(Object::List(List::default()));
        vm.push(Value::Obj(list));
        vm.intern("unreachable");
        vm.heap.set_next_gc(vm.heap().bytes_allocated());

        vm.heap.as_list_mut(list).items.extend([Value::Nil; 64]);
        vm.track_growth(list);

        assert_eq!(vm.heap().find_interned("unreachable", hash_string("unreachable")), None);
        assert_eq!(vm.heap().as_list(list).items.len(), 64);
        assert!(vm.heap().next_gc() > vm.heap().bytes_allocated());
        vm.pop();
    }

    #[test]
    fn test_threshold_grows_with_live_bytes() {
        let mut vm = Vm::with_config(VmConfig {
            initial_gc_threshold: 64,
            ..VmConfig::captured()
        });
        vm.collect_garbage();
        assert_eq!(vm.heap().next_gc(), vm.heap().bytes_allocated() * 2);
    }
}
