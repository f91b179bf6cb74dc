//! The bytecode virtual machine: stack-based execution engine.

use colored::Colorize;

use crate::bytecode::disassembler::disassemble_instruction;
use crate::bytecode::instruction::OpCode;
use crate::compiler::compile;
use crate::config::VmConfig;
use crate::error::{RotoError, RuntimeError, TraceFrame};
use crate::vm::heap::Heap;
use crate::vm::natives;
use crate::vm::object::{hash_string, Class, Closure, Native, NativeFn, Object, RotoString};
use crate::vm::table::{StrKey, Table};
use crate::vm::value::{ObjRef, Value};

/// Maximum call depth.
pub const FRAMES_MAX: usize = 64;

/// Value slots reserved up front: one full window of locals per frame.
/// The stack grows past this if temporaries need it; call depth is the
/// enforced limit.
pub const STACK_INITIAL_CAPACITY: usize = FRAMES_MAX * 256;

/// A call frame on the VM call stack.
#[derive(Debug, Clone, Copy)]
pub struct CallFrame {
    /// The closure being executed.
    pub closure: ObjRef,
    /// The closure's function, cached to avoid a second lookup per byte.
    pub function: ObjRef,
    /// Instruction pointer (index into chunk.code).
    pub ip: usize,
    /// Stack index of slot 0: the callee itself, or `this` for methods.
    pub slot_base: usize,
}

/// Outcome of [`Vm::interpret`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpretResult {
    Ok,
    CompileError,
    RuntimeError,
}

impl From<&Result<(), RotoError>> for InterpretResult {
    fn from(result: &Result<(), RotoError>) -> Self {
        match result {
            Ok(()) => InterpretResult::Ok,
            Err(RotoError::Compile(_)) => InterpretResult::CompileError,
            Err(RotoError::Runtime(_)) | Err(RotoError::Io(_)) => InterpretResult::RuntimeError,
        }
    }
}

/// The bytecode VM.
///
/// Owns every object it or its compiler allocates. Globals and the heap
/// survive between calls to [`Vm::interpret`], so a REPL can feed it one
/// line at a time.
pub struct Vm {
    /// Value stack.
    pub(crate) stack: Vec<Value>,
    /// Call frame stack.
    pub(crate) frames: Vec<CallFrame>,
    /// Global variables.
    pub(crate) globals: Table,
    /// Methods callable on any list, by name.
    pub(crate) list_methods: Table,
    /// Open upvalues, sorted by stack slot, highest last.
    pub(crate) open_upvalues: Vec<ObjRef>,
    /// The interned name of initializer methods.
    pub(crate) init_string: ObjRef,
    pub(crate) heap: Heap,
    /// Values the compiler is holding while it builds functions that are
    /// not yet on the heap.
    pub(crate) compiler_roots: Vec<Value>,
    pub(crate) config: VmConfig,
    /// Output buffer for `print` when `capture_output` is set.
    pub output: Vec<String>,
}

impl Vm {
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        let mut heap = Heap::new(config.initial_gc_threshold, config.log_gc);
        // Allocated before any root exists, so it must not trigger a collection.
        let init_string = heap.insert(Object::String(RotoString::new("init")));
        let init_key = heap.key(init_string);
        heap.strings.set(init_key, Value::Nil);

        let mut vm = Self {
            stack: Vec::with_capacity(STACK_INITIAL_CAPACITY),
            frames: Vec::with_capacity(FRAMES_MAX),
            globals: Table::new(),
            list_methods: Table::new(),
            open_upvalues: Vec::new(),
            init_string,
            heap,
            compiler_roots: Vec::new(),
            config,
            output: Vec::new(),
        };
        natives::install(&mut vm);
        vm
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Compile and run `source`.
    pub fn interpret(&mut self, source: &str) -> InterpretResult {
        InterpretResult::from(&self.run(source))
    }

    /// Compile and run `source`, returning the detailed error on failure.
    ///
    /// Diagnostics are also printed to stderr when `report_errors` is set.
    pub fn run(&mut self, source: &str) -> Result<(), RotoError> {
        let function = match compile(self, source) {
            Ok(function) => function,
            Err(error) => {
                if self.config.report_errors {
                    eprintln!("{}", error);
                }
                return Err(error.into());
            }
        };

        self.execute_script(function).map_err(|error| {
            if self.config.report_errors {
                report_runtime_error(&error);
            }
            error.into()
        })
    }

    fn execute_script(&mut self, function: ObjRef) -> Result<(), RuntimeError> {
        self.push(Value::Obj(function));
        let closure = self.alloc(Object::Closure(Closure {
            function,
            upvalues: Vec::new(),
        }));
        self.pop();
        self.push(Value::Obj(closure));
        self.call_closure(closure, 0)?;
        self.execute()
    }

    /// Bind a host function as a global.
    pub fn define_native(&mut self, name: &'static str, function: NativeFn) {
        // Both stay on the stack until the global holds them.
        let name_obj = self.intern(name);
        self.push(Value::Obj(name_obj));
        let native = self.alloc(Object::Native(Native { name, function }));
        self.push(Value::Obj(native));
        let key = self.heap.key(name_obj);
        self.globals.set(key, Value::Obj(native));
        self.pop();
        self.pop();
    }

    /// Read a global by name.
    pub fn global(&self, name: &str) -> Option<Value> {
        let name = self.heap.find_interned(name, hash_string(name))?;
        self.globals.get(self.heap.key(name))
    }

    /// Render a value the way `print` shows it.
    pub fn display_value(&self, value: Value) -> String {
        self.heap.display_value(value)
    }

    /// Allocate an object, collecting first if the heap is over budget.
    ///
    /// Anything `object` refers to must already be reachable from a root.
    pub(crate) fn alloc(&mut self, object: Object) -> ObjRef {
        let size = object.heap_size();
        if self.config.stress_gc || self.heap.should_collect(size) {
            self.collect_garbage();
        }
        self.heap.insert(object)
    }

    /// Re-charge `obj` after one of its arrays grew, collecting if that
    /// pushed the heap over budget.
    ///
    /// `obj` and anything it now holds must be reachable from a root.
    pub(crate) fn track_growth(&mut self, obj: ObjRef) {
        self.heap.refresh_size(obj);
        if self.config.stress_gc || self.heap.should_collect(0) {
            self.collect_garbage();
        }
    }

    /// Return the interned string with these contents, creating it if needed.
    pub fn intern(&mut self, chars: &str) -> ObjRef {
        let hash = hash_string(chars);
        if let Some(existing) = self.heap.find_interned(chars, hash) {
            return existing;
        }
        let string = self.alloc(Object::String(RotoString {
            chars: chars.into(),
            hash,
        }));
        self.heap.strings.set(StrKey::new(string, hash), Value::Nil);
        string
    }

    // --- Stack ---

    #[inline]
    pub(crate) fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    #[inline]
    pub(crate) fn pop(&mut self) -> Value {
        self.stack.pop().unwrap_or(Value::Nil)
    }

    #[inline]
    pub(crate) fn peek(&self, distance: usize) -> Value {
        self.stack[self.stack.len() - 1 - distance]
    }

    /// Escaped closures keep the last value of every variable they captured.
    fn reset_stack(&mut self) {
        self.close_upvalues(0);
        self.stack.clear();
        self.frames.clear();
        self.open_upvalues.clear();
    }

    /// Build a runtime error with a backtrace of the live frames, then unwind
    /// everything. Must be called before any frame is popped.
    pub(crate) fn runtime_error(&mut self, message: impl Into<String>) -> RuntimeError {
        let trace = self
            .frames
            .iter()
            .rev()
            .map(|frame| {
                let chunk = &self.heap.as_function(frame.function).chunk;
                TraceFrame {
                    line: chunk.get_line(frame.ip.saturating_sub(1)),
                    function: self.heap.function_name(frame.function),
                }
            })
            .collect();
        self.reset_stack();
        RuntimeError::new(message, trace)
    }

    // --- Bytecode reading ---

    #[inline]
    fn frame(&self) -> &CallFrame {
        self.frames.last().expect("no active call frame")
    }

    #[inline]
    fn frame_mut(&mut self) -> &mut CallFrame {
        self.frames.last_mut().expect("no active call frame")
    }

    #[inline]
    pub(crate) fn read_byte(&mut self) -> u8 {
        let frame = self.frames.last_mut().expect("no active call frame");
        let byte = self.heap.as_function(frame.function).chunk.code[frame.ip];
        frame.ip += 1;
        byte
    }

    #[inline]
    fn read_u16(&mut self) -> u16 {
        let hi = self.read_byte();
        let lo = self.read_byte();
        u16::from_be_bytes([hi, lo])
    }

    #[inline]
    pub(crate) fn read_constant(&mut self) -> Value {
        let index = self.read_byte() as usize;
        self.heap.as_function(self.frame().function).chunk.constants[index]
    }

    /// Read a constant operand the compiler guarantees is a string.
    #[inline]
    pub(crate) fn read_string(&mut self) -> ObjRef {
        match self.read_constant() {
            Value::Obj(name) => name,
            other => unreachable!("name operand is not a string: {:?}", other),
        }
    }

    pub(crate) fn string_chars(&self, obj: ObjRef) -> &str {
        &self.heap.as_string(obj).chars
    }

    // --- Dispatch ---

    /// Run the dispatch loop until the outermost frame returns.
    fn execute(&mut self) -> Result<(), RuntimeError> {
        loop {
            if self.config.trace_execution {
                self.trace_instruction();
            }

            let byte = self.read_byte();
            let Some(op) = OpCode::from_u8(byte) else {
                return Err(self.runtime_error(format!("Unknown opcode {}.", byte)));
            };

            match op {
                OpCode::Constant => {
                    let constant = self.read_constant();
                    self.push(constant);
                }
                OpCode::Nil => self.push(Value::Nil),
                OpCode::True => self.push(Value::Bool(true)),
                OpCode::False => self.push(Value::Bool(false)),
                OpCode::Pop => {
                    self.pop();
                }

                OpCode::GetLocal => {
                    let slot = self.read_byte() as usize;
                    let value = self.stack[self.frame().slot_base + slot];
                    self.push(value);
                }
                OpCode::SetLocal => {
                    let slot = self.read_byte() as usize;
                    let base = self.frame().slot_base;
                    let value = self.peek(0);
                    self.stack[base + slot] = value;
                }
                OpCode::GetGlobal => {
                    let name = self.read_string();
                    match self.globals.get(self.heap.key(name)) {
                        Some(value) => self.push(value),
                        None => {
                            let message =
                                format!("Undefined variable '{}'.", self.string_chars(name));
                            return Err(self.runtime_error(message));
                        }
                    }
                }
                OpCode::DefineGlobal => {
                    let name = self.read_string();
                    let key = self.heap.key(name);
                    let value = self.peek(0);
                    self.globals.set(key, value);
                    self.pop();
                }
                OpCode::SetGlobal => {
                    let name = self.read_string();
                    let key = self.heap.key(name);
                    let value = self.peek(0);
                    if self.globals.set(key, value) {
                        // Assignment never creates a global.
                        self.globals.delete(key);
                        let message = format!("Undefined variable '{}'.", self.string_chars(name));
                        return Err(self.runtime_error(message));
                    }
                }
                OpCode::GetUpvalue => {
                    let index = self.read_byte() as usize;
                    let upvalue = self.heap.as_closure(self.frame().closure).upvalues[index];
                    let value = self.read_upvalue(upvalue);
                    self.push(value);
                }
                OpCode::SetUpvalue => {
                    let index = self.read_byte() as usize;
                    let upvalue = self.heap.as_closure(self.frame().closure).upvalues[index];
                    let value = self.peek(0);
                    self.write_upvalue(upvalue, value);
                }

                OpCode::GetProperty => {
                    let name = self.read_string();
                    self.get_property(name)?;
                }
                OpCode::SetProperty => {
                    let name = self.read_string();
                    self.set_property(name)?;
                }
                OpCode::GetSuper => {
                    let name = self.read_string();
                    let superclass = self.pop_class();
                    self.bind_method(superclass, name)?;
                }

                OpCode::Equal => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(Value::Bool(a == b));
                }
                OpCode::Greater => self.comparison_op(|a, b| a > b)?,
                OpCode::Less => self.comparison_op(|a, b| a < b)?,

                OpCode::Add => self.op_add()?,
                OpCode::Subtract => self.arithmetic_op(|a, b| a - b)?,
                OpCode::Multiply => self.arithmetic_op(|a, b| a * b)?,
                OpCode::Divide => self.arithmetic_op(|a, b| a / b)?,
                OpCode::BitwiseAnd => self.bitwise_op(|a, b| a & b)?,
                OpCode::BitwiseOr => self.bitwise_op(|a, b| a | b)?,
                OpCode::BitwiseXor => self.bitwise_op(|a, b| a ^ b)?,
                OpCode::LeftShift => self.bitwise_op(|a, b| a.wrapping_shl(b as u32))?,
                OpCode::RightShift => self.bitwise_op(|a, b| a.wrapping_shr(b as u32))?,
                OpCode::Not => {
                    let value = self.pop();
                    self.push(Value::Bool(value.is_falsey()));
                }
                OpCode::Negate => match self.peek(0) {
                    Value::Number(n) => {
                        self.pop();
                        self.push(Value::Number(-n));
                    }
                    _ => return Err(self.runtime_error("Operand must be a number.")),
                },

                OpCode::Jump => {
                    let offset = self.read_u16() as usize;
                    self.frame_mut().ip += offset;
                }
                OpCode::JumpIfFalse => {
                    let offset = self.read_u16() as usize;
                    if self.peek(0).is_falsey() {
                        self.frame_mut().ip += offset;
                    }
                }
                OpCode::Loop => {
                    let offset = self.read_u16() as usize;
                    self.frame_mut().ip -= offset;
                }

                OpCode::Call => {
                    let arg_count = self.read_byte() as usize;
                    self.call_value(self.peek(arg_count), arg_count)?;
                }
                OpCode::Invoke => {
                    let name = self.read_string();
                    let arg_count = self.read_byte() as usize;
                    self.invoke(name, arg_count)?;
                }
                OpCode::SuperInvoke => {
                    let name = self.read_string();
                    let arg_count = self.read_byte() as usize;
                    let superclass = self.pop_class();
                    self.invoke_from_class(superclass, name, arg_count)?;
                }
                OpCode::Closure => self.make_closure(),
                OpCode::CloseUpvalue => {
                    self.close_upvalues(self.stack.len() - 1);
                    self.pop();
                }
                OpCode::Return => {
                    let result = self.pop();
                    let Some(frame) = self.frames.pop() else {
                        return Ok(());
                    };
                    self.close_upvalues(frame.slot_base);
                    self.stack.truncate(frame.slot_base);

                    if self.frames.is_empty() {
                        return Ok(());
                    }
                    self.push(result);
                }

                OpCode::BuildList => {
                    let count = self.read_byte() as usize;
                    self.build_list(count);
                }
                OpCode::IndexSubscript => self.index_subscript()?,
                OpCode::StoreSubscript => self.store_subscript()?,

                OpCode::Class => {
                    let name = self.read_string();
                    let class = self.alloc(Object::Class(Class {
                        name,
                        methods: Table::new(),
                    }));
                    self.push(Value::Obj(class));
                }
                OpCode::Inherit => self.inherit()?,
                OpCode::Method => {
                    let name = self.read_string();
                    self.define_method(name);
                }
            }
        }
    }

    /// Pop the superclass the compiler left on the stack for `super` access.
    fn pop_class(&mut self) -> ObjRef {
        match self.pop() {
            Value::Obj(class) => class,
            other => unreachable!("superclass slot holds {:?}", other),
        }
    }

    // --- Operators ---

    fn number_operands(&mut self) -> Result<(f64, f64), RuntimeError> {
        match (self.peek(1), self.peek(0)) {
            (Value::Number(a), Value::Number(b)) => {
                self.pop();
                self.pop();
                Ok((a, b))
            }
            _ => Err(self.runtime_error("Operands must be numbers.")),
        }
    }

    fn arithmetic_op(&mut self, op: impl Fn(f64, f64) -> f64) -> Result<(), RuntimeError> {
        let (a, b) = self.number_operands()?;
        self.push(Value::Number(op(a, b)));
        Ok(())
    }

    fn comparison_op(&mut self, op: impl Fn(f64, f64) -> bool) -> Result<(), RuntimeError> {
        let (a, b) = self.number_operands()?;
        self.push(Value::Bool(op(a, b)));
        Ok(())
    }

    /// Both operands are truncated to 32-bit integers first. Shift counts
    /// use their low five bits.
    fn bitwise_op(&mut self, op: impl Fn(i32, i32) -> i32) -> Result<(), RuntimeError> {
        let (a, b) = self.number_operands()?;
        self.push(Value::Number(op(a as i32, b as i32) as f64));
        Ok(())
    }

    fn op_add(&mut self) -> Result<(), RuntimeError> {
        match (self.peek(1), self.peek(0)) {
            (Value::Number(a), Value::Number(b)) => {
                self.pop();
                self.pop();
                self.push(Value::Number(a + b));
                Ok(())
            }
            (Value::Obj(a), Value::Obj(b)) => {
                let (Some(a), Some(b)) = (
                    self.heap.str_value(Value::Obj(a)),
                    self.heap.str_value(Value::Obj(b)),
                ) else {
                    return Err(self.runtime_error("Operands must be two numbers or two strings."));
                };
                let mut joined = String::with_capacity(a.len() + b.len());
                joined.push_str(a);
                joined.push_str(b);
                // Operands stay on the stack until the result exists.
                let result = self.intern(&joined);
                self.pop();
                self.pop();
                self.push(Value::Obj(result));
                Ok(())
            }
            _ => Err(self.runtime_error("Operands must be two numbers or two strings.")),
        }
    }

    // --- Debugging ---

    fn trace_instruction(&self) {
        let mut line = String::from("          ");
        for value in &self.stack {
            line.push_str(&format!("[ {} ]", self.heap.display_value(*value)));
        }
        eprintln!("{}", line);

        let frame = self.frame();
        let chunk = &self.heap.as_function(frame.function).chunk;
        let mut out = String::new();
        disassemble_instruction(&self.heap, chunk, frame.ip, &mut out);
        eprint!("{}", out);
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

fn report_runtime_error(error: &RuntimeError) {
    eprintln!("{}", error.message.red().bold());
    for frame in &error.trace {
        eprintln!("{}", frame.to_string().red());
    }
}
