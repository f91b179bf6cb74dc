//! Single-pass source-to-bytecode compiler.
//!
//! A Pratt parser pulls tokens straight from the scanner and emits bytecode
//! as it goes; there is no syntax tree. Nested function bodies are compiled
//! on an explicit stack of [`FunctionState`] records, and variable resolution
//! happens here: locals become stack slots, captured variables become upvalue
//! indices, everything else is a global looked up by name.

mod classes;
mod exprs;
pub mod precedence;
mod stmts;

#[cfg(test)]
mod tests;

use crate::bytecode::chunk::{Chunk, MAX_CONSTANTS};
use crate::bytecode::disassembler::disassemble_chunk;
use crate::bytecode::instruction::OpCode;
use crate::error::{CompileError, Diagnostic, ErrorLocation};
use crate::lexer::{Scanner, Token, TokenKind};
use crate::vm::object::{Function, Object};
use crate::vm::upvalue::UpvalueDescriptor;
use crate::vm::value::{ObjRef, Value};
use crate::vm::vm::Vm;

use self::precedence::{get_rule, ParseFn, Precedence};

/// Locals and upvalues are addressed with one-byte operands.
const MAX_LOCALS: usize = u8::MAX as usize + 1;
const MAX_UPVALUES: usize = u8::MAX as usize + 1;
/// Parameters, arguments and list literal items.
const MAX_ARGS: usize = u8::MAX as usize;

/// A local variable tracked during compilation.
#[derive(Debug, Clone)]
pub(crate) struct Local<'src> {
    pub name: &'src str,
    /// Scope depth, or -1 while the variable's initializer is compiling.
    pub depth: i32,
    pub is_captured: bool,
}

/// Tracks what kind of function is being compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FunctionType {
    Script,
    Function,
    Method,
    Initializer,
}

/// Compilation state for one function body.
pub(crate) struct FunctionState<'src> {
    pub function: Function,
    pub kind: FunctionType,
    pub locals: Vec<Local<'src>>,
    pub upvalues: Vec<UpvalueDescriptor>,
    pub scope_depth: i32,
    /// Length of `Vm::compiler_roots` when this function started.
    pub roots_mark: usize,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ClassState {
    pub has_superclass: bool,
}

/// How a variable is accessed at runtime.
#[derive(Debug, Clone, Copy)]
pub(crate) enum VariableAccess {
    Local(u8),
    Upvalue(u8),
    Global(u8),
}

/// The compiler: turns source text into a script [`Function`] on the VM heap.
pub(crate) struct Compiler<'src, 'vm> {
    pub vm: &'vm mut Vm,
    scanner: Scanner<'src>,
    pub current: Token<'src>,
    pub previous: Token<'src>,
    had_error: bool,
    panic_mode: bool,
    diagnostics: Vec<Diagnostic>,
    pub functions: Vec<FunctionState<'src>>,
    pub classes: Vec<ClassState>,
}

/// Compile `source` into a script function allocated on `vm`'s heap.
///
/// Every error outside panic mode is collected; if there is any, the
/// function is discarded and the diagnostics are returned instead.
pub fn compile(vm: &mut Vm, source: &str) -> Result<ObjRef, CompileError> {
    let mut compiler = Compiler::new(vm, source);
    compiler.advance();
    while !compiler.match_token(TokenKind::Eof) {
        compiler.declaration();
    }
    let (function, _) = compiler.end_function();
    compiler.vm.compiler_roots.clear();

    if compiler.had_error {
        Err(CompileError::new(compiler.diagnostics))
    } else {
        Ok(function)
    }
}

impl<'src, 'vm> Compiler<'src, 'vm> {
    fn new(vm: &'vm mut Vm, source: &'src str) -> Self {
        let mut compiler = Self {
            vm,
            scanner: Scanner::new(source),
            current: Token::synthetic(""),
            previous: Token::synthetic(""),
            had_error: false,
            panic_mode: false,
            diagnostics: Vec::new(),
            functions: Vec::new(),
            classes: Vec::new(),
        };
        compiler.push_function(FunctionType::Script);
        compiler
    }

    // --- Token stream ---

    pub(crate) fn advance(&mut self) {
        self.previous = self.current;
        loop {
            self.current = self.scanner.scan_token();
            if self.current.kind != TokenKind::Error {
                break;
            }
            let message = self.current.lexeme;
            self.error_at_current(message);
        }
    }

    pub(crate) fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.current.kind == kind {
            self.advance();
        } else {
            self.error_at_current(message);
        }
    }

    pub(crate) fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    pub(crate) fn match_token(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    // --- Errors ---

    pub(crate) fn error(&mut self, message: &str) {
        self.error_at(self.previous, message);
    }

    pub(crate) fn error_at_current(&mut self, message: &str) {
        self.error_at(self.current, message);
    }

    fn error_at(&mut self, token: Token<'src>, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.had_error = true;

        let location = match token.kind {
            TokenKind::Eof => ErrorLocation::End,
            TokenKind::Error => ErrorLocation::Scanner,
            _ => ErrorLocation::Lexeme(token.lexeme.to_string()),
        };
        self.diagnostics
            .push(Diagnostic::new(token.line, location, message));
    }

    /// Skip tokens until a likely statement boundary so one mistake does not
    /// produce a cascade of reports.
    pub(crate) fn synchronize(&mut self) {
        self.panic_mode = false;
        while self.current.kind != TokenKind::Eof {
            if self.previous.kind == TokenKind::Semicolon || self.current.kind.starts_statement() {
                return;
            }
            self.advance();
        }
    }

    pub(crate) fn in_panic_mode(&self) -> bool {
        self.panic_mode
    }

    // --- Chunk helpers ---

    pub(crate) fn state(&mut self) -> &mut FunctionState<'src> {
        self.functions
            .last_mut()
            .expect("no function being compiled")
    }

    pub(crate) fn chunk(&mut self) -> &mut Chunk {
        &mut self.state().function.chunk
    }

    pub(crate) fn emit_byte(&mut self, byte: u8) {
        let line = self.previous.line;
        self.chunk().write(byte, line);
    }

    pub(crate) fn emit_op(&mut self, op: OpCode) {
        self.emit_byte(op as u8);
    }

    pub(crate) fn emit_ops(&mut self, first: OpCode, second: OpCode) {
        self.emit_op(first);
        self.emit_op(second);
    }

    pub(crate) fn emit_op_byte(&mut self, op: OpCode, operand: u8) {
        self.emit_op(op);
        self.emit_byte(operand);
    }

    /// Emit a jump with a placeholder offset; returns the operand's offset.
    pub(crate) fn emit_jump(&mut self, op: OpCode) -> usize {
        self.emit_op(op);
        self.emit_byte(0xff);
        self.emit_byte(0xff);
        self.chunk().code.len() - 2
    }

    /// Point the jump whose operand is at `offset` to the current end of code.
    pub(crate) fn patch_jump(&mut self, offset: usize) {
        let jump = self.chunk().code.len() - offset - 2;
        match u16::try_from(jump) {
            Ok(jump) => self.chunk().patch_u16(offset, jump),
            Err(_) => self.error("Too much code to jump over."),
        }
    }

    pub(crate) fn emit_loop(&mut self, loop_start: usize) {
        self.emit_op(OpCode::Loop);
        let offset = self.chunk().code.len() - loop_start + 2;
        let offset = u16::try_from(offset).unwrap_or_else(|_| {
            self.error("Loop body too large.");
            0
        });
        let [hi, lo] = offset.to_be_bytes();
        self.emit_byte(hi);
        self.emit_byte(lo);
    }

    /// Implicit return: initializers hand back `this`, everything else nil.
    pub(crate) fn emit_return(&mut self) {
        if self.state().kind == FunctionType::Initializer {
            self.emit_op_byte(OpCode::GetLocal, 0);
        } else {
            self.emit_op(OpCode::Nil);
        }
        self.emit_op(OpCode::Return);
    }

    /// Add `value` to the constant pool, reusing an equal entry.
    ///
    /// The value is also registered as a compiler root so a collection
    /// triggered later in this compile cannot free it.
    pub(crate) fn make_constant(&mut self, value: Value) -> u8 {
        let chunk = self.chunk();
        if let Some(index) = chunk.constants.iter().position(|c| *c == value) {
            return index as u8;
        }
        if chunk.constants.len() >= MAX_CONSTANTS {
            self.error("Too many constants in one chunk.");
            return 0;
        }
        let index = chunk.add_constant(value);
        self.vm.compiler_roots.push(value);
        index as u8
    }

    pub(crate) fn emit_constant(&mut self, value: Value) {
        let index = self.make_constant(value);
        self.emit_op_byte(OpCode::Constant, index);
    }

    pub(crate) fn identifier_constant(&mut self, name: &str) -> u8 {
        let string = self.vm.intern(name);
        self.make_constant(Value::Obj(string))
    }

    // --- Functions ---

    /// Start compiling a function body. For everything but the script, the
    /// function is named after the previous token.
    pub(crate) fn push_function(&mut self, kind: FunctionType) {
        let roots_mark = self.vm.compiler_roots.len();
        let name = if kind == FunctionType::Script {
            None
        } else {
            let name = self.vm.intern(self.previous.lexeme);
            self.vm.compiler_roots.push(Value::Obj(name));
            Some(name)
        };

        // Slot 0 holds the callee; in methods it is the receiver.
        let slot_zero = match kind {
            FunctionType::Method | FunctionType::Initializer => "this",
            FunctionType::Script | FunctionType::Function => "",
        };

        self.functions.push(FunctionState {
            function: Function::new(name),
            kind,
            locals: vec![Local {
                name: slot_zero,
                depth: 0,
                is_captured: false,
            }],
            upvalues: Vec::new(),
            scope_depth: 0,
            roots_mark,
        });
    }

    /// Finish the innermost function, move it onto the heap and return it
    /// with the capture list its CLOSURE instruction needs.
    pub(crate) fn end_function(&mut self) -> (ObjRef, Vec<UpvalueDescriptor>) {
        self.emit_return();
        let state = self.functions.pop().expect("no function being compiled");
        let mut function = state.function;
        function.upvalue_count = state.upvalues.len();

        if self.vm.config.print_code && !self.had_error {
            let name = match function.name {
                Some(name) => self.vm.heap.as_string(name).chars.to_string(),
                None => "<script>".to_string(),
            };
            eprint!("{}", disassemble_chunk(&self.vm.heap, &function.chunk, &name));
        }

        // Constants are still rooted while this allocation runs.
        let function = self.vm.alloc(Object::Function(function));
        self.vm.compiler_roots.truncate(state.roots_mark);
        (function, state.upvalues)
    }

    // --- Scopes & variables ---

    pub(crate) fn begin_scope(&mut self) {
        self.state().scope_depth += 1;
    }

    pub(crate) fn end_scope(&mut self) {
        self.state().scope_depth -= 1;
        loop {
            let state = self.state();
            let Some(local) = state.locals.last() else {
                break;
            };
            if local.depth <= state.scope_depth {
                break;
            }
            let op = if local.is_captured {
                OpCode::CloseUpvalue
            } else {
                OpCode::Pop
            };
            state.locals.pop();
            self.emit_op(op);
        }
    }

    pub(crate) fn add_local(&mut self, name: &'src str) {
        if self.state().locals.len() == MAX_LOCALS {
            self.error("Too many local variables in function.");
            return;
        }
        self.state().locals.push(Local {
            name,
            depth: -1,
            is_captured: false,
        });
    }

    /// Record the previous token as a new local in the current scope.
    /// Globals are late-bound and need no declaration.
    pub(crate) fn declare_variable(&mut self) {
        if self.state().scope_depth == 0 {
            return;
        }
        let name = self.previous.lexeme;
        let state = self.state();
        let scope_depth = state.scope_depth;
        let duplicate = state
            .locals
            .iter()
            .rev()
            .take_while(|local| local.depth == -1 || local.depth >= scope_depth)
            .any(|local| local.name == name);
        if duplicate {
            self.error("Already a variable with this name in this scope.");
        }
        self.add_local(name);
    }

    /// Consume a variable name; returns its name constant for globals.
    pub(crate) fn parse_variable(&mut self, message: &str) -> u8 {
        self.consume(TokenKind::Identifier, message);
        self.declare_variable();
        if self.state().scope_depth > 0 {
            return 0;
        }
        let name = self.previous.lexeme;
        self.identifier_constant(name)
    }

    pub(crate) fn mark_initialized(&mut self) {
        let state = self.state();
        if state.scope_depth == 0 {
            return;
        }
        let depth = state.scope_depth;
        if let Some(local) = state.locals.last_mut() {
            local.depth = depth;
        }
    }

    pub(crate) fn define_variable(&mut self, global: u8) {
        if self.state().scope_depth > 0 {
            self.mark_initialized();
            return;
        }
        self.emit_op_byte(OpCode::DefineGlobal, global);
    }

    fn resolve_local(&mut self, level: usize, name: &str) -> Option<u8> {
        let position = self.functions[level]
            .locals
            .iter()
            .rposition(|local| local.name == name)?;
        if self.functions[level].locals[position].depth == -1 {
            self.error("Can't read local variable in its own initializer.");
        }
        Some(position as u8)
    }

    /// Resolve `name` as a variable captured by the function at `level`,
    /// threading the capture through every function in between.
    fn resolve_upvalue(&mut self, level: usize, name: &str) -> Option<u8> {
        if level == 0 {
            return None;
        }
        let enclosing = level - 1;
        if let Some(local) = self.resolve_local(enclosing, name) {
            self.functions[enclosing].locals[local as usize].is_captured = true;
            return Some(self.add_upvalue(level, local, true));
        }
        let upvalue = self.resolve_upvalue(enclosing, name)?;
        Some(self.add_upvalue(level, upvalue, false))
    }

    fn add_upvalue(&mut self, level: usize, index: u8, is_local: bool) -> u8 {
        let descriptor = UpvalueDescriptor { is_local, index };
        let upvalues = &self.functions[level].upvalues;
        if let Some(existing) = upvalues.iter().position(|u| *u == descriptor) {
            return existing as u8;
        }
        if upvalues.len() == MAX_UPVALUES {
            self.error("Too many closure variables in function.");
            return 0;
        }
        self.functions[level].upvalues.push(descriptor);
        (self.functions[level].upvalues.len() - 1) as u8
    }

    pub(crate) fn resolve_variable(&mut self, name: &str) -> VariableAccess {
        let level = self.functions.len() - 1;
        if let Some(slot) = self.resolve_local(level, name) {
            VariableAccess::Local(slot)
        } else if let Some(index) = self.resolve_upvalue(level, name) {
            VariableAccess::Upvalue(index)
        } else {
            VariableAccess::Global(self.identifier_constant(name))
        }
    }

    // --- Pratt driver ---

    pub(crate) fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    pub(crate) fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let Some(prefix) = get_rule(self.previous.kind).prefix else {
            self.error("Expect expression.");
            return;
        };

        let can_assign = precedence <= Precedence::Assignment;
        self.apply(prefix, can_assign);

        while precedence <= get_rule(self.current.kind).precedence {
            self.advance();
            if let Some(infix) = get_rule(self.previous.kind).infix {
                self.apply(infix, can_assign);
            }
        }

        if can_assign && self.match_token(TokenKind::Equal) {
            self.error("Invalid assignment target.");
        }
    }

    fn apply(&mut self, parse_fn: ParseFn, can_assign: bool) {
        match parse_fn {
            ParseFn::Grouping => self.grouping(),
            ParseFn::Call => self.call(),
            ParseFn::List => self.list(),
            ParseFn::Subscript => self.subscript(can_assign),
            ParseFn::Dot => self.dot(can_assign),
            ParseFn::Unary => self.unary(),
            ParseFn::Binary => self.binary(),
            ParseFn::Variable => self.variable(can_assign),
            ParseFn::String => self.string(),
            ParseFn::Number => self.number(),
            ParseFn::Literal => self.literal(),
            ParseFn::And => self.and(),
            ParseFn::Or => self.or(),
            ParseFn::Super => self.super_(),
            ParseFn::This => self.this(),
        }
    }
}
