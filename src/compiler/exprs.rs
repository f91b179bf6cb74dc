//! Expression handlers for the Pratt parser.

use crate::bytecode::instruction::OpCode;
use crate::lexer::TokenKind;
use crate::vm::value::Value;

use super::precedence::{get_rule, Precedence};
use super::{Compiler, VariableAccess, MAX_ARGS};

impl<'src, 'vm> Compiler<'src, 'vm> {
    // --- Literals ---

    pub(super) fn number(&mut self) {
        let digits: String = self.previous.lexeme.chars().filter(|&c| c != '_').collect();
        match digits.parse::<f64>() {
            Ok(value) => self.emit_constant(Value::Number(value)),
            Err(_) => self.error("Invalid number literal."),
        }
    }

    pub(super) fn string(&mut self) {
        let lexeme = self.previous.lexeme;
        let contents = &lexeme[1..lexeme.len() - 1];
        let string = self.vm.intern(contents);
        self.emit_constant(Value::Obj(string));
    }

    pub(super) fn literal(&mut self) {
        match self.previous.kind {
            TokenKind::False => self.emit_op(OpCode::False),
            TokenKind::Nil => self.emit_op(OpCode::Nil),
            TokenKind::True => self.emit_op(OpCode::True),
            _ => unreachable!("literal rule on a non-literal token"),
        }
    }

    /// `[a, b, c]`, trailing comma allowed.
    pub(super) fn list(&mut self) {
        let mut count = 0usize;
        if !self.check(TokenKind::RightBracket) {
            loop {
                if self.check(TokenKind::RightBracket) {
                    break;
                }
                self.parse_precedence(Precedence::Or);
                if count == MAX_ARGS {
                    self.error("Can't have more than 255 items in a list literal.");
                }
                count += 1;
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightBracket, "Expect ']' after list literal.");
        self.emit_op_byte(OpCode::BuildList, count.min(MAX_ARGS) as u8);
    }

    // --- Operators ---

    pub(super) fn grouping(&mut self) {
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after expression.");
    }

    pub(super) fn unary(&mut self) {
        let operator = self.previous.kind;
        self.parse_precedence(Precedence::Unary);
        match operator {
            TokenKind::Bang => self.emit_op(OpCode::Not),
            TokenKind::Minus => self.emit_op(OpCode::Negate),
            _ => unreachable!("unary rule on {:?}", operator),
        }
    }

    pub(super) fn binary(&mut self) {
        let operator = self.previous.kind;
        let precedence = get_rule(operator).precedence;
        self.parse_precedence(precedence.next());

        match operator {
            TokenKind::BangEqual => self.emit_ops(OpCode::Equal, OpCode::Not),
            TokenKind::EqualEqual => self.emit_op(OpCode::Equal),
            TokenKind::Greater => self.emit_op(OpCode::Greater),
            TokenKind::GreaterEqual => self.emit_ops(OpCode::Less, OpCode::Not),
            TokenKind::Less => self.emit_op(OpCode::Less),
            TokenKind::LessEqual => self.emit_ops(OpCode::Greater, OpCode::Not),
            TokenKind::Plus => self.emit_op(OpCode::Add),
            TokenKind::Minus => self.emit_op(OpCode::Subtract),
            TokenKind::Star => self.emit_op(OpCode::Multiply),
            TokenKind::Slash => self.emit_op(OpCode::Divide),
            TokenKind::Ampersand => self.emit_op(OpCode::BitwiseAnd),
            TokenKind::Pipe => self.emit_op(OpCode::BitwiseOr),
            TokenKind::Caret => self.emit_op(OpCode::BitwiseXor),
            TokenKind::LessLess => self.emit_op(OpCode::LeftShift),
            TokenKind::GreaterGreater => self.emit_op(OpCode::RightShift),
            _ => unreachable!("binary rule on {:?}", operator),
        }
    }

    /// Short-circuit: the left operand stays as the result when falsey.
    pub(super) fn and(&mut self) {
        let end_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::And);
        self.patch_jump(end_jump);
    }

    pub(super) fn or(&mut self) {
        let else_jump = self.emit_jump(OpCode::JumpIfFalse);
        let end_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(else_jump);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::Or);
        self.patch_jump(end_jump);
    }

    // --- Calls, properties, subscripts ---

    pub(super) fn call(&mut self) {
        let arg_count = self.argument_list();
        self.emit_op_byte(OpCode::Call, arg_count);
    }

    pub(super) fn argument_list(&mut self) -> u8 {
        let mut count = 0usize;
        if !self.check(TokenKind::RightParen) {
            loop {
                self.expression();
                if count == MAX_ARGS {
                    self.error("Can't have more than 255 arguments.");
                }
                count += 1;
                if !self.match_token(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after arguments.");
        count.min(MAX_ARGS) as u8
    }

    pub(super) fn dot(&mut self, can_assign: bool) {
        self.consume(TokenKind::Identifier, "Expect property name after '.'.");
        let name = self.previous.lexeme;
        let name = self.identifier_constant(name);

        if can_assign && self.match_token(TokenKind::Equal) {
            self.expression();
            self.emit_op_byte(OpCode::SetProperty, name);
        } else if self.match_token(TokenKind::LeftParen) {
            let arg_count = self.argument_list();
            self.emit_op_byte(OpCode::Invoke, name);
            self.emit_byte(arg_count);
        } else {
            self.emit_op_byte(OpCode::GetProperty, name);
        }
    }

    pub(super) fn subscript(&mut self, can_assign: bool) {
        self.parse_precedence(Precedence::Or);
        self.consume(TokenKind::RightBracket, "Expect ']' after index.");

        if can_assign && self.match_token(TokenKind::Equal) {
            self.expression();
            self.emit_op(OpCode::StoreSubscript);
        } else {
            self.emit_op(OpCode::IndexSubscript);
        }
    }

    // --- Variables ---

    pub(super) fn variable(&mut self, can_assign: bool) {
        let name = self.previous.lexeme;
        self.named_variable(name, can_assign);
    }

    pub(super) fn named_variable(&mut self, name: &str, can_assign: bool) {
        let (get_op, set_op, operand) = match self.resolve_variable(name) {
            VariableAccess::Local(slot) => (OpCode::GetLocal, OpCode::SetLocal, slot),
            VariableAccess::Upvalue(index) => (OpCode::GetUpvalue, OpCode::SetUpvalue, index),
            VariableAccess::Global(name) => (OpCode::GetGlobal, OpCode::SetGlobal, name),
        };

        if can_assign && self.match_token(TokenKind::Equal) {
            self.expression();
            self.emit_op_byte(set_op, operand);
        } else {
            self.emit_op_byte(get_op, operand);
        }
    }

    pub(super) fn this(&mut self) {
        if self.classes.is_empty() {
            self.error("Can't use 'this' outside of a class.");
            return;
        }
        self.variable(false);
    }

    /// `super.name` or `super.name(args)`: push `this`, then the superclass
    /// from the synthetic `super` variable.
    pub(super) fn super_(&mut self) {
        match self.classes.last() {
            None => self.error("Can't use 'super' outside of a class."),
            Some(class) if !class.has_superclass => {
                self.error("Can't use 'super' in a class with no superclass.")
            }
            Some(_) => {}
        }

        self.consume(TokenKind::Dot, "Expect '.' after 'super'.");
        self.consume(TokenKind::Identifier, "Expect superclass method name.");
        let name = self.previous.lexeme;
        let name = self.identifier_constant(name);

        self.named_variable("this", false);
        if self.match_token(TokenKind::LeftParen) {
            let arg_count = self.argument_list();
            self.named_variable("super", false);
            self.emit_op_byte(OpCode::SuperInvoke, name);
            self.emit_byte(arg_count);
        } else {
            self.named_variable("super", false);
            self.emit_op_byte(OpCode::GetSuper, name);
        }
    }
}
