//! Operator precedence and the Pratt parse-rule table.

use crate::lexer::TokenKind;

/// Operator precedence levels (higher = tighter binding).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    None,
    Assignment, // =
    Or,         // or
    And,        // and
    Equality,   // == !=
    Comparison, // < > <= >=
    BitwiseOr,  // |
    BitwiseXor, // ^
    BitwiseAnd, // &
    Shift,      // << >>
    Term,       // + -
    Factor,     // * /
    Unary,      // ! -
    Call,       // . () []
    Primary,
}

impl Precedence {
    /// The next tighter level; used for the right operand of a
    /// left-associative binary operator.
    pub fn next(self) -> Precedence {
        match self {
            Precedence::None => Precedence::Assignment,
            Precedence::Assignment => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Equality,
            Precedence::Equality => Precedence::Comparison,
            Precedence::Comparison => Precedence::BitwiseOr,
            Precedence::BitwiseOr => Precedence::BitwiseXor,
            Precedence::BitwiseXor => Precedence::BitwiseAnd,
            Precedence::BitwiseAnd => Precedence::Shift,
            Precedence::Shift => Precedence::Term,
            Precedence::Term => Precedence::Factor,
            Precedence::Factor => Precedence::Unary,
            Precedence::Unary => Precedence::Call,
            Precedence::Call => Precedence::Primary,
            Precedence::Primary => Precedence::Primary,
        }
    }
}

/// Which handler parses a construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseFn {
    Grouping,
    Call,
    List,
    Subscript,
    Dot,
    Unary,
    Binary,
    Variable,
    String,
    Number,
    Literal,
    And,
    Or,
    Super,
    This,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseRule {
    pub prefix: Option<ParseFn>,
    pub infix: Option<ParseFn>,
    pub precedence: Precedence,
}

const fn rule(prefix: Option<ParseFn>, infix: Option<ParseFn>, precedence: Precedence) -> ParseRule {
    ParseRule {
        prefix,
        infix,
        precedence,
    }
}

/// The parse rule for a token kind.
pub fn get_rule(kind: TokenKind) -> ParseRule {
    use ParseFn as F;
    use Precedence as P;

    match kind {
        TokenKind::LeftParen => rule(Some(F::Grouping), Some(F::Call), P::Call),
        TokenKind::LeftBracket => rule(Some(F::List), Some(F::Subscript), P::Call),
        TokenKind::Dot => rule(None, Some(F::Dot), P::Call),
        TokenKind::Minus => rule(Some(F::Unary), Some(F::Binary), P::Term),
        TokenKind::Plus => rule(None, Some(F::Binary), P::Term),
        TokenKind::Slash | TokenKind::Star => rule(None, Some(F::Binary), P::Factor),
        TokenKind::Bang => rule(Some(F::Unary), None, P::None),
        TokenKind::BangEqual | TokenKind::EqualEqual => rule(None, Some(F::Binary), P::Equality),
        TokenKind::Greater
        | TokenKind::GreaterEqual
        | TokenKind::Less
        | TokenKind::LessEqual => rule(None, Some(F::Binary), P::Comparison),
        TokenKind::Pipe => rule(None, Some(F::Binary), P::BitwiseOr),
        TokenKind::Caret => rule(None, Some(F::Binary), P::BitwiseXor),
        TokenKind::Ampersand => rule(None, Some(F::Binary), P::BitwiseAnd),
        TokenKind::LessLess | TokenKind::GreaterGreater => rule(None, Some(F::Binary), P::Shift),
        TokenKind::Identifier => rule(Some(F::Variable), None, P::None),
        TokenKind::String => rule(Some(F::String), None, P::None),
        TokenKind::Number => rule(Some(F::Number), None, P::None),
        TokenKind::And => rule(None, Some(F::And), P::And),
        TokenKind::Or => rule(None, Some(F::Or), P::Or),
        TokenKind::False | TokenKind::Nil | TokenKind::True => rule(Some(F::Literal), None, P::None),
        TokenKind::Super => rule(Some(F::Super), None, P::None),
        TokenKind::This => rule(Some(F::This), None, P::None),
        _ => rule(None, None, P::None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_are_ordered() {
        let mut level = Precedence::None;
        while level != Precedence::Primary {
            let next = level.next();
            assert!(next > level);
            level = next;
        }
        assert_eq!(Precedence::Primary.next(), Precedence::Primary);
    }

    #[test]
    fn test_bitwise_sits_between_comparison_and_term() {
        let comparison = get_rule(TokenKind::Less).precedence;
        let term = get_rule(TokenKind::Plus).precedence;
        for kind in [
            TokenKind::Pipe,
            TokenKind::Caret,
            TokenKind::Ampersand,
            TokenKind::LessLess,
        ] {
            let level = get_rule(kind).precedence;
            assert!(comparison < level && level < term, "{:?}", kind);
        }
    }

    #[test]
    fn test_statement_tokens_have_no_rule() {
        let semicolon = get_rule(TokenKind::Semicolon);
        assert_eq!(semicolon.prefix, None);
        assert_eq!(semicolon.infix, None);
        assert_eq!(semicolon.precedence, Precedence::None);
    }
}
