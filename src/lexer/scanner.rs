//! On-demand scanner for Roto source code.

use crate::lexer::token::{Token, TokenKind};

/// Turns source text into tokens, one at a time.
///
/// The scanner never allocates: every token borrows its lexeme from the
/// source. Malformed input produces a [`TokenKind::Error`] token and scanning
/// continues after it.
pub struct Scanner<'src> {
    source: &'src str,
    start: usize,
    current: usize,
    line: usize,
}

impl<'src> Scanner<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            source,
            start: 0,
            current: 0,
            line: 1,
        }
    }

    /// Scan the next token. Returns `Eof` forever once the input is exhausted.
    pub fn scan_token(&mut self) -> Token<'src> {
        self.skip_whitespace();
        self.start = self.current;

        let Some(c) = self.advance() else {
            return self.make_token(TokenKind::Eof);
        };

        if is_alpha(c) {
            return self.identifier();
        }
        if c.is_ascii_digit() {
            return self.number();
        }

        match c {
            b'(' => self.make_token(TokenKind::LeftParen),
            b')' => self.make_token(TokenKind::RightParen),
            b'{' => self.make_token(TokenKind::LeftBrace),
            b'}' => self.make_token(TokenKind::RightBrace),
            b'[' => self.make_token(TokenKind::LeftBracket),
            b']' => self.make_token(TokenKind::RightBracket),
            b';' => self.make_token(TokenKind::Semicolon),
            b',' => self.make_token(TokenKind::Comma),
            b'.' => self.make_token(TokenKind::Dot),
            b'-' => self.make_token(TokenKind::Minus),
            b'+' => self.make_token(TokenKind::Plus),
            b'/' => self.make_token(TokenKind::Slash),
            b'*' => self.make_token(TokenKind::Star),
            b'&' => self.make_token(TokenKind::Ampersand),
            b'|' => self.make_token(TokenKind::Pipe),
            b'^' => self.make_token(TokenKind::Caret),
            b'!' => {
                let kind = if self.match_char(b'=') {
                    TokenKind::BangEqual
                } else {
                    TokenKind::Bang
                };
                self.make_token(kind)
            }
            b'=' => {
                let kind = if self.match_char(b'=') {
                    TokenKind::EqualEqual
                } else {
                    TokenKind::Equal
                };
                self.make_token(kind)
            }
            b'<' => {
                let kind = if self.match_char(b'=') {
                    TokenKind::LessEqual
                } else if self.match_char(b'<') {
                    TokenKind::LessLess
                } else {
                    TokenKind::Less
                };
                self.make_token(kind)
            }
            b'>' => {
                let kind = if self.match_char(b'=') {
                    TokenKind::GreaterEqual
                } else if self.match_char(b'>') {
                    TokenKind::GreaterGreater
                } else {
                    TokenKind::Greater
                };
                self.make_token(kind)
            }
            b'"' => self.string(),
            _ => {
                // Swallow the rest of a multi-byte character so the next token
                // starts on a char boundary.
                while !self.is_at_end() && !self.source.is_char_boundary(self.current) {
                    self.current += 1;
                }
                self.error_token("Unexpected character.")
            }
        }
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    fn advance(&mut self) -> Option<u8> {
        let c = *self.source.as_bytes().get(self.current)?;
        self.current += 1;
        Some(c)
    }

    fn peek(&self) -> Option<u8> {
        self.source.as_bytes().get(self.current).copied()
    }

    fn peek_next(&self) -> Option<u8> {
        self.source.as_bytes().get(self.current + 1).copied()
    }

    fn match_char(&mut self, expected: u8) -> bool {
        if self.peek() == Some(expected) {
            self.current += 1;
            true
        } else {
            false
        }
    }

    fn make_token(&self, kind: TokenKind) -> Token<'src> {
        Token::new(kind, &self.source[self.start..self.current], self.line)
    }

    fn error_token(&self, message: &'static str) -> Token<'src> {
        Token::new(TokenKind::Error, message, self.line)
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            match c {
                b' ' | b'\r' | b'\t' => {
                    self.current += 1;
                }
                b'\n' => {
                    self.line += 1;
                    self.current += 1;
                }
                b'/' if self.peek_next() == Some(b'/') => {
                    while self.peek().is_some_and(|c| c != b'\n') {
                        self.current += 1;
                    }
                }
                _ => return,
            }
        }
    }

    fn identifier(&mut self) -> Token<'src> {
        while self.peek().is_some_and(|c| is_alpha(c) || c.is_ascii_digit()) {
            self.current += 1;
        }
        let text = &self.source[self.start..self.current];
        self.make_token(TokenKind::keyword(text).unwrap_or(TokenKind::Identifier))
    }

    /// Digits may be grouped with `_` (`1_000_000`); the compiler strips the
    /// separators before converting.
    fn number(&mut self) -> Token<'src> {
        while self.peek().is_some_and(|c| c.is_ascii_digit() || c == b'_') {
            self.current += 1;
        }

        if self.peek() == Some(b'.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            self.current += 1;
            while self.peek().is_some_and(|c| c.is_ascii_digit() || c == b'_') {
                self.current += 1;
            }
        }

        self.make_token(TokenKind::Number)
    }

    fn string(&mut self) -> Token<'src> {
        while let Some(c) = self.peek() {
            if c == b'"' {
                break;
            }
            if c == b'\n' {
                self.line += 1;
            }
            self.current += 1;
        }

        if self.is_at_end() {
            return self.error_token("Unterminated string.");
        }

        // The closing quote.
        self.current += 1;
        self.make_token(TokenKind::String)
    }
}

fn is_alpha(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let mut scanner = Scanner::new(source);
        let mut kinds = Vec::new();
        loop {
            let token = scanner.scan_token();
            kinds.push(token.kind);
            if token.kind == TokenKind::Eof {
                break;
            }
        }
        kinds
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("<< >> <= >= != == & | ^"),
            vec![
                TokenKind::LessLess,
                TokenKind::GreaterGreater,
                TokenKind::LessEqual,
                TokenKind::GreaterEqual,
                TokenKind::BangEqual,
                TokenKind::EqualEqual,
                TokenKind::Ampersand,
                TokenKind::Pipe,
                TokenKind::Caret,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_keywords_and_identifiers() {
        assert_eq!(
            kinds("class classy fun funny this _x"),
            vec![
                TokenKind::Class,
                TokenKind::Identifier,
                TokenKind::Fun,
                TokenKind::Identifier,
                TokenKind::This,
                TokenKind::Identifier,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_number_with_separators() {
        let mut scanner = Scanner::new("1_000.5_0 3.");
        let token = scanner.scan_token();
        assert_eq!(token.kind, TokenKind::Number);
        assert_eq!(token.lexeme, "1_000.5_0");
        // A trailing dot is not part of the number.
        assert_eq!(scanner.scan_token().lexeme, "3");
        assert_eq!(scanner.scan_token().kind, TokenKind::Dot);
    }

    #[test]
    fn test_multiline_string_tracks_lines() {
        let mut scanner = Scanner::new("\"a\nb\" x");
        let string = scanner.scan_token();
        assert_eq!(string.kind, TokenKind::String);
        assert_eq!(string.lexeme, "\"a\nb\"");
        let ident = scanner.scan_token();
        assert_eq!(ident.line, 2);
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(
            kinds("// nothing here\nnil // trailing"),
            vec![TokenKind::Nil, TokenKind::Eof]
        );
    }

    #[test]
    fn test_error_tokens() {
        let mut scanner = Scanner::new("\"open");
        let token = scanner.scan_token();
        assert_eq!(token.kind, TokenKind::Error);
        assert_eq!(token.lexeme, "Unterminated string.");

        let mut scanner = Scanner::new("@ é nil");
        assert_eq!(scanner.scan_token().lexeme, "Unexpected character.");
        assert_eq!(scanner.scan_token().lexeme, "Unexpected character.");
        assert_eq!(scanner.scan_token().kind, TokenKind::Nil);
    }
}
