//! Error types for compilation and execution.

use std::fmt;

use thiserror::Error;

/// Where a compile diagnostic points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorLocation {
    /// At a token with the given lexeme.
    Lexeme(String),
    /// At the end of the input.
    End,
    /// Reported by the scanner; the message already describes the problem.
    Scanner,
}

/// A single compile error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub line: usize,
    pub location: ErrorLocation,
    pub message: String,
}

impl Diagnostic {
    pub fn new(line: usize, location: ErrorLocation, message: impl Into<String>) -> Self {
        Self {
            line,
            location,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[line {}] Error", self.line)?;
        match &self.location {
            ErrorLocation::Lexeme(lexeme) => write!(f, " at '{}'", lexeme)?,
            ErrorLocation::End => write!(f, " at end")?,
            ErrorLocation::Scanner => {}
        }
        write!(f, ": {}", self.message)
    }
}

/// Compilation failed. Holds every diagnostic reported outside panic mode.
#[derive(Debug, Clone, Error)]
#[error("{}", render_lines(.diagnostics))]
pub struct CompileError {
    pub diagnostics: Vec<Diagnostic>,
}

impl CompileError {
    pub fn new(diagnostics: Vec<Diagnostic>) -> Self {
        Self { diagnostics }
    }

    /// The first reported message, without location.
    pub fn first_message(&self) -> Option<&str> {
        self.diagnostics.first().map(|d| d.message.as_str())
    }
}

/// One line of a runtime backtrace, innermost frame first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceFrame {
    pub line: usize,
    /// `None` for top-level script code.
    pub function: Option<String>,
}

impl fmt::Display for TraceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.function {
            Some(name) => write!(f, "[line {}] in {}()", self.line, name),
            None => write!(f, "[line {}] in script", self.line),
        }
    }
}

/// Execution aborted.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct RuntimeError {
    pub message: String,
    pub trace: Vec<TraceFrame>,
}

impl RuntimeError {
    pub fn new(message: impl Into<String>, trace: Vec<TraceFrame>) -> Self {
        Self {
            message: message.into(),
            trace,
        }
    }

    /// Line of the innermost frame, if the error happened inside a frame.
    pub fn line(&self) -> Option<usize> {
        self.trace.first().map(|frame| frame.line)
    }
}

/// Unified error type.
#[derive(Debug, Error)]
pub enum RotoError {
    #[error("{0}")]
    Compile(#[from] CompileError),

    #[error("{0}")]
    Runtime(#[from] RuntimeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn render_lines<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}
