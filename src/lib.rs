//! Rotolang: a small dynamically-typed, class-based scripting language.
//!
//! This is the library root that exports all modules.
//!
//! # Pipeline
//!
//! - **Scanner**: source text to tokens, on demand
//! - **Compiler**: single-pass Pratt parser emitting bytecode directly
//! - **VM**: stack machine with closures, classes, lists and a mark-sweep GC
//!
//! ```no_run
//! use rotolang::vm::{InterpretResult, Vm};
//!
//! let mut vm = Vm::new();
//! assert_eq!(vm.interpret("print(1 + 2 * 3);"), InterpretResult::Ok);
//! ```

#![allow(clippy::module_inception)]
#![allow(clippy::result_large_err)]
#![allow(clippy::new_without_default)]
#![allow(clippy::unnecessary_cast)]

pub mod bytecode;
pub mod compiler;
pub mod config;
pub mod error;
pub mod lexer;
pub mod vm;

pub use config::VmConfig;
pub use error::RotoError;
pub use vm::{InterpretResult, Vm};

/// Run a program on a fresh VM configured from the environment.
pub fn run(source: &str) -> Result<(), RotoError> {
    Vm::with_config(VmConfig::from_env()).run(source)
}
