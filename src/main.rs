//! Roto CLI: execute files, evaluate snippets or run the REPL.

use std::env;
use std::fs;
use std::io::{self, Write};
use std::process;

use colored::Colorize;

use rotolang::config::VmConfig;
use rotolang::vm::{InterpretResult, Vm};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

const VERSION: &str = env!("CARGO_PKG_VERSION");

const EXIT_USAGE: i32 = 64;
const EXIT_COMPILE_ERROR: i32 = 65;
const EXIT_RUNTIME_ERROR: i32 = 70;
const EXIT_IO_ERROR: i32 = 74;

/// CLI command to execute.
enum Command {
    /// Run a script file
    Run { file: String },
    /// Evaluate a string
    Eval { code: String },
    /// Start the REPL
    Repl,
}

fn print_usage() {
    eprintln!("Roto {} - bytecode interpreter", VERSION);
    eprintln!();
    eprintln!("Usage: roto [script.roto]");
    eprintln!("       roto -e <code>");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -e <code>       Evaluate code");
    eprintln!("  --help, -h      Show this help message");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  ROTO_LOG_GC=1        Log every allocation, mark and free");
    eprintln!("  ROTO_STRESS_GC=1     Collect before every allocation");
    eprintln!("  ROTO_TRACE=1         Trace each executed instruction");
    eprintln!("  ROTO_PRINT_CODE=1    Disassemble every compiled function");
    eprintln!("  ROTO_GC_THRESHOLD=N  First collection threshold in bytes");
}

fn parse_args() -> Command {
    let args: Vec<String> = env::args().skip(1).collect();
    let mut command = Command::Repl;

    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];
        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                process::exit(0);
            }
            "-e" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("-e requires a code argument");
                    print_usage();
                    process::exit(EXIT_USAGE);
                }
                command = Command::Eval {
                    code: args[i].clone(),
                };
            }
            _ if arg.starts_with('-') => {
                eprintln!("Unknown option: {}", arg);
                print_usage();
                process::exit(EXIT_USAGE);
            }
            _ => {
                if let Command::Run { .. } = command {
                    eprintln!("Only one script file can be specified");
                    print_usage();
                    process::exit(EXIT_USAGE);
                }
                command = Command::Run { file: arg.clone() };
            }
        }
        i += 1;
    }

    command
}

fn main() {
    match parse_args() {
        Command::Repl => run_repl(),
        Command::Run { file } => run_file(&file),
        Command::Eval { code } => run_source(&code),
    }
}

fn run_file(path: &str) {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("{} Could not read file '{}': {}", "Error:".red().bold(), path, e);
            process::exit(EXIT_IO_ERROR);
        }
    };
    run_source(&source);
}

fn run_source(source: &str) {
    let mut vm = Vm::with_config(VmConfig::from_env());
    match vm.interpret(source) {
        InterpretResult::Ok => {}
        InterpretResult::CompileError => process::exit(EXIT_COMPILE_ERROR),
        InterpretResult::RuntimeError => process::exit(EXIT_RUNTIME_ERROR),
    }
}

/// Line REPL. Globals persist between lines; errors are reported and the
/// session continues.
fn run_repl() {
    println!("{}", format!("Roto {} - REPL", VERSION).bold());
    println!("Type .exit or press Ctrl-D to quit.\n");

    let mut vm = Vm::with_config(VmConfig::from_env());
    let stdin = io::stdin();

    loop {
        print!("> ");
        if io::stdout().flush().is_err() {
            break;
        }

        let mut line = String::new();
        match stdin.read_line(&mut line) {
            Ok(0) => {
                println!();
                break;
            }
            Ok(_) => {
                let line = line.trim_end();
                if line.is_empty() {
                    continue;
                }
                if line == ".exit" || line == "exit" {
                    break;
                }
                vm.interpret(line);
            }
            Err(e) => {
                eprintln!("{} {}", "Error:".red().bold(), e);
                process::exit(EXIT_IO_ERROR);
            }
        }
    }
}
