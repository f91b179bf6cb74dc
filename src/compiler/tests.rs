use pretty_assertions::assert_eq;

use super::compile;
use crate::bytecode::instruction::OpCode;
use crate::config::VmConfig;
use crate::error::CompileError;
use crate::vm::object::Object;
use crate::vm::value::Value;
use crate::vm::vm::Vm;

fn script_code(source: &str) -> (Vec<u8>, Vec<Value>) {
    let mut vm = Vm::with_config(VmConfig::captured());
    let script = compile(&mut vm, source).expect("source compiles");
    let chunk = &vm.heap().as_function(script).chunk;
    (chunk.code.clone(), chunk.constants.clone())
}

fn compile_error(source: &str) -> CompileError {
    let mut vm = Vm::with_config(VmConfig::captured());
    match compile(&mut vm, source) {
        Ok(_) => panic!("expected a compile error for {:?}", source),
        Err(error) => error,
    }
}

fn first_message(source: &str) -> String {
    compile_error(source)
        .first_message()
        .unwrap_or_default()
        .to_string()
}

fn op(op: OpCode) -> u8 {
    op as u8
}

#[test]
fn test_arithmetic_expression_statement() {
    let (code, constants) = script_code("1 + 2;");
    assert_eq!(
        code,
        vec![
            op(OpCode::Constant),
            0,
            op(OpCode::Constant),
            1,
            op(OpCode::Add),
            op(OpCode::Pop),
            op(OpCode::Nil),
            op(OpCode::Return),
        ]
    );
    assert_eq!(constants, vec![Value::Number(1.0), Value::Number(2.0)]);
}

#[test]
fn test_factor_binds_tighter_than_term() {
    let (code, _) = script_code("1 + 2 * 3;");
    assert_eq!(
        &code[..8],
        &[
            op(OpCode::Constant),
            0,
            op(OpCode::Constant),
            1,
            op(OpCode::Constant),
            2,
            op(OpCode::Multiply),
            op(OpCode::Add),
        ]
    );
}

#[test]
fn test_derived_comparisons() {
    let (code, _) = script_code("1 <= 2;");
    assert_eq!(&code[4..6], &[op(OpCode::Greater), op(OpCode::Not)]);
    let (code, _) = script_code("1 >= 2;");
    assert_eq!(&code[4..6], &[op(OpCode::Less), op(OpCode::Not)]);
    let (code, _) = script_code("1 != 2;");
    assert_eq!(&code[4..6], &[op(OpCode::Equal), op(OpCode::Not)]);
}

#[test]
fn test_constants_are_reused() {
    let (code, constants) = script_code("var x = 1 + 1;");
    assert_eq!(constants.len(), 2);
    assert_eq!(constants[1], Value::Number(1.0));
    assert_eq!(
        code,
        vec![
            op(OpCode::Constant),
            1,
            op(OpCode::Constant),
            1,
            op(OpCode::Add),
            op(OpCode::DefineGlobal),
            0,
            op(OpCode::Nil),
            op(OpCode::Return),
        ]
    );
}

#[test]
fn test_number_separators() {
    let (_, constants) = script_code("1_000_000;");
    assert_eq!(constants, vec![Value::Number(1_000_000.0)]);
}

#[test]
fn test_locals_use_stack_slots() {
    let (code, _) = script_code("{ var a = 1; a; }");
    assert_eq!(
        code,
        vec![
            op(OpCode::Constant),
            0,
            op(OpCode::GetLocal),
            1,
            op(OpCode::Pop),
            op(OpCode::Pop),
            op(OpCode::Nil),
            op(OpCode::Return),
        ]
    );
}

#[test]
fn test_captured_local_is_closed_at_scope_end() {
    let (code, _) = script_code("{ var a = 1; fun f() { return a; } }");
    let tail = &code[code.len() - 4..];
    assert_eq!(
        tail,
        &[
            op(OpCode::Pop),
            op(OpCode::CloseUpvalue),
            op(OpCode::Nil),
            op(OpCode::Return),
        ]
    );
}

#[test]
fn test_list_literal_allows_trailing_comma() {
    let (code, _) = script_code("[1, 2, 3,];");
    assert_eq!(&code[6..8], &[op(OpCode::BuildList), 3]);
    let (code, _) = script_code("[];");
    assert_eq!(&code[..2], &[op(OpCode::BuildList), 0]);
}

#[test]
fn test_function_constant() {
    let mut vm = Vm::with_config(VmConfig::captured());
    let script = compile(&mut vm, "fun add(a, b) { return a + b; }").expect("source compiles");
    let constants = vm.heap().as_function(script).chunk.constants.clone();

    let function = constants
        .iter()
        .find_map(|value| match value {
            Value::Obj(obj) => match vm.heap().get(*obj) {
                Object::Function(function) => Some(function),
                _ => None,
            },
            _ => None,
        })
        .expect("function constant");
    assert_eq!(function.arity, 2);
    assert_eq!(function.upvalue_count, 0);
    let name = function.name.expect("named function");
    assert_eq!(&*vm.heap().as_string(name).chars, "add");
}

#[test]
fn test_invalid_assignment_target() {
    let error = compile_error("1 = 2;");
    assert_eq!(
        error.to_string(),
        "[line 1] Error at '=': Invalid assignment target."
    );
}

#[test]
fn test_error_at_end() {
    let error = compile_error("var x = 1");
    assert_eq!(
        error.to_string(),
        "[line 1] Error at end: Expect ';' after variable declaration."
    );
}

#[test]
fn test_scanner_error() {
    let error = compile_error("\n@");
    assert_eq!(error.to_string(), "[line 2] Error: Unexpected character.");
}

#[test]
fn test_panic_mode_reports_once_per_statement() {
    let error = compile_error("var 1; var 2;");
    assert_eq!(error.diagnostics.len(), 2);
    assert!(error
        .diagnostics
        .iter()
        .all(|d| d.message == "Expect variable name."));

    let error = compile_error("var a = ;");
    assert_eq!(error.diagnostics.len(), 1);
    assert_eq!(error.first_message(), Some("Expect expression."));
}

#[test]
fn test_static_errors() {
    let cases = [
        ("return 1;", "Can't return from top-level code."),
        ("print(this);", "Can't use 'this' outside of a class."),
        ("super.x;", "Can't use 'super' outside of a class."),
        (
            "class A { f() { super.f(); } }",
            "Can't use 'super' in a class with no superclass.",
        ),
        ("class A < A {}", "A class can't inherit from itself."),
        (
            "class A { init() { return 1; } }",
            "Can't return a value from an initializer.",
        ),
        (
            "{ var a = a; }",
            "Can't read local variable in its own initializer.",
        ),
        (
            "{ var a; var a; }",
            "Already a variable with this name in this scope.",
        ),
        ("a + b = c;", "Invalid assignment target."),
    ];
    for (source, message) in cases {
        assert_eq!(first_message(source), message, "source: {}", source);
    }
}

#[test]
fn test_shadowing_in_inner_scope_is_allowed() {
    script_code("{ var a = 1; { var a = 2; } }");
}

#[test]
fn test_too_many_constants() {
    let source: String = (0..300).map(|n| format!("{};", n)).collect();
    assert_eq!(first_message(&source), "Too many constants in one chunk.");
}

#[test]
fn test_too_many_arguments() {
    let args = vec!["nil"; 256].join(", ");
    let source = format!("f({});", args);
    assert_eq!(first_message(&source), "Can't have more than 255 arguments.");
}

#[test]
fn test_too_many_parameters() {
    let params: Vec<String> = (0..256).map(|n| format!("p{}", n)).collect();
    let source = format!("fun f({}) {{}}", params.join(", "));
    assert_eq!(first_message(&source), "Can't have more than 255 parameters.");
}

#[test]
fn test_compile_roots_are_released() {
    let mut vm = Vm::with_config(VmConfig::captured());
    compile(&mut vm, "fun f() { return \"a\" + \"b\"; }").expect("source compiles");
    assert!(vm.compiler_roots.is_empty());
}
