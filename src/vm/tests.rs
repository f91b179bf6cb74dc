//! End-to-end scenarios: source in, captured output and errors out.

use pretty_assertions::assert_eq;

use crate::config::VmConfig;
use crate::error::{RotoError, RuntimeError, TraceFrame};
use crate::vm::object::hash_string;
use crate::vm::value::Value;
use crate::vm::vm::{InterpretResult, Vm};

fn new_vm() -> Vm {
    Vm::with_config(VmConfig::captured())
}

/// Run `source` and return everything it printed.
fn output_of(source: &str) -> Vec<String> {
    let mut vm = new_vm();
    if let Err(error) = vm.run(source) {
        panic!("{:?} failed: {}", source, error);
    }
    vm.output
}

fn runtime_error(source: &str) -> RuntimeError {
    let mut vm = new_vm();
    match vm.run(source) {
        Err(RotoError::Runtime(error)) => error,
        other => panic!("expected a runtime error from {:?}, got {:?}", source, other),
    }
}

fn lines(expected: &[&str]) -> Vec<String> {
    expected.iter().map(|line| line.to_string()).collect()
}

#[test]
fn test_arithmetic_precedence() {
    assert_eq!(output_of("print(1 + 2 * 3);"), lines(&["7"]));
    assert_eq!(output_of("print((1 + 2) * 3);"), lines(&["9"]));
    assert_eq!(output_of("print(10 / 4 - -1);"), lines(&["3.5"]));
}

#[test]
fn test_print_concatenates_arguments() {
    assert_eq!(
        output_of("print(\"a\", 1, nil, true); print();"),
        lines(&["a1niltrue", ""])
    );
}

#[test]
fn test_number_display() {
    assert_eq!(
        output_of("print(0.5); print(1 / 0); print(-0); print(1000 / 8);"),
        lines(&["0.5", "inf", "-0", "125"])
    );
}

#[test]
fn test_bitwise_operators() {
    let source = "
        print(5 & 3);
        print(5 | 3);
        print(5 ^ 3);
        print(1 << 4);
        print(256 >> 2);
        print(1 | 2 & 3 == 3);
    ";
    assert_eq!(
        output_of(source),
        lines(&["1", "7", "6", "16", "64", "true"])
    );
}

#[test]
fn test_logical_operators_short_circuit() {
    let source = "
        print(nil or \"x\");
        print(1 and 2);
        print(false and undefined);
        print(true or undefined);
    ";
    assert_eq!(output_of(source), lines(&["x", "2", "false", "true"]));
}

#[test]
fn test_control_flow() {
    let source = "
        var sum = 0;
        for (var i = 0; i < 10; i = i + 1) sum = sum + i;
        print(sum);
        var n = 3;
        while (n > 0) { print(n); n = n - 1; }
        if (n == 0) print(\"done\"); else print(\"not done\");
    ";
    assert_eq!(output_of(source), lines(&["45", "3", "2", "1", "done"]));
}

#[test]
fn test_string_interning() {
    assert_eq!(
        output_of("print(\"ab\" == \"a\" + \"b\"); print(\"ab\" == \"ba\");"),
        lines(&["true", "false"])
    );

    let mut vm = new_vm();
    let first = vm.intern("hello");
    let second = vm.intern("hello");
    assert_eq!(first, second);
    assert_ne!(first, vm.intern("world"));
}

#[test]
fn test_closures_are_independent() {
    let source = "
        fun makeCounter() {
            var i = 0;
            fun count() { i = i + 1; return i; }
            return count;
        }
        var a = makeCounter();
        var b = makeCounter();
        print(a());
        print(a());
        print(b());
    ";
    assert_eq!(output_of(source), lines(&["1", "2", "1"]));
}

#[test]
fn test_closures_share_captured_variable() {
    let source = "
        var get;
        var set;
        fun make() {
            var x = 1;
            fun g() { return x; }
            fun s(v) { x = v; }
            get = g;
            set = s;
        }
        make();
        set(42);
        print(get());
    ";
    assert_eq!(output_of(source), lines(&["42"]));
}

#[test]
fn test_nested_capture_through_intermediate_function() {
    let source = "
        fun outer() {
            var x = \"outside\";
            fun middle() {
                fun inner() { return x; }
                return inner;
            }
            return middle;
        }
        print(outer()()());
    ";
    assert_eq!(output_of(source), lines(&["outside"]));
}

#[test]
fn test_arity_mismatch_never_runs_body() {
    let mut vm = new_vm();
    let result = vm.run("var ran = false; fun f(a) { ran = true; } f(1, 2);");
    match result {
        Err(RotoError::Runtime(error)) => {
            assert_eq!(error.message, "Expected 1 arguments but got 2.")
        }
        other => panic!("expected an arity error, got {:?}", other),
    }
    assert_eq!(vm.global("ran"), Some(Value::Bool(false)));
}

#[test]
fn test_classes_and_inheritance() {
    let source = "
        class A { greet() { return \"hi from A\"; } }
        class B < A { greet() { return \"B then \" + super.greet(); } }
        class C < A {}
        print(B().greet());
        print(C().greet());
        var method = C().greet;
        print(method());
        print(A());
        print(A);
        print(method);
    ";
    assert_eq!(
        output_of(source),
        lines(&[
            "B then hi from A",
            "hi from A",
            "hi from A",
            "A instance",
            "A",
            "<fn greet>",
        ])
    );
}

#[test]
fn test_initializer_and_fields() {
    let source = "
        class P {
            init(x, y) { this.x = x; this.y = y; }
            sum() { return this.x + this.y; }
        }
        var p = P(3, 4);
        print(p.sum());
        print(p.init(1, 1).x);
        p.sum = 10;
        print(p.sum);
    ";
    assert_eq!(output_of(source), lines(&["7", "1", "10"]));

    let error = runtime_error("class P { init(x) {} } P();");
    assert_eq!(error.message, "Expected 1 arguments but got 0.");
    let error = runtime_error("class Q {} Q(1);");
    assert_eq!(error.message, "Expected 0 arguments but got 1.");
}

#[test]
fn test_this_captured_by_closure() {
    let source = "
        class Box {
            init(v) { this.v = v; }
            getter() { fun get() { return this.v; } return get; }
        }
        print(Box(\"boxed\").getter()());
    ";
    assert_eq!(output_of(source), lines(&["boxed"]));
}

#[test]
fn test_lists() {
    let source = "
        var l = [1, 2];
        l.append(3);
        append(l, 4);
        print(l);
        print(l[2]);
        l.delete(0);
        print(l);
        print(l.length());
        print(len(l));
        l[0] = \"x\";
        print(l);
        print([[1, 2], [], nil]);
    ";
    assert_eq!(
        output_of(source),
        lines(&[
            "[1, 2, 3, 4]",
            "3",
            "[2, 3, 4]",
            "3",
            "3",
            "[x, 3, 4]",
            "[[1, 2], [], nil]",
        ])
    );
}

#[test]
fn test_list_append_then_delete_shifts_items() {
    let source = "
        var l = [1, 2, 3];
        l.append(4);
        print(l[3]);
        l.delete(0);
        print(l);
        print(l.length());
    ";
    assert_eq!(output_of(source), lines(&["4", "[2, 3, 4]", "3"]));
}

#[test]
fn test_list_errors() {
    let error = runtime_error("var l = [1];\nprint(l[5]);");
    assert_eq!(error.message, "List index out of range.");
    assert_eq!(error.line(), Some(2));

    let cases = [
        ("var x = 1; x[0] = 2;", "Cannot store value in a non-list."),
        ("var x = 1; x[0];", "Invalid type to index into."),
        ("[1][\"a\"];", "List index is not a number."),
        ("var l = [1]; l[3] = 2;", "Invalid list index."),
        ("var l = [1]; l.delete(4);", "Invalid list index."),
        ("[1].push(2);", "Undefined property 'push'."),
        ("len(1);", "Expected a list as the first argument."),
        ("[].append();", "Expected 1 arguments but got 0."),
    ];
    for (source, message) in cases {
        assert_eq!(runtime_error(source).message, message, "source: {}", source);
    }
}

#[test]
fn test_runtime_error_messages() {
    let cases = [
        ("-\"a\";", "Operand must be a number."),
        ("1 < \"a\";", "Operands must be numbers."),
        ("1 + \"a\";", "Operands must be two numbers or two strings."),
        ("undefinedVar;", "Undefined variable 'undefinedVar'."),
        ("x = 1;", "Undefined variable 'x'."),
        ("nil();", "Can only call functions and classes."),
        ("var n = 1; n.foo;", "Only instances have properties."),
        ("var n = 1; n.foo = 2;", "Only instances have fields."),
        ("var n = 1; n.foo();", "Only instances and lists have methods."),
        ("class A {} A().missing;", "Undefined property 'missing'."),
        ("var B = 1; class A < B {}", "Superclass must be a class."),
        ("fun f() { f(); } f();", "Stack overflow."),
        ("assert(1 == 2);", "assert was false!"),
        ("strlength(1);", "Expected a string as the argument."),
    ];
    for (source, message) in cases {
        assert_eq!(runtime_error(source).message, message, "source: {}", source);
    }
}

#[test]
fn test_failed_assignment_does_not_define_global() {
    let mut vm = new_vm();
    assert_eq!(vm.interpret("x = 1;"), InterpretResult::RuntimeError);
    assert_eq!(vm.global("x"), None);
}

#[test]
fn test_backtrace_lists_frames_innermost_first() {
    let source = "fun inner() { return nil + 1; }\nfun outer() {\n  inner();\n}\nouter();";
    let error = runtime_error(source);
    assert_eq!(
        error.trace,
        vec![
            TraceFrame {
                line: 1,
                function: Some("inner".to_string()),
            },
            TraceFrame {
                line: 3,
                function: Some("outer".to_string()),
            },
            TraceFrame {
                line: 5,
                function: None,
            },
        ]
    );
}

#[test]
fn test_compile_error_runs_nothing() {
    let mut vm = new_vm();
    assert_eq!(
        vm.interpret("print(\"before\"); var = 1;"),
        InterpretResult::CompileError
    );
    assert!(vm.output.is_empty());
}

#[test]
fn test_state_survives_between_runs() {
    let mut vm = new_vm();
    vm.run("var a = 1;").expect("first line runs");
    assert_eq!(vm.interpret("a.b;"), InterpretResult::RuntimeError);
    vm.run("print(a + 1);").expect("VM is usable after an error");
    assert_eq!(vm.output, lines(&["2"]));
}

#[test]
fn test_escaped_closure_keeps_value_after_runtime_error() {
    let mut vm = new_vm();
    let result =
        vm.interpret("var g; fun f() { var x = 1; fun h() { return x; } g = h; nil(); } f();");
    assert_eq!(result, InterpretResult::RuntimeError);

    vm.run("print(g());").expect("escaped closure still runs");
    assert_eq!(vm.output, lines(&["1"]));
}

#[test]
fn test_host_native() {
    fn double(_vm: &mut Vm, args: &[Value]) -> Result<Value, String> {
        match args {
            [Value::Number(n)] => Ok(Value::Number(n * 2.0)),
            _ => Err("double wants one number".to_string()),
        }
    }

    let mut vm = new_vm();
    vm.define_native("double", double);
    vm.run("print(double(21));").expect("native call runs");
    assert_eq!(vm.output, lines(&["42"]));
    assert_eq!(vm.interpret("double();"), InterpretResult::RuntimeError);
}

#[test]
fn test_discarded_strings_are_collected() {
    let config = VmConfig {
        initial_gc_threshold: 16 * 1024,
        ..VmConfig::captured()
    };
    let mut vm = Vm::with_config(config);
    vm.run("var keep = \"kept\"; var l = [1, \"two\"];")
        .expect("setup runs");

    for i in 0..100_000 {
        vm.intern(&format!("garbage {}", i));
    }

    assert!(vm.heap().object_count() < 10_000);
    assert!(vm
        .heap()
        .find_interned("garbage 0", hash_string("garbage 0"))
        .is_none());
    vm.run("print(keep); print(l);").expect("globals survive");
    assert_eq!(vm.output, lines(&["kept", "[1, two]"]));
}

#[test]
fn test_running_script_garbage_is_collected() {
    let config = VmConfig {
        initial_gc_threshold: 16 * 1024,
        ..VmConfig::captured()
    };
    let mut vm = Vm::with_config(config);
    let source = "
        var kept = \"kept\";
        fun churn() {
            var outer = \"outer\";
            var d = [\"0\", \"1\", \"2\", \"3\", \"4\", \"5\", \"6\", \"7\", \"8\", \"9\"];
            var count = 0;
            for (var a = 0; a < 10; a = a + 1)
                for (var b = 0; b < 10; b = b + 1)
                    for (var c = 0; c < 10; c = c + 1)
                        for (var e = 0; e < 10; e = e + 1)
                            for (var f = 0; f < 10; f = f + 1) {
                                var s = d[a] + d[b] + d[c] + d[e] + d[f];
                                count = count + 1;
                            }
            print(count);
            return outer;
        }
        print(churn());
        print(kept);
    ";
    vm.run(source).expect("program runs");
    assert_eq!(vm.output, lines(&["100000", "outer", "kept"]));
    assert!(vm.heap().object_count() < 10_000);
    assert!(vm
        .heap()
        .find_interned("00000", hash_string("00000"))
        .is_none());
}

#[test]
fn test_programs_survive_stress_collection() {
    let config = VmConfig {
        stress_gc: true,
        ..VmConfig::captured()
    };
    let mut vm = Vm::with_config(config);
    let source = "
        class Node {
            init(value, next) { this.value = value; this.next = next; }
        }
        fun build(n) {
            var head = nil;
            for (var i = 0; i < n; i = i + 1) head = Node(\"n\" + \"ode\", head);
            return head;
        }
        fun counter() { var c = 0; fun inc() { c = c + 1; return c; } return inc; }
        var inc = counter();
        var list = [];
        var node = build(20);
        while (node != nil) { list.append(node.value); node = node.next; inc(); }
        print(len(list));
        print(inc());
        print(list[0] + \"!\");
    ";
    vm.run(source).expect("program runs under stress collection");
    assert_eq!(vm.output, lines(&["20", "21", "node!"]));
}
