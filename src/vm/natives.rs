//! Built-in native functions and list methods.

use std::io::{self, BufRead, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::vm::object::{NativeFn, Native, Object};
use crate::vm::value::{ObjRef, Value};
use crate::vm::vm::Vm;
use crate::vm::vm_lists::list_position;

/// Install every global native and list method into a fresh VM.
pub(crate) fn install(vm: &mut Vm) {
    vm.define_native("clock", clock_native);
    vm.define_native("strlength", strlength_native);
    vm.define_native("print", print_native);
    vm.define_native("input", input_native);
    vm.define_native("append", append_native);
    vm.define_native("len", len_native);
    vm.define_native("delete", delete_native);
    vm.define_native("assert", assert_native);

    define_list_method(vm, "length", list_length_method);
    define_list_method(vm, "append", list_append_method);
    define_list_method(vm, "delete", list_delete_method);
}

fn define_list_method(vm: &mut Vm, name: &'static str, function: NativeFn) {
    let name_obj = vm.intern(name);
    vm.push(Value::Obj(name_obj));
    let method = vm.alloc(Object::Native(Native { name, function }));
    vm.push(Value::Obj(method));
    let key = vm.heap.key(name_obj);
    vm.list_methods.set(key, Value::Obj(method));
    vm.pop();
    vm.pop();
}

fn expect_arity(args: &[Value], expected: usize) -> Result<(), String> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(format!(
            "Expected {} arguments but got {}.",
            expected,
            args.len()
        ))
    }
}

fn expect_list(vm: &Vm, value: Value) -> Result<ObjRef, String> {
    vm.list_operand(value)
        .ok_or_else(|| "Expected a list as the first argument.".to_string())
}

// ============ Globals ============

fn clock_native(_vm: &mut Vm, _args: &[Value]) -> Result<Value, String> {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| e.to_string())?;
    Ok(Value::Number(elapsed.as_secs_f64()))
}

fn strlength_native(vm: &mut Vm, args: &[Value]) -> Result<Value, String> {
    expect_arity(args, 1)?;
    match vm.heap.str_value(args[0]) {
        Some(s) => Ok(Value::Number(s.len() as f64)),
        None => Err("Expected a string as the argument.".to_string()),
    }
}

/// Prints every argument back to back, then a newline.
fn print_native(vm: &mut Vm, args: &[Value]) -> Result<Value, String> {
    let line: String = args.iter().map(|v| vm.display_value(*v)).collect();
    if vm.config.capture_output {
        vm.output.push(line);
    } else {
        println!("{}", line);
    }
    Ok(Value::Nil)
}

fn input_native(vm: &mut Vm, args: &[Value]) -> Result<Value, String> {
    if args.len() > 1 {
        return Err(format!("Expected 1 arguments but got {}.", args.len()));
    }
    if let Some(&prompt) = args.first() {
        let Some(prompt) = vm.heap.str_value(prompt) else {
            return Err("Expected a string as the argument.".to_string());
        };
        print!("{}", prompt);
        io::stdout().flush().map_err(|e| e.to_string())?;
    }

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|e| e.to_string())?;
    let line = line.trim_end_matches(['\n', '\r']);
    Ok(Value::Obj(vm.intern(line)))
}

fn append_native(vm: &mut Vm, args: &[Value]) -> Result<Value, String> {
    expect_arity(args, 2)?;
    let list = expect_list(vm, args[0])?;
    append(vm, list, args[1]);
    Ok(Value::Nil)
}

fn len_native(vm: &mut Vm, args: &[Value]) -> Result<Value, String> {
    expect_arity(args, 1)?;
    let list = expect_list(vm, args[0])?;
    Ok(Value::Number(vm.heap.as_list(list).items.len() as f64))
}

fn delete_native(vm: &mut Vm, args: &[Value]) -> Result<Value, String> {
    expect_arity(args, 2)?;
    let list = expect_list(vm, args[0])?;
    delete(vm, list, args[1])?;
    Ok(Value::Nil)
}

fn assert_native(_vm: &mut Vm, args: &[Value]) -> Result<Value, String> {
    expect_arity(args, 1)?;
    if args[0].is_falsey() {
        return Err("assert was false!".to_string());
    }
    Ok(Value::Nil)
}

// ============ List methods ============
//
// The receiver is args[0]; arity messages count only the explicit arguments.

fn list_length_method(vm: &mut Vm, args: &[Value]) -> Result<Value, String> {
    expect_arity(&args[1..], 0)?;
    let list = expect_list(vm, args[0])?;
    Ok(Value::Number(vm.heap.as_list(list).items.len() as f64))
}

fn list_append_method(vm: &mut Vm, args: &[Value]) -> Result<Value, String> {
    expect_arity(&args[1..], 1)?;
    let list = expect_list(vm, args[0])?;
    append(vm, list, args[1]);
    Ok(Value::Nil)
}

fn list_delete_method(vm: &mut Vm, args: &[Value]) -> Result<Value, String> {
    expect_arity(&args[1..], 1)?;
    let list = expect_list(vm, args[0])?;
    delete(vm, list, args[1])?;
    Ok(Value::Nil)
}

fn append(vm: &mut Vm, list: ObjRef, item: Value) {
    vm.heap.as_list_mut(list).items.push(item);
    vm.track_growth(list);
}

/// Remove the item at `index`, shifting later items down.
fn delete(vm: &mut Vm, list: ObjRef, index: Value) -> Result<(), String> {
    let Value::Number(index) = index else {
        return Err("List index is not a number.".to_string());
    };
    let items = &mut vm.heap.as_list_mut(list).items;
    let Some(position) = list_position(index, items.len()) else {
        return Err("Invalid list index.".to_string());
    };
    items.remove(position);
    Ok(())
}
