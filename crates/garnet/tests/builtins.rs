//! Builtin methods called from the host through `Vm::send`.

use garnet::{ExcType, Value, Vm, VmOptions};
use pretty_assertions::assert_eq;

/// Sends `name` and returns the inspected result.
fn call(vm: &mut Vm, receiver: Value, name: &str, args: &[Value]) -> String {
    let value = vm.send(receiver, name, args).unwrap();
    vm.inspect(value).unwrap()
}

fn string(vm: &mut Vm, text: &str) -> Value {
    vm.new_string(text).unwrap()
}

fn ints(vm: &mut Vm, items: &[i64]) -> Value {
    vm.new_array(items.iter().copied().map(Value::Integer).collect()).unwrap()
}

/// String splitting, substitution and case changes.
#[test]
fn string_methods() {
    let mut vm = Vm::new(VmOptions::new());
    let text = string(&mut vm, "  hello   world ");
    assert_eq!(call(&mut vm, text, "split", &[]), r#"["hello", "world"]"#);
    assert_eq!(call(&mut vm, text, "strip", &[]), r#""hello   world""#);

    let csv = string(&mut vm, "a,b,,c,,");
    let comma = string(&mut vm, ",");
    assert_eq!(call(&mut vm, csv, "split", &[comma]), r#"["a", "b", "", "c"]"#);
    assert_eq!(
        call(&mut vm, csv, "split", &[comma, Value::Integer(-1)]),
        r#"["a", "b", "", "c", "", ""]"#
    );

    let email = string(&mut vm, "me@host");
    let regexp = vm.const_get("Regexp").unwrap();
    let source = string(&mut vm, r"(\w+)@(\w+)");
    let pattern = vm.send(regexp, "new", &[source]).unwrap();
    let template = string(&mut vm, r"\2 at \1");
    assert_eq!(call(&mut vm, email, "sub", &[pattern, template]), r#""host at me""#);
    assert_eq!(call(&mut vm, email, "=~", &[pattern]), "0");
    assert_eq!(call(&mut vm, email, "[]", &[pattern, Value::Integer(2)]), r#""host""#);

    let word = string(&mut vm, "ruby");
    assert_eq!(call(&mut vm, word, "upcase!", &[]), r#""RUBY""#);
    assert_eq!(call(&mut vm, word, "upcase!", &[]), "nil");
    let star = string(&mut vm, "*");
    assert_eq!(call(&mut vm, word, "center", &[Value::Integer(8), star]), r#""**RUBY**""#);
    assert_eq!(call(&mut vm, word, "[]", &[Value::Integer(-3), Value::Integer(2)]), r#""UB""#);
    let letter = string(&mut vm, "B");
    assert_eq!(call(&mut vm, word, "index", &[letter]), "2");
}

/// `gsub` with a block and `scan` with groups.
#[test]
fn string_pattern_iteration() {
    let mut vm = Vm::new(VmOptions::new());
    let text = string(&mut vm, "a1b22c333");
    let regexp = vm.const_get("Regexp").unwrap();
    let digits = string(&mut vm, r"\d+");
    let digits = vm.send(regexp, "new", &[digits]).unwrap();
    assert_eq!(call(&mut vm, text, "scan", &[digits]), r#"["1", "22", "333"]"#);

    let lengths = vm
        .new_native_proc(false, |vm, args, _| {
            let len = vm.string_value(args[0]).map_or(0, |text| text.len());
            Ok(Value::Integer(len as i64))
        })
        .unwrap();
    let replaced = vm.send_with_block(text, "gsub", &[digits], lengths).unwrap();
    assert_eq!(vm.inspect(replaced).unwrap(), r#""a1b2c3""#);
}

/// Array slicing, flattening and set operations.
#[test]
fn array_methods() {
    let mut vm = Vm::new(VmOptions::new());
    let items = ints(&mut vm, &[5, 3, 1, 3, 4]);
    assert_eq!(call(&mut vm, items, "sort", &[]), "[1, 3, 3, 4, 5]");
    assert_eq!(call(&mut vm, items, "uniq", &[]), "[5, 3, 1, 4]");
    assert_eq!(call(&mut vm, items, "[]", &[Value::Integer(1), Value::Integer(2)]), "[3, 1]");
    assert_eq!(call(&mut vm, items, "[]", &[Value::Integer(5), Value::Integer(1)]), "[]");
    assert_eq!(call(&mut vm, items, "[]", &[Value::Integer(6), Value::Integer(1)]), "nil");
    assert_eq!(call(&mut vm, items, "rotate", &[Value::Integer(2)]), "[1, 3, 4, 5, 3]");
    assert_eq!(call(&mut vm, items, "sum", &[]), "16");

    let inner = ints(&mut vm, &[2, 3]);
    let nested = vm.new_array(vec![Value::Integer(1), inner]).unwrap();
    assert_eq!(call(&mut vm, nested, "flatten", &[]), "[1, 2, 3]");
    let dash = string(&mut vm, "-");
    assert_eq!(call(&mut vm, nested, "join", &[dash]), r#""1-2-3""#);

    let other = ints(&mut vm, &[3, 9]);
    assert_eq!(call(&mut vm, items, "&", &[other]), "[3]");
    assert_eq!(call(&mut vm, items, "-", &[other]), "[5, 1, 4]");

    vm.send(nested, "push", &[nested]).unwrap();
    assert_eq!(call(&mut vm, nested, "inspect", &[]), r#""[1, [2, 3], [...]]""#);
}

/// Hash lookup, defaults and merging.
#[test]
fn hash_methods() {
    let mut vm = Vm::new(VmOptions::new());
    let hash_class = vm.const_get("Hash").unwrap();
    let hash = vm.send(hash_class, "new", &[Value::Integer(0)]).unwrap();
    let a = vm.symbol("a");
    let b = vm.symbol("b");
    vm.send(hash, "[]=", &[a, Value::Integer(1)]).unwrap();
    assert_eq!(call(&mut vm, hash, "[]", &[b]), "0");
    assert_eq!(call(&mut vm, hash, "inspect", &[]), r#""{:a=>1}""#);

    let err = vm.send(hash, "fetch", &[b]).unwrap_err();
    assert_eq!(err.class_name(), "KeyError");
    assert_eq!(err.message(), "key not found: :b");
    assert!(err.is_a(ExcType::IndexError));

    let other = vm.send(hash_class, "new", &[]).unwrap();
    vm.send(other, "[]=", &[b, Value::Integer(2)]).unwrap();
    let merged = vm.send(hash, "merge", &[other]).unwrap();
    assert_eq!(call(&mut vm, merged, "to_a", &[]), "[[:a, 1], [:b, 2]]");
    assert_eq!(call(&mut vm, merged, "keys", &[]), "[:a, :b]");
}

/// Integer arithmetic promotes to big integers and negative powers give Floats.
#[test]
fn integer_arithmetic() {
    let mut vm = Vm::new(VmOptions::new());
    let two = Value::Integer(2);
    assert_eq!(call(&mut vm, two, "**", &[Value::Integer(64)]), "18446744073709551616");
    assert_eq!(call(&mut vm, two, "**", &[Value::Integer(-1)]), "0.5");
    assert_eq!(call(&mut vm, Value::Integer(-7), "divmod", &[two]), "[-4, 1]");
    let err = vm.send(Value::Integer(1), "/", &[Value::Integer(0)]).unwrap_err();
    assert_eq!(err.class_name(), "ZeroDivisionError");
    assert_eq!(call(&mut vm, Value::Integer(5), "clamp", &[Value::Integer(1), Value::Integer(3)]), "3");
    assert_eq!(
        call(&mut vm, Value::Integer(5), "between?", &[Value::Integer(1), Value::Integer(9)]),
        "true"
    );
}

/// Exception objects built and inspected from the host.
#[test]
fn exception_methods() {
    let mut vm = Vm::new(VmOptions::new());
    let class = vm.const_get("ArgumentError").unwrap();
    let message = string(&mut vm, "bad input");
    let error = vm.send(class, "new", &[message]).unwrap();
    assert_eq!(call(&mut vm, error, "message", &[]), r#""bad input""#);
    assert_eq!(call(&mut vm, error, "inspect", &[]), r##""#<ArgumentError: bad input>""##);
    assert_eq!(call(&mut vm, error, "backtrace", &[]), "nil");

    let bare = vm.send(class, "new", &[]).unwrap();
    assert_eq!(call(&mut vm, bare, "message", &[]), r#""ArgumentError""#);
    assert_eq!(vm.inspect(bare).unwrap(), "ArgumentError");

    let other = string(&mut vm, "other");
    let copy = vm.send(error, "exception", &[other]).unwrap();
    assert_eq!(call(&mut vm, copy, "message", &[]), r#""other""#);
    assert_eq!(call(&mut vm, error, "message", &[]), r#""bad input""#);
    assert_eq!(call(&mut vm, error, "==", &[copy]), "false");
}

/// Regexp construction from strings and option flags.
#[test]
fn regexp_methods() {
    let mut vm = Vm::new(VmOptions::new());
    let regexp = vm.const_get("Regexp").unwrap();
    let source = string(&mut vm, "a.c");
    let escaped = vm.send(regexp, "escape", &[source]).unwrap();
    assert_eq!(vm.inspect(escaped).unwrap(), r#""a\\.c""#);
    let pattern = vm.send(regexp, "new", &[source, Value::True]).unwrap();
    assert_eq!(vm.inspect(pattern).unwrap(), "/a.c/i");
    let subject = string(&mut vm, "xABC");
    assert_eq!(call(&mut vm, pattern, "=~", &[subject]), "1");
    assert_eq!(call(&mut vm, pattern, "casefold?", &[]), "true");
}
