//! BasicObject and Kernel: the methods every object answers, plus the private helpers
//! (`puts`, `require`, `raise`, `loop`, ...) called without a receiver.

use crate::{
    builtins::{def, def_private, io, module::define_method_from},
    callable::CallArgs,
    exception::{ExcType, RunError, RunResult},
    heap::HeapData,
    intern::{StaticSymbols, Symbol},
    types::string,
    value::Value,
    vm::Vm,
};

/// Fixed seeds so `hash` values are stable across runs.
const HASH_SEEDS: [u64; 4] = [
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
];

pub(super) fn register(vm: &mut Vm) -> RunResult<()> {
    register_basic_object(vm);
    register_output(vm);
    register_control(vm);
    register_object(vm);
    register_conversions(vm);
    register_main(vm)
}

fn register_basic_object(vm: &mut Vm) {
    let basic = vm.core.basic_object;
    def_private(vm, basic, "initialize", 0, |_, _, _| Ok(Value::Nil));
    def(vm, basic, "==", 1, |_, recv, args| Ok(Value::from_bool(recv.identical(args.get(0)))));
    def(vm, basic, "equal?", 1, |_, recv, args| Ok(Value::from_bool(recv.identical(args.get(0)))));
    def(vm, basic, "!", 0, |_, recv, _| Ok(Value::from_bool(!recv.truthy())));
    def(vm, basic, "!=", 1, |vm, recv, args| {
        let equal = vm.funcall(recv, StaticSymbols::Eq.into(), &[args.get(0)])?;
        Ok(Value::from_bool(!equal.truthy()))
    });
    def(vm, basic, "__id__", 0, |vm, recv, _| Ok(Value::Integer(vm.object_id(recv))));
    def(vm, basic, "__send__", -2, |vm, recv, args| send(vm, recv, args, true));
    def(vm, basic, "instance_eval", -1, |vm, recv, args| {
        let Some(block) = args.block else {
            return Err(RunError::not_implemented("instance_eval with a string"));
        };
        instance_exec(vm, recv, block, &[recv])
    });
    def(vm, basic, "instance_exec", -1, |vm, recv, args| {
        let block = args.require_block()?;
        instance_exec(vm, recv, block, args.args)
    });
    def_private(vm, basic, "method_missing", -2, |vm, recv, args| {
        let mid = match args.get(0) {
            Value::Symbol(mid) => mid,
            _ => return Err(RunError::argument("no method name given")),
        };
        Err(vm.no_method_error(recv, mid, false))
    });
    def_private(vm, basic, "singleton_method_added", 1, |_, _, _| Ok(Value::Nil));
}

fn register_output(vm: &mut Vm) {
    let kernel = vm.core.kernel;
    def_private(vm, kernel, "puts", -1, |vm, _, args| {
        let text = io::puts_text(vm, args.args)?;
        io::write_stdout(vm, &text)?;
        Ok(Value::Nil)
    });
    def_private(vm, kernel, "print", -1, |vm, _, args| {
        let text = io::print_text(vm, args.args)?;
        io::write_stdout(vm, &text)?;
        Ok(Value::Nil)
    });
    def_private(vm, kernel, "p", -1, |vm, _, args| {
        let text = io::p_text(vm, args.args)?;
        io::write_stdout(vm, &text)?;
        io::p_result(vm, args)
    });
}

fn register_control(vm: &mut Vm) {
    let kernel = vm.core.kernel;
    def_private(vm, kernel, "raise", -1, |vm, _, args| Err(vm.raise_error(args.args)?));
    super::alias(vm, kernel, "fail", "raise");
    def_private(vm, kernel, "require", 1, |vm, _, args| {
        let feature = vm.expect_string(args.get(0))?;
        Ok(Value::from_bool(vm.require_feature(&feature)?))
    });
    def_private(vm, kernel, "require_relative", 1, |vm, _, args| {
        let feature = vm.expect_string(args.get(0))?;
        Ok(Value::from_bool(vm.require_relative(&feature)?))
    });
    def_private(vm, kernel, "load", -2, |vm, _, args| {
        args.check(1, Some(2))?;
        let path = vm.expect_string(args.get(0))?;
        Ok(Value::from_bool(vm.load_file(&path)?))
    });
    def_private(vm, kernel, "lambda", 0, |vm, _, args| {
        let block = args
            .block
            .ok_or_else(|| RunError::argument("tried to create Proc object without a block"))?;
        vm.proc_from_block(block, true)
    });
    def_private(vm, kernel, "proc", 0, |vm, _, args| {
        let block = args
            .block
            .ok_or_else(|| RunError::argument("tried to create Proc object without a block"))?;
        vm.proc_from_block(block, false)
    });
    def_private(vm, kernel, "block_given?", 0, |vm, _, _| {
        Ok(Value::from_bool(vm.frames.last().is_some_and(|frame| frame.block.is_some())))
    });
    def_private(vm, kernel, "__method__", 0, |vm, _, _| {
        Ok(vm
            .frames
            .last()
            .and_then(|frame| frame.method.as_ref())
            .map_or(Value::Nil, |method| Value::Symbol(method.name)))
    });
    def_private(vm, kernel, "loop", 0, |vm, _, args| {
        let block = args.require_block()?;
        loop {
            match vm.call_block(Some(block), &[]) {
                Ok(_) => {}
                Err(err) if error_is_a(vm, &err, ExcType::StopIteration) => return Ok(Value::Nil),
                Err(err) => return Err(err),
            }
        }
    });
}

fn register_object(vm: &mut Vm) {
    let kernel = vm.core.kernel;
    def(vm, kernel, "freeze", 0, |vm, recv, _| {
        vm.freeze_value(recv);
        Ok(recv)
    });
    def(vm, kernel, "frozen?", 0, |vm, recv, _| Ok(Value::from_bool(vm.frozen(recv))));
    def(vm, kernel, "object_id", 0, |vm, recv, _| Ok(Value::Integer(vm.object_id(recv))));
    def(vm, kernel, "class", 0, |vm, recv, _| Ok(Value::Ref(vm.real_class_of(recv))));
    def(vm, kernel, "singleton_class", 0, |vm, recv, _| Ok(Value::Ref(vm.singleton_class_of(recv)?)));
    def(vm, kernel, "inspect", 0, |vm, recv, _| {
        let text = vm.builtin_inspect(recv)?;
        vm.new_string_owned(text)
    });
    def(vm, kernel, "to_s", 0, |vm, recv, _| {
        let text = vm.default_to_s(recv);
        vm.new_string_owned(text)
    });
    def(vm, kernel, "send", -2, |vm, recv, args| send(vm, recv, args, true));
    def(vm, kernel, "public_send", -2, |vm, recv, args| send(vm, recv, args, false));
    def(vm, kernel, "respond_to?", -2, |vm, recv, args| {
        args.check(1, Some(2))?;
        let mid = vm.expect_name(args.get(0))?;
        let include_all = args.get(1).truthy();
        Ok(Value::from_bool(vm.responds_to_with(recv, mid, include_all)?))
    });
    def_private(vm, kernel, "respond_to_missing?", 2, |_, _, _| Ok(Value::False));

    def(vm, kernel, "instance_variable_get", 1, |vm, recv, args| {
        let name = ivar_name(vm, args.get(0))?;
        Ok(vm.ivar_get(recv, name))
    });
    def(vm, kernel, "instance_variable_set", 2, |vm, recv, args| {
        let name = ivar_name(vm, args.get(0))?;
        vm.ivar_set(recv, name, args.get(1))?;
        Ok(args.get(1))
    });
    def(vm, kernel, "instance_variable_defined?", 1, |vm, recv, args| {
        let name = ivar_name(vm, args.get(0))?;
        let defined = recv.heap_id().is_some_and(|id| vm.heap.get(id).ivar(name).is_some());
        Ok(Value::from_bool(defined))
    });
    def(vm, kernel, "instance_variables", 0, |vm, recv, _| {
        let names = recv
            .heap_id()
            .and_then(|id| vm.heap.get(id).ivars.as_ref())
            .map(|ivars| ivars.keys().map(|&name| Value::Symbol(name)).collect())
            .unwrap_or_default();
        vm.new_array(names)
    });
    def(vm, kernel, "remove_instance_variable", 1, |vm, recv, args| {
        let name = ivar_name(vm, args.get(0))?;
        vm.check_frozen(recv)?;
        let removed = recv
            .heap_id()
            .and_then(|id| vm.heap.get_mut(id).ivars.as_mut())
            .and_then(|ivars| ivars.shift_remove(&name));
        removed.ok_or_else(|| {
            ExcType::NameError.error(format!("instance variable {} not defined", vm.interns.get(name)))
        })
    });

    def(vm, kernel, "is_a?", 1, |vm, recv, args| {
        let module = module_arg(vm, args.get(0))?;
        Ok(Value::from_bool(vm.kind_of(recv, module)))
    });
    super::alias(vm, kernel, "kind_of?", "is_a?");
    def(vm, kernel, "instance_of?", 1, |vm, recv, args| {
        let module = module_arg(vm, args.get(0))?;
        Ok(Value::from_bool(vm.real_class_of(recv) == module))
    });
    def(vm, kernel, "nil?", 0, |_, _, _| Ok(Value::False));
    def(vm, kernel, "eql?", 1, |vm, recv, args| {
        Ok(Value::from_bool(vm.hash_key(recv, false) == vm.hash_key(args.get(0), false)))
    });
    def(vm, kernel, "hash", 0, |vm, recv, _| {
        let key = vm.hash_key(recv, false);
        let [a, b, c, d] = HASH_SEEDS;
        let hash = ahash::RandomState::with_seeds(a, b, c, d).hash_one(&key);
        Ok(Value::Integer((hash >> 2) as i64))
    });
    def(vm, kernel, "===", 1, |vm, recv, args| {
        let other = args.get(0);
        Ok(Value::from_bool(recv.identical(other) || vm.values_eq(recv, other)?))
    });
    def(vm, kernel, "=~", 1, |_, _, _| Ok(Value::Nil));
    def(vm, kernel, "<=>", 1, |vm, recv, args| {
        let other = args.get(0);
        Ok(if recv.identical(other) || vm.values_eq(recv, other)? {
            Value::Integer(0)
        } else {
            Value::Nil
        })
    });

    def(vm, kernel, "define_singleton_method", -2, |vm, recv, args| {
        args.check(1, Some(2))?;
        let mid = vm.expect_name(args.get(0))?;
        let Some(body) = args.opt(1).or(args.block) else {
            return Err(RunError::argument("tried to create Proc object without a block"));
        };
        let singleton = vm.singleton_class_of(recv)?;
        define_method_from(vm, singleton, mid, body)?;
        Ok(Value::Symbol(mid))
    });
    def(vm, kernel, "singleton_methods", 0, |vm, recv, _| {
        let names = match recv {
            Value::Ref(id) => vm
                .heap
                .get(id)
                .singleton
                .map(|singleton| {
                    vm.heap
                        .module(singleton)
                        .methods
                        .iter()
                        .filter(|(_, callable)| callable.visibility() != crate::callable::Visibility::Private)
                        .map(|(&mid, _)| Value::Symbol(mid))
                        .collect()
                })
                .unwrap_or_default(),
            _ => Vec::new(),
        };
        vm.new_array(names)
    });
    def(vm, kernel, "extend", -2, |vm, recv, args| {
        for &arg in args.args.iter().rev() {
            let module = match vm.module_of(arg) {
                Some(id) if vm.heap.as_class(id).is_none() => id,
                _ => {
                    let name = vm.conversion_name(arg);
                    return Err(RunError::type_error(format!("wrong argument type {name} (expected Module)")));
                }
            };
            vm.extend_object(recv, module)?;
        }
        Ok(recv)
    });
    def(vm, kernel, "tap", 0, |vm, recv, args| {
        let block = args.require_block()?;
        vm.call_block(Some(block), &[recv])?;
        Ok(recv)
    });
    def(vm, kernel, "then", 0, |vm, recv, args| {
        let block = args.require_block()?;
        vm.call_block(Some(block), &[recv])
    });
    super::alias(vm, kernel, "yield_self", "then");
    def(vm, kernel, "itself", 0, |_, recv, _| Ok(recv));
    def(vm, kernel, "dup", 0, |vm, recv, _| copy_object(vm, recv, false));
    def(vm, kernel, "clone", -1, |vm, recv, args| {
        args.check(0, Some(1))?;
        copy_object(vm, recv, true)
    });
    def_private(vm, kernel, "initialize_copy", 1, |_, recv, _| Ok(recv));
}

fn register_conversions(vm: &mut Vm) {
    let kernel = vm.core.kernel;
    def_private(vm, kernel, "Integer", 1, |vm, _, args| {
        let value = args.get(0);
        match value {
            Value::Integer(_) => Ok(value),
            Value::Float(f) => super::float::to_integer(vm, f.trunc()),
            Value::Nil => Err(RunError::type_error("can't convert nil into Integer")),
            _ if vm.bigint_of(value).is_some() => Ok(value),
            _ => {
                let Some(text) = vm.string_of(value).map(str::to_owned) else {
                    let name = vm.conversion_name(value);
                    return Err(RunError::type_error(format!("can't convert {name} into Integer")));
                };
                match parse_integer(&text) {
                    Some(n) => vm.int_result(n),
                    None => Err(RunError::argument(format!(
                        "invalid value for Integer(): {}",
                        string::inspect(&text)
                    ))),
                }
            }
        }
    });
    def_private(vm, kernel, "Float", 1, |vm, _, args| {
        let value = args.get(0);
        if let Some(f) = vm.to_f64(value) {
            return Ok(Value::Float(f));
        }
        let Some(text) = vm.string_of(value).map(str::to_owned) else {
            let name = vm.conversion_name(value);
            return Err(RunError::type_error(format!("can't convert {name} into Float")));
        };
        let cleaned: String = text.trim().chars().filter(|c| *c != '_').collect();
        match cleaned.parse::<f64>() {
            Ok(f) if !cleaned.is_empty() && !cleaned.ends_with('.') => Ok(Value::Float(f)),
            _ => Err(RunError::argument(format!(
                "invalid value for Float(): {}",
                string::inspect(&text)
            ))),
        }
    });
    def_private(vm, kernel, "String", 1, |vm, _, args| {
        let text = vm.to_s_value(args.get(0))?;
        vm.new_string_owned(text)
    });
    def_private(vm, kernel, "Array", 1, |vm, _, args| {
        let value = args.get(0);
        if value.is_nil() {
            return vm.new_array(Vec::new());
        }
        if vm.array_of(value).is_some() {
            return Ok(value);
        }
        if let Some(pairs) = vm.hash_of(value).map(|hash| hash.pair_vec()) {
            let mut items = Vec::with_capacity(pairs.len());
            for (key, val) in pairs {
                items.push(vm.new_array(vec![key, val])?);
            }
            return vm.new_array(items);
        }
        vm.new_array(vec![value])
    });
}

/// `to_s`/`inspect` of the top-level object, and `include` at top level.
fn register_main(vm: &mut Vm) -> RunResult<()> {
    let main = vm.singleton_class_of(vm.main)?;
    def(vm, main, "to_s", 0, |vm, _, _| vm.new_string("main"));
    def(vm, main, "inspect", 0, |vm, _, _| vm.new_string("main"));
    def_private(vm, main, "include", -2, |vm, _, args| {
        let object = Value::Ref(vm.core.object);
        let include = vm.interns.intern("include");
        vm.call_method(object, include, args.args, None, None, true)
    });
    Ok(())
}

/// `send`/`__send__`/`public_send`: the first argument names the method.
fn send(vm: &mut Vm, recv: Value, args: CallArgs<'_>, fcall: bool) -> RunResult<Value> {
    let Some((&name, rest)) = args.args.split_first() else {
        return Err(RunError::argument("no method name given"));
    };
    let mid = vm.expect_name(name)?;
    let forwarded = args.call_data.map(|call_data| call_data.forwarded(mid));
    vm.call_method(recv, mid, rest, args.block, forwarded.as_ref(), fcall)
}

/// Runs `block` with `self` set to `recv`; `def` inside defines singleton methods.
fn instance_exec(vm: &mut Vm, recv: Value, block: Value, args: &[Value]) -> RunResult<Value> {
    let cref = match recv {
        Value::Ref(_) => Some(vm.singleton_class_of(recv)?),
        _ => None,
    };
    let bound = vm.with_binding(block, recv, cref, false)?;
    vm.call_proc(bound, args, None)
}

fn ivar_name(vm: &mut Vm, value: Value) -> RunResult<Symbol> {
    let name = vm.expect_name(value)?;
    let text = vm.interns.get(name);
    let valid = text.strip_prefix('@').is_some_and(|rest| {
        rest.chars().next().is_some_and(|c| c.is_alphabetic() || c == '_')
            && rest.chars().all(|c| c.is_alphanumeric() || c == '_')
    });
    if valid {
        Ok(name)
    } else {
        Err(ExcType::NameError.error(format!("'{text}' is not allowed as an instance variable name")))
    }
}

fn module_arg(vm: &Vm, value: Value) -> RunResult<crate::heap::HeapId> {
    vm.module_of(value)
        .ok_or_else(|| RunError::type_error("class or module required"))
}

/// Whether `err` is an exception of `kind` or a subclass.
pub(super) fn error_is_a(vm: &mut Vm, err: &RunError, kind: ExcType) -> bool {
    match err {
        RunError::Exc(exc) => exc.kind.is_subclass_of(kind),
        RunError::Raised(id) => {
            let class = vm.core.exception(kind);
            vm.kind_of(Value::Ref(*id), class)
        }
        _ => false,
    }
}

/// `dup` and `clone`: a shallow copy with the same class and instance variables. `clone`
/// also keeps the frozen state and singleton methods.
fn copy_object(vm: &mut Vm, recv: Value, clone: bool) -> RunResult<Value> {
    let Value::Ref(id) = recv else {
        return Ok(recv);
    };
    let entry = vm.heap.get(id);
    let mut data = match &entry.data {
        HeapData::BigInt(_) => return Ok(recv),
        HeapData::Io(_) => return Err(RunError::type_error("can't copy IO")),
        HeapData::Class(class) if class.is_singleton => {
            return Err(RunError::type_error("can't copy singleton class"));
        }
        other => other.clone(),
    };
    let ivars = entry.ivars.clone();
    let frozen = entry.frozen;
    let singleton = entry.singleton;
    match &mut data {
        HeapData::Module(module) => module.name = None,
        HeapData::Class(class) => class.module.name = None,
        _ => {}
    }
    let class = vm.heap.class_of(id);
    let copy_id = vm.heap.allocate(class, data)?;
    vm.heap.get_mut(copy_id).ivars = ivars;
    let copy = Value::Ref(copy_id);
    if clone && let Some(singleton) = singleton {
        let source = vm.heap.module(singleton);
        let (methods, includes) = (source.methods.clone(), source.includes.clone());
        let target = vm.singleton_class_of(copy)?;
        let record = vm.heap.module_mut(target);
        record.methods = methods;
        record.includes = includes;
    }
    let initialize_copy = vm.interns.intern("initialize_copy");
    vm.call_method(copy, initialize_copy, &[recv], None, None, true)?;
    if clone && frozen {
        vm.freeze_value(copy);
    }
    Ok(copy)
}

/// Strict `Integer()` parsing: optional sign, radix prefix and underscores between digits.
fn parse_integer(text: &str) -> Option<num_bigint::BigInt> {
    let trimmed = text.trim();
    let (negative, body) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let lower = body.to_ascii_lowercase();
    let (radix, digits) = if let Some(rest) = lower.strip_prefix("0x") {
        (16, rest)
    } else if let Some(rest) = lower.strip_prefix("0b") {
        (2, rest)
    } else if let Some(rest) = lower.strip_prefix("0o") {
        (8, rest)
    } else if lower.len() > 1 && lower.starts_with('0') {
        (8, &lower[1..])
    } else {
        (10, lower.as_str())
    };
    if digits.is_empty() || digits.starts_with('_') || digits.ends_with('_') || digits.contains("__") {
        return None;
    }
    let cleaned: String = digits.chars().filter(|c| *c != '_').collect();
    let magnitude = num_bigint::BigInt::parse_bytes(cleaned.as_bytes(), radix)?;
    Some(if negative { -magnitude } else { magnitude })
}

#[cfg(test)]
mod tests {
    use super::parse_integer;

    #[test]
    fn strict_integer_parsing() {
        assert_eq!(parse_integer(" 42 "), Some(42.into()));
        assert_eq!(parse_integer("-0x1f"), Some((-31).into()));
        assert_eq!(parse_integer("1_000"), Some(1000.into()));
        assert_eq!(parse_integer("017"), Some(15.into()));
        assert_eq!(parse_integer("12abc"), None);
        assert_eq!(parse_integer("1__0"), None);
        assert_eq!(parse_integer(""), None);
    }
}
