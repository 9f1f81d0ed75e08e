//! Module: naming, mixins, method tables, constants, visibility and `class_eval`.

use ahash::AHashSet;

use crate::{
    builtins::{def, def_private, def_singleton},
    callable::{CallArgs, Callable, Visibility},
    exception::{ExcType, RunError, RunResult},
    heap::HeapId,
    intern::{StaticSymbols, Symbol},
    value::Value,
    vm::Vm,
};

pub(super) fn register(vm: &mut Vm) -> RunResult<()> {
    let module = vm.core.module;
    def_singleton(vm, module, "new", 0, |vm, _, args| {
        let created = vm.new_module(None, None)?;
        if let Some(block) = args.block {
            eval_in(vm, created, block, &[Value::Ref(created)])?;
        }
        Ok(Value::Ref(created))
    })?;

    def(vm, module, "name", 0, |vm, recv, _| match vm.module_name(this(vm, recv)?) {
        Some(name) => vm.new_string_owned(name),
        None => Ok(Value::Nil),
    });
    def(vm, module, "to_s", 0, |vm, recv, _| {
        let name = vm.module_display_name(this(vm, recv)?);
        vm.new_string_owned(name)
    });
    super::alias(vm, module, "inspect", "to_s");
    def(vm, module, "===", 1, |vm, recv, args| {
        let module = this(vm, recv)?;
        Ok(Value::from_bool(vm.kind_of(args.get(0), module)))
    });
    def(vm, module, "==", 1, |_, recv, args| Ok(Value::from_bool(recv.identical(args.get(0)))));
    def(vm, module, "<", 1, |vm, recv, args| relation(vm, recv, args.get(0), false, false));
    def(vm, module, "<=", 1, |vm, recv, args| relation(vm, recv, args.get(0), true, false));
    def(vm, module, ">", 1, |vm, recv, args| relation(vm, recv, args.get(0), false, true));
    def(vm, module, ">=", 1, |vm, recv, args| relation(vm, recv, args.get(0), true, true));

    def(vm, module, "include", -2, |vm, recv, args| mixin(vm, recv, args, false));
    def(vm, module, "prepend", -2, |vm, recv, args| mixin(vm, recv, args, true));
    def(vm, module, "include?", 1, |vm, recv, args| {
        let module = this(vm, recv)?;
        let other = mixin_arg(vm, args.get(0))?;
        Ok(Value::from_bool(module != other && vm.is_ancestor(module, other)))
    });
    def(vm, module, "ancestors", 0, |vm, recv, _| {
        let module = this(vm, recv)?;
        let ancestors = vm.ancestors(module).into_iter().map(Value::Ref).collect();
        vm.new_array(ancestors)
    });
    def(vm, module, "included_modules", 0, |vm, recv, _| {
        let module = this(vm, recv)?;
        let modules = vm
            .ancestors(module)
            .into_iter()
            .filter(|&id| vm.heap.as_class(id).is_none())
            .map(Value::Ref)
            .collect();
        vm.new_array(modules)
    });

    def(vm, module, "instance_methods", -1, |vm, recv, args| {
        method_names(vm, recv, args, |v| v != Visibility::Private)
    });
    def(vm, module, "public_instance_methods", -1, |vm, recv, args| {
        method_names(vm, recv, args, |v| v == Visibility::Public)
    });
    def(vm, module, "private_instance_methods", -1, |vm, recv, args| {
        method_names(vm, recv, args, |v| v == Visibility::Private)
    });
    def(vm, module, "method_defined?", 1, |vm, recv, args| {
        defined_with(vm, recv, args.get(0), |v| v != Visibility::Private)
    });
    def(vm, module, "public_method_defined?", 1, |vm, recv, args| {
        defined_with(vm, recv, args.get(0), |v| v == Visibility::Public)
    });
    def(vm, module, "private_method_defined?", 1, |vm, recv, args| {
        defined_with(vm, recv, args.get(0), |v| v == Visibility::Private)
    });
    def(vm, module, "protected_method_defined?", 1, |vm, recv, args| {
        defined_with(vm, recv, args.get(0), |v| v == Visibility::Protected)
    });
    def(vm, module, "define_method", -2, |vm, recv, args| {
        args.check(1, Some(2))?;
        let module = this(vm, recv)?;
        let mid = vm.expect_name(args.get(0))?;
        let Some(body) = args.opt(1).or(args.block) else {
            return Err(RunError::argument("tried to create Proc object without a block"));
        };
        define_method_from(vm, module, mid, body)?;
        Ok(Value::Symbol(mid))
    });
    def(vm, module, "alias_method", 2, |vm, recv, args| {
        let module = this(vm, recv)?;
        let new = vm.expect_name(args.get(0))?;
        let old = vm.expect_name(args.get(1))?;
        vm.alias_method(module, new, old)?;
        Ok(Value::Symbol(new))
    });
    def(vm, module, "remove_method", -1, |vm, recv, args| {
        let module = this(vm, recv)?;
        for &name in args.args {
            let mid = vm.expect_name(name)?;
            vm.remove_method(module, mid)?;
        }
        Ok(recv)
    });
    def(vm, module, "undef_method", -1, |vm, recv, args| {
        let module = this(vm, recv)?;
        for &name in args.args {
            let mid = vm.expect_name(name)?;
            vm.undef_method(module, mid)?;
        }
        Ok(recv)
    });
    def(vm, module, "attr_reader", -1, |vm, recv, args| attr(vm, recv, args, true, false));
    def(vm, module, "attr_writer", -1, |vm, recv, args| attr(vm, recv, args, false, true));
    def(vm, module, "attr_accessor", -1, |vm, recv, args| attr(vm, recv, args, true, true));
    super::alias(vm, module, "attr", "attr_reader");

    def(vm, module, "const_get", -2, |vm, recv, args| {
        args.check(1, Some(2))?;
        let module = this(vm, recv)?;
        let inherit = args.opt(1).is_none_or(Value::truthy);
        let path = name_text(vm, args.get(0))?;
        let mut current = module;
        let mut value = Value::Nil;
        for (i, segment) in path.split("::").enumerate() {
            if segment.is_empty() && i == 0 {
                current = vm.core.object;
                continue;
            }
            let name = vm.interns.intern(segment);
            let mut found = vm.const_lookup_in(current, name, inherit);
            if found.is_none() && inherit && vm.heap.as_class(current).is_none() {
                found = vm.const_lookup_in(vm.core.object, name, true);
            }
            value = found.ok_or_else(|| uninitialized_constant(vm, current, segment))?;
            if let Some(next) = vm.module_of(value) {
                current = next;
            }
        }
        Ok(value)
    });
    def(vm, module, "const_set", 2, |vm, recv, args| {
        let module = this(vm, recv)?;
        let name = constant_name(vm, args.get(0))?;
        vm.const_set(module, name, args.get(1))?;
        Ok(args.get(1))
    });
    def(vm, module, "const_defined?", -2, |vm, recv, args| {
        args.check(1, Some(2))?;
        let module = this(vm, recv)?;
        let inherit = args.opt(1).is_none_or(Value::truthy);
        let name = constant_name(vm, args.get(0))?;
        Ok(Value::from_bool(vm.const_lookup_in(module, name, inherit).is_some()))
    });
    def(vm, module, "constants", -1, |vm, recv, args| {
        args.check(0, Some(1))?;
        let module = this(vm, recv)?;
        let inherit = args.opt(0).is_none_or(Value::truthy);
        let object = vm.core.object;
        let searched: Vec<HeapId> = if inherit {
            vm.ancestors(module)
                .into_iter()
                .take_while(|&id| id != object || module == object)
                .collect()
        } else {
            vec![module]
        };
        let mut seen = AHashSet::new();
        let mut names = Vec::new();
        for id in searched {
            for &name in vm.heap.module(id).constants.keys() {
                if seen.insert(name) {
                    names.push(Value::Symbol(name));
                }
            }
        }
        vm.new_array(names)
    });

    def(vm, module, "public", -1, |vm, recv, args| visibility(vm, recv, args, Visibility::Public));
    def(vm, module, "private", -1, |vm, recv, args| visibility(vm, recv, args, Visibility::Private));
    def(vm, module, "protected", -1, |vm, recv, args| visibility(vm, recv, args, Visibility::Protected));
    def(vm, module, "module_function", -1, module_function);
    def(vm, module, "private_class_method", -1, |vm, recv, args| {
        class_method_visibility(vm, recv, args, Visibility::Private)
    });
    def(vm, module, "public_class_method", -1, |vm, recv, args| {
        class_method_visibility(vm, recv, args, Visibility::Public)
    });

    def(vm, module, "class_eval", -1, |vm, recv, args| {
        let module = this(vm, recv)?;
        let Some(block) = args.block else {
            return Err(RunError::not_implemented("class_eval with a string"));
        };
        eval_in(vm, module, block, &[recv])
    });
    super::alias(vm, module, "module_eval", "class_eval");
    def(vm, module, "class_exec", -1, |vm, recv, args| {
        let module = this(vm, recv)?;
        let block = args.require_block()?;
        eval_in(vm, module, block, args.args)
    });
    super::alias(vm, module, "module_exec", "class_exec");

    for hook in ["included", "extended", "prepended", "method_added", "method_removed", "method_undefined"] {
        def_private(vm, module, hook, 1, |_, _, _| Ok(Value::Nil));
    }
    Ok(())
}

/// The receiver as a module id. Module methods only ever run on modules.
fn this(vm: &Vm, recv: Value) -> RunResult<HeapId> {
    vm.module_of(recv)
        .ok_or_else(|| RunError::type_error("receiver is not a class/module"))
}

fn mixin_arg(vm: &mut Vm, value: Value) -> RunResult<HeapId> {
    match vm.module_of(value) {
        Some(id) if vm.heap.as_class(id).is_none() => Ok(id),
        _ => {
            let name = vm.conversion_name(value);
            Err(RunError::type_error(format!("wrong argument type {name} (expected Module)")))
        }
    }
}

/// `A < B` and friends: `nil` when the two modules are unrelated.
fn relation(vm: &mut Vm, recv: Value, other: Value, or_equal: bool, reversed: bool) -> RunResult<Value> {
    let module = this(vm, recv)?;
    let Some(other) = vm.module_of(other) else {
        return Err(RunError::type_error("compared with non class/module"));
    };
    let (descendant, ancestor) = if reversed { (other, module) } else { (module, other) };
    if descendant == ancestor {
        return Ok(Value::from_bool(or_equal));
    }
    if vm.is_ancestor(descendant, ancestor) {
        Ok(Value::True)
    } else if vm.is_ancestor(ancestor, descendant) {
        Ok(Value::False)
    } else {
        Ok(Value::Nil)
    }
}

/// `include`/`prepend` of each argument, last first, firing the module's hook.
fn mixin(vm: &mut Vm, recv: Value, args: CallArgs<'_>, prepend: bool) -> RunResult<Value> {
    let target = this(vm, recv)?;
    for &arg in args.args.iter().rev() {
        let module = mixin_arg(vm, arg)?;
        let added = if prepend {
            vm.prepend_module(target, module)?
        } else {
            vm.include_module(target, module)?
        };
        if added {
            let hook = if prepend {
                StaticSymbols::Prepended
            } else {
                StaticSymbols::Included
            };
            vm.call_hook(Value::Ref(module), hook, &[recv])?;
        }
    }
    Ok(recv)
}

/// Method names visible through `recv` whose visibility passes `keep`.
fn method_names(vm: &mut Vm, recv: Value, args: CallArgs<'_>, keep: fn(Visibility) -> bool) -> RunResult<Value> {
    args.check(0, Some(1))?;
    let module = this(vm, recv)?;
    let inherit = args.opt(0).is_none_or(Value::truthy);
    let searched = if inherit { vm.ancestors(module) } else { vec![module] };
    let mut seen: AHashSet<Symbol> = AHashSet::new();
    let mut names = Vec::new();
    for id in searched {
        let record = vm.heap.module(id);
        for (&mid, callable) in &record.methods {
            if seen.insert(mid) && keep(callable.visibility()) {
                names.push(Value::Symbol(mid));
            }
        }
        seen.extend(record.undefined_methods.iter().copied());
    }
    vm.new_array(names)
}

fn defined_with(vm: &mut Vm, recv: Value, name: Value, keep: fn(Visibility) -> bool) -> RunResult<Value> {
    let module = this(vm, recv)?;
    let mid = vm.expect_name(name)?;
    Ok(Value::from_bool(
        vm.find_method(module, mid).is_some_and(|entry| keep(entry.callable.visibility())),
    ))
}

/// Installs a proc as method `mid` of `module`. The body runs with lambda argument rules
/// and the receiver as `self`.
pub(super) fn define_method_from(vm: &mut Vm, module: HeapId, mid: Symbol, body: Value) -> RunResult<()> {
    if !vm.is_proc(body) {
        let name = vm.conversion_name(body);
        return Err(RunError::type_error(format!(
            "wrong argument type {name} (expected Proc/Method/UnboundMethod)"
        )));
    }
    let callable = Callable::native(-1, move |vm, recv, args| {
        let bound = vm.with_binding(body, recv, None, true)?;
        vm.call_proc(bound, args.args, args.block)
    });
    vm.add_method(module, mid, callable)?;
    notify_method_added(vm, module, mid)
}

/// Fires `method_added`, or `singleton_method_added` on the owner of a singleton class.
pub(super) fn notify_method_added(vm: &mut Vm, module: HeapId, mid: Symbol) -> RunResult<()> {
    let attached = vm
        .heap
        .as_class(module)
        .filter(|class| class.is_singleton)
        .and_then(|class| class.attached);
    match attached {
        Some(object) => vm.call_hook(object, StaticSymbols::SingletonMethodAdded, &[Value::Symbol(mid)]),
        None => vm.call_hook(Value::Ref(module), StaticSymbols::MethodAdded, &[Value::Symbol(mid)]),
    }
}

fn attr(vm: &mut Vm, recv: Value, args: CallArgs<'_>, reader: bool, writer: bool) -> RunResult<Value> {
    let module = this(vm, recv)?;
    let mut defined = Vec::new();
    for &arg in args.args {
        let name = name_text(vm, arg)?;
        let valid = name
            .chars()
            .next()
            .is_some_and(|c| c.is_alphabetic() || c == '_')
            && name.chars().all(|c| c.is_alphanumeric() || c == '_');
        if !valid {
            return Err(ExcType::NameError.error(format!("invalid attribute name `{name}'")));
        }
        let ivar = vm.interns.intern(&format!("@{name}"));
        if reader {
            let mid = vm.interns.intern(&name);
            let getter = Callable::native(0, move |vm, recv, _| Ok(vm.ivar_get(recv, ivar)));
            vm.add_method(module, mid, getter)?;
            notify_method_added(vm, module, mid)?;
            defined.push(Value::Symbol(mid));
        }
        if writer {
            let mid = vm.interns.intern(&format!("{name}="));
            let setter = Callable::native(1, move |vm, recv, args| {
                let value = args.get(0);
                vm.ivar_set(recv, ivar, value)?;
                Ok(value)
            });
            vm.add_method(module, mid, setter)?;
            notify_method_added(vm, module, mid)?;
            defined.push(Value::Symbol(mid));
        }
    }
    vm.new_array(defined)
}

/// Method names from Symbols, Strings or Arrays of them, as `private :a, :b` or
/// `private [:a, :b]` pass them.
fn name_list(vm: &mut Vm, args: &[Value]) -> RunResult<Vec<Symbol>> {
    let mut names = Vec::with_capacity(args.len());
    for &arg in args {
        match vm.array_of(arg).cloned() {
            Some(items) => {
                for item in items {
                    names.push(vm.expect_name(item)?);
                }
            }
            None => names.push(vm.expect_name(arg)?),
        }
    }
    Ok(names)
}

/// `private`/`public`/`protected`: with names, changes those methods; without, sets the
/// default for later `def`s in the calling class body.
fn visibility(vm: &mut Vm, recv: Value, args: CallArgs<'_>, visibility: Visibility) -> RunResult<Value> {
    let module = this(vm, recv)?;
    if args.is_empty() {
        if let Some(frame) = vm.frames.last_mut()
            && frame.self_value.identical(recv)
        {
            frame.visibility = visibility;
            frame.module_function = false;
        }
        return Ok(Value::Nil);
    }
    for mid in name_list(vm, args.args)? {
        vm.set_method_visibility(module, mid, visibility)?;
    }
    super::pack_yield(vm, args.args)
}

fn module_function(vm: &mut Vm, recv: Value, args: CallArgs<'_>) -> RunResult<Value> {
    let module = this(vm, recv)?;
    if vm.heap.as_class(module).is_some() {
        return Err(RunError::type_error("module_function must be called for modules"));
    }
    if args.is_empty() {
        if let Some(frame) = vm.frames.last_mut()
            && frame.self_value.identical(recv)
        {
            frame.visibility = Visibility::Private;
            frame.module_function = true;
        }
        return Ok(Value::Nil);
    }
    let singleton = vm.singleton_class_of(recv)?;
    for mid in name_list(vm, args.args)? {
        let Some(entry) = vm.find_method(module, mid) else {
            let name = vm.module_display_name(module);
            return Err(ExcType::NameError.error(format!(
                "undefined method `{}' for module `{name}'",
                vm.interns.get(mid)
            )));
        };
        vm.add_method(singleton, mid, entry.callable.with_visibility(Visibility::Public))?;
        vm.set_method_visibility(module, mid, Visibility::Private)?;
    }
    super::pack_yield(vm, args.args)
}

fn class_method_visibility(vm: &mut Vm, recv: Value, args: CallArgs<'_>, visibility: Visibility) -> RunResult<Value> {
    let singleton = vm.singleton_class_of(recv)?;
    for mid in name_list(vm, args.args)? {
        vm.set_method_visibility(singleton, mid, visibility)?;
    }
    Ok(Value::Nil)
}

/// Runs `block` with `self` and the definition target set to `module`.
pub(super) fn eval_in(vm: &mut Vm, module: HeapId, block: Value, args: &[Value]) -> RunResult<Value> {
    let bound = vm.with_binding(block, Value::Ref(module), Some(module), false)?;
    vm.call_proc(bound, args, None)
}

fn name_text(vm: &mut Vm, value: Value) -> RunResult<String> {
    let mid = vm.expect_name(value)?;
    Ok(vm.interns.get(mid).to_owned())
}

fn constant_name(vm: &mut Vm, value: Value) -> RunResult<Symbol> {
    let mid = vm.expect_name(value)?;
    if vm.interns.get(mid).chars().next().is_some_and(char::is_uppercase) {
        Ok(mid)
    } else {
        Err(ExcType::NameError.error(format!("wrong constant name {}", vm.interns.get(mid))))
    }
}

fn uninitialized_constant(vm: &Vm, module: HeapId, name: &str) -> RunError {
    if module == vm.core.object {
        ExcType::NameError.error(format!("uninitialized constant {name}"))
    } else {
        let owner = vm.module_display_name(module);
        ExcType::NameError.error(format!("uninitialized constant {owner}::{name}"))
    }
}
