//! Methods of the core classes and modules.
//!
//! Each submodule installs the methods of one class or module. Every builtin is an ordinary
//! [`Callable::Native`] entry in its owner's method table, so programs can redefine, alias,
//! remove or undefine it like any method they wrote themselves.

mod array;
mod class;
mod comparable;
mod enumerable;
mod exception;
pub(crate) mod float;
mod hash;
mod integer;
mod io;
mod kernel;
mod module;
mod nil;
mod proc;
mod regexp;
mod string;
mod symbol;

use std::cmp::Ordering;

use crate::{
    callable::{CallArgs, Callable, Visibility},
    exception::{RunError, RunResult},
    heap::HeapId,
    value::Value,
    vm::Vm,
};

/// Signature shared by every builtin method.
pub(crate) type NativeMethod = fn(&mut Vm, Value, CallArgs<'_>) -> RunResult<Value>;

/// Installs every builtin method. Runs once, right after bootstrap.
pub(crate) fn register(vm: &mut Vm) -> RunResult<()> {
    kernel::register(vm)?;
    module::register(vm)?;
    class::register(vm)?;
    comparable::register(vm);
    enumerable::register(vm);
    nil::register(vm);
    integer::register(vm);
    float::register(vm);
    string::register(vm);
    symbol::register(vm);
    array::register(vm);
    hash::register(vm);
    proc::register(vm)?;
    exception::register(vm)?;
    regexp::register(vm)?;
    io::register(vm);
    Ok(())
}

pub(crate) fn def(vm: &mut Vm, module: HeapId, name: &str, arity: i32, func: NativeMethod) {
    install(vm, module, name, Callable::native(arity, func));
}

pub(crate) fn def_private(vm: &mut Vm, module: HeapId, name: &str, arity: i32, func: NativeMethod) {
    install(vm, module, name, Callable::native(arity, func).with_visibility(Visibility::Private));
}

/// Defines a method on `module`'s singleton class.
pub(crate) fn def_singleton(vm: &mut Vm, module: HeapId, name: &str, arity: i32, func: NativeMethod) -> RunResult<()> {
    let singleton = vm.singleton_class_of(Value::Ref(module))?;
    def(vm, singleton, name, arity, func);
    Ok(())
}

/// Makes `new` share the body of `module`'s own builtin `old`.
pub(crate) fn alias(vm: &mut Vm, module: HeapId, new: &str, old: &str) {
    let old = vm.interns.intern(old);
    if let Some(callable) = vm.heap.module(module).methods.get(&old).cloned() {
        install(vm, module, new, callable);
    }
}

fn install(vm: &mut Vm, module: HeapId, name: &str, callable: Callable) {
    let mid = vm.interns.intern(name);
    vm.install_native(module, mid, callable);
}

/// The value a block sees for one yield: nothing is nil, one value is itself and several are
/// packed into an Array.
pub(crate) fn pack_yield(vm: &mut Vm, args: &[Value]) -> RunResult<Value> {
    match args {
        [] => Ok(Value::Nil),
        [one] => Ok(*one),
        many => vm.new_array(many.to_vec()),
    }
}

/// Result of a sort block (`{ |a, b| ... }`) as an ordering.
pub(crate) fn block_ordering(vm: &mut Vm, block: Value, a: Value, b: Value) -> RunResult<Ordering> {
    let result = vm.call_block(Some(block), &[a, b])?;
    match vm.ordering_of(result) {
        Some(ordering) => Ok(ordering),
        None => Err(vm.comparison_failed(a, b)),
    }
}

/// Stable merge sort with a fallible comparison.
pub(crate) fn sort_values(
    vm: &mut Vm,
    items: Vec<Value>,
    compare: &mut dyn FnMut(&mut Vm, Value, Value) -> RunResult<Ordering>,
) -> RunResult<Vec<Value>> {
    if items.len() <= 1 {
        return Ok(items);
    }
    let mut right = items;
    let left = right.drain(..right.len() / 2).collect();
    let left = sort_values(vm, left, compare)?;
    let right = sort_values(vm, right, compare)?;
    let mut merged = Vec::with_capacity(left.len() + right.len());
    let (mut i, mut j) = (0, 0);
    while i < left.len() && j < right.len() {
        if compare(vm, right[j], left[i])? == Ordering::Less {
            merged.push(right[j]);
            j += 1;
        } else {
            merged.push(left[i]);
            i += 1;
        }
    }
    merged.extend_from_slice(&left[i..]);
    merged.extend_from_slice(&right[j..]);
    Ok(merged)
}

/// A non-negative count argument such as `first(n)` or `take(n)`.
pub(crate) fn count_arg(vm: &mut Vm, value: Value) -> RunResult<usize> {
    let n = vm.expect_int(value)?;
    usize::try_from(n).map_err(|_| RunError::argument("negative array size"))
}
