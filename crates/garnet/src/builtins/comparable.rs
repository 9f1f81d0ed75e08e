//! Comparable, built on the including class's `<=>`.

use std::cmp::Ordering;

use crate::{
    builtins::def,
    callable::CallArgs,
    exception::{RunError, RunResult},
    intern::StaticSymbols,
    value::Value,
    vm::Vm,
};

pub(super) fn register(vm: &mut Vm) {
    let comparable = vm.core.comparable;
    def(vm, comparable, "==", 1, |vm, recv, args| {
        let other = args.get(0);
        if recv.identical(other) {
            return Ok(Value::True);
        }
        let result = vm.funcall(recv, StaticSymbols::Cmp.into(), &[other])?;
        Ok(Value::from_bool(vm.ordering_of(result) == Some(Ordering::Equal)))
    });
    def(vm, comparable, "<", 1, |vm, recv, args| test(vm, recv, args, Ordering::is_lt));
    def(vm, comparable, "<=", 1, |vm, recv, args| test(vm, recv, args, Ordering::is_le));
    def(vm, comparable, ">", 1, |vm, recv, args| test(vm, recv, args, Ordering::is_gt));
    def(vm, comparable, ">=", 1, |vm, recv, args| test(vm, recv, args, Ordering::is_ge));
    def(vm, comparable, "between?", 2, |vm, recv, args| {
        let above = cmp(vm, recv, args.get(0))?.is_ge();
        let below = cmp(vm, recv, args.get(1))?.is_le();
        Ok(Value::from_bool(above && below))
    });
    def(vm, comparable, "clamp", 2, |vm, recv, args| {
        let (min, max) = (args.get(0), args.get(1));
        if cmp(vm, min, max)?.is_gt() {
            return Err(RunError::argument("min argument must be less than or equal to max argument"));
        }
        if cmp(vm, recv, min)?.is_lt() {
            Ok(min)
        } else if cmp(vm, recv, max)?.is_gt() {
            Ok(max)
        } else {
            Ok(recv)
        }
    });
}

/// `a <=> b` through dispatch, failing with "comparison of X with Y failed".
fn cmp(vm: &mut Vm, a: Value, b: Value) -> RunResult<Ordering> {
    let result = vm.funcall(a, StaticSymbols::Cmp.into(), &[b])?;
    match vm.ordering_of(result) {
        Some(ordering) => Ok(ordering),
        None => Err(vm.comparison_failed(a, b)),
    }
}

fn test(vm: &mut Vm, recv: Value, args: CallArgs<'_>, check: fn(Ordering) -> bool) -> RunResult<Value> {
    Ok(Value::from_bool(check(cmp(vm, recv, args.get(0))?)))
}
