//! Proc.

use crate::{
    builtins::{def, def_singleton},
    exception::{RunError, RunResult},
    value::Value,
    vm::Vm,
};

pub(super) fn register(vm: &mut Vm) -> RunResult<()> {
    let class = vm.core.proc;
    def_singleton(vm, class, "new", -1, |vm, _, args| match args.block {
        Some(block) => vm.proc_from_block(block, false),
        None => Err(RunError::argument("tried to create Proc object without a block")),
    })?;

    def(vm, class, "call", -1, |vm, recv, args| vm.call_proc(recv, args.args, args.block));
    for name in ["()", "yield", "[]", "==="] {
        super::alias(vm, class, name, "call");
    }
    def(vm, class, "to_proc", 0, |_, recv, _| Ok(recv));
    def(vm, class, "arity", 0, |vm, recv, _| Ok(Value::Integer(vm.proc_of(recv)?.arity())));
    def(vm, class, "lambda?", 0, |vm, recv, _| Ok(Value::from_bool(vm.proc_of(recv)?.is_lambda)));
    def(vm, class, "inspect", 0, |vm, recv, _| {
        let text = vm.builtin_inspect(recv)?;
        vm.new_string_owned(text)
    });
    super::alias(vm, class, "to_s", "inspect");
    Ok(())
}
