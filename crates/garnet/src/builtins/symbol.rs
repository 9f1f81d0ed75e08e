//! Symbol.

use crate::{
    builtins::def,
    types::string,
    value::Value,
    vm::Vm,
};

pub(super) fn register(vm: &mut Vm) {
    let symbol = vm.core.symbol;
    def(vm, symbol, "to_s", 0, |vm, recv, _| {
        let name = name_of(vm, recv).to_owned();
        vm.new_string_owned(name)
    });
    super::alias(vm, symbol, "id2name", "to_s");
    super::alias(vm, symbol, "name", "to_s");
    def(vm, symbol, "to_sym", 0, |_, recv, _| Ok(recv));
    def(vm, symbol, "inspect", 0, |vm, recv, _| {
        let text = string::inspect_symbol(name_of(vm, recv));
        vm.new_string_owned(text)
    });
    def(vm, symbol, "to_proc", 0, |vm, recv, _| match recv {
        Value::Symbol(mid) => vm.symbol_proc(mid),
        _ => Ok(Value::Nil),
    });
    def(vm, symbol, "==", 1, |_, recv, args| Ok(Value::from_bool(recv.identical(args.get(0)))));
    def(vm, symbol, "<=>", 1, |vm, recv, args| match args.get(0) {
        Value::Symbol(_) => {
            let ordering = name_of(vm, recv).cmp(name_of(vm, args.get(0)));
            Ok(Value::Integer(ordering as i64))
        }
        _ => Ok(Value::Nil),
    });
    def(vm, symbol, "length", 0, |vm, recv, _| Ok(Value::Integer(name_of(vm, recv).chars().count() as i64)));
    super::alias(vm, symbol, "size", "length");
    def(vm, symbol, "upcase", 0, |vm, recv, _| {
        let upper = name_of(vm, recv).to_uppercase();
        Ok(Value::Symbol(vm.interns.intern(&upper)))
    });
    def(vm, symbol, "downcase", 0, |vm, recv, _| {
        let lower = name_of(vm, recv).to_lowercase();
        Ok(Value::Symbol(vm.interns.intern(&lower)))
    });
    def(vm, symbol, "empty?", 0, |vm, recv, _| Ok(Value::from_bool(name_of(vm, recv).is_empty())));
}

fn name_of(vm: &Vm, value: Value) -> &str {
    match value {
        Value::Symbol(sym) => vm.interns.get(sym),
        _ => "",
    }
}
