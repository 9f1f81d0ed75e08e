//! NilClass, TrueClass and FalseClass.

use crate::{builtins::def, vm::Vm, value::Value};

pub(super) fn register(vm: &mut Vm) {
    let nil = vm.core.nil_class;
    def(vm, nil, "to_s", 0, |vm, _, _| vm.new_string(""));
    def(vm, nil, "to_a", 0, |vm, _, _| vm.new_array(Vec::new()));
    def(vm, nil, "to_i", 0, |_, _, _| Ok(Value::Integer(0)));
    def(vm, nil, "to_f", 0, |_, _, _| Ok(Value::Float(0.0)));
    def(vm, nil, "inspect", 0, |vm, _, _| vm.new_string("nil"));
    def(vm, nil, "nil?", 0, |_, _, _| Ok(Value::True));
    def(vm, nil, "&", 1, |_, _, _| Ok(Value::False));
    def(vm, nil, "|", 1, |_, _, args| Ok(Value::from_bool(args.get(0).truthy())));
    def(vm, nil, "^", 1, |_, _, args| Ok(Value::from_bool(args.get(0).truthy())));

    let true_class = vm.core.true_class;
    def(vm, true_class, "to_s", 0, |vm, _, _| vm.new_string("true"));
    def(vm, true_class, "inspect", 0, |vm, _, _| vm.new_string("true"));
    def(vm, true_class, "&", 1, |_, _, args| Ok(Value::from_bool(args.get(0).truthy())));
    def(vm, true_class, "|", 1, |_, _, _| Ok(Value::True));
    def(vm, true_class, "^", 1, |_, _, args| Ok(Value::from_bool(!args.get(0).truthy())));

    let false_class = vm.core.false_class;
    def(vm, false_class, "to_s", 0, |vm, _, _| vm.new_string("false"));
    def(vm, false_class, "inspect", 0, |vm, _, _| vm.new_string("false"));
    def(vm, false_class, "&", 1, |_, _, _| Ok(Value::False));
    def(vm, false_class, "|", 1, |_, _, args| Ok(Value::from_bool(args.get(0).truthy())));
    def(vm, false_class, "^", 1, |_, _, args| Ok(Value::from_bool(args.get(0).truthy())));
}
