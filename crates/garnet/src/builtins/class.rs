//! Class: instantiation and the superclass chain.

use crate::{
    builtins::{def, def_private, def_singleton, module::eval_in},
    exception::{RunError, RunResult},
    intern::StaticSymbols,
    value::Value,
    vm::Vm,
};

pub(super) fn register(vm: &mut Vm) -> RunResult<()> {
    let class = vm.core.class;
    def_singleton(vm, class, "new", -1, |vm, _, args| {
        args.check(0, Some(1))?;
        let superclass = match args.opt(0) {
            Some(value) => match value {
                Value::Ref(id) if vm.heap.is_module(id) => id,
                other => {
                    let name = vm.conversion_name(other);
                    return Err(RunError::type_error(format!(
                        "superclass must be an instance of Class (given an instance of {name})"
                    )));
                }
            },
            None => vm.core.object,
        };
        vm.check_subclassable(superclass)?;
        let created = vm.new_class(None, superclass, None)?;
        if let Some(block) = args.block {
            eval_in(vm, created, block, &[Value::Ref(created)])?;
        }
        Ok(Value::Ref(created))
    })?;

    def(vm, class, "new", -1, |vm, recv, args| {
        let Some(class) = vm.class_value(recv) else {
            return Err(RunError::type_error("receiver is not a class"));
        };
        let object = vm.allocate_instance(class)?;
        vm.call_method(
            object,
            StaticSymbols::Initialize.into(),
            args.args,
            args.block,
            args.call_data,
            true,
        )?;
        Ok(object)
    });
    def(vm, class, "allocate", 0, |vm, recv, _| match vm.class_value(recv) {
        Some(class) => vm.allocate_instance(class),
        None => Err(RunError::type_error("receiver is not a class")),
    });
    def(vm, class, "superclass", 0, |vm, recv, _| {
        let superclass = vm
            .class_value(recv)
            .and_then(|class| vm.heap.class(class).superclass);
        Ok(superclass.map_or(Value::Nil, Value::Ref))
    });
    def(vm, class, "singleton_class?", 0, |vm, recv, _| {
        let singleton = vm.class_value(recv).is_some_and(|class| vm.heap.class(class).is_singleton);
        Ok(Value::from_bool(singleton))
    });
    def_private(vm, class, "inherited", 1, |_, _, _| Ok(Value::Nil));
    Ok(())
}
