//! Exception and its subclasses.
//!
//! Builtin errors travel as lightweight `RunError::Exc` values and only become heap objects
//! when a handler or a method here needs one; the payload is [`ExceptionData`].

use crate::{
    builtins::{def, def_private, def_singleton},
    exception::{ExcType, RunResult},
    heap::{ExceptionData, HeapData},
    intern::StaticSymbols,
    value::Value,
    vm::Vm,
};

pub(super) fn register(vm: &mut Vm) -> RunResult<()> {
    let class = vm.core.exception(ExcType::Exception);
    def_singleton(vm, class, "exception", -1, |vm, recv, args| {
        vm.call_method(recv, StaticSymbols::New.into(), args.args, args.block, None, false)
    })?;

    def_private(vm, class, "initialize", -1, |vm, recv, args| {
        args.check(0, Some(1))?;
        let message = args.opt(0).unwrap_or(Value::Nil);
        if let Some(data) = data_mut(vm, recv) {
            data.message = message;
        }
        Ok(Value::Nil)
    });
    def(vm, class, "to_s", 0, |vm, recv, _| {
        let message = data_of(vm, recv).map_or(Value::Nil, |data| data.message);
        if message.is_nil() {
            let name = vm.module_display_name(vm.class_of(recv));
            return vm.new_string_owned(name);
        }
        let text = vm.to_s_value(message)?;
        vm.new_string_owned(text)
    });
    def(vm, class, "message", 0, |vm, recv, _| vm.funcall(recv, StaticSymbols::ToS.into(), &[]));
    def(vm, class, "inspect", 0, |vm, recv, _| {
        let name = vm.module_display_name(vm.class_of(recv));
        let message = vm.funcall(recv, StaticSymbols::ToS.into(), &[])?;
        let message = vm.to_s_value(message)?;
        let text = if message.is_empty() {
            name
        } else if message == name {
            message
        } else {
            format!("#<{name}: {message}>")
        };
        vm.new_string_owned(text)
    });
    def(vm, class, "full_message", -1, |vm, recv, _| {
        let name = vm.module_display_name(vm.class_of(recv));
        let message = vm.funcall(recv, StaticSymbols::Message.into(), &[])?;
        let message = vm.to_s_value(message)?;
        let backtrace = data_of(vm, recv).and_then(|data| data.backtrace.clone()).unwrap_or_default();
        let mut lines = backtrace.iter();
        let origin = lines.next().map_or("-", String::as_str);
        let mut text = format!("{origin}: {message} ({name})");
        for line in lines {
            text.push_str("\n\tfrom ");
            text.push_str(line);
        }
        vm.new_string_owned(text)
    });
    def(vm, class, "backtrace", 0, |vm, recv, _| {
        let Some(backtrace) = data_of(vm, recv).and_then(|data| data.backtrace.clone()) else {
            return Ok(Value::Nil);
        };
        let mut lines = Vec::with_capacity(backtrace.len());
        for line in backtrace {
            lines.push(vm.new_string_owned(line)?);
        }
        vm.new_array(lines)
    });
    def(vm, class, "exception", -1, |vm, recv, args| {
        args.check(0, Some(1))?;
        let Some(message) = args.opt(0) else {
            return Ok(recv);
        };
        if data_of(vm, recv).is_some_and(|data| data.message.identical(message)) {
            return Ok(recv);
        }
        let clone = vm.interns.intern("clone");
        let copy = vm.funcall(recv, clone, &[])?;
        if let Some(data) = data_mut(vm, copy) {
            data.message = message;
        }
        Ok(copy)
    });
    def(vm, class, "==", 1, |vm, recv, args| {
        let other = args.get(0);
        if recv.identical(other) {
            return Ok(Value::True);
        }
        if vm.class_of(recv) != vm.class_of(other) {
            return Ok(Value::False);
        }
        let message = StaticSymbols::Message.into();
        let (ours, theirs) = (vm.funcall(recv, message, &[])?, vm.funcall(other, message, &[])?);
        if !vm.values_eq(ours, theirs)? {
            return Ok(Value::False);
        }
        let traces = (
            data_of(vm, recv).map(|data| data.backtrace.clone()),
            data_of(vm, other).map(|data| data.backtrace.clone()),
        );
        Ok(Value::from_bool(traces.0 == traces.1))
    });
    Ok(())
}

fn data_of(vm: &Vm, value: Value) -> Option<&ExceptionData> {
    match vm.heap.data(value.heap_id()?) {
        HeapData::Exception(data) => Some(data),
        _ => None,
    }
}

fn data_mut(vm: &mut Vm, value: Value) -> Option<&mut ExceptionData> {
    match vm.heap.data_mut(value.heap_id()?) {
        HeapData::Exception(data) => Some(data),
        _ => None,
    }
}
