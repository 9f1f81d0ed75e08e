//! IO (`STDOUT`, `STDERR`) and the text rendering shared with `Kernel#puts`/`print`/`p`.

use std::borrow::Cow;

use crate::{
    builtins::def,
    callable::CallArgs,
    exception::{RunError, RunResult},
    heap::{HeapData, IoStream},
    intern::StaticSymbols,
    value::Value,
    vm::Vm,
};

pub(super) fn register(vm: &mut Vm) {
    let io = vm.core.io;
    def(vm, io, "puts", -1, |vm, recv, args| {
        let text = puts_text(vm, args.args)?;
        let stream = stream_of(vm, recv)?;
        emit(vm, stream, &text)?;
        Ok(Value::Nil)
    });
    def(vm, io, "print", -1, |vm, recv, args| {
        let text = print_text(vm, args.args)?;
        let stream = stream_of(vm, recv)?;
        emit(vm, stream, &text)?;
        Ok(Value::Nil)
    });
    def(vm, io, "write", -1, |vm, recv, args| {
        let text = print_text(vm, args.args)?;
        let stream = stream_of(vm, recv)?;
        emit(vm, stream, &text)?;
        Ok(Value::Integer(text.len() as i64))
    });
    def(vm, io, "<<", 1, |vm, recv, args| {
        let text = vm.to_s_value(args.get(0))?;
        let stream = stream_of(vm, recv)?;
        emit(vm, stream, &text)?;
        Ok(recv)
    });
    def(vm, io, "p", -1, |vm, recv, args| {
        let text = p_text(vm, args.args)?;
        let stream = stream_of(vm, recv)?;
        emit(vm, stream, &text)?;
        p_result(vm, args)
    });
    def(vm, io, "fileno", 0, |vm, recv, _| Ok(Value::Integer(stream_of(vm, recv)?.fileno())));
    def(vm, io, "sync", 0, |_, _, _| Ok(Value::True));
    def(vm, io, "sync=", 1, |_, _, args| Ok(args.get(0)));
    def(vm, io, "flush", 0, |_, recv, _| Ok(recv));
    def(vm, io, "tty?", 0, |_, _, _| Ok(Value::False));
}

fn stream_of(vm: &Vm, value: Value) -> RunResult<IoStream> {
    match value {
        Value::Ref(id) => match vm.heap.data(id) {
            HeapData::Io(stream) => Ok(*stream),
            _ => Err(RunError::type_error("uninitialized stream")),
        },
        _ => Err(RunError::type_error("uninitialized stream")),
    }
}

/// Sends `text` to a stream through the print writer, pushing newlines separately.
fn emit(vm: &mut Vm, stream: IoStream, text: &str) -> RunResult<()> {
    match stream {
        IoStream::Stdout => {
            for piece in text.split_inclusive('\n') {
                match piece.strip_suffix('\n') {
                    Some(line) => {
                        if !line.is_empty() {
                            vm.print.stdout_write(Cow::Borrowed(line))?;
                        }
                        vm.print.stdout_push('\n')?;
                    }
                    None => vm.print.stdout_write(Cow::Borrowed(piece))?,
                }
            }
            Ok(())
        }
        IoStream::Stderr => vm.print.stderr_write(Cow::Borrowed(text)),
    }
}

/// Writes `text` to `$stdout`: straight to the print writer for the builtin streams, through
/// `write` for any other object assigned to it.
pub(super) fn write_stdout(vm: &mut Vm, text: &str) -> RunResult<()> {
    let target = vm.global_get(StaticSymbols::Stdout.into());
    let stream = match target {
        Value::Nil => Some(IoStream::Stdout),
        Value::Ref(id) => match vm.heap.data(id) {
            HeapData::Io(stream) => Some(*stream),
            _ => None,
        },
        _ => None,
    };
    match stream {
        Some(stream) => emit(vm, stream, text),
        None => {
            let text = vm.new_string(text)?;
            let write = vm.interns.intern("write");
            vm.call_method(target, write, &[text], None, None, false)?;
            Ok(())
        }
    }
}

/// Output of `puts`: one line per argument, arrays flattened, a newline added unless the
/// line already ends in one.
pub(super) fn puts_text(vm: &mut Vm, args: &[Value]) -> RunResult<String> {
    if args.is_empty() {
        return Ok("\n".to_owned());
    }
    let mut out = String::new();
    let mut seen = Vec::new();
    for &arg in args {
        puts_one(vm, arg, &mut out, &mut seen)?;
    }
    Ok(out)
}

fn puts_one(vm: &mut Vm, value: Value, out: &mut String, seen: &mut Vec<Value>) -> RunResult<()> {
    if let Some(items) = vm.array_of(value).cloned() {
        if seen.iter().any(|v| v.identical(value)) {
            out.push_str("[...]\n");
            return Ok(());
        }
        seen.push(value);
        for item in items {
            puts_one(vm, item, out, seen)?;
        }
        seen.pop();
        return Ok(());
    }
    let line = if value.is_nil() { String::new() } else { vm.to_s_value(value)? };
    out.push_str(&line);
    if !line.ends_with('\n') {
        out.push('\n');
    }
    Ok(())
}

pub(super) fn print_text(vm: &mut Vm, args: &[Value]) -> RunResult<String> {
    let mut out = String::new();
    for &arg in args {
        out.push_str(&vm.to_s_value(arg)?);
    }
    Ok(out)
}

pub(super) fn p_text(vm: &mut Vm, args: &[Value]) -> RunResult<String> {
    let mut out = String::new();
    for &arg in args {
        out.push_str(&vm.inspect_value(arg)?);
        out.push('\n');
    }
    Ok(out)
}

/// `p` returns nil, its only argument, or all of them as an Array.
pub(super) fn p_result(vm: &mut Vm, args: CallArgs<'_>) -> RunResult<Value> {
    match args.args {
        [] => Ok(Value::Nil),
        [one] => Ok(*one),
        many => vm.new_array(many.to_vec()),
    }
}
