//! Procs, `yield` and break tags.

use std::rc::Rc;

use crate::{
    callable::Visibility,
    exception::{RunError, RunResult},
    heap::{HeapData, HeapId},
    intern::{StaticSymbols, Symbol},
    iseq::Iseq,
    types::{Binding, Proc, ProcBody},
    value::Value,
    vm::{Cref, Frame, FrameKind, Scope, Vm, args::ArgMode},
};

impl Vm {
    pub(crate) fn new_break_tag(&mut self) -> u64 {
        self.next_break_tag += 1;
        self.next_break_tag
    }

    /// Binding of the running frame; the top-level binding when no frame is active.
    pub(crate) fn current_binding(&self) -> Binding {
        match self.frames.last() {
            Some(frame) => Binding {
                self_value: frame.self_value,
                scope: Rc::clone(&frame.scope),
                cref: Rc::clone(&frame.cref),
                block: frame.block,
                home: frame.home,
                method: frame.method.clone(),
            },
            None => Binding {
                self_value: self.main,
                scope: Scope::new(0, None),
                cref: Cref::root(self.core.object),
                block: None,
                home: 0,
                method: None,
            },
        }
    }

    fn alloc_proc(&mut self, proc: Proc) -> RunResult<Value> {
        Ok(Value::Ref(self.heap.allocate(self.core.proc, HeapData::Proc(proc))?))
    }

    /// Creates the Proc for a literal block at a call site.
    pub(crate) fn make_block(&mut self, iseq: &Rc<Iseq>, break_tag: u64) -> RunResult<Value> {
        let proc = Proc {
            body: ProcBody::Iseq(Rc::clone(iseq)),
            binding: self.current_binding(),
            break_tag,
            is_lambda: false,
        };
        self.alloc_proc(proc)
    }

    /// A Proc backed by a host closure `(vm, args, block)`.
    pub fn new_native_proc(
        &mut self,
        lambda: bool,
        func: impl Fn(&mut Self, &[Value], Option<Value>) -> RunResult<Value> + 'static,
    ) -> RunResult<Value> {
        let break_tag = self.new_break_tag();
        self.native_proc_with_tag(break_tag, lambda, func)
    }

    /// A native proc whose closure may return `RunError::Break { tag: break_tag, .. }` to stop
    /// the iteration that calls it.
    pub(crate) fn native_proc_with_tag(
        &mut self,
        break_tag: u64,
        lambda: bool,
        func: impl Fn(&mut Self, &[Value], Option<Value>) -> RunResult<Value> + 'static,
    ) -> RunResult<Value> {
        let proc = Proc {
            body: ProcBody::Native(Rc::new(func)),
            binding: self.current_binding(),
            break_tag,
            is_lambda: lambda,
        };
        self.alloc_proc(proc)
    }

    /// A copy of a Proc that runs with `self_value` as self and, when given, `module` as the
    /// innermost lexical scope. `instance_exec`, `class_eval` and `define_method` call
    /// through it; `lambda` forces lambda argument and `return` rules.
    pub(crate) fn with_binding(
        &mut self,
        proc_value: Value,
        self_value: Value,
        module: Option<HeapId>,
        lambda: bool,
    ) -> RunResult<Value> {
        let proc = self.proc_of(proc_value)?;
        let cref = match module {
            Some(module) => proc.binding.cref.nested(module),
            None => Rc::clone(&proc.binding.cref),
        };
        let binding = Binding {
            cref,
            ..proc.binding.with_self(self_value)
        };
        let copy = Proc {
            is_lambda: proc.is_lambda || lambda,
            ..proc.with_binding(binding)
        };
        self.alloc_proc(copy)
    }

    /// `proc { }` / `lambda { }` / `Proc.new { }`: the literal block becomes the proc, with
    /// lambda-ness fixed by the creating method.
    pub(crate) fn proc_from_block(&mut self, block: Value, lambda: bool) -> RunResult<Value> {
        let proc = self.proc_of(block)?;
        if proc.is_lambda == lambda || matches!(proc.body, ProcBody::Native(_)) {
            return Ok(block);
        }
        let copy = Proc { is_lambda: lambda, ..proc };
        self.alloc_proc(copy)
    }

    pub(crate) fn proc_of(&self, value: Value) -> RunResult<Proc> {
        match value {
            Value::Ref(id) => match self.heap.data(id) {
                HeapData::Proc(proc) => Ok(proc.clone()),
                _ => Err(RunError::type_error(format!(
                    "wrong argument type {} (expected Proc)",
                    self.conversion_name(value)
                ))),
            },
            _ => Err(RunError::type_error(format!(
                "wrong argument type {} (expected Proc)",
                self.conversion_name(value)
            ))),
        }
    }

    #[must_use]
    pub(crate) fn is_proc(&self, value: Value) -> bool {
        matches!(value, Value::Ref(id) if matches!(self.heap.data(id), HeapData::Proc(_)))
    }

    /// Calls a Proc value with ordinary `call` semantics.
    pub(crate) fn call_proc(&mut self, proc_value: Value, args: &[Value], block: Option<Value>) -> RunResult<Value> {
        let proc = self.proc_of(proc_value)?;
        match &proc.body {
            ProcBody::Native(func) => {
                let func = Rc::clone(func);
                self.enter_native()?;
                let result = func(self, args, block);
                self.native_depth -= 1;
                result
            }
            ProcBody::Iseq(iseq) => {
                let iseq = Rc::clone(iseq);
                self.run_proc_frame(&proc, &iseq, args, block)
            }
        }
    }

    fn run_proc_frame(
        &mut self,
        proc: &Proc,
        iseq: &Rc<Iseq>,
        args: &[Value],
        block: Option<Value>,
    ) -> RunResult<Value> {
        let lambda = proc.is_lambda;
        let binding = &proc.binding;
        let scope = Scope::new(iseq.local_table.len(), Some(Rc::clone(&binding.scope)));
        let mode = if lambda { ArgMode::Strict } else { ArgMode::Lenient };
        let start = self.bind_params(iseq, &scope, args, block, mode, false)?;
        let serial = self.next_frame_serial();
        let frame = Frame {
            iseq: Rc::clone(iseq),
            stack_base: self.stack.len(),
            self_value: binding.self_value,
            scope,
            cref: Rc::clone(&binding.cref),
            block: binding.block,
            kind: if lambda { FrameKind::Lambda } else { FrameKind::Block },
            serial,
            home: if lambda { serial } else { binding.home },
            break_tag: Some(proc.break_tag),
            method: binding.method.clone(),
            visibility: Visibility::Public,
            module_function: false,
            pending: Vec::new(),
        };
        self.run_frame(frame, start)
    }

    /// Calls the block handed to a native method, raising LocalJumpError when there is none.
    pub fn call_block(&mut self, block: Option<Value>, args: &[Value]) -> RunResult<Value> {
        match block {
            Some(block) => self.call_proc(block, args, None),
            None => Err(RunError::local_jump("no block given (yield)")),
        }
    }

    /// Converts a `&blk` argument into a block: nil for none, Procs as is, Symbols through
    /// `to_proc`, anything else by sending `to_proc`.
    pub(crate) fn to_block(&mut self, value: Value) -> RunResult<Option<Value>> {
        match value {
            Value::Nil => Ok(None),
            Value::Symbol(sym) => self.symbol_proc(sym).map(Some),
            v if self.is_proc(v) => Ok(Some(v)),
            other => {
                let converted = self.funcall(other, StaticSymbols::ToProc.into(), &[])?;
                if self.is_proc(converted) {
                    Ok(Some(converted))
                } else {
                    let class_name = self.conversion_name(other);
                    let got = self.conversion_name(converted);
                    Err(RunError::type_error(format!(
                        "can't convert {class_name} to Proc ({class_name}#to_proc gives {got})"
                    )))
                }
            }
        }
    }

    /// `:name.to_proc`: calls `name` on the first argument with the rest.
    pub(crate) fn symbol_proc(&mut self, mid: Symbol) -> RunResult<Value> {
        self.new_native_proc(true, move |vm, args, block| {
            let Some((&receiver, rest)) = args.split_first() else {
                return Err(RunError::argument("no receiver given"));
            };
            vm.call_method(receiver, mid, rest, block, None, false)
        })
    }
}
