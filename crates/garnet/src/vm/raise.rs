//! Exception objects, backtraces and the host-facing [`Exception`].

use std::str::FromStr;

use crate::{
    exception::{ExcType, Exception, RunError, RunResult, SimpleException},
    heap::{ExceptionData, HeapData, HeapId},
    intern::StaticSymbols,
    value::Value,
    vm::Vm,
};

impl Vm {
    /// Allocates an exception of `class` carrying `message`.
    pub(crate) fn new_exception(&mut self, class: HeapId, message: Option<&str>) -> RunResult<HeapId> {
        let message = match message {
            Some(text) => self.new_string(text)?,
            None => Value::Nil,
        };
        let data = HeapData::Exception(ExceptionData {
            message,
            backtrace: None,
        });
        Ok(self.heap.allocate(class, data)?)
    }

    /// The heap object for an exception error, allocating one for a builtin `Exc`.
    pub(crate) fn materialize(&mut self, err: RunError) -> RunResult<HeapId> {
        match err {
            RunError::Raised(id) => Ok(id),
            RunError::Exc(exc) => {
                let SimpleException {
                    kind,
                    message,
                    backtrace,
                } = *exc;
                let id = self.new_exception(self.core.exception(kind), Some(&message))?;
                if let HeapData::Exception(data) = self.heap.data_mut(id) {
                    data.backtrace = backtrace;
                }
                Ok(id)
            }
            other => Err(other),
        }
    }

    /// Backtrace lines of the live frames, innermost first.
    #[must_use]
    pub(crate) fn backtrace_snapshot(&self) -> Vec<String> {
        self.frames
            .iter()
            .rev()
            .map(|frame| format!("{}:in `{}'", frame.iseq.path, frame.iseq.name))
            .collect()
    }

    /// Records where an exception was first seen unwinding and reports it to the tracer.
    ///
    /// Called while the raising frame is still on the frame stack; later frames leave an
    /// existing backtrace alone.
    pub(crate) fn note_raise(&mut self, err: &mut RunError) {
        match err {
            RunError::Exc(exc) if exc.backtrace.is_none() => {
                exc.backtrace = Some(self.backtrace_snapshot());
                let name: &'static str = exc.kind.into();
                self.tracer.on_raise(name);
            }
            RunError::Raised(id) => {
                let id = *id;
                let needs_trace = matches!(self.heap.data(id), HeapData::Exception(data) if data.backtrace.is_none());
                if needs_trace {
                    let snapshot = self.backtrace_snapshot();
                    if let HeapData::Exception(data) = self.heap.data_mut(id) {
                        data.backtrace = Some(snapshot);
                    }
                    let class_name = self.module_display_name(self.heap.class_of(id));
                    self.tracer.on_raise(&class_name);
                }
            }
            _ => {}
        }
    }

    /// The stored message of an exception, or its class name when none was given.
    pub(crate) fn exception_message(&mut self, exception: Value) -> RunResult<String> {
        let Some(id) = exception.heap_id() else {
            return self.to_s_value(exception);
        };
        let message = match self.heap.data(id) {
            HeapData::Exception(data) => data.message,
            _ => return self.to_s_value(exception),
        };
        if message.is_nil() {
            Ok(self.module_display_name(self.heap.class_of(id)))
        } else {
            self.to_s_value(message)
        }
    }

    /// The nearest builtin exception kind in `class`'s superclass chain.
    #[must_use]
    pub(crate) fn exception_kind_of(&self, class: HeapId) -> Option<ExcType> {
        let mut current = Some(class);
        while let Some(class) = current {
            if let Some(kind) = self.core.exception_kind(class) {
                return Some(kind);
            }
            current = self.heap.as_class(class).and_then(|c| c.superclass);
        }
        None
    }

    /// Whether `value` is an instance of Exception or a subclass.
    pub(crate) fn is_exception_object(&mut self, value: Value) -> bool {
        let exception = self.core.exception(ExcType::Exception);
        value.heap_id().is_some() && self.kind_of(value, exception)
    }

    /// Builds the error raised by `raise(...)` with the given arguments.
    ///
    /// Accepts no arguments (RuntimeError, or the current `$!`), a message, an exception
    /// class with an optional message, or an exception object.
    pub(crate) fn raise_error(&mut self, args: &[Value]) -> RunResult<RunError> {
        RunError::check_arity(args.len(), 0, Some(2))?;
        let Some(&first) = args.first() else {
            let current = self.global_get(StaticSymbols::ErrInfo.into());
            if let Value::Ref(id) = current
                && self.is_exception_object(current)
            {
                return Ok(RunError::Raised(id));
            }
            return Ok(ExcType::RuntimeError.error("unhandled exception"));
        };
        if let Some(message) = self.string_of(first) {
            if args.len() > 1 {
                return Err(RunError::type_error("exception class/object expected"));
            }
            return Ok(ExcType::RuntimeError.error(message.to_owned()));
        }
        if let Some(class) = self.class_value(first) {
            let exception = self.core.exception(ExcType::Exception);
            if !self.is_ancestor(class, exception) {
                return Err(RunError::type_error("exception class/object expected"));
            }
            let value = self.call_method(first, StaticSymbols::New.into(), &args[1..], None, None, false)?;
            return match value {
                Value::Ref(id) if self.is_exception_object(value) => Ok(RunError::Raised(id)),
                _ => Err(RunError::type_error("exception object expected")),
            };
        }
        if let Value::Ref(id) = first
            && self.is_exception_object(first)
        {
            if let Some(&message) = args.get(1) {
                if let HeapData::Exception(data) = self.heap.data_mut(id) {
                    data.message = message;
                }
            }
            return Ok(RunError::Raised(id));
        }
        Err(RunError::type_error("exception class/object expected"))
    }

    /// Converts an error that escaped to the host.
    pub(crate) fn to_exception(&mut self, err: RunError) -> Exception {
        match err {
            RunError::Exc(exc) => {
                let name: &'static str = exc.kind.into();
                Exception::new(
                    name.to_owned(),
                    Some(exc.kind),
                    exc.message,
                    exc.backtrace.unwrap_or_default(),
                )
            }
            RunError::Raised(id) => self.heap_exception(id),
            RunError::Break { .. } => Exception::new(
                "LocalJumpError".to_owned(),
                Some(ExcType::LocalJumpError),
                "break from proc-closure".to_owned(),
                Vec::new(),
            ),
            RunError::Return { .. } => Exception::new(
                "LocalJumpError".to_owned(),
                Some(ExcType::LocalJumpError),
                "unexpected return".to_owned(),
                Vec::new(),
            ),
            RunError::Resource(err) => {
                let class_name = err.class_name();
                Exception::new(
                    class_name.to_owned(),
                    ExcType::from_str(class_name).ok(),
                    err.to_string(),
                    Vec::new(),
                )
            }
            RunError::Internal(message) => Exception::new("fatal".to_owned(), None, message.into_owned(), Vec::new()),
        }
    }

    fn heap_exception(&mut self, id: HeapId) -> Exception {
        let class = self.heap.class_of(id);
        let class_name = self.module_display_name(class);
        let kind = self.exception_kind_of(class);
        let backtrace = match self.heap.data(id) {
            HeapData::Exception(data) => data.backtrace.clone().unwrap_or_default(),
            _ => Vec::new(),
        };
        let message = self
            .funcall(Value::Ref(id), StaticSymbols::Message.into(), &[])
            .map(|value| self.str_of(value).map(str::to_owned))
            .ok()
            .flatten()
            .unwrap_or_else(|| class_name.clone());
        Exception::new(class_name, kind, message, backtrace)
    }
}
