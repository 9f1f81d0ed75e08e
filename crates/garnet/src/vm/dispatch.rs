//! Method calls: lookup, visibility, `method_missing` and `super`.

use crate::{
    callable::{CallArgs, Callable, Visibility},
    exception::{ExcType, RunError, RunResult},
    heap::HeapId,
    intern::{StaticSymbols, Symbol},
    iseq::{CallData, CallFlags},
    value::Value,
    vm::{MethodContext, Vm},
};

impl Vm {
    /// Sends `mid` to `receiver`.
    ///
    /// `fcall` marks a receiverless call, which may reach private methods.
    pub(crate) fn call_method(
        &mut self,
        receiver: Value,
        mid: Symbol,
        args: &[Value],
        block: Option<Value>,
        call_data: Option<&CallData>,
        fcall: bool,
    ) -> RunResult<Value> {
        let class = self.dispatch_class(receiver)?;
        let Some(entry) = self.find_method(class, mid) else {
            return self.method_missing(receiver, mid, args, block, call_data);
        };
        if !fcall {
            match entry.callable.visibility() {
                Visibility::Public => {}
                Visibility::Private => return Err(self.visibility_error(receiver, mid, Visibility::Private)),
                Visibility::Protected => {
                    let caller = self.frames.last().map_or(self.main, |frame| frame.self_value);
                    if !self.kind_of(caller, entry.owner) {
                        return Err(self.visibility_error(receiver, mid, Visibility::Protected));
                    }
                }
            }
        }
        self.invoke_callable(receiver, entry.owner, mid, &entry.callable, args, block, call_data)
    }

    /// Internal call that ignores visibility, e.g. for `initialize` or `inspect`.
    pub(crate) fn funcall(&mut self, receiver: Value, mid: Symbol, args: &[Value]) -> RunResult<Value> {
        self.call_method(receiver, mid, args, None, None, true)
    }

    pub(crate) fn funcall_with_block(
        &mut self,
        receiver: Value,
        mid: Symbol,
        args: &[Value],
        block: Value,
    ) -> RunResult<Value> {
        self.call_method(receiver, mid, args, Some(block), None, true)
    }

    /// Runs a resolved method body.
    #[expect(clippy::too_many_arguments, reason = "mirrors the shape of a call site")]
    pub(crate) fn invoke_callable(
        &mut self,
        receiver: Value,
        owner: HeapId,
        mid: Symbol,
        callable: &Callable,
        args: &[Value],
        block: Option<Value>,
        call_data: Option<&CallData>,
    ) -> RunResult<Value> {
        match callable.resolve() {
            Callable::Native { func, arity, .. } => {
                Callable::check_native_arity(*arity, args.len())?;
                let func = func.clone();
                self.enter_native()?;
                let result = func(self, receiver, CallArgs::new(args, block, call_data));
                self.native_depth -= 1;
                result
            }
            Callable::Interpreted { iseq, .. } => {
                let keywords = call_data.is_some_and(|cd| cd.flags.contains(CallFlags::KWARG));
                let iseq = iseq.clone();
                self.run_method(receiver, owner, mid, &iseq, args, block, keywords)
            }
            Callable::Alias { .. } => Err(RunError::internal("alias resolved to an alias")),
        }
    }

    /// Counts a native call against the recursion limit.
    pub(crate) fn enter_native(&mut self) -> RunResult<()> {
        let depth = self.frames.len() + self.native_depth + 1;
        self.heap.tracker().check_recursion_depth(depth)?;
        self.native_depth += 1;
        Ok(())
    }

    fn method_missing(
        &mut self,
        receiver: Value,
        mid: Symbol,
        args: &[Value],
        block: Option<Value>,
        call_data: Option<&CallData>,
    ) -> RunResult<Value> {
        let class = self.dispatch_class(receiver)?;
        let missing: Symbol = StaticSymbols::MethodMissing.into();
        let vcall = call_data.is_some_and(CallData::is_vcall);
        if let Some(entry) = self.find_method(class, missing) {
            let builtin = self
                .builtin_methods
                .get(&(self.core.basic_object, missing))
                .is_some_and(|original| original.same_body(&entry.callable));
            if !builtin {
                let mut forwarded = Vec::with_capacity(args.len() + 1);
                forwarded.push(Value::Symbol(mid));
                forwarded.extend_from_slice(args);
                return self.invoke_callable(receiver, entry.owner, missing, &entry.callable, &forwarded, block, None);
            }
        }
        Err(self.no_method_error(receiver, mid, vcall))
    }

    /// NoMethodError (or NameError for a bare identifier) for `mid` on `receiver`.
    pub(crate) fn no_method_error(&mut self, receiver: Value, mid: Symbol, vcall: bool) -> RunError {
        let description = self.describe_receiver(receiver);
        let name = self.interns.get(mid);
        if vcall {
            ExcType::NameError.error(format!("undefined local variable or method `{name}' for {description}"))
        } else {
            ExcType::NoMethodError.error(format!("undefined method `{name}' for {description}"))
        }
    }

    fn visibility_error(&mut self, receiver: Value, mid: Symbol, visibility: Visibility) -> RunError {
        let description = self.describe_receiver(receiver);
        ExcType::NoMethodError.error(format!(
            "{} method `{}' called for {description}",
            visibility.name(),
            self.interns.get(mid)
        ))
    }

    /// `respond_to?` without private methods, falling back to `respond_to_missing?`.
    pub(crate) fn responds_to(&mut self, value: Value, mid: Symbol) -> RunResult<bool> {
        self.responds_to_with(value, mid, false)
    }

    pub(crate) fn responds_to_with(&mut self, value: Value, mid: Symbol, include_private: bool) -> RunResult<bool> {
        let class = self.dispatch_class(value)?;
        if let Some(entry) = self.find_method(class, mid) {
            if include_private || entry.callable.visibility() == Visibility::Public {
                return Ok(true);
            }
            return Ok(false);
        }
        let hook: Symbol = StaticSymbols::RespondToMissing.into();
        if self.find_method(class, hook).is_some() {
            let answer = self.funcall(value, hook, &[Value::Symbol(mid), Value::from_bool(include_private)])?;
            return Ok(answer.truthy());
        }
        Ok(false)
    }

    /// Calls the next definition of the running method after `method.owner`.
    pub(crate) fn call_super(
        &mut self,
        receiver: Value,
        method: &MethodContext,
        args: &[Value],
        block: Option<Value>,
        call_data: Option<&CallData>,
    ) -> RunResult<Value> {
        let class = self.dispatch_class(receiver)?;
        match self.find_super_method(class, method.owner, method.name) {
            Some(entry) => self.invoke_callable(
                receiver,
                entry.owner,
                method.name,
                &entry.callable,
                args,
                block,
                call_data,
            ),
            None => {
                let description = self.describe_receiver(receiver);
                Err(ExcType::NoMethodError.error(format!(
                    "super: no superclass method `{}' for {description}",
                    self.interns.get(method.name)
                )))
            }
        }
    }
}
