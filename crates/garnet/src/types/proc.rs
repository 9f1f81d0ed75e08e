use std::{fmt, rc::Rc};

use crate::{
    exception::RunResult,
    iseq::Iseq,
    value::Value,
    vm::{Cref, MethodContext, Scope, Vm},
};

/// Host closure behind a native proc: `(vm, args, block)`.
pub type NativeBlockFn = Rc<dyn Fn(&mut Vm, &[Value], Option<Value>) -> RunResult<Value>>;

/// A capture of a frame's self, locals, lexical scope and block.
///
/// The locals are shared, not copied: every proc built from the same frame activation holds
/// the same `Rc<Scope>`, and so does the frame itself while it runs.
#[derive(Debug, Clone)]
pub struct Binding {
    pub self_value: Value,
    pub scope: Rc<Scope>,
    pub cref: Rc<Cref>,
    /// Block of the enclosing method, used by `yield` inside the proc.
    pub block: Option<Value>,
    /// Serial of the frame a `return` inside the proc returns from.
    pub home: u64,
    pub method: Option<Rc<MethodContext>>,
}

impl Binding {
    /// Same captured variables with a different `self`.
    #[must_use]
    pub fn with_self(&self, self_value: Value) -> Self {
        Self {
            self_value,
            ..self.clone()
        }
    }
}

#[derive(Clone)]
pub enum ProcBody {
    Iseq(Rc<Iseq>),
    Native(NativeBlockFn),
}

impl fmt::Debug for ProcBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Iseq(iseq) => f.debug_tuple("Iseq").field(&iseq.name).finish(),
            Self::Native(_) => f.write_str("Native"),
        }
    }
}

/// A closure value.
#[derive(Debug, Clone)]
pub struct Proc {
    pub body: ProcBody,
    pub binding: Binding,
    /// Tag of the call site this proc was passed to; `break` unwinds to it.
    pub break_tag: u64,
    pub is_lambda: bool,
}

impl Proc {
    /// A new proc running the same code under `binding`.
    #[must_use]
    pub fn with_binding(&self, binding: Binding) -> Self {
        Self {
            body: self.body.clone(),
            binding,
            break_tag: self.break_tag,
            is_lambda: self.is_lambda,
        }
    }

    #[must_use]
    pub fn arity(&self) -> i64 {
        match &self.body {
            ProcBody::Iseq(iseq) => iseq.params.arity(),
            ProcBody::Native(_) => -1,
        }
    }
}
