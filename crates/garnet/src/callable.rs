//! Method bodies.
//!
//! A [`Callable`] is what a method table maps a name to. The dispatcher treats all variants
//! alike; only invocation looks at the tag.

use std::{fmt, rc::Rc};

use crate::{
    exception::{RunError, RunResult},
    intern::Symbol,
    iseq::{CallData, Iseq},
    value::Value,
    vm::Vm,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Public,
    Private,
    Protected,
}

impl Visibility {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
            Self::Protected => "protected",
        }
    }
}

/// Arguments handed to a native method.
#[derive(Debug, Clone, Copy)]
pub struct CallArgs<'a> {
    pub args: &'a [Value],
    pub block: Option<Value>,
    pub call_data: Option<&'a CallData>,
}

impl<'a> CallArgs<'a> {
    #[must_use]
    pub fn new(args: &'a [Value], block: Option<Value>, call_data: Option<&'a CallData>) -> Self {
        Self {
            args,
            block,
            call_data,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.args.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Argument `index`, or nil when absent.
    #[must_use]
    pub fn get(&self, index: usize) -> Value {
        self.args.get(index).copied().unwrap_or(Value::Nil)
    }

    #[must_use]
    pub fn opt(&self, index: usize) -> Option<Value> {
        self.args.get(index).copied()
    }

    /// The block, or LocalJumpError when the caller passed none.
    pub fn require_block(&self) -> RunResult<Value> {
        self.block.ok_or_else(|| RunError::local_jump("no block given (yield)"))
    }

    pub fn check(&self, min: usize, max: Option<usize>) -> RunResult<()> {
        RunError::check_arity(self.args.len(), min, max)
    }
}

pub type NativeFn = Rc<dyn Fn(&mut Vm, Value, CallArgs<'_>) -> RunResult<Value>>;

/// A method body.
#[derive(Clone)]
pub enum Callable {
    /// Bytecode; invocation pushes a method frame.
    Interpreted { iseq: Rc<Iseq>, visibility: Visibility },
    /// Host code. `arity` follows `Method#arity`: `n` exactly, `-(n + 1)` for at least `n`.
    Native {
        func: NativeFn,
        arity: i32,
        visibility: Visibility,
    },
    /// A copy made by `alias`/`alias_method`, bound to the body that `original` had when the
    /// alias was created.
    Alias {
        original: Symbol,
        target: Box<Callable>,
        visibility: Visibility,
    },
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interpreted { iseq, visibility } => f
                .debug_struct("Interpreted")
                .field("iseq", &iseq.name)
                .field("visibility", visibility)
                .finish(),
            Self::Native { arity, visibility, .. } => f
                .debug_struct("Native")
                .field("arity", arity)
                .field("visibility", visibility)
                .finish_non_exhaustive(),
            Self::Alias {
                original,
                target,
                visibility,
            } => f
                .debug_struct("Alias")
                .field("original", original)
                .field("target", target)
                .field("visibility", visibility)
                .finish(),
        }
    }
}

impl Callable {
    pub fn native(arity: i32, func: impl Fn(&mut Vm, Value, CallArgs<'_>) -> RunResult<Value> + 'static) -> Self {
        Self::Native {
            func: Rc::new(func),
            arity,
            visibility: Visibility::Public,
        }
    }

    #[must_use]
    pub fn interpreted(iseq: Rc<Iseq>, visibility: Visibility) -> Self {
        Self::Interpreted { iseq, visibility }
    }

    #[must_use]
    pub fn visibility(&self) -> Visibility {
        match self {
            Self::Interpreted { visibility, .. } | Self::Native { visibility, .. } | Self::Alias { visibility, .. } => {
                *visibility
            }
        }
    }

    #[must_use]
    pub fn with_visibility(mut self, new: Visibility) -> Self {
        match &mut self {
            Self::Interpreted { visibility, .. } | Self::Native { visibility, .. } | Self::Alias { visibility, .. } => {
                *visibility = new;
            }
        }
        self
    }

    /// The body an alias chain ends in.
    #[must_use]
    pub fn resolve(&self) -> &Self {
        match self {
            Self::Alias { target, .. } => target.resolve(),
            other => other,
        }
    }

    #[must_use]
    pub fn arity(&self) -> i64 {
        match self.resolve() {
            Self::Interpreted { iseq, .. } => iseq.params.arity(),
            Self::Native { arity, .. } => i64::from(*arity),
            Self::Alias { .. } => -1,
        }
    }

    /// Whether two callables run the same body.
    #[must_use]
    pub fn same_body(&self, other: &Self) -> bool {
        match (self.resolve(), other.resolve()) {
            (Self::Interpreted { iseq: a, .. }, Self::Interpreted { iseq: b, .. }) => Rc::ptr_eq(a, b),
            (Self::Native { func: a, .. }, Self::Native { func: b, .. }) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Checks `given` against a native arity.
    pub(crate) fn check_native_arity(arity: i32, given: usize) -> RunResult<()> {
        if arity >= 0 {
            RunError::check_arity(given, arity as usize, Some(arity as usize))
        } else {
            RunError::check_arity(given, (-arity - 1) as usize, None)
        }
    }
}
