use std::{cell::RefCell, rc::Rc};

use crate::{
    callable::Visibility,
    exception::RunError,
    heap::HeapId,
    intern::Symbol,
    iseq::Iseq,
    value::Value,
};

/// Local variable slots of one activation.
///
/// Blocks get a scope whose `parent` is the scope they were created in, so `getlocal` with
/// `level > 0` walks outwards. Procs hold the scope through `Rc`, which keeps it alive after
/// the frame that created it has returned.
#[derive(Debug)]
pub struct Scope {
    pub locals: RefCell<Vec<Value>>,
    pub parent: Option<Rc<Scope>>,
}

impl Scope {
    #[must_use]
    pub fn new(size: usize, parent: Option<Rc<Self>>) -> Rc<Self> {
        Rc::new(Self {
            locals: RefCell::new(vec![Value::Nil; size]),
            parent,
        })
    }

    /// The scope `level` steps outwards; `None` if the chain is shorter.
    #[must_use]
    pub fn at_level(self: &Rc<Self>, level: u32) -> Option<Rc<Self>> {
        let mut scope = Rc::clone(self);
        for _ in 0..level {
            scope = Rc::clone(scope.parent.as_ref()?);
        }
        Some(scope)
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Value {
        self.locals.borrow().get(index).copied().unwrap_or(Value::Nil)
    }

    pub fn set(&self, index: usize, value: Value) {
        let mut locals = self.locals.borrow_mut();
        if index >= locals.len() {
            locals.resize(index + 1, Value::Nil);
        }
        locals[index] = value;
    }
}

/// Lexical module nesting: the innermost module first.
#[derive(Debug)]
pub struct Cref {
    pub module: HeapId,
    pub parent: Option<Rc<Cref>>,
}

impl Cref {
    #[must_use]
    pub fn root(module: HeapId) -> Rc<Self> {
        Rc::new(Self { module, parent: None })
    }

    #[must_use]
    pub fn nested(self: &Rc<Self>, module: HeapId) -> Rc<Self> {
        Rc::new(Self {
            module,
            parent: Some(Rc::clone(self)),
        })
    }

    /// Modules of the chain, innermost first.
    pub fn modules(&self) -> impl Iterator<Item = HeapId> + '_ {
        std::iter::successors(Some(self), |cref| cref.parent.as_deref()).map(|cref| cref.module)
    }
}

/// The method a frame (or the blocks inside it) belongs to, used by `super`.
#[derive(Debug)]
pub struct MethodContext {
    /// The module the running method was found in.
    pub owner: HeapId,
    pub name: Symbol,
    /// Body of the method, when interpreted; `zsuper` re-reads its parameters.
    pub iseq: Option<Rc<Iseq>>,
    /// Locals of the method activation.
    pub scope: Rc<Scope>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Top,
    Method,
    Block,
    Lambda,
    Class,
}

impl FrameKind {
    /// Whether a `Return` signal aimed at this frame's serial stops here.
    #[must_use]
    pub fn catches_return(self) -> bool {
        matches!(self, Self::Top | Self::Method | Self::Lambda)
    }
}

/// One activation record.
#[derive(Debug)]
pub(crate) struct Frame {
    pub iseq: Rc<Iseq>,
    pub stack_base: usize,
    pub self_value: Value,
    pub scope: Rc<Scope>,
    pub cref: Rc<Cref>,
    /// Block passed to the method (for `yield` and `block_given?`).
    pub block: Option<Value>,
    pub kind: FrameKind,
    pub serial: u64,
    /// Serial of the frame a `return` from here unwinds to.
    pub home: u64,
    /// Break tag of the proc running in this frame, for block frames.
    pub break_tag: Option<u64>,
    pub method: Option<Rc<MethodContext>>,
    /// Visibility given to methods defined by `def` in this frame.
    pub visibility: Visibility,
    /// Set by a bare `module_function`; later definitions also become singleton methods.
    pub module_function: bool,
    /// Errors parked by ensure handlers, re-raised by `endensure`.
    pub pending: Vec<RunError>,
}
