use ahash::AHashSet;
use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::{callable::Callable, heap::HeapId, intern::Symbol, value::Value};

/// A namespace with a method table and mixin lists.
#[derive(Debug, Clone, Default)]
pub struct Module {
    /// Fully qualified name; `None` until an anonymous module is assigned to a constant.
    pub name: Option<String>,
    pub constants: IndexMap<Symbol, Value>,
    pub methods: IndexMap<Symbol, Callable>,
    pub removed_methods: AHashSet<Symbol>,
    pub undefined_methods: AHashSet<Symbol>,
    /// Registration order; the most recent include is searched first.
    pub includes: SmallVec<[HeapId; 4]>,
    /// Registration order; the most recent prepend is searched first.
    pub prepends: SmallVec<[HeapId; 2]>,
    /// Lexically enclosing module, used only for naming and constant scoping.
    pub nesting_parent: Option<HeapId>,
}

impl Module {
    #[must_use]
    pub fn new(name: Option<String>, nesting_parent: Option<HeapId>) -> Self {
        Self {
            name,
            nesting_parent,
            ..Self::default()
        }
    }

    /// Whether `mid` was removed or undefined here, hiding every later ancestor.
    #[must_use]
    pub fn hides(&self, mid: Symbol) -> bool {
        self.undefined_methods.contains(&mid) || self.removed_methods.contains(&mid)
    }

    /// Installs `callable` under `mid`, clearing any hide marker for that name.
    pub fn add_method(&mut self, mid: Symbol, callable: Callable) {
        self.removed_methods.remove(&mid);
        self.undefined_methods.remove(&mid);
        self.methods.insert(mid, callable);
    }
}

/// How `allocate` builds instances of a class; inherited from the superclass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllocKind {
    #[default]
    Object,
    Exception,
    String,
    Array,
    Hash,
    /// Instances only come from literals or conversions (Integer, Symbol, NilClass, ...).
    Undefined,
}

/// A module with a superclass.
#[derive(Debug, Clone)]
pub struct Class {
    pub module: Module,
    /// `None` only for `BasicObject`.
    pub superclass: Option<HeapId>,
    pub is_singleton: bool,
    /// For singleton classes, the object they belong to.
    pub attached: Option<Value>,
    pub alloc: AllocKind,
}

impl Class {
    #[must_use]
    pub fn new(
        name: Option<String>,
        superclass: Option<HeapId>,
        nesting_parent: Option<HeapId>,
        alloc: AllocKind,
    ) -> Self {
        Self {
            module: Module::new(name, nesting_parent),
            superclass,
            is_singleton: false,
            attached: None,
            alloc,
        }
    }

    #[must_use]
    pub fn singleton(attached: Value, superclass: HeapId) -> Self {
        Self {
            module: Module::default(),
            superclass: Some(superclass),
            is_singleton: true,
            attached: Some(attached),
            alloc: AllocKind::Undefined,
        }
    }
}
