//! Classes of values, singleton classes, instance variables, freezing and allocation.

use indexmap::IndexMap;
use num_bigint::BigInt;
use num_traits::ToPrimitive;

use crate::{
    exception::{ExcType, RunError, RunResult},
    heap::{ExceptionData, HeapData, HeapId},
    intern::Symbol,
    types::{AllocKind, Class, RHash},
    value::Value,
    vm::Vm,
};

impl Vm {
    /// The class of `value`, ignoring any singleton class.
    #[must_use]
    pub(crate) fn real_class_of(&self, value: Value) -> HeapId {
        match value {
            Value::Nil => self.core.nil_class,
            Value::True => self.core.true_class,
            Value::False => self.core.false_class,
            Value::Integer(_) => self.core.integer,
            Value::Float(_) => self.core.float,
            Value::Symbol(_) => self.core.symbol,
            Value::Ref(id) => self.heap.class_of(id),
        }
    }

    /// The class method lookup starts from.
    ///
    /// This is the singleton class when one exists. Class and module receivers always get
    /// one, so class-level lookup follows the singleton superclass chain.
    pub(crate) fn dispatch_class(&mut self, value: Value) -> RunResult<HeapId> {
        match value {
            Value::Ref(id) => {
                let entry = self.heap.get(id);
                if let Some(singleton) = entry.singleton {
                    Ok(singleton)
                } else if matches!(entry.data, HeapData::Module(_) | HeapData::Class(_)) {
                    self.singleton_class_of(value)
                } else {
                    Ok(entry.class.unwrap_or(self.core.object))
                }
            }
            other => Ok(self.real_class_of(other)),
        }
    }

    /// Returns the singleton class of `value`, creating it on first request.
    pub(crate) fn singleton_class_of(&mut self, value: Value) -> RunResult<HeapId> {
        let id = match value {
            Value::Nil => return Ok(self.core.nil_class),
            Value::True => return Ok(self.core.true_class),
            Value::False => return Ok(self.core.false_class),
            Value::Integer(_) | Value::Float(_) | Value::Symbol(_) => {
                return Err(RunError::type_error("can't define singleton"));
            }
            Value::Ref(id) => id,
        };
        let entry = self.heap.get(id);
        if let Some(singleton) = entry.singleton {
            return Ok(singleton);
        }
        let (is_class, is_module, superclass) = match &entry.data {
            HeapData::BigInt(_) => return Err(RunError::type_error("can't define singleton")),
            HeapData::Class(class) => (true, false, class.superclass),
            HeapData::Module(_) => (false, true, None),
            _ => (false, false, entry.class),
        };
        let superclass = if is_class {
            match superclass {
                Some(superclass) => self.singleton_class_of(Value::Ref(superclass))?,
                None => self.core.class,
            }
        } else if is_module {
            self.core.module
        } else {
            superclass.unwrap_or(self.core.object)
        };
        let singleton = self
            .heap
            .allocate(self.core.class, HeapData::Class(Class::singleton(value, superclass)))?;
        let frozen = self.heap.get(id).frozen;
        let entry = self.heap.get_mut(id);
        entry.singleton = Some(singleton);
        self.heap.get_mut(singleton).frozen = frozen;
        self.heap.bump_serial();
        Ok(singleton)
    }

    /// Whether `value` is an instance of `module` or of a class that has it as an ancestor.
    pub(crate) fn kind_of(&mut self, value: Value, module: HeapId) -> bool {
        let class = match value {
            Value::Ref(id) => self.heap.get(id).singleton.unwrap_or_else(|| self.heap.class_of(id)),
            other => self.real_class_of(other),
        };
        self.is_ancestor(class, module)
    }

    #[must_use]
    pub(crate) fn frozen(&self, value: Value) -> bool {
        match value {
            Value::Ref(id) => self.heap.get(id).frozen,
            _ => true,
        }
    }

    pub(crate) fn freeze_value(&mut self, value: Value) {
        if let Value::Ref(id) = value {
            let entry = self.heap.get_mut(id);
            entry.frozen = true;
            if let Some(singleton) = entry.singleton {
                self.heap.get_mut(singleton).frozen = true;
            }
        }
    }

    /// Raises FrozenError if `value` is frozen.
    pub(crate) fn check_frozen(&mut self, value: Value) -> RunResult<()> {
        if !self.frozen(value) {
            return Ok(());
        }
        let class = self.real_class_of(value);
        let class_name = self.module_display_name(class);
        let inspected = self.inspect_value(value)?;
        Err(ExcType::FrozenError.error(format!("can't modify frozen {class_name}: {inspected}")))
    }

    #[must_use]
    pub(crate) fn ivar_get(&self, object: Value, name: Symbol) -> Value {
        match object {
            Value::Ref(id) => self.heap.get(id).ivar(name).unwrap_or(Value::Nil),
            _ => Value::Nil,
        }
    }

    pub(crate) fn ivar_set(&mut self, object: Value, name: Symbol, value: Value) -> RunResult<()> {
        self.check_frozen(object)?;
        let Value::Ref(id) = object else {
            return Err(RunError::internal("immediate value passed the frozen check"));
        };
        self.heap
            .get_mut(id)
            .ivars
            .get_or_insert_with(|| Box::new(IndexMap::new()))
            .insert(name, value);
        Ok(())
    }

    /// Public name of a module for messages; anonymous ones render like `#<Class:0x...>`.
    #[must_use]
    pub(crate) fn module_display_name(&self, module: HeapId) -> String {
        if let Some(name) = self.module_name(module) {
            return name;
        }
        match self.heap.as_class(module) {
            Some(class) if class.is_singleton => match class.attached {
                Some(Value::Ref(attached)) if self.heap.is_module(attached) => {
                    format!("#<Class:{}>", self.module_display_name(attached))
                }
                _ => format!("#<Class:{:#018x}>", self.heap.get(module).object_id),
            },
            Some(_) => format!("#<Class:{:#018x}>", self.heap.get(module).object_id),
            None => format!("#<Module:{:#018x}>", self.heap.get(module).object_id),
        }
    }

    /// Allocates an uninitialized instance of `class` according to its allocator kind.
    pub(crate) fn allocate_instance(&mut self, class: HeapId) -> RunResult<Value> {
        let record = self.heap.class(class);
        if record.is_singleton {
            return Err(RunError::type_error("can't create instance of singleton class"));
        }
        let data = match record.alloc {
            AllocKind::Object => HeapData::Object,
            AllocKind::String => HeapData::String(String::new()),
            AllocKind::Array => HeapData::Array(Vec::new()),
            AllocKind::Hash => HeapData::Hash(RHash::new()),
            AllocKind::Exception => HeapData::Exception(ExceptionData::default()),
            AllocKind::Undefined => {
                let name = self.module_display_name(class);
                return Err(ExcType::NoMethodError.error(format!("undefined method `allocate' for class {name}")));
            }
        };
        Ok(Value::Ref(self.heap.allocate(class, data)?))
    }

    pub fn new_string(&mut self, text: &str) -> RunResult<Value> {
        self.new_string_owned(text.to_owned())
    }

    pub fn new_string_owned(&mut self, text: String) -> RunResult<Value> {
        Ok(Value::Ref(self.heap.allocate(self.core.string, HeapData::String(text))?))
    }

    pub fn new_array(&mut self, items: Vec<Value>) -> RunResult<Value> {
        Ok(Value::Ref(self.heap.allocate(self.core.array, HeapData::Array(items))?))
    }

    pub fn new_hash(&mut self, hash: RHash) -> RunResult<Value> {
        Ok(Value::Ref(self.heap.allocate(self.core.hash, HeapData::Hash(hash))?))
    }

    /// An Integer value, boxed on the heap when it does not fit in `i64`.
    pub fn new_integer(&mut self, value: BigInt) -> RunResult<Value> {
        match value.to_i64() {
            Some(small) => Ok(Value::Integer(small)),
            None => Ok(Value::Ref(self.heap.allocate(self.core.integer, HeapData::BigInt(value))?)),
        }
    }

    /// Text of a String, or the name of a Symbol.
    #[must_use]
    pub(crate) fn str_of(&self, value: Value) -> Option<&str> {
        match value {
            Value::Symbol(sym) => Some(self.interns.get(sym)),
            Value::Ref(id) => match self.heap.data(id) {
                HeapData::String(s) => Some(s.as_str()),
                _ => None,
            },
            _ => None,
        }
    }

    /// Text of a String value only.
    #[must_use]
    pub(crate) fn string_of(&self, value: Value) -> Option<&str> {
        match value {
            Value::Ref(id) => match self.heap.data(id) {
                HeapData::String(s) => Some(s.as_str()),
                _ => None,
            },
            _ => None,
        }
    }

    #[must_use]
    pub(crate) fn is_string(&self, value: Value) -> bool {
        self.string_of(value).is_some()
    }

    #[must_use]
    pub(crate) fn array_of(&self, value: Value) -> Option<&Vec<Value>> {
        match value {
            Value::Ref(id) => match self.heap.data(id) {
                HeapData::Array(items) => Some(items),
                _ => None,
            },
            _ => None,
        }
    }

    #[must_use]
    pub(crate) fn hash_of(&self, value: Value) -> Option<&RHash> {
        match value {
            Value::Ref(id) => match self.heap.data(id) {
                HeapData::Hash(hash) => Some(hash),
                _ => None,
            },
            _ => None,
        }
    }

    #[must_use]
    pub(crate) fn bigint_of(&self, value: Value) -> Option<BigInt> {
        match value {
            Value::Integer(n) => Some(BigInt::from(n)),
            Value::Ref(id) => match self.heap.data(id) {
                HeapData::BigInt(b) => Some(b.clone()),
                _ => None,
            },
            _ => None,
        }
    }

    /// Mutable string buffer of an unfrozen String.
    pub(crate) fn string_mut(&mut self, value: Value) -> RunResult<&mut String> {
        self.check_frozen(value)?;
        match value {
            Value::Ref(id) => match self.heap.data_mut(id) {
                HeapData::String(s) => Ok(s),
                _ => Err(RunError::internal("string_mut on a non-String")),
            },
            _ => Err(RunError::internal("string_mut on an immediate")),
        }
    }

    /// Mutable element vector of an unfrozen Array.
    pub(crate) fn array_mut(&mut self, value: Value) -> RunResult<&mut Vec<Value>> {
        self.check_frozen(value)?;
        match value {
            Value::Ref(id) => match self.heap.data_mut(id) {
                HeapData::Array(items) => Ok(items),
                _ => Err(RunError::internal("array_mut on a non-Array")),
            },
            _ => Err(RunError::internal("array_mut on an immediate")),
        }
    }

    /// Mutable payload of an unfrozen Hash.
    pub(crate) fn hash_mut(&mut self, value: Value) -> RunResult<&mut RHash> {
        self.check_frozen(value)?;
        match value {
            Value::Ref(id) => match self.heap.data_mut(id) {
                HeapData::Hash(hash) => Ok(hash),
                _ => Err(RunError::internal("hash_mut on a non-Hash")),
            },
            _ => Err(RunError::internal("hash_mut on an immediate")),
        }
    }

    /// Module or class id behind `value`, if it is one.
    #[must_use]
    pub(crate) fn module_of(&self, value: Value) -> Option<HeapId> {
        value.heap_id().filter(|&id| self.heap.is_module(id))
    }

    /// Class id behind `value`, if it is a class.
    #[must_use]
    pub(crate) fn class_value(&self, value: Value) -> Option<HeapId> {
        value.heap_id().filter(|&id| self.heap.as_class(id).is_some())
    }
}
