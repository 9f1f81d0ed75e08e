//! Classes, modules, constants and method tables.

use crate::{
    callable::{Callable, Visibility},
    exception::{ExcType, RunError, RunResult},
    heap::{HeapData, HeapId},
    intern::{StaticSymbols, Symbol},
    iseq::DefineClassKind,
    types::{AllocKind, Class, Module},
    value::Value,
    vm::{Cref, Vm},
};

impl Vm {
    /// Installs `callable` as `module#mid`.
    pub(crate) fn add_method(&mut self, module: HeapId, mid: Symbol, callable: Callable) -> RunResult<()> {
        self.check_frozen(Value::Ref(module))?;
        self.heap.module_mut(module).add_method(mid, callable);
        Ok(())
    }

    /// Installs a builtin native and remembers it for the fast-path redefinition guard.
    pub(crate) fn install_native(&mut self, module: HeapId, mid: Symbol, callable: Callable) {
        self.builtin_methods.insert((module, mid), callable.clone());
        self.heap.module_mut(module).add_method(mid, callable);
    }

    /// Calls a hook such as `inherited` if the receiver responds to it.
    pub(crate) fn call_hook(&mut self, receiver: Value, hook: StaticSymbols, args: &[Value]) -> RunResult<()> {
        let class = self.dispatch_class(receiver)?;
        if self.find_method(class, hook.into()).is_some() {
            self.funcall(receiver, hook.into(), args)?;
        }
        Ok(())
    }

    /// Name for a module created as constant `name` of `outer`.
    fn qualified_name(&self, outer: Option<HeapId>, name: &str) -> String {
        match outer {
            Some(outer) if outer != self.core.object => match self.module_name(outer) {
                Some(prefix) => format!("{prefix}::{name}"),
                None => format!("{}::{name}", self.module_display_name(outer)),
            },
            _ => name.to_owned(),
        }
    }

    /// Creates a class; named classes are bound as constant `name` of `outer`.
    pub(crate) fn new_class(
        &mut self,
        name: Option<&str>,
        superclass: HeapId,
        outer: Option<HeapId>,
    ) -> RunResult<HeapId> {
        let alloc = self.heap.as_class(superclass).map_or(AllocKind::Object, |class| class.alloc);
        let full_name = name.map(|name| self.qualified_name(outer, name));
        let class = Class::new(full_name, Some(superclass), outer, alloc);
        let id = self.heap.allocate(self.core.class, HeapData::Class(class))?;
        if let (Some(name), Some(outer)) = (name, outer) {
            let sym = self.interns.intern(name);
            self.heap.constants_mut(outer).insert(sym, Value::Ref(id));
        }
        self.heap.bump_serial();
        self.call_hook(Value::Ref(superclass), StaticSymbols::Inherited, &[Value::Ref(id)])?;
        Ok(id)
    }

    pub(crate) fn new_module(&mut self, name: Option<&str>, outer: Option<HeapId>) -> RunResult<HeapId> {
        let full_name = name.map(|name| self.qualified_name(outer, name));
        let id = self
            .heap
            .allocate(self.core.module, HeapData::Module(Module::new(full_name, outer)))?;
        if let (Some(name), Some(outer)) = (name, outer) {
            let sym = self.interns.intern(name);
            self.heap.constants_mut(outer).insert(sym, Value::Ref(id));
        }
        Ok(id)
    }

    /// Returns module `outer::name`, creating it when missing.
    pub(crate) fn ensure_module(&mut self, outer: HeapId, name: &str) -> RunResult<HeapId> {
        let sym = self.interns.intern(name);
        match self.heap.module(outer).constants.get(&sym).copied() {
            Some(Value::Ref(id)) if self.heap.as_module(id).is_some() && self.heap.as_class(id).is_none() => Ok(id),
            Some(_) => Err(RunError::type_error(format!("{name} is not a module"))),
            None => self.new_module(Some(name), Some(outer)),
        }
    }

    /// Returns class `outer::name`, creating it under `superclass` (default Object) when
    /// missing. An existing class is returned whatever its superclass.
    pub(crate) fn ensure_class(&mut self, outer: HeapId, name: &str, superclass: Option<HeapId>) -> RunResult<HeapId> {
        let sym = self.interns.intern(name);
        match self.heap.module(outer).constants.get(&sym).copied() {
            Some(Value::Ref(id)) if self.heap.as_class(id).is_some() => Ok(id),
            Some(_) => Err(RunError::type_error(format!("{name} is not a class"))),
            None => {
                let superclass = superclass.unwrap_or(self.core.object);
                self.check_subclassable(superclass)?;
                self.new_class(Some(name), superclass, Some(outer))
            }
        }
    }

    pub(crate) fn check_subclassable(&self, superclass: HeapId) -> RunResult<()> {
        match self.heap.as_class(superclass) {
            Some(class) if class.is_singleton => Err(RunError::type_error("can't make subclass of singleton class")),
            Some(_) if superclass == self.core.class => Err(RunError::type_error("can't make subclass of Class")),
            Some(_) => Ok(()),
            None => Err(RunError::type_error(format!(
                "superclass must be an instance of Class (given an instance of {})",
                self.module_display_name(self.heap.class_of(superclass))
            ))),
        }
    }

    /// The `defineclass` instruction: opens (or creates) the class, module or singleton class
    /// a body runs in.
    pub(crate) fn open_class_body(
        &mut self,
        cbase: Value,
        superclass: Value,
        name: Symbol,
        kind: DefineClassKind,
    ) -> RunResult<HeapId> {
        if kind == DefineClassKind::SingletonClass {
            return self.singleton_class_of(cbase);
        }
        let Some(outer) = self.module_of(cbase) else {
            let inspected = self.inspect_value(cbase)?;
            return Err(RunError::type_error(format!("{inspected} is not a class/module")));
        };
        let name_text = self.interns.get(name).to_owned();
        let existing = self.heap.module(outer).constants.get(&name).copied();
        match kind {
            DefineClassKind::Class { has_superclass } => {
                let superclass = if has_superclass {
                    match self.class_value(superclass) {
                        Some(id) => Some(id),
                        None => {
                            let given = self.describe_receiver(superclass);
                            return Err(RunError::type_error(format!(
                                "superclass must be an instance of Class (given {given})"
                            )));
                        }
                    }
                } else {
                    None
                };
                match existing {
                    Some(value) => {
                        let Some(class) = self.class_value(value) else {
                            return Err(RunError::type_error(format!("{name_text} is not a class")));
                        };
                        if let Some(expected) = superclass
                            && self.heap.class(class).superclass != Some(expected)
                        {
                            return Err(RunError::type_error(format!("superclass mismatch for class {name_text}")));
                        }
                        Ok(class)
                    }
                    None => {
                        let superclass = superclass.unwrap_or(self.core.object);
                        self.check_subclassable(superclass)?;
                        self.new_class(Some(&name_text), superclass, Some(outer))
                    }
                }
            }
            DefineClassKind::Module => match existing {
                Some(value) => match self.module_of(value) {
                    Some(module) if self.heap.as_class(module).is_none() => Ok(module),
                    _ => Err(RunError::type_error(format!("{name_text} is not a module"))),
                },
                None => self.new_module(Some(&name_text), Some(outer)),
            },
            DefineClassKind::SingletonClass => self.singleton_class_of(cbase),
        }
    }

    /// Looks `name` up in `module` and, with `inherit`, its ancestors.
    ///
    /// Object's constants are only reached through a module that has Object as an ancestor
    /// when the lookup starts at Object itself.
    pub(crate) fn const_lookup_in(&mut self, module: HeapId, name: Symbol, inherit: bool) -> Option<Value> {
        if let Some(&value) = self.heap.module(module).constants.get(&name) {
            return Some(value);
        }
        if !inherit {
            return None;
        }
        let object = self.core.object;
        let linear = self.linearize(module);
        linear
            .iter()
            .filter(|&&id| id != object || module == object)
            .find_map(|&id| self.heap.module(id).constants.get(&name).copied())
    }

    /// Lexical lookup: the enclosing modules, then the ancestors of the innermost one, then
    /// Object.
    pub(crate) fn const_lookup_lexical(&mut self, cref: &Cref, name: Symbol) -> Option<Value> {
        let mut current = Some(cref);
        while let Some(scope) = current {
            // The root of every chain is Object, which is searched last.
            if scope.parent.is_none() {
                break;
            }
            if let Some(&value) = self.heap.module(scope.module).constants.get(&name) {
                return Some(value);
            }
            current = scope.parent.as_deref();
        }
        self.const_lookup_in(cref.module, name, true)
            .or_else(|| self.const_lookup_in(self.core.object, name, true))
    }

    /// The `getconstant` instruction. `scope` of `None` is a lexical lookup.
    pub(crate) fn get_constant(&mut self, cref: &Cref, scope: Option<Value>, name: Symbol) -> RunResult<Value> {
        match scope {
            None => self.const_lookup_lexical(cref, name).ok_or_else(|| {
                ExcType::NameError.error(format!("uninitialized constant {}", self.interns.get(name)))
            }),
            Some(scope) => {
                let Some(module) = self.module_of(scope) else {
                    let inspected = self.inspect_value(scope)?;
                    return Err(RunError::type_error(format!("{inspected} is not a class/module")));
                };
                self.const_lookup_in(module, name, true).ok_or_else(|| {
                    let prefix = if module == self.core.object {
                        String::new()
                    } else {
                        format!("{}::", self.module_display_name(module))
                    };
                    ExcType::NameError.error(format!("uninitialized constant {prefix}{}", self.interns.get(name)))
                })
            }
        }
    }

    /// Assigns constant `module::name`, naming an anonymous module value after it.
    pub(crate) fn const_set(&mut self, module: HeapId, name: Symbol, value: Value) -> RunResult<()> {
        self.check_frozen(Value::Ref(module))?;
        if let Some(target) = self.module_of(value)
            && self.heap.module(target).name.is_none()
        {
            let full_name = self.qualified_name(Some(module), self.interns.get(name));
            let record = self.heap.module_mut(target);
            record.name = Some(full_name);
            record.nesting_parent = Some(module);
        }
        self.heap.constants_mut(module).insert(name, value);
        Ok(())
    }

    /// Adds `module` to the includes of `target`; a no-op if it is already an ancestor.
    pub(crate) fn include_module(&mut self, target: HeapId, module: HeapId) -> RunResult<bool> {
        self.check_mixin(target, module)?;
        if self.is_ancestor(target, module) {
            return Ok(false);
        }
        self.check_frozen(Value::Ref(target))?;
        self.heap.module_mut(target).includes.push(module);
        Ok(true)
    }

    /// Adds `module` to the prepends of `target`; a no-op if it already is one.
    pub(crate) fn prepend_module(&mut self, target: HeapId, module: HeapId) -> RunResult<bool> {
        self.check_mixin(target, module)?;
        if self.heap.module(target).prepends.contains(&module) {
            return Ok(false);
        }
        self.check_frozen(Value::Ref(target))?;
        self.heap.module_mut(target).prepends.push(module);
        Ok(true)
    }

    /// `object.extend(module)`: includes `module` into the singleton class.
    pub(crate) fn extend_object(&mut self, object: Value, module: HeapId) -> RunResult<()> {
        let singleton = self.singleton_class_of(object)?;
        self.include_module(singleton, module)?;
        self.call_hook(Value::Ref(module), StaticSymbols::Extended, &[object])
    }

    fn check_mixin(&mut self, target: HeapId, module: HeapId) -> RunResult<()> {
        if self.heap.as_class(module).is_some() || !self.heap.is_module(module) {
            let class_name = self.module_display_name(self.heap.class_of(module));
            return Err(RunError::type_error(format!(
                "wrong argument type {class_name} (expected Module)"
            )));
        }
        if module == target || self.is_ancestor(module, target) {
            return Err(RunError::argument("cyclic include detected"));
        }
        Ok(())
    }

    /// `remove_method`: drops `module`'s own definition and hides inherited ones.
    pub(crate) fn remove_method(&mut self, module: HeapId, mid: Symbol) -> RunResult<()> {
        self.check_frozen(Value::Ref(module))?;
        if !self.heap.module(module).methods.contains_key(&mid) {
            let owner = self.module_display_name(module);
            return Err(ExcType::NameError.error(format!(
                "method `{}' not defined in {owner}",
                self.interns.get(mid)
            )));
        }
        let record = self.heap.module_mut(module);
        record.methods.shift_remove(&mid);
        record.removed_methods.insert(mid);
        Ok(())
    }

    /// `undef_method`: makes `mid` undefined for `module` and its descendants.
    pub(crate) fn undef_method(&mut self, module: HeapId, mid: Symbol) -> RunResult<()> {
        self.check_frozen(Value::Ref(module))?;
        if self.find_method(module, mid).is_none() {
            return Err(self.undefined_method_for_module(module, mid));
        }
        let record = self.heap.module_mut(module);
        record.methods.shift_remove(&mid);
        record.undefined_methods.insert(mid);
        Ok(())
    }

    /// `alias_method new old`: binds `new` to the current body of `old`.
    pub(crate) fn alias_method(&mut self, module: HeapId, new: Symbol, old: Symbol) -> RunResult<()> {
        let Some(entry) = self.find_method(module, old) else {
            return Err(self.undefined_method_for_module(module, old));
        };
        let visibility = entry.callable.visibility();
        let alias = Callable::Alias {
            original: old,
            target: Box::new(entry.callable.resolve().clone()),
            visibility,
        };
        self.add_method(module, new, alias)
    }

    /// Changes the visibility of `mid` as seen from `module`, copying an inherited
    /// definition into `module` when needed.
    pub(crate) fn set_method_visibility(
        &mut self,
        module: HeapId,
        mid: Symbol,
        visibility: Visibility,
    ) -> RunResult<()> {
        let Some(entry) = self.find_method(module, mid) else {
            return Err(self.undefined_method_for_module(module, mid));
        };
        if entry.callable.visibility() == visibility && entry.owner == module {
            return Ok(());
        }
        self.add_method(module, mid, entry.callable.with_visibility(visibility))
    }

    fn undefined_method_for_module(&self, module: HeapId, mid: Symbol) -> RunError {
        let kind = if self.heap.as_class(module).is_some() { "class" } else { "module" };
        ExcType::NameError.error(format!(
            "undefined method `{}' for {kind} `{}'",
            self.interns.get(mid),
            self.module_display_name(module)
        ))
    }
}
