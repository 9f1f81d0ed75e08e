//! Linearization of the module graph and cached method lookup.

use std::rc::Rc;

use ahash::AHashSet;

use crate::{callable::Callable, heap::HeapId, intern::Symbol, vm::Vm};

/// A method found by lookup, with the module whose table holds it.
#[derive(Debug, Clone)]
pub(crate) struct MethodEntry {
    pub owner: HeapId,
    pub callable: Callable,
}

impl Vm {
    /// Drops cached lookups if the class graph changed since they were filled.
    fn sync_caches(&mut self) {
        let serial = self.heap.serial();
        if serial != self.cache_serial {
            self.method_cache.clear();
            self.ancestor_cache.clear();
            self.cache_serial = serial;
        }
    }

    /// The method resolution order of `module`.
    ///
    /// Each module contributes its prepends (most recent first), itself, its includes (most
    /// recent first) and then its superclass, recursively. A module reachable along several
    /// paths keeps only its last position, so a shared mixin sorts after every module that
    /// includes it.
    pub(crate) fn linearize(&mut self, module: HeapId) -> Rc<[HeapId]> {
        self.sync_caches();
        if let Some(cached) = self.ancestor_cache.get(&module) {
            return Rc::clone(cached);
        }
        let mut walk = Vec::new();
        self.walk_ancestors(module, &mut walk, 0);
        let mut seen = AHashSet::with_capacity(walk.len());
        let mut linear: Vec<HeapId> = walk.into_iter().rev().filter(|id| seen.insert(*id)).collect();
        linear.reverse();
        let linear: Rc<[HeapId]> = linear.into();
        self.ancestor_cache.insert(module, Rc::clone(&linear));
        linear
    }

    fn walk_ancestors(&self, module: HeapId, out: &mut Vec<HeapId>, depth: usize) {
        // Mixin cycles are rejected by include/prepend; the depth bound is a backstop.
        if depth > 256 {
            return;
        }
        let record = self.heap.module(module);
        for &prepended in record.prepends.iter().rev() {
            self.walk_ancestors(prepended, out, depth + 1);
        }
        out.push(module);
        for &included in record.includes.iter().rev() {
            self.walk_ancestors(included, out, depth + 1);
        }
        if let Some(superclass) = self.heap.as_class(module).and_then(|class| class.superclass) {
            self.walk_ancestors(superclass, out, depth + 1);
        }
    }

    /// The ancestors of `module`, itself included, in lookup order.
    pub fn ancestors(&mut self, module: HeapId) -> Vec<HeapId> {
        self.linearize(module).to_vec()
    }

    /// Calls `callback` on each ancestor in lookup order until it returns false.
    ///
    /// Returns false iff the walk was stopped by the callback.
    pub fn each_unique_ancestor(&mut self, module: HeapId, mut callback: impl FnMut(HeapId) -> bool) -> bool {
        self.linearize(module).iter().all(|&id| callback(id))
    }

    pub(crate) fn is_ancestor(&mut self, class: HeapId, module: HeapId) -> bool {
        class == module || self.linearize(class).contains(&module)
    }

    /// Finds `mid` for instances of `class`.
    pub(crate) fn find_method(&mut self, class: HeapId, mid: Symbol) -> Option<MethodEntry> {
        self.sync_caches();
        if let Some(entry) = self.method_cache.get(&(class, mid)) {
            self.tracer.on_method_cache(true);
            return entry.clone();
        }
        self.tracer.on_method_cache(false);
        let linear = self.linearize(class);
        let entry = self.search(&linear, mid);
        self.method_cache.insert((class, mid), entry.clone());
        entry
    }

    /// Finds `mid` in the ancestors of `class` that come after `owner`, for `super`.
    pub(crate) fn find_super_method(&mut self, class: HeapId, owner: HeapId, mid: Symbol) -> Option<MethodEntry> {
        let linear = self.linearize(class);
        let start = linear.iter().position(|&id| id == owner)? + 1;
        self.search(&linear[start..], mid)
    }

    fn search(&self, modules: &[HeapId], mid: Symbol) -> Option<MethodEntry> {
        for &module in modules {
            let record = self.heap.module(module);
            if let Some(callable) = record.methods.get(&mid) {
                return Some(MethodEntry {
                    owner: module,
                    callable: callable.clone(),
                });
            }
            if record.hides(mid) {
                return None;
            }
        }
        None
    }
}
