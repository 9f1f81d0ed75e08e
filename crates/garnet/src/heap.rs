//! The object arena.
//!
//! Every non-immediate value lives in a [`HeapEntry`] addressed by [`HeapId`]. Entries are
//! never freed while the VM lives, so ids stay valid and cyclic object graphs are plain index
//! relations. The heap also owns the hierarchy serial used to invalidate method caches and the
//! [`ResourceTracker`] that bounds allocations.

use std::{collections::BTreeMap, mem};

use indexmap::IndexMap;
use num_bigint::BigInt;
use strum::IntoStaticStr;

use crate::{
    intern::Symbol,
    resource::{ResourceError, ResourceTracker},
    types::{Class, Module, Proc, RHash, RRegexp},
    value::Value,
};

/// Index of an entry in the heap arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HeapId(usize);

impl HeapId {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Standard stream behind an IO object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoStream {
    Stdout,
    Stderr,
}

impl IoStream {
    #[must_use]
    pub fn fileno(self) -> i64 {
        match self {
            Self::Stdout => 1,
            Self::Stderr => 2,
        }
    }
}

/// Payload of an exception object.
#[derive(Debug, Clone, Default)]
pub struct ExceptionData {
    /// The message given to `new`/`raise`; nil means "use the class name".
    pub message: Value,
    pub backtrace: Option<Vec<String>>,
}

/// Type-specific payload of a heap entry.
#[derive(Debug, Clone, IntoStaticStr)]
pub enum HeapData {
    /// A plain instance with only instance variables.
    Object,
    String(String),
    /// An Integer outside the `i64` range.
    BigInt(BigInt),
    Array(Vec<Value>),
    Hash(RHash),
    Proc(Proc),
    Module(Module),
    Class(Class),
    Regexp(RRegexp),
    Io(IoStream),
    Exception(ExceptionData),
}

impl HeapData {
    /// Rough byte size, reported to the resource tracker.
    fn estimate_size(&self) -> usize {
        mem::size_of::<HeapEntry>()
            + match self {
                Self::String(s) => s.len(),
                Self::Array(items) => items.len() * mem::size_of::<Value>(),
                Self::Hash(hash) => hash.len() * 3 * mem::size_of::<Value>(),
                Self::BigInt(b) => (b.bits() / 8) as usize,
                _ => 0,
            }
    }
}

/// One object.
#[derive(Debug, Clone)]
pub struct HeapEntry {
    /// The object's class; `None` only during bootstrap of the root classes.
    pub class: Option<HeapId>,
    pub object_id: i64,
    /// Allocated on the first instance variable write.
    pub ivars: Option<Box<IndexMap<Symbol, Value>>>,
    /// Created at most once, on first request.
    pub singleton: Option<HeapId>,
    pub frozen: bool,
    pub data: HeapData,
}

impl HeapEntry {
    #[must_use]
    pub fn ivar(&self, name: Symbol) -> Option<Value> {
        self.ivars.as_ref().and_then(|ivars| ivars.get(&name).copied())
    }
}

/// Snapshot of the heap, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapStats {
    pub live_objects: usize,
    /// Live objects per [`HeapData`] variant name.
    pub objects_by_type: BTreeMap<&'static str, usize>,
    /// Allocation count of the resource tracker, if it records one.
    pub tracker_allocations: Option<usize>,
}

/// Object ids of heap entries: 16, 24, 32, ...
const FIRST_OBJECT_ID: i64 = 16;
const OBJECT_ID_STEP: i64 = 8;

#[derive(Debug)]
pub struct Heap {
    entries: Vec<HeapEntry>,
    next_object_id: i64,
    /// Bumped on every change to a method table, mixin list or marker set.
    serial: u64,
    tracker: Box<dyn ResourceTracker>,
}

impl Heap {
    #[must_use]
    pub fn new(tracker: Box<dyn ResourceTracker>) -> Self {
        Self {
            entries: Vec::with_capacity(1024),
            next_object_id: FIRST_OBJECT_ID,
            serial: 0,
            tracker,
        }
    }

    /// Allocates a new object of `class`.
    pub fn allocate(&mut self, class: HeapId, data: HeapData) -> Result<HeapId, ResourceError> {
        let id = self.allocate_unlinked(data)?;
        self.entries[id.index()].class = Some(class);
        Ok(id)
    }

    /// Allocates an object without a class. Only bootstrap uses this, and links the class
    /// with [`Heap::link_class`] before anything else can observe the entry.
    pub(crate) fn allocate_unlinked(&mut self, data: HeapData) -> Result<HeapId, ResourceError> {
        self.tracker.on_allocate(data.estimate_size())?;
        let id = HeapId(self.entries.len());
        let object_id = self.next_object_id;
        self.next_object_id += OBJECT_ID_STEP;
        self.entries.push(HeapEntry {
            class: None,
            object_id,
            ivars: None,
            singleton: None,
            frozen: false,
            data,
        });
        Ok(id)
    }

    pub(crate) fn link_class(&mut self, id: HeapId, class: HeapId) {
        self.get_mut(id).class = Some(class);
    }

    /// # Panics
    ///
    /// Panics if `id` did not come from this heap.
    #[inline]
    #[must_use]
    pub fn get(&self, id: HeapId) -> &HeapEntry {
        self.entries.get(id.index()).expect("Heap::get: slot missing")
    }

    #[inline]
    pub fn get_mut(&mut self, id: HeapId) -> &mut HeapEntry {
        self.entries.get_mut(id.index()).expect("Heap::get_mut: slot missing")
    }

    #[inline]
    #[must_use]
    pub fn data(&self, id: HeapId) -> &HeapData {
        &self.get(id).data
    }

    #[inline]
    pub fn data_mut(&mut self, id: HeapId) -> &mut HeapData {
        &mut self.get_mut(id).data
    }

    /// The class of an entry.
    #[inline]
    #[must_use]
    pub fn class_of(&self, id: HeapId) -> HeapId {
        self.get(id).class.expect("Heap::class_of: entry used before bootstrap linked it")
    }

    /// Module record of a module or class entry.
    #[must_use]
    pub fn as_module(&self, id: HeapId) -> Option<&Module> {
        match &self.get(id).data {
            HeapData::Module(module) => Some(module),
            HeapData::Class(class) => Some(&class.module),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_class(&self, id: HeapId) -> Option<&Class> {
        match &self.get(id).data {
            HeapData::Class(class) => Some(class),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_module(&self, id: HeapId) -> bool {
        matches!(self.get(id).data, HeapData::Module(_) | HeapData::Class(_))
    }

    /// # Panics
    ///
    /// Panics if `id` is neither a module nor a class.
    #[must_use]
    pub fn module(&self, id: HeapId) -> &Module {
        self.as_module(id).expect("Heap::module: entry is not a module")
    }

    /// Mutable module record; bumps the hierarchy serial.
    pub fn module_mut(&mut self, id: HeapId) -> &mut Module {
        self.serial += 1;
        match &mut self.get_mut(id).data {
            HeapData::Module(module) => module,
            HeapData::Class(class) => &mut class.module,
            _ => panic!("Heap::module_mut: entry is not a module"),
        }
    }

    /// Constant table of a module; does not touch the hierarchy serial.
    pub fn constants_mut(&mut self, id: HeapId) -> &mut IndexMap<Symbol, Value> {
        match &mut self.get_mut(id).data {
            HeapData::Module(module) => &mut module.constants,
            HeapData::Class(class) => &mut class.module.constants,
            _ => panic!("Heap::constants_mut: entry is not a module"),
        }
    }

    /// # Panics
    ///
    /// Panics if `id` is not a class.
    #[must_use]
    pub fn class(&self, id: HeapId) -> &Class {
        self.as_class(id).expect("Heap::class: entry is not a class")
    }

    /// Mutable class record; bumps the hierarchy serial.
    pub fn class_mut(&mut self, id: HeapId) -> &mut Class {
        self.serial += 1;
        match &mut self.get_mut(id).data {
            HeapData::Class(class) => class,
            _ => panic!("Heap::class_mut: entry is not a class"),
        }
    }

    #[must_use]
    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn bump_serial(&mut self) {
        self.serial += 1;
    }

    /// Replaces the resource tracker; later allocations are counted by the new one.
    pub fn set_tracker(&mut self, tracker: Box<dyn ResourceTracker>) {
        self.tracker = tracker;
    }

    #[must_use]
    pub fn tracker(&self) -> &dyn ResourceTracker {
        self.tracker.as_ref()
    }

    pub fn tracker_mut(&mut self) -> &mut dyn ResourceTracker {
        self.tracker.as_mut()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> HeapStats {
        let mut objects_by_type = BTreeMap::new();
        for entry in &self.entries {
            let name: &'static str = (&entry.data).into();
            *objects_by_type.entry(name).or_insert(0) += 1;
        }
        HeapStats {
            live_objects: self.entries.len(),
            objects_by_type,
            tracker_allocations: self.tracker.allocation_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::NoLimitTracker;

    #[test]
    fn object_ids_step_by_eight() {
        let mut heap = Heap::new(Box::new(NoLimitTracker));
        let a = heap.allocate_unlinked(HeapData::Object).unwrap();
        let b = heap.allocate(a, HeapData::String("x".into())).unwrap();
        assert_eq!(heap.get(a).object_id, 16);
        assert_eq!(heap.get(b).object_id, 24);
        assert_eq!(heap.class_of(b), a);
    }

    #[test]
    fn module_mut_bumps_serial() {
        let mut heap = Heap::new(Box::new(NoLimitTracker));
        let m = heap.allocate_unlinked(HeapData::Module(Module::default())).unwrap();
        let before = heap.serial();
        heap.module_mut(m).includes.clear();
        assert!(heap.serial() > before);
        heap.constants_mut(m).clear();
        assert_eq!(heap.serial(), before + 1);
    }
}
