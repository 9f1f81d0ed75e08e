//! The virtual machine.
//!
//! A [`Vm`] owns everything a program can observe: the heap, the symbol table, globals, the
//! method and ancestor caches, the native extension registry and the output sinks. Nothing is
//! global, so any number of VMs can run side by side in one process.
//!
//! The interpreter is split by concern:
//! - `interp`: the instruction loop and frame lifecycle;
//! - `dispatch`: method calls, visibility, `method_missing` and `super`;
//! - `args`: binding call arguments to parameters;
//! - `ancestors`: linearization and cached method lookup;
//! - `blocks`: procs, `yield`, and break tags;
//! - `define`: classes, modules, constants and method tables;
//! - `fast_path`: the `opt_*` instructions;
//! - `object`: classes of values, singleton classes, instance variables and freezing;
//! - `convert`: inspection, equality and implicit conversions;
//! - `raise`: exception objects and the host-facing [`Exception`];
//! - `load`: `require`, `load` and native extensions.

mod ancestors;
mod args;
mod blocks;
mod bootstrap;
mod convert;
mod define;
mod dispatch;
mod fast_path;
mod frame;
mod interp;
mod load;
mod object;
mod raise;

use std::{any::Any, rc::Rc};

use ahash::{AHashMap, AHashSet};

pub use self::{
    bootstrap::CoreClasses,
    frame::{Cref, FrameKind, MethodContext, Scope},
};
pub(crate) use self::{ancestors::MethodEntry, fast_path::resolve_index, frame::Frame};
use crate::{
    callable::{CallArgs, Callable},
    exception::{Exception, RunResult},
    heap::{Heap, HeapData, HeapId},
    intern::{Interns, StaticSymbols, Symbol},
    io::{PrintWriter, StdPrint},
    iseq::InstructionSequence,
    loader::{FsLoader, Loader},
    resource::{LimitedTracker, NoLimitTracker, ResourceLimits, ResourceTracker},
    tracer::{NoopTracer, VmTracer},
    value::Value,
};

/// Initializer of a native extension, run by the first `require` of its name.
pub type ExtensionInit = Box<dyn FnOnce(&mut Vm) -> RunResult<()>>;

/// Configuration for [`Vm::new`].
///
/// ```ignore
/// let vm = Vm::new(
///     VmOptions::new()
///         .load_path(["lib"])
///         .limits(ResourceLimits::new().max_operations(1_000_000))
///         .print(CollectStringPrint::new()),
/// );
/// ```
#[derive(Debug)]
pub struct VmOptions {
    load_path: Vec<String>,
    program_name: String,
    argv: Vec<String>,
    tracker: Box<dyn ResourceTracker>,
    print: Box<dyn PrintWriter>,
    tracer: Box<dyn VmTracer>,
    loader: Box<dyn Loader>,
}

impl Default for VmOptions {
    fn default() -> Self {
        Self {
            load_path: Vec::new(),
            program_name: "-".to_owned(),
            argv: Vec::new(),
            tracker: Box::new(NoLimitTracker),
            print: Box::new(StdPrint::new()),
            tracer: Box::new(NoopTracer),
            loader: Box::new(FsLoader::new()),
        }
    }
}

impl VmOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Initial contents of `$:`.
    #[must_use]
    pub fn load_path<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.load_path = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Initial value of `$0`.
    #[must_use]
    pub fn program_name(mut self, name: impl Into<String>) -> Self {
        self.program_name = name.into();
        self
    }

    /// Initial contents of `ARGV`.
    #[must_use]
    pub fn argv<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.argv = args.into_iter().map(Into::into).collect();
        self
    }

    /// Enforces `limits` with a [`LimitedTracker`].
    #[must_use]
    pub fn limits(mut self, limits: ResourceLimits) -> Self {
        self.tracker = Box::new(LimitedTracker::new(limits));
        self
    }

    /// Uses a custom resource tracker.
    #[must_use]
    pub fn tracker(mut self, tracker: impl ResourceTracker + 'static) -> Self {
        self.tracker = Box::new(tracker);
        self
    }

    #[must_use]
    pub fn print(mut self, print: impl PrintWriter) -> Self {
        self.print = Box::new(print);
        self
    }

    #[must_use]
    pub fn tracer(mut self, tracer: impl VmTracer) -> Self {
        self.tracer = Box::new(tracer);
        self
    }

    #[must_use]
    pub fn loader(mut self, loader: impl Loader + 'static) -> Self {
        self.loader = Box::new(loader);
        self
    }
}

/// A single-threaded interpreter instance.
pub struct Vm {
    pub(crate) heap: Heap,
    pub(crate) interns: Interns,
    pub(crate) core: CoreClasses,
    /// Operand stack shared by all frames.
    pub(crate) stack: Vec<Value>,
    pub(crate) frames: Vec<Frame>,
    pub(crate) globals: AHashMap<Symbol, Value>,
    pub(crate) method_cache: AHashMap<(HeapId, Symbol), Option<MethodEntry>>,
    pub(crate) ancestor_cache: AHashMap<HeapId, Rc<[HeapId]>>,
    /// Heap serial the caches were filled under.
    pub(crate) cache_serial: u64,
    /// Results of `once` instructions, by linked iseq id.
    pub(crate) once_cache: AHashMap<u32, Value>,
    /// Natives installed at bootstrap, for the fast-path redefinition guard.
    pub(crate) builtin_methods: AHashMap<(HeapId, Symbol), Callable>,
    pub(crate) extensions: AHashMap<String, Option<ExtensionInit>>,
    pub(crate) loader: Box<dyn Loader>,
    /// Resolved paths currently being required, to stop recursive requires.
    pub(crate) loading: AHashSet<String>,
    pub(crate) print: Box<dyn PrintWriter>,
    pub(crate) tracer: Box<dyn VmTracer>,
    pub(crate) main: Value,
    pub(crate) stdout: HeapId,
    pub(crate) stderr: HeapId,
    pub(crate) next_serial: u64,
    pub(crate) next_break_tag: u64,
    /// Tags of the `send`s with a literal block that are still running.
    pub(crate) active_break_tags: Vec<u64>,
    pub(crate) next_iseq_id: u32,
    /// Native calls currently on the host stack, counted towards the recursion limit.
    pub(crate) native_depth: usize,
    /// Containers being inspected, to print recursive structures as `[...]`.
    pub(crate) inspect_guard: Vec<HeapId>,
}

impl std::fmt::Debug for Vm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vm")
            .field("heap_objects", &self.heap.len())
            .field("symbols", &self.interns.len())
            .field("frames", &self.frames.len())
            .finish_non_exhaustive()
    }
}

impl Vm {
    /// Creates a VM with all builtin classes and methods installed.
    #[must_use]
    pub fn new(options: VmOptions) -> Self {
        let VmOptions {
            load_path,
            program_name,
            argv,
            tracker,
            print,
            tracer,
            loader,
        } = options;
        // Bootstrap allocations are not counted against the host's limits.
        let mut heap = Heap::new(Box::new(NoLimitTracker));
        let mut interns = Interns::new();
        let roots = bootstrap::bootstrap(&mut heap, &mut interns);
        let mut vm = Self {
            heap,
            interns,
            core: roots.core,
            stack: Vec::with_capacity(256),
            frames: Vec::with_capacity(16),
            globals: AHashMap::new(),
            method_cache: AHashMap::new(),
            ancestor_cache: AHashMap::new(),
            cache_serial: 0,
            once_cache: AHashMap::new(),
            builtin_methods: AHashMap::new(),
            extensions: AHashMap::new(),
            loader,
            loading: AHashSet::new(),
            print,
            tracer,
            main: roots.main,
            stdout: roots.stdout,
            stderr: roots.stderr,
            next_serial: 0,
            next_break_tag: 0,
            active_break_tags: Vec::new(),
            next_iseq_id: 0,
            native_depth: 0,
            inspect_guard: Vec::new(),
        };
        vm.install_runtime(load_path, &program_name, argv);
        vm.heap.set_tracker(tracker);
        vm
    }

    /// Links, verifies and runs an artifact as the main program.
    pub fn run(&mut self, artifact: &InstructionSequence) -> Result<Value, Exception> {
        let result = self.link(artifact).and_then(|iseq| self.run_top(&iseq));
        result.map_err(|err| self.to_exception(err))
    }

    /// Calls `name` on `receiver` as an ordinary public call.
    pub fn send(&mut self, receiver: Value, name: &str, args: &[Value]) -> Result<Value, Exception> {
        let mid = self.interns.intern(name);
        let result = self.call_method(receiver, mid, args, None, None, false);
        result.map_err(|err| self.to_exception(err))
    }

    /// Like [`Vm::send`], passing `block` (a Proc) as the block.
    pub fn send_with_block(
        &mut self,
        receiver: Value,
        name: &str,
        args: &[Value],
        block: Value,
    ) -> Result<Value, Exception> {
        let mid = self.interns.intern(name);
        let result = self.call_method(receiver, mid, args, Some(block), None, false);
        result.map_err(|err| self.to_exception(err))
    }

    /// `value.inspect`, dispatched so user overrides apply.
    pub fn inspect(&mut self, value: Value) -> Result<String, Exception> {
        let result = self.inspect_value(value);
        result.map_err(|err| self.to_exception(err))
    }

    /// `value.to_s`, dispatched so user overrides apply.
    pub fn to_s(&mut self, value: Value) -> Result<String, Exception> {
        let result = self.to_s_value(value);
        result.map_err(|err| self.to_exception(err))
    }

    /// Returns the top-level module `name`, creating it if needed.
    pub fn define_module(&mut self, name: &str) -> Result<HeapId, Exception> {
        self.define_module_under(self.core.object, name)
    }

    pub fn define_module_under(&mut self, outer: HeapId, name: &str) -> Result<HeapId, Exception> {
        let result = self.ensure_module(outer, name);
        result.map_err(|err| self.to_exception(err))
    }

    /// Returns the top-level class `name`, creating it under `superclass` (default `Object`)
    /// if needed. An existing class is returned as is.
    pub fn define_class(&mut self, name: &str, superclass: Option<HeapId>) -> Result<HeapId, Exception> {
        self.define_class_under(self.core.object, name, superclass)
    }

    pub fn define_class_under(
        &mut self,
        outer: HeapId,
        name: &str,
        superclass: Option<HeapId>,
    ) -> Result<HeapId, Exception> {
        let result = self.ensure_class(outer, name, superclass);
        result.map_err(|err| self.to_exception(err))
    }

    /// Installs a public native method. `arity` follows `Method#arity`: `n` for exactly `n`
    /// arguments, `-(n + 1)` for at least `n`.
    pub fn define_native_method(
        &mut self,
        module: HeapId,
        name: &str,
        arity: i32,
        func: impl Fn(&mut Self, Value, CallArgs<'_>) -> RunResult<Value> + 'static,
    ) -> Result<(), Exception> {
        let mid = self.interns.intern(name);
        let result = self.add_method(module, mid, Callable::native(arity, func));
        result.map_err(|err| self.to_exception(err))
    }

    /// Installs a native singleton method on `target`.
    pub fn define_singleton_native_method(
        &mut self,
        target: Value,
        name: &str,
        arity: i32,
        func: impl Fn(&mut Self, Value, CallArgs<'_>) -> RunResult<Value> + 'static,
    ) -> Result<(), Exception> {
        let mid = self.interns.intern(name);
        let result = self
            .singleton_class_of(target)
            .and_then(|singleton| self.add_method(singleton, mid, Callable::native(arity, func)));
        result.map_err(|err| self.to_exception(err))
    }

    /// Registers an extension that `require name` initializes when no file resolves.
    pub fn register_native_extension(
        &mut self,
        name: impl Into<String>,
        init: impl FnOnce(&mut Self) -> RunResult<()> + 'static,
    ) {
        self.extensions.insert(name.into(), Some(Box::new(init)));
    }

    /// The singleton class of `value`, created on first request.
    pub fn singleton_class(&mut self, value: Value) -> Result<HeapId, Exception> {
        let result = self.singleton_class_of(value);
        result.map_err(|err| self.to_exception(err))
    }

    /// The class of `value`, never a singleton class.
    #[must_use]
    pub fn class_of(&self, value: Value) -> HeapId {
        self.real_class_of(value)
    }

    /// Resolves a constant path such as `"Outer::Inner"` from `Object`.
    pub fn const_get(&mut self, path: &str) -> Option<Value> {
        let mut current = Value::Ref(self.core.object);
        for part in path.split("::") {
            let module = current.heap_id().filter(|&id| self.heap.is_module(id))?;
            let name = self.interns.find(part)?;
            current = self.const_lookup_in(module, name, true)?;
        }
        Some(current)
    }

    /// Fully qualified name of a module, if it has one.
    #[must_use]
    pub fn module_name(&self, module: HeapId) -> Option<String> {
        self.heap.as_module(module).and_then(|m| m.name.clone())
    }

    #[must_use]
    pub fn core(&self) -> &CoreClasses {
        &self.core
    }

    #[must_use]
    pub fn object_class(&self) -> HeapId {
        self.core.object
    }

    /// The top-level `self`.
    #[must_use]
    pub fn main_object(&self) -> Value {
        self.main
    }

    #[must_use]
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    #[must_use]
    pub fn interns(&self) -> &Interns {
        &self.interns
    }

    pub fn intern(&mut self, name: &str) -> Symbol {
        self.interns.intern(name)
    }

    /// A Symbol value.
    pub fn symbol(&mut self, name: &str) -> Value {
        Value::Symbol(self.interns.intern(name))
    }

    /// Text of a String or Symbol value.
    #[must_use]
    pub fn string_value(&self, value: Value) -> Option<String> {
        self.str_of(value).map(str::to_owned)
    }

    /// Elements of an Array value.
    #[must_use]
    pub fn array_values(&self, value: Value) -> Option<Vec<Value>> {
        match value {
            Value::Ref(id) => match self.heap.data(id) {
                HeapData::Array(items) => Some(items.clone()),
                _ => None,
            },
            _ => None,
        }
    }

    /// Reads a global variable such as `"$0"`.
    pub fn global(&mut self, name: &str) -> Value {
        let sym = self.interns.intern(name);
        self.global_get(sym)
    }

    pub fn set_global(&mut self, name: &str, value: Value) {
        let sym = self.interns.intern(name);
        self.global_set(sym, value);
    }

    /// Replaces the contents of `ARGV`.
    pub fn set_argv(&mut self, args: &[&str]) -> Result<(), Exception> {
        let result = self.replace_argv(args.iter().map(|s| (*s).to_owned()).collect());
        result.map_err(|err| self.to_exception(err))
    }

    /// Sets `$0`.
    pub fn set_program_name(&mut self, name: &str) -> Result<(), Exception> {
        let result = self.new_string(name).map(|value| {
            self.global_set(StaticSymbols::ProgramName.into(), value);
        });
        result.map_err(|err| self.to_exception(err))
    }

    /// The tracer, if it is a `T`.
    #[must_use]
    pub fn tracer<T: VmTracer>(&self) -> Option<&T> {
        let any: &dyn Any = self.tracer.as_ref();
        any.downcast_ref()
    }

    pub fn tracer_mut<T: VmTracer>(&mut self) -> Option<&mut T> {
        let any: &mut dyn Any = self.tracer.as_mut();
        any.downcast_mut()
    }

    /// The print writer, if it is a `T`.
    #[must_use]
    pub fn print_writer<T: PrintWriter>(&self) -> Option<&T> {
        let any: &dyn Any = self.print.as_ref();
        any.downcast_ref()
    }

    pub fn print_writer_mut<T: PrintWriter>(&mut self) -> Option<&mut T> {
        let any: &mut dyn Any = self.print.as_mut();
        any.downcast_mut()
    }

    pub fn freeze(&mut self, value: Value) {
        self.freeze_value(value);
    }

    #[must_use]
    pub fn is_frozen(&self, value: Value) -> bool {
        self.frozen(value)
    }

    #[must_use]
    pub fn object_id(&self, value: Value) -> i64 {
        value
            .immediate_object_id()
            .unwrap_or_else(|| value.heap_id().map_or(0, |id| self.heap.get(id).object_id))
    }

    /// Depth of the interpreted call stack.
    #[must_use]
    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn next_frame_serial(&mut self) -> u64 {
        self.next_serial += 1;
        self.next_serial
    }

    pub(crate) fn global_get(&self, name: Symbol) -> Value {
        self.globals.get(&self.global_alias(name)).copied().unwrap_or(Value::Nil)
    }

    pub(crate) fn global_set(&mut self, name: Symbol, value: Value) {
        let name = self.global_alias(name);
        self.globals.insert(name, value);
    }

    /// Long-form globals share storage with their short forms.
    fn global_alias(&self, name: Symbol) -> Symbol {
        match self.interns.get(name) {
            "$LOAD_PATH" => StaticSymbols::LoadPath.into(),
            "$LOADED_FEATURES" => StaticSymbols::LoadedFeatures.into(),
            "$PROGRAM_NAME" => StaticSymbols::ProgramName.into(),
            "$ERROR_INFO" => StaticSymbols::ErrInfo.into(),
            _ => name,
        }
    }
}
