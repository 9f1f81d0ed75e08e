//! Creation of the builtin class graph.
//!
//! `BasicObject`, `Object`, `Module` and `Class` refer to each other (each one's class is
//! `Class`, whose superclass chain runs back through `Module` and `Object`), so they are
//! created in two phases: first allocated without a class, then linked. Nothing else is
//! allocated in between.

use crate::{
    builtins,
    exception::{ExcType, RunResult},
    heap::{Heap, HeapData, HeapId, IoStream},
    intern::{Interns, StaticSymbols},
    types::{AllocKind, Class, Module},
    value::Value,
    vm::Vm,
};

/// Builtin classes and modules, fixed at bootstrap.
#[derive(Debug, Clone)]
pub struct CoreClasses {
    pub basic_object: HeapId,
    pub object: HeapId,
    pub module: HeapId,
    pub class: HeapId,
    pub kernel: HeapId,
    pub comparable: HeapId,
    pub enumerable: HeapId,
    pub numeric: HeapId,
    pub nil_class: HeapId,
    pub true_class: HeapId,
    pub false_class: HeapId,
    pub integer: HeapId,
    pub float: HeapId,
    pub string: HeapId,
    pub symbol: HeapId,
    pub array: HeapId,
    pub hash: HeapId,
    pub proc: HeapId,
    pub regexp: HeapId,
    pub io: HeapId,
    /// Exception classes indexed by `ExcType as usize`.
    exceptions: Vec<HeapId>,
}

impl CoreClasses {
    #[must_use]
    pub fn exception(&self, kind: ExcType) -> HeapId {
        self.exceptions[kind as usize]
    }

    /// The builtin kind whose class is `class`, if any.
    #[must_use]
    pub fn exception_kind(&self, class: HeapId) -> Option<ExcType> {
        self.exceptions
            .iter()
            .position(|&id| id == class)
            .and_then(|index| ExcType::from_repr(index as u8))
    }
}

/// Objects created at bootstrap besides the classes.
pub(crate) struct Roots {
    pub core: CoreClasses,
    pub main: Value,
    pub stdout: HeapId,
    pub stderr: HeapId,
}

struct Bootstrapper<'a> {
    heap: &'a mut Heap,
    interns: &'a mut Interns,
    object: HeapId,
    class: HeapId,
    module: HeapId,
}

impl Bootstrapper<'_> {
    fn alloc(heap: &mut Heap, class: Option<HeapId>, data: HeapData) -> HeapId {
        let id = heap
            .allocate_unlinked(data)
            .expect("bootstrap: allocation is unlimited during bootstrap");
        if let Some(class) = class {
            heap.link_class(id, class);
        }
        id
    }

    fn name_constant(&mut self, outer: HeapId, name: &str, value: HeapId) {
        let sym = self.interns.intern(name);
        self.heap.constants_mut(outer).insert(sym, Value::Ref(value));
    }

    fn class(&mut self, name: &str, superclass: HeapId, alloc: AllocKind) -> HeapId {
        let data = HeapData::Class(Class::new(Some(name.to_owned()), Some(superclass), None, alloc));
        let id = Self::alloc(self.heap, Some(self.class), data);
        self.name_constant(self.object, name, id);
        id
    }

    fn module(&mut self, name: &str) -> HeapId {
        let data = HeapData::Module(Module::new(Some(name.to_owned()), None));
        let id = Self::alloc(self.heap, Some(self.module), data);
        self.name_constant(self.object, name, id);
        id
    }

    fn include(&mut self, target: HeapId, module: HeapId) {
        self.heap.module_mut(target).includes.push(module);
    }
}

pub(crate) fn bootstrap(heap: &mut Heap, interns: &mut Interns) -> Roots {
    // Phase 1: the root classes, with no class links yet.
    let root = |heap: &mut Heap, name: &str, superclass: Option<HeapId>, alloc: AllocKind| {
        let data = HeapData::Class(Class::new(Some(name.to_owned()), superclass, None, alloc));
        Bootstrapper::alloc(heap, None, data)
    };
    let basic_object = root(heap, "BasicObject", None, AllocKind::Object);
    let object = root(heap, "Object", Some(basic_object), AllocKind::Object);
    let module = root(heap, "Module", Some(object), AllocKind::Undefined);
    let class = root(heap, "Class", Some(module), AllocKind::Undefined);

    // Phase 2: link them before anything else exists.
    for id in [basic_object, object, module, class] {
        heap.link_class(id, class);
    }

    let mut b = Bootstrapper {
        heap,
        interns,
        object,
        class,
        module,
    };
    for (name, id) in [
        ("BasicObject", basic_object),
        ("Object", object),
        ("Module", module),
        ("Class", class),
    ] {
        b.name_constant(object, name, id);
    }

    let kernel = b.module("Kernel");
    let comparable = b.module("Comparable");
    let enumerable = b.module("Enumerable");
    b.include(object, kernel);

    let nil_class = b.class("NilClass", object, AllocKind::Undefined);
    let true_class = b.class("TrueClass", object, AllocKind::Undefined);
    let false_class = b.class("FalseClass", object, AllocKind::Undefined);
    let numeric = b.class("Numeric", object, AllocKind::Undefined);
    b.include(numeric, comparable);
    let integer = b.class("Integer", numeric, AllocKind::Undefined);
    let float = b.class("Float", numeric, AllocKind::Undefined);
    let string = b.class("String", object, AllocKind::String);
    b.include(string, comparable);
    let symbol = b.class("Symbol", object, AllocKind::Undefined);
    b.include(symbol, comparable);
    let array = b.class("Array", object, AllocKind::Array);
    b.include(array, enumerable);
    let hash = b.class("Hash", object, AllocKind::Hash);
    b.include(hash, enumerable);
    let proc = b.class("Proc", object, AllocKind::Undefined);
    let regexp = b.class("Regexp", object, AllocKind::Undefined);
    let io = b.class("IO", object, AllocKind::Undefined);

    let mut exceptions: Vec<HeapId> = Vec::new();
    for kind in ExcType::all() {
        let superclass = kind.parent().map_or(object, |parent| exceptions[parent as usize]);
        let name: &'static str = kind.into();
        exceptions.push(b.class(name, superclass, AllocKind::Exception));
    }

    let main = Value::Ref(Bootstrapper::alloc(b.heap, Some(object), HeapData::Object));
    let stdout = Bootstrapper::alloc(b.heap, Some(io), HeapData::Io(IoStream::Stdout));
    let stderr = Bootstrapper::alloc(b.heap, Some(io), HeapData::Io(IoStream::Stderr));
    b.name_constant(object, "STDOUT", stdout);
    b.name_constant(object, "STDERR", stderr);

    Roots {
        core: CoreClasses {
            basic_object,
            object,
            module,
            class,
            kernel,
            comparable,
            enumerable,
            numeric,
            nil_class,
            true_class,
            false_class,
            integer,
            float,
            string,
            symbol,
            array,
            hash,
            proc,
            regexp,
            io,
            exceptions,
        },
        main,
        stdout,
        stderr,
    }
}

impl Vm {
    /// Installs builtin methods and the process-level globals.
    pub(crate) fn install_runtime(&mut self, load_path: Vec<String>, program_name: &str, argv: Vec<String>) {
        self.try_install_runtime(load_path, program_name, argv)
            .expect("bootstrap: builtin installation cannot raise");
    }

    fn try_install_runtime(&mut self, load_path: Vec<String>, program_name: &str, argv: Vec<String>) -> RunResult<()> {
        builtins::register(self)?;

        let paths = load_path
            .iter()
            .map(|path| self.new_string(path))
            .collect::<RunResult<Vec<_>>>()?;
        let paths = self.new_array(paths)?;
        self.global_set(StaticSymbols::LoadPath.into(), paths);
        let features = self.new_array(Vec::new())?;
        self.global_set(StaticSymbols::LoadedFeatures.into(), features);
        let name = self.new_string(program_name)?;
        self.global_set(StaticSymbols::ProgramName.into(), name);
        self.global_set(StaticSymbols::Stdout.into(), Value::Ref(self.stdout));
        self.global_set(StaticSymbols::Stderr.into(), Value::Ref(self.stderr));
        self.replace_argv(argv)
    }

    /// Points the `ARGV` constant at a new array of `args`.
    pub(crate) fn replace_argv(&mut self, args: Vec<String>) -> RunResult<()> {
        let values = args
            .iter()
            .map(|arg| self.new_string(arg))
            .collect::<RunResult<Vec<_>>>()?;
        let argv = self.new_array(values)?;
        self.heap.constants_mut(self.core.object).insert(StaticSymbols::Argv.into(), argv);
        Ok(())
    }
}
