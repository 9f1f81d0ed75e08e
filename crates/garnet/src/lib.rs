#![doc = include_str!("../../../README.md")]
#![expect(clippy::must_use_candidate, reason = "accessors on Vm read like queries already")]
#![expect(clippy::unnecessary_wraps, reason = "every builtin shares the NativeMethod signature")]
mod heap;

mod builtins;
mod callable;
mod exception;
mod intern;
mod io;
pub mod iseq;
pub mod loader;
mod resource;
pub mod tracer;
pub mod types;
mod value;
mod vm;

pub use crate::{
    callable::{CallArgs, Callable, NativeFn, Visibility},
    exception::{ExcType, Exception, RunError, RunResult, SimpleException},
    heap::{Heap, HeapData, HeapEntry, HeapId, HeapStats},
    intern::{Interns, StaticSymbols, Symbol},
    io::{CollectStringPrint, NoPrint, PrintWriter, StdPrint},
    iseq::{InstructionSequence, Iseq, IseqBuilder, VerifyError},
    loader::{Compiler, FsLoader, LoadFailure, Loader, MemoryLoader},
    resource::{
        DEFAULT_MAX_RECURSION_DEPTH, LimitedTracker, NoLimitTracker, ResourceError, ResourceLimits, ResourceTracker,
    },
    tracer::{NoopTracer, ProfilingReport, ProfilingTracer, RecordingTracer, StderrTracer, TraceEvent, VmTracer},
    value::Value,
    vm::{CoreClasses, ExtensionInit, Vm, VmOptions},
};
