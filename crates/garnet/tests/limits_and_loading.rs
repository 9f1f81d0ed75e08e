//! Resource limits, fast-path guards and `require`.

use garnet::{
    InstructionSequence, IseqBuilder, MemoryLoader, RecordingTracer, ResourceLimits, Value, Vm, VmOptions,
    iseq::FastOp,
};
use pretty_assertions::assert_eq;

/// `1 + 2`
fn add_one_two(top: &mut IseqBuilder) {
    top.put_int(1).put_int(2).opt(FastOp::Plus);
}

/// An endless loop is stopped by the operation limit.
#[test]
fn operation_limit_interrupts_loops() {
    let mut vm = Vm::new(VmOptions::new().limits(ResourceLimits::new().max_operations(10_000)));
    let mut top = IseqBuilder::top("spin.rb");
    let again = top.new_label();
    top.place(again).put_bool(true).branch_if(again).put_nil().leave();
    let err = vm.run(&top.finish().unwrap()).unwrap_err();
    assert_eq!(err.class_name(), "Interrupt");
    assert!(err.message().starts_with("operation limit exceeded"), "{err}");
}

/// Unbounded recursion raises SystemStackError instead of overflowing the host stack.
#[test]
fn deep_recursion_is_an_error() {
    let mut vm = Vm::new(VmOptions::new().limits(ResourceLimits::new().max_recursion_depth(64)));
    let mut top = IseqBuilder::top("recurse.rb");
    let mut down = top.method("down");
    down.vcall("down").leave();
    let down = down.build().unwrap();
    top.define_method("down", down).vcall("down").leave();
    let err = vm.run(&top.finish().unwrap()).unwrap_err();
    assert_eq!(err.class_name(), "SystemStackError");
    assert_eq!(err.message(), "stack level too deep");
}

/// Allocations made by the program count against the allocation limit.
#[test]
fn allocation_limit_stops_allocating_loops() {
    let mut vm = Vm::new(VmOptions::new().limits(ResourceLimits::new().max_allocations(500)));
    let mut top = IseqBuilder::top("alloc.rb");
    let mut block = top.block();
    block.new_array(0).leave();
    let block = block.build().unwrap();
    top.put_self().fcall_block("loop", 0, block).leave();
    let err = vm.run(&top.finish().unwrap()).unwrap_err();
    assert_eq!(err.class_name(), "NoMemoryError");
}

/// `opt_plus` takes the fast path until Integer#+ is redefined.
#[test]
fn redefinition_disables_fast_path() {
    let mut vm = Vm::new(VmOptions::new().tracer(RecordingTracer::without_instructions()));
    let mut top = IseqBuilder::top("fast.rb");
    add_one_two(&mut top);
    top.leave();
    assert_eq!(vm.run(&top.finish().unwrap()).unwrap(), Value::Integer(3));

    let mut top = IseqBuilder::top("redefine.rb");
    let mut body = top.class_body("Integer");
    let mut plus = body.method("+");
    plus.lead_params(&["other"]);
    plus.put_int(42).leave();
    let plus = plus.build().unwrap();
    body.define_method("+", plus).put_nil().leave();
    let body = body.build().unwrap();
    top.define_class("Integer", None, body).pop();
    add_one_two(&mut top);
    top.leave();
    assert_eq!(vm.run(&top.finish().unwrap()).unwrap(), Value::Integer(42));

    let tracer = vm.tracer::<RecordingTracer>().unwrap();
    assert_eq!(tracer.fast_path_decisions("opt_plus"), vec![true, false]);
}

/// `1 < 2`, `1.send(:<, 2)` and `1 != 2`, in that order.
fn comparisons(path: &str) -> InstructionSequence {
    let mut top = IseqBuilder::top(path);
    top.put_int(1).put_int(2).opt(FastOp::Lt);
    top.put_int(1).put_int(2).send("<", 1);
    top.put_int(1).put_int(2).opt(FastOp::Neq);
    top.new_array(3).leave();
    top.finish().unwrap()
}

/// `opt_lt` agrees with `Integer#<` and defers to a redefinition; `opt_neq` stays inline
/// because `!=` and `==` are still the builtin ones.
#[test]
fn comparison_fast_paths_follow_dispatch() {
    let mut vm = Vm::new(VmOptions::new().tracer(RecordingTracer::without_instructions()));
    let value = vm.run(&comparisons("compare.rb")).unwrap();
    assert_eq!(vm.inspect(value).unwrap(), "[true, true, true]");

    let mut top = IseqBuilder::top("redefine_lt.rb");
    let mut body = top.class_body("Integer");
    let mut less = body.method("<");
    less.lead_params(&["other"]);
    less.put_symbol("override").leave();
    let less = less.build().unwrap();
    body.define_method("<", less).put_nil().leave();
    let body = body.build().unwrap();
    top.define_class("Integer", None, body).pop().put_nil().leave();
    vm.run(&top.finish().unwrap()).unwrap();

    let value = vm.run(&comparisons("compare_again.rb")).unwrap();
    assert_eq!(vm.inspect(value).unwrap(), "[:override, :override, true]");

    let tracer = vm.tracer::<RecordingTracer>().unwrap();
    assert_eq!(tracer.fast_path_decisions("opt_lt"), vec![true, false]);
    assert_eq!(tracer.fast_path_decisions("opt_neq"), vec![true, true]);
}

/// `require` runs a file once and reports whether it loaded it.
#[test]
fn require_loads_each_feature_once() {
    let mut lib = IseqBuilder::top("lib/util.rb");
    let mut answer = lib.method("util_answer");
    answer.put_int(42).leave();
    let answer = answer.build().unwrap();
    lib.define_method("util_answer", answer);
    lib.get_global("$count").put_int(1).opt(FastOp::Plus).set_global("$count");
    lib.put_nil().leave();
    let loader = MemoryLoader::new().with_file("lib/util.rb", lib.finish().unwrap());

    let mut vm = Vm::new(VmOptions::new().load_path(["lib"]).loader(loader));
    let mut top = IseqBuilder::top("main.rb");
    top.put_int(0).set_global("$count");
    top.put_self().put_string("util").fcall("require", 1);
    top.put_self().put_string("util").fcall("require", 1);
    top.vcall("util_answer");
    top.get_global("$count");
    top.new_array(4).leave();
    let value = vm.run(&top.finish().unwrap()).unwrap();
    assert_eq!(vm.inspect(value).unwrap(), "[true, false, 42, 1]");
    let features = vm.global("$\"");
    assert_eq!(vm.inspect(features).unwrap(), "[\"lib/util.rb\"]");
}

/// A missing feature raises LoadError.
#[test]
fn missing_feature_is_a_load_error() {
    let mut vm = Vm::new(VmOptions::new().loader(MemoryLoader::new()));
    let mut top = IseqBuilder::top("main.rb");
    top.put_self().put_string("nowhere").fcall("require", 1).leave();
    let err = vm.run(&top.finish().unwrap()).unwrap_err();
    assert_eq!(err.class_name(), "LoadError");
    assert_eq!(err.message(), "cannot load such file -- nowhere");
}

/// A serialized artifact runs the same as the original.
#[test]
fn artifacts_survive_serialization() {
    let mut top = IseqBuilder::top("bytes.rb");
    add_one_two(&mut top);
    top.put_int(4).opt(FastOp::Mult).leave();
    let artifact = top.finish().unwrap();
    let restored = InstructionSequence::from_bytes(&artifact.to_bytes().unwrap()).unwrap();
    assert_eq!(restored, artifact);
    let mut vm = Vm::new(VmOptions::new());
    assert_eq!(vm.run(&restored).unwrap(), Value::Integer(12));
}

/// Artifacts whose optional parameters lack entry points are rejected before they run.
#[test]
fn malformed_parameters_are_rejected() {
    let mut top = IseqBuilder::top("broken.rb");
    let mut method = top.method("pick");
    method.opt_param("y");
    method.opt_entry().put_int(1).set_local("y").opt_entry();
    method.get_local("y").leave();
    let mut method = method.build().unwrap();
    method.params.opt_table.clear();
    top.define_method("pick", method);
    top.put_self().put_int(5).fcall("pick", 1).leave();
    let artifact = top.finish().unwrap();

    let mut vm = Vm::new(VmOptions::new());
    let err = vm.run(&artifact).unwrap_err();
    assert_eq!(err.class_name(), "ScriptError");
    assert!(err.message().contains("1 optional parameters with 0 entry points"), "{err}");
}
