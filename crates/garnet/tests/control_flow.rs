//! Blocks, `break`, exception handlers, `once` and output.

use garnet::{
    CollectStringPrint, IseqBuilder, Value, Vm, VmOptions,
    iseq::{FastOp, IseqKind, ThrowKind},
};
use pretty_assertions::assert_eq;

fn new_vm() -> Vm {
    Vm::new(VmOptions::new().print(CollectStringPrint::new()))
}

fn run_inspect(vm: &mut Vm, top: IseqBuilder) -> String {
    let artifact = top.finish().unwrap();
    let value = vm.run(&artifact).unwrap();
    vm.inspect(value).unwrap()
}

fn output(vm: &Vm) -> String {
    vm.print_writer::<CollectStringPrint>().unwrap().output().to_owned()
}

/// `{ |x| break x * 10 if x == 2; x }`
fn breaking_block(top: &IseqBuilder) -> garnet::Iseq {
    let mut block = top.block();
    block.lead_params(&["x"]);
    let keep = block.new_label();
    block.get_local("x").put_int(2).opt(FastOp::Eq).branch_unless(keep);
    block.get_local("x").put_int(10).opt(FastOp::Mult).throw(ThrowKind::Break);
    block.place(keep).get_local("x").leave();
    block.build().unwrap()
}

/// `break` in a block passed to Array#each ends the call with the break value.
#[test]
fn break_leaves_each_with_value() {
    let mut vm = new_vm();
    let mut top = IseqBuilder::top("break.rb");
    let block = breaking_block(&top);
    top.put_int(1).put_int(2).put_int(3).new_array(3).send_block("each", 0, block).leave();
    assert_eq!(run_inspect(&mut vm, top), "20");
}

/// `break` also unwinds through Enumerable methods built on `each`.
#[test]
fn break_leaves_enumerable_methods() {
    let mut vm = new_vm();
    let mut top = IseqBuilder::top("break_map.rb");
    let block = breaking_block(&top);
    top.put_int(1).put_int(2).put_int(3).new_array(3).send_block("map", 0, block).pop();
    let block = breaking_block(&top);
    top.put_int(1).put_int(3).new_array(2).send_block("map", 0, block);
    top.new_array(1).leave();
    assert_eq!(run_inspect(&mut vm, top), "[[1, 3]]");

    let mut top = IseqBuilder::top("break_find.rb");
    let block = breaking_block(&top);
    top.put_int(1).put_int(2).put_int(3).new_array(3).send_block("find_index", 0, block).leave();
    assert_eq!(run_inspect(&mut vm, top), "20");
}

/// `rescue => e` receives the exception object.
#[test]
fn rescue_handler_gets_exception() {
    let mut vm = new_vm();
    let mut top = IseqBuilder::top("rescue.rb");
    let (start, end, handler, done) = (top.new_label(), top.new_label(), top.new_label(), top.new_label());
    top.place(start).put_int(1).put_int(0).opt(FastOp::Div).place(end).jump(done);
    top.place(handler).send("message", 0);
    top.place(done).leave();
    top.rescue(start, end, handler, 0);
    assert_eq!(run_inspect(&mut vm, top), "\"divided by 0\"");
    assert!(!vm.global("$!").is_nil());
}

/// An ensure handler runs while an exception passes through, then the exception continues.
#[test]
fn ensure_runs_before_unwinding() {
    let mut vm = new_vm();
    let mut top = IseqBuilder::top("ensure.rb");
    top.new_array(0).set_global("$log");
    let (start, end, handler) = (top.new_label(), top.new_label(), top.new_label());
    top.place(start).put_self().put_string("boom").fcall("raise", 1).place(end);
    top.get_global("$log").put_symbol("ensure").opt(FastOp::Ltlt).pop().leave();
    top.place(handler);
    top.get_global("$log").put_symbol("ensure").opt(FastOp::Ltlt).pop();
    top.end_ensure().put_nil().leave();
    top.ensure(start, end, handler, 0);

    let err = vm.run(&top.finish().unwrap()).unwrap_err();
    assert_eq!(err.class_name(), "RuntimeError");
    assert_eq!(err.message(), "boom");
    assert_eq!(err.backtrace().first().map(String::as_str), Some("ensure.rb:in `<main>'"));
    let log = vm.global("$log");
    assert_eq!(vm.inspect(log).unwrap(), "[:ensure]");
}

/// `once` evaluates its body a single time however often the site runs.
#[test]
fn once_runs_body_once() {
    let mut vm = new_vm();
    let mut top = IseqBuilder::top("once.rb");
    top.put_int(0).set_global("$hits");
    let mut block = top.block();
    let mut body = block.child(IseqKind::Block, "once");
    body.get_global("$hits").put_int(1).opt(FastOp::Plus).dup().set_global("$hits").leave();
    let body = body.build().unwrap();
    block.once(body).leave();
    let block = block.build().unwrap();
    top.put_int(3).send_block("times", 0, block).pop();
    top.get_global("$hits").leave();
    let artifact = top.finish().unwrap();
    assert_eq!(vm.run(&artifact).unwrap(), Value::Integer(1));
}

/// Lambdas check arity and answer `lambda?`.
#[test]
fn lambdas_are_strict() {
    let mut vm = new_vm();
    let mut top = IseqBuilder::top("lambda.rb");
    let mut block = top.block();
    block.lead_params(&["x"]);
    block.get_local("x").put_int(2).opt(FastOp::Mult).leave();
    let block = block.build().unwrap();
    top.put_self().fcall_block("lambda", 0, block).set_local("double");
    top.get_local("double").put_int(21).send("call", 1);
    top.get_local("double").send("lambda?", 0);
    top.get_local("double").send("arity", 0);
    top.new_array(3).leave();
    assert_eq!(run_inspect(&mut vm, top), "[42, true, 1]");

    let mut top = IseqBuilder::top("lambda_arity.rb");
    let mut block = top.block();
    block.lead_params(&["x"]);
    block.get_local("x").leave();
    let block = block.build().unwrap();
    top.put_self().fcall_block("lambda", 0, block).send("call", 0).leave();
    let err = vm.run(&top.finish().unwrap()).unwrap_err();
    assert_eq!(err.class_name(), "ArgumentError");
    assert_eq!(err.message(), "wrong number of arguments (given 0, expected 1)");
}

/// `yield` runs the block given to the current method.
#[test]
fn yield_calls_the_method_block() {
    let mut vm = new_vm();
    let mut top = IseqBuilder::top("yield.rb");
    let mut twice = top.method("twice");
    twice.put_int(1).invoke_block(1).put_int(2).invoke_block(1).new_array(2).leave();
    let twice = twice.build().unwrap();
    let mut block = top.block();
    block.lead_params(&["n"]);
    block.get_local("n").put_int(100).opt(FastOp::Plus).leave();
    let block = block.build().unwrap();
    top.define_method("twice", twice);
    top.put_self().fcall_block("twice", 0, block).leave();
    assert_eq!(run_inspect(&mut vm, top), "[101, 102]");
}

/// `puts` and `p` write through the configured PrintWriter.
#[test]
fn output_goes_to_print_writer() {
    let mut vm = new_vm();
    let mut top = IseqBuilder::top("puts.rb");
    top.put_self().put_string("hello").put_int(1).put_int(2).new_array(2).fcall("puts", 2).pop();
    top.put_self().put_string("x").put_symbol("y").new_array(2).fcall("p", 1).leave();
    let artifact = top.finish().unwrap();
    vm.run(&artifact).unwrap();
    assert_eq!(output(&vm), "hello\n1\n2\n[\"x\", :y]\n");
}

/// `loop` stops quietly when the block raises StopIteration.
#[test]
fn loop_ends_on_stop_iteration() {
    let mut vm = new_vm();
    let mut top = IseqBuilder::top("loop.rb");
    top.put_int(0).set_global("$i");
    let mut block = top.block();
    let go_on = block.new_label();
    block.get_global("$i").put_int(1).opt(FastOp::Plus).dup().set_global("$i");
    block.put_int(3).opt(FastOp::Lt).branch_if(go_on);
    block.put_self().get_constant("StopIteration").fcall("raise", 1).leave();
    block.place(go_on).put_nil().leave();
    let block = block.build().unwrap();
    top.put_self().fcall_block("loop", 0, block).pop();
    top.get_global("$i").leave();
    let artifact = top.finish().unwrap();
    assert_eq!(vm.run(&artifact).unwrap(), Value::Integer(3));
}
