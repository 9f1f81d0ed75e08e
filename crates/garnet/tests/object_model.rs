//! Classes, modules, method resolution and singleton objects, driven through assembled
//! instruction sequences.

use garnet::{
    ExcType, IseqBuilder, Value, Vm, VmOptions,
    iseq::{CallFlags, FastOp, IseqKind},
};
use pretty_assertions::assert_eq;

fn new_vm() -> Vm {
    Vm::new(VmOptions::new())
}

/// Runs `top` and returns the inspected result.
fn run_inspect(vm: &mut Vm, top: IseqBuilder) -> String {
    let artifact = top.finish().unwrap();
    let value = vm.run(&artifact).unwrap();
    vm.inspect(value).unwrap()
}

/// Adds `def name; [:tag]; end` or, with `call_super`, `def name; super << :tag; end`.
fn define_tagged(body: &mut IseqBuilder, name: &str, tag: &str, call_super: bool) {
    let mut method = body.method(name);
    if call_super {
        method.put_self().invoke_super(0, false, None);
        method.put_symbol(tag).opt(FastOp::Ltlt).leave();
    } else {
        method.put_symbol(tag).new_array(1).leave();
    }
    let method = method.build().unwrap();
    body.define_method(name, method);
}

/// Instance variables persist across calls on the same object.
#[test]
fn counter_keeps_state_in_ivars() {
    let mut vm = new_vm();
    let mut top = IseqBuilder::top("counter.rb");
    let mut body = top.class_body("Counter");
    let mut init = body.method("initialize");
    init.put_int(0).set_ivar("@n").put_nil().leave();
    let init = init.build().unwrap();
    let mut bump = body.method("bump");
    bump.get_ivar("@n").put_int(1).opt(FastOp::Plus).dup().set_ivar("@n").leave();
    let bump = bump.build().unwrap();
    body.define_method("initialize", init).define_method("bump", bump).put_nil().leave();
    let body = body.build().unwrap();

    top.define_class("Counter", None, body).pop();
    top.get_constant("Counter").send("new", 0).set_local("c");
    top.get_local("c").send("bump", 0).pop();
    top.get_local("c").send("bump", 0).leave();
    let artifact = top.finish().unwrap();
    assert_eq!(vm.run(&artifact).unwrap(), Value::Integer(2));
}

/// An included module sits between a class and its superclass, and `super` walks that chain.
#[test]
fn include_inserts_module_after_class() {
    let mut vm = new_vm();
    let mut top = IseqBuilder::top("include.rb");

    let mut base = top.class_body("Base");
    define_tagged(&mut base, "hi", "base", false);
    base.put_nil().leave();
    let base = base.build().unwrap();

    let mut mixin = top.child(IseqKind::Class, "<module:M>");
    define_tagged(&mut mixin, "hi", "m", true);
    mixin.put_nil().leave();
    let mixin = mixin.build().unwrap();

    let mut child = top.class_body("Child");
    child.put_self().get_constant("M").fcall("include", 1).pop();
    define_tagged(&mut child, "hi", "child", true);
    child.put_nil().leave();
    let child = child.build().unwrap();

    top.define_class("Base", None, base).pop();
    top.define_module("M", mixin).pop();
    top.define_class("Child", Some("Base"), child).pop();
    top.get_constant("Child").send("new", 0).send("hi", 0);
    top.get_constant("Child").send("ancestors", 0);
    top.new_array(2).leave();
    assert_eq!(
        run_inspect(&mut vm, top),
        "[[:base, :m, :child], [Child, M, Base, Object, Kernel, BasicObject]]"
    );
}

/// A prepended module runs before the class's own method.
#[test]
fn prepend_wraps_class_methods() {
    let mut vm = new_vm();
    let mut top = IseqBuilder::top("prepend.rb");

    let mut wrapper = top.child(IseqKind::Class, "<module:P>");
    define_tagged(&mut wrapper, "hi", "p", true);
    wrapper.put_nil().leave();
    let wrapper = wrapper.build().unwrap();

    let mut class = top.class_body("C");
    class.put_self().get_constant("P").fcall("prepend", 1).pop();
    define_tagged(&mut class, "hi", "c", false);
    class.put_nil().leave();
    let class = class.build().unwrap();

    top.define_module("P", wrapper).pop();
    top.define_class("C", None, class).pop();
    top.get_constant("C").send("new", 0).send("hi", 0);
    top.get_constant("C").send("ancestors", 0);
    top.new_array(2).leave();
    assert_eq!(run_inspect(&mut vm, top), "[[:c, :p], [P, C, Object, Kernel, BasicObject]]");
}

/// `def obj.name` is visible on that object only.
#[test]
fn singleton_methods_stay_on_one_object() {
    let mut vm = new_vm();
    let mut top = IseqBuilder::top("singleton.rb");
    let mut greet = top.method("greet");
    greet.put_symbol("hi").leave();
    let greet = greet.build().unwrap();

    top.get_constant("Object").send("new", 0).set_local("o");
    top.get_local("o").define_smethod("greet", greet);
    top.get_local("o").send("greet", 0);
    top.get_local("o").send("singleton_methods", 0);
    top.get_constant("Object").send("new", 0).put_symbol("greet").send("respond_to?", 1);
    top.new_array(3).leave();
    assert_eq!(run_inspect(&mut vm, top), "[:hi, [:greet], false]");
}

/// Top-level definitions are private methods of Object.
#[test]
fn top_level_methods_are_private() {
    let mut vm = new_vm();
    let mut top = IseqBuilder::top("private.rb");
    let mut helper = top.method("helper");
    helper.put_int(7).leave();
    let helper = helper.build().unwrap();
    top.define_method("helper", helper).vcall("helper").leave();
    let artifact = top.finish().unwrap();
    assert_eq!(vm.run(&artifact).unwrap(), Value::Integer(7));

    let mut top = IseqBuilder::top("private_call.rb");
    top.put_int(1).send("helper", 0).leave();
    let err = vm.run(&top.finish().unwrap()).unwrap_err();
    assert_eq!(err.class_name(), "NoMethodError");
    assert_eq!(err.message(), "private method `helper' called for an instance of Integer");
}

/// `remove_method` and `undef_method` hide inherited definitions until the name is defined again.
#[test]
fn remove_and_undef_method() {
    let mut vm = new_vm();
    let mut top = IseqBuilder::top("undef.rb");
    let mut parent = top.class_body("A");
    define_tagged(&mut parent, "x", "a", false);
    parent.put_nil().leave();
    let parent = parent.build().unwrap();
    let mut child = top.class_body("B");
    define_tagged(&mut child, "x", "b", false);
    child.put_nil().leave();
    let child = child.build().unwrap();
    top.define_class("A", None, parent).pop();
    top.define_class("B", Some("A"), child).pop();
    top.get_constant("B").send("new", 0).send("x", 0).leave();
    assert_eq!(run_inspect(&mut vm, top), "[:b]");

    let mut top = IseqBuilder::top("remove.rb");
    top.get_constant("B").put_symbol("remove_method").put_symbol("x").send("send", 2).pop();
    top.get_constant("B").send("new", 0).send("x", 0).leave();
    let err = vm.run(&top.finish().unwrap()).unwrap_err();
    assert!(err.is_a(ExcType::NoMethodError));
    assert_eq!(err.message(), "undefined method `x' for an instance of B");

    let mut top = IseqBuilder::top("redefine.rb");
    let mut reopened = top.class_body("B");
    define_tagged(&mut reopened, "x", "b2", false);
    reopened.put_nil().leave();
    let reopened = reopened.build().unwrap();
    top.define_class("B", None, reopened).pop();
    top.get_constant("B").send("new", 0).send("x", 0).leave();
    assert_eq!(run_inspect(&mut vm, top), "[:b2]");

    let mut top = IseqBuilder::top("undef2.rb");
    top.get_constant("B").put_symbol("undef_method").put_symbol("x").send("send", 2).pop();
    top.get_constant("B").send("new", 0).send("x", 0).leave();
    let err = vm.run(&top.finish().unwrap()).unwrap_err();
    assert!(err.is_a(ExcType::NoMethodError));
    assert_eq!(err.message(), "undefined method `x' for an instance of B");

    let mut top = IseqBuilder::top("undef_parent.rb");
    top.get_constant("A").send("new", 0).send("x", 0).leave();
    assert_eq!(run_inspect(&mut vm, top), "[:a]");
}

/// `alias_method` copies the current body, so redefining the original leaves the alias alone.
#[test]
fn alias_keeps_the_old_body() {
    let mut vm = new_vm();
    let mut top = IseqBuilder::top("alias.rb");
    let mut class = top.class_body("A");
    define_tagged(&mut class, "foo", "old", false);
    class.put_self().put_symbol("bar").put_symbol("foo").fcall("alias_method", 2).pop();
    define_tagged(&mut class, "foo", "new", false);
    class.put_nil().leave();
    let class = class.build().unwrap();
    top.define_class("A", None, class).pop();
    top.get_constant("A").send("new", 0).set_local("a");
    top.get_local("a").send("foo", 0);
    top.get_local("a").send("bar", 0);
    top.new_array(2).leave();
    assert_eq!(run_inspect(&mut vm, top), "[[:new], [:old]]");
}

/// A user `method_missing` receives the missing name.
#[test]
fn method_missing_receives_the_name() {
    let mut vm = new_vm();
    let mut top = IseqBuilder::top("ghost.rb");
    let mut class = top.class_body("Ghost");
    let mut missing = class.method("method_missing");
    missing.lead_params(&["name"]);
    missing.rest_param("args");
    missing.get_local("name").leave();
    let missing = missing.build().unwrap();
    class.define_method("method_missing", missing).put_nil().leave();
    let class = class.build().unwrap();
    top.define_class("Ghost", None, class).pop();
    top.get_constant("Ghost").send("new", 0).put_int(1).send("boo", 1).leave();
    assert_eq!(run_inspect(&mut vm, top), ":boo");
}

/// Reopening a class from the host-side API and calling into it.
#[test]
fn host_defined_classes_are_reachable() {
    let mut vm = new_vm();
    let class = vm.define_class("Point", None).unwrap();
    vm.define_native_method(class, "origin?", 0, |_, _, _| Ok(Value::True)).unwrap();
    let point = vm.const_get("Point").unwrap();
    let instance = vm.send(point, "new", &[]).unwrap();
    assert_eq!(vm.send(instance, "origin?", &[]).unwrap(), Value::True);
    assert_eq!(vm.module_name(class).as_deref(), Some("Point"));
}

/// Modifying a frozen String raises FrozenError and leaves it unchanged.
#[test]
fn frozen_strings_reject_mutation() {
    let mut vm = new_vm();
    let mut top = IseqBuilder::top("frozen.rb");
    top.put_string("abc").send("freeze", 0).put_string("d").opt(FastOp::Ltlt).leave();
    let err = vm.run(&top.finish().unwrap()).unwrap_err();
    assert_eq!(err.class_name(), "FrozenError");
    assert_eq!(err.message(), "can't modify frozen String: \"abc\"");
}

/// `singleton_class` creates the class once and returns the same one afterwards.
#[test]
fn singleton_class_is_memoized() {
    let mut vm = new_vm();
    let class = vm.const_get("String").unwrap();
    let first = vm.send(class, "singleton_class", &[]).unwrap();
    let second = vm.send(class, "singleton_class", &[]).unwrap();
    assert!(matches!(first, Value::Ref(_)));
    assert_eq!(first, second);
    assert_eq!(vm.inspect(first).unwrap(), "#<Class:String>");
}

/// Procs created in one frame see each other's writes to a captured local.
#[test]
fn procs_from_one_frame_share_locals() {
    let mut vm = new_vm();
    let mut top = IseqBuilder::top("shared.rb");
    let x = top.local("x");
    let mut inc = top.block();
    inc.get_local_at(x, 1).put_int(1).opt(FastOp::Plus).dup().set_local_at(x, 1).leave();
    let inc = inc.build().unwrap();
    let mut read = top.block();
    read.get_local_at(x, 1).leave();
    let read = read.build().unwrap();

    top.put_int(0).set_local("x");
    top.put_self().fcall_block("proc", 0, inc).set_local("inc");
    top.put_self().fcall_block("proc", 0, read).set_local("read");
    top.get_local("inc").send("call", 0).pop();
    top.get_local("inc").send("call", 0).pop();
    top.get_local("read").send("call", 0);
    top.get_local("x");
    top.new_array(2).leave();
    assert_eq!(run_inspect(&mut vm, top), "[2, 2]");
}

/// `instance_exec` runs a copy of the proc with a new `self`; the proc keeps its own.
#[test]
fn instance_exec_rebinds_a_copy() {
    let mut vm = new_vm();
    let mut top = IseqBuilder::top("instance_exec.rb");
    let mut block = top.block();
    block.put_self().leave();
    let block = block.build().unwrap();
    top.put_self().fcall_block("proc", 0, block).set_local("b");
    top.get_constant("Object").send("new", 0).set_local("o");
    let call_data = top.call_data("instance_exec", 0).with_flags(CallFlags::BLOCKARG);
    top.get_local("o").get_local("b").send_with(call_data, None);
    top.get_local("o").send("equal?", 1);
    top.get_local("b").send("call", 0).put_self().send("equal?", 1);
    top.new_array(2).leave();
    assert_eq!(run_inspect(&mut vm, top), "[true, true]");
}

/// `def` inside `class_eval` defines an instance method of the receiver.
#[test]
fn class_eval_defines_on_the_receiver() {
    let mut vm = new_vm();
    let mut top = IseqBuilder::top("class_eval.rb");
    let mut body = top.class_body("Widget");
    body.put_nil().leave();
    let body = body.build().unwrap();
    let mut block = top.block();
    let mut size = block.method("size");
    size.put_int(3).leave();
    let size = size.build().unwrap();
    block.define_method("size", size).put_self().leave();
    let block = block.build().unwrap();

    top.define_class("Widget", None, body).pop();
    top.get_constant("Widget").send_block("class_eval", 0, block);
    top.get_constant("Widget").send("new", 0).send("size", 0);
    top.new_array(2).leave();
    assert_eq!(run_inspect(&mut vm, top), "[Widget, 3]");
}

/// The ancestor walk stops when the callback asks it to and reports that it was stopped.
#[test]
fn ancestor_walk_stops_early() {
    let mut vm = new_vm();
    let Some(Value::Ref(string)) = vm.const_get("String") else {
        panic!("String is not defined");
    };
    let mut seen = Vec::new();
    let finished = vm.each_unique_ancestor(string, |module| {
        seen.push(module);
        seen.len() < 2
    });
    assert!(!finished);
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0], string);
    assert_eq!(vm.module_name(seen[1]).as_deref(), Some("Comparable"));

    let mut count = 0;
    assert!(vm.each_unique_ancestor(string, |_| {
        count += 1;
        true
    }));
    assert_eq!(count, 5);
}
