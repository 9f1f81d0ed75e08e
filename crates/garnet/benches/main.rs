use criterion::{Bencher, Criterion, black_box, criterion_group, criterion_main};
use garnet::{InstructionSequence, IseqBuilder, NoPrint, Value, Vm, VmOptions, iseq::FastOp};

/// Runs `artifact` on a fresh VM per iteration, checking the result once up front.
fn run_garnet(bench: &mut Bencher, artifact: &InstructionSequence, expected: i64) {
    let mut vm = Vm::new(VmOptions::new().print(NoPrint));
    assert_eq!(vm.run(artifact).unwrap(), Value::Integer(expected));

    bench.iter(|| {
        let mut vm = Vm::new(VmOptions::new().print(NoPrint));
        black_box(vm.run(artifact).unwrap());
    });
}

/// `prelude; while i < 1000; total = total + step(i); i += 1; end; total`
///
/// `step` leaves the term to add on the stack.
fn counting_loop(
    path: &str,
    prelude: impl Fn(&mut IseqBuilder),
    step: impl Fn(&mut IseqBuilder),
) -> InstructionSequence {
    let mut top = IseqBuilder::top(path);
    prelude(&mut top);
    top.put_int(0).set_local("total").put_int(0).set_local("i");
    let (body, cond) = (top.new_label(), top.new_label());
    top.jump(cond);
    top.place(body).get_local("total");
    step(&mut top);
    top.opt(FastOp::Plus).set_local("total");
    top.get_local("i").put_int(1).opt(FastOp::Plus).set_local("i");
    top.place(cond).get_local("i").put_int(1000).opt(FastOp::Lt).branch_if(body);
    top.get_local("total").leave();
    top.finish().unwrap()
}

fn add_loop() -> InstructionSequence {
    counting_loop("add_loop.rb", |_| {}, |top| {
        top.get_local("i");
    })
}

fn method_call_loop() -> InstructionSequence {
    let define_double = |top: &mut IseqBuilder| {
        let mut double = top.method("double");
        double.lead_params(&["x"]);
        double.get_local("x").put_int(2).opt(FastOp::Mult).leave();
        let double = double.build().unwrap();
        top.define_method("double", double);
    };
    counting_loop("call_loop.rb", define_double, |top| {
        top.put_self().get_local("i").fcall("double", 1);
    })
}

fn block_map_sum() -> InstructionSequence {
    let mut top = IseqBuilder::top("block_sum.rb");
    let mut block = top.block();
    block.lead_params(&["i"]);
    block.get_local("i").put_int(2).opt(FastOp::Mult).leave();
    let block = block.build().unwrap();
    top.get_constant("Array").put_int(1000).send_block("new", 1, block);
    top.send("sum", 0).leave();
    top.finish().unwrap()
}

fn criterion_benchmark(c: &mut Criterion) {
    let artifact = add_loop();
    c.bench_function("add_loop_1000", |b| run_garnet(b, &artifact, 499_500));
    let artifact = method_call_loop();
    c.bench_function("method_call_loop_1000", |b| run_garnet(b, &artifact, 999_000));
    let artifact = block_map_sum();
    c.bench_function("array_new_block_sum_1000", |b| run_garnet(b, &artifact, 999_000));
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
