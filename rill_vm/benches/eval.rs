//! Evaluator benchmarks: raw stepping, binding resolution, and action
//! dispatch shapes.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rill_vm::Vm;

fn bench_arithmetic(c: &mut Criterion) {
    let mut vm = Vm::new();
    c.bench_function("enfix_arithmetic", |b| {
        b.iter(|| {
            let result = vm.run(black_box("1 + 2 * 3 - 4")).expect("run");
            black_box(result);
        })
    });
}

fn bench_function_calls(c: &mut Criterion) {
    let mut vm = Vm::new();
    vm.run("f: func [n [integer!]] [n + 1]").expect("define");
    c.bench_function("func_call", |b| {
        b.iter(|| {
            let result = vm.run(black_box("f 41")).expect("run");
            black_box(result);
        })
    });
}

fn bench_loop_binding(c: &mut Criterion) {
    let mut vm = Vm::new();
    c.bench_function("for_each_sum", |b| {
        b.iter(|| {
            let result = vm
                .run(black_box("acc: 0 for-each v [1 2 3 4 5 6 7 8] [acc: acc + v] acc"))
                .expect("run");
            black_box(result);
        })
    });
}

fn bench_specialized_dispatch(c: &mut Criterion) {
    let mut vm = Vm::new();
    vm.run("s: specialize :append [value: 0]").expect("define");
    c.bench_function("specialized_append", |b| {
        b.iter(|| {
            let result = vm.run(black_box("s copy []")).expect("run");
            black_box(result);
        })
    });
}

criterion_group!(
    benches,
    bench_arithmetic,
    bench_function_calls,
    bench_loop_binding,
    bench_specialized_dispatch
);
criterion_main!(benches);
