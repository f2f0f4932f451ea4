//! Cross-cutting properties: resource balance, GC safety under stress,
//! mold/scan round-trips, and composition equivalences.

use rill_gc::GcConfig;
use rill_vm::{EvalLimits, Vm};

fn stress_vm() -> Vm {
    Vm::with_config(GcConfig::stress(), EvalLimits::default())
}

#[test]
fn test_stack_balance_over_many_outcomes() {
    let mut vm = Vm::new();
    let programs = [
        "1 + 2",
        "x: [a b] append x 'c",
        "divide 1 0",
        "throw/name 9 'nowhere",
        "catch [throw 1]",
        "f: func [n] [return n] f 5",
        "for-each v [1 2 3] [if v = 2 [break]]",
    ];
    for program in programs {
        let _ = vm.run(program);
        assert_eq!(vm.level_depth(), 0, "levels leaked by {program}");
        assert!(vm.data_stack.is_empty(), "data stack leaked by {program}");
    }
}

#[test]
fn test_gc_stress_keeps_results_correct() {
    // Collecting at every opportunity surfaces missing roots immediately.
    let mut vm = stress_vm();
    assert_eq!(
        vm.run("acc: 0 for-each v [1 2 3 4] [acc: acc + v] acc")
            .expect("run")
            .as_int(),
        Some(10)
    );
    assert_eq!(
        vm.run("f: specialize :append [value: 1] mold f [9]")
            .map(|c| vm.form(&c))
            .expect("run"),
        "[9 1]"
    );
    assert_eq!(
        vm.run("o: make object! [a: 41] o/a + 1").expect("run").as_int(),
        Some(42)
    );
}

#[test]
fn test_gc_collects_unreachable_series() {
    let mut vm = Vm::new();
    vm.run("keep: [1 2 3]").expect("run");
    for _ in 0..16 {
        vm.run("append copy [] 99").expect("run"); // garbage each time
    }
    vm.collect_garbage();
    let freed = vm.heap.stats.freed_total;
    assert!(freed > 0, "expected transient blocks to be collected");
    // The kept block still works.
    assert_eq!(
        vm.run("length-of keep").expect("run").as_int(),
        Some(3)
    );
}

#[test]
fn test_mold_scan_roundtrip_through_vm() {
    let mut vm = Vm::new();
    for source in [
        "[1 2.5 \"text\" word 'quoted ~quasi~ [nested (group)] a/b/c 1.2.3 <tag> #issue]",
        "[x: :y ^m _ , /ref]",
    ] {
        let first = vm.run(source).expect("first scan");
        let molded = vm.mold(&first);
        let second = vm.run(&molded).expect("second scan");
        let remolded = vm.mold(&second);
        assert_eq!(molded, remolded, "round-trip failed for {source}");
    }
}

#[test]
fn test_frozen_series_resist_mutation() {
    let mut vm = Vm::new();
    // Sequences are frozen at scan time; poking one errors.
    assert!(vm.run("t: 1.2.3 poke t 1 9").is_err());
}

#[test]
fn test_specialize_commutes_with_direct_call() {
    let mut vm = Vm::new();
    for (spec_def, args, direct) in [
        ("value: 10", "[a b]", "append [a b] 10"),
        ("dup: 2", "[x] 7", "append/dup [x] 7 2"),
    ] {
        let specialized = vm
            .run(&format!("s: specialize :append [{spec_def}] mold s {args}"))
            .map(|c| vm.form(&c))
            .unwrap_or_else(|e| panic!("specialized {spec_def}: {e}"));
        let direct = vm
            .run(&format!("mold {direct}"))
            .map(|c| vm.form(&c))
            .expect("direct");
        assert_eq!(specialized, direct, "{spec_def}");
    }
}

#[test]
fn test_merge_preserves_resolution() {
    // Any symbol resolvable via the outer chain resolves identically after
    // merging with another chain.
    let mut vm = Vm::new();
    assert_eq!(
        vm.run("let a: 1 let b: 2 a + b").expect("run").as_int(),
        Some(3)
    );
    assert_eq!(
        vm.run("x: 10 let x: 1000 + let x: x + 10 x").expect("run").as_int(),
        Some(1020)
    );
}

#[test]
fn test_level_depth_limit() {
    let mut vm = Vm::with_config(
        GcConfig::default(),
        EvalLimits { max_levels: 24, max_data_stack: 1 << 10 },
    );
    vm.run("f: func [] [f]").expect("define");
    let failure = vm.run("f").expect_err("must overflow");
    let text = failure.to_string();
    assert!(text.contains("depth"), "unexpected: {text}");
}

#[test]
fn test_type_errors_name_the_parameter() {
    let mut vm = Vm::new();
    let failure = vm.run("add \"one\" 2").expect_err("type error");
    let text = failure.to_string();
    assert!(text.contains("value1"), "unexpected: {text}");
}
