//! Control flow: branching, catch/throw, loops, raised errors.

use rill_core::Category;
use rill_vm::api::RunFailure;
use rill_vm::Vm;

fn eval_int(vm: &mut Vm, source: &str) -> i64 {
    let result = vm.run(source).unwrap_or_else(|e| panic!("{source}: {e}"));
    result
        .as_int()
        .unwrap_or_else(|| panic!("{source}: expected integer, got {result:?}"))
}

#[test]
fn test_if_and_either() {
    let mut vm = Vm::new();
    assert_eq!(eval_int(&mut vm, "if true [1]"), 1);
    assert!(vm.run("if false [1]").expect("run").is_nulled());
    assert_eq!(eval_int(&mut vm, "either 1 < 2 [10] [20]"), 10);
    assert_eq!(eval_int(&mut vm, "either 1 > 2 [10] [20]"), 20);
}

#[test]
fn test_then_and_else_enfix() {
    let mut vm = Vm::new();
    assert_eq!(eval_int(&mut vm, "if false [1] else [2]"), 2);
    assert_eq!(eval_int(&mut vm, "if true [1] then [2]"), 2);
    assert_eq!(eval_int(&mut vm, "if true [1] else [2]"), 1);
    assert_eq!(eval_int(&mut vm, "null else [7]"), 7);
}

#[test]
fn test_catch_throw_unlabelled() {
    let mut vm = Vm::new();
    assert_eq!(eval_int(&mut vm, "catch [throw 5 99]"), 5);
    assert!(vm.run("catch [1 + 1]").expect("run").is_nulled());
}

#[test]
fn test_catch_throw_by_name() {
    let mut vm = Vm::new();
    assert_eq!(eval_int(&mut vm, "catch/name [throw/name 1 'x] 'x"), 1);
    // A different name re-raises past this catch.
    let failure = vm
        .run("catch/name [throw/name 1 'x] 'y")
        .expect_err("mismatched name");
    assert!(matches!(failure, RunFailure::Thrown { .. }));
    // Nested catches: the inner mismatch defers to the outer match.
    assert_eq!(
        eval_int(&mut vm, "catch/name [catch/name [throw/name 3 'outer] 'inner] 'outer"),
        3
    );
    // Plain catch does not take named throws.
    assert!(vm
        .run("catch [throw/name 1 'x]")
        .is_err());
}

#[test]
fn test_repeat_and_break_continue() {
    let mut vm = Vm::new();
    assert_eq!(eval_int(&mut vm, "acc: 0 repeat 5 [acc: acc + 1] acc"), 5);
    assert!(vm.run("repeat 3 [break]").expect("run").is_nulled());
    assert_eq!(
        eval_int(
            &mut vm,
            "acc: 0 n: 0 repeat 5 [n: n + 1 if n > 2 [continue] acc: acc + n] acc"
        ),
        3
    );
}

#[test]
fn test_while_until() {
    let mut vm = Vm::new();
    assert_eq!(
        eval_int(&mut vm, "n: 0 while [n < 5] [n: n + 1] n"),
        5
    );
    assert_eq!(eval_int(&mut vm, "n: 0 until [n: n + 1 n > 3] n"), 4);
}

#[test]
fn test_for_each() {
    let mut vm = Vm::new();
    assert_eq!(
        eval_int(&mut vm, "acc: 0 for-each v [1 2 3] [acc: acc + v] acc"),
        6
    );
    // Multiple variables consume in chunks.
    assert_eq!(
        eval_int(&mut vm, "acc: 0 for-each [a b] [1 2 3 4] [acc: acc + a * 10 + b] acc"),
        154
    );
    // Break yields null from the loop.
    assert!(vm
        .run("for-each v [1 2] [break]")
        .expect("run")
        .is_nulled());
}

#[test]
fn test_for_each_quoted_variable_reuses_binding() {
    let mut vm = Vm::new();
    // The quoted form writes through the existing variable: the outer x is
    // mutated, not shadowed.
    assert_eq!(eval_int(&mut vm, "x: 1 for-each 'x [10 20] [] x"), 20);
    // The plain form leaves the outer variable alone.
    assert_eq!(eval_int(&mut vm, "y: 1 for-each y [10 20] [] y"), 1);
}

#[test]
fn test_loop_variable_outlives_loop() {
    let mut vm = Vm::new();
    // Capturing the loop word gives access to its final value afterwards.
    assert_eq!(
        eval_int(&mut vm, "word: null for-each v [1 2 3] [word: 'v] get word"),
        3
    );
}

#[test]
fn test_raised_error_categories() {
    let mut vm = Vm::new();
    match vm.run("divide 1 0").expect_err("zero divide") {
        RunFailure::Error(err) => assert_eq!(err.category, Category::Math),
        other => panic!("expected raised error, got {other:?}"),
    }
    match vm.run("no-such-thing-here").expect_err("unbound") {
        RunFailure::Error(err) => assert_eq!(err.category, Category::Script),
        other => panic!("expected raised error, got {other:?}"),
    }
}

#[test]
fn test_try_defuses_errors() {
    let mut vm = Vm::new();
    assert!(vm.run("try [divide 1 0]").expect("run").is_nulled());
    assert_eq!(eval_int(&mut vm, "try [1 + 2]"), 3);
    // Throws are not errors; they pass through TRY.
    assert!(vm.run("try [throw 1]").is_err());
}

#[test]
fn test_fail_raises() {
    let mut vm = Vm::new();
    assert!(vm.run("fail \"deliberate\"").is_err());
    assert!(vm.run("try [fail \"deliberate\"]").expect("run").is_nulled());
}

#[test]
fn test_do_forms() {
    let mut vm = Vm::new();
    assert_eq!(eval_int(&mut vm, "do [1 + 2]"), 3);
    assert_eq!(eval_int(&mut vm, "do \"3 * 4\""), 12);
}

#[test]
fn test_interrupt_becomes_throw() {
    let mut vm = Vm::new();
    let flag = vm.interrupt.clone();
    flag.store(true, std::sync::atomic::Ordering::Relaxed);
    let failure = vm.run("repeat 100 [1]").expect_err("interrupted");
    match failure {
        RunFailure::Thrown { label, .. } => {
            assert_eq!(vm.spell(&label).as_deref(), Some("interrupt"));
        }
        other => panic!("expected interrupt throw, got {other:?}"),
    }
}
