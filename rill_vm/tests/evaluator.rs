//! End-to-end evaluator tests: stepping, enfix, assignment, groups,
//! invisibles, and LET/USE binding flow.

use rill_vm::Vm;

fn eval_int(vm: &mut Vm, source: &str) -> i64 {
    let result = vm.run(source).unwrap_or_else(|e| panic!("{source}: {e}"));
    result
        .as_int()
        .unwrap_or_else(|| panic!("{source}: expected integer, got {result:?}"))
}

fn eval_mold(vm: &mut Vm, source: &str) -> String {
    let result = vm.run(source).unwrap_or_else(|e| panic!("{source}: {e}"));
    vm.mold(&result)
}

#[test]
fn test_literals_are_inert() {
    let mut vm = Vm::new();
    assert_eq!(eval_int(&mut vm, "42"), 42);
    assert_eq!(eval_mold(&mut vm, "\"hi\""), "\"hi\"");
    assert_eq!(eval_mold(&mut vm, "[a b c]"), "[a b c]");
    assert_eq!(eval_mold(&mut vm, "1.5"), "1.5");
}

#[test]
fn test_enfix_operators() {
    let mut vm = Vm::new();
    assert_eq!(eval_int(&mut vm, "1 + 2"), 3);
    assert_eq!(eval_int(&mut vm, "1 + 2 * 3"), 9); // strict left-to-right
    assert_eq!(eval_int(&mut vm, "10 - 4 - 3"), 3);
    assert_eq!(eval_int(&mut vm, "add 1 multiply 2 3"), 7);
}

#[test]
fn test_set_words_chain() {
    let mut vm = Vm::new();
    assert_eq!(eval_int(&mut vm, "x: 10 x + 5"), 15);
    assert_eq!(eval_int(&mut vm, "a: b: 7 a + b"), 14);
}

#[test]
fn test_get_words_defuse() {
    let mut vm = Vm::new();
    // :append yields the action as a value rather than invoking it.
    let result = vm.run(":append").expect("run");
    assert_eq!(result.kind(), rill_vm::Kind::Action);
    assert!(!result.is_antiform());
}

#[test]
fn test_groups_evaluate_and_vaporize() {
    let mut vm = Vm::new();
    assert_eq!(eval_int(&mut vm, "(1 + 2) * 3"), 9);
    assert_eq!(eval_int(&mut vm, "() 5"), 5);
    assert_eq!(eval_int(&mut vm, "1 + (2 * 3)"), 7);
}

#[test]
fn test_commas_are_barriers() {
    let mut vm = Vm::new();
    assert_eq!(eval_int(&mut vm, "x: 1, y: 2, x + y"), 3);
}

#[test]
fn test_comment_is_invisible() {
    let mut vm = Vm::new();
    assert_eq!(eval_int(&mut vm, "1 + 2 comment \"ignored\""), 3);
    assert_eq!(eval_int(&mut vm, "comment \"leading\" 9"), 9);
    assert_eq!(eval_int(&mut vm, "x: comment \"gone\" 4 x"), 4);
}

#[test]
fn test_quoted_values_drop_one_level() {
    let mut vm = Vm::new();
    let result = vm.run("'word").expect("run");
    assert_eq!(result.kind(), rill_vm::Kind::Word);
    assert!(!result.is_quoted());
    let result = vm.run("''word").expect("run");
    assert_eq!(result.quoting().depth(), 1);
}

#[test]
fn test_quasiform_evaluates_to_antiform() {
    let mut vm = Vm::new();
    let result = vm.run("~true~").expect("run");
    assert_eq!(result.as_logic(), Some(true));
}

#[test]
fn test_let_adds_binding_to_stream() {
    let mut vm = Vm::new();
    assert_eq!(eval_int(&mut vm, "let x: 10 x + 5"), 15);
}

#[test]
fn test_let_shadows_without_touching_outer() {
    let mut vm = Vm::new();
    assert_eq!(eval_int(&mut vm, "x: 1 let x: 2 x"), 2);
    // The let-patch lived only in that feed; the module variable is intact.
    assert_eq!(eval_int(&mut vm, "x"), 1);
}

#[test]
fn test_nested_lets_merge() {
    let mut vm = Vm::new();
    assert_eq!(eval_int(&mut vm, "x: 10 let x: 1000 + let x: x + 10 x"), 1020);
}

#[test]
fn test_let_plain_form_returns_word() {
    let mut vm = Vm::new();
    let result = vm.run("let q").expect("run");
    assert_eq!(result.kind(), rill_vm::Kind::Word);
    assert_eq!(vm.spell(&result).as_deref(), Some("q"));
}

#[test]
fn test_use_scopes_variables() {
    let mut vm = Vm::new();
    assert_eq!(eval_int(&mut vm, "y: 10 use [y] [y: 5 y]"), 5);
    assert_eq!(eval_int(&mut vm, "y"), 10);
}

#[test]
fn test_unset_variable_errors() {
    let mut vm = Vm::new();
    assert!(vm.run("wholly-undefined-thing").is_err());
}

#[test]
fn test_stack_is_balanced_after_runs() {
    let mut vm = Vm::new();
    let _ = vm.run("x: 1 x + 2");
    let _ = vm.run("divide 1 0"); // raises
    let _ = vm.run("throw 3"); // throws, uncaught
    assert_eq!(vm.level_depth(), 0);
    assert!(vm.data_stack.is_empty());
}

#[test]
fn test_mezzanine_booted() {
    let mut vm = Vm::new();
    assert_eq!(eval_int(&mut vm, "min 3 5"), 3);
    assert_eq!(eval_int(&mut vm, "max 3 5"), 5);
    let result = vm.run("unless true [9]").expect("run");
    assert!(result.is_nulled());
    assert_eq!(eval_int(&mut vm, "unless false [9]"), 9);
}

#[test]
fn test_print_and_probe_capture_output() {
    let mut vm = Vm::new();
    vm.run("print \"hello\"").expect("run");
    assert_eq!(vm.take_output(), "hello\n");
    let result = vm.run("probe [a b]").expect("run");
    assert_eq!(vm.take_output(), "[a b]\n");
    assert_eq!(vm.mold(&result), "[a b]");
    vm.run("print [1 + 2 \"x\"]").expect("run");
    assert_eq!(vm.take_output(), "3 x\n");
}
