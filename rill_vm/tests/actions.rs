//! Action machinery: FUNC, RETURN, refinements, and the composition
//! primitives (SPECIALIZE / ADAPT / CHAIN / ENCLOSE / HIJACK / LAMBDA /
//! TYPECHECKER).

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
fn test_func_basics() {
    let mut vm = Vm::new();
    assert_eq!(eval_int(&mut vm, "double: func [n [integer!]] [n * 2] double 4"), 8);
    assert_eq!(eval_int(&mut vm, "f: func [a b] [a + b] f 3 4"), 7);
}

#[test]
fn test_func_body_is_reusable() {
    let mut vm = Vm::new();
    vm.run("counter: func [n] [n + 1]").expect("define");
    assert_eq!(eval_int(&mut vm, "counter 1"), 2);
    assert_eq!(eval_int(&mut vm, "counter 10"), 11);
}

#[test]
fn test_definitional_return() {
    let mut vm = Vm::new();
    assert_eq!(
        eval_int(&mut vm, "f: func [x [integer!]] [return x + 1 99] f 1"),
        2
    );
}

#[test]
fn test_return_type_check() {
    let mut vm = Vm::new();
    vm.run("g: func [return: [integer!] x] [return x]").expect("define");
    assert_eq!(eval_int(&mut vm, "g 5"), 5);
    assert!(vm.run("g \"text\"").is_err());
}

#[test]
fn test_argument_type_errors() {
    let mut vm = Vm::new();
    vm.run("h: func [n [integer!]] [n]").expect("define");
    let failure = vm.run("h \"nope\"").expect_err("type error");
    let text = failure.to_string();
    assert!(text.contains("argument"), "unexpected message: {text}");
}

#[test]
fn test_refinements_from_paths() {
    let mut vm = Vm::new();
    assert_eq!(eval_mold(&mut vm, "append/only [a] [b c]"), "[a [b c]]");
    assert_eq!(eval_mold(&mut vm, "append [a] [b c]"), "[a b c]");
    assert_eq!(eval_mold(&mut vm, "append/dup [x] 0 3"), "[x 0 0 0]");
    assert!(vm.run("append/bogus [a] 1").is_err());
}

#[test]
fn test_specialize() {
    let mut vm = Vm::new();
    assert_eq!(
        eval_mold(&mut vm, "f: specialize :append [value: 10] f [a b]"),
        "[a b 10]"
    );
    assert_eq!(eval_mold(&mut vm, "append [a b] 10"), "[a b 10]");
}

#[test]
fn test_specialize_equivalence() {
    // specialize(A, {k: v}) applied == A applied with k overridden by v.
    let mut vm = Vm::new();
    let direct = eval_mold(&mut vm, "append copy [1 2] 3");
    let special = eval_mold(&mut vm, "s: specialize :append [value: 3] s copy [1 2]");
    assert_eq!(direct, special);
}

#[test]
fn test_adapt_mutates_frame() {
    let mut vm = Vm::new();
    assert_eq!(
        eval_int(&mut vm, "a: adapt :add [value1: value1 * 2] a 3 4"),
        10
    );
}

#[test]
fn test_chain_pipelines_result() {
    let mut vm = Vm::new();
    vm.run("double: func [n [any-number!]] [n * 2]").expect("define");
    assert_eq!(eval_int(&mut vm, "c: chain [:add :double] c 1 2"), 6);
}

#[test]
fn test_enclose_controls_inner() {
    let mut vm = Vm::new();
    assert_eq!(
        eval_int(
            &mut vm,
            "e: enclose :add func [f [frame!]] [f/value1: f/value1 + 10 do f] e 1 2"
        ),
        13
    );
}

#[test]
fn test_enclose_may_skip_inner() {
    let mut vm = Vm::new();
    assert_eq!(
        eval_int(&mut vm, "e: enclose :add func [f [frame!]] [99] e 1 2"),
        99
    );
}

#[test]
fn test_lambda() {
    let mut vm = Vm::new();
    assert_eq!(eval_int(&mut vm, "d: lambda [n] [n * 2] d 21"), 42);
    // Lambda sees definition-site bindings through the virtual chain.
    assert_eq!(eval_int(&mut vm, "base: 100 add-base: lambda [n] [base + n] add-base 1"), 101);
    // An empty body is void, not an error.
    let result = vm.run("v: lambda [] [] v").expect("run");
    assert!(result.is_void());
}

#[test]
fn test_hijack_affects_all_references() {
    let mut vm = Vm::new();
    vm.run("v: func [] [print \"v\"]").expect("define");
    vm.run("r: :v").expect("alias");
    vm.run("h: copy :v").expect("copy");
    vm.run("hijack :v func [] [print \"h\"]").expect("hijack");

    vm.run("v").expect("run");
    assert_eq!(vm.take_output(), "h\n");
    // The alias shares the identity, so it is hijacked too.
    vm.run("r").expect("run");
    assert_eq!(vm.take_output(), "h\n");
    // The pre-hijack copy is unaffected.
    vm.run("h").expect("run");
    assert_eq!(vm.take_output(), "v\n");
}

#[test]
fn test_hijack_restore_via_copy() {
    let mut vm = Vm::new();
    vm.run("v: func [] [print \"original\"]").expect("define");
    vm.run("saved: copy :v").expect("save");
    vm.run("hijack :v func [] [print \"taken\"]").expect("hijack");
    vm.run("hijack :v :saved").expect("restore");
    vm.run("v").expect("run");
    assert_eq!(vm.take_output(), "original\n");
}

#[test]
fn test_hijack_self_is_noop() {
    let mut vm = Vm::new();
    vm.run("v: func [] [1]").expect("define");
    let result = vm.run("hijack :v :v").expect("run");
    assert!(result.is_nulled());
}

#[test]
fn test_hijack_mismatched_frames_remaps_by_name() {
    let mut vm = Vm::new();
    vm.run("v: func [a [integer!]] [a]").expect("define");
    vm.run("hijack :v func [a [integer!] /extra] [a * 10]").expect("hijack");
    assert_eq!(eval_int(&mut vm, "v 3"), 30);
}

#[test]
fn test_typechecker_generator() {
    let mut vm = Vm::new();
    let result = vm.run("chk: typechecker integer! chk 10").expect("run");
    assert_eq!(result.as_logic(), Some(true));
    let result = vm.run("chk \"no\"").expect("run");
    assert_eq!(result.as_logic(), Some(false));
}

#[test]
fn test_boot_predicates() {
    let mut vm = Vm::new();
    for (source, expected) in [
        ("integer? 10", true),
        ("integer? \"x\"", false),
        ("block? [a]", true),
        ("word? 'w", true),
        ("action? :append", true),
        ("null? null", true),
        ("null? 1", false),
        ("logic? true", true),
    ] {
        let result = vm.run(source).unwrap_or_else(|e| panic!("{source}: {e}"));
        assert_eq!(result.as_logic(), Some(expected), "{source}");
    }
}

#[test]
fn test_intrinsic_dispatch_builds_no_frame() {
    let mut vm = Vm::new();
    // Warm the path so interning and lib attachment are done, then collect
    // so no cycle can move the heap census mid-probe.
    vm.run("integer? 10").expect("warmup");
    vm.collect_garbage();

    let depth_before = vm.level_depth();
    let contexts_before = vm.heap.live_counts()[3];

    let result = vm.run("integer? 10").expect("run");
    assert_eq!(result.as_logic(), Some(true));

    assert_eq!(vm.level_depth(), depth_before, "level stack must be restored");
    // The frameless guarantee itself: a direct intrinsic call allocates no
    // frame context, so the context census is untouched.  If dispatch
    // regresses to the framed path, `begin` allocates one and this moves.
    assert_eq!(
        vm.heap.live_counts()[3],
        contexts_before,
        "direct intrinsic call must not build a frame"
    );

    // A framed invocation of the same intrinsic (through a reified frame)
    // does allocate, confirming the probe can tell the difference.
    vm.run("fr: make frame! :integer? fr/value: 3 do fr")
        .expect("framed");
    assert!(
        vm.heap.live_counts()[3] > contexts_before,
        "framed invocation should have allocated a frame context"
    );
}

#[test]
fn test_make_frame_and_do() {
    let mut vm = Vm::new();
    assert_eq!(
        eval_int(
            &mut vm,
            "fr: make frame! :add fr/value1: 2 fr/value2: 3 do fr"
        ),
        5
    );
}

#[test]
fn test_enfix_generator() {
    let mut vm = Vm::new();
    vm.run("plus: enfix :add").expect("define");
    assert_eq!(eval_int(&mut vm, "1 plus 2"), 3);
}
