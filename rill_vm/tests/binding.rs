//! Binding behavior through the language surface: objects, paths, modules,
//! BIND/UNBIND, and derivation.

use rill_vm::Vm;

fn eval_int(vm: &mut Vm, source: &str) -> i64 {
    let result = vm.run(source).unwrap_or_else(|e| panic!("{source}: {e}"));
    result
        .as_int()
        .unwrap_or_else(|| panic!("{source}: expected integer, got {result:?}"))
}

#[test]
fn test_object_field_paths() {
    let mut vm = Vm::new();
    vm.run("obj: make object! [a: 1, b: 2]").expect("make");
    assert_eq!(eval_int(&mut vm, "obj/a"), 1);
    assert_eq!(eval_int(&mut vm, "obj/b"), 2);
    vm.run("obj/a: 99").expect("set");
    assert_eq!(eval_int(&mut vm, "obj/a"), 99);
    // Unknown fields error rather than extending the object.
    assert!(vm.run("obj/c").is_err());
    assert!(vm.run("obj/c: 1").is_err());
}

#[test]
fn test_object_sees_own_fields() {
    let mut vm = Vm::new();
    assert_eq!(
        eval_int(&mut vm, "o: make object! [a: 2, b: a + 3] o/b"),
        5
    );
}

#[test]
fn test_tuple_field_access() {
    let mut vm = Vm::new();
    vm.run("t: 1.2.3").expect("make");
    assert_eq!(eval_int(&mut vm, "t.2"), 2);
    // Writing through a tuple goes through the immediate-write protocol:
    // a fresh tuple lands in the variable.
    vm.run("t/2: 99").expect("poke");
    let result = vm.run("t").expect("run");
    assert_eq!(vm.mold(&result), "1.99.3");
}

#[test]
fn test_paths_with_groups_evaluate() {
    let mut vm = Vm::new();
    vm.run("obj: make object! [a: 7]").expect("make");
    assert_eq!(eval_int(&mut vm, "obj/('a)"), 7);
    // GET-PATH! refuses groups.
    assert!(vm.run(":obj/('a)").is_err());
}

#[test]
fn test_inert_head_paths() {
    let mut vm = Vm::new();
    // A leading-slash path is inert and yields itself.
    let result = vm.run("/only").expect("run");
    assert_eq!(result.kind(), rill_vm::Kind::Path);
    assert_eq!(vm.mold(&result), "/only");
}

#[test]
fn test_block_pick_and_select_paths() {
    let mut vm = Vm::new();
    vm.run("blk: [a 10 b 20]").expect("make");
    assert_eq!(eval_int(&mut vm, "blk/2"), 10);
    assert_eq!(eval_int(&mut vm, "blk/b"), 20); // select-style word pick
    let result = vm.run("blk/9").expect("run");
    assert!(result.is_nulled());
}

#[test]
fn test_pick_poke_natives_share_path_protocol() {
    let mut vm = Vm::new();
    let result = vm.run("pick [a b c] 2").expect("run");
    assert_eq!(vm.spell(&result).as_deref(), Some("b"));
    assert_eq!(
        eval_int(&mut vm, "blk: [1 2 3] poke blk 2 99 blk/2"),
        99
    );
    assert!(vm.run("pick 10 1").is_err());
}

#[test]
fn test_bind_block_to_object() {
    let mut vm = Vm::new();
    vm.run("ctx: make object! [n: 41]").expect("make");
    assert_eq!(eval_int(&mut vm, "do bind [n + 1] ctx"), 42);
}

#[test]
fn test_unbind_then_rebind() {
    let mut vm = Vm::new();
    vm.run("ctx: make object! [n: 5]").expect("make");
    vm.run("blk: [n]").expect("make");
    assert_eq!(eval_int(&mut vm, "do bind blk ctx"), 5);
    // After unbinding, the word falls back to being unresolvable.
    assert!(vm.run("do unbind blk").is_err());
    assert_eq!(eval_int(&mut vm, "do bind blk ctx"), 5);
}

#[test]
fn test_make_module_and_intern() {
    let mut vm = Vm::new();
    vm.run("m: make module! [exported: 8]").expect("make");
    assert_eq!(eval_int(&mut vm, "m/exported"), 8);
    // Writing through a module path attaches new variables (sea of words).
    vm.run("m/fresh: 3").expect("attach");
    assert_eq!(eval_int(&mut vm, "m/fresh"), 3);
    // INTERN* rebinding: the block evaluates against the module.
    assert_eq!(eval_int(&mut vm, "do intern* m [exported + 1]"), 9);
}

#[test]
fn test_derived_object_make() {
    let mut vm = Vm::new();
    vm.run("base: make object! [a: 1, b: 2]").expect("make");
    vm.run("derived: make base [b: 20, c: 30]").expect("derive");
    assert_eq!(eval_int(&mut vm, "derived/a"), 1);
    assert_eq!(eval_int(&mut vm, "derived/b"), 20);
    assert_eq!(eval_int(&mut vm, "derived/c"), 30);
    // The base is untouched.
    assert_eq!(eval_int(&mut vm, "base/b"), 2);
}

#[test]
fn test_get_and_set_natives() {
    let mut vm = Vm::new();
    assert_eq!(eval_int(&mut vm, "set 'gv 5 get 'gv"), 5);
    vm.run("obj: make object! [f: 1]").expect("make");
    assert_eq!(eval_int(&mut vm, "set 'obj/f 42 get 'obj/f"), 42);
}

#[test]
fn test_lambda_vs_func_scoping() {
    let mut vm = Vm::new();
    // FUNC relativizes its body copy; LAMBDA virtually binds the original.
    vm.run("shared: [n + 1]").expect("make");
    vm.run("lf: lambda [n] shared").expect("lambda");
    assert_eq!(eval_int(&mut vm, "lf 1"), 2);
    // The shared block is unchanged: running it outside the lambda still
    // fails on the unset n (no relativization leaked into it).
    assert!(vm.run("do shared").is_err());
}
