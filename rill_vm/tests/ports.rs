//! Port protocol through the language surface: the blob reference actor.

use rill_vm::Vm;

#[test]
fn test_open_write_seek_read() {
    let mut vm = Vm::new();
    vm.run("p: open \"mem:demo\"").expect("open");
    vm.run("write p \"hello\"").expect("write");

    // Fresh reads start from the post-write offset: at EOF, null.
    assert!(vm.run("read p").expect("read").is_nulled());

    // Seek is 0-based.
    vm.run("seek p 0").expect("seek");
    let result = vm.run("read p").expect("read");
    assert_eq!(vm.mold(&result), "#{68656C6C6F}");

    // Partial reads advance the offset.
    vm.run("seek p 1").expect("seek");
    let result = vm.run("read/part p 2").expect("read");
    assert_eq!(vm.mold(&result), "#{656C}");
}

#[test]
fn test_write_appends_from_size() {
    let mut vm = Vm::new();
    vm.run("p: open \"mem:append\"").expect("open");
    vm.run("write p \"abc\"").expect("write");
    // Seeking backward does not move the write position: writes append.
    vm.run("seek p 0").expect("seek");
    vm.run("write p \"XYZ\"").expect("write");
    vm.run("seek p 0").expect("seek");
    let result = vm.run("read p").expect("read");
    assert_eq!(vm.mold(&result), "#{61626358595A}");
}

#[test]
fn test_query_reports_size_and_offset() {
    let mut vm = Vm::new();
    vm.run("p: open \"mem:q\" write p \"1234\" seek p 1").expect("setup");
    let result = vm.run("info: query p info/size").expect("query");
    assert_eq!(result.as_int(), Some(4));
    let result = vm.run("info/offset").expect("query");
    assert_eq!(result.as_int(), Some(1));
}

#[test]
fn test_close_then_use_errors() {
    let mut vm = Vm::new();
    vm.run("p: open \"mem:c\"").expect("open");
    vm.run("close p").expect("close");
    assert!(vm.run("read p").is_err());
    assert!(vm.run("write p \"x\"").is_err());
}

#[test]
fn test_pick_bounces_to_port_actor() {
    let mut vm = Vm::new();
    vm.run("p: open \"mem:pick\" write p \"AB\" seek p 0").expect("setup");
    let result = vm.run("pick p 1").expect("pick");
    assert_eq!(result.as_int(), Some(0x41));
}

#[test]
fn test_unreachable_port_is_closed_by_gc() {
    let mut vm = Vm::new();
    vm.run("p: open \"mem:gone\"").expect("open");
    let open_before = vm.ports.iter().flatten().filter(|s| s.open).count();
    assert_eq!(open_before, 1);
    // Drop the only reference and collect: the close-on-GC hook fires.
    vm.run("p: null").expect("drop");
    vm.collect_garbage();
    let open_after = vm.ports.iter().flatten().filter(|s| s.open).count();
    assert_eq!(open_after, 0);
}
