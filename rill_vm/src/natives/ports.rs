//! Port natives: thin verbs over the actor protocol.

use rill_core::{sym, Cell, Error, Kind};

use crate::interp::Vm;
use crate::level::Exec;
use crate::natives::{Call, NativeEntry};
use crate::port;

/// Register the port natives.
pub fn register(entries: &mut Vec<NativeEntry>) {
    entries.push(NativeEntry::new("open", "spec [text! tag!]", native_open));
    entries.push(NativeEntry::new("close", "port [port!]", native_close));
    entries.push(NativeEntry::new(
        "read",
        "return: [<opt> binary!] port [port!] /part [integer!]",
        native_read,
    ));
    entries.push(NativeEntry::new(
        "write",
        "port [port!] data [binary! text!]",
        native_write,
    ));
    entries.push(NativeEntry::new(
        "seek",
        "port [port!] offset [integer!]",
        native_seek,
    ));
    entries.push(NativeEntry::new("query", "port [port!]", native_query));
}

fn port_arg(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let port = call.arg(vm, sym::PORT);
    if !port.is(Kind::Port) {
        return Err(Error::script(
            sym::BAD_VALUE,
            "expected a port",
            vec![port.reified()],
        )
        .into());
    }
    Ok(port)
}

fn native_open(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let spec = call.arg(vm, sym::SPEC);
    let path = vm.form(&spec);
    port::open_blob_port(vm, &path)
}

fn native_close(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let port = port_arg(vm, call)?;
    port::port_action(vm, &port, sym::CLOSE, &[])
}

fn native_read(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let port = port_arg(vm, call)?;
    let args: Vec<Cell> = call.arg_opt(vm, sym::PART).into_iter().collect();
    port::port_action(vm, &port, sym::READ, &args)
}

fn native_write(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let port = port_arg(vm, call)?;
    let data = call.arg(vm, sym::DATA);
    port::port_action(vm, &port, sym::WRITE, &[data])
}

fn native_seek(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let port = port_arg(vm, call)?;
    let offset = call.arg(vm, sym::OFFSET);
    port::port_action(vm, &port, sym::SEEK, &[offset])
}

fn native_query(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let port = port_arg(vm, call)?;
    port::port_action(vm, &port, sym::QUERY, &[])
}
