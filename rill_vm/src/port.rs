//! Ports: the actor protocol and the in-memory blob port.
//!
//! A port is a context with `spec` and `state` slots plus an actor that
//! services verbs.  The core invokes the actor with `(port, verb, args)`;
//! the actor answers with a result cell or raises.  Seek addresses are
//! 0-based (unlike 1-based series indices, by intent).  READ at end of data
//! returns null, not an empty binary.  WRITE seeks to the current size
//! before writing, so successive writes append.
//!
//! The blob port is the in-tree reference actor: state lives in an
//! interpreter-owned record addressed by a HANDLE! in the port's state
//! slot.  Ports left unreachable are closed when the collector reports
//! their context was swept.

use rill_core::{sym, Cell, ContextId, Error, Kind, SymId};
use rill_gc::{ContextKind, SeriesFlags, StringData};

use crate::context;
use crate::interp::Vm;
use crate::level::Exec;

/// Backing state of an open blob port.
#[derive(Debug, Default)]
pub struct PortState {
    /// The owning port context (for close-on-collect matching).
    pub ctx: Option<ContextId>,
    /// Content bytes.
    pub buffer: Vec<u8>,
    /// Current 0-based offset.
    pub offset: usize,
    /// Still open?
    pub open: bool,
    /// Spec string (a pseudo-path).
    pub path: String,
    /// Write call count, including zero-size writes (they are passed
    /// through to the actor deliberately).
    pub write_calls: u64,
}

/// Create a blob port context with `spec` and `state` slots.
pub fn open_blob_port(vm: &mut Vm, path: &str) -> Exec<Cell> {
    let keys = vec![sym::SPEC, sym::STATE];
    let ctx = context::make_context(vm, ContextKind::Port, keys);

    let slot = vm.ports.iter().position(Option::is_none).unwrap_or_else(|| {
        vm.ports.push(None);
        vm.ports.len() - 1
    });
    vm.ports[slot] = Some(PortState {
        ctx: Some(ctx),
        buffer: Vec::new(),
        offset: 0,
        open: true,
        path: path.to_string(),
        write_calls: 0,
    });

    let spec_text = vm.heap.alloc_text(path.to_string(), SeriesFlags::MANAGED);
    let record = vm.heap.context_mut(ctx);
    record.vars[1] = Cell::text(spec_text);
    record.vars[2] = Cell::handle(slot as u64);
    Ok(Cell::any_context(Kind::Port, ctx))
}

fn state_slot(vm: &Vm, port_ctx: ContextId) -> Exec<usize> {
    let record = vm.heap.context_accessible(port_ctx)?;
    let handle = record.vars.get(2).copied().unwrap_or_else(Cell::blank);
    match handle.payload() {
        rill_core::Payload::Handle(slot) => Ok(*slot as usize),
        _ => Err(Error::access(
            sym::PORT_CLOSED,
            "port has no live state",
            Vec::new(),
        )
        .into()),
    }
}

fn with_open_state<R>(
    vm: &mut Vm,
    port_ctx: ContextId,
    f: impl FnOnce(&mut PortState) -> R,
) -> Exec<R> {
    let slot = state_slot(vm, port_ctx)?;
    match vm.ports.get_mut(slot).and_then(Option::as_mut) {
        Some(state) if state.open => Ok(f(state)),
        _ => Err(Error::access(sym::PORT_CLOSED, "port is closed", Vec::new()).into()),
    }
}

/// Dispatch a verb to a port's actor.
pub fn port_action(vm: &mut Vm, port: &Cell, verb: SymId, args: &[Cell]) -> Exec<Cell> {
    let ctx = port.context().ok_or_else(|| {
        Error::script(sym::BAD_VALUE, "not a port", vec![port.reified()])
    })?;
    blob_actor(vm, ctx, verb, args)
}

/// The blob port's actor.
fn blob_actor(vm: &mut Vm, ctx: ContextId, verb: SymId, args: &[Cell]) -> Exec<Cell> {
    match verb {
        sym::READ => {
            let part = args.first().and_then(|c| c.as_int());
            let data = with_open_state(vm, ctx, |state| {
                if state.offset >= state.buffer.len() {
                    return None; // read at EOF is null
                }
                let available = state.buffer.len() - state.offset;
                let take = match part {
                    Some(n) => (n.max(0) as usize).min(available),
                    None => available,
                };
                let bytes = state.buffer[state.offset..state.offset + take].to_vec();
                state.offset += take;
                Some(bytes)
            })?;
            match data {
                None => Ok(Cell::nulled()),
                Some(bytes) => {
                    let string = vm
                        .heap
                        .alloc_string(StringData::Bytes(bytes), SeriesFlags::MANAGED);
                    Ok(Cell::any_string(Kind::Binary, string))
                }
            }
        }
        sym::WRITE => {
            let Some(data) = args.first() else {
                return Err(Error::script(sym::MISSING_ARG, "WRITE needs data", Vec::new()).into());
            };
            let bytes: Vec<u8> = match data.plain_kind() {
                Some(Kind::Binary) => {
                    let (string, index) = data.string().expect("binary");
                    match &vm.heap.string(string).data {
                        StringData::Bytes(b) => b[index as usize..].to_vec(),
                        StringData::Utf8(s) => s.as_bytes().to_vec(),
                    }
                }
                Some(Kind::Text) => {
                    let (string, index) = data.string().expect("text");
                    vm.heap.utf8(string)[index as usize..].as_bytes().to_vec()
                }
                _ => {
                    return Err(Error::script(
                        sym::BAD_VALUE,
                        "WRITE takes binary or text",
                        vec![data.reified()],
                    )
                    .into())
                }
            };
            let port = vm.heap.context(ctx).vars[0];
            with_open_state(vm, ctx, |state| {
                // Writes append: the offset moves to the current size first.
                // Zero-size writes still reach this point (they can matter
                // to real devices).
                state.write_calls += 1;
                state.offset = state.buffer.len();
                state.buffer.extend_from_slice(&bytes);
                state.offset = state.buffer.len();
            })?;
            Ok(port)
        }
        sym::SEEK => {
            let Some(index) = args.first().and_then(|c| c.as_int()) else {
                return Err(
                    Error::script(sym::MISSING_ARG, "SEEK needs an offset", Vec::new()).into(),
                );
            };
            if index < 0 {
                return Err(Error::math(
                    sym::OUT_OF_RANGE,
                    "seek offsets are 0-based and non-negative",
                    vec![Cell::integer(index)],
                )
                .into());
            }
            let port = vm.heap.context(ctx).vars[0];
            with_open_state(vm, ctx, |state| {
                state.offset = (index as usize).min(state.buffer.len());
            })?;
            Ok(port)
        }
        sym::SKIP => {
            let delta = args.first().and_then(|c| c.as_int()).unwrap_or(0);
            let port = vm.heap.context(ctx).vars[0];
            with_open_state(vm, ctx, |state| {
                let next = state.offset as i64 + delta;
                state.offset = next.clamp(0, state.buffer.len() as i64) as usize;
            })?;
            Ok(port)
        }
        sym::LENGTH => {
            let size = with_open_state(vm, ctx, |state| state.buffer.len())?;
            Ok(Cell::integer(size as i64))
        }
        sym::QUERY => {
            let (size, offset) = with_open_state(vm, ctx, |state| {
                (state.buffer.len(), state.offset)
            })?;
            let info = context::make_context(vm, ContextKind::Object, vec![sym::SIZE, sym::OFFSET]);
            let record = vm.heap.context_mut(info);
            record.vars[1] = Cell::integer(size as i64);
            record.vars[2] = Cell::integer(offset as i64);
            Ok(Cell::any_context(Kind::Object, info))
        }
        sym::HEAD_Q => {
            let at_head = with_open_state(vm, ctx, |state| state.offset == 0)?;
            Ok(Cell::logic(at_head))
        }
        sym::TAIL_Q => {
            let at_tail =
                with_open_state(vm, ctx, |state| state.offset >= state.buffer.len())?;
            Ok(Cell::logic(at_tail))
        }
        sym::CLEAR => {
            let port = vm.heap.context(ctx).vars[0];
            with_open_state(vm, ctx, |state| {
                state.buffer.truncate(state.offset);
            })?;
            Ok(port)
        }
        sym::RENAME => {
            // The blob port renames in place; there is no close/reopen
            // window.
            let Some(new_name) = args.first() else {
                return Err(
                    Error::script(sym::MISSING_ARG, "RENAME needs a name", Vec::new()).into(),
                );
            };
            let name = vm.form(new_name);
            let port = vm.heap.context(ctx).vars[0];
            with_open_state(vm, ctx, |state| state.path = name)?;
            Ok(port)
        }
        sym::CLOSE => {
            let slot = state_slot(vm, ctx)?;
            if let Some(state) = vm.ports.get_mut(slot).and_then(Option::as_mut) {
                state.open = false;
            }
            Ok(vm.heap.context(ctx).vars[0])
        }
        sym::PICK => {
            let picker = args.first().and_then(|c| c.as_int()).unwrap_or(1);
            let byte = with_open_state(vm, ctx, |state| {
                let at = state.offset as i64 + picker - 1;
                if at < 0 {
                    None
                } else {
                    state.buffer.get(at as usize).copied()
                }
            })?;
            Ok(match byte {
                Some(b) => Cell::integer(b as i64),
                None => Cell::nulled(),
            })
        }
        _ => Err(Error::access(
            sym::NO_PORT_ACTION,
            "port has no handler for verb {1}",
            vec![Cell::word(verb)],
        )
        .into()),
    }
}

/// Close hook fired when the collector sweeps an unreachable port context.
pub fn finalize_collected_port(vm: &mut Vm, ctx: ContextId) {
    for state in vm.ports.iter_mut().flatten() {
        if state.ctx == Some(ctx) {
            log::debug!("closing collected port {:?}", state.path);
            state.open = false;
            state.ctx = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_port_rules() {
        let mut vm = Vm::new();
        let port = open_blob_port(&mut vm, "mem:test").expect("open");
        let ctx = port.context().expect("ctx");

        // READ at EOF yields null (not an empty binary).
        let result = blob_actor(&mut vm, ctx, sym::READ, &[]).expect("read");
        assert!(result.is_nulled());

        // WRITE appends and leaves the offset at the end.
        let text = vm.heap.alloc_text("abc", SeriesFlags::MANAGED);
        blob_actor(&mut vm, ctx, sym::WRITE, &[Cell::text(text)]).expect("write");
        let at_tail = blob_actor(&mut vm, ctx, sym::TAIL_Q, &[]).expect("tail?");
        assert_eq!(at_tail.as_logic(), Some(true));

        // SEEK is 0-based.
        blob_actor(&mut vm, ctx, sym::SEEK, &[Cell::integer(1)]).expect("seek");
        let read = blob_actor(&mut vm, ctx, sym::READ, &[]).expect("read");
        let (string, _) = read.string().expect("binary");
        match &vm.heap.string(string).data {
            StringData::Bytes(b) => assert_eq!(b, b"bc"),
            _ => panic!("expected bytes"),
        }

        // A seek back does not change the append rule: writes go at size.
        blob_actor(&mut vm, ctx, sym::SEEK, &[Cell::integer(0)]).expect("seek");
        let more = vm.heap.alloc_text("Z", SeriesFlags::MANAGED);
        blob_actor(&mut vm, ctx, sym::WRITE, &[Cell::text(more)]).expect("write");
        let size = blob_actor(&mut vm, ctx, sym::LENGTH, &[]).expect("length");
        assert_eq!(size.as_int(), Some(4));

        // Zero-size writes are passed through (call count moves).
        let empty = vm.heap.alloc_text("", SeriesFlags::MANAGED);
        blob_actor(&mut vm, ctx, sym::WRITE, &[Cell::text(empty)]).expect("write");
        let slot = state_slot(&vm, ctx).expect("slot");
        assert_eq!(vm.ports[slot].as_ref().expect("state").write_calls, 3);

        // CLOSE; further operations fail with an Access error.
        blob_actor(&mut vm, ctx, sym::CLOSE, &[]).expect("close");
        assert!(blob_actor(&mut vm, ctx, sym::READ, &[]).is_err());
    }
}
