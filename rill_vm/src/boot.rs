//! Boot: symbols, datatypes, natives, predicates, operators, mezzanine.
//!
//! The order matters and is observable: fixed symbols are interned first
//! (the symbol table constructor does this), then datatype values, then the
//! special word values, then natives, then the generated type predicates,
//! then the enfix operator aliases, and finally the mezzanine source is
//! scanned and evaluated against lib.

use rill_core::{sym, Cell, CellFlags, Kind};
use rill_gc::Dispatcher;

use crate::action::{make_action, make_paramlist};
use crate::bind;
use crate::context::{self, set_lib_var};
use crate::functionals::typechecker::make_typechecker;
use crate::interp::Vm;
use crate::natives;

/// All concrete kinds, for datatype and predicate installation.
const ALL_KINDS: &[Kind] = &[
    Kind::Blank,
    Kind::Comma,
    Kind::Integer,
    Kind::Decimal,
    Kind::Text,
    Kind::Tag,
    Kind::Issue,
    Kind::Binary,
    Kind::Word,
    Kind::SetWord,
    Kind::GetWord,
    Kind::MetaWord,
    Kind::Block,
    Kind::Group,
    Kind::Path,
    Kind::SetPath,
    Kind::GetPath,
    Kind::Tuple,
    Kind::TypeBlock,
    Kind::TypeGroup,
    Kind::Object,
    Kind::Module,
    Kind::Frame,
    Kind::Error,
    Kind::Port,
    Kind::Action,
    Kind::Datatype,
    Kind::Parameter,
    Kind::Handle,
];

/// Mezzanine source, evaluated against lib as the last boot phase.
const MEZZANINE: &str = r#"
unless: func [condition [any-value!] branch [block! action!]] [
    either condition [null] branch
]
min: func [a [any-number!] b [any-number!]] [either a < b [a] [b]]
max: func [a [any-number!] b [any-number!]] [either a > b [a] [b]]
"#;

/// Bring an interpreter up.
pub fn startup(vm: &mut Vm) {
    install_datatypes(vm);
    install_special_values(vm);
    install_natives(vm);
    install_predicates(vm);
    install_operators(vm);
    install_system_object(vm);
    run_mezzanine(vm);
    log::debug!(
        "boot complete: {} natives, {} symbols",
        vm.natives.len(),
        vm.symbols.len()
    );
}

fn install_datatypes(vm: &mut Vm) {
    for kind in ALL_KINDS {
        set_lib_var(vm, kind.datatype_sym(), Cell::datatype(*kind));
    }
}

fn install_special_values(vm: &mut Vm) {
    set_lib_var(vm, sym::TRUE, Cell::logic(true));
    set_lib_var(vm, sym::FALSE, Cell::logic(false));
    set_lib_var(vm, sym::NULL, Cell::nulled());
    set_lib_var(vm, sym::VOID, Cell::void());
}

fn install_natives(vm: &mut Vm) {
    let entries = natives::table();
    vm.natives = entries;

    for index in 0..vm.natives.len() {
        let (name, spec_text, has_intrinsic, enfix, defers, install) = {
            let entry = &vm.natives[index];
            (
                entry.name,
                entry.spec,
                entry.intrinsic.is_some(),
                entry.enfix,
                entry.defers,
                entry.install,
            )
        };

        let spec_array = rill_parser::scan_block(&mut vm.heap, &mut vm.symbols, spec_text)
            .unwrap_or_else(|err| panic!("bad native spec for {name}: {err}"));
        let lib = vm.lib;
        bind::bind_nonspecifically(vm, spec_array, lib);
        let spec_cells = vm.heap.array(spec_array).cells.clone();
        let exemplar = make_paramlist(vm, &spec_cells, false)
            .unwrap_or_else(|_| panic!("bad native paramlist for {name}"));

        let name_sym = vm.intern(name);
        let dispatcher = if has_intrinsic {
            Dispatcher::Intrinsic(index as u16)
        } else {
            Dispatcher::Native(index as u16)
        };
        let details = make_action(vm, exemplar, dispatcher, Some(name_sym), vec![]);
        vm.heap.details_mut(details).defers_lookback = defers;

        if name == "return" {
            vm.return_details = Some(details);
        }
        if install {
            let mut cell = Cell::activation(details, None);
            if enfix {
                cell.flags.insert(CellFlags::ENFIX);
            }
            set_lib_var(vm, name_sym, cell);
        }
    }
}

/// Generated predicates: one intrinsic typechecker per datatype, plus the
/// special-value checks.
fn install_predicates(vm: &mut Vm) {
    for kind in ALL_KINDS {
        let name = vm
            .symbols
            .spelling(kind.datatype_sym())
            .trim_end_matches('!')
            .to_string();
        let name_sym = vm.intern(&format!("{name}?"));
        let details = make_typechecker(vm, Cell::datatype(*kind), Some(name_sym))
            .unwrap_or_else(|_| panic!("typechecker build failed for {name}"));
        set_lib_var(vm, name_sym, Cell::activation(details, None));
    }
    for (name, word) in [
        ("null?", sym::NULL),
        ("void?", sym::VOID),
        ("logic?", sym::LOGIC_Q),
        ("any-value?", sym::ANY_VALUE_X),
    ] {
        let name_sym = vm.intern(name);
        let details = make_typechecker(vm, Cell::word(word), Some(name_sym))
            .unwrap_or_else(|_| panic!("typechecker build failed for {name}"));
        set_lib_var(vm, name_sym, Cell::activation(details, None));
    }
}

/// Enfix operator aliases over the named math natives.
fn install_operators(vm: &mut Vm) {
    let pairs = [
        (sym::PLUS, sym::ADD),
        (sym::MINUS, sym::SUBTRACT),
        (sym::STAR, sym::MULTIPLY),
        (sym::EQ_OP, sym::EQUAL_Q),
        (sym::NEQ_OP, sym::NOT_EQUAL_Q),
        (sym::LT_OP, sym::LESSER_Q),
        (sym::GT_OP, sym::GREATER_Q),
    ];
    for (op, target) in pairs {
        let mut cell = context::lib_var(vm, target)
            .unwrap_or_else(|| panic!("operator target missing: {target:?}"));
        cell.flags.insert(CellFlags::ENFIX);
        set_lib_var(vm, op, cell);
    }
}

fn install_system_object(vm: &mut Vm) {
    let version_sym = vm.intern("version");
    let ctx = context::make_context(
        vm,
        rill_gc::ContextKind::Object,
        vec![version_sym, sym::LIB, sym::SYS],
    );
    let version = vm.heap.alloc_text("0.1.0", rill_gc::SeriesFlags::MANAGED);
    let lib = vm.lib;
    let sys = vm.sys;
    let record = vm.heap.context_mut(ctx);
    record.vars[1] = Cell::text(version);
    record.vars[2] = Cell::any_context(Kind::Module, lib);
    record.vars[3] = Cell::any_context(Kind::Module, sys);
    set_lib_var(vm, sym::SYSTEM, Cell::any_context(Kind::Object, ctx));
}

fn run_mezzanine(vm: &mut Vm) {
    if let Err(err) = vm.run_source(MEZZANINE) {
        panic!("mezzanine failed to boot: {err:?}");
    }
}
