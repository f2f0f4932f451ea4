//! Math and comparison natives.
//!
//! Integer arithmetic is checked; overflow raises a Math-category error
//! rather than wrapping.  Mixed integer/decimal operands widen to decimal.

use rill_core::{Cell, Error};

use crate::interp::Vm;
use crate::level::Exec;
use crate::natives::{Call, NativeEntry};

/// Register the math natives.
pub fn register(entries: &mut Vec<NativeEntry>) {
    entries.push(NativeEntry::new(
        "add",
        "value1 [any-number!] value2 [any-number!]",
        native_add,
    ));
    entries.push(NativeEntry::new(
        "subtract",
        "value1 [any-number!] value2 [any-number!]",
        native_subtract,
    ));
    entries.push(NativeEntry::new(
        "multiply",
        "value1 [any-number!] value2 [any-number!]",
        native_multiply,
    ));
    entries.push(NativeEntry::new(
        "divide",
        "value1 [any-number!] value2 [any-number!]",
        native_divide,
    ));
    entries.push(NativeEntry::new(
        "equal?",
        "value1 [<opt> any-value!] value2 [<opt> any-value!]",
        native_equal,
    ));
    entries.push(NativeEntry::new(
        "not-equal?",
        "value1 [<opt> any-value!] value2 [<opt> any-value!]",
        native_not_equal,
    ));
    entries.push(NativeEntry::new(
        "lesser?",
        "value1 [any-number!] value2 [any-number!]",
        native_lesser,
    ));
    entries.push(NativeEntry::new(
        "greater?",
        "value1 [any-number!] value2 [any-number!]",
        native_greater,
    ));
}

fn operands(vm: &mut Vm, call: &Call) -> (Cell, Cell) {
    let a_sym = vm.intern("value1");
    let b_sym = vm.intern("value2");
    (call.arg(vm, a_sym), call.arg(vm, b_sym))
}

enum Pair {
    Ints(i64, i64),
    Decs(f64, f64),
}

fn numeric_pair(a: &Cell, b: &Cell) -> Pair {
    match (a.as_int(), b.as_int()) {
        (Some(x), Some(y)) => Pair::Ints(x, y),
        _ => {
            let x = a.as_int().map(|n| n as f64).or_else(|| a.as_dec()).unwrap_or(0.0);
            let y = b.as_int().map(|n| n as f64).or_else(|| b.as_dec()).unwrap_or(0.0);
            Pair::Decs(x, y)
        }
    }
}

fn native_add(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let (a, b) = operands(vm, call);
    match numeric_pair(&a, &b) {
        Pair::Ints(x, y) => x
            .checked_add(y)
            .map(Cell::integer)
            .ok_or_else(|| Error::overflow().into()),
        Pair::Decs(x, y) => Ok(Cell::decimal(x + y)),
    }
}

fn native_subtract(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let (a, b) = operands(vm, call);
    match numeric_pair(&a, &b) {
        Pair::Ints(x, y) => x
            .checked_sub(y)
            .map(Cell::integer)
            .ok_or_else(|| Error::overflow().into()),
        Pair::Decs(x, y) => Ok(Cell::decimal(x - y)),
    }
}

fn native_multiply(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let (a, b) = operands(vm, call);
    match numeric_pair(&a, &b) {
        Pair::Ints(x, y) => x
            .checked_mul(y)
            .map(Cell::integer)
            .ok_or_else(|| Error::overflow().into()),
        Pair::Decs(x, y) => Ok(Cell::decimal(x * y)),
    }
}

fn native_divide(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let (a, b) = operands(vm, call);
    match numeric_pair(&a, &b) {
        Pair::Ints(x, y) => {
            if y == 0 {
                return Err(Error::zero_divide().into());
            }
            if x % y == 0 {
                Ok(Cell::integer(x / y))
            } else {
                Ok(Cell::decimal(x as f64 / y as f64))
            }
        }
        Pair::Decs(x, y) => {
            if y == 0.0 {
                return Err(Error::zero_divide().into());
            }
            Ok(Cell::decimal(x / y))
        }
    }
}

/// Value equality: numbers compare numerically; series compare by identity
/// and position; everything else compares cell-for-cell.
pub fn cells_equal(vm: &Vm, a: &Cell, b: &Cell) -> bool {
    if let (Some(x), Some(y)) = (number_of(a), number_of(b)) {
        return x == y;
    }
    if a.kind().is_word() && b.kind().is_word() && a.kind() == b.kind() {
        return a.quoting() == b.quoting() && a.word_sym() == b.word_sym();
    }
    if a.kind().is_string() && b.kind().is_string() && a.kind() == b.kind() {
        if let (Some((sa, ia)), Some((sb, ib))) = (a.string(), b.string()) {
            return vm.heap.string(sa).data == vm.heap.string(sb).data && ia == ib;
        }
    }
    if a.kind().is_array() && b.kind().is_array() && a.kind() == b.kind() {
        if let (Some((aa, ia, _)), Some((ab, ib, _))) = (a.series(), b.series()) {
            if aa == ab && ia == ib {
                return true;
            }
            let ca = &vm.heap.array(aa).cells[ia as usize..];
            let cb = &vm.heap.array(ab).cells[ib as usize..];
            return ca.len() == cb.len()
                && ca.iter().zip(cb.iter()).all(|(x, y)| cells_equal(vm, x, y));
        }
    }
    a.same_value(b)
}

fn number_of(cell: &Cell) -> Option<f64> {
    if !cell.quoting().is_plain() {
        return None;
    }
    cell.as_int().map(|n| n as f64).or_else(|| cell.as_dec())
}

fn native_equal(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let (a, b) = operands(vm, call);
    Ok(Cell::logic(cells_equal(vm, &a, &b)))
}

fn native_not_equal(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let (a, b) = operands(vm, call);
    Ok(Cell::logic(!cells_equal(vm, &a, &b)))
}

fn native_lesser(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let (a, b) = operands(vm, call);
    match numeric_pair(&a, &b) {
        Pair::Ints(x, y) => Ok(Cell::logic(x < y)),
        Pair::Decs(x, y) => Ok(Cell::logic(x < y)),
    }
}

fn native_greater(vm: &mut Vm, call: &Call) -> Exec<Cell> {
    let (a, b) = operands(vm, call);
    match numeric_pair(&a, &b) {
        Pair::Ints(x, y) => Ok(Cell::logic(x > y)),
        Pair::Decs(x, y) => Ok(Cell::logic(x > y)),
    }
}
