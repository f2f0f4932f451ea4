//! Function generators and composition primitives.

pub mod adapt;
pub mod chain;
pub mod enclose;
pub mod func;
pub mod hijack;
pub mod lambda;
pub mod specialize;
pub mod typechecker;

use crate::natives::NativeEntry;

/// Register the functionals.
pub fn register(entries: &mut Vec<NativeEntry>) {
    func::register(entries);
    lambda::register(entries);
    specialize::register(entries);
    adapt::register(entries);
    chain::register(entries);
    enclose::register(entries);
    hijack::register(entries);
    typechecker::register(entries);
}
