//! Scanner and molder for Rill source text.
//!
//! [`scan_block`] turns UTF-8 source into an array of cells; [`mold`] renders
//! cells back to canonical source.  Scanning a mold of any plain value yields
//! the same value again.

#![warn(clippy::all)]

mod mold;
mod scan;

pub use mold::{form, mold, mold_array};
pub use scan::scan_block;
