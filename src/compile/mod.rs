//! Route compiler: turns the catalog into a fixed set of operation descriptors.

mod compiler;
mod descriptor;

pub use compiler::{compile, COMPOSITE_KEY_SEPARATOR, RESERVED_PATHS};
pub use descriptor::*;
