//! Router assembly.

mod common;
mod generated;

pub use common::common_routes;
pub use generated::generated_routes;
