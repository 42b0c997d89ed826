//! Safe SQL building: identifiers from the catalog only, values as parameters.

mod builder;
pub mod params;
mod template;
pub use builder::*;
pub use params::*;
pub use template::*;
