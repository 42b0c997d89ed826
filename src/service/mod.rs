//! Query translation and execution.

mod coerce;
mod crud;
pub mod filter;
mod translate;
mod validation;

pub use coerce::{coerce_json, coerce_text};
pub use crud::{row_to_json, CrudService, QueryOutput};
pub use translate::{translate, ApiRequest, BoundStatement, ResultShape, BULK_LIMIT, ID_PARAM};
pub use validation::RequestValidator;
