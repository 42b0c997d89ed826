//! HTTP handlers: generated operations, token issuance, catalog listing.

pub mod catalog;
pub mod operation;
pub mod token;
pub use catalog::list_tables;
pub use operation::handle;
pub use token::issue_token;
