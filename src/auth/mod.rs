//! Auth gate, token issuance and pluggable credential checks.

mod check;
mod gate;
pub mod token;

pub use check::{CheckError, CredentialCheck, DenyAll, PasswordMode, TableCredentialCheck};
pub use gate::{require_auth, Access, AuthGate, TokenOutcome, MASTER_KEY_HEADER, TOKEN_PATH};
