#![warn(missing_docs)]
//! Service front end for [cert_issuance]: configuration pieces shared with
//! the binary, the axum router, logging setup, the code version stamp and
//! development CA generation.

pub mod ca;
pub mod logging;
pub mod server;
pub mod version;

pub use server::{router, AppState};
