//! scriptdeploy: deploys local Apps Script sources to a remote project.
//!
//! Re-exports modules needed by the binary and by integration tests in `tests/`.

pub mod bundle;
pub mod config;
pub mod credentials;
pub mod errors;
pub mod reconcile;
pub mod remote;
