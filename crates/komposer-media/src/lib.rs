//! Subprocess runner and Probe Cache.
//!
//! This crate is the sole owner of `std::process::Command` in the
//! workspace: `komposer-ops::Executor` and this crate's own [`probe::probe`]
//! are the only callers of an external tool, and both go through
//! [`subprocess::run_with_timeout`].

pub mod probe;
pub mod subprocess;

pub use probe::probe;
pub use subprocess::{run_with_timeout, CommandOutput};
