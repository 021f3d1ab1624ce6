//! Operation Catalog and Executor (spec §4.C): the only path from a handle
//! to the external ffmpeg toolchain.
//!
//! [`catalog`] describes every whitelisted operation as data; [`executor`]
//! interprets that data against a [`komposer_registry::Registry`] to build
//! an argv, spawn the subprocess (via `komposer-media`), and report a
//! handle or a typed failure.

pub mod catalog;
pub mod executor;

pub use catalog::{ArgToken, OperationSpec, OutputExtensionPolicy, ParamDecl, ParamType, CATALOG};
pub use executor::{BatchFailure, BatchResult, BatchStep, ExecuteResult, Executor};
