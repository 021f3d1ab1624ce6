//! Error taxonomy shared across the workspace.
//!
//! Every `komposer-*` crate either returns one of these variants directly or
//! wraps a crate-local error that converts into it. Keeping the taxonomy in
//! one place means the CLI's `{ success, error_kind, message }` envelope
//! (spec §7) has exactly one conversion point.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// The error kinds named in spec.md §7 "Error taxonomy".
#[derive(Debug, Error)]
pub enum Error {
    /// Unknown operation, unknown/missing/mistyped parameter, forward
    /// `RESULT_k` reference, or an unresolvable handle.
    #[error("validation error: {0}")]
    Validation(String),

    /// A path escaped the allowed roots, its extension isn't allow-listed,
    /// or the file exceeds the configured size limit.
    #[error("sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    /// The media toolchain could not probe the file (corrupt/unsupported).
    #[error("probe error: {path}: {reason}")]
    Probe {
        /// Path that failed to probe.
        path: PathBuf,
        /// ffprobe's explanation (stderr tail or parse failure).
        reason: String,
    },

    /// The external tool exited non-zero.
    #[error("tool '{operation}' failed (exit {exit_code:?}): {stderr_tail}")]
    ToolFailure {
        /// Name of the operation that was running.
        operation: String,
        /// Process exit code, if the process actually exited (vs. was
        /// signaled).
        exit_code: Option<i32>,
        /// Last N KB of captured stderr.
        stderr_tail: String,
    },

    /// The external tool exceeded its deadline and was killed.
    #[error("operation '{operation}' timed out after {elapsed_secs}s")]
    Timeout {
        /// Name of the operation that was running.
        operation: String,
        /// Wall-clock seconds elapsed before the kill.
        elapsed_secs: u64,
    },

    /// A content-analysis backend failed after exhausting its fallbacks.
    #[error("analysis backend failure: all backends exhausted for {stage}: {last_reason}")]
    AnalysisBackendFailure {
        /// Which analyzer stage failed (e.g. "speech_vad", "scene_detect").
        stage: String,
        /// The last backend's failure reason.
        last_reason: String,
    },

    /// No strategy satisfies the invariants for a planned segment.
    #[error("planning infeasible for segment '{segment_id}': {reason}")]
    PlanningInfeasibility {
        /// The segment that could not be planned.
        segment_id: String,
        /// Why no strategy fit.
        reason: String,
    },

    /// Wraps an I/O failure that doesn't fit a more specific variant.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Wraps a JSON (de)serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Build a `Validation` error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// The discriminator string the CLI envelope puts in `error_kind`.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "ValidationError",
            Error::Sandbox(_) => "SandboxError",
            Error::Probe { .. } => "ProbeError",
            Error::ToolFailure { .. } => "ToolFailure",
            Error::Timeout { .. } => "Timeout",
            Error::AnalysisBackendFailure { .. } => "AnalysisBackendFailure",
            Error::PlanningInfeasibility { .. } => "PlanningInfeasibility",
            Error::Io(_) => "IoError",
            Error::Json(_) => "JsonError",
        }
    }
}

/// Sandbox-specific failure detail, kept as its own type because
/// `komposer-registry::resolve` returns it directly (spec §4.A contract).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SandboxError {
    /// The handle is not registered.
    #[error("handle not found")]
    NotFound,
    /// The resolved path is outside every allowed root.
    #[error("path escapes sandbox roots")]
    OutOfSandbox,
    /// The file exceeds `MAX_FILE_SIZE`.
    #[error("file exceeds max size ({actual} > {limit} bytes)")]
    TooLarge {
        /// Actual file size in bytes.
        actual: u64,
        /// Configured limit in bytes.
        limit: u64,
    },
    /// The path was registered but no longer exists on disk.
    #[error("file vanished")]
    Vanished,
    /// The extension isn't in the allow-list for the handle's class.
    #[error("extension '{0}' not allowed")]
    ExtensionNotAllowed(String),
}
