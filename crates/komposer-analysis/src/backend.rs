//! Pluggable analysis backends (spec §4.D/§4.E "Pluggability").
//!
//! Each analyzer holds an ordered `Vec<Box<dyn Backend>>` and tries them in
//! priority order, falling through to the next on failure and recording
//! which one actually produced a result.

use komposer_core::{Error, SpeechSegment};
use std::path::Path;
use std::time::Duration;

/// A named, ordered voice-activity-detection backend.
pub trait SpeechBackend {
    /// Backend name, recorded on every [`SpeechSegment::backend`] it
    /// produces, for provenance.
    fn name(&self) -> &'static str;

    /// Detects speech segments in the audio track of `path`.
    fn detect(&self, path: &Path, timeout: Duration) -> Result<Vec<SpeechSegment>, String>;
}

/// A named, ordered scene-boundary-detection backend.
pub trait SceneBackend {
    /// Backend name, for provenance and error reporting.
    fn name(&self) -> &'static str;

    /// Detects scene boundary timestamps (seconds) in `path`'s video track.
    fn detect_boundaries(&self, path: &Path, timeout: Duration) -> Result<Vec<f64>, String>;
}

/// Runs `backends` in order, returning the first success and which backend
/// produced it, or [`Error::AnalysisBackendFailure`] after exhausting all of
/// them (spec §4.E "If all fail, the error surfaces").
pub fn try_speech_backends(
    backends: &[Box<dyn SpeechBackend>],
    path: &Path,
    timeout: Duration,
) -> Result<(Vec<SpeechSegment>, &'static str), Error> {
    let mut last_reason = String::from("no backends configured");
    for backend in backends {
        match backend.detect(path, timeout) {
            Ok(segments) => return Ok((segments, backend.name())),
            Err(reason) => {
                tracing::debug!(backend = backend.name(), %reason, "speech backend failed, trying next");
                last_reason = reason;
            }
        }
    }
    Err(Error::AnalysisBackendFailure {
        stage: "speech_vad".to_string(),
        last_reason,
    })
}

/// Same as [`try_speech_backends`] but for scene-boundary detection.
pub fn try_scene_backends(
    backends: &[Box<dyn SceneBackend>],
    path: &Path,
    timeout: Duration,
) -> Result<(Vec<f64>, &'static str), Error> {
    let mut last_reason = String::from("no backends configured");
    for backend in backends {
        match backend.detect_boundaries(path, timeout) {
            Ok(boundaries) => return Ok((boundaries, backend.name())),
            Err(reason) => {
                tracing::debug!(backend = backend.name(), %reason, "scene backend failed, trying next");
                last_reason = reason;
            }
        }
    }
    Err(Error::AnalysisBackendFailure {
        stage: "scene_detect".to_string(),
        last_reason,
    })
}
