//! Content Analyzer, Speech Analyzer, and the analysis cache they share
//! (spec §4.D, §4.E).
//!
//! Neither analyzer touches a handle directly — both take a resolved path,
//! the way `komposer-media::probe` does, leaving handle resolution to the
//! caller (`komposer-compose` or `komposer-cli`).

pub mod backend;
pub mod cache;
pub mod content_analyzer;
pub mod scene_backends;
pub mod speech_analyzer;
pub mod speech_backends;

pub use backend::{SceneBackend, SpeechBackend};
pub use content_analyzer::{ContentAnalysis, ContentAnalyzer};
pub use speech_analyzer::{insights as speech_insights, SpeechAnalyzer};
