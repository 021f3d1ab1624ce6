//! Domain model and error taxonomy for the komposer media-composition engine.
//!
//! This crate holds the shared vocabulary every other `komposer-*` crate
//! builds on: opaque file handles, probe metadata, the komposition document
//! schema, the per-segment `Strategy` sum type, speech/scene analysis
//! records, the build plan, and the effects-tree arena. Nothing here touches
//! the filesystem or spawns a process — those concerns live in
//! `komposer-registry` and `komposer-media` respectively.

pub mod effects;
pub mod error;
pub mod handle;
pub mod komposition;
pub mod media;
pub mod plan;
pub mod scene;
pub mod speech;
pub mod strategy;

pub use effects::{EffectId, EffectNode, EffectType, EffectsTree, EffectsTreeError};
pub use error::{Error, Result};
pub use handle::{FileHandle, HandleClass};
pub use komposition::{
    BackgroundAudioSpec, BeatPattern, Komposition, MediaType, Segment, SegmentError, Source,
    SourceTiming,
};
pub use media::{MediaInfo, StreamInfo};
pub use plan::{AudioOverlay, AudioTimingManifest, BackgroundTrack, BuildPlan, PlanStep};
pub use scene::{SceneInsights, SceneRecord};
pub use speech::{CutPointKind, OptimalCutPoint, Priority, Quality, SpeechInsights, SpeechSegment};
pub use strategy::{FitStrategy, Strategy, StrategyError};

/// Default tolerance for a `Hybrid` strategy's residual stretch factor, per
/// spec §3: `|residual_stretch_factor - 1| <= EPSILON`.
pub const RESIDUAL_STRETCH_EPSILON: f64 = 0.10;
