//! The build plan: the Composition Planner's output, consumed by the
//! Composition Processor (spec §4.F/§4.G).

use crate::effects::EffectsTree;
use crate::handle::FileHandle;
use crate::strategy::Strategy;
use serde::{Deserialize, Serialize};

/// An ordered, executable sequence of operation invocations plus an audio
/// timing manifest, ready to hand to `komposer-ops::Executor::execute_batch`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildPlan {
    /// One step per operation invocation, in execution order.
    pub steps: Vec<PlanStep>,
    /// Accumulated audio-track placement data, used by overlay/background
    /// mixing steps appended after the per-segment steps.
    pub audio_timing: AudioTimingManifest,
    /// Each segment's id paired with the 0-indexed `steps` position of its
    /// final per-segment output, in segment order. The Composition Processor
    /// uses this to build the segment-output map the Effects Tree Evaluator
    /// needs (spec §4.H `evaluate(effects_tree, segment_outputs)`).
    pub segment_outputs: Vec<(String, usize)>,
    /// The document's effects tree, if it had one. When present, the
    /// Processor evaluates it in place of the plain concatenation that would
    /// otherwise be step 6 (spec §4.F step 8).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effects_tree: Option<EffectsTree>,
    /// The source document's tempo, carried through so the Effects Tree
    /// Evaluator can convert `_beats`-suffixed node params to seconds without
    /// needing the original komposition document.
    pub bpm: f64,
}

/// A single operation invocation within a [`BuildPlan`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    /// Index of this step within the plan; referenced by later steps via
    /// `RESULT_k` substitution (spec §4.G).
    pub index: usize,
    /// Name of the operation from the Operation Catalog, e.g.
    /// `"extract_segment"`.
    pub operation: String,
    /// Segment this step realizes, if any (planner-generated steps always
    /// have one; plan-merge steps like concatenation do not).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment_id: Option<String>,
    /// The strategy this step implements, if it is a per-segment fitting
    /// step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Strategy>,
    /// Resolved parameter values for the operation, keyed by parameter name.
    /// Values that reference another step's output use the literal string
    /// `"CHAIN"` or `"RESULT_<k>"` (spec §4.G), substituted at execution
    /// time rather than planning time.
    pub params: serde_json::Map<String, serde_json::Value>,
}

/// Placement data for audio tracks layered on top of the video timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AudioTimingManifest {
    /// Audio clips overlaid at specific timeline offsets.
    pub overlays: Vec<AudioOverlay>,
    /// A single looped/trimmed background track spanning the whole timeline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background: Option<BackgroundTrack>,
}

/// One audio clip placed at a specific point in the output timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioOverlay {
    /// Source of the audio clip. A placeholder (`FileHandle::from_raw(0)`)
    /// until `produced_by_step` resolves, for overlays whose audio is an
    /// audio-extract step's output rather than something already known at
    /// planning time.
    pub handle: FileHandle,
    /// Offset into the output timeline at which playback starts, seconds.
    pub timeline_start: f64,
    /// Clip duration as placed, seconds (after any trim).
    pub duration: f64,
    /// Linear gain applied to this overlay, `1.0` = unity.
    pub gain: f64,
    /// Index into the owning [`BuildPlan::steps`] whose output is this
    /// overlay's real handle, for overlays planned before the step that
    /// produces their audio has actually run. The Composition Processor
    /// resolves this into `handle` once `step_outputs` is available, and the
    /// manifest it returns from `process()` always has this cleared.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub produced_by_step: Option<usize>,
    /// Segment this overlay's speech was extracted from, for diagnostics.
    pub segment_id: String,
    /// Fade-in applied to this overlay's own clip before mixing, seconds.
    pub fade_in: f64,
    /// Fade-out applied to this overlay's own clip before mixing, seconds.
    pub fade_out: f64,
}

/// A background track spanning the output timeline, looped or trimmed to
/// fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackgroundTrack {
    /// Source of the background audio.
    pub handle: FileHandle,
    /// Linear gain applied to the background track.
    pub gain: f64,
    /// `true` if the source is shorter than the timeline and must loop.
    pub looped: bool,
    /// Offset into the source track at which playback starts, seconds.
    pub start_offset: f64,
    /// Fade-in duration at the start of the timeline, seconds.
    pub fade_in: f64,
    /// Fade-out duration at the end of the timeline, seconds.
    pub fade_out: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_manifest_has_no_background() {
        let manifest = AudioTimingManifest::default();
        assert!(manifest.background.is_none());
        assert!(manifest.overlays.is_empty());
    }
}
