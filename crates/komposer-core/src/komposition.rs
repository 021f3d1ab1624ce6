//! The komposition document: a beat-driven edit decision list (spec §3
//! "Komposition").

use crate::effects::EffectsTree;
use crate::handle::FileHandle;
use crate::strategy::FitStrategy;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A parsed, structurally-valid komposition document.
///
/// Top-level unknown fields are ignored on deserialize (forward
/// compatibility for document producers); fields nested inside `segments`
/// and `sources` are rejected (spec §9 "deny_unknown_fields scope").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Komposition {
    /// Document schema version, e.g. `"1.0"`. Unrecognized versions are not
    /// rejected here — callers that care check this themselves.
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    /// Tempo in beats per minute. Must be > 0.
    pub bpm: f64,
    /// Time signature numerator, e.g. `4` for 4/4.
    pub beats_per_measure: u32,
    /// The ordered list of segments that make up the timeline.
    pub segments: Vec<Segment>,
    /// The pool of source files segments reference by id.
    pub sources: Vec<Source>,
    /// Optional global beat remap applied before beats are converted to
    /// seconds (spec §4.F step 1).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub beat_pattern: Option<BeatPattern>,
    /// Background music layered under the whole timeline (spec §3
    /// "For background music"). Absent means the processor mixes only the
    /// overlaid speech tracks onto a silent bed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_audio: Option<BackgroundAudioSpec>,
    /// Root of a declarative effects DAG over segment outputs, if the
    /// document uses one instead of plain ordered concatenation (spec §3
    /// "effects_tree", §4.H).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effects_tree: Option<EffectsTree>,
}

fn default_schema_version() -> String {
    "1.0".to_string()
}

impl Komposition {
    /// Seconds-per-beat at this document's tempo.
    pub fn seconds_per_beat(&self) -> f64 {
        60.0 / self.bpm
    }

    /// Looks up a source by its `source_id`.
    pub fn source(&self, source_id: &str) -> Option<&Source> {
        self.sources.iter().find(|s| s.source_id == source_id)
    }

    /// The document's effects tree, if it has one.
    pub fn effects_tree(&self) -> Option<&EffectsTree> {
        self.effects_tree.as_ref()
    }
}

/// One entry in a komposition's source pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// Identifier segments reference via [`Segment::source_ref`].
    pub source_id: String,
    /// Handle to the underlying file, resolved through the registry before
    /// planning begins.
    pub handle: FileHandle,
    /// What kind of media this source is.
    pub media_type: MediaType,
}

/// The kind of media a [`Source`] contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    /// Carries both a video and (usually) an audio stream.
    Video,
    /// Audio-only.
    Audio,
    /// A still image, held for its segment's full duration.
    Image,
}

/// One timeline entry: a beat range mapped onto a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Identifier unique within the document, used in diagnostics and in
    /// [`crate::Error::PlanningInfeasibility`].
    pub segment_id: String,
    /// Which [`Source`] this segment draws from.
    pub source_ref: String,
    /// Inclusive start, in beats from the timeline origin.
    pub start_beat: f64,
    /// Exclusive end, in beats from the timeline origin. Must be strictly
    /// greater than `start_beat` (spec §9 Open Question: rejected as a
    /// `ValidationError` rather than silently swapped or zero-length).
    pub end_beat: f64,
    /// How the source's own timing interacts with the beat slot.
    #[serde(default)]
    pub source_timing: SourceTiming,
    /// Caller-requested fit strategy for a `SmartCut`/`Hybrid` shorter than
    /// its slot. The planner's default is always
    /// [`FitStrategy::Center`] (spec §4.F step 4); this hint is honored only
    /// when present, and never changes the planner's strategy-kind
    /// selection, only its padding behavior.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub fit_strategy_hint: Option<FitStrategy>,
}

impl Segment {
    /// Duration of this segment's beat range, in beats.
    pub fn beat_span(&self) -> f64 {
        self.end_beat - self.start_beat
    }

    /// Validates the beat-domain invariants: `start_beat`/`end_beat` are
    /// non-negative whole numbers, and `end_beat > start_beat` (spec §3
    /// "nonneg ints, end_beat > start_beat").
    pub fn validate(&self) -> Result<(), SegmentError> {
        if self.start_beat < 0.0 || self.end_beat < 0.0 {
            return Err(SegmentError::NegativeBeat {
                segment_id: self.segment_id.clone(),
                start_beat: self.start_beat,
                end_beat: self.end_beat,
            });
        }
        if self.start_beat.fract() != 0.0 || self.end_beat.fract() != 0.0 {
            return Err(SegmentError::NonIntegerBeat {
                segment_id: self.segment_id.clone(),
                start_beat: self.start_beat,
                end_beat: self.end_beat,
            });
        }
        if self.end_beat <= self.start_beat {
            return Err(SegmentError::NonPositiveSpan {
                segment_id: self.segment_id.clone(),
                start_beat: self.start_beat,
                end_beat: self.end_beat,
            });
        }
        Ok(())
    }
}

/// How a segment's source material lines up with its beat-derived slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceTiming {
    /// Use the source's own start point and natural duration; the planner
    /// chooses a [`crate::Strategy`] to reconcile it with the slot.
    #[default]
    OriginalStartDuration,
    /// Hold a fixed-duration still (only valid for [`MediaType::Image`]
    /// sources); no strategy selection applies.
    StaticDuration,
}

/// Background music layered under the entire composition (spec §3 "For
/// background music": handle, volume, fade_in, fade_out, start_offset).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackgroundAudioSpec {
    /// Which [`Source`] supplies the background track.
    pub source_ref: String,
    /// Linear gain applied to the track, default `0.3` per spec §4.F step 7.
    #[serde(default = "default_background_volume")]
    pub volume: f64,
    /// Fade-in duration at the start of the timeline, seconds.
    #[serde(default)]
    pub fade_in: f64,
    /// Fade-out duration at the end of the timeline, seconds.
    #[serde(default)]
    pub fade_out: f64,
    /// Offset into the source track at which playback starts, seconds.
    #[serde(default)]
    pub start_offset: f64,
}

fn default_background_volume() -> f64 {
    0.3
}

/// A document-wide remap of the beat axis (spec §4.F step 1).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeatPattern {
    /// Beat at which the remapped range begins.
    pub from_beat: f64,
    /// Beat at which the remapped range ends.
    pub to_beat: f64,
    /// The BPM the `[from_beat, to_beat)` range is expressed in, which may
    /// differ from the document's own `bpm`.
    pub master_bpm: f64,
}

/// Rejected construction of an invalid [`Segment`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SegmentError {
    /// `end_beat <= start_beat`.
    #[error("segment '{segment_id}' has non-positive beat span ({start_beat}..{end_beat})")]
    NonPositiveSpan {
        /// The offending segment's id.
        segment_id: String,
        /// Its `start_beat`.
        start_beat: f64,
        /// Its `end_beat`.
        end_beat: f64,
    },
    /// `start_beat` or `end_beat` is negative.
    #[error("segment '{segment_id}' has a negative beat bound ({start_beat}..{end_beat})")]
    NegativeBeat {
        /// The offending segment's id.
        segment_id: String,
        /// Its `start_beat`.
        start_beat: f64,
        /// Its `end_beat`.
        end_beat: f64,
    },
    /// `start_beat` or `end_beat` is not a whole number.
    #[error("segment '{segment_id}' has a non-integer beat bound ({start_beat}..{end_beat})")]
    NonIntegerBeat {
        /// The offending segment's id.
        segment_id: String,
        /// Its `start_beat`.
        start_beat: f64,
        /// Its `end_beat`.
        end_beat: f64,
    },
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MediaType::Video => "video",
            MediaType::Audio => "audio",
            MediaType::Image => "image",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(start: f64, end: f64) -> Segment {
        Segment {
            segment_id: "s1".into(),
            source_ref: "src1".into(),
            start_beat: start,
            end_beat: end,
            source_timing: SourceTiming::OriginalStartDuration,
            fit_strategy_hint: None,
        }
    }

    #[test]
    fn rejects_zero_and_negative_span() {
        assert!(seg(4.0, 4.0).validate().is_err());
        assert!(seg(4.0, 2.0).validate().is_err());
        assert!(seg(4.0, 8.0).validate().is_ok());
    }

    #[test]
    fn rejects_negative_beat_bounds() {
        assert!(matches!(
            seg(-5.0, -1.0).validate(),
            Err(SegmentError::NegativeBeat { .. })
        ));
        assert!(matches!(
            seg(-1.0, 4.0).validate(),
            Err(SegmentError::NegativeBeat { .. })
        ));
    }

    #[test]
    fn rejects_fractional_beat_bounds() {
        assert!(matches!(
            seg(0.5, 4.0).validate(),
            Err(SegmentError::NonIntegerBeat { .. })
        ));
        assert!(matches!(
            seg(0.0, 4.5).validate(),
            Err(SegmentError::NonIntegerBeat { .. })
        ));
    }

    #[test]
    fn seconds_per_beat_at_120bpm() {
        let k = Komposition {
            schema_version: "1.0".into(),
            bpm: 120.0,
            beats_per_measure: 4,
            segments: vec![],
            sources: vec![],
            beat_pattern: None,
            background_audio: None,
            effects_tree: None,
        };
        assert!((k.seconds_per_beat() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn segment_beat_spans_sum_to_beat_pattern_range() {
        let pattern = BeatPattern {
            from_beat: 0.0,
            to_beat: 32.0,
            master_bpm: 128.0,
        };
        let segments = vec![seg(0.0, 8.0), seg(8.0, 20.0), seg(20.0, 32.0)];
        let total: f64 = segments.iter().map(Segment::beat_span).sum();
        assert!((total - (pattern.to_beat - pattern.from_beat)).abs() < 1e-9);
    }

    #[test]
    fn default_source_timing_is_original() {
        assert_eq!(
            SourceTiming::default(),
            SourceTiming::OriginalStartDuration
        );
    }
}
