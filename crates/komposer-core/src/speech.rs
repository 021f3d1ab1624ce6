//! Speech-detection records (spec §3 "SpeechSegment").

use serde::{Deserialize, Serialize};

/// A contiguous span of detected speech in a source's timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechSegment {
    /// Start time in source-local seconds.
    pub start: f64,
    /// End time in source-local seconds.
    pub end: f64,
    /// Detector confidence in `[0, 1]`.
    pub confidence: f64,
    /// Coarse SNR-derived quality bucket.
    pub quality: Quality,
    /// Short internal silences inside this segment, sorted ascending.
    pub natural_pauses: Vec<f64>,
    /// Candidate cut points derived from this segment's boundaries and
    /// pauses, sorted ascending by time.
    pub optimal_cut_points: Vec<OptimalCutPoint>,
    /// Name of the backend that produced this segment (for provenance).
    pub backend: String,
}

impl SpeechSegment {
    /// Duration of the segment in seconds.
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// `true` if this segment overlaps `[range_start, range_end)`.
    pub fn intersects(&self, range_start: f64, range_end: f64) -> bool {
        self.start < range_end && self.end > range_start
    }
}

/// Coarse quality bucket for a detected speech segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    /// Low SNR / heavy noise; unreliable for cut-point selection.
    Poor,
    /// Usable but imperfect.
    Moderate,
    /// High SNR, safe to cut on.
    Clear,
}

/// A single candidate point at which the planner may cut a source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptimalCutPoint {
    /// Source-local seconds.
    pub time: f64,
    /// What kind of boundary this is.
    pub kind: CutPointKind,
    /// How strongly the planner should prefer this point over alternatives.
    pub priority: Priority,
}

/// The kind of boundary a cut point represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CutPointKind {
    /// The first sample of a speech segment.
    SpeechStart,
    /// A short silence strictly inside a speech segment.
    NaturalPause,
    /// The last sample of a speech segment.
    SpeechEnd,
}

/// Relative importance the planner assigns a cut point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Nearest-silence boundaries outside any speech segment.
    Low,
    /// Natural pauses inside a speech segment.
    Medium,
    /// Segment starts/ends.
    High,
}

/// Aggregate statistics over a set of speech segments (spec §4.E `insights`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechInsights {
    /// Sum of all segment durations, in seconds.
    pub total_speech: f64,
    /// `total_speech / source_duration`.
    pub density: f64,
    /// Mean segment duration, in seconds.
    pub avg_segment: f64,
    /// Count of segments per [`Quality`] bucket, indexed `[poor, moderate, clear]`.
    pub quality_histogram: [usize; 3],
    /// Human-readable suggestions (e.g. "source is speech-light; consider
    /// time_stretch for all segments").
    pub suggestions: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersects_detects_overlap_and_gap() {
        let seg = SpeechSegment {
            start: 3.0,
            end: 9.4,
            confidence: 0.9,
            quality: Quality::Clear,
            natural_pauses: vec![],
            optimal_cut_points: vec![],
            backend: "primary".into(),
        };
        assert!(seg.intersects(0.0, 5.0));
        assert!(seg.intersects(5.0, 20.0));
        assert!(!seg.intersects(10.0, 20.0));
        assert!(!seg.intersects(0.0, 3.0));
    }

    #[test]
    fn quality_ordering() {
        assert!(Quality::Poor < Quality::Moderate);
        assert!(Quality::Moderate < Quality::Clear);
    }
}
