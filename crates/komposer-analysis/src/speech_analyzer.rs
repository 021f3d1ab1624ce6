//! Speech Analyzer: cached voice-activity detection plus derived insights
//! (spec §4.E).

use crate::backend::{try_speech_backends, SpeechBackend};
use crate::{cache, speech_backends};
use komposer_core::{Error, Quality, SpeechInsights, SpeechSegment};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Produces [`SpeechSegment`]s for an audio/video path, backed by an
/// ordered list of [`SpeechBackend`]s and the shared analysis cache.
pub struct SpeechAnalyzer {
    backends: Vec<Box<dyn SpeechBackend>>,
    metadata_root: PathBuf,
    cache_ttl: Duration,
    process_timeout: Duration,
}

impl SpeechAnalyzer {
    /// Builds an analyzer with the default primary/fallback
    /// `silencedetect`-based backend pair.
    pub fn new(metadata_root: PathBuf, cache_ttl: Duration, process_timeout: Duration) -> Self {
        SpeechAnalyzer {
            backends: vec![
                Box::new(speech_backends::PrimarySilenceDetectBackend::new(
                    metadata_root.clone(),
                )),
                Box::new(speech_backends::FallbackSilenceDetectBackend::new(
                    metadata_root.clone(),
                )),
            ],
            metadata_root,
            cache_ttl,
            process_timeout,
        }
    }

    /// Detects speech segments for `path`, consulting the cache unless
    /// `force` is set.
    pub fn detect_speech(&self, path: &Path, force: bool) -> Result<Vec<SpeechSegment>, Error> {
        if let Some(cached) = cache::read(path, &self.metadata_root, "speech", self.cache_ttl, force)
        {
            return Ok(cached);
        }
        let (segments, _backend) =
            try_speech_backends(&self.backends, path, self.process_timeout)?;
        cache::write(path, &self.metadata_root, "speech", &segments);
        Ok(segments)
    }

    /// Detects speech segments that intersect `[range_start, range_end)` of
    /// `path`'s own timeline (spec §4.F step 3).
    pub fn detect_speech_in_range(
        &self,
        path: &Path,
        range_start: f64,
        range_end: f64,
        force: bool,
    ) -> Result<Vec<SpeechSegment>, Error> {
        Ok(self
            .detect_speech(path, force)?
            .into_iter()
            .filter(|s| s.intersects(range_start, range_end))
            .collect())
    }
}

/// Aggregate statistics over a set of speech segments (spec §4.E
/// `insights`).
pub fn insights(segments: &[SpeechSegment], source_duration: f64) -> SpeechInsights {
    if segments.is_empty() {
        return SpeechInsights {
            total_speech: 0.0,
            density: 0.0,
            avg_segment: 0.0,
            quality_histogram: [0, 0, 0],
            suggestions: vec![
                "no speech detected; time_stretch is unconstrained for this source".to_string(),
            ],
        };
    }

    let total_speech: f64 = segments.iter().map(SpeechSegment::duration).sum();
    let density = if source_duration > 0.0 {
        total_speech / source_duration
    } else {
        0.0
    };
    let avg_segment = total_speech / segments.len() as f64;

    let mut histogram = [0usize; 3];
    for segment in segments {
        let idx = match segment.quality {
            Quality::Poor => 0,
            Quality::Moderate => 1,
            Quality::Clear => 2,
        };
        histogram[idx] += 1;
    }

    let mut suggestions = Vec::new();
    if density > 0.7 {
        suggestions.push("speech-dense source; prefer smart_cut over time_stretch".to_string());
    }
    if histogram[2] == 0 {
        suggestions.push(
            "no clear-quality speech; time_stretch is permitted for every segment".to_string(),
        );
    }

    SpeechInsights {
        total_speech,
        density,
        avg_segment,
        quality_histogram: histogram,
        suggestions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use komposer_core::{CutPointKind, OptimalCutPoint, Priority};

    fn segment(start: f64, end: f64, quality: Quality) -> SpeechSegment {
        SpeechSegment {
            start,
            end,
            confidence: 0.9,
            quality,
            natural_pauses: vec![],
            optimal_cut_points: vec![
                OptimalCutPoint {
                    time: start,
                    kind: CutPointKind::SpeechStart,
                    priority: Priority::High,
                },
                OptimalCutPoint {
                    time: end,
                    kind: CutPointKind::SpeechEnd,
                    priority: Priority::High,
                },
            ],
            backend: "test".to_string(),
        }
    }

    #[test]
    fn empty_segments_yield_zeroed_insights() {
        let i = insights(&[], 10.0);
        assert_eq!(i.total_speech, 0.0);
        assert!(!i.suggestions.is_empty());
    }

    #[test]
    fn aggregates_duration_and_histogram() {
        let segments = vec![
            segment(0.0, 2.0, Quality::Clear),
            segment(3.0, 4.0, Quality::Poor),
        ];
        let i = insights(&segments, 10.0);
        assert!((i.total_speech - 3.0).abs() < 1e-9);
        assert!((i.density - 0.3).abs() < 1e-9);
        assert_eq!(i.quality_histogram, [1, 0, 1]);
    }
}
