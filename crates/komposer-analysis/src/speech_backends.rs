//! ffmpeg-filter-based voice-activity-detection backends.
//!
//! No bundled ML VAD model is available here, so these backends derive
//! speech/silence boundaries from ffmpeg's `silencedetect` audio filter
//! (spec §4.E names "a voice-activity detector" without mandating a
//! specific algorithm, only the segment/cut-point shape it must produce).
//! Swapping in a model-based detector later would only mean adding another
//! [`crate::backend::SpeechBackend`] impl.

use crate::backend::SpeechBackend;
use komposer_core::{CutPointKind, OptimalCutPoint, Priority, Quality, SpeechSegment};
use komposer_media::run_with_timeout;
use std::path::{Path, PathBuf};
use std::time::Duration;

const MIN_SPEECH_DURATION: f64 = 0.3;
const MIN_SILENCE_DURATION: f64 = 0.3;
const PAUSE_MIN: f64 = 0.15;
const PAUSE_MAX: f64 = 1.2;

/// One detected silence interval, `[start, end)`, in source-local seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
struct SilenceInterval {
    start: f64,
    end: f64,
}

impl SilenceInterval {
    fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Runs ffmpeg's `silencedetect` filter and parses its stderr into a list
/// of silence intervals. Any interval still open at end-of-stream is closed
/// at `duration`.
fn detect_silence(
    path: &Path,
    noise_threshold_db: f64,
    min_silence: f64,
    duration: f64,
    timeout: Duration,
) -> Result<Vec<SilenceInterval>, String> {
    let filter = format!("silencedetect=noise={noise_threshold_db}dB:d={min_silence}");
    let args = vec![
        "-v".to_string(),
        "info".to_string(),
        "-i".to_string(),
        path.to_string_lossy().into_owned(),
        "-af".to_string(),
        filter,
        "-f".to_string(),
        "null".to_string(),
        "-".to_string(),
    ];
    let output = run_with_timeout("ffmpeg", &args, timeout).map_err(|e| e.to_string())?;
    if output.timed_out {
        return Err("ffmpeg silencedetect timed out".to_string());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    Ok(parse_silence_intervals(&stderr, duration))
}

fn parse_silence_intervals(stderr: &str, duration: f64) -> Vec<SilenceInterval> {
    let mut intervals = Vec::new();
    let mut open_start: Option<f64> = None;
    for line in stderr.lines() {
        if let Some(value) = line.split("silence_start:").nth(1) {
            if let Some(start) = value.split_whitespace().next().and_then(|s| s.parse().ok()) {
                open_start = Some(start);
            }
        } else if let Some(value) = line.split("silence_end:").nth(1) {
            let end = value
                .split_whitespace()
                .next()
                .and_then(|s| s.parse::<f64>().ok());
            if let (Some(start), Some(end)) = (open_start.take(), end) {
                intervals.push(SilenceInterval { start, end });
            }
        }
    }
    if let Some(start) = open_start {
        intervals.push(SilenceInterval {
            start,
            end: duration,
        });
    }
    intervals
}

/// Complements silence intervals against `[0, duration)` to get speech
/// intervals, dropping any shorter than `min_speech`.
fn complement(silences: &[SilenceInterval], duration: f64, min_speech: f64) -> Vec<(f64, f64)> {
    let mut cursor = 0.0;
    let mut speech = Vec::new();
    for silence in silences {
        if silence.start > cursor {
            speech.push((cursor, silence.start));
        }
        cursor = cursor.max(silence.end);
    }
    if cursor < duration {
        speech.push((cursor, duration));
    }
    speech
        .into_iter()
        .filter(|(s, e)| e - s >= min_speech)
        .collect()
}

/// The nearest silence boundary in the full source timeline on either side
/// of `[start, end)`, added as low-priority cut candidates (spec §4.E: "the
/// overall nearest-silence boundaries in the source timeline surrounding
/// the segment"). These sit outside the segment itself, unlike
/// `natural_pauses`, which are strictly interior.
fn surrounding_silence_boundaries(
    fine_silences: &[SilenceInterval],
    start: f64,
    end: f64,
) -> Vec<OptimalCutPoint> {
    let mut points = Vec::new();

    if let Some(before) = fine_silences
        .iter()
        .filter(|s| s.end <= start)
        .map(|s| s.end)
        .fold(None, |best: Option<f64>, e| {
            Some(best.map_or(e, |b| b.max(e)))
        })
    {
        points.push(OptimalCutPoint {
            time: before,
            kind: CutPointKind::SpeechStart,
            priority: Priority::Low,
        });
    }

    if let Some(after) = fine_silences
        .iter()
        .filter(|s| s.start >= end)
        .map(|s| s.start)
        .fold(None, |best: Option<f64>, s| {
            Some(best.map_or(s, |b| b.min(s)))
        })
    {
        points.push(OptimalCutPoint {
            time: after,
            kind: CutPointKind::SpeechEnd,
            priority: Priority::Low,
        });
    }

    points
}

/// Builds [`SpeechSegment`]s from coarse speech ranges plus a finer-grained
/// silence pass used to find `natural_pauses` inside each range.
fn build_segments(
    speech_ranges: &[(f64, f64)],
    fine_silences: &[SilenceInterval],
    backend_name: &'static str,
    confidence_scale: f64,
) -> Vec<SpeechSegment> {
    speech_ranges
        .iter()
        .map(|&(start, end)| {
            let pauses: Vec<f64> = fine_silences
                .iter()
                .filter(|s| s.start > start && s.end < end)
                .filter(|s| s.duration() >= PAUSE_MIN && s.duration() <= PAUSE_MAX)
                .map(|s| (s.start + s.end) / 2.0)
                .collect();

            let span = end - start;
            let confidence = (span / 2.0 * confidence_scale).clamp(0.3, 0.99);
            let quality = if span >= 2.0 && pauses.len() <= 2 {
                Quality::Clear
            } else if span >= 0.7 {
                Quality::Moderate
            } else {
                Quality::Poor
            };

            let mut optimal_cut_points = vec![
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
            ];
            optimal_cut_points.extend(pauses.iter().map(|&t| OptimalCutPoint {
                time: t,
                kind: CutPointKind::NaturalPause,
                priority: Priority::Medium,
            }));
            optimal_cut_points.extend(surrounding_silence_boundaries(fine_silences, start, end));
            optimal_cut_points.sort_by(|a, b| a.time.partial_cmp(&b.time).unwrap());

            SpeechSegment {
                start,
                end,
                confidence,
                quality,
                natural_pauses: {
                    let mut p = pauses;
                    p.sort_by(|a, b| a.partial_cmp(b).unwrap());
                    p
                },
                optimal_cut_points,
                backend: backend_name.to_string(),
            }
        })
        .collect()
}

/// Primary VAD backend: a moderately sensitive noise floor (`-30dB`),
/// suited to clean studio-ish recordings.
pub struct PrimarySilenceDetectBackend {
    metadata_root: PathBuf,
}

impl PrimarySilenceDetectBackend {
    /// Builds the backend; `metadata_root` is only used to probe duration
    /// through the shared probe cache.
    pub fn new(metadata_root: PathBuf) -> Self {
        PrimarySilenceDetectBackend { metadata_root }
    }
}

impl SpeechBackend for PrimarySilenceDetectBackend {
    fn name(&self) -> &'static str {
        "primary_silencedetect"
    }

    fn detect(&self, path: &Path, timeout: Duration) -> Result<Vec<SpeechSegment>, String> {
        let info = komposer_media::probe(path, &self.metadata_root, timeout)
            .map_err(|e| e.to_string())?;
        if !info.has_audio() {
            return Err("no_audio".to_string());
        }
        let coarse = detect_silence(path, -30.0, MIN_SILENCE_DURATION, info.duration, timeout)?;
        let speech_ranges = complement(&coarse, info.duration, MIN_SPEECH_DURATION);
        let fine = detect_silence(path, -30.0, PAUSE_MIN, info.duration, timeout)?;
        Ok(build_segments(&speech_ranges, &fine, self.name(), 1.0))
    }
}

/// First fallback: a more permissive noise floor (`-24dB`) for noisier
/// sources where the primary's threshold would classify everything as
/// silence.
pub struct FallbackSilenceDetectBackend {
    metadata_root: PathBuf,
}

impl FallbackSilenceDetectBackend {
    /// Builds the fallback backend.
    pub fn new(metadata_root: PathBuf) -> Self {
        FallbackSilenceDetectBackend { metadata_root }
    }
}

impl SpeechBackend for FallbackSilenceDetectBackend {
    fn name(&self) -> &'static str {
        "fallback_silencedetect"
    }

    fn detect(&self, path: &Path, timeout: Duration) -> Result<Vec<SpeechSegment>, String> {
        let info = komposer_media::probe(path, &self.metadata_root, timeout)
            .map_err(|e| e.to_string())?;
        if !info.has_audio() {
            return Err("no_audio".to_string());
        }
        let coarse = detect_silence(path, -24.0, MIN_SILENCE_DURATION, info.duration, timeout)?;
        let speech_ranges = complement(&coarse, info.duration, MIN_SPEECH_DURATION);
        let fine = detect_silence(path, -24.0, PAUSE_MIN, info.duration, timeout)?;
        Ok(build_segments(&speech_ranges, &fine, self.name(), 0.85))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_paired_silence_markers() {
        let stderr = "\
[silencedetect @ 0x1] silence_start: 2.5
[silencedetect @ 0x1] silence_end: 4.0 | silence_duration: 1.5
[silencedetect @ 0x1] silence_start: 10.0
";
        let intervals = parse_silence_intervals(stderr, 12.0);
        assert_eq!(
            intervals,
            vec![
                SilenceInterval {
                    start: 2.5,
                    end: 4.0
                },
                SilenceInterval {
                    start: 10.0,
                    end: 12.0
                },
            ]
        );
    }

    #[test]
    fn complement_drops_short_speech_bursts() {
        let silences = vec![
            SilenceInterval { start: 0.0, end: 2.0 },
            SilenceInterval { start: 2.1, end: 5.0 },
        ];
        let speech = complement(&silences, 10.0, 0.3);
        assert_eq!(speech, vec![(5.0, 10.0)]);
    }

    #[test]
    fn surrounding_boundaries_flank_the_segment_as_low_priority() {
        let fine = vec![
            SilenceInterval { start: 1.0, end: 1.8 },
            SilenceInterval {
                start: 10.0,
                end: 10.5,
            },
        ];
        let points = surrounding_silence_boundaries(&fine, 2.0, 9.0);
        assert_eq!(points.len(), 2);
        assert!(points.iter().all(|p| p.priority == Priority::Low));
        assert_eq!(points[0].time, 1.8);
        assert_eq!(points[1].time, 10.0);
    }

    #[test]
    fn build_segments_places_pauses_inside_range() {
        let ranges = vec![(0.0, 10.0)];
        let fine = vec![SilenceInterval {
            start: 4.0,
            end: 4.3,
        }];
        let segments = build_segments(&ranges, &fine, "test_backend", 1.0);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].natural_pauses, vec![4.15]);
        assert_eq!(
            segments[0]
                .optimal_cut_points
                .iter()
                .filter(|p| p.kind == CutPointKind::NaturalPause)
                .count(),
            1
        );
    }
}
