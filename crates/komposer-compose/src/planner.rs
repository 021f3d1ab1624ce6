//! Composition Planner: turns a [`Komposition`] document into a concrete,
//! executable [`BuildPlan`] (spec §4.F).
//!
//! Per-segment steps are recorded as [`PlanStep`]s whose `params` carry two
//! reserved keys, `__input__` and `__output_extension__`, alongside the
//! operation's own declared parameters — `PlanStep` has no dedicated input/
//! extension fields of its own, so the Processor pulls these back out when
//! building the [`komposer_ops::BatchStep`]s it actually runs (mirroring how
//! the params map already carries the `CHAIN`/`RESULT_k` literals spec.md
//! itself specifies).

use komposer_analysis::SpeechAnalyzer;
use komposer_config::Config;
use komposer_core::{
    AudioOverlay, AudioTimingManifest, BackgroundTrack, BuildPlan, Error, FileHandle, FitStrategy,
    Komposition, MediaType, PlanStep, Quality, Segment, Source, SpeechSegment, Strategy,
    RESIDUAL_STRETCH_EPSILON,
};
use komposer_registry::Registry;
use serde_json::{Map, Value};

pub(crate) const RESERVED_INPUT_KEY: &str = "__input__";
pub(crate) const RESERVED_OUTPUT_EXTENSION_KEY: &str = "__output_extension__";

const DEFAULT_OVERLAY_GAIN: f64 = 0.9;
const DEFAULT_OVERLAY_FADE: f64 = 0.05;
const INTERMEDIATE_EXTENSION: &str = "mp4";
const SPEECH_EXTENSION: &str = "m4a";

/// Per-segment timing/strategy preview, returned by [`Planner::preview_timing`].
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentPreview {
    /// The segment this preview describes.
    pub segment_id: String,
    /// Its beat-derived slot length, in seconds.
    pub time_slot_seconds: f64,
    /// The strategy the planner would choose for it.
    pub strategy: Strategy,
    /// The source-local range the strategy keeps, if any (`None` for
    /// `TimeStretch`, which keeps the whole range).
    pub projected_source_range: Option<(f64, f64)>,
}

/// Converts a [`Komposition`] document into a [`BuildPlan`] (spec §4.F).
pub struct Planner<'a> {
    registry: &'a mut Registry,
    config: &'a Config,
    speech_analyzer: SpeechAnalyzer,
}

impl<'a> Planner<'a> {
    /// Builds a planner over a registry and the active configuration.
    pub fn new(registry: &'a mut Registry, config: &'a Config) -> Self {
        let speech_analyzer = SpeechAnalyzer::new(
            config.metadata_root.clone(),
            config.analysis_cache_ttl,
            config.process_timeout,
        );
        Planner {
            registry,
            config,
            speech_analyzer,
        }
    }

    /// Produces a `BuildPlan` for `komposition` (spec §4.F `plan`).
    pub fn plan(&mut self, komposition: &Komposition) -> Result<BuildPlan, Error> {
        if komposition.segments.is_empty() {
            return Err(Error::validation("komposition has no segments"));
        }
        validate_segment_ordering(&komposition.segments)?;

        let mut steps: Vec<PlanStep> = Vec::new();
        let mut overlays: Vec<AudioOverlay> = Vec::new();
        let mut segment_outputs: Vec<(String, usize)> = Vec::with_capacity(komposition.segments.len());
        let mut timeline_cursor = 0.0;

        for segment in &komposition.segments {
            segment
                .validate()
                .map_err(|e| Error::validation(e.to_string()))?;

            let source = komposition.source(&segment.source_ref).ok_or_else(|| {
                Error::PlanningInfeasibility {
                    segment_id: segment.segment_id.clone(),
                    reason: "source_missing".to_string(),
                }
            })?;

            if source.media_type == MediaType::Audio {
                return Err(Error::PlanningInfeasibility {
                    segment_id: segment.segment_id.clone(),
                    reason: "audio-only sources may only be used as a background track or \
                             speech overlay, not as a timeline segment's main source"
                        .to_string(),
                });
            }

            let time_slot = time_slot_seconds(komposition, segment);
            let last_index =
                self.plan_segment(segment, source, time_slot, timeline_cursor, &mut steps, &mut overlays)?;
            segment_outputs.push((segment.segment_id.clone(), last_index));
            timeline_cursor += time_slot;
        }

        let expected_total = total_slot_seconds(komposition);
        if (timeline_cursor - expected_total).abs() > 1e-6 {
            return Err(Error::validation(format!(
                "planned timeline duration {timeline_cursor} does not match beat-derived total \
                 {expected_total}"
            )));
        }

        let background = self.plan_background(komposition)?;

        let effects_tree = komposition
            .effects_tree()
            .map(|tree| tree.clone());

        if effects_tree.is_none() {
            self.append_concatenation(&segment_outputs, &mut steps)?;
        }

        Ok(BuildPlan {
            steps,
            audio_timing: AudioTimingManifest {
                overlays,
                background,
            },
            segment_outputs,
            effects_tree,
            bpm: komposition.bpm,
        })
    }

    /// Per-segment timing/strategy preview without emitting any steps (spec
    /// §4.F `preview_timing`).
    pub fn preview_timing(&self, komposition: &Komposition) -> Result<Vec<SegmentPreview>, Error> {
        validate_segment_ordering(&komposition.segments)?;
        let mut previews = Vec::with_capacity(komposition.segments.len());
        for segment in &komposition.segments {
            segment
                .validate()
                .map_err(|e| Error::validation(e.to_string()))?;
            let source = komposition.source(&segment.source_ref).ok_or_else(|| {
                Error::PlanningInfeasibility {
                    segment_id: segment.segment_id.clone(),
                    reason: "source_missing".to_string(),
                }
            })?;
            let time_slot = time_slot_seconds(komposition, segment);

            if source.media_type == MediaType::Image {
                previews.push(SegmentPreview {
                    segment_id: segment.segment_id.clone(),
                    time_slot_seconds: time_slot,
                    strategy: Strategy::TimeStretch { factor: 1.0 },
                    projected_source_range: None,
                });
                continue;
            }

            let (duration, speech_segments) = self.analyze_source(source, segment)?;
            let strategy = self.select_strategy(segment, duration, time_slot, &speech_segments)?;
            previews.push(SegmentPreview {
                segment_id: segment.segment_id.clone(),
                time_slot_seconds: time_slot,
                projected_source_range: strategy.source_range(),
                strategy,
            });
        }
        Ok(previews)
    }

    fn analyze_source(
        &self,
        source: &Source,
        segment: &Segment,
    ) -> Result<(f64, Vec<SpeechSegment>), Error> {
        if source.media_type == MediaType::Image {
            return Ok((0.0, Vec::new()));
        }
        let path = self.registry.resolve(source.handle)?;
        let info = komposer_media::probe(&path, &self.config.metadata_root, self.config.process_timeout)?;
        let duration = info.duration;
        let speech_segments = self
            .speech_analyzer
            .detect_speech_in_range(&path, 0.0, duration, false)
            .map_err(|e| Error::PlanningInfeasibility {
                segment_id: segment.segment_id.clone(),
                reason: e.to_string(),
            })?;
        Ok((duration, speech_segments))
    }

    fn select_strategy(
        &self,
        segment: &Segment,
        duration: f64,
        time_slot: f64,
        speech_segments: &[SpeechSegment],
    ) -> Result<Strategy, Error> {
        let infeasible = |reason: String| Error::PlanningInfeasibility {
            segment_id: segment.segment_id.clone(),
            reason,
        };

        let has_clear_speech = speech_segments.iter().any(|s| s.quality == Quality::Clear);
        if !has_clear_speech {
            let factor = if duration > 0.0 { time_slot / duration } else { 1.0 };
            return Strategy::time_stretch(factor, false).map_err(|e| infeasible(e.to_string()));
        }

        let (cut_start, cut_end) = best_cut_range(speech_segments, duration, time_slot);
        let cut_duration = cut_end - cut_start;

        if (cut_duration - time_slot).abs() <= 1e-6 {
            return Strategy::smart_cut(cut_start, cut_end, time_slot, FitStrategy::Center)
                .map_err(|e| infeasible(e.to_string()));
        }

        match segment.fit_strategy_hint {
            Some(FitStrategy::MinimalStretch) => {
                let residual = if cut_duration > 0.0 {
                    time_slot / cut_duration
                } else {
                    1.0
                };
                if (residual - 1.0).abs() <= RESIDUAL_STRETCH_EPSILON {
                    Strategy::hybrid(cut_start, cut_end, residual).map_err(|e| infeasible(e.to_string()))
                } else {
                    Strategy::smart_cut(cut_start, cut_end, time_slot, FitStrategy::Center)
                        .map_err(|e| infeasible(e.to_string()))
                }
            }
            Some(hint) => Strategy::smart_cut(cut_start, cut_end, time_slot, hint)
                .map_err(|e| infeasible(e.to_string())),
            None => Strategy::smart_cut(cut_start, cut_end, time_slot, FitStrategy::Center)
                .map_err(|e| infeasible(e.to_string())),
        }
    }

    fn plan_segment(
        &self,
        segment: &Segment,
        source: &Source,
        time_slot: f64,
        timeline_cursor: f64,
        steps: &mut Vec<PlanStep>,
        overlays: &mut Vec<AudioOverlay>,
    ) -> Result<usize, Error> {
        if source.media_type == MediaType::Image {
            let index = push_step(
                steps,
                "image_to_video",
                Some(segment.segment_id.clone()),
                None,
                source.handle.to_string(),
                INTERMEDIATE_EXTENSION,
                params([("duration", time_slot.to_string())]),
            );
            let resize_index = push_resize_step(steps, segment, self.config);
            return Ok(resize_index);
        }

        let (duration, speech_segments) = self.analyze_source(source, segment)?;
        let strategy = self.select_strategy(segment, duration, time_slot, &speech_segments)?;

        let (trim_start, trim_duration) = match strategy.source_range() {
            Some((start, end)) => (start, end - start),
            None => (0.0, duration),
        };

        let trim_index = push_step(
            steps,
            "trim",
            Some(segment.segment_id.clone()),
            Some(strategy),
            source.handle.to_string(),
            INTERMEDIATE_EXTENSION,
            params([
                ("start", trim_start.to_string()),
                ("duration", trim_duration.to_string()),
            ]),
        );

        let mut last_index = push_resize_step(steps, segment, self.config);

        if let Strategy::TimeStretch { factor } = strategy {
            last_index = push_step(
                steps,
                "time_stretch",
                Some(segment.segment_id.clone()),
                Some(strategy),
                "CHAIN".to_string(),
                INTERMEDIATE_EXTENSION,
                params([("factor", factor.to_string())]),
            );
        } else if let Strategy::Hybrid {
            residual_stretch_factor,
            ..
        } = strategy
        {
            last_index = push_step(
                steps,
                "time_stretch",
                Some(segment.segment_id.clone()),
                Some(strategy),
                "CHAIN".to_string(),
                INTERMEDIATE_EXTENSION,
                params([("factor", residual_stretch_factor.to_string())]),
            );
        } else if let Strategy::SmartCut { fit_strategy, .. } = strategy {
            let remainder = time_slot - trim_duration;
            if remainder > 1e-6 {
                let (pad_before, pad_after) = match fit_strategy {
                    FitStrategy::Left => (0.0, remainder),
                    FitStrategy::Right => (remainder, 0.0),
                    FitStrategy::Center | FitStrategy::MinimalStretch => {
                        (remainder / 2.0, remainder / 2.0)
                    }
                };
                last_index = push_step(
                    steps,
                    "pad_to_duration",
                    Some(segment.segment_id.clone()),
                    Some(strategy),
                    "CHAIN".to_string(),
                    INTERMEDIATE_EXTENSION,
                    params([
                        ("pad_before", pad_before.to_string()),
                        ("pad_after", pad_after.to_string()),
                    ]),
                );
            }
        }

        if !speech_segments.is_empty() {
            if let Some((kept_start, kept_end)) = strategy.source_range() {
                let overlapping: Vec<&SpeechSegment> = speech_segments
                    .iter()
                    .filter(|s| s.intersects(kept_start, kept_end))
                    .collect();
                if !overlapping.is_empty() {
                    let extract_index = push_step(
                        steps,
                        "extract_audio",
                        Some(segment.segment_id.clone()),
                        Some(strategy),
                        "CHAIN".to_string(),
                        SPEECH_EXTENSION,
                        Map::new(),
                    );
                    let fit_offset = strategy_fit_offset(strategy, time_slot, kept_end - kept_start);
                    overlays.push(AudioOverlay {
                        handle: FileHandle::from_raw(0),
                        timeline_start: timeline_cursor + fit_offset,
                        duration: kept_end - kept_start,
                        gain: DEFAULT_OVERLAY_GAIN,
                        produced_by_step: Some(extract_index),
                        segment_id: segment.segment_id.clone(),
                        fade_in: DEFAULT_OVERLAY_FADE,
                        fade_out: DEFAULT_OVERLAY_FADE,
                    });
                    // extract_audio branches off the video chain rather than
                    // replacing it; the segment's own output handle is still
                    // the video chain's last step.
                }
            }
        }

        Ok(last_index)
    }

    fn plan_background(&self, komposition: &Komposition) -> Result<Option<BackgroundTrack>, Error> {
        let Some(spec) = &komposition.background_audio else {
            return Ok(None);
        };
        let source = komposition.source(&spec.source_ref).ok_or_else(|| {
            Error::validation(format!(
                "background_audio references unknown source '{}'",
                spec.source_ref
            ))
        })?;
        let path = self.registry.resolve(source.handle)?;
        let info = komposer_media::probe(&path, &self.config.metadata_root, self.config.process_timeout)?;
        let total = total_slot_seconds(komposition);
        Ok(Some(BackgroundTrack {
            handle: source.handle,
            gain: spec.volume,
            looped: info.duration - spec.start_offset < total,
            start_offset: spec.start_offset,
            fade_in: spec.fade_in,
            fade_out: spec.fade_out,
        }))
    }

    fn append_concatenation(
        &self,
        segment_outputs: &[(String, usize)],
        steps: &mut Vec<PlanStep>,
    ) -> Result<(), Error> {
        if segment_outputs.len() < 2 {
            return Ok(());
        }
        let mut acc_ref = result_ref(segment_outputs[0].1);
        for (_, step_index) in &segment_outputs[1..] {
            let mut p = Map::new();
            p.insert("second_video".to_string(), Value::String(result_ref(*step_index)));
            push_step(
                steps,
                "concatenate_simple",
                None,
                None,
                acc_ref.clone(),
                INTERMEDIATE_EXTENSION,
                p,
            );
            acc_ref = result_ref(steps.len() - 1);
        }
        Ok(())
    }
}

fn push_resize_step(steps: &mut Vec<PlanStep>, segment: &Segment, config: &Config) -> usize {
    push_step(
        steps,
        "resize",
        Some(segment.segment_id.clone()),
        None,
        "CHAIN".to_string(),
        INTERMEDIATE_EXTENSION,
        params([
            ("width", config.output_width.to_string()),
            ("height", config.output_height.to_string()),
        ]),
    )
}

fn push_step(
    steps: &mut Vec<PlanStep>,
    operation: &str,
    segment_id: Option<String>,
    strategy: Option<Strategy>,
    input: String,
    output_extension: &str,
    mut extra_params: Map<String, Value>,
) -> usize {
    extra_params.insert(RESERVED_INPUT_KEY.to_string(), Value::String(input));
    extra_params.insert(
        RESERVED_OUTPUT_EXTENSION_KEY.to_string(),
        Value::String(output_extension.to_string()),
    );
    let index = steps.len();
    steps.push(PlanStep {
        index,
        operation: operation.to_string(),
        segment_id,
        strategy,
        params: extra_params,
    });
    index
}

fn params<const N: usize>(pairs: [(&str, String); N]) -> Map<String, Value> {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert(k.to_string(), Value::String(v));
    }
    map
}

fn result_ref(step_index: usize) -> String {
    format!("RESULT_{}", step_index + 1)
}

fn effective_bpm(komposition: &Komposition, segment: &Segment) -> f64 {
    if let Some(bp) = &komposition.beat_pattern {
        if segment.start_beat >= bp.from_beat && segment.end_beat <= bp.to_beat {
            return bp.master_bpm;
        }
    }
    komposition.bpm
}

fn time_slot_seconds(komposition: &Komposition, segment: &Segment) -> f64 {
    segment.beat_span() * 60.0 / effective_bpm(komposition, segment)
}

fn total_slot_seconds(komposition: &Komposition) -> f64 {
    komposition
        .segments
        .iter()
        .map(|s| time_slot_seconds(komposition, s))
        .sum()
}

/// A komposition's segments must already be ordered by `start_beat` and
/// non-overlapping on the global timeline (spec §3 data-model invariant;
/// overlap is only expressed through an explicit `effects_tree`, never
/// through two timeline segments covering the same beat range).
fn validate_segment_ordering(segments: &[Segment]) -> Result<(), Error> {
    for pair in segments.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        if next.start_beat < prev.end_beat {
            return Err(Error::validation(format!(
                "segment '{}' (start_beat {}) overlaps or precedes segment '{}' \
                 (end_beat {}); segments must be ordered by start_beat and non-overlapping",
                next.segment_id, next.start_beat, prev.segment_id, prev.end_beat
            )));
        }
    }
    Ok(())
}

/// Offset from the slot's own start at which a fitted cut begins, per its
/// `fit_strategy` (spec §4.F step 4).
fn strategy_fit_offset(strategy: Strategy, time_slot: f64, cut_duration: f64) -> f64 {
    let remainder = (time_slot - cut_duration).max(0.0);
    match strategy {
        Strategy::SmartCut { fit_strategy, .. } => match fit_strategy {
            FitStrategy::Left => 0.0,
            FitStrategy::Right => remainder,
            FitStrategy::Center | FitStrategy::MinimalStretch => remainder / 2.0,
        },
        _ => 0.0,
    }
}

/// Selects the contiguous sub-range of `[0, duration]` that maximizes
/// preserved speech subject to `length <= time_slot`, breaking ties by
/// longest range and then by highest average speech quality (spec §4.F
/// step 4). Candidate boundaries are every segment's own `optimal_cut_points`
/// plus the source's own endpoints, so a cut never lands mid-phrase.
fn best_cut_range(speech_segments: &[SpeechSegment], duration: f64, time_slot: f64) -> (f64, f64) {
    let mut candidates: Vec<f64> = vec![0.0, duration];
    for segment in speech_segments {
        for cp in &segment.optimal_cut_points {
            candidates.push(cp.time);
        }
    }
    candidates.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    candidates.dedup_by(|a, b| (*a - *b).abs() < 1e-6);

    let mut best: Option<(f64, f64, f64, f64)> = None; // (start, end, preserved, avg_quality)
    for i in 0..candidates.len() {
        for j in (i + 1)..candidates.len() {
            let start = candidates[i];
            let end = candidates[j];
            let span = end - start;
            if span <= 0.0 || span > time_slot + 1e-9 {
                continue;
            }
            let preserved = preserved_speech(speech_segments, start, end);
            let avg_quality = avg_quality_rank(speech_segments, start, end);
            let candidate = (start, end, preserved, avg_quality);
            best = Some(match best {
                None => candidate,
                Some(current) => {
                    if preserved > current.2 + 1e-9 {
                        candidate
                    } else if preserved < current.2 - 1e-9 {
                        current
                    } else if span > (current.1 - current.0) + 1e-9 {
                        candidate
                    } else if span < (current.1 - current.0) - 1e-9 {
                        current
                    } else if avg_quality > current.3 {
                        candidate
                    } else {
                        current
                    }
                }
            });
        }
    }

    best.map(|(start, end, _, _)| (start, end))
        .unwrap_or((0.0, duration))
}

fn preserved_speech(speech_segments: &[SpeechSegment], start: f64, end: f64) -> f64 {
    speech_segments
        .iter()
        .map(|s| overlap(s.start, s.end, start, end))
        .sum()
}

fn overlap(a_start: f64, a_end: f64, b_start: f64, b_end: f64) -> f64 {
    (a_end.min(b_end) - a_start.max(b_start)).max(0.0)
}

fn avg_quality_rank(speech_segments: &[SpeechSegment], start: f64, end: f64) -> f64 {
    let overlapping: Vec<&SpeechSegment> = speech_segments
        .iter()
        .filter(|s| s.intersects(start, end))
        .collect();
    if overlapping.is_empty() {
        return 0.0;
    }
    let sum: u32 = overlapping
        .iter()
        .map(|s| match s.quality {
            Quality::Poor => 0,
            Quality::Moderate => 1,
            Quality::Clear => 2,
        })
        .sum();
    f64::from(sum) / overlapping.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use komposer_core::{CutPointKind, OptimalCutPoint, Priority};

    fn speech(start: f64, end: f64, quality: Quality) -> SpeechSegment {
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
    fn best_cut_range_respects_time_slot_ceiling() {
        let segments = vec![speech(1.0, 4.0, Quality::Clear), speech(6.0, 9.0, Quality::Clear)];
        let (start, end) = best_cut_range(&segments, 10.0, 4.0);
        assert!(end - start <= 4.0 + 1e-9);
        // the 1.0..4.0 segment alone preserves 3s within a 4s ceiling; the
        // chosen range must at least match that.
        assert!(preserved_speech(&segments, start, end) >= 3.0 - 1e-9);
    }

    #[test]
    fn best_cut_range_falls_back_without_speech() {
        // No speech segments means no interior cut points; the only
        // candidate range is the source's own span, even though it
        // overruns the slot (the caller surfaces that as infeasible
        // rather than receiving a synthetic time-slot-sized endpoint).
        let (start, end) = best_cut_range(&[], 10.0, 4.0);
        assert_eq!((start, end), (0.0, 10.0));
    }

    #[test]
    fn fit_offset_centers_by_default() {
        let strategy = Strategy::smart_cut(0.0, 2.0, 4.0, FitStrategy::Center).unwrap();
        assert!((strategy_fit_offset(strategy, 4.0, 2.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn fit_offset_left_anchors_to_slot_start() {
        let strategy = Strategy::smart_cut(0.0, 2.0, 4.0, FitStrategy::Left).unwrap();
        assert_eq!(strategy_fit_offset(strategy, 4.0, 2.0), 0.0);
    }

    fn segment(id: &str, start_beat: f64, end_beat: f64) -> Segment {
        Segment {
            segment_id: id.to_string(),
            source_ref: "src".to_string(),
            start_beat,
            end_beat,
            source_timing: komposer_core::SourceTiming::OriginalStartDuration,
            fit_strategy_hint: None,
        }
    }

    #[test]
    fn ordering_accepts_contiguous_and_gapped_segments() {
        let contiguous = vec![segment("a", 0.0, 4.0), segment("b", 4.0, 8.0)];
        assert!(validate_segment_ordering(&contiguous).is_ok());

        let gapped = vec![segment("a", 0.0, 4.0), segment("b", 6.0, 8.0)];
        assert!(validate_segment_ordering(&gapped).is_ok());
    }

    #[test]
    fn ordering_rejects_overlap_and_out_of_order_segments() {
        let overlapping = vec![segment("a", 0.0, 4.0), segment("b", 2.0, 8.0)];
        assert!(validate_segment_ordering(&overlapping).is_err());

        let out_of_order = vec![segment("a", 4.0, 8.0), segment("b", 0.0, 4.0)];
        assert!(validate_segment_ordering(&out_of_order).is_err());
    }
}
