//! Composition Processor: drives a [`BuildPlan`] through the Executor (and,
//! when present, the Effects Tree Evaluator), then renders the final audio
//! mix onto the concatenated video (spec §4.F step 7, §4.G).

use crate::planner::{RESERVED_INPUT_KEY, RESERVED_OUTPUT_EXTENSION_KEY};
use komposer_config::Config;
use komposer_core::{
    AudioOverlay, AudioTimingManifest, BackgroundTrack, BuildPlan, Error, FileHandle, HandleClass,
    PlanStep,
};
use komposer_graph::EffectsEvaluator;
use komposer_ops::{BatchStep, Executor};
use komposer_registry::Registry;
use std::collections::HashMap;

const FINAL_VIDEO_EXTENSION: &str = "mp4";
const MIXDOWN_EXTENSION: &str = "wav";
const SAMPLE_RATE: u32 = 48_000;

/// The outcome of a successful [`Processor::process`] call.
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    /// Handle to the finished, audio-replaced artifact.
    pub final_handle: FileHandle,
    /// The audio timing manifest with every overlay's handle resolved and
    /// `produced_by_step` cleared.
    pub audio_timing: AudioTimingManifest,
    /// Output handle of each plan step, in plan order, for progress
    /// reporting (spec §4.G "progress is observable").
    pub step_outputs: Vec<FileHandle>,
}

/// Executes a [`BuildPlan`] end to end.
pub struct Processor<'a> {
    registry: &'a mut Registry,
    config: &'a Config,
}

impl<'a> Processor<'a> {
    /// Builds a processor over a registry and the active configuration.
    pub fn new(registry: &'a mut Registry, config: &'a Config) -> Self {
        Processor { registry, config }
    }

    /// Runs every step of `plan`, evaluates its effects tree if it has one,
    /// and replaces the result's audio with the planned background/overlay
    /// mix (spec §4.F step 7).
    pub fn process(&mut self, plan: BuildPlan) -> Result<ProcessOutcome, Error> {
        let BuildPlan {
            steps,
            audio_timing,
            segment_outputs,
            effects_tree,
            bpm,
        } = plan;

        let batch_steps = steps
            .iter()
            .map(to_batch_step)
            .collect::<Result<Vec<_>, Error>>()?;

        let batch_result = {
            let mut executor = Executor::new(self.registry, self.config);
            executor.execute_batch(batch_steps)
        }
        .map_err(|failure| {
            tracing::error!(
                step = failure.failed_step,
                operation = %failure.operation,
                "composition batch step failed"
            );
            failure.error
        })?;

        let segment_map: HashMap<String, FileHandle> = segment_outputs
            .into_iter()
            .map(|(segment_id, step_index)| (segment_id, batch_result.step_outputs[step_index]))
            .collect();

        let pre_audio_handle = match &effects_tree {
            Some(tree) => {
                let root = tree
                    .root()
                    .ok_or_else(|| Error::validation("effects_tree is present but empty"))?;
                let mut executor = Executor::new(self.registry, self.config);
                let mut evaluator = EffectsEvaluator::new(&mut executor, bpm, FINAL_VIDEO_EXTENSION);
                let results = evaluator.evaluate(tree, root, &segment_map)?;
                *results
                    .get(&root)
                    .ok_or_else(|| Error::validation("effects tree evaluation produced no root output"))?
            }
            None => batch_result.final_output,
        };

        let resolved_overlays: Vec<AudioOverlay> = audio_timing
            .overlays
            .into_iter()
            .map(|overlay| resolve_overlay(overlay, &batch_result.step_outputs))
            .collect::<Result<_, _>>()?;

        let total_duration = resolved_overlays
            .iter()
            .map(|o| o.timeline_start + o.duration)
            .fold(0.0_f64, f64::max)
            .max(probe_duration(self.registry, self.config, pre_audio_handle)?);

        let mixdown_handle = self.render_audio_timing(
            audio_timing.background.as_ref(),
            &resolved_overlays,
            total_duration,
        )?;

        let final_handle = {
            let mut executor = Executor::new(self.registry, self.config);
            let mut params = HashMap::new();
            params.insert("audio_file".to_string(), mixdown_handle.to_string());
            executor
                .execute(
                    "replace_audio",
                    pre_audio_handle,
                    FINAL_VIDEO_EXTENSION,
                    &params,
                )?
                .output_handle
        };

        Ok(ProcessOutcome {
            final_handle,
            audio_timing: AudioTimingManifest {
                overlays: resolved_overlays,
                background: audio_timing.background,
            },
            step_outputs: batch_result.step_outputs,
        })
    }

    /// Builds a silent bed (or the planned background track), mixes in every
    /// resolved overlay at its own timeline offset, and returns a fresh
    /// audio-only handle holding the result (spec §4.F step 7's mix ratios
    /// and fade defaults).
    fn render_audio_timing(
        &mut self,
        background: Option<&BackgroundTrack>,
        overlays: &[AudioOverlay],
        total_duration: f64,
    ) -> Result<FileHandle, Error> {
        let mut argv = vec!["-y".to_string()];
        let mut labels = Vec::with_capacity(1 + overlays.len());

        match background {
            Some(track) => {
                let path = self.registry.resolve(track.handle)?;
                argv.push("-i".to_string());
                argv.push(path.to_string_lossy().into_owned());
                labels.push(background_filter(0, track, total_duration));
            }
            None => {
                argv.push("-f".to_string());
                argv.push("lavfi".to_string());
                argv.push("-i".to_string());
                argv.push(format!(
                    "anullsrc=channel_layout=stereo:sample_rate={SAMPLE_RATE}:d={total_duration}"
                ));
                labels.push("[0:a]asetpts=PTS-STARTPTS[mix0]".to_string());
            }
        }

        for (i, overlay) in overlays.iter().enumerate() {
            let input_index = i + 1;
            let path = self.registry.resolve(overlay.handle)?;
            argv.push("-i".to_string());
            argv.push(path.to_string_lossy().into_owned());
            labels.push(overlay_filter(input_index, overlay));
        }

        let mix_inputs: String = (0..labels.len()).map(|i| format!("[mix{i}]")).collect();
        let filter_complex = format!(
            "{};{}amix=inputs={}:duration=longest:normalize=0[outa]",
            labels.join(";"),
            mix_inputs,
            labels.len()
        );

        argv.push("-filter_complex".to_string());
        argv.push(filter_complex);
        argv.push("-map".to_string());
        argv.push("[outa]".to_string());
        argv.push("-ar".to_string());
        argv.push(SAMPLE_RATE.to_string());

        let (output_handle, output_path) = self
            .registry
            .allocate_output(MIXDOWN_EXTENSION, HandleClass::Generated);
        argv.push(output_path.to_string_lossy().into_owned());

        let timeout = self.config.process_timeout;
        let run = komposer_media::run_with_timeout("ffmpeg", &argv, timeout)?;
        if run.timed_out {
            let _ = std::fs::remove_file(&output_path);
            return Err(Error::Timeout {
                operation: "audio_timing_mixdown".to_string(),
                elapsed_secs: timeout.as_secs(),
            });
        }
        if !run.success() {
            let _ = std::fs::remove_file(&output_path);
            return Err(Error::ToolFailure {
                operation: "audio_timing_mixdown".to_string(),
                exit_code: run.exit_code,
                stderr_tail: run.stderr_tail(4096),
            });
        }

        Ok(output_handle)
    }
}

fn to_batch_step(step: &PlanStep) -> Result<BatchStep, Error> {
    let mut input_file_id = None;
    let mut output_extension = None;
    let mut params = HashMap::with_capacity(step.params.len());

    for (key, value) in &step.params {
        let as_string = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        match key.as_str() {
            RESERVED_INPUT_KEY => input_file_id = Some(as_string),
            RESERVED_OUTPUT_EXTENSION_KEY => output_extension = Some(as_string),
            _ => {
                params.insert(key.clone(), as_string);
            }
        }
    }

    Ok(BatchStep {
        input_file_id: input_file_id.ok_or_else(|| {
            Error::validation(format!(
                "plan step {} is missing its '{RESERVED_INPUT_KEY}' input",
                step.index
            ))
        })?,
        operation: step.operation.clone(),
        output_extension: output_extension.ok_or_else(|| {
            Error::validation(format!(
                "plan step {} is missing its '{RESERVED_OUTPUT_EXTENSION_KEY}' extension",
                step.index
            ))
        })?,
        params,
    })
}

fn resolve_overlay(
    mut overlay: AudioOverlay,
    step_outputs: &[FileHandle],
) -> Result<AudioOverlay, Error> {
    if let Some(step_index) = overlay.produced_by_step {
        overlay.handle = *step_outputs.get(step_index).ok_or_else(|| {
            Error::validation(format!(
                "overlay for segment '{}' references out-of-range step {step_index}",
                overlay.segment_id
            ))
        })?;
        overlay.produced_by_step = None;
    }
    Ok(overlay)
}

fn probe_duration(registry: &Registry, config: &Config, handle: FileHandle) -> Result<f64, Error> {
    let path = registry.resolve(handle)?;
    let info = komposer_media::probe(&path, &config.metadata_root, config.process_timeout)?;
    Ok(info.duration)
}

fn background_filter(input_index: usize, track: &BackgroundTrack, total_duration: f64) -> String {
    let trim = if track.looped {
        format!(
            "aloop=loop=-1:size=2000000000,atrim=start={}:end={}",
            track.start_offset,
            track.start_offset + total_duration
        )
    } else {
        format!(
            "atrim=start={}:end={}",
            track.start_offset,
            track.start_offset + total_duration
        )
    };
    let mut chain = vec![trim, "asetpts=PTS-STARTPTS".to_string(), format!("volume={}", track.gain)];
    chain.extend(fade_stages(track.fade_in, track.fade_out, total_duration));
    format!("[{input_index}:a]{}[mix0]", chain.join(","))
}

fn overlay_filter(input_index: usize, overlay: &AudioOverlay) -> String {
    let delay_ms = (overlay.timeline_start * 1000.0).round() as i64;
    let mut chain = vec![format!("volume={}", overlay.gain)];
    chain.extend(fade_stages(overlay.fade_in, overlay.fade_out, overlay.duration));
    chain.push(format!("adelay={delay_ms}|{delay_ms}"));
    format!("[{input_index}:a]{}[mix{input_index}]", chain.join(","))
}

/// `afade` rejects a zero duration, so fades the planner left at `0.0`
/// (the default for a `background_audio` entry with no `fade_in`/`fade_out`)
/// are simply omitted rather than passed through as no-op filter stages.
fn fade_stages(fade_in: f64, fade_out: f64, clip_duration: f64) -> Vec<String> {
    let mut stages = Vec::new();
    if fade_in > 0.0 {
        stages.push(format!("afade=t=in:st=0:d={fade_in}"));
    }
    if fade_out > 0.0 {
        let fade_out_start = (clip_duration - fade_out).max(0.0);
        stages.push(format!("afade=t=out:st={fade_out_start}:d={fade_out}"));
    }
    stages
}

#[cfg(test)]
mod tests {
    use super::*;
    use komposer_core::BackgroundTrack;
    use serde_json::json;

    fn overlay(start: f64, duration: f64) -> AudioOverlay {
        AudioOverlay {
            handle: FileHandle::from_raw(1),
            timeline_start: start,
            duration,
            gain: 0.9,
            produced_by_step: None,
            segment_id: "seg1".to_string(),
            fade_in: 0.05,
            fade_out: 0.05,
        }
    }

    #[test]
    fn resolve_overlay_substitutes_step_output() {
        let mut ov = overlay(1.0, 2.0);
        ov.handle = FileHandle::from_raw(0);
        ov.produced_by_step = Some(2);
        let step_outputs = vec![
            FileHandle::from_raw(0xA),
            FileHandle::from_raw(0xB),
            FileHandle::from_raw(0xC),
        ];
        let resolved = resolve_overlay(ov, &step_outputs).unwrap();
        assert_eq!(resolved.handle, FileHandle::from_raw(0xC));
        assert!(resolved.produced_by_step.is_none());
    }

    #[test]
    fn resolve_overlay_rejects_out_of_range_step() {
        let mut ov = overlay(0.0, 1.0);
        ov.produced_by_step = Some(9);
        assert!(resolve_overlay(ov, &[FileHandle::from_raw(1)]).is_err());
    }

    #[test]
    fn to_batch_step_strips_reserved_keys() {
        let mut params = serde_json::Map::new();
        params.insert(
            RESERVED_INPUT_KEY.to_string(),
            json!("file_0000000a"),
        );
        params.insert(RESERVED_OUTPUT_EXTENSION_KEY.to_string(), json!("mp4"));
        params.insert("width".to_string(), json!("1920"));
        let step = PlanStep {
            index: 0,
            operation: "resize".to_string(),
            segment_id: Some("seg1".to_string()),
            strategy: None,
            params,
        };
        let batch = to_batch_step(&step).unwrap();
        assert_eq!(batch.input_file_id, "file_0000000a");
        assert_eq!(batch.output_extension, "mp4");
        assert_eq!(batch.params.get("width"), Some(&"1920".to_string()));
        assert!(!batch.params.contains_key(RESERVED_INPUT_KEY));
    }

    #[test]
    fn to_batch_step_rejects_missing_reserved_input() {
        let step = PlanStep {
            index: 0,
            operation: "resize".to_string(),
            segment_id: None,
            strategy: None,
            params: serde_json::Map::new(),
        };
        assert!(to_batch_step(&step).is_err());
    }

    #[test]
    fn background_filter_trims_to_total_duration() {
        let track = BackgroundTrack {
            handle: FileHandle::from_raw(1),
            gain: 0.3,
            looped: false,
            start_offset: 0.0,
            fade_in: 1.0,
            fade_out: 1.0,
        };
        let filter = background_filter(0, &track, 10.0);
        assert!(filter.contains("atrim=start=0:end=10"));
        assert!(filter.contains("volume=0.3"));
    }
}
