//! The Executor: validates, argv-templates, and runs one (or a chained
//! batch of) catalog operations (spec §4.C).

use crate::catalog::{self, ArgToken, OperationSpec, OutputExtensionPolicy, ParamType};
use komposer_config::Config;
use komposer_core::{Error, FileHandle, HandleClass};
use komposer_registry::Registry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The outcome of a single [`Executor::execute`] call.
#[derive(Debug, Clone)]
pub struct ExecuteResult {
    /// Handle to the freshly produced output file.
    pub output_handle: FileHandle,
    /// Last portion of the tool's stderr, for diagnostics.
    pub stderr_tail: String,
}

/// One step of a [`Executor::execute_batch`] invocation, before `CHAIN`/
/// `RESULT_k` substitution.
#[derive(Debug, Clone)]
pub struct BatchStep {
    /// `"CHAIN"`, or a `file_<8hex>` handle string.
    pub input_file_id: String,
    /// Operation name from the catalog.
    pub operation: String,
    /// Requested output extension.
    pub output_extension: String,
    /// Raw parameter values; a value of `"RESULT_<k>"` (1-indexed) is
    /// resolved against a prior step's output before validation.
    pub params: HashMap<String, String>,
}

/// The result of a successful [`Executor::execute_batch`] call.
#[derive(Debug, Clone)]
pub struct BatchResult {
    /// Output handle produced by each step, in order.
    pub step_outputs: Vec<FileHandle>,
    /// The last step's output handle.
    pub final_output: FileHandle,
}

/// Reported when a batch step fails (spec §4.G "error(step_failed(idx,
/// reason))"). Prior outputs are retained and reported, per spec.
#[derive(Debug)]
pub struct BatchFailure {
    /// 0-indexed position of the failing step.
    pub failed_step: usize,
    /// The operation that was running.
    pub operation: String,
    /// The underlying error.
    pub error: Error,
    /// Outputs produced by steps before the failure.
    pub step_outputs: Vec<FileHandle>,
}

/// The only path to the external ffmpeg toolchain.
pub struct Executor<'a> {
    registry: &'a mut Registry,
    config: &'a Config,
}

impl<'a> Executor<'a> {
    /// Builds an executor over a registry and the active configuration.
    pub fn new(registry: &'a mut Registry, config: &'a Config) -> Self {
        Executor { registry, config }
    }

    /// Validates, runs, and returns the result of one catalog operation.
    pub fn execute(
        &mut self,
        operation: &str,
        input: FileHandle,
        output_extension: &str,
        params: &HashMap<String, String>,
    ) -> Result<ExecuteResult, Error> {
        let spec = catalog::find(operation)
            .ok_or_else(|| Error::validation(format!("unknown operation '{operation}'")))?;

        self.validate_params(spec, params)?;
        self.validate_output_extension(spec, output_extension)?;

        let input_path = self.registry.resolve(input)?;

        let mut extra_paths: Vec<(String, PathBuf)> = Vec::with_capacity(spec.extra_inputs.len());
        for name in spec.extra_inputs {
            let raw = &params[*name];
            let handle: FileHandle = raw
                .parse()
                .map_err(|_| Error::validation(format!("'{name}' is not a valid handle")))?;
            extra_paths.push(((*name).to_string(), self.registry.resolve(handle)?));
        }

        let (output_handle, output_path) = self
            .registry
            .allocate_output(output_extension, HandleClass::Generated);

        let argv = self.build_argv(spec, &input_path, &extra_paths, params, &output_path)?;

        let timeout = self.config.process_timeout;
        let run = komposer_media::run_with_timeout("ffmpeg", &argv, timeout)?;

        if run.timed_out {
            let _ = std::fs::remove_file(&output_path);
            return Err(Error::Timeout {
                operation: operation.to_string(),
                elapsed_secs: timeout.as_secs(),
            });
        }
        if !run.success() {
            let _ = std::fs::remove_file(&output_path);
            return Err(Error::ToolFailure {
                operation: operation.to_string(),
                exit_code: run.exit_code,
                stderr_tail: run.stderr_tail(4096),
            });
        }

        if !output_is_usable(&output_path) {
            let _ = std::fs::remove_file(&output_path);
            return Err(Error::ToolFailure {
                operation: operation.to_string(),
                exit_code: run.exit_code,
                stderr_tail: run.stderr_tail(4096),
            });
        }

        Ok(ExecuteResult {
            output_handle,
            stderr_tail: run.stderr_tail(4096),
        })
    }

    /// Runs a chained batch of operations, resolving `CHAIN`/`RESULT_k`
    /// references as it goes. Stops at the first failing step; prior
    /// outputs are retained on disk and reported back.
    pub fn execute_batch(&mut self, steps: Vec<BatchStep>) -> Result<BatchResult, BatchFailure> {
        let mut step_outputs: Vec<FileHandle> = Vec::with_capacity(steps.len());

        for (idx, step) in steps.into_iter().enumerate() {
            let input_handle = match step.input_file_id.as_str() {
                "CHAIN" => match step_outputs.last() {
                    Some(h) => *h,
                    None => {
                        return Err(BatchFailure {
                            failed_step: idx,
                            operation: step.operation,
                            error: Error::validation("CHAIN referenced at step 0, no prior output"),
                            step_outputs,
                        });
                    }
                },
                other if other.starts_with("RESULT_") => {
                    match resolve_result_ref(other, idx, &step_outputs) {
                        Ok(h) => h,
                        Err(e) => {
                            return Err(BatchFailure {
                                failed_step: idx,
                                operation: step.operation,
                                error: e,
                                step_outputs,
                            });
                        }
                    }
                }
                other => match other.parse::<FileHandle>() {
                    Ok(h) => h,
                    Err(_) => {
                        return Err(BatchFailure {
                            failed_step: idx,
                            operation: step.operation,
                            error: Error::validation(format!(
                                "'{other}' is not CHAIN or a valid handle"
                            )),
                            step_outputs,
                        });
                    }
                },
            };

            let resolved_params = match resolve_result_refs(&step.params, idx, &step_outputs) {
                Ok(p) => p,
                Err(e) => {
                    return Err(BatchFailure {
                        failed_step: idx,
                        operation: step.operation,
                        error: e,
                        step_outputs,
                    });
                }
            };

            match self.execute(&step.operation, input_handle, &step.output_extension, &resolved_params) {
                Ok(result) => step_outputs.push(result.output_handle),
                Err(error) => {
                    return Err(BatchFailure {
                        failed_step: idx,
                        operation: step.operation,
                        error,
                        step_outputs,
                    });
                }
            }
        }

        let final_output = *step_outputs
            .last()
            .expect("execute_batch called with no steps");
        Ok(BatchResult {
            step_outputs,
            final_output,
        })
    }

    fn validate_params(
        &self,
        spec: &OperationSpec,
        params: &HashMap<String, String>,
    ) -> Result<(), Error> {
        for decl in spec.params {
            if decl.required && !params.contains_key(decl.name) {
                return Err(Error::validation(format!(
                    "{}: missing required param '{}'",
                    spec.name, decl.name
                )));
            }
        }
        for key in params.keys() {
            if !spec.params.iter().any(|d| d.name == key) {
                return Err(Error::validation(format!(
                    "{}: unknown param '{}'",
                    spec.name, key
                )));
            }
        }
        for decl in spec.params {
            let Some(value) = params.get(decl.name) else {
                continue;
            };
            match decl.ty {
                ParamType::Duration => {
                    let v: f64 = value.parse().map_err(|_| {
                        Error::validation(format!("'{}' must be a duration in seconds", decl.name))
                    })?;
                    if v < 0.0 {
                        return Err(Error::validation(format!("'{}' must be >= 0", decl.name)));
                    }
                }
                ParamType::Integer => {
                    value.parse::<u64>().map_err(|_| {
                        Error::validation(format!("'{}' must be a non-negative integer", decl.name))
                    })?;
                }
                ParamType::FileHandle => {
                    value.parse::<FileHandle>().map_err(|_| {
                        Error::validation(format!("'{}' is not a valid file handle", decl.name))
                    })?;
                }
                ParamType::Enum(allowed) => {
                    if !allowed.contains(&value.as_str()) {
                        return Err(Error::validation(format!(
                            "'{}' must be one of {:?}",
                            decl.name, allowed
                        )));
                    }
                }
                ParamType::FreeString => {}
            }
        }
        Ok(())
    }

    fn validate_output_extension(&self, spec: &OperationSpec, requested: &str) -> Result<(), Error> {
        let ext = requested.trim_start_matches('.').to_lowercase();
        match spec.output_extension_policy {
            OutputExtensionPolicy::Fixed(expected) if ext == expected => Ok(()),
            OutputExtensionPolicy::Fixed(expected) => Err(Error::validation(format!(
                "{} always produces .{expected}, not .{ext}",
                spec.name
            ))),
            OutputExtensionPolicy::CallerChoiceFrom(allowed) if allowed.contains(&ext.as_str()) => {
                Ok(())
            }
            OutputExtensionPolicy::CallerChoiceFrom(allowed) => Err(Error::validation(format!(
                "{}: output extension must be one of {:?}",
                spec.name, allowed
            ))),
        }
    }

    fn build_argv(
        &self,
        spec: &OperationSpec,
        input_path: &Path,
        extra_paths: &[(String, PathBuf)],
        params: &HashMap<String, String>,
        output_path: &Path,
    ) -> Result<Vec<String>, Error> {
        let mut argv = Vec::new();

        for token in spec.pre_input_args {
            argv.push(self.resolve_token(*token, spec, params, input_path, extra_paths)?);
        }

        argv.push("-i".to_string());
        argv.push(input_path.to_string_lossy().into_owned());
        for (_, path) in extra_paths {
            argv.push("-i".to_string());
            argv.push(path.to_string_lossy().into_owned());
        }

        for token in spec.args_template {
            argv.push(self.resolve_token(*token, spec, params, input_path, extra_paths)?);
        }

        argv.push(output_path.to_string_lossy().into_owned());
        Ok(argv)
    }

    fn resolve_token(
        &self,
        token: ArgToken,
        spec: &OperationSpec,
        params: &HashMap<String, String>,
        input_path: &Path,
        extra_paths: &[(String, PathBuf)],
    ) -> Result<String, Error> {
        match token {
            ArgToken::Literal(s) => Ok(s.to_string()),
            ArgToken::Param("scale_filter") => {
                let width = &params["width"];
                let height = &params["height"];
                Ok(format!("scale={width}:{height},setsar=1:1"))
            }
            ArgToken::Param("concat_filter") => self.build_concat_filter(input_path, extra_paths),
            ArgToken::Param("stretch_vf") => {
                let factor: f64 = params["factor"].parse().map_err(|_| {
                    Error::validation("'factor' must be a positive number")
                })?;
                Ok(format!("setpts=PTS/{factor}"))
            }
            ArgToken::Param("stretch_af") => {
                let factor: f64 = params["factor"].parse().map_err(|_| {
                    Error::validation("'factor' must be a positive number")
                })?;
                Ok(format!("atempo={}", atempo_clamped(factor)))
            }
            ArgToken::Param("pad_vf") => {
                let before = &params["pad_before"];
                let after = &params["pad_after"];
                Ok(format!(
                    "tpad=start_duration={before}:start_mode=clone:stop_duration={after}:stop_mode=clone"
                ))
            }
            ArgToken::Param("pad_af") => {
                let before: f64 = params["pad_before"].parse().map_err(|_| {
                    Error::validation("'pad_before' must be a duration in seconds")
                })?;
                let after = &params["pad_after"];
                let before_ms = (before * 1000.0).round() as i64;
                Ok(format!("adelay={before_ms}:all=1,apad=pad_dur={after}"))
            }
            ArgToken::Param("amix_filter") => {
                let gain_a = params.get("gain_a").map(String::as_str).unwrap_or("1.0");
                let gain_b = params.get("gain_b").map(String::as_str).unwrap_or("1.0");
                Ok(format!(
                    "[0:a]volume={gain_a}[a0];[1:a]volume={gain_b}[a1];\
                     [a0][a1]amix=inputs=2:duration=longest:normalize=0[outa]"
                ))
            }
            ArgToken::Param("xfade_filter") => {
                let duration = &params["duration"];
                let offset = &params["offset"];
                let transition = if spec.name == "gradient_wipe" {
                    "wipeleft"
                } else {
                    "fade"
                };
                let (w, h) = (self.config.output_width, self.config.output_height);
                Ok(format!(
                    "[0:v]scale={w}:{h},setsar=1:1[v0];[1:v]scale={w}:{h},setsar=1:1[v1];\
                     [v0][v1]xfade=transition={transition}:duration={duration}:offset={offset}[outv]"
                ))
            }
            ArgToken::Param("opacity_filter") => {
                let start: f64 = params["opacity_start"].parse().map_err(|_| {
                    Error::validation("'opacity_start' must be a number in [0,1]")
                })?;
                let end: f64 = params["opacity_end"].parse().map_err(|_| {
                    Error::validation("'opacity_end' must be a number in [0,1]")
                })?;
                let duration = &params["duration"];
                // Linear alpha ramp from `start` to `end` over `duration`
                // seconds; colorchannelmixer has no per-frame expression
                // input, so the ramp is expressed with geq directly.
                Ok(format!(
                    "format=yuva420p,geq=a='({start}+({end}-{start})*t/{duration})*255':\
                     r='r(X,Y)':g='g(X,Y)':b='b(X,Y)'"
                ))
            }
            ArgToken::Param(name) => params
                .get(name)
                .cloned()
                .ok_or_else(|| Error::validation(format!("missing param '{name}' for argv template"))),
        }
    }

    fn build_concat_filter(
        &self,
        primary_path: &Path,
        extra_paths: &[(String, PathBuf)],
    ) -> Result<String, Error> {
        let metadata_root = &self.config.metadata_root;
        let timeout = self.config.process_timeout;

        let second_path = &extra_paths
            .iter()
            .find(|(name, _)| name == "second_video")
            .ok_or_else(|| Error::validation("concatenate_simple requires 'second_video'"))?
            .1;

        let first_info = komposer_media::probe(primary_path, metadata_root, timeout)?;
        let second_info = komposer_media::probe(second_path, metadata_root, timeout)?;

        let (tw, th) = orientation_target(&first_info, &second_info);

        Ok(format!(
            "[0:v]scale={tw}:{th},setsar=1:1[v0];[1:v]scale={tw}:{th},setsar=1:1[v1];\
             [v0][0:a][v1][1:a]concat=n=2:v=1:a=1[outv][outa]"
        ))
    }
}

/// ffmpeg's `atempo` filter only accepts `[0.5, 2.0]` per instance; clamp
/// rather than chain multiple instances, since every strategy this
/// workspace plans keeps `factor` close to `1.0` (the `Hybrid` strategy's
/// epsilon is `0.10`, and `TimeStretch` factors come from beat-slot-to-
/// source-duration ratios that the planner rejects when wildly out of
/// range).
fn atempo_clamped(factor: f64) -> f64 {
    factor.clamp(0.5, 2.0)
}

/// Orientation-normalization rule (spec §4.C): when one input is portrait
/// and the other landscape, force landscape derived from the first input's
/// longer dimension; otherwise keep the first input's own orientation.
fn orientation_target(a: &komposer_core::MediaInfo, b: &komposer_core::MediaInfo) -> (u32, u32) {
    let (wa, ha) = a.dimensions().unwrap_or((1920, 1080));
    if a.is_portrait() != b.is_portrait() {
        (wa.max(ha), wa.min(ha))
    } else {
        (wa, ha)
    }
}

/// A successful ffmpeg exit is not by itself proof of a usable result
/// (spec §8 property 2: "the output file exists ... and is non-empty").
fn output_is_usable(output_path: &Path) -> bool {
    std::fs::metadata(output_path)
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

/// Resolves a single `RESULT_<k>` token (1-indexed) against the outputs
/// produced so far, rejecting self/forward references (spec §8 property 5).
fn resolve_result_ref(
    value: &str,
    current_step: usize,
    step_outputs: &[FileHandle],
) -> Result<FileHandle, Error> {
    let k: usize = value
        .strip_prefix("RESULT_")
        .expect("caller only passes RESULT_-prefixed values")
        .parse()
        .map_err(|_| Error::validation(format!("malformed RESULT reference '{value}'")))?;
    if k == 0 || k > current_step {
        return Err(Error::validation(format!(
            "RESULT_{k} is a forward or self reference at step {current_step}"
        )));
    }
    Ok(step_outputs[k - 1])
}

fn resolve_result_refs(
    params: &HashMap<String, String>,
    current_step: usize,
    step_outputs: &[FileHandle],
) -> Result<HashMap<String, String>, Error> {
    let mut resolved = HashMap::with_capacity(params.len());
    for (key, value) in params {
        if value.starts_with("RESULT_") {
            let handle = resolve_result_ref(value, current_step, step_outputs)?;
            resolved.insert(key.clone(), handle.to_string());
        } else {
            resolved.insert(key.clone(), value.clone());
        }
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_ref_rejects_forward_reference() {
        let mut params = HashMap::new();
        params.insert("audio_file".to_string(), "RESULT_2".to_string());
        let err = resolve_result_refs(&params, 1, &[FileHandle::from_raw(1)]).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn result_ref_resolves_prior_step() {
        let mut params = HashMap::new();
        params.insert("audio_file".to_string(), "RESULT_1".to_string());
        let outputs = vec![FileHandle::from_raw(0xAB)];
        let resolved = resolve_result_refs(&params, 1, &outputs).unwrap();
        assert_eq!(resolved["audio_file"], outputs[0].to_string());
    }

    #[test]
    fn input_side_result_ref_resolves_prior_step() {
        let outputs = vec![FileHandle::from_raw(0x1), FileHandle::from_raw(0x2)];
        let handle = resolve_result_ref("RESULT_2", 2, &outputs).unwrap();
        assert_eq!(handle, outputs[1]);
    }

    #[test]
    fn input_side_result_ref_rejects_forward_reference() {
        let outputs = vec![FileHandle::from_raw(0x1)];
        let err = resolve_result_ref("RESULT_2", 1, &outputs).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    fn video_stream(w: u32, h: u32) -> komposer_core::StreamInfo {
        komposer_core::StreamInfo {
            codec_type: "video".into(),
            codec_name: "h264".into(),
            width: Some(w),
            height: Some(h),
            framerate: Some(30.0),
            sample_rate: None,
            channels: None,
        }
    }

    fn media(w: u32, h: u32) -> komposer_core::MediaInfo {
        komposer_core::MediaInfo {
            format: "mov,mp4,m4a".into(),
            duration: 1.0,
            streams: vec![video_stream(w, h)],
            cached_at: 0,
        }
    }

    #[test]
    fn orientation_target_forces_landscape_on_mismatch() {
        let portrait = media(1080, 1920);
        let landscape = media(1920, 1080);
        assert_eq!(orientation_target(&portrait, &landscape), (1920, 1080));
        assert_eq!(orientation_target(&landscape, &landscape), (1920, 1080));
    }

    #[test]
    fn output_is_usable_rejects_missing_and_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("never_written.mp4");
        assert!(!output_is_usable(&missing));

        let empty = dir.path().join("zero_bytes.mp4");
        std::fs::write(&empty, b"").unwrap();
        assert!(!output_is_usable(&empty));

        let real = dir.path().join("has_bytes.mp4");
        std::fs::write(&real, b"ftyp").unwrap();
        assert!(output_is_usable(&real));
    }
}
