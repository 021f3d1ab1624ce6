//! `get_available_operations`, `process_file`, `batch_process` (spec §6).

use super::common::{parse_params, respond};
use clap::Args;
use komposer_config::Config;
use komposer_core::Error;
use komposer_ops::{catalog, BatchStep, Executor, ParamType};
use komposer_registry::Registry;
use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;

/// Run a single catalog operation against one input file.
#[derive(Args)]
pub struct ProcessFileArgs {
    /// Handle of the file to operate on.
    pub input_file_id: String,
    /// Operation name from the catalog.
    pub operation: String,
    /// Requested output extension (without the leading dot).
    pub output_extension: String,
    /// Whitespace-separated `k=v` parameter string, e.g. `"width=1280 height=720"`.
    #[arg(default_value = "")]
    pub params: String,
}

/// Run a chained sequence of catalog operations.
#[derive(Args)]
pub struct BatchProcessArgs {
    /// Path to a JSON file holding the array of
    /// `{input_file_id, operation, output_extension, params}` steps.
    pub operations: PathBuf,
}

fn param_type_description(ty: ParamType) -> String {
    match ty {
        ParamType::Duration => "duration in seconds".to_string(),
        ParamType::Integer => "non-negative integer".to_string(),
        ParamType::FileHandle => "file handle (file_<8hex>)".to_string(),
        ParamType::Enum(values) => format!("one of {values:?}"),
        ParamType::FreeString => "string".to_string(),
    }
}

/// `get_available_operations() → { operations: [{name, params, description}] }`.
pub fn available_operations() {
    let operations: Vec<serde_json::Value> = catalog::CATALOG
        .iter()
        .map(|spec| {
            let params: Vec<serde_json::Value> = spec
                .params
                .iter()
                .map(|p| {
                    json!({
                        "name": p.name,
                        "type": param_type_description(p.ty),
                        "required": p.required,
                    })
                })
                .collect();
            json!({
                "name": spec.name,
                "description": spec.description,
                "params": params,
            })
        })
        .collect();
    super::common::emit_ok(json!({ "operations": operations }));
}

/// `process_file(input_file_id, operation, output_extension, params) →
/// { success, output_file_id, message }`.
pub fn process_file(config: &Config, args: ProcessFileArgs) {
    respond(process_file_inner(config, &args));
}

fn process_file_inner(config: &Config, args: &ProcessFileArgs) -> Result<serde_json::Value, Error> {
    let mut registry = Registry::new(config.clone());
    registry.list_source_files()?;
    registry.list_generated_files()?;

    let input = args
        .input_file_id
        .parse()
        .map_err(|_| Error::validation(format!("'{}' is not a valid file handle", args.input_file_id)))?;
    let params = parse_params(&args.params)?;

    let mut executor = Executor::new(&mut registry, config);
    let result = executor.execute(&args.operation, input, &args.output_extension, &params)?;

    Ok(json!({
        "output_file_id": result.output_handle.to_string(),
        "message": format!("'{}' completed", args.operation),
    }))
}

/// A single `batch_process` step as it appears in the JSON operations file.
#[derive(serde::Deserialize)]
struct WireBatchStep {
    input_file_id: String,
    operation: String,
    output_extension: String,
    #[serde(default)]
    params: HashMap<String, String>,
}

/// `batch_process(operations) → { success, final_output, step_outputs }`.
///
/// Unlike every other command, a failing batch still has a `step_outputs`
/// field in its envelope (spec §7: "partial products ... are returned so
/// the caller can inspect"), so this builds its own envelope rather than
/// going through [`respond`].
pub fn batch_process(config: &Config, args: BatchProcessArgs) {
    let body = match load_and_run_batch(config, &args) {
        Ok(body) => {
            let mut map = match body {
                serde_json::Value::Object(map) => map,
                _ => unreachable!("load_and_run_batch always returns an object"),
            };
            map.insert("success".to_string(), serde_json::Value::Bool(true));
            serde_json::Value::Object(map)
        }
        Err(body) => body,
    };
    println!("{body}");
}

/// Returns `Ok(success body without "success")` or `Err(complete failure
/// envelope)`.
fn load_and_run_batch(
    config: &Config,
    args: &BatchProcessArgs,
) -> Result<serde_json::Value, serde_json::Value> {
    let load = || -> Result<Vec<BatchStep>, Error> {
        let raw = std::fs::read_to_string(&args.operations)?;
        let wire_steps: Vec<WireBatchStep> = serde_json::from_str(&raw)?;
        let steps: Vec<BatchStep> = wire_steps
            .into_iter()
            .map(|s| BatchStep {
                input_file_id: s.input_file_id,
                operation: s.operation,
                output_extension: s.output_extension,
                params: s.params,
            })
            .collect();
        if steps.is_empty() {
            return Err(Error::validation("batch_process requires at least one operation"));
        }
        Ok(steps)
    };

    let steps = load().map_err(|e| failure_envelope(&e, None, &[]))?;

    let mut registry = Registry::new(config.clone());
    registry
        .list_source_files()
        .and_then(|_| registry.list_generated_files())
        .map_err(Error::from)
        .map_err(|e| failure_envelope(&e, None, &[]))?;

    let mut executor = Executor::new(&mut registry, config);
    match executor.execute_batch(steps) {
        Ok(result) => Ok(json!({
            "final_output": result.final_output.to_string(),
            "step_outputs": result.step_outputs.iter().map(ToString::to_string).collect::<Vec<_>>(),
        })),
        Err(failure) => Err(failure_envelope(
            &failure.error,
            Some(failure.failed_step),
            &failure.step_outputs,
        )),
    }
}

fn failure_envelope(
    error: &Error,
    failed_step: Option<usize>,
    step_outputs: &[komposer_core::FileHandle],
) -> serde_json::Value {
    json!({
        "success": false,
        "error_kind": error.kind(),
        "message": error.to_string(),
        "failed_step": failed_step,
        "step_outputs": step_outputs.iter().map(ToString::to_string).collect::<Vec<_>>(),
    })
}
