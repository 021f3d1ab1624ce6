//! `process_komposition_file`, `process_composition_plan`,
//! `process_transition_effects_komposition` (spec §6).

use super::common::respond;
use clap::Args;
use komposer_config::Config;
use komposer_core::{BuildPlan, Error};
use komposer_compose::{parse_and_resolve, Planner, Processor};
use komposer_registry::Registry;
use serde_json::json;
use std::path::PathBuf;

/// Plan and render a komposition document into a final artifact.
#[derive(Args)]
pub struct ProcessKompositionFileArgs {
    /// Path to the komposition JSON document.
    pub komposition_file: PathBuf,
}

/// Render an already-built composition plan.
#[derive(Args)]
pub struct ProcessCompositionPlanArgs {
    /// Path to a JSON-serialized `BuildPlan`, as returned by a prior
    /// `process_komposition_file`'s `manifest` field.
    pub plan_file: PathBuf,
}

/// Plan and render a komposition document, reporting only the final handle.
#[derive(Args)]
pub struct ProcessTransitionEffectsArgs {
    pub komposition_file: PathBuf,
}

/// `process_komposition_file(path) → { final_output, step_outputs, audio_timing }`.
pub fn process_komposition_file(config: &Config, args: ProcessKompositionFileArgs) {
    respond(process_komposition_file_inner(config, &args));
}

fn process_komposition_file_inner(
    config: &Config,
    args: &ProcessKompositionFileArgs,
) -> Result<serde_json::Value, Error> {
    let raw = std::fs::read_to_string(&args.komposition_file)?;
    let mut registry = Registry::new(config.clone());
    registry.list_source_files()?;
    registry.list_generated_files()?;

    let komposition = parse_and_resolve(&raw, &mut registry)?;
    let plan = Planner::new(&mut registry, config).plan(&komposition)?;
    let outcome = Processor::new(&mut registry, config).process(plan)?;

    Ok(json!({
        "final_output": outcome.final_handle.to_string(),
        "step_outputs": outcome.step_outputs.iter().map(ToString::to_string).collect::<Vec<_>>(),
        "audio_timing": outcome.audio_timing,
    }))
}

/// `process_composition_plan(plan_file) → { final_output, step_outputs, audio_timing }`.
pub fn process_composition_plan(config: &Config, args: ProcessCompositionPlanArgs) {
    respond(process_composition_plan_inner(config, &args));
}

fn process_composition_plan_inner(
    config: &Config,
    args: &ProcessCompositionPlanArgs,
) -> Result<serde_json::Value, Error> {
    let raw = std::fs::read_to_string(&args.plan_file)?;
    let plan: BuildPlan = serde_json::from_str(&raw)?;

    let mut registry = Registry::new(config.clone());
    registry.list_source_files()?;
    registry.list_generated_files()?;

    let outcome = Processor::new(&mut registry, config).process(plan)?;

    Ok(json!({
        "final_output": outcome.final_handle.to_string(),
        "step_outputs": outcome.step_outputs.iter().map(ToString::to_string).collect::<Vec<_>>(),
        "audio_timing": outcome.audio_timing,
    }))
}

/// `process_transition_effects_komposition(path) → { final_output }`.
///
/// Identical pipeline to `process_komposition_file`; the only documents
/// this entry point is meant for are ones that carry an `effects_tree`
/// (spec §4.H), but the Planner/Processor pair handles both uniformly so
/// there is no separate code path to maintain.
pub fn process_transition_effects_komposition(
    config: &Config,
    args: ProcessTransitionEffectsArgs,
) {
    respond(process_transition_effects_komposition_inner(config, &args));
}

fn process_transition_effects_komposition_inner(
    config: &Config,
    args: &ProcessTransitionEffectsArgs,
) -> Result<serde_json::Value, Error> {
    let raw = std::fs::read_to_string(&args.komposition_file)?;
    let mut registry = Registry::new(config.clone());
    registry.list_source_files()?;
    registry.list_generated_files()?;

    let komposition = parse_and_resolve(&raw, &mut registry)?;
    let plan = Planner::new(&mut registry, config).plan(&komposition)?;
    let outcome = Processor::new(&mut registry, config).process(plan)?;

    Ok(json!({ "final_output": outcome.final_handle.to_string() }))
}
