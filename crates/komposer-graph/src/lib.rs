//! Effects Tree Evaluator: post-order evaluation of a
//! [`komposer_core::EffectsTree`] into a sequence of
//! [`komposer_ops::Executor`] invocations (spec §4.H).
//!
//! Evaluation order is the tree's own post-order (inputs before consumers),
//! reusing the arena walk `komposer_core::EffectsTree::post_order_from`
//! already performs — this crate only adds the "what each node type means
//! as an Executor call" mapping on top of that fixed walk order.

use komposer_core::{EffectId, EffectNode, EffectType, EffectsTree, Error, FileHandle};
use komposer_ops::Executor;
use std::collections::HashMap;

/// Evaluates an [`EffectsTree`] against a set of already-rendered segment
/// outputs, producing one [`FileHandle`] per node visited.
pub struct EffectsEvaluator<'a, 'x> {
    executor: &'a mut Executor<'x>,
    seconds_per_beat: f64,
    output_extension: String,
}

impl<'a, 'x> EffectsEvaluator<'a, 'x> {
    /// Builds an evaluator. `bpm` is the komposition's tempo, used to
    /// convert any `_beats`-suffixed parameter to seconds exactly once
    /// (spec §4.H invariant "never double-converted"). `output_extension`
    /// is used for every intermediate artifact this evaluator allocates.
    pub fn new(executor: &'a mut Executor<'x>, bpm: f64, output_extension: impl Into<String>) -> Self {
        EffectsEvaluator {
            executor,
            seconds_per_beat: 60.0 / bpm,
            output_extension: output_extension.into(),
        }
    }

    /// Evaluates every node reachable from `root`, returning the handle
    /// produced by each visited node. The root's own output is
    /// `results[&root]`.
    pub fn evaluate(
        &mut self,
        tree: &EffectsTree,
        root: EffectId,
        segment_outputs: &HashMap<String, FileHandle>,
    ) -> Result<HashMap<EffectId, FileHandle>, Error> {
        let order = tree.post_order_from(root);
        let mut results: HashMap<EffectId, FileHandle> = HashMap::with_capacity(order.len());

        for id in order {
            let node = tree.get(id).ok_or_else(|| {
                Error::validation(format!("effects tree: dangling id {id:?} in post-order walk"))
            })?;
            let handle = self.evaluate_node(node, &results, segment_outputs)?;
            results.insert(id, handle);
        }

        Ok(results)
    }

    fn evaluate_node(
        &mut self,
        node: &EffectNode,
        results: &HashMap<EffectId, FileHandle>,
        segment_outputs: &HashMap<String, FileHandle>,
    ) -> Result<FileHandle, Error> {
        let params = self.seconds_converted_params(node);

        match node.effect_type {
            EffectType::Source => {
                let segment_id = params
                    .get("segment_id")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| {
                        Error::validation("Source effect node missing 'segment_id' param")
                    })?;
                segment_outputs.get(segment_id).copied().ok_or_else(|| {
                    Error::validation(format!(
                        "Source effect node references unknown segment '{segment_id}'"
                    ))
                })
            }
            EffectType::Passthrough => {
                let inputs = self.resolve_inputs(node, results)?;
                inputs
                    .first()
                    .copied()
                    .ok_or_else(|| Error::validation("Passthrough node has no input"))
            }
            EffectType::Concatenate => {
                let inputs = self.resolve_inputs(node, results)?;
                self.fold_pairwise(&inputs, "concatenate_simple", "second_video")
            }
            EffectType::Mix => {
                let inputs = self.resolve_inputs(node, results)?;
                self.fold_pairwise(&inputs, "audio_mix", "second_audio")
            }
            EffectType::TimeStretch => {
                let inputs = self.resolve_inputs(node, results)?;
                let input = *inputs
                    .first()
                    .ok_or_else(|| Error::validation("TimeStretch node has no input"))?;
                let factor = params
                    .get("factor")
                    .and_then(serde_json::Value::as_f64)
                    .ok_or_else(|| Error::validation("TimeStretch node missing 'factor' param"))?;
                let mut op_params = HashMap::new();
                op_params.insert("factor".to_string(), factor.to_string());
                Ok(self
                    .executor
                    .execute("time_stretch", input, &self.output_extension, &op_params)?
                    .output_handle)
            }
            EffectType::Transition => {
                let inputs = self.resolve_inputs(node, results)?;
                if inputs.len() != 2 {
                    return Err(Error::validation(format!(
                        "Transition node requires exactly 2 inputs, got {}",
                        inputs.len()
                    )));
                }
                let operation = match params.get("transition").and_then(|v| v.as_str()) {
                    Some("gradient_wipe") => "gradient_wipe",
                    _ => "crossfade_transition",
                };
                let duration = params
                    .get("duration")
                    .and_then(serde_json::Value::as_f64)
                    .ok_or_else(|| Error::validation("Transition node missing 'duration' param"))?;
                let offset = params
                    .get("offset")
                    .and_then(serde_json::Value::as_f64)
                    .unwrap_or(0.0);

                let mut op_params = HashMap::new();
                op_params.insert("duration".to_string(), duration.to_string());
                op_params.insert("offset".to_string(), offset.to_string());
                op_params.insert("second_video".to_string(), inputs[1].to_string());
                Ok(self
                    .executor
                    .execute(operation, inputs[0], &self.output_extension, &op_params)?
                    .output_handle)
            }
            EffectType::OpacityTransition => {
                let inputs = self.resolve_inputs(node, results)?;
                let input = *inputs
                    .first()
                    .ok_or_else(|| Error::validation("OpacityTransition node has no input"))?;
                let opacity_start = params
                    .get("opacity_start")
                    .and_then(|v| v.as_str().map(str::to_string).or_else(|| v.as_f64().map(|f| f.to_string())))
                    .ok_or_else(|| {
                        Error::validation("OpacityTransition node missing 'opacity_start' param")
                    })?;
                let opacity_end = params
                    .get("opacity_end")
                    .and_then(|v| v.as_str().map(str::to_string).or_else(|| v.as_f64().map(|f| f.to_string())))
                    .ok_or_else(|| {
                        Error::validation("OpacityTransition node missing 'opacity_end' param")
                    })?;
                let duration = params
                    .get("duration")
                    .and_then(serde_json::Value::as_f64)
                    .ok_or_else(|| {
                        Error::validation("OpacityTransition node missing 'duration' param")
                    })?;

                let mut op_params = HashMap::new();
                op_params.insert("opacity_start".to_string(), opacity_start);
                op_params.insert("opacity_end".to_string(), opacity_end);
                op_params.insert("duration".to_string(), duration.to_string());
                Ok(self
                    .executor
                    .execute("opacity_transition", input, &self.output_extension, &op_params)?
                    .output_handle)
            }
        }
    }

    fn resolve_inputs(
        &self,
        node: &EffectNode,
        results: &HashMap<EffectId, FileHandle>,
    ) -> Result<Vec<FileHandle>, Error> {
        node.inputs
            .iter()
            .map(|id| {
                results.get(id).copied().ok_or_else(|| {
                    Error::validation(format!(
                        "effects tree: input {id:?} evaluated after its consumer"
                    ))
                })
            })
            .collect()
    }

    /// Left-folds `inputs` through a two-input operation, chaining each
    /// intermediate result as the next call's primary input.
    fn fold_pairwise(
        &mut self,
        inputs: &[FileHandle],
        operation: &str,
        second_param: &str,
    ) -> Result<FileHandle, Error> {
        let mut acc = *inputs
            .first()
            .ok_or_else(|| Error::validation(format!("{operation} node has no inputs")))?;
        for next in &inputs[1..] {
            let mut params = HashMap::new();
            params.insert(second_param.to_string(), next.to_string());
            acc = self
                .executor
                .execute(operation, acc, &self.output_extension, &params)?
                .output_handle;
        }
        Ok(acc)
    }

    /// Converts every `_beats`-suffixed key in `node.params` to its
    /// seconds-suffixed counterpart (spec §4.H: beats -> seconds exactly
    /// once, at evaluation time). Keys without the suffix pass through
    /// unchanged.
    fn seconds_converted_params(
        &self,
        node: &EffectNode,
    ) -> serde_json::Map<String, serde_json::Value> {
        let mut converted = serde_json::Map::with_capacity(node.params.len());
        for (key, value) in &node.params {
            if let Some(base) = key.strip_suffix("_beats") {
                if let Some(beats) = value.as_f64() {
                    let seconds = beats * self.seconds_per_beat;
                    converted.insert(
                        base.to_string(),
                        serde_json::Number::from_f64(seconds)
                            .map(serde_json::Value::Number)
                            .unwrap_or(serde_json::Value::Null),
                    );
                    continue;
                }
            }
            converted.insert(key.clone(), value.clone());
        }
        converted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn beats_suffix_converts_exactly_once() {
        let executor_stub_bpm = 120.0; // seconds_per_beat = 0.5
        let mut node_params = serde_json::Map::new();
        node_params.insert("duration_beats".to_string(), json!(2.0));
        node_params.insert("transition".to_string(), json!("crossfade_transition"));
        let node = EffectNode {
            id: EffectId::new(0),
            effect_type: EffectType::Transition,
            inputs: vec![],
            params: node_params,
        };

        // Build a throwaway evaluator just to exercise the pure conversion
        // helper; we cannot construct a real Executor without a registry in
        // a unit test, so this only checks the beats->seconds arithmetic.
        let seconds_per_beat = 60.0 / executor_stub_bpm;
        let converted_duration = node
            .params
            .get("duration_beats")
            .and_then(|v| v.as_f64())
            .map(|b| b * seconds_per_beat);
        assert_eq!(converted_duration, Some(1.0));
    }

    #[test]
    fn passthrough_requires_one_resolved_input() {
        let source = EffectId::new(0);
        let node = EffectNode {
            id: EffectId::new(1),
            effect_type: EffectType::Passthrough,
            inputs: vec![source],
            params: serde_json::Map::new(),
        };
        let mut results = HashMap::new();
        results.insert(source, FileHandle::from_raw(0x1));
        let resolved: Vec<FileHandle> = node
            .inputs
            .iter()
            .map(|id| *results.get(id).unwrap())
            .collect();
        assert_eq!(resolved, vec![FileHandle::from_raw(0x1)]);
    }
}
