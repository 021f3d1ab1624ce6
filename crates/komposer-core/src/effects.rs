//! The effects tree: an arena-backed DAG of composition operations (spec §3
//! "EffectNode", §4.H "Effects Tree Evaluator").
//!
//! Nodes are addressed by [`EffectId`], an index into the tree's arena,
//! rather than by pointer — this keeps the structure cycle-safe to build and
//! cheap to clone, matching the node-arena shape used elsewhere in this
//! workspace for DAGs.

use serde::{Deserialize, Serialize};

/// An index into an [`crate::Komposition`]'s effects-tree arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EffectId(pub usize);

impl EffectId {
    /// Builds an id from a raw arena index.
    pub fn new(index: usize) -> Self {
        EffectId(index)
    }

    /// The raw arena index.
    pub fn index(self) -> usize {
        self.0
    }
}

/// One node in the effects tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectNode {
    /// This node's own id within the arena.
    pub id: EffectId,
    /// What this node computes.
    pub effect_type: EffectType,
    /// Ids of the nodes this one consumes, evaluated before it in the
    /// post-order walk.
    pub inputs: Vec<EffectId>,
    /// Resolved parameter values for `effect_type`, keyed by parameter name.
    pub params: serde_json::Map<String, serde_json::Value>,
}

/// The kind of computation an [`EffectNode`] performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectType {
    /// A leaf referencing a beat-range source cut; has no inputs.
    Source,
    /// Forwards its single input unchanged (spec §3 "passthrough").
    Passthrough,
    /// Concatenates its inputs in order along the timeline.
    Concatenate,
    /// Applies a time-stretch factor to its single input.
    TimeStretch,
    /// Cross-fades its exactly-two inputs over a configured duration
    /// (`gradient_wipe` or `crossfade_transition`, selected by the node's
    /// `transition` param).
    Transition,
    /// Fades its single input's opacity from `opacity_start` to
    /// `opacity_end` over `duration` (spec §3 "opacity_transition").
    OpacityTransition,
    /// Mixes its inputs as simultaneous audio layers.
    Mix,
}

impl EffectType {
    /// The exact input count this effect type requires, if fixed.
    /// `Concatenate` and `Mix` accept any count >= 1, so they return `None`.
    pub fn required_inputs(self) -> Option<usize> {
        match self {
            EffectType::Source => Some(0),
            EffectType::Passthrough => Some(1),
            EffectType::TimeStretch => Some(1),
            EffectType::OpacityTransition => Some(1),
            EffectType::Transition => Some(2),
            EffectType::Concatenate | EffectType::Mix => None,
        }
    }
}

/// An arena of [`EffectNode`]s forming a DAG, addressed by [`EffectId`].
///
/// Construction never allows a node to reference an [`EffectId`] greater
/// than or equal to its own id, which makes a cycle structurally
/// unrepresentable: every edge points strictly backward in the arena.
///
/// Deserializes via [`RawEffectsTree`] and [`push`](Self::push) rather than
/// populating `nodes` directly, so a komposition document cannot smuggle a
/// cyclic or wrong-arity tree past validation by constructing the JSON by
/// hand instead of calling the builder.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(try_from = "RawEffectsTree")]
pub struct EffectsTree {
    nodes: Vec<EffectNode>,
}

/// The wire shape of an [`EffectsTree`]: a flat, already-ordered node list
/// with no arity/acyclicity guarantee of its own. Only reachable as a
/// deserialization intermediate — [`EffectsTree`] rebuilds and validates it
/// node-by-node via [`TryFrom`].
#[derive(Debug, Clone, Deserialize)]
pub struct RawEffectsTree {
    nodes: Vec<EffectNode>,
}

impl TryFrom<RawEffectsTree> for EffectsTree {
    type Error = EffectsTreeError;

    fn try_from(raw: RawEffectsTree) -> Result<Self, Self::Error> {
        let mut tree = EffectsTree::new();
        for node in raw.nodes {
            tree.push(node.effect_type, node.inputs, node.params)?;
        }
        Ok(tree)
    }
}

impl EffectsTree {
    /// An empty tree.
    pub fn new() -> Self {
        EffectsTree { nodes: Vec::new() }
    }

    /// Appends a node, rejecting it if any input id is not strictly less
    /// than the id this node would receive, or if the input count doesn't
    /// match `effect_type`'s arity.
    pub fn push(
        &mut self,
        effect_type: EffectType,
        inputs: Vec<EffectId>,
        params: serde_json::Map<String, serde_json::Value>,
    ) -> Result<EffectId, EffectsTreeError> {
        let id = EffectId::new(self.nodes.len());
        if let Some(arity) = effect_type.required_inputs() {
            if inputs.len() != arity {
                return Err(EffectsTreeError::WrongArity {
                    effect_type,
                    expected: arity,
                    actual: inputs.len(),
                });
            }
        } else if inputs.is_empty() {
            return Err(EffectsTreeError::WrongArity {
                effect_type,
                expected: 1,
                actual: 0,
            });
        }
        for input in &inputs {
            if input.index() >= id.index() {
                return Err(EffectsTreeError::ForwardReference {
                    from: id,
                    to: *input,
                });
            }
        }
        self.nodes.push(EffectNode {
            id,
            effect_type,
            inputs,
            params,
        });
        Ok(id)
    }

    /// The node at `id`, if it exists.
    pub fn get(&self, id: EffectId) -> Option<&EffectNode> {
        self.nodes.get(id.index())
    }

    /// The tree's root — its last-pushed node — if non-empty.
    pub fn root(&self) -> Option<EffectId> {
        if self.nodes.is_empty() {
            None
        } else {
            Some(EffectId::new(self.nodes.len() - 1))
        }
    }

    /// A post-order (inputs before consumers) visitation order over every
    /// node reachable from `root`.
    pub fn post_order_from(&self, root: EffectId) -> Vec<EffectId> {
        let mut order = Vec::new();
        let mut visited = vec![false; self.nodes.len()];
        self.visit(root, &mut visited, &mut order);
        order
    }

    fn visit(&self, id: EffectId, visited: &mut [bool], order: &mut Vec<EffectId>) {
        if visited[id.index()] {
            return;
        }
        visited[id.index()] = true;
        if let Some(node) = self.get(id) {
            for input in &node.inputs {
                self.visit(*input, visited, order);
            }
        }
        order.push(id);
    }

    /// Number of nodes in the arena.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// `true` if the arena holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Rejected mutation of an [`EffectsTree`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EffectsTreeError {
    /// A node referenced an input id that isn't strictly earlier in the
    /// arena (the only way a cycle could otherwise be expressed).
    #[error("effect {from:?} references forward/self id {to:?}")]
    ForwardReference {
        /// The node being constructed.
        from: EffectId,
        /// The offending input id.
        to: EffectId,
    },
    /// An effect's input count didn't match its required arity.
    #[error("{effect_type:?} requires {expected} input(s), got {actual}")]
    WrongArity {
        /// The effect type being constructed.
        effect_type: EffectType,
        /// Its required input count (or minimum, for variadic types).
        expected: usize,
        /// The input count actually supplied.
        actual: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    #[test]
    fn forward_reference_rejected() {
        let mut tree = EffectsTree::new();
        let bad = EffectId::new(5);
        let err = tree
            .push(EffectType::TimeStretch, vec![bad], Map::new())
            .unwrap_err();
        assert!(matches!(err, EffectsTreeError::ForwardReference { .. }));
    }

    #[test]
    fn post_order_visits_inputs_before_consumer() {
        let mut tree = EffectsTree::new();
        let a = tree.push(EffectType::Source, vec![], Map::new()).unwrap();
        let b = tree.push(EffectType::Source, vec![], Map::new()).unwrap();
        let c = tree
            .push(EffectType::Concatenate, vec![a, b], Map::new())
            .unwrap();
        let order = tree.post_order_from(c);
        assert_eq!(order, vec![a, b, c]);
    }

    #[test]
    fn deserialize_rejects_forward_reference() {
        let json = serde_json::json!({
            "nodes": [
                {
                    "id": 0,
                    "effect_type": "time_stretch",
                    "inputs": [1],
                    "params": {},
                },
                {
                    "id": 1,
                    "effect_type": "source",
                    "inputs": [],
                    "params": {},
                },
            ]
        });
        let result: Result<EffectsTree, _> = serde_json::from_value(json);
        assert!(result.is_err());
    }

    #[test]
    fn deserialize_rejects_wrong_arity() {
        let json = serde_json::json!({
            "nodes": [
                {
                    "id": 0,
                    "effect_type": "transition",
                    "inputs": [],
                    "params": {},
                },
            ]
        });
        let result: Result<EffectsTree, _> = serde_json::from_value(json);
        assert!(result.is_err());
    }

    #[test]
    fn deserialize_accepts_valid_tree() {
        let json = serde_json::json!({
            "nodes": [
                {"id": 0, "effect_type": "source", "inputs": [], "params": {}},
                {"id": 1, "effect_type": "source", "inputs": [], "params": {}},
                {"id": 2, "effect_type": "concatenate", "inputs": [0, 1], "params": {}},
            ]
        });
        let tree: EffectsTree = serde_json::from_value(json).unwrap();
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn wrong_arity_rejected() {
        let mut tree = EffectsTree::new();
        let a = tree.push(EffectType::Source, vec![], Map::new()).unwrap();
        let err = tree
            .push(EffectType::Transition, vec![a], Map::new())
            .unwrap_err();
        assert!(matches!(err, EffectsTreeError::WrongArity { .. }));
    }

    #[test]
    fn passthrough_and_opacity_transition_require_exactly_one_input() {
        let mut tree = EffectsTree::new();
        let a = tree.push(EffectType::Source, vec![], Map::new()).unwrap();

        assert!(tree
            .push(EffectType::Passthrough, vec![], Map::new())
            .is_err());
        let passthrough = tree
            .push(EffectType::Passthrough, vec![a], Map::new())
            .unwrap();
        assert_eq!(tree.get(passthrough).unwrap().inputs, vec![a]);

        assert!(tree
            .push(EffectType::OpacityTransition, vec![a, passthrough], Map::new())
            .is_err());
        let opacity = tree
            .push(EffectType::OpacityTransition, vec![passthrough], Map::new())
            .unwrap();
        assert_eq!(tree.get(opacity).unwrap().inputs, vec![passthrough]);
    }
}
