//! Per-segment fitting strategy: a closed sum type, not a bag of flags
//! (spec §9 "Strategy as tagged variant").

use crate::RESIDUAL_STRETCH_EPSILON;
use serde::{Deserialize, Serialize};

/// How a segment's source range is fitted into its beat-derived time slot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Strategy {
    /// Uniformly speed up/slow down the whole source range by `factor` so it
    /// exactly fills the slot. Forbidden when the source range contains
    /// speech of quality >= `clear` (spec §3 invariant).
    TimeStretch {
        /// `time_slot_seconds / source_duration_seconds`.
        factor: f64,
    },
    /// Cut a contiguous sub-range at speech-respecting boundaries.
    SmartCut {
        /// Start of the kept range, in source-local seconds.
        source_start: f64,
        /// End of the kept range, in source-local seconds.
        source_end: f64,
        /// How a cut shorter than the slot is positioned within it.
        fit_strategy: FitStrategy,
    },
    /// A smart cut plus a small residual stretch to close the remaining gap.
    Hybrid {
        /// Start of the kept range, in source-local seconds.
        source_start: f64,
        /// End of the kept range, in source-local seconds.
        source_end: f64,
        /// Applied on top of the cut range; must satisfy
        /// `|factor - 1| <= RESIDUAL_STRETCH_EPSILON`.
        residual_stretch_factor: f64,
    },
}

/// How a cut shorter than its time slot is positioned within the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitStrategy {
    /// Center the cut; pad both sides equally.
    Center,
    /// Anchor the cut to the start of the slot.
    Left,
    /// Anchor the cut to the end of the slot.
    Right,
    /// Prefer a residual stretch (within epsilon) over padding, when one is
    /// feasible; falls back to `Center` padding otherwise.
    MinimalStretch,
}

/// Errors constructing a [`Strategy`] that would violate spec §3 invariants.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StrategyError {
    /// `smart_cut`'s kept range is longer than the slot it must fit in.
    #[error("smart_cut duration {cut_duration} exceeds time_slot {time_slot}")]
    CutExceedsSlot {
        /// Duration of the proposed cut, in seconds.
        cut_duration: f64,
        /// Duration of the slot it must fit in, in seconds.
        time_slot: f64,
    },
    /// `hybrid`'s residual stretch factor is outside the allowed epsilon.
    #[error("residual_stretch_factor {factor} exceeds epsilon {epsilon} from 1.0")]
    ResidualStretchOutOfBounds {
        /// The offending factor.
        factor: f64,
        /// The epsilon it was checked against.
        epsilon: f64,
    },
    /// A `time_stretch` strategy was chosen for a range containing clear
    /// speech (spec §3 invariant, testable property 7).
    TimeStretchForbiddenWithSpeech,
}

impl Strategy {
    /// Builds a validated `SmartCut`.
    pub fn smart_cut(
        source_start: f64,
        source_end: f64,
        time_slot: f64,
        fit_strategy: FitStrategy,
    ) -> Result<Self, StrategyError> {
        let cut_duration = source_end - source_start;
        if cut_duration > time_slot + f64::EPSILON {
            return Err(StrategyError::CutExceedsSlot {
                cut_duration,
                time_slot,
            });
        }
        Ok(Strategy::SmartCut {
            source_start,
            source_end,
            fit_strategy,
        })
    }

    /// Builds a validated `Hybrid`.
    pub fn hybrid(
        source_start: f64,
        source_end: f64,
        residual_stretch_factor: f64,
    ) -> Result<Self, StrategyError> {
        if (residual_stretch_factor - 1.0).abs() > RESIDUAL_STRETCH_EPSILON {
            return Err(StrategyError::ResidualStretchOutOfBounds {
                factor: residual_stretch_factor,
                epsilon: RESIDUAL_STRETCH_EPSILON,
            });
        }
        Ok(Strategy::Hybrid {
            source_start,
            source_end,
            residual_stretch_factor,
        })
    }

    /// Builds a validated `TimeStretch`, rejecting it outright when the
    /// caller asserts clear speech is present in range (property 7).
    pub fn time_stretch(factor: f64, has_clear_speech: bool) -> Result<Self, StrategyError> {
        if has_clear_speech {
            return Err(StrategyError::TimeStretchForbiddenWithSpeech);
        }
        Ok(Strategy::TimeStretch { factor })
    }

    /// The kept source range, if the strategy cuts one (`SmartCut`/`Hybrid`).
    pub fn source_range(&self) -> Option<(f64, f64)> {
        match *self {
            Strategy::SmartCut {
                source_start,
                source_end,
                ..
            }
            | Strategy::Hybrid {
                source_start,
                source_end,
                ..
            } => Some((source_start, source_end)),
            Strategy::TimeStretch { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smart_cut_rejects_overrun() {
        let err = Strategy::smart_cut(0.0, 7.0, 6.0, FitStrategy::Center).unwrap_err();
        assert_eq!(
            err,
            StrategyError::CutExceedsSlot {
                cut_duration: 7.0,
                time_slot: 6.0
            }
        );
    }

    #[test]
    fn smart_cut_accepts_exact_fit() {
        assert!(Strategy::smart_cut(3.0, 9.0, 6.0, FitStrategy::Center).is_ok());
    }

    #[test]
    fn hybrid_rejects_out_of_epsilon() {
        assert!(Strategy::hybrid(0.0, 5.0, 1.2).is_err());
        assert!(Strategy::hybrid(0.0, 5.0, 1.05).is_ok());
    }

    #[test]
    fn time_stretch_forbidden_with_speech() {
        assert!(Strategy::time_stretch(1.5, true).is_err());
        assert!(Strategy::time_stretch(1.5, false).is_ok());
    }
}
