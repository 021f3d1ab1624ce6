//! Property-based tests for the komposition document's beat-domain
//! invariants (spec §3 "Segment": "nonneg ints, end_beat > start_beat").

use komposer_core::{Segment, SegmentError, SourceTiming};
use proptest::prelude::*;

fn segment(start_beat: f64, end_beat: f64) -> Segment {
    Segment {
        segment_id: "s".to_string(),
        source_ref: "src".to_string(),
        start_beat,
        end_beat,
        source_timing: SourceTiming::OriginalStartDuration,
        fit_strategy_hint: None,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Any whole-number `start_beat < end_beat`, both non-negative, always
    /// validates.
    #[test]
    fn ordered_nonnegative_whole_beats_always_validate(
        start in 0i64..10_000,
        span in 1i64..10_000,
    ) {
        let seg = segment(start as f64, (start + span) as f64);
        prop_assert!(seg.validate().is_ok());
    }

    /// Any negative `start_beat` is rejected as `NegativeBeat`, regardless
    /// of what `end_beat` is.
    #[test]
    fn negative_start_beat_always_rejected(
        start in -10_000i64..0,
        end in -10_000i64..10_000,
    ) {
        let seg = segment(start as f64, end as f64);
        prop_assert!(matches!(
            seg.validate(),
            Err(SegmentError::NegativeBeat { .. })
        ));
    }

    /// Any fractional (non-integer) beat bound on an otherwise-valid span is
    /// rejected as `NonIntegerBeat`.
    #[test]
    fn fractional_beat_bound_always_rejected(
        start in 0i64..10_000,
        span in 1i64..10_000,
        frac in 1u32..100,
    ) {
        let frac = frac as f64 / 100.0;
        let seg = segment(start as f64 + frac, (start + span) as f64);
        prop_assert!(matches!(
            seg.validate(),
            Err(SegmentError::NonIntegerBeat { .. })
        ));
    }

    /// `end_beat <= start_beat` is always rejected as `NonPositiveSpan`,
    /// for any non-negative whole-number pair satisfying that ordering.
    #[test]
    fn non_positive_span_always_rejected(
        start in 0i64..10_000,
        backward in 0i64..10_000,
    ) {
        let end = start - backward;
        prop_assume!(end >= 0);
        let seg = segment(start as f64, end as f64);
        prop_assert!(matches!(
            seg.validate(),
            Err(SegmentError::NonPositiveSpan { .. })
        ));
    }
}
