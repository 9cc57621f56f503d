//! Property tests: the streaming engine against a direct window mean.

use dxtc::{ExpandingPolicy, SeriesState};
use proptest::prelude::*;
use statrs::statistics::Statistics;

/// Mean of the non-missing values among the last `window` observations
/// ending at `i`, or the observation itself when they are all missing.
fn reference(values: &[f64], window: usize, i: usize) -> f64 {
    let start = (i + 1).saturating_sub(window);
    let present: Vec<f64> = values[start..=i].iter().copied().filter(|v| !v.is_nan()).collect();
    if present.is_empty() {
        values[i]
    } else {
        present.iter().mean()
    }
}

fn observation() -> impl Strategy<Value = f64> {
    prop_oneof![
        4 => -1.0e3f64..1.0e3,
        1 => Just(f64::NAN),
    ]
}

fn close(a: f64, b: f64) -> bool {
    (a.is_nan() && b.is_nan()) || (a - b).abs() <= 1e-6 * (1.0 + b.abs())
}

proptest! {
    #[test]
    fn prop_partial_mean_matches_reference(
        window in 1usize..12,
        values in proptest::collection::vec(observation(), 1..80),
    ) {
        let mut state = SeriesState::<f64>::new(window, ExpandingPolicy::PartialMean).unwrap();
        for (i, &v) in values.iter().enumerate() {
            let got = state.update(v);
            let want = reference(&values, window, i);
            prop_assert!(close(got, want), "step {}: got {}, want {}", i, got, want);
        }
    }

    #[test]
    fn prop_missing_policy_only_differs_while_expanding(
        window in 1usize..12,
        values in proptest::collection::vec(observation(), 1..80),
    ) {
        let mut partial = SeriesState::<f64>::new(window, ExpandingPolicy::PartialMean).unwrap();
        let mut missing = SeriesState::<f64>::new(window, ExpandingPolicy::Missing).unwrap();
        for (i, &v) in values.iter().enumerate() {
            let p = partial.update(v);
            let m = missing.update(v);
            if i + 1 < window {
                prop_assert!(m.is_nan());
            } else {
                prop_assert!(close(m, p));
            }
        }
    }

    #[test]
    fn prop_counters_stay_within_window(
        window in 1usize..12,
        values in proptest::collection::vec(observation(), 0..80),
    ) {
        let mut state = SeriesState::<f64>::new(window, ExpandingPolicy::PartialMean).unwrap();
        for &v in &values {
            state.update(v);
            prop_assert!(state.seen() <= window);
            prop_assert!(state.missing() <= state.seen());
            prop_assert_eq!(state.resident().len(), state.seen());
        }
        prop_assert_eq!(state.seen(), values.len().min(window));
    }
}
