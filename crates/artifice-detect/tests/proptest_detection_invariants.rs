//! Property-based invariant tests for the detection pipeline.
//!
//! Sampler (1–3):
//! 1. Zero target yields an empty histogram.
//! 2. Positive target is always reached.
//! 3. Same seed, same histogram.
//!
//! Features (4–5):
//! 4. Singleton feature lies in [0, 1].
//! 5. Injecting singletons never lowers the feature.
//!
//! Metrics (6–9):
//! 6. Recall + FNR = 1 and FPR is within [0, 1].
//! 7. Precision is 0.0 exactly when nothing is predicted positive.
//! 8. Accuracy equals the fraction of agreeing labels.
//! 9. Confidence intervals are non-negative and zero for constant cells.

use artifice_core::{ChainHistogram, ChainLength, ChainMatrix, ChainRow};
use artifice_detect::{
    ConfusionMatrix, DetectionMetrics, Label, SamplerConfig, confidence_intervals, evaluate,
    inject_singletons, mean_table, sample_clean_chains, singleton_feature,
};
use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;

// ── Strategies ────────────────────────────────────────────────────────────

/// A valid trace: ascending lengths with normalized probabilities.
fn trace_strategy() -> impl Strategy<Value = ChainMatrix> {
    proptest::collection::btree_map(1usize..=64, 1u64..=1000, 1..=12).prop_map(|counts| {
        let total: u64 = counts.values().sum();
        let rows = counts
            .into_iter()
            .map(|(length, count)| ChainRow {
                length,
                count,
                probability: count as f64 / total as f64,
            })
            .collect();
        ChainMatrix::from_rows(rows).unwrap()
    })
}

fn histogram_strategy() -> impl Strategy<Value = ChainHistogram> {
    proptest::collection::btree_map(1usize..=32, 0u64..=500, 0..=10).prop_map(|counts| {
        let mut h = ChainHistogram::new();
        for (len, count) in counts {
            h.add(ChainLength::new(len).unwrap(), count);
        }
        h
    })
}

fn label_strategy() -> impl Strategy<Value = Label> {
    prop_oneof![Just(Label::Clean), Just(Label::Artifice)]
}

fn label_pairs(max_len: usize) -> impl Strategy<Value = Vec<(Label, Label)>> {
    proptest::collection::vec((label_strategy(), label_strategy()), 1..=max_len)
}

// ─── 1. Zero target ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn zero_target_is_empty(trace in trace_strategy(), seed in any::<u64>()) {
        let mut rng = StdRng::seed_from_u64(seed);
        let h = sample_clean_chains(&trace, 0, &SamplerConfig::default(), &mut rng).unwrap();
        prop_assert!(h.is_empty());
    }
}

// ─── 2. Target reached ────────────────────────────────────────────────

proptest! {
    #[test]
    fn target_is_reached(trace in trace_strategy(), target in 1u64..=2000, seed in any::<u64>()) {
        let mut rng = StdRng::seed_from_u64(seed);
        let h = sample_clean_chains(&trace, target, &SamplerConfig::default(), &mut rng).unwrap();
        let longest = trace.rows().last().unwrap().length as u64;
        prop_assert!(h.total_changes() >= target);
        prop_assert!(h.total_changes() < target + longest);
    }
}

// ─── 3. Determinism ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn sampling_is_deterministic(trace in trace_strategy(), target in 0u64..=500, seed in any::<u64>()) {
        let config = SamplerConfig::default().with_runs(3);
        let a = sample_clean_chains(&trace, target, &config, &mut StdRng::seed_from_u64(seed)).unwrap();
        let b = sample_clean_chains(&trace, target, &config, &mut StdRng::seed_from_u64(seed)).unwrap();
        prop_assert_eq!(a, b);
    }
}

// ─── 4/5. Singleton feature ───────────────────────────────────────────

proptest! {
    #[test]
    fn singleton_feature_bounded_and_monotone(h in histogram_strategy(), extra in 0u64..=1000) {
        let before = singleton_feature(&h);
        prop_assert!((0.0..=1.0).contains(&before));
        let mut injected = h.clone();
        inject_singletons(&mut injected, extra);
        let after = singleton_feature(&injected);
        prop_assert!((0.0..=1.0).contains(&after));
        prop_assert!(after + 1e-12 >= before);
    }
}

// ─── 6/7. Rate identities ─────────────────────────────────────────────

proptest! {
    #[test]
    fn rate_identities(tn in 1u64..=500, fp in 0u64..=500, fn_ in 0u64..=500, tp in 0u64..=500) {
        prop_assume!(fn_ + tp > 0);
        let m = DetectionMetrics::from_confusion(0.0, &ConfusionMatrix::new(tn, fp, fn_, tp)).unwrap();
        prop_assert!((m.recall + m.false_negative_rate - 1.0).abs() < 1e-12);
        prop_assert!((0.0..=1.0).contains(&m.false_positive_rate));
        prop_assert!((0.0..=1.0).contains(&m.accuracy));
        if tp + fp == 0 {
            prop_assert_eq!(m.precision, 0.0);
        } else {
            prop_assert!((m.precision - tp as f64 / (tp + fp) as f64).abs() < 1e-12);
        }
    }
}

// ─── 8. Accuracy ──────────────────────────────────────────────────────

proptest! {
    #[test]
    fn accuracy_is_agreement(pairs in label_pairs(64)) {
        let preds: Vec<Label> = pairs.iter().map(|p| p.0).collect();
        let truths: Vec<Label> = pairs.iter().map(|p| p.1).collect();
        let has_both = truths.contains(&Label::Clean) && truths.contains(&Label::Artifice);
        match evaluate(1.0, &preds, &truths) {
            Ok(m) => {
                let agree = pairs.iter().filter(|(a, b)| a == b).count() as f64;
                prop_assert!((m.accuracy - agree / pairs.len() as f64).abs() < 1e-12);
            }
            Err(_) => prop_assert!(!has_both),
        }
    }
}

// ─── 9. Confidence intervals ──────────────────────────────────────────

proptest! {
    #[test]
    fn ci_non_negative(values in proptest::collection::vec(0.0f64..=1.0, 1..=20), constant in 0.0f64..=1.0) {
        let runs: Vec<Vec<Vec<f64>>> = values.iter().map(|&v| vec![vec![v, constant]]).collect();
        let means = mean_table(&runs).unwrap();
        let ci = confidence_intervals(&runs, &means, 1.96).unwrap();
        prop_assert!(ci[0][0] >= 0.0);
        prop_assert!(ci[0][1].abs() < 1e-12);
    }
}

// ─── Confusion sanity ─────────────────────────────────────────────────

#[test]
fn confusion_matrix_reference_values() {
    let m = DetectionMetrics::from_confusion(0.0, &ConfusionMatrix::new(8, 2, 1, 9)).unwrap();
    assert!((m.accuracy - 0.85).abs() < 1e-12);
    assert!((m.precision - 0.818_181_818_181_818_1).abs() < 1e-12);
    assert!((m.recall - 0.9).abs() < 1e-12);
    assert!((m.false_positive_rate - 0.2).abs() < 1e-12);
    assert!((m.false_negative_rate - 0.1).abs() < 1e-12);

    let zero = DetectionMetrics::from_confusion(0.0, &ConfusionMatrix::new(5, 0, 5, 0)).unwrap();
    assert_eq!(zero.precision, 0.0);
}
