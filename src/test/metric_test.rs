use super::*;
use crate::config::MetricConfig;
use crate::layer::{Lambda, call, describe};
use crate::metric::*;
use crate::tensor::{Stack, Tensor};
use crate::traits::Layer;
use ndarray::array;

/// Three positions with per-position log-likelihoods -1.0, -0.1 and -2.5
fn sequence() -> (Tensor, Tensor) {
    let log_probs = array![
        [-0.5, -1.0, -2.0],
        [-0.1, -3.0, -3.0],
        [-1.5, -0.2, -2.5]
    ]
    .into_dyn();
    let targets = array![1.0, 0.0, 2.0].into_dyn();
    (log_probs, targets)
}

fn run<L: Layer>(layer: &mut L, inputs: Stack) -> f32 {
    let out = call(layer, inputs).unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].ndim(), 0);
    out[0].sum()
}

#[test]
fn cross_entropy_scalar_without_mask() {
    let (log_probs, targets) = sequence();
    let mut layer = cross_entropy_scalar(None, false);
    assert_eq!((layer.n_in(), layer.n_out()), (2, 1));
    assert_abs_diff_eq!(run(&mut layer, vec![log_probs, targets]), -1.2, epsilon = 1e-6);
}

#[test]
fn cross_entropy_scalar_skips_padding() {
    let (log_probs, targets) = sequence();
    let mut layer = cross_entropy_scalar(Some(0.0), false);
    assert_abs_diff_eq!(run(&mut layer, vec![log_probs, targets]), -1.75, epsilon = 1e-6);
}

#[test]
fn cross_entropy_scalar_with_weights() {
    let (log_probs, targets) = sequence();
    let weights = array![2.0, 1.0, 0.0].into_dyn();

    let mut layer = cross_entropy_scalar(Some(0.0), true);
    assert_eq!((layer.n_in(), layer.n_out()), (3, 1));
    // Effective weights are mask [1, 0, 1] times [2, 1, 0] = [2, 0, 0].
    assert_abs_diff_eq!(
        run(&mut layer, vec![log_probs, targets, weights]),
        -1.0,
        epsilon = 1e-6
    );
}

#[test]
fn cross_entropy_loss_is_negated_metric() {
    let (log_probs, targets) = sequence();
    let mut loss = cross_entropy_loss_scalar(Some(0.0), false);
    assert_abs_diff_eq!(run(&mut loss, vec![log_probs, targets]), 1.75, epsilon = 1e-6);
}

#[test]
fn neg_log_perplexity_matches_cross_entropy() {
    let (log_probs, targets) = sequence();
    let mut a = neg_log_perplexity_scalar(None, false);
    let mut b = cross_entropy_scalar(None, false);
    assert_eq!(
        run(&mut a, vec![log_probs.clone(), targets.clone()]),
        run(&mut b, vec![log_probs, targets])
    );
}

#[test]
fn accuracy_scalar_with_and_without_mask() {
    // Argmax per row is 0, 0, 1 against targets 1, 0, 2.
    let (log_probs, targets) = sequence();

    let mut layer = accuracy_scalar(None, false);
    assert_abs_diff_eq!(
        run(&mut layer, vec![log_probs.clone(), targets.clone()]),
        1.0 / 3.0,
        epsilon = 1e-6
    );

    let mut layer = accuracy_scalar(Some(0.0), false);
    assert_abs_diff_eq!(run(&mut layer, vec![log_probs, targets]), 0.0);
}

#[test]
fn l2_scalar_averages_rows() {
    let prediction = array![[1.0, 2.0], [3.0, 4.0], [0.0, 0.0]].into_dyn();
    let target = array![[1.0, 1.0], [3.0, 3.0], [5.0, 5.0]].into_dyn();

    let mut layer = l2_scalar(None, false);
    assert_abs_diff_eq!(
        run(&mut layer, vec![prediction.clone(), target.clone()]),
        52.0 / 3.0,
        epsilon = 1e-5
    );

    let mut loss = l2_loss_scalar(None, false);
    assert_abs_diff_eq!(
        run(&mut loss, vec![prediction, target]),
        52.0 / 3.0,
        epsilon = 1e-5
    );
}

#[test]
fn count_weights_counts_unmasked_positions() {
    let (log_probs, targets) = sequence();

    let mut layer = count_weights(None, false);
    assert_eq!(run(&mut layer, vec![log_probs.clone(), targets.clone()]), 3.0);

    let mut layer = count_weights(Some(0.0), false);
    assert_eq!(run(&mut layer, vec![log_probs.clone(), targets.clone()]), 2.0);

    let mut layer = count_weights(Some(0.0), true);
    assert_eq!((layer.n_in(), layer.n_out()), (3, 1));
    let weights = array![2.0, 1.0, 0.5].into_dyn();
    assert_eq!(run(&mut layer, vec![log_probs, targets, weights]), 2.5);
}

#[test]
fn masked_scalar_accepts_custom_metric() {
    let absolute_error = Lambda::new("AbsoluteError", 2, 1, |xs| {
        Ok(vec![(&xs[0] - &xs[1]).mapv(f32::abs)])
    });
    let prediction = array![1.0, 2.0, 3.0].into_dyn();
    let target = array![1.0, 0.0, 4.0].into_dyn();

    // The middle position is padding; the others have errors 0 and 1.
    let mut layer = masked_scalar(absolute_error, Some(0.0), false);
    assert_abs_diff_eq!(run(&mut layer, vec![prediction, target]), 0.5);
}

#[test]
fn scalar_metric_builds_from_config() {
    let (log_probs, targets) = sequence();
    let config = MetricConfig::new(Some(0.0), false);

    let mut layer = ScalarMetric::CrossEntropyLoss.build(&config);
    assert_abs_diff_eq!(run(&mut layer, vec![log_probs.clone(), targets.clone()]), 1.75, epsilon = 1e-6);

    let mut layer = ScalarMetric::CountWeights.build(&config);
    assert_eq!(run(&mut layer, vec![log_probs, targets]), 2.0);
}

#[test]
fn masked_scalar_structure() {
    let layer = cross_entropy_scalar(Some(0.0), true);
    let description = describe(&layer);
    assert!(description.starts_with("Serial_in3_out1["));
    assert!(description.contains("CrossEntropy_in2_out1"));
    assert!(description.contains("WeightMask_in1_out1"));
    assert!(description.trim_end().ends_with(']'));
}

#[test]
fn masked_l2_scalar_on_non_square_targets() {
    let prediction = Tensor::zeros(vec![2, 3]);
    let target = array![[1.0, 2.0, 0.0], [0.0, 0.0, 3.0]].into_dyn();

    // Row metrics 5 and 9 weighted by their unmasked element counts 2 and 1.
    let mut layer = l2_scalar(Some(0.0), false);
    assert_abs_diff_eq!(
        run(&mut layer, vec![prediction.clone(), target.clone()]),
        19.0 / 3.0,
        epsilon = 1e-5
    );

    let mut layer = ScalarMetric::L2Loss.build(&MetricConfig::new(None, false));
    assert_abs_diff_eq!(run(&mut layer, vec![prediction, target]), 7.0, epsilon = 1e-5);
}

#[test]
fn masked_l2_scalar_pairs_rows_with_their_mask() {
    let prediction = Tensor::zeros(vec![2, 2]);
    let target = array![[2.0, 0.0], [3.0, 4.0]].into_dyn();

    // Row metrics 4 and 25 against masks [1, 0] and [1, 1].
    let mut layer = l2_scalar(Some(0.0), false);
    assert_abs_diff_eq!(run(&mut layer, vec![prediction, target]), 18.0, epsilon = 1e-5);
}
