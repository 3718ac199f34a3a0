//! Scalar metrics compatible with masking and weighting.
//!
//! Every builder returns a [`Serial`] that takes `(prediction, target)`, or
//! `(prediction, target, weights)` when `has_weights` is set, and produces one 0-d
//! tensor. Positions whose target equals `mask_id` get weight 0.
//!
//! # Example
//! ```rust
//! use maskmetric::prelude::*;
//! use ndarray::array;
//!
//! // Two positions, the second one is padding (target id 0).
//! let log_probs = array![[-0.5, -1.0, -2.0], [-0.1, -3.0, -3.0]].into_dyn();
//! let targets = array![1.0, 0.0].into_dyn();
//!
//! let mut loss = cross_entropy_loss_scalar(Some(0.0), false);
//! let out = call(&mut loss, vec![log_probs, targets]).unwrap();
//! assert!((out[0].sum() - 1.0).abs() < 1e-6);
//! ```

use crate::config::MetricConfig;
use crate::layer::{
    Accuracy, CrossEntropy, Drop, Dup, Identity, L2, Lambda, Multiply, Parallel, Serial, Sum,
    WeightMask, WeightedMean,
};
use crate::traits::Layer;
use crate::{parallel, serial};

/// Sums the weights assigned to all unmasked elements.
///
/// Takes `(prediction, target)` or `(prediction, target, weights)`; the prediction is
/// dropped and the result is the number (or total weight) of positions not equal to
/// `mask_id`.
pub fn count_weights(mask_id: Option<f32>, has_weights: bool) -> Serial {
    let mut layer = serial![Drop::new(), WeightMask::new(mask_id)];
    if has_weights {
        layer.add(Multiply::new());
    }
    layer.add(Sum::all());
    layer
}

/// Wraps a per-position metric into a masked, optionally weighted, scalar mean.
///
/// # Parameters
///
/// - `metric_layer` - A 2-in, 1-out layer computing the metric per position
/// - `mask_id` - Target id whose positions are excluded
/// - `has_weights` - Whether a third input with weights is multiplied into the mask
pub fn masked_scalar<L: 'static + Layer>(
    metric_layer: L,
    mask_id: Option<f32>,
    has_weights: bool,
) -> Serial {
    // (prediction, target) -> (prediction, target, target) -> (metric, mask)
    let mut layer = serial![
        parallel![Identity::new(), Dup::new()],
        Parallel::new(vec![
            Box::new(metric_layer) as Box<dyn Layer>,
            Box::new(WeightMask::new(mask_id)),
        ]),
    ];
    if has_weights {
        layer.add(parallel![Identity::new(), Multiply::new()]);
    }
    layer.add(WeightedMean::new());
    layer
}

/// Masked mean of the target log-likelihood under log-probability predictions.
pub fn cross_entropy_scalar(mask_id: Option<f32>, has_weights: bool) -> Serial {
    masked_scalar(CrossEntropy::new(), mask_id, has_weights)
}

/// Negative log-perplexity, identical to [`cross_entropy_scalar`].
pub fn neg_log_perplexity_scalar(mask_id: Option<f32>, has_weights: bool) -> Serial {
    cross_entropy_scalar(mask_id, has_weights)
}

/// Cross-entropy loss: the negated [`cross_entropy_scalar`].
pub fn cross_entropy_loss_scalar(mask_id: Option<f32>, has_weights: bool) -> Serial {
    serial![
        cross_entropy_scalar(mask_id, has_weights),
        Lambda::scale("Negate", -1.0),
    ]
}

/// Masked mean of the squared L2 distance.
pub fn l2_scalar(mask_id: Option<f32>, has_weights: bool) -> Serial {
    masked_scalar(L2::new(), mask_id, has_weights)
}

/// L2 loss, identical to [`l2_scalar`].
pub fn l2_loss_scalar(mask_id: Option<f32>, has_weights: bool) -> Serial {
    l2_scalar(mask_id, has_weights)
}

/// Masked mean accuracy.
pub fn accuracy_scalar(mask_id: Option<f32>, has_weights: bool) -> Serial {
    masked_scalar(Accuracy::new(), mask_id, has_weights)
}

/// Kinds of scalar metric that can be built from a [`MetricConfig`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarMetric {
    CountWeights,
    CrossEntropy,
    NegLogPerplexity,
    CrossEntropyLoss,
    L2,
    L2Loss,
    Accuracy,
}

impl ScalarMetric {
    /// Builds the metric layer described by `config` and activates its backend
    pub fn build(self, config: &MetricConfig) -> Serial {
        config.apply();
        let MetricConfig {
            mask_id,
            has_weights,
            ..
        } = *config;

        match self {
            ScalarMetric::CountWeights => count_weights(mask_id, has_weights),
            ScalarMetric::CrossEntropy => cross_entropy_scalar(mask_id, has_weights),
            ScalarMetric::NegLogPerplexity => neg_log_perplexity_scalar(mask_id, has_weights),
            ScalarMetric::CrossEntropyLoss => cross_entropy_loss_scalar(mask_id, has_weights),
            ScalarMetric::L2 => l2_scalar(mask_id, has_weights),
            ScalarMetric::L2Loss => l2_loss_scalar(mask_id, has_weights),
            ScalarMetric::Accuracy => accuracy_scalar(mask_id, has_weights),
        }
    }
}
