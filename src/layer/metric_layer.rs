use crate::ModelError;
use crate::backend::{self, map_inplace, zip_with};
use crate::layer::check_arity;
use crate::tensor::{Stack, Tensor, broadcast_to, normalize_axis, one_hot, scalar, unbroadcast};
use crate::traits::Layer;
use ndarray::{ArrayViewD, Axis};

/// Takes the two inputs of a metric layer off the stack.
fn take_pair(layer: &str, inputs: Stack) -> Result<(Tensor, Tensor), ModelError> {
    check_arity(layer, "forward", 2, inputs.len())?;
    let mut inputs = inputs.into_iter();
    match (inputs.next(), inputs.next()) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(ModelError::arity(layer, "forward", 2, 0)),
    }
}

/// Views `metric` with length-1 axes appended until it has `ndim` axes.
fn align_trailing(metric: &Tensor, ndim: usize) -> ArrayViewD<'_, f32> {
    let mut view = metric.view();
    while view.ndim() < ndim {
        let last = view.ndim();
        view = view.insert_axis(Axis(last));
    }
    view
}

/// Spreads an axis-reduced gradient back over the reduced axis.
fn expand_along(grad: &Tensor, axis: usize, shape: &[usize]) -> Result<Tensor, ModelError> {
    broadcast_to(&grad.clone().insert_axis(Axis(axis)), shape)
}

/// Per-position cross-entropy between log-probabilities and integer targets.
///
/// Computes `sum(prediction * one_hot(target, n), axis)` where `n` is the size of the
/// last prediction axis. With log-softmax predictions this is the log-likelihood of
/// the target class (a value `<= 0`); negate it to obtain a loss.
///
/// # Dimensions
///
/// - Prediction shape: (..., n_classes)
/// - Target shape: (...), class ids stored as `f32`
/// - Output shape: prediction shape without `axis`
///
/// # Example
/// ```rust
/// use maskmetric::prelude::*;
/// use ndarray::array;
///
/// let mut ce = CrossEntropy::new();
/// let log_probs = array![[-0.1, -2.0, -3.0], [-4.0, -0.5, -1.0]].into_dyn();
/// let targets = array![0.0, 2.0].into_dyn();
/// let out = call(&mut ce, vec![log_probs, targets]).unwrap();
/// assert_eq!(out[0], array![-0.1f32, -1.0].into_dyn());
/// ```
#[derive(Debug, Clone)]
pub struct CrossEntropy {
    axis: isize,
    /// One-hot targets, resolved axis and target shape from the last forward pass
    cache: Option<(Tensor, usize, Vec<usize>)>,
}

impl CrossEntropy {
    /// Creates a CrossEntropy reducing over the last axis
    pub fn new() -> Self {
        Self::with_axis(-1)
    }

    /// Creates a CrossEntropy reducing over `axis`
    pub fn with_axis(axis: isize) -> Self {
        Self { axis, cache: None }
    }
}

impl Default for CrossEntropy {
    fn default() -> Self {
        Self::new()
    }
}

impl Layer for CrossEntropy {
    fn n_in(&self) -> usize {
        2
    }

    fn n_out(&self) -> usize {
        1
    }

    fn forward(&mut self, inputs: Stack) -> Result<Stack, ModelError> {
        let (prediction, target) = take_pair("CrossEntropy", inputs)?;

        let (n_categories, batch_shape) = match prediction.shape().split_last() {
            Some((&n, rest)) => (n, rest),
            None => {
                return Err(ModelError::InputValidationError(
                    "CrossEntropy: prediction must have at least one axis".to_string(),
                ));
            }
        };
        if target.shape() != batch_shape {
            return Err(ModelError::InputValidationError(format!(
                "CrossEntropy: target shape {:?} does not match prediction shape {:?} without its class axis",
                target.shape(),
                prediction.shape()
            )));
        }

        let axis = normalize_axis(self.axis, prediction.ndim())?;
        let encoded = one_hot(&target, n_categories)?;
        let picked = zip_with(prediction.view(), encoded.view(), |p, t| p * t)?;
        let out = picked.sum_axis(Axis(axis));

        self.cache = Some((encoded, axis, target.shape().to_vec()));
        Ok(vec![out])
    }

    fn backward(&mut self, grad_outputs: Stack) -> Result<Stack, ModelError> {
        check_arity("CrossEntropy", "backward", 1, grad_outputs.len())?;
        let (encoded, axis, target_shape) = self
            .cache
            .as_ref()
            .ok_or_else(|| ModelError::no_forward("CrossEntropy"))?;

        let spread = expand_along(&grad_outputs[0], *axis, encoded.shape())?;
        let grad_prediction = zip_with(spread.view(), encoded.view(), |g, t| g * t)?;

        Ok(vec![grad_prediction, Tensor::zeros(target_shape.as_slice())])
    }

    fn layer_type(&self) -> &str {
        "CrossEntropy"
    }
}

/// Per-position squared L2 distance: `sum((prediction - target)^2, axis)`.
///
/// Prediction and target are broadcast against each other before the reduction.
#[derive(Debug, Clone)]
pub struct L2 {
    axis: isize,
    /// Difference tensor, resolved axis and the two input shapes from the last forward pass
    cache: Option<(Tensor, usize, Vec<usize>, Vec<usize>)>,
}

impl L2 {
    /// Creates an L2 reducing over the last axis
    pub fn new() -> Self {
        Self::with_axis(-1)
    }

    /// Creates an L2 reducing over `axis`
    pub fn with_axis(axis: isize) -> Self {
        Self { axis, cache: None }
    }
}

impl Default for L2 {
    fn default() -> Self {
        Self::new()
    }
}

impl Layer for L2 {
    fn n_in(&self) -> usize {
        2
    }

    fn n_out(&self) -> usize {
        1
    }

    fn forward(&mut self, inputs: Stack) -> Result<Stack, ModelError> {
        let (prediction, target) = take_pair("L2", inputs)?;

        let diff = zip_with(prediction.view(), target.view(), |p, t| p - t)?;
        let axis = normalize_axis(self.axis, diff.ndim())?;
        let mut squared = diff.clone();
        map_inplace(&mut squared, |d| d * d);
        let out = squared.sum_axis(Axis(axis));

        self.cache = Some((
            diff,
            axis,
            prediction.shape().to_vec(),
            target.shape().to_vec(),
        ));
        Ok(vec![out])
    }

    fn backward(&mut self, grad_outputs: Stack) -> Result<Stack, ModelError> {
        check_arity("L2", "backward", 1, grad_outputs.len())?;
        let (diff, axis, prediction_shape, target_shape) = self
            .cache
            .as_ref()
            .ok_or_else(|| ModelError::no_forward("L2"))?;

        let spread = expand_along(&grad_outputs[0], *axis, diff.shape())?;
        let grad_diff = zip_with(spread.view(), diff.view(), |g, d| 2.0 * g * d)?;
        let grad_target = unbroadcast(grad_diff.mapv(|g| -g), target_shape)?;
        let grad_prediction = unbroadcast(grad_diff, prediction_shape)?;

        Ok(vec![grad_prediction, grad_target])
    }

    fn layer_type(&self) -> &str {
        "L2"
    }
}

/// Per-position classification accuracy: `1.0` where `argmax(prediction, axis) == target`.
///
/// Ties resolve to the lowest index and a NaN counts as the maximum. The layer is not
/// differentiable; its gradient is zero.
#[derive(Debug, Clone)]
pub struct Accuracy {
    axis: isize,
    shape_cache: Option<(Vec<usize>, Vec<usize>)>,
}

impl Accuracy {
    /// Creates an Accuracy taking the argmax over the last axis
    pub fn new() -> Self {
        Self::with_axis(-1)
    }

    /// Creates an Accuracy taking the argmax over `axis`
    pub fn with_axis(axis: isize) -> Self {
        Self {
            axis,
            shape_cache: None,
        }
    }
}

impl Default for Accuracy {
    fn default() -> Self {
        Self::new()
    }
}

impl Layer for Accuracy {
    fn n_in(&self) -> usize {
        2
    }

    fn n_out(&self) -> usize {
        1
    }

    fn forward(&mut self, inputs: Stack) -> Result<Stack, ModelError> {
        let (prediction, target) = take_pair("Accuracy", inputs)?;

        let axis = normalize_axis(self.axis, prediction.ndim())?;
        if prediction.len_of(Axis(axis)) == 0 {
            return Err(ModelError::InputValidationError(
                "Accuracy: cannot take argmax over an empty axis".to_string(),
            ));
        }

        let predicted_class = prediction.map_axis(Axis(axis), |lane| {
            let mut best = 0;
            for (i, &v) in lane.iter().enumerate() {
                // The first NaN wins, as in numpy.
                if v.is_nan() {
                    best = i;
                    break;
                }
                if v > lane[best] {
                    best = i;
                }
            }
            best as f32
        });
        let correct = zip_with(predicted_class.view(), target.view(), |p, t| {
            if p == t { 1.0 } else { 0.0 }
        })?;

        self.shape_cache = Some((prediction.shape().to_vec(), target.shape().to_vec()));
        Ok(vec![correct])
    }

    fn backward(&mut self, grad_outputs: Stack) -> Result<Stack, ModelError> {
        check_arity("Accuracy", "backward", 1, grad_outputs.len())?;
        let (prediction_shape, target_shape) = self
            .shape_cache
            .as_ref()
            .ok_or_else(|| ModelError::no_forward("Accuracy"))?;
        Ok(vec![
            Tensor::zeros(prediction_shape.as_slice()),
            Tensor::zeros(target_shape.as_slice()),
        ])
    }

    fn layer_type(&self) -> &str {
        "Accuracy"
    }
}

/// Turns targets into 0/1 weights that exclude the padding id.
///
/// With `mask_id = Some(id)` the output is `1.0` everywhere except where the target
/// equals `id`; with `None` every position gets weight `1.0`.
#[derive(Debug, Clone)]
pub struct WeightMask {
    mask_id: Option<f32>,
    shape_cache: Option<Vec<usize>>,
}

impl WeightMask {
    /// Creates a WeightMask for the given padding id
    pub fn new(mask_id: Option<f32>) -> Self {
        Self {
            mask_id,
            shape_cache: None,
        }
    }

    /// Gets the padding id
    pub fn get_mask_id(&self) -> Option<f32> {
        self.mask_id
    }
}

impl Default for WeightMask {
    fn default() -> Self {
        Self::new(Some(0.0))
    }
}

impl Layer for WeightMask {
    fn n_in(&self) -> usize {
        1
    }

    fn n_out(&self) -> usize {
        1
    }

    fn forward(&mut self, inputs: Stack) -> Result<Stack, ModelError> {
        check_arity("WeightMask", "forward", 1, inputs.len())?;
        let target = &inputs[0];

        let mask = match self.mask_id {
            None => Tensor::ones(target.raw_dim()),
            Some(id) => {
                let mut mask = target.clone();
                map_inplace(&mut mask, |t| if t == id { 0.0 } else { 1.0 });
                mask
            }
        };

        self.shape_cache = Some(target.shape().to_vec());
        Ok(vec![mask])
    }

    fn backward(&mut self, grad_outputs: Stack) -> Result<Stack, ModelError> {
        check_arity("WeightMask", "backward", 1, grad_outputs.len())?;
        let shape = self
            .shape_cache
            .as_ref()
            .ok_or_else(|| ModelError::no_forward("WeightMask"))?;
        Ok(vec![Tensor::zeros(shape.as_slice())])
    }

    fn layer_type(&self) -> &str {
        "WeightMask"
    }
}

/// Weighted mean of a metric: `sum(metric * weights) / sum(weights)`.
///
/// When the weights have more axes than the metric (a per-row L2 against a per-element
/// mask), the metric gains trailing axes so row `i` of the metric meets row `i` of the
/// weights. Otherwise the two broadcast numpy-style. The denominator sums the weights
/// exactly as given, so all-zero weights produce NaN.
#[derive(Debug, Default, Clone)]
pub struct WeightedMean {
    input_cache: Option<(Tensor, Tensor)>,
}

impl WeightedMean {
    /// Creates a new WeightedMean layer
    pub fn new() -> Self {
        Self { input_cache: None }
    }
}

impl Layer for WeightedMean {
    fn n_in(&self) -> usize {
        2
    }

    fn n_out(&self) -> usize {
        1
    }

    fn forward(&mut self, inputs: Stack) -> Result<Stack, ModelError> {
        let (metric, weights) = take_pair("WeightedMean", inputs)?;

        let aligned = align_trailing(&metric, weights.ndim());
        let weighted_sum = backend::sum(&zip_with(aligned, weights.view(), |m, w| m * w)?);
        let weights_sum = backend::sum(&weights);
        if weights_sum == 0.0 {
            tracing::warn!(
                shape = ?weights.shape(),
                "WeightedMean: weights sum to zero, result is NaN"
            );
        }

        self.input_cache = Some((metric, weights));
        Ok(vec![scalar(weighted_sum / weights_sum)])
    }

    fn backward(&mut self, grad_outputs: Stack) -> Result<Stack, ModelError> {
        check_arity("WeightedMean", "backward", 1, grad_outputs.len())?;
        let (metric, weights) = self
            .input_cache
            .as_ref()
            .ok_or_else(|| ModelError::no_forward("WeightedMean"))?;

        let g = grad_outputs[0].sum();
        let weights_sum = backend::sum(weights);
        let aligned = align_trailing(metric, weights.ndim());
        let weighted_sum = backend::sum(&zip_with(aligned.clone(), weights.view(), |m, w| m * w)?);

        let grad_metric = zip_with(aligned.clone(), weights.view(), |_, w| g * w / weights_sum)?;
        let grad_weights = zip_with(aligned.clone(), weights.view(), |m, _| g * m / weights_sum)?;
        let correction = g * weighted_sum / (weights_sum * weights_sum);

        let mut grad_metric = unbroadcast(grad_metric, aligned.shape())?;
        while grad_metric.ndim() > metric.ndim() {
            let last = grad_metric.ndim() - 1;
            grad_metric = grad_metric.index_axis_move(Axis(last), 0);
        }
        let grad_weights = unbroadcast(grad_weights, weights.shape())?.mapv(|v| v - correction);

        Ok(vec![grad_metric, grad_weights])
    }

    fn layer_type(&self) -> &str {
        "WeightedMean"
    }
}
