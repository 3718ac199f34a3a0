use crate::ModelError;
use crate::layer::call;
use crate::metric::{cross_entropy_loss_scalar, l2_loss_scalar};
use crate::tensor::{Stack, Tensor, scalar};
use crate::traits::{Layer, LossFunction};

/// Adapts a scalar metric layer to the [`LossFunction`] interface.
///
/// The wrapped layer must produce a single value and take `(prediction, target)`, or
/// `(prediction, target, weights)` when constructed with [`MaskedLoss::with_weights`].
/// Gradients are obtained by running the layer backward from a unit seed.
///
/// # Example
/// ```rust
/// use maskmetric::prelude::*;
/// use ndarray::array;
///
/// let mut loss = MaskedLoss::l2(None);
/// let y_true = array![[1.0, 2.0], [3.0, 4.0]].into_dyn();
/// let y_pred = array![[1.0, 3.0], [3.0, 4.0]].into_dyn();
///
/// // Per-row squared distances are 1 and 0; their mean is 0.5.
/// assert_eq!(loss.compute_loss(&y_true, &y_pred).unwrap(), 0.5);
/// let grad = loss.compute_grad(&y_true, &y_pred).unwrap();
/// assert_eq!(grad, array![[0.0f32, 1.0], [0.0, 0.0]].into_dyn());
/// ```
pub struct MaskedLoss {
    layer: Box<dyn Layer>,
    weights: Option<Tensor>,
}

impl MaskedLoss {
    /// Wraps a `(prediction, target) -> scalar` layer
    ///
    /// # Returns
    ///
    /// - `Ok(MaskedLoss)` - The adapter
    /// - `Err(ModelError::InputValidationError)` - If the layer is not 2-in, 1-out
    pub fn new<L: 'static + Layer>(layer: L) -> Result<Self, ModelError> {
        Self::validate(&layer, 2)?;
        Ok(Self {
            layer: Box::new(layer),
            weights: None,
        })
    }

    /// Wraps a `(prediction, target, weights) -> scalar` layer with fixed weights
    pub fn with_weights<L: 'static + Layer>(layer: L, weights: Tensor) -> Result<Self, ModelError> {
        Self::validate(&layer, 3)?;
        Ok(Self {
            layer: Box::new(layer),
            weights: Some(weights),
        })
    }

    /// Masked cross-entropy loss over log-probability predictions
    pub fn cross_entropy(mask_id: Option<f32>) -> Self {
        Self {
            layer: Box::new(cross_entropy_loss_scalar(mask_id, false)),
            weights: None,
        }
    }

    /// Masked L2 loss
    pub fn l2(mask_id: Option<f32>) -> Self {
        Self {
            layer: Box::new(l2_loss_scalar(mask_id, false)),
            weights: None,
        }
    }

    fn validate<L: Layer>(layer: &L, n_in: usize) -> Result<(), ModelError> {
        if layer.n_in() != n_in || layer.n_out() != 1 {
            return Err(ModelError::InputValidationError(format!(
                "loss layer {} must take {} input(s) and return 1 value, found {} -> {}",
                layer.layer_type(),
                n_in,
                layer.n_in(),
                layer.n_out()
            )));
        }
        Ok(())
    }

    fn inputs(&self, y_true: &Tensor, y_pred: &Tensor) -> Stack {
        let mut inputs = vec![y_pred.clone(), y_true.clone()];
        if let Some(weights) = &self.weights {
            inputs.push(weights.clone());
        }
        inputs
    }

    fn forward(&mut self, y_true: &Tensor, y_pred: &Tensor) -> Result<f32, ModelError> {
        let inputs = self.inputs(y_true, y_pred);
        let outputs = call(&mut self.layer, inputs)?;
        Ok(outputs[0].sum())
    }
}

impl LossFunction for MaskedLoss {
    fn compute_loss(&mut self, y_true: &Tensor, y_pred: &Tensor) -> Result<f32, ModelError> {
        self.forward(y_true, y_pred)
    }

    fn compute_grad(&mut self, y_true: &Tensor, y_pred: &Tensor) -> Result<Tensor, ModelError> {
        self.forward(y_true, y_pred)?;
        let mut grads = self.layer.backward(vec![scalar(1.0)])?;
        if grads.is_empty() {
            return Err(ModelError::ProcessingError(
                "loss layer returned no gradients".to_string(),
            ));
        }
        Ok(grads.swap_remove(0))
    }
}
