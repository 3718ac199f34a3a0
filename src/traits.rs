use crate::ModelError;
use crate::tensor::{Stack, Tensor};

/// Defines the interface for stack layers.
///
/// A layer consumes `n_in` values from the top of a data stack and produces `n_out`
/// values. Layers are composed with the combinators in [`crate::layer::combinator`],
/// so a metric such as a masked cross-entropy is itself just a layer.
pub trait Layer {
    /// Number of values the layer takes from the stack.
    fn n_in(&self) -> usize;

    /// Number of values the layer pushes back onto the stack.
    fn n_out(&self) -> usize;

    /// Performs forward propagation through the layer.
    ///
    /// # Parameters
    ///
    /// * `inputs` - Exactly `n_in` tensors, top of stack first
    ///
    /// # Returns
    ///
    /// - `Ok(Stack)` - Exactly `n_out` output tensors
    /// - `Err(ModelError)` - If the inputs have the wrong arity or incompatible shapes
    fn forward(&mut self, inputs: Stack) -> Result<Stack, ModelError>;

    /// Performs backward propagation through the layer.
    ///
    /// Uses the inputs cached by the last call to `forward`.
    ///
    /// # Parameters
    ///
    /// * `grad_outputs` - One gradient per output, shaped like that output
    ///
    /// # Returns
    ///
    /// - `Ok(Stack)` - One gradient per input, shaped like that input
    /// - `Err(ModelError::ProcessingError(String))` - If no forward pass was cached or the layer has no gradient
    fn backward(&mut self, grad_outputs: Stack) -> Result<Stack, ModelError>;

    /// Returns the type name of the layer (e.g., "CrossEntropy").
    fn layer_type(&self) -> &str {
        "Unknown"
    }

    /// Returns the layers this layer is composed of, if any.
    fn sublayers(&self) -> Vec<&dyn Layer> {
        Vec::new()
    }
}

impl<L: Layer + ?Sized> Layer for Box<L> {
    fn n_in(&self) -> usize {
        (**self).n_in()
    }

    fn n_out(&self) -> usize {
        (**self).n_out()
    }

    fn forward(&mut self, inputs: Stack) -> Result<Stack, ModelError> {
        (**self).forward(inputs)
    }

    fn backward(&mut self, grad_outputs: Stack) -> Result<Stack, ModelError> {
        (**self).backward(grad_outputs)
    }

    fn layer_type(&self) -> &str {
        (**self).layer_type()
    }

    fn sublayers(&self) -> Vec<&dyn Layer> {
        (**self).sublayers()
    }
}

/// Defines the interface for loss functions used in neural network training.
///
/// This trait provides methods to compute both the loss value and its gradient
/// with respect to the predicted values.
pub trait LossFunction {
    /// Computes the loss between true and predicted values.
    ///
    /// # Parameters
    ///
    /// - `y_true` - Tensor containing the ground truth values
    /// - `y_pred` - Tensor containing the predicted values
    ///
    /// # Returns
    ///
    /// The scalar loss value
    fn compute_loss(&mut self, y_true: &Tensor, y_pred: &Tensor) -> Result<f32, ModelError>;

    /// Computes the gradient of the loss with respect to the predictions.
    ///
    /// # Parameters
    ///
    /// - `y_true` - Tensor containing the ground truth values
    /// - `y_pred` - Tensor containing the predicted values
    ///
    /// # Returns
    ///
    /// Tensor containing the gradient of the loss, shaped like `y_pred`
    fn compute_grad(&mut self, y_true: &Tensor, y_pred: &Tensor) -> Result<Tensor, ModelError>;
}
