use crate::ModelError;
use crate::backend::{self, zip_with};
use crate::layer::check_arity;
use crate::tensor::{Stack, Tensor, broadcast_to, normalize_axis, scalar, unbroadcast};
use crate::traits::Layer;
use ndarray::Axis;

/// Multiplies the top two stack values element-wise, broadcasting numpy-style.
#[derive(Debug, Default, Clone)]
pub struct Multiply {
    input_cache: Option<(Tensor, Tensor)>,
}

impl Multiply {
    /// Creates a new Multiply layer
    pub fn new() -> Self {
        Self { input_cache: None }
    }
}

impl Layer for Multiply {
    fn n_in(&self) -> usize {
        2
    }

    fn n_out(&self) -> usize {
        1
    }

    fn forward(&mut self, inputs: Stack) -> Result<Stack, ModelError> {
        check_arity("Multiply", "forward", 2, inputs.len())?;
        let product = zip_with(inputs[0].view(), inputs[1].view(), |a, b| a * b)?;

        let mut inputs = inputs.into_iter();
        if let (Some(a), Some(b)) = (inputs.next(), inputs.next()) {
            self.input_cache = Some((a, b));
        }
        Ok(vec![product])
    }

    fn backward(&mut self, grad_outputs: Stack) -> Result<Stack, ModelError> {
        check_arity("Multiply", "backward", 1, grad_outputs.len())?;
        let (a, b) = self
            .input_cache
            .as_ref()
            .ok_or_else(|| ModelError::no_forward("Multiply"))?;
        let g = &grad_outputs[0];

        let grad_a = zip_with(g.view(), b.view(), |g, b| g * b)?;
        let grad_b = zip_with(g.view(), a.view(), |g, a| g * a)?;

        Ok(vec![
            unbroadcast(grad_a, a.shape())?,
            unbroadcast(grad_b, b.shape())?,
        ])
    }

    fn layer_type(&self) -> &str {
        "Multiply"
    }
}

/// Sums its input along one axis, or over every element when `axis` is `None`.
///
/// # Fields
///
/// - `axis` - Axis to reduce; negative values count from the end, `None` reduces to a 0-d tensor
/// - `input_shape` - Shape of the last input, used to spread the gradient back out
#[derive(Debug, Clone)]
pub struct Sum {
    axis: Option<isize>,
    input_shape: Option<Vec<usize>>,
}

impl Sum {
    /// Creates a Sum over the given axis
    pub fn new(axis: Option<isize>) -> Self {
        Self {
            axis,
            input_shape: None,
        }
    }

    /// Creates a Sum over every element
    pub fn all() -> Self {
        Self::new(None)
    }

    /// Gets the reduction axis
    pub fn get_axis(&self) -> Option<isize> {
        self.axis
    }
}

impl Default for Sum {
    fn default() -> Self {
        Self::new(Some(-1))
    }
}

impl Layer for Sum {
    fn n_in(&self) -> usize {
        1
    }

    fn n_out(&self) -> usize {
        1
    }

    fn forward(&mut self, inputs: Stack) -> Result<Stack, ModelError> {
        check_arity("Sum", "forward", 1, inputs.len())?;
        let x = &inputs[0];

        let reduced = match self.axis {
            None => scalar(backend::sum(x)),
            Some(axis) => x.sum_axis(Axis(normalize_axis(axis, x.ndim())?)),
        };

        self.input_shape = Some(x.shape().to_vec());
        Ok(vec![reduced])
    }

    fn backward(&mut self, grad_outputs: Stack) -> Result<Stack, ModelError> {
        check_arity("Sum", "backward", 1, grad_outputs.len())?;
        let shape = self
            .input_shape
            .as_ref()
            .ok_or_else(|| ModelError::no_forward("Sum"))?;
        let g = &grad_outputs[0];

        let grad = match self.axis {
            None => Tensor::from_elem(shape.as_slice(), g.sum()),
            Some(axis) => {
                let axis = normalize_axis(axis, shape.len())?;
                broadcast_to(&g.clone().insert_axis(Axis(axis)), shape)?
            }
        };

        Ok(vec![grad])
    }

    fn layer_type(&self) -> &str {
        "Sum"
    }
}
