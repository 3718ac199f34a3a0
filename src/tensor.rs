use crate::ModelError;
use crate::backend;
use ndarray::{Array1, ArrayD, Axis, IxDyn, arr0};

/// Type alias for n-dimensional arrays used as tensors by every layer
pub type Tensor = ArrayD<f32>;

/// The data stack layers read from and write to. Index 0 is the top of the stack.
pub type Stack = Vec<Tensor>;

/// Wraps a single value into a 0-dimensional tensor.
pub fn scalar(value: f32) -> Tensor {
    arr0(value).into_dyn()
}

/// Makes a one-hot tensor (n+1 dims) from a categorical tensor (n dims).
///
/// Element `[..., k]` of the result is `1.0` when `x[...] == k` and `0.0` otherwise,
/// so ids that are negative, fractional or `>= n_categories` yield an all-zero row.
///
/// # Parameters
///
/// - `x` - Tensor of class ids stored as `f32`
/// - `n_categories` - Size of the appended trailing axis
///
/// # Returns
///
/// - `Ok(Tensor)` - Tensor of shape `x.shape() + [n_categories]`
/// - `Err(ModelError::InputValidationError)` - If `n_categories` is zero
///
/// # Example
/// ```rust
/// use maskmetric::tensor::one_hot;
/// use ndarray::array;
///
/// let ids = array![2.0, 0.0].into_dyn();
/// let encoded = one_hot(&ids, 3).unwrap();
/// assert_eq!(encoded, array![[0.0f32, 0.0, 1.0], [1.0, 0.0, 0.0]].into_dyn());
/// ```
pub fn one_hot(x: &Tensor, n_categories: usize) -> Result<Tensor, ModelError> {
    if n_categories == 0 {
        return Err(ModelError::InputValidationError(
            "one_hot needs at least one category".to_string(),
        ));
    }

    let ids = Array1::from_iter((0..n_categories).map(|k| k as f32)).into_dyn();
    let expanded = x.view().insert_axis(Axis(x.ndim()));

    backend::zip_with(expanded, ids.view(), |value, id| {
        if value == id { 1.0 } else { 0.0 }
    })
}

/// Resolves a possibly negative axis against a tensor rank.
///
/// # Returns
///
/// - `Ok(usize)` - The axis counted from the front
/// - `Err(ModelError::InputValidationError)` - If the axis is out of range
pub fn normalize_axis(axis: isize, ndim: usize) -> Result<usize, ModelError> {
    let resolved = if axis < 0 {
        ndim as isize + axis
    } else {
        axis
    };

    if resolved < 0 || resolved >= ndim as isize {
        return Err(ModelError::InputValidationError(format!(
            "axis {} is out of range for a tensor with {} dimension(s)",
            axis, ndim
        )));
    }

    Ok(resolved as usize)
}

/// Computes the shape two operands broadcast to, following numpy rules.
pub fn broadcast_shape(a: &[usize], b: &[usize]) -> Result<Vec<usize>, ModelError> {
    let ndim = a.len().max(b.len());
    let mut shape = vec![0; ndim];

    for i in 0..ndim {
        let da = if i < ndim - a.len() {
            1
        } else {
            a[i - (ndim - a.len())]
        };
        let db = if i < ndim - b.len() {
            1
        } else {
            b[i - (ndim - b.len())]
        };

        shape[i] = match (da, db) {
            (x, y) if x == y => x,
            (1, y) => y,
            (x, 1) => x,
            _ => {
                return Err(ModelError::InputValidationError(format!(
                    "shapes {:?} and {:?} cannot be broadcast together",
                    a, b
                )));
            }
        };
    }

    Ok(shape)
}

/// Sums a gradient computed at a broadcast shape back down to an operand's shape.
pub fn unbroadcast(grad: Tensor, shape: &[usize]) -> Result<Tensor, ModelError> {
    let mut grad = grad;

    while grad.ndim() > shape.len() {
        grad = grad.sum_axis(Axis(0));
    }

    for (axis, &dim) in shape.iter().enumerate() {
        if dim == 1 && grad.shape()[axis] != 1 {
            grad = grad.sum_axis(Axis(axis)).insert_axis(Axis(axis));
        }
    }

    if grad.shape() != shape {
        return Err(ModelError::ProcessingError(format!(
            "gradient of shape {:?} cannot be reduced to {:?}",
            grad.shape(),
            shape
        )));
    }

    Ok(grad)
}

/// Broadcasts `value` to `shape` and returns an owned tensor.
pub fn broadcast_to(value: &Tensor, shape: &[usize]) -> Result<Tensor, ModelError> {
    value
        .broadcast(IxDyn(shape))
        .map(|view| view.to_owned())
        .ok_or_else(|| {
            ModelError::InputValidationError(format!(
                "tensor of shape {:?} cannot be broadcast to {:?}",
                value.shape(),
                shape
            ))
        })
}
