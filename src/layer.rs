/// Layers that compose other layers: Serial, Parallel, Dup, Drop, Identity and Lambda
pub mod combinator;
/// Arithmetic primitives: Multiply and Sum
pub mod elementwise;
/// Per-element metric layers and the masking/weighting layers they are combined with
pub mod metric_layer;

pub use combinator::*;
pub use elementwise::*;
pub use metric_layer::*;

use crate::ModelError;
use crate::tensor::Stack;
use crate::traits::Layer;

/// Runs a layer forward after checking that exactly `n_in` values were supplied.
///
/// # Parameters
///
/// - `layer` - The layer to run
/// - `inputs` - Values for the layer, top of stack first
///
/// # Returns
///
/// - `Ok(Stack)` - The layer outputs
/// - `Err(ModelError::InputValidationError)` - If the arity is wrong or the layer rejects the inputs
///
/// # Example
/// ```rust
/// use maskmetric::prelude::*;
/// use ndarray::array;
///
/// let mut l2 = L2::new();
/// let out = call(&mut l2, vec![array![[1.0, 2.0]].into_dyn(), array![[0.0, 0.0]].into_dyn()]).unwrap();
/// assert_eq!(out[0], array![5.0f32].into_dyn());
/// ```
pub fn call<L: Layer + ?Sized>(layer: &mut L, inputs: Stack) -> Result<Stack, ModelError> {
    check_arity(layer.layer_type(), "forward", layer.n_in(), inputs.len())?;
    let outputs = layer.forward(inputs)?;
    check_arity(layer.layer_type(), "output", layer.n_out(), outputs.len())?;
    Ok(outputs)
}

/// Returns a nested description of a layer and its sublayers.
///
/// Each line reads `Type_in{n}_out{m}`; composed layers list their children in brackets.
pub fn describe<L: Layer + ?Sized>(layer: &L) -> String {
    let mut out = String::new();
    describe_into(layer, 0, &mut out);
    out
}

fn describe_into<L: Layer + ?Sized>(layer: &L, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    let sublayers = layer.sublayers();
    out.push_str(&format!(
        "{}{}_in{}_out{}",
        indent,
        layer.layer_type(),
        layer.n_in(),
        layer.n_out()
    ));

    if sublayers.is_empty() {
        out.push('\n');
        return;
    }

    out.push_str("[\n");
    for sublayer in sublayers {
        describe_into(sublayer, depth + 1, out);
    }
    out.push_str(&format!("{}]\n", indent));
}

pub(crate) fn check_arity(
    layer: &str,
    direction: &str,
    expected: usize,
    got: usize,
) -> Result<(), ModelError> {
    if expected != got {
        return Err(ModelError::arity(layer, direction, expected, got));
    }
    Ok(())
}
