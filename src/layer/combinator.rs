use crate::ModelError;
use crate::layer::{call, check_arity};
use crate::tensor::{Stack, Tensor};
use crate::traits::Layer;

/// Builds a [`Serial`] from a list of layers.
///
/// # Example
/// ```rust
/// use maskmetric::layer::Drop;
/// use maskmetric::prelude::*;
///
/// let layer = serial![Drop::new(), WeightMask::new(Some(0.0)), Sum::all()];
/// assert_eq!((layer.n_in(), layer.n_out()), (2, 1));
/// ```
#[macro_export]
macro_rules! serial {
    ($($layer:expr),* $(,)?) => {
        $crate::layer::Serial::new(vec![
            $(Box::new($layer) as Box<dyn $crate::traits::Layer>),*
        ])
    };
}

/// Builds a [`Parallel`] from a list of layers.
#[macro_export]
macro_rules! parallel {
    ($($layer:expr),* $(,)?) => {
        $crate::layer::Parallel::new(vec![
            $(Box::new($layer) as Box<dyn $crate::traits::Layer>),*
        ])
    };
}

/// Combinator that applies layers one after another over a shared data stack.
///
/// Each sublayer takes its `n_in` values from the top of the stack and pushes its
/// `n_out` results back; values it does not consume pass underneath it untouched.
///
/// # Fields
///
/// - `layers` - Sublayers in application order
/// - `n_in` - Deepest stack the sublayers reach into
/// - `n_out` - Values left on the stack afterwards
pub struct Serial {
    layers: Vec<Box<dyn Layer>>,
    n_in: usize,
    n_out: usize,
}

impl Serial {
    /// Creates a Serial from the given layers
    pub fn new(layers: Vec<Box<dyn Layer>>) -> Self {
        let (n_in, n_out) = serial_arity(&layers);
        Self {
            layers,
            n_in,
            n_out,
        }
    }

    /// Appends a layer and recomputes the arity
    ///
    /// # Returns
    ///
    /// * `&mut Serial` - Mutable reference to self for method chaining
    pub fn add<L: 'static + Layer>(&mut self, layer: L) -> &mut Self {
        self.layers.push(Box::new(layer));
        let (n_in, n_out) = serial_arity(&self.layers);
        self.n_in = n_in;
        self.n_out = n_out;
        self
    }

    /// Number of sublayers
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Returns `true` when the Serial has no sublayers
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

/// Stack depth reached and values left behind when running `layers` in order.
fn serial_arity(layers: &[Box<dyn Layer>]) -> (usize, usize) {
    let mut running_max = 0usize;
    let mut running_total = 0isize;

    for layer in layers {
        running_total += layer.n_in() as isize;
        running_max = running_max.max(running_total.max(0) as usize);
        running_total -= layer.n_out() as isize;
    }

    let n_out = running_max as isize - running_total;
    (running_max, n_out.max(0) as usize)
}

impl Layer for Serial {
    fn n_in(&self) -> usize {
        self.n_in
    }

    fn n_out(&self) -> usize {
        self.n_out
    }

    fn forward(&mut self, inputs: Stack) -> Result<Stack, ModelError> {
        check_arity("Serial", "forward", self.n_in, inputs.len())?;

        let mut stack = inputs;
        for (i, layer) in self.layers.iter_mut().enumerate() {
            let n_in = layer.n_in();
            if stack.len() < n_in {
                return Err(ModelError::arity(layer.layer_type(), "forward", n_in, stack.len()));
            }
            let rest = stack.split_off(n_in);
            let mut outputs = call(layer, stack)?;
            tracing::debug!(
                index = i,
                layer = layer.layer_type(),
                shapes = ?outputs.iter().map(|t| t.shape().to_vec()).collect::<Vec<_>>(),
                "serial step"
            );
            outputs.extend(rest);
            stack = outputs;
        }

        Ok(stack)
    }

    fn backward(&mut self, grad_outputs: Stack) -> Result<Stack, ModelError> {
        check_arity("Serial", "backward", self.n_out, grad_outputs.len())?;

        let mut grads = grad_outputs;
        for layer in self.layers.iter_mut().rev() {
            let n_out = layer.n_out();
            if grads.len() < n_out {
                return Err(ModelError::arity(layer.layer_type(), "backward", n_out, grads.len()));
            }
            let rest = grads.split_off(n_out);
            let mut input_grads = layer.backward(grads)?;
            check_arity(layer.layer_type(), "gradient", layer.n_in(), input_grads.len())?;
            input_grads.extend(rest);
            grads = input_grads;
        }

        Ok(grads)
    }

    fn layer_type(&self) -> &str {
        "Serial"
    }

    fn sublayers(&self) -> Vec<&dyn Layer> {
        self.layers.iter().map(|l| l.as_ref()).collect()
    }
}

/// Combinator that applies each sublayer to its own consecutive slice of the stack.
///
/// With sublayers `F` (2 in) and `G` (1 in), the inputs `(a, b, c)` are routed as
/// `F(a, b)` and `G(c)`, and the outputs are concatenated in the same order.
pub struct Parallel {
    layers: Vec<Box<dyn Layer>>,
}

impl Parallel {
    /// Creates a Parallel from the given layers
    pub fn new(layers: Vec<Box<dyn Layer>>) -> Self {
        Self { layers }
    }
}

impl Layer for Parallel {
    fn n_in(&self) -> usize {
        self.layers.iter().map(|l| l.n_in()).sum()
    }

    fn n_out(&self) -> usize {
        self.layers.iter().map(|l| l.n_out()).sum()
    }

    fn forward(&mut self, inputs: Stack) -> Result<Stack, ModelError> {
        check_arity("Parallel", "forward", self.n_in(), inputs.len())?;

        let mut remaining = inputs;
        let mut outputs = Vec::with_capacity(self.n_out());
        for layer in self.layers.iter_mut() {
            let rest = remaining.split_off(layer.n_in());
            outputs.extend(call(layer, remaining)?);
            remaining = rest;
        }

        Ok(outputs)
    }

    fn backward(&mut self, grad_outputs: Stack) -> Result<Stack, ModelError> {
        check_arity("Parallel", "backward", self.n_out(), grad_outputs.len())?;

        let mut remaining = grad_outputs;
        let mut grads = Vec::with_capacity(self.n_in());
        for layer in self.layers.iter_mut() {
            let rest = remaining.split_off(layer.n_out());
            let input_grads = layer.backward(remaining)?;
            check_arity(layer.layer_type(), "gradient", layer.n_in(), input_grads.len())?;
            grads.extend(input_grads);
            remaining = rest;
        }

        Ok(grads)
    }

    fn layer_type(&self) -> &str {
        "Parallel"
    }

    fn sublayers(&self) -> Vec<&dyn Layer> {
        self.layers.iter().map(|l| l.as_ref()).collect()
    }
}

/// Passes its single input through unchanged; the empty branch of a [`Parallel`].
#[derive(Debug, Default, Clone, Copy)]
pub struct Identity;

impl Identity {
    /// Creates a new Identity layer
    pub fn new() -> Self {
        Self
    }
}

impl Layer for Identity {
    fn n_in(&self) -> usize {
        1
    }

    fn n_out(&self) -> usize {
        1
    }

    fn forward(&mut self, inputs: Stack) -> Result<Stack, ModelError> {
        check_arity("Identity", "forward", 1, inputs.len())?;
        Ok(inputs)
    }

    fn backward(&mut self, grad_outputs: Stack) -> Result<Stack, ModelError> {
        check_arity("Identity", "backward", 1, grad_outputs.len())?;
        Ok(grad_outputs)
    }

    fn layer_type(&self) -> &str {
        "Identity"
    }
}

/// Duplicates the top of the stack.
#[derive(Debug, Default, Clone, Copy)]
pub struct Dup;

impl Dup {
    /// Creates a new Dup layer
    pub fn new() -> Self {
        Self
    }
}

impl Layer for Dup {
    fn n_in(&self) -> usize {
        1
    }

    fn n_out(&self) -> usize {
        2
    }

    fn forward(&mut self, inputs: Stack) -> Result<Stack, ModelError> {
        check_arity("Dup", "forward", 1, inputs.len())?;
        let mut inputs = inputs;
        let x = inputs.swap_remove(0);
        Ok(vec![x.clone(), x])
    }

    fn backward(&mut self, grad_outputs: Stack) -> Result<Stack, ModelError> {
        check_arity("Dup", "backward", 2, grad_outputs.len())?;
        if grad_outputs[0].shape() != grad_outputs[1].shape() {
            return Err(ModelError::ProcessingError(format!(
                "Dup: gradients of shapes {:?} and {:?} do not match",
                grad_outputs[0].shape(),
                grad_outputs[1].shape()
            )));
        }
        Ok(vec![&grad_outputs[0] + &grad_outputs[1]])
    }

    fn layer_type(&self) -> &str {
        "Dup"
    }
}

/// Discards the top of the stack.
#[derive(Debug, Default, Clone)]
pub struct Drop {
    /// Shape of the discarded value, kept for the zero gradient
    shape_cache: Option<Vec<usize>>,
}

impl Drop {
    /// Creates a new Drop layer
    pub fn new() -> Self {
        Self { shape_cache: None }
    }
}

impl Layer for Drop {
    fn n_in(&self) -> usize {
        1
    }

    fn n_out(&self) -> usize {
        0
    }

    fn forward(&mut self, inputs: Stack) -> Result<Stack, ModelError> {
        check_arity("Drop", "forward", 1, inputs.len())?;
        self.shape_cache = Some(inputs[0].shape().to_vec());
        Ok(Vec::new())
    }

    fn backward(&mut self, grad_outputs: Stack) -> Result<Stack, ModelError> {
        check_arity("Drop", "backward", 0, grad_outputs.len())?;
        let shape = self
            .shape_cache
            .as_ref()
            .ok_or_else(|| ModelError::no_forward("Drop"))?;
        Ok(vec![Tensor::zeros(shape.as_slice())])
    }

    fn layer_type(&self) -> &str {
        "Drop"
    }
}

type ForwardFn = Box<dyn Fn(&[Tensor]) -> Result<Stack, ModelError> + Send + Sync>;
type GradFn = Box<dyn Fn(&[Tensor], &[Tensor]) -> Result<Stack, ModelError> + Send + Sync>;

/// A layer defined by a closure.
///
/// The closure receives the `n_in` inputs and must return `n_out` outputs. A gradient
/// closure, receiving the cached inputs and the output gradients, is optional; a
/// Lambda without one fails in `backward`.
///
/// # Example
/// ```rust
/// use maskmetric::prelude::*;
/// use ndarray::array;
///
/// let mut add = Lambda::new("Add", 2, 1, |xs| Ok(vec![&xs[0] + &xs[1]]));
/// let out = call(&mut add, vec![array![2.0].into_dyn(), array![3.0].into_dyn()]).unwrap();
/// assert_eq!(out[0], array![5.0f32].into_dyn());
/// ```
pub struct Lambda {
    name: String,
    n_in: usize,
    n_out: usize,
    f: ForwardFn,
    grad: Option<GradFn>,
    input_cache: Option<Stack>,
}

impl Lambda {
    /// Creates a Lambda layer
    ///
    /// # Parameters
    ///
    /// - `name` - Layer type reported by `layer_type`
    /// - `n_in` - Number of inputs the closure takes
    /// - `n_out` - Number of outputs the closure returns
    /// - `f` - The forward computation
    pub fn new<F>(name: &str, n_in: usize, n_out: usize, f: F) -> Self
    where
        F: Fn(&[Tensor]) -> Result<Stack, ModelError> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            n_in,
            n_out,
            f: Box::new(f),
            grad: None,
            input_cache: None,
        }
    }

    /// Attaches a gradient closure `(inputs, grad_outputs) -> grad_inputs`
    pub fn with_grad<G>(mut self, grad: G) -> Self
    where
        G: Fn(&[Tensor], &[Tensor]) -> Result<Stack, ModelError> + Send + Sync + 'static,
    {
        self.grad = Some(Box::new(grad));
        self
    }

    /// Creates a one-input layer that multiplies its input by `factor`
    pub fn scale(name: &str, factor: f32) -> Self {
        Lambda::new(name, 1, 1, move |xs| Ok(vec![&xs[0] * factor]))
            .with_grad(move |_, gs| Ok(vec![&gs[0] * factor]))
    }
}

impl Layer for Lambda {
    fn n_in(&self) -> usize {
        self.n_in
    }

    fn n_out(&self) -> usize {
        self.n_out
    }

    fn forward(&mut self, inputs: Stack) -> Result<Stack, ModelError> {
        check_arity(&self.name, "forward", self.n_in, inputs.len())?;
        let outputs = (self.f)(&inputs)?;
        check_arity(&self.name, "output", self.n_out, outputs.len())?;
        self.input_cache = Some(inputs);
        Ok(outputs)
    }

    fn backward(&mut self, grad_outputs: Stack) -> Result<Stack, ModelError> {
        check_arity(&self.name, "backward", self.n_out, grad_outputs.len())?;
        let grad = self.grad.as_ref().ok_or_else(|| {
            ModelError::ProcessingError(format!("{}: no gradient is defined", self.name))
        })?;
        let inputs = self
            .input_cache
            .as_ref()
            .ok_or_else(|| ModelError::no_forward(&self.name))?;
        grad(inputs, &grad_outputs)
    }

    fn layer_type(&self) -> &str {
        &self.name
    }
}
