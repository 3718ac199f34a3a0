//! Masked and weighted metric layers built from composable stack layers.
//!
//! A [`Layer`](traits::Layer) takes a fixed number of tensors from a data stack and
//! pushes a fixed number back. Metrics such as cross-entropy, L2 and accuracy are
//! small graphs of primitive layers (`Multiply`, `Sum`, `WeightMask`, ...) wired with
//! combinators (`Serial`, `Parallel`, `Dup`, `Drop`), so masking padding positions or
//! weighting them is a matter of composition. Every layer also runs backward, so the
//! loss variants provide gradients with respect to the predictions.
//!
//! # Example
//! ```rust
//! use maskmetric::prelude::*;
//! use ndarray::array;
//!
//! let predictions = array![[0.1, 0.9], [0.8, 0.2], [0.3, 0.7]].into_dyn();
//! let targets = array![1.0, 1.0, 0.0].into_dyn();
//!
//! // Id 0 marks padding, so only the first two positions count.
//! let mut accuracy = accuracy_scalar(Some(0.0), false);
//! let out = call(&mut accuracy, vec![predictions, targets]).unwrap();
//! assert_eq!(out[0].sum(), 0.5);
//! ```

/// Module `error` defines the crate-wide error type
pub mod error;

/// Module `tensor` contains the tensor aliases and shape helpers shared by all layers,
/// including one-hot encoding
pub mod tensor;

/// Module `backend` selects the numeric execution engine used by element-wise kernels
///
/// # Backends
/// - `Ndarray` - single-threaded ndarray kernels (default)
/// - `Rayon` - the same kernels split across the rayon thread pool
///
/// The backend can be chosen with `set_backend` or the `MASKMETRIC_BACKEND` environment variable.
pub mod backend;

/// Module `traits` defines the `Layer` and `LossFunction` interfaces
pub mod traits;

/// Module `layer` contains the primitive layers and combinators
///
/// ## Combinators
/// - `Serial`, `Parallel` - sequential and side-by-side composition
/// - `Dup`, `Drop`, `Identity` - stack manipulation
/// - `Lambda` - a layer from a closure
///
/// ## Primitives
/// - `Multiply`, `Sum`
///
/// ## Metric layers
/// - `CrossEntropy`, `L2`, `Accuracy` - per-position metrics
/// - `WeightMask`, `WeightedMean` - masking and weighted averaging
pub mod layer;

/// Module `metric` builds masked scalar metrics such as `cross_entropy_scalar` and `accuracy_scalar`
pub mod metric;

/// Module `loss` adapts scalar metric layers to the `LossFunction` interface
pub mod loss;

/// Module `config` holds the serde-backed metric configuration
pub mod config;

/// Convenient re-exports of the most used items
pub mod prelude;

pub use error::ModelError;
