pub use crate::ModelError;
pub use crate::backend::{Backend, backend, backend_name, set_backend};
pub use crate::config::MetricConfig;
// `Drop` stays out so it does not shadow `std::ops::Drop`; use `layer::Drop`.
pub use crate::layer::{
    Accuracy, CrossEntropy, Dup, Identity, L2, Lambda, Multiply, Parallel, Serial, Sum,
    WeightMask, WeightedMean, call, describe,
};
pub use crate::loss::MaskedLoss;
pub use crate::metric::*;
pub use crate::tensor::{Stack, Tensor, one_hot, scalar};
pub use crate::traits::{Layer, LossFunction};
pub use crate::{parallel, serial};
