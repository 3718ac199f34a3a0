use crate::ModelError;
use crate::tensor::{Tensor, broadcast_shape};
use ndarray::{ArrayViewD, IxDyn, Zip};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};

/// Environment variable consulted the first time the backend is queried
pub const BACKEND_ENV_VAR: &str = "MASKMETRIC_BACKEND";

const UNSET: u8 = u8::MAX;

static CURRENT: AtomicU8 = AtomicU8::new(UNSET);

/// Numeric execution engine used by element-wise kernels
///
/// # Variants
///
/// - `Ndarray` - single-threaded ndarray kernels
/// - `Rayon` - ndarray kernels split across the rayon thread pool
///
/// Element-wise kernels give identical values on both backends; reductions may differ
/// in the last bits because rayon sums in a different order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Ndarray,
    Rayon,
}

impl Backend {
    fn to_u8(self) -> u8 {
        match self {
            Backend::Ndarray => 0,
            Backend::Rayon => 1,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Backend::Rayon,
            _ => Backend::Ndarray,
        }
    }

    /// Short lowercase name of the backend
    pub fn name(self) -> &'static str {
        match self {
            Backend::Ndarray => "ndarray",
            Backend::Rayon => "rayon",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Backend {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ndarray" | "numpy" | "cpu" => Ok(Backend::Ndarray),
            "rayon" | "parallel" => Ok(Backend::Rayon),
            other => Err(ModelError::ConfigError(format!(
                "unknown backend '{}', expected 'ndarray' or 'rayon'",
                other
            ))),
        }
    }
}

/// Returns the active backend.
///
/// On first use the backend is read from `MASKMETRIC_BACKEND`; an unset or
/// unrecognised value falls back to `Backend::Ndarray`.
pub fn backend() -> Backend {
    let current = CURRENT.load(Ordering::Relaxed);
    if current != UNSET {
        return Backend::from_u8(current);
    }

    let selected = backend_from_env(std::env::var(BACKEND_ENV_VAR).ok().as_deref());

    // Another thread may have called set_backend in the meantime; keep its choice.
    match CURRENT.compare_exchange(UNSET, selected.to_u8(), Ordering::Relaxed, Ordering::Relaxed) {
        Ok(_) => selected,
        Err(existing) => Backend::from_u8(existing),
    }
}

/// Resolves the raw value of `MASKMETRIC_BACKEND` to a backend.
///
/// `None` selects `Backend::Ndarray`; so does an unrecognised name, after a warning.
pub fn backend_from_env(value: Option<&str>) -> Backend {
    match value {
        Some(value) => value.parse::<Backend>().unwrap_or_else(|e| {
            tracing::warn!("{}; using {}", e, Backend::Ndarray);
            Backend::Ndarray
        }),
        None => Backend::Ndarray,
    }
}

/// Selects the backend used by every subsequent kernel.
pub fn set_backend(selected: Backend) {
    let previous = CURRENT.swap(selected.to_u8(), Ordering::Relaxed);
    if previous != selected.to_u8() {
        tracing::info!(backend = selected.name(), "switched numeric backend");
    }
}

/// Name of the active backend, e.g. `"ndarray"`.
pub fn backend_name() -> &'static str {
    backend().name()
}

/// Applies `f` to every element in place.
pub fn map_inplace<F>(tensor: &mut Tensor, f: F)
where
    F: Fn(f32) -> f32 + Send + Sync,
{
    match backend() {
        Backend::Ndarray => tensor.mapv_inplace(f),
        Backend::Rayon => tensor.par_mapv_inplace(f),
    }
}

/// Sums every element of `tensor`.
pub fn sum(tensor: &Tensor) -> f32 {
    match backend() {
        Backend::Ndarray => tensor.sum(),
        Backend::Rayon => tensor.par_iter().copied().sum::<f32>(),
    }
}

/// Combines two tensors element-wise after broadcasting them to a common shape.
///
/// # Returns
///
/// - `Ok(Tensor)` - Tensor of the broadcast shape holding `f(a, b)` per element
/// - `Err(ModelError::InputValidationError)` - If the shapes are not broadcast-compatible
pub fn zip_with<F>(a: ArrayViewD<f32>, b: ArrayViewD<f32>, f: F) -> Result<Tensor, ModelError>
where
    F: Fn(f32, f32) -> f32 + Send + Sync,
{
    let shape = IxDyn(&broadcast_shape(a.shape(), b.shape())?);
    let incompatible = || {
        ModelError::InputValidationError(format!(
            "shapes {:?} and {:?} cannot be broadcast together",
            a.shape(),
            b.shape()
        ))
    };
    let a_view = a.broadcast(shape.clone()).ok_or_else(incompatible)?;
    let b_view = b.broadcast(shape.clone()).ok_or_else(incompatible)?;

    let mut out = Tensor::zeros(shape);
    let zip = Zip::from(&mut out).and(&a_view).and(&b_view);
    match backend() {
        Backend::Ndarray => zip.for_each(|o, &x, &y| *o = f(x, y)),
        Backend::Rayon => zip.par_for_each(|o, &x, &y| *o = f(x, y)),
    }

    Ok(out)
}
