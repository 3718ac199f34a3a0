use thiserror::Error;

/// Error types that can occur while building or running metric layers
///
/// # Variants
///
/// - `InputValidationError` - the values handed to a layer do not meet the expected arity, shape or range
/// - `ProcessingError` - something went wrong while a layer was computing, e.g. backward before forward
/// - `ConfigError` - a metric configuration could not be read or parsed
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Input validation error: {0}")]
    InputValidationError(String),
    #[error("Processing error: {0}")]
    ProcessingError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ModelError {
    /// Builds the error reported when a layer receives the wrong number of values.
    pub(crate) fn arity(layer: &str, direction: &str, expected: usize, got: usize) -> Self {
        ModelError::InputValidationError(format!(
            "{} {} expects {} value(s) on the stack, got {}",
            layer, direction, expected, got
        ))
    }

    /// Builds the error reported when `backward` runs without a cached forward pass.
    pub(crate) fn no_forward(layer: &str) -> Self {
        ModelError::ProcessingError(format!(
            "{}: backward called before forward",
            layer
        ))
    }
}
