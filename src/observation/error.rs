//! Observation configuration errors.

use thiserror::Error;

/// Raised by [`Observation::create`](crate::observation::Observation::create)
/// before any observation exists.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ObservationError {
    #[error("observation name must not be empty")]
    EmptyName,

    #[error("observation name `{0}` must not contain whitespace")]
    InvalidName(String),
}

/// Technical names end up as metric names, so they are kept to one token.
pub(crate) fn validate_name(name: &str) -> Result<(), ObservationError> {
    if name.trim().is_empty() {
        return Err(ObservationError::EmptyName);
    }
    if name.chars().any(char::is_whitespace) {
        return Err(ObservationError::InvalidName(name.to_string()));
    }
    Ok(())
}
