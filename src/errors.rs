//! Error types that callers may want to match on after downcasting an [`anyhow::Error`].

use std::error::Error;
use std::fmt;

/// Error raised when the grid, group or communicator are inconsistent with one another.
///
/// This is always fatal: no orbit is built and no field is touched once this has been raised.
#[derive(Debug, Clone)]
pub struct ConfigurationError(pub String);

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Configuration error: {}", self.0)
    }
}

impl Error for ConfigurationError {}

/// Error raised when a symmetry operation belongs to a family that the phase and conjugation
/// model cannot represent.
#[derive(Debug, Clone)]
pub struct UnsupportedOperationError(pub String);

impl fmt::Display for UnsupportedOperationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Unsupported symmetry operation: {}", self.0)
    }
}

impl Error for UnsupportedOperationError {}
