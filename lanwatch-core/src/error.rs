//! Validation error types

use thiserror::Error;

/// Validation error for paginators, rate limit rules and request fields
///
/// Routes return it for bad query parameters and path segments (severity,
/// sort order, MAC address). Cursors are the exception: an unreadable cursor
/// degrades to the first page instead of erroring.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Field is empty when it shouldn't be
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// String doesn't match required format
    #[error("{field}: {reason}")]
    InvalidFormat {
        field: &'static str,
        reason: &'static str,
    },

    /// Numeric value outside the accepted range
    #[error("{field} must be at least {min}")]
    TooSmall { field: &'static str, min: u64 },
}
