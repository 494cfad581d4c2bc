//! Error types for metadata resolution.

use thiserror::Error;

/// Errors that can occur while resolving an identifier to metadata.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The metadata service returned no usable record for the identifier.
    ///
    /// Covers zero search results, unknown work keys, non-success API
    /// statuses, and transport failures reaching the service; all of them
    /// mean the lookup produced nothing to continue with.
    #[error("no metadata record for '{identifier}': {reason}")]
    NotFound {
        /// The identifier as given by the caller.
        identifier: String,
        /// Human-readable cause.
        reason: String,
    },

    /// The identifier input itself is unusable (empty or whitespace-only).
    #[error("invalid identifier input: {reason}")]
    Input {
        /// Human-readable cause.
        reason: String,
    },
}

impl ResolveError {
    /// Creates a not-found error with context.
    pub fn not_found(identifier: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NotFound {
            identifier: identifier.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid-input error.
    pub fn input(reason: impl Into<String>) -> Self {
        Self::Input {
            reason: reason.into(),
        }
    }

    /// True for lookup failures (as opposed to unusable input).
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
