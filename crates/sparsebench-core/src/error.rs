use thiserror::Error;

/// Canonical error type for sparsebench core and engine operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A run configuration was rejected before any work was scheduled.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Entity was not found (e.g. an unknown session).
    #[error("{entity} `{id}` was not found")]
    NotFound {
        /// Entity type name (e.g. `"session"`).
        entity: &'static str,
        /// Identifier of the missing entity.
        id: String,
    },

    /// Operation violates the current lifecycle state.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Human-readable explanation of the invalid state.
        message: String,
    },

    /// Unexpected internal error occurred.
    #[error("internal error: {message}")]
    Internal {
        /// Human-readable details for debugging purposes.
        message: String,
    },
}

impl CoreError {
    /// Creates an `InvalidConfig` variant.
    #[must_use]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Creates a `NotFound` variant.
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Creates an `InvalidState` variant.
    #[must_use]
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Creates an `Internal` variant.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Convenient result alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            CoreError::not_found("session", "abc").to_string(),
            "session `abc` was not found"
        );
        assert_eq!(
            CoreError::invalid_config("duration must be > 0").to_string(),
            "invalid configuration: duration must be > 0"
        );
    }
}
