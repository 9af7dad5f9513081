//! Configuration provider error types.

use thiserror::Error;

/// Errors from the configuration collaborator.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// A referenced entity does not exist.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity kind, e.g. `service` or `certificate`.
        entity: &'static str,
        /// Entity identifier.
        id: u64,
    },

    /// The seed file could not be read.
    #[error("failed to read seed file: {0}")]
    Io(#[from] std::io::Error),

    /// The seed file could not be parsed.
    #[error("failed to parse seed file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProviderError::NotFound {
            entity: "service",
            id: 42,
        };
        assert_eq!(err.to_string(), "service 42 not found");
    }
}
