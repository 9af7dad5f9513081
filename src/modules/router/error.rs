//! Router error types.

use thiserror::Error;

/// Errors that can occur while mutating the segment trie.
#[derive(Debug, Error)]
pub enum RouterError {
    /// A `{...}` path segment does not compile as a regular expression.
    #[error("invalid regex segment '{segment}': {source}")]
    InvalidRegex {
        /// The raw segment text, braces included.
        segment: String,
        /// Underlying regex error.
        #[source]
        source: regex::Error,
    },
}

/// Result type for router operations.
pub type RouterResult<T> = Result<T, RouterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let source = regex::Regex::new("[").unwrap_err();
        let err = RouterError::InvalidRegex {
            segment: "{[}".to_string(),
            source,
        };
        assert!(err.to_string().starts_with("invalid regex segment '{[}'"));
    }
}
