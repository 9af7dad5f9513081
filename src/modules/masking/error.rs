//! Masking error types.

use thiserror::Error;

/// Errors that can occur while parsing or applying mask rules.
#[derive(Debug, Error)]
pub enum MaskError {
    /// The rule string is not `{type}-{replacement}`.
    #[error("invalid mask pattern: '{0}'")]
    InvalidPattern(String),

    /// The replacement part of the rule is empty.
    #[error("invalid mask replacement in pattern: '{0}'")]
    EmptyReplacement(String),

    /// The mask type is not one of all/each/start/middle/end.
    #[error("invalid mask type: '{0}'")]
    InvalidType(String),
}

/// Result type for masking operations.
pub type MaskResult<T> = Result<T, MaskError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MaskError::InvalidPattern("bogus".to_string());
        assert_eq!(err.to_string(), "invalid mask pattern: 'bogus'");

        let err = MaskError::InvalidType("half".to_string());
        assert_eq!(err.to_string(), "invalid mask type: 'half'");
    }
}
