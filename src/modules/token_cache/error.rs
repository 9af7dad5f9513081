//! Token cache error types.

use thiserror::Error;

/// Errors from token position parsing.
#[derive(Debug, Error)]
pub enum TokenError {
    /// A token position string does not have the `side:location:key` shape.
    #[error("malformed token position '{0}'")]
    InvalidPosition(String),

    /// The side or location name is not one this gateway extracts from.
    #[error("unsupported token position '{side}:{location}'")]
    UnsupportedPosition {
        /// `request` or `response`.
        side: String,
        /// Where within the message the token lives.
        location: String,
    },
}

/// Result type for token cache operations.
pub type TokenResult<T> = Result<T, TokenError>;
