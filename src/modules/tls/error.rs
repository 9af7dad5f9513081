//! TLS module error types.

use thiserror::Error;

/// Errors that can occur while loading certificates or sniffing connections.
#[derive(Debug, Error)]
pub enum TlsError {
    /// Certificate PEM data could not be parsed.
    #[error("invalid certificate PEM for '{domain}': {message}")]
    InvalidCertificate {
        /// Domain the certificate was configured for.
        domain: String,
        /// Parser message.
        message: String,
    },

    /// Private key PEM data could not be parsed or is unsupported.
    #[error("invalid private key for '{domain}': {message}")]
    InvalidPrivateKey {
        /// Domain the key was configured for.
        domain: String,
        /// Parser message.
        message: String,
    },

    /// A certificate was configured without its key, or vice versa.
    #[error("certificate and private key for '{0}' must be configured together")]
    IncompletePair(String),

    /// The peer closed the connection before sending a single byte.
    #[error("connection closed before the first byte")]
    ClosedBeforeFirstByte,

    /// IO error while sniffing.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for TLS operations.
pub type TlsResult<T> = Result<T, TlsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TlsError::IncompletePair("a.example.com".to_string());
        assert_eq!(
            err.to_string(),
            "certificate and private key for 'a.example.com' must be configured together"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        let err: TlsError = io_err.into();
        assert!(matches!(err, TlsError::Io(_)));
    }
}
