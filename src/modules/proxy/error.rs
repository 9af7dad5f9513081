//! Proxy module error types.

use thiserror::Error;

use crate::modules::load_balancer::LoadBalancerError;
use crate::modules::router::RouterError;
use crate::modules::tls::TlsError;
use crate::provider::ProviderError;

/// Errors from proxy manager operations and request forwarding.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// A listener could not bind its port.
    #[error("failed to bind port {port}: {source}")]
    Bind {
        /// The port.
        port: u16,
        /// Bind error.
        source: std::io::Error,
    },

    /// A target URL could not be parsed.
    #[error("invalid target URL '{0}'")]
    InvalidTarget(String),

    /// The upstream request failed.
    #[error("upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),

    /// Building an HTTP message failed.
    #[error("HTTP error: {0}")]
    Http(#[from] http::Error),

    /// A referenced configuration entity is missing.
    #[error("unknown {entity} {id}")]
    UnknownEntity {
        /// Entity kind.
        entity: &'static str,
        /// Entity identifier.
        id: u64,
    },

    /// Route registration failed.
    #[error(transparent)]
    Router(#[from] RouterError),

    /// Certificate loading failed.
    #[error(transparent)]
    Tls(#[from] TlsError),

    /// Target selection failed.
    #[error(transparent)]
    LoadBalancer(#[from] LoadBalancerError),

    /// The configuration collaborator failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Result type for proxy operations.
pub type ProxyResult<T> = Result<T, ProxyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProxyError::UnknownEntity {
            entity: "certificate",
            id: 9,
        };
        assert_eq!(err.to_string(), "unknown certificate 9");

        let err = ProxyError::InvalidTarget("not a url".to_string());
        assert_eq!(err.to_string(), "invalid target URL 'not a url'");
    }
}
