//! Load balancer error types.

use thiserror::Error;

/// Errors that can occur during target selection.
#[derive(Debug, Error)]
pub enum LoadBalancerError {
    /// The route has no upstream targets to pick from.
    #[error("no targets available for route '{0}'")]
    NoTargets(String),

    /// Unknown balancing policy name in configuration.
    #[error("unknown load balancing policy '{0}'")]
    UnknownPolicy(String),

    /// A target registered with weight zero.
    #[error("target '{0}' has zero weight")]
    ZeroWeight(String),
}

/// Result type for load balancer operations.
pub type LoadBalancerResult<T> = Result<T, LoadBalancerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LoadBalancerError::NoTargets("/api".to_string());
        assert_eq!(err.to_string(), "no targets available for route '/api'");

        let err = LoadBalancerError::UnknownPolicy("fastest".to_string());
        assert_eq!(err.to_string(), "unknown load balancing policy 'fastest'");
    }
}
