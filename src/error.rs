use thiserror::Error;

/// Failure signalled by a middleware. Aborts the chain; the message becomes
/// the body of the 500 response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct MiddlewareError {
    message: String,
}

impl MiddlewareError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&str> for MiddlewareError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for MiddlewareError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// Errors surfaced by the gateway outside of request handling.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid bind address {0}")]
    BindAddress(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_middleware_error_display_is_message() {
        let err = MiddlewareError::new("token rejected");
        assert_eq!(err.to_string(), "token rejected");
        assert_eq!(err.message(), "token rejected");
    }

    #[test]
    fn test_middleware_error_from_str() {
        let err: MiddlewareError = "denied".into();
        assert_eq!(err, MiddlewareError::new("denied"));
    }

    #[test]
    fn test_config_error_display() {
        let err = GatewayError::Config("behaver.expire must be greater than zero".into());
        assert_eq!(
            err.to_string(),
            "invalid configuration: behaver.expire must be greater than zero"
        );
    }
}
