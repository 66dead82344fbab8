// src/errors.rs
use thiserror::Error;

/// Main error type for the swiftaid-driver core.
#[derive(Debug, Error)]
pub enum SwiftaidError {
    // Network and HTTP client errors
    #[error("Request timed out")]
    Timeout,

    #[error("Network connection error: {0}")]
    NetworkConnection(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Server returned {status}: {message}")]
    ApiStatus { status: u16, message: String },

    // Authentication errors
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Session expired, re-login required")]
    AuthExpired,

    // Serialization and parsing errors
    #[error("JSON parsing error: {0}")]
    JsonParsing(String),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(String),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    // Durable storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    // Realtime channel errors
    #[error("Realtime channel closed")]
    ChannelClosed,

    // Ride lifecycle errors
    #[error("Ride not found: {0}")]
    RideNotFound(String),

    #[error("No accepted ride")]
    NoAcceptedRide,

    #[error("Invalid ride status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Cancellation not allowed for ride {0}")]
    CancellationNotAllowed(String),

    // Navigation errors
    #[error("Route provider error: {0}")]
    RouteProvider(String),

    #[error("Polyline decode error: {0}")]
    PolylineDecode(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),
}

// Convenience type alias for Results
pub type SwiftaidResult<T> = Result<T, SwiftaidError>;

// Conversion implementations for common error types
impl From<reqwest::Error> for SwiftaidError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SwiftaidError::Timeout
        } else if err.is_connect() {
            SwiftaidError::NetworkConnection(err.to_string())
        } else {
            SwiftaidError::HttpClient(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SwiftaidError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_syntax() || err.is_data() || err.is_eof() {
            SwiftaidError::JsonParsing(err.to_string())
        } else {
            SwiftaidError::JsonSerialization(err.to_string())
        }
    }
}

impl From<std::io::Error> for SwiftaidError {
    fn from(err: std::io::Error) -> Self {
        SwiftaidError::Storage(err.to_string())
    }
}

// Helper functions for creating common errors
impl SwiftaidError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        SwiftaidError::Unauthorized(msg.into())
    }

    pub fn api_status(status: u16, message: impl Into<String>) -> Self {
        SwiftaidError::ApiStatus {
            status,
            message: message.into(),
        }
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        SwiftaidError::Storage(msg.into())
    }

    pub fn invalid_transition(from: impl ToString, to: impl ToString) -> Self {
        SwiftaidError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn route_provider(msg: impl Into<String>) -> Self {
        SwiftaidError::RouteProvider(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        SwiftaidError::Configuration(msg.into())
    }

    /// True for errors the gateway is allowed to retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SwiftaidError::Timeout)
    }

    /// True when the caller should force a re-login.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            SwiftaidError::AuthExpired | SwiftaidError::Unauthorized(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = SwiftaidError::RideNotFound("ride-42".to_string());
        assert_eq!(error.to_string(), "Ride not found: ride-42");

        let error = SwiftaidError::ApiStatus {
            status: 500,
            message: "boom".to_string(),
        };
        assert_eq!(error.to_string(), "Server returned 500: boom");
    }

    #[test]
    fn test_invalid_transition_display() {
        let error = SwiftaidError::invalid_transition("COMPLETED", "START");
        assert_eq!(
            error.to_string(),
            "Invalid ride status transition: COMPLETED -> START"
        );
    }

    #[test]
    fn test_only_timeout_is_retryable() {
        assert!(SwiftaidError::Timeout.is_retryable());
        assert!(!SwiftaidError::NetworkConnection("x".into()).is_retryable());
        assert!(!SwiftaidError::api_status(500, "x").is_retryable());
        assert!(!SwiftaidError::AuthExpired.is_retryable());
    }

    #[test]
    fn test_auth_failure_classification() {
        assert!(SwiftaidError::AuthExpired.is_auth_failure());
        assert!(SwiftaidError::unauthorized("nope").is_auth_failure());
        assert!(!SwiftaidError::Timeout.is_auth_failure());
    }

    #[test]
    fn test_helper_functions() {
        assert!(matches!(
            SwiftaidError::unauthorized("test"),
            SwiftaidError::Unauthorized(_)
        ));
        assert!(matches!(
            SwiftaidError::storage("test"),
            SwiftaidError::Storage(_)
        ));
        assert!(matches!(
            SwiftaidError::configuration("test"),
            SwiftaidError::Configuration(_)
        ));
    }

    #[test]
    fn test_serde_json_conversion() {
        let err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let converted: SwiftaidError = err.into();
        assert!(matches!(converted, SwiftaidError::JsonParsing(_)));
    }
}
