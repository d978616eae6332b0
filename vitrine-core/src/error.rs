//! Error types for Vitrine operations

use thiserror::Error;

/// Transport-layer errors.
///
/// Transport failures, timeouts, and non-2xx responses all land here; the
/// client never retries on its own, so every variant reaches the caller
/// that issued the request. Clone-able so a deduplicated failure can be
/// delivered to every waiter attached to the same in-flight request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Request to {path} timed out")]
    Timeout { path: String },

    #[error("Transport error on {path}: {reason}")]
    Transport { path: String, reason: String },

    #[error("HTTP {status} from {path}: {body}")]
    Status {
        path: String,
        status: u16,
        body: String,
    },

    #[error("Failed to decode response from {path}: {reason}")]
    Decode { path: String, reason: String },

    #[error("Could not build request: {reason}")]
    InvalidRequest { reason: String },
}

/// Client-side input validation errors.
///
/// These fail fast and are never sent over the network.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Mutations require an authenticated user")]
    MutationRequiresUser,
}

/// Errors surfaced by the synchronization layer.
///
/// A stale-response discard is NOT an error - superseded responses are
/// dropped silently and only counted in cache statistics.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("In-flight request for {fingerprint} was abandoned before completing")]
    InflightAbandoned { fingerprint: String },
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing configuration file path (use --config or VITRINE_CONFIG)")]
    MissingConfigPath,

    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_error_is_cloneable_for_waiter_fanout() {
        let err = NetworkError::Timeout {
            path: "/recommendations".to_string(),
        };
        assert_eq!(err.clone(), err);
    }

    #[test]
    fn test_sync_error_wraps_taxonomy() {
        let err: SyncError = ValidationError::MutationRequiresUser.into();
        assert!(matches!(err, SyncError::Validation(_)));

        let err: SyncError = NetworkError::Status {
            path: "/cart".to_string(),
            status: 503,
            body: "unavailable".to_string(),
        }
        .into();
        assert!(matches!(err, SyncError::Network(_)));
    }
}
