// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors surfaced to producers calling the tracker.
///
/// Delivery failures never show up here; they are handled inside the pipeline
/// and reported through the error callback.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("Backlog is full ({capacity} records), record for stream '{stream}' rejected")]
    CapacityExceeded { stream: String, capacity: usize },

    #[error("Tracker has been stopped")]
    TrackerStopped,

    #[error("Failed to serialize record: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
}

/// Configuration values that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be greater than 0")]
    Zero(&'static str),

    #[error("Endpoint cannot be empty")]
    EmptyEndpoint,

    #[error("Invalid log level '{0}'. Must be one of: trace, debug, info, warn, error")]
    LogLevel(String),
}

/// Reasons the dispatch pool refused a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("Dispatch pool queue is full")]
    PoolFull,

    #[error("Dispatch pool has been stopped")]
    PoolStopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_exceeded_display() {
        let error = TrackerError::CapacityExceeded {
            stream: "clicks".to_string(),
            capacity: 10,
        };
        assert_eq!(
            error.to_string(),
            "Backlog is full (10 records), record for stream 'clicks' rejected"
        );
    }

    #[test]
    fn test_config_error_wraps_into_tracker_error() {
        let error: TrackerError = ConfigError::Zero("batch_size").into();
        assert_eq!(
            error.to_string(),
            "Invalid configuration: batch_size must be greater than 0"
        );
    }

    #[test]
    fn test_serialization_error_from_serde() {
        let serde_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let error: TrackerError = serde_error.into();
        assert!(matches!(error, TrackerError::Serialization(_)));
    }
}
