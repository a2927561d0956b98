// ABOUTME: Error types for backend calls and job status polling
// ABOUTME: Keeps transport, protocol and configuration failures apart from a failed job

use std::time::Duration;

use thiserror::Error;

/// A status query that could not produce a usable response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The backend answered with a non-success HTTP status.
    #[error("{message}")]
    Status { code: u16, message: String },
    #[error("Network error: {0}")]
    Network(String),
    #[error("Malformed status response: {0}")]
    Decode(String),
    #[error("Status query timed out after {0:?}")]
    Timeout(Duration),
}

/// A well-formed response that breaks the job record invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Job {0} reported COMPLETED without output files")]
    MissingOutputs(String),
    #[error("Job {0} reported COMPLETED without a processing time")]
    MissingProcessingTime(String),
    #[error("Status response for job {actual} does not match tracked job {expected}")]
    JobIdMismatch { expected: String, actual: String },
    #[error("Progress {0} is outside 0-100")]
    ProgressOutOfRange(u32),
}

/// Errors reported by the poller on its error channel.
///
/// A job that ends in `FAILED` is not an error; it shows up in the record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PollError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error(transparent)]
    Transport(#[from] FetchError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("Stopped checking status after {0} consecutive failures")]
    GaveUp(u32),
}

impl PollError {
    /// True for errors after which the poller keeps running.
    pub fn is_transient(&self) -> bool {
        matches!(self, PollError::Transport(_) | PollError::Protocol(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_displays_backend_detail() {
        let err = PollError::from(FetchError::Status {
            code: 500,
            message: "job not found".to_string(),
        });
        assert_eq!(err.to_string(), "job not found");
        assert!(err.is_transient());
    }

    #[test]
    fn test_terminal_poll_errors() {
        assert!(!PollError::GaveUp(3).is_transient());
        assert!(!PollError::Configuration("missing job id".into()).is_transient());
    }
}
