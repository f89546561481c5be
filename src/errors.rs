//! Typed error hierarchy for the relay.
//!
//! Nothing here is fatal to the process: dispatch failures become a
//! kind-specific `*_ERROR` frame on the originating connection, and the
//! error itself only ever reaches a log line.

use thiserror::Error;

/// Failure to hand a job to the external workflow engine.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("workflow webhook request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("workflow webhook returned status {status}")]
    Status { status: reqwest::StatusCode },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_display() {
        let err = DispatchError::Status {
            status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
        };
        assert_eq!(
            err.to_string(),
            "workflow webhook returned status 500 Internal Server Error"
        );
    }
}
