//! Error taxonomy for the upload flows.
//!
//! Every boundary function in [`crate::pipeline`] turns these into an
//! [`crate::pipeline::UploadOutcome`] envelope instead of returning them to
//! the caller. Inside the library they propagate with `?` like any other
//! error.
//!
//! | Kind             | Fatal | Raised by                                   |
//! |------------------|-------|---------------------------------------------|
//! | `Input`          | yes   | file checks, CSV reader, payload builder    |
//! | `Network`        | yes   | prediction client (transport failure)       |
//! | `Api`            | yes   | prediction client (non-2xx / bad body)      |
//! | `Recommendation` | no    | recommendation client                       |
//! | `Persistence`    | no    | local patient store                         |

use thiserror::Error;

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum UploadError {
    /// The upload itself is unusable; raised before any network call.
    #[error("{0}")]
    Input(String),

    #[error("Network error: {0}")]
    Network(String),

    /// Non-2xx upstream response. `body` is the raw response text so the
    /// caller can show the server-side detail.
    #[error("API request failed: {status} - {body}")]
    Api { status: u16, body: String },

    #[error("Recommendation error: {0}")]
    Recommendation(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),
}

impl UploadError {
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input(message.into())
    }

    /// Stable machine-readable name used in envelopes and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Input(_) => "input",
            Self::Network(_) => "network",
            Self::Api { .. } => "api",
            Self::Recommendation(_) => "recommendation",
            Self::Persistence(_) => "persistence",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_error_carries_prefix() {
        let err = UploadError::Network("connection refused".to_string());
        assert_eq!(err.to_string(), "Network error: connection refused");
        assert_eq!(err.kind(), "network");
    }

    #[test]
    fn api_error_keeps_raw_body() {
        let err = UploadError::Api {
            status: 422,
            body: r#"{"detail":"age missing"}"#.to_string(),
        };
        assert!(err.to_string().contains("422"));
        assert!(err.to_string().contains("age missing"));
    }

    #[test]
    fn store_errors_convert_to_persistence() {
        let persistence: UploadError = StoreError::PatientNotFound("p1".to_string()).into();
        assert_eq!(persistence.kind(), "persistence");
        assert_eq!(persistence.to_string(), "Persistence error: patient not found: p1");
    }
}
