//! Failure taxonomy of a title workflow.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while processing a title.
///
/// Every stage failure ends up in the title's [`WorkflowResult`](crate::WorkflowResult)
/// instead of aborting the batch.
#[derive(Debug, Error)]
pub enum Error {
    /// The session was refused or is no longer accepted.
    #[error("authentication failed: {0}")]
    AuthenticationFailure(String),

    /// Transport error or unexpected HTTP status. Never retried internally.
    #[error("network failure: {0}")]
    NetworkFailure(String),

    /// A response which must carry a value had an empty body.
    #[error("empty response from {0}")]
    EmptyResponse(String),

    #[error("{0}")]
    ManifestParseFailure(#[from] hoopla_mpd::Error),

    /// The catalog record lacks a field required by later stages.
    #[error("missing media info: {0}")]
    MissingMediaInfo(String),

    /// The license proxy rejected the request. Response bodies are never included.
    #[error("license acquisition failed: {0}")]
    LicenseAcquisitionFailure(String),

    #[error("download failed: {0}")]
    DownloadFailure(String),

    #[error("decryption timed out after {0:?}")]
    DecryptionTimeout(Duration),

    #[error("decryption tool failed ({code}): {stderr}")]
    DecryptionToolFailure { code: String, stderr: String },

    /// No real content key could be obtained for the title.
    #[error("content key unavailable: {0}")]
    KeyUnavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for workflow operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Stable name of the failure category.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AuthenticationFailure(_) => "AuthenticationFailure",
            Self::NetworkFailure(_) => "NetworkFailure",
            Self::EmptyResponse(_) => "EmptyResponse",
            Self::ManifestParseFailure(_) => "ManifestParseFailure",
            Self::MissingMediaInfo(_) => "MissingMediaInfo",
            Self::LicenseAcquisitionFailure(_) => "LicenseAcquisitionFailure",
            Self::DownloadFailure(_) => "DownloadFailure",
            Self::DecryptionTimeout(_) => "DecryptionTimeout",
            Self::DecryptionToolFailure { .. } => "DecryptionToolFailure",
            Self::KeyUnavailable(_) => "KeyUnavailable",
            Self::Io(_) => "Io",
            Self::Json(_) => "Json",
        }
    }

    /// Map a transport error. Rejected credentials are reported as such so that an
    /// expired session fails every workflow the same way.
    pub(crate) fn from_reqwest(error: reqwest::Error) -> Self {
        if let Some(status) = error.status()
            && matches!(status.as_u16(), 401 | 403)
        {
            return Self::AuthenticationFailure(format!("{} ({})", url_of(&error), status));
        }

        if error.is_timeout() {
            Self::NetworkFailure(format!("{} (timeout)", url_of(&error)))
        } else if error.is_connect() {
            Self::NetworkFailure(format!("{} (connection error)", url_of(&error)))
        } else if let Some(status) = error.status() {
            Self::NetworkFailure(format!("{} (HTTP {})", url_of(&error), status))
        } else {
            Self::NetworkFailure(error.to_string())
        }
    }
}

fn url_of(error: &reqwest::Error) -> String {
    error
        .url()
        .map(|x| x.as_str().to_owned())
        .unwrap_or_else(|| "<unknown url>".to_owned())
}

/// Serialized form of an [`Error`] inside persisted results.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub kind: String,
    pub message: String,
}

impl From<&Error> for ErrorRecord {
    fn from(value: &Error) -> Self {
        Self {
            kind: value.kind().to_owned(),
            message: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_error_keeps_message() {
        let error = Error::from(hoopla_mpd::parse("<MPD>").unwrap_err());
        let record = ErrorRecord::from(&error);

        assert_eq!(record.kind, "ManifestParseFailure");
        assert!(record.message.starts_with("Cannot parse manifest: "));
    }
}
