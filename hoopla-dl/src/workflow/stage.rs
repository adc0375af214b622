use crate::error::ErrorRecord;
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf};

/// Steps of a title workflow, in execution order.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Metadata,
    LicenseToken,
    Manifest,
    WidevineLicense,
    Download,
    Decrypt,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Metadata,
        Stage::LicenseToken,
        Stage::Manifest,
        Stage::WidevineLicense,
        Stage::Download,
        Stage::Decrypt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Metadata => "METADATA",
            Self::LicenseToken => "LICENSE_TOKEN",
            Self::Manifest => "MANIFEST",
            Self::WidevineLicense => "WIDEVINE_LICENSE",
            Self::Download => "DOWNLOAD",
            Self::Decrypt => "DECRYPT",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one stage. Every stage of a finished workflow has exactly one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StageOutcome {
    Succeeded {
        artifacts: Vec<PathBuf>,
        elapsed_ms: u64,
    },
    Failed {
        error: ErrorRecord,
        elapsed_ms: u64,
    },
    /// An optional stage did not apply.
    Skipped { reason: String },
    /// The stage ran but no real content key was available.
    Unavailable {
        reason: String,
        artifacts: Vec<PathBuf>,
        elapsed_ms: u64,
    },
    NotAttempted,
}

impl StageOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn is_succeeded(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    /// Ran to completion, successfully or not.
    pub fn is_attempted(&self) -> bool {
        matches!(
            self,
            Self::Succeeded { .. } | Self::Failed { .. } | Self::Unavailable { .. }
        )
    }

    pub fn elapsed_ms(&self) -> Option<u64> {
        match self {
            Self::Succeeded { elapsed_ms, .. }
            | Self::Failed { elapsed_ms, .. }
            | Self::Unavailable { elapsed_ms, .. } => Some(*elapsed_ms),
            _ => None,
        }
    }

    pub fn artifacts(&self) -> &[PathBuf] {
        match self {
            Self::Succeeded { artifacts, .. } | Self::Unavailable { artifacts, .. } => artifacts,
            _ => &[],
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Succeeded { .. } => "succeeded",
            Self::Failed { .. } => "failed",
            Self::Skipped { .. } => "skipped",
            Self::Unavailable { .. } => "unavailable",
            Self::NotAttempted => "not attempted",
        }
    }
}
