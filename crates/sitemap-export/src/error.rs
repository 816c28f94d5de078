//! Error taxonomy for an export run.
//!
//! Every variant is fatal. Records that cannot be emitted are not errors; see
//! [`crate::export::projector::SkipReason`].

use std::path::PathBuf;
use thiserror::Error;

/// Process exit code for a missing or invalid configuration value.
pub const EXIT_CONFIGURATION: i32 = 1;
/// Process exit code for an unreadable or malformed reference file.
pub const EXIT_REFERENCE_DATA: i32 = 2;
/// Process exit code for every other failure.
pub const EXIT_FAILURE: i32 = 3;

/// A fatal export failure.
#[derive(Debug, Error)]
pub enum ExportError {
    /// A required parameter is absent or unusable. Raised before any work begins.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The country reference file is missing or malformed.
    #[error("failed to load reference data from {path}: {reason}")]
    ReferenceData { path: PathBuf, reason: String },

    /// The search engine rejected or failed a search, scroll or aggregation request.
    #[error("search request to {endpoint} failed: {reason}")]
    Upstream { endpoint: String, reason: String },

    /// A sitemap document could not be rendered or persisted.
    #[error("failed to write sitemap {filename}: {reason}")]
    Write { filename: String, reason: String },

    /// The run produced more files than a single sitemap index may reference.
    #[error("sitemap index would hold {entries} entries, limit is {cap}")]
    IndexCapacity { entries: usize, cap: usize },
}

impl ExportError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn upstream(endpoint: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Upstream {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }

    pub fn write(filename: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Write {
            filename: filename.into(),
            reason: reason.to_string(),
        }
    }

    /// Exit code the binary reports for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => EXIT_CONFIGURATION,
            Self::ReferenceData { .. } => EXIT_REFERENCE_DATA,
            Self::Upstream { .. } | Self::Write { .. } | Self::IndexCapacity { .. } => EXIT_FAILURE,
        }
    }
}

pub type Result<T> = std::result::Result<T, ExportError>;
