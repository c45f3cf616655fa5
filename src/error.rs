use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Patterns (lowercase) that indicate credential material not safe to report.
/// Used by `contains_sensitive()` for case-insensitive matching.
pub(crate) const SENSITIVE_PATTERNS: &[&str] = &[
    "bearer ",
    "authorization:",
    "aws4-hmac-sha256",
    "x-amz-security-token",
    "secret_access_key",
    "secretaccesskey",
];

/// Returns true if the message contains any sensitive pattern (case-insensitive).
fn contains_sensitive(msg: &str) -> bool {
    let lower = msg.to_ascii_lowercase();
    SENSITIVE_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Sanitizes a message for reporting.
/// If sensitive content is detected, returns the fallback instead.
fn sanitize_message(msg: &str, fallback: &str) -> String {
    if contains_sensitive(msg) {
        fallback.into()
    } else {
        msg.to_string()
    }
}

/// Pipeline stage in which a run-time failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStage {
    Fetch,
    Serialize,
    Upload,
}

/// Failure report handed to whoever invoked the run.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub title: String,
    pub message: String,
    pub stage: Option<TransferStage>,
    pub chunk_index: Option<u64>,
}

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum TransferError {
    // ── Setup ─────────────────────────────────────────────────────────────────
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown connection: {0}")]
    UnknownConnection(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    // ── Source ────────────────────────────────────────────────────────────────
    #[error("Source store error: {0}")]
    SourceStore(String),

    /// `chunk_index` is the chunk being filled when the fetch failed.
    #[error("Failed to fetch page {page}: {message}")]
    PageFetch {
        page: u64,
        chunk_index: Option<u64>,
        message: String,
    },

    // ── Chunking ──────────────────────────────────────────────────────────────
    #[error("Failed to serialize record for chunk {chunk_index}: {message}")]
    Serialization { chunk_index: u64, message: String },

    #[error("Scratch storage error: {message}")]
    Scratch {
        chunk_index: Option<u64>,
        message: String,
    },

    // ── Destination ───────────────────────────────────────────────────────────
    #[error("Failed to upload chunk {chunk_index} to {key}: {message}")]
    Upload {
        chunk_index: u64,
        key: String,
        message: String,
        retained_chunk: Option<PathBuf>,
    },

    // ── Generic fallback ──────────────────────────────────────────────────────
    #[error("Transfer pipeline has already run")]
    AlreadyRan,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TransferError {
    /// The pipeline stage this error belongs to, for run-time failures.
    pub fn stage(&self) -> Option<TransferStage> {
        match self {
            TransferError::SourceStore(_) | TransferError::PageFetch { .. } => {
                Some(TransferStage::Fetch)
            }
            TransferError::Serialization { .. } => Some(TransferStage::Serialize),
            TransferError::Upload { .. } => Some(TransferStage::Upload),
            _ => None,
        }
    }

    /// Index of the chunk that was being built or uploaded, if known.
    pub fn chunk_index(&self) -> Option<u64> {
        match self {
            TransferError::Serialization { chunk_index, .. }
            | TransferError::Upload { chunk_index, .. } => Some(*chunk_index),
            TransferError::PageFetch { chunk_index, .. }
            | TransferError::Scratch { chunk_index, .. } => *chunk_index,
            _ => None,
        }
    }

    /// Names `index` as the failing chunk on errors raised before the chunk
    /// was known. Errors that already carry an index are left alone.
    pub(crate) fn in_chunk(mut self, index: u64) -> Self {
        if let TransferError::PageFetch { chunk_index, .. }
        | TransferError::Scratch { chunk_index, .. } = &mut self
        {
            chunk_index.get_or_insert(index);
        }
        self
    }

    /// Converts the error into a report suitable for the invoking scheduler.
    /// Never leaks tokens, signatures or secret keys.
    pub fn to_report(&self) -> ErrorReport {
        let (title, message) = match self {
            // ── Setup ─────────────────────────────────────────────────────────
            TransferError::InvalidConfig(msg) => (
                "Invalid Configuration",
                sanitize_message(msg, "The transfer configuration is invalid."),
            ),

            TransferError::UnknownConnection(id) => (
                "Unknown Connection",
                format!("No connection named '{}' is defined.", id),
            ),

            TransferError::ConnectionFailed(msg) => (
                "Connection Failed",
                sanitize_message(msg, "Could not connect to the store."),
            ),

            // ── Source ────────────────────────────────────────────────────────
            TransferError::SourceStore(msg) => (
                "Source Store Error",
                sanitize_message(msg, "The source store returned an error."),
            ),

            TransferError::PageFetch { page, message, .. } => (
                "Scan Failed",
                format!(
                    "Page {} could not be fetched: {}",
                    page,
                    sanitize_message(message, "the source store returned an error")
                ),
            ),

            // ── Chunking ──────────────────────────────────────────────────────
            TransferError::Serialization {
                chunk_index,
                message,
            } => (
                "Serialization Failed",
                format!(
                    "A record for chunk {} could not be written as JSON: {}",
                    chunk_index, message
                ),
            ),

            TransferError::Scratch { message, .. } => (
                "Local Storage Error",
                sanitize_message(message, "The local scratch file could not be written."),
            ),

            // ── Destination ───────────────────────────────────────────────────
            TransferError::Upload {
                chunk_index,
                key,
                message,
                retained_chunk,
            } => {
                let mut text = format!(
                    "Chunk {} could not be uploaded to '{}': {}",
                    chunk_index,
                    key,
                    sanitize_message(message, "the object store returned an error")
                );
                if let Some(path) = retained_chunk {
                    text.push_str(&format!(" (local copy kept at {})", path.display()));
                }
                ("Upload Failed", text)
            }

            // ── Generic ───────────────────────────────────────────────────────
            TransferError::AlreadyRan => (
                "Already Ran",
                "A transfer pipeline can only be run once.".to_string(),
            ),

            TransferError::Internal(_) => (
                "Unexpected Error",
                "Something went wrong during the transfer.".to_string(),
            ),
        };

        ErrorReport {
            title: title.into(),
            message,
            stage: self.stage(),
            chunk_index: self.chunk_index(),
        }
    }
}

// Report errors to the scheduler as their sanitized form
impl Serialize for TransferError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_report().serialize(serializer)
    }
}
