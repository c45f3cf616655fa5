//! Run configuration.
//!
//! A [`TransferConfig`] describes one scan-to-object-store copy. It can be
//! deserialized from JSON (missing optional fields take their defaults) or
//! built in code with the setter methods.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::destination::ObjectKeyGenerator;
use crate::error::TransferError;

/// Connection identifier used when none is configured.
pub const DEFAULT_CONNECTION_ID: &str = "aws_default";

/// Chunks at or above this size are uploaded in parts (64 MiB).
pub const DEFAULT_MULTIPART_THRESHOLD: u64 = 64 * 1024 * 1024;

/// Scan parameters forwarded to the source store unmodified.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanOptions {
    pub filter_expression: Option<String>,
    pub projection_expression: Option<String>,
    pub expression_attribute_names: Option<serde_json::Map<String, serde_json::Value>>,
    pub expression_attribute_values: Option<serde_json::Map<String, serde_json::Value>>,
    /// Maximum items the store evaluates per page.
    pub limit: Option<u32>,
    pub consistent_read: Option<bool>,
    pub segment: Option<u32>,
    pub total_segments: Option<u32>,
    /// Key to start the scan after, in the store's wire format.
    pub exclusive_start_key: Option<serde_json::Value>,
}

/// Configuration for one transfer run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferConfig {
    pub table_name: String,
    pub destination_bucket: String,
    #[serde(default)]
    pub destination_key_prefix: String,
    pub max_chunk_size_bytes: u64,
    #[serde(default = "default_connection_id")]
    pub source_connection_id: String,
    #[serde(default = "default_connection_id")]
    pub destination_connection_id: String,
    #[serde(default)]
    pub scan: ScanOptions,
    /// Identifier embedded in object keys. A UUID is generated when absent.
    #[serde(default)]
    pub run_id: Option<String>,
    /// Directory for local chunk files. The system temp dir when absent.
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
    /// Keep the local file of a chunk whose upload failed.
    #[serde(default = "default_true")]
    pub retain_failed_chunks: bool,
    #[serde(default = "default_multipart_threshold")]
    pub multipart_threshold_bytes: u64,
}

fn default_connection_id() -> String {
    DEFAULT_CONNECTION_ID.to_string()
}

fn default_true() -> bool {
    true
}

fn default_multipart_threshold() -> u64 {
    DEFAULT_MULTIPART_THRESHOLD
}

impl TransferConfig {
    /// Creates a configuration with the required fields and defaults for the rest.
    pub fn new(
        table_name: impl Into<String>,
        destination_bucket: impl Into<String>,
        max_chunk_size_bytes: u64,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            destination_bucket: destination_bucket.into(),
            destination_key_prefix: String::new(),
            max_chunk_size_bytes,
            source_connection_id: default_connection_id(),
            destination_connection_id: default_connection_id(),
            scan: ScanOptions::default(),
            run_id: None,
            scratch_dir: None,
            retain_failed_chunks: true,
            multipart_threshold_bytes: DEFAULT_MULTIPART_THRESHOLD,
        }
    }

    /// Parses and validates a JSON configuration document.
    pub fn from_json(text: &str) -> Result<Self, TransferError> {
        let config: TransferConfig = serde_json::from_str(text)
            .map_err(|e| TransferError::InvalidConfig(format!("Malformed configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the prefix prepended to every object key.
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.destination_key_prefix = prefix.into();
        self
    }

    /// Uses the same connection id for source and destination.
    pub fn connection(mut self, connection_id: impl Into<String>) -> Self {
        let id = connection_id.into();
        self.source_connection_id = id.clone();
        self.destination_connection_id = id;
        self
    }

    pub fn source_connection(mut self, connection_id: impl Into<String>) -> Self {
        self.source_connection_id = connection_id.into();
        self
    }

    pub fn destination_connection(mut self, connection_id: impl Into<String>) -> Self {
        self.destination_connection_id = connection_id.into();
        self
    }

    pub fn scan_options(mut self, scan: ScanOptions) -> Self {
        self.scan = scan;
        self
    }

    /// Sets the filter expression passed through to the scan.
    pub fn scan_filter_expression(mut self, expression: impl Into<String>) -> Self {
        self.scan.filter_expression = Some(expression.into());
        self
    }

    pub fn run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    pub fn retain_failed_chunks(mut self, retain: bool) -> Self {
        self.retain_failed_chunks = retain;
        self
    }

    pub fn multipart_threshold(mut self, bytes: u64) -> Self {
        self.multipart_threshold_bytes = bytes;
        self
    }

    /// Checks required fields and option consistency.
    ///
    /// # Errors
    ///
    /// Returns `TransferError::InvalidConfig` describing the first problem found.
    pub fn validate(&self) -> Result<(), TransferError> {
        if self.table_name.trim().is_empty() {
            return Err(TransferError::InvalidConfig("table_name is required".into()));
        }
        if self.destination_bucket.trim().is_empty() {
            return Err(TransferError::InvalidConfig(
                "destination_bucket is required".into(),
            ));
        }
        if self.max_chunk_size_bytes == 0 {
            return Err(TransferError::InvalidConfig(
                "max_chunk_size_bytes must be greater than 0".into(),
            ));
        }
        if self.source_connection_id.trim().is_empty()
            || self.destination_connection_id.trim().is_empty()
        {
            return Err(TransferError::InvalidConfig(
                "connection ids must not be empty".into(),
            ));
        }
        if self.multipart_threshold_bytes == 0 {
            return Err(TransferError::InvalidConfig(
                "multipart_threshold_bytes must be greater than 0".into(),
            ));
        }
        if let Some(run_id) = &self.run_id {
            if run_id.trim().is_empty() || run_id.contains('/') {
                return Err(TransferError::InvalidConfig(
                    "run_id must be non-empty and must not contain '/'".into(),
                ));
            }
        }

        let first_key = ObjectKeyGenerator::new(
            self.destination_key_prefix.as_str(),
            self.run_id.as_deref().unwrap_or("run"),
        )
        .key(0);
        if let Err(e) = object_store::path::Path::parse(&first_key) {
            return Err(TransferError::InvalidConfig(format!(
                "destination_key_prefix '{}' does not form a valid object key: {}",
                self.destination_key_prefix, e
            )));
        }

        match (self.scan.segment, self.scan.total_segments) {
            (None, None) => {}
            (Some(segment), Some(total)) => {
                if total == 0 || segment >= total {
                    return Err(TransferError::InvalidConfig(format!(
                        "scan segment {} is outside total_segments {}",
                        segment, total
                    )));
                }
            }
            _ => {
                return Err(TransferError::InvalidConfig(
                    "scan segment and total_segments must be set together".into(),
                ))
            }
        }

        if self.scan.limit == Some(0) {
            return Err(TransferError::InvalidConfig(
                "scan limit must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}
