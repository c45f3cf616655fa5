//! Source table store access.
//!
//! - **`TableScanner`** - the narrow interface the pipeline reads through
//! - **`PageReader`** - lazy page sequence driven by continuation tokens
//! - **`DynamoDbScanner`** - HTTP client for stores speaking the DynamoDB `Scan` protocol

mod dynamodb;
mod reader;

use async_trait::async_trait;

use crate::config::ScanOptions;
use crate::error::TransferError;
use crate::record::Record;

pub use dynamodb::DynamoDbScanner;
pub use reader::PageReader;

/// Opaque resume cursor returned by a scan page (`LastEvaluatedKey`).
#[derive(Debug, Clone, PartialEq)]
pub struct ContinuationToken(serde_json::Value);

impl ContinuationToken {
    pub fn new(raw: serde_json::Value) -> Self {
        Self(raw)
    }

    /// The cursor exactly as the store returned it.
    pub fn as_json(&self) -> &serde_json::Value {
        &self.0
    }
}

/// One page of a table scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub items: Vec<Record>,
    /// Present while more pages follow.
    pub continuation_token: Option<ContinuationToken>,
}

/// A single scan request.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRequest {
    pub table_name: String,
    pub options: ScanOptions,
    pub exclusive_start_key: Option<ContinuationToken>,
}

/// Source store interface: one call returns one page.
#[async_trait]
pub trait TableScanner: Send + Sync {
    async fn scan(&self, request: &ScanRequest) -> Result<Page, TransferError>;
}
