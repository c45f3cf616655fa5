//! Continuation-token pagination over a [`TableScanner`].

use tracing::{debug, info};

use super::{ContinuationToken, Page, ScanRequest, TableScanner};
use crate::config::ScanOptions;
use crate::error::TransferError;

/// Lazy sequence of scan pages.
///
/// The first request carries no continuation token (or the configured
/// `exclusive_start_key`); each following request carries the token of the
/// previous response. Once a page arrives without a token the reader is
/// exhausted and never calls the store again.
pub struct PageReader {
    scanner: Box<dyn TableScanner>,
    table_name: String,
    options: ScanOptions,
    next_token: Option<ContinuationToken>,
    exhausted: bool,
    pages_fetched: u64,
}

impl PageReader {
    pub fn new(scanner: Box<dyn TableScanner>, table_name: impl Into<String>, options: ScanOptions) -> Self {
        let next_token = options
            .exclusive_start_key
            .clone()
            .map(ContinuationToken::new);
        Self {
            scanner,
            table_name: table_name.into(),
            options,
            next_token,
            exhausted: false,
            pages_fetched: 0,
        }
    }

    /// Fetches the next page, or returns `None` once the scan is complete.
    ///
    /// # Errors
    ///
    /// Any scanner failure is returned as `TransferError::PageFetch` naming the
    /// 1-based page number. The reader is left where it was, so the failed page
    /// is the one a caller would ask for again.
    pub async fn next_page(&mut self) -> Result<Option<Page>, TransferError> {
        if self.exhausted {
            return Ok(None);
        }

        let page_number = self.pages_fetched + 1;
        let request = ScanRequest {
            table_name: self.table_name.clone(),
            options: self.options.clone(),
            exclusive_start_key: self.next_token.clone(),
        };

        debug!(
            page = page_number,
            resuming = request.exclusive_start_key.is_some(),
            "Requesting scan page"
        );

        let page = self
            .scanner
            .scan(&request)
            .await
            .map_err(|e| TransferError::PageFetch {
                page: page_number,
                chunk_index: None,
                message: e.to_string(),
            })?;

        self.pages_fetched = page_number;
        self.next_token = page.continuation_token.clone();
        self.exhausted = self.next_token.is_none();

        info!(
            "[SCAN] Page {} of '{}': {} items, more pages: {}",
            page_number,
            self.table_name,
            page.items.len(),
            !self.exhausted
        );

        Ok(Some(page))
    }

    /// Token the next request will carry.
    pub fn continuation_token(&self) -> Option<&ContinuationToken> {
        self.next_token.as_ref()
    }

    pub fn pages_fetched(&self) -> u64 {
        self.pages_fetched
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::testing::ScriptedScanner;
    use serde_json::json;
    use std::sync::Arc;

    /// Lets a test keep a handle on the scanner the reader owns.
    struct Shared(Arc<ScriptedScanner>);

    #[async_trait::async_trait]
    impl TableScanner for Shared {
        async fn scan(&self, request: &ScanRequest) -> Result<Page, TransferError> {
            self.0.scan(request).await
        }
    }

    fn reader_over(scanner: &Arc<ScriptedScanner>, options: ScanOptions) -> PageReader {
        PageReader::new(Box::new(Shared(scanner.clone())), "airflow_rocks", options)
    }

    #[tokio::test]
    async fn test_forwards_tokens_until_last_page() {
        let scanner = Arc::new(ScriptedScanner::from_json_pages(vec![
            json!([{"a": 1}, {"b": 2}]),
            json!([{"c": 3}]),
            json!([]),
        ]));
        let mut reader = reader_over(&scanner, ScanOptions::default());

        let mut item_counts = Vec::new();
        while let Some(page) = reader.next_page().await.unwrap() {
            item_counts.push(page.items.len());
        }

        assert_eq!(item_counts, vec![2, 1, 0]);
        assert_eq!(reader.pages_fetched(), 3);
        assert!(reader.is_exhausted());

        let requests = scanner.requests();
        assert_eq!(requests.len(), 3);
        assert!(requests[0].exclusive_start_key.is_none());
        assert_eq!(
            requests[1].exclusive_start_key.as_ref().map(|t| t.as_json().clone()),
            Some(json!({"page": 1}))
        );
        assert_eq!(
            requests[2].exclusive_start_key.as_ref().map(|t| t.as_json().clone()),
            Some(json!({"page": 2}))
        );
        assert!(requests.iter().all(|r| r.table_name == "airflow_rocks"));
    }

    #[tokio::test]
    async fn test_no_calls_after_exhaustion() {
        let scanner = Arc::new(ScriptedScanner::from_json_pages(vec![json!([{"a": 1}])]));
        let mut reader = reader_over(&scanner, ScanOptions::default());

        assert!(reader.next_page().await.unwrap().is_some());
        assert!(reader.next_page().await.unwrap().is_none());
        assert!(reader.next_page().await.unwrap().is_none());
        assert_eq!(scanner.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_starts_from_configured_start_key() {
        let scanner = Arc::new(ScriptedScanner::from_json_pages(vec![json!([])]));
        let options = ScanOptions {
            exclusive_start_key: Some(json!({"pk": {"S": "user#42"}})),
            filter_expression: Some("attribute_exists(pk)".into()),
            ..ScanOptions::default()
        };
        let mut reader = reader_over(&scanner, options);

        reader.next_page().await.unwrap();

        let requests = scanner.requests();
        assert_eq!(
            requests[0].exclusive_start_key.as_ref().map(|t| t.as_json().clone()),
            Some(json!({"pk": {"S": "user#42"}}))
        );
        assert_eq!(
            requests[0].options.filter_expression.as_deref(),
            Some("attribute_exists(pk)")
        );
    }

    #[tokio::test]
    async fn test_failure_names_page_number() {
        let first = Page {
            items: Vec::new(),
            continuation_token: Some(ContinuationToken::new(json!("next"))),
        };
        let scanner = Arc::new(ScriptedScanner::new(vec![
            Ok(first),
            Err(TransferError::SourceStore("ProvisionedThroughputExceededException".into())),
        ]));
        let mut reader = reader_over(&scanner, ScanOptions::default());

        reader.next_page().await.unwrap();
        let err = reader.next_page().await.unwrap_err();

        match err {
            TransferError::PageFetch { page, message, .. } => {
                assert_eq!(page, 2);
                assert!(message.contains("ProvisionedThroughputExceeded"));
            }
            other => panic!("Expected PageFetch, got: {:?}", other),
        }
        assert_eq!(
            reader.continuation_token().map(|t| t.as_json().clone()),
            Some(json!("next"))
        );
    }
}
