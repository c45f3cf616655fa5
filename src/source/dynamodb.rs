//! HTTP client for table stores speaking the DynamoDB JSON 1.0 `Scan` protocol.
//!
//! Works against AWS itself (given a pre-signed or proxy-injected
//! `Authorization` value) and against local stand-ins such as DynamoDB Local.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};
use url::Url;

use super::{ContinuationToken, Page, ScanRequest, TableScanner};
use crate::error::TransferError;
use crate::record::{decode_item, Record};

const CLIENT_USER_AGENT: &str = concat!("tablecopy/", env!("CARGO_PKG_VERSION"));

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

const SCAN_TARGET: &str = "DynamoDB_20120810.Scan";
const AMZ_JSON_CONTENT_TYPE: &str = "application/x-amz-json-1.0";

// ─────────────────────────────────────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct WireScanRequest<'a> {
    table_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    exclusive_start_key: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter_expression: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    projection_expression: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expression_attribute_names: Option<&'a Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expression_attribute_values: Option<&'a Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    consistent_read: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    segment: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    total_segments: Option<u32>,
}

impl<'a> From<&'a ScanRequest> for WireScanRequest<'a> {
    fn from(request: &'a ScanRequest) -> Self {
        let options = &request.options;
        Self {
            table_name: &request.table_name,
            exclusive_start_key: request.exclusive_start_key.as_ref().map(|t| t.as_json()),
            filter_expression: options.filter_expression.as_deref(),
            projection_expression: options.projection_expression.as_deref(),
            expression_attribute_names: options.expression_attribute_names.as_ref(),
            expression_attribute_values: options.expression_attribute_values.as_ref(),
            limit: options.limit,
            consistent_read: options.consistent_read,
            segment: options.segment,
            total_segments: options.total_segments,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireScanResponse {
    #[serde(default)]
    items: Vec<Map<String, Value>>,
    last_evaluated_key: Option<Value>,
}

/// Error body, e.g. `{"__type": "com.amazonaws.dynamodb.v20120810#ResourceNotFoundException", "message": "..."}`.
#[derive(Debug, Deserialize)]
struct WireStoreError {
    #[serde(rename = "__type")]
    error_type: Option<String>,
    #[serde(alias = "Message")]
    message: Option<String>,
}

impl WireStoreError {
    /// The exception name without its namespace.
    fn short_type(&self) -> Option<&str> {
        self.error_type
            .as_deref()
            .map(|t| t.rsplit('#').next().unwrap_or(t))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// DynamoDbScanner
// ─────────────────────────────────────────────────────────────────────────────

/// [`TableScanner`] issuing one `Scan` call per page.
pub struct DynamoDbScanner {
    http: reqwest::Client,
    endpoint: Url,
    authorization: Option<SecretString>,
}

impl std::fmt::Debug for DynamoDbScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamoDbScanner")
            .field("endpoint", &self.endpoint.as_str())
            .field(
                "authorization",
                &self.authorization.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl DynamoDbScanner {
    /// Creates a scanner posting to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns `TransferError::Internal` if the HTTP client fails to initialize.
    pub fn new(endpoint: Url) -> Result<Self, TransferError> {
        Ok(Self {
            http: build_http_client()?,
            endpoint,
            authorization: None,
        })
    }

    /// Creates a scanner for the public regional endpoint.
    pub fn for_region(region: &str) -> Result<Self, TransferError> {
        let endpoint = regional_endpoint(region)?;
        Self::new(endpoint)
    }

    /// Sets the `Authorization` header value sent with every request.
    pub fn with_authorization(mut self, authorization: SecretString) -> Self {
        self.authorization = Some(authorization);
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn request_headers(&self) -> Result<HeaderMap, TransferError> {
        let mut headers = HeaderMap::new();
        headers.insert("x-amz-target", HeaderValue::from_static(SCAN_TARGET));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(AMZ_JSON_CONTENT_TYPE));
        if let Some(authorization) = &self.authorization {
            let mut value = HeaderValue::from_str(authorization.expose_secret()).map_err(|_| {
                TransferError::ConnectionFailed("Authorization value is not a valid header".into())
            })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }

    /// Turns a non-success response into a `SourceStore` error.
    async fn store_error(response: reqwest::Response) -> TransferError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if let Ok(wire) = serde_json::from_str::<WireStoreError>(&body) {
            if let Some(error_type) = wire.short_type() {
                return TransferError::SourceStore(format!(
                    "[{}] {}",
                    error_type,
                    wire.message.as_deref().unwrap_or("no message")
                ));
            }
        }

        TransferError::SourceStore(format!(
            "HTTP {} - {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown error")
        ))
    }
}

#[async_trait]
impl TableScanner for DynamoDbScanner {
    async fn scan(&self, request: &ScanRequest) -> Result<Page, TransferError> {
        let body = serde_json::to_vec(&WireScanRequest::from(request))
            .map_err(|e| TransferError::Internal(format!("Failed to encode scan request: {}", e)))?;

        let start = Instant::now();
        let result = self
            .http
            .post(self.endpoint.as_str())
            .headers(self.request_headers()?)
            .body(body)
            .send()
            .await;
        let duration_ms = start.elapsed().as_millis();

        let response = match result {
            Ok(response) => response,
            Err(_) => {
                // The reqwest error may carry the full URL; never surface it.
                info!("[SCAN] POST {} FAILED {}ms", self.endpoint.path(), duration_ms);
                return Err(TransferError::ConnectionFailed(
                    "Connection to the source store failed".into(),
                ));
            }
        };

        let status = response.status();
        let request_id = response
            .headers()
            .get("x-amzn-requestid")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
            .to_string();
        info!(
            "[SCAN] POST {} {} {}ms {}",
            self.endpoint.path(),
            status.as_u16(),
            duration_ms,
            request_id
        );

        if !status.is_success() {
            let err = Self::store_error(response).await;
            warn!("[SCAN] Scan of '{}' rejected: {}", request.table_name, err);
            return Err(err);
        }

        let wire: WireScanResponse = response.json().await.map_err(|e| {
            TransferError::SourceStore(format!("Malformed scan response: {}", e))
        })?;

        let items = wire
            .items
            .iter()
            .map(decode_item)
            .collect::<Result<Vec<Record>, _>>()
            .map_err(|e| TransferError::SourceStore(format!("Undecodable item: {}", e)))?;

        let continuation_token = wire
            .last_evaluated_key
            .filter(|key| key.as_object().is_some_and(|map| !map.is_empty()))
            .map(ContinuationToken::new);

        Ok(Page {
            items,
            continuation_token,
        })
    }
}

/// `https://dynamodb.{region}.amazonaws.com/`
pub(crate) fn regional_endpoint(region: &str) -> Result<Url, TransferError> {
    if region.trim().is_empty() {
        return Err(TransferError::InvalidConfig("region must not be empty".into()));
    }
    Url::parse(&format!("https://dynamodb.{}.amazonaws.com/", region))
        .map_err(|_| TransferError::InvalidConfig(format!("Invalid region: {}", region)))
}

fn build_http_client() -> Result<reqwest::Client, TransferError> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));

    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
        .build()
        .map_err(|e| TransferError::Internal(format!("Failed to build HTTP client: {}", e)))
}
