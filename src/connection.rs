//! Resolution of connection identifiers to store clients.
//!
//! A run names its source and destination by connection id. The pipeline asks
//! a [`SourceConnector`] and a [`DestinationConnector`] for the matching
//! clients; [`ConnectionCatalog`] implements both from deserialized
//! definitions. Credentials are held in `SecretString` and never logged.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::{ClientOptions, ObjectStore};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use tracing::info;
use url::Url;

use crate::error::TransferError;
use crate::source::{DynamoDbScanner, TableScanner};

/// Object store request timeout in seconds.
const STORE_TIMEOUT_SECS: u64 = 300;

/// Opens a scanner for a source connection id.
#[async_trait]
pub trait SourceConnector: Send + Sync {
    async fn connect_source(&self, connection_id: &str)
        -> Result<Box<dyn TableScanner>, TransferError>;
}

/// Opens an object store scoped to `bucket` for a destination connection id.
#[async_trait]
pub trait DestinationConnector: Send + Sync {
    async fn connect_destination(
        &self,
        connection_id: &str,
        bucket: &str,
    ) -> Result<Arc<dyn ObjectStore>, TransferError>;
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(SecretString::from))
}

/// Table store connection.
///
/// `endpoint` wins over `region`; with only a region the public regional
/// endpoint is used.
#[derive(Default, Deserialize)]
pub struct SourceConnection {
    #[serde(default)]
    pub endpoint: Option<Url>,
    #[serde(default)]
    pub region: Option<String>,
    /// Pre-computed `Authorization` header value.
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub authorization: Option<SecretString>,
}

impl fmt::Debug for SourceConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConnection")
            .field("endpoint", &self.endpoint.as_ref().map(Url::as_str))
            .field("region", &self.region)
            .field(
                "authorization",
                &self.authorization.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl SourceConnection {
    fn scanner(&self) -> Result<DynamoDbScanner, TransferError> {
        let scanner = match (&self.endpoint, self.region.as_deref()) {
            (Some(endpoint), _) => DynamoDbScanner::new(endpoint.clone())?,
            (None, Some(region)) => DynamoDbScanner::for_region(region)?,
            (None, None) => {
                return Err(TransferError::InvalidConfig(
                    "source connection needs an endpoint or a region".into(),
                ))
            }
        };

        Ok(match &self.authorization {
            Some(authorization) => scanner.with_authorization(SecretString::from(
                authorization.expose_secret().to_string(),
            )),
            None => scanner,
        })
    }
}

/// Object storage connection.
#[derive(Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DestinationConnection {
    S3 {
        #[serde(default)]
        region: Option<String>,
        /// Custom endpoint for S3-compatible stores.
        #[serde(default)]
        endpoint: Option<String>,
        #[serde(default)]
        access_key_id: Option<String>,
        #[serde(default, deserialize_with = "deserialize_secret")]
        secret_access_key: Option<SecretString>,
        #[serde(default, deserialize_with = "deserialize_secret")]
        session_token: Option<SecretString>,
        #[serde(default)]
        allow_http: bool,
    },
    /// Buckets are directories under `root`.
    Local { root: PathBuf },
}

impl fmt::Debug for DestinationConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DestinationConnection::S3 {
                region,
                endpoint,
                access_key_id,
                secret_access_key,
                session_token,
                allow_http,
            } => f
                .debug_struct("S3")
                .field("region", region)
                .field("endpoint", endpoint)
                .field("access_key_id", access_key_id)
                .field(
                    "secret_access_key",
                    &secret_access_key.as_ref().map(|_| "[REDACTED]"),
                )
                .field("session_token", &session_token.as_ref().map(|_| "[REDACTED]"))
                .field("allow_http", allow_http)
                .finish(),
            DestinationConnection::Local { root } => {
                f.debug_struct("Local").field("root", root).finish()
            }
        }
    }
}

impl DestinationConnection {
    async fn store(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>, TransferError> {
        match self {
            DestinationConnection::S3 {
                region,
                endpoint,
                access_key_id,
                secret_access_key,
                session_token,
                allow_http,
            } => {
                let client_options =
                    ClientOptions::new().with_timeout(Duration::from_secs(STORE_TIMEOUT_SECS));

                let mut builder = AmazonS3Builder::new()
                    .with_bucket_name(bucket)
                    .with_allow_http(*allow_http)
                    .with_client_options(client_options);

                if let Some(region) = region {
                    builder = builder.with_region(region);
                }
                if let Some(endpoint) = endpoint {
                    builder = builder.with_endpoint(endpoint);
                }
                if let Some(key) = access_key_id {
                    builder = builder.with_access_key_id(key);
                }
                if let Some(secret) = secret_access_key {
                    builder = builder.with_secret_access_key(secret.expose_secret());
                }
                if let Some(token) = session_token {
                    builder = builder.with_token(token.expose_secret());
                }

                // The builder error can echo configuration values.
                let store = builder.build().map_err(|_| {
                    TransferError::ConnectionFailed(format!(
                        "Failed to build S3 client for bucket '{}'",
                        bucket
                    ))
                })?;
                Ok(Arc::new(store))
            }
            DestinationConnection::Local { root } => {
                let dir = root.join(bucket);
                tokio::fs::create_dir_all(&dir).await.map_err(|e| {
                    TransferError::ConnectionFailed(format!(
                        "Failed to create bucket directory {}: {}",
                        dir.display(),
                        e
                    ))
                })?;
                let store = LocalFileSystem::new_with_prefix(&dir).map_err(|e| {
                    TransferError::ConnectionFailed(format!("Failed to create local store: {}", e))
                })?;
                Ok(Arc::new(store))
            }
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            DestinationConnection::S3 { .. } => "s3",
            DestinationConnection::Local { .. } => "local",
        }
    }
}

/// Named connection definitions.
///
/// ```json
/// {
///   "sources": {
///     "aws_default": { "region": "us-east-1" }
///   },
///   "destinations": {
///     "aws_default": { "kind": "s3", "region": "us-east-1" },
///     "scratch": { "kind": "local", "root": "/var/lib/exports" }
///   }
/// }
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct ConnectionCatalog {
    #[serde(default)]
    sources: HashMap<String, SourceConnection>,
    #[serde(default)]
    destinations: HashMap<String, DestinationConnection>,
}

impl ConnectionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a catalog from JSON.
    pub fn from_json(text: &str) -> Result<Self, TransferError> {
        // serde_json errors quote the offending input, which may be a secret.
        serde_json::from_str(text).map_err(|e| {
            TransferError::InvalidConfig(format!(
                "Malformed connection catalog at line {} column {}",
                e.line(),
                e.column()
            ))
        })
    }

    pub fn with_source(mut self, id: impl Into<String>, connection: SourceConnection) -> Self {
        self.sources.insert(id.into(), connection);
        self
    }

    pub fn with_destination(
        mut self,
        id: impl Into<String>,
        connection: DestinationConnection,
    ) -> Self {
        self.destinations.insert(id.into(), connection);
        self
    }

    pub fn source(&self, id: &str) -> Option<&SourceConnection> {
        self.sources.get(id)
    }

    pub fn destination(&self, id: &str) -> Option<&DestinationConnection> {
        self.destinations.get(id)
    }
}

#[async_trait]
impl SourceConnector for ConnectionCatalog {
    async fn connect_source(
        &self,
        connection_id: &str,
    ) -> Result<Box<dyn TableScanner>, TransferError> {
        let connection = self
            .sources
            .get(connection_id)
            .ok_or_else(|| TransferError::UnknownConnection(connection_id.to_string()))?;
        let scanner = connection.scanner()?;

        info!(
            "[TRANSFER] Source connection '{}' -> {}",
            connection_id,
            scanner.endpoint().host_str().unwrap_or("-")
        );
        Ok(Box::new(scanner))
    }
}

#[async_trait]
impl DestinationConnector for ConnectionCatalog {
    async fn connect_destination(
        &self,
        connection_id: &str,
        bucket: &str,
    ) -> Result<Arc<dyn ObjectStore>, TransferError> {
        let connection = self
            .destinations
            .get(connection_id)
            .ok_or_else(|| TransferError::UnknownConnection(connection_id.to_string()))?;
        let store = connection.store(bucket).await?;

        info!(
            "[TRANSFER] Destination connection '{}' ({}) -> bucket '{}'",
            connection_id,
            connection.kind(),
            bucket
        );
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::path::Path;
    use tempfile::TempDir;

    const CATALOG: &str = r#"{
        "sources": {
            "aws_default": {"region": "us-east-1"},
            "local_ddb": {
                "endpoint": "http://localhost:8000/",
                "authorization": "AWS4-HMAC-SHA256 Credential=local"
            }
        },
        "destinations": {
            "aws_default": {
                "kind": "s3",
                "region": "us-east-1",
                "access_key_id": "AKIDEXAMPLE",
                "secret_access_key": "wJalrXUtnFEMI"
            }
        }
    }"#;

    #[test]
    fn test_parse_catalog() {
        let catalog = ConnectionCatalog::from_json(CATALOG).unwrap();

        let source = catalog.source("local_ddb").unwrap();
        assert_eq!(
            source.endpoint.as_ref().map(Url::as_str),
            Some("http://localhost:8000/")
        );
        assert_eq!(
            source.authorization.as_ref().map(|s| s.expose_secret().to_string()),
            Some("AWS4-HMAC-SHA256 Credential=local".to_string())
        );
        assert!(matches!(
            catalog.destination("aws_default"),
            Some(DestinationConnection::S3 { .. })
        ));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let catalog = ConnectionCatalog::from_json(CATALOG).unwrap();
        let rendered = format!("{:?}", catalog);

        assert!(!rendered.contains("Credential=local"));
        assert!(!rendered.contains("wJalrXUtnFEMI"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn test_malformed_catalog_does_not_echo_input() {
        let err = ConnectionCatalog::from_json(r#"{"sources": {"x": {"authorization": 42}}}"#)
            .unwrap_err();
        assert!(matches!(err, TransferError::InvalidConfig(_)));

        let err = ConnectionCatalog::from_json(r#"{"destinations": {"x": {"kind": "ftp"}}}"#)
            .unwrap_err();
        assert!(matches!(err, TransferError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_unknown_ids_are_rejected() {
        let catalog = ConnectionCatalog::from_json(CATALOG).unwrap();

        let source = catalog.connect_source("missing").await;
        assert!(matches!(source, Err(TransferError::UnknownConnection(id)) if id == "missing"));

        let destination = catalog.connect_destination("missing", "bucket").await;
        assert!(matches!(destination, Err(TransferError::UnknownConnection(_))));
    }

    #[tokio::test]
    async fn test_source_needs_endpoint_or_region() {
        let catalog = ConnectionCatalog::new().with_source("bare", SourceConnection::default());
        let result = catalog.connect_source("bare").await;
        assert!(matches!(result, Err(TransferError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_connect_known_source() {
        let catalog = ConnectionCatalog::from_json(CATALOG).unwrap();
        assert!(catalog.connect_source("aws_default").await.is_ok());
        assert!(catalog.connect_source("local_ddb").await.is_ok());
    }

    #[tokio::test]
    async fn test_s3_destination_builds() {
        let catalog = ConnectionCatalog::from_json(CATALOG).unwrap();
        assert!(catalog
            .connect_destination("aws_default", "airflow-bucket")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_local_destination_scopes_bucket_directory() {
        let root = TempDir::new().unwrap();
        let catalog = ConnectionCatalog::new().with_destination(
            "scratch",
            DestinationConnection::Local {
                root: root.path().to_path_buf(),
            },
        );

        let store = catalog
            .connect_destination("scratch", "airflow-bucket")
            .await
            .unwrap();
        store
            .put(&Path::from("exports/a.jsonl"), b"{}\n".to_vec().into())
            .await
            .unwrap();

        let written = root.path().join("airflow-bucket/exports/a.jsonl");
        assert_eq!(std::fs::read_to_string(written).unwrap(), "{}\n");
    }
}
