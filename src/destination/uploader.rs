//! Transfer of sealed chunks into object storage.

use std::path::Path as LocalPath;
use std::sync::Arc;
use std::time::Instant;

use object_store::path::Path;
use object_store::{ObjectStore, PutResult, WriteMultipart};
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

use crate::config::DEFAULT_MULTIPART_THRESHOLD;
use crate::error::TransferError;
use crate::streaming::LocalChunk;

/// Size of each part of a multipart upload (8 MiB).
const MULTIPART_PART_SIZE: usize = 8 * 1024 * 1024;

/// Parts allowed in flight at once during a multipart upload.
const MAX_IN_FLIGHT_PARTS: usize = 2;

const READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Outcome of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadReceipt {
    pub key: String,
    pub chunk_index: u64,
    pub bytes: u64,
    pub records: u64,
    pub e_tag: Option<String>,
}

/// A chunk that could not be uploaded, handed back with the reason.
#[derive(Debug)]
pub struct FailedUpload {
    pub chunk: LocalChunk,
    pub key: String,
    pub message: String,
}

impl FailedUpload {
    /// Converts the failure into a `TransferError::Upload`, keeping the local
    /// file on disk when `retain` is set.
    pub fn into_error(self, retain: bool) -> TransferError {
        let chunk_index = self.chunk.index();
        let retained_chunk = if retain {
            match self.chunk.keep() {
                Ok(path) => {
                    info!(
                        "[UPLOAD] Kept chunk {} on disk at {}",
                        chunk_index,
                        path.display()
                    );
                    Some(path)
                }
                Err(e) => {
                    warn!("[UPLOAD] Could not keep chunk {}: {}", chunk_index, e);
                    None
                }
            }
        } else {
            None
        };

        TransferError::Upload {
            chunk_index,
            key: self.key,
            message: self.message,
            retained_chunk,
        }
    }
}

/// Uploads local chunks to one bucket of an object store.
pub struct ObjectUploader {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    multipart_threshold: u64,
}

impl ObjectUploader {
    /// `store` must already be scoped to `bucket`; the name is used for logging.
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            multipart_threshold: DEFAULT_MULTIPART_THRESHOLD,
        }
    }

    /// Chunks of at least `bytes` are uploaded in parts.
    pub fn with_multipart_threshold(mut self, bytes: u64) -> Self {
        self.multipart_threshold = bytes;
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Uploads `chunk` under `key` and deletes the local file on success.
    ///
    /// # Errors
    ///
    /// On failure the chunk is returned untouched inside [`FailedUpload`], so
    /// the caller decides whether to retry, retain or drop it. Nothing is
    /// retried here.
    pub async fn upload(&self, chunk: LocalChunk, key: &str) -> Result<UploadReceipt, FailedUpload> {
        let location = match Path::parse(key) {
            Ok(location) => location,
            Err(e) => {
                return Err(FailedUpload {
                    chunk,
                    key: key.to_string(),
                    message: format!("Invalid object key: {}", e),
                })
            }
        };

        let start = Instant::now();
        let multipart = chunk.len_bytes() >= self.multipart_threshold;
        let result = if multipart {
            self.put_multipart(chunk.path(), &location).await
        } else {
            self.put_single(chunk.path(), &location).await
        };
        let duration_ms = start.elapsed().as_millis();

        let put = match result {
            Ok(put) => put,
            Err(message) => {
                warn!(
                    "[UPLOAD] Chunk {} to {}/{} FAILED {}ms",
                    chunk.index(),
                    self.bucket,
                    key,
                    duration_ms
                );
                return Err(FailedUpload {
                    chunk,
                    key: key.to_string(),
                    message,
                });
            }
        };

        info!(
            "[UPLOAD] Chunk {} to {}/{}: {} records, {} bytes, {} {}ms",
            chunk.index(),
            self.bucket,
            key,
            chunk.record_count(),
            chunk.len_bytes(),
            if multipart { "multipart" } else { "single put" },
            duration_ms
        );

        let receipt = UploadReceipt {
            key: key.to_string(),
            chunk_index: chunk.index(),
            bytes: chunk.len_bytes(),
            records: chunk.record_count(),
            e_tag: put.e_tag,
        };

        if let Err(e) = chunk.release() {
            warn!(
                "[UPLOAD] Uploaded chunk {} but could not delete local file: {}",
                receipt.chunk_index, e
            );
        }

        Ok(receipt)
    }

    async fn put_single(&self, file: &LocalPath, location: &Path) -> Result<PutResult, String> {
        let bytes = tokio::fs::read(file)
            .await
            .map_err(|e| format!("Failed to read chunk file: {}", e))?;
        self.store
            .put(location, bytes.into())
            .await
            .map_err(|e| e.to_string())
    }

    async fn put_multipart(&self, file: &LocalPath, location: &Path) -> Result<PutResult, String> {
        let upload = self
            .store
            .put_multipart(location)
            .await
            .map_err(|e| e.to_string())?;
        let mut writer = WriteMultipart::new_with_chunk_size(upload, MULTIPART_PART_SIZE);

        match stream_file(&mut writer, file).await {
            Ok(()) => writer.finish().await.map_err(|e| e.to_string()),
            Err(message) => {
                if let Err(e) = writer.abort().await {
                    warn!("[UPLOAD] Failed to abort multipart upload: {}", e);
                }
                Err(message)
            }
        }
    }
}

/// Feeds the file into the multipart writer without loading it whole.
async fn stream_file(writer: &mut WriteMultipart, file: &LocalPath) -> Result<(), String> {
    let mut file = tokio::fs::File::open(file)
        .await
        .map_err(|e| format!("Failed to open chunk file: {}", e))?;
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let n = file
            .read(&mut buf)
            .await
            .map_err(|e| format!("Failed to read chunk file: {}", e))?;
        if n == 0 {
            return Ok(());
        }
        writer
            .wait_for_capacity(MAX_IN_FLIGHT_PARTS)
            .await
            .map_err(|e| e.to_string())?;
        writer.write(&buf[..n]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use crate::streaming::ChunkWriter;
    use object_store::local::LocalFileSystem;
    use object_store::memory::InMemory;
    use serde_json::json;
    use tempfile::TempDir;

    fn chunk_with(dir: &TempDir, items: &[serde_json::Value]) -> LocalChunk {
        let mut writer = ChunkWriter::new(u64::MAX, dir.path());
        for item in items {
            writer.add(&Record::from_json(item.clone()).unwrap()).unwrap();
        }
        writer.flush().unwrap().unwrap()
    }

    async fn object_text(store: &InMemory, key: &str) -> String {
        let bytes = store
            .get(&Path::from(key))
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_single_put_uploads_and_deletes_local_file() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(InMemory::new());
        let uploader = ObjectUploader::new(store.clone(), "airflow-bucket");

        let chunk = chunk_with(&dir, &[json!({"a": 1}), json!({"b": 2})]);
        let local = chunk.path().to_path_buf();

        let receipt = uploader.upload(chunk, "exports/run-00000.jsonl").await.unwrap();

        assert_eq!(receipt.key, "exports/run-00000.jsonl");
        assert_eq!(receipt.chunk_index, 0);
        assert_eq!(receipt.records, 2);
        assert_eq!(receipt.bytes, 16);
        assert!(!local.exists(), "local chunk should be deleted after upload");
        assert_eq!(
            object_text(&store, "exports/run-00000.jsonl").await,
            "{\"a\":1}\n{\"b\":2}\n"
        );
    }

    #[tokio::test]
    async fn test_multipart_upload_above_threshold() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(InMemory::new());
        let uploader = ObjectUploader::new(store.clone(), "b").with_multipart_threshold(10);

        let items: Vec<_> = (0..100).map(|i| json!({ "id": i })).collect();
        let chunk = chunk_with(&dir, &items);
        let expected = std::fs::read_to_string(chunk.path()).unwrap();

        let receipt = uploader.upload(chunk, "big-00000.jsonl").await.unwrap();

        assert_eq!(receipt.records, 100);
        assert_eq!(object_text(&store, "big-00000.jsonl").await, expected);
    }

    #[tokio::test]
    async fn test_failure_hands_chunk_back() {
        let dir = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        // A regular file where the key's parent directory should be.
        std::fs::write(root.path().join("blocked"), b"not a directory").unwrap();
        let store = Arc::new(LocalFileSystem::new_with_prefix(root.path()).unwrap());
        let uploader = ObjectUploader::new(store, "b");

        let chunk = chunk_with(&dir, &[json!({"a": 1})]);
        let local = chunk.path().to_path_buf();

        let failed = uploader
            .upload(chunk, "blocked/run-00000.jsonl")
            .await
            .unwrap_err();

        assert_eq!(failed.key, "blocked/run-00000.jsonl");
        assert!(!failed.message.is_empty());
        assert!(local.exists(), "failed chunk must stay on disk");
        assert_eq!(failed.chunk.record_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_upload_into_error_retains_file() {
        let dir = TempDir::new().unwrap();
        let chunk = chunk_with(&dir, &[json!({"a": 1})]);
        let failed = FailedUpload {
            chunk,
            key: "k-00000.jsonl".into(),
            message: "access denied".into(),
        };

        match failed.into_error(true) {
            TransferError::Upload {
                chunk_index,
                retained_chunk: Some(path),
                ..
            } => {
                assert_eq!(chunk_index, 0);
                assert_eq!(std::fs::read_to_string(path).unwrap(), "{\"a\":1}\n");
            }
            other => panic!("Expected Upload with retained chunk, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_upload_into_error_without_retention() {
        let dir = TempDir::new().unwrap();
        let chunk = chunk_with(&dir, &[json!({"a": 1})]);
        let local = chunk.path().to_path_buf();
        let failed = FailedUpload {
            chunk,
            key: "k".into(),
            message: "denied".into(),
        };

        let err = failed.into_error(false);
        assert!(matches!(err, TransferError::Upload { retained_chunk: None, .. }));
        assert!(!local.exists());
    }

    #[tokio::test]
    async fn test_invalid_key_is_rejected() {
        let dir = TempDir::new().unwrap();
        let uploader = ObjectUploader::new(Arc::new(InMemory::new()), "b");
        let chunk = chunk_with(&dir, &[json!({"a": 1})]);

        let failed = uploader.upload(chunk, "a//b.jsonl").await.unwrap_err();
        assert!(failed.message.contains("Invalid object key"));
    }
}
