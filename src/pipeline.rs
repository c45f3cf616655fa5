//! Scan → serialize → chunk → upload orchestration for one run.
//!
//! The pipeline pulls pages from a [`PageReader`], writes every record as a
//! JSON line through a [`ChunkWriter`], and hands each sealed chunk to the
//! [`ObjectUploader`] under the next key of the run. Everything happens in
//! sequence: one page fetch or one upload in flight at a time.
//!
//! ```text
//! Init → Scanning → (ChunkFull → Uploading → Scanning)* → FinalFlush → Uploading → Done
//!                              any state → Failed
//! ```

use std::sync::Arc;
use std::time::Instant;

use object_store::ObjectStore;
use serde::Serialize;
use tracing::{error, info};

use crate::config::TransferConfig;
use crate::connection::{DestinationConnector, SourceConnector};
use crate::destination::{ObjectKeyGenerator, ObjectUploader, UploadReceipt};
use crate::error::TransferError;
use crate::source::{ContinuationToken, PageReader, TableScanner};
use crate::streaming::{ChunkWriter, LocalChunk};

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferPhase {
    Init,
    Scanning,
    ChunkFull,
    Uploading,
    FinalFlush,
    Done,
    Failed,
}

/// Mutable run state, updated once per page and once per chunk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransferState {
    /// Token the next scan request will carry. Records of earlier pages may
    /// still be buffered, so resume from `resume_token` instead.
    pub continuation_token: Option<ContinuationToken>,
    /// Cursor a later run should pass as `exclusive_start_key` to pick up
    /// every record not yet in an uploaded object. It moves past a page only
    /// once all of that page's records have been uploaded, so resuming may
    /// repeat records but never skips one. `None` means from the start.
    /// Only meaningful once a run has failed.
    pub resume_token: Option<ContinuationToken>,
    /// Index the next uploaded chunk will get.
    pub chunk_index: u64,
    pub pages_fetched: u64,
    pub records_read: u64,
    pub bytes_uploaded: u64,
}

/// Snapshot handed to the progress callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferProgress {
    pub run_id: String,
    pub phase: TransferPhase,
    pub pages_fetched: u64,
    pub records_read: u64,
    pub objects_uploaded: u64,
    pub bytes_uploaded: u64,
    pub last_key: Option<String>,
}

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferSummary {
    pub run_id: String,
    /// Uploaded objects in chunk order.
    pub objects: Vec<UploadReceipt>,
    pub pages_fetched: u64,
    pub records_read: u64,
    pub bytes_uploaded: u64,
}

impl TransferSummary {
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.objects.iter().map(|o| o.key.as_str())
    }
}

/// One table-to-object-store copy. Runs at most once.
pub struct TransferPipeline {
    config: TransferConfig,
    reader: PageReader,
    writer: ChunkWriter,
    uploader: ObjectUploader,
    keys: ObjectKeyGenerator,
    phase: TransferPhase,
    state: TransferState,
    receipts: Vec<UploadReceipt>,
}

impl TransferPipeline {
    /// Builds a pipeline over an already connected scanner and store.
    ///
    /// `store` must be scoped to `config.destination_bucket`.
    ///
    /// # Errors
    ///
    /// Returns `TransferError::InvalidConfig` if the configuration does not validate.
    pub fn new(
        config: TransferConfig,
        scanner: Box<dyn TableScanner>,
        store: Arc<dyn ObjectStore>,
    ) -> Result<Self, TransferError> {
        config.validate()?;

        let reader = PageReader::new(scanner, config.table_name.clone(), config.scan.clone());
        let scratch_dir = config
            .scratch_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        let writer = ChunkWriter::new(config.max_chunk_size_bytes, scratch_dir);
        let uploader = ObjectUploader::new(store, config.destination_bucket.clone())
            .with_multipart_threshold(config.multipart_threshold_bytes);
        let keys = ObjectKeyGenerator::for_run(
            config.destination_key_prefix.clone(),
            config.run_id.as_deref(),
        );
        let state = TransferState {
            continuation_token: reader.continuation_token().cloned(),
            resume_token: reader.continuation_token().cloned(),
            ..TransferState::default()
        };

        Ok(Self {
            config,
            reader,
            writer,
            uploader,
            keys,
            phase: TransferPhase::Init,
            state,
            receipts: Vec::new(),
        })
    }

    /// Resolves the configured connection ids and builds the pipeline.
    ///
    /// The source connection id goes to `sources`, the destination connection
    /// id and bucket go to `destinations`.
    pub async fn connect(
        config: TransferConfig,
        sources: &dyn SourceConnector,
        destinations: &dyn DestinationConnector,
    ) -> Result<Self, TransferError> {
        config.validate()?;

        let scanner = sources.connect_source(&config.source_connection_id).await?;
        let store = destinations
            .connect_destination(&config.destination_connection_id, &config.destination_bucket)
            .await?;

        Self::new(config, scanner, store)
    }

    pub fn run_id(&self) -> &str {
        self.keys.run_id()
    }

    pub fn phase(&self) -> TransferPhase {
        self.phase
    }

    pub fn state(&self) -> &TransferState {
        &self.state
    }

    /// Executes the transfer.
    ///
    /// # Errors
    ///
    /// The first failure ends the run:
    /// - `PageFetch` when a page cannot be fetched
    /// - `Serialization` when a record cannot be written as JSON
    /// - `Upload` when a chunk cannot be stored (its local file is kept when
    ///   `retain_failed_chunks` is set)
    /// - `AlreadyRan` when called a second time
    ///
    /// Objects uploaded before the failure stay in the bucket.
    pub async fn run(&mut self) -> Result<TransferSummary, TransferError> {
        self.run_with_progress(|_| {}).await
    }

    /// Like [`run`](Self::run), calling `on_progress` after every page, every
    /// upload and at the end of the run.
    pub async fn run_with_progress<F>(&mut self, mut on_progress: F) -> Result<TransferSummary, TransferError>
    where
        F: FnMut(&TransferProgress) + Send,
    {
        if self.phase != TransferPhase::Init {
            return Err(TransferError::AlreadyRan);
        }

        let start = Instant::now();
        info!(
            "[TRANSFER] Run {}: '{}' -> bucket '{}' prefix '{}', max chunk {} bytes",
            self.run_id(),
            self.config.table_name,
            self.config.destination_bucket,
            self.config.destination_key_prefix,
            self.config.max_chunk_size_bytes
        );

        match self.drive(&mut on_progress).await {
            Ok(()) => {
                self.phase = TransferPhase::Done;
                on_progress(&self.progress());
                info!(
                    "[TRANSFER] Run {} complete: {} records, {} pages, {} objects, {} bytes in {}ms",
                    self.run_id(),
                    self.state.records_read,
                    self.state.pages_fetched,
                    self.receipts.len(),
                    self.state.bytes_uploaded,
                    start.elapsed().as_millis()
                );
                Ok(self.summary())
            }
            Err(err) => {
                let err = err.in_chunk(self.writer.current_index());
                self.phase = TransferPhase::Failed;
                let discarded = self.writer.discard();
                on_progress(&self.progress());
                error!(
                    "[TRANSFER] Run {} failed after {} objects ({} buffered records discarded): {}",
                    self.run_id(),
                    self.receipts.len(),
                    discarded,
                    err
                );
                Err(err)
            }
        }
    }

    async fn drive<F>(&mut self, on_progress: &mut F) -> Result<(), TransferError>
    where
        F: FnMut(&TransferProgress) + Send,
    {
        if let Some(dir) = &self.config.scratch_dir {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| TransferError::Scratch {
                    chunk_index: None,
                    message: format!("Failed to create scratch directory {}: {}", dir.display(), e),
                })?;
        }

        self.phase = TransferPhase::Scanning;
        loop {
            let page_start = self.reader.continuation_token().cloned();
            let Some(page) = self.reader.next_page().await? else {
                break;
            };
            self.state.pages_fetched = self.reader.pages_fetched();
            self.state.continuation_token = self.reader.continuation_token().cloned();

            for record in &page.items {
                self.state.records_read += 1;

                if let Some(sealed) = self.writer.add(record)? {
                    self.phase = TransferPhase::ChunkFull;
                    self.upload(sealed, on_progress).await?;
                }
                if self.writer.should_flush() {
                    self.phase = TransferPhase::ChunkFull;
                    if let Some(full) = self.writer.flush()? {
                        self.upload(full, on_progress).await?;
                    }
                    // Nothing buffered: the rest of this page is all that is missing.
                    self.state.resume_token = page_start.clone();
                }
            }
            if self.writer.current_records() == 0 {
                self.state.resume_token = page.continuation_token.clone();
            }

            on_progress(&self.progress());
        }

        self.phase = TransferPhase::FinalFlush;
        if let Some(rest) = self.writer.flush()? {
            self.upload(rest, on_progress).await?;
        }

        Ok(())
    }

    async fn upload<F>(&mut self, chunk: LocalChunk, on_progress: &mut F) -> Result<(), TransferError>
    where
        F: FnMut(&TransferProgress) + Send,
    {
        let return_to = self.phase;
        self.phase = TransferPhase::Uploading;

        let key = self.keys.key(chunk.index());
        let receipt = self
            .uploader
            .upload(chunk, &key)
            .await
            .map_err(|failed| failed.into_error(self.config.retain_failed_chunks))?;

        self.state.chunk_index = receipt.chunk_index + 1;
        self.state.bytes_uploaded += receipt.bytes;
        self.receipts.push(receipt);

        on_progress(&self.progress());
        self.phase = match return_to {
            TransferPhase::FinalFlush => TransferPhase::FinalFlush,
            _ => TransferPhase::Scanning,
        };
        Ok(())
    }

    fn progress(&self) -> TransferProgress {
        TransferProgress {
            run_id: self.run_id().to_string(),
            phase: self.phase,
            pages_fetched: self.state.pages_fetched,
            records_read: self.state.records_read,
            objects_uploaded: self.receipts.len() as u64,
            bytes_uploaded: self.state.bytes_uploaded,
            last_key: self.receipts.last().map(|r| r.key.clone()),
        }
    }

    fn summary(&self) -> TransferSummary {
        TransferSummary {
            run_id: self.run_id().to_string(),
            objects: self.receipts.clone(),
            pages_fetched: self.state.pages_fetched,
            records_read: self.state.records_read,
            bytes_uploaded: self.state.bytes_uploaded,
        }
    }
}
