//! Size-bounded JSON line chunks staged on local disk.
//!
//! Records are serialized one per line into a scratch file. The writer tracks
//! the running byte count and decides where one chunk ends and the next
//! begins; a sealed chunk is handed out as a [`LocalChunk`] that owns the file.

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::TransferError;
use crate::record::{write_json_line, Record};

const SCRATCH_PREFIX: &str = "tablecopy-";
const SCRATCH_SUFFIX: &str = ".jsonl";

/// A sealed chunk file waiting for upload.
///
/// The file is deleted when the handle is dropped, unless [`LocalChunk::keep`]
/// is called.
#[derive(Debug)]
pub struct LocalChunk {
    file: NamedTempFile,
    index: u64,
    bytes: u64,
    records: u64,
}

impl LocalChunk {
    /// Position of this chunk within the run, starting at 0.
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn len_bytes(&self) -> u64 {
        self.bytes
    }

    pub fn record_count(&self) -> u64 {
        self.records
    }

    /// Deletes the local file now, reporting any failure.
    pub fn release(self) -> std::io::Result<()> {
        self.file.close()
    }

    /// Detaches the file from cleanup and returns its path.
    pub fn keep(self) -> Result<PathBuf, TransferError> {
        let index = self.index;
        self.file
            .keep()
            .map(|(_, path)| path)
            .map_err(|e| TransferError::Scratch {
                chunk_index: Some(index),
                message: format!("Failed to retain chunk file: {}", e.error),
            })
    }
}

/// The chunk currently being appended to.
struct OpenChunk {
    writer: BufWriter<NamedTempFile>,
    bytes: u64,
    records: u64,
}

/// Accumulates serialized records into chunks no larger than `max_bytes`.
///
/// The only chunk allowed past the limit is one holding a single record whose
/// own line is larger than the limit.
pub struct ChunkWriter {
    max_bytes: u64,
    scratch_dir: PathBuf,
    current: Option<OpenChunk>,
    next_index: u64,
    line: Vec<u8>,
}

impl ChunkWriter {
    /// Creates a writer staging chunk files in `scratch_dir`.
    pub fn new(max_bytes: u64, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            max_bytes,
            scratch_dir: scratch_dir.into(),
            current: None,
            next_index: 0,
            line: Vec::with_capacity(4096),
        }
    }

    /// Creates a writer staging chunk files in the system temp directory.
    pub fn in_temp_dir(max_bytes: u64) -> Self {
        Self::new(max_bytes, std::env::temp_dir())
    }

    /// Index the chunk currently being filled will carry once sealed.
    pub fn current_index(&self) -> u64 {
        self.next_index
    }

    pub fn current_bytes(&self) -> u64 {
        self.current.as_ref().map_or(0, |c| c.bytes)
    }

    pub fn current_records(&self) -> u64 {
        self.current.as_ref().map_or(0, |c| c.records)
    }

    /// Serializes `record` and appends it as one line.
    ///
    /// If the current chunk already holds records and the line would push it
    /// past the limit, that chunk is sealed and returned, and the line starts
    /// a new chunk.
    ///
    /// # Errors
    ///
    /// - `TransferError::Serialization` if the record cannot be written as JSON
    ///   (e.g. a number with no finite float form)
    /// - `TransferError::Scratch` if the scratch file cannot be created or written
    pub fn add(&mut self, record: &Record) -> Result<Option<LocalChunk>, TransferError> {
        self.line.clear();
        write_json_line(record, &mut self.line).map_err(|e| TransferError::Serialization {
            chunk_index: self.next_index,
            message: e.to_string(),
        })?;
        let line_len = self.line.len() as u64;

        let would_overflow = self
            .current
            .as_ref()
            .is_some_and(|open| open.records > 0 && open.bytes + line_len > self.max_bytes);
        let sealed = if would_overflow { self.flush()? } else { None };

        if self.current.is_none() {
            self.current = Some(self.open_chunk()?);
        }
        let chunk_index = self.next_index;
        if let Some(open) = self.current.as_mut() {
            open.writer
                .write_all(&self.line)
                .map_err(|e| TransferError::Scratch {
                    chunk_index: Some(chunk_index),
                    message: format!("Failed to write chunk file: {}", e),
                })?;
            open.bytes += line_len;
            open.records += 1;
        }

        Ok(sealed)
    }

    /// True once the current chunk has reached the size limit.
    pub fn should_flush(&self) -> bool {
        self.current_bytes() >= self.max_bytes
    }

    /// Seals the current chunk. Returns `None` when nothing has been written.
    ///
    /// # Errors
    ///
    /// Returns `TransferError::Scratch` if buffered lines cannot be written out.
    pub fn flush(&mut self) -> Result<Option<LocalChunk>, TransferError> {
        let Some(open) = self.current.take() else {
            return Ok(None);
        };

        let file = open
            .writer
            .into_inner()
            .map_err(|e| TransferError::Scratch {
                chunk_index: Some(self.next_index),
                message: format!("Failed to flush chunk file: {}", e.error()),
            })?;

        let chunk = LocalChunk {
            file,
            index: self.next_index,
            bytes: open.bytes,
            records: open.records,
        };
        self.next_index += 1;

        debug!(
            chunk_index = chunk.index,
            records = chunk.records,
            bytes = chunk.bytes,
            "Sealed chunk"
        );

        Ok(Some(chunk))
    }

    /// Drops the chunk being filled, deleting its file. Returns the number of
    /// records discarded.
    pub fn discard(&mut self) -> u64 {
        self.current.take().map_or(0, |open| open.records)
    }

    fn open_chunk(&self) -> Result<OpenChunk, TransferError> {
        let file = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .suffix(SCRATCH_SUFFIX)
            .tempfile_in(&self.scratch_dir)
            .map_err(|e| TransferError::Scratch {
                chunk_index: Some(self.next_index),
                message: format!(
                    "Failed to create chunk file in {}: {}",
                    self.scratch_dir.display(),
                    e
                ),
            })?;

        Ok(OpenChunk {
            writer: BufWriter::new(file),
            bytes: 0,
            records: 0,
        })
    }
}
