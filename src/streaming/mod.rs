//! Local staging of serialized records.
//!
//! Records are appended as JSON lines to a scratch file until the chunk
//! reaches its size limit, then the sealed file is handed to the uploader.
//! Scratch files are removed automatically on every exit path.

mod chunk_writer;

pub use chunk_writer::{ChunkWriter, LocalChunk};
