//! Copies a key-value table scan into object storage as newline-delimited JSON.
//!
//! A run pages through the table with continuation tokens, writes each record
//! as one JSON line into a size-bounded local chunk, and uploads every chunk
//! as its own object under `{prefix}{run_id}-{chunk_index:05}.jsonl`.
//!
//! ```ignore
//! let catalog = ConnectionCatalog::from_json(&std::fs::read_to_string("connections.json")?)?;
//! let config = TransferConfig::new("airflow_rocks", "airflow-bucket", 64 * 1024 * 1024)
//!     .key_prefix("exports/airflow_rocks/");
//!
//! let mut pipeline = TransferPipeline::connect(config, &catalog, &catalog).await?;
//! let summary = pipeline.run().await?;
//! println!("{} objects written", summary.objects.len());
//! ```

pub mod config;
pub mod connection;
pub mod destination;
pub mod error;
pub mod pipeline;
pub mod record;
pub mod source;
pub mod streaming;

pub use config::{ScanOptions, TransferConfig};
pub use connection::{ConnectionCatalog, DestinationConnector, SourceConnector};
pub use error::{ErrorReport, TransferError, TransferStage};
pub use pipeline::{TransferPhase, TransferPipeline, TransferProgress, TransferSummary};
