use uuid::Uuid;

/// Builds object keys of the form `{prefix}{run_id}-{chunk_index:05}.jsonl`.
///
/// The run id keeps keys of different runs apart. The index is zero-padded
/// to five digits, so keys sort in chunk order only for the first 100 000
/// chunks of a run; beyond that, order by `UploadReceipt::chunk_index`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectKeyGenerator {
    prefix: String,
    run_id: String,
}

impl ObjectKeyGenerator {
    pub fn new(prefix: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            run_id: run_id.into(),
        }
    }

    /// Uses the given run id, or a fresh UUIDv4 when there is none.
    pub fn for_run(prefix: impl Into<String>, run_id: Option<&str>) -> Self {
        let run_id = run_id
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        Self::new(prefix, run_id)
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn key(&self, chunk_index: u64) -> String {
        format!("{}{}-{:05}.jsonl", self.prefix, self.run_id, chunk_index)
    }
}
