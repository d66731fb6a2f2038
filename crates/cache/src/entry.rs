use arrow::record_batch::RecordBatch;

/// One queued element of a cache channel: a record batch stamped with the
/// channel-local sequence number, or a sentinel marking one producer's
/// end-of-stream.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    sequence: u64,
    batch: Option<RecordBatch>,
}

impl CacheEntry {
    /// Wrap a batch with its channel sequence number.
    #[must_use]
    pub fn new(sequence: u64, batch: RecordBatch) -> Self {
        Self {
            sequence,
            batch: Some(batch),
        }
    }

    /// An end-of-stream marker. Sentinels carry no data.
    #[must_use]
    pub fn sentinel(sequence: u64) -> Self {
        Self {
            sequence,
            batch: None,
        }
    }

    /// Whether this entry marks end-of-stream.
    #[must_use]
    pub fn is_sentinel(&self) -> bool {
        self.batch.is_none()
    }

    /// Channel-local monotonic sequence number.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Byte weight of the wrapped batch; sentinels weigh nothing.
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        self.batch
            .as_ref()
            .map(|b| b.get_array_memory_size() as u64)
            .unwrap_or(0)
    }

    /// Consume the entry, yielding the batch (`None` for sentinels).
    #[must_use]
    pub fn into_batch(self) -> Option<RecordBatch> {
        self.batch
    }
}
