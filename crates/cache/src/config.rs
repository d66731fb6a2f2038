/// Backing policy of a cache channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    /// Single FIFO; entries pass through untouched.
    Simple,
    /// Entries buffer and one `pull` yields their byte-bounded concatenation.
    Concatenating,
    /// `num_partitions` independent FIFOs addressed by index.
    ForEach,
}

/// Per-edge channel configuration chosen by the graph builder.
///
/// Threshold semantics, on both axes independently: `MAX` means the axis
/// imposes no limit, `0` means the axis never blocks a producer (only the
/// other axis governs), and any other value bounds the channel at that
/// depth/weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Backing policy.
    pub kind: CacheKind,
    /// Independent sub-queue count; 1 unless `kind` is [`CacheKind::ForEach`].
    pub num_partitions: usize,
    /// Batch-count flow-control threshold.
    pub flow_control_batches_threshold: u32,
    /// Byte-size flow-control threshold.
    pub flow_control_bytes_threshold: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            kind: CacheKind::Simple,
            num_partitions: 1,
            flow_control_batches_threshold: u32::MAX,
            flow_control_bytes_threshold: u64::MAX,
        }
    }
}

impl CacheConfig {
    /// Unbounded single FIFO.
    #[must_use]
    pub fn simple() -> Self {
        Self::default()
    }

    /// Single FIFO bounded on both axes.
    #[must_use]
    pub fn simple_throttled(batches_threshold: u32, bytes_threshold: u64) -> Self {
        Self {
            flow_control_batches_threshold: batches_threshold,
            flow_control_bytes_threshold: bytes_threshold,
            ..Self::default()
        }
    }

    /// Concatenating channel with a byte bound on the coalesced pull.
    #[must_use]
    pub fn concatenating(batches_threshold: u32, bytes_threshold: u64) -> Self {
        Self {
            kind: CacheKind::Concatenating,
            flow_control_batches_threshold: batches_threshold,
            flow_control_bytes_threshold: bytes_threshold,
            ..Self::default()
        }
    }

    /// Partitioned channel with `num_partitions` independent FIFOs.
    #[must_use]
    pub fn for_each(num_partitions: usize, batches_threshold: u32, bytes_threshold: u64) -> Self {
        Self {
            kind: CacheKind::ForEach,
            num_partitions: num_partitions.max(1),
            flow_control_batches_threshold: batches_threshold,
            flow_control_bytes_threshold: bytes_threshold,
        }
    }

    /// Whether the batch-count axis can block a producer.
    #[must_use]
    pub fn batches_axis_blocks(&self) -> bool {
        self.flow_control_batches_threshold != 0
            && self.flow_control_batches_threshold != u32::MAX
    }

    /// Whether the byte-size axis can block a producer.
    #[must_use]
    pub fn bytes_axis_blocks(&self) -> bool {
        self.flow_control_bytes_threshold != 0 && self.flow_control_bytes_threshold != u64::MAX
    }
}
