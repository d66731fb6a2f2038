//! Batch-compute contract consumed by kernel bodies.
//!
//! Kernels never evaluate relational expressions themselves; every
//! projection, predicate, sort, or join lands here. Implementations live
//! outside the core (the production backend drives accelerator kernels) and
//! receive the kernel's expression fragment as an opaque string; parsing it
//! is the implementor's concern. Failures surface as [`DfqError::Kernel`].
//!
//! [`DfqError::Kernel`]: dfq_common::DfqError::Kernel

use std::sync::Arc;

use arrow::record_batch::RecordBatch;
use dfq_common::Result;

/// Which side of a join a batch belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinSide {
    /// First (left) input.
    Left,
    /// Second (right) input.
    Right,
}

/// Relational operations over record batches, evaluated by an external
/// compute backend.
pub trait BatchCompute: Send + Sync {
    /// Evaluate a projection expression over one batch.
    fn project(&self, expression: &str, batch: &RecordBatch) -> Result<RecordBatch>;

    /// Drop rows failing the predicate carried by `expression`.
    fn filter(&self, expression: &str, batch: &RecordBatch) -> Result<RecordBatch>;

    /// Sort one batch by the order-by columns carried by `expression`.
    fn sort(&self, expression: &str, batch: &RecordBatch) -> Result<RecordBatch>;

    /// Draw a sample of rows from a sorted batch for pivot selection.
    fn sample(&self, expression: &str, batch: &RecordBatch) -> Result<RecordBatch>;

    /// Select `num_partitions - 1` pivot rows from collected samples.
    fn pivots_from_samples(
        &self,
        expression: &str,
        samples: &[RecordBatch],
        num_partitions: usize,
    ) -> Result<RecordBatch>;

    /// Split a sorted batch into `num_partitions` range partitions.
    ///
    /// The returned vector always has `num_partitions` elements; empty
    /// ranges yield empty batches.
    fn split_by_pivots(
        &self,
        expression: &str,
        pivots: &RecordBatch,
        batch: &RecordBatch,
        num_partitions: usize,
    ) -> Result<Vec<RecordBatch>>;

    /// K-way-merge pre-sorted batches into one sorted batch.
    fn merge_sorted(&self, expression: &str, batches: &[RecordBatch]) -> Result<RecordBatch>;

    /// Per-batch local aggregation.
    fn aggregate_partial(&self, expression: &str, batch: &RecordBatch) -> Result<RecordBatch>;

    /// Final merge of partial aggregates.
    fn aggregate_merge(&self, expression: &str, batches: &[RecordBatch]) -> Result<RecordBatch>;

    /// Hash-partition a batch of partial aggregates by its grouping keys.
    fn hash_partition(
        &self,
        expression: &str,
        batch: &RecordBatch,
        num_partitions: usize,
    ) -> Result<Vec<RecordBatch>>;

    /// Hash-partition one side of a join by its join keys.
    fn partition_join_side(
        &self,
        expression: &str,
        side: JoinSide,
        batch: &RecordBatch,
        num_partitions: usize,
    ) -> Result<Vec<RecordBatch>>;

    /// Join a probe batch against the accumulated build side.
    fn join(&self, expression: &str, build: &RecordBatch, probe: &RecordBatch)
    -> Result<RecordBatch>;
}

/// Shared handle to the compute backend.
pub type SharedCompute = Arc<dyn BatchCompute>;
