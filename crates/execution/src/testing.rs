//! Deterministic single-column fixtures and a reference compute backend for
//! tests across the DFQ crates.
//!
//! Every helper operates on batches with one `Int64` column named `v`. The
//! [`TestCompute`] backend implements the full [`BatchCompute`] contract
//! with plain scalar code: filtering keeps even values, sampling takes every
//! fourth row, joining matches on value equality. Semantics are intentionally
//! simple so test expectations can be computed by hand.

use std::sync::Arc;

use arrow::array::Int64Array;
use arrow::record_batch::RecordBatch;
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use dfq_common::{DfqError, Result};

use crate::compute::{BatchCompute, JoinSide};

/// Schema of all fixture batches: one non-null `Int64` column `v`.
pub fn int_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![Field::new("v", DataType::Int64, false)]))
}

/// Build a fixture batch from values.
pub fn int_batch(values: &[i64]) -> RecordBatch {
    RecordBatch::try_new(
        int_schema(),
        vec![Arc::new(Int64Array::from(values.to_vec()))],
    )
    .expect("fixture batch")
}

/// Extract the values of a fixture batch.
pub fn int_values(batch: &RecordBatch) -> Vec<i64> {
    let column = batch
        .column(0)
        .as_any()
        .downcast_ref::<Int64Array>()
        .expect("int64 fixture column");
    column.values().to_vec()
}

/// Flatten the values of many fixture batches in order.
pub fn all_values(batches: &[RecordBatch]) -> Vec<i64> {
    batches.iter().flat_map(|b| int_values(b)).collect()
}

/// Reference compute backend over fixture batches.
#[derive(Debug, Default, Clone, Copy)]
pub struct TestCompute;

impl TestCompute {
    /// Shared handle for kernel constructors.
    pub fn shared() -> Arc<dyn BatchCompute> {
        Arc::new(Self)
    }
}

impl BatchCompute for TestCompute {
    fn project(&self, _expression: &str, batch: &RecordBatch) -> Result<RecordBatch> {
        Ok(batch.clone())
    }

    fn filter(&self, _expression: &str, batch: &RecordBatch) -> Result<RecordBatch> {
        let kept: Vec<i64> = int_values(batch).into_iter().filter(|v| v % 2 == 0).collect();
        Ok(int_batch(&kept))
    }

    fn sort(&self, _expression: &str, batch: &RecordBatch) -> Result<RecordBatch> {
        let mut values = int_values(batch);
        values.sort_unstable();
        Ok(int_batch(&values))
    }

    fn sample(&self, _expression: &str, batch: &RecordBatch) -> Result<RecordBatch> {
        let sampled: Vec<i64> = int_values(batch).into_iter().step_by(4).collect();
        Ok(int_batch(&sampled))
    }

    fn pivots_from_samples(
        &self,
        _expression: &str,
        samples: &[RecordBatch],
        num_partitions: usize,
    ) -> Result<RecordBatch> {
        let mut values = all_values(samples);
        values.sort_unstable();
        if values.is_empty() || num_partitions <= 1 {
            return Ok(int_batch(&[]));
        }
        let pivots: Vec<i64> = (1..num_partitions)
            .map(|p| values[(p * values.len() / num_partitions).min(values.len() - 1)])
            .collect();
        Ok(int_batch(&pivots))
    }

    fn split_by_pivots(
        &self,
        _expression: &str,
        pivots: &RecordBatch,
        batch: &RecordBatch,
        num_partitions: usize,
    ) -> Result<Vec<RecordBatch>> {
        let bounds = int_values(pivots);
        let mut parts: Vec<Vec<i64>> = vec![Vec::new(); num_partitions];
        for v in int_values(batch) {
            let idx = bounds
                .iter()
                .position(|pivot| v < *pivot)
                .unwrap_or(num_partitions - 1);
            parts[idx].push(v);
        }
        Ok(parts.into_iter().map(|p| int_batch(&p)).collect())
    }

    fn merge_sorted(&self, _expression: &str, batches: &[RecordBatch]) -> Result<RecordBatch> {
        let mut values = all_values(batches);
        values.sort_unstable();
        Ok(int_batch(&values))
    }

    fn aggregate_partial(&self, _expression: &str, batch: &RecordBatch) -> Result<RecordBatch> {
        let sum: i64 = int_values(batch).iter().sum();
        Ok(int_batch(&[sum]))
    }

    fn aggregate_merge(&self, _expression: &str, batches: &[RecordBatch]) -> Result<RecordBatch> {
        let sum: i64 = all_values(batches).iter().sum();
        Ok(int_batch(&[sum]))
    }

    fn hash_partition(
        &self,
        _expression: &str,
        batch: &RecordBatch,
        num_partitions: usize,
    ) -> Result<Vec<RecordBatch>> {
        let mut parts: Vec<Vec<i64>> = vec![Vec::new(); num_partitions];
        for v in int_values(batch) {
            parts[v.rem_euclid(num_partitions as i64) as usize].push(v);
        }
        Ok(parts.into_iter().map(|p| int_batch(&p)).collect())
    }

    fn partition_join_side(
        &self,
        expression: &str,
        _side: JoinSide,
        batch: &RecordBatch,
        num_partitions: usize,
    ) -> Result<Vec<RecordBatch>> {
        self.hash_partition(expression, batch, num_partitions)
    }

    fn join(
        &self,
        _expression: &str,
        build: &RecordBatch,
        probe: &RecordBatch,
    ) -> Result<RecordBatch> {
        let build_values = int_values(build);
        let mut joined = Vec::new();
        for v in int_values(probe) {
            let matches = build_values.iter().filter(|b| **b == v).count();
            joined.extend(std::iter::repeat(v).take(matches));
        }
        Ok(int_batch(&joined))
    }
}

/// Compute backend whose every operation fails; exercises kernel error
/// paths and graph teardown.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingCompute;

impl FailingCompute {
    /// Shared handle for kernel constructors.
    pub fn shared() -> Arc<dyn BatchCompute> {
        Arc::new(Self)
    }

    fn fail<T>(op: &str) -> Result<T> {
        Err(DfqError::Kernel(format!("injected {op} failure")))
    }
}

impl BatchCompute for FailingCompute {
    fn project(&self, _expression: &str, _batch: &RecordBatch) -> Result<RecordBatch> {
        Self::fail("project")
    }

    fn filter(&self, _expression: &str, _batch: &RecordBatch) -> Result<RecordBatch> {
        Self::fail("filter")
    }

    fn sort(&self, _expression: &str, _batch: &RecordBatch) -> Result<RecordBatch> {
        Self::fail("sort")
    }

    fn sample(&self, _expression: &str, _batch: &RecordBatch) -> Result<RecordBatch> {
        Self::fail("sample")
    }

    fn pivots_from_samples(
        &self,
        _expression: &str,
        _samples: &[RecordBatch],
        _num_partitions: usize,
    ) -> Result<RecordBatch> {
        Self::fail("pivots_from_samples")
    }

    fn split_by_pivots(
        &self,
        _expression: &str,
        _pivots: &RecordBatch,
        _batch: &RecordBatch,
        _num_partitions: usize,
    ) -> Result<Vec<RecordBatch>> {
        Self::fail("split_by_pivots")
    }

    fn merge_sorted(&self, _expression: &str, _batches: &[RecordBatch]) -> Result<RecordBatch> {
        Self::fail("merge_sorted")
    }

    fn aggregate_partial(&self, _expression: &str, _batch: &RecordBatch) -> Result<RecordBatch> {
        Self::fail("aggregate_partial")
    }

    fn aggregate_merge(&self, _expression: &str, _batches: &[RecordBatch]) -> Result<RecordBatch> {
        Self::fail("aggregate_merge")
    }

    fn hash_partition(
        &self,
        _expression: &str,
        _batch: &RecordBatch,
        _num_partitions: usize,
    ) -> Result<Vec<RecordBatch>> {
        Self::fail("hash_partition")
    }

    fn partition_join_side(
        &self,
        _expression: &str,
        _side: JoinSide,
        _batch: &RecordBatch,
        _num_partitions: usize,
    ) -> Result<Vec<RecordBatch>> {
        Self::fail("partition_join_side")
    }

    fn join(
        &self,
        _expression: &str,
        _build: &RecordBatch,
        _probe: &RecordBatch,
    ) -> Result<RecordBatch> {
        Self::fail("join")
    }
}
