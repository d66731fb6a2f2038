//! Data-loader contract consumed by the scan kernels.

use std::sync::Arc;

use arrow::record_batch::RecordBatch;
use arrow_schema::SchemaRef;
use dfq_common::Result;

/// Iterator of loaded batches.
pub type BatchIter = Box<dyn Iterator<Item = Result<RecordBatch>> + Send>;

/// A clonable handle producing record batches lazily over a schema.
///
/// Each clone is independently iterable; a table referenced twice in one
/// plan is scanned by two clones without shared cursor state. Storage
/// formats and object-store access live behind this trait, outside the core.
pub trait DataLoader: Send + Sync {
    /// Schema of every batch this loader yields.
    fn schema(&self) -> SchemaRef;

    /// Fresh handle with independent iteration state.
    fn clone_loader(&self) -> Box<dyn DataLoader>;

    /// Start a full scan.
    fn load(&self) -> Result<BatchIter>;

    /// Start a scan with the projection/filter bindings carried by a
    /// bindable-scan expression. Loaders that cannot push down simply run a
    /// full scan; the downstream kernels re-apply the expression anyway.
    fn load_with_pushdown(&self, _bindings: &str) -> Result<BatchIter> {
        self.load()
    }
}

/// In-memory loader over pre-materialized batches.
///
/// Used by single-process deployments and tests; clones share the
/// underlying batch vector.
#[derive(Debug, Clone)]
pub struct MemoryLoader {
    schema: SchemaRef,
    batches: Arc<Vec<RecordBatch>>,
}

impl MemoryLoader {
    /// Wrap pre-materialized batches.
    #[must_use]
    pub fn new(schema: SchemaRef, batches: Vec<RecordBatch>) -> Self {
        Self {
            schema,
            batches: Arc::new(batches),
        }
    }
}

impl DataLoader for MemoryLoader {
    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    fn clone_loader(&self) -> Box<dyn DataLoader> {
        Box::new(self.clone())
    }

    fn load(&self) -> Result<BatchIter> {
        let batches = Arc::clone(&self.batches);
        let total = batches.len();
        Ok(Box::new(
            (0..total).map(move |idx| Ok(batches[idx].clone())),
        ))
    }
}

#[cfg(test)]
mod tests {
    use arrow::array::Int64Array;
    use arrow_schema::{DataType, Field, Schema};

    use super::*;

    #[test]
    fn clones_iterate_independently() {
        let schema = Arc::new(Schema::new(vec![Field::new("v", DataType::Int64, false)]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![Arc::new(Int64Array::from(vec![1, 2, 3]))],
        )
        .unwrap();
        let loader = MemoryLoader::new(schema, vec![batch.clone(), batch]);

        let first = loader.clone_loader();
        let second = loader.clone_loader();
        assert_eq!(first.load().unwrap().count(), 2);
        // Consuming one clone leaves the other untouched.
        assert_eq!(second.load().unwrap().count(), 2);
    }
}
