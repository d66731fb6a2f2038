use std::sync::Arc;

use arrow::record_batch::RecordBatch;
use dfq_common::{DfqError, NodeId, Result};
use tracing::debug;

use crate::queue::{MessageQueue, ReceivedMessage};

/// Outbound half of the cross-node exchange.
///
/// The distributing kernels publish batches to peers by node id and message
/// token; delivery lands in the peer's [`MessageQueue`]. The wire layer
/// behind this trait (serialization, sockets, retries) is not part of the
/// core.
pub trait TransportClient: Send + Sync {
    /// Publish one batch to `target` under `token`.
    fn publish(&self, target: NodeId, token: &str, batch: RecordBatch) -> Result<()>;

    /// Publish end-of-stream to `target` for `token`.
    fn publish_sentinel(&self, target: NodeId, token: &str) -> Result<()>;
}

/// In-process exchange routing published payloads straight into per-node
/// message queues. Stands in for the real wire transport in single-process
/// deployments and tests.
#[derive(Debug)]
pub struct LoopbackExchange {
    queues: Vec<Arc<MessageQueue>>,
}

impl LoopbackExchange {
    /// Create queues for `total_nodes` nodes, ids `0..total_nodes`.
    #[must_use]
    pub fn new(total_nodes: usize) -> Arc<Self> {
        Arc::new(Self {
            queues: (0..total_nodes.max(1))
                .map(|_| Arc::new(MessageQueue::new()))
                .collect(),
        })
    }

    /// The inbound queue of one node.
    pub fn queue(&self, node: NodeId) -> Result<Arc<MessageQueue>> {
        self.queues
            .get(node.0 as usize)
            .cloned()
            .ok_or_else(|| DfqError::Transport(format!("unknown node {node}")))
    }

    /// A publishing handle that stamps `local` as the source node.
    #[must_use]
    pub fn client(self: &Arc<Self>, local: NodeId) -> LoopbackClient {
        LoopbackClient {
            exchange: Arc::clone(self),
            local,
        }
    }
}

/// Per-node publishing handle over a [`LoopbackExchange`].
#[derive(Debug, Clone)]
pub struct LoopbackClient {
    exchange: Arc<LoopbackExchange>,
    local: NodeId,
}

impl TransportClient for LoopbackClient {
    fn publish(&self, target: NodeId, token: &str, batch: RecordBatch) -> Result<()> {
        let queue = self.exchange.queue(target)?;
        debug!(source = %self.local, target = %target, token, rows = batch.num_rows(), "publish batch");
        queue.put(ReceivedMessage::new(token, self.local, batch));
        Ok(())
    }

    fn publish_sentinel(&self, target: NodeId, token: &str) -> Result<()> {
        let queue = self.exchange.queue(target)?;
        debug!(source = %self.local, target = %target, token, "publish sentinel");
        queue.put(ReceivedMessage::sentinel(token, self.local));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use arrow::array::Int64Array;
    use arrow_schema::{DataType, Field, Schema};

    use super::*;

    fn batch(values: &[i64]) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![Field::new("v", DataType::Int64, false)]));
        RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(values.to_vec()))])
            .expect("test batch")
    }

    #[test]
    fn loopback_routes_to_target_queue_and_stamps_source() {
        let exchange = LoopbackExchange::new(3);
        let client = exchange.client(NodeId(0));
        client.publish(NodeId(2), "agg_1", batch(&[1])).unwrap();
        client.publish_sentinel(NodeId(2), "agg_1").unwrap();

        let remote = exchange.queue(NodeId(2)).unwrap();
        let msg = remote.get("agg_1").expect("message");
        assert_eq!(msg.source(), NodeId(0));
        assert!(remote.get("agg_1").is_none());
        assert!(exchange.queue(NodeId(1)).unwrap().is_empty());
    }

    #[test]
    fn unknown_target_is_a_transport_error() {
        let exchange = LoopbackExchange::new(2);
        let client = exchange.client(NodeId(0));
        let err = client.publish(NodeId(9), "t", batch(&[1])).unwrap_err();
        assert!(matches!(err, DfqError::Transport(_)));
    }
}
