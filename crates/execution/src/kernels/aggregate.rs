//! The aggregate pipeline stages: per-batch partials, cross-node
//! distribution, final merge.

use std::sync::Arc;

use dfq_common::{KernelId, NodeId, PoolKind, Result};
use dfq_transport::{MessageQueue, TransportClient};

use crate::compute::SharedCompute;
use crate::context::ExecutionContext;
use crate::kernel::{Kernel, KernelBase, KernelKind, KernelStatus};
use crate::kernels::{exchange_token, peer_nodes};

/// Per-batch local aggregation producing partial aggregates.
pub struct ComputeAggregateKernel {
    base: KernelBase,
    compute: SharedCompute,
}

impl ComputeAggregateKernel {
    /// Create the partial-aggregation stage.
    pub fn new(
        id: KernelId,
        expression: String,
        context: &ExecutionContext,
        compute: SharedCompute,
    ) -> Self {
        Self {
            base: KernelBase::new(id, KernelKind::ComputeAggregate, expression, context),
            compute,
        }
    }
}

impl Kernel for ComputeAggregateKernel {
    fn base(&self) -> &KernelBase {
        &self.base
    }

    fn run(&self) -> Result<KernelStatus> {
        let input = self.input_port("input")?;
        let output = self.output_port("output")?;
        while let Some(batch) = input.pull()? {
            self.base.note_input(&batch);
            let partial = self.compute.aggregate_partial(self.expression(), &batch)?;
            self.base.note_output(&partial);
            output.push(partial)?;
        }
        Ok(KernelStatus::Finished)
    }
}

/// Hash-routes partial aggregates across nodes so equal grouping keys land
/// on the same node.
pub struct DistributeAggregateKernel {
    base: KernelBase,
    compute: SharedCompute,
    transport: Arc<dyn TransportClient>,
    queue: Arc<MessageQueue>,
}

impl DistributeAggregateKernel {
    /// Create the distribution stage.
    pub fn new(
        id: KernelId,
        expression: String,
        context: &ExecutionContext,
        compute: SharedCompute,
        transport: Arc<dyn TransportClient>,
        queue: Arc<MessageQueue>,
    ) -> Self {
        Self {
            base: KernelBase::new(id, KernelKind::DistributeAggregate, expression, context),
            compute,
            transport,
            queue,
        }
    }
}

impl Kernel for DistributeAggregateKernel {
    fn base(&self) -> &KernelBase {
        &self.base
    }

    fn run(&self) -> Result<KernelStatus> {
        let ctx = self.base.context();
        let total_nodes = ctx.total_nodes();
        let local = ctx.node_id();
        let input = self.input_port("input")?;
        let output = self.output_port("output")?;
        let own_token = exchange_token("agg", self.id(), local);

        while let Some(batch) = input.pull()? {
            self.base.note_input(&batch);
            let parts = self
                .compute
                .hash_partition(self.expression(), &batch, total_nodes)?;
            for (node_idx, part) in parts.into_iter().enumerate() {
                if part.num_rows() == 0 {
                    continue;
                }
                if node_idx as u32 == local.0 {
                    self.base.note_output(&part);
                    output.push(part)?;
                } else {
                    self.transport
                        .publish(NodeId(node_idx as u32), &own_token, part)?;
                }
            }
        }
        for peer in peer_nodes(total_nodes, local) {
            self.transport.publish_sentinel(peer, &own_token)?;
        }
        for peer in peer_nodes(total_nodes, local) {
            let token = exchange_token("agg", self.id(), peer);
            while let Some(message) = self.queue.get(&token) {
                if let Some(batch) = message.into_batch() {
                    self.base.note_output(&batch);
                    output.push(batch)?;
                }
            }
        }
        Ok(KernelStatus::Finished)
    }
}

/// Final merge of partial aggregates into one result batch.
pub struct MergeAggregateKernel {
    base: KernelBase,
    compute: SharedCompute,
}

impl MergeAggregateKernel {
    /// Create the final-merge stage.
    pub fn new(
        id: KernelId,
        expression: String,
        context: &ExecutionContext,
        compute: SharedCompute,
    ) -> Self {
        Self {
            base: KernelBase::new(id, KernelKind::MergeAggregate, expression, context),
            compute,
        }
    }
}

impl Kernel for MergeAggregateKernel {
    fn base(&self) -> &KernelBase {
        &self.base
    }

    fn run(&self) -> Result<KernelStatus> {
        let input = self.input_port("input")?;
        let output = self.output_port("output")?;
        let pools = Arc::clone(self.base.context().pools());
        let mut reservations = Vec::new();
        let mut partials = Vec::new();
        while let Some(batch) = input.pull()? {
            self.base.note_input(&batch);
            reservations.push(pools.reserve(PoolKind::PinnedHost, batch.get_array_memory_size())?);
            partials.push(batch);
        }
        if partials.is_empty() {
            return Ok(KernelStatus::Finished);
        }
        let merged = self.compute.aggregate_merge(self.expression(), &partials)?;
        drop(reservations);
        self.base.note_output(&merged);
        output.push(merged)?;
        Ok(KernelStatus::Finished)
    }
}
