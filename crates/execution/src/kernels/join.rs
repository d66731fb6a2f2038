//! The join pipeline stages: cross-node co-partitioning and the streaming
//! pairwise hash join.

use std::sync::Arc;

use arrow::compute::concat_batches;
use dfq_cache::CacheChannel;
use dfq_common::{DfqError, KernelId, NodeId, PoolKind, Result};
use dfq_transport::{MessageQueue, TransportClient};

use crate::compute::{JoinSide, SharedCompute};
use crate::context::ExecutionContext;
use crate::kernel::{Kernel, KernelBase, KernelKind, KernelStatus};
use crate::kernels::{exchange_token, peer_nodes};

/// Streaming hash join of already co-partitioned inputs.
///
/// The left input is the build side: it is staged in full (reserving
/// pinned-host budget), then each right batch probes it.
pub struct PartwiseJoinKernel {
    base: KernelBase,
    compute: SharedCompute,
}

impl PartwiseJoinKernel {
    /// Create the join stage.
    pub fn new(
        id: KernelId,
        expression: String,
        context: &ExecutionContext,
        compute: SharedCompute,
    ) -> Self {
        Self {
            base: KernelBase::new(id, KernelKind::PartwiseJoin, expression, context),
            compute,
        }
    }
}

impl Kernel for PartwiseJoinKernel {
    fn base(&self) -> &KernelBase {
        &self.base
    }

    // The probe side backs up while the build side is staged.
    fn can_throttle_inputs(&self) -> bool {
        false
    }

    fn run(&self) -> Result<KernelStatus> {
        let build_in = self.input_port("input_a")?;
        let probe_in = self.input_port("input_b")?;
        let output = self.output_port("output")?;
        let pools = Arc::clone(self.base.context().pools());

        let mut reservations = Vec::new();
        let mut build_batches = Vec::new();
        while let Some(batch) = build_in.pull()? {
            self.base.note_input(&batch);
            reservations.push(pools.reserve(PoolKind::PinnedHost, batch.get_array_memory_size())?);
            build_batches.push(batch);
        }

        if build_batches.is_empty() {
            // Inner join against an empty build side matches nothing.
            while probe_in.pull()?.is_some() {}
            return Ok(KernelStatus::Finished);
        }

        let schema = build_batches[0].schema();
        let build = concat_batches(&schema, &build_batches).map_err(|e| {
            DfqError::Kernel(format!(
                "kernel {}: staging join build side failed: {e}",
                self.id()
            ))
        })?;
        drop(build_batches);

        while let Some(probe) = probe_in.pull()? {
            self.base.note_input(&probe);
            let joined = self.compute.join(self.expression(), &build, &probe)?;
            if joined.num_rows() == 0 {
                continue;
            }
            self.base.note_output(&joined);
            output.push(joined)?;
        }
        Ok(KernelStatus::Finished)
    }
}

/// Produces co-partitioned join inputs: both sides are hash-partitioned by
/// their join keys across nodes, so matching keys land on the same node's
/// `output_a`/`output_b` pair.
pub struct JoinPartitionKernel {
    base: KernelBase,
    compute: SharedCompute,
    transport: Arc<dyn TransportClient>,
    queue: Arc<MessageQueue>,
}

impl JoinPartitionKernel {
    /// Create the co-partitioning stage.
    pub fn new(
        id: KernelId,
        expression: String,
        context: &ExecutionContext,
        compute: SharedCompute,
        transport: Arc<dyn TransportClient>,
        queue: Arc<MessageQueue>,
    ) -> Self {
        Self {
            base: KernelBase::new(id, KernelKind::JoinPartition, expression, context),
            compute,
            transport,
            queue,
        }
    }

    fn shuffle_side(
        &self,
        side: JoinSide,
        input: &CacheChannel,
        output: &CacheChannel,
        prefix: &str,
    ) -> Result<()> {
        let ctx = self.base.context();
        let total_nodes = ctx.total_nodes();
        let local = ctx.node_id();
        let own_token = exchange_token(prefix, self.id(), local);

        while let Some(batch) = input.pull()? {
            self.base.note_input(&batch);
            let parts =
                self.compute
                    .partition_join_side(self.expression(), side, &batch, total_nodes)?;
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
            let token = exchange_token(prefix, self.id(), peer);
            while let Some(message) = self.queue.get(&token) {
                if let Some(batch) = message.into_batch() {
                    self.base.note_output(&batch);
                    output.push(batch)?;
                }
            }
        }
        Ok(())
    }
}

impl Kernel for JoinPartitionKernel {
    fn base(&self) -> &KernelBase {
        &self.base
    }

    // Sides are shuffled sequentially; the second input buffers meanwhile.
    fn can_throttle_inputs(&self) -> bool {
        false
    }

    fn run(&self) -> Result<KernelStatus> {
        let left_in = self.input_port("input_a")?;
        let right_in = self.input_port("input_b")?;
        let left_out = self.output_port("output_a")?;
        let right_out = self.output_port("output_b")?;
        self.shuffle_side(JoinSide::Left, &left_in, &left_out, "join_a")?;
        self.shuffle_side(JoinSide::Right, &right_in, &right_out, "join_b")?;
        Ok(KernelStatus::Finished)
    }
}
