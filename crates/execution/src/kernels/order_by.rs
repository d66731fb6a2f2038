//! The distributed order-by pipeline: sort-and-sample, range partition,
//! sorted merge.
//!
//! The pipeline contract: sort-and-sample emits per-batch sorted runs on
//! `output_a` and a sampling stream on `output_b`; partition turns samples
//! into range pivots and splits the sorted runs into the partitions of its
//! FOR_EACH output; merge k-way-merges each partition and emits partitions
//! in index order, which yields a globally ordered stream.

use std::sync::Arc;

use dfq_common::{KernelId, Result};
use dfq_transport::{MessageQueue, TransportClient};

use crate::compute::SharedCompute;
use crate::context::ExecutionContext;
use crate::kernel::{Kernel, KernelBase, KernelKind, KernelStatus};
use crate::kernels::{exchange_token, peer_nodes};

/// Sorts each batch and emits both sorted output and a sampling stream for
/// partition boundary selection.
pub struct SortAndSampleKernel {
    base: KernelBase,
    compute: SharedCompute,
}

impl SortAndSampleKernel {
    /// Single-node variant.
    pub fn single_node(
        id: KernelId,
        expression: String,
        context: &ExecutionContext,
        compute: SharedCompute,
    ) -> Self {
        Self {
            base: KernelBase::new(id, KernelKind::SortAndSampleSingleNode, expression, context),
            compute,
        }
    }

    /// Distributed variant; sample exchange happens downstream in the
    /// partition kernel.
    pub fn distributed(
        id: KernelId,
        expression: String,
        context: &ExecutionContext,
        compute: SharedCompute,
    ) -> Self {
        Self {
            base: KernelBase::new(id, KernelKind::SortAndSample, expression, context),
            compute,
        }
    }
}

impl Kernel for SortAndSampleKernel {
    fn base(&self) -> &KernelBase {
        &self.base
    }

    fn run(&self) -> Result<KernelStatus> {
        let input = self.input_port("input")?;
        let sorted_out = self.output_port("output_a")?;
        let sample_out = self.output_port("output_b")?;
        while let Some(batch) = input.pull()? {
            self.base.note_input(&batch);
            let sorted = self.compute.sort(self.expression(), &batch)?;
            let sample = self.compute.sample(self.expression(), &sorted)?;
            self.base.note_output(&sorted);
            sorted_out.push(sorted)?;
            sample_out.push(sample)?;
        }
        Ok(KernelStatus::Finished)
    }
}

/// Splits sorted runs into local range partitions using sampled pivots.
pub struct PartitionSingleNodeKernel {
    base: KernelBase,
    compute: SharedCompute,
}

impl PartitionSingleNodeKernel {
    /// Create the single-node partition stage.
    pub fn new(
        id: KernelId,
        expression: String,
        context: &ExecutionContext,
        compute: SharedCompute,
    ) -> Self {
        Self {
            base: KernelBase::new(id, KernelKind::PartitionSingleNode, expression, context),
            compute,
        }
    }
}

impl Kernel for PartitionSingleNodeKernel {
    fn base(&self) -> &KernelBase {
        &self.base
    }

    // The sample stream is drained before the first sorted batch is
    // consumed; a bounded sorted-run edge would wedge the upstream kernel.
    fn can_throttle_inputs(&self) -> bool {
        false
    }

    fn run(&self) -> Result<KernelStatus> {
        let samples_in = self.input_port("input_b")?;
        let mut samples = Vec::new();
        while let Some(sample) = samples_in.pull()? {
            self.base.note_input(&sample);
            samples.push(sample);
        }

        let output = self.output_port("output")?;
        let num_partitions = output.num_partitions();
        let pivots = self
            .compute
            .pivots_from_samples(self.expression(), &samples, num_partitions)?;

        let sorted_in = self.input_port("input_a")?;
        while let Some(batch) = sorted_in.pull()? {
            self.base.note_input(&batch);
            let parts =
                self.compute
                    .split_by_pivots(self.expression(), &pivots, &batch, num_partitions)?;
            for (idx, part) in parts.into_iter().enumerate() {
                if part.num_rows() == 0 {
                    continue;
                }
                self.base.note_output(&part);
                output.push_to(idx, part)?;
            }
        }
        Ok(KernelStatus::Finished)
    }
}

/// Distributed partition stage: exchanges samples so every node derives the
/// same global pivots, then scatters range partitions to their owner nodes.
pub struct PartitionKernel {
    base: KernelBase,
    compute: SharedCompute,
    transport: Arc<dyn TransportClient>,
    queue: Arc<MessageQueue>,
}

impl PartitionKernel {
    /// Create the distributed partition stage.
    pub fn new(
        id: KernelId,
        expression: String,
        context: &ExecutionContext,
        compute: SharedCompute,
        transport: Arc<dyn TransportClient>,
        queue: Arc<MessageQueue>,
    ) -> Self {
        Self {
            base: KernelBase::new(id, KernelKind::Partition, expression, context),
            compute,
            transport,
            queue,
        }
    }

    fn partition_token(&self, local_partition: usize, source: dfq_common::NodeId) -> String {
        exchange_token(&format!("part_p{local_partition}"), self.id(), source)
    }
}

impl Kernel for PartitionKernel {
    fn base(&self) -> &KernelBase {
        &self.base
    }

    fn can_throttle_inputs(&self) -> bool {
        false
    }

    fn run(&self) -> Result<KernelStatus> {
        let ctx = self.base.context();
        let total_nodes = ctx.total_nodes();
        let local = ctx.node_id();

        // Every node contributes its samples to every peer so the pivot
        // computation is identical cluster-wide.
        let samples_in = self.input_port("input_b")?;
        let sample_token = exchange_token("sample", self.id(), local);
        let mut samples = Vec::new();
        while let Some(sample) = samples_in.pull()? {
            self.base.note_input(&sample);
            for peer in peer_nodes(total_nodes, local) {
                self.transport.publish(peer, &sample_token, sample.clone())?;
            }
            samples.push(sample);
        }
        for peer in peer_nodes(total_nodes, local) {
            self.transport.publish_sentinel(peer, &sample_token)?;
        }
        for peer in peer_nodes(total_nodes, local) {
            let token = exchange_token("sample", self.id(), peer);
            while let Some(message) = self.queue.get(&token) {
                if let Some(batch) = message.into_batch() {
                    samples.push(batch);
                }
            }
        }

        let output = self.output_port("output")?;
        let local_partitions = output.num_partitions();
        let global_partitions = total_nodes * local_partitions;
        let pivots =
            self.compute
                .pivots_from_samples(self.expression(), &samples, global_partitions)?;

        let sorted_in = self.input_port("input_a")?;
        while let Some(batch) = sorted_in.pull()? {
            self.base.note_input(&batch);
            let chunks = self.compute.split_by_pivots(
                self.expression(),
                &pivots,
                &batch,
                global_partitions,
            )?;
            for (global_idx, chunk) in chunks.into_iter().enumerate() {
                if chunk.num_rows() == 0 {
                    continue;
                }
                let owner = (global_idx / local_partitions) as u32;
                let local_idx = global_idx % local_partitions;
                if owner == local.0 {
                    self.base.note_output(&chunk);
                    output.push_to(local_idx, chunk)?;
                } else {
                    let token = self.partition_token(local_idx, local);
                    self.transport
                        .publish(dfq_common::NodeId(owner), &token, chunk)?;
                }
            }
        }
        for peer in peer_nodes(total_nodes, local) {
            for local_idx in 0..local_partitions {
                self.transport
                    .publish_sentinel(peer, &self.partition_token(local_idx, local))?;
            }
        }
        for peer in peer_nodes(total_nodes, local) {
            for local_idx in 0..local_partitions {
                let token = self.partition_token(local_idx, peer);
                while let Some(message) = self.queue.get(&token) {
                    if let Some(batch) = message.into_batch() {
                        self.base.note_output(&batch);
                        output.push_to(local_idx, batch)?;
                    }
                }
            }
        }
        Ok(KernelStatus::Finished)
    }
}

/// K-way-merges pre-sorted partition streams, emitting partitions in index
/// order.
pub struct MergeStreamKernel {
    base: KernelBase,
    compute: SharedCompute,
}

impl MergeStreamKernel {
    /// Create the merge stage.
    pub fn new(
        id: KernelId,
        expression: String,
        context: &ExecutionContext,
        compute: SharedCompute,
    ) -> Self {
        Self {
            base: KernelBase::new(id, KernelKind::MergeStream, expression, context),
            compute,
        }
    }
}

impl Kernel for MergeStreamKernel {
    fn base(&self) -> &KernelBase {
        &self.base
    }

    // Partitions are consumed one at a time to completion; the rest must
    // buffer without blocking the partitioner.
    fn can_throttle_inputs(&self) -> bool {
        false
    }

    fn run(&self) -> Result<KernelStatus> {
        let input = self.input_port("input")?;
        let output = self.output_port("output")?;
        for idx in 0..input.num_partitions() {
            let mut runs = Vec::new();
            while let Some(batch) = input.pull_from(idx)? {
                self.base.note_input(&batch);
                runs.push(batch);
            }
            if runs.is_empty() {
                continue;
            }
            let merged = self.compute.merge_sorted(self.expression(), &runs)?;
            self.base.note_output(&merged);
            output.push(merged)?;
        }
        Ok(KernelStatus::Finished)
    }
}
