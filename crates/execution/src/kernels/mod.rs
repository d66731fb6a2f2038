//! The concrete kernel catalog.
//!
//! One streaming operator per catalog kind, grouped the way the pipeline
//! stages group: scans, row-wise operators, the order-by pipeline, the
//! aggregate stages, and the join stages.

use dfq_common::{KernelId, NodeId};

pub mod aggregate;
pub mod basic;
pub mod join;
pub mod order_by;
pub mod scan;

pub use aggregate::{ComputeAggregateKernel, DistributeAggregateKernel, MergeAggregateKernel};
pub use basic::{FilterKernel, LimitKernel, ProjectionKernel, UnionKernel};
pub use join::{JoinPartitionKernel, PartwiseJoinKernel};
pub use order_by::{MergeStreamKernel, PartitionKernel, PartitionSingleNodeKernel, SortAndSampleKernel};
pub use scan::{BindableTableScanKernel, TableScanKernel};

/// Message token for one kernel's stream from one source node.
///
/// Kernel ids are assigned deterministically from the plan, so every node
/// derives the same token for the same logical stream.
pub(crate) fn exchange_token(prefix: &str, kernel: KernelId, source: NodeId) -> String {
    format!("{prefix}_{kernel}_from_{source}")
}

/// Peer node ids of `local` in a cluster of `total_nodes`.
pub(crate) fn peer_nodes(total_nodes: usize, local: NodeId) -> impl Iterator<Item = NodeId> {
    (0..total_nodes as u32).filter(move |n| *n != local.0).map(NodeId)
}
