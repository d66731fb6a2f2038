//! Streaming kernel runtime for DFQ.
//!
//! Architecture role:
//! - the [`Kernel`] contract and shared port/counter plumbing
//! - the concrete kernel catalog (scans through joins)
//! - the [`QueryGraph`] that wires kernels through cache channels and runs
//!   them, one thread per kernel
//! - the external collaborator contracts: [`BatchCompute`] and [`DataLoader`]
//!
//! Key modules:
//! - [`context`]
//! - [`kernel`]
//! - [`kernels`]
//! - [`graph`]
//! - [`compute`]
//! - [`loader`]

pub mod compute;
pub mod context;
pub mod graph;
pub mod kernel;
pub mod kernels;
pub mod loader;
pub mod testing;

pub use compute::{BatchCompute, JoinSide, SharedCompute};
pub use context::ExecutionContext;
pub use graph::{Edge, QueryGraph};
pub use kernel::{Kernel, KernelBase, KernelCounters, KernelKind, KernelStatus, PortMap};
pub use kernels::{
    BindableTableScanKernel, ComputeAggregateKernel, DistributeAggregateKernel, FilterKernel,
    JoinPartitionKernel, LimitKernel, MergeAggregateKernel, MergeStreamKernel, PartitionKernel,
    PartitionSingleNodeKernel, PartwiseJoinKernel, ProjectionKernel, SortAndSampleKernel,
    TableScanKernel, UnionKernel,
};
pub use loader::{BatchIter, DataLoader, MemoryLoader};
