use std::sync::Arc;

use dfq_common::{EngineOptions, KernelId, MemoryPools, NodeId};

/// Shared immutable configuration handed to every kernel of a query.
///
/// Cloning is cheap; [`ExecutionContext::clone_for_kernel`] produces the
/// per-kernel view with the kernel id stamped in so logs and metrics are
/// attributable. Options are read-only once the graph is built.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    total_nodes: usize,
    node_id: NodeId,
    options: Arc<EngineOptions>,
    pools: Arc<MemoryPools>,
    kernel_id: Option<KernelId>,
}

impl ExecutionContext {
    /// Create a context for a cluster of `total_nodes` with unlimited pools.
    #[must_use]
    pub fn new(total_nodes: usize, node_id: NodeId, options: EngineOptions) -> Self {
        Self::with_pools(total_nodes, node_id, options, MemoryPools::unlimited())
    }

    /// Create a context with bootstrap-provided memory pools.
    #[must_use]
    pub fn with_pools(
        total_nodes: usize,
        node_id: NodeId,
        options: EngineOptions,
        pools: Arc<MemoryPools>,
    ) -> Self {
        Self {
            total_nodes: total_nodes.max(1),
            node_id,
            options: Arc::new(options),
            pools,
            kernel_id: None,
        }
    }

    /// Number of nodes participating in the query.
    #[must_use]
    pub fn total_nodes(&self) -> usize {
        self.total_nodes
    }

    /// Whether the cluster is a single node.
    #[must_use]
    pub fn is_single_node(&self) -> bool {
        self.total_nodes == 1
    }

    /// This node's id.
    #[must_use]
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Engine options shared by all kernels of the query.
    #[must_use]
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Memory pools for kernels that stage data.
    #[must_use]
    pub fn pools(&self) -> &Arc<MemoryPools> {
        &self.pools
    }

    /// Kernel id this context was individualized for, if any.
    #[must_use]
    pub fn kernel_id(&self) -> Option<KernelId> {
        self.kernel_id
    }

    /// Individualize the context for one kernel.
    #[must_use]
    pub fn clone_for_kernel(&self, kernel_id: KernelId) -> Self {
        let mut ctx = self.clone();
        ctx.kernel_id = Some(kernel_id);
        ctx
    }
}
