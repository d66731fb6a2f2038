//! Kernel-graph construction from a rewritten plan tree.
//!
//! Architecture role:
//! - parses the frontend's plan JSON and applies the distributed rewrite
//! - instantiates one catalog kernel per tree node (unknown operator tokens
//!   fail the build before anything runs)
//! - wires parent/child ports with a per-edge cache policy chosen by the
//!   (child kind, parent kind) pair
//!
//! Throttling is parent-driven: only the consuming kernel knows whether it
//! can block its input without deadlocking, so bounded edge configurations
//! are applied only when the parent reports `can_throttle_inputs`.

use std::fmt::Write as _;
use std::sync::Arc;

use dfq_cache::CacheConfig;
use dfq_common::{DfqError, KernelId, Result};
use dfq_execution::{
    BindableTableScanKernel, ComputeAggregateKernel, DataLoader, DistributeAggregateKernel,
    ExecutionContext, FilterKernel, JoinPartitionKernel, Kernel, KernelKind, LimitKernel,
    MergeAggregateKernel, MergeStreamKernel, PartitionKernel, PartitionSingleNodeKernel,
    PartwiseJoinKernel, ProjectionKernel, QueryGraph, SharedCompute, SortAndSampleKernel,
    TableScanKernel, UnionKernel,
};
use dfq_transport::{MessageQueue, TransportClient};
use tracing::debug;

use crate::algebra::{
    BINDABLE_TABLE_SCAN, LOGICAL_COMPUTE_AGGREGATE, LOGICAL_DISTRIBUTE_AGGREGATE, LOGICAL_FILTER,
    LOGICAL_JOIN_PARTITION, LOGICAL_LIMIT, LOGICAL_MERGE, LOGICAL_MERGE_AGGREGATE,
    LOGICAL_PARTITION, LOGICAL_PARTWISE_JOIN, LOGICAL_PROJECT, LOGICAL_SINGLE_NODE_PARTITION,
    LOGICAL_SINGLE_NODE_SORT_AND_SAMPLE, LOGICAL_SORT_AND_SAMPLE, LOGICAL_TABLE_SCAN,
    LOGICAL_UNION, leading_operator, limit_rows, table_name,
};
use crate::rewriter::{PlanNode, rewrite_plan};

/// A named table and the loader that scans it.
pub struct TableBinding {
    /// Table name as it appears in scan expressions.
    pub name: String,
    /// Loader handle; each scan kernel receives a fresh clone.
    pub loader: Box<dyn DataLoader>,
}

/// One node of the instantiated plan tree. The tree is auxiliary: kernels
/// are owned by the graph, the tree carries ids, and it is dropped once the
/// edges are wired.
#[derive(Debug)]
pub struct TreeNode {
    /// Id of the kernel instantiated for this node.
    pub id: KernelId,
    /// Catalog kind of that kernel.
    pub kind: KernelKind,
    /// The node's operator expression.
    pub expr: String,
    /// Depth in the plan tree.
    pub level: usize,
    /// Ordered children; the first child is the left input.
    pub children: Vec<TreeNode>,
}

/// Render an instantiated plan tree as an indented `[kind_id] expr` listing.
#[must_use]
pub fn explain_tree(node: &TreeNode) -> String {
    fn render(node: &TreeNode, out: &mut String) {
        for _ in 0..node.level * 2 {
            out.push(' ');
        }
        let _ = writeln!(out, "[{}_{}] {}", node.kind, node.id, node.expr);
        for child in &node.children {
            render(child, out);
        }
    }
    let mut out = String::new();
    render(node, &mut out);
    out
}

/// Walks a rewritten plan tree, instantiates kernels, and wires edges.
pub struct GraphBuilder {
    context: ExecutionContext,
    compute: SharedCompute,
    tables: Vec<TableBinding>,
    transport: Option<(Arc<dyn TransportClient>, Arc<MessageQueue>)>,
    next_kernel_id: u32,
}

impl GraphBuilder {
    /// Create a builder for one query.
    #[must_use]
    pub fn new(context: ExecutionContext, compute: SharedCompute) -> Self {
        Self {
            context,
            compute,
            tables: Vec::new(),
            transport: None,
            next_kernel_id: 0,
        }
    }

    /// Register a table loader for scan expressions naming `name`.
    #[must_use]
    pub fn with_table(mut self, name: impl Into<String>, loader: Box<dyn DataLoader>) -> Self {
        self.tables.push(TableBinding {
            name: name.into(),
            loader,
        });
        self
    }

    /// Attach the cross-node exchange used by the distributing kernels.
    #[must_use]
    pub fn with_transport(
        mut self,
        transport: Arc<dyn TransportClient>,
        queue: Arc<MessageQueue>,
    ) -> Self {
        self.transport = Some((transport, queue));
        self
    }

    /// Parse plan JSON, rewrite it for the cluster, and build the graph.
    pub fn build(&mut self, json: &str) -> Result<QueryGraph> {
        let plan: PlanNode = serde_json::from_str(json)
            .map_err(|e| DfqError::InvalidAlgebra(format!("malformed plan JSON: {e}")))?;
        self.build_plan(plan)
    }

    /// Rewrite an already-parsed plan tree and build the graph.
    pub fn build_plan(&mut self, mut plan: PlanNode) -> Result<QueryGraph> {
        rewrite_plan(&mut plan, self.context.total_nodes());
        let mut graph = QueryGraph::new();
        let tree = self.instantiate(&mut graph, &plan, 0)?;
        debug!(plan = %explain_tree(&tree), "instantiated kernel tree");
        self.visit(&mut graph, &tree)?;
        graph.set_result(tree.id)?;
        Ok(graph)
    }

    fn instantiate(
        &mut self,
        graph: &mut QueryGraph,
        plan: &PlanNode,
        level: usize,
    ) -> Result<TreeNode> {
        let kernel = self.make_kernel(&plan.expr)?;
        let id = kernel.id();
        let kind = kernel.kind();
        graph.add_node(kernel);
        let children = plan
            .children
            .iter()
            .map(|child| self.instantiate(graph, child, level + 1))
            .collect::<Result<Vec<_>>>()?;
        Ok(TreeNode {
            id,
            kind,
            expr: plan.expr.clone(),
            level,
            children,
        })
    }

    fn make_kernel(&mut self, expr: &str) -> Result<Arc<dyn Kernel>> {
        let id = KernelId(self.next_kernel_id);
        self.next_kernel_id += 1;
        let expr_owned = expr.to_string();
        let ctx = &self.context;
        let compute = || Arc::clone(&self.compute);

        let kernel: Arc<dyn Kernel> = match leading_operator(expr) {
            LOGICAL_PROJECT => Arc::new(ProjectionKernel::new(id, expr_owned, ctx, compute())),
            LOGICAL_FILTER => Arc::new(FilterKernel::new(id, expr_owned, ctx, compute())),
            LOGICAL_TABLE_SCAN => {
                Arc::new(TableScanKernel::new(id, expr_owned, ctx, self.loader_for(expr)?))
            }
            BINDABLE_TABLE_SCAN => Arc::new(BindableTableScanKernel::new(
                id,
                expr_owned,
                ctx,
                self.loader_for(expr)?,
            )),
            LOGICAL_LIMIT => Arc::new(LimitKernel::new(id, expr_owned, ctx, limit_rows(expr))),
            LOGICAL_UNION => Arc::new(UnionKernel::new(id, expr_owned, ctx)),
            LOGICAL_MERGE => Arc::new(MergeStreamKernel::new(id, expr_owned, ctx, compute())),
            LOGICAL_SINGLE_NODE_SORT_AND_SAMPLE => {
                Arc::new(SortAndSampleKernel::single_node(id, expr_owned, ctx, compute()))
            }
            LOGICAL_SORT_AND_SAMPLE => {
                Arc::new(SortAndSampleKernel::distributed(id, expr_owned, ctx, compute()))
            }
            LOGICAL_SINGLE_NODE_PARTITION => {
                Arc::new(PartitionSingleNodeKernel::new(id, expr_owned, ctx, compute()))
            }
            LOGICAL_PARTITION => {
                let (transport, queue) = self.transport_for(expr)?;
                Arc::new(PartitionKernel::new(id, expr_owned, ctx, compute(), transport, queue))
            }
            LOGICAL_COMPUTE_AGGREGATE => {
                Arc::new(ComputeAggregateKernel::new(id, expr_owned, ctx, compute()))
            }
            LOGICAL_DISTRIBUTE_AGGREGATE => {
                let (transport, queue) = self.transport_for(expr)?;
                Arc::new(DistributeAggregateKernel::new(
                    id, expr_owned, ctx, compute(), transport, queue,
                ))
            }
            LOGICAL_MERGE_AGGREGATE => {
                Arc::new(MergeAggregateKernel::new(id, expr_owned, ctx, compute()))
            }
            LOGICAL_PARTWISE_JOIN => {
                Arc::new(PartwiseJoinKernel::new(id, expr_owned, ctx, compute()))
            }
            LOGICAL_JOIN_PARTITION => {
                let (transport, queue) = self.transport_for(expr)?;
                Arc::new(JoinPartitionKernel::new(id, expr_owned, ctx, compute(), transport, queue))
            }
            _ => {
                return Err(DfqError::InvalidAlgebra(format!(
                    "expression in the relational algebra is not supported: {expr}"
                )));
            }
        };
        Ok(kernel)
    }

    fn loader_for(&self, expr: &str) -> Result<Box<dyn DataLoader>> {
        let name = table_name(expr).ok_or_else(|| {
            DfqError::InvalidAlgebra(format!("scan expression without a table name: {expr}"))
        })?;
        let binding = self.tables.iter().find(|t| t.name == name).ok_or_else(|| {
            DfqError::InvalidConfig(format!("no loader registered for table {name}"))
        })?;
        Ok(binding.loader.clone_loader())
    }

    fn transport_for(&self, expr: &str) -> Result<(Arc<dyn TransportClient>, Arc<MessageQueue>)> {
        self.transport.clone().ok_or_else(|| {
            DfqError::InvalidConfig(format!(
                "distributed kernel requires a transport attachment: {expr}"
            ))
        })
    }

    fn visit(&self, graph: &mut QueryGraph, parent: &TreeNode) -> Result<()> {
        for (index, child) in parent.children.iter().enumerate() {
            self.visit(graph, child)?;
            self.link_edge(graph, child, parent, index, parent.children.len())?;
        }
        Ok(())
    }

    /// The per-edge cache policy rules, matched in order:
    ///
    /// 1. n-ary parents take one SIMPLE edge per child on `input_<a|b|...>`;
    /// 2. the two-stream stage pairs (join partition into pairwise join,
    ///    sort-and-sample into partition) take parallel `output_a`/`output_b`
    ///    edges;
    /// 3. partition into merge takes one FOR_EACH edge fanned out per the
    ///    order-by partition option;
    /// 4. scan children take one CONCATENATING edge byte-bounded by the
    ///    data-load option, coalescing small loader outputs;
    /// 5. everything else takes one SIMPLE edge.
    ///
    /// Bounded configurations apply only when the parent throttles.
    fn link_edge(
        &self,
        graph: &mut QueryGraph,
        child: &TreeNode,
        parent: &TreeNode,
        index: usize,
        sibling_count: usize,
    ) -> Result<()> {
        let options = self.context.options();
        let mut batches_threshold = options.flow_control_batches_threshold()?;
        let mut bytes_threshold = options.flow_control_bytes_threshold()?;
        // With exactly one axis configured the other is forced to zero, so
        // only the configured axis governs; downstream kernels rely on this.
        if batches_threshold != u32::MAX || bytes_threshold != u64::MAX {
            if batches_threshold == u32::MAX {
                batches_threshold = 0;
            }
            if bytes_threshold == u64::MAX {
                bytes_threshold = 0;
            }
        }
        let throttled = CacheConfig::simple_throttled(batches_threshold, bytes_threshold);

        let parent_kernel = graph
            .kernel(parent.id)
            .ok_or_else(|| DfqError::InvalidConfig(format!("unknown kernel {}", parent.id)))?;
        let parent_throttles = parent_kernel.can_throttle_inputs();

        if sibling_count > 1 {
            let port = input_port_name(index)?;
            let config = if parent_throttles { throttled } else { CacheConfig::simple() };
            return graph.link_ports(child.id, "output", parent.id, &port, config);
        }

        let pairwise = matches!(
            (child.kind, parent.kind),
            (KernelKind::JoinPartition, KernelKind::PartwiseJoin)
                | (KernelKind::SortAndSample, KernelKind::Partition)
                | (KernelKind::SortAndSampleSingleNode, KernelKind::PartitionSingleNode)
        );
        if pairwise {
            let config = if parent_throttles { throttled } else { CacheConfig::simple() };
            graph.link_ports(child.id, "output_a", parent.id, "input_a", config)?;
            graph.link_ports(child.id, "output_b", parent.id, "input_b", config)?;
            return Ok(());
        }

        let partition_into_merge = matches!(
            (child.kind, parent.kind),
            (KernelKind::Partition, KernelKind::MergeStream)
                | (KernelKind::PartitionSingleNode, KernelKind::MergeStream)
        );
        if partition_into_merge {
            let num_partitions = options.max_order_by_partitions_per_node()?;
            let config = if parent_throttles {
                CacheConfig::for_each(num_partitions, batches_threshold, bytes_threshold)
            } else {
                CacheConfig::for_each(num_partitions, u32::MAX, u64::MAX)
            };
            return graph.link(child.id, parent.id, config);
        }

        if matches!(
            child.kind,
            KernelKind::TableScan | KernelKind::BindableTableScan
        ) {
            let concat_bytes = options.max_data_load_concat_cache_bytes()?;
            // The batch axis participates only when explicitly configured;
            // otherwise the byte bound alone governs the loading cache.
            let loading_batches = if batches_threshold != u32::MAX {
                batches_threshold
            } else {
                0
            };
            let config = CacheConfig::concatenating(loading_batches, concat_bytes);
            return graph.link(child.id, parent.id, config);
        }

        let config = if parent_throttles { throttled } else { CacheConfig::simple() };
        graph.link(child.id, parent.id, config)
    }
}

fn input_port_name(index: usize) -> Result<String> {
    if index >= 26 {
        return Err(DfqError::InvalidAlgebra(format!(
            "operators with more than 26 inputs are not supported (index {index})"
        )));
    }
    Ok(format!("input_{}", (b'a' + index as u8) as char))
}
