//! Directed kernel graph with port-level edges and concurrent execution.
//!
//! Architecture role:
//! - arena-owns every kernel of one query
//! - wires producer/consumer ports through cache channels at link time
//! - runs every kernel on its own thread and aggregates terminal statuses
//!
//! Termination and cancellation both ride the sentinel protocol: when a
//! kernel returns, the runtime force-closes its input channels (so blocked
//! upstream producers drain instead of deadlocking) and pushes one sentinel
//! on each of its output channels. The first kernel error wins; remaining
//! kernels observe end-of-stream and exit.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use arrow::record_batch::RecordBatch;
use dfq_cache::{CacheChannel, CacheConfig};
use dfq_common::metrics::global_metrics;
use dfq_common::{DfqError, KernelId, Result};
use tracing::{debug, error};

use crate::kernel::{Kernel, KernelStatus};

/// One producer-to-consumer wire of the graph.
#[derive(Debug, Clone)]
pub struct Edge {
    /// Producer kernel.
    pub source: KernelId,
    /// Producer port name.
    pub source_port: String,
    /// Consumer kernel.
    pub target: KernelId,
    /// Consumer port name.
    pub target_port: String,
    /// The channel carrying this edge's batches.
    pub channel: Arc<CacheChannel>,
}

/// Directed acyclic graph of kernels for one query.
#[derive(Default)]
pub struct QueryGraph {
    kernels: Vec<Arc<dyn Kernel>>,
    by_id: HashMap<KernelId, usize>,
    edges: Vec<Edge>,
    result: Option<Arc<CacheChannel>>,
}

impl std::fmt::Debug for QueryGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryGraph")
            .field("kernels", &self.kernels.len())
            .field("by_id", &self.by_id)
            .field("edges", &self.edges)
            .field("result", &self.result.is_some())
            .finish()
    }
}

impl QueryGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a kernel; re-registering the same id is a no-op.
    pub fn add_node(&mut self, kernel: Arc<dyn Kernel>) {
        if self.by_id.contains_key(&kernel.id()) {
            return;
        }
        self.by_id.insert(kernel.id(), self.kernels.len());
        self.kernels.push(kernel);
    }

    /// Kernel by id, if registered.
    #[must_use]
    pub fn kernel(&self, id: KernelId) -> Option<&Arc<dyn Kernel>> {
        self.by_id.get(&id).map(|idx| &self.kernels[*idx])
    }

    /// All registered kernels, in registration order.
    #[must_use]
    pub fn kernels(&self) -> &[Arc<dyn Kernel>] {
        &self.kernels
    }

    /// All edges, in link order.
    #[must_use]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Wire `source`'s `output` port to `target`'s `input` port.
    pub fn link(&mut self, source: KernelId, target: KernelId, config: CacheConfig) -> Result<()> {
        self.link_ports(source, "output", target, "input", config)
    }

    /// Wire a named producer port to a named consumer port through a fresh
    /// channel configured by `config`.
    pub fn link_ports(
        &mut self,
        source: KernelId,
        source_port: &str,
        target: KernelId,
        target_port: &str,
        config: CacheConfig,
    ) -> Result<()> {
        let src = self
            .kernel(source)
            .ok_or_else(|| DfqError::InvalidConfig(format!("unknown source kernel {source}")))?;
        let dst = self
            .kernel(target)
            .ok_or_else(|| DfqError::InvalidConfig(format!("unknown target kernel {target}")))?;
        let label = format!("{source}:{source_port}->{target}:{target_port}");
        debug!(%label, kind = ?config.kind, "link kernels");
        let channel = Arc::new(CacheChannel::with_label(config, label));
        src.base().outputs().register(source_port, Arc::clone(&channel));
        dst.base().inputs().register(target_port, Arc::clone(&channel));
        self.edges.push(Edge {
            source,
            source_port: source_port.to_string(),
            target,
            target_port: target_port.to_string(),
            channel,
        });
        Ok(())
    }

    /// Attach the terminal result channel to `root`'s `output` port.
    ///
    /// The channel is unbounded so collecting after [`QueryGraph::execute`]
    /// never blocks the root kernel.
    pub fn set_result(&mut self, root: KernelId) -> Result<Arc<CacheChannel>> {
        let kernel = self
            .kernel(root)
            .ok_or_else(|| DfqError::InvalidConfig(format!("unknown root kernel {root}")))?;
        let channel = Arc::new(CacheChannel::with_label(
            CacheConfig::simple(),
            format!("{root}:output->result"),
        ));
        kernel.base().outputs().register("output", Arc::clone(&channel));
        self.result = Some(Arc::clone(&channel));
        Ok(channel)
    }

    /// The terminal result channel, if one was attached.
    #[must_use]
    pub fn result_channel(&self) -> Option<&Arc<CacheChannel>> {
        self.result.as_ref()
    }

    /// Drain the terminal result channel after execution.
    pub fn collect_results(&self) -> Result<Vec<RecordBatch>> {
        let channel = self.result.as_ref().ok_or_else(|| {
            DfqError::InvalidConfig("graph has no result channel attached".to_string())
        })?;
        let mut batches = Vec::new();
        while let Some(batch) = channel.pull()? {
            batches.push(batch);
        }
        Ok(batches)
    }

    /// Start every kernel concurrently and wait for all of them.
    ///
    /// Returns the first kernel error in registration order; `Ok` covers
    /// both finished and early-stopped kernels.
    pub fn execute(&self) -> Result<()> {
        self.validate()?;
        debug!(kernels = self.kernels.len(), edges = self.edges.len(), "graph execute");
        let statuses: Vec<Result<KernelStatus>> = thread::scope(|scope| {
            let handles: Vec<_> = self
                .kernels
                .iter()
                .map(|kernel| {
                    let kernel = Arc::clone(kernel);
                    scope.spawn(move || run_kernel(kernel.as_ref()))
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|_| Err(DfqError::Kernel("kernel thread panicked".into())))
                })
                .collect()
        });
        for status in statuses {
            status?;
        }
        Ok(())
    }

    /// Structural checks run before any kernel starts.
    pub fn validate(&self) -> Result<()> {
        if self.kernels.is_empty() {
            return Err(DfqError::InvalidConfig("query graph has no kernels".to_string()));
        }
        // Kahn peel; leftover kernels mean a cycle.
        let mut indegree: HashMap<KernelId, usize> =
            self.kernels.iter().map(|k| (k.id(), 0)).collect();
        let mut adjacency: HashMap<KernelId, Vec<KernelId>> = HashMap::new();
        for edge in &self.edges {
            *indegree.entry(edge.target).or_default() += 1;
            adjacency.entry(edge.source).or_default().push(edge.target);
        }
        let mut ready: Vec<KernelId> = indegree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut peeled = 0usize;
        while let Some(id) = ready.pop() {
            peeled += 1;
            for next in adjacency.get(&id).into_iter().flatten() {
                let d = indegree.get_mut(next).expect("known kernel");
                *d -= 1;
                if *d == 0 {
                    ready.push(*next);
                }
            }
        }
        if peeled != self.kernels.len() {
            return Err(DfqError::InvalidConfig(
                "query graph contains a cycle".to_string(),
            ));
        }
        Ok(())
    }
}

fn run_kernel(kernel: &dyn Kernel) -> Result<KernelStatus> {
    let started = Instant::now();
    debug!(kernel = %kernel.id(), kind = %kernel.kind(), "kernel start");
    let result = catch_unwind(AssertUnwindSafe(|| kernel.run())).unwrap_or_else(|_| {
        Err(DfqError::Kernel(format!(
            "kernel {} ({}) panicked",
            kernel.id(),
            kernel.kind()
        )))
    });
    // Finished kernels accept no more input; blocked producers drain instead
    // of deadlocking. Every output port observes exactly one sentinel.
    for input in kernel.input_channels() {
        input.close();
    }
    for output in kernel.output_channels() {
        output.push_sentinel();
    }
    let (batches_in, batches_out, rows_out, bytes_in, bytes_out) =
        kernel.base().counters().snapshot();
    global_metrics().record_kernel(
        kernel.id().0,
        kernel.kind().as_str(),
        batches_in,
        batches_out,
        rows_out,
        bytes_in,
        bytes_out,
        started.elapsed().as_secs_f64(),
    );
    match &result {
        Ok(status) => debug!(kernel = %kernel.id(), ?status, "kernel done"),
        Err(e) => error!(kernel = %kernel.id(), kind = %kernel.kind(), error = %e, "kernel failed"),
    }
    result
}
