//! Streaming-kernel contract and shared kernel plumbing.
//!
//! A kernel is a streaming operator with named input and output ports, each
//! bound to a cache channel by the graph at link time. `run` is the whole
//! lifecycle: pull from inputs, push to outputs, return a status. The
//! runtime closes the kernel's input channels and emits exactly one sentinel
//! per output port when `run` returns, on success, stop, and error alike, so
//! downstream kernels always observe end-of-stream.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use arrow::record_batch::RecordBatch;
use dfq_cache::CacheChannel;
use dfq_common::{DfqError, KernelId, Result};

use crate::context::ExecutionContext;

/// Kind tag of every catalog kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelKind {
    /// Produces batches from a data loader against a schema.
    TableScan,
    /// Scan with projection/filter pushdown bindings.
    BindableTableScan,
    /// Evaluates a projection expression on each input batch.
    Projection,
    /// Drops rows failing a predicate.
    Filter,
    /// Emits at most N rows across inputs, then stops.
    Limit,
    /// Concatenates inputs into the output.
    Union,
    /// Sorts each batch; emits sorted output and a sampling stream.
    SortAndSample,
    /// Single-node variant of [`KernelKind::SortAndSample`].
    SortAndSampleSingleNode,
    /// Splits sorted input into range partitions using sampled pivots.
    Partition,
    /// Single-node variant of [`KernelKind::Partition`].
    PartitionSingleNode,
    /// K-way-merges pre-sorted partition streams.
    MergeStream,
    /// Per-batch local aggregation.
    ComputeAggregate,
    /// Hash-routes partial aggregates across nodes.
    DistributeAggregate,
    /// Final merge of partial aggregates.
    MergeAggregate,
    /// Streaming hash join of co-partitioned inputs.
    PartwiseJoin,
    /// Produces co-partitioned join inputs on `output_a`/`output_b`.
    JoinPartition,
}

impl KernelKind {
    /// Stable name for logs, metrics, and explain output.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            KernelKind::TableScan => "TableScan",
            KernelKind::BindableTableScan => "BindableTableScan",
            KernelKind::Projection => "Projection",
            KernelKind::Filter => "Filter",
            KernelKind::Limit => "Limit",
            KernelKind::Union => "Union",
            KernelKind::SortAndSample => "SortAndSample",
            KernelKind::SortAndSampleSingleNode => "SortAndSampleSingleNode",
            KernelKind::Partition => "Partition",
            KernelKind::PartitionSingleNode => "PartitionSingleNode",
            KernelKind::MergeStream => "MergeStream",
            KernelKind::ComputeAggregate => "ComputeAggregate",
            KernelKind::DistributeAggregate => "DistributeAggregate",
            KernelKind::MergeAggregate => "MergeAggregate",
            KernelKind::PartwiseJoin => "PartwiseJoin",
            KernelKind::JoinPartition => "JoinPartition",
        }
    }
}

impl fmt::Display for KernelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal status of one kernel run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelStatus {
    /// Ran to completion.
    Finished,
    /// Stopped early by design (e.g. a limit was reached).
    Stopped,
}

/// Name-to-channel bindings for one direction of a kernel.
#[derive(Debug, Default)]
pub struct PortMap {
    ports: RwLock<HashMap<String, Arc<CacheChannel>>>,
}

impl PortMap {
    /// Bind `name` to a channel; later bindings replace earlier ones.
    pub fn register(&self, name: &str, channel: Arc<CacheChannel>) {
        self.ports
            .write()
            .expect("port map lock")
            .insert(name.to_string(), channel);
    }

    /// Channel bound to `name`, if any.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<CacheChannel>> {
        self.ports.read().expect("port map lock").get(name).cloned()
    }

    /// Bound port names, sorted for deterministic iteration.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .ports
            .read()
            .expect("port map lock")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Bound channels, in sorted port-name order.
    #[must_use]
    pub fn channels(&self) -> Vec<Arc<CacheChannel>> {
        let ports = self.ports.read().expect("port map lock");
        let mut entries: Vec<(&String, &Arc<CacheChannel>)> = ports.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries.into_iter().map(|(_, c)| Arc::clone(c)).collect()
    }
}

/// Batch/byte counters flushed to metrics when the kernel finishes.
#[derive(Debug, Default)]
pub struct KernelCounters {
    batches_in: AtomicU64,
    batches_out: AtomicU64,
    rows_out: AtomicU64,
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
}

impl KernelCounters {
    /// Snapshot `(batches_in, batches_out, rows_out, bytes_in, bytes_out)`.
    #[must_use]
    pub fn snapshot(&self) -> (u64, u64, u64, u64, u64) {
        (
            self.batches_in.load(Ordering::Relaxed),
            self.batches_out.load(Ordering::Relaxed),
            self.rows_out.load(Ordering::Relaxed),
            self.bytes_in.load(Ordering::Relaxed),
            self.bytes_out.load(Ordering::Relaxed),
        )
    }
}

/// State shared by every catalog kernel: identity, expression, ports,
/// context, counters.
#[derive(Debug)]
pub struct KernelBase {
    id: KernelId,
    kind: KernelKind,
    expression: String,
    context: ExecutionContext,
    inputs: PortMap,
    outputs: PortMap,
    counters: KernelCounters,
}

impl KernelBase {
    /// Create the shared state; the context is individualized for `id`.
    #[must_use]
    pub fn new(id: KernelId, kind: KernelKind, expression: String, context: &ExecutionContext) -> Self {
        Self {
            id,
            kind,
            expression,
            context: context.clone_for_kernel(id),
            inputs: PortMap::default(),
            outputs: PortMap::default(),
            counters: KernelCounters::default(),
        }
    }

    /// Stable kernel id.
    #[must_use]
    pub fn id(&self) -> KernelId {
        self.id
    }

    /// Catalog kind tag.
    #[must_use]
    pub fn kind(&self) -> KernelKind {
        self.kind
    }

    /// The relational-algebra fragment this kernel evaluates.
    #[must_use]
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Per-kernel execution context.
    #[must_use]
    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Input port bindings.
    #[must_use]
    pub fn inputs(&self) -> &PortMap {
        &self.inputs
    }

    /// Output port bindings.
    #[must_use]
    pub fn outputs(&self) -> &PortMap {
        &self.outputs
    }

    /// Counters flushed to metrics by the runtime.
    #[must_use]
    pub fn counters(&self) -> &KernelCounters {
        &self.counters
    }

    /// Count one pulled batch.
    pub fn note_input(&self, batch: &RecordBatch) {
        self.counters.batches_in.fetch_add(1, Ordering::Relaxed);
        self.counters
            .bytes_in
            .fetch_add(batch.get_array_memory_size() as u64, Ordering::Relaxed);
    }

    /// Count one pushed batch.
    pub fn note_output(&self, batch: &RecordBatch) {
        self.counters.batches_out.fetch_add(1, Ordering::Relaxed);
        self.counters
            .rows_out
            .fetch_add(batch.num_rows() as u64, Ordering::Relaxed);
        self.counters
            .bytes_out
            .fetch_add(batch.get_array_memory_size() as u64, Ordering::Relaxed);
    }
}

/// A streaming operator node of the query graph.
pub trait Kernel: Send + Sync {
    /// Shared kernel state.
    fn base(&self) -> &KernelBase;

    /// The execution body. Pulls from input ports until end-of-stream,
    /// produces on output ports, and returns the terminal status. The
    /// runtime emits the closing sentinel on every output port after
    /// `run` returns, on every exit path.
    fn run(&self) -> Result<KernelStatus>;

    /// Whether this kernel can safely cause upstream producers to block.
    /// Kernels that defer one input while draining another must answer
    /// `false`, otherwise a bounded edge could deadlock the pipeline.
    fn can_throttle_inputs(&self) -> bool {
        true
    }

    /// Stable kernel id.
    fn id(&self) -> KernelId {
        self.base().id()
    }

    /// Catalog kind tag.
    fn kind(&self) -> KernelKind {
        self.base().kind()
    }

    /// The relational-algebra fragment this kernel evaluates.
    fn expression(&self) -> &str {
        self.base().expression()
    }

    /// Channel bound to the named input port.
    fn input_port(&self, name: &str) -> Result<Arc<CacheChannel>> {
        self.base().inputs().get(name).ok_or_else(|| {
            DfqError::InvalidConfig(format!(
                "kernel {} ({}) has no input port {name}",
                self.id(),
                self.kind()
            ))
        })
    }

    /// Channel bound to the named output port.
    fn output_port(&self, name: &str) -> Result<Arc<CacheChannel>> {
        self.base().outputs().get(name).ok_or_else(|| {
            DfqError::InvalidConfig(format!(
                "kernel {} ({}) has no output port {name}",
                self.id(),
                self.kind()
            ))
        })
    }

    /// All input channels, in sorted port-name order.
    fn input_channels(&self) -> Vec<Arc<CacheChannel>> {
        self.base().inputs().channels()
    }

    /// All output channels, in sorted port-name order.
    fn output_channels(&self) -> Vec<Arc<CacheChannel>> {
        self.base().outputs().channels()
    }
}
