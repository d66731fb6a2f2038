#![deny(missing_docs)]

//! Shared configuration, error types, IDs, and observability primitives for DFQ crates.
//!
//! Architecture role:
//! - defines the flat string-keyed engine options read by the graph builder
//! - provides common [`DfqError`] / [`Result`] contracts
//! - hosts the memory-pool reservation ledger and metrics registry
//!
//! Key modules:
//! - [`config`]
//! - [`error`]
//! - [`ids`]
//! - [`memory`]
//! - [`metrics`]

/// Engine option keys and typed accessors.
pub mod config;
/// Shared error taxonomy.
pub mod error;
/// Strongly-typed identifier wrappers.
pub mod ids;
/// Memory-pool reservation interface.
pub mod memory;
/// Metrics registry and Prometheus rendering helpers.
pub mod metrics;

pub use config::{
    DEFAULT_DATA_LOAD_CONCAT_CACHE_BYTES_SIZE, DEFAULT_ORDER_BY_PARTITIONS_PER_NODE, EngineOptions,
    FLOW_CONTROL_BATCHES_THRESHOLD, FLOW_CONTROL_BYTES_THRESHOLD,
    MAX_DATA_LOAD_CONCAT_CACHE_BYTES_SIZE, MAX_NUM_ORDER_BY_PARTITIONS_PER_NODE,
};
pub use error::{DfqError, Result};
pub use ids::*;
pub use memory::{MemoryPools, MemoryReservation, PoolKind};
pub use metrics::{MetricsRegistry, global_metrics};
