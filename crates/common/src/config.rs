use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{DfqError, Result};

/// Option key: batch-count axis of per-edge flow control.
pub const FLOW_CONTROL_BATCHES_THRESHOLD: &str = "FLOW_CONTROL_BATCHES_THRESHOLD";
/// Option key: byte-size axis of per-edge flow control.
pub const FLOW_CONTROL_BYTES_THRESHOLD: &str = "FLOW_CONTROL_BYTES_THRESHOLD";
/// Option key: partition fan-out of the order-by pipeline on one node.
pub const MAX_NUM_ORDER_BY_PARTITIONS_PER_NODE: &str = "MAX_NUM_ORDER_BY_PARTITIONS_PER_NODE";
/// Option key: byte bound of the concatenating cache downstream of scans.
pub const MAX_DATA_LOAD_CONCAT_CACHE_BYTES_SIZE: &str = "MAX_DATA_LOAD_CONCAT_CACHE_BYTES_SIZE";

/// Default order-by partition fan-out per node.
pub const DEFAULT_ORDER_BY_PARTITIONS_PER_NODE: usize = 8;
/// Default byte bound of the concatenating cache downstream of scans (400 MB).
pub const DEFAULT_DATA_LOAD_CONCAT_CACHE_BYTES_SIZE: u64 = 400_000_000;

/// Flat string-keyed engine options shared by every kernel of a query.
///
/// Values are decimal strings; typed accessors parse on read so the graph
/// builder always observes the latest value for a key. Unset numeric keys
/// report `u32::MAX`/`u64::MAX`, which downstream flow control reads as
/// "this axis imposes no limit".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineOptions {
    entries: HashMap<String, String>,
}

impl EngineOptions {
    /// Create an empty option map (all defaults).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from pre-collected key/value pairs.
    #[must_use]
    pub fn from_map(entries: HashMap<String, String>) -> Self {
        Self { entries }
    }

    /// Set one option; replaces any previous value for the key.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Raw string value for a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    fn parse_u32(&self, key: &str) -> Result<Option<u32>> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(raw) => raw.parse::<u32>().map(Some).map_err(|e| {
                DfqError::InvalidConfig(format!("option {key}={raw} is not a u32: {e}"))
            }),
        }
    }

    fn parse_u64(&self, key: &str) -> Result<Option<u64>> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(raw) => raw.parse::<u64>().map(Some).map_err(|e| {
                DfqError::InvalidConfig(format!("option {key}={raw} is not a u64: {e}"))
            }),
        }
    }

    /// Batch-count flow-control threshold; `u32::MAX` when unset.
    pub fn flow_control_batches_threshold(&self) -> Result<u32> {
        Ok(self
            .parse_u32(FLOW_CONTROL_BATCHES_THRESHOLD)?
            .unwrap_or(u32::MAX))
    }

    /// Byte-size flow-control threshold; `u64::MAX` when unset.
    pub fn flow_control_bytes_threshold(&self) -> Result<u64> {
        Ok(self
            .parse_u64(FLOW_CONTROL_BYTES_THRESHOLD)?
            .unwrap_or(u64::MAX))
    }

    /// Order-by partition fan-out per node.
    pub fn max_order_by_partitions_per_node(&self) -> Result<usize> {
        Ok(self
            .parse_u32(MAX_NUM_ORDER_BY_PARTITIONS_PER_NODE)?
            .map(|v| v as usize)
            .unwrap_or(DEFAULT_ORDER_BY_PARTITIONS_PER_NODE))
    }

    /// Byte bound for the scan-side concatenating cache.
    pub fn max_data_load_concat_cache_bytes(&self) -> Result<u64> {
        Ok(self
            .parse_u64(MAX_DATA_LOAD_CONCAT_CACHE_BYTES_SIZE)?
            .unwrap_or(DEFAULT_DATA_LOAD_CONCAT_CACHE_BYTES_SIZE))
    }
}
