//! Streaming cache substrate connecting DFQ kernels.
//!
//! Architecture role:
//! - wraps record batches into sequence-numbered cache entries
//! - provides the bounded multi-producer/multi-consumer channel with the
//!   three backing policies (SIMPLE, CONCATENATING, FOR_EACH)
//! - enforces two-axis flow control and the sentinel termination protocol
//!
//! Key modules:
//! - [`entry`]
//! - [`config`]
//! - [`channel`]

pub mod channel;
pub mod config;
pub mod entry;

pub use channel::CacheChannel;
pub use config::{CacheConfig, CacheKind};
pub use entry::CacheEntry;
