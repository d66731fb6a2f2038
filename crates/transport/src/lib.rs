//! Cross-node message plumbing for DFQ kernels.
//!
//! Architecture role:
//! - token-addressed blocking rendezvous for inbound payloads
//! - the [`TransportClient`] contract the distributing kernels publish through
//! - an in-process loopback exchange for single-process deployments and tests
//!
//! Key modules:
//! - [`queue`]
//! - [`exchange`]

pub mod exchange;
pub mod queue;

pub use exchange::{LoopbackClient, LoopbackExchange, TransportClient};
pub use queue::{MessageQueue, ReceivedMessage};
