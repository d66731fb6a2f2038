//! Memory-pool reservation interface consumed by kernel bodies.
//!
//! The core does not allocate device or host memory itself; batches arrive
//! already materialized. Kernels that stage data (joins, aggregations,
//! partitioning) reserve against one of three pools before doing so, and the
//! reservation is released when the RAII guard drops. Pool limits are chosen
//! by the surrounding bootstrap; `MemoryPools::unlimited()` is the default
//! when no policy is supplied.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{DfqError, Result};

/// The three memory pools a kernel can reserve from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    /// Accelerator-resident memory.
    Device,
    /// Page-locked host memory used for staging transfers.
    PinnedHost,
    /// Disk-backed spill space.
    DiskSpill,
}

impl PoolKind {
    fn index(self) -> usize {
        match self {
            PoolKind::Device => 0,
            PoolKind::PinnedHost => 1,
            PoolKind::DiskSpill => 2,
        }
    }

    fn name(self) -> &'static str {
        match self {
            PoolKind::Device => "device",
            PoolKind::PinnedHost => "pinned_host",
            PoolKind::DiskSpill => "disk_spill",
        }
    }
}

/// Shared reservation ledger over the device/pinned-host/disk-spill pools.
#[derive(Debug)]
pub struct MemoryPools {
    budgets: [usize; 3],
    in_use: [AtomicUsize; 3],
}

impl MemoryPools {
    /// Create pools with explicit byte budgets (`usize::MAX` = unlimited).
    #[must_use]
    pub fn new(device_bytes: usize, pinned_host_bytes: usize, disk_spill_bytes: usize) -> Arc<Self> {
        Arc::new(Self {
            budgets: [device_bytes, pinned_host_bytes, disk_spill_bytes],
            in_use: [AtomicUsize::new(0), AtomicUsize::new(0), AtomicUsize::new(0)],
        })
    }

    /// Pools with no limits on any axis.
    #[must_use]
    pub fn unlimited() -> Arc<Self> {
        Self::new(usize::MAX, usize::MAX, usize::MAX)
    }

    /// Reserve `bytes` from `pool`, failing when the pool budget would be
    /// exceeded. The returned guard releases the bytes on drop.
    pub fn reserve(self: &Arc<Self>, pool: PoolKind, bytes: usize) -> Result<MemoryReservation> {
        let idx = pool.index();
        let budget = self.budgets[idx];
        let mut current = self.in_use[idx].load(Ordering::Acquire);
        loop {
            let requested = current.saturating_add(bytes);
            if budget != usize::MAX && requested > budget {
                return Err(DfqError::ResourceExhaustion(format!(
                    "{} pool cannot grant {bytes} bytes ({current} of {budget} in use)",
                    pool.name()
                )));
            }
            match self.in_use[idx].compare_exchange_weak(
                current,
                requested,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return Ok(MemoryReservation {
                        pools: Arc::clone(self),
                        pool,
                        bytes,
                    });
                }
                Err(observed) => current = observed,
            }
        }
    }

    /// Bytes currently reserved from `pool`.
    #[must_use]
    pub fn in_use(&self, pool: PoolKind) -> usize {
        self.in_use[pool.index()].load(Ordering::Acquire)
    }

    fn release(&self, pool: PoolKind, bytes: usize) {
        self.in_use[pool.index()].fetch_sub(bytes, Ordering::AcqRel);
    }
}

/// RAII guard for one pool reservation.
#[derive(Debug)]
pub struct MemoryReservation {
    pools: Arc<MemoryPools>,
    pool: PoolKind,
    bytes: usize,
}

impl MemoryReservation {
    /// Bytes held by this reservation.
    #[must_use]
    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

impl Drop for MemoryReservation {
    fn drop(&mut self) {
        self.pools.release(self.pool, self.bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reservation_releases_on_drop() {
        let pools = MemoryPools::new(100, usize::MAX, usize::MAX);
        {
            let r = pools.reserve(PoolKind::Device, 80).unwrap();
            assert_eq!(r.bytes(), 80);
            assert_eq!(pools.in_use(PoolKind::Device), 80);
        }
        assert_eq!(pools.in_use(PoolKind::Device), 0);
    }

    #[test]
    fn over_budget_reservation_fails() {
        let pools = MemoryPools::new(100, usize::MAX, 100);
        let _held = pools.reserve(PoolKind::DiskSpill, 60).unwrap();
        let err = pools.reserve(PoolKind::DiskSpill, 60).unwrap_err();
        assert!(matches!(err, DfqError::ResourceExhaustion(_)));
        // Other pools are independent.
        assert!(pools.reserve(PoolKind::Device, 100).is_ok());
    }

    #[test]
    fn unlimited_pools_never_fail() {
        let pools = MemoryPools::unlimited();
        let r = pools.reserve(PoolKind::PinnedHost, usize::MAX / 2).unwrap();
        drop(r);
        assert_eq!(pools.in_use(PoolKind::PinnedHost), 0);
    }
}
