use super::{AllocError, MemoryPool, PoolAllocation};
use crate::backends::{BufferRange, MemoryKind};

/// Pool allocation released when dropped, including on early returns.
pub struct ScopedAllocation<'a> {
    pool: &'a MemoryPool,
    allocation: Option<PoolAllocation>,
    tier: MemoryKind,
    range: BufferRange,
    requested: usize,
}

impl<'a> ScopedAllocation<'a> {
    pub fn acquire(
        pool: &'a MemoryPool,
        label: &str,
        tier: MemoryKind,
        size: usize,
        alignment: usize,
    ) -> Result<Self, AllocError> {
        let allocation = pool.acquire_labeled(label, tier, size, alignment)?;
        Ok(Self {
            pool,
            tier: allocation.tier(),
            range: allocation.range(),
            requested: allocation.requested(),
            allocation: Some(allocation),
        })
    }

    pub fn tier(&self) -> MemoryKind {
        self.tier
    }

    pub fn range(&self) -> BufferRange {
        self.range
    }

    /// The first `requested` bytes of the range.
    pub fn data(&self) -> BufferRange {
        self.range.prefix(self.requested)
    }

    pub fn requested(&self) -> usize {
        self.requested
    }

    /// Releases now and reports the outcome instead of logging it.
    pub fn release(mut self) -> Result<(), AllocError> {
        match self.allocation.take() {
            Some(allocation) => self.pool.release(allocation),
            None => Ok(()),
        }
    }
}

impl Drop for ScopedAllocation<'_> {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            if let Err(error) = self.pool.release(allocation) {
                log::warn!("Failed to release scoped allocation: {error}");
            }
        }
    }
}
