use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicU64, AtomicUsize, Ordering},
};

use serde::{Deserialize, Serialize};

use super::{AllocError, AllocationTracer, free_list::FreeList};
use crate::backends::{BufferRange, Device, DeviceBuffer, DeviceError, MemoryKind};

/// Placement granularity inside an arena.
pub const GRANULE: usize = 256;

fn align_to_granule(size: usize) -> usize {
    size.max(1).div_ceil(GRANULE) * GRANULE
}

/// What happens when a tier cannot satisfy a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Allocate directly from the device, outside the pool.
    Direct,
    /// Report [`AllocError::OutOfMemory`].
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub device_capacity: usize,
    pub host_capacity: usize,
    pub fallback: FallbackPolicy,
    pub trace: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            device_capacity: 64 << 20,
            host_capacity: 64 << 20,
            fallback: FallbackPolicy::Direct,
            trace: false,
        }
    }
}

impl PoolConfig {
    pub fn new(
        device_capacity: usize,
        host_capacity: usize,
        fallback: FallbackPolicy,
    ) -> Self {
        Self {
            device_capacity,
            host_capacity,
            fallback,
            trace: false,
        }
    }

    pub fn capacity(
        &self,
        tier: MemoryKind,
    ) -> usize {
        match tier {
            MemoryKind::Device => self.device_capacity,
            MemoryKind::HostPinned => self.host_capacity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationOrigin {
    Pooled,
    Direct,
}

/// Memory handed out by a [`MemoryPool`]. Owned by the requester until passed back to
/// [`MemoryPool::release`].
#[derive(Debug)]
pub struct PoolAllocation {
    tier: MemoryKind,
    origin: AllocationOrigin,
    range: BufferRange,
    requested: usize,
    alignment: usize,
    direct: Option<DeviceBuffer>,
}

impl PoolAllocation {
    pub fn tier(&self) -> MemoryKind {
        self.tier
    }

    pub fn origin(&self) -> AllocationOrigin {
        self.origin
    }

    /// Whole reserved range, rounded up to the placement granule.
    pub fn range(&self) -> BufferRange {
        self.range
    }

    /// The first `requested` bytes.
    pub fn data(&self) -> BufferRange {
        self.range.prefix(self.requested)
    }

    pub fn address(&self) -> u64 {
        self.range.address
    }

    pub fn offset(&self) -> usize {
        self.range.offset
    }

    pub fn size(&self) -> usize {
        self.range.length
    }

    pub fn requested(&self) -> usize {
        self.requested
    }

    pub fn alignment(&self) -> usize {
        self.alignment
    }
}

struct ArenaState {
    buffer: DeviceBuffer,
    free_list: FreeList,
    live_allocations: usize,
}

struct Tier {
    kind: MemoryKind,
    arena: Mutex<Option<ArenaState>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatistics {
    pub active_bytes: usize,
    pub peak_bytes: usize,
    pub live_allocations: usize,
    pub total_allocations: u64,
    pub fallback_allocations: u64,
}

/// Two-tier sub-allocator over arenas reserved from a [`Device`] at construction.
/// Placement is best fit per tier under that tier's lock; statistics are lock-free.
pub struct MemoryPool {
    device: Arc<dyn Device>,
    config: PoolConfig,
    tiers: [Tier; 2],
    active_memory: AtomicUsize,
    peak_memory: AtomicUsize,
    live_allocations: AtomicUsize,
    allocation_count: AtomicU64,
    fallback_count: AtomicU64,
    tracer: Option<AllocationTracer>,
}

impl MemoryPool {
    pub fn new(
        device: Arc<dyn Device>,
        config: PoolConfig,
    ) -> Result<Self, AllocError> {
        let reserve = |kind: MemoryKind| -> Result<Tier, AllocError> {
            let capacity = config.capacity(kind);
            let arena = if capacity == 0 {
                None
            } else {
                let aligned = align_to_granule(capacity);
                let buffer = device.allocate(kind, aligned).map_err(|error| AllocError::AllocationFailed {
                    size: aligned,
                    reason: error.to_string(),
                })?;
                Some(ArenaState {
                    buffer,
                    free_list: FreeList::new(aligned),
                    live_allocations: 0,
                })
            };
            Ok(Tier {
                kind,
                arena: Mutex::new(arena),
            })
        };
        let tiers = [reserve(MemoryKind::Device)?, reserve(MemoryKind::HostPinned)?];
        log::debug!(
            "Memory pool on `{}`: {} device bytes, {} host bytes, fallback {:?}",
            device.name(),
            config.device_capacity,
            config.host_capacity,
            config.fallback
        );

        Ok(Self {
            device,
            config,
            tiers,
            active_memory: AtomicUsize::new(0),
            peak_memory: AtomicUsize::new(0),
            live_allocations: AtomicUsize::new(0),
            allocation_count: AtomicU64::new(0),
            fallback_count: AtomicU64::new(0),
            tracer: config.trace.then(AllocationTracer::new),
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    pub fn fallback_policy(&self) -> FallbackPolicy {
        self.config.fallback
    }

    pub fn tracer(&self) -> Option<&AllocationTracer> {
        self.tracer.as_ref()
    }

    fn tier(
        &self,
        kind: MemoryKind,
    ) -> &Tier {
        match kind {
            MemoryKind::Device => &self.tiers[0],
            MemoryKind::HostPinned => &self.tiers[1],
        }
    }

    pub fn capacity(
        &self,
        kind: MemoryKind,
    ) -> usize {
        let arena = self.tier(kind).arena.lock().unwrap_or_else(PoisonError::into_inner);
        arena.as_ref().map(|state| state.free_list.capacity()).unwrap_or(0)
    }

    /// Free bytes in the tier's arena (possibly fragmented).
    pub fn available(
        &self,
        kind: MemoryKind,
    ) -> usize {
        let arena = self.tier(kind).arena.lock().unwrap_or_else(PoisonError::into_inner);
        arena.as_ref().map(|state| state.free_list.available()).unwrap_or(0)
    }

    /// Bytes a request of `size` occupies once rounded to the placement granule.
    pub fn footprint(size: usize) -> usize {
        align_to_granule(size)
    }

    fn track_allocation(
        &self,
        label: &str,
        allocation: &PoolAllocation,
    ) {
        let size = allocation.size();
        let new_active = self.active_memory.fetch_add(size, Ordering::Relaxed) + size;
        self.peak_memory.fetch_max(new_active, Ordering::Relaxed);
        self.live_allocations.fetch_add(1, Ordering::Relaxed);
        self.allocation_count.fetch_add(1, Ordering::Relaxed);
        if let Some(tracer) = &self.tracer {
            tracer.record_allocation(label, size, allocation.tier, allocation.origin);
        }
    }

    fn track_deallocation(
        &self,
        size: usize,
    ) {
        self.active_memory.fetch_sub(size, Ordering::Relaxed);
        self.live_allocations.fetch_sub(1, Ordering::Relaxed);
        if let Some(tracer) = &self.tracer {
            tracer.record_release(size);
        }
    }

    fn allocate_from_arena(
        &self,
        tier: &Tier,
        size: usize,
        alignment: usize,
    ) -> Result<BufferRange, usize> {
        let mut arena = tier.arena.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(state) = arena.as_mut() else {
            return Err(0);
        };
        match state.free_list.allocate(size, alignment) {
            Some(offset) => {
                state.live_allocations += 1;
                Ok(state.buffer.range(offset, size))
            },
            None => Err(state.free_list.available()),
        }
    }

    fn allocate_direct(
        &self,
        kind: MemoryKind,
        size: usize,
    ) -> Result<DeviceBuffer, AllocError> {
        self.device.allocate(kind, size).map_err(|error| match error {
            DeviceError::OutOfMemory {
                requested,
                available,
                ..
            } => AllocError::OutOfMemory {
                requested,
                available,
            },
            other => AllocError::AllocationFailed {
                size,
                reason: other.to_string(),
            },
        })
    }

    pub fn acquire(
        &self,
        tier: MemoryKind,
        size: usize,
        alignment: usize,
    ) -> Result<PoolAllocation, AllocError> {
        self.acquire_labeled("unlabeled", tier, size, alignment)
    }

    /// Reserves `size` bytes aligned to `alignment` in `tier`. The label only shows up in traces.
    pub fn acquire_labeled(
        &self,
        label: &str,
        tier: MemoryKind,
        size: usize,
        alignment: usize,
    ) -> Result<PoolAllocation, AllocError> {
        if alignment == 0 || !alignment.is_power_of_two() {
            return Err(AllocError::InvalidAlignment(alignment));
        }
        let aligned_size = align_to_granule(size);
        let placement_alignment = alignment.max(GRANULE);

        let available = match self.allocate_from_arena(self.tier(tier), aligned_size, placement_alignment) {
            Ok(range) => {
                let allocation = PoolAllocation {
                    tier,
                    origin: AllocationOrigin::Pooled,
                    range,
                    requested: size,
                    alignment,
                    direct: None,
                };
                self.track_allocation(label, &allocation);
                return Ok(allocation);
            },
            Err(available) => available,
        };

        match self.config.fallback {
            FallbackPolicy::Fail => Err(AllocError::OutOfMemory {
                requested: aligned_size,
                available,
            }),
            FallbackPolicy::Direct => {
                let buffer = self.allocate_direct(tier, aligned_size)?;
                log::debug!("{tier:?} tier exhausted ({available} bytes free), `{label}` allocated directly");
                self.fallback_count.fetch_add(1, Ordering::Relaxed);
                let allocation = PoolAllocation {
                    tier,
                    origin: AllocationOrigin::Direct,
                    range: buffer.whole(),
                    requested: size,
                    alignment,
                    direct: Some(buffer),
                };
                self.track_allocation(label, &allocation);
                Ok(allocation)
            },
        }
    }

    pub fn release(
        &self,
        mut allocation: PoolAllocation,
    ) -> Result<(), AllocError> {
        let size = allocation.size();
        match allocation.direct.take() {
            Some(buffer) => {
                self.device.free(buffer).map_err(|error| AllocError::AllocationFailed {
                    size,
                    reason: error.to_string(),
                })?;
            },
            None => {
                let mut arena = self.tier(allocation.tier).arena.lock().unwrap_or_else(PoisonError::into_inner);
                let state = arena
                    .as_mut()
                    .filter(|state| {
                        state.buffer.id() == allocation.range.buffer
                            && state.free_list.is_allocated(allocation.offset(), size)
                    })
                    .ok_or(AllocError::UnknownAllocation {
                        address: allocation.address(),
                    })?;
                state.free_list.release(allocation.offset(), size);
                state.live_allocations -= 1;
            },
        }
        self.track_deallocation(size);
        Ok(())
    }

    pub fn statistics(&self) -> PoolStatistics {
        PoolStatistics {
            active_bytes: self.active_memory.load(Ordering::Relaxed),
            peak_bytes: self.peak_memory.load(Ordering::Relaxed),
            live_allocations: self.live_allocations.load(Ordering::Relaxed),
            total_allocations: self.allocation_count.load(Ordering::Relaxed),
            fallback_allocations: self.fallback_count.load(Ordering::Relaxed),
        }
    }

    pub fn reset_peak_memory(&self) {
        self.peak_memory.store(self.active_memory.load(Ordering::Relaxed), Ordering::Relaxed);
    }

    /// Returns both arenas to the device. Allocations still live are reported and their
    /// memory is reclaimed with the arena.
    pub fn teardown(&self) {
        let mut released = false;
        for tier in &self.tiers {
            let state = tier.arena.lock().unwrap_or_else(PoisonError::into_inner).take();
            let Some(state) = state else {
                continue;
            };
            released = true;
            if state.live_allocations > 0 {
                log::warn!("{:?} tier torn down with {} live allocations", tier.kind, state.live_allocations);
            }
            if let Err(error) = self.device.free(state.buffer) {
                log::warn!("Failed to free {:?} arena: {error}", tier.kind);
            }
        }
        if let (true, Some(tracer)) = (released, &self.tracer) {
            tracer.log_summary();
        }
    }
}

impl Drop for MemoryPool {
    fn drop(&mut self) {
        self.teardown();
    }
}
