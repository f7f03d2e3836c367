mod common;

use std::{sync::Arc, thread};

use common::init_logging;
use proptest::prelude::*;
use tilesmith::{
    allocator::{
        AllocError, AllocationOrigin, FallbackPolicy, GRANULE, MemoryPool, PoolAllocation, PoolConfig,
        ScopedAllocation,
    },
    backends::{
        BufferRange, Device, MemoryKind,
        host::{HostDevice, HostDeviceConfig},
    },
};

const ARENA: usize = 64 * GRANULE;

fn pool(fallback: FallbackPolicy) -> (MemoryPool, Arc<HostDevice>) {
    init_logging();
    let device = Arc::new(HostDevice::new(HostDeviceConfig::default()));
    let pool = MemoryPool::new(device.clone(), PoolConfig::new(ARENA, ARENA, fallback)).unwrap();
    (pool, device)
}

fn overlaps(
    a: BufferRange,
    b: BufferRange,
) -> bool {
    a.buffer == b.buffer && a.offset < b.end() && b.offset < a.end()
}

#[derive(Debug, Clone)]
enum Step {
    Acquire {
        tier: MemoryKind,
        size: usize,
        alignment_log2: u32,
    },
    Release(usize),
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        3 => (any::<bool>(), 1..4 * GRANULE, 0..11u32).prop_map(|(device, size, alignment_log2)| Step::Acquire {
            tier: if device {
                MemoryKind::Device
            } else {
                MemoryKind::HostPinned
            },
            size,
            alignment_log2,
        }),
        2 => any::<usize>().prop_map(Step::Release),
    ]
}

proptest! {
    #[test]
    fn live_allocations_never_alias(steps in prop::collection::vec(step(), 1..64)) {
        let (pool, _device) = pool(FallbackPolicy::Fail);
        let mut live: Vec<PoolAllocation> = Vec::new();

        for step in steps {
            match step {
                Step::Acquire { tier, size, alignment_log2 } => {
                    let alignment = 1 << alignment_log2;
                    match pool.acquire(tier, size, alignment) {
                        Ok(allocation) => {
                            prop_assert_eq!(allocation.tier(), tier);
                            prop_assert!(allocation.size() >= size);
                            prop_assert_eq!(allocation.offset() % alignment.max(GRANULE), 0);
                            for other in &live {
                                prop_assert!(!overlaps(allocation.range(), other.range()));
                            }
                            live.push(allocation);
                        },
                        Err(AllocError::OutOfMemory { .. }) => {},
                        Err(error) => prop_assert!(false, "unexpected error {}", error),
                    }
                },
                Step::Release(index) if !live.is_empty() => {
                    let allocation = live.swap_remove(index % live.len());
                    prop_assert!(pool.release(allocation).is_ok());
                },
                Step::Release(_) => {},
            }
            let live_bytes: usize = live.iter().map(PoolAllocation::size).sum();
            prop_assert_eq!(pool.statistics().active_bytes, live_bytes);
            prop_assert_eq!(pool.statistics().live_allocations, live.len());
        }

        for allocation in live.drain(..) {
            prop_assert!(pool.release(allocation).is_ok());
        }
        prop_assert_eq!(pool.available(MemoryKind::Device), ARENA);
        prop_assert_eq!(pool.available(MemoryKind::HostPinned), ARENA);
    }
}

#[test]
fn exhausted_tier_fails_under_strict_policy() {
    let (pool, device) = pool(FallbackPolicy::Fail);
    let held = pool.acquire(MemoryKind::Device, ARENA - GRANULE, GRANULE).unwrap();

    let error = pool.acquire(MemoryKind::Device, 2 * GRANULE, GRANULE).unwrap_err();
    assert_eq!(
        error,
        AllocError::OutOfMemory {
            requested: 2 * GRANULE,
            available: GRANULE,
        }
    );
    // The other tier is unaffected.
    let host = pool.acquire(MemoryKind::HostPinned, 2 * GRANULE, GRANULE).unwrap();
    assert_eq!(host.origin(), AllocationOrigin::Pooled);
    assert_eq!(device.live_buffers(), 2);

    pool.release(held).unwrap();
    pool.release(host).unwrap();
}

#[test]
fn exhausted_tier_falls_back_to_the_device() {
    let (pool, device) = pool(FallbackPolicy::Direct);
    let oversized = pool.acquire(MemoryKind::Device, 2 * ARENA, GRANULE).unwrap();

    assert_eq!(oversized.origin(), AllocationOrigin::Direct);
    assert_eq!(device.live_buffers(), 3);
    assert_eq!(pool.available(MemoryKind::Device), ARENA);
    assert_eq!(pool.statistics().fallback_allocations, 1);

    pool.release(oversized).unwrap();
    assert_eq!(device.live_buffers(), 2);
    assert_eq!(pool.statistics().active_bytes, 0);
}

#[test]
fn direct_fallback_reports_device_exhaustion() {
    init_logging();
    let device: Arc<dyn Device> =
        Arc::new(HostDevice::new(HostDeviceConfig::default().with_total_memory(ARENA + 4 * GRANULE)));
    let pool = MemoryPool::new(device, PoolConfig::new(ARENA, ARENA, FallbackPolicy::Direct)).unwrap();

    let error = pool.acquire(MemoryKind::Device, 2 * ARENA, GRANULE).unwrap_err();
    assert_eq!(
        error,
        AllocError::OutOfMemory {
            requested: 2 * ARENA,
            available: 4 * GRANULE,
        }
    );
}

#[test]
fn scoped_allocations_release_on_drop() {
    let (pool, _device) = pool(FallbackPolicy::Fail);
    {
        let first = ScopedAllocation::acquire(&pool, "first", MemoryKind::Device, 1000, 16).unwrap();
        let second = ScopedAllocation::acquire(&pool, "second", MemoryKind::Device, 1000, 16).unwrap();
        assert!(!overlaps(first.range(), second.range()));
        assert_eq!(pool.statistics().live_allocations, 2);
    }
    assert_eq!(pool.statistics().live_allocations, 0);
    assert_eq!(pool.available(MemoryKind::Device), ARENA);

    let explicit = ScopedAllocation::acquire(&pool, "explicit", MemoryKind::HostPinned, 10, 1).unwrap();
    assert_eq!(explicit.requested(), 10);
    explicit.release().unwrap();
    assert_eq!(pool.statistics().live_allocations, 0);
}

#[test]
fn peak_usage_is_tracked_across_threads() {
    let (pool, _device) = pool(FallbackPolicy::Fail);
    thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..16 {
                    let allocation = pool.acquire(MemoryKind::Device, 2 * GRANULE, GRANULE).unwrap();
                    pool.release(allocation).unwrap();
                }
            });
        }
    });

    let statistics = pool.statistics();
    assert_eq!(statistics.active_bytes, 0);
    assert_eq!(statistics.total_allocations, 64);
    assert!(statistics.peak_bytes >= 2 * GRANULE);
    assert!(statistics.peak_bytes <= 8 * GRANULE);

    pool.reset_peak_memory();
    assert_eq!(pool.statistics().peak_bytes, 0);
}

#[test]
fn traced_pools_summarize_by_tier() {
    init_logging();
    let device: Arc<dyn Device> = Arc::new(HostDevice::default());
    let config = PoolConfig {
        trace: true,
        ..PoolConfig::new(ARENA, ARENA, FallbackPolicy::Direct)
    };
    let pool = MemoryPool::new(device, config).unwrap();

    let a = pool.acquire_labeled("a", MemoryKind::Device, GRANULE, 1).unwrap();
    let staging = pool.acquire_labeled("staging", MemoryKind::HostPinned, 2 * ARENA, 1).unwrap();
    pool.release(a).unwrap();
    pool.release(staging).unwrap();

    let summary = pool.tracer().unwrap().summary();
    assert_eq!(summary.total_allocations, 2);
    assert_eq!(summary.total_bytes, GRANULE + 2 * ARENA);
    let host = summary.by_tier.iter().find(|tier| tier.tier == MemoryKind::HostPinned).unwrap();
    assert_eq!(host.fallback_allocations, 1);
    assert_eq!(pool.tracer().unwrap().events()[1].label, "staging");
}

#[test]
fn releasing_into_the_wrong_pool_is_rejected() {
    let (first, _) = pool(FallbackPolicy::Fail);
    let (second, _) = pool(FallbackPolicy::Fail);
    let allocation = first.acquire(MemoryKind::Device, GRANULE, 1).unwrap();
    let address = allocation.address();

    assert_eq!(
        second.release(allocation).unwrap_err(),
        AllocError::UnknownAllocation {
            address,
        }
    );
}
