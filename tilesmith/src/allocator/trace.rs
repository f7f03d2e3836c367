use std::{
    collections::BTreeMap,
    sync::{
        Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Instant,
};

use super::AllocationOrigin;
use crate::backends::MemoryKind;

#[derive(Clone, Debug)]
pub struct AllocationEvent {
    pub label: String,
    pub size: usize,
    pub tier: MemoryKind,
    pub origin: AllocationOrigin,
    pub timestamp_ns: u64,
}

#[derive(Debug)]
pub struct AllocationSummary {
    pub total_allocations: usize,
    pub total_bytes: usize,
    pub peak_bytes: usize,
    pub by_tier: Vec<TierSummary>,
}

#[derive(Debug)]
pub struct TierSummary {
    pub tier: MemoryKind,
    pub allocations: usize,
    pub bytes: usize,
    pub fallback_allocations: usize,
}

/// Records every pool allocation with a caller-supplied label.
pub struct AllocationTracer {
    start_time: Instant,
    events: Mutex<Vec<AllocationEvent>>,
    total_allocated: AtomicU64,
    peak_allocated: AtomicU64,
}

impl AllocationTracer {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            events: Mutex::new(Vec::new()),
            total_allocated: AtomicU64::new(0),
            peak_allocated: AtomicU64::new(0),
        }
    }

    pub fn record_allocation(
        &self,
        label: &str,
        size: usize,
        tier: MemoryKind,
        origin: AllocationOrigin,
    ) {
        let event = AllocationEvent {
            label: label.to_string(),
            size,
            tier,
            origin,
            timestamp_ns: self.start_time.elapsed().as_nanos() as u64,
        };
        self.events.lock().unwrap_or_else(PoisonError::into_inner).push(event);

        let new_total = self.total_allocated.fetch_add(size as u64, Ordering::Relaxed) + size as u64;
        self.peak_allocated.fetch_max(new_total, Ordering::Relaxed);
    }

    pub fn record_release(
        &self,
        size: usize,
    ) {
        self.total_allocated.fetch_sub(size as u64, Ordering::Relaxed);
    }

    pub fn events(&self) -> Vec<AllocationEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn summary(&self) -> AllocationSummary {
        let events = self.events();

        let mut tiers: BTreeMap<MemoryKind, TierSummary> = BTreeMap::new();
        for event in &events {
            let entry = tiers.entry(event.tier).or_insert(TierSummary {
                tier: event.tier,
                allocations: 0,
                bytes: 0,
                fallback_allocations: 0,
            });
            entry.allocations += 1;
            entry.bytes += event.size;
            if event.origin == AllocationOrigin::Direct {
                entry.fallback_allocations += 1;
            }
        }

        AllocationSummary {
            total_allocations: events.len(),
            total_bytes: events.iter().map(|event| event.size).sum(),
            peak_bytes: self.peak_allocated.load(Ordering::Relaxed) as usize,
            by_tier: tiers.into_values().collect(),
        }
    }

    pub fn log_summary(&self) {
        let summary = self.summary();
        log::info!(
            "Allocation trace: {} allocations, {} bytes total, {} bytes peak",
            summary.total_allocations,
            summary.total_bytes,
            summary.peak_bytes
        );
        for tier in &summary.by_tier {
            log::info!(
                "  {:?}: {} allocations ({} direct), {} bytes",
                tier.tier,
                tier.allocations,
                tier.fallback_allocations,
                tier.bytes
            );
        }
    }
}

impl Default for AllocationTracer {
    fn default() -> Self {
        Self::new()
    }
}
