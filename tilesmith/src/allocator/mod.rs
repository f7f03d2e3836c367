mod error;
mod free_list;
mod guard;
mod memory_pool;
mod trace;

pub use error::AllocError;
pub use guard::ScopedAllocation;
pub use memory_pool::{
    AllocationOrigin, FallbackPolicy, GRANULE, MemoryPool, PoolAllocation, PoolConfig, PoolStatistics,
};
pub use trace::{AllocationEvent, AllocationSummary, AllocationTracer, TierSummary};
