use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocError {
    #[error("Out of memory: requested {requested} bytes, {available} available")]
    OutOfMemory {
        requested: usize,
        available: usize,
    },
    #[error("Failed to allocate {size} bytes: {reason}")]
    AllocationFailed {
        size: usize,
        reason: String,
    },
    #[error("Alignment {0} is not a power of two")]
    InvalidAlignment(usize),
    #[error("Allocation at {address:#x} does not belong to this pool")]
    UnknownAllocation {
        address: u64,
    },
}
