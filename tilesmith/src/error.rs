use thiserror::Error;

use crate::{allocator::AllocError, compile_cache::CompilationError, validator::ConfigurationError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("invalid descriptor: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Compilation(#[from] CompilationError),
    #[error("memory pool: {0}")]
    Allocation(#[from] AllocError),
}
