use std::sync::Arc;

use crate::{
    allocator::MemoryPool,
    backends::{
        Device, KernelTemplateLibrary,
        host::{HostDevice, HostTemplateLibrary},
    },
    compile_cache::{CompileCache, CompiledKernelHandle},
    config::EngineConfig,
    descriptor::{OperationDescriptor, ProblemSize},
    emitter::emit,
    error::EngineError,
    testbed::{Testbed, TestbedError, Tolerance, VerificationReport},
    validator::validate,
};

/// Owns the collaborators and process-wide state: one compile cache, one memory pool.
/// Construct it explicitly and pass it where it is needed.
pub struct Engine {
    config: EngineConfig,
    device: Arc<dyn Device>,
    cache: CompileCache,
    pool: Arc<MemoryPool>,
    testbed: Testbed,
}

impl Engine {
    /// Engine over the in-process host backend.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let device: Arc<dyn Device> = Arc::new(HostDevice::new(config.device.clone()));
        let library: Arc<dyn KernelTemplateLibrary> = Arc::new(HostTemplateLibrary::new());
        Self::with_collaborators(config, device, library)
    }

    pub fn with_collaborators(
        config: EngineConfig,
        device: Arc<dyn Device>,
        library: Arc<dyn KernelTemplateLibrary>,
    ) -> Result<Self, EngineError> {
        let pool = Arc::new(MemoryPool::new(device.clone(), config.pool)?);
        log::info!(
            "Engine on `{}` (sm{}) with `{}` templates",
            device.name(),
            device.compute_capability(),
            library.name()
        );
        Ok(Self {
            cache: CompileCache::new(library, device.clone()),
            testbed: Testbed::new(pool.clone(), config.testbed.clone()),
            config,
            device,
            pool,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    pub fn cache(&self) -> &CompileCache {
        &self.cache
    }

    pub fn pool(&self) -> &MemoryPool {
        &self.pool
    }

    pub fn testbed(&self) -> &Testbed {
        &self.testbed
    }

    /// Validates, emits and compiles `descriptor`. Repeated calls return the cached kernel.
    pub fn build(
        &self,
        descriptor: &OperationDescriptor,
    ) -> Result<CompiledKernelHandle, EngineError> {
        validate(descriptor)?;
        let emission = emit(descriptor);
        Ok(self.cache.build(&emission)?)
    }

    pub fn verify(
        &self,
        handle: &CompiledKernelHandle,
        problems: &[ProblemSize],
        seed: u64,
    ) -> Result<VerificationReport, TestbedError> {
        self.testbed.verify(handle, problems, seed)
    }

    pub fn verify_with_tolerance(
        &self,
        handle: &CompiledKernelHandle,
        problems: &[ProblemSize],
        seed: u64,
        tolerance: Option<Tolerance>,
    ) -> Result<VerificationReport, TestbedError> {
        self.testbed.verify_with_tolerance(handle, problems, seed, tolerance)
    }

    /// Drops compiled kernels and returns the pool's arenas to the device.
    pub fn shutdown(self) {
        let statistics = self.pool.statistics();
        log::info!(
            "Shutting down: {} kernels compiled, {} cache hits, peak pool usage {} bytes",
            self.cache.compilations(),
            self.cache.hits(),
            statistics.peak_bytes
        );
        self.cache.clear();
        self.pool.teardown();
    }
}
