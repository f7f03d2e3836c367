use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc, Mutex, OnceLock, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
    time::Instant,
};

use thiserror::Error;

use crate::{
    backends::{Device, DeviceError, DeviceKernel, KernelTemplateLibrary, TemplateInstantiationError},
    descriptor::OperationDescriptor,
    emitter::{Emission, SpecializationKey},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompilationFailure {
    #[error("template instantiation failed: {0}")]
    Instantiation(#[from] TemplateInstantiationError),
    #[error("kernel load failed: {0}")]
    Load(#[from] DeviceError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Failed to compile `{key}`: {reason}")]
pub struct CompilationError {
    pub key: SpecializationKey,
    pub reason: CompilationFailure,
}

struct CompiledKernel {
    key: SpecializationKey,
    descriptor: OperationDescriptor,
    kernel: Arc<dyn DeviceKernel>,
}

/// Shared, read-only reference to a compiled kernel.
#[derive(Clone)]
pub struct CompiledKernelHandle {
    inner: Arc<CompiledKernel>,
}

impl CompiledKernelHandle {
    pub fn key(&self) -> &SpecializationKey {
        &self.inner.key
    }

    pub fn descriptor(&self) -> &OperationDescriptor {
        &self.inner.descriptor
    }

    pub fn kernel(&self) -> &dyn DeviceKernel {
        self.inner.kernel.as_ref()
    }

    /// Whether both handles refer to the same compiled artifact.
    pub fn same_kernel(
        &self,
        other: &CompiledKernelHandle,
    ) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for CompiledKernelHandle {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("CompiledKernelHandle").field("key", &self.inner.key).finish()
    }
}

type CacheSlot = Arc<OnceLock<Result<CompiledKernelHandle, CompilationError>>>;

/// Compiles each specialization key at most once per process. Concurrent requests for a key
/// wait for the single in-flight compilation; failures are cached like successes.
pub struct CompileCache {
    library: Arc<dyn KernelTemplateLibrary>,
    device: Arc<dyn Device>,
    entries: Mutex<HashMap<SpecializationKey, CacheSlot>>,
    compilations: AtomicUsize,
    hits: AtomicUsize,
}

impl CompileCache {
    pub fn new(
        library: Arc<dyn KernelTemplateLibrary>,
        device: Arc<dyn Device>,
    ) -> Self {
        Self {
            library,
            device,
            entries: Mutex::new(HashMap::new()),
            compilations: AtomicUsize::new(0),
            hits: AtomicUsize::new(0),
        }
    }

    fn compile(
        &self,
        emission: &Emission,
    ) -> Result<CompiledKernelHandle, CompilationError> {
        let started = Instant::now();
        self.compilations.fetch_add(1, Ordering::Relaxed);
        let failure = |reason: CompilationFailure| CompilationError {
            key: emission.key.clone(),
            reason,
        };

        let image = self.library.instantiate(&emission.request).map_err(|error| failure(error.into()))?;
        let kernel = self.device.load_kernel(&image).map_err(|error| failure(error.into()))?;
        log::info!(
            "Compiled `{}` with {} library in {:.2?}",
            emission.key,
            self.library.name(),
            started.elapsed()
        );
        Ok(CompiledKernelHandle {
            inner: Arc::new(CompiledKernel {
                key: emission.key.clone(),
                descriptor: emission.request.descriptor.clone(),
                kernel,
            }),
        })
    }

    /// Returns the compiled kernel for `emission`, compiling it if this is the first request.
    pub fn build(
        &self,
        emission: &Emission,
    ) -> Result<CompiledKernelHandle, CompilationError> {
        let slot = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            entries.entry(emission.key.clone()).or_default().clone()
        };

        let mut compiled_here = false;
        let result = slot.get_or_init(|| {
            compiled_here = true;
            self.compile(emission)
        });
        if !compiled_here {
            self.hits.fetch_add(1, Ordering::Relaxed);
            log::debug!("Compile cache hit for `{}`", emission.key);
        }
        if let Err(error) = result {
            if compiled_here {
                log::warn!("{error}");
            }
        }
        result.clone()
    }

    /// Cached result for `key` without compiling.
    pub fn get(
        &self,
        key: &SpecializationKey,
    ) -> Option<Result<CompiledKernelHandle, CompilationError>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).and_then(|slot| slot.get().cloned())
    }

    pub fn compilations(&self) -> usize {
        self.compilations.load(Ordering::Relaxed)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<SpecializationKey> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<_> = entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Drops every cached kernel. Outstanding handles stay valid until they are dropped.
    pub fn clear(&self) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        log::debug!("Releasing {} compiled kernels", entries.len());
        entries.clear();
    }
}
