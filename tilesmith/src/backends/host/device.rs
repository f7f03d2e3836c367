use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    thread,
};

use serde::{Deserialize, Serialize};

use super::kernel::{HostKernel, HostOperands};
use crate::{
    DataType,
    array::{decode_elements, encode_elements},
    backends::common::{
        BufferRange, Device, DeviceBuffer, DeviceError, DeviceKernel, KernelImage, LaunchArguments, LaunchToken,
        MemoryKind,
    },
};

const ADDRESS_ALIGNMENT: u64 = 1 << 16;
const DEVICE_ADDRESS_BASE: u64 = 0x0000_7000_0000_0000;
const HOST_ADDRESS_BASE: u64 = 0x0000_0100_0000_0000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostDeviceConfig {
    pub name: String,
    pub compute_capability: u32,
    /// Bytes of device memory.
    pub total_memory: usize,
    /// Bytes of pinned host memory.
    pub host_memory: usize,
    /// Threads used to execute a launch, 0 for one per available core.
    pub worker_threads: usize,
}

impl Default for HostDeviceConfig {
    fn default() -> Self {
        Self {
            name: "host".to_string(),
            compute_capability: 90,
            total_memory: 1 << 30,
            host_memory: 1 << 30,
            worker_threads: 0,
        }
    }
}

impl HostDeviceConfig {
    pub fn with_compute_capability(
        mut self,
        compute_capability: u32,
    ) -> Self {
        self.compute_capability = compute_capability;
        self
    }

    pub fn with_total_memory(
        mut self,
        total_memory: usize,
    ) -> Self {
        self.total_memory = total_memory;
        self
    }
}

struct HostAllocation {
    kind: MemoryKind,
    data: Vec<u8>,
}

#[derive(Default)]
struct HostMemory {
    buffers: HashMap<u64, HostAllocation>,
    used: HashMap<MemoryKind, usize>,
    next_address: HashMap<MemoryKind, u64>,
}

impl HostMemory {
    fn slice(
        &self,
        range: &BufferRange,
    ) -> Result<&[u8], DeviceError> {
        let allocation = self.buffers.get(&range.buffer).ok_or(DeviceError::UnknownBuffer(range.buffer))?;
        checked(range, allocation.data.len())?;
        Ok(&allocation.data[range.offset..range.end()])
    }

    fn slice_mut(
        &mut self,
        range: &BufferRange,
    ) -> Result<&mut [u8], DeviceError> {
        let allocation = self.buffers.get_mut(&range.buffer).ok_or(DeviceError::UnknownBuffer(range.buffer))?;
        checked(range, allocation.data.len())?;
        Ok(&mut allocation.data[range.offset..range.end()])
    }
}

fn checked(
    range: &BufferRange,
    capacity: usize,
) -> Result<(), DeviceError> {
    if range.offset.checked_add(range.length).is_none_or(|end| end > capacity) {
        return Err(DeviceError::RangeOutOfBounds {
            buffer: range.buffer,
            offset: range.offset,
            length: range.length,
            capacity,
        });
    }
    Ok(())
}

/// In-process device: buffers live in host memory and kernels run their tiled schedule on
/// worker threads. Launches complete before [`Device::launch`] returns; the outcome is
/// reported by [`Device::synchronize`].
pub struct HostDevice {
    config: HostDeviceConfig,
    workers: usize,
    memory: Mutex<HostMemory>,
    next_buffer_id: AtomicU64,
    next_launch_id: AtomicU64,
    completed: Mutex<HashMap<u64, Result<(), DeviceError>>>,
}

impl HostDevice {
    pub fn new(config: HostDeviceConfig) -> Self {
        let workers = if config.worker_threads == 0 {
            thread::available_parallelism().map(usize::from).unwrap_or(1)
        } else {
            config.worker_threads
        };
        log::debug!(
            "Host device `{}`: sm{}, {} bytes device memory, {} workers",
            config.name,
            config.compute_capability,
            config.total_memory,
            workers
        );
        Self {
            config,
            workers,
            memory: Mutex::new(HostMemory::default()),
            next_buffer_id: AtomicU64::new(1),
            next_launch_id: AtomicU64::new(1),
            completed: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &HostDeviceConfig {
        &self.config
    }

    fn capacity(
        &self,
        kind: MemoryKind,
    ) -> usize {
        match kind {
            MemoryKind::Device => self.config.total_memory,
            MemoryKind::HostPinned => self.config.host_memory,
        }
    }

    /// Bytes currently allocated from `kind`.
    pub fn used_memory(
        &self,
        kind: MemoryKind,
    ) -> usize {
        let memory = self.memory.lock().unwrap_or_else(PoisonError::into_inner);
        memory.used.get(&kind).copied().unwrap_or(0)
    }

    pub fn live_buffers(&self) -> usize {
        self.memory.lock().unwrap_or_else(PoisonError::into_inner).buffers.len()
    }

    fn execute(
        &self,
        kernel: &HostKernel,
        arguments: &LaunchArguments,
    ) -> Result<(), DeviceError> {
        let descriptor = kernel.descriptor();
        let launch_error = |reason: String| DeviceError::Launch {
            kernel: kernel.entry_point().to_string(),
            reason,
        };

        if !descriptor.architecture.is_supported_by(self.config.compute_capability) {
            return Err(launch_error(format!(
                "kernel targets {} but device `{}` is sm{}",
                descriptor.architecture, self.config.name, self.config.compute_capability
            )));
        }

        let (a, b, c) = {
            let memory = self.memory.lock().unwrap_or_else(PoisonError::into_inner);
            let decode = |range: &BufferRange, element: DataType| {
                memory.slice(range).and_then(|bytes| {
                    decode_elements(element, bytes).map_err(|error| launch_error(error.to_string()))
                })
            };
            (
                decode(&arguments.a, descriptor.a.element)?,
                decode(&arguments.b, descriptor.b.element)?,
                decode(&arguments.c, descriptor.c.element)?,
            )
        };

        let output = kernel
            .execute(
                &arguments.problem,
                HostOperands {
                    a: &a,
                    b: &b,
                    c: &c,
                },
                arguments.alpha,
                arguments.beta,
            )
            .map_err(launch_error)?;
        let bytes = encode_elements(descriptor.c.element, &output).map_err(|error| launch_error(error.to_string()))?;

        let mut memory = self.memory.lock().unwrap_or_else(PoisonError::into_inner);
        let destination = memory.slice_mut(&arguments.d)?;
        if destination.len() < bytes.len() {
            return Err(launch_error(format!(
                "output needs {} bytes, D holds {}",
                bytes.len(),
                destination.len()
            )));
        }
        destination[..bytes.len()].copy_from_slice(&bytes);
        Ok(())
    }
}

impl Default for HostDevice {
    fn default() -> Self {
        Self::new(HostDeviceConfig::default())
    }
}

impl Device for HostDevice {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn compute_capability(&self) -> u32 {
        self.config.compute_capability
    }

    fn total_memory(&self) -> usize {
        self.config.total_memory
    }

    fn allocate(
        &self,
        kind: MemoryKind,
        size: usize,
    ) -> Result<DeviceBuffer, DeviceError> {
        let capacity = self.capacity(kind);
        let mut memory = self.memory.lock().unwrap_or_else(PoisonError::into_inner);
        let used = memory.used.get(&kind).copied().unwrap_or(0);
        if size > capacity.saturating_sub(used) {
            return Err(DeviceError::OutOfMemory {
                kind,
                requested: size,
                available: capacity.saturating_sub(used),
            });
        }

        let id = self.next_buffer_id.fetch_add(1, Ordering::Relaxed);
        let base = match kind {
            MemoryKind::Device => DEVICE_ADDRESS_BASE,
            MemoryKind::HostPinned => HOST_ADDRESS_BASE,
        };
        let next_address = memory.next_address.entry(kind).or_insert(base);
        let address = *next_address;
        *next_address += (size as u64).div_ceil(ADDRESS_ALIGNMENT).max(1) * ADDRESS_ALIGNMENT;

        memory.used.insert(kind, used + size);
        memory.buffers.insert(
            id,
            HostAllocation {
                kind,
                data: vec![0; size],
            },
        );
        Ok(DeviceBuffer::new(id, kind, address, size))
    }

    fn free(
        &self,
        buffer: DeviceBuffer,
    ) -> Result<(), DeviceError> {
        let mut memory = self.memory.lock().unwrap_or_else(PoisonError::into_inner);
        let allocation = memory.buffers.remove(&buffer.id()).ok_or(DeviceError::UnknownBuffer(buffer.id()))?;
        if let Some(used) = memory.used.get_mut(&allocation.kind) {
            *used -= allocation.data.len();
        }
        Ok(())
    }

    fn write(
        &self,
        range: BufferRange,
        data: &[u8],
    ) -> Result<(), DeviceError> {
        if data.len() != range.length {
            return Err(DeviceError::SizeMismatch {
                source_length: data.len(),
                destination_length: range.length,
            });
        }
        let mut memory = self.memory.lock().unwrap_or_else(PoisonError::into_inner);
        memory.slice_mut(&range)?.copy_from_slice(data);
        Ok(())
    }

    fn read(
        &self,
        range: BufferRange,
        data: &mut [u8],
    ) -> Result<(), DeviceError> {
        if data.len() != range.length {
            return Err(DeviceError::SizeMismatch {
                source_length: range.length,
                destination_length: data.len(),
            });
        }
        let memory = self.memory.lock().unwrap_or_else(PoisonError::into_inner);
        data.copy_from_slice(memory.slice(&range)?);
        Ok(())
    }

    fn copy(
        &self,
        source: BufferRange,
        destination: BufferRange,
    ) -> Result<(), DeviceError> {
        if source.length != destination.length {
            return Err(DeviceError::SizeMismatch {
                source_length: source.length,
                destination_length: destination.length,
            });
        }
        let mut memory = self.memory.lock().unwrap_or_else(PoisonError::into_inner);
        let staged = memory.slice(&source)?.to_vec();
        memory.slice_mut(&destination)?.copy_from_slice(&staged);
        Ok(())
    }

    fn load_kernel(
        &self,
        image: &KernelImage,
    ) -> Result<Arc<dyn DeviceKernel>, DeviceError> {
        if image.source.is_empty() {
            return Err(DeviceError::KernelLoad {
                name: image.entry_point.clone(),
                reason: "empty kernel image".to_string(),
            });
        }
        log::debug!("Loaded `{}` on `{}`", image.entry_point, self.config.name);
        Ok(Arc::new(HostKernel::new(image, self.workers)))
    }

    fn launch(
        &self,
        kernel: &dyn DeviceKernel,
        arguments: &LaunchArguments,
    ) -> Result<LaunchToken, DeviceError> {
        let host_kernel = kernel
            .as_any()
            .downcast_ref::<HostKernel>()
            .ok_or_else(|| DeviceError::ForeignKernel(kernel.entry_point().to_string()))?;
        let token = LaunchToken(self.next_launch_id.fetch_add(1, Ordering::Relaxed));
        let outcome = self.execute(host_kernel, arguments);
        self.completed.lock().unwrap_or_else(PoisonError::into_inner).insert(token.0, outcome);
        Ok(token)
    }

    fn synchronize(
        &self,
        token: LaunchToken,
    ) -> Result<(), DeviceError> {
        self.completed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&token.0)
            .ok_or(DeviceError::UnknownLaunch(token.0))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocations_respect_capacity() {
        let device = HostDevice::new(HostDeviceConfig::default().with_total_memory(1024));
        let buffer = device.allocate(MemoryKind::Device, 1000).unwrap();
        assert!(matches!(
            device.allocate(MemoryKind::Device, 100),
            Err(DeviceError::OutOfMemory {
                available: 24,
                ..
            })
        ));
        device.free(buffer).unwrap();
        assert_eq!(device.used_memory(MemoryKind::Device), 0);
        assert!(device.allocate(MemoryKind::Device, 100).is_ok());
    }

    #[test]
    fn buffers_get_disjoint_addresses() {
        let device = HostDevice::default();
        let first = device.allocate(MemoryKind::Device, 100).unwrap();
        let second = device.allocate(MemoryKind::Device, 100).unwrap();
        assert!(first.address() + first.length() as u64 <= second.address());
    }

    #[test]
    fn copies_move_bytes_between_tiers() {
        let device = HostDevice::default();
        let staging = device.allocate(MemoryKind::HostPinned, 8).unwrap();
        let resident = device.allocate(MemoryKind::Device, 16).unwrap();
        device.write(staging.whole(), &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        device.copy(staging.whole(), resident.range(8, 8)).unwrap();

        let mut readback = [0u8; 8];
        device.read(resident.range(8, 8), &mut readback).unwrap();
        assert_eq!(readback, [1, 2, 3, 4, 5, 6, 7, 8]);
        assert!(matches!(
            device.read(resident.range(12, 8), &mut readback),
            Err(DeviceError::RangeOutOfBounds { .. })
        ));
    }
}
