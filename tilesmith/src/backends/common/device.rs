use std::sync::Arc;

use super::{BufferRange, DeviceBuffer, DeviceError, DeviceKernel, KernelImage, LaunchArguments, LaunchToken, MemoryKind};

pub trait Device: Send + Sync {
    fn name(&self) -> &str;

    /// SM number of the device, e.g. 80 for an sm80 part.
    fn compute_capability(&self) -> u32;

    fn total_memory(&self) -> usize;

    fn allocate(
        &self,
        kind: MemoryKind,
        size: usize,
    ) -> Result<DeviceBuffer, DeviceError>;

    fn free(
        &self,
        buffer: DeviceBuffer,
    ) -> Result<(), DeviceError>;

    fn write(
        &self,
        range: BufferRange,
        data: &[u8],
    ) -> Result<(), DeviceError>;

    fn read(
        &self,
        range: BufferRange,
        data: &mut [u8],
    ) -> Result<(), DeviceError>;

    fn copy(
        &self,
        source: BufferRange,
        destination: BufferRange,
    ) -> Result<(), DeviceError>;

    fn load_kernel(
        &self,
        image: &KernelImage,
    ) -> Result<Arc<dyn DeviceKernel>, DeviceError>;

    fn launch(
        &self,
        kernel: &dyn DeviceKernel,
        arguments: &LaunchArguments,
    ) -> Result<LaunchToken, DeviceError>;

    fn synchronize(
        &self,
        token: LaunchToken,
    ) -> Result<(), DeviceError>;
}
