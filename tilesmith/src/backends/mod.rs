pub mod common;
pub mod host;

pub use common::{
    BufferRange, Device, DeviceBuffer, DeviceError, DeviceKernel, KernelImage, KernelTemplateLibrary, LaunchArguments,
    LaunchToken, MemoryKind, TemplateInstantiationError,
};
