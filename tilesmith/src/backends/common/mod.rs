mod buffer;
mod device;
mod error;
mod kernel;

pub use buffer::{BufferRange, DeviceBuffer, MemoryKind};
pub use device::Device;
pub use error::{DeviceError, TemplateInstantiationError};
pub use kernel::{DeviceKernel, KernelImage, KernelTemplateLibrary, LaunchArguments, LaunchToken};
