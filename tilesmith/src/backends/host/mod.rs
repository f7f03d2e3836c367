mod device;
mod kernel;
mod library;

pub use device::{HostDevice, HostDeviceConfig};
pub use kernel::HostKernel;
pub use library::HostTemplateLibrary;
