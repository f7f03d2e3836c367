use thiserror::Error;

use super::MemoryKind;
use crate::DataType;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("Out of {kind:?} memory: requested {requested} bytes, {available} available")]
    OutOfMemory {
        kind: MemoryKind,
        requested: usize,
        available: usize,
    },
    #[error("Unknown buffer {0}")]
    UnknownBuffer(u64),
    #[error("Range [{offset}, {offset}+{length}) exceeds buffer {buffer} of {capacity} bytes")]
    RangeOutOfBounds {
        buffer: u64,
        offset: usize,
        length: usize,
        capacity: usize,
    },
    #[error("Copy size mismatch: {source_length} bytes into {destination_length}")]
    SizeMismatch {
        source_length: usize,
        destination_length: usize,
    },
    #[error("Kernel `{0}` was not loaded by this device")]
    ForeignKernel(String),
    #[error("Failed to load kernel `{name}`: {reason}")]
    KernelLoad {
        name: String,
        reason: String,
    },
    #[error("Launch of `{kernel}` failed: {reason}")]
    Launch {
        kernel: String,
        reason: String,
    },
    #[error("Unknown launch token {0}")]
    UnknownLaunch(u64),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateInstantiationError {
    #[error("Template library has no `{0}` template")]
    UnknownTemplate(String),
    #[error("{parameter} = {element} is not instantiable")]
    UnsupportedElement {
        parameter: &'static str,
        element: DataType,
    },
    #[error("Template argument `{0}` is missing")]
    MissingArgument(&'static str),
    #[error("{0}")]
    Rejected(String),
}
