use std::{any::Any, fmt::Debug};

use super::{BufferRange, TemplateInstantiationError};
use crate::{
    descriptor::{OperationDescriptor, ProblemSize},
    emitter::{InstantiationRequest, SpecializationKey},
};

/// Loadable artifact produced by a template library for one specialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelImage {
    pub key: SpecializationKey,
    pub descriptor: OperationDescriptor,
    pub entry_point: String,
    pub source: String,
}

pub trait KernelTemplateLibrary: Send + Sync {
    fn name(&self) -> &str;

    fn instantiate(
        &self,
        request: &InstantiationRequest,
    ) -> Result<KernelImage, TemplateInstantiationError>;
}

/// Kernel resident on a device, ready to launch.
pub trait DeviceKernel: Debug + Send + Sync {
    fn entry_point(&self) -> &str;

    fn descriptor(&self) -> &OperationDescriptor;

    fn as_any(&self) -> &dyn Any;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaunchArguments {
    pub problem: ProblemSize,
    pub a: BufferRange,
    pub b: BufferRange,
    pub c: BufferRange,
    pub d: BufferRange,
    pub alpha: f64,
    pub beta: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LaunchToken(pub u64);
