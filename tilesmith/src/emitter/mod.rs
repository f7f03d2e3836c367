mod error;
mod key;

pub use error::KeyParseError;
pub use key::SpecializationKey;

use crate::descriptor::{ConvKind, GemmMode, OperationDescriptor, OperationKind};

/// What the kernel template library is asked to instantiate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstantiationRequest {
    pub key: SpecializationKey,
    pub descriptor: OperationDescriptor,
    pub template_name: &'static str,
    /// Template parameters in declaration order.
    pub template_arguments: Vec<(&'static str, String)>,
}

impl InstantiationRequest {
    pub fn argument(
        &self,
        name: &str,
    ) -> Option<&str> {
        self.template_arguments
            .iter()
            .find(|(argument, _)| *argument == name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Emission {
    pub key: SpecializationKey,
    pub request: InstantiationRequest,
}

fn template_name(kind: &OperationKind) -> &'static str {
    match kind {
        OperationKind::Gemm {
            mode: GemmMode::Universal,
        } => "GemmUniversal",
        OperationKind::Gemm {
            mode: GemmMode::SplitKSerial,
        } => "GemmSplitKSerial",
        OperationKind::Conv2d(conv) => match conv.conv_kind {
            ConvKind::Fprop => "ImplicitGemmConv2dFprop",
            ConvKind::Dgrad => "ImplicitGemmConv2dDgrad",
            ConvKind::Wgrad => "ImplicitGemmConv2dWgrad",
        },
    }
}

fn template_arguments(descriptor: &OperationDescriptor) -> Vec<(&'static str, String)> {
    let instruction = descriptor.math_instruction();
    let tile = &descriptor.tile;
    let epilogue = descriptor.epilogue.parameters();

    let mut arguments = Vec::with_capacity(24);
    for (operand, tensor) in descriptor.operands() {
        let (element, layout, alignment) = match operand {
            "A" => ("ElementA", "LayoutA", "AlignmentA"),
            "B" => ("ElementB", "LayoutB", "AlignmentB"),
            _ => ("ElementC", "LayoutC", "AlignmentC"),
        };
        arguments.push((element, tensor.element.to_string()));
        arguments.push((layout, tensor.layout.token().to_string()));
        arguments.push((alignment, tensor.alignment.to_string()));
    }
    arguments.push(("ElementAccumulator", instruction.element_accumulator.to_string()));
    arguments.push(("OperatorClass", instruction.opcode_class.token().to_string()));
    arguments.push(("ArchTag", descriptor.architecture.to_string()));
    arguments.push(("ThreadblockShape", tile.threadblock_shape.to_string()));
    arguments.push(("WarpCount", tile.warp_count.to_string()));
    arguments.push(("InstructionShape", instruction.instruction_shape.to_string()));
    arguments.push(("Stages", tile.stages.to_string()));
    if let Some(cluster) = tile.cluster_shape {
        arguments.push(("ClusterShape", cluster.to_string()));
    }
    if tile.persistent {
        arguments.push(("KernelSchedule", "persistent".to_string()));
    }
    arguments.push(("MathOperator", instruction.math_operation.token().to_string()));
    arguments.push(("EpilogueFunctor", descriptor.epilogue.token().to_string()));
    arguments.push(("ElementEpilogueCompute", epilogue.element_compute.to_string()));
    arguments.push(("SwizzlingFunctor", descriptor.swizzle.token().to_string()));
    if let Some(conv) = descriptor.kind.conv() {
        arguments.push(("IteratorAlgorithm", conv.iterator_algorithm.token().to_string()));
        arguments.push(("StrideSupport", conv.stride_support.token().to_string()));
    }
    arguments
}

/// Derives the specialization key and instantiation request for a validated descriptor.
pub fn emit(descriptor: &OperationDescriptor) -> Emission {
    let key = descriptor.specialization_key();
    let request = InstantiationRequest {
        key: key.clone(),
        descriptor: descriptor.clone(),
        template_name: template_name(&descriptor.kind),
        template_arguments: template_arguments(descriptor),
    };
    log::debug!("Emitted {} for {}", request.template_name, key);
    Emission {
        key,
        request,
    }
}
