mod error;
mod instruction_table;

pub use error::ConfigurationError;
pub use instruction_table::{accumulator_supported, tensor_op_available, tensor_op_shapes};

use crate::descriptor::{
    Architecture, ConvKind, GemmMode, IteratorAlgorithm, Layout, MathOperation, OpcodeClass, OperationDescriptor,
    OperationKind, TensorDescription, TileShape,
};

const MAX_ACCESS_BITS: u64 = 128;
const MAX_CLUSTER_SIZE: u64 = 16;

/// Checks that `descriptor` names a kernel that can exist. Checks run in a fixed order
/// and the first violation is returned, so the same descriptor always yields the same error.
pub fn validate(descriptor: &OperationDescriptor) -> Result<(), ConfigurationError> {
    validate_instruction(descriptor)?;
    validate_tile(descriptor)?;
    validate_alignment(descriptor)?;
    validate_architecture(descriptor)?;
    validate_epilogue(descriptor)?;
    validate_coherence(descriptor)?;
    Ok(())
}

fn validate_instruction(descriptor: &OperationDescriptor) -> Result<(), ConfigurationError> {
    let instruction = descriptor.math_instruction();

    if instruction.element_a != descriptor.a.element || instruction.element_b != descriptor.b.element {
        return Err(ConfigurationError::InstructionOperandMismatch {
            instruction_a: instruction.element_a,
            instruction_b: instruction.element_b,
            tensor_a: descriptor.a.element,
            tensor_b: descriptor.b.element,
        });
    }

    let shape_available = match instruction.opcode_class {
        OpcodeClass::Simt => {
            instruction.instruction_shape == TileShape::UNIT && instruction.element_a == instruction.element_b
        },
        OpcodeClass::TensorOp => {
            instruction.element_a == instruction.element_b
                && tensor_op_available(instruction.element_a, instruction.instruction_shape, descriptor.architecture)
        },
    };
    if !shape_available {
        return Err(ConfigurationError::UnsupportedInstruction {
            opcode_class: instruction.opcode_class,
            shape: instruction.instruction_shape,
            element: instruction.element_a,
            architecture: descriptor.architecture,
        });
    }

    if !accumulator_supported(instruction.element_a, instruction.element_accumulator) {
        return Err(ConfigurationError::UnsupportedAccumulator {
            element: instruction.element_a,
            accumulator: instruction.element_accumulator,
        });
    }

    if instruction.math_operation == MathOperation::MultiplyAddSaturate
        && !instruction.element_accumulator.is_integer()
    {
        return Err(ConfigurationError::SaturationRequiresInteger {
            operation: instruction.math_operation,
            accumulator: instruction.element_accumulator,
        });
    }
    Ok(())
}

fn validate_tile(descriptor: &OperationDescriptor) -> Result<(), ConfigurationError> {
    let tile = &descriptor.tile;
    let instruction_shape = tile.math_instruction.instruction_shape;
    for (what, shape) in [
        ("threadblock", tile.threadblock_shape),
        ("warp count", tile.warp_count),
        ("instruction", instruction_shape),
    ] {
        if !shape.is_positive() {
            return Err(ConfigurationError::EmptyShape {
                what,
                shape,
            });
        }
    }

    let per_threadblock = tile.warp_count.elementwise_mul(&instruction_shape);
    if !tile.threadblock_shape.is_divisible_by(&per_threadblock) {
        return Err(ConfigurationError::TileNotDivisible {
            threadblock: tile.threadblock_shape,
            warp_count: tile.warp_count,
            instruction: instruction_shape,
        });
    }
    Ok(())
}

/// Threadblock extent along the contiguous dimension of an operand, or `None` when the
/// layout does not fit the operation (reported by the coherence check).
fn contiguous_tile_extent(
    descriptor: &OperationDescriptor,
    operand: &str,
    layout: Layout,
) -> Option<(&'static str, u32)> {
    let tile = descriptor.tile.threadblock_shape;
    match descriptor.kind {
        OperationKind::Gemm {
            ..
        } => match (operand, layout) {
            ("A", Layout::RowMajor) => Some(("K", tile.k)),
            ("A", Layout::ColumnMajor) => Some(("M", tile.m)),
            ("B", Layout::RowMajor) => Some(("N", tile.n)),
            ("B", Layout::ColumnMajor) => Some(("K", tile.k)),
            (_, Layout::RowMajor) => Some(("N", tile.n)),
            (_, Layout::ColumnMajor) => Some(("M", tile.m)),
            _ => None,
        },
        OperationKind::Conv2d(conv) => {
            if layout != Layout::TensorNhwc {
                return None;
            }
            // NHWC keeps channels innermost; map each operand's channel axis onto the implicit GEMM.
            match (conv.conv_kind, operand) {
                (ConvKind::Fprop, "A") | (ConvKind::Fprop, "B") | (ConvKind::Dgrad, "A") => Some(("K", tile.k)),
                (ConvKind::Wgrad, "A") => Some(("M", tile.m)),
                _ => Some(("N", tile.n)),
            }
        },
    }
}

fn validate_operand_alignment(
    descriptor: &OperationDescriptor,
    operand: &'static str,
    tensor: &TensorDescription,
) -> Result<(), ConfigurationError> {
    let alignment = tensor.alignment;
    if alignment == 0 || !alignment.is_power_of_two() {
        return Err(ConfigurationError::AlignmentNotPowerOfTwo {
            operand,
            alignment,
        });
    }
    let access_bits = tensor.access_bits();
    if access_bits > MAX_ACCESS_BITS {
        return Err(ConfigurationError::AlignmentTooWide {
            operand,
            alignment,
            element: tensor.element,
        });
    }
    if access_bits % 8 != 0 {
        return Err(ConfigurationError::AlignmentNotByteAddressable {
            operand,
            alignment,
            element: tensor.element,
        });
    }
    if let Some((dimension, extent)) = contiguous_tile_extent(descriptor, operand, tensor.layout) {
        if extent % alignment != 0 {
            return Err(ConfigurationError::AlignmentDoesNotDivideExtent {
                operand,
                alignment,
                dimension,
                extent: extent as usize,
            });
        }
    }
    Ok(())
}

fn validate_alignment(descriptor: &OperationDescriptor) -> Result<(), ConfigurationError> {
    for (operand, tensor) in descriptor.operands() {
        validate_operand_alignment(descriptor, operand, tensor)?;
    }
    if let Some(conv) = descriptor.kind.conv() {
        if conv.iterator_algorithm == IteratorAlgorithm::FixedChannels && descriptor.a.alignment != descriptor.b.alignment
        {
            return Err(ConfigurationError::FixedChannelsAlignmentMismatch {
                a: descriptor.a.alignment,
                b: descriptor.b.alignment,
            });
        }
    }
    Ok(())
}

fn validate_architecture(descriptor: &OperationDescriptor) -> Result<(), ConfigurationError> {
    let tile = &descriptor.tile;
    let architecture = descriptor.architecture;

    if let Some(cluster) = tile.cluster_shape {
        if !cluster.is_positive() {
            return Err(ConfigurationError::EmptyShape {
                what: "cluster",
                shape: cluster,
            });
        }
        if cluster != TileShape::UNIT && architecture < Architecture::SM90 {
            return Err(ConfigurationError::ClusterRequiresSm90 {
                cluster,
                architecture,
            });
        }
        if cluster.volume() > MAX_CLUSTER_SIZE {
            return Err(ConfigurationError::ClusterTooLarge(cluster));
        }
    }

    if tile.persistent && architecture < Architecture::SM90 {
        return Err(ConfigurationError::PersistentRequiresSm90(architecture));
    }

    let stages_supported = if architecture < Architecture::SM80 {
        tile.stages == 2
    } else {
        tile.stages >= 2
    };
    if !stages_supported {
        return Err(ConfigurationError::UnsupportedStageCount {
            stages: tile.stages,
            architecture,
        });
    }
    Ok(())
}

fn validate_epilogue(descriptor: &OperationDescriptor) -> Result<(), ConfigurationError> {
    let parameters = descriptor.epilogue.parameters();
    if parameters.element_output != descriptor.c.element {
        return Err(ConfigurationError::EpilogueOutputMismatch {
            epilogue: parameters.element_output,
            tensor: descriptor.c.element,
        });
    }
    if parameters.alignment != descriptor.c.alignment {
        return Err(ConfigurationError::EpilogueAlignmentMismatch {
            epilogue: parameters.alignment,
            tensor: descriptor.c.alignment,
        });
    }
    let accumulator = descriptor.math_instruction().element_accumulator;
    if parameters.element_accumulator != accumulator {
        return Err(ConfigurationError::EpilogueAccumulatorMismatch {
            epilogue: parameters.element_accumulator,
            instruction: accumulator,
        });
    }
    Ok(())
}

fn validate_coherence(descriptor: &OperationDescriptor) -> Result<(), ConfigurationError> {
    match descriptor.kind {
        OperationKind::Gemm {
            mode,
        } => {
            for (operand, tensor) in descriptor.operands() {
                if !tensor.layout.is_matrix() {
                    return Err(ConfigurationError::LayoutMismatch {
                        operand,
                        layout: tensor.layout,
                        operation: "gemm",
                    });
                }
            }
            if descriptor.swizzle.is_strided_dgrad() {
                return Err(ConfigurationError::SwizzleRequiresDgrad(descriptor.swizzle));
            }
            if mode == GemmMode::SplitKSerial && descriptor.tile.persistent {
                return Err(ConfigurationError::SplitKPersistent);
            }
        },
        OperationKind::Conv2d(conv) => {
            for (operand, tensor) in descriptor.operands() {
                if tensor.layout != Layout::TensorNhwc {
                    return Err(ConfigurationError::LayoutMismatch {
                        operand,
                        layout: tensor.layout,
                        operation: "conv2d",
                    });
                }
            }
            let channel_iterator = matches!(
                conv.iterator_algorithm,
                IteratorAlgorithm::FixedChannels | IteratorAlgorithm::FewChannels
            );
            if channel_iterator && conv.conv_kind != ConvKind::Fprop {
                return Err(ConfigurationError::IteratorRequiresFprop(conv.iterator_algorithm));
            }
            if descriptor.swizzle.is_strided_dgrad() && conv.conv_kind != ConvKind::Dgrad {
                return Err(ConfigurationError::SwizzleRequiresDgrad(descriptor.swizzle));
            }
        },
    }
    Ok(())
}
