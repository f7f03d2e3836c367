use crate::{
    DataType,
    descriptor::{Architecture, TileShape},
};

struct TensorOpInstruction {
    element: DataType,
    shape: TileShape,
    minimum_architecture: Architecture,
}

const TENSOR_OP_INSTRUCTIONS: &[TensorOpInstruction] = &[
    TensorOpInstruction {
        element: DataType::F16,
        shape: TileShape::new(16, 8, 8),
        minimum_architecture: Architecture::SM75,
    },
    TensorOpInstruction {
        element: DataType::F16,
        shape: TileShape::new(16, 8, 16),
        minimum_architecture: Architecture::SM80,
    },
    TensorOpInstruction {
        element: DataType::BF16,
        shape: TileShape::new(16, 8, 8),
        minimum_architecture: Architecture::SM80,
    },
    TensorOpInstruction {
        element: DataType::BF16,
        shape: TileShape::new(16, 8, 16),
        minimum_architecture: Architecture::SM80,
    },
    TensorOpInstruction {
        element: DataType::F32,
        shape: TileShape::new(16, 8, 8),
        minimum_architecture: Architecture::SM80,
    },
    TensorOpInstruction {
        element: DataType::F64,
        shape: TileShape::new(8, 8, 4),
        minimum_architecture: Architecture::SM80,
    },
    TensorOpInstruction {
        element: DataType::F64,
        shape: TileShape::new(16, 8, 4),
        minimum_architecture: Architecture::SM90,
    },
    TensorOpInstruction {
        element: DataType::I8,
        shape: TileShape::new(8, 8, 16),
        minimum_architecture: Architecture::SM75,
    },
    TensorOpInstruction {
        element: DataType::I8,
        shape: TileShape::new(16, 8, 32),
        minimum_architecture: Architecture::SM80,
    },
    TensorOpInstruction {
        element: DataType::U8,
        shape: TileShape::new(8, 8, 16),
        minimum_architecture: Architecture::SM75,
    },
    TensorOpInstruction {
        element: DataType::U8,
        shape: TileShape::new(16, 8, 32),
        minimum_architecture: Architecture::SM80,
    },
];

/// Whether a tensor-core instruction of `shape` exists for `element` on `architecture`.
pub fn tensor_op_available(
    element: DataType,
    shape: TileShape,
    architecture: Architecture,
) -> bool {
    TENSOR_OP_INSTRUCTIONS.iter().any(|instruction| {
        instruction.element == element
            && instruction.shape == shape
            && instruction.minimum_architecture <= architecture
    })
}

/// Tensor-core instruction shapes available for `element` on `architecture`.
pub fn tensor_op_shapes(
    element: DataType,
    architecture: Architecture,
) -> Vec<TileShape> {
    TENSOR_OP_INSTRUCTIONS
        .iter()
        .filter(|instruction| instruction.element == element && instruction.minimum_architecture <= architecture)
        .map(|instruction| instruction.shape)
        .collect()
}

pub fn accumulator_supported(
    element: DataType,
    accumulator: DataType,
) -> bool {
    match element {
        DataType::F16 => matches!(accumulator, DataType::F16 | DataType::F32),
        DataType::BF16 | DataType::F32 => accumulator == DataType::F32,
        DataType::F64 => accumulator == DataType::F64,
        DataType::I8 | DataType::U8 | DataType::I4 | DataType::U4 => accumulator == DataType::I32,
        _ => false,
    }
}
