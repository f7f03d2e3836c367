use thiserror::Error;

use crate::{
    DataType,
    descriptor::{Architecture, IteratorAlgorithm, Layout, MathOperation, OpcodeClass, SwizzlingFunctor, TileShape},
};

/// A descriptor (or a descriptor/problem pairing) that is internally inconsistent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("{opcode_class:?} does not provide a {shape} instruction for {element} operands on {architecture}")]
    UnsupportedInstruction {
        opcode_class: OpcodeClass,
        shape: TileShape,
        element: DataType,
        architecture: Architecture,
    },
    #[error("instruction operands ({instruction_a}, {instruction_b}) do not match tensor elements ({tensor_a}, {tensor_b})")]
    InstructionOperandMismatch {
        instruction_a: DataType,
        instruction_b: DataType,
        tensor_a: DataType,
        tensor_b: DataType,
    },
    #[error("accumulator {accumulator} is not supported for {element} operands")]
    UnsupportedAccumulator {
        element: DataType,
        accumulator: DataType,
    },
    #[error("{operation:?} requires an integer accumulator, got {accumulator}")]
    SaturationRequiresInteger {
        operation: MathOperation,
        accumulator: DataType,
    },
    #[error("{what} shape {shape} has an empty extent")]
    EmptyShape {
        what: &'static str,
        shape: TileShape,
    },
    #[error("threadblock shape {threadblock} is not divisible by warp count {warp_count} times instruction shape {instruction}")]
    TileNotDivisible {
        threadblock: TileShape,
        warp_count: TileShape,
        instruction: TileShape,
    },
    #[error("operand {operand}: alignment {alignment} is not a power of two")]
    AlignmentNotPowerOfTwo {
        operand: &'static str,
        alignment: u32,
    },
    #[error("operand {operand}: {alignment} x {element} exceeds the 128-bit access width")]
    AlignmentTooWide {
        operand: &'static str,
        alignment: u32,
        element: DataType,
    },
    #[error("operand {operand}: {alignment} x {element} is not byte addressable")]
    AlignmentNotByteAddressable {
        operand: &'static str,
        alignment: u32,
        element: DataType,
    },
    #[error("operand {operand}: alignment {alignment} does not divide the {dimension} extent {extent}")]
    AlignmentDoesNotDivideExtent {
        operand: &'static str,
        alignment: u32,
        dimension: &'static str,
        extent: usize,
    },
    #[error("fixed-channel convolution requires equal A/B alignment, got {a} and {b}")]
    FixedChannelsAlignmentMismatch {
        a: u32,
        b: u32,
    },
    #[error("cluster shape {cluster} requires sm90 or newer, descriptor targets {architecture}")]
    ClusterRequiresSm90 {
        cluster: TileShape,
        architecture: Architecture,
    },
    #[error("cluster shape {0} spans more than 16 CTAs")]
    ClusterTooLarge(TileShape),
    #[error("persistent kernels require sm90 or newer, descriptor targets {0}")]
    PersistentRequiresSm90(Architecture),
    #[error("{stages} pipeline stages are not supported on {architecture}")]
    UnsupportedStageCount {
        stages: u32,
        architecture: Architecture,
    },
    #[error("epilogue output {epilogue} does not match C element {tensor}")]
    EpilogueOutputMismatch {
        epilogue: DataType,
        tensor: DataType,
    },
    #[error("epilogue alignment {epilogue} does not match C alignment {tensor}")]
    EpilogueAlignmentMismatch {
        epilogue: u32,
        tensor: u32,
    },
    #[error("epilogue accumulator {epilogue} does not match instruction accumulator {instruction}")]
    EpilogueAccumulatorMismatch {
        epilogue: DataType,
        instruction: DataType,
    },
    #[error("operand {operand}: layout {layout:?} is not valid for {operation} operations")]
    LayoutMismatch {
        operand: &'static str,
        layout: Layout,
        operation: &'static str,
    },
    #[error("{0:?} iterators only support forward propagation")]
    IteratorRequiresFprop(IteratorAlgorithm),
    #[error("{0:?} swizzling only applies to dgrad convolutions")]
    SwizzleRequiresDgrad(SwizzlingFunctor),
    #[error("split-k serial GEMM cannot run as a persistent kernel")]
    SplitKPersistent,
    #[error("invalid problem size: {0}")]
    ProblemSize(String),
    #[error("problem `{problem}` does not fit the descriptor: {reason}")]
    ProblemMismatch {
        problem: String,
        reason: String,
    },
}
