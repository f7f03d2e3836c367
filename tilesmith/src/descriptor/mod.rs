mod epilogue;
mod math_instruction;
mod operation;
mod problem_size;
mod swizzle;
mod tensor_description;
mod tile_description;
mod tile_shape;

pub use epilogue::{EpilogueFunctor, EpilogueParameters};
pub use math_instruction::{MathInstruction, MathOperation, OpcodeClass};
pub use operation::{
    Architecture, ConvDescription, ConvKind, GemmMode, IteratorAlgorithm, OperationDescriptor, OperationKind,
    StrideSupport,
};
pub use problem_size::{Conv2dProblemSize, ConvMode, GemmExtent, GemmProblemSize, ProblemSize};
pub use swizzle::{SwizzlingFunctor, TileCoord};
pub use tensor_description::{Layout, LayoutCombination, TensorDescription};
pub use tile_description::TileDescription;
pub use tile_shape::TileShape;
