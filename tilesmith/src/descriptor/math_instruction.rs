use serde::{Deserialize, Serialize};

use super::TileShape;
use crate::DataType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpcodeClass {
    Simt,
    TensorOp,
}

impl OpcodeClass {
    pub fn token(&self) -> &'static str {
        match self {
            OpcodeClass::Simt => "simt",
            OpcodeClass::TensorOp => "tensorop",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "simt" => Some(OpcodeClass::Simt),
            "tensorop" => Some(OpcodeClass::TensorOp),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MathOperation {
    MultiplyAdd,
    MultiplyAddSaturate,
}

impl MathOperation {
    pub fn token(&self) -> &'static str {
        match self {
            MathOperation::MultiplyAdd => "madd",
            MathOperation::MultiplyAddSaturate => "maddsat",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "madd" => Some(MathOperation::MultiplyAdd),
            "maddsat" => Some(MathOperation::MultiplyAddSaturate),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MathInstruction {
    pub instruction_shape: TileShape,
    pub element_a: DataType,
    pub element_b: DataType,
    pub element_accumulator: DataType,
    pub opcode_class: OpcodeClass,
    pub math_operation: MathOperation,
}

impl MathInstruction {
    pub fn new(
        instruction_shape: TileShape,
        element_a: DataType,
        element_b: DataType,
        element_accumulator: DataType,
        opcode_class: OpcodeClass,
        math_operation: MathOperation,
    ) -> Self {
        Self {
            instruction_shape,
            element_a,
            element_b,
            element_accumulator,
            opcode_class,
            math_operation,
        }
    }

    /// Scalar FMA instruction used by SIMT kernels.
    pub fn simt(
        element: DataType,
        element_accumulator: DataType,
    ) -> Self {
        Self::new(
            TileShape::UNIT,
            element,
            element,
            element_accumulator,
            OpcodeClass::Simt,
            MathOperation::MultiplyAdd,
        )
    }

    pub fn tensor_op(
        instruction_shape: TileShape,
        element: DataType,
        element_accumulator: DataType,
    ) -> Self {
        Self::new(
            instruction_shape,
            element,
            element,
            element_accumulator,
            OpcodeClass::TensorOp,
            MathOperation::MultiplyAdd,
        )
    }
}
