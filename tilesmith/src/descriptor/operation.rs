use std::fmt;

use serde::{Deserialize, Serialize};

use super::{EpilogueFunctor, MathInstruction, SwizzlingFunctor, TensorDescription, TileDescription};

/// Target SM generation, e.g. `Architecture(80)` for sm80.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Architecture(pub u32);

impl Architecture {
    pub const SM75: Architecture = Architecture(75);
    pub const SM80: Architecture = Architecture(80);
    pub const SM86: Architecture = Architecture(86);
    pub const SM89: Architecture = Architecture(89);
    pub const SM90: Architecture = Architecture(90);

    pub fn is_supported_by(
        &self,
        compute_capability: u32,
    ) -> bool {
        self.0 <= compute_capability
    }
}

impl fmt::Display for Architecture {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "sm{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GemmMode {
    Universal,
    SplitKSerial,
}

impl GemmMode {
    pub fn token(&self) -> &'static str {
        match self {
            GemmMode::Universal => "universal",
            GemmMode::SplitKSerial => "splitkserial",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "universal" => Some(GemmMode::Universal),
            "splitkserial" => Some(GemmMode::SplitKSerial),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvKind {
    Fprop,
    Dgrad,
    Wgrad,
}

impl ConvKind {
    pub fn token(&self) -> &'static str {
        match self {
            ConvKind::Fprop => "fprop",
            ConvKind::Dgrad => "dgrad",
            ConvKind::Wgrad => "wgrad",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "fprop" => Some(ConvKind::Fprop),
            "dgrad" => Some(ConvKind::Dgrad),
            "wgrad" => Some(ConvKind::Wgrad),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IteratorAlgorithm {
    Analytic,
    Optimized,
    /// Channel count equals the A/B access width.
    FixedChannels,
    /// Channel count is a small multiple of the A/B access width.
    FewChannels,
}

impl IteratorAlgorithm {
    pub fn token(&self) -> &'static str {
        match self {
            IteratorAlgorithm::Analytic => "analytic",
            IteratorAlgorithm::Optimized => "optimized",
            IteratorAlgorithm::FixedChannels => "fixedchannels",
            IteratorAlgorithm::FewChannels => "fewchannels",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "analytic" => Some(IteratorAlgorithm::Analytic),
            "optimized" => Some(IteratorAlgorithm::Optimized),
            "fixedchannels" => Some(IteratorAlgorithm::FixedChannels),
            "fewchannels" => Some(IteratorAlgorithm::FewChannels),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrideSupport {
    Strided,
    Unity,
}

impl StrideSupport {
    pub fn token(&self) -> &'static str {
        match self {
            StrideSupport::Strided => "strided",
            StrideSupport::Unity => "unity",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "strided" => Some(StrideSupport::Strided),
            "unity" => Some(StrideSupport::Unity),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConvDescription {
    pub conv_kind: ConvKind,
    pub iterator_algorithm: IteratorAlgorithm,
    pub stride_support: StrideSupport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Gemm {
        mode: GemmMode,
    },
    Conv2d(ConvDescription),
}

impl OperationKind {
    pub fn is_gemm(&self) -> bool {
        matches!(self, OperationKind::Gemm { .. })
    }

    pub fn conv(&self) -> Option<&ConvDescription> {
        match self {
            OperationKind::Conv2d(description) => Some(description),
            OperationKind::Gemm {
                ..
            } => None,
        }
    }
}

/// Complete description of one kernel specialization. Equal descriptors denote the same kernel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationDescriptor {
    pub kind: OperationKind,
    pub architecture: Architecture,
    pub tile: TileDescription,
    pub a: TensorDescription,
    pub b: TensorDescription,
    pub c: TensorDescription,
    pub epilogue: EpilogueFunctor,
    pub swizzle: SwizzlingFunctor,
}

impl OperationDescriptor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        kind: OperationKind,
        architecture: Architecture,
        tile: TileDescription,
        a: TensorDescription,
        b: TensorDescription,
        c: TensorDescription,
        epilogue: EpilogueFunctor,
        swizzle: SwizzlingFunctor,
    ) -> Self {
        Self {
            kind,
            architecture,
            tile,
            a,
            b,
            c,
            epilogue,
            swizzle,
        }
    }

    pub fn math_instruction(&self) -> &MathInstruction {
        &self.tile.math_instruction
    }

    pub fn operands(&self) -> [(&'static str, &TensorDescription); 3] {
        [("A", &self.a), ("B", &self.b), ("C", &self.c)]
    }
}
