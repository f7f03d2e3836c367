use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{TestbedError, Tolerance, VerificationReport};
use crate::{
    DataType,
    descriptor::{
        Architecture, Conv2dProblemSize, ConvDescription, ConvKind, ConvMode, EpilogueFunctor, EpilogueParameters,
        GemmMode, GemmProblemSize, IteratorAlgorithm, Layout, LayoutCombination, MathInstruction, OperationDescriptor,
        OperationKind, ProblemSize, StrideSupport, SwizzlingFunctor, TensorDescription, TileDescription, TileShape,
    },
    emitter::SpecializationKey,
    engine::Engine,
    error::EngineError,
};

/// One kernel configuration and the problem sizes it is verified on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioRow {
    pub name: String,
    pub descriptor: OperationDescriptor,
    pub problem_sizes: Vec<ProblemSize>,
    #[serde(default)]
    pub tolerance: Option<Tolerance>,
}

#[derive(Debug)]
pub enum ScenarioStatus {
    Verified(VerificationReport),
    BuildFailed(EngineError),
    TestbedFailed(TestbedError),
}

#[derive(Debug)]
pub struct ScenarioOutcome {
    pub name: String,
    pub key: SpecializationKey,
    pub status: ScenarioStatus,
}

impl ScenarioOutcome {
    pub fn report(&self) -> Option<&VerificationReport> {
        match &self.status {
            ScenarioStatus::Verified(report) => Some(report),
            _ => None,
        }
    }

    pub fn passed(&self) -> bool {
        self.report().is_some_and(VerificationReport::passed)
    }

    pub fn skipped(&self) -> bool {
        self.report().is_some_and(VerificationReport::is_skipped)
    }
}

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("failed to read scenario table {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("malformed scenario table: {0}")]
    Parse(#[from] serde_json::Error),
}

pub fn rows_from_json(json: &str) -> Result<Vec<ScenarioRow>, ScenarioError> {
    Ok(serde_json::from_str(json)?)
}

pub fn load_rows(path: &Path) -> Result<Vec<ScenarioRow>, ScenarioError> {
    let json = fs::read_to_string(path).map_err(|source| ScenarioError::Io {
        path: path.display().to_string(),
        source,
    })?;
    rows_from_json(&json)
}

pub fn run_row(
    engine: &Engine,
    row: &ScenarioRow,
    seed: u64,
) -> ScenarioOutcome {
    let key = SpecializationKey::from_descriptor(&row.descriptor);
    let status = match engine.build(&row.descriptor) {
        Err(error) => ScenarioStatus::BuildFailed(error),
        Ok(handle) => match engine.verify_with_tolerance(&handle, &row.problem_sizes, seed, row.tolerance) {
            Ok(report) => ScenarioStatus::Verified(report),
            Err(error) => ScenarioStatus::TestbedFailed(error),
        },
    };
    ScenarioOutcome {
        name: row.name.clone(),
        key,
        status,
    }
}

/// Builds and verifies every row in order. A failing row does not stop the table.
pub fn run_table(
    engine: &Engine,
    rows: &[ScenarioRow],
    seed: u64,
) -> Vec<ScenarioOutcome> {
    rows.iter().map(|row| run_row(engine, row, seed)).collect()
}

pub fn builtin_rows() -> Vec<ScenarioRow> {
    let mut rows = gemm_f64_sm90_rows();
    rows.extend(conv2d_fixed_channels_sm80_rows());
    rows
}

fn gemm_f64_problem_sizes() -> Vec<ProblemSize> {
    vec![
        ProblemSize::gemm(512, 256, 128),
        ProblemSize::gemm(509, 253, 125),
        ProblemSize::Gemm(GemmProblemSize::new(64, 96, 40).with_batch_count(3)),
    ]
}

fn gemm_f64_sm90_row(
    layouts: LayoutCombination,
    instruction: MathInstruction,
    threadblock: TileShape,
    stages: u32,
) -> ScenarioRow {
    let (layout_a, layout_b, layout_c) = layouts.layouts();
    let tile =
        TileDescription::new(threadblock, stages, TileShape::new(2, 2, 1), instruction).with_cluster_shape(TileShape::UNIT);
    let descriptor = OperationDescriptor::new(
        OperationKind::Gemm {
            mode: GemmMode::Universal,
        },
        Architecture::SM90,
        tile,
        TensorDescription::new(DataType::F64, layout_a, 1),
        TensorDescription::new(DataType::F64, layout_b, 1),
        TensorDescription::new(DataType::F64, layout_c, 1),
        EpilogueFunctor::LinearCombination(EpilogueParameters::new(DataType::F64, 1, DataType::F64, DataType::F64)),
        SwizzlingFunctor::Identity1,
    );
    let class = instruction.opcode_class.token();
    ScenarioRow {
        name: format!("gemm_f64_sm90_{}_{class}", format!("{layouts:?}").to_lowercase()),
        descriptor,
        problem_sizes: gemm_f64_problem_sizes(),
        tolerance: None,
    }
}

/// Double-precision GEMMs on sm90: tensor-op NNT and TNN, SIMT NNN and TTT.
pub fn gemm_f64_sm90_rows() -> Vec<ScenarioRow> {
    let tensor_op = MathInstruction::tensor_op(TileShape::new(16, 8, 4), DataType::F64, DataType::F64);
    let simt = MathInstruction::simt(DataType::F64, DataType::F64);
    vec![
        gemm_f64_sm90_row(LayoutCombination::NNT, tensor_op, TileShape::new(128, 128, 32), 3),
        gemm_f64_sm90_row(LayoutCombination::TNN, tensor_op, TileShape::new(128, 128, 32), 3),
        gemm_f64_sm90_row(LayoutCombination::NNN, simt, TileShape::new(128, 128, 8), 2),
        gemm_f64_sm90_row(LayoutCombination::TTT, simt, TileShape::new(64, 128, 8), 2),
    ]
}

fn fixed_channel_problem(
    extent: usize,
    filters: usize,
    filter_size: usize,
    stride: usize,
    channels: usize,
) -> ProblemSize {
    ProblemSize::Conv2d(Conv2dProblemSize {
        n: 1,
        h: extent,
        w: extent,
        c: channels,
        k: filters,
        r: filter_size,
        s: filter_size,
        pad_h: 1,
        pad_w: 1,
        stride_h: stride,
        stride_w: stride,
        dilation_h: 1,
        dilation_w: 1,
        mode: ConvMode::CrossCorrelation,
    })
}

pub fn fixed_channel_problem_sizes(channels: usize) -> Vec<ProblemSize> {
    vec![
        fixed_channel_problem(8, 16, 3, 2, channels),
        fixed_channel_problem(224, 32, 7, 1, channels),
        fixed_channel_problem(224, 64, 7, 2, channels),
        fixed_channel_problem(224, 64, 5, 1, channels),
        fixed_channel_problem(224, 64, 5, 2, channels),
    ]
}

/// f16 NHWC fixed-channels forward convolutions on sm80 with an f32 accumulator.
pub fn conv2d_fixed_channels_sm80_rows() -> Vec<ScenarioRow> {
    [8, 4, 2]
        .into_iter()
        .map(|channels: u32| {
            let instruction = MathInstruction::tensor_op(TileShape::new(16, 8, 16), DataType::F16, DataType::F32);
            let tile = TileDescription::new(TileShape::new(128, 128, 64), 3, TileShape::new(2, 2, 1), instruction);
            let descriptor = OperationDescriptor::new(
                OperationKind::Conv2d(ConvDescription {
                    conv_kind: ConvKind::Fprop,
                    iterator_algorithm: IteratorAlgorithm::FixedChannels,
                    stride_support: StrideSupport::Strided,
                }),
                Architecture::SM80,
                tile,
                TensorDescription::new(DataType::F16, Layout::TensorNhwc, channels),
                TensorDescription::new(DataType::F16, Layout::TensorNhwc, channels),
                TensorDescription::new(DataType::F16, Layout::TensorNhwc, 8),
                EpilogueFunctor::LinearCombination(EpilogueParameters::new(
                    DataType::F16,
                    8,
                    DataType::F32,
                    DataType::F32,
                )),
                SwizzlingFunctor::Identity1,
            );
            ScenarioRow {
                name: format!("conv2d_fprop_fixed_channels_f16_sm80_c{channels}"),
                descriptor,
                problem_sizes: fixed_channel_problem_sizes(channels as usize),
                tolerance: None,
            }
        })
        .collect()
}
