#![allow(dead_code)]

use std::sync::Arc;

use tilesmith::{
    DataType, Engine, EngineConfig,
    allocator::{FallbackPolicy, PoolConfig},
    backends::host::HostDeviceConfig,
    descriptor::{
        Architecture, ConvDescription, ConvKind, EpilogueFunctor, EpilogueParameters, GemmMode, IteratorAlgorithm,
        Layout, LayoutCombination, MathInstruction, OperationDescriptor, OperationKind, StrideSupport,
        SwizzlingFunctor, TensorDescription, TileDescription, TileShape,
    },
    testbed::TestbedConfig,
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn engine_config(compute_capability: u32) -> EngineConfig {
    EngineConfig {
        device: HostDeviceConfig::default().with_compute_capability(compute_capability),
        pool: PoolConfig::new(64 << 20, 64 << 20, FallbackPolicy::Direct),
        testbed: TestbedConfig::default(),
    }
}

pub fn engine(compute_capability: u32) -> Engine {
    init_logging();
    Engine::new(engine_config(compute_capability)).unwrap()
}

pub fn shared_engine(compute_capability: u32) -> Arc<Engine> {
    Arc::new(engine(compute_capability))
}

/// sm80 SIMT GEMM over `element`, with an f32 (or s32 for integers) accumulator.
pub fn simt_gemm(
    mode: GemmMode,
    layouts: LayoutCombination,
    element: DataType,
    output: DataType,
    epilogue: fn(EpilogueParameters) -> EpilogueFunctor,
) -> OperationDescriptor {
    let accumulator = if element.is_integer() {
        DataType::I32
    } else if element == DataType::F64 {
        DataType::F64
    } else {
        DataType::F32
    };
    let compute = if element == DataType::F64 {
        DataType::F64
    } else {
        DataType::F32
    };
    let (layout_a, layout_b, layout_c) = layouts.layouts();
    OperationDescriptor::new(
        OperationKind::Gemm {
            mode,
        },
        Architecture::SM80,
        TileDescription::new(
            TileShape::new(64, 64, 8),
            3,
            TileShape::new(2, 2, 1),
            MathInstruction::simt(element, accumulator),
        ),
        TensorDescription::new(element, layout_a, 1),
        TensorDescription::new(element, layout_b, 1),
        TensorDescription::new(output, layout_c, 1),
        epilogue(EpilogueParameters::new(output, 1, accumulator, compute)),
        SwizzlingFunctor::Identity1,
    )
}

pub fn f32_gemm(layouts: LayoutCombination) -> OperationDescriptor {
    simt_gemm(GemmMode::Universal, layouts, DataType::F32, DataType::F32, EpilogueFunctor::LinearCombination)
}

/// sm80 f16 tensor-op GEMM with the given accumulator.
pub fn f16_tensor_op_gemm(accumulator: DataType) -> OperationDescriptor {
    let (layout_a, layout_b, layout_c) = LayoutCombination::TNT.layouts();
    OperationDescriptor::new(
        OperationKind::Gemm {
            mode: GemmMode::Universal,
        },
        Architecture::SM80,
        TileDescription::new(
            TileShape::new(128, 128, 32),
            3,
            TileShape::new(2, 2, 1),
            MathInstruction::tensor_op(TileShape::new(16, 8, 16), DataType::F16, accumulator),
        ),
        TensorDescription::new(DataType::F16, layout_a, 8),
        TensorDescription::new(DataType::F16, layout_b, 8),
        TensorDescription::new(DataType::F16, layout_c, 8),
        EpilogueFunctor::LinearCombination(EpilogueParameters::new(DataType::F16, 8, accumulator, accumulator)),
        SwizzlingFunctor::Identity1,
    )
}

/// sm80 f32 SIMT NHWC convolution.
pub fn f32_conv(
    conv_kind: ConvKind,
    swizzle: SwizzlingFunctor,
) -> OperationDescriptor {
    OperationDescriptor::new(
        OperationKind::Conv2d(ConvDescription {
            conv_kind,
            iterator_algorithm: IteratorAlgorithm::Analytic,
            stride_support: StrideSupport::Strided,
        }),
        Architecture::SM80,
        TileDescription::new(TileShape::new(32, 32, 8), 3, TileShape::new(2, 2, 1), MathInstruction::simt(DataType::F32, DataType::F32)),
        TensorDescription::new(DataType::F32, Layout::TensorNhwc, 1),
        TensorDescription::new(DataType::F32, Layout::TensorNhwc, 1),
        TensorDescription::new(DataType::F32, Layout::TensorNhwc, 1),
        EpilogueFunctor::LinearCombination(EpilogueParameters::new(DataType::F32, 1, DataType::F32, DataType::F32)),
        swizzle,
    )
}
