mod common;

use std::collections::HashSet;

use common::engine;
use proptest::{
    prelude::*,
    sample::{Index, select},
};
use tilesmith::{
    DataType, EngineError,
    descriptor::{
        Architecture, EpilogueFunctor, EpilogueParameters, GemmMode, Layout, MathInstruction, OperationDescriptor,
        OperationKind, SwizzlingFunctor, TensorDescription, TileDescription, TileShape,
    },
    validator::validate,
};

/// Instructions the sm80 host catalog accepts, with the alignments their operands may use.
/// The f16 accumulator validates but is rejected at instantiation.
fn instruction() -> impl Strategy<Value = (MathInstruction, Vec<u32>)> {
    select(vec![
        (MathInstruction::simt(DataType::F32, DataType::F32), vec![1]),
        (MathInstruction::simt(DataType::F64, DataType::F64), vec![1]),
        (MathInstruction::tensor_op(TileShape::new(16, 8, 16), DataType::F16, DataType::F32), vec![1, 2, 4, 8]),
        (MathInstruction::tensor_op(TileShape::new(16, 8, 16), DataType::F16, DataType::F16), vec![8]),
        (MathInstruction::tensor_op(TileShape::new(8, 8, 4), DataType::F64, DataType::F64), vec![1, 2]),
    ])
}

fn matrix_layout() -> impl Strategy<Value = Layout> {
    select(vec![Layout::RowMajor, Layout::ColumnMajor])
}

/// GEMM descriptors that pass every validation rule. The threadblock is a multiple of
/// warp count times instruction shape, so every offered alignment divides it.
fn valid_descriptor() -> impl Strategy<Value = OperationDescriptor> {
    (
        instruction(),
        select(vec![Architecture::SM80, Architecture::SM86]),
        select(vec![GemmMode::Universal, GemmMode::SplitKSerial]),
        (1..=2u32, 1..=2u32),
        (1..=4u32, 1..=4u32, 1..=4u32),
        2..=4u32,
        [matrix_layout(), matrix_layout(), matrix_layout()],
        [any::<Index>(), any::<Index>(), any::<Index>()],
        0..3usize,
        select(SwizzlingFunctor::ALL.into_iter().filter(|swizzle| !swizzle.is_strided_dgrad()).collect::<Vec<_>>()),
    )
        .prop_map(
            |(
                (instruction, alignments),
                architecture,
                mode,
                (warps_m, warps_n),
                (repeat_m, repeat_n, repeat_k),
                stages,
                layouts,
                alignment_picks,
                functor,
                swizzle,
            )| {
                let shape = instruction.instruction_shape;
                let warp_count = TileShape::new(warps_m, warps_n, 1);
                let threadblock =
                    TileShape::new(warps_m * shape.m * repeat_m, warps_n * shape.n * repeat_n, shape.k * repeat_k);
                let element = instruction.element_a;
                let accumulator = instruction.element_accumulator;
                let [a, b, c] = [0, 1, 2].map(|operand| {
                    TensorDescription::new(element, layouts[operand], *alignment_picks[operand].get(&alignments))
                });
                let parameters = EpilogueParameters::new(c.element, c.alignment, accumulator, accumulator);
                let epilogue = match functor {
                    0 => EpilogueFunctor::LinearCombination(parameters),
                    1 => EpilogueFunctor::LinearCombinationClamp(parameters),
                    _ => EpilogueFunctor::LinearCombinationRelu(parameters),
                };
                OperationDescriptor::new(
                    OperationKind::Gemm {
                        mode,
                    },
                    architecture,
                    TileDescription::new(threadblock, stages, warp_count, instruction),
                    a,
                    b,
                    c,
                    epilogue,
                    swizzle,
                )
            },
        )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn interleaved_builds_round_trip_and_share_kernels(
        descriptors in proptest::collection::vec(valid_descriptor(), 1..8),
    ) {
        let engine = engine(80);
        let mut first_builds = Vec::with_capacity(descriptors.len());
        for descriptor in &descriptors {
            prop_assert_eq!(validate(descriptor), Ok(()));
            let built = engine.build(descriptor);
            match &built {
                Ok(handle) => {
                    prop_assert_eq!(OperationDescriptor::from_key(handle.key().as_str()), Ok(descriptor.clone()));
                    prop_assert_eq!(handle.descriptor(), descriptor);
                },
                Err(EngineError::Compilation(error)) => {
                    prop_assert_eq!(&error.key, &descriptor.specialization_key());
                },
                Err(other) => {
                    prop_assert!(false, "unexpected build error: {}", other);
                },
            }
            first_builds.push(built);
        }

        let distinct: HashSet<_> = descriptors.iter().map(OperationDescriptor::specialization_key).collect();
        let compilations = engine.cache().compilations();
        prop_assert_eq!(compilations, distinct.len());
        prop_assert_eq!(engine.cache().len(), distinct.len());

        for (descriptor, first) in descriptors.iter().zip(&first_builds).rev() {
            match (first, engine.build(descriptor)) {
                (Ok(handle), Ok(again)) => {
                    prop_assert!(handle.same_kernel(&again), "`{}` was compiled twice", handle.key());
                },
                (Err(EngineError::Compilation(error)), Err(EngineError::Compilation(again))) => {
                    prop_assert_eq!(&error.key, &again.key);
                },
                (_, again) => {
                    prop_assert!(
                        false,
                        "rebuilding `{}` changed the outcome to ok = {}",
                        descriptor.specialization_key(),
                        again.is_ok()
                    );
                },
            }
        }
        prop_assert_eq!(engine.cache().compilations(), compilations);
    }
}
