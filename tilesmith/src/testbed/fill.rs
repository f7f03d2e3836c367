use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

use crate::{
    DataType,
    descriptor::{EpilogueFunctor, OperationDescriptor},
};

/// Fraction of the output range a maximal-magnitude run may reach, leaving room for the
/// epilogue scalars.
const MAGNITUDE_HEADROOM: f64 = 8.0;

/// How operand values are generated for one verification run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillScenario {
    /// Uniform integers within the element's fill scope.
    Random,
    /// All zeros.
    Zero,
    /// The largest powers of two whose full-depth dot products stay representable, with
    /// random signs. See [`max_magnitudes`].
    MaxMagnitude,
}

impl FillScenario {
    pub const ALL: [FillScenario; 3] = [FillScenario::Random, FillScenario::Zero, FillScenario::MaxMagnitude];

    pub fn name(&self) -> &'static str {
        match self {
            FillScenario::Random => "random",
            FillScenario::Zero => "zero",
            FillScenario::MaxMagnitude => "max_magnitude",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    A,
    B,
    C,
}

impl Operand {
    fn salt(&self) -> u64 {
        match self {
            Operand::A => 0x9e37_79b9_7f4a_7c15,
            Operand::B => 0xbf58_476d_1ce4_e5b9,
            Operand::C => 0x94d0_49bb_1331_11eb,
        }
    }
}

/// Largest magnitude a fill draws for `data_type`. Small enough that dot products of
/// integer-valued operands stay exact in the accumulator.
pub fn fill_scope(data_type: DataType) -> i64 {
    match data_type {
        DataType::F16 | DataType::BF16 => 2,
        DataType::F32 => 4,
        DataType::F64 => 8,
        DataType::I4 | DataType::U4 => 2,
        DataType::I8 => 2,
        DataType::U8 => 4,
        _ => 8,
    }
}

fn power_of_two_below(
    data_type: DataType,
    bound: f64,
) -> f64 {
    let bound = bound.min(data_type.max_value());
    let power = 2f64.powi(bound.log2().floor() as i32);
    if data_type.is_integer() {
        power.max(1.0)
    } else {
        power
    }
}

/// Magnitudes of A, B and C for [`FillScenario::MaxMagnitude`] on a reduction of `depth` terms.
///
/// Every value is a power of two, so products and partial sums stay exact in the
/// accumulator. A dot product over the full depth plus the scaled source stays within an
/// eighth of the accumulator range, and of the output range unless the output saturates
/// (integers, clamping epilogues).
pub fn max_magnitudes(
    descriptor: &OperationDescriptor,
    depth: usize,
) -> [f64; 3] {
    let output = descriptor.c.element;
    let accumulator = descriptor.math_instruction().element_accumulator;
    let saturating =
        output.is_integer() || matches!(descriptor.epilogue, EpilogueFunctor::LinearCombinationClamp(_));
    let range = if saturating {
        accumulator.max_value()
    } else {
        accumulator.max_value().min(output.max_value())
    };

    let product = range / MAGNITUDE_HEADROOM / depth.max(1) as f64;
    let a = power_of_two_below(descriptor.a.element, product.sqrt());
    let b = power_of_two_below(descriptor.b.element, product / a);
    let c = power_of_two_below(output, a * b);
    [a, b, c]
}

/// Contents of `operand`, identical for identical inputs. `magnitude` is the value
/// [`FillScenario::MaxMagnitude`] draws; the other scenarios ignore it.
pub fn fill_operand(
    operand: Operand,
    data_type: DataType,
    length: usize,
    scenario: FillScenario,
    magnitude: f64,
    seed: u64,
) -> Vec<f64> {
    let scope = fill_scope(data_type);
    let low = if data_type.is_signed() {
        -scope
    } else {
        0
    };
    let mut rng = StdRng::seed_from_u64(seed ^ operand.salt());

    match scenario {
        FillScenario::Zero => vec![0.0; length],
        FillScenario::Random => (0..length).map(|_| rng.gen_range(low..=scope) as f64).collect(),
        FillScenario::MaxMagnitude => (0..length)
            .map(|_| {
                if low < 0 && rng.gen_bool(0.5) {
                    -magnitude
                } else {
                    magnitude
                }
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{
        Architecture, EpilogueParameters, GemmMode, Layout, MathInstruction, OperationKind, SwizzlingFunctor, TensorDescription,
        TileDescription, TileShape,
    };

    fn gemm(
        element: DataType,
        accumulator: DataType,
        output: DataType,
        epilogue: fn(EpilogueParameters) -> EpilogueFunctor,
    ) -> OperationDescriptor {
        OperationDescriptor::new(
            OperationKind::Gemm {
                mode: GemmMode::Universal,
            },
            Architecture::SM80,
            TileDescription::new(
                TileShape::new(64, 64, 8),
                3,
                TileShape::new(2, 2, 1),
                MathInstruction::simt(element, accumulator),
            ),
            TensorDescription::new(element, Layout::RowMajor, 1),
            TensorDescription::new(element, Layout::RowMajor, 1),
            TensorDescription::new(output, Layout::RowMajor, 1),
            epilogue(EpilogueParameters::new(output, 1, accumulator, DataType::F32)),
            SwizzlingFunctor::Identity1,
        )
    }

    #[test]
    fn fills_are_deterministic_per_seed() {
        let first = fill_operand(Operand::A, DataType::F16, 64, FillScenario::Random, 1.0, 7);
        let second = fill_operand(Operand::A, DataType::F16, 64, FillScenario::Random, 1.0, 7);
        let other_operand = fill_operand(Operand::B, DataType::F16, 64, FillScenario::Random, 1.0, 7);
        assert_eq!(first, second);
        assert_ne!(first, other_operand);
    }

    #[test]
    fn values_stay_within_scope() {
        for data_type in [DataType::F16, DataType::F64, DataType::I8, DataType::U8] {
            let scope = fill_scope(data_type) as f64;
            let values = fill_operand(Operand::C, data_type, 256, FillScenario::Random, 1.0, 3);
            assert!(values.iter().all(|value| value.abs() <= scope && value.fract() == 0.0));
        }
        let unsigned = fill_operand(Operand::A, DataType::U8, 256, FillScenario::MaxMagnitude, 128.0, 3);
        assert!(unsigned.iter().all(|value| *value == 128.0));
    }

    #[test]
    fn max_magnitude_uses_both_signs() {
        let values = fill_operand(Operand::B, DataType::F32, 128, FillScenario::MaxMagnitude, 1024.0, 11);
        assert!(values.iter().all(|value| value.abs() == 1024.0));
        assert!(values.iter().any(|value| *value < 0.0));
        assert!(values.iter().any(|value| *value > 0.0));
    }

    #[test]
    fn half_precision_magnitudes_fill_the_output_range() {
        let descriptor = gemm(DataType::F16, DataType::F32, DataType::F16, EpilogueFunctor::LinearCombination);
        let [a, b, c] = max_magnitudes(&descriptor, 48);
        assert_eq!([a, b, c], [8.0, 16.0, 128.0]);
        // The worst dot product plus the source stays finite in f16.
        assert!(48.0 * a * b + c < DataType::F16.max_value());
        // Far beyond the scope random fills draw from.
        assert!(a * b > (fill_scope(DataType::F16) * fill_scope(DataType::F16)) as f64);
    }

    #[test]
    fn double_precision_magnitudes_reach_the_exponent_range() {
        let descriptor = gemm(DataType::F64, DataType::F64, DataType::F64, EpilogueFunctor::LinearCombination);
        let [a, b, c] = max_magnitudes(&descriptor, 128);
        assert!(a > 1e150 && b > 1e150);
        assert_eq!(a.log2().fract(), 0.0);
        assert!((128.0 * a * b).is_finite());
        assert_eq!(c, a * b);
    }

    #[test]
    fn saturating_outputs_are_bounded_by_the_accumulator() {
        let clamped = gemm(DataType::I8, DataType::I32, DataType::I8, EpilogueFunctor::LinearCombinationClamp);
        assert_eq!(max_magnitudes(&clamped, 96), [64.0, 64.0, 64.0]);

        let wide = gemm(DataType::I8, DataType::I32, DataType::I32, EpilogueFunctor::LinearCombination);
        let [a, b, c] = max_magnitudes(&wide, 96);
        assert_eq!([a, b, c], [64.0, 64.0, 4096.0]);
        assert!(96.0 * a * b + c < DataType::I32.max_value());
    }
}
