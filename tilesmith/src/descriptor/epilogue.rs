use serde::{Deserialize, Serialize};

use crate::DataType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EpilogueParameters {
    pub element_output: DataType,
    pub alignment: u32,
    pub element_accumulator: DataType,
    pub element_compute: DataType,
}

impl EpilogueParameters {
    pub fn new(
        element_output: DataType,
        alignment: u32,
        element_accumulator: DataType,
        element_compute: DataType,
    ) -> Self {
        Self {
            element_output,
            alignment,
            element_accumulator,
            element_compute,
        }
    }
}

/// Output-combination policy applied after the main loop: `D = op(alpha * acc + beta * C)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "parameters", rename_all = "snake_case")]
pub enum EpilogueFunctor {
    LinearCombination(EpilogueParameters),
    LinearCombinationClamp(EpilogueParameters),
    LinearCombinationRelu(EpilogueParameters),
}

impl EpilogueFunctor {
    pub fn parameters(&self) -> &EpilogueParameters {
        match self {
            EpilogueFunctor::LinearCombination(parameters)
            | EpilogueFunctor::LinearCombinationClamp(parameters)
            | EpilogueFunctor::LinearCombinationRelu(parameters) => parameters,
        }
    }

    pub fn token(&self) -> &'static str {
        match self {
            EpilogueFunctor::LinearCombination(_) => "lincomb",
            EpilogueFunctor::LinearCombinationClamp(_) => "lincombclamp",
            EpilogueFunctor::LinearCombinationRelu(_) => "lincombrelu",
        }
    }

    pub fn from_token(
        token: &str,
        parameters: EpilogueParameters,
    ) -> Option<Self> {
        match token {
            "lincomb" => Some(EpilogueFunctor::LinearCombination(parameters)),
            "lincombclamp" => Some(EpilogueFunctor::LinearCombinationClamp(parameters)),
            "lincombrelu" => Some(EpilogueFunctor::LinearCombinationRelu(parameters)),
            _ => None,
        }
    }

    /// Evaluates one output element. `accumulator` must already hold a value of the
    /// accumulator type; the result is rounded to the output element type.
    pub fn apply(
        &self,
        accumulator: f64,
        source: f64,
        alpha: f64,
        beta: f64,
    ) -> f64 {
        let parameters = self.parameters();
        let compute = parameters.element_compute;

        let scaled_accumulator = compute.round(compute.round(alpha) * compute.round(accumulator));
        let scaled_source = compute.round(compute.round(beta) * compute.round(source));
        let combined = compute.round(scaled_accumulator + scaled_source);

        let output = parameters.element_output;
        let activated = match self {
            EpilogueFunctor::LinearCombination(_) => combined,
            EpilogueFunctor::LinearCombinationClamp(_) => {
                combined.clamp(output.min_value(), output.max_value())
            },
            EpilogueFunctor::LinearCombinationRelu(_) => combined.max(0.0),
        };
        output.round(activated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parameters(output: DataType) -> EpilogueParameters {
        EpilogueParameters::new(output, 1, DataType::I32, DataType::F32)
    }

    #[test]
    fn clamp_saturates_to_output_range() {
        let epilogue = EpilogueFunctor::LinearCombinationClamp(parameters(DataType::I8));
        assert_eq!(epilogue.apply(1000.0, 0.0, 1.0, 0.0), 127.0);
        assert_eq!(epilogue.apply(-1000.0, 0.0, 1.0, 0.0), -128.0);
    }

    #[test]
    fn relu_zeroes_negative_results() {
        let epilogue = EpilogueFunctor::LinearCombinationRelu(parameters(DataType::F32));
        assert_eq!(epilogue.apply(-3.0, 1.0, 1.0, 1.0), 0.0);
        assert_eq!(epilogue.apply(3.0, 1.0, 2.0, 1.0), 7.0);
    }

    #[test]
    fn linear_combination_rounds_to_output_type() {
        let epilogue = EpilogueFunctor::LinearCombination(EpilogueParameters::new(
            DataType::F16,
            8,
            DataType::F32,
            DataType::F32,
        ));
        assert_eq!(epilogue.apply(2049.0, 0.0, 1.0, 0.0), 2048.0);
        assert_eq!(epilogue.apply(10.0, 4.0, 1.0, 0.5), 12.0);
    }
}
