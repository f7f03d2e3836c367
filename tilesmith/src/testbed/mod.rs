mod compare;
mod fill;
mod problem;
mod reference;
mod report;
mod runner;
pub mod scenario;

pub use compare::{Deviation, Mismatch, Tolerance, compare, relative_deviation};
pub use fill::{FillScenario, Operand, fill_operand, fill_scope, max_magnitudes};
pub use problem::{check_problem, operand_bytes, operand_lengths, reduction_depth};
pub use reference::{ReferenceEpilogue, reference_conv2d, reference_gemm, reference_output};
pub use report::{ProblemFailure, RunRecord, SkippedProblem, VerificationOutcome, VerificationReport};
pub use runner::{BatchFailurePolicy, Testbed, TestbedConfig, TestbedError};
