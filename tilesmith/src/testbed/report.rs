use std::time::Duration;

use serde::Serialize;

use super::{Deviation, FillScenario, Tolerance};
use crate::{descriptor::ProblemSize, emitter::SpecializationKey};

/// One problem size and fill scenario that did not match the reference.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProblemFailure {
    pub problem: ProblemSize,
    pub scenario: FillScenario,
    pub deviation: Deviation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum VerificationOutcome {
    Pass,
    Fail(Vec<ProblemFailure>),
    /// A precondition did not hold; nothing was launched.
    Skipped(String),
}

/// A problem size left out of a batch because the device or pool cannot hold it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedProblem {
    pub problem: ProblemSize,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRecord {
    pub problem: ProblemSize,
    pub scenario: FillScenario,
    pub tolerance: Tolerance,
    pub deviation: Deviation,
    pub kernel_time: Duration,
    pub reference_time: Duration,
}

impl RunRecord {
    pub fn passed(&self) -> bool {
        self.deviation.is_match()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationReport {
    pub key: SpecializationKey,
    pub outcome: VerificationOutcome,
    pub runs: Vec<RunRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped_problems: Vec<SkippedProblem>,
}

impl VerificationReport {
    pub fn skipped(
        key: SpecializationKey,
        reason: String,
    ) -> Self {
        Self {
            key,
            outcome: VerificationOutcome::Skipped(reason),
            runs: Vec::new(),
            skipped_problems: Vec::new(),
        }
    }

    pub fn passed(&self) -> bool {
        self.outcome == VerificationOutcome::Pass
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.outcome, VerificationOutcome::Skipped(_))
    }

    pub fn failures(&self) -> &[ProblemFailure] {
        match &self.outcome {
            VerificationOutcome::Fail(failures) => failures,
            _ => &[],
        }
    }

    pub fn max_absolute_deviation(&self) -> f64 {
        self.runs.iter().map(|run| run.deviation.max_absolute).fold(0.0, f64::max)
    }

    pub fn max_relative_deviation(&self) -> f64 {
        self.runs.iter().map(|run| run.deviation.max_relative).fold(0.0, f64::max)
    }
}
