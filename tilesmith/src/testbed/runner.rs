use std::{collections::BTreeMap, sync::Arc, time::Instant};

use itertools::{Either, Itertools};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{
    FillScenario, ProblemFailure, RunRecord, SkippedProblem, Tolerance, VerificationOutcome, VerificationReport,
    compare::compare,
    fill::{Operand, fill_operand, max_magnitudes},
    problem::{check_problem, operand_bytes, operand_lengths, reduction_depth},
    reference::reference_output,
};
use crate::{
    DataType,
    allocator::{AllocError, FallbackPolicy, GRANULE, MemoryPool, ScopedAllocation},
    array::{ArrayError, decode_elements, encode_elements},
    backends::{BufferRange, DeviceError, LaunchArguments, MemoryKind},
    compile_cache::CompiledKernelHandle,
    descriptor::{OperationDescriptor, ProblemSize},
    emitter::SpecializationKey,
    validator::ConfigurationError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchFailurePolicy {
    /// Stop at the first failing problem size.
    FailFast,
    /// Run every problem size and report all failures.
    Aggregate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestbedConfig {
    pub alpha: f64,
    pub beta: f64,
    pub fill_scenarios: Vec<FillScenario>,
    pub batch_failure_policy: BatchFailurePolicy,
    /// Replaces the default tolerance for outputs of the given element type.
    pub tolerance_overrides: BTreeMap<DataType, Tolerance>,
}

impl Default for TestbedConfig {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            beta: 0.5,
            fill_scenarios: FillScenario::ALL.to_vec(),
            batch_failure_policy: BatchFailurePolicy::Aggregate,
            tolerance_overrides: BTreeMap::new(),
        }
    }
}

impl TestbedConfig {
    pub fn with_fill_scenarios(
        mut self,
        fill_scenarios: Vec<FillScenario>,
    ) -> Self {
        self.fill_scenarios = fill_scenarios;
        self
    }

    pub fn with_batch_failure_policy(
        mut self,
        policy: BatchFailurePolicy,
    ) -> Self {
        self.batch_failure_policy = policy;
        self
    }

    pub fn with_scalars(
        mut self,
        alpha: f64,
        beta: f64,
    ) -> Self {
        self.alpha = alpha;
        self.beta = beta;
        self
    }

    pub fn tolerance_for(
        &self,
        element: DataType,
    ) -> Tolerance {
        self.tolerance_overrides.get(&element).copied().unwrap_or_else(|| Tolerance::for_element(element))
    }
}

#[derive(Debug, Error)]
pub enum TestbedError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("allocation error: {0}")]
    Allocation(#[from] AllocError),
    #[error("operand encoding error: {0}")]
    Encoding(#[from] ArrayError),
    #[error("`{key}` failed at runtime: {reason}")]
    RuntimeLaunchFailure {
        key: SpecializationKey,
        reason: DeviceError,
    },
}

/// Device-resident operands of one run. Everything is released when this goes out of scope.
struct RunBuffers<'a> {
    a: ScopedAllocation<'a>,
    b: ScopedAllocation<'a>,
    c: ScopedAllocation<'a>,
    d: ScopedAllocation<'a>,
    staging: ScopedAllocation<'a>,
}

impl<'a> RunBuffers<'a> {
    fn acquire(
        pool: &'a MemoryPool,
        bytes: [usize; 3],
    ) -> Result<Self, AllocError> {
        let [a, b, c] = bytes;
        let device = |label: &str, size: usize| ScopedAllocation::acquire(pool, label, MemoryKind::Device, size, GRANULE);
        Ok(Self {
            a: device("A", a)?,
            b: device("B", b)?,
            c: device("C", c)?,
            d: device("D", c)?,
            staging: ScopedAllocation::acquire(pool, "staging", MemoryKind::HostPinned, a.max(b).max(c), GRANULE)?,
        })
    }

    fn staging(
        &self,
        length: usize,
    ) -> BufferRange {
        self.staging.data().prefix(length)
    }
}

/// Runs compiled kernels against a direct reference computation and reports the agreement.
pub struct Testbed {
    pool: Arc<MemoryPool>,
    config: TestbedConfig,
}

impl Testbed {
    pub fn new(
        pool: Arc<MemoryPool>,
        config: TestbedConfig,
    ) -> Self {
        Self {
            pool,
            config,
        }
    }

    pub fn config(&self) -> &TestbedConfig {
        &self.config
    }

    pub fn pool(&self) -> &Arc<MemoryPool> {
        &self.pool
    }

    pub fn verify(
        &self,
        handle: &CompiledKernelHandle,
        problems: &[ProblemSize],
        seed: u64,
    ) -> Result<VerificationReport, TestbedError> {
        self.verify_with_tolerance(handle, problems, seed, None)
    }

    /// Like [`Testbed::verify`], with `tolerance` taking precedence over the configured bands.
    pub fn verify_with_tolerance(
        &self,
        handle: &CompiledKernelHandle,
        problems: &[ProblemSize],
        seed: u64,
        tolerance: Option<Tolerance>,
    ) -> Result<VerificationReport, TestbedError> {
        let descriptor = handle.descriptor();
        for problem in problems {
            check_problem(descriptor, problem)?;
        }
        if let Some(reason) = self.architecture_skip(descriptor) {
            log::info!("Skipping `{}`: {reason}", handle.key());
            return Ok(VerificationReport::skipped(handle.key().clone(), reason));
        }

        let (runnable, skipped_problems): (Vec<&ProblemSize>, Vec<SkippedProblem>) =
            problems.iter().partition_map(|problem| match self.capacity_skip(descriptor, problem) {
                Some(reason) => Either::Right(SkippedProblem {
                    problem: *problem,
                    reason,
                }),
                None => Either::Left(problem),
            });
        for skipped in &skipped_problems {
            log::info!("Skipping {} for `{}`: {}", skipped.problem, handle.key(), skipped.reason);
        }
        if runnable.is_empty() && !skipped_problems.is_empty() {
            let reason = skipped_problems.iter().map(|skipped| skipped.reason.as_str()).join("; ");
            return Ok(VerificationReport {
                skipped_problems,
                ..VerificationReport::skipped(handle.key().clone(), reason)
            });
        }

        let tolerance = tolerance.unwrap_or_else(|| self.config.tolerance_for(descriptor.c.element));
        let scenarios: &[FillScenario] = if self.config.fill_scenarios.is_empty() {
            &[FillScenario::Random]
        } else {
            &self.config.fill_scenarios
        };

        let mut runs = Vec::with_capacity(runnable.len() * scenarios.len());
        let mut failures = Vec::new();
        for (problem, &scenario) in runnable.into_iter().cartesian_product(scenarios) {
            let record = self.run(handle, problem, scenario, seed, tolerance)?;
            if !record.passed() {
                log::warn!(
                    "`{}` mismatched on {problem} ({}): {} of {} elements, max relative deviation {:e}",
                    handle.key(),
                    scenario.name(),
                    record.deviation.mismatches,
                    record.deviation.compared,
                    record.deviation.max_relative
                );
                failures.push(ProblemFailure {
                    problem: *problem,
                    scenario,
                    deviation: record.deviation.clone(),
                });
            }
            runs.push(record);
            if !failures.is_empty() && self.config.batch_failure_policy == BatchFailurePolicy::FailFast {
                break;
            }
        }

        let outcome = if failures.is_empty() {
            VerificationOutcome::Pass
        } else {
            VerificationOutcome::Fail(failures)
        };
        log::debug!(
            "Verified `{}` over {} runs ({} problems skipped): {}",
            handle.key(),
            runs.len(),
            skipped_problems.len(),
            outcome_label(&outcome)
        );
        Ok(VerificationReport {
            key: handle.key().clone(),
            outcome,
            runs,
            skipped_problems,
        })
    }

    fn architecture_skip(
        &self,
        descriptor: &OperationDescriptor,
    ) -> Option<String> {
        let device = self.pool.device();
        let compute_capability = device.compute_capability();
        if descriptor.architecture.is_supported_by(compute_capability) {
            return None;
        }
        Some(format!(
            "kernel targets {} but device `{}` is sm{compute_capability}",
            descriptor.architecture,
            device.name()
        ))
    }

    /// Why `problem` cannot be staged on this device and pool, if it cannot.
    fn capacity_skip(
        &self,
        descriptor: &OperationDescriptor,
        problem: &ProblemSize,
    ) -> Option<String> {
        let device = self.pool.device();
        let fallback = self.pool.fallback_policy();
        let bytes = operand_bytes(descriptor, problem);
        // D is allocated alongside A, B and C.
        let device_bytes =
            bytes.iter().map(|size| MemoryPool::footprint(*size)).sum::<usize>() + MemoryPool::footprint(bytes[2]);
        let device_capacity = self.pool.capacity(MemoryKind::Device);
        if device_bytes > device_capacity && (fallback == FallbackPolicy::Fail || device_bytes > device.total_memory())
        {
            return Some(format!(
                "{problem} needs {device_bytes} device bytes, pool holds {device_capacity} and device {}",
                device.total_memory()
            ));
        }

        let staging_bytes = MemoryPool::footprint(bytes.into_iter().max().unwrap_or(0));
        let host_capacity = self.pool.capacity(MemoryKind::HostPinned);
        if staging_bytes > host_capacity && fallback == FallbackPolicy::Fail {
            return Some(format!("{problem} needs {staging_bytes} staging bytes, host pool holds {host_capacity}"));
        }
        None
    }

    fn run(
        &self,
        handle: &CompiledKernelHandle,
        problem: &ProblemSize,
        scenario: FillScenario,
        seed: u64,
        tolerance: Tolerance,
    ) -> Result<RunRecord, TestbedError> {
        let descriptor = handle.descriptor();
        let device = self.pool.device();
        let launch_failure = |reason: DeviceError| TestbedError::RuntimeLaunchFailure {
            key: handle.key().clone(),
            reason,
        };

        let lengths = operand_lengths(descriptor, problem);
        let elements = [descriptor.a.element, descriptor.b.element, descriptor.c.element];
        let magnitudes = max_magnitudes(descriptor, reduction_depth(descriptor, problem));
        let mut encoded = Vec::with_capacity(3);
        let mut decoded = Vec::with_capacity(3);
        for (((operand, element), length), magnitude) in
            [Operand::A, Operand::B, Operand::C].into_iter().zip(elements).zip(lengths).zip(magnitudes)
        {
            let values = fill_operand(operand, element, length, scenario, magnitude, seed);
            let bytes = encode_elements(element, &values)?;
            decoded.push(decode_elements(element, &bytes)?);
            encoded.push(bytes);
        }

        let started = Instant::now();
        let reference = reference_output(
            descriptor,
            problem,
            [&decoded[0], &decoded[1], &decoded[2]],
            self.config.alpha,
            self.config.beta,
        )?;
        let reference_time = started.elapsed();

        let buffers = RunBuffers::acquire(&self.pool, operand_bytes(descriptor, problem))?;
        for (bytes, destination) in encoded.iter().zip([buffers.a.data(), buffers.b.data(), buffers.c.data()]) {
            let staging = buffers.staging(bytes.len());
            device.write(staging, bytes).map_err(launch_failure)?;
            device.copy(staging, destination).map_err(launch_failure)?;
        }

        let arguments = LaunchArguments {
            problem: *problem,
            a: buffers.a.data(),
            b: buffers.b.data(),
            c: buffers.c.data(),
            d: buffers.d.data(),
            alpha: self.config.alpha,
            beta: self.config.beta,
        };
        let started = Instant::now();
        let token = device.launch(handle.kernel(), &arguments).map_err(launch_failure)?;
        device.synchronize(token).map_err(launch_failure)?;
        let kernel_time = started.elapsed();

        let output_length = buffers.d.data().length;
        let staging = buffers.staging(output_length);
        let mut output_bytes = vec![0; output_length];
        device.copy(buffers.d.data(), staging).map_err(launch_failure)?;
        device.read(staging, &mut output_bytes).map_err(launch_failure)?;
        drop(buffers);
        let output = decode_elements(descriptor.c.element, &output_bytes)?;

        let deviation = compare(&output, &reference, tolerance);
        log::debug!(
            "{problem} ({}): kernel {kernel_time:.2?}, reference {reference_time:.2?}, max abs {:e}",
            scenario.name(),
            deviation.max_absolute
        );
        Ok(RunRecord {
            problem: *problem,
            scenario,
            tolerance,
            deviation,
            kernel_time,
            reference_time,
        })
    }
}

fn outcome_label(outcome: &VerificationOutcome) -> &'static str {
    match outcome {
        VerificationOutcome::Pass => "pass",
        VerificationOutcome::Fail(_) => "fail",
        VerificationOutcome::Skipped(_) => "skipped",
    }
}
