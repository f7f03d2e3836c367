mod conv;
mod gemm;
mod tiling;

use std::any::Any;

use conv::Conv2dOperands;
use gemm::GemmOperands;
use tiling::TiledSchedule;

use crate::{
    backends::common::{DeviceKernel, KernelImage},
    descriptor::{GemmMode, OperationDescriptor, OperationKind, ProblemSize, StrideSupport},
};

/// Decoded operand values handed to a host kernel.
pub(crate) struct HostOperands<'a> {
    pub a: &'a [f64],
    pub b: &'a [f64],
    pub c: &'a [f64],
}

/// Kernel loaded on a [`super::HostDevice`]. Executes the descriptor's tiled schedule on the CPU.
#[derive(Debug)]
pub struct HostKernel {
    entry_point: String,
    descriptor: OperationDescriptor,
    workers: usize,
}

impl HostKernel {
    pub(crate) fn new(
        image: &KernelImage,
        workers: usize,
    ) -> Self {
        Self {
            entry_point: image.entry_point.clone(),
            descriptor: image.descriptor.clone(),
            workers,
        }
    }

    /// Element counts of the A, B and C/D operands for `problem`.
    pub fn operand_lengths(
        &self,
        problem: &ProblemSize,
    ) -> Result<[usize; 3], String> {
        match (&self.descriptor.kind, problem) {
            (OperationKind::Gemm {
                ..
            }, ProblemSize::Gemm(problem)) => Ok(GemmOperands::operand_lengths(problem)),
            (OperationKind::Conv2d(conv), ProblemSize::Conv2d(problem)) => {
                Ok(Conv2dOperands::operand_lengths(problem, conv.conv_kind))
            },
            _ => Err(format!("`{}` cannot run problem {problem}", self.entry_point)),
        }
    }

    fn schedule(
        &self,
        split_k_slices: usize,
    ) -> TiledSchedule {
        TiledSchedule {
            threadblock: self.descriptor.tile.threadblock_shape,
            swizzle: self.descriptor.swizzle,
            accumulator: self.descriptor.math_instruction().element_accumulator,
            epilogue: self.descriptor.epilogue,
            split_k_slices,
            workers: self.workers,
        }
    }

    pub(crate) fn execute(
        &self,
        problem: &ProblemSize,
        operands: HostOperands<'_>,
        alpha: f64,
        beta: f64,
    ) -> Result<Vec<f64>, String> {
        let lengths = self.operand_lengths(problem)?;
        for ((name, expected), actual) in
            ["A", "B", "C"].into_iter().zip(lengths).zip([operands.a.len(), operands.b.len(), operands.c.len()])
        {
            if actual < expected {
                return Err(format!("operand {name} holds {actual} elements, problem {problem} needs {expected}"));
            }
        }
        let mut output = vec![0.0; lengths[2]];

        match (&self.descriptor.kind, problem) {
            (OperationKind::Gemm {
                mode,
            }, ProblemSize::Gemm(problem)) => {
                if *mode == GemmMode::Universal && problem.split_k_slices > 1 {
                    return Err(format!("universal GEMM cannot split K into {} slices", problem.split_k_slices));
                }
                let gemm = GemmOperands {
                    problem: *problem,
                    layout_a: self.descriptor.a.layout,
                    layout_b: self.descriptor.b.layout,
                    layout_c: self.descriptor.c.layout,
                    a: operands.a,
                    b: operands.b,
                };
                self.schedule(problem.split_k_slices).run(&gemm, operands.c, alpha, beta, &mut output);
            },
            (OperationKind::Conv2d(conv), ProblemSize::Conv2d(problem)) => {
                if conv.stride_support == StrideSupport::Unity && !problem.is_unit_stride() {
                    return Err("kernel only supports unit stride".to_string());
                }
                let gemm = Conv2dOperands::new(*problem, conv.conv_kind, operands.a, operands.b);
                self.schedule(1).run(&gemm, operands.c, alpha, beta, &mut output);
            },
            _ => return Err(format!("`{}` cannot run problem {problem}", self.entry_point)),
        }
        Ok(output)
    }
}

impl DeviceKernel for HostKernel {
    fn entry_point(&self) -> &str {
        &self.entry_point
    }

    fn descriptor(&self) -> &OperationDescriptor {
        &self.descriptor
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
