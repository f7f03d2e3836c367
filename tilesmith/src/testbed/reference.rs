use std::thread;

use super::problem::operand_lengths;
use crate::{
    descriptor::{
        Conv2dProblemSize, ConvKind, ConvMode, EpilogueFunctor, GemmProblemSize, Layout, OperationDescriptor,
        OperationKind, ProblemSize,
    },
    validator::ConfigurationError,
};

/// Scalars and epilogue shared by every reference computation.
#[derive(Debug, Clone, Copy)]
pub struct ReferenceEpilogue {
    pub functor: EpilogueFunctor,
    pub alpha: f64,
    pub beta: f64,
}

impl ReferenceEpilogue {
    /// `op(alpha * accumulator + beta * source)` in f64, rounded once to the output type.
    pub fn apply(
        &self,
        accumulator: f64,
        source: f64,
    ) -> f64 {
        let output = self.functor.parameters().element_output;
        let combined = self.alpha * accumulator + self.beta * source;
        let activated = match self.functor {
            EpilogueFunctor::LinearCombination(_) => combined,
            EpilogueFunctor::LinearCombinationClamp(_) => combined.clamp(output.min_value(), output.max_value()),
            EpilogueFunctor::LinearCombinationRelu(_) => combined.max(0.0),
        };
        output.round(activated)
    }
}

/// Evaluates `element` for every output index, spread across the available cores.
fn evaluate_elements<F>(
    length: usize,
    element: F,
) -> Vec<f64>
where
    F: Fn(usize) -> f64 + Sync,
{
    let mut output = vec![0.0; length];
    if length == 0 {
        return output;
    }
    let workers = thread::available_parallelism().map(|count| count.get()).unwrap_or(1);
    let chunk = length.div_ceil(workers);
    thread::scope(|scope| {
        for (chunk_index, values) in output.chunks_mut(chunk).enumerate() {
            let element = &element;
            scope.spawn(move || {
                for (offset, value) in values.iter_mut().enumerate() {
                    *value = element(chunk_index * chunk + offset);
                }
            });
        }
    });
    output
}

fn matrix_coordinate(
    layout: Layout,
    offset: usize,
    rows: usize,
    columns: usize,
) -> (usize, usize) {
    match layout {
        Layout::ColumnMajor => (offset % rows, offset / rows),
        _ => (offset / columns, offset % columns),
    }
}

/// `D = op(alpha * A·B + beta * C)` with plain f64 dot products.
pub fn reference_gemm(
    problem: &GemmProblemSize,
    layouts: (Layout, Layout, Layout),
    a: &[f64],
    b: &[f64],
    c: &[f64],
    epilogue: ReferenceEpilogue,
) -> Vec<f64> {
    let GemmProblemSize {
        m,
        n,
        k,
        batch_count,
        ..
    } = *problem;
    let (layout_a, layout_b, layout_c) = layouts;

    evaluate_elements(batch_count * m * n, |index| {
        let batch = index / (m * n);
        let (row, column) = matrix_coordinate(layout_c, index % (m * n), m, n);
        let a = &a[batch * m * k..];
        let b = &b[batch * k * n..];
        let accumulator: f64 = (0..k)
            .map(|depth| a[layout_a.matrix_offset(row, depth, m, k)] * b[layout_b.matrix_offset(depth, column, k, n)])
            .sum();
        epilogue.apply(accumulator, c[index])
    })
}

struct ConvGeometry {
    problem: Conv2dProblemSize,
    p: usize,
    q: usize,
}

impl ConvGeometry {
    fn new(problem: &Conv2dProblemSize) -> Self {
        Self {
            problem: *problem,
            p: problem.p(),
            q: problem.q(),
        }
    }

    /// Spatial offset contributed by filter tap `(r, s)`, flipped for true convolution.
    fn tap_offset(
        &self,
        r: usize,
        s: usize,
    ) -> (usize, usize) {
        let problem = &self.problem;
        let (r, s) = match problem.mode {
            ConvMode::CrossCorrelation => (r, s),
            ConvMode::Convolution => (problem.r - 1 - r, problem.s - 1 - s),
        };
        (r * problem.dilation_h, s * problem.dilation_w)
    }

    fn input_position(
        &self,
        p: usize,
        q: usize,
        r: usize,
        s: usize,
    ) -> Option<(usize, usize)> {
        let problem = &self.problem;
        let (dh, dw) = self.tap_offset(r, s);
        let h = (p * problem.stride_h + dh).checked_sub(problem.pad_h)?;
        let w = (q * problem.stride_w + dw).checked_sub(problem.pad_w)?;
        (h < problem.h && w < problem.w).then_some((h, w))
    }

    /// Inverse of [`Self::input_position`]: the output pixel reading `(h, w)` through `(r, s)`.
    fn output_position(
        &self,
        h: usize,
        w: usize,
        r: usize,
        s: usize,
    ) -> Option<(usize, usize)> {
        let problem = &self.problem;
        let (dh, dw) = self.tap_offset(r, s);
        let ph = (h + problem.pad_h).checked_sub(dh)?;
        let qw = (w + problem.pad_w).checked_sub(dw)?;
        if ph % problem.stride_h != 0 || qw % problem.stride_w != 0 {
            return None;
        }
        let (p, q) = (ph / problem.stride_h, qw / problem.stride_w);
        (p < self.p && q < self.q).then_some((p, q))
    }

    fn activation(
        &self,
        n: usize,
        h: usize,
        w: usize,
        c: usize,
    ) -> usize {
        let problem = &self.problem;
        ((n * problem.h + h) * problem.w + w) * problem.c + c
    }

    fn filter(
        &self,
        k: usize,
        r: usize,
        s: usize,
        c: usize,
    ) -> usize {
        let problem = &self.problem;
        ((k * problem.r + r) * problem.s + s) * problem.c + c
    }

    fn output(
        &self,
        n: usize,
        p: usize,
        q: usize,
        k: usize,
    ) -> usize {
        ((n * self.p + p) * self.q + q) * self.problem.k + k
    }
}

/// Direct NHWC convolution. `a`, `b` and `c` follow the operand roles of `kind`.
pub fn reference_conv2d(
    problem: &Conv2dProblemSize,
    kind: ConvKind,
    a: &[f64],
    b: &[f64],
    c: &[f64],
    epilogue: ReferenceEpilogue,
) -> Vec<f64> {
    let geometry = ConvGeometry::new(problem);
    let (p_extent, q_extent) = (geometry.p, geometry.q);
    let Conv2dProblemSize {
        n: batches,
        h: height,
        w: width,
        c: channels,
        k: filters,
        r: filter_h,
        s: filter_w,
        ..
    } = *problem;
    let length = problem.operand_extents(kind)[2].iter().product();

    evaluate_elements(length, |index| {
        let mut accumulator = 0.0;
        match kind {
            ConvKind::Fprop => {
                let (rest, k) = (index / filters, index % filters);
                let (n, p, q) = (rest / (p_extent * q_extent), (rest / q_extent) % p_extent, rest % q_extent);
                for r in 0..filter_h {
                    for s in 0..filter_w {
                        let Some((h, w)) = geometry.input_position(p, q, r, s) else {
                            continue;
                        };
                        for channel in 0..channels {
                            accumulator +=
                                a[geometry.activation(n, h, w, channel)] * b[geometry.filter(k, r, s, channel)];
                        }
                    }
                }
            },
            ConvKind::Dgrad => {
                let (rest, channel) = (index / channels, index % channels);
                let (n, h, w) = (rest / (height * width), (rest / width) % height, rest % width);
                for r in 0..filter_h {
                    for s in 0..filter_w {
                        let Some((p, q)) = geometry.output_position(h, w, r, s) else {
                            continue;
                        };
                        for k in 0..filters {
                            accumulator += a[geometry.output(n, p, q, k)] * b[geometry.filter(k, r, s, channel)];
                        }
                    }
                }
            },
            ConvKind::Wgrad => {
                let (rest, channel) = (index / channels, index % channels);
                let (k, r, s) = (rest / (filter_h * filter_w), (rest / filter_w) % filter_h, rest % filter_w);
                for n in 0..batches {
                    for p in 0..p_extent {
                        for q in 0..q_extent {
                            let Some((h, w)) = geometry.input_position(p, q, r, s) else {
                                continue;
                            };
                            accumulator += a[geometry.output(n, p, q, k)] * b[geometry.activation(n, h, w, channel)];
                        }
                    }
                }
            },
        }
        epilogue.apply(accumulator, c[index])
    })
}

/// Reference D for `descriptor` on `problem`.
///
/// Fails without computing anything when the problem kind does not match the kernel or an operand is shorter than
/// the problem needs.
pub fn reference_output(
    descriptor: &OperationDescriptor,
    problem: &ProblemSize,
    operands: [&[f64]; 3],
    alpha: f64,
    beta: f64,
) -> Result<Vec<f64>, ConfigurationError> {
    let mismatch = |reason: String| ConfigurationError::ProblemMismatch {
        problem: problem.to_string(),
        reason,
    };
    let matched = matches!(
        (&descriptor.kind, problem),
        (OperationKind::Gemm { .. }, ProblemSize::Gemm(_)) | (OperationKind::Conv2d(_), ProblemSize::Conv2d(_))
    );
    if !matched {
        return Err(mismatch("operation kind does not match the problem".to_string()));
    }
    let required = operand_lengths(descriptor, problem);
    for ((name, operand), needed) in ["A", "B", "C"].into_iter().zip(operands).zip(required) {
        if operand.len() < needed {
            return Err(mismatch(format!("operand {name} holds {} elements, problem needs {needed}", operand.len())));
        }
    }

    let [a, b, c] = operands;
    let epilogue = ReferenceEpilogue {
        functor: descriptor.epilogue,
        alpha,
        beta,
    };
    Ok(match (&descriptor.kind, problem) {
        (OperationKind::Conv2d(conv), ProblemSize::Conv2d(problem)) => {
            reference_conv2d(problem, conv.conv_kind, a, b, c, epilogue)
        },
        (_, ProblemSize::Gemm(problem)) => reference_gemm(
            problem,
            (descriptor.a.layout, descriptor.b.layout, descriptor.c.layout),
            a,
            b,
            c,
            epilogue,
        ),
        (_, ProblemSize::Conv2d(problem)) => reference_conv2d(problem, ConvKind::Fprop, a, b, c, epilogue),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DataType, descriptor::EpilogueParameters, testbed::scenario::gemm_f64_sm90_rows};

    fn epilogue(output: DataType) -> ReferenceEpilogue {
        ReferenceEpilogue {
            functor: EpilogueFunctor::LinearCombination(EpilogueParameters::new(
                output,
                1,
                DataType::F32,
                DataType::F32,
            )),
            alpha: 1.0,
            beta: 0.0,
        }
    }

    #[test]
    fn gemm_respects_operand_layouts() {
        // A = [[1, 2], [3, 4]] column-major, B = [[5, 6], [7, 8]] row-major.
        let a = [1.0, 3.0, 2.0, 4.0];
        let b = [5.0, 6.0, 7.0, 8.0];
        let c = [0.0; 4];
        let d = reference_gemm(
            &GemmProblemSize::new(2, 2, 2),
            (Layout::ColumnMajor, Layout::RowMajor, Layout::RowMajor),
            &a,
            &b,
            &c,
            epilogue(DataType::F32),
        );
        assert_eq!(d, vec![19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn fprop_of_a_single_tap_copies_the_input() {
        let problem =
            Conv2dProblemSize::new([1, 3, 3, 1], [1, 1, 1, 1], [0, 0, 0, 0], [1, 1], [1, 1], ConvMode::CrossCorrelation)
                .unwrap();
        let input: Vec<f64> = (0..9).map(f64::from).collect();
        let d = reference_conv2d(&problem, ConvKind::Fprop, &input, &[2.0], &[0.0; 9], epilogue(DataType::F32));
        assert_eq!(d, input.iter().map(|value| value * 2.0).collect::<Vec<_>>());
    }

    #[test]
    fn convolution_mode_flips_the_filter() {
        let cross =
            Conv2dProblemSize::new([1, 1, 3, 1], [1, 1, 3, 1], [0, 0, 0, 0], [1, 1], [1, 1], ConvMode::CrossCorrelation)
                .unwrap();
        let flipped = Conv2dProblemSize {
            mode: ConvMode::Convolution,
            ..cross
        };
        let input = [1.0, 2.0, 3.0];
        let filter = [1.0, 10.0, 100.0];
        let run = |problem: &Conv2dProblemSize| {
            reference_conv2d(problem, ConvKind::Fprop, &input, &filter, &[0.0], epilogue(DataType::F64))
        };
        assert_eq!(run(&cross), vec![321.0]);
        assert_eq!(run(&flipped), vec![123.0]);
    }

    #[test]
    fn relu_and_beta_apply_in_double_precision() {
        let relu = ReferenceEpilogue {
            functor: EpilogueFunctor::LinearCombinationRelu(EpilogueParameters::new(
                DataType::F16,
                8,
                DataType::F32,
                DataType::F32,
            )),
            alpha: 1.0,
            beta: 0.5,
        };
        assert_eq!(relu.apply(-4.0, 2.0), 0.0);
        assert_eq!(relu.apply(4.0, 3.0), 5.5);
    }

    #[test]
    fn mismatched_problems_are_errors() {
        let descriptor = gemm_f64_sm90_rows().swap_remove(2).descriptor;
        let conv = ProblemSize::Conv2d(
            Conv2dProblemSize::new([1, 3, 3, 1], [1, 1, 1, 1], [0, 0, 0, 0], [1, 1], [1, 1], ConvMode::CrossCorrelation)
                .unwrap(),
        );
        let operand = [1.0; 9];
        let result = reference_output(&descriptor, &conv, [&operand, &operand, &operand], 1.0, 0.0);
        assert!(matches!(result, Err(ConfigurationError::ProblemMismatch { .. })));
    }

    #[test]
    fn short_operands_are_errors() {
        let descriptor = gemm_f64_sm90_rows().swap_remove(2).descriptor;
        let problem = ProblemSize::gemm(2, 2, 2);
        let full = [1.0; 4];
        let short = [1.0; 3];
        assert_eq!(reference_output(&descriptor, &problem, [&full, &full, &full], 1.0, 0.0), Ok(vec![2.0; 4]));
        let result = reference_output(&descriptor, &problem, [&full, &short, &full], 1.0, 0.0);
        let Err(ConfigurationError::ProblemMismatch {
            reason,
            ..
        }) = result
        else {
            panic!("expected a problem mismatch, got {result:?}");
        };
        assert!(reason.contains("operand B"));
    }
}
