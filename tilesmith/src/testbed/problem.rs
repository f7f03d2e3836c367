use crate::{
    descriptor::{
        Conv2dProblemSize, ConvKind, GemmMode, GemmProblemSize, IteratorAlgorithm, Layout, OperationDescriptor,
        OperationKind, ProblemSize, StrideSupport, TensorDescription,
    },
    validator::ConfigurationError,
};

fn mismatch(
    problem: &ProblemSize,
    reason: String,
) -> ConfigurationError {
    ConfigurationError::ProblemMismatch {
        problem: problem.to_string(),
        reason,
    }
}

fn check_contiguous_extent(
    problem: &ProblemSize,
    operand: &str,
    tensor: &TensorDescription,
    dimension: &str,
    extent: usize,
) -> Result<(), ConfigurationError> {
    let alignment = tensor.alignment as usize;
    if alignment > 1 && extent % alignment != 0 {
        return Err(mismatch(
            problem,
            format!("operand {operand} needs {dimension} = {extent} to be a multiple of its alignment {alignment}"),
        ));
    }
    Ok(())
}

fn check_gemm(
    descriptor: &OperationDescriptor,
    mode: GemmMode,
    gemm: &GemmProblemSize,
    problem: &ProblemSize,
) -> Result<(), ConfigurationError> {
    if [gemm.m, gemm.n, gemm.k].contains(&0) {
        return Err(mismatch(problem, "empty GEMM extent".to_string()));
    }
    if gemm.batch_count == 0 || gemm.split_k_slices == 0 {
        return Err(mismatch(problem, "batch count and split-k slices must be positive".to_string()));
    }
    if mode == GemmMode::Universal && gemm.split_k_slices > 1 {
        return Err(mismatch(
            problem,
            format!("universal GEMM kernels do not split K ({} slices requested)", gemm.split_k_slices),
        ));
    }

    let contiguous = |layout: Layout, row: (&'static str, usize), column: (&'static str, usize)| match layout {
        Layout::RowMajor => column,
        _ => row,
    };
    let operands = [
        ("A", &descriptor.a, contiguous(descriptor.a.layout, ("M", gemm.m), ("K", gemm.k))),
        ("B", &descriptor.b, contiguous(descriptor.b.layout, ("K", gemm.k), ("N", gemm.n))),
        ("C", &descriptor.c, contiguous(descriptor.c.layout, ("M", gemm.m), ("N", gemm.n))),
    ];
    for (operand, tensor, (dimension, extent)) in operands {
        check_contiguous_extent(problem, operand, tensor, dimension, extent)?;
    }
    Ok(())
}

fn check_conv(
    descriptor: &OperationDescriptor,
    kind: ConvKind,
    iterator_algorithm: IteratorAlgorithm,
    stride_support: StrideSupport,
    conv: &Conv2dProblemSize,
    problem: &ProblemSize,
) -> Result<(), ConfigurationError> {
    let extents = [conv.n, conv.h, conv.w, conv.c, conv.k, conv.r, conv.s];
    let steps = [conv.stride_h, conv.stride_w, conv.dilation_h, conv.dilation_w];
    if extents.contains(&0) || steps.contains(&0) {
        return Err(mismatch(problem, "empty extent, stride or dilation".to_string()));
    }
    if conv.p() == 0 || conv.q() == 0 {
        return Err(mismatch(problem, "filter does not fit the padded input".to_string()));
    }
    if stride_support == StrideSupport::Unity && !conv.is_unit_stride() {
        return Err(mismatch(problem, "kernel is built for unit stride only".to_string()));
    }
    if iterator_algorithm == IteratorAlgorithm::FixedChannels && conv.c != descriptor.a.alignment as usize {
        return Err(mismatch(
            problem,
            format!("fixed-channels kernel expects exactly {} input channels, got {}", descriptor.a.alignment, conv.c),
        ));
    }

    // Every NHWC operand is contiguous in its channel dimension.
    let channels = match kind {
        ConvKind::Fprop => [("C", conv.c), ("C", conv.c), ("K", conv.k)],
        ConvKind::Dgrad => [("K", conv.k), ("C", conv.c), ("C", conv.c)],
        ConvKind::Wgrad => [("K", conv.k), ("C", conv.c), ("C", conv.c)],
    };
    for ((operand, tensor), (dimension, extent)) in descriptor.operands().into_iter().zip(channels) {
        check_contiguous_extent(problem, operand, tensor, dimension, extent)?;
    }
    Ok(())
}

/// Checks that `problem` can run on the kernel `descriptor` describes.
pub fn check_problem(
    descriptor: &OperationDescriptor,
    problem: &ProblemSize,
) -> Result<(), ConfigurationError> {
    match (&descriptor.kind, problem) {
        (OperationKind::Gemm {
            mode,
        }, ProblemSize::Gemm(gemm)) => check_gemm(descriptor, *mode, gemm, problem),
        (OperationKind::Conv2d(conv), ProblemSize::Conv2d(size)) => {
            check_conv(descriptor, conv.conv_kind, conv.iterator_algorithm, conv.stride_support, size, problem)
        },
        (OperationKind::Gemm {
            ..
        }, ProblemSize::Conv2d(_)) => Err(mismatch(problem, "GEMM kernel given a convolution problem".to_string())),
        (OperationKind::Conv2d(_), ProblemSize::Gemm(_)) => {
            Err(mismatch(problem, "convolution kernel given a GEMM problem".to_string()))
        },
    }
}

/// Element counts of A, B and C/D.
pub fn operand_lengths(
    descriptor: &OperationDescriptor,
    problem: &ProblemSize,
) -> [usize; 3] {
    match (&descriptor.kind, problem) {
        (OperationKind::Conv2d(conv), ProblemSize::Conv2d(size)) => {
            size.operand_extents(conv.conv_kind).map(|extent| extent.iter().product())
        },
        (_, ProblemSize::Gemm(gemm)) => {
            let batches = gemm.batch_count;
            [batches * gemm.m * gemm.k, batches * gemm.k * gemm.n, batches * gemm.m * gemm.n]
        },
        (_, ProblemSize::Conv2d(size)) => size.operand_extents(ConvKind::Fprop).map(|extent| extent.iter().product()),
    }
}

/// Number of terms each output element sums over.
pub fn reduction_depth(
    descriptor: &OperationDescriptor,
    problem: &ProblemSize,
) -> usize {
    match (&descriptor.kind, problem) {
        (OperationKind::Conv2d(conv), ProblemSize::Conv2d(size)) => size.implicit_gemm_extent(conv.conv_kind).k,
        (_, ProblemSize::Gemm(gemm)) => gemm.k,
        (_, ProblemSize::Conv2d(size)) => size.implicit_gemm_extent(ConvKind::Fprop).k,
    }
}

/// Byte sizes of A, B and C (D matches C).
pub fn operand_bytes(
    descriptor: &OperationDescriptor,
    problem: &ProblemSize,
) -> [usize; 3] {
    let lengths = operand_lengths(descriptor, problem);
    let elements = [descriptor.a.element, descriptor.b.element, descriptor.c.element];
    [0, 1, 2].map(|operand| (lengths[operand] * elements[operand].size_in_bits()).div_ceil(8))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        DataType,
        descriptor::{
            Architecture, ConvDescription, ConvMode, EpilogueFunctor, EpilogueParameters, MathInstruction,
            SwizzlingFunctor, TileDescription, TileShape,
        },
    };

    fn gemm_descriptor(
        mode: GemmMode,
        alignment: u32,
    ) -> OperationDescriptor {
        let instruction = MathInstruction::simt(DataType::F32, DataType::F32);
        OperationDescriptor::new(
            OperationKind::Gemm {
                mode,
            },
            Architecture::SM80,
            TileDescription::new(TileShape::new(64, 64, 8), 3, TileShape::new(2, 2, 1), instruction),
            TensorDescription::new(DataType::F32, Layout::RowMajor, alignment),
            TensorDescription::new(DataType::F32, Layout::ColumnMajor, alignment),
            TensorDescription::new(DataType::F32, Layout::RowMajor, alignment),
            EpilogueFunctor::LinearCombination(EpilogueParameters::new(
                DataType::F32,
                alignment,
                DataType::F32,
                DataType::F32,
            )),
            SwizzlingFunctor::Identity1,
        )
    }

    fn fixed_channels_descriptor(channels: u32) -> OperationDescriptor {
        let instruction = MathInstruction::tensor_op(TileShape::new(16, 8, 16), DataType::F16, DataType::F32);
        OperationDescriptor::new(
            OperationKind::Conv2d(ConvDescription {
                conv_kind: ConvKind::Fprop,
                iterator_algorithm: IteratorAlgorithm::FixedChannels,
                stride_support: StrideSupport::Unity,
            }),
            Architecture::SM80,
            TileDescription::new(TileShape::new(128, 128, 64), 3, TileShape::new(2, 2, 1), instruction),
            TensorDescription::new(DataType::F16, Layout::TensorNhwc, channels),
            TensorDescription::new(DataType::F16, Layout::TensorNhwc, channels),
            TensorDescription::new(DataType::F16, Layout::TensorNhwc, 8),
            EpilogueFunctor::LinearCombination(EpilogueParameters::new(DataType::F16, 8, DataType::F32, DataType::F32)),
            SwizzlingFunctor::Identity1,
        )
    }

    fn conv_problem(
        channels: usize,
        stride: usize,
    ) -> ProblemSize {
        ProblemSize::Conv2d(
            Conv2dProblemSize::new(
                [1, 8, 8, channels],
                [16, 3, 3, channels],
                [1, 1, 1, 1],
                [stride, stride],
                [1, 1],
                ConvMode::CrossCorrelation,
            )
            .unwrap(),
        )
    }

    #[test]
    fn universal_gemm_rejects_split_k() {
        let problem = ProblemSize::Gemm(GemmProblemSize::new(64, 64, 64).with_split_k_slices(2));
        assert!(matches!(
            check_problem(&gemm_descriptor(GemmMode::Universal, 1), &problem),
            Err(ConfigurationError::ProblemMismatch { .. })
        ));
        assert_eq!(check_problem(&gemm_descriptor(GemmMode::SplitKSerial, 1), &problem), Ok(()));
    }

    #[test]
    fn contiguous_extents_must_respect_alignment() {
        let descriptor = gemm_descriptor(GemmMode::Universal, 4);
        assert_eq!(check_problem(&descriptor, &ProblemSize::gemm(30, 64, 64)), Ok(()));
        assert!(check_problem(&descriptor, &ProblemSize::gemm(64, 64, 30)).is_err());
    }

    #[test]
    fn fixed_channels_require_matching_channel_count() {
        let descriptor = fixed_channels_descriptor(4);
        assert_eq!(check_problem(&descriptor, &conv_problem(4, 1)), Ok(()));
        assert!(check_problem(&descriptor, &conv_problem(8, 1)).is_err());
        assert!(check_problem(&descriptor, &conv_problem(4, 2)).is_err());
    }

    #[test]
    fn problem_kind_must_match_the_kernel() {
        assert!(check_problem(&gemm_descriptor(GemmMode::Universal, 1), &conv_problem(4, 1)).is_err());
        assert!(check_problem(&fixed_channels_descriptor(4), &ProblemSize::gemm(8, 8, 8)).is_err());
    }

    #[test]
    fn operand_sizes_follow_the_problem() {
        let descriptor = gemm_descriptor(GemmMode::Universal, 1);
        let problem = ProblemSize::Gemm(GemmProblemSize::new(4, 8, 2).with_batch_count(3));
        assert_eq!(operand_lengths(&descriptor, &problem), [24, 48, 96]);
        assert_eq!(operand_bytes(&descriptor, &problem), [96, 192, 384]);
    }

    #[test]
    fn reduction_depth_follows_the_implicit_gemm() {
        assert_eq!(reduction_depth(&gemm_descriptor(GemmMode::Universal, 1), &ProblemSize::gemm(4, 8, 24)), 24);
        // Fprop reduces over R * S * C.
        assert_eq!(reduction_depth(&fixed_channels_descriptor(4), &conv_problem(4, 1)), 3 * 3 * 4);
    }
}
