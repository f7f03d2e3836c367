use std::fmt;

use serde::{Deserialize, Serialize};

use super::ConvKind;
use crate::validator::ConfigurationError;

/// Extents of the GEMM a problem lowers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GemmExtent {
    pub m: usize,
    pub n: usize,
    pub k: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GemmProblemSize {
    pub m: usize,
    pub n: usize,
    pub k: usize,
    #[serde(default = "default_one")]
    pub batch_count: usize,
    #[serde(default = "default_one")]
    pub split_k_slices: usize,
}

fn default_one() -> usize {
    1
}

impl GemmProblemSize {
    pub fn new(
        m: usize,
        n: usize,
        k: usize,
    ) -> Self {
        Self {
            m,
            n,
            k,
            batch_count: 1,
            split_k_slices: 1,
        }
    }

    pub fn with_batch_count(
        mut self,
        batch_count: usize,
    ) -> Self {
        self.batch_count = batch_count;
        self
    }

    pub fn with_split_k_slices(
        mut self,
        split_k_slices: usize,
    ) -> Self {
        self.split_k_slices = split_k_slices;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvMode {
    CrossCorrelation,
    Convolution,
}

/// NHWC convolution problem. Padding is symmetric per spatial dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Conv2dProblemSize {
    pub n: usize,
    pub h: usize,
    pub w: usize,
    pub c: usize,
    pub k: usize,
    pub r: usize,
    pub s: usize,
    pub pad_h: usize,
    pub pad_w: usize,
    pub stride_h: usize,
    pub stride_w: usize,
    pub dilation_h: usize,
    pub dilation_w: usize,
    pub mode: ConvMode,
}

impl Conv2dProblemSize {
    /// `input` is `[n, h, w, c]`, `filter` is `[k, r, s, c]`, `padding` is
    /// `[pad_top, pad_bottom, pad_left, pad_right]` (only symmetric padding is supported).
    pub fn new(
        input: [usize; 4],
        filter: [usize; 4],
        padding: [usize; 4],
        stride: [usize; 2],
        dilation: [usize; 2],
        mode: ConvMode,
    ) -> Result<Self, ConfigurationError> {
        let [n, h, w, c] = input;
        let [k, r, s, filter_c] = filter;
        if c != filter_c {
            return Err(ConfigurationError::ProblemSize(format!(
                "input has {c} channels but filter has {filter_c}"
            )));
        }
        if padding[0] != padding[1] || padding[2] != padding[3] {
            return Err(ConfigurationError::ProblemSize(format!("asymmetric padding {padding:?}")));
        }
        if stride.contains(&0) || dilation.contains(&0) {
            return Err(ConfigurationError::ProblemSize(format!(
                "stride {stride:?} and dilation {dilation:?} must be positive"
            )));
        }
        if [n, h, w, c, k, r, s].contains(&0) {
            return Err(ConfigurationError::ProblemSize(format!(
                "empty extent in input {input:?} or filter {filter:?}"
            )));
        }
        let problem = Self {
            n,
            h,
            w,
            c,
            k,
            r,
            s,
            pad_h: padding[0],
            pad_w: padding[2],
            stride_h: stride[0],
            stride_w: stride[1],
            dilation_h: dilation[0],
            dilation_w: dilation[1],
            mode,
        };
        if problem.p() == 0 || problem.q() == 0 {
            return Err(ConfigurationError::ProblemSize(format!(
                "filter {r}x{s} does not fit the padded {h}x{w} input"
            )));
        }
        Ok(problem)
    }

    fn output_extent(
        input: usize,
        pad: usize,
        filter: usize,
        dilation: usize,
        stride: usize,
    ) -> usize {
        let padded = input + 2 * pad;
        let window = (filter - 1) * dilation + 1;
        if padded < window {
            0
        } else {
            (padded - window) / stride + 1
        }
    }

    pub fn p(&self) -> usize {
        Self::output_extent(self.h, self.pad_h, self.r, self.dilation_h, self.stride_h)
    }

    pub fn q(&self) -> usize {
        Self::output_extent(self.w, self.pad_w, self.s, self.dilation_w, self.stride_w)
    }

    pub fn activation_extent(&self) -> [usize; 4] {
        [self.n, self.h, self.w, self.c]
    }

    pub fn filter_extent(&self) -> [usize; 4] {
        [self.k, self.r, self.s, self.c]
    }

    pub fn output_extent_nhwc(&self) -> [usize; 4] {
        [self.n, self.p(), self.q(), self.k]
    }

    /// NHWC extents of the A, B and C/D operands for `kind`.
    pub fn operand_extents(
        &self,
        kind: ConvKind,
    ) -> [[usize; 4]; 3] {
        match kind {
            ConvKind::Fprop => [self.activation_extent(), self.filter_extent(), self.output_extent_nhwc()],
            ConvKind::Dgrad => [self.output_extent_nhwc(), self.filter_extent(), self.activation_extent()],
            ConvKind::Wgrad => [self.output_extent_nhwc(), self.activation_extent(), self.filter_extent()],
        }
    }

    pub fn implicit_gemm_extent(
        &self,
        kind: ConvKind,
    ) -> GemmExtent {
        match kind {
            ConvKind::Fprop => GemmExtent {
                m: self.n * self.p() * self.q(),
                n: self.k,
                k: self.r * self.s * self.c,
            },
            ConvKind::Dgrad => GemmExtent {
                m: self.n * self.h * self.w,
                n: self.c,
                k: self.k * self.r * self.s,
            },
            ConvKind::Wgrad => GemmExtent {
                m: self.k,
                n: self.r * self.s * self.c,
                k: self.n * self.p() * self.q(),
            },
        }
    }

    pub fn is_unit_stride(&self) -> bool {
        self.stride_h == 1 && self.stride_w == 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemSize {
    Gemm(GemmProblemSize),
    Conv2d(Conv2dProblemSize),
}

impl ProblemSize {
    pub fn gemm(
        m: usize,
        n: usize,
        k: usize,
    ) -> Self {
        ProblemSize::Gemm(GemmProblemSize::new(m, n, k))
    }
}

impl fmt::Display for ProblemSize {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            ProblemSize::Gemm(problem) => {
                write!(f, "gemm {}x{}x{}", problem.m, problem.n, problem.k)?;
                if problem.batch_count > 1 {
                    write!(f, " batch {}", problem.batch_count)?;
                }
                if problem.split_k_slices > 1 {
                    write!(f, " split-k {}", problem.split_k_slices)?;
                }
                Ok(())
            },
            ProblemSize::Conv2d(problem) => write!(
                f,
                "conv2d n{}h{}w{}c{} k{}r{}s{} pad{}x{} stride{}x{} dil{}x{}",
                problem.n,
                problem.h,
                problem.w,
                problem.c,
                problem.k,
                problem.r,
                problem.s,
                problem.pad_h,
                problem.pad_w,
                problem.stride_h,
                problem.stride_w,
                problem.dilation_h,
                problem.dilation_w
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conv(
        input: [usize; 4],
        filter: [usize; 4],
        stride: usize,
    ) -> Conv2dProblemSize {
        Conv2dProblemSize::new(input, filter, [1, 1, 1, 1], [stride, stride], [1, 1], ConvMode::CrossCorrelation)
            .unwrap()
    }

    #[test]
    fn output_extents_follow_padding_and_stride() {
        let problem = conv([1, 8, 8, 4], [16, 3, 3, 4], 2);
        assert_eq!((problem.p(), problem.q()), (4, 4));

        let problem = conv([1, 224, 224, 4], [32, 7, 7, 4], 1);
        assert_eq!((problem.p(), problem.q()), (220, 220));

        let problem = conv([1, 224, 224, 4], [64, 7, 7, 4], 2);
        assert_eq!((problem.p(), problem.q()), (110, 110));
    }

    #[test]
    fn implicit_gemm_extents_per_kind() {
        let problem = conv([2, 8, 8, 4], [16, 3, 3, 4], 1);
        assert_eq!(
            problem.implicit_gemm_extent(ConvKind::Fprop),
            GemmExtent {
                m: 2 * 8 * 8,
                n: 16,
                k: 36
            }
        );
        assert_eq!(
            problem.implicit_gemm_extent(ConvKind::Wgrad),
            GemmExtent {
                m: 16,
                n: 36,
                k: 2 * 8 * 8
            }
        );
    }

    #[test]
    fn rejects_channel_mismatch() {
        let result = Conv2dProblemSize::new(
            [1, 8, 8, 4],
            [16, 3, 3, 8],
            [0, 0, 0, 0],
            [1, 1],
            [1, 1],
            ConvMode::CrossCorrelation,
        );
        assert!(matches!(result, Err(ConfigurationError::ProblemSize(_))));
    }
}
