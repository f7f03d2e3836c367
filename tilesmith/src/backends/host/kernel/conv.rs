use super::tiling::ImplicitGemm;
use crate::descriptor::{Conv2dProblemSize, ConvKind, ConvMode, GemmExtent};

/// NHWC convolution viewed as an implicit GEMM. `a` and `b` are the A/B operands of
/// `kind` (activation/filter for fprop, output gradient/filter for dgrad,
/// output gradient/activation for wgrad).
pub(crate) struct Conv2dOperands<'a> {
    problem: Conv2dProblemSize,
    kind: ConvKind,
    p: usize,
    q: usize,
    a: &'a [f64],
    b: &'a [f64],
}

impl<'a> Conv2dOperands<'a> {
    pub fn new(
        problem: Conv2dProblemSize,
        kind: ConvKind,
        a: &'a [f64],
        b: &'a [f64],
    ) -> Self {
        Self {
            problem,
            kind,
            p: problem.p(),
            q: problem.q(),
            a,
            b,
        }
    }

    pub fn operand_lengths(
        problem: &Conv2dProblemSize,
        kind: ConvKind,
    ) -> [usize; 3] {
        problem.operand_extents(kind).map(|extent| extent.iter().product())
    }

    fn filter_tap(
        &self,
        r: usize,
        s: usize,
    ) -> (usize, usize) {
        match self.problem.mode {
            ConvMode::CrossCorrelation => (r, s),
            ConvMode::Convolution => (self.problem.r - 1 - r, self.problem.s - 1 - s),
        }
    }

    /// Activation pixel read by output pixel `(p, q)` through filter tap `(r, s)`.
    fn input_pixel(
        &self,
        p: usize,
        q: usize,
        r: usize,
        s: usize,
    ) -> Option<(usize, usize)> {
        let problem = &self.problem;
        let (r, s) = self.filter_tap(r, s);
        let h = (p * problem.stride_h + r * problem.dilation_h).checked_sub(problem.pad_h)?;
        let w = (q * problem.stride_w + s * problem.dilation_w).checked_sub(problem.pad_w)?;
        (h < problem.h && w < problem.w).then_some((h, w))
    }

    /// Output pixel that reads activation pixel `(h, w)` through filter tap `(r, s)`.
    fn output_pixel(
        &self,
        h: usize,
        w: usize,
        r: usize,
        s: usize,
    ) -> Option<(usize, usize)> {
        let problem = &self.problem;
        let (r, s) = self.filter_tap(r, s);
        let ph = (h + problem.pad_h).checked_sub(r * problem.dilation_h)?;
        let qw = (w + problem.pad_w).checked_sub(s * problem.dilation_w)?;
        if ph % problem.stride_h != 0 || qw % problem.stride_w != 0 {
            return None;
        }
        let (p, q) = (ph / problem.stride_h, qw / problem.stride_w);
        (p < self.p && q < self.q).then_some((p, q))
    }

    fn activation_index(
        &self,
        n: usize,
        h: usize,
        w: usize,
        c: usize,
    ) -> usize {
        ((n * self.problem.h + h) * self.problem.w + w) * self.problem.c + c
    }

    fn output_index_nhwc(
        &self,
        n: usize,
        p: usize,
        q: usize,
        k: usize,
    ) -> usize {
        ((n * self.p + p) * self.q + q) * self.problem.k + k
    }
}

impl ImplicitGemm for Conv2dOperands<'_> {
    fn extent(&self) -> GemmExtent {
        self.problem.implicit_gemm_extent(self.kind)
    }

    fn a(
        &self,
        _batch: usize,
        row: usize,
        depth: usize,
    ) -> f64 {
        let problem = &self.problem;
        match self.kind {
            ConvKind::Fprop => {
                let (n, p, q) = (row / (self.p * self.q), (row / self.q) % self.p, row % self.q);
                let (r, s, c) = (depth / (problem.s * problem.c), (depth / problem.c) % problem.s, depth % problem.c);
                match self.input_pixel(p, q, r, s) {
                    Some((h, w)) => self.a[self.activation_index(n, h, w, c)],
                    None => 0.0,
                }
            },
            ConvKind::Dgrad => {
                let (n, h, w) = (row / (problem.h * problem.w), (row / problem.w) % problem.h, row % problem.w);
                let (k, r, s) = (depth / (problem.r * problem.s), (depth / problem.s) % problem.r, depth % problem.s);
                match self.output_pixel(h, w, r, s) {
                    Some((p, q)) => self.a[self.output_index_nhwc(n, p, q, k)],
                    None => 0.0,
                }
            },
            ConvKind::Wgrad => self.a[depth * problem.k + row],
        }
    }

    fn b(
        &self,
        _batch: usize,
        depth: usize,
        column: usize,
    ) -> f64 {
        let problem = &self.problem;
        match self.kind {
            ConvKind::Fprop => self.b[column * problem.r * problem.s * problem.c + depth],
            ConvKind::Dgrad => self.b[depth * problem.c + column],
            ConvKind::Wgrad => {
                let (n, p, q) = (depth / (self.p * self.q), (depth / self.q) % self.p, depth % self.q);
                let (r, s, c) =
                    (column / (problem.s * problem.c), (column / problem.c) % problem.s, column % problem.c);
                match self.input_pixel(p, q, r, s) {
                    Some((h, w)) => self.b[self.activation_index(n, h, w, c)],
                    None => 0.0,
                }
            },
        }
    }

    fn output_index(
        &self,
        _batch: usize,
        row: usize,
        column: usize,
    ) -> usize {
        let problem = &self.problem;
        match self.kind {
            ConvKind::Fprop => row * problem.k + column,
            ConvKind::Dgrad => row * problem.c + column,
            ConvKind::Wgrad => row * problem.r * problem.s * problem.c + column,
        }
    }
}
