use super::tiling::ImplicitGemm;
use crate::descriptor::{GemmExtent, GemmProblemSize, Layout};

/// Dense (optionally batched) matrices in the layouts named by the descriptor.
pub(crate) struct GemmOperands<'a> {
    pub problem: GemmProblemSize,
    pub layout_a: Layout,
    pub layout_b: Layout,
    pub layout_c: Layout,
    pub a: &'a [f64],
    pub b: &'a [f64],
}

impl GemmOperands<'_> {
    pub fn operand_lengths(problem: &GemmProblemSize) -> [usize; 3] {
        let batches = problem.batch_count;
        [batches * problem.m * problem.k, batches * problem.k * problem.n, batches * problem.m * problem.n]
    }
}

impl ImplicitGemm for GemmOperands<'_> {
    fn extent(&self) -> GemmExtent {
        GemmExtent {
            m: self.problem.m,
            n: self.problem.n,
            k: self.problem.k,
        }
    }

    fn batch_count(&self) -> usize {
        self.problem.batch_count
    }

    fn a(
        &self,
        batch: usize,
        row: usize,
        depth: usize,
    ) -> f64 {
        let GemmProblemSize {
            m,
            k,
            ..
        } = self.problem;
        self.a[batch * m * k + self.layout_a.matrix_offset(row, depth, m, k)]
    }

    fn b(
        &self,
        batch: usize,
        depth: usize,
        column: usize,
    ) -> f64 {
        let GemmProblemSize {
            n,
            k,
            ..
        } = self.problem;
        self.b[batch * k * n + self.layout_b.matrix_offset(depth, column, k, n)]
    }

    fn output_index(
        &self,
        batch: usize,
        row: usize,
        column: usize,
    ) -> usize {
        let GemmProblemSize {
            m,
            n,
            ..
        } = self.problem;
        batch * m * n + self.layout_c.matrix_offset(row, column, m, n)
    }
}
