use std::{ops::Range, panic, thread};

use half::{bf16, f16};
use itertools::iproduct;

use crate::{
    DataType,
    descriptor::{EpilogueFunctor, GemmExtent, SwizzlingFunctor, TileCoord, TileShape},
};

/// GEMM view of an operation: `D[b](m, n) = sum_k A[b](m, k) * B[b](k, n)`.
/// Convolutions implement it by gathering activations and filters on the fly.
pub(crate) trait ImplicitGemm: Sync {
    fn extent(&self) -> GemmExtent;

    fn batch_count(&self) -> usize {
        1
    }

    fn a(
        &self,
        batch: usize,
        row: usize,
        depth: usize,
    ) -> f64;

    fn b(
        &self,
        batch: usize,
        depth: usize,
        column: usize,
    ) -> f64;

    fn output_index(
        &self,
        batch: usize,
        row: usize,
        column: usize,
    ) -> usize;
}

fn accumulator_rounding(accumulator: DataType) -> fn(f64) -> f64 {
    match accumulator {
        DataType::F32 => |value| value as f32 as f64,
        DataType::F16 => |value| f16::from_f64(value).to_f64(),
        DataType::BF16 => |value| bf16::from_f64(value).to_f64(),
        _ => |value| value,
    }
}

/// How a launch walks the output: tile shape, tile order, accumulation precision and epilogue.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TiledSchedule {
    pub threadblock: TileShape,
    pub swizzle: SwizzlingFunctor,
    pub accumulator: DataType,
    pub epilogue: EpilogueFunctor,
    pub split_k_slices: usize,
    pub workers: usize,
}

struct WorkItem {
    batch: usize,
    tile: TileCoord,
}

impl TiledSchedule {
    fn k_slices(
        &self,
        depth: usize,
    ) -> Vec<Range<usize>> {
        let tile_k = self.threadblock.k as usize;
        let slices = self.split_k_slices.max(1);
        let slice_depth = depth.div_ceil(slices).div_ceil(tile_k).max(1) * tile_k;
        (0..slices)
            .map(|slice| {
                let start = (slice * slice_depth).min(depth);
                start..((slice + 1) * slice_depth).min(depth)
            })
            .collect()
    }

    /// Runs every threadblock and writes `D` into `output`. `source` holds `C` with the
    /// same indexing as `output`.
    pub fn run<G: ImplicitGemm>(
        &self,
        gemm: &G,
        source: &[f64],
        alpha: f64,
        beta: f64,
        output: &mut [f64],
    ) {
        let extent = gemm.extent();
        let tiles_m = extent.m.div_ceil(self.threadblock.m as usize) as u32;
        let tiles_n = extent.n.div_ceil(self.threadblock.n as usize) as u32;
        let order = self.swizzle.launch_order(tiles_m, tiles_n);
        let items: Vec<WorkItem> = iproduct!(0..gemm.batch_count(), order.iter().copied())
            .map(|(batch, tile)| WorkItem {
                batch,
                tile,
            })
            .collect();
        let slices = self.k_slices(extent.k);
        let workers = self.workers.clamp(1, items.len().max(1));

        let results: Vec<Vec<(usize, f64)>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|worker| {
                    let items = &items;
                    let slices = &slices;
                    scope.spawn(move || {
                        items
                            .iter()
                            .skip(worker)
                            .step_by(workers)
                            .flat_map(|item| self.run_tile(gemm, item, slices, source, alpha, beta))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap_or_else(|payload| panic::resume_unwind(payload)))
                .collect()
        });

        for (index, value) in results.into_iter().flatten() {
            output[index] = value;
        }
    }

    fn run_tile<G: ImplicitGemm>(
        &self,
        gemm: &G,
        item: &WorkItem,
        slices: &[Range<usize>],
        source: &[f64],
        alpha: f64,
        beta: f64,
    ) -> Vec<(usize, f64)> {
        let extent = gemm.extent();
        let (tile_m, tile_n, tile_k) =
            (self.threadblock.m as usize, self.threadblock.n as usize, self.threadblock.k as usize);
        let row_start = item.tile.m as usize * tile_m;
        let column_start = item.tile.n as usize * tile_n;
        let rows = tile_m.min(extent.m - row_start);
        let columns = tile_n.min(extent.n - column_start);
        let round = accumulator_rounding(self.accumulator);

        let mut a_panel = vec![0.0; tile_m * tile_k];
        let mut b_panel = vec![0.0; tile_k * tile_n];
        let mut accumulators = vec![0.0; tile_m * tile_n];
        let mut partial: Vec<f64> = (0..rows * columns)
            .map(|local| {
                let index = gemm.output_index(item.batch, row_start + local / columns, column_start + local % columns);
                source[index]
            })
            .collect();

        let last_slice = slices.len() - 1;
        for (slice_index, slice) in slices.iter().enumerate() {
            accumulators.iter_mut().for_each(|value| *value = 0.0);

            for depth_start in slice.clone().step_by(tile_k) {
                let depth = tile_k.min(slice.end - depth_start);
                for row in 0..rows {
                    for kk in 0..depth {
                        a_panel[row * tile_k + kk] = gemm.a(item.batch, row_start + row, depth_start + kk);
                    }
                }
                for kk in 0..depth {
                    for column in 0..columns {
                        b_panel[kk * tile_n + column] = gemm.b(item.batch, depth_start + kk, column_start + column);
                    }
                }
                for row in 0..rows {
                    for kk in 0..depth {
                        let a = a_panel[row * tile_k + kk];
                        if a == 0.0 {
                            continue;
                        }
                        let b_row = &b_panel[kk * tile_n..kk * tile_n + columns];
                        let acc_row = &mut accumulators[row * tile_n..row * tile_n + columns];
                        for (accumulator, b) in acc_row.iter_mut().zip(b_row) {
                            *accumulator = round(*accumulator + a * b);
                        }
                    }
                }
            }

            // Serial split-k: later slices fold into the partial result with unit beta,
            // and only the final slice applies the activation.
            let slice_beta = if slice_index == 0 {
                beta
            } else {
                1.0
            };
            let functor = if slice_index == last_slice {
                self.epilogue
            } else {
                EpilogueFunctor::LinearCombination(*self.epilogue.parameters())
            };
            for (local, value) in partial.iter_mut().enumerate() {
                let accumulator = accumulators[(local / columns) * tile_n + local % columns];
                *value = functor.apply(accumulator, *value, alpha, slice_beta);
            }
        }

        partial
            .into_iter()
            .enumerate()
            .map(|(local, value)| {
                (gemm.output_index(item.batch, row_start + local / columns, column_start + local % columns), value)
            })
            .collect()
    }
}
