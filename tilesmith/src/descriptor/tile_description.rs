use serde::{Deserialize, Serialize};

use super::{MathInstruction, TileShape};

/// Threadblock-level schedule of a kernel: how much of the output each CTA owns,
/// how deep its software pipeline is and how its warps split the tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileDescription {
    pub threadblock_shape: TileShape,
    pub stages: u32,
    pub warp_count: TileShape,
    #[serde(default)]
    pub cluster_shape: Option<TileShape>,
    #[serde(default)]
    pub persistent: bool,
    pub math_instruction: MathInstruction,
}

impl TileDescription {
    pub fn new(
        threadblock_shape: TileShape,
        stages: u32,
        warp_count: TileShape,
        math_instruction: MathInstruction,
    ) -> Self {
        Self {
            threadblock_shape,
            stages,
            warp_count,
            cluster_shape: None,
            persistent: false,
            math_instruction,
        }
    }

    pub fn with_cluster_shape(
        mut self,
        cluster_shape: TileShape,
    ) -> Self {
        self.cluster_shape = Some(cluster_shape);
        self
    }

    pub fn with_persistent(
        mut self,
        persistent: bool,
    ) -> Self {
        self.persistent = persistent;
        self
    }

    /// Portion of the threadblock tile computed by one warp.
    pub fn warp_shape(&self) -> Option<TileShape> {
        if !self.warp_count.is_positive() || !self.threadblock_shape.is_divisible_by(&self.warp_count) {
            return None;
        }
        Some(TileShape::new(
            self.threadblock_shape.m / self.warp_count.m,
            self.threadblock_shape.n / self.warp_count.n,
            self.threadblock_shape.k / self.warp_count.k,
        ))
    }

    pub fn cluster_size(&self) -> u64 {
        self.cluster_shape.map(|shape| shape.volume()).unwrap_or(1)
    }
}
