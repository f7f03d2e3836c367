use serde::{Deserialize, Serialize};

/// Output tile coordinate in units of threadblock tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoord {
    pub m: u32,
    pub n: u32,
}

/// Mapping from launch-grid block indices to output tiles. Changes traversal order only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwizzlingFunctor {
    Identity1,
    Identity2,
    Identity4,
    Identity8,
    Horizontal,
    StridedDgradIdentity1,
    StridedDgradIdentity4,
}

impl SwizzlingFunctor {
    pub const ALL: [SwizzlingFunctor; 7] = [
        SwizzlingFunctor::Identity1,
        SwizzlingFunctor::Identity2,
        SwizzlingFunctor::Identity4,
        SwizzlingFunctor::Identity8,
        SwizzlingFunctor::Horizontal,
        SwizzlingFunctor::StridedDgradIdentity1,
        SwizzlingFunctor::StridedDgradIdentity4,
    ];

    pub fn token(&self) -> &'static str {
        match self {
            SwizzlingFunctor::Identity1 => "identity1",
            SwizzlingFunctor::Identity2 => "identity2",
            SwizzlingFunctor::Identity4 => "identity4",
            SwizzlingFunctor::Identity8 => "identity8",
            SwizzlingFunctor::Horizontal => "horizontal",
            SwizzlingFunctor::StridedDgradIdentity1 => "strideddgrad1",
            SwizzlingFunctor::StridedDgradIdentity4 => "strideddgrad4",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        SwizzlingFunctor::ALL.into_iter().find(|swizzle| swizzle.token() == token)
    }

    pub fn is_strided_dgrad(&self) -> bool {
        matches!(self, SwizzlingFunctor::StridedDgradIdentity1 | SwizzlingFunctor::StridedDgradIdentity4)
    }

    fn log_tile(&self) -> u32 {
        match self {
            SwizzlingFunctor::Identity1 | SwizzlingFunctor::StridedDgradIdentity1 => 0,
            SwizzlingFunctor::Identity2 => 1,
            SwizzlingFunctor::Identity4 | SwizzlingFunctor::StridedDgradIdentity4 => 2,
            SwizzlingFunctor::Identity8 => 3,
            SwizzlingFunctor::Horizontal => 0,
        }
    }

    /// Launch grid `(x, y)` covering `tiles_m × tiles_n` output tiles.
    pub fn grid_shape(
        &self,
        tiles_m: u32,
        tiles_n: u32,
    ) -> (u32, u32) {
        match self {
            SwizzlingFunctor::Horizontal => (tiles_n, tiles_m),
            _ => {
                let tile = 1u32 << self.log_tile();
                (tiles_m * tile, tiles_n.div_ceil(tile))
            },
        }
    }

    /// Output tile computed by block `(x, y)`, or `None` for blocks that fall outside the problem.
    pub fn tile_for_block(
        &self,
        block_x: u32,
        block_y: u32,
        tiles_m: u32,
        tiles_n: u32,
    ) -> Option<TileCoord> {
        let coord = match self {
            SwizzlingFunctor::Horizontal => TileCoord {
                m: block_y,
                n: block_x,
            },
            _ => {
                let log_tile = self.log_tile();
                TileCoord {
                    m: block_x >> log_tile,
                    n: (block_y << log_tile) + (block_x & ((1 << log_tile) - 1)),
                }
            },
        };
        (coord.m < tiles_m && coord.n < tiles_n).then_some(coord)
    }

    /// Tiles in the order blocks are scheduled (x fastest).
    pub fn launch_order(
        &self,
        tiles_m: u32,
        tiles_n: u32,
    ) -> Vec<TileCoord> {
        let (grid_x, grid_y) = self.grid_shape(tiles_m, tiles_n);
        let mut order = Vec::with_capacity(tiles_m as usize * tiles_n as usize);
        for block_y in 0..grid_y {
            for block_x in 0..grid_x {
                if let Some(coord) = self.tile_for_block(block_x, block_y, tiles_m, tiles_n) {
                    order.push(coord);
                }
            }
        }
        order
    }
}
