use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Three extents (`m`, `n`, `k`) shared by instruction, threadblock, warp and cluster shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileShape {
    pub m: u32,
    pub n: u32,
    pub k: u32,
}

impl TileShape {
    pub const UNIT: TileShape = TileShape::new(1, 1, 1);

    pub const fn new(
        m: u32,
        n: u32,
        k: u32,
    ) -> Self {
        Self {
            m,
            n,
            k,
        }
    }

    pub fn volume(&self) -> u64 {
        self.m as u64 * self.n as u64 * self.k as u64
    }

    pub fn is_positive(&self) -> bool {
        self.m > 0 && self.n > 0 && self.k > 0
    }

    pub fn is_divisible_by(
        &self,
        other: &TileShape,
    ) -> bool {
        other.is_positive() && self.m % other.m == 0 && self.n % other.n == 0 && self.k % other.k == 0
    }

    pub fn elementwise_mul(
        &self,
        other: &TileShape,
    ) -> TileShape {
        TileShape::new(self.m * other.m, self.n * other.n, self.k * other.k)
    }
}

impl From<[u32; 3]> for TileShape {
    fn from(value: [u32; 3]) -> Self {
        TileShape::new(value[0], value[1], value[2])
    }
}

impl fmt::Display for TileShape {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}x{}x{}", self.m, self.n, self.k)
    }
}

impl FromStr for TileShape {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let extents = s
            .split('x')
            .map(|part| part.parse::<u32>().map_err(|_| format!("invalid extent `{part}` in `{s}`")))
            .collect::<Result<Vec<_>, _>>()?;
        match extents.as_slice() {
            [m, n, k] => Ok(TileShape::new(*m, *n, *k)),
            _ => Err(format!("expected three extents in `{s}`")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_parse_agree() {
        let shape = TileShape::new(128, 64, 32);
        assert_eq!(shape.to_string(), "128x64x32");
        assert_eq!("128x64x32".parse::<TileShape>(), Ok(shape));
        assert!("128x64".parse::<TileShape>().is_err());
    }

    #[test]
    fn divisibility_rejects_zero_divisors() {
        let tile = TileShape::new(128, 128, 32);
        assert!(tile.is_divisible_by(&TileShape::new(16, 8, 4)));
        assert!(!tile.is_divisible_by(&TileShape::new(0, 8, 4)));
        assert!(!tile.is_divisible_by(&TileShape::new(48, 8, 4)));
    }
}
