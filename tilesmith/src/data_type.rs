use std::{fmt, str::FromStr};

use bytemuck::Pod;
use half::{bf16, f16};
use num_traits::NumCast;
use serde::{Deserialize, Serialize};

#[derive(
    Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Copy, Clone, Serialize, Deserialize,
)]
pub enum DataType {
    // Floating point
    #[serde(rename = "bf16")]
    BF16,
    #[serde(rename = "f16")]
    F16,
    #[serde(rename = "f32")]
    F32,
    #[serde(rename = "f64")]
    F64,
    // Sub-byte integers
    #[serde(rename = "s4")]
    I4,
    #[serde(rename = "u4")]
    U4,
    // Normal integers
    #[serde(rename = "s8")]
    I8,
    #[serde(rename = "u8")]
    U8,
    #[serde(rename = "s16")]
    I16,
    #[serde(rename = "u16")]
    U16,
    #[serde(rename = "s32")]
    I32,
    #[serde(rename = "u32")]
    U32,
    #[serde(rename = "s64")]
    I64,
    #[serde(rename = "u64")]
    U64,
}

impl DataType {
    pub const ALL: [DataType; 14] = [
        DataType::BF16,
        DataType::F16,
        DataType::F32,
        DataType::F64,
        DataType::I4,
        DataType::U4,
        DataType::I8,
        DataType::U8,
        DataType::I16,
        DataType::U16,
        DataType::I32,
        DataType::U32,
        DataType::I64,
        DataType::U64,
    ];

    pub fn size_in_bits(&self) -> usize {
        match self {
            DataType::BF16 => 16,
            DataType::F16 => 16,
            DataType::F32 => 32,
            DataType::F64 => 64,
            DataType::I4 => 4,
            DataType::U4 => 4,
            DataType::I8 => 8,
            DataType::U8 => 8,
            DataType::I16 => 16,
            DataType::U16 => 16,
            DataType::I32 => 32,
            DataType::U32 => 32,
            DataType::I64 => 64,
            DataType::U64 => 64,
        }
    }

    pub fn size_in_bytes(&self) -> usize {
        self.size_in_bits().div_ceil(8)
    }

    pub fn is_floating_point(&self) -> bool {
        matches!(self, DataType::BF16 | DataType::F16 | DataType::F32 | DataType::F64)
    }

    pub fn is_integer(&self) -> bool {
        !self.is_floating_point()
    }

    pub fn is_signed(&self) -> bool {
        !matches!(self, DataType::U4 | DataType::U8 | DataType::U16 | DataType::U32 | DataType::U64)
    }

    /// Unit round-off of a floating type, zero for integers.
    pub fn epsilon(&self) -> f64 {
        match self {
            DataType::BF16 => 2f64.powi(-8),
            DataType::F16 => 2f64.powi(-11),
            DataType::F32 => 2f64.powi(-24),
            DataType::F64 => 2f64.powi(-53),
            _ => 0.0,
        }
    }

    /// Largest magnitude the type can represent (finite values only).
    pub fn max_value(&self) -> f64 {
        match self {
            DataType::BF16 => bf16::MAX.to_f64(),
            DataType::F16 => f16::MAX.to_f64(),
            DataType::F32 => f32::MAX as f64,
            DataType::F64 => f64::MAX,
            DataType::I4 => 7.0,
            DataType::U4 => 15.0,
            DataType::I8 => i8::MAX as f64,
            DataType::U8 => u8::MAX as f64,
            DataType::I16 => i16::MAX as f64,
            DataType::U16 => u16::MAX as f64,
            DataType::I32 => i32::MAX as f64,
            DataType::U32 => u32::MAX as f64,
            DataType::I64 => i64::MAX as f64,
            DataType::U64 => u64::MAX as f64,
        }
    }

    pub fn min_value(&self) -> f64 {
        match self {
            DataType::I4 => -8.0,
            DataType::I8 => i8::MIN as f64,
            DataType::I16 => i16::MIN as f64,
            DataType::I32 => i32::MIN as f64,
            DataType::I64 => i64::MIN as f64,
            dtype if dtype.is_floating_point() => -dtype.max_value(),
            _ => 0.0,
        }
    }

    /// Largest integer `n` such that every integer in `[-n, n]` is exactly representable.
    pub fn exact_integer_limit(&self) -> f64 {
        match self {
            DataType::BF16 => 256.0,
            DataType::F16 => 2048.0,
            DataType::F32 => 16_777_216.0,
            DataType::F64 => 9_007_199_254_740_992.0,
            dtype => dtype.max_value(),
        }
    }

    /// Rounds `value` to the nearest representable value, saturating integers to their range.
    pub fn round(
        &self,
        value: f64,
    ) -> f64 {
        match self {
            DataType::BF16 => bf16::from_f64(value).to_f64(),
            DataType::F16 => f16::from_f64(value).to_f64(),
            DataType::F32 => value as f32 as f64,
            DataType::F64 => value,
            dtype => {
                if value.is_nan() {
                    0.0
                } else {
                    value.round().clamp(dtype.min_value(), dtype.max_value())
                }
            },
        }
    }

    pub fn short_name(&self) -> &'static str {
        match self {
            DataType::BF16 => "bf16",
            DataType::F16 => "f16",
            DataType::F32 => "f32",
            DataType::F64 => "f64",
            DataType::I4 => "s4",
            DataType::U4 => "u4",
            DataType::I8 => "s8",
            DataType::U8 => "u8",
            DataType::I16 => "s16",
            DataType::U16 => "u16",
            DataType::I32 => "s32",
            DataType::U32 => "u32",
            DataType::I64 => "s64",
            DataType::U64 => "u64",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataType::ALL
            .into_iter()
            .find(|dtype| dtype.short_name() == s)
            .ok_or_else(|| format!("unknown data type `{s}`"))
    }
}

pub trait ArrayElement: NumCast + Pod {
    fn data_type() -> DataType;
}

macro_rules! array_elements {
    ($($element:ty => $data_type:ident),+ $(,)?) => {
        $(
            impl ArrayElement for $element {
                fn data_type() -> DataType {
                    DataType::$data_type
                }
            }
        )+
    };
}

array_elements! {
    f16 => F16,
    bf16 => BF16,
    f32 => F32,
    f64 => F64,
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_names_round_trip() {
        for dtype in DataType::ALL {
            assert_eq!(dtype.short_name().parse::<DataType>(), Ok(dtype));
        }
        assert!("f8".parse::<DataType>().is_err());
    }

    #[test]
    fn serde_uses_short_names() {
        let json = serde_json::to_string(&DataType::I8).unwrap();
        assert_eq!(json, "\"s8\"");
        let parsed: DataType = serde_json::from_str("\"bf16\"").unwrap();
        assert_eq!(parsed, DataType::BF16);
    }

    #[test]
    fn rounding_saturates_integers() {
        assert_eq!(DataType::I8.round(300.0), 127.0);
        assert_eq!(DataType::U8.round(-3.0), 0.0);
        assert_eq!(DataType::I4.round(-2.6), -3.0);
        assert_eq!(DataType::F16.round(2049.0), 2048.0);
    }

    #[test]
    fn sub_byte_types_round_up_to_a_byte() {
        assert_eq!(DataType::I4.size_in_bytes(), 1);
        assert_eq!(DataType::F64.size_in_bytes(), 8);
    }

    #[test]
    fn array_elements_match_their_data_type() {
        let elements = [
            (f16::data_type(), 16),
            (bf16::data_type(), 16),
            (f32::data_type(), 32),
            (f64::data_type(), 64),
            (i8::data_type(), 8),
            (u8::data_type(), 8),
            (i16::data_type(), 16),
            (u16::data_type(), 16),
            (i32::data_type(), 32),
            (u32::data_type(), 32),
            (i64::data_type(), 64),
            (u64::data_type(), 64),
        ];
        for (data_type, bits) in elements {
            assert_eq!(data_type.size_in_bits(), bits, "{data_type}");
        }
        assert_eq!(f16::data_type(), DataType::F16);
        assert_eq!(bf16::data_type(), DataType::BF16);
        assert_eq!(u32::data_type(), DataType::U32);
    }
}
