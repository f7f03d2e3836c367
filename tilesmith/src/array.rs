use half::{bf16, f16};
use num_traits::{NumCast, ToPrimitive};
use thiserror::Error;

use crate::{ArrayElement, DataType};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArrayError {
    #[error("{0} elements cannot be stored in host arrays")]
    UnsupportedElement(DataType),
    #[error("{bytes} bytes is not a whole number of {data_type} elements")]
    PartialElement {
        bytes: usize,
        data_type: DataType,
    },
}

/// Bytes occupied by a dense array of `shape`, rows padded to whole bytes.
pub fn size_for_shape(
    shape: &[usize],
    data_type: DataType,
) -> usize {
    let Some(last_dim) = shape.last() else {
        return data_type.size_in_bytes();
    };

    let bits_per_row = last_dim * data_type.size_in_bits();
    let padded_bytes_per_row = bits_per_row.div_ceil(8);

    let num_rows: usize = shape.iter().rev().skip(1).product();

    num_rows * padded_bytes_per_row
}

fn encode_as<T: ArrayElement>(values: &[f64]) -> Vec<u8> {
    let elements: Vec<T> =
        values.iter().map(|value| <T as NumCast>::from(*value).unwrap_or_else(T::zeroed)).collect();
    bytemuck::cast_slice(&elements).to_vec()
}

fn decode_as<T: ArrayElement>(bytes: &[u8]) -> Result<Vec<f64>, ArrayError> {
    if bytes.len() % size_of::<T>() != 0 {
        return Err(ArrayError::PartialElement {
            bytes: bytes.len(),
            data_type: T::data_type(),
        });
    }
    let elements: Vec<T> = bytemuck::pod_collect_to_vec(bytes);
    Ok(elements.iter().map(|element| element.to_f64().unwrap_or(0.0)).collect())
}

/// Rounds each value to `data_type` and packs the result in its native byte layout.
pub fn encode_elements(
    data_type: DataType,
    values: &[f64],
) -> Result<Vec<u8>, ArrayError> {
    let rounded: Vec<f64> = values.iter().map(|value| data_type.round(*value)).collect();
    let bytes = match data_type {
        DataType::BF16 => encode_as::<bf16>(&rounded),
        DataType::F16 => encode_as::<f16>(&rounded),
        DataType::F32 => encode_as::<f32>(&rounded),
        DataType::F64 => encode_as::<f64>(&rounded),
        DataType::I8 => encode_as::<i8>(&rounded),
        DataType::U8 => encode_as::<u8>(&rounded),
        DataType::I16 => encode_as::<i16>(&rounded),
        DataType::U16 => encode_as::<u16>(&rounded),
        DataType::I32 => encode_as::<i32>(&rounded),
        DataType::U32 => encode_as::<u32>(&rounded),
        DataType::I64 => encode_as::<i64>(&rounded),
        DataType::U64 => encode_as::<u64>(&rounded),
        DataType::I4 | DataType::U4 => return Err(ArrayError::UnsupportedElement(data_type)),
    };
    Ok(bytes)
}

pub fn decode_elements(
    data_type: DataType,
    bytes: &[u8],
) -> Result<Vec<f64>, ArrayError> {
    match data_type {
        DataType::BF16 => decode_as::<bf16>(bytes),
        DataType::F16 => decode_as::<f16>(bytes),
        DataType::F32 => decode_as::<f32>(bytes),
        DataType::F64 => decode_as::<f64>(bytes),
        DataType::I8 => decode_as::<i8>(bytes),
        DataType::U8 => decode_as::<u8>(bytes),
        DataType::I16 => decode_as::<i16>(bytes),
        DataType::U16 => decode_as::<u16>(bytes),
        DataType::I32 => decode_as::<i32>(bytes),
        DataType::U32 => decode_as::<u32>(bytes),
        DataType::I64 => decode_as::<i64>(bytes),
        DataType::U64 => decode_as::<u64>(bytes),
        DataType::I4 | DataType::U4 => Err(ArrayError::UnsupportedElement(data_type)),
    }
}
