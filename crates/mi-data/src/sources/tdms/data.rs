//! Decoded channel values

use std::sync::Arc;

use arrow::array::{
    ArrayRef, BooleanArray, Float32Array, Float64Array, Int16Array, Int32Array, Int64Array,
    Int8Array, StringArray, TimestampNanosecondArray, UInt16Array, UInt32Array, UInt64Array,
    UInt8Array,
};
use mi_core::table::TIME_ZONE;

use super::reader::ByteReader;
use super::types::TdsType;
use crate::DataError;

/// All values of one channel, accumulated over every segment
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelData {
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    U64(Vec<u64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    Bool(Vec<bool>),
    String(Vec<String>),
    /// Nanoseconds since the Unix epoch
    Timestamp(Vec<i64>),
}

impl ChannelData {
    pub fn empty(data_type: TdsType) -> Result<Self, DataError> {
        let data = match data_type {
            TdsType::I8 => ChannelData::I8(Vec::new()),
            TdsType::I16 => ChannelData::I16(Vec::new()),
            TdsType::I32 => ChannelData::I32(Vec::new()),
            TdsType::I64 => ChannelData::I64(Vec::new()),
            TdsType::U8 => ChannelData::U8(Vec::new()),
            TdsType::U16 => ChannelData::U16(Vec::new()),
            TdsType::U32 => ChannelData::U32(Vec::new()),
            TdsType::U64 => ChannelData::U64(Vec::new()),
            TdsType::SingleFloat => ChannelData::F32(Vec::new()),
            TdsType::DoubleFloat => ChannelData::F64(Vec::new()),
            TdsType::Boolean => ChannelData::Bool(Vec::new()),
            TdsType::String => ChannelData::String(Vec::new()),
            TdsType::TimeStamp => ChannelData::Timestamp(Vec::new()),
            TdsType::Void => {
                return Err(DataError::SourceFormat("void typed channel data".to_string()))
            }
        };
        Ok(data)
    }

    pub fn data_type(&self) -> TdsType {
        match self {
            ChannelData::I8(_) => TdsType::I8,
            ChannelData::I16(_) => TdsType::I16,
            ChannelData::I32(_) => TdsType::I32,
            ChannelData::I64(_) => TdsType::I64,
            ChannelData::U8(_) => TdsType::U8,
            ChannelData::U16(_) => TdsType::U16,
            ChannelData::U32(_) => TdsType::U32,
            ChannelData::U64(_) => TdsType::U64,
            ChannelData::F32(_) => TdsType::SingleFloat,
            ChannelData::F64(_) => TdsType::DoubleFloat,
            ChannelData::Bool(_) => TdsType::Boolean,
            ChannelData::String(_) => TdsType::String,
            ChannelData::Timestamp(_) => TdsType::TimeStamp,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ChannelData::I8(v) => v.len(),
            ChannelData::I16(v) => v.len(),
            ChannelData::I32(v) => v.len(),
            ChannelData::I64(v) => v.len(),
            ChannelData::U8(v) => v.len(),
            ChannelData::U16(v) => v.len(),
            ChannelData::U32(v) => v.len(),
            ChannelData::U64(v) => v.len(),
            ChannelData::F32(v) => v.len(),
            ChannelData::F64(v) => v.len(),
            ChannelData::Bool(v) => v.len(),
            ChannelData::String(v) => v.len(),
            ChannelData::Timestamp(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read one fixed width value
    pub(crate) fn push_value(&mut self, reader: &mut ByteReader<'_>) -> Result<(), DataError> {
        match self {
            ChannelData::I8(v) => v.push(reader.read_i8()?),
            ChannelData::I16(v) => v.push(reader.read_i16()?),
            ChannelData::I32(v) => v.push(reader.read_i32()?),
            ChannelData::I64(v) => v.push(reader.read_i64()?),
            ChannelData::U8(v) => v.push(reader.read_u8()?),
            ChannelData::U16(v) => v.push(reader.read_u16()?),
            ChannelData::U32(v) => v.push(reader.read_u32()?),
            ChannelData::U64(v) => v.push(reader.read_u64()?),
            ChannelData::F32(v) => v.push(reader.read_f32()?),
            ChannelData::F64(v) => v.push(reader.read_f64()?),
            ChannelData::Bool(v) => v.push(reader.read_u8()? != 0),
            ChannelData::Timestamp(v) => v.push(reader.read_timestamp_nanos()?),
            ChannelData::String(_) => {
                return Err(DataError::SourceFormat(
                    "string values are only stored contiguously".to_string(),
                ))
            }
        }
        Ok(())
    }

    /// Read `count` contiguous values occupying `total_size` bytes
    pub(crate) fn extend_from(
        &mut self,
        reader: &mut ByteReader<'_>,
        count: usize,
        total_size: usize,
    ) -> Result<(), DataError> {
        let start = reader.position();
        match self {
            ChannelData::String(values) => {
                // An offset table of cumulative end positions precedes the text.
                let mut ends = Vec::with_capacity(count);
                for _ in 0..count {
                    ends.push(reader.read_u32()? as usize);
                }
                let text = reader.take(ends.last().copied().unwrap_or(0))?;
                let mut from = 0usize;
                for end in ends {
                    let bytes = text.get(from..end).ok_or_else(|| {
                        DataError::SourceFormat(format!("string offset {} out of order", end))
                    })?;
                    let value = std::str::from_utf8(bytes).map_err(|e| {
                        DataError::SourceFormat(format!("string value is not valid UTF-8: {}", e))
                    })?;
                    values.push(value.to_string());
                    from = end;
                }
            }
            _ => {
                for _ in 0..count {
                    self.push_value(reader)?;
                }
            }
        }

        let consumed = reader.position() - start;
        if consumed < total_size {
            reader.take(total_size - consumed)?;
        } else if consumed > total_size {
            return Err(DataError::SourceFormat(format!(
                "channel data used {} bytes but the index declares {}",
                consumed, total_size
            )));
        }
        Ok(())
    }

    /// Arrow array of the values
    pub fn to_array(&self) -> ArrayRef {
        match self {
            ChannelData::I8(v) => Arc::new(Int8Array::from(v.clone())),
            ChannelData::I16(v) => Arc::new(Int16Array::from(v.clone())),
            ChannelData::I32(v) => Arc::new(Int32Array::from(v.clone())),
            ChannelData::I64(v) => Arc::new(Int64Array::from(v.clone())),
            ChannelData::U8(v) => Arc::new(UInt8Array::from(v.clone())),
            ChannelData::U16(v) => Arc::new(UInt16Array::from(v.clone())),
            ChannelData::U32(v) => Arc::new(UInt32Array::from(v.clone())),
            ChannelData::U64(v) => Arc::new(UInt64Array::from(v.clone())),
            ChannelData::F32(v) => Arc::new(Float32Array::from(v.clone())),
            ChannelData::F64(v) => Arc::new(Float64Array::from(v.clone())),
            ChannelData::Bool(v) => Arc::new(BooleanArray::from(v.clone())),
            ChannelData::String(v) => Arc::new(StringArray::from(v.clone())),
            ChannelData::Timestamp(v) => {
                Arc::new(TimestampNanosecondArray::from(v.clone()).with_timezone(TIME_ZONE))
            }
        }
    }
}
