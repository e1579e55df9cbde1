//! TDMS data type codes, property values and timestamps

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::DataError;

/// Seconds between the TDMS epoch (1904-01-01 UTC) and the Unix epoch
const TDMS_EPOCH_OFFSET_SECS: i64 = 2_082_844_800;

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Type code of a raw data channel or property
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TdsType {
    Void,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    SingleFloat,
    DoubleFloat,
    String,
    Boolean,
    TimeStamp,
}

impl TdsType {
    /// Decode a type code, rejecting types this reader does not handle
    pub fn from_code(code: u32) -> Result<Self, DataError> {
        let data_type = match code {
            0x00 => TdsType::Void,
            0x01 => TdsType::I8,
            0x02 => TdsType::I16,
            0x03 => TdsType::I32,
            0x04 => TdsType::I64,
            0x05 => TdsType::U8,
            0x06 => TdsType::U16,
            0x07 => TdsType::U32,
            0x08 => TdsType::U64,
            0x09 | 0x19 => TdsType::SingleFloat,
            0x0A | 0x1A => TdsType::DoubleFloat,
            0x20 => TdsType::String,
            0x21 => TdsType::Boolean,
            0x44 => TdsType::TimeStamp,
            0x0B | 0x1B => {
                return Err(DataError::Unsupported("extended precision floats".to_string()))
            }
            0x4F => return Err(DataError::Unsupported("fixed point data".to_string())),
            0x08_000C | 0x10_000D => {
                return Err(DataError::Unsupported("complex valued data".to_string()))
            }
            0xFFFF_FFFF => return Err(DataError::Unsupported("DAQmx raw data".to_string())),
            other => {
                return Err(DataError::SourceFormat(format!(
                    "unknown data type code 0x{:X}",
                    other
                )))
            }
        };
        Ok(data_type)
    }

    pub fn code(&self) -> u32 {
        match self {
            TdsType::Void => 0x00,
            TdsType::I8 => 0x01,
            TdsType::I16 => 0x02,
            TdsType::I32 => 0x03,
            TdsType::I64 => 0x04,
            TdsType::U8 => 0x05,
            TdsType::U16 => 0x06,
            TdsType::U32 => 0x07,
            TdsType::U64 => 0x08,
            TdsType::SingleFloat => 0x09,
            TdsType::DoubleFloat => 0x0A,
            TdsType::String => 0x20,
            TdsType::Boolean => 0x21,
            TdsType::TimeStamp => 0x44,
        }
    }

    /// Width of one value in bytes, `None` for strings
    pub fn size(&self) -> Option<usize> {
        match self {
            TdsType::Void => Some(0),
            TdsType::I8 | TdsType::U8 | TdsType::Boolean => Some(1),
            TdsType::I16 | TdsType::U16 => Some(2),
            TdsType::I32 | TdsType::U32 | TdsType::SingleFloat => Some(4),
            TdsType::I64 | TdsType::U64 | TdsType::DoubleFloat => Some(8),
            TdsType::TimeStamp => Some(16),
            TdsType::String => None,
        }
    }
}

/// Value of an object property
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    String(String),
    Timestamp(DateTime<Utc>),
}

impl PropertyValue {
    /// Numeric view used for waveform timing
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Int(v) => Some(*v as f64),
            PropertyValue::UInt(v) => Some(*v as f64),
            PropertyValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            PropertyValue::Timestamp(t) => Some(*t),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Int(v) => write!(f, "{}", v),
            PropertyValue::UInt(v) => write!(f, "{}", v),
            PropertyValue::Float(v) => write!(f, "{}", v),
            PropertyValue::Bool(v) => write!(f, "{}", v),
            PropertyValue::String(v) => write!(f, "{}", v),
            PropertyValue::Timestamp(v) => write!(f, "{}", v.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        }
    }
}

/// Convert a TDMS timestamp (whole seconds since 1904 plus 2^-64 fractions)
/// to nanoseconds since the Unix epoch
pub fn timestamp_to_unix_nanos(seconds: i64, fractions: u64) -> Result<i64, DataError> {
    let nanos = ((fractions as u128 * NANOS_PER_SEC as u128) >> 64) as i64;
    seconds
        .checked_sub(TDMS_EPOCH_OFFSET_SECS)
        .and_then(|s| s.checked_mul(NANOS_PER_SEC))
        .and_then(|s| s.checked_add(nanos))
        .ok_or_else(|| {
            DataError::SourceFormat(format!(
                "timestamp of {} seconds since 1904 is out of range",
                seconds
            ))
        })
}

/// Inverse of [`timestamp_to_unix_nanos`], used when writing test files
pub fn unix_nanos_to_timestamp(nanos: i64) -> (i64, u64) {
    let seconds = nanos.div_euclid(NANOS_PER_SEC) + TDMS_EPOCH_OFFSET_SECS;
    let sub = nanos.rem_euclid(NANOS_PER_SEC) as u128;
    // Round up so the truncating decode lands back on the same nanosecond.
    let fractions = ((sub << 64) + NANOS_PER_SEC as u128 - 1) / NANOS_PER_SEC as u128;
    (seconds, fractions as u64)
}

/// UTC date time for a nanosecond Unix timestamp
pub fn nanos_to_datetime(nanos: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_nanos(nanos)
}
