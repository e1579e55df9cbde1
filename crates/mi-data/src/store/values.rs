//! Arrow to SQLite value conversion

use arrow::array::{Array, AsArray};
use arrow::datatypes::{
    DataType, Float32Type, Float64Type, Int16Type, Int32Type, Int64Type, Int8Type, TimeUnit,
    TimestampNanosecondType, UInt16Type, UInt32Type, UInt64Type, UInt8Type,
};
use chrono::SecondsFormat;
use rusqlite::types::Value;

use crate::sources::tdms::types::nanos_to_datetime;
use crate::DataError;

/// Declared SQLite type for a column.
///
/// `epoch_ns` marks the time column, which is stored as integer nanoseconds.
pub(crate) fn sql_type(data_type: &DataType, epoch_ns: bool) -> Result<&'static str, DataError> {
    let sql = match data_type {
        DataType::Timestamp(TimeUnit::Nanosecond, _) if epoch_ns => "INTEGER",
        DataType::Timestamp(TimeUnit::Nanosecond, _) => "TEXT",
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64
        | DataType::Boolean => "INTEGER",
        DataType::Float32 | DataType::Float64 => "REAL",
        DataType::Utf8 => "TEXT",
        other => {
            return Err(DataError::StoreValue(format!(
                "no store type for arrow type {:?}",
                other
            )))
        }
    };
    Ok(sql)
}

macro_rules! primitive_values {
    ($array:expr, $ty:ty, $convert:expr) => {{
        let array = $array.as_primitive::<$ty>();
        (0..array.len())
            .map(|i| {
                if array.is_null(i) {
                    Ok(Value::Null)
                } else {
                    $convert(array.value(i))
                }
            })
            .collect()
    }};
}

/// Every value of a column, in row order
pub(crate) fn column_values(array: &dyn Array, epoch_ns: bool) -> Result<Vec<Value>, DataError> {
    match array.data_type() {
        DataType::Int8 => primitive_values!(array, Int8Type, |v: i8| Ok(Value::Integer(v as i64))),
        DataType::Int16 => primitive_values!(array, Int16Type, |v: i16| Ok(Value::Integer(v as i64))),
        DataType::Int32 => primitive_values!(array, Int32Type, |v: i32| Ok(Value::Integer(v as i64))),
        DataType::Int64 => primitive_values!(array, Int64Type, |v: i64| Ok(Value::Integer(v))),
        DataType::UInt8 => primitive_values!(array, UInt8Type, |v: u8| Ok(Value::Integer(v as i64))),
        DataType::UInt16 => primitive_values!(array, UInt16Type, |v: u16| Ok(Value::Integer(v as i64))),
        DataType::UInt32 => primitive_values!(array, UInt32Type, |v: u32| Ok(Value::Integer(v as i64))),
        DataType::UInt64 => primitive_values!(array, UInt64Type, |v: u64| {
            i64::try_from(v)
                .map(Value::Integer)
                .map_err(|_| DataError::StoreValue(format!("{} does not fit a signed 64-bit integer", v)))
        }),
        DataType::Float32 => primitive_values!(array, Float32Type, |v: f32| Ok(Value::Real(v as f64))),
        DataType::Float64 => primitive_values!(array, Float64Type, |v: f64| Ok(Value::Real(v))),
        DataType::Timestamp(TimeUnit::Nanosecond, _) if epoch_ns => {
            primitive_values!(array, TimestampNanosecondType, |v: i64| Ok(Value::Integer(v)))
        }
        DataType::Timestamp(TimeUnit::Nanosecond, _) => {
            primitive_values!(array, TimestampNanosecondType, |v: i64| Ok(Value::Text(
                nanos_to_datetime(v).to_rfc3339_opts(SecondsFormat::Nanos, true)
            )))
        }
        DataType::Boolean => {
            let array = array.as_boolean();
            Ok((0..array.len())
                .map(|i| {
                    if array.is_null(i) {
                        Value::Null
                    } else {
                        Value::Integer(array.value(i) as i64)
                    }
                })
                .collect())
        }
        DataType::Utf8 => {
            let array = array.as_string::<i32>();
            Ok((0..array.len())
                .map(|i| {
                    if array.is_null(i) {
                        Value::Null
                    } else {
                        Value::Text(array.value(i).to_string())
                    }
                })
                .collect())
        }
        other => Err(DataError::StoreValue(format!(
            "no store type for arrow type {:?}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{BooleanArray, StringArray, TimestampNanosecondArray, UInt64Array};

    #[test]
    fn test_time_column_is_integer() {
        let array = TimestampNanosecondArray::from(vec![1_500_000_000]).with_timezone("UTC");
        assert_eq!(sql_type(array.data_type(), true).unwrap(), "INTEGER");
        assert_eq!(column_values(&array, true).unwrap(), vec![Value::Integer(1_500_000_000)]);
    }

    #[test]
    fn test_timestamp_data_is_rfc3339() {
        let array = TimestampNanosecondArray::from(vec![1_500_000_000]).with_timezone("UTC");
        assert_eq!(sql_type(array.data_type(), false).unwrap(), "TEXT");
        assert_eq!(
            column_values(&array, false).unwrap(),
            vec![Value::Text("1970-01-01T00:00:01.500000000Z".to_string())]
        );
    }

    #[test]
    fn test_nulls_and_text() {
        let array = StringArray::from(vec![Some("x"), None]);
        assert_eq!(
            column_values(&array, false).unwrap(),
            vec![Value::Text("x".to_string()), Value::Null]
        );
        let array = BooleanArray::from(vec![true, false]);
        assert_eq!(
            column_values(&array, false).unwrap(),
            vec![Value::Integer(1), Value::Integer(0)]
        );
    }

    #[test]
    fn test_u64_overflow() {
        let array = UInt64Array::from(vec![u64::MAX]);
        assert!(matches!(column_values(&array, false), Err(DataError::StoreValue(_))));
    }
}
