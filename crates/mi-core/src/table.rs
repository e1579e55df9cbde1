//! Time-indexed table model
//!
//! A [`Table`] is an arrow [`RecordBatch`] whose first column is the absolute
//! time of each row, stored as UTC nanoseconds under the reserved name
//! [`TIME_COLUMN`]. All other columns are data channels in source order.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, TimestampNanosecondArray, UInt32Array};
use arrow::compute::take;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit, TimestampNanosecondType};
use arrow::record_batch::RecordBatch;

use crate::config::CollisionPolicy;
use crate::naming::resolve_column_names;
use crate::CoreError;

/// Reserved name of the leading time column
pub const TIME_COLUMN: &str = "index";

/// Timezone attached to the time column
pub const TIME_ZONE: &str = "UTC";

/// A data column before alignment: its values and the absolute time of each
/// value in nanoseconds since the Unix epoch.
#[derive(Debug, Clone)]
pub struct TimedColumn {
    pub name: String,
    pub times_ns: Vec<i64>,
    pub values: ArrayRef,
}

impl TimedColumn {
    pub fn new(name: impl Into<String>, times_ns: Vec<i64>, values: ArrayRef) -> Self {
        Self {
            name: name.into(),
            times_ns,
            values,
        }
    }
}

/// Arrow type of the time column
pub fn time_data_type() -> DataType {
    DataType::Timestamp(TimeUnit::Nanosecond, Some(TIME_ZONE.into()))
}

/// Row/column table with a leading time column
#[derive(Debug, Clone)]
pub struct Table {
    batch: RecordBatch,
}

impl Table {
    /// Wrap a batch, checking that column 0 is a nanosecond timestamp
    pub fn new(batch: RecordBatch) -> Result<Self, CoreError> {
        let schema = batch.schema();
        let first = schema
            .fields()
            .first()
            .ok_or_else(|| CoreError::InvalidTimeColumn("table has no columns".to_string()))?;

        match first.data_type() {
            DataType::Timestamp(TimeUnit::Nanosecond, _) => {}
            other => {
                return Err(CoreError::InvalidTimeColumn(format!(
                    "leading column '{}' is {:?}, expected a nanosecond timestamp",
                    first.name(),
                    other
                )))
            }
        }
        if batch.column(0).null_count() > 0 {
            return Err(CoreError::InvalidTimeColumn(format!(
                "leading column '{}' contains nulls",
                first.name()
            )));
        }

        Ok(Self { batch })
    }

    /// Build a table from independently timed columns.
    ///
    /// Columns that share one time track are laid side by side in source
    /// order. Otherwise the rows are the sorted union of all timestamps and a
    /// column is null where it has no sample.
    pub fn from_timed_columns(columns: Vec<TimedColumn>) -> Result<Self, CoreError> {
        for column in &columns {
            if column.times_ns.len() != column.values.len() {
                return Err(CoreError::LengthMismatch {
                    column: column.name.clone(),
                    times: column.times_ns.len(),
                    values: column.values.len(),
                });
            }
        }

        let shared = match columns.first() {
            Some(first) => columns.iter().all(|c| c.times_ns == first.times_ns),
            None => true,
        };

        let (times, arrays) = if shared {
            let times = columns.first().map(|c| c.times_ns.clone()).unwrap_or_default();
            let arrays: Vec<ArrayRef> = columns.iter().map(|c| c.values.clone()).collect();
            (times, arrays)
        } else {
            Self::align_on_union(&columns)?
        };

        let mut fields = Vec::with_capacity(columns.len() + 1);
        fields.push(Field::new(TIME_COLUMN, time_data_type(), false));
        for (column, array) in columns.iter().zip(&arrays) {
            fields.push(Field::new(&column.name, array.data_type().clone(), true));
        }

        let mut all_arrays: Vec<ArrayRef> = Vec::with_capacity(arrays.len() + 1);
        all_arrays.push(Arc::new(
            TimestampNanosecondArray::from(times).with_timezone(TIME_ZONE),
        ));
        all_arrays.extend(arrays);

        let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), all_arrays)?;
        Self::new(batch)
    }

    fn align_on_union(columns: &[TimedColumn]) -> Result<(Vec<i64>, Vec<ArrayRef>), CoreError> {
        let mut union: Vec<i64> = columns.iter().flat_map(|c| c.times_ns.iter().copied()).collect();
        union.sort_unstable();
        union.dedup();

        let mut arrays = Vec::with_capacity(columns.len());
        for column in columns {
            let mut sorted: Vec<(i64, u32)> = column
                .times_ns
                .iter()
                .enumerate()
                .map(|(i, t)| (*t, i as u32))
                .collect();
            sorted.sort_unstable();
            if sorted.windows(2).any(|w| w[0].0 == w[1].0) {
                return Err(CoreError::AmbiguousTimeIndex(column.name.clone()));
            }

            // Both lists are sorted, so a single merge walk finds each sample.
            let mut indices: Vec<Option<u32>> = Vec::with_capacity(union.len());
            let mut cursor = sorted.iter().peekable();
            for t in &union {
                match cursor.peek() {
                    Some((time, idx)) if time == t => {
                        indices.push(Some(*idx));
                        cursor.next();
                    }
                    _ => indices.push(None),
                }
            }

            let indices = UInt32Array::from(indices);
            arrays.push(take(column.values.as_ref(), &indices, None)?);
        }

        Ok((union, arrays))
    }

    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn into_batch(self) -> RecordBatch {
        self.batch
    }

    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    /// Number of columns including the time column
    pub fn num_columns(&self) -> usize {
        self.batch.num_columns()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    /// Names of every column after the time column
    pub fn data_column_names(&self) -> Vec<String> {
        self.column_names().into_iter().skip(1).collect()
    }

    /// The time column as nanoseconds since the Unix epoch
    pub fn time_column(&self) -> &TimestampNanosecondArray {
        // Table::new guarantees the type of column 0.
        self.batch.column(0).as_primitive::<TimestampNanosecondType>()
    }

    /// Replace the data column names, keeping the time column name reserved
    pub fn with_data_column_names(&self, names: Vec<String>) -> Result<Self, CoreError> {
        let schema = self.batch.schema();
        let expected = schema.fields().len() - 1;
        if names.len() != expected {
            return Err(CoreError::ColumnCount {
                expected,
                actual: names.len(),
            });
        }

        let mut fields = Vec::with_capacity(expected + 1);
        fields.push(schema.field(0).clone().with_name(TIME_COLUMN));
        for (field, name) in schema.fields().iter().skip(1).zip(names) {
            fields.push(field.as_ref().clone().with_name(name));
        }

        let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), self.batch.columns().to_vec())?;
        Self::new(batch)
    }

    /// Normalize every data column name under the given collision policy
    pub fn normalized(&self, policy: CollisionPolicy) -> Result<Self, CoreError> {
        let names = resolve_column_names(&self.data_column_names(), policy)?;
        self.with_data_column_names(names)
    }

    /// The first `n` rows in table order
    pub fn head(&self, n: usize) -> Self {
        let len = n.min(self.num_rows());
        Self {
            batch: self.batch.slice(0, len),
        }
    }
}
