//! TDMS to store ingest pipeline

use mi_core::{CollisionPolicy, IngestOptions, MeasurementSource, SourcePath, Table};
use serde::Serialize;
use tracing::info;

use crate::sources::TdmsFile;
use crate::store::Store;
use crate::DataError;

/// Outcome of a committed ingest
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub table_name: String,
    pub store_path: String,
    /// Rows in the source table before the row limit
    pub rows_read: usize,
    /// Rows in the committed table
    pub rows_written: usize,
    /// Column names in table order, starting with `index`
    pub columns: Vec<String>,
}

/// Ingest the TDMS file whose path is `buffer` into `table_name`.
///
/// The table is replaced. With a `row_limit` only the first rows of the
/// time-indexed table are kept.
pub fn ingest(
    buffer: &[u8],
    store_path: &str,
    table_name: &str,
    row_limit: Option<usize>,
) -> Result<IngestReport, DataError> {
    let options = IngestOptions::new(store_path, table_name).with_row_limit(row_limit);
    ingest_with(buffer, &options)
}

/// Same as [`ingest`] with every parameter in one struct
pub fn ingest_with(buffer: &[u8], options: &IngestOptions) -> Result<IngestReport, DataError> {
    let table = load_table(buffer, options.collision_policy)?;
    let mut store = Store::open(&options.store_path)?;
    ingest_table(&mut store, &table, options)
}

/// Ingest into a store the caller keeps open.
///
/// `options.store_path` is ignored in favour of `store`; this is the way to
/// ingest into a `:memory:` store and query it afterwards.
pub fn ingest_into(
    store: &mut Store,
    buffer: &[u8],
    options: &IngestOptions,
) -> Result<IngestReport, DataError> {
    let table = load_table(buffer, options.collision_policy)?;
    ingest_table(store, &table, options)
}

/// Ingest any measurement source
pub fn ingest_source<S>(
    store: &mut Store,
    source: &S,
    options: &IngestOptions,
) -> Result<IngestReport, DataError>
where
    S: MeasurementSource<Error = DataError>,
{
    let table = prepare_table(source, options.collision_policy)?;
    ingest_table(store, &table, options)
}

/// Decode `buffer`, read the TDMS file and build the normalized table
pub fn load_table(buffer: &[u8], policy: CollisionPolicy) -> Result<Table, DataError> {
    let path = SourcePath::from_bytes(buffer)?;
    let file = TdmsFile::open(path.as_path())?;
    prepare_table(&file, policy)
}

fn prepare_table<S>(source: &S, policy: CollisionPolicy) -> Result<Table, DataError>
where
    S: MeasurementSource<Error = DataError>,
{
    let table = source.to_table()?;
    info!(
        "Built time index for {}: {} rows, {} data columns",
        source.source_name(),
        table.num_rows(),
        table.num_columns() - 1
    );

    let table = table.normalized(policy)?;
    info!("Columns: {}", table.column_names().join(", "));
    Ok(table)
}

/// Write an already built table, replacing `options.table_name`
pub fn ingest_table(
    store: &mut Store,
    table: &Table,
    options: &IngestOptions,
) -> Result<IngestReport, DataError> {
    let rows_written = store.replace_table(&options.table_name, table, options.row_limit)?;
    Ok(IngestReport {
        table_name: options.table_name.clone(),
        store_path: store.location().to_string(),
        rows_read: table.num_rows(),
        rows_written,
        columns: table.column_names(),
    })
}
