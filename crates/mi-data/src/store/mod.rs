//! Embedded analytical store
//!
//! SQLite is the store engine. A [`Store`] owns one connection; tables are
//! replaced atomically by staging the rows in a temporary table and swapping
//! inside a single transaction, so a failed write leaves the previous table
//! untouched.

mod values;

use std::path::Path;

use mi_core::{Table, IN_MEMORY_STORE, TIME_COLUMN};
use rusqlite::{params_from_iter, Connection};
use tracing::{debug, info};

use crate::DataError;

const STAGING_TABLE: &str = "mi_staging";
const STAGING_KEY: &str = "mi_seq";

/// Quote an identifier for use in SQL text
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Connection to the analytical store
pub struct Store {
    conn: Connection,
    location: String,
}

impl Store {
    /// Open the store at `store_path`, creating it if absent.
    /// `:memory:` opens a store that lives as long as this value.
    pub fn open(store_path: &str) -> Result<Self, DataError> {
        let conn = if store_path == IN_MEMORY_STORE {
            Connection::open_in_memory()?
        } else {
            Connection::open(Path::new(store_path))?
        };

        let store = Self {
            conn,
            location: store_path.to_string(),
        };
        let settings = store.verify()?;
        debug!("Connected to store {} ({} compile options)", store.location, settings.len());
        Ok(store)
    }

    /// Path the store was opened with
    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn is_in_memory(&self) -> bool {
        self.location == IN_MEMORY_STORE
    }

    /// Underlying connection, for queries against ingested tables
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Read the engine's settings view as a connectivity check
    pub fn verify(&self) -> Result<Vec<String>, DataError> {
        let mut stmt = self.conn.prepare("SELECT * FROM pragma_compile_options")?;
        let options = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(options)
    }

    /// Drop a table if it exists
    pub fn drop_table(&self, name: &str) -> Result<(), DataError> {
        self.conn
            .execute_batch(&format!("DROP TABLE IF EXISTS main.{}", quote_identifier(name)))?;
        Ok(())
    }

    /// Names of all tables, sorted
    pub fn table_names(&self) -> Result<Vec<String>, DataError> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM main.sqlite_master WHERE type = 'table' ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    pub fn row_count(&self, name: &str) -> Result<usize, DataError> {
        let query = format!("SELECT COUNT(*) FROM main.{}", quote_identifier(name));
        let count: i64 = self.conn.query_row(&query, [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn column_names(&self, name: &str) -> Result<Vec<String>, DataError> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
        let names = stmt
            .query_map([name], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    /// Replace `name` with the contents of `table`.
    ///
    /// The time column is written as integer nanoseconds since the Unix
    /// epoch. With a `row_limit` only the first rows in table order are kept.
    /// Returns the number of rows in the new table.
    pub fn replace_table(
        &mut self,
        name: &str,
        table: &Table,
        row_limit: Option<usize>,
    ) -> Result<usize, DataError> {
        if name.is_empty() {
            return Err(DataError::StoreValue("table name is empty".to_string()));
        }

        let batch = table.batch();
        let schema = batch.schema();
        let columns: Vec<String> = schema
            .fields()
            .iter()
            .map(|f| quote_identifier(f.name()))
            .collect();

        // Rows are ordered by an explicit key; a data column named `rowid`
        // would shadow the implicit one.
        let mut key = STAGING_KEY.to_string();
        while schema.fields().iter().any(|f| f.name().eq_ignore_ascii_case(&key)) {
            key.push('_');
        }
        let key = quote_identifier(&key);

        let mut definitions = Vec::with_capacity(columns.len() + 1);
        definitions.push(format!("{} INTEGER PRIMARY KEY", key));
        for (position, (field, quoted)) in schema.fields().iter().zip(&columns).enumerate() {
            let sql_type = values::sql_type(field.data_type(), position == 0)?;
            definitions.push(format!("{} {}", quoted, sql_type));
        }

        // Convert before opening the transaction so value errors never touch the store.
        let column_values = batch
            .columns()
            .iter()
            .enumerate()
            .map(|(position, array)| values::column_values(array.as_ref(), position == 0))
            .collect::<Result<Vec<_>, _>>()?;

        let target = format!("main.{}", quote_identifier(name));
        let staging = format!("temp.{}", quote_identifier(STAGING_TABLE));

        let tx = self.conn.transaction()?;
        tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS {staging}; CREATE TEMP TABLE {table} ({definitions});",
            staging = staging,
            table = quote_identifier(STAGING_TABLE),
            definitions = definitions.join(", ")
        ))?;

        {
            let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
            let mut insert = tx.prepare(&format!(
                "INSERT INTO {} ({}) VALUES ({})",
                staging,
                columns.join(", "),
                placeholders.join(", ")
            ))?;
            for row in 0..batch.num_rows() {
                insert.execute(params_from_iter(column_values.iter().map(|values| &values[row])))?;
            }
        }
        debug!("Staged {} rows for {}", batch.num_rows(), name);

        let limit = match row_limit {
            Some(limit) => format!(" LIMIT {}", i64::try_from(limit).unwrap_or(i64::MAX)),
            None => String::new(),
        };
        tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS {target}; \
             CREATE TABLE {target} AS SELECT {columns} FROM {staging} ORDER BY {key}{limit}; \
             DROP TABLE {staging};",
            target = target,
            columns = columns.join(", "),
            staging = staging,
            key = key,
            limit = limit
        ))?;

        let rows: i64 = tx.query_row(&format!("SELECT COUNT(*) FROM {}", target), [], |row| row.get(0))?;
        tx.commit()?;

        info!(
            "Replaced table {} in {} with {} rows ({} leading)",
            name,
            self.location,
            rows,
            TIME_COLUMN
        );
        Ok(rows as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{ArrayRef, Float64Array};
    use mi_core::TimedColumn;
    use std::sync::Arc;

    fn sample_table(rows: usize) -> Table {
        let times: Vec<i64> = (0..rows as i64).map(|i| 1_000 + i).collect();
        let values: ArrayRef = Arc::new(Float64Array::from((0..rows).map(|i| i as f64).collect::<Vec<_>>()));
        Table::from_timed_columns(vec![TimedColumn::new("value", times, values)]).unwrap()
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("plain"), "\"plain\"");
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_verify_lists_settings() {
        let store = Store::open(IN_MEMORY_STORE).unwrap();
        assert!(store.is_in_memory());
        assert!(!store.verify().unwrap().is_empty());
    }

    #[test]
    fn test_replace_table_with_limit() {
        let mut store = Store::open(IN_MEMORY_STORE).unwrap();
        let rows = store.replace_table("measurements", &sample_table(5), Some(3)).unwrap();
        assert_eq!(rows, 3);
        assert_eq!(store.row_count("measurements").unwrap(), 3);
        assert_eq!(store.column_names("measurements").unwrap(), vec!["index", "value"]);

        let first: i64 = store
            .connection()
            .query_row("SELECT \"index\" FROM measurements ORDER BY rowid LIMIT 1", [], |r| r.get(0))
            .unwrap();
        assert_eq!(first, 1_000);
    }

    #[test]
    fn test_limit_keeps_table_order_with_rowid_column() {
        let times = vec![10, 20, 30];
        let values: ArrayRef = Arc::new(Float64Array::from(vec![3.0, 2.0, 1.0]));
        let table = Table::from_timed_columns(vec![TimedColumn::new("rowid", times, values)]).unwrap();

        let mut store = Store::open(IN_MEMORY_STORE).unwrap();
        assert_eq!(store.replace_table("m", &table, Some(1)).unwrap(), 1);
        assert_eq!(store.column_names("m").unwrap(), vec!["index", "rowid"]);

        let (index, value): (i64, f64) = store
            .connection()
            .query_row("SELECT \"index\", \"rowid\" FROM m", [], |r| Ok((r.get(0)?, r.get(1)?)))
            .unwrap();
        assert_eq!(index, 10);
        assert_eq!(value, 3.0);
    }

    #[test]
    fn test_limit_above_sql_range_keeps_all_rows() {
        let mut store = Store::open(IN_MEMORY_STORE).unwrap();
        assert_eq!(store.replace_table("m", &sample_table(2), Some(usize::MAX)).unwrap(), 2);
        assert_eq!(store.row_count("m").unwrap(), 2);
    }

    #[test]
    fn test_failed_create_keeps_previous_table() {
        let mut store = Store::open(IN_MEMORY_STORE).unwrap();
        store.replace_table("m", &sample_table(3), None).unwrap();

        // Cap the main database so the new table cannot be created after the drop
        let pages: i64 = store
            .connection()
            .query_row("PRAGMA main.page_count", [], |r| r.get(0))
            .unwrap();
        let cap: i64 = store
            .connection()
            .query_row(&format!("PRAGMA main.max_page_count = {}", pages + 2), [], |r| r.get(0))
            .unwrap();
        assert_eq!(cap, pages + 2);

        let err = store.replace_table("m", &sample_table(20_000), None).unwrap_err();
        assert!(matches!(err, DataError::Store(_)));
        assert_eq!(err.kind(), crate::ErrorKind::Store);

        assert_eq!(store.table_names().unwrap(), vec!["m"]);
        assert_eq!(store.row_count("m").unwrap(), 3);
        assert_eq!(store.column_names("m").unwrap(), vec!["index", "value"]);
    }

    #[test]
    fn test_replace_is_idempotent() {
        let mut store = Store::open(IN_MEMORY_STORE).unwrap();
        store.replace_table("t", &sample_table(4), None).unwrap();
        store.replace_table("t", &sample_table(2), None).unwrap();
        assert_eq!(store.table_names().unwrap(), vec!["t"]);
        assert_eq!(store.row_count("t").unwrap(), 2);
    }

    #[test]
    fn test_drop_missing_table_is_ok() {
        let store = Store::open(IN_MEMORY_STORE).unwrap();
        store.drop_table("never_created").unwrap();
        assert!(store.table_names().unwrap().is_empty());
    }

    #[test]
    fn test_empty_table_name() {
        let mut store = Store::open(IN_MEMORY_STORE).unwrap();
        let err = store.replace_table("", &sample_table(1), None).unwrap_err();
        assert!(matches!(err, DataError::StoreValue(_)));
    }
}
