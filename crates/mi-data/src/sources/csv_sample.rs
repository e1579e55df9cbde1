//! CSV sampler: every row of a CSV file as JSON text

use std::io;
use std::path::Path;

use csv::{ByteRecord, ReaderBuilder};
use mi_core::SourcePath;
use serde::{Deserialize, Serialize};
use serde_json::ser::Formatter;
use tracing::info;

use crate::DataError;

/// JSON envelope returned by [`sample`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub sample: Vec<Vec<String>>,
}

impl Sample {
    /// Render as `{"sample": [["a","b"],...]}`
    pub fn to_json(&self) -> Result<String, DataError> {
        let mut out = Vec::new();
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, EnvelopeFormatter);
        self.serialize(&mut serializer)?;
        String::from_utf8(out).map_err(|e| DataError::Serialization(e.to_string()))
    }
}

/// Compact output except for a space after each key
struct EnvelopeFormatter;

impl Formatter for EnvelopeFormatter {
    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

/// Decode `buffer` as a path and return the file's rows as JSON
pub fn sample(buffer: &[u8]) -> Result<String, DataError> {
    let path = SourcePath::from_bytes(buffer)?;
    let rows = sample_rows(path.as_path())?;
    info!("Sampled {} rows from {}", rows.len(), path);
    Sample { sample: rows }.to_json()
}

/// Read every record of a CSV file as text.
///
/// There is no header handling: a header line is simply the first row. Rows
/// may have different lengths, and an empty line is an empty row.
pub fn sample_rows(path: &Path) -> Result<Vec<Vec<String>>, DataError> {
    let bytes = std::fs::read(path).map_err(|source| DataError::SourceRead {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes.as_slice());

    let mut rows = Vec::new();
    let mut record = ByteRecord::new();
    let mut consumed = 0;
    loop {
        let more = reader
            .read_byte_record(&mut record)
            .map_err(|e| csv_error(path, e))?;
        // The reader skips empty lines between records without reporting them
        rows.extend((0..empty_lines(&bytes, consumed)).map(|_| Vec::new()));
        if !more {
            break;
        }

        let row = record
            .iter()
            .enumerate()
            .map(|(column, field)| {
                std::str::from_utf8(field).map(str::to_string).map_err(|e| {
                    DataError::Serialization(format!(
                        "row {} column {} is not valid UTF-8: {}",
                        rows.len(),
                        column,
                        e
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        rows.push(row);
        consumed = usize::try_from(reader.position().byte()).unwrap_or(bytes.len());
    }

    Ok(rows)
}

/// Count the line terminators (`\n`, `\r\n` or `\r`) starting at `from`.
///
/// A record ending in `\r` may leave its `\n` unread; that byte belongs to
/// the record, not to an empty line.
fn empty_lines(bytes: &[u8], from: usize) -> usize {
    let mut pos = from;
    if pos > 0 && bytes.get(pos - 1) == Some(&b'\r') && bytes.get(pos) == Some(&b'\n') {
        pos += 1;
    }

    let mut count = 0;
    while let Some(&byte) = bytes.get(pos) {
        match byte {
            b'\n' => pos += 1,
            b'\r' if bytes.get(pos + 1) == Some(&b'\n') => pos += 2,
            b'\r' => pos += 1,
            _ => break,
        }
        count += 1;
    }
    count
}

fn csv_error(path: &Path, error: csv::Error) -> DataError {
    match error.into_kind() {
        csv::ErrorKind::Io(source) => DataError::SourceRead {
            path: path.to_path_buf(),
            source,
        },
        other => DataError::Csv(format!("{:?}", other)),
    }
}
