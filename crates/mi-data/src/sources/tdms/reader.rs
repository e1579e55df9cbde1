//! Segment-level TDMS decoding
//!
//! A TDMS file is a sequence of segments. Each segment has a 28 byte lead-in,
//! optional metadata describing the objects (root, groups, channels) and their
//! raw data layout, and optional raw data made of repeated chunks. Metadata is
//! incremental: a segment only lists what changed since the previous one.

use indexmap::IndexMap;
use tracing::{debug, warn};

use super::data::ChannelData;
use super::types::{nanos_to_datetime, timestamp_to_unix_nanos, PropertyValue, TdsType};
use crate::DataError;

pub const TDMS_TAG: &[u8; 4] = b"TDSm";
pub const LEAD_IN_LEN: usize = 28;

pub const TOC_META_DATA: u32 = 1 << 1;
pub const TOC_NEW_OBJ_LIST: u32 = 1 << 2;
pub const TOC_RAW_DATA: u32 = 1 << 3;
pub const TOC_INTERLEAVED_DATA: u32 = 1 << 5;
pub const TOC_BIG_ENDIAN: u32 = 1 << 6;
pub const TOC_DAQMX_RAW_DATA: u32 = 1 << 7;

pub const NO_RAW_DATA: u32 = 0xFFFF_FFFF;
pub const SAME_RAW_DATA_INDEX: u32 = 0x0000_0000;
const DAQMX_FORMAT_CHANGING: u32 = 0x6912_0000;
const DAQMX_DIGITAL_LINE: u32 = 0x6913_0000;
const INCOMPLETE_SEGMENT: u64 = u64::MAX;

const SUPPORTED_VERSIONS: [u32; 2] = [4712, 4713];

/// Cursor over a byte slice with per-segment endianness
pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    big_endian: bool,
}

macro_rules! read_number {
    ($name:ident, $ty:ty) => {
        pub fn $name(&mut self) -> Result<$ty, DataError> {
            const N: usize = std::mem::size_of::<$ty>();
            let mut buf = [0u8; N];
            buf.copy_from_slice(self.take(N)?);
            Ok(if self.big_endian {
                <$ty>::from_be_bytes(buf)
            } else {
                <$ty>::from_le_bytes(buf)
            })
        }
    };
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8], pos: usize, big_endian: bool) -> Self {
        Self {
            data,
            pos,
            big_endian,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], DataError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| {
                DataError::SourceFormat(format!(
                    "unexpected end of data reading {} bytes at offset {}",
                    n, self.pos
                ))
            })?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    read_number!(read_u8, u8);
    read_number!(read_i8, i8);
    read_number!(read_u16, u16);
    read_number!(read_i16, i16);
    read_number!(read_u32, u32);
    read_number!(read_i32, i32);
    read_number!(read_u64, u64);
    read_number!(read_i64, i64);
    read_number!(read_f32, f32);
    read_number!(read_f64, f64);

    pub fn read_string(&mut self) -> Result<String, DataError> {
        let len = self.read_u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| DataError::SourceFormat(format!("string is not valid UTF-8: {}", e)))
    }

    /// Little endian files store the fractions first, big endian the seconds
    pub fn read_timestamp_nanos(&mut self) -> Result<i64, DataError> {
        let (seconds, fractions) = if self.big_endian {
            let seconds = self.read_i64()?;
            (seconds, self.read_u64()?)
        } else {
            let fractions = self.read_u64()?;
            (self.read_i64()?, fractions)
        };
        timestamp_to_unix_nanos(seconds, fractions)
    }

    pub fn read_property_value(&mut self, data_type: TdsType) -> Result<PropertyValue, DataError> {
        let value = match data_type {
            TdsType::I8 => PropertyValue::Int(self.read_i8()? as i64),
            TdsType::I16 => PropertyValue::Int(self.read_i16()? as i64),
            TdsType::I32 => PropertyValue::Int(self.read_i32()? as i64),
            TdsType::I64 => PropertyValue::Int(self.read_i64()?),
            TdsType::U8 => PropertyValue::UInt(self.read_u8()? as u64),
            TdsType::U16 => PropertyValue::UInt(self.read_u16()? as u64),
            TdsType::U32 => PropertyValue::UInt(self.read_u32()? as u64),
            TdsType::U64 => PropertyValue::UInt(self.read_u64()?),
            TdsType::SingleFloat => PropertyValue::Float(self.read_f32()? as f64),
            TdsType::DoubleFloat => PropertyValue::Float(self.read_f64()?),
            TdsType::Boolean => PropertyValue::Bool(self.read_u8()? != 0),
            TdsType::String => PropertyValue::String(self.read_string()?),
            TdsType::TimeStamp => PropertyValue::Timestamp(nanos_to_datetime(self.read_timestamp_nanos()?)),
            TdsType::Void => {
                return Err(DataError::SourceFormat("property with void type".to_string()))
            }
        };
        Ok(value)
    }
}

/// Layout of one object's values inside a raw data chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RawDataIndex {
    pub data_type: TdsType,
    pub number_of_values: u64,
    pub total_size: u64,
}

/// Everything known about one object path after reading the file
#[derive(Debug, Default)]
pub(crate) struct ObjectState {
    pub properties: IndexMap<String, PropertyValue>,
    pub data: Option<ChannelData>,
    last_index: Option<RawDataIndex>,
}

/// An object taking part in the current segment's raw data
#[derive(Debug, Clone, Copy)]
struct ActiveObject {
    slot: usize,
    index: Option<RawDataIndex>,
}

/// Decode every segment, returning objects in order of first appearance
pub(crate) fn read_objects(data: &[u8]) -> Result<IndexMap<String, ObjectState>, DataError> {
    let mut objects: IndexMap<String, ObjectState> = IndexMap::new();
    let mut active: Vec<ActiveObject> = Vec::new();
    let mut offset = 0usize;
    let mut segment = 0usize;

    while offset < data.len() {
        if data.len() - offset < LEAD_IN_LEN {
            return Err(DataError::SourceFormat(format!(
                "truncated segment lead-in at offset {}",
                offset
            )));
        }
        if &data[offset..offset + 4] != TDMS_TAG {
            return Err(DataError::SourceFormat(format!(
                "missing TDSm tag at offset {}",
                offset
            )));
        }

        let toc = ByteReader::new(data, offset + 4, false).read_u32()?;
        let big_endian = toc & TOC_BIG_ENDIAN != 0;
        let mut lead_in = ByteReader::new(data, offset + 8, big_endian);
        let version = lead_in.read_u32()?;
        let next_segment_offset = lead_in.read_u64()?;
        let raw_data_offset = lead_in.read_u64()?;

        if !SUPPORTED_VERSIONS.contains(&version) {
            warn!("segment at offset {} has unknown TDMS version {}", offset, version);
        }
        if toc & TOC_DAQMX_RAW_DATA != 0 {
            return Err(DataError::Unsupported("DAQmx raw data".to_string()));
        }

        let lead_in_end = offset + LEAD_IN_LEN;
        let segment_end = if next_segment_offset == INCOMPLETE_SEGMENT {
            data.len()
        } else {
            match usize::try_from(next_segment_offset)
                .ok()
                .and_then(|n| lead_in_end.checked_add(n))
            {
                Some(end) if end <= data.len() => end,
                _ => {
                    warn!(
                        "segment at offset {} extends past the end of the file, reading what is there",
                        offset
                    );
                    data.len()
                }
            }
        };
        let raw_start = usize::try_from(raw_data_offset)
            .ok()
            .and_then(|n| lead_in_end.checked_add(n))
            .filter(|start| *start <= segment_end)
            .ok_or_else(|| {
                DataError::SourceFormat(format!(
                    "raw data offset {} of segment at {} lies past the segment end",
                    raw_data_offset, offset
                ))
            })?;

        if toc & TOC_META_DATA != 0 {
            if toc & TOC_NEW_OBJ_LIST != 0 {
                active.clear();
            }
            let mut meta = ByteReader::new(&data[..raw_start], lead_in_end, big_endian);
            read_metadata(&mut meta, &mut objects, &mut active)?;
        }

        if toc & TOC_RAW_DATA != 0 {
            let mut raw = ByteReader::new(&data[..segment_end], raw_start, big_endian);
            read_raw_data(&mut raw, segment_end - raw_start, toc, &active, &mut objects)?;
        }

        debug!(segment, offset, objects = active.len(), "read TDMS segment");
        offset = segment_end;
        segment += 1;
    }

    Ok(objects)
}

fn read_metadata(
    reader: &mut ByteReader<'_>,
    objects: &mut IndexMap<String, ObjectState>,
    active: &mut Vec<ActiveObject>,
) -> Result<(), DataError> {
    let object_count = reader.read_u32()?;
    for _ in 0..object_count {
        let path = reader.read_string()?;
        let slot = match objects.get_index_of(&path) {
            Some(slot) => slot,
            None => objects.insert_full(path.clone(), ObjectState::default()).0,
        };

        let marker = reader.read_u32()?;
        let index = match marker {
            NO_RAW_DATA => None,
            SAME_RAW_DATA_INDEX => Some(objects[slot].last_index.ok_or_else(|| {
                DataError::SourceFormat(format!(
                    "object {} reuses a raw data index it never declared",
                    path
                ))
            })?),
            DAQMX_FORMAT_CHANGING | DAQMX_DIGITAL_LINE => {
                return Err(DataError::Unsupported("DAQmx raw data".to_string()))
            }
            _ => read_raw_data_index(reader, &path)?,
        };

        let property_count = reader.read_u32()?;
        for _ in 0..property_count {
            let name = reader.read_string()?;
            let data_type = TdsType::from_code(reader.read_u32()?)?;
            let value = reader.read_property_value(data_type)?;
            objects[slot].properties.insert(name, value);
        }

        if let Some(index) = index {
            let state = &mut objects[slot];
            if let Some(existing) = &state.data {
                if existing.data_type() != index.data_type {
                    return Err(DataError::SourceFormat(format!(
                        "object {} changes data type from {:?} to {:?}",
                        path,
                        existing.data_type(),
                        index.data_type
                    )));
                }
            } else {
                state.data = Some(ChannelData::empty(index.data_type)?);
            }
            state.last_index = Some(index);
        }

        match active.iter_mut().find(|entry| entry.slot == slot) {
            Some(entry) => entry.index = index,
            None => active.push(ActiveObject { slot, index }),
        }
    }
    Ok(())
}

fn read_raw_data_index(
    reader: &mut ByteReader<'_>,
    path: &str,
) -> Result<Option<RawDataIndex>, DataError> {
    let data_type = TdsType::from_code(reader.read_u32()?)?;
    let dimension = reader.read_u32()?;
    if dimension != 1 {
        return Err(DataError::SourceFormat(format!(
            "object {} has array dimension {}, only 1 is valid",
            path, dimension
        )));
    }
    let number_of_values = reader.read_u64()?;
    let total_size = match data_type.size() {
        None => reader.read_u64()?,
        Some(size) => number_of_values.checked_mul(size as u64).ok_or_else(|| {
            DataError::SourceFormat(format!("object {} declares too many values", path))
        })?,
    };

    if data_type == TdsType::Void {
        return Ok(None);
    }
    Ok(Some(RawDataIndex {
        data_type,
        number_of_values,
        total_size,
    }))
}

fn channel_data<'m>(
    objects: &'m mut IndexMap<String, ObjectState>,
    slot: usize,
) -> Result<&'m mut ChannelData, DataError> {
    objects
        .get_index_mut(slot)
        .and_then(|(_, state)| state.data.as_mut())
        .ok_or_else(|| DataError::SourceFormat("raw data for an object without a data type".to_string()))
}

fn to_usize(value: u64) -> Result<usize, DataError> {
    usize::try_from(value)
        .map_err(|_| DataError::SourceFormat(format!("size {} does not fit in memory", value)))
}

fn read_raw_data(
    reader: &mut ByteReader<'_>,
    raw_len: usize,
    toc: u32,
    active: &[ActiveObject],
    objects: &mut IndexMap<String, ObjectState>,
) -> Result<(), DataError> {
    let entries: Vec<(usize, RawDataIndex)> = active
        .iter()
        .filter_map(|entry| entry.index.map(|index| (entry.slot, index)))
        .filter(|(_, index)| index.number_of_values > 0)
        .collect();
    let chunk_size: u64 = entries.iter().map(|(_, index)| index.total_size).sum();
    if entries.is_empty() || chunk_size == 0 {
        return Ok(());
    }
    let raw_len = raw_len as u64;

    if toc & TOC_INTERLEAVED_DATA != 0 {
        let mut row_width = 0u64;
        for (_, index) in &entries {
            match index.data_type.size() {
                Some(size) => row_width += size as u64,
                None => {
                    return Err(DataError::Unsupported("interleaved string data".to_string()))
                }
            }
        }
        // Each row holds one value of every channel, side by side.
        let rows = raw_len / row_width;
        for _ in 0..rows {
            for (slot, _) in &entries {
                channel_data(objects, *slot)?.push_value(reader)?;
            }
        }
        return Ok(());
    }

    let full_chunks = raw_len / chunk_size;
    let remainder = raw_len % chunk_size;
    for _ in 0..full_chunks {
        for (slot, index) in &entries {
            channel_data(objects, *slot)?.extend_from(
                reader,
                to_usize(index.number_of_values)?,
                to_usize(index.total_size)?,
            )?;
        }
    }

    if remainder > 0 {
        debug!(remainder, chunk_size, "segment ends with a partial chunk");
        let mut left = remainder;
        for (slot, index) in &entries {
            let count = match index.data_type.size() {
                None if index.total_size <= left => index.number_of_values,
                None => break,
                Some(size) => (left / size as u64).min(index.number_of_values),
            };
            if count == 0 {
                break;
            }
            let bytes = match index.data_type.size() {
                None => index.total_size,
                Some(size) => count * size as u64,
            };
            channel_data(objects, *slot)?.extend_from(reader, to_usize(count)?, to_usize(bytes)?)?;
            left -= bytes;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_reader_endianness() {
        let bytes = [0x01, 0x00, 0x00, 0x00];
        assert_eq!(ByteReader::new(&bytes, 0, false).read_u32().unwrap(), 1);
        assert_eq!(ByteReader::new(&bytes, 0, true).read_u32().unwrap(), 1 << 24);
    }

    #[test]
    fn test_byte_reader_reports_truncation() {
        let bytes = [0x05, 0x00, 0x00, 0x00, b'a', b'b'];
        let err = ByteReader::new(&bytes, 0, false).read_string().unwrap_err();
        assert!(matches!(err, DataError::SourceFormat(_)));
    }

    #[test]
    fn test_rejects_missing_tag() {
        let mut bytes = vec![0u8; LEAD_IN_LEN];
        bytes[..4].copy_from_slice(b"TDSh");
        assert!(matches!(read_objects(&bytes), Err(DataError::SourceFormat(_))));
    }

    #[test]
    fn test_empty_input_has_no_objects() {
        assert!(read_objects(&[]).unwrap().is_empty());
    }
}
