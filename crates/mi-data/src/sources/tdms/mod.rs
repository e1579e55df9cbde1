//! TDMS measurement file source
//!
//! Reads National Instruments TDMS files into a root / group / channel object
//! model and exposes every channel as a timed column, using the waveform
//! properties (`wf_start_time`, `wf_increment`, `wf_start_offset`) to place
//! each sample on an absolute time axis.

pub mod data;
pub(crate) mod reader;
pub mod types;

use std::path::Path;

use indexmap::IndexMap;
use mi_core::{MeasurementSource, TimedColumn};
use tracing::info;

pub use data::ChannelData;
pub use types::{PropertyValue, TdsType};

use crate::DataError;

pub const WF_START_TIME: &str = "wf_start_time";
pub const WF_INCREMENT: &str = "wf_increment";
pub const WF_START_OFFSET: &str = "wf_start_offset";

/// A decoded TDMS file
#[derive(Debug, Clone)]
pub struct TdmsFile {
    name: String,
    properties: IndexMap<String, PropertyValue>,
    groups: Vec<Group>,
}

/// A channel group
#[derive(Debug, Clone)]
pub struct Group {
    name: String,
    properties: IndexMap<String, PropertyValue>,
    channels: Vec<Channel>,
}

/// A single channel with all of its values
#[derive(Debug, Clone)]
pub struct Channel {
    group: String,
    name: String,
    path: String,
    properties: IndexMap<String, PropertyValue>,
    data: ChannelData,
}

impl TdmsFile {
    /// Read and decode a file from disk
    pub fn open(path: &Path) -> Result<Self, DataError> {
        let bytes = std::fs::read(path).map_err(|source| DataError::SourceRead {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown.tdms")
            .to_string();

        let file = Self::from_bytes(name, &bytes)?;
        info!(
            "Read {} ({} bytes): {} groups, {} channels",
            path.display(),
            bytes.len(),
            file.groups.len(),
            file.channels().count()
        );
        Ok(file)
    }

    /// Decode a file held in memory
    pub fn from_bytes(name: impl Into<String>, bytes: &[u8]) -> Result<Self, DataError> {
        let objects = reader::read_objects(bytes)?;

        let mut file = TdmsFile {
            name: name.into(),
            properties: IndexMap::new(),
            groups: Vec::new(),
        };

        for (path, state) in objects {
            let parts = parse_object_path(&path)?;
            match parts.as_slice() {
                [] => file.properties.extend(state.properties),
                [group] => file.group_entry(group).properties.extend(state.properties),
                [group, channel] => {
                    let data = match state.data {
                        Some(data) => data,
                        None => ChannelData::F64(Vec::new()),
                    };
                    let channel = Channel {
                        group: group.clone(),
                        name: channel.clone(),
                        path,
                        properties: state.properties,
                        data,
                    };
                    file.group_entry(group).channels.push(channel);
                }
                _ => {
                    return Err(DataError::SourceFormat(format!(
                        "object path {} is nested too deeply",
                        path
                    )))
                }
            }
        }

        Ok(file)
    }

    fn group_entry(&mut self, name: &str) -> &mut Group {
        let position = match self.groups.iter().position(|g| g.name == name) {
            Some(position) => position,
            None => {
                self.groups.push(Group {
                    name: name.to_string(),
                    properties: IndexMap::new(),
                    channels: Vec::new(),
                });
                self.groups.len() - 1
            }
        };
        &mut self.groups[position]
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn properties(&self) -> &IndexMap<String, PropertyValue> {
        &self.properties
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Every channel of every group, in file order
    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.groups.iter().flat_map(|g| g.channels.iter())
    }
}

impl Group {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn properties(&self) -> &IndexMap<String, PropertyValue> {
        &self.properties
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.name == name)
    }
}

impl Channel {
    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full object path, e.g. `/'Group'/'Channel 1'`
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn properties(&self) -> &IndexMap<String, PropertyValue> {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    pub fn data(&self) -> &ChannelData {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Absolute time of every sample in nanoseconds since the Unix epoch
    pub fn time_track_ns(&self) -> Result<Vec<i64>, DataError> {
        let start = self
            .property(WF_START_TIME)
            .and_then(PropertyValue::as_timestamp)
            .ok_or_else(|| self.missing_timing(WF_START_TIME))?;
        let increment = self
            .property(WF_INCREMENT)
            .and_then(PropertyValue::as_f64)
            .ok_or_else(|| self.missing_timing(WF_INCREMENT))?;
        let offset = self
            .property(WF_START_OFFSET)
            .and_then(PropertyValue::as_f64)
            .unwrap_or(0.0);

        let start_ns = start.timestamp_nanos_opt().ok_or_else(|| {
            DataError::SourceFormat(format!("{} of {} is out of range", WF_START_TIME, self.path))
        })?;

        (0..self.len())
            .map(|i| {
                let relative = ((offset + i as f64 * increment) * 1e9).round();
                if !relative.is_finite() {
                    return Err(DataError::SourceFormat(format!(
                        "channel {} has a non-finite time offset",
                        self.path
                    )));
                }
                start_ns.checked_add(relative as i64).ok_or_else(|| {
                    DataError::SourceFormat(format!("time of sample {} in {} overflows", i, self.path))
                })
            })
            .collect()
    }

    fn missing_timing(&self, property: &str) -> DataError {
        DataError::SourceFormat(format!(
            "channel {} has no {} property, cannot build a time index",
            self.path, property
        ))
    }
}

impl MeasurementSource for TdmsFile {
    type Error = DataError;

    fn source_name(&self) -> &str {
        &self.name
    }

    fn timed_columns(&self) -> Result<Vec<TimedColumn>, DataError> {
        self.channels()
            .map(|channel| {
                Ok(TimedColumn::new(
                    channel.path(),
                    channel.time_track_ns()?,
                    channel.data().to_array(),
                ))
            })
            .collect()
    }
}

/// Split `/'Group'/'Channel'` into its names, undoing `''` escapes
pub fn parse_object_path(path: &str) -> Result<Vec<String>, DataError> {
    let invalid = || DataError::SourceFormat(format!("invalid object path {:?}", path));
    if path == "/" {
        return Ok(Vec::new());
    }

    let mut parts = Vec::new();
    let mut chars = path.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '/' || chars.next() != Some('\'') {
            return Err(invalid());
        }
        let mut name = String::new();
        loop {
            match chars.next() {
                Some('\'') if chars.peek() == Some(&'\'') => {
                    chars.next();
                    name.push('\'');
                }
                Some('\'') => break,
                Some(other) => name.push(other),
                None => return Err(invalid()),
            }
        }
        parts.push(name);
    }

    if parts.is_empty() {
        return Err(invalid());
    }
    Ok(parts)
}

/// Build an object path from its names
pub fn object_path(names: &[&str]) -> String {
    if names.is_empty() {
        return "/".to_string();
    }
    names
        .iter()
        .map(|name| format!("/'{}'", name.replace('\'', "''")))
        .collect()
}
