//! Minimal TDMS writer for building test files
#![allow(dead_code)]

use std::io::Write;
use std::path::PathBuf;

use mi_data::sources::tdms::types::unix_nanos_to_timestamp;
use tempfile::TempDir;

pub const META: u32 = 1 << 1;
pub const NEW_OBJ_LIST: u32 = 1 << 2;
pub const RAW: u32 = 1 << 3;
pub const INTERLEAVED: u32 = 1 << 5;
pub const BIG_ENDIAN: u32 = 1 << 6;

pub const TYPE_I32: u32 = 0x03;
pub const TYPE_U64: u32 = 0x08;
pub const TYPE_F64: u32 = 0x0A;
pub const TYPE_STRING: u32 = 0x20;
pub const TYPE_BOOL: u32 = 0x21;
pub const TYPE_TIMESTAMP: u32 = 0x44;

/// 2024-01-01T00:00:00Z
pub const START_NS: i64 = 1_704_067_200_000_000_000;

#[derive(Debug, Clone)]
pub enum Prop {
    I32(i32),
    F64(f64),
    Str(String),
    Time(i64),
}

#[derive(Debug, Clone)]
pub enum RawIndex {
    None,
    Same,
    Fixed { code: u32, size: u64, count: u64 },
    Strings { count: u64, total: u64 },
}

#[derive(Debug, Clone)]
pub struct Object {
    pub path: String,
    pub index: RawIndex,
    pub properties: Vec<(String, Prop)>,
}

impl Object {
    pub fn new(path: &str, index: RawIndex) -> Self {
        Self {
            path: path.to_string(),
            index,
            properties: Vec::new(),
        }
    }

    pub fn prop(mut self, name: &str, value: Prop) -> Self {
        self.properties.push((name.to_string(), value));
        self
    }

    /// Waveform timing: start time in Unix nanoseconds, increment in seconds
    pub fn waveform(self, start_ns: i64, increment: f64) -> Self {
        self.prop("wf_start_time", Prop::Time(start_ns))
            .prop("wf_increment", Prop::F64(increment))
    }
}

pub fn f64_index(count: u64) -> RawIndex {
    RawIndex::Fixed {
        code: TYPE_F64,
        size: 8,
        count,
    }
}

pub fn i32_index(count: u64) -> RawIndex {
    RawIndex::Fixed {
        code: TYPE_I32,
        size: 4,
        count,
    }
}

/// Byte sink that honours the segment's endianness
pub struct Bytes {
    pub big_endian: bool,
    pub buf: Vec<u8>,
}

macro_rules! put_number {
    ($name:ident, $ty:ty) => {
        pub fn $name(&mut self, v: $ty) -> &mut Self {
            if self.big_endian {
                self.buf.extend_from_slice(&v.to_be_bytes());
            } else {
                self.buf.extend_from_slice(&v.to_le_bytes());
            }
            self
        }
    };
}

impl Bytes {
    pub fn new(big_endian: bool) -> Self {
        Self {
            big_endian,
            buf: Vec::new(),
        }
    }

    put_number!(u8, u8);
    put_number!(u32, u32);
    put_number!(i32, i32);
    put_number!(u64, u64);
    put_number!(i64, i64);
    put_number!(f64, f64);

    pub fn string(&mut self, s: &str) -> &mut Self {
        self.u32(s.len() as u32);
        self.buf.extend_from_slice(s.as_bytes());
        self
    }

    pub fn timestamp(&mut self, nanos: i64) -> &mut Self {
        let (seconds, fractions) = unix_nanos_to_timestamp(nanos);
        if self.big_endian {
            self.i64(seconds).u64(fractions)
        } else {
            self.u64(fractions).i64(seconds)
        }
    }
}

/// Encode values as raw data
pub fn f64_raw(values: &[f64], big_endian: bool) -> Vec<u8> {
    let mut out = Bytes::new(big_endian);
    for v in values {
        out.f64(*v);
    }
    out.buf
}

pub fn i32_raw(values: &[i32], big_endian: bool) -> Vec<u8> {
    let mut out = Bytes::new(big_endian);
    for v in values {
        out.i32(*v);
    }
    out.buf
}

/// Offset table of cumulative end positions followed by the text
pub fn string_raw(values: &[&str], big_endian: bool) -> Vec<u8> {
    let mut out = Bytes::new(big_endian);
    let mut end = 0u32;
    for v in values {
        end += v.len() as u32;
        out.u32(end);
    }
    for v in values {
        out.buf.extend_from_slice(v.as_bytes());
    }
    out.buf
}

fn metadata(objects: &[Object], big_endian: bool) -> Vec<u8> {
    let mut out = Bytes::new(big_endian);
    out.u32(objects.len() as u32);
    for object in objects {
        out.string(&object.path);
        match &object.index {
            RawIndex::None => {
                out.u32(0xFFFF_FFFF);
            }
            RawIndex::Same => {
                out.u32(0);
            }
            RawIndex::Fixed { code, size: _, count } => {
                out.u32(20).u32(*code).u32(1).u64(*count);
            }
            RawIndex::Strings { count, total } => {
                out.u32(28).u32(TYPE_STRING).u32(1).u64(*count).u64(*total);
            }
        }
        out.u32(object.properties.len() as u32);
        for (name, value) in &object.properties {
            out.string(name);
            match value {
                Prop::I32(v) => {
                    out.u32(TYPE_I32).i32(*v);
                }
                Prop::F64(v) => {
                    out.u32(TYPE_F64).f64(*v);
                }
                Prop::Str(v) => {
                    out.u32(TYPE_STRING).string(v);
                }
                Prop::Time(v) => {
                    out.u32(TYPE_TIMESTAMP).timestamp(*v);
                }
            }
        }
    }
    out.buf
}

/// One segment: lead-in, optional metadata, raw data.
///
/// `META` in `toc` writes `objects` as the metadata block.
pub fn segment(toc: u32, objects: &[Object], raw: &[u8]) -> Vec<u8> {
    let big_endian = toc & BIG_ENDIAN != 0;
    let meta = if toc & META != 0 {
        metadata(objects, big_endian)
    } else {
        Vec::new()
    };

    let mut lead_in = Bytes::new(big_endian);
    lead_in.buf.extend_from_slice(b"TDSm");
    lead_in.buf.extend_from_slice(&toc.to_le_bytes());
    lead_in
        .u32(4713)
        .u64((meta.len() + raw.len()) as u64)
        .u64(meta.len() as u64);

    let mut out = lead_in.buf;
    out.extend_from_slice(&meta);
    out.extend_from_slice(raw);
    out
}

/// Root and group objects with no data
pub fn root_and_group(group: &str) -> Vec<Object> {
    vec![
        Object::new("/", RawIndex::None).prop("name", Prop::Str("test file".to_string())),
        Object::new(&format!("/'{}'", group), RawIndex::None),
    ]
}

/// A scratch directory holding one file
pub struct Fixture {
    pub dir: TempDir,
    pub path: PathBuf,
}

impl Fixture {
    pub fn path_bytes(&self) -> Vec<u8> {
        self.path.to_str().unwrap().as_bytes().to_vec()
    }

    pub fn store_path(&self, name: &str) -> String {
        self.dir.path().join(name).to_str().unwrap().to_string()
    }
}

pub fn write_file(name: &str, bytes: &[u8]) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(bytes).unwrap();
    Fixture { dir, path }
}

/// A file with two channels sharing one waveform track of `len` samples
pub fn two_channel_file(len: usize) -> Vec<u8> {
    let a: Vec<f64> = (0..len).map(|i| i as f64 * 0.5).collect();
    let b: Vec<i32> = (0..len as i32).collect();

    let mut objects = root_and_group("Group");
    objects.push(
        Object::new("/'Group'/'Channel 1'", f64_index(len as u64)).waveform(START_NS, 0.001),
    );
    objects.push(
        Object::new("/'Group'/'Signal''s Name'", i32_index(len as u64)).waveform(START_NS, 0.001),
    );

    let mut raw = f64_raw(&a, false);
    raw.extend(i32_raw(&b, false));
    segment(META | NEW_OBJ_LIST | RAW, &objects, &raw)
}
