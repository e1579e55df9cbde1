//! Paths handed over as raw bytes

use std::fmt;
use std::path::{Path, PathBuf};

use crate::CoreError;

/// A filesystem path decoded from a UTF-8 byte buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePath(PathBuf);

impl SourcePath {
    /// Decode a caller supplied buffer. Invalid UTF-8 is rejected before
    /// anything touches the filesystem.
    pub fn from_bytes(buffer: &[u8]) -> Result<Self, CoreError> {
        let text = std::str::from_utf8(buffer)?;
        Ok(Self(PathBuf::from(text)))
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    pub fn into_path_buf(self) -> PathBuf {
        self.0
    }
}

impl AsRef<Path> for SourcePath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for SourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}
