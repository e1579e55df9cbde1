//! Ingest configuration

use serde::{Deserialize, Serialize};

/// Store path that selects a non-persistent store
pub const IN_MEMORY_STORE: &str = ":memory:";

/// What to do when two data columns normalize to the same name
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// Fail the ingest before the store is touched
    #[default]
    Error,
    /// Keep the first column, number the later ones `_2`, `_3`, ...
    Suffix,
}

/// Parameters for a single ingest call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestOptions {
    /// Path of the store file, or `:memory:`
    pub store_path: String,

    /// Table that gets replaced
    pub table_name: String,

    /// Keep at most this many rows, in source order
    #[serde(default)]
    pub row_limit: Option<usize>,

    #[serde(default)]
    pub collision_policy: CollisionPolicy,
}

impl IngestOptions {
    /// Create options for a store and table
    pub fn new(store_path: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            store_path: store_path.into(),
            table_name: table_name.into(),
            row_limit: None,
            collision_policy: CollisionPolicy::default(),
        }
    }

    pub fn with_row_limit(mut self, row_limit: Option<usize>) -> Self {
        self.row_limit = row_limit;
        self
    }

    pub fn with_collision_policy(mut self, policy: CollisionPolicy) -> Self {
        self.collision_policy = policy;
        self
    }

    /// Whether the target store lives only for the connection
    pub fn is_in_memory(&self) -> bool {
        self.store_path == IN_MEMORY_STORE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let options = IngestOptions::new("runs.db", "run_1")
            .with_row_limit(Some(10))
            .with_collision_policy(CollisionPolicy::Suffix);

        assert_eq!(options.store_path, "runs.db");
        assert_eq!(options.table_name, "run_1");
        assert_eq!(options.row_limit, Some(10));
        assert_eq!(options.collision_policy, CollisionPolicy::Suffix);
        assert!(!options.is_in_memory());
        assert!(IngestOptions::new(IN_MEMORY_STORE, "t").is_in_memory());
    }

    #[test]
    fn test_deserialize_fills_optional_fields() {
        let options: IngestOptions =
            serde_json::from_str(r#"{"store_path": ":memory:", "table_name": "tdms"}"#).unwrap();
        assert_eq!(options.row_limit, None);
        assert_eq!(options.collision_policy, CollisionPolicy::Error);

        let options: IngestOptions = serde_json::from_str(
            r#"{"store_path": "a.db", "table_name": "t", "row_limit": 5, "collision_policy": "suffix"}"#,
        )
        .unwrap();
        assert_eq!(options.row_limit, Some(5));
        assert_eq!(options.collision_policy, CollisionPolicy::Suffix);
    }
}
