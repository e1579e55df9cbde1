//! Column identifier normalization

use ahash::{AHashMap, AHashSet};
use tracing::warn;

use crate::config::CollisionPolicy;
use crate::table::TIME_COLUMN;
use crate::CoreError;

/// Rewrite a source column identifier into its store form.
///
/// Keeps the final `/`-delimited segment, turns spaces into underscores,
/// drops apostrophes and lowercases the result. Defined for every input and
/// idempotent.
pub fn normalize_column_name(name: &str) -> String {
    let segment = name.rsplit('/').next().unwrap_or(name);
    segment
        .replace(' ', "_")
        .replace('\'', "")
        .to_lowercase()
}

/// Normalize a list of data column names and resolve duplicates.
///
/// The reserved time column name counts as already taken, so a channel that
/// normalizes to it collides like any other duplicate.
pub fn resolve_column_names<S: AsRef<str>>(
    names: &[S],
    policy: CollisionPolicy,
) -> Result<Vec<String>, CoreError> {
    let mut origins: AHashMap<String, String> = AHashMap::new();
    let mut taken: AHashSet<String> = AHashSet::new();
    origins.insert(TIME_COLUMN.to_string(), TIME_COLUMN.to_string());
    taken.insert(TIME_COLUMN.to_string());

    let mut resolved = Vec::with_capacity(names.len());
    for original in names {
        let original = original.as_ref();
        let normalized = normalize_column_name(original);

        if !taken.contains(&normalized) {
            taken.insert(normalized.clone());
            origins.insert(normalized.clone(), original.to_string());
            resolved.push(normalized);
            continue;
        }

        match policy {
            CollisionPolicy::Error => {
                let first = origins.get(&normalized).cloned().unwrap_or_default();
                return Err(CoreError::ColumnCollision {
                    name: normalized,
                    first,
                    second: original.to_string(),
                });
            }
            CollisionPolicy::Suffix => {
                let mut n = 2usize;
                let renamed = loop {
                    let candidate = format!("{}_{}", normalized, n);
                    if !taken.contains(&candidate) {
                        break candidate;
                    }
                    n += 1;
                };
                warn!("column '{}' normalizes to '{}', renamed to '{}'", original, normalized, renamed);
                taken.insert(renamed.clone());
                origins.insert(renamed.clone(), original.to_string());
                resolved.push(renamed);
            }
        }
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_examples() {
        assert_eq!(normalize_column_name("Group/Channel 1"), "channel_1");
        assert_eq!(normalize_column_name("Signal's Name"), "signals_name");
        assert_eq!(normalize_column_name("A/B/c D"), "c_d");
    }

    #[test]
    fn test_normalize_tdms_path() {
        assert_eq!(normalize_column_name("/'Group'/'Channel 1'"), "channel_1");
        assert_eq!(normalize_column_name("/'Run 3'/'Operator''s Note'"), "operators_note");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let inputs = [
            "Group/Channel 1",
            "Signal's Name",
            "A/B/c D",
            "/'G'/'Mixed Case Value'",
            "trailing/",
            "",
            "ÄÖÜ Straße",
        ];
        for input in inputs {
            let once = normalize_column_name(input);
            assert_eq!(normalize_column_name(&once), once, "input {:?}", input);
        }
    }

    #[test]
    fn test_normalize_edge_cases() {
        assert_eq!(normalize_column_name(""), "");
        assert_eq!(normalize_column_name("trailing/"), "");
        assert_eq!(normalize_column_name("no_slash"), "no_slash");
        assert_eq!(normalize_column_name("  "), "__");
    }

    #[test]
    fn test_resolve_rejects_duplicates_by_default() {
        let names = ["/'a'/'Speed'", "/'b'/'speed'"];
        let err = resolve_column_names(&names, CollisionPolicy::Error).unwrap_err();
        match err {
            CoreError::ColumnCollision { name, first, second } => {
                assert_eq!(name, "speed");
                assert_eq!(first, "/'a'/'Speed'");
                assert_eq!(second, "/'b'/'speed'");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_resolve_reserved_time_name() {
        let err = resolve_column_names(&["g/Index"], CollisionPolicy::Error).unwrap_err();
        assert!(matches!(err, CoreError::ColumnCollision { ref name, .. } if name == "index"));

        let names = resolve_column_names(&["g/Index"], CollisionPolicy::Suffix).unwrap();
        assert_eq!(names, vec!["index_2"]);
    }

    #[test]
    fn test_resolve_suffix_skips_taken_names() {
        let names = ["x/a", "a_2", "y/A"];
        let resolved = resolve_column_names(&names, CollisionPolicy::Suffix).unwrap();
        assert_eq!(resolved, vec!["a", "a_2", "a_3"]);
    }
}
