//! Synthetic in-memory container source.
//!
//! Backs generated content (proxy and stub classes) and test fixtures.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::path;

#[derive(Debug)]
pub(crate) struct MemorySource {
    entries: BTreeMap<String, Arc<[u8]>>,
    dirs: BTreeSet<String>,
}

impl MemorySource {
    pub(crate) fn new(raw: Vec<(String, Vec<u8>)>) -> MemorySource {
        let mut entries = BTreeMap::new();
        let mut dirs = BTreeSet::new();
        for (name, bytes) in raw {
            let normalized = path::normalize(&name);
            if normalized.is_empty() || path::is_escaping(&normalized) {
                continue;
            }
            let mut prefix = normalized.as_str();
            while let Some(parent) = path::parent_prefix(prefix) {
                dirs.insert(parent.to_string());
                prefix = parent;
            }
            entries.insert(normalized, Arc::from(bytes.into_boxed_slice()));
        }
        MemorySource { entries, dirs }
    }

    pub(crate) fn get(&self, normalized: &str) -> Option<Arc<[u8]>> {
        self.entries.get(normalized).cloned()
    }

    pub(crate) fn has_dir(&self, normalized: &str) -> bool {
        self.dirs.contains(normalized)
    }

    pub(crate) fn walk(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_normalized() {
        let src = MemorySource::new(vec![
            ("./a/b.txt".to_string(), vec![1]),
            ("../evil".to_string(), vec![2]),
        ]);
        assert!(src.get("a/b.txt").is_some());
        assert!(src.get("../evil").is_none());
        assert_eq!(src.walk(), vec!["a/b.txt"]);
    }

    #[test]
    fn test_dir_prefixes() {
        let src = MemorySource::new(vec![("x/y/z.class".to_string(), vec![])]);
        assert!(src.has_dir("x"));
        assert!(src.has_dir("x/y"));
        assert!(!src.has_dir("x/y/z.class"));
    }
}
