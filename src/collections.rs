// forge-ldap-sync, an identity reconciliation tool for self-hosted code forges.
// Copyright (C) 2026  Forge Identity Team
//
// This program is free software; you can redistribute it and/or
// modify it under the terms of the GNU General Public License
// as published by the Free Software Foundation; either version 2
// of the License, or (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program; if not, write to the Free Software
// Foundation, Inc., 51 Franklin Street, Fifth Floor, Boston, MA  02110-1301, USA.

use std::collections::BTreeMap;

/// A map keyed case-insensitively but sorted and displayed with the original case.
///
/// All name comparisons in this crate (usernames, group paths, ignore lists)
/// are case-insensitive; this is the one abstraction that backs every such
/// lookup (directory snapshot, forge snapshot, ignore-list membership).
#[derive(Debug, Clone, Default)]
pub struct CiMap<V> {
    inner: BTreeMap<String, (String, V)>,
}

impl<V> CiMap<V> {
    pub fn new() -> Self {
        Self {
            inner: BTreeMap::new(),
        }
    }

    /// Insert a value keyed by `key`. Returns the previous value (with its
    /// original-case key) if one was already present under the same
    /// case-insensitive key.
    pub fn insert(&mut self, key: impl Into<String>, value: V) -> Option<(String, V)> {
        let key = key.into();
        self.inner.insert(key.to_lowercase(), (key, value))
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.inner.get(&key.to_lowercase()).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        self.inner.get_mut(&key.to_lowercase()).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.contains_key(&key.to_lowercase())
    }

    pub fn remove(&mut self, key: &str) -> Option<(String, V)> {
        self.inner.remove(&key.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Iterate in sorted (lower-cased key) order, yielding the original-case key.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.inner.values().map(|(k, v)| (k.as_str(), v))
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.inner.values().map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.inner.values().map(|(k, _)| k.as_str())
    }
}

impl<V> FromIterator<(String, V)> for CiMap<V> {
    fn from_iter<T: IntoIterator<Item = (String, V)>>(iter: T) -> Self {
        let mut map = CiMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

/// Returns true if `needle` is present in `haystack` under case-insensitive
/// comparison. Used for the configured ignore lists which are plain
/// `Vec<String>` as read from YAML.
pub fn contains_ci(haystack: &[String], needle: &str) -> bool {
    haystack.iter().any(|h| h.eq_ignore_ascii_case(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get_are_case_insensitive() {
        let mut map = CiMap::new();
        map.insert("Alice", 1);
        assert_eq!(map.get("alice"), Some(&1));
        assert_eq!(map.get("ALICE"), Some(&1));
    }

    #[test]
    fn reinsert_under_different_case_replaces() {
        let mut map = CiMap::new();
        map.insert("Alice", 1);
        let previous = map.insert("alice", 2);
        assert_eq!(previous, Some(("Alice".to_string(), 1)));
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("ALICE"), Some(&2));
    }

    #[test]
    fn iteration_is_sorted_by_lowercase_key() {
        let mut map = CiMap::new();
        map.insert("Bob", 2);
        map.insert("alice", 1);
        let keys: Vec<_> = map.keys().collect();
        assert_eq!(keys, vec!["alice", "Bob"]);
    }

    #[test]
    fn contains_ci_matches_regardless_of_case() {
        let list = vec!["Root".to_string(), "ghost".to_string()];
        assert!(contains_ci(&list, "root"));
        assert!(contains_ci(&list, "GHOST"));
        assert!(!contains_ci(&list, "alice"));
    }
}
