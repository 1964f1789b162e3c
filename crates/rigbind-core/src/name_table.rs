//! Insertion-ordered tables keyed by bone name.
//!
//! Bone tables and vertex-weight tables keep declaration order through
//! renaming, so this is a `Vec` of entries with a name index beside it.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// An insertion-ordered map from names to values.
#[derive(Debug, Clone, PartialEq)]
pub struct NameTable<T> {
    entries: Vec<(String, T)>,
    index: HashMap<String, usize>,
}

impl<T> Default for NameTable<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T> NameTable<T> {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True if `name` is a key.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Looks up a value by name.
    pub fn get(&self, name: &str) -> Option<&T> {
        self.index.get(name).map(|&i| &self.entries[i].1)
    }

    /// Looks up a value by name, mutably.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut T> {
        match self.index.get(name) {
            Some(&i) => Some(&mut self.entries[i].1),
            None => None,
        }
    }

    /// Position of `name` in declaration order.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Inserts or replaces a value. A replaced value keeps its position.
    pub fn insert(&mut self, name: impl Into<String>, value: T) -> Option<T> {
        let name = name.into();
        if let Some(&i) = self.index.get(&name) {
            return Some(std::mem::replace(&mut self.entries[i].1, value));
        }
        self.index.insert(name.clone(), self.entries.len());
        self.entries.push((name, value));
        None
    }

    /// Inserts a value at `position`, shifting later entries.
    ///
    /// An existing entry with the same name is removed first.
    pub fn insert_at(&mut self, position: usize, name: impl Into<String>, value: T) {
        let name = name.into();
        self.remove(&name);
        let position = position.min(self.entries.len());
        self.entries.insert(position, (name, value));
        self.reindex();
    }

    /// Removes an entry, preserving the order of the others.
    pub fn remove(&mut self, name: &str) -> Option<T> {
        let i = self.index.remove(name)?;
        let (_, value) = self.entries.remove(i);
        self.reindex();
        Some(value)
    }

    /// Renames a key in place. Returns false when `old` is absent or `new` is taken.
    pub fn rename(&mut self, old: &str, new: &str) -> bool {
        if old == new {
            return self.contains(old);
        }
        if self.contains(new) {
            return false;
        }
        match self.index.remove(old) {
            Some(i) => {
                self.entries[i].0 = new.to_string();
                self.index.insert(new.to_string(), i);
                true
            }
            None => false,
        }
    }

    /// Iterates entries in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterates entries mutably in declaration order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut T)> {
        self.entries.iter_mut().map(|(k, v)| (k.as_str(), v))
    }

    /// Keys in declaration order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Values in declaration order.
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().map(|(_, v)| v)
    }

    /// Values mutably in declaration order.
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.entries.iter_mut().map(|(_, v)| v)
    }

    /// Consumes the table into its entries.
    pub fn into_entries(self) -> Vec<(String, T)> {
        self.entries
    }

    /// Keeps only entries for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&str, &T) -> bool) {
        self.entries.retain(|(k, v)| keep(k, v));
        self.reindex();
    }

    fn reindex(&mut self) {
        self.index.clear();
        for (i, (name, _)) in self.entries.iter().enumerate() {
            self.index.insert(name.clone(), i);
        }
    }
}

impl<T> FromIterator<(String, T)> for NameTable<T> {
    fn from_iter<I: IntoIterator<Item = (String, T)>>(iter: I) -> Self {
        let mut table = NameTable::new();
        for (name, value) in iter {
            table.insert(name, value);
        }
        table
    }
}

impl<T> IntoIterator for NameTable<T> {
    type Item = (String, T);
    type IntoIter = std::vec::IntoIter<(String, T)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<T: Serialize> Serialize for NameTable<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

struct NameTableVisitor<T>(PhantomData<T>);

impl<'de, T: Deserialize<'de>> Visitor<'de> for NameTableVisitor<T> {
    type Value = NameTable<T>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map keyed by name")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut table = NameTable::new();
        while let Some((name, value)) = access.next_entry::<String, T>()? {
            table.insert(name, value);
        }
        Ok(table)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for NameTable<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(NameTableVisitor(PhantomData))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_rename_keeps_position() {
        let mut table: NameTable<u32> = NameTable::new();
        table.insert("hips", 1);
        table.insert("spine", 2);
        table.insert("neck", 3);

        assert!(table.rename("spine", "Spine"));
        assert_eq!(table.keys().collect::<Vec<_>>(), vec!["hips", "Spine", "neck"]);
        assert_eq!(table.get("Spine"), Some(&2));
        assert!(table.get("spine").is_none());
        assert!(!table.rename("hips", "neck"));
    }

    #[test]
    fn test_remove_and_insert_at() {
        let mut table: NameTable<u32> = ["a", "b", "c"]
            .iter()
            .enumerate()
            .map(|(i, n)| (n.to_string(), i as u32))
            .collect();
        table.remove("b");
        table.insert_at(1, "b1", 10);
        table.insert_at(2, "b2", 11);
        assert_eq!(table.keys().collect::<Vec<_>>(), vec!["a", "b1", "b2", "c"]);
        assert_eq!(table.position("c"), Some(3));
    }

    #[test]
    fn test_json_preserves_document_order() {
        let table: NameTable<i32> =
            serde_json::from_str(r#"{"zeta": 1, "alpha": 2, "mid": 3}"#).unwrap();
        assert_eq!(table.keys().collect::<Vec<_>>(), vec!["zeta", "alpha", "mid"]);
        assert_eq!(
            serde_json::to_string(&table).unwrap(),
            r#"{"zeta":1,"alpha":2,"mid":3}"#
        );
    }
}
