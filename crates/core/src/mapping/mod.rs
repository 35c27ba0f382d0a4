use std::collections::{BTreeMap, HashMap};

use serde::ser::{Serialize, SerializeMap, Serializer};

/// Insertion-ordered mapping from bar keys to lyric text.
///
/// Inserting an existing key replaces its text but keeps the original
/// position, so two lines sharing a bar and rounded timestamp collapse into
/// the later one.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BarMapping {
    entries: Vec<(String, String)>,
    positions: HashMap<String, usize>,
}

impl BarMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the text that was replaced, if the key already existed.
    pub fn insert(&mut self, key: String, text: String) -> Option<String> {
        match self.positions.get(&key) {
            Some(&position) => Some(std::mem::replace(&mut self.entries[position].1, text)),
            None => {
                self.positions.insert(key.clone(), self.entries.len());
                self.entries.push((key, text));
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.positions
            .get(key)
            .map(|&position| self.entries[position].1.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, text)| (key.as_str(), text.as_str()))
    }

    /// Key-sorted view used for persisted documents.
    pub fn sorted(&self) -> BTreeMap<&str, &str> {
        self.iter().collect()
    }
}

impl Serialize for BarMapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, text) in &self.entries {
            map.serialize_entry(key, text)?;
        }
        map.end()
    }
}
