//! Directory listing records.
//!
//! A [`Listing`] is the value stored per directory path in the
//! [`DirCache`](crate::DirCache): the entries a backing store produced for
//! one enumeration, in the order the store produced them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::ops::Deref;

/// The kind of filesystem object an [`Entry`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// A regular file.
    File,
    /// A directory.
    Directory,
    /// Anything else the backend reports (links, devices, unknown types).
    #[default]
    #[serde(other)]
    Other,
}

impl EntryKind {
    /// Returns the wire name used in serialized listings.
    pub fn as_str(self) -> &'static str {
        match self {
            EntryKind::File => "file",
            EntryKind::Directory => "directory",
            EntryKind::Other => "other",
        }
    }
}

/// One filesystem object inside a listing.
///
/// Entries are immutable snapshots. Only `name` is meaningful across
/// listings; everything else reflects the moment of enumeration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Full path of the item.
    pub name: String,
    /// Size in bytes, if the backend knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Object type, serialized under the `type` key.
    #[serde(rename = "type", default)]
    pub kind: EntryKind,
    /// Backend-defined metadata (mtime, etag, mode, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Entry {
    /// Creates a file entry with a known size.
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size: Some(size),
            kind: EntryKind::File,
            extra: Map::new(),
        }
    }

    /// Creates a directory entry.
    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: None,
            kind: EntryKind::Directory,
            extra: Map::new(),
        }
    }

    /// Attaches a backend-defined metadata field.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// The entries of one directory, in backing-store order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Listing(Vec<Entry>);

impl Listing {
    pub fn new(entries: Vec<Entry>) -> Self {
        Self(entries)
    }

    /// Finds an entry by its full name.
    pub fn find(&self, name: &str) -> Option<&Entry> {
        self.0.iter().find(|e| e.name == name)
    }

    /// Sum of all known entry sizes. Entries without a size count as zero.
    pub fn total_size(&self) -> u64 {
        self.0.iter().filter_map(|e| e.size).sum()
    }

    pub fn into_entries(self) -> Vec<Entry> {
        self.0
    }
}

impl Deref for Listing {
    type Target = [Entry];

    fn deref(&self) -> &[Entry] {
        &self.0
    }
}

impl From<Vec<Entry>> for Listing {
    fn from(entries: Vec<Entry>) -> Self {
        Self(entries)
    }
}

impl FromIterator<Entry> for Listing {
    fn from_iter<I: IntoIterator<Item = Entry>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Listing {
    type Item = &'a Entry;
    type IntoIter = std::slice::Iter<'a, Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl IntoIterator for Listing {
    type Item = Entry;
    type IntoIter = std::vec::IntoIter<Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entry_wire_shape() {
        let entry = Entry::file("bucket/dir/a.txt", 123).with_extra("etag", "abc");
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            value,
            json!({"name": "bucket/dir/a.txt", "size": 123, "type": "file", "etag": "abc"})
        );
    }

    #[test]
    fn test_unknown_type_is_other() {
        let entry: Entry =
            serde_json::from_value(json!({"name": "dev/null", "type": "character-device"}))
                .unwrap();
        assert_eq!(entry.kind, EntryKind::Other);
        assert_eq!(entry.size, None);
        assert!(entry.extra.is_empty());
    }

    #[test]
    fn test_extra_fields_preserved() {
        let entry: Entry = serde_json::from_value(json!({
            "name": "d/f",
            "size": 4,
            "type": "file",
            "mtime": 1_700_000_000,
            "mode": "0644"
        }))
        .unwrap();
        assert_eq!(entry.extra.get("mtime"), Some(&json!(1_700_000_000)));
        assert_eq!(entry.extra.get("mode"), Some(&json!("0644")));
    }

    #[test]
    fn test_listing_preserves_order() {
        let listing: Listing = ["z", "a", "m"]
            .iter()
            .map(|n| Entry::file(format!("d/{n}"), 1))
            .collect();
        let names: Vec<&str> = listing.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["d/z", "d/a", "d/m"]);
    }

    #[test]
    fn test_listing_helpers() {
        let listing = Listing::new(vec![
            Entry::file("d/a", 10),
            Entry::directory("d/sub"),
            Entry::file("d/b", 5),
        ]);
        assert_eq!(listing.len(), 3);
        assert_eq!(listing.total_size(), 15);
        assert!(listing.find("d/sub").is_some_and(Entry::is_dir));
        assert!(listing.find("d/missing").is_none());
    }

    #[test]
    fn test_listing_serializes_as_array() {
        let listing = Listing::new(vec![Entry::directory("d/sub")]);
        let value = serde_json::to_value(&listing).unwrap();
        assert_eq!(value, json!([{"name": "d/sub", "type": "directory"}]));
    }
}
