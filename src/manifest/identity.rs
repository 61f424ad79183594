use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of a manifest source (e.g., `local`, `repo`).
///
/// Every source owns one namespace of entry ids; the name is the first half of
/// a [`ManifestId`].
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceName(pub String);

/// Source-local identifier for one manifest entry.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub String);

/// Unique key for one manifest in the index.
///
/// Two sources may reuse the same entry id, so identity always carries the
/// source name. Field order matters: the derived `Ord` compares the source
/// first and the entry id second, which is the order query results use.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct ManifestId {
    pub source: SourceName,
    pub entry: EntryId,
}

impl ManifestId {
    pub fn new(source: impl Into<String>, entry: impl Into<String>) -> Self {
        Self {
            source: SourceName(source.into()),
            entry: EntryId(entry.into()),
        }
    }
}

impl SourceName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl EntryId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SourceName {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SourceName {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for EntryId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for EntryId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for SourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ManifestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.source, self.entry)
    }
}
