//! Data models for bibliographic records.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Bibliographic database a record was exported from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SourceDb {
    #[serde(rename = "WoS")]
    WoS,
    Scopus,
    #[default]
    Other,
}

impl SourceDb {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceDb::WoS    => "WoS",
            SourceDb::Scopus => "Scopus",
            SourceDb::Other  => "Other",
        }
    }

    /// Lower ranks are kept first when the same work appears in several exports.
    pub fn priority(&self) -> u8 {
        match self {
            SourceDb::WoS    => 0,
            SourceDb::Scopus => 1,
            SourceDb::Other  => 2,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "wos" | "web of science" => Some(SourceDb::WoS),
            "scopus"                 => Some(SourceDb::Scopus),
            "other"                  => Some(SourceDb::Other),
            _ => None,
        }
    }
}

impl fmt::Display for SourceDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Number(serde_json::Number),
}

impl FieldValue {
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            FieldValue::Text(s) => Cow::Borrowed(s.as_str()),
            FieldValue::Number(n) => Cow::Owned(n.to_string()),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Number(n.into())
    }
}

/// One bibliographic item: a flat mapping of column names to values plus
/// the `_source` tag assigned at upload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "_source", default)]
    pub source: SourceDb,
    #[serde(flatten)]
    pub fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new(source: SourceDb) -> Self {
        Self { source, fields: BTreeMap::new() }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// First non-empty value among `keys`, in order.
    pub fn first_text(&self, keys: &[&str]) -> Option<Cow<'_, str>> {
        keys.iter()
            .filter_map(|k| self.fields.get(*k))
            .map(FieldValue::as_text)
            .find(|v| !v.trim().is_empty())
    }

    pub fn title(&self) -> Cow<'_, str> {
        self.first_text(&["Title", "title"]).unwrap_or_default()
    }

    pub fn doi(&self) -> Cow<'_, str> {
        self.first_text(&["DOI", "doi"]).unwrap_or_default()
    }

    pub fn abstract_text(&self) -> Cow<'_, str> {
        self.first_text(&["Abstract", "abstract"]).unwrap_or_default()
    }

    pub fn keywords(&self) -> Cow<'_, str> {
        self.first_text(&["Author_Keywords", "author_keywords"]).unwrap_or_default()
    }

    /// Source used for dedup ranking. An explicit `Database` column wins over
    /// the tag assigned at upload.
    pub fn ranking_source(&self) -> SourceDb {
        self.first_text(&["Database"])
            .and_then(|db| SourceDb::parse(&db))
            .unwrap_or(self.source)
    }
}
