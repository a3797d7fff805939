//! Core data models used throughout the batch loader.
//!
//! These types represent the raw items read from a batch source, the
//! normalized metadata handed to the deposit command, and the per-item state
//! the pipeline tracks while working through a batch.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// Field names that drive file resolution rather than metadata.
pub const CONTROL_FIELDS: [&str; 3] = ["files", "fulltext_url", "first_file"];

/// A single field value as read from a source.
///
/// Tabular sources only ever produce [`FieldValue::Scalar`]. Structured
/// sources produce whichever variant matches the JSON value; anything that
/// is neither a string nor a list of strings is kept as [`FieldValue::Nested`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Scalar(String),
    List(Vec<String>),
    Nested(serde_json::Value),
}

impl FieldValue {
    pub fn is_list(&self) -> bool {
        match self {
            FieldValue::List(_) => true,
            FieldValue::Nested(v) => v.is_array(),
            FieldValue::Scalar(_) => false,
        }
    }

    /// True for an empty string, an empty list, or JSON null.
    pub fn is_blank(&self) -> bool {
        match self {
            FieldValue::Scalar(s) => s.is_empty(),
            FieldValue::List(items) => items.is_empty(),
            FieldValue::Nested(v) => v.is_null(),
        }
    }

    /// First textual value: the scalar itself or the first list entry.
    pub fn first_text(&self) -> Option<&str> {
        match self {
            FieldValue::Scalar(s) => Some(s),
            FieldValue::List(items) => items.first().map(String::as_str),
            FieldValue::Nested(v) => match v {
                serde_json::Value::String(s) => Some(s),
                serde_json::Value::Array(items) => items.first().and_then(|i| i.as_str()),
                _ => None,
            },
        }
    }

    /// Every textual value, in order.
    pub fn texts(&self) -> Vec<&str> {
        match self {
            FieldValue::Scalar(s) => vec![s.as_str()],
            FieldValue::List(items) => items.iter().map(String::as_str).collect(),
            FieldValue::Nested(serde_json::Value::Array(items)) => {
                items.iter().filter_map(|i| i.as_str()).collect()
            }
            FieldValue::Nested(_) => Vec::new(),
        }
    }
}

/// One record as produced by a work source, in source field order.
pub type RawItem = IndexMap<String, FieldValue>;

/// Canonical metadata written to the deposit manifest.
///
/// Keys are sorted so that the manifest is byte-stable for the same input.
/// `None` serializes as JSON `null` (empty singular field).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MetadataRecord(pub BTreeMap<String, Option<FieldValue>>);

impl MetadataRecord {
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.0.get(key).and_then(Option::as_ref)
    }

    /// Display title for log lines; the first title value if any.
    pub fn title(&self) -> Option<&str> {
        self.get("title").and_then(FieldValue::first_text)
    }
}

/// Physical format of a batch source, and of its retry artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceShape {
    /// CSV with the original header row.
    Tabular { headers: Vec<String> },
    /// JSON array of objects.
    Structured,
}

impl SourceShape {
    pub fn extension(&self) -> &'static str {
        match self {
            SourceShape::Tabular { .. } => "csv",
            SourceShape::Structured => "json",
        }
    }
}

/// Where a work's files come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileMode {
    /// `files` holds a path (or paths) relative to the source file.
    #[default]
    Local,
    /// `fulltext_url` holds a URL to download.
    Url,
}

impl FileMode {
    /// Name of the field that must carry the file reference.
    pub fn reference_field(&self) -> &'static str {
        match self {
            FileMode::Local => "files",
            FileMode::Url => "fulltext_url",
        }
    }
}

/// Validated primary file and its companions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFileSet {
    pub primary_file: PathBuf,
    pub other_files: BTreeSet<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Pending,
    Succeeded,
    Failed,
}

/// Per-item state while the pipeline works on it.
///
/// `raw` is never modified; it is what lands in the retry artifact.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub identity: String,
    pub raw: RawItem,
    pub metadata: Option<MetadataRecord>,
    pub files: Option<ResolvedFileSet>,
    pub outcome: Outcome,
}

impl WorkItem {
    pub fn new(identity: String, raw: RawItem) -> Self {
        Self {
            identity,
            raw,
            metadata: None,
            files: None,
            outcome: Outcome::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_value_untagged_json() {
        let item: RawItem = serde_json::from_str(
            r#"{"title": ["A"], "files": "dir", "year": 1999, "meta": {"k": "v"}}"#,
        )
        .unwrap();
        assert_eq!(item["title"], FieldValue::List(vec!["A".into()]));
        assert_eq!(item["files"], FieldValue::Scalar("dir".into()));
        assert_eq!(item["year"], FieldValue::Nested(serde_json::json!(1999)));
        assert!(matches!(item["meta"], FieldValue::Nested(_)));

        let back = serde_json::to_value(&item).unwrap();
        assert_eq!(back["year"], serde_json::json!(1999));
        assert_eq!(back["title"], serde_json::json!(["A"]));
    }

    #[test]
    fn first_text_of_each_shape() {
        assert_eq!(FieldValue::Scalar("x".into()).first_text(), Some("x"));
        assert_eq!(
            FieldValue::List(vec!["a".into(), "b".into()]).first_text(),
            Some("a")
        );
        assert_eq!(FieldValue::List(vec![]).first_text(), None);
        assert_eq!(
            FieldValue::Nested(serde_json::json!(["n", 1])).first_text(),
            Some("n")
        );
    }

    #[test]
    fn metadata_record_serializes_null_for_empty_singular() {
        let mut rec = MetadataRecord::default();
        rec.0.insert("abstract".into(), None);
        rec.0
            .insert("creator".into(), Some(FieldValue::List(vec!["A".into()])));
        let json = serde_json::to_string(&rec).unwrap();
        assert_eq!(json, r#"{"abstract":null,"creator":["A"]}"#);
    }
}
