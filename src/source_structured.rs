use std::path::{Path, PathBuf};

use crate::error::{BatchError, ItemError};
use crate::models::{FileMode, MetadataRecord, RawItem, SourceShape};
use crate::normalize::structured_metadata;
use crate::schema::validate_structured_item;
use crate::source::{first_non_empty, WorkSource};

/// JSON batch source: a top-level array of work objects.
///
/// Items are not guaranteed to share a schema, so each one is validated
/// when it is normalized rather than once at open.
pub struct StructuredSource {
    path: PathBuf,
    mode: FileMode,
    items: std::vec::IntoIter<RawItem>,
}

impl StructuredSource {
    pub fn open(path: &Path, mode: FileMode) -> Result<Self, BatchError> {
        let content = std::fs::read_to_string(path).map_err(|source| BatchError::OpenSource {
            path: path.to_path_buf(),
            source,
        })?;
        let value: serde_json::Value = serde_json::from_str(&content)?;
        if !value.is_array() {
            return Err(BatchError::NotAnArray);
        }
        let items: Vec<RawItem> = serde_json::from_value(value)?;
        tracing::debug!(path = %path.display(), count = items.len(), "loaded json");

        Ok(Self {
            path: path.to_path_buf(),
            mode,
            items: items.into_iter(),
        })
    }
}

impl Iterator for StructuredSource {
    type Item = Result<RawItem, BatchError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.items.next().map(Ok)
    }
}

impl WorkSource for StructuredSource {
    fn path(&self) -> &Path {
        &self.path
    }

    fn shape(&self) -> SourceShape {
        SourceShape::Structured
    }

    fn identity_of(&self, item: &RawItem) -> Option<String> {
        first_non_empty(item, &["identifier", "title"])
    }

    fn metadata_for(&self, item: &RawItem) -> Result<MetadataRecord, ItemError> {
        validate_structured_item(item, self.mode)?;
        Ok(structured_metadata(item))
    }
}
