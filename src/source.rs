//! Work sources: the batch of items to ingest.
//!
//! A [`WorkSource`] is a lazy, finite, non-restartable sequence of
//! [`RawItem`]s plus the shape-specific knowledge the pipeline needs to turn
//! an item into metadata. Two implementations exist:
//!
//! | Source | Input | Validation |
//! |--------|-------|------------|
//! | [`TabularSource`](crate::source_tabular::TabularSource) | CSV with numbered repeating columns | header, once at open |
//! | [`StructuredSource`](crate::source_structured::StructuredSource) | JSON array of objects | every item, as it is consumed |
//!
//! Use [`open_source`] to pick one from a path.

use std::path::{Path, PathBuf};

use crate::error::{BatchError, ItemError};
use crate::models::{FileMode, MetadataRecord, RawItem, SourceShape};
use crate::schema::FieldSchema;
use crate::source_structured::StructuredSource;
use crate::source_tabular::TabularSource;

/// Input format of a batch file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Tabular,
    Structured,
}

impl SourceFormat {
    /// Structured when forced or when the file ends in `.json`.
    pub fn detect(path: &Path, force_structured: bool) -> Self {
        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if force_structured || is_json {
            SourceFormat::Structured
        } else {
            SourceFormat::Tabular
        }
    }
}

/// A batch of items to ingest.
///
/// Iteration yields items in source order. A read error ends the batch; it
/// is never a per-item failure because no raw item exists to record.
pub trait WorkSource: Iterator<Item = Result<RawItem, BatchError>> + Send {
    /// Path the source was opened from.
    fn path(&self) -> &Path;

    /// Shape of the source, used to write a retry artifact in kind.
    fn shape(&self) -> SourceShape;

    /// Field schema shared by every item, when the source has one.
    fn schema(&self) -> Option<&FieldSchema> {
        None
    }

    /// Display identity for an item: its identifier, else its title.
    fn identity_of(&self, item: &RawItem) -> Option<String>;

    /// Validate (where the shape requires it) and normalize one item.
    fn metadata_for(&self, item: &RawItem) -> Result<MetadataRecord, ItemError>;

    /// Directory that relative file references are taken against.
    fn base_dir(&self) -> PathBuf {
        let absolute = std::path::absolute(self.path()).unwrap_or_else(|_| self.path().to_path_buf());
        absolute
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Open a batch file as a work source.
///
/// Tabular sources validate their header here, so a missing required
/// column aborts before any item is read.
pub fn open_source(
    path: &Path,
    format: SourceFormat,
    mode: FileMode,
) -> Result<Box<dyn WorkSource>, BatchError> {
    match format {
        SourceFormat::Tabular => Ok(Box::new(TabularSource::open(path, mode)?)),
        SourceFormat::Structured => Ok(Box::new(StructuredSource::open(path, mode)?)),
    }
}

/// First non-empty text among `fields`, in order.
pub(crate) fn first_non_empty(item: &RawItem, fields: &[&str]) -> Option<String> {
    fields.iter().find_map(|field| {
        item.get(*field)
            .and_then(|v| v.first_text())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}
