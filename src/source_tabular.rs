use std::fs::File;
use std::path::{Path, PathBuf};

use crate::error::{BatchError, ItemError};
use crate::models::{FieldValue, FileMode, MetadataRecord, RawItem, SourceShape};
use crate::normalize::normalize;
use crate::schema::{analyze, validate_field_names, FieldSchema};
use crate::source::{first_non_empty, WorkSource};

/// CSV batch source.
///
/// The header is validated and analyzed once at open; the resulting
/// [`FieldSchema`] is shared by every row. Rows are read lazily. Short rows
/// are padded with empty strings so every item carries every header field.
pub struct TabularSource {
    path: PathBuf,
    headers: Vec<String>,
    schema: FieldSchema,
    records: csv::StringRecordsIntoIter<File>,
    index: usize,
}

impl TabularSource {
    pub fn open(path: &Path, mode: FileMode) -> Result<Self, BatchError> {
        tracing::debug!(path = %path.display(), "loading csv");
        let file = File::open(path).map_err(|source| BatchError::OpenSource {
            path: path.to_path_buf(),
            source,
        })?;
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(file);
        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

        validate_field_names(&headers, mode)?;
        let schema = analyze(&headers);

        Ok(Self {
            path: path.to_path_buf(),
            headers,
            schema,
            records: reader.into_records(),
            index: 0,
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    fn to_item(&self, record: &csv::StringRecord) -> RawItem {
        if record.len() > self.headers.len() {
            tracing::warn!(
                row = self.index,
                extra = record.len() - self.headers.len(),
                "row has more fields than the header; extra fields dropped"
            );
        }
        self.headers
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let value = record.get(i).unwrap_or_default().to_string();
                (name.clone(), FieldValue::Scalar(value))
            })
            .collect()
    }
}

impl Iterator for TabularSource {
    type Item = Result<RawItem, BatchError>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.records.next()?;
        self.index += 1;
        Some(match record {
            Ok(record) => Ok(self.to_item(&record)),
            Err(e) => Err(BatchError::SourceRead {
                index: self.index,
                message: e.to_string(),
            }),
        })
    }
}

impl WorkSource for TabularSource {
    fn path(&self) -> &Path {
        &self.path
    }

    fn shape(&self) -> SourceShape {
        SourceShape::Tabular {
            headers: self.headers.clone(),
        }
    }

    fn schema(&self) -> Option<&FieldSchema> {
        Some(&self.schema)
    }

    fn identity_of(&self, item: &RawItem) -> Option<String> {
        first_non_empty(item, &["identifier1", "title1"])
    }

    fn metadata_for(&self, item: &RawItem) -> Result<MetadataRecord, ItemError> {
        normalize(item, &self.schema)
    }
}
