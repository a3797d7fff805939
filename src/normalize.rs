//! Raw item → canonical metadata record.
//!
//! Tabular rows are folded from numbered columns into lists using the
//! source's [`FieldSchema`]: `{ "title1": "joe", "creator1": "larry",
//! "creator2": "james" }` becomes `{ "title": ["joe"], "creator": ["larry",
//! "james"] }`. Structured items already carry native lists and only have
//! their control keys stripped.

use crate::error::ItemError;
use crate::models::{FieldValue, MetadataRecord, RawItem};
use crate::schema::FieldSchema;

/// Keys of a structured item that never reach the manifest.
const STRUCTURED_CONTROL_KEYS: [&str; 4] = ["files", "first_file", "resources", "fulltext_url"];

/// Build the canonical record for a tabular row.
///
/// Singular fields map to their value, or `null` when empty. Repeating
/// fields probe `base1`, `base2`, ... and stop at the first gap: a suffix
/// that is missing or holds an empty value. Nothing after a gap is kept and
/// no holes are inserted.
pub fn normalize(raw: &RawItem, schema: &FieldSchema) -> Result<MetadataRecord, ItemError> {
    let mut record = MetadataRecord::default();

    for name in &schema.singular {
        let value = raw
            .get(name)
            .ok_or_else(|| ItemError::MissingField(name.clone()))?;
        let value = if value.is_blank() {
            None
        } else {
            Some(value.clone())
        };
        record.0.insert(name.clone(), value);
    }

    for base in &schema.repeating {
        let mut values = Vec::new();
        for n in 1usize.. {
            let Some(value) = raw.get(&format!("{base}{n}")) else {
                break;
            };
            // An empty cell ends the family, same as a missing column.
            if value.is_blank() {
                break;
            }
            values.extend(value.texts().into_iter().map(str::to_string));
        }
        record
            .0
            .insert(base.clone(), Some(FieldValue::List(values)));
    }

    Ok(record)
}

/// Build the canonical record for a structured item: every key except the
/// file-driving control keys, values passed through unchanged.
pub fn structured_metadata(raw: &RawItem) -> MetadataRecord {
    let fields = raw
        .iter()
        .filter(|(key, _)| !STRUCTURED_CONTROL_KEYS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), Some(value.clone())))
        .collect();
    MetadataRecord(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::analyze;

    fn row(pairs: &[(&str, &str)]) -> RawItem {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), FieldValue::Scalar(v.to_string())))
            .collect()
    }

    fn list(values: &[&str]) -> Option<FieldValue> {
        Some(FieldValue::List(
            values.iter().map(|s| s.to_string()).collect(),
        ))
    }

    #[test]
    fn folds_numbered_columns() {
        let raw = row(&[
            ("title1", "joe"),
            ("creator1", "larry"),
            ("creator2", "james"),
            ("abstract", "text"),
            ("files", "a.pdf"),
        ]);
        let schema = analyze(raw.keys());
        let record = normalize(&raw, &schema).unwrap();
        assert_eq!(record.0["title"], list(&["joe"]));
        assert_eq!(record.0["creator"], list(&["larry", "james"]));
        assert_eq!(
            record.0["abstract"],
            Some(FieldValue::Scalar("text".into()))
        );
        assert!(!record.0.contains_key("files"));
    }

    #[test]
    fn gap_stops_the_scan() {
        let raw = row(&[("creator1", "A"), ("creator2", ""), ("creator3", "C")]);
        let schema = analyze(raw.keys());
        let record = normalize(&raw, &schema).unwrap();
        assert_eq!(record.0["creator"], list(&["A"]));

        let raw = row(&[("creator1", "A"), ("creator3", "C")]);
        let schema = analyze(raw.keys());
        let record = normalize(&raw, &schema).unwrap();
        assert_eq!(record.0["creator"], list(&["A"]));
    }

    #[test]
    fn empty_singular_is_null() {
        let raw = row(&[("abstract", ""), ("title1", "t")]);
        let schema = analyze(raw.keys());
        let record = normalize(&raw, &schema).unwrap();
        assert_eq!(record.0["abstract"], None);
    }

    #[test]
    fn missing_singular_key_is_an_error() {
        let raw = row(&[("title1", "t")]);
        let schema = analyze(["title1", "abstract"]);
        assert!(matches!(
            normalize(&raw, &schema),
            Err(ItemError::MissingField(f)) if f == "abstract"
        ));
    }

    #[test]
    fn numbered_control_columns_stay_out_of_the_manifest() {
        let raw = row(&[("files1", "a.pdf"), ("first_file1", "a.pdf"), ("title1", "t")]);
        let schema = analyze(raw.keys());
        let record = normalize(&raw, &schema).unwrap();
        let keys: Vec<&str> = record.0.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["title"]);
    }

    #[test]
    fn normalize_is_idempotent() {
        let raw = row(&[("title1", "a"), ("title2", "b"), ("note", "")]);
        let schema = analyze(raw.keys());
        assert_eq!(
            normalize(&raw, &schema).unwrap(),
            normalize(&raw, &schema).unwrap()
        );
    }

    #[test]
    fn structured_strips_control_keys() {
        let raw: RawItem = serde_json::from_str(
            r#"{"title": ["T"], "files": "d", "first_file": "d/a.pdf",
                "resources": ["http://x/y"], "fulltext_url": "http://x/z", "year": 2001}"#,
        )
        .unwrap();
        let record = structured_metadata(&raw);
        let keys: Vec<&str> = record.0.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["title", "year"]);
        assert_eq!(record.title(), Some("T"));
    }
}
