//! Field vocabulary analysis and required-field validation.
//!
//! Tabular sources encode repetition with numeric suffixes (`creator1`,
//! `creator2`, ...). [`analyze`] splits a header into singular and
//! repeating field families; the result is computed once per tabular source
//! and shared by every row.

use std::collections::BTreeSet;

use crate::error::{ItemError, SchemaError};
use crate::models::{FileMode, RawItem, CONTROL_FIELDS};

/// Fields every batch must supply, in tabular spelling. A trailing `1`
/// marks the family as repeating.
pub const REQUIRED_FIELDS: [&str; 6] = [
    "files",
    "fulltext_url",
    "resource_type1",
    "title1",
    "creator1",
    "license1",
];

/// Singular vs. repeating field families.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSchema {
    pub singular: BTreeSet<String>,
    pub repeating: BTreeSet<String>,
}

/// Classify field names into singular and repeating families.
///
/// Names are visited in lexicographic order. A name ending in digits is
/// split at the start of its maximal trailing digit run; a suffix of exactly
/// `1` makes the base repeating. Any other suffix leaves the whole name as a
/// singular field unless its base is already known to be repeating, so a
/// lone `creator3` with no `creator1` stays a field of its own. Control
/// fields are never classified.
pub fn analyze<I, S>(field_names: I) -> FieldSchema
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut names: Vec<String> = field_names
        .into_iter()
        .map(|n| n.as_ref().to_string())
        .collect();
    names.sort();
    names.dedup();

    let mut schema = FieldSchema::default();
    for name in names {
        match split_suffix(&name) {
            None => {
                schema.singular.insert(name);
            }
            Some((base, "1")) => {
                schema.repeating.insert(base.to_string());
            }
            Some((base, _)) => {
                if !schema.repeating.contains(base) {
                    schema.singular.insert(name.clone());
                }
            }
        }
    }

    // A bare `creator` next to `creator1` would otherwise sit in both sets.
    let repeating = schema.repeating.clone();
    schema.singular.retain(|n| !repeating.contains(n));
    for control in CONTROL_FIELDS {
        schema.singular.remove(control);
        schema.repeating.remove(control);
    }

    tracing::debug!(singular = ?schema.singular, repeating = ?schema.repeating, "analyzed field names");
    schema
}

/// Split `name` into `(base, digits)` at its maximal trailing digit run.
///
/// Returns `None` when there is no digit suffix or the name is all digits.
fn split_suffix(name: &str) -> Option<(&str, &str)> {
    let base_len = name.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    if base_len == name.len() || base_len == 0 {
        return None;
    }
    Some(name.split_at(base_len))
}

/// Check a tabular header against the required vocabulary.
///
/// `files` is only required for local ingest and `fulltext_url` only in URL
/// mode.
pub fn validate_field_names(field_names: &[String], mode: FileMode) -> Result<(), SchemaError> {
    tracing::debug!("validating field names");
    for required in REQUIRED_FIELDS {
        if skipped_for_mode(required, mode) {
            continue;
        }
        if !field_names.iter().any(|f| f == required) {
            return Err(SchemaError::MissingField {
                field: required.to_string(),
            });
        }
    }
    Ok(())
}

/// Check one structured item: required repeating fields must be lists and
/// the mode's file reference must be present.
pub fn validate_structured_item(item: &RawItem, mode: FileMode) -> Result<(), ItemError> {
    let required = analyze(REQUIRED_FIELDS);
    for field in &required.singular {
        match item.get(field) {
            None => return Err(ItemError::MissingField(field.clone())),
            Some(value) if value.is_list() => {
                return Err(ItemError::WrongShape {
                    field: field.clone(),
                    expected: "a single value",
                })
            }
            Some(_) => {}
        }
    }
    for field in &required.repeating {
        match item.get(field) {
            None => return Err(ItemError::MissingField(field.clone())),
            Some(value) if !value.is_list() => {
                return Err(ItemError::WrongShape {
                    field: field.clone(),
                    expected: "a list",
                })
            }
            Some(_) => {}
        }
    }
    let reference = mode.reference_field();
    if !item.contains_key(reference) {
        return Err(ItemError::MissingField(reference.to_string()));
    }
    Ok(())
}

fn skipped_for_mode(field: &str, mode: FileMode) -> bool {
    matches!(
        (field, mode),
        ("files", FileMode::Url) | ("fulltext_url", FileMode::Local)
    )
}
