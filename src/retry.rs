//! Retry artifacts for resumable runs.
//!
//! Items that did not make it into the repository are written back out in
//! the same format they came in, unmodified, so the next run re-enters the
//! pipeline exactly as this one did.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use crate::error::BatchError;
use crate::models::{RawItem, SourceShape};

/// File stem of the retry artifact; the extension follows the source shape.
pub const RETRY_FILE_STEM: &str = "retry_ingest";

/// A written retry file and the command line that resumes from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryArtifact {
    pub path: PathBuf,
    pub command: String,
}

/// Well-known retry file path for a shape inside `dir`.
pub fn retry_path(dir: &Path, shape: &SourceShape) -> PathBuf {
    dir.join(format!("{}.{}", RETRY_FILE_STEM, shape.extension()))
}

/// Write `failed_items` to the retry file.
///
/// Does nothing and returns `None` when there is nothing to retry.
/// `invocation` is the original argument vector (program first) and
/// `source_arg` the argument that named the batch file.
pub fn write(
    failed_items: &[RawItem],
    shape: &SourceShape,
    dir: &Path,
    invocation: &[String],
    source_arg: &str,
) -> Result<Option<RetryArtifact>, BatchError> {
    if failed_items.is_empty() {
        return Ok(None);
    }

    let path = retry_path(dir, shape);
    let fail = |message: String| BatchError::RetryWrite {
        path: path.clone(),
        message,
    };

    std::fs::create_dir_all(dir).map_err(|e| fail(e.to_string()))?;
    match shape {
        SourceShape::Tabular { headers } => {
            write_tabular(&path, headers, failed_items).map_err(|e| fail(e.to_string()))?
        }
        SourceShape::Structured => {
            let file = File::create(&path).map_err(|e| fail(e.to_string()))?;
            serde_json::to_writer_pretty(BufWriter::new(file), failed_items)
                .map_err(|e| fail(e.to_string()))?;
        }
    }
    tracing::info!(path = %path.display(), count = failed_items.len(), "wrote retry file");

    let command = resume_command(invocation, source_arg, &path);
    Ok(Some(RetryArtifact { path, command }))
}

fn write_tabular(path: &Path, headers: &[String], items: &[RawItem]) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(headers)?;
    for item in items {
        let row: Vec<&str> = headers
            .iter()
            .map(|h| item.get(h).and_then(|v| v.first_text()).unwrap_or(""))
            .collect();
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

/// The original command line with the batch file replaced by `retry_file`.
///
/// Every other argument is kept verbatim; if the batch file argument cannot
/// be found the retry file is appended.
pub fn resume_command(invocation: &[String], source_arg: &str, retry_file: &Path) -> String {
    let retry = retry_file.display().to_string();
    let mut args: Vec<String> = invocation.to_vec();
    match args.iter().skip(1).position(|a| a == source_arg) {
        Some(i) => args[i + 1] = retry,
        None => args.push(retry),
    }
    args.iter()
        .map(|a| shell_quote(a))
        .collect::<Vec<_>>()
        .join(" ")
}

fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@,+%".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}
