use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use crate::models::FileMode;
use crate::source::{open_source, SourceFormat};

/// Tally of a `check` run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CheckReport {
    pub items: usize,
    pub invalid: usize,
}

/// Open a batch file, print its field schema and validate every item
/// without depositing anything.
pub fn run_check(path: &Path, format: SourceFormat, mode: FileMode) -> Result<CheckReport> {
    let mut out = std::io::stdout().lock();
    check_to(&mut out, path, format, mode)
}

pub fn check_to<W: Write>(
    out: &mut W,
    path: &Path,
    format: SourceFormat,
    mode: FileMode,
) -> Result<CheckReport> {
    let mut source = open_source(path, format, mode)
        .with_context(|| format!("Failed to open batch file: {}", path.display()))?;

    if let Some(schema) = source.schema() {
        writeln!(out, "{:<12} FIELDS", "KIND")?;
        for name in &schema.singular {
            writeln!(out, "{:<12} {}", "singular", name)?;
        }
        for name in &schema.repeating {
            writeln!(out, "{:<12} {}", "repeating", name)?;
        }
        writeln!(out)?;
    }

    let mut report = CheckReport::default();
    writeln!(out, "{:<6} {:<32} STATUS", "ITEM", "IDENTITY")?;
    while let Some(next) = source.next() {
        let raw = next?;
        report.items += 1;
        let identity = source
            .identity_of(&raw)
            .unwrap_or_else(|| format!("item {}", report.items));
        let status = match source.metadata_for(&raw) {
            Ok(_) if raw.get(mode.reference_field()).is_some_and(|v| !v.is_blank()) => {
                "OK".to_string()
            }
            Ok(_) => format!("missing {}", mode.reference_field()),
            Err(e) => e.to_string(),
        };
        if status != "OK" {
            report.invalid += 1;
        }
        writeln!(out, "{:<6} {:<32} {}", report.items, identity, status)?;
    }

    writeln!(out)?;
    writeln!(out, "{} items, {} invalid", report.items, report.invalid)?;
    Ok(report)
}
