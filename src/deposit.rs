//! Handing a work to the repository's deposit command.
//!
//! The command is opaque: it receives a JSON metadata manifest and file
//! paths on its command line and prints the record identifier on stdout.
//!
//! ```text
//! <command...> -- --manifest=<metadata.json> --primaryfile=<path>
//!     --depositor=<user> --worktype=<type> [--collection=<id>]
//!     [--otherfiles=<a>{|,|}<b>...] [--update-item-id=<id>]
//! ```
//!
//! Other files are joined with `{|,|}` because file names may contain commas.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::DepositConfig;
use crate::error::DepositError;
use crate::models::{MetadataRecord, ResolvedFileSet};

const OTHER_FILES_SEPARATOR: &str = "{|,|}";

/// Everything the deposit backend needs for one work.
#[derive(Debug, Clone)]
pub struct DepositRequest<'a> {
    pub metadata: &'a MetadataRecord,
    pub files: &'a ResolvedFileSet,
    pub worktype: &'a str,
    pub collection: Option<&'a str>,
    /// Existing record to update instead of creating a new one.
    pub existing_id: Option<&'a str>,
}

/// Deposits one work and returns its record identifier.
pub trait Depositor: Send + Sync {
    fn deposit(&self, request: &DepositRequest<'_>) -> Result<String, DepositError>;
}

/// Runs the configured deposit command once per work.
pub struct CommandDepositor {
    program: String,
    leading_args: Vec<String>,
    working_dir: PathBuf,
    depositor: String,
    keep_manifests: bool,
}

impl CommandDepositor {
    pub fn new(config: &DepositConfig, keep_manifests: bool) -> Self {
        let mut parts = config.command.split_whitespace().map(str::to_string);
        let program = parts.next().unwrap_or_default();
        Self {
            program,
            leading_args: parts.collect(),
            working_dir: config.working_dir.clone(),
            depositor: config.depositor.clone(),
            keep_manifests,
        }
    }

    /// Arguments after the program name.
    fn args(&self, manifest: &Path, request: &DepositRequest<'_>) -> Vec<String> {
        let mut args = self.leading_args.clone();
        args.push("--".to_string());
        args.push(format!("--manifest={}", manifest.display()));
        args.push(format!(
            "--primaryfile={}",
            request.files.primary_file.display()
        ));
        args.push(format!("--depositor={}", self.depositor));
        args.push(format!("--worktype={}", request.worktype));
        if let Some(collection) = request.collection {
            args.push(format!("--collection={}", collection));
        }
        if !request.files.other_files.is_empty() {
            let others: Vec<String> = request
                .files
                .other_files
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            args.push(format!("--otherfiles={}", others.join(OTHER_FILES_SEPARATOR)));
        }
        if let Some(id) = request.existing_id {
            args.push(format!("--update-item-id={}", id));
        }
        args
    }

    fn write_manifest(&self, dir: &Path, metadata: &MetadataRecord) -> Result<PathBuf, DepositError> {
        let path = dir.join("metadata.json");
        let json = serde_json::to_string_pretty(metadata)?;
        std::fs::write(&path, json).map_err(DepositError::Manifest)?;
        tracing::debug!(path = %path.display(), "wrote manifest");
        Ok(path)
    }
}

impl Depositor for CommandDepositor {
    fn deposit(&self, request: &DepositRequest<'_>) -> Result<String, DepositError> {
        let scratch = tempfile::tempdir().map_err(DepositError::Manifest)?;
        let manifest = self.write_manifest(scratch.path(), request.metadata)?;

        let title = request.metadata.title().unwrap_or("(untitled)");
        tracing::info!(title, "importing");
        if request.existing_id.is_some() {
            tracing::info!(title, "is an update");
        }

        let args = self.args(&manifest, request);
        tracing::info!(command = %format!("{} {}", self.program, args.join(" ")), "running deposit command");

        let output = Command::new(&self.program)
            .args(&args)
            .current_dir(&self.working_dir)
            .output()
            .map_err(|source| DepositError::Spawn {
                program: self.program.clone(),
                source,
            });

        if self.keep_manifests {
            let kept = scratch.keep();
            tracing::debug!(path = %kept.display(), "kept manifest directory");
        }
        let output = output?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let captured = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(DepositError::CommandFailed {
                status: output.status.to_string(),
                output: captured,
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let id = stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .last()
            .ok_or(DepositError::EmptyIdentifier)?
            .to_string();
        tracing::info!(title, id = %id, "repository id assigned");
        Ok(id)
    }
}
