//! Ingestion pipeline orchestration.
//!
//! Drives a [`WorkSource`] item by item: normalize → resolve files →
//! (download, derivative) → deposit. One item's failure never aborts the
//! batch; the untouched raw item is kept for the retry artifact instead.
//!
//! ```text
//! Idle ──open──▶ Running ──source exhausted──▶ Completed ─┐
//!                   │                                      ├─▶ finalize
//!                   └──────interrupt flag──────▶ Interrupted┘
//! ```
//!
//! The interrupt flag is only checked between items, so an in-flight
//! deposit always finishes first. Finalize accounts for every item the
//! source can still yield, so after a run
//! `succeeded + failed_items.len() == total`.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tempfile::TempDir;

use crate::deposit::{DepositRequest, Depositor};
use crate::derivative::DerivativeGenerator;
use crate::error::{BatchError, ItemError, ItemFailure};
use crate::fetch::Fetcher;
use crate::files::{resolve, FileReference};
use crate::models::{FieldValue, FileMode, Outcome, RawItem, ResolvedFileSet, SourceShape, WorkItem};
use crate::report::{ReportEvent, Reporter};
use crate::retry::{self, RetryArtifact};
use crate::source::{first_non_empty, open_source, SourceFormat, WorkSource};

/// Consecutive failures, with no success yet, that trigger a warning.
const EARLY_FAILURE_WARNING: usize = 5;

/// Shared cancellation flag, set from a signal handler.
#[derive(Clone, Debug, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Run-level settings.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub mode: FileMode,
    pub worktype: String,
    pub collection: Option<String>,
    pub tiff: bool,
    pub dry_run: bool,
    /// Keep scratch downloads and manifests after the run.
    pub keep_scratch: bool,
    /// Retry file directory; the batch file's directory when unset.
    pub retry_dir: Option<PathBuf>,
    /// Original argument vector, program first, for the resume command.
    pub invocation: Vec<String>,
    /// The argument in `invocation` that named the batch file.
    pub source_arg: String,
}

/// External collaborators used per item.
pub struct Collaborators<'a> {
    pub depositor: &'a dyn Depositor,
    pub fetcher: &'a dyn Fetcher,
    pub derivative: &'a dyn DerivativeGenerator,
    pub reporter: &'a dyn Reporter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Interrupted,
}

/// Counters and failed items for one run. Owned by the pipeline only.
#[derive(Debug, Default)]
pub struct BatchRunState {
    pub total_count: usize,
    pub succeeded_count: usize,
    pub failed_items: Vec<RawItem>,
    pub interrupted: bool,
}

/// Outcome of a finished run.
#[derive(Debug)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub interrupted: bool,
    pub retry: Option<RetryArtifact>,
}

pub struct IngestPipeline<'a> {
    options: IngestOptions,
    collab: Collaborators<'a>,
    interrupt: Interrupt,
    state: RunState,
    run: BatchRunState,
}

impl<'a> IngestPipeline<'a> {
    pub fn new(options: IngestOptions, collab: Collaborators<'a>, interrupt: Interrupt) -> Self {
        Self {
            options,
            collab,
            interrupt,
            state: RunState::Idle,
            run: BatchRunState::default(),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Open `path` and ingest every item in it.
    ///
    /// Start-up failures (missing required columns, unreadable file, no
    /// scratch space) are returned before any item is processed.
    pub fn run(&mut self, path: &Path, format: SourceFormat) -> Result<RunSummary, BatchError> {
        let source = match open_source(path, format, self.options.mode) {
            Ok(source) => source,
            Err(e) => {
                self.report(ReportEvent::Critical {
                    context: "open".into(),
                    message: e.to_string(),
                });
                return Err(e);
            }
        };
        self.run_source(source)
    }

    /// Ingest every item of an already opened source.
    pub fn run_source(&mut self, mut source: Box<dyn WorkSource>) -> Result<RunSummary, BatchError> {
        let scratch = self.allocate_scratch()?;
        let scratch_root = scratch.as_ref().map(|s| s.path().to_path_buf());
        let base_dir = source.base_dir();

        self.state = RunState::Running;
        self.report(ReportEvent::Status {
            context: "ingest".into(),
            message: format!("Loading objects from file: {}", source.path().display()),
        });

        let mut read_error = None;
        loop {
            if self.interrupt.is_triggered() {
                self.state = RunState::Interrupted;
                self.run.interrupted = true;
                self.report(ReportEvent::Warning {
                    context: "ingest".into(),
                    message: "interrupted; remaining items will not be processed".into(),
                });
                break;
            }
            let raw = match source.next() {
                None => {
                    self.state = RunState::Completed;
                    break;
                }
                Some(Ok(raw)) => raw,
                Some(Err(e)) => {
                    self.report(ReportEvent::Critical {
                        context: "ingest".into(),
                        message: e.to_string(),
                    });
                    self.state = RunState::Interrupted;
                    read_error = Some(e);
                    break;
                }
            };
            self.run.total_count += 1;
            let index = self.run.total_count;
            let identity = source
                .identity_of(&raw)
                .unwrap_or_else(|| format!("item {}", index));
            let mut item = WorkItem::new(identity, raw);
            self.ingest_item(source.as_ref(), &mut item, index, &base_dir, scratch_root.as_deref());
        }

        let summary = self.finalize(source, scratch, &base_dir)?;
        match read_error {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }

    fn allocate_scratch(&self) -> Result<Option<TempDir>, BatchError> {
        if self.options.mode == FileMode::Url || self.options.tiff {
            let dir = tempfile::Builder::new()
                .prefix("batch-loader-")
                .tempdir()
                .map_err(BatchError::Scratch)?;
            tracing::debug!(path = %dir.path().display(), "allocated scratch directory");
            Ok(Some(dir))
        } else {
            Ok(None)
        }
    }

    /// Process one item and record its outcome. Never fails the run.
    fn ingest_item(
        &mut self,
        source: &dyn WorkSource,
        item: &mut WorkItem,
        index: usize,
        base_dir: &Path,
        scratch_root: Option<&Path>,
    ) {
        let span = tracing::info_span!("item", identity = %item.identity, index);
        let _guard = span.enter();

        self.report(ReportEvent::Status {
            context: "ingest".into(),
            message: format!("uploading {}", item.identity),
        });

        match self.process(source, item, base_dir, scratch_root) {
            Ok(id) => {
                item.outcome = Outcome::Succeeded;
                self.run.succeeded_count += 1;
                tracing::debug!(record = %id, "deposited");
                self.report(ReportEvent::Success {
                    context: "ingest".into(),
                    identity: item.identity.clone(),
                });
            }
            Err(failure) => {
                item.outcome = Outcome::Failed;
                self.run.failed_items.push(item.raw.clone());
                self.report(ReportEvent::Failure {
                    context: stage_of(&failure).into(),
                    identity: item.identity.clone(),
                    kind: failure.kind().into(),
                    error: failure.to_string(),
                });
                if self.run.succeeded_count == 0
                    && self.run.failed_items.len() == EARLY_FAILURE_WARNING
                {
                    self.report(ReportEvent::Warning {
                        context: "ingest".into(),
                        message: format!(
                            "ingest failed the first {} items in a row",
                            EARLY_FAILURE_WARNING
                        ),
                    });
                }
            }
        }

        self.report(ReportEvent::Status {
            context: "ingest".into(),
            message: format!("End of {}", item.identity),
        });
    }

    fn process(
        &self,
        source: &dyn WorkSource,
        item: &mut WorkItem,
        base_dir: &Path,
        scratch_root: Option<&Path>,
    ) -> Result<String, ItemFailure> {
        let metadata = &*item.metadata.insert(source.metadata_for(&item.raw)?);

        let reference_field = self.options.mode.reference_field();
        let reference = item
            .raw
            .get(reference_field)
            .filter(|v| !v.is_blank())
            .ok_or_else(|| ItemError::EmptyFileReference(reference_field.to_string()))?;

        let item_dir = match scratch_root {
            Some(root) => Some(item_scratch_dir(root, &item.raw)?),
            None => None,
        };

        let (file_ref, primary) = match (self.options.mode, item_dir.as_deref()) {
            (FileMode::Url, Some(dir)) => self.download(&item.raw, reference, dir)?,
            _ => local_reference(&item.raw, reference),
        };

        let mut files = resolve(&file_ref, primary.as_deref(), base_dir)?;
        if let (true, Some(dir)) = (self.options.tiff, item_dir.as_deref()) {
            files = self.with_derivative(files, dir)?;
        }
        let files = &*item.files.insert(files);

        if self.options.dry_run {
            return Ok("dry-run".to_string());
        }

        let existing_id = item
            .raw
            .get("repository_id")
            .and_then(FieldValue::first_text)
            .filter(|s| !s.is_empty());
        let request = DepositRequest {
            metadata,
            files,
            worktype: &self.options.worktype,
            collection: self.options.collection.as_deref(),
            existing_id,
        };
        Ok(self.collab.depositor.deposit(&request)?)
    }

    /// Download `resources` then `fulltext_url` into `dir`.
    fn download(
        &self,
        raw: &RawItem,
        reference: &FieldValue,
        dir: &Path,
    ) -> Result<(FileReference, Option<PathBuf>), ItemFailure> {
        if let Some(resources) = raw.get("resources") {
            for url in resources.texts() {
                self.report(ReportEvent::Status {
                    context: "download".into(),
                    message: format!("downloading {}", url),
                });
                self.collab.fetcher.fetch(url, dir)?;
            }
        }
        let url = reference.first_text().unwrap_or_default();
        self.report(ReportEvent::Status {
            context: "download".into(),
            message: format!("downloading {}", url),
        });
        let primary = self.collab.fetcher.fetch(url, dir)?;
        Ok((FileReference::Single(dir.to_path_buf()), Some(primary)))
    }

    /// Swap in a derivative as primary; the old primary joins the others.
    fn with_derivative(
        &self,
        files: ResolvedFileSet,
        dir: &Path,
    ) -> Result<ResolvedFileSet, ItemFailure> {
        let derivative = self.collab.derivative.generate(&files.primary_file, dir)?;
        let mut other_files = files.other_files;
        other_files.insert(files.primary_file);
        other_files.remove(&derivative);
        Ok(ResolvedFileSet {
            primary_file: derivative,
            other_files,
        })
    }

    /// Account for unprocessed items, report the tally, write the retry file.
    fn finalize(
        &mut self,
        mut source: Box<dyn WorkSource>,
        scratch: Option<TempDir>,
        base_dir: &Path,
    ) -> Result<RunSummary, BatchError> {
        let shape: SourceShape = source.shape();

        if self.state == RunState::Interrupted {
            let before = self.run.failed_items.len();
            for next in source.by_ref() {
                match next {
                    Ok(raw) => {
                        self.run.total_count += 1;
                        self.run.failed_items.push(raw);
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "could not read remaining items");
                        break;
                    }
                }
            }
            let skipped = self.run.failed_items.len() - before;
            if skipped > 0 {
                self.report(ReportEvent::Status {
                    context: "finalize".into(),
                    message: format!("{} unprocessed items added to the retry list", skipped),
                });
            }
        }
        drop(source);

        if let Some(dir) = scratch {
            if self.options.keep_scratch {
                let kept = dir.keep();
                self.report(ReportEvent::Status {
                    context: "finalize".into(),
                    message: format!("Keeping downloaded files in {}", kept.display()),
                });
            } else {
                self.report(ReportEvent::Status {
                    context: "finalize".into(),
                    message: "Removing downloaded files from directory tree".into(),
                });
            }
        }

        debug_assert_eq!(
            self.run.succeeded_count + self.run.failed_items.len(),
            self.run.total_count
        );
        self.report(ReportEvent::Summary {
            succeeded: self.run.succeeded_count,
            total: self.run.total_count,
        });

        let run = std::mem::take(&mut self.run);
        let retry = retry::write(
            &run.failed_items,
            &shape,
            self.options.retry_dir.as_deref().unwrap_or(base_dir),
            &self.options.invocation,
            &self.options.source_arg,
        )?;
        if let Some(artifact) = &retry {
            self.report(ReportEvent::Resume {
                retry_file: artifact.path.display().to_string(),
                command: artifact.command.clone(),
            });
        }

        Ok(RunSummary {
            total: run.total_count,
            succeeded: run.succeeded_count,
            failed: run.failed_items.len(),
            interrupted: run.interrupted,
            retry,
        })
    }

    fn report(&self, event: ReportEvent) {
        match &event {
            ReportEvent::Failure {
                context,
                identity,
                error,
                ..
            } => tracing::warn!(context = %context, identity = %identity, error = %error, "item failed"),
            ReportEvent::Critical { context, message } => {
                tracing::error!(context = %context, "{}", message)
            }
            ReportEvent::Warning { context, message } => {
                tracing::warn!(context = %context, "{}", message)
            }
            other => tracing::debug!(event = ?other, "report"),
        }
        self.collab.reporter.report(event);
    }
}

/// `files` (path or list of paths) and optional `first_file` of an item.
fn local_reference(raw: &RawItem, reference: &FieldValue) -> (FileReference, Option<PathBuf>) {
    let file_ref = match reference {
        FieldValue::Scalar(path) => FileReference::Single(PathBuf::from(path)),
        other => FileReference::Many(other.texts().into_iter().map(PathBuf::from).collect()),
    };
    let primary = raw
        .get("first_file")
        .and_then(FieldValue::first_text)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from);
    (file_ref, primary)
}

/// Download directory for one item: named after its identifier when it has
/// a usable one not already taken, otherwise anonymous.
fn item_scratch_dir(root: &Path, raw: &RawItem) -> Result<PathBuf, ItemFailure> {
    if let Some(name) = first_non_empty(raw, &["identifier", "identifier1"]).and_then(|id| dir_name(&id)) {
        let dir = root.join(name);
        if !dir.exists() {
            std::fs::create_dir_all(&dir).map_err(ItemFailure::Scratch)?;
            return Ok(dir);
        }
    }
    tempfile::Builder::new()
        .prefix("item-")
        .tempdir_in(root)
        .map(TempDir::keep)
        .map_err(ItemFailure::Scratch)
}

/// Identifier reduced to a single safe path component.
fn dir_name(identifier: &str) -> Option<String> {
    let name: String = identifier
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || "-_.".contains(c) { c } else { '_' })
        .collect();
    let name = name.trim_matches('.');
    (!name.is_empty()).then(|| name.to_string())
}

/// Pipeline stage a failure came from, used as the report context.
fn stage_of(failure: &ItemFailure) -> &'static str {
    match failure {
        ItemFailure::Normalize(_) => "normalize",
        ItemFailure::Resolve(_) => "resolve",
        ItemFailure::Fetch(_) => "download",
        ItemFailure::Derivative(_) => "derivative",
        ItemFailure::Deposit(_) => "deposit",
        ItemFailure::Scratch(_) => "ingest",
    }
}
