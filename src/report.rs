//! Operator-facing run reporting.
//!
//! Reports per-item outcomes and the final tally as they happen. Reports go
//! to **stdout** (diagnostics go to stderr through `tracing`), either as
//! human-readable lines or as one JSON object per line for scripts.
//!
//! A single [`Reporter`] is built at start-up and handed to the pipeline;
//! nothing reaches it through global state.

use std::io::Write;

/// A single reporting event.
///
/// `context` names the pipeline stage that produced the event.
#[derive(Clone, Debug, PartialEq)]
pub enum ReportEvent {
    Status { context: String, message: String },
    Success { context: String, identity: String },
    Failure {
        context: String,
        identity: String,
        kind: String,
        error: String,
    },
    Warning { context: String, message: String },
    Critical { context: String, message: String },
    Summary { succeeded: usize, total: usize },
    Resume { retry_file: String, command: String },
}

/// Receives report events from the pipeline.
pub trait Reporter: Send + Sync {
    fn report(&self, event: ReportEvent);
}

/// Human-friendly lines on stdout: `SUCCESS: Ingested <id>`.
pub struct HumanReporter;

impl HumanReporter {
    fn line(event: &ReportEvent) -> String {
        match event {
            ReportEvent::Status { context, message } => {
                format!("Status: in {} - {}", context, message)
            }
            ReportEvent::Success { identity, .. } => format!("SUCCESS: Ingested {}", identity),
            ReportEvent::Failure {
                identity,
                kind,
                error,
                ..
            } => format!("FAILURE: {} was not ingested - {}:{}", identity, kind, error),
            ReportEvent::Warning { message, .. } => format!("Warning: {}", message),
            ReportEvent::Critical { context, message } => {
                format!("-- CRITICAL FAILURE in {} --: {}", context, message)
            }
            ReportEvent::Summary { succeeded, total } => {
                format!("Succeeded on {} out of {} total", succeeded, total)
            }
            ReportEvent::Resume {
                retry_file,
                command,
            } => format!(
                "Items not ingested were written to {}\nTo resume, run:\n  {}",
                retry_file, command
            ),
        }
    }
}

impl Reporter for HumanReporter {
    fn report(&self, event: ReportEvent) {
        let line = Self::line(&event);
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "{}", line);
        let _ = out.flush();
    }
}

/// Machine-readable reports: one JSON object per line on stdout.
pub struct JsonReporter;

impl JsonReporter {
    fn object(event: &ReportEvent) -> serde_json::Value {
        let ts = chrono::Utc::now().to_rfc3339();
        match event {
            ReportEvent::Status { context, message } => serde_json::json!({
                "event": "status", "ts": ts, "context": context, "message": message
            }),
            ReportEvent::Success { context, identity } => serde_json::json!({
                "event": "success", "ts": ts, "context": context, "identity": identity
            }),
            ReportEvent::Failure {
                context,
                identity,
                kind,
                error,
            } => serde_json::json!({
                "event": "failure", "ts": ts, "context": context,
                "identity": identity, "kind": kind, "error": error
            }),
            ReportEvent::Warning { context, message } => serde_json::json!({
                "event": "warning", "ts": ts, "context": context, "message": message
            }),
            ReportEvent::Critical { context, message } => serde_json::json!({
                "event": "critical", "ts": ts, "context": context, "message": message
            }),
            ReportEvent::Summary { succeeded, total } => serde_json::json!({
                "event": "summary", "ts": ts, "succeeded": succeeded,
                "failed": total - succeeded, "total": total
            }),
            ReportEvent::Resume {
                retry_file,
                command,
            } => serde_json::json!({
                "event": "resume", "ts": ts, "retry_file": retry_file, "command": command
            }),
        }
    }
}

impl Reporter for JsonReporter {
    fn report(&self, event: ReportEvent) {
        if let Ok(line) = serde_json::to_string(&Self::object(&event)) {
            let mut out = std::io::stdout().lock();
            let _ = writeln!(out, "{}", line);
            let _ = out.flush();
        }
    }
}

/// No-op reporter when reporting is disabled.
pub struct NoReporter;

impl Reporter for NoReporter {
    fn report(&self, _event: ReportEvent) {}
}

/// Report mode for the CLI: off, human, or JSON.
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ReportMode {
    Off,
    Human,
    Json,
}

impl ReportMode {
    /// Default: human lines when stdout is a TTY, otherwise JSON.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stdout) {
            ReportMode::Human
        } else {
            ReportMode::Json
        }
    }

    pub fn reporter(&self) -> Box<dyn Reporter> {
        match self {
            ReportMode::Off => Box::new(NoReporter),
            ReportMode::Human => Box::new(HumanReporter),
            ReportMode::Json => Box::new(JsonReporter),
        }
    }
}
