//! # Batch Loader
//!
//! Bulk ingest of digital-library works into a repository.
//!
//! A batch file (CSV with numbered repeating columns, or a JSON array)
//! describes one work per item. Each item is normalized into a metadata
//! manifest, its files are located (or downloaded), and the work is handed
//! to an external deposit command. Items that fail are written to a retry
//! file in the input's own format so the run can be resumed.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────────────────────┐   ┌──────────────┐
//! │ Work source  │──▶│ Pipeline                    │──▶│ Deposit cmd  │
//! │ CSV / JSON   │   │ normalize → resolve → (tiff)│   │ (external)   │
//! └──────────────┘   └──────────────┬──────────────┘   └──────────────┘
//!                                   │ failed items
//!                                   ▼
//!                          ┌─────────────────┐
//!                          │ retry_ingest.*  │
//!                          └─────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`schema`] | Singular/repeating field analysis and required fields |
//! | [`normalize`] | Raw item → metadata record |
//! | [`source`] | Work source abstraction |
//! | [`source_tabular`] | CSV work source |
//! | [`source_structured`] | JSON work source |
//! | [`files`] | File reference resolution |
//! | [`fetch`] | URL downloads |
//! | [`derivative`] | TIFF derivatives |
//! | [`deposit`] | External deposit command |
//! | [`ingest`] | Pipeline orchestration |
//! | [`retry`] | Retry artifact and resume command |
//! | [`report`] | Operator-facing run reporting |
//! | [`check`] | Dry inspection of a batch file |
//! | [`logging`] | Tracing subscriber setup |
//! | [`error`] | Error types |

pub mod check;
pub mod config;
pub mod deposit;
pub mod derivative;
pub mod error;
pub mod fetch;
pub mod files;
pub mod ingest;
pub mod logging;
pub mod models;
pub mod normalize;
pub mod report;
pub mod retry;
pub mod schema;
pub mod source;
pub mod source_structured;
pub mod source_tabular;
