//! agentflow-ingestion — Bibliographic record intake for the SLR pipeline.
//!
//! Covers everything that happens before classification: turning exported
//! spreadsheets into [`Record`]s, tagging their source database,
//! canonicalising DOIs and titles, and removing exact and fuzzy duplicates.

pub mod dedup;
pub mod models;
pub mod normalise;
pub mod upload;

pub use dedup::{deduplicate, DedupOutcome, DedupReason, DedupSummary, DuplicateDetail};
pub use models::{FieldValue, Record, SourceDb};
pub use upload::{parse_upload, ParsedFile, UploadError};
