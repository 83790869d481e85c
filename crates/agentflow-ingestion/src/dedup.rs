//! Deduplication of uploaded record sets.
//!
//! Stage 1: normalised DOI exact match (primary, short-circuits title checks)
//! Stage 2: normalised title exact match (titles longer than 10 chars only)
//! Stage 3: fuzzy title match, token Jaccard >= 0.85 against accepted titles
//!
//! Records are ranked WoS, Scopus, Other before the walk so that the copy
//! kept for a work reported by several databases is the highest-priority one.

use std::collections::HashSet;
use std::fmt;

use serde::{Serialize, Serializer};

use crate::models::Record;
use crate::normalise::{normalize_doi, normalize_title, title_similarity};

/// Similarity at or above which two titles are the same work.
pub const FUZZY_TITLE_THRESHOLD: f64 = 0.85;

/// Normalised titles must be longer than this to take part in title matching.
pub const MIN_TITLE_LEN: usize = 10;

const DETAIL_TITLE_CHARS: usize = 80;

/// Why a record was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupReason {
    DuplicateDoi(String),
    DuplicateTitle,
    FuzzyTitle,
}

impl fmt::Display for DedupReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DedupReason::DuplicateDoi(doi) => write!(f, "Duplicate DOI: {doi}"),
            DedupReason::DuplicateTitle    => f.write_str("Duplicate title"),
            DedupReason::FuzzyTitle        => f.write_str("Fuzzy title match"),
        }
    }
}

impl Serialize for DedupReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateDetail {
    /// Original title, cut to 80 characters.
    pub title: String,
    pub reason: DedupReason,
}

/// Report stored on the job before classification starts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DedupSummary {
    pub kept: usize,
    pub removed: usize,
    pub details: Vec<DuplicateDetail>,
}

#[derive(Debug, Clone)]
pub struct DedupOutcome {
    /// Surviving records in priority-sorted order.
    pub clean: Vec<Record>,
    pub removed: usize,
    pub details: Vec<DuplicateDetail>,
}

impl DedupOutcome {
    pub fn summary(&self) -> DedupSummary {
        DedupSummary {
            kept: self.clean.len(),
            removed: self.removed,
            details: self.details.clone(),
        }
    }
}

/// Remove exact and fuzzy duplicates from `records`.
pub fn deduplicate(mut records: Vec<Record>) -> DedupOutcome {
    // Vec::sort_by_key is stable: ties keep upload order.
    records.sort_by_key(|r| r.ranking_source().priority());

    let mut seen_dois: HashSet<String> = HashSet::new();
    let mut seen_titles: HashSet<String> = HashSet::new();
    let mut accepted_titles: Vec<String> = Vec::new();

    let mut clean = Vec::with_capacity(records.len());
    let mut details = Vec::new();

    for record in records {
        let doi = normalize_doi(&record.doi());
        let title = normalize_title(&record.title());

        match check_duplicate(doi.as_deref(), &title, &seen_dois, &seen_titles, &accepted_titles) {
            Some(reason) => {
                tracing::debug!(reason = %reason, "duplicate record removed");
                details.push(DuplicateDetail {
                    title: record.title().chars().take(DETAIL_TITLE_CHARS).collect(),
                    reason,
                });
            }
            None => {
                if let Some(doi) = doi {
                    seen_dois.insert(doi);
                }
                if title.len() > MIN_TITLE_LEN {
                    seen_titles.insert(title.clone());
                }
                if !title.is_empty() {
                    accepted_titles.push(title);
                }
                clean.push(record);
            }
        }
    }

    DedupOutcome { clean, removed: details.len(), details }
}

fn check_duplicate(
    doi: Option<&str>,
    title: &str,
    seen_dois: &HashSet<String>,
    seen_titles: &HashSet<String>,
    accepted_titles: &[String],
) -> Option<DedupReason> {
    if let Some(doi) = doi {
        if seen_dois.contains(doi) {
            return Some(DedupReason::DuplicateDoi(doi.to_string()));
        }
    }

    if title.len() <= MIN_TITLE_LEN {
        return None;
    }
    if seen_titles.contains(title) {
        return Some(DedupReason::DuplicateTitle);
    }
    accepted_titles
        .iter()
        .any(|existing| title_similarity(title, existing) >= FUZZY_TITLE_THRESHOLD)
        .then_some(DedupReason::FuzzyTitle)
}
