//! Upload boundary: exported bibliographic files to tagged [`Record`]s.
//!
//! Accepts comma-separated and tab-delimited exports (Web of Science
//! "savedrecs.txt", Scopus CSV, or anything with a title column). Each file
//! yields an ordered list of flat records with aliased column names and a
//! `_source` tag; rows with a missing or very short title are discarded.

use thiserror::Error;
use tracing::{debug, info};

use crate::models::{Record, SourceDb};

/// Titles this short (after trimming) are treated as blank rows.
pub const MIN_UPLOAD_TITLE_CHARS: usize = 5;

/// Source column name -> canonical name. Applied in order; the original
/// column is kept alongside the alias.
pub const COLUMN_ALIASES: &[(&str, &str)] = &[
    ("Article Title", "Title"),
    ("title", "Title"),
    ("Document Title", "Title"),
    ("Author Full Names", "Authors"),
    ("authors", "Authors"),
    ("Source Title", "Journal"),
    ("source", "Journal"),
    ("Publication Year", "Year"),
    ("year", "Year"),
    ("doi", "DOI"),
    ("abstract", "Abstract"),
    ("Author Keywords", "Author_Keywords"),
    // Web of Science tab-delimited field tags
    ("TI", "Title"),
    ("AF", "Authors"),
    ("SO", "Journal"),
    ("PY", "Year"),
    ("DI", "DOI"),
    ("AB", "Abstract"),
    ("DE", "Author_Keywords"),
];

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Failed to parse {filename}: {source}")]
    Csv {
        filename: String,
        #[source]
        source: csv::Error,
    },

    #[error("Unsupported file format for {0}: export as CSV or tab-delimited text")]
    UnsupportedFormat(String),

    #[error("{0} is not valid UTF-8 text")]
    Encoding(String),

    #[error("{0} is empty")]
    Empty(String),
}

/// One parsed upload file.
#[derive(Debug, Clone)]
pub struct ParsedFile {
    pub filename: String,
    pub source: SourceDb,
    pub records: Vec<Record>,
    /// Rows dropped by the short-title filter.
    pub discarded: usize,
}

/// Parse one uploaded file.
pub fn parse_upload(filename: &str, bytes: &[u8]) -> Result<ParsedFile, UploadError> {
    let lower = filename.to_ascii_lowercase();
    if [".xlsx", ".xls", ".ods"].iter().any(|ext| lower.ends_with(ext)) {
        return Err(UploadError::UnsupportedFormat(filename.to_string()));
    }

    let text = std::str::from_utf8(bytes)
        .map_err(|_| UploadError::Encoding(filename.to_string()))?;
    let text = text.trim_start_matches('\u{feff}');
    if text.trim().is_empty() {
        return Err(UploadError::Empty(filename.to_string()));
    }

    let delimiter = sniff_delimiter(&lower, text);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(text.as_bytes());

    let csv_err = |source: csv::Error| UploadError::Csv { filename: filename.to_string(), source };

    let headers: Vec<String> = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let source = detect_source(filename, &headers);
    debug!(filename, source = %source, columns = headers.len(), "detected export source");

    let mut records = Vec::new();
    let mut discarded = 0usize;
    for row in reader.records() {
        let row = row.map_err(csv_err)?;
        let mut record = Record::new(source);
        for (header, cell) in headers.iter().zip(row.iter()) {
            if header.is_empty() || cell.trim().is_empty() {
                continue;
            }
            record.insert(header.clone(), cell);
        }
        apply_aliases(&mut record);

        let title_ok = record
            .get("Title")
            .map(|t| t.as_text().trim().chars().count() > MIN_UPLOAD_TITLE_CHARS)
            .unwrap_or(false);
        if title_ok {
            records.push(record);
        } else {
            discarded += 1;
        }
    }

    info!(filename, source = %source, rows = records.len(), discarded, "parsed upload");
    Ok(ParsedFile { filename: filename.to_string(), source, records, discarded })
}

/// Decide which database produced an export. The filename wins; column
/// names unique to each exporter are the fallback.
pub fn detect_source(filename: &str, columns: &[String]) -> SourceDb {
    let name = filename.to_ascii_lowercase();
    if name.contains("wos") || name.contains("savedrecs") {
        return SourceDb::WoS;
    }
    if name.contains("scopus") {
        return SourceDb::Scopus;
    }

    let cols: Vec<String> = columns.iter().map(|c| c.trim().to_ascii_lowercase()).collect();
    let has = |name: &str| cols.iter().any(|c| c == name);

    if has("ut (unique wos id)") || has("article title") {
        SourceDb::WoS
    } else if has("eid") || has("author(s) id") || has("source") {
        SourceDb::Scopus
    } else {
        SourceDb::Other
    }
}

pub fn apply_aliases(record: &mut Record) {
    for (from, to) in COLUMN_ALIASES {
        if let Some(value) = record.get(from).cloned() {
            record.insert(*to, value);
        }
    }
}

fn sniff_delimiter(lower_name: &str, text: &str) -> u8 {
    if lower_name.ends_with(".tsv") || lower_name.ends_with(".tab") {
        return b'\t';
    }
    let first_line = text.lines().next().unwrap_or_default();
    let tabs = first_line.matches('\t').count();
    let commas = first_line.matches(',').count();
    if tabs > commas { b'\t' } else { b',' }
}
