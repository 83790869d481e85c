//! Canonical forms used for duplicate comparison.
//!
//! - `normalize_doi`: strips resolver prefixes and spreadsheet hyperlink wrappers
//! - `normalize_title` / `title_similarity`: token-level title matching

pub mod doi;
pub mod title;

pub use doi::normalize_doi;
pub use title::{normalize_title, title_similarity};
