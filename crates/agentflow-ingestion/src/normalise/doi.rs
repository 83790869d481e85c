//! DOI canonicalisation.

use regex::Regex;

fn hyperlink_regex() -> &'static Regex {
    use std::sync::OnceLock;
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Spreadsheet exports wrap links as =HYPERLINK("https://doi.org/10.x/y","label")
        Regex::new(r#"(?i)HYPERLINK\(\s*"https?://(?:dx\.)?doi\.org/([^"]+)""#).unwrap()
    })
}

fn resolver_prefix_regex() -> &'static Regex {
    use std::sync::OnceLock;
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)https?://(?:dx\.)?doi\.org/").unwrap())
}

/// Canonical lower-case DOI, or `None` when nothing usable remains.
pub fn normalize_doi(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let doi = match hyperlink_regex().captures(trimmed).and_then(|c| c.get(1)) {
        Some(m) => m.as_str().to_string(),
        None => resolver_prefix_regex().replace(trimmed, "").into_owned(),
    };

    let doi = doi.trim().to_lowercase();
    if doi.is_empty() { None } else { Some(doi) }
}
