use regex::Regex;
use std::sync::OnceLock;

/// What kind of bibliographic identifier a raw input string is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    Doi,
    Pmid,
    Pmcid,
    Url,
    Unknown,
}

fn doi_strict() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^10\.\d{4,9}/\S+$").unwrap())
}

fn doi_embedded() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"10\.\d{4,9}/[^\s&?#]+").unwrap())
}

fn pmid_shape() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{7,8}$").unwrap())
}

fn pmcid_shape() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^PMC\d+$").unwrap())
}

/// True when the raw input is a bare 7-8 digit PMID. Such inputs must bypass
/// the result cache: the same PMID can map to a different DOI when the
/// provider's data is updated.
pub fn is_pmid_shape(raw: &str) -> bool {
    pmid_shape().is_match(raw.trim())
}

/// Classify a raw identifier and return its canonical value.
///
/// Rules in priority order: strict DOI shape, DOI-resolver URL, embedded DOI
/// substring, bare PMID, PMCID, URL scheme, unknown.
pub fn classify(raw: &str) -> (IdKind, String) {
    let input = raw.trim();

    if doi_strict().is_match(input) {
        return (IdKind::Doi, input.to_string());
    }

    let lower = input.to_lowercase();
    for prefix in [
        "https://doi.org/",
        "http://doi.org/",
        "https://dx.doi.org/",
        "http://dx.doi.org/",
        "doi.org/",
        "dx.doi.org/",
    ] {
        if lower.starts_with(prefix) {
            return (IdKind::Doi, input[prefix.len()..].to_string());
        }
    }

    if let Some(m) = doi_embedded().find(input) {
        return (IdKind::Doi, m.as_str().to_string());
    }

    if pmid_shape().is_match(input) {
        return (IdKind::Pmid, input.to_string());
    }

    if pmcid_shape().is_match(input) {
        return (IdKind::Pmcid, input.to_uppercase());
    }

    if input.starts_with("http://") || input.starts_with("https://") {
        return (IdKind::Url, input.to_string());
    }

    (IdKind::Unknown, input.to_string())
}
