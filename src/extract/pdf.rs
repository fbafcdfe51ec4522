use std::sync::OnceLock;

use lopdf::Document;
use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PdfError {
    #[error("failed to open PDF: {0}")]
    Open(String),
    #[error("failed to extract text: {0}")]
    Extract(String),
}

/// Line-anchored figure caption: "Fig. 3: ..." / "Figure 12. ...".
fn figure_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?im)^Fig(?:ure|\.)\s*\d+[.:]\s*.+$").unwrap())
}

/// Extract cleaned text from raw PDF bytes.
pub fn extract_from_bytes(bytes: &[u8]) -> Result<String, PdfError> {
    let doc = Document::load_mem(bytes).map_err(|e| PdfError::Open(e.to_string()))?;
    extract_pages(&doc)
}

fn extract_pages(doc: &Document) -> Result<String, PdfError> {
    let mut parts: Vec<String> = Vec::new();
    for (&page_num, _) in doc.get_pages().iter() {
        match doc.extract_text(&[page_num]) {
            Ok(text) => {
                if !text.trim().is_empty() {
                    parts.push(text);
                }
            }
            Err(e) => {
                // One bad page should not sink the document.
                tracing::warn!("Failed to extract text from page {}: {}", page_num, e);
            }
        }
    }
    if parts.is_empty() {
        return Err(PdfError::Extract("no extractable text".into()));
    }
    Ok(clean_text(&parts.join("\n\n")))
}

/// Figure captions recovered from already-extracted text.
pub fn extract_figures(text: &str) -> Vec<String> {
    figure_pattern()
        .find_iter(text)
        .map(|m| m.as_str().trim().to_string())
        .filter(|caption| caption.len() > 10)
        .collect()
}

/// Clean up common PDF extraction artifacts: collapse horizontal whitespace,
/// limit blank runs, rejoin hyphenated line-break splits, and rejoin
/// soft-wrapped lines into paragraph flow.
pub fn clean_text(text: &str) -> String {
    static SPACES: OnceLock<Regex> = OnceLock::new();
    static NEWLINES: OnceLock<Regex> = OnceLock::new();
    static HYPHEN: OnceLock<Regex> = OnceLock::new();
    let spaces = SPACES.get_or_init(|| Regex::new(r"[ \t]+").unwrap());
    let newlines = NEWLINES.get_or_init(|| Regex::new(r"\n{3,}").unwrap());
    let hyphen = HYPHEN.get_or_init(|| Regex::new(r"(\w)-\n(\w)").unwrap());

    let text = spaces.replace_all(text, " ");
    let text = newlines.replace_all(&text, "\n\n");
    let text = hyphen.replace_all(&text, "$1$2");

    // A line that does not end a sentence, has a non-blank successor, and is
    // long enough to be mid-paragraph gets joined with a space instead of a
    // newline. Reconstructs paragraph flow from single-column extraction.
    let lines: Vec<&str> = text.split('\n').collect();
    let mut result = String::new();
    for (i, line) in lines.iter().enumerate() {
        let stripped = line.trim();
        if stripped.is_empty() {
            result.push('\n');
            continue;
        }
        let next_nonblank = lines.get(i + 1).is_some_and(|next| !next.trim().is_empty());
        let ends_sentence = stripped.ends_with(['.', ':', '?', '!']);
        if next_nonblank && !ends_sentence && stripped.len() > 40 {
            result.push_str(stripped);
            result.push(' ');
        } else {
            result.push_str(stripped);
            result.push('\n');
        }
    }
    result.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hyphenated_line_break_rejoined() {
        assert_eq!(clean_text("co-\noperative"), "cooperative");
    }

    #[test]
    fn test_excess_newlines_collapse_to_two() {
        let cleaned = clean_text("First paragraph.\n\n\n\n\nSecond paragraph.");
        assert_eq!(cleaned, "First paragraph.\n\nSecond paragraph.");
    }

    #[test]
    fn test_horizontal_whitespace_collapsed() {
        assert_eq!(clean_text("a  \t  b."), "a b.");
    }

    #[test]
    fn test_soft_wrapped_line_joined_with_space() {
        let input = "This line is certainly longer than forty characters total\nand continues here.";
        assert_eq!(
            clean_text(input),
            "This line is certainly longer than forty characters total and continues here."
        );
    }

    #[test]
    fn test_sentence_end_preserves_newline() {
        let input = "This line is certainly longer than forty characters, ending.\nNext line starts fresh.";
        let cleaned = clean_text(input);
        assert!(cleaned.contains("ending.\nNext line"));
    }

    #[test]
    fn test_short_line_preserves_newline() {
        let input = "Short heading\nFollowing text continues here.";
        assert!(clean_text(input).contains("Short heading\n"));
    }

    #[test]
    fn test_extract_figures() {
        let text = "Intro text.\nFig. 1: Phase diagram of the transverse-field model.\nFigure 2. Temperature dependence of resistivity.\nFig 3 no separator so not matched\nfig. 4\n";
        let figures = extract_figures(text);
        assert_eq!(figures.len(), 2);
        assert!(figures[0].starts_with("Fig. 1:"));
        assert!(figures[1].starts_with("Figure 2."));
    }

    #[test]
    fn test_extract_from_invalid_bytes() {
        assert!(matches!(
            extract_from_bytes(b"not a pdf"),
            Err(PdfError::Open(_))
        ));
    }
}
