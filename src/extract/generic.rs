use scraper::{Html, Selector};

use super::{
    figure_captions, meta_authors, select_first, text_of, text_of_content, Extracted,
    PublisherAdapter,
};

/// A structural body-selector match must clear this many characters before it
/// beats the largest-block fallback; anything shorter is probably a teaser or
/// a cookie banner.
const MIN_BODY_LEN: usize = 500;

/// Best-effort fallback for publishers without a dedicated adapter.
pub struct GenericAdapter;

impl PublisherAdapter for GenericAdapter {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn can_handle(&self, _url: &str) -> bool {
        true
    }

    fn extract(&self, html: &str, _url: &str) -> Extracted {
        let doc = Html::parse_document(html);
        Extracted {
            title: extract_title(&doc),
            authors: extract_authors(&doc),
            abstract_text: extract_abstract(&doc),
            full_text: extract_body(&doc),
            figures: extract_figures(&doc),
            references: extract_references(&doc),
        }
    }
}

fn extract_title(doc: &Html) -> String {
    for sel in [
        "h1.article-title",
        "h1.c-article-title",
        "h1#title",
        ".article-header h1",
        "article h1",
        "h1",
    ] {
        if let Some(el) = select_first(doc, &[sel]) {
            let text = text_of(el);
            if !text.is_empty() {
                return text;
            }
        }
    }
    select_first(doc, &["title"]).map(text_of).unwrap_or_default()
}

fn extract_abstract(doc: &Html) -> String {
    if let Some(text) = super::first_text(
        doc,
        &[
            "#abstract",
            ".abstract",
            "[data-title='Abstract']",
            "section.abstract",
            "div.abstractSection",
        ],
    ) {
        return text;
    }
    select_first(doc, &["meta[name='description']"])
        .and_then(|el| el.value().attr("content"))
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

fn extract_body(doc: &Html) -> String {
    // Structural selectors first, with a sanity check: a real article body
    // is substantial.
    for sel in [
        "article",
        "[role='main']",
        "main",
        ".article-body",
        ".article-content",
        "#body",
        ".body",
    ] {
        if let Some(el) = select_first(doc, &[sel]) {
            let text = text_of_content(el);
            if text.len() > MIN_BODY_LEN {
                return text;
            }
        }
    }

    // Fallback: the largest text block under container-like elements.
    let mut best = String::new();
    if let Ok(sel) = Selector::parse("div, section") {
        for el in doc.select(&sel) {
            let text = text_of_content(el);
            if text.len() > best.len() {
                best = text;
            }
        }
    }
    best
}

fn extract_figures(doc: &Html) -> Vec<String> {
    let captions = figure_captions(doc);
    if !captions.is_empty() {
        return captions;
    }
    let mut out = Vec::new();
    for sel in [".figure-caption", ".caption", ".fig-caption"] {
        let Ok(selector) = Selector::parse(sel) else {
            continue;
        };
        for el in doc.select(&selector) {
            let text = text_of(el);
            if text.len() > 10 {
                out.push(text);
            }
        }
        if !out.is_empty() {
            break;
        }
    }
    out
}

fn extract_references(doc: &Html) -> Vec<String> {
    super::list_references(
        doc,
        &[
            "#references",
            ".references",
            "#bibliography",
            "[data-title='References']",
            "section.ref-list",
        ],
    )
}

fn extract_authors(doc: &Html) -> Vec<String> {
    let authors = meta_authors(doc);
    if !authors.is_empty() {
        return authors;
    }
    let mut out = Vec::new();
    for sel in [".author-name", ".authors a", ".contrib-author"] {
        let Ok(selector) = Selector::parse(sel) else {
            continue;
        };
        for el in doc.select(&selector) {
            let name = text_of(el);
            if !name.is_empty() {
                out.push(name);
            }
        }
        if !out.is_empty() {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_fallback_chain() {
        let result = GenericAdapter.extract(
            "<html><head><title>Tab title</title></head><body><p>x</p></body></html>",
            "",
        );
        assert_eq!(result.title, "Tab title");

        let result = GenericAdapter.extract(
            "<html><body><article><h1>Article h1</h1></article></body></html>",
            "",
        );
        assert_eq!(result.title, "Article h1");
    }

    #[test]
    fn test_short_structural_body_loses_to_largest_block() {
        // <article> matches structurally but is under the length threshold;
        // the large div must win.
        let long_block = "Long paragraph text. ".repeat(40);
        let html = format!(
            "<html><body><article>Teaser only.</article><div class=\"content\">{}</div></body></html>",
            long_block
        );
        let result = GenericAdapter.extract(&html, "");
        assert!(result.full_text.contains("Long paragraph text."));
        assert!(result.full_text.len() > MIN_BODY_LEN);
    }

    #[test]
    fn test_substantial_article_body_wins() {
        let body = "Substantive article prose here. ".repeat(30);
        let html = format!("<html><body><article>{}</article></body></html>", body);
        let result = GenericAdapter.extract(&html, "");
        assert!(result.full_text.starts_with("Substantive article prose"));
    }

    #[test]
    fn test_abstract_from_meta_description() {
        let html = r#"<head><meta name="description" content="Meta abstract."></head><body></body>"#;
        let result = GenericAdapter.extract(html, "");
        assert_eq!(result.abstract_text, "Meta abstract.");
    }
}
