use scraper::{ElementRef, Html, Selector};

use super::{figure_captions, first_text, meta_authors, select_first, text_of, Extracted, PublisherAdapter};

/// Wiley Online Library article pages.
pub struct WileyAdapter;

impl PublisherAdapter for WileyAdapter {
    fn name(&self) -> &'static str {
        "wiley"
    }

    fn can_handle(&self, url: &str) -> bool {
        let url = url.to_lowercase();
        url.contains("wiley.com") || url.contains("onlinelibrary.wiley")
    }

    fn extract(&self, html: &str, _url: &str) -> Extracted {
        let doc = Html::parse_document(html);
        Extracted {
            title: extract_title(&doc),
            authors: extract_authors(&doc),
            abstract_text: first_text(
                &doc,
                &["section.article-section__abstract", "div.abstract-group", "#abstract"],
            )
            .unwrap_or_default(),
            full_text: extract_body(&doc),
            figures: figure_captions(&doc),
            references: super::list_references(&doc, &["section#references-section"]),
        }
    }
}

fn extract_title(doc: &Html) -> String {
    if let Some(title) = first_text(doc, &["h1.citation__title", ".article-header__title"]) {
        return title;
    }
    select_first(doc, &["meta[name='citation_title']"])
        .and_then(|el| el.value().attr("content"))
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

fn extract_authors(doc: &Html) -> Vec<String> {
    let authors = meta_authors(doc);
    if !authors.is_empty() {
        return authors;
    }
    let mut out = Vec::new();
    if let Ok(sel) = Selector::parse(".loa-authors .author-name span") {
        for el in doc.select(&sel) {
            let name = text_of(el);
            if !name.is_empty() {
                out.push(name);
            }
        }
    }
    out
}

/// Heading of a Wiley content section: the nearest preceding `<h2>` sibling.
fn section_heading(section: ElementRef<'_>) -> String {
    for sibling in section.prev_siblings() {
        if let Some(el) = ElementRef::wrap(sibling) {
            if el.value().name() == "h2" {
                return text_of(el);
            }
        }
    }
    String::new()
}

fn extract_body(doc: &Html) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Ok(sel) = Selector::parse("section.article-section__content") {
        for section in doc.select(&sel) {
            let heading = section_heading(section);
            if matches!(
                heading.to_lowercase().as_str(),
                "abstract" | "references" | "supporting information"
            ) {
                continue;
            }
            let content = text_of(section);
            if content.is_empty() {
                continue;
            }
            if heading.is_empty() {
                parts.push(content);
            } else {
                parts.push(format!("## {}\n\n{}", heading, content));
            }
        }
    }

    if parts.is_empty() {
        if let Some(body) = select_first(doc, &["article.article__body", ".article-body-section"]) {
            let text = text_of(body);
            if !text.is_empty() {
                parts.push(text);
            }
        }
    }

    parts.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
<html><body>
  <h1 class="citation__title">Catalytic asymmetric synthesis</h1>
  <section class="article-section__abstract">Catalysis is described.</section>
  <div>
    <h2>Introduction</h2>
    <section class="article-section__content">Chiral molecules matter.</section>
    <h2>References</h2>
    <section class="article-section__content">Ref list here.</section>
  </div>
</body></html>"#;

    #[test]
    fn test_handles_wiley_domains() {
        assert!(WileyAdapter.can_handle("https://onlinelibrary.wiley.com/doi/10.1002/x"));
        assert!(!WileyAdapter.can_handle("https://www.sciencedirect.com/x"));
    }

    #[test]
    fn test_extract_skips_reference_section() {
        let result = WileyAdapter.extract(SAMPLE, "https://onlinelibrary.wiley.com/doi/x");
        assert_eq!(result.title, "Catalytic asymmetric synthesis");
        assert_eq!(result.abstract_text, "Catalysis is described.");
        assert!(result.full_text.contains("## Introduction"));
        assert!(result.full_text.contains("Chiral molecules matter."));
        assert!(!result.full_text.contains("Ref list here."));
    }
}
