use scraper::{Html, Selector};

use super::{figure_captions, first_text, meta_authors, select_first, text_of, Extracted, PublisherAdapter};

/// Elsevier/ScienceDirect article pages.
pub struct ElsevierAdapter;

impl PublisherAdapter for ElsevierAdapter {
    fn name(&self) -> &'static str {
        "elsevier"
    }

    fn can_handle(&self, url: &str) -> bool {
        let url = url.to_lowercase();
        url.contains("sciencedirect.com") || url.contains("elsevier.com")
    }

    fn extract(&self, html: &str, _url: &str) -> Extracted {
        let doc = Html::parse_document(html);
        Extracted {
            title: extract_title(&doc),
            authors: extract_authors(&doc),
            abstract_text: first_text(
                &doc,
                &["div.abstract", "#abstracts", "div.Abstracts", "section#abstract"],
            )
            .unwrap_or_default(),
            full_text: extract_body(&doc),
            figures: figure_captions(&doc),
            references: super::list_references(&doc, &["#bibliography", "section.bibliography"]),
        }
    }
}

fn extract_title(doc: &Html) -> String {
    if let Some(title) = first_text(doc, &["span.title-text", "h1.article-header__title"]) {
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
    if let Ok(sel) = Selector::parse(".author-group .author span.content") {
        for el in doc.select(&sel) {
            let name = text_of(el);
            if !name.is_empty() {
                out.push(name);
            }
        }
    }
    out
}

fn extract_body(doc: &Html) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Some(body) = select_first(doc, &["div#body", "div.Body"]) {
        if let Ok(section_sel) = Selector::parse("section") {
            let heading_sel = Selector::parse("h2, h3, h4").ok();
            for section in body.select(&section_sel) {
                let heading = heading_sel
                    .as_ref()
                    .and_then(|sel| section.select(sel).next())
                    .map(text_of)
                    .unwrap_or_default();
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
            let text = text_of(body);
            if !text.is_empty() {
                parts.push(text);
            }
        }
    }

    if parts.is_empty() {
        if let Some(el) = select_first(doc, &["article", "#main-content"]) {
            let text = text_of(el);
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
  <span class="title-text">Lithium intercalation dynamics</span>
  <div class="abstract">Batteries are studied.</div>
  <div id="body">
    <section><h2>Methods</h2><p>We cycled cells.</p></section>
    <section><h2>Results</h2><p>Capacity faded.</p></section>
  </div>
  <div id="bibliography"><ul>
    <li>Whittingham, M. Electrical energy storage. Science (1976).</li>
  </ul></div>
</body></html>"#;

    #[test]
    fn test_handles_sciencedirect() {
        assert!(ElsevierAdapter.can_handle("https://www.sciencedirect.com/science/article/pii/S0"));
        assert!(!ElsevierAdapter.can_handle("https://www.nature.com/articles/x"));
    }

    #[test]
    fn test_extract_fields() {
        let result = ElsevierAdapter.extract(SAMPLE, "https://www.sciencedirect.com/x");
        assert_eq!(result.title, "Lithium intercalation dynamics");
        assert_eq!(result.abstract_text, "Batteries are studied.");
        assert!(result.full_text.contains("## Methods"));
        assert!(result.full_text.contains("Capacity faded."));
        assert_eq!(result.references.len(), 1);
    }

    #[test]
    fn test_title_from_meta_fallback() {
        let html = r#"<head><meta name="citation_title" content="Meta title"></head><body></body>"#;
        let result = ElsevierAdapter.extract(html, "");
        assert_eq!(result.title, "Meta title");
    }
}
