use scraper::{Html, Selector};

use super::{first_text, meta_authors, select_first, text_of, Extracted, PublisherAdapter};

/// ACS Publications article pages.
pub struct AcsAdapter;

impl PublisherAdapter for AcsAdapter {
    fn name(&self) -> &'static str {
        "acs"
    }

    fn can_handle(&self, url: &str) -> bool {
        url.to_lowercase().contains("pubs.acs.org")
    }

    fn extract(&self, html: &str, _url: &str) -> Extracted {
        let doc = Html::parse_document(html);
        Extracted {
            title: extract_title(&doc),
            authors: extract_authors(&doc),
            abstract_text: first_text(
                &doc,
                &[
                    "div.article_abstract-content",
                    "#abstractBox",
                    "p.articleBody_abstractText",
                ],
            )
            .unwrap_or_default(),
            full_text: extract_body(&doc),
            figures: extract_figures(&doc),
            references: super::list_references(&doc, &["#references", ".article_references"]),
        }
    }
}

fn extract_title(doc: &Html) -> String {
    if let Some(title) = first_text(doc, &["h1.article_header-title", ".article-title"]) {
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
    if let Ok(sel) = Selector::parse(".loa li .hlFld-ContribAuthor") {
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

    if let Some(content) = select_first(doc, &["div.article_content"]) {
        if let Ok(section_sel) = Selector::parse(".NLM_sec") {
            let heading_sel = Selector::parse("h2, h3, h4").ok();
            for section in content.select(&section_sel) {
                let heading = heading_sel
                    .as_ref()
                    .and_then(|sel| section.select(sel).next())
                    .map(text_of)
                    .unwrap_or_default();
                if matches!(
                    heading.to_lowercase().as_str(),
                    "abstract" | "references" | "supporting information"
                ) {
                    continue;
                }
                let text = text_of(section);
                if text.is_empty() {
                    continue;
                }
                if heading.is_empty() {
                    parts.push(text);
                } else {
                    parts.push(format!("## {}\n\n{}", heading, text));
                }
            }
        }
        if parts.is_empty() {
            let text = text_of(content);
            if !text.is_empty() {
                parts.push(text);
            }
        }
    }

    if parts.is_empty() {
        if let Some(el) = select_first(doc, &["article", "#article-body"]) {
            let text = text_of(el);
            if !text.is_empty() {
                parts.push(text);
            }
        }
    }

    parts.join("\n\n")
}

fn extract_figures(doc: &Html) -> Vec<String> {
    let mut captions = super::figure_captions(doc);
    if captions.is_empty() {
        if let Ok(sel) = Selector::parse(".article_figure .article_figure-caption") {
            for el in doc.select(&sel) {
                let text = text_of(el);
                if text.len() > 10 {
                    captions.push(text);
                }
            }
        }
    }
    captions
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
<html><body>
  <h1 class="article_header-title">Electrocatalytic CO2 reduction</h1>
  <div class="article_abstract-content">CO2 is reduced.</div>
  <div class="article_content">
    <div class="NLM_sec"><h2>Experimental</h2><p>Electrodes were prepared.</p></div>
    <div class="NLM_sec"><h2>Supporting Information</h2><p>See SI.</p></div>
  </div>
</body></html>"#;

    #[test]
    fn test_handles_acs_domain() {
        assert!(AcsAdapter.can_handle("https://pubs.acs.org/doi/10.1021/jacs.1c01234"));
        assert!(!AcsAdapter.can_handle("https://onlinelibrary.wiley.com/x"));
    }

    #[test]
    fn test_extract_fields() {
        let result = AcsAdapter.extract(SAMPLE, "https://pubs.acs.org/doi/x");
        assert_eq!(result.title, "Electrocatalytic CO2 reduction");
        assert_eq!(result.abstract_text, "CO2 is reduced.");
        assert!(result.full_text.contains("## Experimental"));
        assert!(result.full_text.contains("Electrodes were prepared."));
        assert!(!result.full_text.contains("See SI."));
    }
}
