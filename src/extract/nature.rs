use scraper::{Html, Selector};

use super::{figure_captions, first_text, meta_authors, select_first, text_of, Extracted, PublisherAdapter};

/// Nature/Springer: structured layout with `c-article-*` classes and
/// `section[data-title]` article sections.
pub struct NatureAdapter;

impl PublisherAdapter for NatureAdapter {
    fn name(&self) -> &'static str {
        "nature"
    }

    fn can_handle(&self, url: &str) -> bool {
        let url = url.to_lowercase();
        ["nature.com", "springer.com", "springerlink.com"]
            .iter()
            .any(|domain| url.contains(domain))
    }

    fn extract(&self, html: &str, _url: &str) -> Extracted {
        let doc = Html::parse_document(html);
        Extracted {
            title: first_text(&doc, &["h1.c-article-title", "h1.article-item__title", "h1"])
                .unwrap_or_default(),
            authors: extract_authors(&doc),
            abstract_text: first_text(
                &doc,
                &[
                    "#Abs1-content",
                    "div.c-article-section__content[id*='Abs']",
                    "#abstract",
                    "section[data-title='Abstract']",
                ],
            )
            .unwrap_or_default(),
            full_text: extract_body(&doc),
            figures: figure_captions(&doc),
            references: extract_references(&doc),
        }
    }
}

fn extract_authors(doc: &Html) -> Vec<String> {
    let authors = meta_authors(doc);
    if !authors.is_empty() {
        return authors;
    }
    let mut out = Vec::new();
    if let Ok(sel) = Selector::parse("li.c-article-author-list__item a") {
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

    if let Ok(section_sel) = Selector::parse("section[data-title]") {
        let content_sel = Selector::parse(".c-article-section__content").ok();
        for section in doc.select(&section_sel) {
            let title = section.value().attr("data-title").unwrap_or_default();
            if matches!(
                title.to_lowercase().as_str(),
                "abstract" | "references" | "supplementary information"
            ) {
                continue;
            }
            let content = content_sel
                .as_ref()
                .and_then(|sel| section.select(sel).next())
                .map(text_of)
                .unwrap_or_default();
            if !content.is_empty() {
                parts.push(format!("## {}\n\n{}", title, content));
            }
        }
    }

    if parts.is_empty() {
        if let Some(body) = select_first(doc, &["div.c-article-body", "div.article__body"]) {
            let text = text_of(body);
            if !text.is_empty() {
                parts.push(text);
            }
        }
    }

    parts.join("\n\n")
}

fn extract_references(doc: &Html) -> Vec<String> {
    let mut refs = Vec::new();
    if let Some(section) = select_first(doc, &["#Bib1", "#references"]) {
        if let Ok(item_sel) = Selector::parse("li.c-article-references__item") {
            for li in section.select(&item_sel) {
                let text = text_of(li);
                if !text.is_empty() {
                    refs.push(text);
                }
            }
        }
        if refs.is_empty() {
            if let Ok(li_sel) = Selector::parse("li") {
                for li in section.select(&li_sel) {
                    let text = text_of(li);
                    if text.len() > 20 {
                        refs.push(text);
                    }
                }
            }
        }
    }
    refs
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
<html><head>
  <meta name="citation_author" content="J. Doe">
  <meta name="citation_author" content="K. Lee">
</head><body>
  <nav>Home | Journals</nav>
  <h1 class="c-article-title">Quantum criticality in a metal</h1>
  <div class="c-article-section__content" id="Abs1-content">We report things.</div>
  <section data-title="Abstract">
    <div class="c-article-section__content">We report things.</div>
  </section>
  <section data-title="Introduction">
    <div class="c-article-section__content">Quantum matter <script>track();</script> is interesting.</div>
  </section>
  <section data-title="Results">
    <div class="c-article-section__content">We measured a thing.</div>
  </section>
  <figure><figcaption>Fig. 1: Phase diagram of the model.</figcaption></figure>
  <div id="Bib1"><ul>
    <li class="c-article-references__item">Author, A. A seminal paper. J. Phys (1990).</li>
  </ul></div>
</body></html>"#;

    #[test]
    fn test_handles_nature_domains() {
        assert!(NatureAdapter.can_handle("https://www.nature.com/articles/nphys1509"));
        assert!(NatureAdapter.can_handle("https://link.springer.com/article/10.1007/x"));
        assert!(!NatureAdapter.can_handle("https://pubs.acs.org/doi/x"));
    }

    #[test]
    fn test_extract_fields() {
        let result = NatureAdapter.extract(SAMPLE, "https://www.nature.com/articles/x");
        assert_eq!(result.title, "Quantum criticality in a metal");
        assert_eq!(result.authors, vec!["J. Doe", "K. Lee"]);
        assert_eq!(result.abstract_text, "We report things.");
        // Abstract section excluded from the body; script stripped.
        assert!(result.full_text.contains("## Introduction"));
        assert!(result.full_text.contains("Quantum matter is interesting."));
        assert!(result.full_text.contains("## Results"));
        assert!(!result.full_text.contains("We report things."));
        assert!(!result.full_text.contains("track()"));
        assert_eq!(result.figures, vec!["Fig. 1: Phase diagram of the model."]);
        assert_eq!(result.references.len(), 1);
    }
}
