pub mod acs;
pub mod elsevier;
pub mod generic;
pub mod nature;
pub mod pdf;
pub mod wiley;

use scraper::{ElementRef, Html, Selector};

/// Structured content pulled out of an article page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extracted {
    pub title: String,
    pub authors: Vec<String>,
    pub abstract_text: String,
    pub full_text: String,
    pub figures: Vec<String>,
    pub references: Vec<String>,
}

/// A per-publisher HTML field-extraction strategy.
pub trait PublisherAdapter: Send + Sync {
    fn name(&self) -> &'static str;
    /// Domain-substring match against the page URL.
    fn can_handle(&self, url: &str) -> bool;
    fn extract(&self, html: &str, url: &str) -> Extracted;
}

/// Fixed, ordered adapter registry. The first adapter whose `can_handle`
/// returns true wins; the generic adapter is the unconditional fallback.
fn registry() -> Vec<Box<dyn PublisherAdapter>> {
    vec![
        Box::new(nature::NatureAdapter),
        Box::new(elsevier::ElsevierAdapter),
        Box::new(wiley::WileyAdapter),
        Box::new(acs::AcsAdapter),
    ]
}

/// Route HTML to the best adapter for its source URL.
pub fn extract(html: &str, url: &str) -> Extracted {
    for adapter in registry() {
        if adapter.can_handle(url) {
            tracing::info!("Using {} adapter for {}", adapter.name(), url);
            return adapter.extract(html, url);
        }
    }
    tracing::info!("Using generic adapter for {}", url);
    generic::GenericAdapter.extract(html, url)
}

/// Name of the adapter that would handle a URL, for diagnostics and tests.
pub fn adapter_for(url: &str) -> &'static str {
    for adapter in registry() {
        if adapter.can_handle(url) {
            return adapter.name();
        }
    }
    generic::GenericAdapter.name()
}

// ── Shared DOM helpers ──────────────────────────────────────────────────────

const SKIP_TAGS: &[&str] = &["script", "style", "nav"];
const SKIP_TAGS_CHROME: &[&str] = &["script", "style", "nav", "header", "footer", "aside"];

fn collect_text(node: ego_tree::NodeRef<'_, scraper::Node>, skip: &[&str], out: &mut String) {
    if let Some(el) = node.value().as_element() {
        if skip.contains(&el.name()) {
            return;
        }
    }
    if let Some(text) = node.value().as_text() {
        out.push_str(text);
        out.push(' ');
    }
    for child in node.children() {
        collect_text(child, skip, out);
    }
}

/// Text content of an element with script/style/nav subtrees skipped and
/// whitespace collapsed.
pub(crate) fn text_of(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    collect_text(*el, SKIP_TAGS, &mut out);
    clean(&out)
}

/// Like [`text_of`] but also skips page-chrome elements (header, footer,
/// aside) — used by the generic adapter on unknown layouts.
pub(crate) fn text_of_content(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    collect_text(*el, SKIP_TAGS_CHROME, &mut out);
    clean(&out)
}

/// Collapse all whitespace runs to single spaces.
pub(crate) fn clean(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First element matching any of the ordered selector candidates.
pub(crate) fn select_first<'a>(doc: &'a Html, selectors: &[&str]) -> Option<ElementRef<'a>> {
    for sel in selectors {
        let Ok(selector) = Selector::parse(sel) else {
            continue;
        };
        if let Some(el) = doc.select(&selector).next() {
            return Some(el);
        }
    }
    None
}

/// First non-empty text produced by the ordered selector candidates.
pub(crate) fn first_text(doc: &Html, selectors: &[&str]) -> Option<String> {
    for sel in selectors {
        let Ok(selector) = Selector::parse(sel) else {
            continue;
        };
        for el in doc.select(&selector) {
            let text = text_of(el);
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

/// Author names from `citation_author`-style meta tags, the most reliable
/// source across publishers.
pub(crate) fn meta_authors(doc: &Html) -> Vec<String> {
    let mut authors = Vec::new();
    for sel in ["meta[name='citation_author']", "meta[name='dc.creator']"] {
        let Ok(selector) = Selector::parse(sel) else {
            continue;
        };
        for meta in doc.select(&selector) {
            if let Some(name) = meta.value().attr("content") {
                let name = name.trim();
                if !name.is_empty() {
                    authors.push(name.to_string());
                }
            }
        }
        if !authors.is_empty() {
            break;
        }
    }
    authors
}

/// Figure captions from `<figure><figcaption>` pairs, minimum length 10.
pub(crate) fn figure_captions(doc: &Html) -> Vec<String> {
    let mut captions = Vec::new();
    let Ok(fig_sel) = Selector::parse("figure") else {
        return captions;
    };
    let Ok(cap_sel) = Selector::parse("figcaption") else {
        return captions;
    };
    for fig in doc.select(&fig_sel) {
        if let Some(cap) = fig.select(&cap_sel).next() {
            let text = text_of(cap);
            if text.len() > 10 {
                captions.push(text);
            }
        }
    }
    captions
}

/// Reference entries: `<li>` items under the first matching section,
/// minimum length 20 to drop navigation stubs.
pub(crate) fn list_references(doc: &Html, section_selectors: &[&str]) -> Vec<String> {
    let mut refs = Vec::new();
    let Some(section) = select_first(doc, section_selectors) else {
        return refs;
    };
    let Ok(li_sel) = Selector::parse("li") else {
        return refs;
    };
    for li in section.select(&li_sel) {
        let text = text_of(li);
        if text.len() > 20 {
            refs.push(text);
        }
    }
    refs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_prefers_publisher_adapter() {
        // nature.com routes to the Nature adapter even though the generic
        // adapter could also pull a title out of this page.
        assert_eq!(adapter_for("https://www.nature.com/articles/nphys1509"), "nature");
        assert_eq!(
            adapter_for("https://www.sciencedirect.com/science/article/pii/S1"),
            "elsevier"
        );
        assert_eq!(adapter_for("https://onlinelibrary.wiley.com/doi/10.1002/x"), "wiley");
        assert_eq!(adapter_for("https://pubs.acs.org/doi/10.1021/x"), "acs");
        assert_eq!(adapter_for("https://journals.example.org/article/1"), "generic");
    }

    #[test]
    fn test_text_of_skips_script_and_style() {
        let doc = Html::parse_document(
            "<article><script>var x = 1;</script><style>p{}</style><p>Real text.</p></article>",
        );
        let el = select_first(&doc, &["article"]).unwrap();
        assert_eq!(text_of(el), "Real text.");
    }

    #[test]
    fn test_text_of_content_skips_chrome() {
        let doc = Html::parse_document(
            "<body><header>Site name</header><main><p>Body.</p></main><footer>Legal</footer></body>",
        );
        let el = select_first(&doc, &["body"]).unwrap();
        assert_eq!(text_of_content(el), "Body.");
        // The plain walk keeps header/footer.
        assert!(text_of(el).contains("Site name"));
    }

    #[test]
    fn test_clean_collapses_whitespace() {
        assert_eq!(clean("  a \n\t b   c "), "a b c");
    }

    #[test]
    fn test_meta_authors() {
        let doc = Html::parse_document(
            r#"<head>
                <meta name="citation_author" content="Jane Doe">
                <meta name="citation_author" content="John Smith">
            </head>"#,
        );
        assert_eq!(meta_authors(&doc), vec!["Jane Doe", "John Smith"]);
    }

    #[test]
    fn test_figure_captions_minimum_length() {
        let doc = Html::parse_document(
            "<figure><figcaption>short</figcaption></figure>\
             <figure><figcaption>A long enough figure caption.</figcaption></figure>",
        );
        assert_eq!(figure_captions(&doc), vec!["A long enough figure caption."]);
    }
}
