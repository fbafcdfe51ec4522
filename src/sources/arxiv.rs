use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use std::sync::OnceLock;

use super::SourceError;

const API_URL: &str = "https://export.arxiv.org/api/query";
const PDF_BASE: &str = "https://arxiv.org/pdf";
const ABS_BASE: &str = "https://arxiv.org/abs";

/// Matches modern (2301.08745) and legacy (hep-ph/0601001) arXiv IDs, with
/// an optional version suffix.
fn id_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{4}\.\d{4,5}(?:v\d+)?|[a-z-]+/\d{7}(?:v\d+)?)").unwrap())
}

/// Pull an arXiv ID out of a URL, DOI, or raw string.
pub fn extract_arxiv_id(text: &str) -> Option<String> {
    id_pattern().find(text).map(|m| m.as_str().to_string())
}

pub fn strip_version(arxiv_id: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"v\d+$").unwrap());
    re.replace(arxiv_id, "").into_owned()
}

pub fn pdf_url(arxiv_id: &str) -> String {
    format!("{}/{}.pdf", PDF_BASE, strip_version(arxiv_id))
}

pub fn abs_url(arxiv_id: &str) -> String {
    format!("{}/{}", ABS_BASE, strip_version(arxiv_id))
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArxivMetadata {
    pub arxiv_id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub abstract_text: String,
    pub year: Option<u32>,
    pub url: String,
}

pub struct ArxivClient {
    client: reqwest::Client,
    api_url: String,
}

impl ArxivClient {
    pub fn new() -> Self {
        Self::with_api_url(API_URL.to_string())
    }

    pub fn with_api_url(api_url: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent("paper-fetcher/0.1")
                .build()
                .expect("failed to build reqwest client"),
            api_url,
        }
    }

    /// Fetch metadata for one paper via the arXiv Atom API.
    pub async fn fetch_metadata(&self, arxiv_id: &str) -> Result<Option<ArxivMetadata>, SourceError> {
        let clean_id = strip_version(arxiv_id);
        let url = format!("{}?id_list={}&max_results=1", self.api_url, clean_id);
        let xml = self.client.get(&url).send().await?.text().await?;
        Ok(parse_entry(&xml)?.map(|mut meta| {
            meta.arxiv_id = clean_id.clone();
            meta.url = abs_url(&clean_id);
            meta
        }))
    }

    /// Download the PDF for an arXiv ID, returning its raw bytes.
    pub async fn download_pdf(&self, arxiv_id: &str) -> Result<Vec<u8>, SourceError> {
        let url = pdf_url(arxiv_id);
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(SourceError::Api(format!(
                "arXiv PDF download returned HTTP {} for {}",
                resp.status(),
                arxiv_id
            )));
        }
        Ok(resp.bytes().await?.to_vec())
    }
}

fn parse_entry(xml: &str) -> Result<Option<ArxivMetadata>, SourceError> {
    let mut reader = Reader::from_str(xml);
    let mut in_entry = false;
    let mut in_author = false;
    let mut current_tag = String::new();
    let mut meta = ArxivMetadata::default();
    let mut author_name = String::new();
    let mut published = String::new();
    let mut found = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if tag == "entry" {
                    in_entry = true;
                    found = true;
                } else if in_entry {
                    current_tag = tag.clone();
                    if tag == "author" {
                        in_author = true;
                        author_name.clear();
                    }
                }
            }
            Ok(Event::Text(e)) if in_entry => {
                let text = e.unescape().unwrap_or_default().to_string();
                match current_tag.as_str() {
                    "title" => meta.title.push_str(&text),
                    "summary" => meta.abstract_text.push_str(&text),
                    "published" => published.push_str(&text),
                    "name" if in_author => author_name.push_str(&text),
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if tag == "entry" {
                    break;
                }
                if tag == "author" && in_author {
                    in_author = false;
                    let name = author_name.trim();
                    if !name.is_empty() {
                        meta.authors.push(name.to_string());
                    }
                }
                if tag == current_tag {
                    current_tag.clear();
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(SourceError::Parse(format!("XML parse error: {}", e))),
            _ => {}
        }
        buf.clear();
    }

    if !found {
        return Ok(None);
    }

    meta.title = meta.title.trim().replace('\n', " ");
    meta.abstract_text = meta.abstract_text.trim().replace('\n', " ");
    meta.year = published.get(..4).and_then(|y| y.parse::<u32>().ok());
    Ok(Some(meta))
}
