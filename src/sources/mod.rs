pub mod arxiv;
pub mod elsevier;
pub mod pubmed;
pub mod semantic_scholar;
pub mod unpaywall;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("API error: {0}")]
    Api(String),
}

/// A single result from the query-search collaborator. The core chain never
/// ranks or deduplicates these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub authors: Vec<String>,
    pub year: Option<u32>,
    pub journal: String,
    pub doi: Option<String>,
    pub arxiv_id: Option<String>,
    pub abstract_text: Option<String>,
    pub citation_count: u32,
    pub url: String,
}
