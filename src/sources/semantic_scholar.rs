use serde::Deserialize;

use super::{SearchHit, SourceError};

const BASE_URL: &str = "https://api.semanticscholar.org/graph/v1";

const FIELDS: &str = "title,authors,abstract,year,venue,externalIds,citationCount,url";

/// Query-search collaborator: a thin client over the Semantic Scholar Graph
/// API. Deliberately outside the fetch chain.
pub struct SemanticScholarClient {
    client: reqwest::Client,
    base_url: String,
}

impl SemanticScholarClient {
    pub fn new() -> Self {
        Self::with_base_url(BASE_URL.to_string())
    }

    pub fn with_base_url(base_url: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent("paper-fetcher/0.1")
                .build()
                .expect("failed to build reqwest client"),
            base_url,
        }
    }

    pub async fn search(
        &self,
        query: &str,
        limit: u32,
        year_range: Option<&str>,
    ) -> Result<Vec<SearchHit>, SourceError> {
        let url = format!("{}/paper/search", self.base_url);
        let limit = limit.clamp(1, 100).to_string();
        let mut params = vec![
            ("query", query.to_string()),
            ("limit", limit),
            ("fields", FIELDS.to_string()),
        ];
        if let Some(years) = year_range {
            params.push(("year", years.to_string()));
        }
        let resp: S2SearchResponse = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await?
            .json()
            .await?;
        Ok(resp.data.unwrap_or_default().iter().map(s2_to_hit).collect())
    }

    pub async fn get_by_doi(&self, doi: &str) -> Result<Option<SearchHit>, SourceError> {
        let url = format!("{}/paper/DOI:{}", self.base_url, doi);
        let resp = self.client.get(&url).query(&[("fields", FIELDS)]).send().await?;
        if resp.status() == 404 {
            return Ok(None);
        }
        let paper: S2Paper = resp.json().await?;
        Ok(Some(s2_to_hit(&paper)))
    }
}

#[derive(Deserialize)]
struct S2SearchResponse {
    data: Option<Vec<S2Paper>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct S2Paper {
    title: Option<String>,
    authors: Option<Vec<S2Author>>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    year: Option<u32>,
    venue: Option<String>,
    external_ids: Option<S2ExternalIds>,
    citation_count: Option<u32>,
    url: Option<String>,
}

#[derive(Deserialize)]
struct S2Author {
    name: Option<String>,
}

#[derive(Deserialize)]
struct S2ExternalIds {
    #[serde(rename = "DOI")]
    doi: Option<String>,
    #[serde(rename = "ArXiv")]
    arxiv: Option<String>,
}

fn s2_to_hit(p: &S2Paper) -> SearchHit {
    SearchHit {
        title: p.title.clone().unwrap_or_default(),
        authors: p
            .authors
            .as_ref()
            .map(|a| a.iter().filter_map(|a| a.name.clone()).collect())
            .unwrap_or_default(),
        year: p.year,
        journal: p.venue.clone().unwrap_or_default(),
        doi: p.external_ids.as_ref().and_then(|e| e.doi.clone()),
        arxiv_id: p.external_ids.as_ref().and_then(|e| e.arxiv.clone()),
        abstract_text: p.abstract_text.clone(),
        citation_count: p.citation_count.unwrap_or(0),
        url: p.url.clone().unwrap_or_default(),
    }
}
