use serde::Deserialize;

use super::SourceError;

const BASE_URL: &str = "https://api.unpaywall.org/v2";

/// What the open-access probe learned about a DOI. Provider metadata is
/// populated even when `is_oa` is false, so a failed probe still seeds the
/// paper record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OaResult {
    pub is_oa: bool,
    pub pdf_url: String,
    pub html_url: String,
    /// "arxiv", "publisher", or "repository".
    pub source_kind: String,
    pub title: String,
    pub authors: Vec<String>,
    pub journal: String,
    pub year: Option<u32>,
}

pub struct UnpaywallClient {
    client: reqwest::Client,
    email: String,
    base_url: String,
}

impl UnpaywallClient {
    pub fn new(email: String) -> Self {
        Self::with_base_url(email, BASE_URL.to_string())
    }

    pub fn with_base_url(email: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent("paper-fetcher/0.1")
                .build()
                .expect("failed to build reqwest client"),
            email,
            base_url,
        }
    }

    /// Look up a DOI. A 404 (DOI unknown to the provider) yields an empty,
    /// non-OA result rather than an error.
    pub async fn check_oa(&self, doi: &str) -> Result<OaResult, SourceError> {
        let url = format!("{}/{}?email={}", self.base_url, doi, self.email);
        let resp = self.client.get(&url).send().await?;
        if resp.status() == 404 {
            return Ok(OaResult::default());
        }
        if !resp.status().is_success() {
            return Err(SourceError::Api(format!(
                "Unpaywall returned HTTP {} for {}",
                resp.status(),
                doi
            )));
        }
        let data: UnpaywallResponse = resp.json().await?;
        Ok(oa_result_from(data))
    }
}

#[derive(Deserialize)]
struct UnpaywallResponse {
    #[serde(default)]
    is_oa: bool,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    journal_name: Option<String>,
    #[serde(default)]
    year: Option<u32>,
    #[serde(default)]
    z_authors: Option<Vec<UnpaywallAuthor>>,
    #[serde(default)]
    best_oa_location: Option<UnpaywallLocation>,
    #[serde(default)]
    oa_locations: Vec<UnpaywallLocation>,
}

#[derive(Deserialize)]
struct UnpaywallAuthor {
    #[serde(default)]
    given: Option<String>,
    #[serde(default)]
    family: Option<String>,
}

#[derive(Deserialize, Default)]
struct UnpaywallLocation {
    #[serde(default)]
    url_for_pdf: Option<String>,
    #[serde(default)]
    url_for_landing_page: Option<String>,
    #[serde(default)]
    host_type: Option<String>,
    #[serde(default)]
    repository_institution: Option<String>,
}

fn oa_result_from(data: UnpaywallResponse) -> OaResult {
    let mut result = OaResult {
        is_oa: data.is_oa,
        title: data.title.unwrap_or_default(),
        journal: data.journal_name.unwrap_or_default(),
        year: data.year,
        ..Default::default()
    };

    for author in data.z_authors.unwrap_or_default() {
        let name = [author.given, author.family]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        if !name.is_empty() {
            result.authors.push(name);
        }
    }

    if !result.is_oa {
        return result;
    }

    if let Some(best) = &data.best_oa_location {
        result.pdf_url = best.url_for_pdf.clone().unwrap_or_default();
        result.html_url = best.url_for_landing_page.clone().unwrap_or_default();

        let haystack = format!(
            "{}{}{}",
            result.pdf_url,
            result.html_url,
            best.repository_institution.as_deref().unwrap_or("")
        )
        .to_lowercase();
        result.source_kind = if haystack.contains("arxiv") {
            "arxiv".to_string()
        } else if best.host_type.as_deref() == Some("publisher") {
            "publisher".to_string()
        } else {
            "repository".to_string()
        };
    }

    // Best location had no PDF: scan the remaining locations for one.
    if result.pdf_url.is_empty() {
        for loc in &data.oa_locations {
            if let Some(pdf) = loc.url_for_pdf.as_deref().filter(|u| !u.is_empty()) {
                result.pdf_url = pdf.to_string();
                break;
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "is_oa": true,
        "title": "Quantum phase transitions",
        "journal_name": "Nature Physics",
        "year": 2010,
        "z_authors": [
            {"given": "Jane", "family": "Doe"},
            {"family": "Smith"}
        ],
        "best_oa_location": {
            "url_for_pdf": null,
            "url_for_landing_page": "https://arxiv.org/abs/0912.4023",
            "host_type": "repository",
            "repository_institution": "arXiv"
        },
        "oa_locations": [
            {"url_for_pdf": "https://arxiv.org/pdf/0912.4023"}
        ]
    }"#;

    #[test]
    fn test_parse_oa_response() {
        let data: UnpaywallResponse = serde_json::from_str(SAMPLE).unwrap();
        let result = oa_result_from(data);
        assert!(result.is_oa);
        assert_eq!(result.title, "Quantum phase transitions");
        assert_eq!(result.authors, vec!["Jane Doe", "Smith"]);
        assert_eq!(result.source_kind, "arxiv");
        // PDF recovered from the location scan, not the best location.
        assert_eq!(result.pdf_url, "https://arxiv.org/pdf/0912.4023");
        assert_eq!(result.year, Some(2010));
    }

    #[test]
    fn test_non_oa_keeps_metadata() {
        let data: UnpaywallResponse = serde_json::from_str(
            r#"{"is_oa": false, "title": "Paywalled", "journal_name": "J. Expensive", "year": 2021}"#,
        )
        .unwrap();
        let result = oa_result_from(data);
        assert!(!result.is_oa);
        assert_eq!(result.title, "Paywalled");
        assert!(result.pdf_url.is_empty());
        assert!(result.source_kind.is_empty());
    }

    #[tokio::test]
    async fn test_check_oa_against_mock_server() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/10.1038/nphys1170")
            .match_query(mockito::Matcher::UrlEncoded(
                "email".into(),
                "tests@example.com".into(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(SAMPLE)
            .create_async()
            .await;

        let client = UnpaywallClient::with_base_url("tests@example.com".into(), server.url());
        let result = client.check_oa("10.1038/nphys1170").await.unwrap();
        assert!(result.is_oa);
        assert_eq!(result.title, "Quantum phase transitions");
        assert_eq!(result.pdf_url, "https://arxiv.org/pdf/0912.4023");
    }

    #[tokio::test]
    async fn test_check_oa_unknown_doi_is_empty() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/10.1234/missing")
            .match_query(mockito::Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        let client = UnpaywallClient::with_base_url("tests@example.com".into(), server.url());
        let result = client.check_oa("10.1234/missing").await.unwrap();
        assert_eq!(result, OaResult::default());
    }

    #[test]
    fn test_publisher_host_type() {
        let data: UnpaywallResponse = serde_json::from_str(
            r#"{"is_oa": true, "best_oa_location": {"url_for_pdf": "https://journals.example.org/x.pdf", "host_type": "publisher"}}"#,
        )
        .unwrap();
        let result = oa_result_from(data);
        assert_eq!(result.source_kind, "publisher");
        assert_eq!(result.pdf_url, "https://journals.example.org/x.pdf");
    }
}
