use serde_json::Value;

use super::SourceError;

const API_BASE: &str = "https://api.elsevier.com";

/// DOI registrant prefix served by this publisher's API.
pub const DOI_PREFIX: &str = "10.1016/";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElsevierArticle {
    pub doi: String,
    pub title: String,
    pub authors: Vec<String>,
    pub journal: String,
    pub year: Option<u32>,
    pub abstract_text: String,
    pub full_text: String,
}

/// Credentialed client for the Elsevier full-text API. Only consulted for
/// DOIs under [`DOI_PREFIX`].
pub struct ElsevierClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl ElsevierClient {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, API_BASE.to_string())
    }

    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent("paper-fetcher/0.1")
                .build()
                .expect("failed to build reqwest client"),
            api_key,
            base_url,
        }
    }

    /// Fetch metadata and (subscription permitting) full text by DOI.
    /// 404 and 403 are soft failures returning `None`.
    pub async fn get_article_by_doi(&self, doi: &str) -> Result<Option<ElsevierArticle>, SourceError> {
        let url = format!("{}/content/article/doi/{}", self.base_url, doi);
        let resp = self
            .client
            .get(&url)
            .header("X-ELS-APIKey", &self.api_key)
            .header("Accept", "application/json")
            .send()
            .await?;

        match resp.status().as_u16() {
            404 => {
                tracing::info!("Elsevier API has no record for {}", doi);
                return Ok(None);
            }
            403 => {
                tracing::warn!("Elsevier API access denied for {} (key/subscription)", doi);
                return Ok(None);
            }
            s if !(200..300).contains(&s) => {
                return Err(SourceError::Api(format!(
                    "Elsevier API returned HTTP {} for {}",
                    s, doi
                )));
            }
            _ => {}
        }

        let data: Value = resp.json().await?;
        Ok(Some(parse_article(&data)))
    }
}

fn parse_article(data: &Value) -> ElsevierArticle {
    let coredata = &data["full-text-retrieval-response"]["coredata"];
    let mut article = ElsevierArticle {
        doi: str_field(coredata, "prism:doi"),
        title: str_field(coredata, "dc:title"),
        journal: str_field(coredata, "prism:publicationName"),
        abstract_text: str_field(coredata, "dc:description").trim().to_string(),
        ..Default::default()
    };

    article.year = coredata["prism:coverDate"]
        .as_str()
        .and_then(|d| d.get(..4))
        .and_then(|y| y.parse::<u32>().ok());

    if let Some(creators) = coredata["dc:creator"].as_array() {
        for creator in creators {
            if let Some(name) = creator["$"].as_str() {
                article.authors.push(name.to_string());
            }
        }
    }

    if let Some(text) = data["full-text-retrieval-response"]["originalText"]["$"].as_str() {
        article.full_text = text.to_string();
    }

    article
}

fn str_field(v: &Value, key: &str) -> String {
    v[key].as_str().unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "full-text-retrieval-response": {
            "coredata": {
                "prism:doi": "10.1016/j.cell.2023.11.001",
                "dc:title": "Cellular mechanisms",
                "prism:publicationName": "Cell",
                "prism:coverDate": "2023-11-15",
                "dc:description": " A study of cells. ",
                "dc:creator": [
                    {"$": "Doe, Jane"},
                    {"$": "Smith, John"}
                ]
            },
            "originalText": {"$": "Full body of the article."}
        }
    }"#;

    #[test]
    fn test_parse_article() {
        let data: Value = serde_json::from_str(SAMPLE).unwrap();
        let article = parse_article(&data);
        assert_eq!(article.doi, "10.1016/j.cell.2023.11.001");
        assert_eq!(article.title, "Cellular mechanisms");
        assert_eq!(article.journal, "Cell");
        assert_eq!(article.year, Some(2023));
        assert_eq!(article.authors, vec!["Doe, Jane", "Smith, John"]);
        assert_eq!(article.abstract_text, "A study of cells.");
        assert_eq!(article.full_text, "Full body of the article.");
    }

    #[test]
    fn test_parse_empty_response() {
        let article = parse_article(&Value::Null);
        assert!(article.doi.is_empty());
        assert!(article.full_text.is_empty());
        assert_eq!(article.year, None);
    }

    #[tokio::test]
    async fn test_get_article_against_mock_server() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/content/article/doi/10.1016/j.cell.2023.11.001")
            .match_header("x-els-apikey", "test-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(SAMPLE)
            .create_async()
            .await;

        let client = ElsevierClient::with_base_url("test-key".into(), server.url());
        let article = client
            .get_article_by_doi("10.1016/j.cell.2023.11.001")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(article.title, "Cellular mechanisms");
        assert_eq!(article.full_text, "Full body of the article.");
    }

    #[tokio::test]
    async fn test_denied_access_is_soft_failure() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/content/article/doi/10.1016/j.cell.2023.11.001")
            .with_status(403)
            .create_async()
            .await;

        let client = ElsevierClient::with_base_url("test-key".into(), server.url());
        let article = client
            .get_article_by_doi("10.1016/j.cell.2023.11.001")
            .await
            .unwrap();
        assert!(article.is_none());
    }

    #[test]
    fn test_doi_prefix_gate() {
        assert!("10.1016/j.cell.2023.11.001".starts_with(DOI_PREFIX));
        assert!(!"10.1038/nphys1509".starts_with(DOI_PREFIX));
    }
}
