use quick_xml::events::Event;
use quick_xml::Reader;

use super::SourceError;

const EUTILS_BASE: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

pub struct PubMedClient {
    client: reqwest::Client,
    base_url: String,
    email: String,
}

impl PubMedClient {
    pub fn new(email: String) -> Self {
        Self::with_base_url(email, EUTILS_BASE.to_string())
    }

    pub fn with_base_url(email: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent("paper-fetcher/0.1")
                .build()
                .expect("failed to build reqwest client"),
            base_url,
            email,
        }
    }

    /// Resolve a PMID to its DOI via NCBI efetch. `Ok(None)` means the record
    /// exists but carries no DOI.
    pub async fn pmid_to_doi(&self, pmid: &str) -> Result<Option<String>, SourceError> {
        let url = format!("{}/efetch.fcgi", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("db", "pubmed"),
                ("id", pmid.trim()),
                ("retmode", "xml"),
                ("email", &self.email),
            ])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(SourceError::Api(format!(
                "NCBI efetch returned HTTP {} for PMID {}",
                resp.status(),
                pmid
            )));
        }
        let xml = resp.text().await?;
        parse_doi_from_efetch(&xml)
    }
}

/// Find `<ArticleId IdType="doi">...</ArticleId>` in an efetch response.
fn parse_doi_from_efetch(xml: &str) -> Result<Option<String>, SourceError> {
    let mut reader = Reader::from_str(xml);
    let mut in_doi_id = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if e.name().as_ref() == b"ArticleId" {
                    in_doi_id = e.attributes().flatten().any(|attr| {
                        attr.key.as_ref() == b"IdType" && attr.value.as_ref() == b"doi"
                    });
                }
            }
            Ok(Event::Text(e)) if in_doi_id => {
                let doi = e.unescape().unwrap_or_default().trim().to_string();
                if !doi.is_empty() {
                    return Ok(Some(doi));
                }
            }
            Ok(Event::End(e)) => {
                if e.name().as_ref() == b"ArticleId" {
                    in_doi_id = false;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(SourceError::Parse(format!("XML parse error: {}", e))),
            _ => {}
        }
        buf.clear();
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_EFETCH: &str = r#"<?xml version="1.0"?>
<PubmedArticleSet>
  <PubmedArticle>
    <PubmedData>
      <ArticleIdList>
        <ArticleId IdType="pubmed">38123456</ArticleId>
        <ArticleId IdType="pmc">PMC9999999</ArticleId>
        <ArticleId IdType="doi">10.1016/j.cell.2023.11.001</ArticleId>
      </ArticleIdList>
    </PubmedData>
  </PubmedArticle>
</PubmedArticleSet>"#;

    #[test]
    fn test_parse_doi_from_efetch() {
        let doi = parse_doi_from_efetch(SAMPLE_EFETCH).unwrap();
        assert_eq!(doi, Some("10.1016/j.cell.2023.11.001".to_string()));
    }

    #[test]
    fn test_no_doi_in_record() {
        let xml = r#"<PubmedArticleSet><PubmedArticle><PubmedData><ArticleIdList>
            <ArticleId IdType="pubmed">123</ArticleId>
        </ArticleIdList></PubmedData></PubmedArticle></PubmedArticleSet>"#;
        assert_eq!(parse_doi_from_efetch(xml).unwrap(), None);
    }

    #[test]
    fn test_empty_response() {
        assert_eq!(parse_doi_from_efetch("").unwrap(), None);
    }

    #[tokio::test]
    async fn test_pmid_to_doi_against_mock_server() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/efetch.fcgi")
            .match_query(mockito::Matcher::UrlEncoded("id".into(), "38123456".into()))
            .with_status(200)
            .with_header("content-type", "text/xml")
            .with_body(SAMPLE_EFETCH)
            .create_async()
            .await;

        let client = PubMedClient::with_base_url("tests@example.com".into(), server.url());
        let doi = client.pmid_to_doi("38123456").await.unwrap();
        assert_eq!(doi.as_deref(), Some("10.1016/j.cell.2023.11.001"));
    }
}
