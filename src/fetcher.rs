use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use rand::Rng;
use reqwest::Url;
use scraper::{Html, Selector};
use tracing::{debug, info, warn};

use crate::auth::{self, AuthError, SessionManager};
use crate::cache::ResultCache;
use crate::config::Config;
use crate::extract::{self, pdf, Extracted};
use crate::ident::{classify, is_pmid_shape, IdKind};
use crate::paper::{Paper, Source};
use crate::sources::arxiv::{self, ArxivClient};
use crate::sources::elsevier::{ElsevierClient, DOI_PREFIX};
use crate::sources::pubmed::PubMedClient;
use crate::sources::semantic_scholar::SemanticScholarClient;
use crate::sources::unpaywall::UnpaywallClient;
use crate::sources::SearchHit;

/// HTML-derived text shorter than this is considered thin enough to try a
/// PDF re-extraction instead.
const MIN_HTML_TEXT_LEN: usize = 500;

/// Hosts a DOI resolution can land on that are never fetchable, proxied or
/// not. Landing here fails resolution outright.
const DEAD_END_HOSTS: &[&str] = &["pubmed.ncbi.nlm.nih.gov"];

const DOI_RESOLVER: &str = "https://doi.org";

/// Enforces a randomized minimum delay between outbound requests. One
/// instance per fetcher; sharing it across fetchers would under-throttle.
pub struct RateLimiter {
    min_secs: f64,
    max_secs: f64,
    last: Option<Instant>,
}

impl RateLimiter {
    pub fn new(min_secs: f64, max_secs: f64) -> Self {
        Self {
            min_secs,
            max_secs: max_secs.max(min_secs),
            last: None,
        }
    }

    /// Sleep until at least the randomized delay has passed since the
    /// previous call, then mark this request.
    pub async fn wait(&mut self) {
        if let Some(last) = self.last {
            let delay = {
                let mut rng = rand::thread_rng();
                rng.gen_range(self.min_secs..=self.max_secs)
            };
            let delay = Duration::from_secs_f64(delay);
            let elapsed = last.elapsed();
            if elapsed < delay {
                tokio::time::sleep(delay - elapsed).await;
            }
        }
        self.last = Some(Instant::now());
    }
}

/// What a fetch stage contributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StageOutcome {
    FullText,
    MetadataOnly,
    Nothing,
}

/// Orchestrates the fallback chain for one paper at a time: cache, open
/// access, publisher API, DOI resolution, authenticated proxy fetch,
/// extraction, cache write. Owns its rate-limiter state and a lazily
/// initialized proxy session.
pub struct PaperFetcher {
    config: Config,
    cache: ResultCache,
    limiter: RateLimiter,
    session: Option<SessionManager>,
    http: reqwest::Client,
    unpaywall: UnpaywallClient,
    arxiv: ArxivClient,
    pubmed: PubMedClient,
    scholar: SemanticScholarClient,
    elsevier: Option<ElsevierClient>,
}

impl PaperFetcher {
    pub fn new(config: Config) -> Self {
        let email = config.email_or_default();
        let cache = ResultCache::new(config.cache_dir.clone());
        let limiter = RateLimiter::new(config.request_delay_min, config.request_delay_max);
        let elsevier = config
            .elsevier_api_key
            .clone()
            .filter(|k| !k.is_empty())
            .map(ElsevierClient::new);
        Self {
            cache,
            limiter,
            session: None,
            http: reqwest::Client::builder()
                .user_agent("paper-fetcher/0.1")
                .build()
                .expect("failed to build reqwest client"),
            unpaywall: UnpaywallClient::new(email.clone()),
            arxiv: ArxivClient::new(),
            pubmed: PubMedClient::new(email),
            scholar: SemanticScholarClient::new(),
            elsevier,
            config,
        }
    }

    /// Fetch a paper by DOI, PMID, or URL. Always returns a `Paper`; network
    /// problems degrade the result rather than erroring.
    pub async fn fetch(&mut self, identifier: &str, use_cache: bool) -> Paper {
        let raw = identifier.trim();
        let (kind, value) = classify(raw);
        debug!("Classified {:?} as {:?} -> {}", raw, kind, value);

        let doi = match kind {
            IdKind::Doi => value,
            IdKind::Pmid => {
                self.limiter.wait().await;
                match self.pubmed.pmid_to_doi(&value).await {
                    Ok(Some(doi)) => doi,
                    Ok(None) => {
                        warn!("PMID {} has no DOI on record", value);
                        return Paper::default();
                    }
                    Err(e) => {
                        warn!("PMID resolution failed for {}: {}", value, e);
                        return Paper::default();
                    }
                }
            }
            IdKind::Pmcid => {
                // PMC deposits need their own fetch path; report rather than
                // guess a landing URL.
                warn!("PMCID {} cannot be fetched directly; supply the DOI", value);
                return Paper::default();
            }
            IdKind::Url => {
                let mut paper = Paper::new("", value.clone());
                self.auth_fetch_into(&mut paper, &value).await;
                return self.finalize(paper);
            }
            IdKind::Unknown => {
                warn!("Unrecognized identifier: {}", raw);
                return Paper::default();
            }
        };

        // A raw PMID means the caller does not have the DOI in hand, so a
        // cache hit keyed on the resolved DOI would be a surprise. Skip it.
        if use_cache && !is_pmid_shape(raw) {
            if let Some(hit) = self.cache.load(&doi) {
                info!("Cache hit for {}", doi);
                return hit;
            }
        }

        let mut paper = Paper::new(doi.clone(), String::new());

        if self.probe_open_access(&mut paper).await == StageOutcome::FullText {
            return self.finalize(paper);
        }

        if self.try_publisher_api(&mut paper).await == StageOutcome::FullText {
            return self.finalize(paper);
        }

        let landing_url = match self.resolve_doi(&doi).await {
            Some(url) => url,
            None => {
                warn!("DOI {} did not resolve to a fetchable URL", doi);
                return self.finalize(paper);
            }
        };
        paper.url = landing_url.clone();

        self.auth_fetch_into(&mut paper, &landing_url).await;
        self.finalize(paper)
    }

    /// Cache write plus final bookkeeping. Every fetch exit funnels through
    /// here.
    fn finalize(&self, paper: Paper) -> Paper {
        if !paper.full_text.is_empty() && !paper.doi.is_empty() {
            self.cache.store(&paper);
        }
        if paper.source != Source::Unresolved && !paper.has_content() {
            warn!("Resolved {} but extracted neither abstract nor full text", paper.doi);
        }
        paper
    }

    /// Unpaywall probe. Metadata seeds the paper even when the work is not
    /// OA; an arXiv deposit diverts to the arXiv API and PDF endpoint.
    async fn probe_open_access(&mut self, paper: &mut Paper) -> StageOutcome {
        self.limiter.wait().await;
        let oa = match self.unpaywall.check_oa(&paper.doi).await {
            Ok(oa) => oa,
            Err(e) => {
                warn!("Open-access probe failed for {}: {}", paper.doi, e);
                return StageOutcome::Nothing;
            }
        };

        seed_str(&mut paper.title, &oa.title);
        seed_str(&mut paper.journal, &oa.journal);
        seed_vec(&mut paper.authors, &oa.authors);
        if paper.year.is_none() {
            paper.year = oa.year;
        }

        if oa.source_kind == "arxiv" {
            let arxiv_id = arxiv::extract_arxiv_id(&oa.pdf_url)
                .or_else(|| arxiv::extract_arxiv_id(&oa.html_url));
            if let Some(id) = arxiv_id {
                if self.fetch_arxiv(paper, &id).await {
                    paper.source = Source::Arxiv;
                    return StageOutcome::FullText;
                }
            }
        }

        if oa.is_oa && !oa.pdf_url.is_empty() {
            self.limiter.wait().await;
            match fetch_pdf_bytes(&self.http, &oa.pdf_url).await {
                Some(bytes) => {
                    let stem = sanitize_doi(&paper.doi);
                    if self.adopt_pdf(paper, &bytes, &stem) {
                        seed_str(&mut paper.url, &oa.pdf_url);
                        paper.source = Source::OpenAccess;
                        return StageOutcome::FullText;
                    }
                }
                None => debug!("OA PDF at {} was not usable", oa.pdf_url),
            }
        }

        if oa.is_oa && !oa.html_url.is_empty() {
            self.limiter.wait().await;
            match self.http.get(&oa.html_url).send().await {
                Ok(resp) => {
                    let final_url = resp.url().to_string();
                    if let Ok(body) = resp.text().await {
                        let extracted = extract::extract(&body, &final_url);
                        merge_extracted(paper, &extracted);
                        if !paper.full_text.is_empty() {
                            seed_str(&mut paper.url, &final_url);
                            paper.source = Source::OpenAccess;
                            return StageOutcome::FullText;
                        }
                    }
                }
                Err(e) => warn!("OA landing fetch failed for {}: {}", oa.html_url, e),
            }
        }

        if paper.title.is_empty() && paper.authors.is_empty() {
            StageOutcome::Nothing
        } else {
            StageOutcome::MetadataOnly
        }
    }

    /// Credentialed Elsevier API, gated on the registrant prefix.
    async fn try_publisher_api(&mut self, paper: &mut Paper) -> StageOutcome {
        let Some(client) = &self.elsevier else {
            return StageOutcome::Nothing;
        };
        if !paper.doi.starts_with(DOI_PREFIX) {
            return StageOutcome::Nothing;
        }
        self.limiter.wait().await;
        let article = match client.get_article_by_doi(&paper.doi).await {
            Ok(Some(article)) => article,
            Ok(None) => return StageOutcome::Nothing,
            Err(e) => {
                warn!("Publisher API failed for {}: {}", paper.doi, e);
                return StageOutcome::Nothing;
            }
        };

        seed_str(&mut paper.title, &article.title);
        seed_str(&mut paper.journal, &article.journal);
        seed_str(&mut paper.abstract_text, &article.abstract_text);
        seed_vec(&mut paper.authors, &article.authors);
        if paper.year.is_none() {
            paper.year = article.year;
        }

        if !article.full_text.is_empty() {
            paper.full_text = article.full_text;
            paper.source = Source::ElsevierApi;
            StageOutcome::FullText
        } else {
            StageOutcome::MetadataOnly
        }
    }

    /// Resolver-only DOI resolution: follow `https://doi.org/<doi>` and take
    /// the final URL. Landing on a dead-end host fails resolution.
    async fn resolve_doi(&mut self, doi: &str) -> Option<String> {
        self.limiter.wait().await;
        let resolver = format!("{}/{}", DOI_RESOLVER, doi);
        let resp = match self.http.get(&resolver).send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!("DOI resolution failed for {}: {}", doi, e);
                return None;
            }
        };
        let final_url = resp.url().clone();
        if let Some(host) = final_url.host_str() {
            if DEAD_END_HOSTS.iter().any(|dead| host == *dead) {
                warn!("DOI {} resolves to dead-end host {}", doi, host);
                return None;
            }
        }
        debug!("DOI {} resolved to {}", doi, final_url);
        Some(final_url.to_string())
    }

    /// arXiv metadata plus PDF text. Returns true when full text landed.
    async fn fetch_arxiv(&mut self, paper: &mut Paper, arxiv_id: &str) -> bool {
        self.limiter.wait().await;
        match self.arxiv.fetch_metadata(arxiv_id).await {
            Ok(Some(meta)) => {
                seed_str(&mut paper.title, &meta.title);
                seed_str(&mut paper.abstract_text, &meta.abstract_text);
                seed_vec(&mut paper.authors, &meta.authors);
                if paper.year.is_none() {
                    paper.year = meta.year;
                }
                seed_str(&mut paper.url, &arxiv::abs_url(arxiv_id));
            }
            Ok(None) => debug!("arXiv API has no entry for {}", arxiv_id),
            Err(e) => warn!("arXiv metadata fetch failed for {}: {}", arxiv_id, e),
        }

        self.limiter.wait().await;
        match self.arxiv.download_pdf(arxiv_id).await {
            Ok(bytes) => {
                let stem = format!("arxiv_{}", arxiv::strip_version(arxiv_id).replace('/', "_"));
                self.adopt_pdf(paper, &bytes, &stem)
            }
            Err(e) => {
                warn!("arXiv PDF download failed for {}: {}", arxiv_id, e);
                false
            }
        }
    }

    /// Authenticated proxy fetch and extraction. Auth failures are terminal
    /// for the fetch: the paper keeps whatever it has accumulated.
    async fn auth_fetch_into(&mut self, paper: &mut Paper, url: &str) {
        if self.config.proxy_base.is_empty() {
            warn!("No proxy configured; cannot fetch {} behind the paywall", url);
            return;
        }
        if let Err(e) = self.ensure_session().await {
            warn!("Proxy login failed: {}", e);
            return;
        }
        // ensure_session just populated this.
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let proxied = session.proxied(url);
        self.limiter.wait().await;
        let resp = match session.client().get(&proxied).send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!("Authenticated fetch failed for {}: {}", url, e);
                return;
            }
        };
        let (mut final_url, fetched) = match read_proxied_body(resp).await {
            Ok(pair) => pair,
            Err(e) => {
                warn!("Failed to read response body for {}: {}", url, e);
                return;
            }
        };

        // Many proxied DOI landings serve the PDF itself; no HTML to parse.
        let mut body = match fetched {
            ProxiedBody::Pdf(bytes) => {
                let stem = pdf_stem(paper);
                if self.adopt_pdf(paper, &bytes, &stem) {
                    paper.source = Source::Proxy;
                }
                return;
            }
            ProxiedBody::Html(body) => body,
        };

        if auth::is_challenge_page(&body) {
            let cleared = match session.recover_challenge(&final_url).await {
                Ok(cleared) => cleared,
                Err(e) => {
                    warn!("Challenge recovery failed: {}", e);
                    false
                }
            };
            if !cleared {
                return;
            }
            // Exactly one retry of the original request.
            self.limiter.wait().await;
            let Some(session) = self.session.as_mut() else {
                return;
            };
            match session.client().get(&proxied).send().await {
                Ok(resp) => match read_proxied_body(resp).await {
                    Ok((retried_url, ProxiedBody::Html(retried_body))) => {
                        final_url = retried_url;
                        body = retried_body;
                    }
                    Ok((_, ProxiedBody::Pdf(bytes))) => {
                        let stem = pdf_stem(paper);
                        if self.adopt_pdf(paper, &bytes, &stem) {
                            paper.source = Source::Proxy;
                        }
                        return;
                    }
                    Err(e) => {
                        warn!("Failed to read retried body for {}: {}", url, e);
                        return;
                    }
                },
                Err(e) => {
                    warn!("Retry after challenge failed for {}: {}", url, e);
                    return;
                }
            }
            if auth::is_challenge_page(&body) {
                warn!("Still challenged after recovery for {}", url);
                return;
            }
        }

        let extracted = extract::extract(&body, &final_url);
        merge_extracted(paper, &extracted);
        if !paper.full_text.is_empty() {
            paper.source = Source::Proxy;
        }

        // Thin HTML text: look for a PDF link on the page and prefer its
        // extraction when it yields more.
        if paper.full_text.len() < MIN_HTML_TEXT_LEN {
            if let Some(pdf_link) = find_pdf_link(&body, &final_url) {
                info!("HTML text is thin; trying PDF at {}", pdf_link);
                let Some(session) = self.session.as_ref() else {
                    return;
                };
                let proxied_pdf = session.proxied(&pdf_link);
                self.limiter.wait().await;
                let Some(session) = self.session.as_ref() else {
                    return;
                };
                match fetch_pdf_bytes(session.client(), &proxied_pdf).await {
                    Some(bytes) => {
                        let stem = pdf_stem(paper);
                        if self.adopt_pdf(paper, &bytes, &stem) {
                            paper.source = Source::Proxy;
                        }
                    }
                    None => debug!("PDF link at {} was not usable", pdf_link),
                }
            }
        }
    }

    async fn ensure_session(&mut self) -> Result<(), AuthError> {
        if self.session.is_none() {
            self.session = Some(SessionManager::new(
                &self.config.proxy_base,
                &self.config.cookie_path,
            )?);
        }
        if let Some(session) = self.session.as_mut() {
            session.login(false).await?;
        }
        Ok(())
    }

    /// Extract text from PDF bytes into the paper and save the file. Returns
    /// true when the PDF contributed more text than the paper already had.
    fn adopt_pdf(&self, paper: &mut Paper, bytes: &[u8], stem: &str) -> bool {
        let text = match pdf::extract_from_bytes(bytes) {
            Ok(text) => text,
            Err(e) => {
                warn!("PDF extraction failed: {}", e);
                return false;
            }
        };
        if text.len() <= paper.full_text.len() {
            return false;
        }
        if paper.figures.is_empty() {
            paper.figures = pdf::extract_figures(&text);
        }
        paper.full_text = text;
        paper.pdf_path = save_pdf(&self.config.output_dir, stem, bytes);
        true
    }

    /// Paper metadata without full-text retrieval: cache first, then the OA
    /// probe, with Semantic Scholar filling the abstract.
    pub async fn get_metadata(&mut self, doi: &str) -> Paper {
        if let Some(hit) = self.cache.load(doi) {
            return hit;
        }
        let mut paper = Paper::new(doi, String::new());
        self.limiter.wait().await;
        match self.unpaywall.check_oa(doi).await {
            Ok(oa) => {
                seed_str(&mut paper.title, &oa.title);
                seed_str(&mut paper.journal, &oa.journal);
                seed_vec(&mut paper.authors, &oa.authors);
                paper.year = oa.year;
            }
            Err(e) => warn!("Open-access probe failed for {}: {}", doi, e),
        }
        if paper.abstract_text.is_empty() {
            self.limiter.wait().await;
            match self.scholar.get_by_doi(doi).await {
                Ok(Some(hit)) => {
                    seed_str(&mut paper.title, &hit.title);
                    if let Some(abs) = &hit.abstract_text {
                        seed_str(&mut paper.abstract_text, abs);
                    }
                    seed_str(&mut paper.journal, &hit.journal);
                    seed_vec(&mut paper.authors, &hit.authors);
                    if paper.year.is_none() {
                        paper.year = hit.year;
                    }
                    seed_str(&mut paper.url, &hit.url);
                }
                Ok(None) => {}
                Err(e) => warn!("Metadata lookup failed for {}: {}", doi, e),
            }
        }
        paper
    }

    pub async fn search(
        &mut self,
        query: &str,
        limit: u32,
        year_range: Option<&str>,
    ) -> Result<Vec<SearchHit>, crate::sources::SourceError> {
        self.limiter.wait().await;
        self.scholar.search(query, limit, year_range).await
    }

    /// Remove all cached papers, returning how many were deleted.
    pub fn clear_cache(&self) -> usize {
        info!("Clearing paper cache at {}", self.cache.dir().display());
        self.cache.clear()
    }

    /// Force or refresh the interactive proxy login.
    pub async fn proxy_login(&mut self, force: bool) -> Result<(), AuthError> {
        if self.session.is_none() {
            self.session = Some(SessionManager::new(
                &self.config.proxy_base,
                &self.config.cookie_path,
            )?);
        }
        match self.session.as_mut() {
            Some(session) => session.login(force).await,
            None => Err(AuthError::NoProxyConfigured),
        }
    }
}

/// A proxied response body, split on whether the server handed back the PDF
/// itself or an HTML page.
enum ProxiedBody {
    Pdf(Vec<u8>),
    Html(String),
}

fn looks_like_pdf(content_type: &str, bytes: &[u8]) -> bool {
    content_type.to_lowercase().contains("pdf") || bytes.starts_with(b"%PDF")
}

fn content_type_of(resp: &reqwest::Response) -> String {
    resp.headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string()
}

/// Consume a proxied response, returning its final URL and body. PDF bytes
/// must never go through text decoding.
async fn read_proxied_body(resp: reqwest::Response) -> Result<(String, ProxiedBody), reqwest::Error> {
    let final_url = resp.url().to_string();
    let content_type = content_type_of(&resp);
    let bytes = resp.bytes().await?;
    if looks_like_pdf(&content_type, &bytes) {
        Ok((final_url, ProxiedBody::Pdf(bytes.to_vec())))
    } else {
        let body = String::from_utf8_lossy(&bytes).into_owned();
        Ok((final_url, ProxiedBody::Html(body)))
    }
}

fn pdf_stem(paper: &Paper) -> String {
    if paper.doi.is_empty() {
        "download".to_string()
    } else {
        sanitize_doi(&paper.doi)
    }
}

/// GET a URL and return the body only when the response is a PDF.
async fn fetch_pdf_bytes(client: &reqwest::Client, url: &str) -> Option<Vec<u8>> {
    let resp = match client.get(url).send().await {
        Ok(resp) => resp,
        Err(e) => {
            warn!("PDF download failed for {}: {}", url, e);
            return None;
        }
    };
    if !resp.status().is_success() {
        warn!("PDF download for {} returned HTTP {}", url, resp.status());
        return None;
    }
    let content_type = content_type_of(&resp);
    let bytes = match resp.bytes().await {
        Ok(bytes) => bytes.to_vec(),
        Err(e) => {
            warn!("Failed to read PDF body from {}: {}", url, e);
            return None;
        }
    };
    if looks_like_pdf(&content_type, &bytes) {
        Some(bytes)
    } else {
        None
    }
}

fn save_pdf(output_dir: &Path, stem: &str, bytes: &[u8]) -> Option<PathBuf> {
    if let Err(e) = std::fs::create_dir_all(output_dir) {
        warn!("Could not create output dir {}: {}", output_dir.display(), e);
        return None;
    }
    let path = output_dir.join(format!("{}.pdf", stem));
    match std::fs::write(&path, bytes) {
        Ok(()) => {
            info!("Saved PDF to {}", path.display());
            Some(path)
        }
        Err(e) => {
            warn!("Could not save PDF to {}: {}", path.display(), e);
            None
        }
    }
}

/// DOI mapped to a safe file stem.
fn sanitize_doi(doi: &str) -> String {
    doi.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Find a PDF link on an article page: link text or class containing "pdf",
/// or a `.pdf`-suffixed href. Relative hrefs resolve against the page URL.
fn find_pdf_link(html: &str, base_url: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let selector = Selector::parse("a[href]").ok()?;
    for link in doc.select(&selector) {
        let href = link.value().attr("href")?;
        if href.is_empty() {
            continue;
        }
        let text = link.text().collect::<String>().to_lowercase();
        let class = link.value().attr("class").unwrap_or("").to_lowercase();
        let href_lower = href.to_lowercase();
        let path_only = href_lower.split(['?', '#']).next().unwrap_or("");
        if text.contains("pdf") || class.contains("pdf") || path_only.ends_with(".pdf") {
            return resolve_href(base_url, href);
        }
    }
    None
}

fn resolve_href(base_url: &str, href: &str) -> Option<String> {
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }
    let base = Url::parse(base_url).ok()?;
    base.join(href).ok().map(|u| u.to_string())
}

/// Overwrite only empty fields; earlier stages outrank later ones.
fn seed_str(dst: &mut String, src: &str) {
    if dst.is_empty() && !src.is_empty() {
        *dst = src.to_string();
    }
}

fn seed_vec(dst: &mut Vec<String>, src: &[String]) {
    if dst.is_empty() && !src.is_empty() {
        *dst = src.to_vec();
    }
}

fn merge_extracted(paper: &mut Paper, extracted: &Extracted) {
    seed_str(&mut paper.title, &extracted.title);
    seed_str(&mut paper.abstract_text, &extracted.abstract_text);
    seed_str(&mut paper.full_text, &extracted.full_text);
    seed_vec(&mut paper.authors, &extracted.authors);
    if paper.figures.is_empty() {
        paper.figures = extracted.figures.clone();
    }
    if paper.references.is_empty() {
        paper.references = extracted.references.clone();
    }
}
