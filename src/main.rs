use std::sync::Arc;
use rmcp::{
    handler::server::tool::ToolRouter, handler::server::wrapper::Parameters,
    model::*, tool, tool_handler, tool_router,
    transport::stdio, ErrorData as McpError, ServerHandler, ServiceExt,
};
use schemars::JsonSchema;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;

mod auth;
mod cache;
mod config;
mod extract;
mod fetcher;
mod ident;
mod paper;
mod sources;

use config::Config;
use fetcher::PaperFetcher;

// ── Parameter structs ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize, JsonSchema)]
struct FetchPaperParams {
    #[schemars(description = "DOI, PMID, or article URL to fetch")]
    identifier: String,
    #[schemars(description = "Output format: 'markdown' (default), 'json', or 'text'")]
    format: Option<String>,
    #[schemars(description = "Skip the local result cache and fetch fresh")]
    no_cache: Option<bool>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SearchPapersParams {
    #[schemars(description = "Search query string")]
    query: String,
    #[schemars(description = "Maximum results to return (default 10, max 100)")]
    limit: Option<u32>,
    #[schemars(description = "Publication year range, e.g. '2019-2023' or '2020'")]
    year_range: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct GetPaperMetadataParams {
    #[schemars(description = "DOI of the paper")]
    doi: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ProxyLoginParams {
    #[schemars(description = "Discard any stored session and log in again")]
    force: Option<bool>,
}

// ── Server ──────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct PaperFetcherServer {
    tool_router: ToolRouter<Self>,
    fetcher: Arc<Mutex<PaperFetcher>>,
}

#[tool_router]
impl PaperFetcherServer {
    pub fn create() -> anyhow::Result<Self> {
        let config = Config::load();
        config.ensure_dirs()?;
        tracing::info!(
            "Initialized fetcher, cache_dir={}, proxy_configured={}",
            config.cache_dir.display(),
            !config.proxy_base.is_empty()
        );
        Ok(Self {
            tool_router: Self::tool_router(),
            fetcher: Arc::new(Mutex::new(PaperFetcher::new(config))),
        })
    }

    #[tool(description = "Fetch the full text of a paper by DOI, PMID, or URL. \
        Tries open-access copies first, then publisher APIs, then the \
        institutional proxy.")]
    async fn fetch_paper(
        &self,
        Parameters(params): Parameters<FetchPaperParams>,
    ) -> Result<CallToolResult, McpError> {
        let use_cache = !params.no_cache.unwrap_or(false);
        let mut fetcher = self.fetcher.lock().await;
        let paper = fetcher.fetch(&params.identifier, use_cache).await;

        let rendered = match params.format.as_deref().unwrap_or("markdown") {
            "json" => paper
                .to_json()
                .map_err(|e| McpError::internal_error(format!("{}", e), None))?,
            "text" => paper.to_text(),
            _ => paper.to_markdown(),
        };
        Ok(CallToolResult::success(vec![Content::text(rendered)]))
    }

    #[tool(description = "Search for papers by topic, title, or author. Returns \
        metadata including DOIs usable with fetch_paper.")]
    async fn search_papers(
        &self,
        Parameters(params): Parameters<SearchPapersParams>,
    ) -> Result<CallToolResult, McpError> {
        let limit = params.limit.unwrap_or(10).min(100);
        let mut fetcher = self.fetcher.lock().await;
        let hits = fetcher
            .search(&params.query, limit, params.year_range.as_deref())
            .await
            .map_err(|e| McpError::internal_error(format!("Search failed: {}", e), None))?;

        let json = serde_json::to_string_pretty(&hits)
            .map_err(|e| McpError::internal_error(format!("{}", e), None))?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    #[tool(description = "Get metadata (title, authors, journal, year, abstract) \
        for a DOI without fetching full text")]
    async fn get_paper_metadata(
        &self,
        Parameters(params): Parameters<GetPaperMetadataParams>,
    ) -> Result<CallToolResult, McpError> {
        let mut fetcher = self.fetcher.lock().await;
        let paper = fetcher.get_metadata(&params.doi).await;
        let json = paper
            .to_json()
            .map_err(|e| McpError::internal_error(format!("{}", e), None))?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    #[tool(description = "Clear the local cache of fetched papers")]
    async fn clear_cache(&self) -> Result<CallToolResult, McpError> {
        let fetcher = self.fetcher.lock().await;
        let removed = fetcher.clear_cache();
        Ok(CallToolResult::success(vec![Content::text(format!(
            "Removed {} cached papers",
            removed
        ))]))
    }

    #[tool(description = "Log in to the institutional access proxy interactively. \
        Opens a browser window for the user to authenticate.")]
    async fn proxy_login(
        &self,
        Parameters(params): Parameters<ProxyLoginParams>,
    ) -> Result<CallToolResult, McpError> {
        let mut fetcher = self.fetcher.lock().await;
        match fetcher.proxy_login(params.force.unwrap_or(false)).await {
            Ok(()) => Ok(CallToolResult::success(vec![Content::text(
                "Proxy session is ready".to_string(),
            )])),
            Err(e) => Err(McpError::internal_error(format!("Login failed: {}", e), None)),
        }
    }
}

#[tool_handler]
impl ServerHandler for PaperFetcherServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Fetch full-text academic papers by DOI, PMID, or URL. Tries \
                 open-access copies (Unpaywall, arXiv) first, then the Elsevier \
                 API when a key is configured, then resolves the DOI and fetches \
                 through the institutional proxy. Use proxy_login to establish \
                 the proxy session before fetching paywalled content."
                    .into(),
            ),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    tracing::info!("Starting paper-fetcher MCP server");

    let server = PaperFetcherServer::create()?;
    let service = server.serve(stdio()).await?;
    service.waiting().await?;

    Ok(())
}
