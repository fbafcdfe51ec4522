pub mod browser;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::Jar;
use reqwest::{Client, Url};
use thiserror::Error;
use tracing::{info, warn};

use self::browser::{
    wait_for_clearance, wait_for_login, BrowserError, BrowserProbe, ChromeProbe, ClearanceOutcome,
    LoginOutcome, StoredCookie, CHALLENGE_INDICATORS,
};

const LOGIN_MAX_WAIT: Duration = Duration::from_secs(600);
const LOGIN_POLL_INTERVAL: Duration = Duration::from_secs(3);
const CLEARANCE_MAX_WAIT: Duration = Duration::from_secs(120);
const CLEARANCE_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// URL used to check whether the proxy session is still authenticated.
const VALIDATION_TARGET: &str = "https://www.nature.com";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no proxy base URL configured")]
    NoProxyConfigured,
    #[error("invalid proxy base URL: {0}")]
    BadProxyBase(String),
    #[error(transparent)]
    Browser(#[from] BrowserError),
    #[error("login not completed within {0:?}")]
    LoginTimeout(Duration),
    #[error("browser closed before login completed")]
    LoginAborted,
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("browser task failed: {0}")]
    Task(String),
}

/// How the institutional proxy rewrites target URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyFlavor {
    /// Target URL appended to a query parameter, e.g.
    /// `https://proxy.example.edu/login?url=<target>`.
    EzProxy,
    /// Target URL appended to the proxy path, e.g.
    /// `https://webvpn.example.edu/<target>`.
    WebVpn,
}

impl ProxyFlavor {
    pub fn detect(proxy_base: &str) -> Self {
        if proxy_base.contains("url=") {
            ProxyFlavor::EzProxy
        } else {
            ProxyFlavor::WebVpn
        }
    }
}

/// Map a publisher URL through the proxy.
pub fn proxied_url(proxy_base: &str, target: &str) -> String {
    if let Ok(host) = host_of(proxy_base) {
        if target.contains(&host) {
            // Already proxied.
            return target.to_string();
        }
    }
    match ProxyFlavor::detect(proxy_base) {
        ProxyFlavor::EzProxy => format!("{}{}", proxy_base, target),
        ProxyFlavor::WebVpn => {
            format!("{}/{}", proxy_base.trim_end_matches('/'), target)
        }
    }
}

fn host_of(url: &str) -> Result<String, AuthError> {
    let parsed = Url::parse(url).map_err(|e| AuthError::BadProxyBase(e.to_string()))?;
    parsed
        .host_str()
        .map(|h| h.to_string())
        .ok_or_else(|| AuthError::BadProxyBase(format!("no host in {}", url)))
}

/// True when the body looks like a bot challenge or block page rather than
/// article content. Length is not considered here; a short page is only
/// suspect while waiting for a challenge to clear.
pub fn is_challenge_page(body: &str) -> bool {
    let lower = body.to_lowercase();
    CHALLENGE_INDICATORS.iter().any(|s| lower.contains(s))
}

/// Read stored cookies from disk. Missing or unreadable files yield an empty
/// set rather than an error.
pub fn load_cookies(path: &Path) -> Vec<StoredCookie> {
    match std::fs::read_to_string(path) {
        Ok(raw) => match serde_json::from_str(&raw) {
            Ok(cookies) => cookies,
            Err(e) => {
                warn!("Ignoring malformed cookie file {}: {}", path.display(), e);
                Vec::new()
            }
        },
        Err(_) => Vec::new(),
    }
}

/// Overwrite the cookie file with the given set.
pub fn save_cookies(path: &Path, cookies: &[StoredCookie]) -> Result<(), AuthError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(cookies)?)?;
    Ok(())
}

fn jar_from_cookies(cookies: &[StoredCookie]) -> Arc<Jar> {
    let jar = Jar::default();
    for c in cookies {
        let origin = format!("https://{}/", c.domain.trim_start_matches('.'));
        if let Ok(url) = Url::parse(&origin) {
            let header = format!("{}={}; Domain={}; Path={}", c.name, c.value, c.domain, c.path);
            jar.add_cookie_str(&header, &url);
        }
    }
    Arc::new(jar)
}

/// Owns the authenticated HTTP client for proxied publisher fetches. The
/// cookie jar is rebuilt wholesale whenever a browser login completes.
pub struct SessionManager {
    proxy_base: String,
    cookie_path: PathBuf,
    client: Client,
    validated: bool,
}

impl SessionManager {
    pub fn new(proxy_base: &str, cookie_path: &Path) -> Result<Self, AuthError> {
        if proxy_base.is_empty() {
            return Err(AuthError::NoProxyConfigured);
        }
        let cookies = load_cookies(cookie_path);
        let client = build_client(&cookies)?;
        Ok(Self {
            proxy_base: proxy_base.to_string(),
            cookie_path: cookie_path.to_path_buf(),
            client,
            validated: false,
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn proxied(&self, target: &str) -> String {
        proxied_url(&self.proxy_base, target)
    }

    /// Check the stored session against a known paywalled site. A session is
    /// invalid when the proxy bounces the request back to its login page.
    pub async fn validate(&mut self) -> Result<bool, AuthError> {
        let probe_url = self.proxied(VALIDATION_TARGET);
        let host = host_of(&self.proxy_base)?;
        let resp = match self.client.get(&probe_url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("Session validation request failed: {}", e);
                return Ok(false);
            }
        };
        let final_url = resp.url().to_string().to_lowercase();
        let bounced = final_url.contains(&host) && final_url.contains("login");
        self.validated = !bounced;
        Ok(self.validated)
    }

    /// Ensure an authenticated session, opening an interactive browser login
    /// if the stored cookies are missing or stale. With `force` the stored
    /// session is discarded unconditionally.
    pub async fn login(&mut self, force: bool) -> Result<(), AuthError> {
        if !force {
            if self.validated {
                return Ok(());
            }
            if self.validate().await? {
                info!("Stored proxy session is still valid");
                return Ok(());
            }
        }

        info!("Opening browser for institutional login");
        let start_url = self.proxied(VALIDATION_TARGET);
        let proxy_domain = host_of(&self.proxy_base)?;
        let outcome = tokio::task::spawn_blocking(move || -> Result<LoginOutcome, AuthError> {
            let probe = ChromeProbe::launch(&start_url)?;
            Ok(wait_for_login(
                &probe,
                &proxy_domain,
                LOGIN_MAX_WAIT,
                LOGIN_POLL_INTERVAL,
                std::thread::sleep,
            ))
        })
        .await
        .map_err(|e| AuthError::Task(e.to_string()))??;

        match outcome {
            LoginOutcome::Detected(cookies) => {
                info!("Login detected, storing {} cookies", cookies.len());
                save_cookies(&self.cookie_path, &cookies)?;
                self.client = build_client(&cookies)?;
                self.validated = true;
                Ok(())
            }
            LoginOutcome::TimedOut => Err(AuthError::LoginTimeout(LOGIN_MAX_WAIT)),
            LoginOutcome::LostConnection => Err(AuthError::LoginAborted),
        }
    }

    /// Hand a challenge page to the user in a visible browser and wait for it
    /// to clear. Returns `true` when the page was passed, refreshing the
    /// stored cookies from the cleared session.
    pub async fn recover_challenge(&mut self, url: &str) -> Result<bool, AuthError> {
        info!("Challenge page detected, opening browser for manual clearance");
        let url = url.to_string();
        let result = tokio::task::spawn_blocking(
            move || -> Result<(ClearanceOutcome, Vec<StoredCookie>), AuthError> {
                let probe = ChromeProbe::launch(&url)?;
                let outcome = wait_for_clearance(
                    &probe,
                    CLEARANCE_MAX_WAIT,
                    CLEARANCE_POLL_INTERVAL,
                    std::thread::sleep,
                );
                let cookies = match &outcome {
                    ClearanceOutcome::Cleared => probe.cookies()?,
                    _ => Vec::new(),
                };
                Ok((outcome, cookies))
            },
        )
        .await
        .map_err(|e| AuthError::Task(e.to_string()))??;

        match result {
            (ClearanceOutcome::Cleared, cookies) => {
                save_cookies(&self.cookie_path, &cookies)?;
                self.client = build_client(&cookies)?;
                Ok(true)
            }
            (ClearanceOutcome::TimedOut, _) => {
                warn!("Challenge page not cleared within {:?}", CLEARANCE_MAX_WAIT);
                Ok(false)
            }
            (ClearanceOutcome::LostConnection, _) => {
                warn!("Browser closed during challenge clearance");
                Ok(false)
            }
        }
    }
}

fn build_client(cookies: &[StoredCookie]) -> Result<Client, AuthError> {
    let jar = jar_from_cookies(cookies);
    Ok(Client::builder()
        .user_agent("Mozilla/5.0 (X11; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/115.0")
        .cookie_provider(jar)
        .gzip(true)
        .timeout(Duration::from_secs(60))
        .build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flavor_detection() {
        assert_eq!(
            ProxyFlavor::detect("https://proxy.university.edu/login?url="),
            ProxyFlavor::EzProxy
        );
        assert_eq!(
            ProxyFlavor::detect("https://webvpn.university.edu"),
            ProxyFlavor::WebVpn
        );
    }

    #[test]
    fn test_ezproxy_url_mapping() {
        let base = "https://proxy.university.edu/login?url=";
        assert_eq!(
            proxied_url(base, "https://www.nature.com/articles/s41586-020-1"),
            "https://proxy.university.edu/login?url=https://www.nature.com/articles/s41586-020-1"
        );
    }

    #[test]
    fn test_webvpn_url_mapping() {
        let base = "https://webvpn.university.edu/";
        assert_eq!(
            proxied_url(base, "https://www.nature.com/articles/1"),
            "https://webvpn.university.edu/https://www.nature.com/articles/1"
        );
    }

    #[test]
    fn test_already_proxied_url_passes_through() {
        let base = "https://proxy.university.edu/login?url=";
        let proxied = "https://www-nature-com.proxy.university.edu/articles/1";
        assert_eq!(proxied_url(base, proxied), proxied);
    }

    #[test]
    fn test_challenge_detection() {
        let long_pad = "x".repeat(4096);
        assert!(is_challenge_page(&format!(
            "{} please Verify You Are Human {}",
            long_pad, long_pad
        )));
        assert!(is_challenge_page("<p>Access Denied</p>"));
        assert!(!is_challenge_page(&format!(
            "<html>{} real article text</html>",
            long_pad
        )));
    }

    #[test]
    fn test_short_page_without_indicator_is_not_a_challenge() {
        // Errata and redirect stubs can be tiny; only the indicator scan
        // decides whether to open a browser.
        assert!(!is_challenge_page("<html><body>Erratum: see DOI 10.1/x</body></html>"));
    }

    #[test]
    fn test_cookie_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.json");
        let cookies = vec![StoredCookie {
            name: "ezproxy".into(),
            value: "tok".into(),
            domain: ".proxy.university.edu".into(),
            path: "/".into(),
        }];
        save_cookies(&path, &cookies).unwrap();
        assert_eq!(load_cookies(&path), cookies);

        // Overwrite is wholesale, not a merge.
        save_cookies(&path, &[]).unwrap();
        assert!(load_cookies(&path).is_empty());
    }

    #[test]
    fn test_missing_cookie_file_is_empty() {
        assert!(load_cookies(Path::new("/nonexistent/cookies.json")).is_empty());
    }

    struct ClearedProbe;

    impl BrowserProbe for ClearedProbe {
        fn current_url(&self) -> Result<String, BrowserError> {
            Ok("https://www.nature.com/articles/1".into())
        }
        fn cookies(&self) -> Result<Vec<StoredCookie>, BrowserError> {
            Ok(vec![StoredCookie {
                name: "cf_clearance".into(),
                value: "tok".into(),
                domain: ".nature.com".into(),
                path: "/".into(),
            }])
        }
        fn body(&self) -> Result<String, BrowserError> {
            Ok("y".repeat(4096))
        }
    }

    // Mirrors the harvest in recover_challenge: cookies are read through the
    // trait once the page has cleared.
    #[test]
    fn test_cleared_probe_yields_cookies() {
        let probe = ClearedProbe;
        let outcome = wait_for_clearance(
            &probe,
            Duration::from_secs(120),
            Duration::from_secs(3),
            |_| {},
        );
        let cookies = match &outcome {
            ClearanceOutcome::Cleared => probe.cookies().unwrap(),
            _ => Vec::new(),
        };
        assert_eq!(outcome, ClearanceOutcome::Cleared);
        assert_eq!(cookies[0].name, "cf_clearance");
    }
}
