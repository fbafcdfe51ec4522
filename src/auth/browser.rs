use std::sync::Arc;
use std::time::Duration;

use headless_chrome::{Browser, LaunchOptions, Tab};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Cookie fields we persist between sessions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
}

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("failed to launch browser: {0}")]
    Launch(String),
    #[error("browser probe failed: {0}")]
    Probe(String),
}

/// Substrings that mark a bot-challenge or block page.
pub const CHALLENGE_INDICATORS: &[&str] =
    &["captcha", "cf-challenge", "verify you are human", "access denied"];

/// Pages shorter than this are assumed to still be an interstitial.
pub const MIN_REAL_BODY_LEN: usize = 2048;

/// A minimal view of an interactive browser session. Kept synchronous so the
/// wait loops below can be driven by scripted fakes in tests; the real
/// implementation runs under `spawn_blocking`.
pub trait BrowserProbe {
    fn current_url(&self) -> Result<String, BrowserError>;
    fn cookies(&self) -> Result<Vec<StoredCookie>, BrowserError>;
    fn body(&self) -> Result<String, BrowserError>;
}

#[derive(Debug, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Login detected; carries the session cookies at that moment.
    Detected(Vec<StoredCookie>),
    TimedOut,
    /// Browser window closed or connection to it lost.
    LostConnection,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ClearanceOutcome {
    Cleared,
    TimedOut,
    LostConnection,
}

/// Poll the browser until the user has completed the institutional login.
///
/// Detection: the tab has landed on a proxy-hosted page that is no longer a
/// login form, or the session carries cookies scoped to the proxy domain.
/// The first check happens one interval after launch; the tab may still sit
/// on the entry URL, which for some proxy flavors would pass the URL test
/// before any login happened.
pub fn wait_for_login<P, S>(
    probe: &P,
    proxy_domain: &str,
    max_wait: Duration,
    interval: Duration,
    mut sleep: S,
) -> LoginOutcome
where
    P: BrowserProbe,
    S: FnMut(Duration),
{
    let domain = proxy_domain.to_lowercase();
    let mut elapsed = Duration::ZERO;
    loop {
        if elapsed >= max_wait {
            return LoginOutcome::TimedOut;
        }
        sleep(interval);
        elapsed += interval;

        let url = match probe.current_url() {
            Ok(u) => u.to_lowercase(),
            Err(_) => return LoginOutcome::LostConnection,
        };
        let on_proxy_page = url.contains(&domain) && !url.contains("login");

        let cookies = match probe.cookies() {
            Ok(c) => c,
            Err(_) => return LoginOutcome::LostConnection,
        };
        let has_proxy_cookie = cookies
            .iter()
            .any(|c| c.domain.to_lowercase().contains(&domain));

        if on_proxy_page || has_proxy_cookie {
            return LoginOutcome::Detected(cookies);
        }
    }
}

/// Poll the browser until a challenge page has been passed: no challenge
/// indicator in the body and enough content to be a real page.
pub fn wait_for_clearance<P, S>(
    probe: &P,
    max_wait: Duration,
    interval: Duration,
    mut sleep: S,
) -> ClearanceOutcome
where
    P: BrowserProbe,
    S: FnMut(Duration),
{
    let mut elapsed = Duration::ZERO;
    loop {
        let body = match probe.body() {
            Ok(b) => b,
            Err(_) => return ClearanceOutcome::LostConnection,
        };
        let lower = body.to_lowercase();
        let challenged = CHALLENGE_INDICATORS.iter().any(|s| lower.contains(s));
        if !challenged && body.len() > MIN_REAL_BODY_LEN {
            return ClearanceOutcome::Cleared;
        }

        if elapsed >= max_wait {
            return ClearanceOutcome::TimedOut;
        }
        sleep(interval);
        elapsed += interval;
    }
}

/// Probe backed by a visible Chrome window via the DevTools protocol.
pub struct ChromeProbe {
    // Keeps the browser process alive for the lifetime of the probe.
    _browser: Browser,
    tab: Arc<Tab>,
}

impl ChromeProbe {
    /// Launch a visible browser and navigate to the login entry URL.
    pub fn launch(start_url: &str) -> Result<Self, BrowserError> {
        let options = LaunchOptions::default_builder()
            .headless(false)
            .build()
            .map_err(|e| BrowserError::Launch(e.to_string()))?;
        let browser = Browser::new(options).map_err(|e| BrowserError::Launch(e.to_string()))?;
        let tab = browser
            .new_tab()
            .map_err(|e| BrowserError::Launch(e.to_string()))?;
        tab.navigate_to(start_url)
            .map_err(|e| BrowserError::Probe(e.to_string()))?;
        Ok(Self {
            _browser: browser,
            tab,
        })
    }
}

impl BrowserProbe for ChromeProbe {
    fn current_url(&self) -> Result<String, BrowserError> {
        Ok(self.tab.get_url())
    }

    fn cookies(&self) -> Result<Vec<StoredCookie>, BrowserError> {
        let cookies = self
            .tab
            .get_cookies()
            .map_err(|e| BrowserError::Probe(e.to_string()))?;
        Ok(cookies
            .into_iter()
            .map(|c| StoredCookie {
                name: c.name,
                value: c.value,
                domain: c.domain,
                path: c.path,
            })
            .collect())
    }

    fn body(&self) -> Result<String, BrowserError> {
        self.tab
            .get_content()
            .map_err(|e| BrowserError::Probe(e.to_string()))
    }
}
