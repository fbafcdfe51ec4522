use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Fetcher configuration, persisted as JSON under the base directory with
/// environment-variable overrides on top.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Institutional access-proxy base, e.g.
    /// `https://eproxy.example.edu/login?url=` (EZproxy style) or
    /// `https://webvpn.example.edu` (path-rewriting style). Empty disables
    /// the authenticated-proxy stage.
    pub proxy_base: String,
    /// Contact email, required by Unpaywall's and NCBI's terms.
    pub email: String,
    pub output_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub cookie_path: PathBuf,
    /// Randomized per-request delay bounds in seconds.
    pub request_delay_min: f64,
    pub request_delay_max: f64,
    pub elsevier_api_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        let base = base_dir();
        Self {
            proxy_base: String::new(),
            email: String::new(),
            output_dir: base.join("papers"),
            cache_dir: base.join("cache"),
            cookie_path: base.join("cookies.json"),
            request_delay_min: 2.0,
            request_delay_max: 5.0,
            elsevier_api_key: None,
        }
    }
}

impl Config {
    /// Load from `<base>/config.json`, falling back to defaults on a missing
    /// or malformed file, then apply environment overrides.
    pub fn load() -> Self {
        let path = base_dir().join("config.json");
        let mut config = match std::fs::read_to_string(&path) {
            Ok(data) => serde_json::from_str(&data).unwrap_or_else(|e| {
                tracing::warn!(
                    "Failed to parse config {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }),
            Err(_) => Self::default(),
        };
        config.apply_env();
        config
    }

    fn apply_env(&mut self) {
        if let Ok(email) = std::env::var("PAPER_FETCHER_EMAIL") {
            self.email = email;
        }
        if let Ok(base) = std::env::var("PAPER_FETCHER_PROXY_BASE") {
            self.proxy_base = base;
        }
        if let Ok(key) = std::env::var("ELSEVIER_API_KEY") {
            self.elsevier_api_key = Some(key);
        }
    }

    /// Create the output/cache directories and the cookie file's parent.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.output_dir)?;
        std::fs::create_dir_all(&self.cache_dir)?;
        if let Some(parent) = self.cookie_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Contact email with a placeholder fallback for providers that require
    /// one unconditionally.
    pub fn email_or_default(&self) -> String {
        if self.email.is_empty() {
            "paper-fetcher@example.com".to_string()
        } else {
            self.email.clone()
        }
    }
}

/// Base directory: `$PAPER_FETCHER_DATA_DIR`, else `~/.paper-fetcher`.
fn base_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("PAPER_FETCHER_DATA_DIR") {
        return PathBuf::from(dir);
    }
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".paper-fetcher")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.request_delay_min, 2.0);
        assert_eq!(config.request_delay_max, 5.0);
        assert!(config.proxy_base.is_empty());
        assert!(config.cookie_path.ends_with("cookies.json"));
    }

    #[test]
    fn test_email_fallback() {
        let mut config = Config::default();
        assert_eq!(config.email_or_default(), "paper-fetcher@example.com");
        config.email = "me@example.org".into();
        assert_eq!(config.email_or_default(), "me@example.org");
    }

    #[test]
    fn test_config_json_roundtrip() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.cache_dir, config.cache_dir);
        assert_eq!(back.request_delay_max, config.request_delay_max);
    }
}
