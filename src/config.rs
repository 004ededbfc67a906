use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    metadata::fetch::{ACCEPT_LANGUAGE_FALLBACK, USER_AGENT_FALLBACK},
    resolve::{Resolver, ShortLinkConfig},
    storage::{BackendLocal, StorageManager},
};

const CONFIG_FILE: &str = "config.yaml";

/// Overrides `log_read_token` so the secret can stay out of the file.
pub const LOG_READ_TOKEN_ENV: &str = "LINKPEEK_LOG_READ_TOKEN";
pub const BASE_PATH_ENV: &str = "LINKPEEK_BASE_PATH";

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 5;
const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Secret for `/_logs`. The endpoint answers 401 while unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_read_token: Option<String>,

    /// Timeout for the outbound fetch of the target page
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Target bodies are cut at this size before parsing
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Sent to the target when the visitor has no User-Agent
    #[serde(default = "default_fallback_user_agent")]
    pub fallback_user_agent: String,

    #[serde(default = "default_fallback_accept_language")]
    pub fallback_accept_language: String,

    /// e.g. `socks5://127.0.0.1:1080`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,

    /// Serve preview pages to search-engine crawlers as well as unfurl bots.
    #[serde(default = "default_true")]
    pub preview_search_engines: bool,

    #[serde(default = "default_true")]
    pub log_requests: bool,

    /// Extra short links, tried after the built-in `/p/` and `/reel/` ones.
    #[serde(default)]
    pub short_links: Vec<ShortLinkConfig>,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

fn default_bind_addr() -> String {
    DEFAULT_BIND_ADDR.to_string()
}

fn default_fetch_timeout_secs() -> u64 {
    DEFAULT_FETCH_TIMEOUT_SECS
}

fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

fn default_fallback_user_agent() -> String {
    USER_AGENT_FALLBACK.to_string()
}

fn default_fallback_accept_language() -> String {
    ACCEPT_LANGUAGE_FALLBACK.to_string()
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            log_read_token: None,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            fallback_user_agent: default_fallback_user_agent(),
            fallback_accept_language: default_fallback_accept_language(),
            proxy: None,
            preview_search_engines: true,
            log_requests: true,
            short_links: Vec::new(),
            base_path: PathBuf::new(),
        }
    }
}

/// `$LINKPEEK_BASE_PATH`, or `~/.local/share/linkpeek`.
pub fn base_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(BASE_PATH_ENV) {
        return Ok(PathBuf::from(path));
    }

    let home = homedir::my_home()
        .context("could not determine home directory")?
        .context("home directory path is empty")?;
    Ok(home.join(".local/share/linkpeek"))
}

impl Config {
    fn validate(&mut self) -> Result<()> {
        if self.fetch_timeout_secs == 0 {
            bail!("fetch_timeout_secs must be greater than 0");
        }

        if self.max_body_bytes == 0 {
            bail!("max_body_bytes must be greater than 0");
        }

        if self.fallback_user_agent.trim().is_empty() {
            self.fallback_user_agent = default_fallback_user_agent();
        }

        if self.fallback_accept_language.trim().is_empty() {
            self.fallback_accept_language = default_fallback_accept_language();
        }

        if let Some(token) = &self.log_read_token {
            if token.trim().is_empty() {
                self.log_read_token = None;
            }
        }

        for (idx, rule) in self.short_links.iter().enumerate() {
            let idx = idx + 1;
            if rule.template.is_empty() {
                bail!("short link #{idx} has an empty template");
            }
        }

        // compiles every configured pattern
        Resolver::from_config(&self.short_links).context("malformed short link pattern")?;

        Ok(())
    }

    /// Reads `config.yaml` under `base_path`, writing defaults first if missing.
    pub fn load_with(base_path: &Path) -> Result<Self> {
        let store = BackendLocal::new(base_path)
            .with_context(|| format!("couldn't create {}", base_path.display()))?;

        if !store.exists(CONFIG_FILE) {
            store.write(
                CONFIG_FILE,
                serde_yml::to_string(&Self::default())?.as_bytes(),
            )?;
        }

        let config_str =
            String::from_utf8(store.read(CONFIG_FILE)?).context("config file is not valid utf8")?;
        let mut config: Self = serde_yml::from_str(&config_str).context("config is malformed")?;

        config.base_path = base_path.to_path_buf();

        if let Ok(token) = std::env::var(LOG_READ_TOKEN_ENV) {
            config.log_read_token = Some(token);
        }

        config.validate()?;

        Ok(config)
    }

    pub fn load() -> Result<Self> {
        Self::load_with(&base_path()?)
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Where request log entries are persisted.
    pub fn logs_dir(&self) -> PathBuf {
        self.base_path.join("logs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_written() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::load_with(tmp.path()).unwrap();

        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.fetch_timeout_secs, 5);
        assert_eq!(config.max_body_bytes, 2 * 1024 * 1024);
        assert_eq!(config.fallback_user_agent, "facebookexternalhit/1.1");
        assert_eq!(config.fallback_accept_language, "en");
        assert!(config.preview_search_engines);
        assert!(config.log_requests);
        assert!(config.short_links.is_empty());
        assert!(tmp.path().join("config.yaml").is_file());
        assert_eq!(config.logs_dir(), tmp.path().join("logs"));
    }

    #[test]
    fn test_partial_file_gets_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("config.yaml"),
            "fetch_timeout_secs: 3\nshort_links:\n  - pattern: /tv/([A-Za-z0-9_-]+)\n    template: https://www.instagram.com/tv/$1/\n",
        )
        .unwrap();

        let config = Config::load_with(tmp.path()).unwrap();
        assert_eq!(config.fetch_timeout_secs, 3);
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.short_links.len(), 1);
        assert_eq!(config.short_links[0].template, "https://www.instagram.com/tv/$1/");
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("config.yaml"), "fetch_timeout_secs: 0\n").unwrap();
        assert!(Config::load_with(tmp.path()).is_err());
    }

    #[test]
    fn test_rejects_bad_short_link() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("config.yaml"),
            "short_links:\n  - pattern: \"/x/(\"\n    template: $1\n",
        )
        .unwrap();
        assert!(Config::load_with(tmp.path()).is_err());
    }

    #[test]
    fn test_blank_token_is_unset() {
        let mut config = Config {
            log_read_token: Some("  ".into()),
            ..Default::default()
        };
        config.validate().unwrap();
        assert_eq!(config.log_read_token, None);
    }

    #[test]
    fn test_malformed_yaml() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("config.yaml"), "bind_addr: [unclosed\n").unwrap();
        assert!(Config::load_with(tmp.path()).is_err());
    }
}
