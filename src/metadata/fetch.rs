use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use reqwest::header::{ACCEPT_LANGUAGE, CONTENT_TYPE, USER_AGENT};

use crate::config::Config;
use crate::metadata::types::{FetchError, PageMetadata};

/// Many sites serve their crawler-oriented markup to this agent.
pub const USER_AGENT_FALLBACK: &str = "facebookexternalhit/1.1";
pub const ACCEPT_LANGUAGE_FALLBACK: &str = "en";

const MAX_REDIRECTS: usize = 10;

/// Headers of the incoming request that are passed on to the target.
#[derive(Debug, Clone, Default)]
pub struct ForwardedHeaders {
    pub user_agent: Option<String>,
    pub accept_language: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub timeout: Duration,
    pub max_body_bytes: usize,
    pub user_agent: String,
    pub accept_language: String,
    pub proxy: Option<String>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_body_bytes: 2 * 1024 * 1024,
            user_agent: USER_AGENT_FALLBACK.to_string(),
            accept_language: ACCEPT_LANGUAGE_FALLBACK.to_string(),
            proxy: None,
        }
    }
}

impl From<&Config> for FetchOptions {
    fn from(config: &Config) -> Self {
        Self {
            timeout: Duration::from_secs(config.fetch_timeout_secs),
            max_body_bytes: config.max_body_bytes,
            user_agent: config.fallback_user_agent.clone(),
            accept_language: config.fallback_accept_language.clone(),
            proxy: config.proxy.clone(),
        }
    }
}

/// Only text bodies are worth parsing. A missing header is given the benefit
/// of the doubt.
fn is_textual(content_type: Option<&str>) -> bool {
    let Some(content_type) = content_type else {
        return true;
    };
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    mime.is_empty() || mime.starts_with("text/") || mime == "application/xhtml+xml"
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

pub type PageFuture<'a> = Pin<Box<dyn Future<Output = Result<String, FetchError>> + Send + 'a>>;

/// Where destination page bodies come from.
pub trait PageSource: Send + Sync {
    fn fetch_html<'a>(&'a self, url: &'a str, forwarded: &'a ForwardedHeaders) -> PageFuture<'a>;
}

/// Fetches pages over HTTP with one pooled client.
pub struct HttpSource {
    client: reqwest::Client,
    opts: FetchOptions,
}

impl HttpSource {
    pub fn new(opts: FetchOptions) -> Result<Self, FetchError> {
        let mut client = reqwest::Client::builder()
            .timeout(opts.timeout)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .pool_idle_timeout(Duration::from_secs(10));

        if let Some(proxy) = &opts.proxy {
            log::debug!("using proxy {proxy:#?}");
            client = client.proxy(reqwest::Proxy::all(proxy)?);
        }

        Ok(Self {
            client: client.build()?,
            opts,
        })
    }

    /// GETs `url` and returns its body as text.
    ///
    /// Non-2xx answers are still returned if they are textual.
    async fn get(&self, url: &str, forwarded: &ForwardedHeaders) -> Result<String, FetchError> {
        let user_agent = non_empty(&forwarded.user_agent).unwrap_or(&self.opts.user_agent);
        let accept_language =
            non_empty(&forwarded.accept_language).unwrap_or(&self.opts.accept_language);

        log::debug!("{url}: requesting");

        let mut resp = self
            .client
            .get(url)
            .header(USER_AGENT, user_agent)
            .header(ACCEPT_LANGUAGE, accept_language)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            log::debug!("{url}: {:?}", status.to_string());
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if !is_textual(content_type.as_deref()) {
            return Err(FetchError::NotText(content_type.unwrap_or_default()));
        }

        // read chunk by chunk so a huge page never gets fully buffered
        let mut body: Vec<u8> = Vec::new();
        while let Some(chunk) = resp.chunk().await? {
            let room = self.opts.max_body_bytes.saturating_sub(body.len());
            body.extend_from_slice(&chunk[..chunk.len().min(room)]);
            if body.len() >= self.opts.max_body_bytes {
                log::debug!("{url}: body truncated at {} bytes", body.len());
                break;
            }
        }

        Ok(String::from_utf8_lossy(&body).to_string())
    }
}

impl PageSource for HttpSource {
    fn fetch_html<'a>(&'a self, url: &'a str, forwarded: &'a ForwardedHeaders) -> PageFuture<'a> {
        Box::pin(self.get(url, forwarded))
    }
}

/// Turns destination pages into [`PageMetadata`]. Cheap to clone.
#[derive(Clone)]
pub struct Extractor {
    source: Arc<dyn PageSource>,
}

impl Extractor {
    pub fn new(source: Arc<dyn PageSource>) -> Self {
        Self { source }
    }

    pub fn http(opts: FetchOptions) -> Result<Self, FetchError> {
        Ok(Self::new(Arc::new(HttpSource::new(opts)?)))
    }

    /// Fetches `target` and derives its preview metadata.
    pub async fn extract(
        &self,
        target: &str,
        forwarded: &ForwardedHeaders,
    ) -> Result<PageMetadata, FetchError> {
        let html = self.source.fetch_html(target, forwarded).await?;
        Ok(PageMetadata::from_html(&html, target))
    }
}
