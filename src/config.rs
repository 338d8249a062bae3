//! Client configuration.

use crate::error::{Result, TryOnError};
use crate::types::GenerationParams;
use std::time::Duration;

/// Environment variable consulted when no base endpoint is given.
pub const BASE_URL_ENV: &str = "TRYON_API_URL";
/// Environment variable holding comma-separated fallback endpoints.
pub const FALLBACK_URLS_ENV: &str = "TRYON_FALLBACK_URLS";

/// Which payload convention the backend speaks.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ProtocolVariant {
    /// Images travel inline as base64 data URLs; the stream is keyed by the
    /// event id returned at submit time.
    #[default]
    InlineData,
    /// Images are uploaded first and referenced by backend path, followed by
    /// fixed generation parameters; the stream is keyed by the session hash.
    UploadReference(GenerationParams),
}

impl std::fmt::Display for ProtocolVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InlineData => write!(f, "inline-data"),
            Self::UploadReference(_) => write!(f, "upload-reference"),
        }
    }
}

/// Immutable configuration shared by every job a client runs.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    base_url: String,
    fallback_urls: Vec<String>,
    variant: ProtocolVariant,
    connect_timeout: Duration,
    io_timeout: Duration,
    fn_index: Option<u32>,
    api_name: Option<String>,
    user_agent: String,
}

impl ClientConfig {
    /// Creates a new [`ClientConfigBuilder`].
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// Primary endpoint, without trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fallback endpoints in the order they should be tried.
    pub fn fallback_urls(&self) -> &[String] {
        &self.fallback_urls
    }

    /// Primary endpoint followed by the fallbacks.
    pub fn endpoints(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.base_url.as_str()).chain(self.fallback_urls.iter().map(String::as_str))
    }

    /// Protocol variant.
    pub fn variant(&self) -> &ProtocolVariant {
        &self.variant
    }

    /// Connect timeout.
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Read timeout applied to every request.
    pub fn io_timeout(&self) -> Duration {
        self.io_timeout
    }

    /// Backend function index, if configured.
    pub fn fn_index(&self) -> Option<u32> {
        self.fn_index
    }

    /// Backend endpoint name, if configured.
    pub fn api_name(&self) -> Option<&str> {
        self.api_name.as_deref()
    }

    /// User agent sent with every request.
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Clone)]
pub struct ClientConfigBuilder {
    base_url: Option<String>,
    fallback_urls: Option<Vec<String>>,
    variant: ProtocolVariant,
    connect_timeout: Duration,
    io_timeout: Duration,
    fn_index: Option<u32>,
    api_name: Option<String>,
    user_agent: String,
}

impl Default for ClientConfigBuilder {
    fn default() -> Self {
        Self {
            base_url: None,
            fallback_urls: None,
            variant: ProtocolVariant::default(),
            connect_timeout: Duration::from_secs(120),
            io_timeout: Duration::from_secs(600), // backend inference can take several minutes
            fn_index: None,
            api_name: None,
            user_agent: concat!("tryon/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ClientConfigBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base endpoint. Falls back to `TRYON_API_URL`.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the fallback endpoints. Falls back to `TRYON_FALLBACK_URLS`.
    pub fn fallback_urls<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fallback_urls = Some(urls.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the protocol variant.
    pub fn variant(mut self, variant: ProtocolVariant) -> Self {
        self.variant = variant;
        self
    }

    /// Sets the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the read timeout.
    pub fn io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Sets the backend function index included in submissions.
    pub fn fn_index(mut self, index: u32) -> Self {
        self.fn_index = Some(index);
        self
    }

    /// Sets the backend endpoint name included in submissions.
    pub fn api_name(mut self, name: impl Into<String>) -> Self {
        self.api_name = Some(name.into());
        self
    }

    /// Sets the user agent.
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }

    /// Builds the configuration, resolving endpoints from the environment
    /// where they were not set explicitly.
    pub fn build(self) -> Result<ClientConfig> {
        let base_url = self
            .base_url
            .or_else(|| std::env::var(BASE_URL_ENV).ok())
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| {
                TryOnError::Configuration(format!(
                    "{BASE_URL_ENV} not set and no base URL provided"
                ))
            })?;
        let base_url = normalize_url(&base_url)?;

        let fallback_urls = match self.fallback_urls {
            Some(urls) => urls,
            None => std::env::var(FALLBACK_URLS_ENV)
                .map(|raw| raw.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_default(),
        };
        let fallback_urls = fallback_urls
            .iter()
            .filter(|url| !url.is_empty())
            .map(|url| normalize_url(url))
            .collect::<Result<Vec<_>>>()?;

        if self.connect_timeout.is_zero() || self.io_timeout.is_zero() {
            return Err(TryOnError::Configuration("timeouts must be non-zero".into()));
        }

        Ok(ClientConfig {
            base_url,
            fallback_urls,
            variant: self.variant,
            connect_timeout: self.connect_timeout,
            io_timeout: self.io_timeout,
            fn_index: self.fn_index,
            api_name: self.api_name,
            user_agent: self.user_agent,
        })
    }
}

/// Validates an endpoint URL and strips trailing slashes.
fn normalize_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let url = reqwest::Url::parse(trimmed)
        .map_err(|e| TryOnError::Configuration(format!("invalid URL {trimmed:?}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(TryOnError::Configuration(format!(
            "unsupported URL scheme {:?}",
            url.scheme()
        )));
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_with_explicit_url() {
        let config = ClientConfig::builder()
            .base_url("https://abc.gradio.live/")
            .fallback_urls(Vec::<String>::new())
            .build()
            .unwrap();
        assert_eq!(config.base_url(), "https://abc.gradio.live");
        assert_eq!(config.variant(), &ProtocolVariant::InlineData);
        assert_eq!(config.connect_timeout(), Duration::from_secs(120));
        assert_eq!(config.io_timeout(), Duration::from_secs(600));
    }

    #[test]
    fn test_builder_missing_url() {
        std::env::remove_var(BASE_URL_ENV);

        let err = ClientConfig::builder().build().unwrap_err();
        assert!(matches!(err, TryOnError::Configuration(_)));
    }

    #[test]
    fn test_builder_rejects_invalid_url() {
        let err = ClientConfig::builder().base_url("not a url").build().unwrap_err();
        assert!(matches!(err, TryOnError::Configuration(_)));

        let err = ClientConfig::builder()
            .base_url("ftp://example.com")
            .build()
            .unwrap_err();
        assert!(matches!(err, TryOnError::Configuration(_)));
    }

    #[test]
    fn test_builder_rejects_zero_timeout() {
        let err = ClientConfig::builder()
            .base_url("https://abc.gradio.live")
            .io_timeout(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(matches!(err, TryOnError::Configuration(_)));
    }

    #[test]
    fn test_endpoints_order() {
        let config = ClientConfig::builder()
            .base_url("https://primary.example")
            .fallback_urls(["https://fallback1.example/", "", "https://fallback2.example"])
            .build()
            .unwrap();
        let endpoints: Vec<_> = config.endpoints().collect();
        assert_eq!(
            endpoints,
            vec![
                "https://primary.example",
                "https://fallback1.example",
                "https://fallback2.example"
            ]
        );
    }

    #[test]
    fn test_builder_custom_settings() {
        let config = ClientConfig::builder()
            .base_url("http://localhost:7860")
            .fallback_urls(Vec::<String>::new())
            .variant(ProtocolVariant::UploadReference(GenerationParams::default()))
            .connect_timeout(Duration::from_secs(5))
            .io_timeout(Duration::from_secs(30))
            .fn_index(2)
            .api_name("/tryon")
            .build()
            .unwrap();
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.io_timeout(), Duration::from_secs(30));
        assert_eq!(config.fn_index(), Some(2));
        assert_eq!(config.api_name(), Some("/tryon"));
        assert_eq!(config.variant().to_string(), "upload-reference");
    }
}
