//! Engine settings.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::catalog::{IndexSource, DEFAULT_BUCKET_API, DEFAULT_CATALOG_TTL};
use crate::fetch::UnpackPolicy;
use crate::transport::DEFAULT_TIMEOUT_SECS;

/// Mirror serving the public resource index.
pub const DEFAULT_INDEX_URL: &str = "http://whoisbigger.com/polyglot/";

/// Configuration for an [`Engine`](crate::Engine).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Mirror base URL, or bucket name for [`IndexSource::Bucket`].
    index_url: String,

    /// Wire format of the index.
    source: IndexSource,

    /// Storage JSON API endpoint for bucket listings.
    bucket_api: String,

    /// Default download directory; resolved from the system when unset.
    download_dir: Option<PathBuf>,

    /// How long a fetched catalog is reused.
    catalog_ttl: Duration,

    /// When archives are expanded after download.
    unpack: UnpackPolicy,

    /// HTTP request timeout.
    timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            index_url: DEFAULT_INDEX_URL.to_string(),
            source: IndexSource::default(),
            bucket_api: DEFAULT_BUCKET_API.to_string(),
            download_dir: None,
            catalog_ttl: DEFAULT_CATALOG_TTL,
            unpack: UnpackPolicy::default(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl EngineConfig {
    /// Create a configuration reading the index at `index_url`.
    pub fn new(index_url: impl Into<String>) -> Self {
        Self {
            index_url: index_url.into(),
            ..Default::default()
        }
    }

    pub fn with_index_url(mut self, url: impl Into<String>) -> Self {
        self.index_url = url.into();
        self
    }

    pub fn with_source(mut self, source: IndexSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_bucket_api(mut self, api: impl Into<String>) -> Self {
        self.bucket_api = api.into();
        self
    }

    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = Some(dir.into());
        self
    }

    pub fn with_catalog_ttl(mut self, ttl: Duration) -> Self {
        self.catalog_ttl = ttl;
        self
    }

    pub fn with_unpack(mut self, unpack: UnpackPolicy) -> Self {
        self.unpack = unpack;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn index_url(&self) -> &str {
        &self.index_url
    }

    pub fn source(&self) -> IndexSource {
        self.source
    }

    pub fn bucket_api(&self) -> &str {
        &self.bucket_api
    }

    pub fn download_dir(&self) -> Option<&Path> {
        self.download_dir.as_deref()
    }

    pub fn catalog_ttl(&self) -> Duration {
        self.catalog_ttl
    }

    pub fn unpack(&self) -> UnpackPolicy {
        self.unpack
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.index_url(), DEFAULT_INDEX_URL);
        assert_eq!(config.source(), IndexSource::Mirror);
        assert_eq!(config.catalog_ttl(), Duration::from_secs(3600));
        assert_eq!(config.unpack(), UnpackPolicy::Always);
        assert_eq!(config.timeout(), Duration::from_secs(60));
        assert!(config.download_dir().is_none());
    }

    #[test]
    fn test_builder_pattern() {
        let config = EngineConfig::new("polyglot-models")
            .with_source(IndexSource::Bucket)
            .with_bucket_api("http://api.test")
            .with_download_dir("/srv/polydata")
            .with_catalog_ttl(Duration::from_secs(5))
            .with_unpack(UnpackPolicy::IfPreviouslyExpanded)
            .with_timeout(Duration::from_secs(10));

        assert_eq!(config.index_url(), "polyglot-models");
        assert_eq!(config.source(), IndexSource::Bucket);
        assert_eq!(config.bucket_api(), "http://api.test");
        assert_eq!(config.download_dir(), Some(Path::new("/srv/polydata")));
        assert_eq!(config.catalog_ttl(), Duration::from_secs(5));
        assert_eq!(config.unpack(), UnpackPolicy::IfPreviouslyExpanded);
        assert_eq!(config.timeout(), Duration::from_secs(10));
    }
}
