//! Remote index loading with a time-to-live cache.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::builder::CatalogBuilder;
use super::languages::LanguageNames;
use super::wire::{bucket_listing_url, mirror_index_url, IndexDocument, DEFAULT_BUCKET_API};
use super::{Catalog, IndexSource};
use crate::error::{SyncError, SyncResult};
use crate::transport::Transport;

/// How long a loaded catalog is served before it is fetched again.
pub const DEFAULT_CATALOG_TTL: Duration = Duration::from_secs(60 * 60);

/// Fetches the remote index and keeps the last good catalog.
///
/// A failed refresh never replaces the catalog already held; callers keep
/// seeing the previous snapshot and get the error back.
pub struct CatalogLoader {
    url: String,
    source: IndexSource,
    bucket_api: String,
    ttl: Duration,
    language_names: Option<Box<dyn LanguageNames + Send + Sync>>,
    catalog: Option<Arc<Catalog>>,
    loaded_at: Option<Instant>,
}

impl CatalogLoader {
    /// Creates a loader for `url`.
    ///
    /// For [`IndexSource::Mirror`] the URL is the mirror base directory; for
    /// [`IndexSource::Bucket`] it is the bucket name.
    pub fn new(url: impl Into<String>, source: IndexSource) -> Self {
        Self {
            url: url.into(),
            source,
            bucket_api: DEFAULT_BUCKET_API.to_string(),
            ttl: DEFAULT_CATALOG_TTL,
            language_names: None,
            catalog: None,
            loaded_at: None,
        }
    }

    /// Sets the time-to-live of a loaded catalog.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Overrides the storage JSON API endpoint used for bucket listings.
    pub fn with_bucket_api(mut self, api: impl Into<String>) -> Self {
        self.bucket_api = api.into();
        self
    }

    /// Uses a locale-aware lookup for `LANG:` group names.
    pub fn with_language_names(mut self, names: Box<dyn LanguageNames + Send + Sync>) -> Self {
        self.language_names = Some(names);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn source(&self) -> IndexSource {
        self.source
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The catalog currently held, without triggering a fetch.
    pub fn current(&self) -> Option<Arc<Catalog>> {
        self.catalog.clone()
    }

    /// Whether the next access has to fetch the index.
    pub fn is_expired(&self) -> bool {
        match (self.catalog.as_ref(), self.loaded_at) {
            (Some(_), Some(at)) => at.elapsed() >= self.ttl,
            _ => true,
        }
    }

    /// Returns the catalog, fetching it on first use, on expiry or when forced.
    pub fn refresh<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
        force: bool,
    ) -> SyncResult<Arc<Catalog>> {
        if !force && !self.is_expired() {
            if let Some(catalog) = &self.catalog {
                return Ok(catalog.clone());
            }
        }

        let catalog = Arc::new(self.load(transport, &self.url)?);
        info!(
            url = %self.url,
            items = catalog.items().count(),
            groups = catalog.groups().count(),
            "Catalog loaded"
        );
        self.catalog = Some(catalog.clone());
        self.loaded_at = Some(Instant::now());
        Ok(catalog)
    }

    /// Switches to another index.
    ///
    /// The new index is loaded before anything changes; on failure the
    /// previous URL and catalog stay in place.
    pub fn set_url<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
        url: impl Into<String>,
    ) -> SyncResult<Arc<Catalog>> {
        let url = url.into();
        match self.load(transport, &url) {
            Ok(catalog) => {
                info!(old = %self.url, new = %url, "Switched catalog index");
                let catalog = Arc::new(catalog);
                self.url = url;
                self.catalog = Some(catalog.clone());
                self.loaded_at = Some(Instant::now());
                Ok(catalog)
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Keeping previous catalog index");
                Err(e)
            }
        }
    }

    fn load<T: Transport + ?Sized>(&self, transport: &T, url: &str) -> SyncResult<Catalog> {
        let pages = match self.source {
            IndexSource::Mirror => {
                let index_url = mirror_index_url(url);
                vec![fetch_document(transport, &index_url)?]
            }
            IndexSource::Bucket => self.fetch_bucket_pages(transport, url)?,
        };

        let mut items = Vec::new();
        let mut collections = Vec::new();
        for page in pages {
            for entry in &page.items {
                items.push(entry.to_item().map_err(|e| SyncError::catalog(url, e))?);
            }
            collections.extend(page.collections);
        }

        let names = self
            .language_names
            .as_deref()
            .map(|n| n as &dyn LanguageNames);
        CatalogBuilder::new(url)
            .with_language_names(names)
            .items(items)
            .collections(collections)
            .build()
            .map_err(|e| SyncError::catalog(url, e))
    }

    fn fetch_bucket_pages<T: Transport + ?Sized>(
        &self,
        transport: &T,
        bucket: &str,
    ) -> SyncResult<Vec<IndexDocument>> {
        let mut pages = Vec::new();
        let mut seen_tokens = HashSet::new();
        let mut token: Option<String> = None;
        loop {
            let page_url = bucket_listing_url(&self.bucket_api, bucket, token.as_deref());
            let page = fetch_document(transport, &page_url)?;
            token = page.next_page_token.clone();
            pages.push(page);

            match &token {
                None => break,
                Some(t) if !seen_tokens.insert(t.clone()) => {
                    return Err(SyncError::catalog(
                        bucket,
                        format!("listing repeats page token {}", t),
                    ));
                }
                Some(t) => debug!(page = pages.len(), token = %t, "Following listing page"),
            }
        }
        Ok(pages)
    }
}

fn fetch_document<T: Transport + ?Sized>(transport: &T, url: &str) -> SyncResult<IndexDocument> {
    debug!(url = %url, "Fetching index");
    let body = transport.fetch(url)?;
    IndexDocument::parse(&body).map_err(|e| SyncError::catalog(url, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::tests::MockTransport;

    const MIRROR: &str = "http://mirror.test/polyglot";

    fn entry(task: &str, lang: &str, file: &str, size: u64) -> String {
        format!(
            r#"{{"id":"polyglot-models/{t}/{l}/{f}/1","name":"{t}/{l}/{f}","mediaLink":"http://mirror.test/{t}/{l}/{f}","size":"{s}"}}"#,
            t = task,
            l = lang,
            f = file,
            s = size
        )
    }

    fn mirror_body(entries: &[String]) -> String {
        format!(r#"{{"items":[{}]}}"#, entries.join(","))
    }

    fn mirror_transport() -> MockTransport {
        MockTransport::new().serve(
            "http://mirror.test/polyglot/index.json",
            mirror_body(&[entry("ner2", "en", "en.zip", 10), entry("pos2", "en", "en.zip", 20)]),
        )
    }

    #[test]
    fn test_refresh_loads_mirror_index() {
        let transport = mirror_transport();
        let mut loader = CatalogLoader::new(MIRROR, IndexSource::Mirror);
        assert!(loader.is_expired());

        let catalog = loader.refresh(&transport, false).unwrap();
        assert!(catalog.item("ner2.en").is_some());
        assert!(catalog.group("LANG:en").is_some());
        assert!(!loader.is_expired());
    }

    #[test]
    fn test_refresh_is_cached_within_ttl() {
        let transport = mirror_transport();
        let mut loader = CatalogLoader::new(MIRROR, IndexSource::Mirror);

        let first = loader.refresh(&transport, false).unwrap();
        let second = loader.refresh(&transport, false).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(
            transport.request_count("http://mirror.test/polyglot/index.json"),
            1
        );

        loader.refresh(&transport, true).unwrap();
        assert_eq!(
            transport.request_count("http://mirror.test/polyglot/index.json"),
            2
        );
    }

    #[test]
    fn test_zero_ttl_always_refetches() {
        let transport = mirror_transport();
        let mut loader =
            CatalogLoader::new(MIRROR, IndexSource::Mirror).with_ttl(Duration::from_secs(0));
        loader.refresh(&transport, false).unwrap();
        loader.refresh(&transport, false).unwrap();
        assert_eq!(transport.requests().len(), 2);
    }

    #[test]
    fn test_bucket_pagination() {
        let api = "http://api.test";
        let first = format!(
            r#"{{"kind":"storage#objects","nextPageToken":"p2","items":[{}]}}"#,
            entry("ner2", "en", "en.zip", 1)
        );
        let second = format!(
            r#"{{"kind":"storage#objects","items":[{}]}}"#,
            entry("ner2", "de", "de.zip", 1)
        );
        let transport = MockTransport::new()
            .serve("http://api.test/storage/v1/b/polyglot-models/o", first)
            .serve(
                "http://api.test/storage/v1/b/polyglot-models/o?pageToken=p2",
                second,
            );

        let mut loader =
            CatalogLoader::new("polyglot-models", IndexSource::Bucket).with_bucket_api(api);
        let catalog = loader.refresh(&transport, false).unwrap();
        assert!(catalog.item("ner2.en").is_some());
        assert!(catalog.item("ner2.de").is_some());
        assert_eq!(catalog.group("TASK:ner2").unwrap().packages.len(), 2);
    }

    #[test]
    fn test_repeated_page_token_fails() {
        let page = format!(
            r#"{{"nextPageToken":"again","items":[{}]}}"#,
            entry("ner2", "en", "en.zip", 1)
        );
        let transport = MockTransport::new()
            .serve("http://api.test/storage/v1/b/b/o", page.clone())
            .serve("http://api.test/storage/v1/b/b/o?pageToken=again", page);
        let mut loader = CatalogLoader::new("b", IndexSource::Bucket).with_bucket_api("http://api.test");
        assert!(matches!(
            loader.refresh(&transport, false),
            Err(SyncError::CatalogUnavailable { .. })
        ));
    }

    #[test]
    fn test_unreachable_index_is_catalog_unavailable() {
        let transport = MockTransport::new();
        let mut loader = CatalogLoader::new(MIRROR, IndexSource::Mirror);
        let err = loader.refresh(&transport, false).unwrap_err();
        assert!(matches!(err, SyncError::CatalogUnavailable { .. }));
        assert!(loader.current().is_none());
    }

    #[test]
    fn test_failed_refresh_keeps_previous_catalog() {
        let good = mirror_transport();
        let mut loader = CatalogLoader::new(MIRROR, IndexSource::Mirror);
        let before = loader.refresh(&good, false).unwrap();

        let broken = MockTransport::new().serve("http://mirror.test/polyglot/index.json", "{oops");
        assert!(loader.refresh(&broken, true).is_err());
        assert!(Arc::ptr_eq(&loader.current().unwrap(), &before));
    }

    #[test]
    fn test_duplicate_ids_fail_the_whole_catalog() {
        let transport = MockTransport::new().serve(
            "http://mirror.test/polyglot/index.json",
            mirror_body(&[entry("ner2", "en", "a.zip", 1), entry("ner2", "en", "b.zip", 1)]),
        );
        let mut loader = CatalogLoader::new(MIRROR, IndexSource::Mirror);
        let err = loader.refresh(&transport, false).unwrap_err();
        assert!(err.to_string().contains("duplicate id"));
    }

    #[test]
    fn test_set_url_keeps_previous_on_failure() {
        let transport = mirror_transport();
        let mut loader = CatalogLoader::new(MIRROR, IndexSource::Mirror);
        loader.refresh(&transport, false).unwrap();

        assert!(loader.set_url(&transport, "http://elsewhere.test").is_err());
        assert_eq!(loader.url(), MIRROR);
        assert!(loader.current().is_some());
    }

    #[test]
    fn test_set_url_switches_on_success() {
        let transport = mirror_transport().serve(
            "http://other.test/index.json",
            mirror_body(&[entry("sentiment2", "fr", "fr.sent.pkl", 3)]),
        );
        let mut loader = CatalogLoader::new(MIRROR, IndexSource::Mirror);
        loader.refresh(&transport, false).unwrap();

        let catalog = loader.set_url(&transport, "http://other.test").unwrap();
        assert_eq!(loader.url(), "http://other.test");
        assert!(catalog.item("sentiment2.fr").is_some());
        assert!(catalog.item("ner2.en").is_none());
    }
}
