//! The synchronization engine.
//!
//! [`Engine`] owns the catalog loader, the status resolver and the transport,
//! and is the entry point for every query and download.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::catalog::{
    Catalog, CatalogLoader, Entry, Group, Item, LanguageNames, LANG_PREFIX, TASK_PREFIX,
};
use crate::config::{default_download_dir, EngineConfig};
use crate::driver::{DownloadOptions, Driver, ErrorPolicy, Reporter};
use crate::error::{SyncError, SyncResult};
use crate::protocol::DownloadStream;
use crate::status::{Status, StatusResolver};
use crate::transport::{ReqwestTransport, Transport};

/// Width the package id is padded to in catalog listings.
const LISTING_ID_WIDTH: usize = 20;

/// Column at which wrapped package names continue.
const LISTING_NAME_COLUMN: usize = 27;

/// Width of a catalog listing line.
const LISTING_WIDTH: usize = 75;

/// Resource synchronization engine.
///
/// # Example
///
/// ```no_run
/// use polydata::{DownloadOptions, Engine, EngineConfig, SkipErrors, TracingReporter};
///
/// let mut engine = Engine::new(EngineConfig::default())?;
/// let options = DownloadOptions::default();
/// engine.download(&["embeddings2.en"], &options, &mut SkipErrors, &mut TracingReporter)?;
/// # Ok::<(), polydata::SyncError>(())
/// ```
pub struct Engine<T: Transport = ReqwestTransport> {
    pub(crate) config: EngineConfig,
    pub(crate) transport: T,
    pub(crate) loader: CatalogLoader,
    pub(crate) resolver: StatusResolver,
}

impl Engine<ReqwestTransport> {
    /// Create an engine talking HTTP.
    pub fn new(config: EngineConfig) -> SyncResult<Self> {
        let transport = ReqwestTransport::with_timeout(config.timeout())?;
        Self::with_transport(config, transport)
    }
}

impl<T: Transport> Engine<T> {
    /// Create an engine over an explicit transport.
    ///
    /// Fails with [`SyncError::Configuration`] when no download directory is
    /// configured and none can be found on the system.
    pub fn with_transport(config: EngineConfig, transport: T) -> SyncResult<Self> {
        let download_dir = match config.download_dir() {
            Some(dir) => dir.to_path_buf(),
            None => default_download_dir()?,
        };
        let loader = CatalogLoader::new(config.index_url(), config.source())
            .with_ttl(config.catalog_ttl())
            .with_bucket_api(config.bucket_api());

        info!(
            url = %config.index_url(),
            source = %config.source().as_str(),
            dir = %download_dir.display(),
            "Engine ready"
        );

        Ok(Self {
            config,
            transport,
            loader,
            resolver: StatusResolver::new(download_dir),
        })
    }

    /// Use a locale-aware lookup for language group names.
    pub fn with_language_names(mut self, names: Box<dyn LanguageNames + Send + Sync>) -> Self {
        self.loader = self.loader.with_language_names(names);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The default download directory.
    pub fn download_dir(&self) -> &Path {
        self.resolver.default_dir()
    }

    /// Change the default download directory; cached statuses are dropped.
    pub fn set_download_dir(&mut self, dir: impl Into<PathBuf>) {
        let dir = dir.into();
        info!(dir = %dir.display(), "Download directory changed");
        self.resolver.set_default_dir(dir);
    }

    /// Location of the index currently in use.
    pub fn index_url(&self) -> &str {
        self.loader.url()
    }

    /// Switch to another index. On failure the previous index stays in use.
    pub fn set_url(&mut self, url: impl Into<String>) -> SyncResult<()> {
        self.loader.set_url(&self.transport, url)?;
        self.resolver.clear_cache(None);
        Ok(())
    }

    /// The current catalog, fetched on first use or once it has expired.
    pub fn catalog(&mut self) -> SyncResult<Arc<Catalog>> {
        self.refresh(false)
    }

    /// Fetch the catalog, unconditionally when `force` is set.
    ///
    /// Cached statuses are dropped whenever a new snapshot replaces the old.
    pub fn refresh(&mut self, force: bool) -> SyncResult<Arc<Catalog>> {
        let previous = self.loader.current();
        let catalog = self.loader.refresh(&self.transport, force)?;
        if !previous.is_some_and(|p| Arc::ptr_eq(&p, &catalog)) {
            self.resolver.clear_cache(None);
        }
        Ok(catalog)
    }

    /// Look up an item or group, refreshing the catalog once on a miss.
    pub fn info(&mut self, id: &str) -> SyncResult<Entry> {
        if let Some(entry) = self.catalog()?.get(id) {
            return Ok(entry);
        }
        debug!(id = %id, "Id not in cached catalog, refreshing");
        self.refresh(true)?
            .get(id)
            .ok_or_else(|| SyncError::UnknownIdentifier(id.to_string()))
    }

    pub fn items(&mut self) -> SyncResult<Vec<Arc<Item>>> {
        Ok(self.catalog()?.items().cloned().collect())
    }

    pub fn groups(&mut self) -> SyncResult<Vec<Arc<Group>>> {
        Ok(self.catalog()?.groups().cloned().collect())
    }

    pub fn corpora(&mut self) -> SyncResult<Vec<Arc<Item>>> {
        Ok(self.catalog()?.corpora().cloned().collect())
    }

    pub fn models(&mut self) -> SyncResult<Vec<Arc<Item>>> {
        Ok(self.catalog()?.models().cloned().collect())
    }

    /// Status of an item or group in `dir` (the default directory when `None`).
    pub fn status(&mut self, id: &str, dir: Option<&Path>) -> SyncResult<Status> {
        let entry = self.info(id)?;
        self.entry_status(&entry, dir)
    }

    pub fn entry_status(&mut self, entry: &Entry, dir: Option<&Path>) -> SyncResult<Status> {
        self.resolver.status(entry, dir)
    }

    pub fn is_installed(&mut self, id: &str, dir: Option<&Path>) -> SyncResult<bool> {
        Ok(self.status(id, dir)? == Status::Installed)
    }

    pub fn is_stale(&mut self, id: &str, dir: Option<&Path>) -> SyncResult<bool> {
        Ok(self.status(id, dir)? == Status::Stale)
    }

    /// Forget cached statuses for one id, or all of them.
    pub fn clear_cache(&mut self, id: Option<&str>) {
        self.resolver.clear_cache(id);
    }

    /// The `LANG:` group for `lang`, else the `TASK:` group for `task`.
    pub fn resolve_group(&mut self, lang: Option<&str>, task: Option<&str>) -> SyncResult<Arc<Group>> {
        let id = match (lang, task) {
            (Some(lang), _) => format!("{LANG_PREFIX}{lang}"),
            (None, Some(task)) => format!("{TASK_PREFIX}{task}"),
            (None, None) => {
                return Err(SyncError::Configuration(
                    "either a language or a task is required".to_string(),
                ))
            }
        };

        match self.info(&id) {
            Ok(Entry::Group(group)) => Ok(group),
            Ok(Entry::Item(_)) | Err(SyncError::UnknownIdentifier(_)) if lang.is_some() => {
                Err(SyncError::LanguageNotSupported(id))
            }
            Ok(Entry::Item(_)) | Err(SyncError::UnknownIdentifier(_)) => {
                Err(SyncError::TaskNotSupported(id))
            }
            Err(e) => Err(e),
        }
    }

    /// Names of the languages covered by `task`, or of every language.
    pub fn supported_languages(&mut self, task: Option<&str>) -> SyncResult<Vec<String>> {
        let catalog = self.catalog()?;
        match task {
            Some(task) => {
                let group = self.resolve_group(None, Some(task))?;
                Ok(group
                    .packages
                    .iter()
                    .map(|item| {
                        catalog
                            .group(&format!("{LANG_PREFIX}{}", item.language))
                            .map_or_else(|| item.language.clone(), |g| g.name.clone())
                    })
                    .collect())
            }
            None => Ok(catalog.languages().map(|g| g.name.clone()).collect()),
        }
    }

    /// Tasks available for `lang`, or every task.
    pub fn supported_tasks(&mut self, lang: Option<&str>) -> SyncResult<Vec<String>> {
        match lang {
            Some(lang) => {
                let group = self.resolve_group(Some(lang), None)?;
                Ok(group.packages.iter().map(|item| item.task.clone()).collect())
            }
            None => Ok(self.catalog()?.tasks().map(|g| g.name.clone()).collect()),
        }
    }

    /// Items whose local copy in `dir` no longer matches the catalog.
    pub fn stale_items(&mut self, dir: Option<&Path>) -> SyncResult<Vec<Arc<Item>>> {
        let catalog = self.catalog()?;
        let mut stale = Vec::new();
        for item in catalog.items() {
            if self.resolver.item_status(item, dir)? == Status::Stale {
                stale.push(item.clone());
            }
        }
        Ok(stale)
    }

    /// Start a download and return the event stream driving it.
    ///
    /// Ids missing from the catalog are reported as `Error` events at the
    /// start of the stream rather than failing the call.
    pub fn incremental_download<S: AsRef<str>>(
        &mut self,
        ids: &[S],
        dir: Option<&Path>,
        force: bool,
    ) -> SyncResult<DownloadStream<'_, T>> {
        let mut catalog = self.catalog()?;
        if ids.iter().any(|id| catalog.get(id.as_ref()).is_none()) {
            match self.refresh(true) {
                Ok(fresh) => catalog = fresh,
                Err(e) => warn!(error = %e, "Could not refresh catalog for unknown ids"),
            }
        }

        let targets = ids
            .iter()
            .map(|id| catalog.get(id.as_ref()).ok_or_else(|| id.as_ref().to_string()))
            .collect();
        Ok(DownloadStream::new(self, targets, dir, force))
    }

    /// Download `ids`, reporting events and applying `policy` to failures.
    ///
    /// Returns `Ok(false)` when the download was halted.
    pub fn download<S: AsRef<str>>(
        &mut self,
        ids: &[S],
        options: &DownloadOptions,
        policy: &mut dyn ErrorPolicy,
        reporter: &mut dyn Reporter,
    ) -> SyncResult<bool> {
        let stream = self.incremental_download(ids, options.dir.as_deref(), options.force)?;
        Driver::new(options, policy, reporter).run(stream)
    }

    /// Re-download every stale item.
    pub fn update(
        &mut self,
        options: &DownloadOptions,
        policy: &mut dyn ErrorPolicy,
        reporter: &mut dyn Reporter,
    ) -> SyncResult<bool> {
        self.resolver.clear_cache(None);
        let stale: Vec<String> = self
            .stale_items(options.dir.as_deref())?
            .iter()
            .map(|item| item.id.clone())
            .collect();
        if stale.is_empty() {
            info!("All packages are up-to-date");
            return Ok(true);
        }
        info!(count = stale.len(), "Updating stale packages");
        self.download(&stale, options, policy, reporter)
    }

    /// Where an entry lives in the default directory: the expanded
    /// directory for archives, the file otherwise, the directory itself for
    /// groups.
    pub fn locate(&mut self, id: &str) -> SyncResult<PathBuf> {
        let entry = self.info(id)?;
        let root = self.download_dir();
        Ok(match entry {
            Entry::Item(item) => item.expanded_dir(root).unwrap_or_else(|| item.path(root)),
            Entry::Group(_) => root.to_path_buf(),
        })
    }

    /// Like [`locate`](Self::locate), but fails with
    /// [`SyncError::NotDownloaded`] unless the entry is fully installed.
    pub fn require_installed(&mut self, id: &str) -> SyncResult<PathBuf> {
        if self.status(id, None)? != Status::Installed {
            return Err(SyncError::NotDownloaded { id: id.to_string() });
        }
        self.locate(id)
    }

    /// Render the catalog with a status marker per entry.
    pub fn list_catalog(
        &mut self,
        dir: Option<&Path>,
        show_items: bool,
        show_groups: bool,
    ) -> SyncResult<String> {
        let catalog = self.catalog()?;
        let url = self.index_url().to_string();
        let mut out = String::new();

        if dir.is_none() {
            let _ = writeln!(out, "Using default data directory ({})", self.download_dir().display());
        }
        let rule = "=".repeat(26 + url.len());
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, " Data server index for <{url}>");
        let _ = writeln!(out, "{rule}");

        let mut sections: Vec<(&str, Vec<Entry>)> = Vec::new();
        if show_items {
            sections.push(("Packages", catalog.items().cloned().map(Entry::Item).collect()));
        }
        if show_groups {
            sections.push(("Collections", catalog.groups().cloned().map(Entry::Group).collect()));
        }

        let mut stale = false;
        let mut partial = false;
        for (title, entries) in sections {
            let _ = writeln!(out, "{title}:");
            for entry in entries {
                let status = self.resolver.status(&entry, dir)?;
                stale |= status == Status::Stale;
                partial |= status == Status::Partial;
                let name = if entry.name().is_empty() {
                    entry.id()
                } else {
                    entry.name()
                };
                let indent = format!("\n{}", " ".repeat(LISTING_NAME_COLUMN));
                let _ = writeln!(
                    out,
                    "  [{}] {:.<width$} {}",
                    status.marker(),
                    entry.id(),
                    wrap(name, LISTING_WIDTH - LISTING_NAME_COLUMN).join(&indent),
                    width = LISTING_ID_WIDTH
                );
            }
            out.push('\n');
        }

        let mut legend = String::from("([*] marks installed packages");
        if stale {
            legend.push_str("; [-] marks out-of-date or corrupt packages");
        }
        if partial {
            legend.push_str("; [P] marks partially installed collections");
        }
        legend.push(')');
        let _ = writeln!(out, "{}", wrap(&legend, LISTING_WIDTH + 1).join("\n "));
        Ok(out)
    }
}

/// Greedy word wrap; words longer than `width` get a line of their own.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();
    for word in text.split_whitespace() {
        if !line.is_empty() && line.len() + 1 + word.len() > width {
            lines.push(std::mem::take(&mut line));
        }
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(word);
    }
    if !line.is_empty() || lines.is_empty() {
        lines.push(line);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{NullReporter, SkipErrors};
    use crate::transport::tests::MockTransport;
    use std::fs;
    use tempfile::TempDir;

    const MIRROR: &str = "http://mirror.test";
    const INDEX: &str = "http://mirror.test/index.json";

    fn entry(task: &str, lang: &str, file: &str, size: u64) -> String {
        format!(
            r#"{{"id":"m/{t}/{l}/{f}","name":"{t}/{l}/{f}","mediaLink":"{m}/{t}/{l}/{f}","size":{s}}}"#,
            t = task,
            l = lang,
            f = file,
            m = MIRROR,
            s = size
        )
    }

    fn index() -> String {
        format!(
            r#"{{"items":[{},{},{}]}}"#,
            entry("pos2", "en", "en.pkl", 3),
            entry("pos2", "de", "de.pkl", 3),
            entry("ner2", "en", "en.pkl", 4)
        )
    }

    fn transport() -> MockTransport {
        MockTransport::new()
            .serve(INDEX, index())
            .serve("http://mirror.test/pos2/en/en.pkl", b"abc".to_vec())
            .serve("http://mirror.test/pos2/de/de.pkl", b"abc".to_vec())
            .serve("http://mirror.test/ner2/en/en.pkl", b"abcd".to_vec())
    }

    fn engine(dir: &Path) -> Engine<MockTransport> {
        let config = EngineConfig::new(MIRROR).with_download_dir(dir);
        Engine::with_transport(config, transport()).unwrap()
    }

    fn install(dir: &Path, file: &str, bytes: &[u8]) {
        let path = dir.join(file);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_info_finds_items_and_groups() {
        let temp = TempDir::new().unwrap();
        let mut engine = engine(temp.path());

        assert!(matches!(engine.info("pos2.en").unwrap(), Entry::Item(_)));
        assert!(matches!(engine.info("TASK:pos2").unwrap(), Entry::Group(_)));
        assert!(matches!(engine.info("LANG:en").unwrap(), Entry::Group(_)));
    }

    #[test]
    fn test_info_refreshes_once_on_miss() {
        let temp = TempDir::new().unwrap();
        let mut engine = engine(temp.path());

        engine.catalog().unwrap();
        let err = engine.info("pos2.xx").unwrap_err();
        assert!(matches!(err, SyncError::UnknownIdentifier(ref id) if id == "pos2.xx"));
        assert_eq!(engine.transport().request_count(INDEX), 2);
    }

    #[test]
    fn test_status_transitions() {
        let temp = TempDir::new().unwrap();
        let mut engine = engine(temp.path());

        assert_eq!(engine.status("TASK:pos2", None).unwrap(), Status::NotInstalled);

        install(temp.path(), "pos2/en/en.pkl", b"abc");
        engine.clear_cache(None);
        assert!(engine.is_installed("pos2.en", None).unwrap());
        assert_eq!(engine.status("TASK:pos2", None).unwrap(), Status::Partial);

        install(temp.path(), "pos2/de/de.pkl", b"abcdef");
        engine.clear_cache(Some("pos2.de"));
        assert!(engine.is_stale("pos2.de", None).unwrap());
        assert_eq!(engine.status("TASK:pos2", None).unwrap(), Status::Stale);
    }

    #[test]
    fn test_set_download_dir_clears_cache() {
        let temp = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        let mut engine = engine(temp.path());

        assert!(!engine.is_installed("pos2.en", None).unwrap());
        install(other.path(), "pos2/en/en.pkl", b"abc");
        engine.set_download_dir(other.path());

        assert_eq!(engine.download_dir(), other.path());
        assert!(engine.is_installed("pos2.en", None).unwrap());
    }

    #[test]
    fn test_resolve_group_errors() {
        let temp = TempDir::new().unwrap();
        let mut engine = engine(temp.path());

        assert_eq!(engine.resolve_group(Some("de"), None).unwrap().packages.len(), 1);
        assert_eq!(engine.resolve_group(None, Some("pos2")).unwrap().packages.len(), 2);
        assert!(matches!(
            engine.resolve_group(Some("xx"), None),
            Err(SyncError::LanguageNotSupported(ref id)) if id == "LANG:xx"
        ));
        assert!(matches!(
            engine.resolve_group(None, Some("nope")),
            Err(SyncError::TaskNotSupported(_))
        ));
        assert!(matches!(
            engine.resolve_group(None, None),
            Err(SyncError::Configuration(_))
        ));
    }

    #[test]
    fn test_supported_languages_and_tasks() {
        let temp = TempDir::new().unwrap();
        let mut engine = engine(temp.path());

        assert_eq!(
            engine.supported_languages(Some("pos2")).unwrap(),
            vec!["English", "German"]
        );
        assert_eq!(engine.supported_languages(None).unwrap(), vec!["German", "English"]);
        assert_eq!(engine.supported_tasks(Some("en")).unwrap(), vec!["pos2", "ner2"]);
        assert_eq!(engine.supported_tasks(None).unwrap(), vec!["ner2", "pos2"]);
    }

    #[test]
    fn test_update_redownloads_stale_items_only() {
        let temp = TempDir::new().unwrap();
        let mut engine = engine(temp.path());
        install(temp.path(), "pos2/en/en.pkl", b"abc");
        install(temp.path(), "ner2/en/en.pkl", b"stale!");

        let ok = engine
            .update(&DownloadOptions::default(), &mut SkipErrors, &mut NullReporter)
            .unwrap();

        assert!(ok);
        assert_eq!(fs::read(temp.path().join("ner2/en/en.pkl")).unwrap(), b"abcd");
        assert_eq!(engine.transport().request_count("http://mirror.test/ner2/en/en.pkl"), 1);
        assert_eq!(engine.transport().request_count("http://mirror.test/pos2/en/en.pkl"), 0);
        assert!(!temp.path().join("pos2/de/de.pkl").exists());
    }

    #[test]
    fn test_require_installed() {
        let temp = TempDir::new().unwrap();
        let mut engine = engine(temp.path());

        let err = engine.require_installed("pos2.en").unwrap_err();
        assert!(matches!(err, SyncError::NotDownloaded { ref id } if id == "pos2.en"));
        assert!(err.to_string().contains("polydata download pos2.en"));

        install(temp.path(), "pos2/en/en.pkl", b"abc");
        engine.clear_cache(None);
        assert_eq!(
            engine.require_installed("pos2.en").unwrap(),
            temp.path().join("pos2/en/en.pkl")
        );
    }

    #[test]
    fn test_list_catalog_format() {
        let temp = TempDir::new().unwrap();
        let mut engine = engine(temp.path());
        install(temp.path(), "pos2/en/en.pkl", b"abc");
        install(temp.path(), "ner2/en/en.pkl", b"ab");

        let listing = engine.list_catalog(Some(temp.path()), true, false).unwrap();
        let lines: Vec<&str> = listing.lines().collect();

        assert_eq!(lines[0], "=".repeat(26 + MIRROR.len()));
        assert_eq!(lines[1], " Data server index for <http://mirror.test>");
        assert_eq!(lines[3], "Packages:");
        assert_eq!(lines[4], "  [-] ner2.en............. ner2.en.en.pkl");
        assert_eq!(lines[5], "  [ ] pos2.de............. pos2.de.de.pkl");
        assert_eq!(lines[6], "  [*] pos2.en............. pos2.en.en.pkl");
        assert_eq!(lines[7], "");
        assert_eq!(
            lines[8],
            "([*] marks installed packages; [-] marks out-of-date or corrupt packages)"
        );
    }

    #[test]
    fn test_list_catalog_groups_and_default_dir() {
        let temp = TempDir::new().unwrap();
        let mut engine = engine(temp.path());
        install(temp.path(), "pos2/en/en.pkl", b"abc");

        let listing = engine.list_catalog(None, false, true).unwrap();
        assert!(listing.starts_with(&format!(
            "Using default data directory ({})",
            temp.path().display()
        )));
        assert!(listing.contains("Collections:\n"));
        assert!(listing.contains("  [P] TASK:pos2........... pos2\n"));
        assert!(listing.contains("  [P] LANG:en............. English\n"));
        assert!(listing.contains("[P] marks partially installed collections"));
        assert!(!listing.contains("Packages:"));
    }

    #[test]
    fn test_wrap() {
        assert_eq!(wrap("a bb ccc", 4), vec!["a bb", "ccc"]);
        assert_eq!(wrap("", 10), vec![""]);
        assert_eq!(wrap("longword x", 3), vec!["longword", "x"]);
    }
}
