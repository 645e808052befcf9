//! Filesystem checks behind [`Status`].

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use super::Status;
use crate::catalog::{Entry, Group, Item};
use crate::error::{SyncError, SyncResult};

/// Computes status and memoizes item results for the default directory.
#[derive(Debug)]
pub struct StatusResolver {
    default_dir: PathBuf,
    cache: HashMap<String, Status>,
}

impl StatusResolver {
    pub fn new(default_dir: impl Into<PathBuf>) -> Self {
        Self {
            default_dir: default_dir.into(),
            cache: HashMap::new(),
        }
    }

    pub fn default_dir(&self) -> &Path {
        &self.default_dir
    }

    /// Changes the default directory, dropping every cached result.
    pub fn set_default_dir(&mut self, dir: impl Into<PathBuf>) {
        self.default_dir = dir.into();
        self.cache.clear();
    }

    /// Forgets one cached item, or everything when `id` is `None`.
    pub fn clear_cache(&mut self, id: Option<&str>) {
        match id {
            Some(id) => {
                self.cache.remove(id);
            }
            None => self.cache.clear(),
        }
    }

    /// Number of memoized item results.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Status of an entry in `dir` (the default directory when `None`).
    pub fn status(&mut self, entry: &Entry, dir: Option<&Path>) -> SyncResult<Status> {
        match entry {
            Entry::Item(item) => self.item_status(item, dir),
            Entry::Group(group) => self.group_status(group, dir),
        }
    }

    pub fn item_status(&mut self, item: &Item, dir: Option<&Path>) -> SyncResult<Status> {
        let cacheable = dir.map_or(true, |d| d == self.default_dir);
        if cacheable {
            if let Some(status) = self.cache.get(&item.id) {
                return Ok(*status);
            }
        }

        let root = dir.unwrap_or(&self.default_dir);
        let status = compute_item_status(item, root)?;
        trace!(id = %item.id, status = %status, "Computed status");
        if cacheable {
            self.cache.insert(item.id.clone(), status);
        }
        Ok(status)
    }

    pub fn group_status(&mut self, group: &Group, dir: Option<&Path>) -> SyncResult<Status> {
        let mut statuses = Vec::with_capacity(group.children.len());
        for child in &group.children {
            statuses.push(self.status(child, dir)?);
        }
        Ok(Status::aggregate(statuses))
    }
}

/// Compare an item's files under `root` with what the catalog expects.
pub fn compute_item_status(item: &Item, root: &Path) -> SyncResult<Status> {
    let path = item.path(root);
    let meta = match fs::metadata(&path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Status::NotInstalled),
        Err(source) => return Err(SyncError::ReadFailed { path, source }),
    };

    if meta.len() != item.size {
        debug!(
            id = %item.id,
            expected = item.size,
            actual = meta.len(),
            "Downloaded file size differs"
        );
        return Ok(Status::Stale);
    }

    let Some(expanded) = item.expanded_dir(root) else {
        return Ok(Status::Installed);
    };

    match fs::metadata(&expanded) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Status::Installed),
        Err(source) => Err(SyncError::ReadFailed {
            path: expanded,
            source,
        }),
        Ok(meta) if !meta.is_dir() => Ok(Status::Stale),
        Ok(_) => {
            let total = directory_size(&expanded)?;
            if total == item.unzipped_size {
                Ok(Status::Installed)
            } else {
                debug!(
                    id = %item.id,
                    expected = item.unzipped_size,
                    actual = total,
                    "Expanded contents differ"
                );
                Ok(Status::Stale)
            }
        }
    }
}

/// Total size in bytes of all files below `dir`.
pub fn directory_size(dir: &Path) -> SyncResult<u64> {
    let read_failed = |source| SyncError::ReadFailed {
        path: dir.to_path_buf(),
        source,
    };

    let mut total = 0;
    for entry in fs::read_dir(dir).map_err(read_failed)? {
        let entry = entry.map_err(read_failed)?;
        let path = entry.path();
        let meta = fs::metadata(&path).map_err(|source| SyncError::ReadFailed {
            path: path.clone(),
            source,
        })?;
        if meta.is_dir() {
            total += directory_size(&path)?;
        } else {
            total += meta.len();
        }
    }
    Ok(total)
}
