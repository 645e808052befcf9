//! The remote catalog of downloadable resources.
//!
//! A [`Catalog`] is an immutable snapshot of the index: items keyed by id,
//! plus the derived `LANG:`/`TASK:` groups and any explicit collections.
//! [`CatalogLoader`] fetches it and decides when a snapshot is too old.

mod builder;
mod entity;
mod languages;
mod loader;
mod wire;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

pub use builder::{BuildError, CatalogBuilder};
pub use entity::{Entry, Group, GroupKind, Item, ARCHIVE_SUFFIX, LANG_PREFIX, TASK_PREFIX};
pub use languages::{iso_language_name, resolve_language_name, IsoLanguageTable, LanguageNames};
pub use loader::{CatalogLoader, DEFAULT_CATALOG_TTL};
pub use wire::{
    bucket_listing_url, mirror_index_url, CollectionSpec, IndexDocument, IndexEntry,
    IndexSource, WireError, DEFAULT_BUCKET_API,
};

#[cfg(test)]
pub(crate) use entity::tests::make_item;

/// Task under which raw corpora are published; everything else is a model.
pub const CORPORA_TASK: &str = "corpora";

/// An immutable, fully resolved snapshot of the remote index.
#[derive(Debug, Clone)]
pub struct Catalog {
    pub(crate) items: BTreeMap<String, Arc<Item>>,
    pub(crate) groups: BTreeMap<String, Arc<Group>>,
    pub(crate) source_url: String,
    pub(crate) fetched_at: DateTime<Utc>,
}

impl Catalog {
    /// Looks up an item or group by id.
    pub fn get(&self, id: &str) -> Option<Entry> {
        self.items
            .get(id)
            .map(|item| Entry::Item(item.clone()))
            .or_else(|| self.groups.get(id).map(|group| Entry::Group(group.clone())))
    }

    pub fn item(&self, id: &str) -> Option<&Arc<Item>> {
        self.items.get(id)
    }

    pub fn group(&self, id: &str) -> Option<&Arc<Group>> {
        self.groups.get(id)
    }

    /// Items sorted by id.
    pub fn items(&self) -> impl Iterator<Item = &Arc<Item>> {
        self.items.values()
    }

    /// Groups sorted by id.
    pub fn groups(&self) -> impl Iterator<Item = &Arc<Group>> {
        self.groups.values()
    }

    /// `LANG:` groups sorted by id.
    pub fn languages(&self) -> impl Iterator<Item = &Arc<Group>> {
        self.groups().filter(|g| g.language().is_some())
    }

    /// `TASK:` groups sorted by id.
    pub fn tasks(&self) -> impl Iterator<Item = &Arc<Group>> {
        self.groups().filter(|g| g.task().is_some())
    }

    /// Items published under the corpora task.
    pub fn corpora(&self) -> impl Iterator<Item = &Arc<Item>> {
        self.items().filter(|i| i.task == CORPORA_TASK)
    }

    /// Every item that is not a corpus.
    pub fn models(&self) -> impl Iterator<Item = &Arc<Item>> {
        self.items().filter(|i| i.task != CORPORA_TASK)
    }

    /// The index location this snapshot was built from.
    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }
}
