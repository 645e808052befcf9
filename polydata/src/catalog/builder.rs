//! Builds the immutable catalog graph from decoded index entries.
//!
//! Building happens in one step that either yields a fully resolved
//! [`Catalog`] or fails; no partially linked groups are ever observable.
//!
//! 1. Items are collected and checked for unique ids.
//! 2. Derived `LANG:`/`TASK:` groups and explicit collections are declared
//!    with their children as ids.
//! 3. Groups are resolved depth-first so every child handle exists before
//!    its parent is created; cycles and dangling ids are rejected.
//! 4. Each group's flattened `packages` list is computed breadth-first.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;

use super::entity::{Entry, Group, GroupKind, Item, LANG_PREFIX, TASK_PREFIX};
use super::languages::{resolve_language_name, LanguageNames};
use super::wire::CollectionSpec;
use super::Catalog;

/// Errors raised when the index describes an inconsistent graph.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// Two entities share an id.
    #[error("duplicate id: {0}")]
    DuplicateId(String),

    /// A collection names a child that does not exist.
    #[error("collection {group} refers to unknown child {child}")]
    UnknownChild { group: String, child: String },

    /// Collections contain each other.
    #[error("collection {0} contains itself")]
    Cycle(String),
}

/// A group whose children are still ids.
struct PendingGroup {
    name: String,
    kind: GroupKind,
    children: Vec<String>,
}

/// Assembles a [`Catalog`] from items and collection declarations.
pub struct CatalogBuilder<'a> {
    source_url: String,
    items: Vec<Item>,
    collections: Vec<CollectionSpec>,
    language_names: Option<&'a dyn LanguageNames>,
}

impl<'a> CatalogBuilder<'a> {
    /// Start a catalog for the index at `source_url`.
    pub fn new(source_url: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            items: Vec::new(),
            collections: Vec::new(),
            language_names: None,
        }
    }

    /// Use a locale-aware lookup for language group names.
    pub fn with_language_names(mut self, names: Option<&'a dyn LanguageNames>) -> Self {
        self.language_names = names;
        self
    }

    /// Add items in index order.
    pub fn items(mut self, items: impl IntoIterator<Item = Item>) -> Self {
        self.items.extend(items);
        self
    }

    /// Add explicit collections.
    pub fn collections(mut self, collections: impl IntoIterator<Item = CollectionSpec>) -> Self {
        self.collections.extend(collections);
        self
    }

    /// Resolve the graph.
    pub fn build(self) -> Result<Catalog, BuildError> {
        let mut items: BTreeMap<String, Arc<Item>> = BTreeMap::new();
        let mut order: Vec<Arc<Item>> = Vec::with_capacity(self.items.len());
        for item in self.items {
            if items.contains_key(&item.id) {
                return Err(BuildError::DuplicateId(item.id));
            }
            let item = Arc::new(item);
            items.insert(item.id.clone(), item.clone());
            order.push(item);
        }

        let mut pending: BTreeMap<String, PendingGroup> = BTreeMap::new();

        let mut by_language: Vec<(String, Vec<String>)> = Vec::new();
        let mut by_task: Vec<(String, Vec<String>)> = Vec::new();
        for item in &order {
            push_grouped(&mut by_language, &item.language, &item.id);
            push_grouped(&mut by_task, &item.task, &item.id);
        }

        for (code, children) in by_language {
            let name = resolve_language_name(&code, self.language_names);
            declare(
                &mut pending,
                &items,
                format!("{}{}", LANG_PREFIX, code),
                PendingGroup {
                    name,
                    kind: GroupKind::Language(code),
                    children,
                },
            )?;
        }
        for (task, children) in by_task {
            declare(
                &mut pending,
                &items,
                format!("{}{}", TASK_PREFIX, task),
                PendingGroup {
                    name: task.clone(),
                    kind: GroupKind::Task(task),
                    children,
                },
            )?;
        }
        for spec in self.collections {
            let name = spec.name.unwrap_or_else(|| spec.id.clone());
            declare(
                &mut pending,
                &items,
                spec.id,
                PendingGroup {
                    name,
                    kind: GroupKind::Collection,
                    children: spec.children,
                },
            )?;
        }

        let mut resolver = Resolver {
            items: &items,
            pending: &pending,
            resolved: HashMap::new(),
            visiting: HashSet::new(),
        };
        for id in pending.keys() {
            resolver.resolve(id)?;
        }
        let groups: BTreeMap<String, Arc<Group>> = resolver.resolved.into_iter().collect();

        Ok(Catalog {
            items,
            groups,
            source_url: self.source_url,
            fetched_at: Utc::now(),
        })
    }
}

/// Append `id` to the bucket for `key`, keeping first-seen bucket order.
fn push_grouped(buckets: &mut Vec<(String, Vec<String>)>, key: &str, id: &str) {
    match buckets.iter_mut().find(|(k, _)| k == key) {
        Some((_, ids)) => ids.push(id.to_string()),
        None => buckets.push((key.to_string(), vec![id.to_string()])),
    }
}

fn declare(
    pending: &mut BTreeMap<String, PendingGroup>,
    items: &BTreeMap<String, Arc<Item>>,
    id: String,
    group: PendingGroup,
) -> Result<(), BuildError> {
    if items.contains_key(&id) || pending.contains_key(&id) {
        return Err(BuildError::DuplicateId(id));
    }
    pending.insert(id, group);
    Ok(())
}

struct Resolver<'b> {
    items: &'b BTreeMap<String, Arc<Item>>,
    pending: &'b BTreeMap<String, PendingGroup>,
    resolved: HashMap<String, Arc<Group>>,
    visiting: HashSet<String>,
}

impl Resolver<'_> {
    fn resolve(&mut self, id: &str) -> Result<Arc<Group>, BuildError> {
        if let Some(group) = self.resolved.get(id) {
            return Ok(group.clone());
        }
        if !self.visiting.insert(id.to_string()) {
            return Err(BuildError::Cycle(id.to_string()));
        }

        let pending = &self.pending[id];
        let mut children = Vec::with_capacity(pending.children.len());
        for child in &pending.children {
            if let Some(item) = self.items.get(child) {
                children.push(Entry::Item(item.clone()));
            } else if self.pending.contains_key(child) {
                children.push(Entry::Group(self.resolve(child)?));
            } else {
                return Err(BuildError::UnknownChild {
                    group: id.to_string(),
                    child: child.clone(),
                });
            }
        }

        let group = Arc::new(Group {
            id: id.to_string(),
            name: pending.name.clone(),
            kind: pending.kind.clone(),
            packages: flatten(&children),
            children,
        });
        self.visiting.remove(id);
        self.resolved.insert(id.to_string(), group.clone());
        Ok(group)
    }
}

/// Breadth-first walk collecting item leaves, first occurrence wins.
fn flatten(children: &[Entry]) -> Vec<Arc<Item>> {
    let mut seen = HashSet::new();
    let mut packages = Vec::new();
    let mut queue: VecDeque<&Entry> = children.iter().collect();
    while let Some(entry) = queue.pop_front() {
        match entry {
            Entry::Item(item) => {
                if seen.insert(item.id.as_str()) {
                    packages.push(item.clone());
                }
            }
            Entry::Group(group) => queue.extend(group.children.iter()),
        }
    }
    packages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::entity::tests::make_item;

    fn spec(id: &str, children: &[&str]) -> CollectionSpec {
        CollectionSpec {
            id: id.to_string(),
            name: None,
            children: children.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn sample_items() -> Vec<Item> {
        vec![
            make_item("ner2", "en", "en.zip", 10),
            make_item("ner2", "de", "de.zip", 10),
            make_item("pos2", "en", "en.zip", 10),
        ]
    }

    #[test]
    fn test_derived_groups() {
        let catalog = CatalogBuilder::new("http://mirror.test")
            .items(sample_items())
            .build()
            .unwrap();

        let english = catalog.group("LANG:en").unwrap();
        assert_eq!(english.name, "English");
        assert_eq!(english.language(), Some("en"));
        let ids: Vec<&str> = english.packages.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["ner2.en", "pos2.en"]);

        let ner = catalog.group("TASK:ner2").unwrap();
        assert_eq!(ner.name, "ner2");
        assert_eq!(ner.children.len(), 2);
        assert!(catalog.group("TASK:pos2").is_some());
        assert!(catalog.group("LANG:de").is_some());
        assert_eq!(catalog.groups().count(), 4);
    }

    #[test]
    fn test_derived_groups_are_depth_one() {
        let catalog = CatalogBuilder::new("u").items(sample_items()).build().unwrap();
        for group in catalog.groups() {
            assert!(group
                .children
                .iter()
                .all(|child| matches!(child, Entry::Item(_))));
        }
    }

    #[test]
    fn test_duplicate_item_id() {
        let mut items = sample_items();
        items.push(make_item("ner2", "en", "other.zip", 1));
        let err = CatalogBuilder::new("u").items(items).build().unwrap_err();
        assert_eq!(err, BuildError::DuplicateId("ner2.en".to_string()));
    }

    #[test]
    fn test_collection_id_clashing_with_group() {
        let err = CatalogBuilder::new("u")
            .items(sample_items())
            .collections(vec![spec("LANG:en", &["ner2.en"])])
            .build()
            .unwrap_err();
        assert_eq!(err, BuildError::DuplicateId("LANG:en".to_string()));
    }

    #[test]
    fn test_nested_collection_flattens_packages() {
        let catalog = CatalogBuilder::new("u")
            .items(sample_items())
            .collections(vec![
                spec("all", &["TASK:ner2", "english"]),
                spec("english", &["LANG:en"]),
            ])
            .build()
            .unwrap();

        let all = catalog.group("all").unwrap();
        assert_eq!(all.kind, GroupKind::Collection);
        let ids: Vec<&str> = all.packages.iter().map(|p| p.id.as_str()).collect();
        // ner2.en is reachable twice but listed once.
        assert_eq!(ids, vec!["ner2.en", "ner2.de", "pos2.en"]);
    }

    #[test]
    fn test_unknown_child() {
        let err = CatalogBuilder::new("u")
            .items(sample_items())
            .collections(vec![spec("broken", &["ner2.xx"])])
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            BuildError::UnknownChild {
                group: "broken".to_string(),
                child: "ner2.xx".to_string()
            }
        );
    }

    #[test]
    fn test_cycle_is_rejected() {
        let err = CatalogBuilder::new("u")
            .items(sample_items())
            .collections(vec![spec("a", &["b"]), spec("b", &["a"])])
            .build()
            .unwrap_err();
        assert!(matches!(err, BuildError::Cycle(_)));
    }

    #[test]
    fn test_empty_index() {
        let catalog = CatalogBuilder::new("u").build().unwrap();
        assert_eq!(catalog.items().count(), 0);
        assert_eq!(catalog.groups().count(), 0);
    }
}
