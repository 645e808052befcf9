//! Catalog entities: downloadable items and the groups that collect them.
//!
//! Entities are immutable once the catalog is built. Groups hold shared
//! handles to their children, so a resolved [`Group`] is a self-contained
//! snapshot of the graph below it.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Filename suffix marking a resource as an expandable archive.
pub const ARCHIVE_SUFFIX: &str = ".zip";

/// Id prefix for groups collecting every item of one language.
pub const LANG_PREFIX: &str = "LANG:";

/// Id prefix for groups collecting every item of one task.
pub const TASK_PREFIX: &str = "TASK:";

/// A single downloadable resource.
///
/// # Example
///
/// ```
/// use std::path::Path;
/// use polydata::catalog::Item;
///
/// let item = Item {
///     id: "ner2.en".to_string(),
///     url: "http://example.com/ner2/en/en.zip".to_string(),
///     name: "ner2.en.en.zip".to_string(),
///     subdir: "ner2/en".to_string(),
///     size: 1000,
///     filename: "ner2/en/en.zip".to_string(),
///     task: "ner2".to_string(),
///     language: "en".to_string(),
///     unzipped_size: 5000,
/// };
///
/// assert!(item.is_archive());
/// assert_eq!(item.path(Path::new("/data")), Path::new("/data/ner2/en/en.zip"));
/// assert_eq!(
///     item.expanded_dir(Path::new("/data")).unwrap(),
///     Path::new("/data/ner2/en/en")
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// Globally unique id in `task.language` form.
    pub id: String,

    /// Where the resource file is downloaded from.
    pub url: String,

    /// Display name.
    pub name: String,

    /// Directory (relative to the download root, `/`-separated) holding the file.
    pub subdir: String,

    /// Expected size of the downloaded file in bytes.
    pub size: u64,

    /// File path relative to the download root, `/`-separated.
    pub filename: String,

    /// Task this resource serves (e.g. `ner2`, `embeddings2`).
    pub task: String,

    /// Language code this resource belongs to.
    pub language: String,

    /// Total bytes of the expanded archive contents.
    pub unzipped_size: u64,
}

impl Item {
    /// Whether the resource is an archive that may be expanded after download.
    pub fn is_archive(&self) -> bool {
        self.filename.ends_with(ARCHIVE_SUFFIX)
    }

    /// Local path of the downloaded file under `root`.
    pub fn path(&self, root: &Path) -> PathBuf {
        join_relative(root, &self.filename)
    }

    /// Local directory the file is placed in under `root`.
    pub fn subdir_path(&self, root: &Path) -> PathBuf {
        join_relative(root, &self.subdir)
    }

    /// Directory an archive expands into: the file path without its suffix.
    ///
    /// Returns `None` for non-archive resources.
    pub fn expanded_dir(&self, root: &Path) -> Option<PathBuf> {
        self.filename
            .strip_suffix(ARCHIVE_SUFFIX)
            .map(|stem| join_relative(root, stem))
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// What a group was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupKind {
    /// Every item of one language code.
    Language(String),
    /// Every item of one task.
    Task(String),
    /// A collection declared explicitly in the index.
    Collection,
}

/// A named aggregation of items and/or other groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    /// Unique id (`LANG:<code>`, `TASK:<task>` or a collection id).
    pub id: String,

    /// Display name.
    pub name: String,

    /// How the group was derived.
    pub kind: GroupKind,

    /// Direct children, in index order.
    pub children: Vec<Entry>,

    /// Every item reachable through `children`, without duplicates.
    pub packages: Vec<Arc<Item>>,
}

impl Group {
    /// The language code for `LANG:` groups.
    pub fn language(&self) -> Option<&str> {
        match &self.kind {
            GroupKind::Language(code) => Some(code),
            _ => None,
        }
    }

    /// The task name for `TASK:` groups.
    pub fn task(&self) -> Option<&str> {
        match &self.kind {
            GroupKind::Task(task) => Some(task),
            _ => None,
        }
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Either an item or a group; the unit a download or status query targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Item(Arc<Item>),
    Group(Arc<Group>),
}

impl Entry {
    /// The entity id.
    pub fn id(&self) -> &str {
        match self {
            Entry::Item(item) => &item.id,
            Entry::Group(group) => &group.id,
        }
    }

    /// The display name.
    pub fn name(&self) -> &str {
        match self {
            Entry::Item(item) => &item.name,
            Entry::Group(group) => &group.name,
        }
    }

    /// Number of items this entry stands for when weighting progress.
    pub fn package_count(&self) -> usize {
        match self {
            Entry::Item(_) => 1,
            Entry::Group(group) => group.packages.len(),
        }
    }
}

impl From<Arc<Item>> for Entry {
    fn from(item: Arc<Item>) -> Self {
        Entry::Item(item)
    }
}

impl From<Arc<Group>> for Entry {
    fn from(group: Arc<Group>) -> Self {
        Entry::Group(group)
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Join a `/`-separated relative path onto `root` component by component.
fn join_relative(root: &Path, relative: &str) -> PathBuf {
    relative
        .split('/')
        .filter(|part| !part.is_empty())
        .fold(root.to_path_buf(), |path, part| path.join(part))
}
