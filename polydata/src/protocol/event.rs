//! Events emitted while a download stream runs.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::catalog::{Group, Item};

/// One step in the lifecycle of a download.
///
/// For a single item the sequence is:
///
/// ```text
/// StartItem, Progress(0), [UpToDate | Stale],
/// StartTransfer, Progress(5), Progress(..)*, FinishTransfer, Progress(80),
/// [StartUnpack, Progress(..)*, FinishUnpack],
/// Progress(100), FinishItem
/// ```
///
/// An up-to-date item skips straight from `UpToDate` to `Progress(100)`.
/// Any failure ends the item's sequence with [`Event::Error`].
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The caller did not choose a directory; this one is used.
    SelectDownloadDir(PathBuf),

    StartGroup(Arc<Group>),
    FinishGroup(Arc<Group>),

    StartItem(Arc<Item>),
    FinishItem(Arc<Item>),

    StartTransfer(Arc<Item>),
    FinishTransfer(Arc<Item>),

    StartUnpack(Arc<Item>),
    FinishUnpack(Arc<Item>),

    /// The item is already installed and will not be fetched.
    UpToDate(Arc<Item>),

    /// A previous copy is out of date or corrupt and will be replaced.
    Stale(Arc<Item>),

    /// Overall progress of the stream, 0 to 100.
    Progress(f64),

    /// An item failed, or an id could not be resolved (`item` is `None`).
    Error {
        id: String,
        item: Option<Arc<Item>>,
        reason: String,
    },
}

impl Event {
    /// The item this event concerns, if any.
    pub fn item(&self) -> Option<&Arc<Item>> {
        match self {
            Event::StartItem(item)
            | Event::FinishItem(item)
            | Event::StartTransfer(item)
            | Event::FinishTransfer(item)
            | Event::StartUnpack(item)
            | Event::FinishUnpack(item)
            | Event::UpToDate(item)
            | Event::Stale(item) => Some(item),
            Event::Error { item, .. } => item.as_ref(),
            _ => None,
        }
    }

    /// The group this event concerns, if any.
    pub fn group(&self) -> Option<&Arc<Group>> {
        match self {
            Event::StartGroup(group) | Event::FinishGroup(group) => Some(group),
            _ => None,
        }
    }

    pub fn progress(&self) -> Option<f64> {
        match self {
            Event::Progress(p) => Some(*p),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Event::Error { .. })
    }

    /// Stable name of the event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::SelectDownloadDir(_) => "select_download_dir",
            Event::StartGroup(_) => "start_group",
            Event::FinishGroup(_) => "finish_group",
            Event::StartItem(_) => "start_item",
            Event::FinishItem(_) => "finish_item",
            Event::StartTransfer(_) => "start_transfer",
            Event::FinishTransfer(_) => "finish_transfer",
            Event::StartUnpack(_) => "start_unpack",
            Event::FinishUnpack(_) => "finish_unpack",
            Event::UpToDate(_) => "up_to_date",
            Event::Stale(_) => "stale",
            Event::Progress(_) => "progress",
            Event::Error { .. } => "error",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::SelectDownloadDir(dir) => write!(f, "Using data directory {}", dir.display()),
            Event::StartGroup(group) => write!(f, "Downloading collection {}", group.id),
            Event::FinishGroup(group) => write!(f, "Done downloading collection {}", group.id),
            Event::StartItem(item) => write!(f, "Downloading package {}", item.id),
            Event::FinishItem(item) => write!(f, "Finished package {}", item.id),
            Event::StartTransfer(item) => write!(f, "Fetching {}", item.url),
            Event::FinishTransfer(item) => write!(f, "Fetched {}", item.filename),
            Event::StartUnpack(item) => write!(f, "Unzipping {}", item.filename),
            Event::FinishUnpack(item) => write!(f, "Unzipped {}", item.filename),
            Event::UpToDate(item) => write!(f, "Package {} is already up-to-date", item.id),
            Event::Stale(item) => write!(f, "Package {} is out-of-date or corrupt", item.id),
            Event::Progress(p) => write!(f, "{:.0}%", p),
            Event::Error { reason, .. } => f.write_str(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::make_item;

    #[test]
    fn test_event_accessors() {
        let item = Arc::new(make_item("ner2", "en", "en.zip", 1));
        let start = Event::StartItem(item.clone());
        assert_eq!(start.item(), Some(&item));
        assert_eq!(start.kind(), "start_item");
        assert!(start.group().is_none());

        let error = Event::Error {
            id: "nope".to_string(),
            item: None,
            reason: "package \"nope\" not found in index".to_string(),
        };
        assert!(error.is_error());
        assert!(error.item().is_none());
        assert_eq!(error.to_string(), "package \"nope\" not found in index");

        assert_eq!(Event::Progress(42.4).progress(), Some(42.4));
        assert_eq!(Event::Progress(42.4).to_string(), "42%");
    }

    #[test]
    fn test_event_display() {
        let item = Arc::new(make_item("ner2", "en", "en.zip", 1));
        assert_eq!(
            Event::UpToDate(item.clone()).to_string(),
            "Package ner2.en is already up-to-date"
        );
        assert_eq!(
            Event::StartUnpack(item).to_string(),
            "Unzipping ner2/en/en.zip"
        );
    }
}
