//! Remote index wire formats.
//!
//! Two shapes are accepted and mapped to the same [`Item`]:
//!
//! - **Mirror**: a flat `index.json` document served next to the resources,
//!   `{"items": [...], "collections": [...]}`.
//! - **Bucket**: a cloud-storage object listing,
//!   `{"kind": "storage#objects", "items": [...], "nextPageToken": "..."}`.
//!
//! Both carry one entry per stored object:
//!
//! ```text
//! {
//!   "id":        "polyglot-models/ner2/en/en.zip/1423178562000000",
//!   "name":      "ner2/en/en.zip",
//!   "mediaLink": "https://.../ner2%2Fen%2Fen.zip?alt=media",
//!   "size":      "1000",
//!   "metadata":  { "unzipped_size": "5000" }
//! }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

use super::entity::Item;

/// Default cloud-storage JSON API endpoint.
pub const DEFAULT_BUCKET_API: &str = "https://www.googleapis.com";

/// Mirror index document name.
pub const MIRROR_INDEX_FILENAME: &str = "index.json";

/// Which wire shape the configured index URL serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexSource {
    /// A mirror directory with an `index.json` listing.
    #[default]
    Mirror,
    /// A cloud-storage bucket listed through its JSON API.
    Bucket,
}

impl IndexSource {
    /// Config-file spelling of this source.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mirror => "mirror",
            Self::Bucket => "bucket",
        }
    }
}

impl fmt::Display for IndexSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mirror" => Ok(Self::Mirror),
            "bucket" | "google" => Ok(Self::Bucket),
            other => Err(format!(
                "unknown index source '{}' (expected 'mirror' or 'bucket')",
                other
            )),
        }
    }
}

/// URL of the mirror index document under `base`.
pub fn mirror_index_url(base: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), MIRROR_INDEX_FILENAME)
}

/// URL of one page of a bucket listing.
pub fn bucket_listing_url(api_base: &str, bucket: &str, page_token: Option<&str>) -> String {
    let mut url = format!(
        "{}/storage/v1/b/{}/o",
        api_base.trim_end_matches('/'),
        bucket.trim_matches('/')
    );
    if let Some(token) = page_token {
        url.push_str("?pageToken=");
        url.push_str(token);
    }
    url
}

/// Errors raised while decoding an index document.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    /// The document is not valid JSON of the expected shape.
    #[error("invalid index document: {0}")]
    Malformed(String),

    /// An entry's storage path does not have `<root>/<task>/<lang>/...` form.
    #[error("entry {id:?} has an unexpected storage path")]
    BadStoragePath { id: String },

    /// An entry's object name does not have `<task>/<lang>/<file>` form.
    #[error("entry {name:?} is not stored under <task>/<language>/")]
    BadObjectName { name: String },

    /// A numeric field could not be parsed.
    #[error("entry {id:?} has invalid {field}: {value:?}")]
    BadNumber {
        id: String,
        field: &'static str,
        value: String,
    },
}

/// A decoded index document (one page for bucket listings).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IndexDocument {
    /// One entry per stored resource.
    #[serde(default)]
    pub items: Vec<IndexEntry>,

    /// Explicit collections (mirror indexes only).
    #[serde(default)]
    pub collections: Vec<CollectionSpec>,

    /// Continuation token for paged bucket listings.
    #[serde(default, rename = "nextPageToken")]
    pub next_page_token: Option<String>,
}

impl IndexDocument {
    /// Decode a document from raw bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self, WireError> {
        serde_json::from_slice(bytes).map_err(|e| WireError::Malformed(e.to_string()))
    }
}

/// A quantity that listings encode either as a JSON number or a decimal string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Quantity {
    Number(u64),
    Text(String),
}

impl Quantity {
    fn value(&self) -> Option<u64> {
        match self {
            Quantity::Number(n) => Some(*n),
            Quantity::Text(s) => s.trim().parse().ok(),
        }
    }

    fn raw(&self) -> String {
        match self {
            Quantity::Number(n) => n.to_string(),
            Quantity::Text(s) => s.clone(),
        }
    }
}

/// One stored object as listed by either wire format.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexEntry {
    /// Storage path: `<root>/<task>/<lang>/<file>[/<generation>]`.
    pub id: String,

    /// Object name relative to the root: `<task>/<lang>/<file>`.
    pub name: String,

    /// Download URL.
    #[serde(rename = "mediaLink", alias = "url")]
    pub media_link: String,

    /// File size in bytes.
    pub size: Quantity,

    /// Expanded archive size, when given as a top-level field.
    #[serde(default)]
    pub unzipped_size: Option<Quantity>,

    /// Custom object metadata (strings only in bucket listings).
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl IndexEntry {
    /// Map the entry onto the catalog's [`Item`] shape.
    pub fn to_item(&self) -> Result<Item, WireError> {
        let path: Vec<&str> = self.id.split('/').collect();
        if path.len() < 3 || path[1].is_empty() || path[2].is_empty() {
            return Err(WireError::BadStoragePath {
                id: self.id.clone(),
            });
        }
        let id = format!("{}.{}", path[1], path[2]);

        let subdir = match self.name.rsplit_once('/') {
            Some((dir, file)) if !file.is_empty() => dir.to_string(),
            _ => {
                return Err(WireError::BadObjectName {
                    name: self.name.clone(),
                })
            }
        };
        let mut dirs = subdir.split('/');
        let (task, language) = match (dirs.next(), dirs.next()) {
            (Some(task), Some(lang)) if !task.is_empty() && !lang.is_empty() => {
                (task.to_string(), lang.to_string())
            }
            _ => {
                return Err(WireError::BadObjectName {
                    name: self.name.clone(),
                })
            }
        };

        let size = self.size.value().ok_or_else(|| WireError::BadNumber {
            id: self.id.clone(),
            field: "size",
            value: self.size.raw(),
        })?;

        let unzipped = self
            .unzipped_size
            .clone()
            .or_else(|| self.metadata.get("unzipped_size").cloned().map(Quantity::Text));
        let unzipped_size = match unzipped {
            Some(q) => q.value().ok_or_else(|| WireError::BadNumber {
                id: self.id.clone(),
                field: "unzipped_size",
                value: q.raw(),
            })?,
            None => 0,
        };

        Ok(Item {
            id,
            url: self.media_link.clone(),
            name: self.name.replace('/', "."),
            subdir,
            size,
            filename: self.name.clone(),
            task,
            language,
            unzipped_size,
        })
    }
}

/// An explicitly declared collection of items and/or groups.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CollectionSpec {
    /// Collection id; must not clash with any item or derived group.
    pub id: String,

    /// Display name (defaults to the id).
    #[serde(default)]
    pub name: Option<String>,

    /// Ids of direct children.
    #[serde(default)]
    pub children: Vec<String>,
}
