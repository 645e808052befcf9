//! Error types for the synchronization engine.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::transport::TransportError;

/// Result type for engine operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while loading the catalog or syncing resources.
///
/// Catalog and configuration failures abort the whole operation. Transfer
/// and archive failures are normally reported inline as
/// [`Event::Error`](crate::protocol::Event::Error) and only surface here
/// when a caller asks the driver to raise on error.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The remote index could not be fetched, parsed or resolved.
    #[error("catalog unavailable from {url}: {reason}")]
    CatalogUnavailable { url: String, reason: String },

    /// No `LANG:` group exists for the requested language.
    #[error("language {0} is not supported")]
    LanguageNotSupported(String),

    /// No `TASK:` group exists for the requested task.
    #[error("task {0} is not supported")]
    TaskNotSupported(String),

    /// The identifier names neither an item nor a group.
    #[error("package {0:?} not found in index")]
    UnknownIdentifier(String),

    /// A transfer or filesystem operation failed mid-download.
    #[error("error downloading {id:?} from <{url}>: {reason}")]
    Transfer {
        id: String,
        url: String,
        reason: String,
    },

    /// A downloaded archive is corrupt or could not be expanded.
    #[error("failed to expand {}: {reason}", path.display())]
    Archive { path: PathBuf, reason: String },

    /// The engine could not be configured.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A resource a collaborator depends on has not been downloaded yet.
    #[error("resource {id} is not downloaded; run `polydata download {id}`")]
    NotDownloaded { id: String },

    /// Failed to read a file or directory.
    #[error("failed to read {}: {source}", path.display())]
    ReadFailed { path: PathBuf, source: io::Error },
}

impl SyncError {
    /// Wrap a transport failure that happened while loading an index.
    pub(crate) fn catalog(url: &str, err: impl ToString) -> Self {
        Self::CatalogUnavailable {
            url: url.to_string(),
            reason: err.to_string(),
        }
    }

    /// Whether the failure is recoverable by retrying the same item.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transfer { .. } | Self::Archive { .. })
    }
}

impl From<TransportError> for SyncError {
    fn from(e: TransportError) -> Self {
        let url = e.url().unwrap_or_default().to_string();
        Self::CatalogUnavailable {
            url,
            reason: e.to_string(),
        }
    }
}

impl From<ConfigError> for SyncError {
    fn from(e: ConfigError) -> Self {
        Self::Configuration(e.to_string())
    }
}
