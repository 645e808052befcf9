//! Polydata - catalog, status and download engine for multilingual NLP resources
//!
//! This library keeps a local data directory in sync with a remote catalog of
//! models and corpora. It loads the catalog, works out what is installed,
//! stale or partially present, and downloads and unpacks resources while
//! reporting progress as a stream of [`Event`]s.
//!
//! # Example
//!
//! ```no_run
//! use polydata::{Engine, EngineConfig, Event};
//!
//! let mut engine = Engine::new(EngineConfig::default())?;
//! for event in engine.incremental_download(&["TASK:pos2"], None, false)? {
//!     if let Event::Progress(p) = event {
//!         println!("{p:.0}%");
//!     }
//! }
//! # Ok::<(), polydata::SyncError>(())
//! ```

pub mod catalog;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod protocol;
pub mod status;
pub mod transport;

pub use catalog::{Catalog, Entry, Group, Item};
pub use config::{ConfigFile, EngineConfig};
pub use driver::{
    DownloadOptions, Driver, ErrorAction, ErrorPolicy, NullReporter, ReportContext, Reporter,
    SkipErrors, TracingReporter,
};
pub use engine::Engine;
pub use error::{SyncError, SyncResult};
pub use protocol::{DownloadStream, Event};
pub use status::Status;
pub use transport::{BodyReader, ReqwestTransport, Transport, TransportError};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
