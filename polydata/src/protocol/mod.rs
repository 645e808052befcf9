//! The download progress protocol.
//!
//! [`DownloadStream`] turns a download request into an ordered sequence of
//! [`Event`]s. Consumers pull events one at a time; nothing runs between
//! calls to `next`.

mod event;
mod stream;

pub use event::Event;
pub use stream::DownloadStream;
