//! Pull-based download state machine.
//!
//! The stream keeps a stack of frames. Each call to `next` drains queued
//! events first; when the queue is empty the top frame is popped, advanced by
//! one bounded unit of work (a status check, a couple of network blocks, one
//! archive member) and, if unfinished, pushed back as its own continuation.
//! Lists and groups push their continuation before their next child, so
//! children always run to completion before their siblings.

use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::event::Event;
use crate::catalog::{Entry, Group, Item};
use crate::engine::Engine;
use crate::error::{SyncError, SyncResult};
use crate::fetch::{
    Expansion, Transfer, TransferStep, UnpackPolicy, UnpackStep, TRANSFER_END, TRANSFER_START,
};
use crate::status::Status;
use crate::transport::Transport;

/// Slice of the overall 0..100 progress range owned by one entry.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Band {
    start: f64,
    width: f64,
}

impl Band {
    const FULL: Band = Band {
        start: 0.0,
        width: 100.0,
    };

    /// Map an entry-local percentage onto the overall range.
    fn at(&self, local: f64) -> f64 {
        self.start + local * self.width / 100.0
    }
}

enum Phase {
    Begin,
    Transfer(Transfer),
    Unpack(Expansion),
}

struct ItemTask {
    item: Arc<Item>,
    band: Band,
    phase: Phase,
}

enum GroupStage {
    Start,
    Finish,
}

enum Frame {
    List {
        entries: Vec<Entry>,
        next: usize,
        total: usize,
        cursor: f64,
        band: Band,
    },
    Group {
        group: Arc<Group>,
        band: Band,
        stage: GroupStage,
    },
    Item(ItemTask),
}

impl Frame {
    fn list(entries: Vec<Entry>, band: Band) -> Self {
        let total = entries.iter().map(Entry::package_count).sum();
        Frame::List {
            entries,
            next: 0,
            total,
            cursor: band.start,
            band,
        }
    }

    fn entry(entry: Entry, band: Band) -> Self {
        match entry {
            Entry::Item(item) => Frame::Item(ItemTask {
                item,
                band,
                phase: Phase::Begin,
            }),
            Entry::Group(group) => Frame::Group {
                group,
                band,
                stage: GroupStage::Start,
            },
        }
    }
}

/// A lazy sequence of [`Event`]s for one download request.
///
/// Created by [`Engine::incremental_download`]. Work only happens inside
/// [`Iterator::next`]; dropping the stream cancels the download. Dropping it
/// between `StartUnpack` and `FinishUnpack` leaves a partially expanded
/// archive on disk, which the next status check reports as stale.
pub struct DownloadStream<'a, T: Transport> {
    engine: &'a mut Engine<T>,
    dir: PathBuf,
    force: bool,
    unpack: UnpackPolicy,
    stack: Vec<Frame>,
    queue: VecDeque<Event>,
    last_failure: Option<(Arc<Item>, Band)>,
}

impl<'a, T: Transport> DownloadStream<'a, T> {
    /// Build a stream over resolved targets; unresolved ids become errors
    /// that are reported before any download starts.
    pub(crate) fn new(
        engine: &'a mut Engine<T>,
        targets: Vec<Result<Entry, String>>,
        dir: Option<&Path>,
        force: bool,
    ) -> Self {
        let mut queue = VecDeque::new();
        let dir = match dir {
            Some(dir) => dir.to_path_buf(),
            None => {
                let dir = engine.download_dir().to_path_buf();
                queue.push_back(Event::SelectDownloadDir(dir.clone()));
                dir
            }
        };

        let mut entries = Vec::with_capacity(targets.len());
        for target in targets {
            match target {
                Ok(entry) => entries.push(entry),
                Err(id) => {
                    warn!(id = %id, "Unknown package id");
                    queue.push_back(Event::Error {
                        reason: SyncError::UnknownIdentifier(id.clone()).to_string(),
                        id,
                        item: None,
                    });
                }
            }
        }

        let unpack = engine.config().unpack();
        Self {
            engine,
            dir,
            force,
            unpack,
            stack: vec![Frame::list(entries, Band::FULL)],
            queue,
            last_failure: None,
        }
    }

    /// Directory resources are written to.
    pub fn download_dir(&self) -> &Path {
        &self.dir
    }

    /// The item whose failure was reported most recently and not yet retried,
    /// if that failure can be cured by downloading again.
    pub fn last_failure(&self) -> Option<&Arc<Item>> {
        self.last_failure.as_ref().map(|(item, _)| item)
    }

    /// Queue the most recently failed item again, in its original progress
    /// band. Returns `false` when there is nothing to retry.
    pub fn retry(&mut self) -> bool {
        match self.last_failure.take() {
            Some((item, band)) => {
                info!(id = %item.id, "Retrying download");
                self.stack.push(Frame::Item(ItemTask {
                    item,
                    band,
                    phase: Phase::Begin,
                }));
                true
            }
            None => false,
        }
    }

    fn emit(&mut self, event: Event) {
        self.queue.push_back(event);
    }

    fn advance(&mut self, frame: Frame) {
        match frame {
            Frame::List {
                entries,
                next,
                total,
                cursor,
                band,
            } => {
                let Some(entry) = entries.get(next).cloned() else {
                    return;
                };
                let width = if total == 0 {
                    0.0
                } else {
                    band.width * entry.package_count() as f64 / total as f64
                };
                self.stack.push(Frame::List {
                    entries,
                    next: next + 1,
                    total,
                    cursor: cursor + width,
                    band,
                });
                self.stack.push(Frame::entry(
                    entry,
                    Band {
                        start: cursor,
                        width,
                    },
                ));
            }
            Frame::Group {
                group,
                band,
                stage: GroupStage::Start,
            } => {
                debug!(id = %group.id, packages = group.packages.len(), "Starting collection");
                self.emit(Event::StartGroup(group.clone()));
                let children = group.children.clone();
                self.stack.push(Frame::Group {
                    group,
                    band,
                    stage: GroupStage::Finish,
                });
                self.stack.push(Frame::list(children, band));
            }
            Frame::Group {
                group,
                stage: GroupStage::Finish,
                ..
            } => {
                self.emit(Event::FinishGroup(group));
            }
            Frame::Item(task) => self.advance_item(task),
        }
    }

    fn advance_item(&mut self, task: ItemTask) {
        let ItemTask { item, band, phase } = task;
        let result = match phase {
            Phase::Begin => self.begin_item(&item, band),
            Phase::Transfer(transfer) => self.continue_transfer(&item, band, transfer),
            Phase::Unpack(expansion) => self.continue_unpack(&item, band, expansion),
        };

        match result {
            Ok(Some(phase)) => self.stack.push(Frame::Item(ItemTask { item, band, phase })),
            Ok(None) => {}
            Err(e) => self.fail(item, band, e),
        }
    }

    fn begin_item(&mut self, item: &Arc<Item>, band: Band) -> SyncResult<Option<Phase>> {
        self.emit(Event::StartItem(item.clone()));
        self.emit(Event::Progress(band.at(0.0)));

        let status = self.engine.resolver.item_status(item, Some(&self.dir))?;
        if status == Status::Installed && !self.force {
            debug!(id = %item.id, "Already up-to-date");
            self.emit(Event::UpToDate(item.clone()));
            self.emit(Event::Progress(band.at(100.0)));
            self.emit(Event::FinishItem(item.clone()));
            return Ok(None);
        }

        self.engine.resolver.clear_cache(Some(&item.id));
        if status == Status::Stale {
            warn!(id = %item.id, "Replacing out-of-date copy");
            self.emit(Event::Stale(item.clone()));
        }

        self.emit(Event::StartTransfer(item.clone()));
        self.emit(Event::Progress(band.at(TRANSFER_START)));
        let transfer = Transfer::begin(&self.engine.transport, item, &self.dir)?;
        Ok(Some(Phase::Transfer(transfer)))
    }

    fn continue_transfer(
        &mut self,
        item: &Arc<Item>,
        band: Band,
        mut transfer: Transfer,
    ) -> SyncResult<Option<Phase>> {
        let bytes = loop {
            match transfer.step()? {
                TransferStep::Block {
                    progress: Some(progress),
                } => {
                    self.emit(Event::Progress(band.at(progress)));
                    return Ok(Some(Phase::Transfer(transfer)));
                }
                TransferStep::Block { progress: None } => {}
                TransferStep::Done { bytes } => break bytes,
            }
        };
        drop(transfer);

        if bytes != item.size {
            warn!(
                id = %item.id,
                expected = item.size,
                actual = bytes,
                "Downloaded size differs from index"
            );
        }
        self.emit(Event::FinishTransfer(item.clone()));
        self.emit(Event::Progress(band.at(TRANSFER_END)));

        if let Some(expanded) = item.expanded_dir(&self.dir) {
            if self.unpack == UnpackPolicy::Always || expanded.exists() {
                self.emit(Event::StartUnpack(item.clone()));
                let expansion =
                    Expansion::open(&item.path(&self.dir), &item.subdir_path(&self.dir))?;
                return Ok(Some(Phase::Unpack(expansion)));
            }
        }

        self.finish_item(item, band);
        Ok(None)
    }

    fn continue_unpack(
        &mut self,
        item: &Arc<Item>,
        band: Band,
        mut expansion: Expansion,
    ) -> SyncResult<Option<Phase>> {
        loop {
            match expansion.step()? {
                UnpackStep::File {
                    progress: Some(progress),
                } => {
                    self.emit(Event::Progress(band.at(progress)));
                    return Ok(Some(Phase::Unpack(expansion)));
                }
                UnpackStep::File { progress: None } => {}
                UnpackStep::Done { files } => {
                    debug!(id = %item.id, files, "Archive expanded");
                    break;
                }
            }
        }

        self.emit(Event::FinishUnpack(item.clone()));
        self.finish_item(item, band);
        Ok(None)
    }

    fn finish_item(&mut self, item: &Arc<Item>, band: Band) {
        self.engine.resolver.clear_cache(Some(&item.id));
        info!(id = %item.id, dir = %self.dir.display(), "Package installed");
        self.emit(Event::Progress(band.at(100.0)));
        self.emit(Event::FinishItem(item.clone()));
    }

    fn fail(&mut self, item: Arc<Item>, band: Band, err: SyncError) {
        warn!(id = %item.id, error = %err, "Package failed");
        if let SyncError::Archive { path, .. } = &err {
            // A corrupt archive of the right size would otherwise read as installed.
            match fs::remove_file(path) {
                Ok(()) => debug!(path = %path.display(), "Removed unusable archive"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Cannot remove archive"),
            }
        }
        self.engine.resolver.clear_cache(Some(&item.id));
        self.emit(Event::Error {
            id: item.id.clone(),
            item: Some(item.clone()),
            reason: err.to_string(),
        });
        self.last_failure = err.is_retryable().then_some((item, band));
    }
}

impl<T: Transport> Iterator for DownloadStream<'_, T> {
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        loop {
            if let Some(event) = self.queue.pop_front() {
                return Some(event);
            }
            let frame = self.stack.pop()?;
            self.advance(frame);
        }
    }
}
