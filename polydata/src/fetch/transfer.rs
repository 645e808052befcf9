//! Chunked transfer of a resource file to disk.

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::catalog::Item;
use crate::error::{SyncError, SyncResult};
use crate::transport::{BodyReader, Transport};

/// Bytes read from the network per block (16KB).
pub const CHUNK_SIZE: usize = 16 * 1024;

/// Item progress when the transfer starts.
pub const TRANSFER_START: f64 = 5.0;

/// Item progress when the transfer is complete.
pub const TRANSFER_END: f64 = 80.0;

/// Number of blocks the transfer is expected to take, at least one.
pub fn expected_blocks(size: u64) -> f64 {
    (size as f64 / CHUNK_SIZE as f64).max(1.0)
}

/// Item progress after `block` blocks of an `expected`-block transfer.
pub fn transfer_progress(block: u64, expected: f64) -> f64 {
    (TRANSFER_START + (TRANSFER_END - TRANSFER_START) * block as f64 / expected).min(TRANSFER_END)
}

/// Outcome of one [`Transfer::step`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransferStep {
    /// A block was written; progress is reported on every second block.
    Block { progress: Option<f64> },
    /// The body is exhausted and the file is flushed.
    Done { bytes: u64 },
}

/// An in-flight download of one item.
pub struct Transfer {
    id: String,
    url: String,
    path: PathBuf,
    reader: BodyReader,
    writer: BufWriter<File>,
    buffer: Vec<u8>,
    block: u64,
    expected: f64,
    bytes: u64,
}

impl Transfer {
    /// Remove any previous copy, ensure the target directory exists and
    /// open both ends of the transfer.
    pub fn begin<T: Transport + ?Sized>(
        transport: &T,
        item: &Item,
        root: &Path,
    ) -> SyncResult<Self> {
        let failed = |reason: String| SyncError::Transfer {
            id: item.id.clone(),
            url: item.url.clone(),
            reason,
        };

        let path = item.path(root);
        match fs::remove_file(&path) {
            Ok(()) => debug!(path = %path.display(), "Removed previous download"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(failed(format!("cannot remove {}: {}", path.display(), e))),
        }

        let subdir = item.subdir_path(root);
        fs::create_dir_all(&subdir)
            .map_err(|e| failed(format!("cannot create {}: {}", subdir.display(), e)))?;

        let reader = transport.open(&item.url).map_err(|e| failed(e.to_string()))?;
        let file = File::create(&path)
            .map_err(|e| failed(format!("cannot create {}: {}", path.display(), e)))?;

        debug!(id = %item.id, url = %item.url, path = %path.display(), "Transfer started");
        Ok(Self {
            id: item.id.clone(),
            url: item.url.clone(),
            path,
            reader,
            writer: BufWriter::new(file),
            buffer: vec![0u8; CHUNK_SIZE],
            block: 0,
            expected: expected_blocks(item.size),
            bytes: 0,
        })
    }

    /// Path the file is written to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Move one block from the network to the file.
    pub fn step(&mut self) -> SyncResult<TransferStep> {
        let n = read_block(&mut self.reader, &mut self.buffer)
            .map_err(|e| self.failed(e.to_string()))?;

        if n == 0 {
            self.writer
                .flush()
                .map_err(|e| self.failed(format!("cannot write {}: {}", self.path.display(), e)))?;
            debug!(id = %self.id, bytes = self.bytes, "Transfer finished");
            return Ok(TransferStep::Done { bytes: self.bytes });
        }

        self.writer
            .write_all(&self.buffer[..n])
            .map_err(|e| self.failed(format!("cannot write {}: {}", self.path.display(), e)))?;
        self.bytes += n as u64;

        let block = self.block;
        self.block += 1;
        let progress = (block % 2 == 0).then(|| transfer_progress(block, self.expected));
        Ok(TransferStep::Block { progress })
    }

    fn failed(&self, reason: String) -> SyncError {
        SyncError::Transfer {
            id: self.id.clone(),
            url: self.url.clone(),
            reason,
        }
    }
}

/// Fill `buf` from `reader`, stopping early only at end of stream.
fn read_block(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::make_item;
    use crate::transport::tests::MockTransport;
    use tempfile::TempDir;

    fn run(transfer: &mut Transfer) -> SyncResult<(Vec<f64>, u64)> {
        let mut progress = Vec::new();
        loop {
            match transfer.step()? {
                TransferStep::Block { progress: Some(p) } => progress.push(p),
                TransferStep::Block { progress: None } => {}
                TransferStep::Done { bytes } => return Ok((progress, bytes)),
            }
        }
    }

    #[test]
    fn test_progress_formula() {
        assert_eq!(transfer_progress(0, 10.0), 5.0);
        assert_eq!(transfer_progress(5, 10.0), 42.5);
        assert_eq!(transfer_progress(10, 10.0), 80.0);
        // Servers sending more than announced never push past the transfer band.
        assert_eq!(transfer_progress(40, 10.0), 80.0);
        assert_eq!(expected_blocks(100), 1.0);
        assert_eq!(expected_blocks(4 * CHUNK_SIZE as u64), 4.0);
    }

    #[test]
    fn test_transfer_writes_file_and_reports_every_second_block() {
        let temp = TempDir::new().unwrap();
        let size = 5 * CHUNK_SIZE;
        let item = make_item("ner2", "en", "en.zip", size as u64);
        let transport = MockTransport::new().serve(&item.url, vec![1u8; size]);

        let mut transfer = Transfer::begin(&transport, &item, temp.path()).unwrap();
        let (progress, bytes) = run(&mut transfer).unwrap();

        assert_eq!(bytes, size as u64);
        assert_eq!(progress, vec![5.0, 35.0, 65.0]);
        assert_eq!(
            fs::metadata(temp.path().join("ner2/en/en.zip")).unwrap().len(),
            size as u64
        );
    }

    #[test]
    fn test_transfer_replaces_previous_file() {
        let temp = TempDir::new().unwrap();
        let item = make_item("pos2", "de", "de.zip", 3);
        fs::create_dir_all(temp.path().join("pos2/de")).unwrap();
        fs::write(temp.path().join("pos2/de/de.zip"), b"old contents").unwrap();
        let transport = MockTransport::new().serve(&item.url, b"new".to_vec());

        let mut transfer = Transfer::begin(&transport, &item, temp.path()).unwrap();
        run(&mut transfer).unwrap();
        assert_eq!(fs::read(temp.path().join("pos2/de/de.zip")).unwrap(), b"new");
    }

    #[test]
    fn test_missing_url_fails_before_file_is_created() {
        let temp = TempDir::new().unwrap();
        let item = make_item("pos2", "de", "de.zip", 3);
        let err = Transfer::begin(&MockTransport::new(), &item, temp.path())
            .err()
            .unwrap();
        assert!(matches!(err, SyncError::Transfer { ref id, .. } if id == "pos2.de"));
        assert!(!temp.path().join("pos2/de/de.zip").exists());
    }

    #[test]
    fn test_broken_stream_is_transfer_error() {
        let temp = TempDir::new().unwrap();
        let item = make_item("ner2", "en", "en.zip", 100_000);
        let transport = MockTransport::new()
            .serve(&item.url, vec![0u8; 100_000])
            .fail_after(&item.url, 20_000);

        let mut transfer = Transfer::begin(&transport, &item, temp.path()).unwrap();
        let err = run(&mut transfer).unwrap_err();
        assert!(err.to_string().contains("connection reset"));
    }
}
