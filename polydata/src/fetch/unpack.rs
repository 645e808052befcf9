//! Zip expansion, one file per step.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;
use zip::ZipArchive;

use crate::error::{SyncError, SyncResult};

/// Item progress when expansion starts.
pub const UNPACK_START: f64 = 80.0;

/// Item progress when expansion is complete.
pub const UNPACK_END: f64 = 100.0;

/// Outcome of one [`Expansion::step`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnpackStep {
    /// One file was written; progress ticks roughly every tenth of the files.
    File { progress: Option<f64> },
    /// Every file has been written.
    Done { files: usize },
}

/// An archive being expanded under a target directory.
pub struct Expansion {
    archive_path: PathBuf,
    target: PathBuf,
    archive: ZipArchive<BufReader<File>>,
    files: Vec<(usize, PathBuf)>,
    next: usize,
}

impl Expansion {
    /// Open the archive, validate every entry path and create the directory
    /// tree (parents before children).
    pub fn open(archive_path: &Path, target: &Path) -> SyncResult<Self> {
        let failed = |reason: String| SyncError::Archive {
            path: archive_path.to_path_buf(),
            reason,
        };

        let file = File::open(archive_path).map_err(|e| failed(e.to_string()))?;
        let mut archive = ZipArchive::new(BufReader::new(file))
            .map_err(|e| failed(format!("not a valid zip archive: {}", e)))?;

        let mut dirs = BTreeSet::new();
        let mut files = Vec::new();
        for index in 0..archive.len() {
            let entry = archive
                .by_index(index)
                .map_err(|e| failed(format!("unreadable entry #{}: {}", index, e)))?;
            let relative = entry
                .enclosed_name()
                .map(Path::to_path_buf)
                .ok_or_else(|| failed(format!("entry {:?} escapes the target", entry.name())))?;

            if entry.is_dir() {
                dirs.insert(relative);
            } else {
                if let Some(parent) = relative.parent() {
                    if !parent.as_os_str().is_empty() {
                        dirs.insert(parent.to_path_buf());
                    }
                }
                files.push((index, relative));
            }
        }

        fs::create_dir_all(target)
            .map_err(|e| failed(format!("cannot create {}: {}", target.display(), e)))?;
        for dir in &dirs {
            let path = target.join(dir);
            fs::create_dir_all(&path)
                .map_err(|e| failed(format!("cannot create {}: {}", path.display(), e)))?;
        }

        debug!(
            archive = %archive_path.display(),
            dirs = dirs.len(),
            files = files.len(),
            "Expanding archive"
        );
        Ok(Self {
            archive_path: archive_path.to_path_buf(),
            target: target.to_path_buf(),
            archive,
            files,
            next: 0,
        })
    }

    /// Number of files the archive holds.
    pub fn total_files(&self) -> usize {
        self.files.len()
    }

    /// Write the next file.
    pub fn step(&mut self) -> SyncResult<UnpackStep> {
        let total = self.files.len();
        let Some((index, relative)) = self.files.get(self.next).cloned() else {
            return Ok(UnpackStep::Done { files: total });
        };

        let dest = self.target.join(&relative);
        self.extract(index, &dest).map_err(|e| SyncError::Archive {
            path: self.archive_path.clone(),
            reason: format!("{}: {}", relative.display(), e),
        })?;
        self.next += 1;

        let done = self.next;
        let progress = (done * 10 / total > (done - 1) * 10 / total)
            .then(|| unpack_progress(done, total));
        Ok(UnpackStep::File { progress })
    }

    fn extract(&mut self, index: usize, dest: &Path) -> io::Result<()> {
        let mut entry = self.archive.by_index(index)?;
        let mut writer = BufWriter::new(File::create(dest)?);
        io::copy(&mut entry, &mut writer)?;
        writer.flush()
    }
}

/// Item progress after `done` of `total` files.
pub fn unpack_progress(done: usize, total: usize) -> f64 {
    if total == 0 {
        return UNPACK_END;
    }
    UNPACK_START + (UNPACK_END - UNPACK_START) * done as f64 / total as f64
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use zip::write::FileOptions;
    use zip::ZipWriter;
    use tempfile::TempDir;

    /// Build a zip archive in memory from `(name, contents)` pairs; names
    /// ending in `/` become directory entries.
    pub(crate) fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(io::Cursor::new(Vec::new()));
        for (name, contents) in entries {
            if name.ends_with('/') {
                writer.add_directory(*name, FileOptions::default()).unwrap();
            } else {
                writer.start_file(*name, FileOptions::default()).unwrap();
                writer.write_all(contents).unwrap();
            }
        }
        writer.finish().unwrap().into_inner()
    }

    fn expand_all(expansion: &mut Expansion) -> SyncResult<Vec<f64>> {
        let mut ticks = Vec::new();
        loop {
            match expansion.step()? {
                UnpackStep::File { progress: Some(p) } => ticks.push(p),
                UnpackStep::File { progress: None } => {}
                UnpackStep::Done { .. } => return Ok(ticks),
            }
        }
    }

    #[test]
    fn test_expands_nested_entries() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("en.zip");
        fs::write(
            &archive,
            build_zip(&[
                ("en/", b""),
                ("en/model.bin", b"weights"),
                ("en/vocab/words.txt", b"a\nb\n"),
            ]),
        )
        .unwrap();

        let target = temp.path().join("out");
        let mut expansion = Expansion::open(&archive, &target).unwrap();
        assert_eq!(expansion.total_files(), 2);
        let ticks = expand_all(&mut expansion).unwrap();

        assert_eq!(ticks, vec![90.0, 100.0]);
        assert_eq!(fs::read(target.join("en/model.bin")).unwrap(), b"weights");
        assert_eq!(fs::read(target.join("en/vocab/words.txt")).unwrap(), b"a\nb\n");
    }

    #[test]
    fn test_ticks_every_tenth_of_files() {
        let temp = TempDir::new().unwrap();
        let names: Vec<String> = (0..40).map(|i| format!("d/f{:02}", i)).collect();
        let entries: Vec<(&str, &[u8])> = names.iter().map(|n| (n.as_str(), &b"x"[..])).collect();
        let archive = temp.path().join("many.zip");
        fs::write(&archive, build_zip(&entries)).unwrap();

        let mut expansion = Expansion::open(&archive, &temp.path().join("out")).unwrap();
        let ticks = expand_all(&mut expansion).unwrap();
        assert_eq!(ticks.len(), 10);
        assert_eq!(ticks.last().copied(), Some(100.0));
        assert!(ticks.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_corrupt_archive_is_archive_error() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("bad.zip");
        fs::write(&archive, b"this is not a zip file").unwrap();

        let err = Expansion::open(&archive, temp.path()).err().unwrap();
        assert!(matches!(err, SyncError::Archive { .. }));
        assert!(err.to_string().contains("not a valid zip archive"));
    }

    #[test]
    fn test_escaping_entry_is_rejected() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("evil.zip");
        fs::write(&archive, build_zip(&[("../../etc/evil", b"x")])).unwrap();

        let target = temp.path().join("out");
        let err = Expansion::open(&archive, &target).err().unwrap();
        assert!(err.to_string().contains("escapes the target"));
        assert!(!temp.path().join("etc").exists());
    }

    #[test]
    fn test_empty_archive_is_done_immediately() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("empty.zip");
        fs::write(&archive, build_zip(&[])).unwrap();

        let mut expansion = Expansion::open(&archive, &temp.path().join("out")).unwrap();
        assert_eq!(expansion.step().unwrap(), UnpackStep::Done { files: 0 });
        assert_eq!(unpack_progress(0, 0), 100.0);
    }
}
