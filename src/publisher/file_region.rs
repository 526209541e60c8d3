//! File-backed region for hosts without named kernel mappings.
//!
//! The region is `<dir>/<name>`, exactly [`REGION_SIZE`] bytes, mapped
//! shared with `memmap2` so any process mapping the same file sees the
//! writes. The liveness handle is a marker file `<dir>/<liveness name>`
//! that exists while any publisher holds it. Each holder keeps a shared
//! advisory lock on the marker; a release removes the file only when it can
//! take the lock exclusively, i.e. when it was the last holder.

use memmap2::MmapMut;
use std::fs::{File, OpenOptions, TryLockError};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{MappedRegion, REGION_SIZE, RegionBackend, read_frame};
use crate::{BridgeError, Result};

/// Default directory for region files: `/dev/shm` when present, else the
/// temp dir.
pub fn default_region_dir() -> PathBuf {
    let shm = Path::new("/dev/shm");
    if shm.is_dir() { shm.to_path_buf() } else { std::env::temp_dir() }
}

/// Read the current message out of a region file without mapping it.
pub fn inspect_region(dir: &Path, name: &str) -> Result<String> {
    let path = dir.join(name);
    let bytes = std::fs::read(&path).map_err(|e| {
        BridgeError::region_access_with_source(
            path.display().to_string(),
            "cannot read region file",
            Box::new(e),
        )
    })?;
    read_frame(&bytes)
}

/// Attempts at taking a marker that a concurrent last holder is removing.
const MARKER_OPEN_ATTEMPTS: usize = 3;

/// Region backend over plain files.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Marker file held open while the publisher is live.
#[derive(Debug)]
pub struct FileLiveness {
    path: PathBuf,
    _file: File,
}

/// Shared writable mapping of a region file.
#[derive(Debug)]
pub struct FileRegion {
    path: PathBuf,
    map: MmapMut,
}

impl MappedRegion for FileRegion {
    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.map[..]
    }

    fn flush(&mut self) -> Result<()> {
        self.map.flush().map_err(|e| {
            BridgeError::region_access_with_source(
                self.path.display().to_string(),
                "flush failed",
                Box::new(e),
            )
        })
    }

    fn unmap(self) -> Result<()> {
        debug!(path = %self.path.display(), "Unmapping region file");
        drop(self.map);
        Ok(())
    }
}

impl RegionBackend for FileBackend {
    type Region = FileRegion;
    type Liveness = FileLiveness;

    fn open_liveness(&mut self, name: &str) -> Result<FileLiveness> {
        let path = self.dir.join(name);
        let handle_err = |reason: &str, e: io::Error| {
            BridgeError::handle_access_with_source(name, reason, Box::new(e))
        };

        for _ in 0..MARKER_OPEN_ATTEMPTS {
            let file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&path)
                .map_err(|e| handle_err("cannot create marker file", e))?;
            file.lock_shared().map_err(|e| handle_err("cannot lock marker file", e))?;

            // A releasing last holder may have unlinked the file we opened.
            if path.exists() {
                debug!(path = %path.display(), "Liveness marker held");
                return Ok(FileLiveness { path, _file: file });
            }
        }

        Err(BridgeError::handle_access(name, "marker file keeps disappearing"))
    }

    fn open_region(&mut self, name: &str, size: usize) -> Result<FileRegion> {
        let path = self.dir.join(name);
        let access = |reason: &str, e: io::Error| {
            BridgeError::region_access_with_source(name, reason, Box::new(e))
        };

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| access("cannot open region file", e))?;

        let len = file.metadata().map_err(|e| access("cannot stat region file", e))?.len();
        if len == 0 {
            file.set_len(size as u64).map_err(|e| access("cannot size region file", e))?;
        } else if len != size as u64 {
            return Err(BridgeError::region_access(
                name,
                format!("region file has {len} bytes, expected {size}"),
            ));
        }

        // SAFETY: the file is sized above; other writers are outside our control,
        // which the protocol accepts as torn reads
        let map = unsafe { MmapMut::map_mut(&file) }.map_err(|e| access("mmap failed", e))?;

        debug!(path = %path.display(), size, "Region file mapped");
        Ok(FileRegion { path, map })
    }

    fn release_liveness(&mut self, liveness: FileLiveness) -> Result<()> {
        let FileLiveness { path, _file: file } = liveness;
        let handle_err = |reason: &str, e: io::Error| {
            BridgeError::handle_access_with_source(path.display().to_string(), reason, Box::new(e))
        };

        file.unlock().map_err(|e| handle_err("cannot unlock marker file", e))?;
        match file.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => {
                debug!(path = %path.display(), "Liveness marker still held elsewhere");
                return Ok(());
            }
            Err(TryLockError::Error(e)) => return Err(handle_err("cannot lock marker file", e)),
        }

        let removed = match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(handle_err("cannot remove marker file", e)),
        };
        drop(file);
        debug!(path = %path.display(), "Liveness marker removed");
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::write_frame;

    #[test]
    fn region_file_is_created_at_full_size() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = FileBackend::new(dir.path());

        let mut region = backend.open_region("NGSIMCONNECT", REGION_SIZE).unwrap();
        write_frame(region.bytes_mut(), "{\"a\":1}").unwrap();
        region.flush().unwrap();
        region.unmap().unwrap();

        let on_disk = std::fs::read(dir.path().join("NGSIMCONNECT")).unwrap();
        assert_eq!(on_disk.len(), REGION_SIZE);
        assert_eq!(inspect_region(dir.path(), "NGSIMCONNECT").unwrap(), "{\"a\":1}");
    }

    #[test]
    fn existing_region_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = FileBackend::new(dir.path());

        let first = backend.open_region("R", REGION_SIZE).unwrap();
        let second = backend.open_region("R", REGION_SIZE).unwrap();
        first.unmap().unwrap();
        second.unmap().unwrap();
    }

    #[test]
    fn mismatched_size_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("R"), [0u8; 100]).unwrap();

        let mut backend = FileBackend::new(dir.path());
        let result = backend.open_region("R", REGION_SIZE);
        assert!(matches!(result, Err(BridgeError::RegionAccess { .. })));
    }

    #[test]
    fn liveness_marker_exists_while_held() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = FileBackend::new(dir.path());
        let marker = dir.path().join("SIMLINK_PLUGIN");

        let first = backend.open_liveness("SIMLINK_PLUGIN").unwrap();
        let second = backend.open_liveness("SIMLINK_PLUGIN").unwrap();
        assert!(marker.exists());

        backend.release_liveness(first).unwrap();
        assert!(marker.exists());
        backend.release_liveness(second).unwrap();
        assert!(!marker.exists());
    }

    #[test]
    fn restarted_publisher_keeps_marker_when_old_one_exits() {
        let dir = tempfile::tempdir().unwrap();
        let mut old = FileBackend::new(dir.path());
        let mut restarted = FileBackend::new(dir.path());
        let marker = dir.path().join("SIMLINK_PLUGIN");

        let old_handle = old.open_liveness("SIMLINK_PLUGIN").unwrap();
        let new_handle = restarted.open_liveness("SIMLINK_PLUGIN").unwrap();

        old.release_liveness(old_handle).unwrap();
        assert!(marker.exists());

        restarted.release_liveness(new_handle).unwrap();
        assert!(!marker.exists());

        // The marker can be taken again after the last release.
        let again = restarted.open_liveness("SIMLINK_PLUGIN").unwrap();
        assert!(marker.exists());
        restarted.release_liveness(again).unwrap();
    }

    #[test]
    fn missing_directory_is_a_handle_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = FileBackend::new(dir.path().join("absent"));
        assert!(matches!(
            backend.open_liveness("SIMLINK_PLUGIN"),
            Err(BridgeError::HandleAccess { .. })
        ));
    }
}
