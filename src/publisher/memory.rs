//! In-process region backend.
//!
//! Models the consumer's view of the region: writes land in a private view
//! and only become visible in [`MemoryBackend::contents`] after a flush.
//! Clones share the same state, so a test can keep one clone for inspection
//! while the publisher owns another.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{MappedRegion, RegionBackend};
use crate::{BridgeError, Result};

#[derive(Debug, Default)]
struct MemoryState {
    bytes: Vec<u8>,
    liveness_handles: usize,
    region_views: usize,
    flushes: usize,
    deny_access: bool,
}

/// Region backend held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend whose liveness handle cannot be opened.
    pub fn denying_access() -> Self {
        let backend = Self::new();
        backend.lock().deny_access = true;
        backend
    }

    /// Backend where a region of `size` bytes already exists.
    pub fn with_existing_region(size: usize) -> Self {
        let backend = Self::new();
        backend.lock().bytes = vec![0; size];
        backend
    }

    /// Bytes visible to a reader, as of the last flush.
    pub fn contents(&self) -> Vec<u8> {
        self.lock().bytes.clone()
    }

    pub fn liveness_held(&self) -> bool {
        self.lock().liveness_handles > 0
    }

    pub fn region_mapped(&self) -> bool {
        self.lock().region_views > 0
    }

    pub fn flush_count(&self) -> usize {
        self.lock().flushes
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Liveness handle of a [`MemoryBackend`].
#[derive(Debug)]
pub struct MemoryLiveness {
    _private: (),
}

/// Private view of a [`MemoryBackend`] region.
#[derive(Debug)]
pub struct MemoryRegion {
    view: Vec<u8>,
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryRegion {
    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MappedRegion for MemoryRegion {
    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.view
    }

    fn flush(&mut self) -> Result<()> {
        let mut state = self.lock();
        state.bytes.copy_from_slice(&self.view);
        state.flushes += 1;
        Ok(())
    }

    fn unmap(self) -> Result<()> {
        drop(self);
        Ok(())
    }
}

impl Drop for MemoryRegion {
    fn drop(&mut self) {
        let mut state = self.lock();
        state.region_views = state.region_views.saturating_sub(1);
    }
}

impl RegionBackend for MemoryBackend {
    type Region = MemoryRegion;
    type Liveness = MemoryLiveness;

    fn open_liveness(&mut self, name: &str) -> Result<MemoryLiveness> {
        let mut state = self.lock();
        if state.deny_access {
            return Err(BridgeError::handle_access(name, "access denied"));
        }
        state.liveness_handles += 1;
        Ok(MemoryLiveness { _private: () })
    }

    fn open_region(&mut self, name: &str, size: usize) -> Result<MemoryRegion> {
        let mut state = self.lock();
        if state.bytes.is_empty() {
            state.bytes = vec![0; size];
        } else if state.bytes.len() != size {
            return Err(BridgeError::region_access(
                name,
                format!("region exists with {} bytes, expected {size}", state.bytes.len()),
            ));
        }
        state.region_views += 1;
        let view = state.bytes.clone();
        drop(state);

        Ok(MemoryRegion { view, state: Arc::clone(&self.state) })
    }

    fn release_liveness(&mut self, _liveness: MemoryLiveness) -> Result<()> {
        let mut state = self.lock();
        state.liveness_handles = state.liveness_handles.saturating_sub(1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_are_invisible_until_flushed() {
        let mut backend = MemoryBackend::new();
        let mut region = backend.open_region("R", 8).unwrap();

        region.bytes_mut()[0] = 9;
        assert_eq!(backend.contents()[0], 0);

        region.flush().unwrap();
        assert_eq!(backend.contents()[0], 9);
        assert_eq!(backend.flush_count(), 1);
    }

    #[test]
    fn reopened_region_sees_existing_bytes() {
        let mut backend = MemoryBackend::new();
        let mut first = backend.open_region("R", 4).unwrap();
        first.bytes_mut().copy_from_slice(&[1, 2, 3, 4]);
        first.flush().unwrap();
        first.unmap().unwrap();

        let mut second = backend.open_region("R", 4).unwrap();
        assert_eq!(second.bytes_mut(), &[1, 2, 3, 4]);
        assert!(backend.region_mapped());
    }

    #[test]
    fn liveness_handles_are_counted() {
        let mut backend = MemoryBackend::new();
        let a = backend.open_liveness("L").unwrap();
        let b = backend.open_liveness("L").unwrap();
        backend.release_liveness(a).unwrap();
        assert!(backend.liveness_held());
        backend.release_liveness(b).unwrap();
        assert!(!backend.liveness_held());
    }
}
