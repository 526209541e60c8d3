//! Named Win32 file mapping and liveness mutex.
//!
//! The region is a pagefile-backed mapping created or opened by name, and the
//! liveness handle is a named mutex that is never acquired. Its existence is
//! the only signal the consumer reads from it.

use std::ptr::NonNull;
use tracing::debug;
use windows::Win32::Foundation::{
    CloseHandle, ERROR_ALREADY_EXISTS, GetLastError, HANDLE, INVALID_HANDLE_VALUE,
};
use windows::Win32::System::Memory::{
    CreateFileMappingW, FILE_MAP_ALL_ACCESS, FlushViewOfFile, MEMORY_MAPPED_VIEW_ADDRESS,
    MapViewOfFile, PAGE_READWRITE, UnmapViewOfFile,
};
use windows::Win32::System::Threading::CreateMutexW;
use windows::core::PCWSTR;

use crate::publisher::{MappedRegion, RegionBackend};
use crate::{BridgeError, Result};

/// Named mutex handle signalling that a publisher may be active.
pub struct Win32Liveness(HANDLE);

// SAFETY: kernel handles may be closed from any thread
unsafe impl Send for Win32Liveness {}

/// Writable view over a named file mapping.
pub struct Win32Region {
    name: String,
    mapping: HANDLE,
    view: NonNull<u8>,
    len: usize,
    released: bool,
}

// SAFETY: the view is owned exclusively by this value and only written through &mut self
unsafe impl Send for Win32Region {}

impl Win32Region {
    fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        unsafe {
            let addr = MEMORY_MAPPED_VIEW_ADDRESS { Value: self.view.as_ptr() as *mut _ };
            UnmapViewOfFile(addr).map_err(|e| {
                BridgeError::region_access_with_source(&self.name, "unmap failed", Box::new(e))
            })?;
            CloseHandle(self.mapping).map_err(|e| {
                BridgeError::region_access_with_source(&self.name, "close failed", Box::new(e))
            })
        }
    }
}

impl MappedRegion for Win32Region {
    fn bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: view maps len writable bytes until release
        unsafe { std::slice::from_raw_parts_mut(self.view.as_ptr(), self.len) }
    }

    fn flush(&mut self) -> Result<()> {
        unsafe { FlushViewOfFile(self.view.as_ptr() as *const _, self.len) }.map_err(|e| {
            BridgeError::region_access_with_source(
                &self.name,
                "FlushViewOfFile failed",
                Box::new(e),
            )
        })
    }

    fn unmap(mut self) -> Result<()> {
        self.release()
    }
}

impl Drop for Win32Region {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

/// Region backend using named Win32 kernel objects.
#[derive(Debug, Default, Clone, Copy)]
pub struct Win32Backend;

impl Win32Backend {
    pub fn new() -> Self {
        Self
    }
}

impl RegionBackend for Win32Backend {
    type Region = Win32Region;
    type Liveness = Win32Liveness;

    fn open_liveness(&mut self, name: &str) -> Result<Win32Liveness> {
        let wide_name = wide_string(name);
        let handle = unsafe { CreateMutexW(None, false, PCWSTR::from_raw(wide_name.as_ptr())) }
            .map_err(|e| {
                BridgeError::handle_access_with_source(name, "CreateMutexW failed", Box::new(e))
            })?;

        // Stale handles from crashed consumers are expected.
        if unsafe { GetLastError() } == ERROR_ALREADY_EXISTS {
            debug!(name, "Reusing existing liveness handle");
        } else {
            debug!(name, "Created liveness handle");
        }
        Ok(Win32Liveness(handle))
    }

    fn open_region(&mut self, name: &str, size: usize) -> Result<Win32Region> {
        let wide_name = wide_string(name);
        let mapping = unsafe {
            CreateFileMappingW(
                INVALID_HANDLE_VALUE,
                None,
                PAGE_READWRITE,
                0,
                size as u32,
                PCWSTR::from_raw(wide_name.as_ptr()),
            )
        }
        .map_err(|e| {
            BridgeError::region_access_with_source(name, "CreateFileMappingW failed", Box::new(e))
        })?;

        let existed = unsafe { GetLastError() } == ERROR_ALREADY_EXISTS;

        let view = unsafe { MapViewOfFile(mapping, FILE_MAP_ALL_ACCESS, 0, 0, size) };
        let Some(view) = NonNull::new(view.Value as *mut u8) else {
            let win_err = windows::core::Error::from_thread();
            unsafe {
                let _ = CloseHandle(mapping);
            }
            return Err(BridgeError::region_access_with_source(
                name,
                format!("cannot map {size} bytes; the region may be in use with another size"),
                Box::new(win_err),
            ));
        };

        debug!(name, size, existed, "Shared region mapped");
        Ok(Win32Region { name: name.to_string(), mapping, view, len: size, released: false })
    }

    fn release_liveness(&mut self, liveness: Win32Liveness) -> Result<()> {
        unsafe { CloseHandle(liveness.0) }.map_err(|e| {
            BridgeError::handle_access_with_source("liveness", "CloseHandle failed", Box::new(e))
        })
    }
}

/// Convert string to null-terminated wide string for Windows APIs
fn wide_string(s: &str) -> Vec<u16> {
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;
    OsStr::new(s).encode_wide().chain(std::iter::once(0)).collect()
}
