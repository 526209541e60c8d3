//! FSUIPC window-message transport.
//!
//! Follows the FSUIPC SDK client: find the `UIPCMAIN` window, register the
//! `FsasmLib:IPC` message, create a uniquely named file mapping and publish
//! its name as a global atom. Each request is a `SendMessageTimeoutA` carrying
//! that atom; FSUIPC answers in place inside the mapping.

use std::collections::HashMap;
use std::ptr::NonNull;
use tracing::{debug, trace, warn};
use windows::Win32::Foundation::{
    CloseHandle, ERROR_ALREADY_EXISTS, GetLastError, HANDLE, HWND, INVALID_HANDLE_VALUE, LPARAM,
    WPARAM,
};
use windows::Win32::System::DataExchange::{GlobalAddAtomA, GlobalDeleteAtom};
use windows::Win32::System::Memory::{
    CreateFileMappingA, FILE_MAP_ALL_ACCESS, MEMORY_MAPPED_VIEW_ADDRESS, MapViewOfFile,
    PAGE_READWRITE, UnmapViewOfFile,
};
use windows::Win32::System::Threading::GetCurrentProcessId;
use windows::Win32::UI::WindowsAndMessaging::{
    FindWindowExA, RegisterWindowMessageA, SMTO_BLOCK, SendMessageTimeoutA,
};
use windows::core::{PCSTR, s};

use crate::source::fsuipc::{IPC_BLOCK_SIZE, ReadRequest, collect_read_results, write_read_requests};
use crate::{BridgeError, Result};

/// Reply value FSUIPC returns when a request block was processed.
const FS6IPC_MESSAGE_SUCCESS: usize = 1;

/// How long FSUIPC may take to answer one request block.
const SEND_TIMEOUT_MS: u32 = 2000;

/// Mapping names tried before giving up.
const MAX_NAME_ATTEMPTS: u32 = 16;

/// Open IPC channel to FSUIPC.
pub struct FsuipcLink {
    window: HWND,
    message: u32,
    atom: u16,
    mapping: HANDLE,
    view: NonNull<u8>,
    released: bool,
}

impl FsuipcLink {
    /// Locate FSUIPC and set up the shared request block.
    pub fn open() -> Result<Self> {
        trace!("Looking for the FSUIPC window");

        let window = unsafe { FindWindowExA(None, None, s!("UIPCMAIN"), PCSTR::null()) }
            .map_err(|e| {
                BridgeError::connect_failed_with_source(
                    "FSUIPC window not found; is the simulator running with FSUIPC?",
                    Box::new(e),
                )
            })?;

        let message = unsafe { RegisterWindowMessageA(s!("FsasmLib:IPC")) };
        if message == 0 {
            return Err(BridgeError::connect_failed_with_source(
                "RegisterWindowMessageA failed",
                Box::new(windows::core::Error::from_thread()),
            ));
        }

        let pid = unsafe { GetCurrentProcessId() };
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = format!("FsasmLib:IPC:{pid:X}:{attempt:X}\0");
            let name_ptr = PCSTR::from_raw(name.as_ptr());

            let atom = unsafe { GlobalAddAtomA(name_ptr) };
            if atom == 0 {
                return Err(BridgeError::connect_failed_with_source(
                    "GlobalAddAtomA failed",
                    Box::new(windows::core::Error::from_thread()),
                ));
            }

            let mapping = match unsafe {
                CreateFileMappingA(
                    INVALID_HANDLE_VALUE,
                    None,
                    PAGE_READWRITE,
                    0,
                    IPC_BLOCK_SIZE as u32,
                    name_ptr,
                )
            } {
                Ok(mapping) => mapping,
                Err(e) => {
                    unsafe { GlobalDeleteAtom(atom) };
                    return Err(BridgeError::connect_failed_with_source(
                        "CreateFileMappingA failed for the FSUIPC request block",
                        Box::new(e),
                    ));
                }
            };

            if unsafe { GetLastError() } == ERROR_ALREADY_EXISTS {
                debug!(attempt, "IPC mapping name in use, trying the next one");
                unsafe {
                    let _ = CloseHandle(mapping);
                    GlobalDeleteAtom(atom);
                }
                continue;
            }

            let view = unsafe { MapViewOfFile(mapping, FILE_MAP_ALL_ACCESS, 0, 0, 0) };
            let Some(view) = NonNull::new(view.Value as *mut u8) else {
                let win_err = windows::core::Error::from_thread();
                unsafe {
                    let _ = CloseHandle(mapping);
                    GlobalDeleteAtom(atom);
                }
                return Err(BridgeError::windows_api_error("MapViewOfFile", win_err));
            };

            debug!(name = name.trim_end_matches('\0'), "FSUIPC request block mapped");
            return Ok(Self { window, message, atom, mapping, view, released: false });
        }

        Err(BridgeError::connect_failed(format!(
            "no free FSUIPC IPC mapping name after {MAX_NAME_ATTEMPTS} attempts"
        )))
    }

    /// Send one batch of reads and return the bytes FSUIPC filled in, keyed by offset.
    pub(crate) fn process_reads(&mut self, reads: &[ReadRequest]) -> Result<HashMap<u32, Vec<u8>>> {
        // SAFETY: view maps IPC_BLOCK_SIZE writable bytes for the lifetime of self
        let block = unsafe { std::slice::from_raw_parts_mut(self.view.as_ptr(), IPC_BLOCK_SIZE) };
        let slots = write_read_requests(block, reads)?;

        let mut reply = 0usize;
        let sent = unsafe {
            SendMessageTimeoutA(
                self.window,
                self.message,
                WPARAM(self.atom as usize),
                LPARAM(0),
                SMTO_BLOCK,
                SEND_TIMEOUT_MS,
                Some(&mut reply as *mut usize),
            )
        };

        if sent.0 == 0 {
            return Err(BridgeError::decode_failed(
                "request",
                format!(
                    "FSUIPC did not answer within {SEND_TIMEOUT_MS}ms: {}",
                    windows::core::Error::from_thread()
                ),
            ));
        }
        if reply != FS6IPC_MESSAGE_SUCCESS {
            return Err(BridgeError::decode_failed(
                "request",
                format!("FSUIPC rejected the request block (reply {reply})"),
            ));
        }

        Ok(collect_read_results(block, &slots))
    }

    /// Unmap the request block and drop the atom.
    pub fn close(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        unsafe {
            GlobalDeleteAtom(self.atom);
            let addr = MEMORY_MAPPED_VIEW_ADDRESS { Value: self.view.as_ptr() as *mut _ };
            UnmapViewOfFile(addr)
                .map_err(|e| BridgeError::windows_api_error("UnmapViewOfFile", e))?;
            CloseHandle(self.mapping).map_err(|e| BridgeError::windows_api_error("CloseHandle", e))
        }
    }
}

impl Drop for FsuipcLink {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("Failed to release FSUIPC link: {}", e);
        }
    }
}

// SAFETY: the link owns its window-message handles and mapping exclusively and
// is only driven from one task at a time
unsafe impl Send for FsuipcLink {}
