//! Publication of wire messages to the consumer.
//!
//! [`SharedBufferPublisher`] owns the named region and the liveness handle
//! for as long as it lives. The OS specifics sit behind [`RegionBackend`]:
//!
//! - Windows: named file mapping plus named mutex (`crate::windows`)
//! - elsewhere: a 4096-byte file mapped with `memmap2` plus a marker file
//! - tests: [`MemoryBackend`]
//!
//! Every backend shares the byte layout in [`frame`].

pub mod frame;
#[cfg(not(windows))]
mod file_region;
mod memory;

pub use frame::{REGION_SIZE, TERMINATOR_LEN, encode_utf16le, read_frame, write_frame};
#[cfg(not(windows))]
pub use file_region::{FileBackend, FileLiveness, FileRegion, default_region_dir, inspect_region};
pub use memory::{MemoryBackend, MemoryLiveness, MemoryRegion};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, trace, warn};

use crate::encoder::WireMessage;
use crate::{BridgeConfig, BridgeError, Result};

/// Name of the shared region the consumer maps.
pub const DEFAULT_REGION_NAME: &str = "NGSIMCONNECT";

/// Name of the liveness handle the consumer checks before reading.
pub const DEFAULT_LIVENESS_NAME: &str = "SIMLINK_PLUGIN";

/// A writable view over a named region.
pub trait MappedRegion: Send {
    /// The whole mapped region.
    fn bytes_mut(&mut self) -> &mut [u8];

    /// Make written bytes visible to other processes.
    fn flush(&mut self) -> Result<()>;

    /// Release the view.
    fn unmap(self) -> Result<()>
    where
        Self: Sized;
}

/// OS objects a publisher needs: one region and one liveness handle.
///
/// Both are created or opened by name. An object that already exists is
/// reused, never treated as a conflict.
pub trait RegionBackend: Send {
    type Region: MappedRegion;
    type Liveness: Send;

    fn open_liveness(&mut self, name: &str) -> Result<Self::Liveness>;

    fn open_region(&mut self, name: &str, size: usize) -> Result<Self::Region>;

    fn release_liveness(&mut self, liveness: Self::Liveness) -> Result<()>;
}

/// Destination for encoded telemetry.
pub trait TelemetrySink: Send {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Publish one message, returning the payload size in bytes.
    fn publish(&mut self, message: &WireMessage) -> Result<usize>;

    /// Release everything the sink holds. Safe to call more than once.
    fn close(&mut self);
}

/// Which sink the bridge publishes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SinkKind {
    #[default]
    SharedMemory,
    Console,
}

impl SinkKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            SinkKind::SharedMemory => "shared-memory",
            SinkKind::Console => "console",
        }
    }
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SinkKind {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "shared-memory" => Ok(SinkKind::SharedMemory),
            "console" => Ok(SinkKind::Console),
            other => Err(BridgeError::config(format!(
                "unknown sink '{other}' (expected 'shared-memory' or 'console')"
            ))),
        }
    }
}

/// Publisher over a named shared region.
///
/// Opening acquires the liveness handle first, then the region, so the
/// consumer never sees the handle without a region to read. There is no
/// lock shared with the reader; a torn read is possible and accepted.
pub struct SharedBufferPublisher<B: RegionBackend> {
    backend: B,
    region_name: String,
    liveness_name: String,
    region: Option<B::Region>,
    liveness: Option<B::Liveness>,
}

impl<B: RegionBackend> SharedBufferPublisher<B> {
    /// Acquire the liveness handle and map the region.
    pub fn open(mut backend: B, region_name: &str, liveness_name: &str) -> Result<Self> {
        let liveness = backend.open_liveness(liveness_name)?;

        let region = match backend.open_region(region_name, REGION_SIZE) {
            Ok(region) => region,
            Err(e) => {
                if let Err(release_err) = backend.release_liveness(liveness) {
                    warn!("Failed to release liveness handle {}: {}", liveness_name, release_err);
                }
                return Err(e);
            }
        };

        info!(region = region_name, liveness = liveness_name, "Shared region open");
        Ok(Self {
            backend,
            region_name: region_name.to_string(),
            liveness_name: liveness_name.to_string(),
            region: Some(region),
            liveness: Some(liveness),
        })
    }

    pub fn region_name(&self) -> &str {
        &self.region_name
    }

    pub fn is_open(&self) -> bool {
        self.region.is_some()
    }

    /// The backend, for inspection.
    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B: RegionBackend> TelemetrySink for SharedBufferPublisher<B> {
    fn name(&self) -> &'static str {
        "shared-memory"
    }

    fn publish(&mut self, message: &WireMessage) -> Result<usize> {
        let json = message.to_json()?;
        let region = self
            .region
            .as_mut()
            .ok_or_else(|| BridgeError::region_access(&self.region_name, "publisher is closed"))?;

        let written = write_frame(region.bytes_mut(), &json)?;
        region.flush()?;

        trace!(bytes = written, "Frame written to {}", self.region_name);
        Ok(written)
    }

    fn close(&mut self) {
        if let Some(region) = self.region.take() {
            if let Err(e) = region.unmap() {
                warn!("Failed to unmap region {}: {}", self.region_name, e);
            }
        }
        if let Some(liveness) = self.liveness.take() {
            if let Err(e) = self.backend.release_liveness(liveness) {
                warn!("Failed to release liveness handle {}: {}", self.liveness_name, e);
            }
            debug!(region = %self.region_name, "Shared region closed");
        }
    }
}

impl<B: RegionBackend> Drop for SharedBufferPublisher<B> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Sink printing each message as one JSON line on stdout.
///
/// Messages are framed into a scratch region first, so a message that would
/// not fit the shared region fails here as well.
pub struct ConsoleSink {
    scratch: Vec<u8>,
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self { scratch: vec![0; REGION_SIZE] }
    }
}

impl TelemetrySink for ConsoleSink {
    fn name(&self) -> &'static str {
        "console"
    }

    fn publish(&mut self, message: &WireMessage) -> Result<usize> {
        let json = message.to_json()?;
        let written = write_frame(&mut self.scratch, &json)?;
        println!("{json}");
        Ok(written)
    }

    fn close(&mut self) {}
}

/// Region backend for the current platform.
#[cfg(windows)]
pub type PlatformBackend = crate::windows::Win32Backend;

/// Region backend for the current platform.
#[cfg(not(windows))]
pub type PlatformBackend = FileBackend;

#[cfg(windows)]
fn platform_backend(_config: &BridgeConfig) -> PlatformBackend {
    crate::windows::Win32Backend::new()
}

#[cfg(not(windows))]
fn platform_backend(config: &BridgeConfig) -> PlatformBackend {
    FileBackend::new(config.shm_dir.clone().unwrap_or_else(default_region_dir))
}

/// Open the configured sink.
pub fn open_sink(config: &BridgeConfig) -> Result<Box<dyn TelemetrySink>> {
    match config.sink {
        SinkKind::SharedMemory => Ok(Box::new(SharedBufferPublisher::open(
            platform_backend(config),
            &config.region_name,
            &config.liveness_name,
        )?)),
        SinkKind::Console => Ok(Box::new(ConsoleSink::new())),
    }
}
