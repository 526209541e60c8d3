//! Simulator data sources.
//!
//! A [`TelemetrySource`] hides how raw offsets are fetched. The decoder only
//! needs two reads per offset: the raw integer, or, for position offsets,
//! decimal degrees. The set of implementations is closed and chosen by
//! [`SourceKind`] at startup:
//!
//! - [`FsuipcSource`]: live simulator over FSUIPC IPC (Windows)
//! - [`SnapshotSource`]: raw values loaded from a YAML file (any platform)

pub(crate) mod fsuipc;
mod snapshot;

pub use fsuipc::{FsuipcSource, binary_degrees_latitude, binary_degrees_longitude};
pub use snapshot::{SnapshotFile, SnapshotSource};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::offsets::Offset;
use crate::{BridgeConfig, BridgeError, Result};

/// Capability interface of the simulator data source.
///
/// `refresh` fetches one coherent set of raw values; the read methods serve
/// from that set until the next refresh.
#[async_trait::async_trait]
pub trait TelemetrySource: Send {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Establish the simulator link.
    async fn connect(&mut self) -> Result<()>;

    /// Tear down the simulator link. Calling this while disconnected is a no-op.
    async fn disconnect(&mut self) -> Result<()>;

    /// Fetch a fresh set of raw values for every offset in the table.
    async fn refresh(&mut self) -> Result<()>;

    /// Raw integer for `offset`, sign-extended according to its width.
    fn read_raw(&self, offset: &Offset) -> Result<i64>;

    /// Signed decimal degrees for a binary-degree position offset.
    fn read_degrees(&self, offset: &Offset) -> Result<f64>;
}

/// Which data source the bridge reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    #[default]
    Fsuipc,
    Snapshot,
}

impl SourceKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            SourceKind::Fsuipc => "fsuipc",
            SourceKind::Snapshot => "snapshot",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fsuipc" => Ok(SourceKind::Fsuipc),
            "snapshot" => Ok(SourceKind::Snapshot),
            other => Err(BridgeError::config(format!(
                "unknown source '{other}' (expected 'fsuipc' or 'snapshot')"
            ))),
        }
    }
}

/// Build the configured source. The returned source is not yet connected.
pub fn build_source(config: &BridgeConfig) -> Result<Box<dyn TelemetrySource>> {
    match config.source {
        SourceKind::Fsuipc => Ok(Box::new(FsuipcSource::new())),
        SourceKind::Snapshot => {
            let path = config.snapshot_path.clone().ok_or_else(|| {
                BridgeError::config("the snapshot source requires snapshot_path")
            })?;
            Ok(Box::new(SnapshotSource::from_path(path)))
        }
    }
}
