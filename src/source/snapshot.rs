//! Snapshot source backed by a YAML file of raw offset values.
//!
//! The file is re-read on every refresh, so editing it while the bridge runs
//! changes what gets published. Offsets missing from the file read as zero,
//! the same as an offset the simulator does not populate.
//!
//! ```yaml
//! latitude: 47.4502
//! longitude: -122.3088
//! offsets:
//!   indicated_airspeed: 32000   # 250 kt * 128
//!   squawk: 4608                # 0x1200
//!   paused: 0
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace};

use super::TelemetrySource;
use crate::offsets::{Axis, DecodeKind, Field, Offset};
use crate::{BridgeError, Result};

/// On-disk snapshot layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapshotFile {
    /// Latitude in signed decimal degrees.
    #[serde(default)]
    pub latitude: f64,
    /// Longitude in signed decimal degrees.
    #[serde(default)]
    pub longitude: f64,
    /// Raw offset values keyed by field name.
    #[serde(default)]
    pub offsets: HashMap<Field, i64>,
}

impl SnapshotFile {
    /// Parse a snapshot from YAML text.
    pub fn parse(yaml: &str) -> std::result::Result<Self, serde_yaml_ng::Error> {
        serde_yaml_ng::from_str(yaml)
    }

    /// Read and parse a snapshot file.
    pub fn load(path: &Path) -> Result<Self> {
        let text =
            std::fs::read_to_string(path).map_err(|e| BridgeError::snapshot(path, e))?;
        Self::parse(&text).map_err(|e| BridgeError::snapshot(path, e))
    }
}

/// Telemetry source serving raw values from a [`SnapshotFile`].
pub struct SnapshotSource {
    path: Option<PathBuf>,
    pending: Option<SnapshotFile>,
    current: Option<SnapshotFile>,
    connected: bool,
}

impl SnapshotSource {
    /// Source that re-reads `path` on every refresh.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self { path: Some(path.into()), pending: None, current: None, connected: false }
    }

    /// Source that always serves the given in-memory snapshot.
    pub fn from_snapshot(snapshot: SnapshotFile) -> Self {
        Self { path: None, pending: Some(snapshot), current: None, connected: false }
    }

    /// Path backing this source, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    fn snapshot(&self, field: Field) -> Result<&SnapshotFile> {
        self.current
            .as_ref()
            .ok_or_else(|| {
                BridgeError::decode_failed(field.name(), "no snapshot loaded; refresh first")
            })
    }
}

#[async_trait::async_trait]
impl TelemetrySource for SnapshotSource {
    fn name(&self) -> &'static str {
        "snapshot"
    }

    async fn connect(&mut self) -> Result<()> {
        if let Some(path) = &self.path {
            if !path.exists() {
                return Err(BridgeError::connect_failed(format!(
                    "snapshot file {} does not exist",
                    path.display()
                )));
            }
            info!(path = %path.display(), "Using snapshot telemetry source");
        } else {
            info!("Using in-memory snapshot telemetry source");
        }
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if self.connected {
            debug!("Snapshot source disconnected");
        }
        self.connected = false;
        self.current = None;
        Ok(())
    }

    async fn refresh(&mut self) -> Result<()> {
        if !self.connected {
            return Err(BridgeError::decode_failed("refresh", "snapshot source is not connected"));
        }

        let snapshot = match &self.path {
            Some(path) => SnapshotFile::load(path)?,
            None => self.pending.clone().unwrap_or_default(),
        };
        trace!(offsets = snapshot.offsets.len(), "Snapshot refreshed");
        self.current = Some(snapshot);
        Ok(())
    }

    fn read_raw(&self, offset: &Offset) -> Result<i64> {
        let snapshot = self.snapshot(offset.field)?;
        Ok(snapshot.offsets.get(&offset.field).copied().unwrap_or(0))
    }

    fn read_degrees(&self, offset: &Offset) -> Result<f64> {
        let snapshot = self.snapshot(offset.field)?;
        match offset.decode {
            DecodeKind::BinaryDegrees(Axis::Latitude) => Ok(snapshot.latitude),
            DecodeKind::BinaryDegrees(Axis::Longitude) => Ok(snapshot.longitude),
            _ => Err(BridgeError::decode_failed(
                offset.field.name(),
                "offset does not hold a position",
            )),
        }
    }
}
