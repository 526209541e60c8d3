//! Bridge configuration.
//!
//! Loaded from YAML, then overridden field by field from the command line.
//! [`BridgeConfig::validate`] runs before anything touches the simulator or
//! the shared region.
//!
//! ```yaml
//! poll_interval_secs: 1
//! source: snapshot
//! snapshot_path: demos/cruise.yaml
//! sink: shared-memory
//! region_name: NGSIMCONNECT
//! liveness_name: SIMLINK_PLUGIN
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::publisher::{DEFAULT_LIVENESS_NAME, DEFAULT_REGION_NAME, SinkKind};
use crate::source::SourceKind;
use crate::{BridgeError, Result};

/// Default seconds between poll cycles.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    /// Seconds between poll cycles, at least 1.
    pub poll_interval_secs: u64,
    pub source: SourceKind,
    /// Snapshot file, required when `source` is `snapshot`.
    pub snapshot_path: Option<PathBuf>,
    pub sink: SinkKind,
    pub region_name: String,
    pub liveness_name: String,
    /// Directory for the file-backed region on non-Windows hosts.
    pub shm_dir: Option<PathBuf>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            source: SourceKind::default(),
            snapshot_path: None,
            sink: SinkKind::default(),
            region_name: DEFAULT_REGION_NAME.to_string(),
            liveness_name: DEFAULT_LIVENESS_NAME.to_string(),
            shm_dir: None,
        }
    }
}

impl BridgeConfig {
    /// Parse a configuration from YAML text. Missing keys take defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml_ng::from_str(yaml)
            .map_err(|e| BridgeError::config(format!("invalid configuration: {e}")))
    }

    /// Read a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config = Self::from_yaml(&text)?;
        debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Check the settings the core relies on.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 {
            return Err(BridgeError::config("poll_interval_secs must be at least 1"));
        }
        if self.source == SourceKind::Snapshot && self.snapshot_path.is_none() {
            return Err(BridgeError::config("the snapshot source requires snapshot_path"));
        }
        if self.region_name.is_empty() {
            return Err(BridgeError::config("region_name must not be empty"));
        }
        if self.liveness_name.is_empty() {
            return Err(BridgeError::config("liveness_name must not be empty"));
        }
        if self.region_name == self.liveness_name {
            return Err(BridgeError::config("region_name and liveness_name must differ"));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn with_poll_interval_secs(mut self, secs: u64) -> Self {
        self.poll_interval_secs = secs;
        self
    }

    pub fn with_source(mut self, source: SourceKind) -> Self {
        self.source = source;
        self
    }

    /// Set the snapshot file. Naming a snapshot implies the snapshot source.
    pub fn with_snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = Some(path.into());
        self.source = SourceKind::Snapshot;
        self
    }

    pub fn with_sink(mut self, sink: SinkKind) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_shm_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.shm_dir = Some(dir.into());
        self
    }
}
