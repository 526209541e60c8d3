//! Error types for the telemetry bridge.
//!
//! Every fallible operation in the crate returns [`BridgeError`]. Variants carry
//! structured context so the binary can log an actionable message before
//! exiting.
//!
//! ## Error Categories
//!
//! - **Connect**: the simulator link could not be established
//! - **Decode**: a raw offset read failed during a poll cycle
//! - **PayloadTooLarge**: the encoded message does not fit the shared region
//! - **RegionAccess / HandleAccess**: the named region or liveness handle
//!   could not be created or opened
//! - **Config / Snapshot**: invalid configuration or snapshot input
//!
//! ## Recovery
//!
//! ```rust
//! use simbridge::BridgeError;
//!
//! let error = BridgeError::handle_access("SIMLINK_PLUGIN", "access denied");
//! assert!(!error.is_retryable());
//! for suggestion in error.recovery_suggestions() {
//!     println!("  - {}", suggestion);
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

#[cfg(windows)]
use windows_core as core;

/// Result type alias for bridge operations.
pub type Result<T, E = BridgeError> = std::result::Result<T, E>;

/// Main error type for bridge operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum BridgeError {
    #[error("Failed to connect to simulator: {reason}")]
    Connect {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Failed to decode '{field}': {reason}")]
    Decode { field: String, reason: String },

    #[error("Encoded payload of {size} bytes exceeds region capacity of {capacity} bytes")]
    PayloadTooLarge { size: usize, capacity: usize },

    #[error("Cannot access shared region '{name}': {reason}")]
    RegionAccess {
        name: String,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Cannot access liveness handle '{name}': {reason}")]
    HandleAccess {
        name: String,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("Snapshot file error: {path}")]
    Snapshot {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Failed to serialize wire message")]
    Encode(#[from] serde_json::Error),

    #[error("{feature} is only available on {required_platform}")]
    UnsupportedPlatform { feature: String, required_platform: String },

    #[error("Windows API error: {operation}")]
    #[cfg(windows)]
    WindowsApi {
        operation: String,
        #[source]
        source: core::Error,
    },
}

impl BridgeError {
    /// Returns whether this error is potentially recoverable through retry.
    ///
    /// The poll loop itself never retries; this classification is for callers
    /// embedding the bridge with their own restart policy.
    pub fn is_retryable(&self) -> bool {
        match self {
            BridgeError::Connect { .. } => true,
            BridgeError::Decode { .. } => true,
            BridgeError::PayloadTooLarge { .. } => false,
            BridgeError::RegionAccess { .. } => false,
            BridgeError::HandleAccess { .. } => false,
            BridgeError::Config { .. } => false,
            BridgeError::Snapshot { .. } => false,
            BridgeError::Encode(_) => false,
            BridgeError::UnsupportedPlatform { .. } => false,
            #[cfg(windows)]
            BridgeError::WindowsApi { .. } => true,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            BridgeError::Connect { .. } => vec![
                "Ensure the simulator is running with FSUIPC loaded",
                "Start the bridge after the simulator has finished loading",
                "Run the bridge with the same privilege level as the simulator",
            ],
            BridgeError::Decode { .. } => vec![
                "Check the simulator is still running",
                "Verify the snapshot file lists every required offset",
                "Restart the bridge once the simulator is responsive",
            ],
            BridgeError::PayloadTooLarge { .. } => vec![
                "The wire schema no longer fits the 4096-byte region",
                "Shorten string fields or raise the region size on both sides",
            ],
            BridgeError::RegionAccess { .. } => vec![
                "Run the bridge as administrator",
                "Close other processes holding the region with a different size",
                "Check permissions on the shared-memory directory",
            ],
            BridgeError::HandleAccess { .. } => vec![
                "Run the bridge as administrator",
                "Check no other account owns the liveness handle",
            ],
            BridgeError::Config { .. } => vec![
                "Check the configuration file against the documented keys",
                "Run with --help to list valid sources and sinks",
            ],
            BridgeError::Snapshot { .. } => vec![
                "Check the snapshot file exists and is readable",
                "Verify the snapshot is valid YAML",
            ],
            BridgeError::Encode(_) => vec!["Report this as a bug: wire encoding must not fail"],
            BridgeError::UnsupportedPlatform { .. } => vec![
                "Use the snapshot source on this platform",
                "Run the bridge on the Windows host running the simulator",
            ],
            #[cfg(windows)]
            BridgeError::WindowsApi { .. } => vec![
                "Check Windows API permissions",
                "Verify system resources availability",
            ],
        }
    }

    /// Helper constructor for connection errors.
    pub fn connect_failed(reason: impl Into<String>) -> Self {
        BridgeError::Connect { reason: reason.into(), source: None }
    }

    /// Helper constructor for connection errors with source.
    pub fn connect_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        BridgeError::Connect { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for decode errors.
    pub fn decode_failed(field: impl Into<String>, reason: impl Into<String>) -> Self {
        BridgeError::Decode { field: field.into(), reason: reason.into() }
    }

    /// Helper constructor for shared region errors.
    pub fn region_access(name: impl Into<String>, reason: impl Into<String>) -> Self {
        BridgeError::RegionAccess { name: name.into(), reason: reason.into(), source: None }
    }

    /// Helper constructor for shared region errors with source.
    pub fn region_access_with_source(
        name: impl Into<String>,
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        BridgeError::RegionAccess { name: name.into(), reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for liveness handle errors.
    pub fn handle_access(name: impl Into<String>, reason: impl Into<String>) -> Self {
        BridgeError::HandleAccess { name: name.into(), reason: reason.into(), source: None }
    }

    /// Helper constructor for liveness handle errors with source.
    pub fn handle_access_with_source(
        name: impl Into<String>,
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        BridgeError::HandleAccess { name: name.into(), reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for configuration errors.
    pub fn config(reason: impl Into<String>) -> Self {
        BridgeError::Config { reason: reason.into() }
    }

    /// Helper constructor for snapshot errors.
    pub fn snapshot(
        path: impl Into<PathBuf>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        BridgeError::Snapshot { path: path.into(), source: source.into() }
    }

    /// Helper constructor for Windows API errors.
    #[cfg(windows)]
    pub fn windows_api_error(operation: impl Into<String>, source: core::Error) -> Self {
        BridgeError::WindowsApi { operation: operation.into(), source }
    }

    /// Helper constructor for unsupported platform errors.
    pub fn unsupported_platform(
        feature: impl Into<String>,
        required_platform: impl Into<String>,
    ) -> Self {
        BridgeError::UnsupportedPlatform {
            feature: feature.into(),
            required_platform: required_platform.into(),
        }
    }
}

#[cfg(windows)]
impl From<core::Error> for BridgeError {
    fn from(err: core::Error) -> Self {
        BridgeError::WindowsApi {
            operation: "Unknown Windows operation".to_string(),
            source: err,
        }
    }
}
