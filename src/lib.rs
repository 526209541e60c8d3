//! Flight-simulator telemetry bridge.
//!
//! simbridge reads fixed-point offsets from a running simulator, resolves
//! them into physical units and publishes them as JSON into a named shared
//! region that an independent consumer polls.
//!
//! # Pipeline
//!
//! - [`source`]: raw offsets from FSUIPC (Windows) or a YAML snapshot
//! - [`decoder`]: offsets to [`CanonicalTelemetry`]
//! - [`encoder`]: telemetry to the consumer's nested [`WireMessage`]
//! - [`publisher`]: UTF-16LE frame in the 4096-byte `NGSIMCONNECT` region,
//!   advertised by the `SIMLINK_PLUGIN` liveness handle
//! - [`scheduler`]: the cancellable poll loop tying them together
//!
//! # Example (snapshot to console)
//!
//! ```rust,no_run
//! use simbridge::{Bridge, BridgeConfig, SinkKind};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> simbridge::Result<()> {
//!     let config = BridgeConfig::default()
//!         .with_snapshot_path("demos/cruise.yaml")
//!         .with_sink(SinkKind::Console);
//!
//!     let bridge = Bridge::new(config)?.with_max_cycles(3);
//!     let summary = bridge.run(&CancellationToken::new()).await?;
//!     println!("published {} messages", summary.cycles);
//!     Ok(())
//! }
//! ```

// Core types and error handling
pub mod config;
mod error;
pub mod offsets;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;

// Pipeline stages
pub mod decoder;
pub mod encoder;
pub mod publisher;
pub mod scheduler;
pub mod source;

// Platform-specific modules
#[cfg(windows)]
pub mod windows;

// Core exports
pub use config::BridgeConfig;
pub use error::*;

// Pipeline exports
pub use decoder::{CanonicalTelemetry, TelemetryDecoder};
pub use encoder::{WireMessage, encode, encode_now};
pub use publisher::{SharedBufferPublisher, SinkKind, TelemetrySink, open_sink};
pub use scheduler::{PollScheduler, PollSummary};
pub use source::{SourceKind, TelemetrySource, build_source};

use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Configured bridge: one source, one sink, one poll loop.
///
/// Construction validates the configuration; nothing is opened until
/// [`Bridge::run`].
#[derive(Debug, Clone)]
pub struct Bridge {
    config: BridgeConfig,
    max_cycles: Option<u64>,
}

impl Bridge {
    /// Validate `config` and build a bridge from it.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] when the interval is zero, the
    /// snapshot source has no path, or the object names are unusable.
    pub fn new(config: BridgeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, max_cycles: None })
    }

    /// Stop after `cycles` published messages.
    pub fn with_max_cycles(mut self, cycles: u64) -> Self {
        self.max_cycles = Some(cycles);
        self
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Connect the source, open the sink and poll until `cancel` fires.
    ///
    /// The source and sink are released on every exit path.
    ///
    /// # Errors
    ///
    /// Startup fails with `Connect`, `RegionAccess` or `HandleAccess`; the
    /// loop itself fails on the first decode or publish error.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<PollSummary> {
        let mut source = build_source(&self.config)?;
        source.connect().await?;

        let mut sink = match open_sink(&self.config) {
            Ok(sink) => sink,
            Err(e) => {
                if let Err(disconnect_err) = source.disconnect().await {
                    warn!("Failed to disconnect {} source: {}", source.name(), disconnect_err);
                }
                return Err(e);
            }
        };

        let mut scheduler = PollScheduler::new(self.config.poll_interval());
        if let Some(cycles) = self.max_cycles {
            scheduler = scheduler.with_max_cycles(cycles);
        }
        scheduler.run(source.as_mut(), sink.as_mut(), cancel).await
    }
}
