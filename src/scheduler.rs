//! The poll loop.
//!
//! Each cycle runs refresh, decode, encode and publish in that order, then
//! waits out the interval. The first failure ends the loop; there is no
//! retry. Whatever ends the loop, the sink is closed and the source is
//! disconnected before [`PollScheduler::run`] returns.

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::Result;
use crate::decoder::TelemetryDecoder;
use crate::encoder::encode_now;
use crate::publisher::TelemetrySink;
use crate::source::TelemetrySource;

/// What a finished poll loop did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    /// Cycles that published a message.
    pub cycles: u64,
    /// Payload size of the last published message, excluding the terminator.
    pub last_message_bytes: usize,
}

/// Drives one source into one sink at a fixed interval.
#[derive(Debug, Clone)]
pub struct PollScheduler {
    interval: Duration,
    max_cycles: Option<u64>,
    decoder: TelemetryDecoder,
}

impl PollScheduler {
    pub fn new(interval: Duration) -> Self {
        Self { interval, max_cycles: None, decoder: TelemetryDecoder::new() }
    }

    /// Stop on its own after `cycles` published messages.
    pub fn with_max_cycles(mut self, cycles: u64) -> Self {
        self.max_cycles = Some(cycles);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Poll until cancelled, bounded, or failed.
    ///
    /// `source` must already be connected and `sink` open. Both are released
    /// on return, including on error.
    pub async fn run(
        &self,
        source: &mut dyn TelemetrySource,
        sink: &mut dyn TelemetrySink,
        cancel: &CancellationToken,
    ) -> Result<PollSummary> {
        info!(
            source = source.name(),
            sink = sink.name(),
            interval_secs = self.interval.as_secs_f64(),
            "Poll loop started"
        );

        let result = self.poll(source, sink, cancel).await;

        sink.close();
        if let Err(e) = source.disconnect().await {
            warn!("Failed to disconnect {} source: {}", source.name(), e);
        }

        match &result {
            Ok(summary) => info!(cycles = summary.cycles, "Poll loop stopped"),
            Err(e) => warn!("Poll loop failed: {}", e),
        }
        result
    }

    async fn poll(
        &self,
        source: &mut dyn TelemetrySource,
        sink: &mut dyn TelemetrySink,
        cancel: &CancellationToken,
    ) -> Result<PollSummary> {
        let mut summary = PollSummary::default();

        loop {
            if cancel.is_cancelled() {
                debug!("Cancelled before cycle {}", summary.cycles + 1);
                break;
            }
            if self.reached_limit(&summary) {
                break;
            }

            source.refresh().await?;
            let telemetry = self.decoder.decode(&*source)?;
            let message = encode_now(&telemetry);
            summary.last_message_bytes = sink.publish(&message)?;
            summary.cycles += 1;

            debug!(
                cycle = summary.cycles,
                bytes = summary.last_message_bytes,
                squawk = %telemetry.squawk_code,
                "Telemetry published"
            );

            if self.reached_limit(&summary) {
                debug!("Reached {} cycles", summary.cycles);
                break;
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Cancelled during interval wait");
                    break;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        Ok(summary)
    }

    fn reached_limit(&self, summary: &PollSummary) -> bool {
        self.max_cycles.is_some_and(|max| summary.cycles >= max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BridgeError;
    use crate::source::SnapshotSource;
    use crate::test_utils::{FailingSource, RecordingSink, cruise_snapshot};

    async fn connected_cruise() -> SnapshotSource {
        let mut source = SnapshotSource::from_snapshot(cruise_snapshot());
        source.connect().await.unwrap();
        source
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_after_current_cycle() {
        let cancel = CancellationToken::new();
        let mut source = connected_cruise().await;
        let mut sink = RecordingSink::cancelling_after(3, cancel.clone());
        let recorded = sink.clone();

        let summary = PollScheduler::new(Duration::from_secs(1))
            .run(&mut source, &mut sink, &cancel)
            .await
            .unwrap();

        assert_eq!(summary.cycles, 3);
        assert_eq!(recorded.messages().len(), 3);
        assert!(recorded.is_closed());
        assert!(!source.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_before_start_runs_no_cycle() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut source = connected_cruise().await;
        let mut sink = RecordingSink::new();
        let recorded = sink.clone();

        let summary = PollScheduler::new(Duration::from_secs(1))
            .run(&mut source, &mut sink, &cancel)
            .await
            .unwrap();

        assert_eq!(summary, PollSummary::default());
        assert!(recorded.messages().is_empty());
        assert!(recorded.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_cycle_limit_publishes_nothing() {
        let mut source = connected_cruise().await;
        let mut sink = RecordingSink::new();
        let recorded = sink.clone();

        let summary = PollScheduler::new(Duration::from_secs(1))
            .with_max_cycles(0)
            .run(&mut source, &mut sink, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.cycles, 0);
        assert!(recorded.messages().is_empty());
        assert!(recorded.is_closed());
        assert!(!source.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn waits_the_interval_between_cycles() {
        let cancel = CancellationToken::new();
        let mut source = connected_cruise().await;
        let mut sink = RecordingSink::new();
        let started = tokio::time::Instant::now();

        let summary = PollScheduler::new(Duration::from_secs(10))
            .with_max_cycles(3)
            .run(&mut source, &mut sink, &cancel)
            .await
            .unwrap();

        assert_eq!(summary.cycles, 3);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(20) && elapsed < Duration::from_secs(21));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_wait_is_prompt() {
        let cancel = CancellationToken::new();
        let mut source = connected_cruise().await;
        let mut sink = RecordingSink::new();
        let recorded = sink.clone();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            trigger.cancel();
        });

        let started = tokio::time::Instant::now();
        let summary = PollScheduler::new(Duration::from_secs(3600))
            .run(&mut source, &mut sink, &cancel)
            .await
            .unwrap();

        assert_eq!(summary.cycles, 1);
        assert_eq!(recorded.messages().len(), 1);
        assert!(started.elapsed() < Duration::from_secs(3600));
    }

    #[tokio::test(start_paused = true)]
    async fn failure_aborts_and_still_releases() {
        let cancel = CancellationToken::new();
        let mut source = FailingSource::new();
        let mut sink = RecordingSink::new();
        let recorded = sink.clone();

        let result = PollScheduler::new(Duration::from_secs(1))
            .run(&mut source, &mut sink, &cancel)
            .await;

        assert!(matches!(result, Err(BridgeError::Decode { .. })));
        assert!(recorded.messages().is_empty());
        assert!(recorded.is_closed());
        assert!(source.was_disconnected());
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_decoded_snapshot() {
        let cancel = CancellationToken::new();
        let mut source = connected_cruise().await;
        let mut sink = RecordingSink::new();
        let recorded = sink.clone();

        let summary = PollScheduler::new(Duration::from_secs(1))
            .with_max_cycles(1)
            .run(&mut source, &mut sink, &cancel)
            .await
            .unwrap();

        let message = &recorded.messages()[0];
        assert_eq!(message.aircraft.squawk, "1200");
        assert_eq!(message.aircraft.speed.indicated_airspeed, 250);
        assert_eq!(message.aircraft.g_force, 1.0);
        assert_eq!(summary.last_message_bytes, message.to_json().unwrap().len() * 2);
    }
}
