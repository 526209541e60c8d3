//! Fixtures and doubles shared by unit tests and benchmarks.

#![cfg(any(test, feature = "benchmark"))]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;

use crate::encoder::WireMessage;
use crate::offsets::{Field, Offset};
use crate::publisher::TelemetrySink;
use crate::source::{SnapshotFile, TelemetrySource};
use crate::{BridgeError, Result};

/// Raw offsets of an airliner in cruise over Seattle.
pub fn cruise_snapshot() -> SnapshotFile {
    let offsets: HashMap<Field, i64> = [
        (Field::IndicatedAirspeed, 250 * 128),
        (Field::TrueAirspeed, 412 * 128),
        (Field::GroundSpeed, 221 * 65536),
        (Field::VerticalSpeed, 0),
        (Field::IndicatedAltitude, 10_668i64 << 32),
        (Field::RadioAltitude, 10_600 * 65536),
        (Field::AltimeterPressure, 221),
        (Field::TrueHeading, 1i64 << 31),
        (Field::MagneticVariation, -1820),
        (Field::GForce, 625),
        (Field::Squawk, 0x1200),
    ]
    .into_iter()
    .collect();

    SnapshotFile { latitude: 47.4502, longitude: -122.3088, offsets }
}

/// Sink recording every message it is given.
///
/// Optionally cancels a token once a number of messages have been
/// published, which lets scheduler tests stop the loop from inside a cycle.
#[derive(Default, Clone)]
pub struct RecordingSink {
    messages: Arc<Mutex<Vec<WireMessage>>>,
    closed: Arc<AtomicBool>,
    cancel_after: Option<(usize, CancellationToken)>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancelling_after(count: usize, token: CancellationToken) -> Self {
        Self { cancel_after: Some((count, token)), ..Self::default() }
    }

    pub fn messages(&self) -> Vec<WireMessage> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl TelemetrySink for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn publish(&mut self, message: &WireMessage) -> Result<usize> {
        let mut messages = self.messages.lock().unwrap_or_else(PoisonError::into_inner);
        messages.push(message.clone());
        if let Some((count, token)) = &self.cancel_after {
            if messages.len() >= *count {
                token.cancel();
            }
        }
        Ok(message.to_json()?.len() * 2)
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Source whose refresh always fails with a decode error.
#[derive(Default, Clone)]
pub struct FailingSource {
    disconnected: Arc<AtomicBool>,
}

impl FailingSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn was_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl TelemetrySource for FailingSource {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.disconnected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn refresh(&mut self) -> Result<()> {
        Err(BridgeError::decode_failed("request", "simulator stopped answering"))
    }

    fn read_raw(&self, offset: &Offset) -> Result<i64> {
        Err(BridgeError::decode_failed(offset.field.name(), "no data"))
    }

    fn read_degrees(&self, offset: &Offset) -> Result<f64> {
        Err(BridgeError::decode_failed(offset.field.name(), "no data"))
    }
}
