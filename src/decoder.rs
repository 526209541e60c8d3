//! Conversion of raw offsets into a [`CanonicalTelemetry`] snapshot.

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::offsets::{DecodeKind, Field, OFFSET_TABLE, Offset, offset_for};
use crate::source::TelemetrySource;

/// Unit-resolved telemetry for one instant.
///
/// Built whole by [`TelemetryDecoder::decode`]; a failed read yields no value
/// at all rather than a partially updated one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalTelemetry {
    /// Transponder code, four uppercase hex digits.
    pub squawk_code: String,

    /// Degrees, north positive.
    pub latitude: f64,
    /// Degrees, east positive.
    pub longitude: f64,

    /// Knots.
    pub indicated_airspeed: i32,
    /// Knots.
    pub true_airspeed: i32,
    /// Knots.
    pub ground_speed: i32,
    /// Feet per minute.
    pub vertical_speed: i32,

    /// Feet.
    pub indicated_altitude: i32,
    /// Feet above ground.
    pub radio_altitude: i32,
    /// Inches of mercury.
    pub altimeter_pressure: f64,

    /// Degrees true.
    pub true_heading: i32,
    /// Degrees magnetic.
    pub indicated_heading: i32,
    /// Degrees per second.
    pub turn_rate: i32,
    /// Degrees, nose up positive.
    pub pitch: f64,
    /// Degrees, right wing down positive.
    pub bank: f64,
    /// Load factor in g.
    pub g_force: f64,

    pub paused: bool,
    pub slew_mode: bool,
}

/// Table-driven decoder from a [`TelemetrySource`].
#[derive(Debug, Clone, Copy)]
pub struct TelemetryDecoder {
    table: &'static [Offset],
}

impl Default for TelemetryDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryDecoder {
    pub fn new() -> Self {
        Self { table: OFFSET_TABLE }
    }

    /// Offsets this decoder reads.
    pub fn offsets(&self) -> &'static [Offset] {
        self.table
    }

    /// Read every offset from an already refreshed `source`.
    pub fn decode(&self, source: &dyn TelemetrySource) -> Result<CanonicalTelemetry> {
        let true_heading = self.scalar(source, Field::TrueHeading)?;
        let magnetic_variation = self.scalar(source, Field::MagneticVariation)?;

        Ok(CanonicalTelemetry {
            squawk_code: self.squawk(source)?,
            latitude: self.degrees(source, Field::Latitude)?,
            longitude: self.degrees(source, Field::Longitude)?,
            indicated_airspeed: truncate(self.scalar(source, Field::IndicatedAirspeed)?),
            true_airspeed: truncate(self.scalar(source, Field::TrueAirspeed)?),
            ground_speed: truncate(self.scalar(source, Field::GroundSpeed)?),
            vertical_speed: truncate(self.scalar(source, Field::VerticalSpeed)?),
            indicated_altitude: truncate(self.scalar(source, Field::IndicatedAltitude)?),
            radio_altitude: truncate(self.scalar(source, Field::RadioAltitude)?),
            altimeter_pressure: self.scalar(source, Field::AltimeterPressure)?,
            true_heading: truncate(true_heading),
            indicated_heading: truncate(true_heading - magnetic_variation),
            turn_rate: truncate(self.scalar(source, Field::TurnRate)?),
            pitch: self.scalar(source, Field::Pitch)?,
            bank: self.scalar(source, Field::Bank)?,
            g_force: self.scalar(source, Field::GForce)?,
            paused: self.flag(source, Field::Paused)?,
            slew_mode: self.flag(source, Field::SlewMode)?,
        })
    }

    fn offset(&self, field: Field) -> &'static Offset {
        self.table.iter().find(|o| o.field == field).unwrap_or_else(|| offset_for(field))
    }

    fn scalar(&self, source: &dyn TelemetrySource, field: Field) -> Result<f64> {
        let offset = self.offset(field);
        Ok(offset.scale_raw(source.read_raw(offset)?))
    }

    fn degrees(&self, source: &dyn TelemetrySource, field: Field) -> Result<f64> {
        source.read_degrees(self.offset(field))
    }

    fn flag(&self, source: &dyn TelemetrySource, field: Field) -> Result<bool> {
        let offset = self.offset(field);
        debug_assert_eq!(offset.decode, DecodeKind::Flag);
        Ok(source.read_raw(offset)? == 1)
    }

    fn squawk(&self, source: &dyn TelemetrySource) -> Result<String> {
        let offset = self.offset(Field::Squawk);
        Ok(format_squawk(source.read_raw(offset)?))
    }
}

/// Render a BCD transponder word as four uppercase hex digits.
pub fn format_squawk(raw: i64) -> String {
    format!("{:04X}", raw as u16)
}

/// Truncate toward zero into the wire's integer range.
fn truncate(value: f64) -> i32 {
    value as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{SnapshotFile, SnapshotSource};
    use std::collections::HashMap;

    async fn decode(offsets: &[(Field, i64)]) -> CanonicalTelemetry {
        let snapshot = SnapshotFile {
            latitude: 47.4502,
            longitude: -122.3088,
            offsets: offsets.iter().copied().collect::<HashMap<_, _>>(),
        };
        let mut source = SnapshotSource::from_snapshot(snapshot);
        source.connect().await.unwrap();
        source.refresh().await.unwrap();
        TelemetryDecoder::new().decode(&source).unwrap()
    }

    #[tokio::test]
    async fn ground_speed_truncates_to_whole_knots() {
        let t = decode(&[(Field::GroundSpeed, 65536)]).await;
        assert_eq!(t.ground_speed, 1);
    }

    #[tokio::test]
    async fn squawk_paused_and_g_force_scenario() {
        let t = decode(&[(Field::Squawk, 0x1200), (Field::Paused, 1), (Field::GForce, 625)]).await;
        assert_eq!(t.squawk_code, "1200");
        assert!(t.paused);
        assert!(!t.slew_mode);
        assert_eq!(t.g_force, 1.0);
    }

    #[tokio::test]
    async fn squawk_is_zero_padded_uppercase() {
        assert_eq!(decode(&[(Field::Squawk, 0x0042)]).await.squawk_code, "0042");
        assert_eq!(format_squawk(0x7A0F), "7A0F");
    }

    #[tokio::test]
    async fn flags_require_exactly_one() {
        let t = decode(&[(Field::Paused, 2), (Field::SlewMode, 1)]).await;
        assert!(!t.paused);
        assert!(t.slew_mode);
    }

    #[tokio::test]
    async fn cruise_values_resolve_to_physical_units() {
        let t = decode(&[
            (Field::IndicatedAirspeed, 250 * 128),
            (Field::TrueAirspeed, 412 * 128),
            (Field::VerticalSpeed, -640),
            (Field::IndicatedAltitude, 10_668i64 << 32),
            (Field::RadioAltitude, 10_600 * 65536),
            (Field::AltimeterPressure, 256),
            (Field::TrueHeading, 1i64 << 31),
            (Field::MagneticVariation, -1820),
            (Field::Pitch, -(1i64 << 25)),
            (Field::Bank, 1i64 << 26),
            (Field::TurnRate, 512),
        ])
        .await;

        assert_eq!(t.indicated_airspeed, 250);
        assert_eq!(t.true_airspeed, 412);
        // -640/128 m/s * 196.8504 ft/min
        assert_eq!(t.vertical_speed, -984);
        assert_eq!(t.indicated_altitude, 35_000);
        assert_eq!(t.radio_altitude, 34_776);
        assert!((t.altimeter_pressure - 33.8638866667).abs() < 1e-9);
        assert_eq!(t.true_heading, 180);
        // 180 minus a variation of about -10 degrees
        assert_eq!(t.indicated_heading, 189);
        assert!((t.pitch - 2.8125).abs() < 1e-9);
        assert!((t.bank + 5.625).abs() < 1e-9);
        assert_eq!(t.turn_rate, 3);
        assert_eq!(t.latitude, 47.4502);
        assert_eq!(t.longitude, -122.3088);
    }

    #[tokio::test]
    async fn absent_values_decode_to_zero() {
        let t = decode(&[]).await;
        assert_eq!(t.indicated_airspeed, 0);
        assert_eq!(t.squawk_code, "0000");
        assert_eq!(t.g_force, 0.0);
        assert!(!t.paused);
    }

    #[tokio::test]
    async fn unrefreshed_source_fails_whole_decode() {
        let mut source = SnapshotSource::from_snapshot(SnapshotFile::default());
        source.connect().await.unwrap();
        let result = TelemetryDecoder::new().decode(&source);
        assert!(matches!(result, Err(crate::BridgeError::Decode { .. })));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
          #[test]
          fn decode_is_deterministic(
            ias in any::<i32>(),
            gs in any::<i32>(),
            heading in any::<u32>(),
            g in any::<i16>(),
          ) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let offsets = [
              (Field::IndicatedAirspeed, ias as i64),
              (Field::GroundSpeed, gs as i64),
              (Field::TrueHeading, heading as i64),
              (Field::GForce, g as i64),
            ];
            let first = runtime.block_on(decode(&offsets));
            let second = runtime.block_on(decode(&offsets));

            prop_assert_eq!(&first, &second);
            prop_assert_eq!(first.indicated_airspeed, (ias as f64 / 128.0) as i32);
            prop_assert_eq!(first.ground_speed, (gs as f64 / 65536.0 * 1.943844) as i32);
            prop_assert!((0..360).contains(&first.true_heading));
            prop_assert_eq!(first.g_force, g as f64 / 625.0);
          }
        }
    }
}
