//! Mapping of [`CanonicalTelemetry`] onto the consumer's wire message.
//!
//! The nested key layout below is the compatibility contract with the
//! consumer; struct field names are free to change, `serde(rename)` values
//! are not.
//!
//! | Wire key | Source |
//! |---|---|
//! | `platform.simlink.version` | [`SIMLINK_VERSION`] |
//! | `platform.os.family` | [`OS_FAMILY`] |
//! | `platform.simulator.family` | [`SIMULATOR_FAMILY`] |
//! | `aircraft.squawk` | `squawk_code` |
//! | `aircraft.vertical_speed` | `vertical_speed` |
//! | `aircraft.gforce` | `g_force` |
//! | `aircraft.altitude.true` | `indicated_altitude` |
//! | `aircraft.altitude.indicated` | `indicated_altitude` |
//! | `aircraft.altitude.pressure` | `altimeter_pressure` |
//! | `aircraft.altitude.agl` | `radio_altitude` |
//! | `aircraft.altitude.pressureXP12` | `0.0` |
//! | `aircraft.altitude.slp` | [`STANDARD_SEA_LEVEL_PRESSURE_INHG`] |
//! | `aircraft.position.latitude` / `longitude` | `latitude` / `longitude` |
//! | `aircraft.speed.gs` / `ias` / `tas` | `ground_speed` / `indicated_airspeed` / `true_airspeed` |
//! | `aircraft.status.bank` / `pitch` | `bank` / `pitch` |
//! | `aircraft.status.turnrate` | `turn_rate` |
//! | `aircraft.status.magnetic_heading` | `indicated_heading` |
//! | `aircraft.status.true_heading` / `true_track` | `true_heading` |
//! | `system.paused` / `slew` | `paused` / `slew_mode` as 0/1 |
//! | `system.time` | encode time, Unix seconds |
//! | `system.tz_offset` | `0` |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::decoder::CanonicalTelemetry;

/// Protocol version the bridge claims to speak.
pub const SIMLINK_VERSION: &str = "1.1";

/// Operating system family reported to the consumer.
pub const OS_FAMILY: &str = "Windows";

/// Simulator family reported to the consumer.
pub const SIMULATOR_FAMILY: &str = "MSFS";

/// Standard sea-level pressure in inHg, the unit of `altitude.pressure`.
pub const STANDARD_SEA_LEVEL_PRESSURE_INHG: f64 = 29.92;

/// Complete message written to the shared region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub platform: Platform,
    pub aircraft: Aircraft,
    pub system: SystemState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Platform {
    pub simlink: Simlink,
    pub os: FamilyName,
    pub simulator: FamilyName,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Simlink {
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyName {
    pub family: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aircraft {
    pub squawk: String,
    pub vertical_speed: i32,
    #[serde(rename = "gforce")]
    pub g_force: f64,
    pub altitude: Altitude,
    pub position: Position,
    pub speed: Speed,
    pub status: Status,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Altitude {
    #[serde(rename = "true")]
    pub true_altitude: i32,
    pub indicated: i32,
    pub pressure: f64,
    pub agl: i32,
    #[serde(rename = "pressureXP12")]
    pub pressure_xp12: f64,
    #[serde(rename = "slp")]
    pub sea_level_pressure: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Speed {
    #[serde(rename = "gs")]
    pub ground_speed: i32,
    #[serde(rename = "ias")]
    pub indicated_airspeed: i32,
    #[serde(rename = "tas")]
    pub true_airspeed: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub bank: f64,
    #[serde(rename = "turnrate")]
    pub turn_rate: i32,
    pub magnetic_heading: i32,
    pub pitch: f64,
    pub true_heading: i32,
    pub true_track: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemState {
    pub paused: u8,
    #[serde(rename = "slew")]
    pub slew_mode: u8,
    pub time: i64,
    pub tz_offset: i32,
}

impl WireMessage {
    /// Serialize to the compact JSON text written into the region.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Build the wire message for `telemetry`, stamped with `now`.
pub fn encode(telemetry: &CanonicalTelemetry, now: DateTime<Utc>) -> WireMessage {
    WireMessage {
        platform: Platform {
            simlink: Simlink { version: SIMLINK_VERSION.to_string() },
            os: FamilyName { family: OS_FAMILY.to_string() },
            simulator: FamilyName { family: SIMULATOR_FAMILY.to_string() },
        },
        aircraft: Aircraft {
            squawk: telemetry.squawk_code.clone(),
            vertical_speed: telemetry.vertical_speed,
            g_force: telemetry.g_force,
            altitude: Altitude {
                true_altitude: telemetry.indicated_altitude,
                indicated: telemetry.indicated_altitude,
                pressure: telemetry.altimeter_pressure,
                agl: telemetry.radio_altitude,
                pressure_xp12: 0.0,
                sea_level_pressure: STANDARD_SEA_LEVEL_PRESSURE_INHG,
            },
            position: Position { latitude: telemetry.latitude, longitude: telemetry.longitude },
            speed: Speed {
                ground_speed: telemetry.ground_speed,
                indicated_airspeed: telemetry.indicated_airspeed,
                true_airspeed: telemetry.true_airspeed,
            },
            status: Status {
                bank: telemetry.bank,
                turn_rate: telemetry.turn_rate,
                magnetic_heading: telemetry.indicated_heading,
                pitch: telemetry.pitch,
                true_heading: telemetry.true_heading,
                true_track: telemetry.true_heading,
            },
        },
        system: SystemState {
            paused: telemetry.paused as u8,
            slew_mode: telemetry.slew_mode as u8,
            time: now.timestamp(),
            tz_offset: 0,
        },
    }
}

/// [`encode`] stamped with the current time.
pub fn encode_now(telemetry: &CanonicalTelemetry) -> WireMessage {
    encode(telemetry, Utc::now())
}
