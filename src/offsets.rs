//! Static description of the simulator offsets the bridge reads.
//!
//! Each [`Offset`] names a quantity, the simulator address it lives at, the
//! raw width and signedness of the stored integer, and how to turn that raw
//! integer into a physical value. The table is immutable and consumed by a
//! single generic routine ([`Offset::scale_raw`]) so every unit conversion can
//! be pinned independently of the decoder.
//!
//! | Quantity | Raw divisor | Scale | Unit |
//! |---|---|---|---|
//! | IAS / TAS | 2^7 | 1 | knots |
//! | ground speed | 2^16 | 1.943844 | knots |
//! | vertical speed | 2^7 | 3.28084 × 60 | ft/min |
//! | indicated altitude | 2^32 | 3.28084 | feet |
//! | radio altitude | 2^16 | 3.28084 | feet |
//! | altimeter | 2^8 | 33.8638866667 | inHg |
//! | true heading | 2^32 | 360 | degrees |
//! | magnetic variation | 2^16 | 360 | degrees |
//! | pitch / bank | 2^32 | −360 | degrees |
//! | turn rate | 2^9 | 3.0 | deg/sec |
//! | g-force | ÷ 625 | | g |

use serde::{Deserialize, Serialize};
use std::fmt;

/// Knots per metre-per-second.
pub const KNOTS_PER_MPS: f64 = 1.943844;

/// Feet per metre.
pub const FEET_PER_METRE: f64 = 3.28084;

/// Scale applied to the raw altimeter setting.
pub const ALTIMETER_SCALE: f64 = 33.8638866667;

/// Raw g-force units per 1 g.
pub const G_FORCE_DIVISOR: f64 = 625.0;

/// Quantities the bridge reads from the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    IndicatedAirspeed,
    TrueAirspeed,
    GroundSpeed,
    VerticalSpeed,
    IndicatedAltitude,
    RadioAltitude,
    AltimeterPressure,
    TrueHeading,
    MagneticVariation,
    Pitch,
    Bank,
    TurnRate,
    GForce,
    Squawk,
    Paused,
    SlewMode,
    Latitude,
    Longitude,
}

impl Field {
    /// Stable snake_case name, matching the snapshot file keys.
    pub const fn name(self) -> &'static str {
        match self {
            Field::IndicatedAirspeed => "indicated_airspeed",
            Field::TrueAirspeed => "true_airspeed",
            Field::GroundSpeed => "ground_speed",
            Field::VerticalSpeed => "vertical_speed",
            Field::IndicatedAltitude => "indicated_altitude",
            Field::RadioAltitude => "radio_altitude",
            Field::AltimeterPressure => "altimeter_pressure",
            Field::TrueHeading => "true_heading",
            Field::MagneticVariation => "magnetic_variation",
            Field::Pitch => "pitch",
            Field::Bank => "bank",
            Field::TurnRate => "turn_rate",
            Field::GForce => "g_force",
            Field::Squawk => "squawk",
            Field::Paused => "paused",
            Field::SlewMode => "slew_mode",
            Field::Latitude => "latitude",
            Field::Longitude => "longitude",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Storage width and signedness of a raw offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OffsetWidth {
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
}

impl OffsetWidth {
    /// Number of bytes occupied in the simulator's memory.
    pub const fn size(self) -> usize {
        match self {
            OffsetWidth::U8 => 1,
            OffsetWidth::I16 | OffsetWidth::U16 => 2,
            OffsetWidth::I32 | OffsetWidth::U32 => 4,
            OffsetWidth::I64 => 8,
        }
    }

    /// Interpret little-endian bytes as this width, widened to `i64`.
    ///
    /// Returns `None` when `bytes` is shorter than [`OffsetWidth::size`].
    pub fn read_le(self, bytes: &[u8]) -> Option<i64> {
        let value = match self {
            OffsetWidth::U8 => *bytes.first()? as i64,
            OffsetWidth::I16 => i16::from_le_bytes(bytes.get(..2)?.try_into().ok()?) as i64,
            OffsetWidth::U16 => u16::from_le_bytes(bytes.get(..2)?.try_into().ok()?) as i64,
            OffsetWidth::I32 => i32::from_le_bytes(bytes.get(..4)?.try_into().ok()?) as i64,
            OffsetWidth::U32 => u32::from_le_bytes(bytes.get(..4)?.try_into().ok()?) as i64,
            OffsetWidth::I64 => i64::from_le_bytes(bytes.get(..8)?.try_into().ok()?),
        };
        Some(value)
    }
}

/// Position axis for binary-degree offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Latitude,
    Longitude,
}

/// How a raw integer turns into a physical value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DecodeKind {
    /// `raw / 2^fraction_bits * scale`
    Linear { fraction_bits: u32, scale: f64 },
    /// `raw / divisor`
    Quotient { divisor: f64 },
    /// Packed binary degrees; resolved by the data source.
    BinaryDegrees(Axis),
    /// Four BCD digits, rendered as uppercase hex.
    Bcd,
    /// True iff the raw value is exactly 1.
    Flag,
}

/// One raw field exposed by the simulator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Offset {
    pub field: Field,
    pub address: u32,
    pub width: OffsetWidth,
    pub decode: DecodeKind,
}

impl Offset {
    const fn new(field: Field, address: u32, width: OffsetWidth, decode: DecodeKind) -> Self {
        Self { field, address, width, decode }
    }

    /// Apply this offset's scalar conversion to a raw value.
    ///
    /// Flag and BCD offsets return the raw value unchanged; binary-degree
    /// offsets are decoded by the source and never pass through here.
    pub fn scale_raw(&self, raw: i64) -> f64 {
        match self.decode {
            DecodeKind::Linear { fraction_bits, scale } => {
                raw as f64 / 2f64.powi(fraction_bits as i32) * scale
            }
            DecodeKind::Quotient { divisor } => raw as f64 / divisor,
            DecodeKind::BinaryDegrees(_) | DecodeKind::Bcd | DecodeKind::Flag => raw as f64,
        }
    }
}

const fn linear(fraction_bits: u32, scale: f64) -> DecodeKind {
    DecodeKind::Linear { fraction_bits, scale }
}

/// Every offset the decoder reads, in request order.
pub static OFFSET_TABLE: &[Offset] = &[
    Offset::new(Field::IndicatedAirspeed, 0x02BC, OffsetWidth::I32, linear(7, 1.0)),
    Offset::new(Field::TrueAirspeed, 0x02B8, OffsetWidth::I32, linear(7, 1.0)),
    Offset::new(Field::GroundSpeed, 0x02B4, OffsetWidth::I32, linear(16, KNOTS_PER_MPS)),
    Offset::new(Field::VerticalSpeed, 0x02C8, OffsetWidth::I32, linear(7, FEET_PER_METRE * 60.0)),
    Offset::new(Field::IndicatedAltitude, 0x0570, OffsetWidth::I64, linear(32, FEET_PER_METRE)),
    Offset::new(Field::RadioAltitude, 0x31E4, OffsetWidth::I32, linear(16, FEET_PER_METRE)),
    Offset::new(Field::AltimeterPressure, 0x0330, OffsetWidth::U16, linear(8, ALTIMETER_SCALE)),
    Offset::new(Field::TrueHeading, 0x0580, OffsetWidth::U32, linear(32, 360.0)),
    Offset::new(Field::MagneticVariation, 0x02A0, OffsetWidth::I16, linear(16, 360.0)),
    Offset::new(Field::Pitch, 0x0578, OffsetWidth::I32, linear(32, -360.0)),
    Offset::new(Field::Bank, 0x057C, OffsetWidth::I32, linear(32, -360.0)),
    Offset::new(Field::TurnRate, 0x037C, OffsetWidth::I16, linear(9, 3.0)),
    Offset::new(
        Field::GForce,
        0x11BA,
        OffsetWidth::I16,
        DecodeKind::Quotient { divisor: G_FORCE_DIVISOR },
    ),
    Offset::new(Field::Squawk, 0x0354, OffsetWidth::U16, DecodeKind::Bcd),
    Offset::new(Field::Paused, 0x0264, OffsetWidth::U16, DecodeKind::Flag),
    Offset::new(Field::SlewMode, 0x05DC, OffsetWidth::U16, DecodeKind::Flag),
    Offset::new(
        Field::Latitude,
        0x0560,
        OffsetWidth::I64,
        DecodeKind::BinaryDegrees(Axis::Latitude),
    ),
    Offset::new(
        Field::Longitude,
        0x0568,
        OffsetWidth::I64,
        DecodeKind::BinaryDegrees(Axis::Longitude),
    ),
];

/// Look up the offset that feeds `field`.
pub fn offset_for(field: Field) -> &'static Offset {
    OFFSET_TABLE
        .iter()
        .find(|offset| offset.field == field)
        .unwrap_or_else(|| unreachable!("every Field has a table entry"))
}
