//! FSUIPC telemetry source.
//!
//! FSUIPC exposes simulator state as numbered offsets. A client batches read
//! requests into a named file mapping and hands the mapping's atom to the
//! FSUIPC window with a registered message; FSUIPC fills the data areas in
//! place before the message returns.
//!
//! Request block layout, one record per read, terminated by a zero id:
//!
//! ```text
//! u32 id = 1 (READSTATEDATA) | u32 offset | u32 size | u32 dest | size bytes of data
//! ...
//! u32 id = 0
//! ```
//!
//! The block layout and the binary-degree position math are platform
//! independent; only the window-message transport lives in
//! [`crate::windows`].

#![cfg_attr(not(windows), allow(dead_code))]

use std::collections::HashMap;
use tracing::debug;

use super::TelemetrySource;
use crate::offsets::{Axis, DecodeKind, OFFSET_TABLE, Offset};
use crate::{BridgeError, Result};

/// Size of the IPC file mapping FSUIPC accepts.
pub(crate) const IPC_BLOCK_SIZE: usize = 0x7F00;

/// Record id of a state read.
pub(crate) const READ_STATE_DATA_ID: u32 = 1;

/// Record header: id, offset, size, destination placeholder.
pub(crate) const READ_HEADER_LEN: usize = 16;

/// FSUIPC version offset (u32).
pub(crate) const FSUIPC_VERSION_OFFSET: u32 = 0x3304;

/// Simulator version offset (u16).
pub(crate) const SIM_VERSION_OFFSET: u32 = 0x3308;

/// Meters from equator to pole in FSUIPC's latitude encoding.
const LATITUDE_UNITS_PER_90_DEGREES: f64 = 10_001_750.0;

/// Decode an FSUIPC 64-bit latitude to signed decimal degrees.
pub fn binary_degrees_latitude(raw: i64) -> f64 {
    raw as f64 * 90.0 / (LATITUDE_UNITS_PER_90_DEGREES * 65536.0 * 65536.0)
}

/// Decode an FSUIPC 64-bit longitude to signed decimal degrees.
pub fn binary_degrees_longitude(raw: i64) -> f64 {
    raw as f64 * 360.0 / (65536.0 * 65536.0 * 65536.0 * 65536.0)
}

/// Classify a failure of the startup version query as a connection failure.
pub(crate) fn version_query_failed(error: BridgeError) -> BridgeError {
    match error {
        BridgeError::Connect { .. } => error,
        other => BridgeError::connect_failed_with_source(
            "FSUIPC did not answer the version query",
            Box::new(other),
        ),
    }
}

/// One read in a request block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ReadRequest {
    pub address: u32,
    pub size: usize,
}

/// Where a read's data landed inside the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ReadSlot {
    pub address: u32,
    pub data_start: usize,
    pub size: usize,
}

/// Lay out a batch of reads into `block`. Returns the data slot of each read.
pub(crate) fn write_read_requests(
    block: &mut [u8],
    reads: &[ReadRequest],
) -> Result<Vec<ReadSlot>> {
    let needed: usize =
        reads.iter().map(|r| READ_HEADER_LEN + r.size).sum::<usize>() + std::mem::size_of::<u32>();
    if needed > block.len() {
        return Err(BridgeError::decode_failed(
            "request",
            format!("{needed} byte request exceeds {} byte IPC block", block.len()),
        ));
    }

    let mut slots = Vec::with_capacity(reads.len());
    let mut cursor = 0;
    for read in reads {
        block[cursor..cursor + 4].copy_from_slice(&READ_STATE_DATA_ID.to_le_bytes());
        block[cursor + 4..cursor + 8].copy_from_slice(&read.address.to_le_bytes());
        block[cursor + 8..cursor + 12].copy_from_slice(&(read.size as u32).to_le_bytes());
        block[cursor + 12..cursor + 16].fill(0);
        let data_start = cursor + READ_HEADER_LEN;
        block[data_start..data_start + read.size].fill(0);
        slots.push(ReadSlot { address: read.address, data_start, size: read.size });
        cursor = data_start + read.size;
    }
    block[cursor..cursor + 4].fill(0);

    Ok(slots)
}

/// Copy each slot's data out of a block FSUIPC has answered.
pub(crate) fn collect_read_results(block: &[u8], slots: &[ReadSlot]) -> HashMap<u32, Vec<u8>> {
    slots
        .iter()
        .map(|slot| {
            (slot.address, block[slot.data_start..slot.data_start + slot.size].to_vec())
        })
        .collect()
}

/// Read batch covering every entry of the offset table.
pub(crate) fn table_requests() -> Vec<ReadRequest> {
    OFFSET_TABLE
        .iter()
        .map(|offset| ReadRequest { address: offset.address, size: offset.width.size() })
        .collect()
}

/// Live simulator source speaking FSUIPC IPC.
///
/// On platforms other than Windows `connect` fails with
/// [`BridgeError::UnsupportedPlatform`].
pub struct FsuipcSource {
    #[cfg(windows)]
    link: Option<crate::windows::FsuipcLink>,
    values: HashMap<u32, Vec<u8>>,
}

impl Default for FsuipcSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FsuipcSource {
    pub fn new() -> Self {
        Self {
            #[cfg(windows)]
            link: None,
            values: HashMap::new(),
        }
    }

    fn bytes_for(&self, offset: &Offset) -> Result<&[u8]> {
        self.values.get(&offset.address).map(Vec::as_slice).ok_or_else(|| {
            BridgeError::decode_failed(
                offset.field.name(),
                format!("offset {:#06x} has not been refreshed", offset.address),
            )
        })
    }
}

#[async_trait::async_trait]
impl TelemetrySource for FsuipcSource {
    fn name(&self) -> &'static str {
        "fsuipc"
    }

    #[cfg(windows)]
    async fn connect(&mut self) -> Result<()> {
        let mut link = crate::windows::FsuipcLink::open()?;

        let reads = [
            ReadRequest { address: FSUIPC_VERSION_OFFSET, size: 4 },
            ReadRequest { address: SIM_VERSION_OFFSET, size: 2 },
        ];
        let versions = link.process_reads(&reads).map_err(version_query_failed)?;
        let fsuipc_version = versions
            .get(&FSUIPC_VERSION_OFFSET)
            .and_then(|b| crate::offsets::OffsetWidth::U32.read_le(b))
            .unwrap_or(0);
        let sim_version = versions
            .get(&SIM_VERSION_OFFSET)
            .and_then(|b| crate::offsets::OffsetWidth::U16.read_le(b))
            .unwrap_or(0);

        if fsuipc_version == 0 {
            return Err(BridgeError::connect_failed(
                "FSUIPC answered but reported no version; the simulator is still loading",
            ));
        }

        tracing::info!(
            fsuipc_version = format_args!("{:#010x}", fsuipc_version),
            sim_version, "Connected to FSUIPC"
        );
        self.link = Some(link);
        Ok(())
    }

    #[cfg(not(windows))]
    async fn connect(&mut self) -> Result<()> {
        Err(BridgeError::unsupported_platform("FSUIPC telemetry", "Windows"))
    }

    async fn disconnect(&mut self) -> Result<()> {
        #[cfg(windows)]
        if let Some(link) = self.link.take() {
            link.close()?;
        }
        self.values.clear();
        debug!("FSUIPC source disconnected");
        Ok(())
    }

    #[cfg(windows)]
    async fn refresh(&mut self) -> Result<()> {
        let link = self
            .link
            .as_mut()
            .ok_or_else(|| BridgeError::decode_failed("refresh", "FSUIPC is not connected"))?;
        self.values = link.process_reads(&table_requests())?;
        tracing::trace!(offsets = self.values.len(), "FSUIPC refreshed");
        Ok(())
    }

    #[cfg(not(windows))]
    async fn refresh(&mut self) -> Result<()> {
        Err(BridgeError::unsupported_platform("FSUIPC telemetry", "Windows"))
    }

    fn read_raw(&self, offset: &Offset) -> Result<i64> {
        let bytes = self.bytes_for(offset)?;
        offset.width.read_le(bytes).ok_or_else(|| {
            BridgeError::decode_failed(offset.field.name(), "short read from FSUIPC")
        })
    }

    fn read_degrees(&self, offset: &Offset) -> Result<f64> {
        let raw = self.read_raw(offset)?;
        match offset.decode {
            DecodeKind::BinaryDegrees(Axis::Latitude) => Ok(binary_degrees_latitude(raw)),
            DecodeKind::BinaryDegrees(Axis::Longitude) => Ok(binary_degrees_longitude(raw)),
            _ => Err(BridgeError::decode_failed(
                offset.field.name(),
                "offset does not hold a position",
            )),
        }
    }
}
