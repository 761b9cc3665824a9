//! ECU identification by memory probing
//!
//! Each table entry names an address and the byte patterns one ECU family
//! stores there. Entries are probed in declared order and the first match
//! wins, even when a later entry would match as well.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::kwp::{KwpError, KwpService};

/// Base address of the 8 byte calibration id
pub const CALIBRATION_ADDRESS: u32 = 0x090000;
/// Base address of the 8 byte calibration description
pub const DESCRIPTION_ADDRESS: u32 = 0x090040;
/// Length of the calibration id and description windows
pub const CALIBRATION_LEN: u8 = 8;

/// Identified ECU family
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcuDescriptor {
    pub name: String,
    /// Signed shift applied to the calibration addresses
    pub memory_offset: i32,
    pub eeprom_size_bytes: u32,
}

impl EcuDescriptor {
    pub fn new(name: impl Into<String>, memory_offset: i32, eeprom_size_bytes: u32) -> Self {
        Self {
            name: name.into(),
            memory_offset,
            eeprom_size_bytes,
        }
    }

    /// Apply the memory offset to a base address
    ///
    /// Returns `None` when the result leaves the 32 bit address space.
    pub fn address(&self, base: u32) -> Option<u32> {
        base.checked_add_signed(self.memory_offset)
    }
}

/// One row of the identification table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentificationEntry {
    /// Address probed for this family
    pub probe_offset: u32,
    /// Accepted byte patterns; the first one fixes the probe length
    pub expected: Vec<Vec<u8>>,
    pub ecu: EcuDescriptor,
}

impl IdentificationEntry {
    pub fn new(probe_offset: u32, expected: &[&[u8]], ecu: EcuDescriptor) -> Self {
        Self {
            probe_offset,
            expected: expected.iter().map(|e| e.to_vec()).collect(),
            ecu,
        }
    }

    fn matches(&self, data: &[u8]) -> bool {
        self.expected.iter().any(|e| e.as_slice() == data)
    }
}

/// Identification table for the supported SIMK4x engine ECUs
pub fn builtin_table() -> Vec<IdentificationEntry> {
    vec![
        IdentificationEntry::new(
            0x82014,
            &[b"6621"],
            EcuDescriptor::new("SIMK43 8mbit", 0, 1_048_576),
        ),
        IdentificationEntry::new(
            0x90040,
            &[b"ca66"],
            EcuDescriptor::new("SIMK43 2.0 4mbit", 0, 524_288),
        ),
        IdentificationEntry::new(
            0x88040,
            &[b"ca65401"],
            EcuDescriptor::new("SIMK43 V6 4mbit (5WY17)", -0x8000, 524_288),
        ),
        IdentificationEntry::new(
            0x88040,
            &[b"ca654", b"ca655"],
            EcuDescriptor::new("SIMK43 V6 4mbit (5WY18+)", -0x8000, 524_288),
        ),
        IdentificationEntry::new(
            0x48040,
            &[b"ca660", b"ca652", b"ca650"],
            EcuDescriptor::new("SIMK41 / V6 2mbit", -0x48000, 262_144),
        ),
        IdentificationEntry::new(
            0x88040,
            &[b"ca661"],
            EcuDescriptor::new("SIMK43 2.0 4mbit (Sonata)", -0x8000, 524_288),
        ),
    ]
}

/// Probe the table in order and return the first matching ECU
///
/// A failed read counts as a miss for that entry only.
pub async fn identify(
    service: &KwpService,
    table: &[IdentificationEntry],
) -> Option<EcuDescriptor> {
    for entry in table {
        let Some(first) = entry.expected.first() else {
            continue;
        };
        let Ok(size) = u8::try_from(first.len()) else {
            continue;
        };

        match service.read_memory(entry.probe_offset, size).await {
            Ok(data) if entry.matches(&data) => {
                debug!(
                    ecu = %entry.ecu.name,
                    address = format!("0x{:06X}", entry.probe_offset),
                    "ECU identified"
                );
                return Some(entry.ecu.clone());
            }
            Ok(data) => {
                debug!(
                    address = format!("0x{:06X}", entry.probe_offset),
                    data = %hex::encode(&data),
                    "No match for {}", entry.ecu.name
                );
            }
            Err(e) => {
                debug!(
                    address = format!("0x{:06X}", entry.probe_offset),
                    error = %e,
                    "Probe failed for {}", entry.ecu.name
                );
            }
        }
    }

    None
}

/// Read a memory window and render each byte as a character
pub async fn read_ascii(service: &KwpService, address: u32, size: u8) -> Result<String, KwpError> {
    let data = service.read_memory(address, size).await?;
    Ok(data.into_iter().map(char::from).collect())
}

/// Calibration id and description of an identified ECU
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalibrationInfo {
    pub calibration: String,
    pub description: String,
}

/// Read the calibration windows, shifted by the ECU's memory offset
pub async fn read_calibration(
    service: &KwpService,
    ecu: &EcuDescriptor,
) -> Result<CalibrationInfo, KwpError> {
    let address = |base: u32| {
        ecu.address(base).ok_or_else(|| {
            KwpError::InvalidResponse(format!(
                "Calibration address 0x{:06X}{:+} out of range",
                base, ecu.memory_offset
            ))
        })
    };

    let calibration = read_ascii(service, address(CALIBRATION_ADDRESS)?, CALIBRATION_LEN).await?;
    let description = read_ascii(service, address(DESCRIPTION_ADDRESS)?, CALIBRATION_LEN).await?;

    Ok(CalibrationInfo {
        calibration,
        description,
    })
}
