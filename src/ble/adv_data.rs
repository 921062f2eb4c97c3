//! Legacy advertising data encoder
//!
//! Builds AD structures (length, type, data) into a 31-byte buffer as the
//! radio sends them on air.

use heapless::Vec;

use crate::core::error::Error;

/// Legacy advertising and scan response payload limit
pub const MAX_ADV_DATA_LEN: usize = 31;

/// Flags AD structure (3 bytes) plus manufacturer header (4 bytes)
pub const MAX_MANUFACTURER_DATA_LEN: usize = MAX_ADV_DATA_LEN - 3 - 4;

/// Nordic UART Service UUID, 6E400001-B5A3-F393-E0A9-E50E24DCCA9E
pub const NUS_SERVICE_UUID: u128 = 0x6E40_0001_B5A3_F393_E0A9_E50E_24DC_CA9E;

pub type AdvPayload = Vec<u8, MAX_ADV_DATA_LEN>;

/// AD type codes from the Bluetooth assigned numbers
pub mod ad_type {
    pub const FLAGS: u8 = 0x01;
    pub const COMPLETE_LIST_128_UUIDS: u8 = 0x07;
    pub const SHORTENED_LOCAL_NAME: u8 = 0x08;
    pub const COMPLETE_LOCAL_NAME: u8 = 0x09;
    pub const MANUFACTURER_SPECIFIC_DATA: u8 = 0xFF;
}

/// Bits of the flags AD structure
pub mod flags {
    pub const LE_GENERAL_DISCOVERABLE: u8 = 0x02;
    pub const BR_EDR_NOT_SUPPORTED: u8 = 0x04;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdvDataError {
    /// Structure does not fit in the remaining payload space
    DoesNotFit,
}

impl From<AdvDataError> for Error {
    fn from(_: AdvDataError) -> Self {
        Error::InvalidLength
    }
}

/// Appends AD structures to a payload
#[derive(Debug, Clone, Default)]
pub struct AdvDataBuilder {
    buf: AdvPayload,
}

impl AdvDataBuilder {
    pub const fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Bytes still available, including the length and type header
    pub fn remaining(&self) -> usize {
        MAX_ADV_DATA_LEN - self.buf.len()
    }

    pub fn flags(&mut self, flags: u8) -> Result<&mut Self, AdvDataError> {
        self.field(ad_type::FLAGS, &[&[flags]])
    }

    pub fn manufacturer_data(&mut self, company_id: u16, data: &[u8]) -> Result<&mut Self, AdvDataError> {
        self.field(ad_type::MANUFACTURER_SPECIFIC_DATA, &[&company_id.to_le_bytes(), data])
    }

    pub fn uuid_128(&mut self, uuid: u128) -> Result<&mut Self, AdvDataError> {
        self.field(ad_type::COMPLETE_LIST_128_UUIDS, &[&uuid.to_le_bytes()])
    }

    /// Complete local name, or as much of it as fits as a shortened name.
    /// Adds nothing when not even one byte of the name fits.
    pub fn name(&mut self, name: &str) -> Result<&mut Self, AdvDataError> {
        let name = name.as_bytes();
        let room = self.remaining().saturating_sub(2);
        if name.len() <= room {
            self.field(ad_type::COMPLETE_LOCAL_NAME, &[name])
        } else if room > 0 {
            self.field(ad_type::SHORTENED_LOCAL_NAME, &[&name[..room]])
        } else {
            Ok(self)
        }
    }

    pub fn build(self) -> AdvPayload {
        self.buf
    }

    fn field(&mut self, ad_type: u8, parts: &[&[u8]]) -> Result<&mut Self, AdvDataError> {
        let len: usize = parts.iter().map(|part| part.len()).sum();
        if len + 2 > self.remaining() {
            return Err(AdvDataError::DoesNotFit);
        }
        // Length byte counts the type byte
        self.buf.push((len + 1) as u8).map_err(|_| AdvDataError::DoesNotFit)?;
        self.buf.push(ad_type).map_err(|_| AdvDataError::DoesNotFit)?;
        for part in parts {
            self.buf
                .extend_from_slice(part)
                .map_err(|_| AdvDataError::DoesNotFit)?;
        }
        Ok(self)
    }
}

/// Flags plus manufacturer specific data
pub fn encode_advertisement(flags: u8, company_id: u16, data: &[u8]) -> Result<AdvPayload, AdvDataError> {
    let mut builder = AdvDataBuilder::new();
    builder.flags(flags)?.manufacturer_data(company_id, data)?;
    Ok(builder.build())
}

/// Optional 128-bit NUS UUID followed by the device name
pub fn encode_scan_response(name: &str, include_nus_uuid: bool) -> Result<AdvPayload, AdvDataError> {
    let mut builder = AdvDataBuilder::new();
    if include_nus_uuid {
        builder.uuid_128(NUS_SERVICE_UUID)?;
    }
    builder.name(name)?;
    Ok(builder.build())
}
