//! Common test utilities
//!
//! Mock radio backends for the channel tests plus small data helpers.
//! The blocking mutexes inside the channels run on the `critical-section`
//! std implementation pulled in through dev-dependencies.

#![allow(dead_code)]

use nrf_comm_channels::ble::advertising::{AdvParams, AdvertisingData, Broadcaster, RadioError};
use nrf_comm_channels::ble::gatt::{NusTransport, TransportError};
use nrf_comm_channels::nfc::tag::{TagEmulator, TagError};

/// Test helper to create test data arrays
pub fn create_test_data(size: usize, pattern: u8) -> heapless::Vec<u8, 256> {
    let mut data = heapless::Vec::new();
    for i in 0..size {
        data.push(pattern.wrapping_add(i as u8)).unwrap();
    }
    data
}

/// Test helper to compare byte arrays
pub fn arrays_equal(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x == y)
}

/// NUS transport recording every accepted notification
#[derive(Default)]
pub struct MockNus {
    /// (connection handle, payload) per accepted send
    pub sent: Vec<(u16, Vec<u8>)>,
    /// Sends accepted before reporting busy; `None` accepts everything
    pub budget: Option<usize>,
    /// Busy answers to give before accepting again
    pub busy_rounds: usize,
    /// Hard failure returned by every send
    pub fail_with: Option<TransportError>,
    pub attempts: usize,
}

impl MockNus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_budget(budget: usize) -> Self {
        Self {
            budget: Some(budget),
            ..Self::default()
        }
    }

    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.sent.iter().map(|(_, data)| data.clone()).collect()
    }
}

impl NusTransport for MockNus {
    fn send(&mut self, conn_handle: u16, data: &[u8]) -> nb::Result<(), TransportError> {
        self.attempts += 1;
        if let Some(err) = self.fail_with {
            return Err(nb::Error::Other(err));
        }
        if self.busy_rounds > 0 {
            self.busy_rounds -= 1;
            return Err(nb::Error::WouldBlock);
        }
        if let Some(budget) = self.budget.as_mut() {
            if *budget == 0 {
                return Err(nb::Error::WouldBlock);
            }
            *budget -= 1;
        }
        self.sent.push((conn_handle, data.to_vec()));
        Ok(())
    }
}

/// What one `configure` call handed to the radio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigureCall {
    pub advertisement: Option<Vec<u8>>,
    pub scan_response: Option<Vec<u8>>,
    pub params: Option<AdvParams>,
}

/// Broadcaster modelling the SoftDevice rule that parameters cannot
/// change while advertising
#[derive(Default)]
pub struct MockBroadcaster {
    pub calls: Vec<ConfigureCall>,
    pub running: bool,
    pub starts: usize,
    pub stops: usize,
    pub tx_power: Option<i8>,
    pub fail_configure: bool,
}

impl MockBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_call(&self) -> Option<&ConfigureCall> {
        self.calls.last()
    }

    /// Advertisement bytes the radio currently points at
    pub fn on_air(&self) -> Option<&[u8]> {
        self.calls
            .iter()
            .rev()
            .find_map(|call| call.advertisement.as_deref())
    }
}

impl Broadcaster for MockBroadcaster {
    fn configure(&mut self, data: Option<AdvertisingData<'_>>, params: Option<&AdvParams>) -> Result<(), RadioError> {
        if self.fail_configure {
            return Err(RadioError::Internal);
        }
        if self.running && params.is_some() {
            return Err(RadioError::InvalidState);
        }
        self.calls.push(ConfigureCall {
            advertisement: data.map(|data| data.advertisement.to_vec()),
            scan_response: data.map(|data| data.scan_response.to_vec()),
            params: params.copied(),
        });
        Ok(())
    }

    fn start(&mut self) -> Result<(), RadioError> {
        if self.running {
            return Err(RadioError::InvalidState);
        }
        self.running = true;
        self.starts += 1;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), RadioError> {
        self.running = false;
        self.stops += 1;
        Ok(())
    }

    fn set_tx_power(&mut self, dbm: i8) -> Result<(), RadioError> {
        self.tx_power = Some(dbm);
        Ok(())
    }
}

/// Tag emulator with an in-memory NDEF file
#[derive(Default)]
pub struct MockTag {
    /// Message as last written by the reader
    pub reader_write: Vec<u8>,
    /// Every message the channel published
    pub published: Vec<Vec<u8>>,
    pub running: bool,
}

impl MockTag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_published(&self) -> Option<&[u8]> {
        self.published.last().map(|message| message.as_slice())
    }
}

impl TagEmulator for MockTag {
    fn start(&mut self) -> Result<(), TagError> {
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), TagError> {
        self.running = false;
        Ok(())
    }

    fn read_ndef(&mut self, out: &mut [u8]) -> Result<usize, TagError> {
        let len = out.len().min(self.reader_write.len());
        out[..len].copy_from_slice(&self.reader_write[..len]);
        Ok(len)
    }

    fn write_ndef(&mut self, message: &[u8]) -> Result<(), TagError> {
        // NLEN takes two bytes of the 256 byte file
        if message.len() > 254 {
            return Err(TagError::TooLarge);
        }
        self.published.push(message.to_vec());
        Ok(())
    }
}
