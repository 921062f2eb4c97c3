//! BLE advertisement channel
//!
//! Broadcasts application payloads as manufacturer specific data. Each
//! `message_put` encodes a fresh advertisement and scan response into the next
//! ring slot and points the radio at it straight away, so the air always
//! carries the newest payload rather than the oldest. This departs from the
//! FIFO order of the other channels and is kept on purpose: a beacon should
//! never broadcast stale data while newer data is queued.
//!
//! Parameter setters reconfigure a running broadcast in place: stop,
//! apply, start again.

use crate::core::channel::{Channel, ChannelKind, Hooks, Message};
use crate::core::error::{Error, Result};
use crate::core::flag::StickyFlag;
use crate::core::ring_buffer::RingBuffer;

use super::adv_data::{self, flags, AdvPayload, MAX_MANUFACTURER_DATA_LEN};

/// Default number of advertisement slots
pub const ADV_QUEUE_LEN: usize = 5;

pub const MIN_INTERVAL_MS: u16 = 100;
pub const MAX_INTERVAL_MS: u16 = 10_000;

/// Transmit power levels the radio supports, in dBm
pub const TX_POWER_LEVELS: [i8; 8] = [-40, -20, -16, -12, -8, -4, 0, 4];

/// Legacy advertising PDU types offered by the channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdvType {
    NonConnectableNonScannable,
    NonConnectableScannable,
    ConnectableScannable,
}

impl AdvType {
    pub fn is_scannable(&self) -> bool {
        !matches!(self, AdvType::NonConnectableNonScannable)
    }

    pub fn is_connectable(&self) -> bool {
        matches!(self, AdvType::ConnectableScannable)
    }
}

/// Radio parameters applied together with a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdvParams {
    pub interval_ms: u16,
    pub power_dbm: i8,
    pub adv_type: AdvType,
}

impl AdvParams {
    /// Interval in 0.625 ms radio units
    pub fn interval_units(&self) -> u32 {
        u32::from(self.interval_ms) * 1000 / 625
    }
}

/// Runtime advertising configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvertisingConfig {
    pub params: AdvParams,
    /// Company identifier placed before the manufacturer data
    pub manufacturer_id: u16,
    pub device_name: &'static str,
    /// Add the NUS service UUID to the scan response
    pub scan_response_uuid: bool,
}

impl Default for AdvertisingConfig {
    fn default() -> Self {
        Self {
            params: AdvParams {
                interval_ms: 1000,
                power_dbm: 0,
                adv_type: AdvType::NonConnectableNonScannable,
            },
            manufacturer_id: 0xFFFF,
            device_name: "nRF52820",
            scan_response_uuid: false,
        }
    }
}

/// Payload pointers handed to the radio; the slices stay valid while the
/// slot they come from is queued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvertisingData<'a> {
    pub advertisement: &'a [u8],
    /// Empty when the advertising type has no scan response
    pub scan_response: &'a [u8],
}

/// Radio failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioError {
    /// Operation not allowed in the radio's current state
    InvalidState,
    /// Radio rejected a parameter
    InvalidParam,
    Internal,
}

impl From<RadioError> for Error {
    fn from(err: RadioError) -> Self {
        match err {
            RadioError::InvalidState => Error::InvalidState,
            RadioError::InvalidParam => Error::InvalidParam,
            RadioError::Internal => Error::Internal,
        }
    }
}

/// Advertising primitives of the radio stack
pub trait Broadcaster {
    /// Point the radio at new payloads and/or parameters. `params` must be
    /// `None` while advertising is running.
    fn configure(&mut self, data: Option<AdvertisingData<'_>>, params: Option<&AdvParams>) -> core::result::Result<(), RadioError>;

    fn start(&mut self) -> core::result::Result<(), RadioError>;

    fn stop(&mut self) -> core::result::Result<(), RadioError>;

    fn set_tx_power(&mut self, dbm: i8) -> core::result::Result<(), RadioError>;
}

/// One encoded advertisement and its scan response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvSlot {
    pub advertisement: AdvPayload,
    pub scan_response: AdvPayload,
    pub repeat: bool,
}

/// Round down to the nearest supported power level
pub fn quantize_tx_power(dbm: i8) -> Result<i8> {
    if dbm > TX_POWER_LEVELS[TX_POWER_LEVELS.len() - 1] {
        return Err(Error::InvalidParam);
    }
    let level = TX_POWER_LEVELS
        .iter()
        .rev()
        .find(|level| **level <= dbm)
        .copied()
        .unwrap_or(TX_POWER_LEVELS[0]);
    Ok(level)
}

/// Advertisement channel
pub struct AdvChannel<B: Broadcaster, const N: usize = ADV_QUEUE_LEN> {
    broadcaster: B,
    slots: RingBuffer<AdvSlot, N>,
    config: AdvertisingConfig,
    advertising: StickyFlag,
    initialized: bool,
    hooks: Hooks,
}

impl<B: Broadcaster, const N: usize> AdvChannel<B, N> {
    pub fn new(broadcaster: B, config: AdvertisingConfig) -> Self {
        Self {
            broadcaster,
            slots: RingBuffer::new(),
            config,
            advertising: StickyFlag::new(false),
            initialized: false,
            hooks: Hooks::new(),
        }
    }

    pub fn config(&self) -> &AdvertisingConfig {
        &self.config
    }

    pub fn broadcaster(&self) -> &B {
        &self.broadcaster
    }

    pub fn broadcaster_mut(&mut self) -> &mut B {
        &mut self.broadcaster
    }

    pub fn is_advertising(&self) -> bool {
        self.advertising.is_set()
    }

    /// Slot the radio currently points at
    pub fn active(&self) -> Option<&AdvSlot> {
        self.slots.newest()
    }

    pub fn slot_count(&self) -> usize {
        self.slots.count()
    }

    pub fn set_interval(&mut self, interval_ms: u16) -> Result<()> {
        self.ensure_initialized()?;
        if !(MIN_INTERVAL_MS..=MAX_INTERVAL_MS).contains(&interval_ms) {
            return Err(Error::InvalidParam);
        }
        let params = AdvParams { interval_ms, ..self.config.params };
        self.apply(params)
    }

    /// Set transmit power, rounded down to a supported level
    pub fn set_power(&mut self, dbm: i8) -> Result<()> {
        self.ensure_initialized()?;
        let power_dbm = quantize_tx_power(dbm)?;
        let params = AdvParams { power_dbm, ..self.config.params };
        self.apply(params)
    }

    pub fn set_type(&mut self, adv_type: AdvType) -> Result<()> {
        let params = AdvParams { adv_type, ..self.config.params };
        self.apply(params)
    }

    /// Company id used for payloads put from now on. The payload on air
    /// keeps its id, so the radio is left alone.
    pub fn set_manufacturer_id(&mut self, manufacturer_id: u16) -> Result<()> {
        self.ensure_initialized()?;
        self.config.manufacturer_id = manufacturer_id;
        Ok(())
    }

    /// Include the NUS UUID in scan responses put from now on
    pub fn set_scan_response_uuid(&mut self, enabled: bool) -> Result<()> {
        self.ensure_initialized()?;
        self.config.scan_response_uuid = enabled;
        Ok(())
    }

    /// Start the radio again after the stack stopped it on its own, e.g. on
    /// an incoming connection. Parameters and payload stay as configured.
    pub fn restart(&mut self) -> Result<()> {
        self.ensure_initialized()?;
        self.broadcaster.start()?;
        self.advertising.set();
        info!("Advertising restarted");
        Ok(())
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(Error::InvalidState)
        }
    }

    fn radio_data(slot: Option<&AdvSlot>, adv_type: AdvType) -> Option<AdvertisingData<'_>> {
        slot.map(|slot| {
            let scan_response: &[u8] = if adv_type.is_scannable() { slot.scan_response.as_slice() } else { &[] };
            AdvertisingData {
                advertisement: slot.advertisement.as_slice(),
                scan_response,
            }
        })
    }

    fn encode(&self, message: &Message<'_>) -> Result<AdvSlot> {
        let adv_type = self.config.params.adv_type;
        let mut ad_flags = flags::BR_EDR_NOT_SUPPORTED;
        if adv_type.is_connectable() {
            ad_flags |= flags::LE_GENERAL_DISCOVERABLE;
        }
        let advertisement = adv_data::encode_advertisement(ad_flags, self.config.manufacturer_id, message.payload)?;
        // Kept even for non-scannable types so a later `set_type` can use it
        let scan_response = adv_data::encode_scan_response(self.config.device_name, self.config.scan_response_uuid)?;
        Ok(AdvSlot {
            advertisement,
            scan_response,
            repeat: message.repeat,
        })
    }

    /// Stop if running, program `params`, restart. `params` is kept only
    /// once the radio accepted it.
    fn apply(&mut self, params: AdvParams) -> Result<()> {
        self.ensure_initialized()?;
        let running = self.advertising.is_set();
        if running {
            self.broadcaster.stop()?;
            self.advertising.clear();
        }

        let data = Self::radio_data(self.slots.newest(), params.adv_type);
        self.broadcaster.configure(data, Some(&params))?;
        self.broadcaster.set_tx_power(params.power_dbm)?;
        self.config.params = params;
        debug!(
            "Advertising params: {} ms, {} dBm, {}",
            params.interval_ms, params.power_dbm, params.adv_type
        );

        if running {
            self.broadcaster.start()?;
            self.advertising.set();
        }
        Ok(())
    }
}

impl<B: Broadcaster, const N: usize> Channel for AdvChannel<B, N> {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Advertisement
    }

    fn mtu(&self) -> usize {
        MAX_MANUFACTURER_DATA_LEN
    }

    fn init(&mut self) -> Result<()> {
        if self.initialized {
            return Err(Error::InvalidState);
        }
        self.slots.clear();
        self.advertising.clear();
        self.initialized = true;
        info!("Advertisement channel initialized");
        Ok(())
    }

    fn uninit(&mut self) -> Result<()> {
        self.ensure_initialized()?;
        if self.advertising.take() {
            self.broadcaster.stop()?;
        }
        self.slots.clear();
        self.initialized = false;
        info!("Advertisement channel released");
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// The stack stops advertising when a central connects
    fn on_connect(&self) {
        self.advertising.clear();
        self.hooks.notify_connect();
    }

    /// Broadcasting has no link to lose
    fn is_connected(&self) -> bool {
        true
    }

    fn process_async(&mut self) -> Result<()> {
        self.ensure_initialized()?;
        if self.slots.is_empty() {
            trace!("Advertising: nothing to broadcast yet");
            return Ok(());
        }
        if !self.advertising.is_set() {
            self.broadcaster.set_tx_power(self.config.params.power_dbm)?;
            self.broadcaster.start()?;
            self.advertising.set();
            info!("Advertising started");
        }
        Ok(())
    }

    fn process_sync(&mut self) -> Result<()> {
        Err(Error::NotSupported)
    }

    /// Drop every slot except the one on air
    fn flush_tx(&mut self) {
        while self.slots.count() > 1 {
            let _ = self.slots.pop();
        }
    }

    fn flush_rx(&mut self) {}

    fn message_put(&mut self, message: &Message<'_>) -> Result<()> {
        self.ensure_initialized()?;
        if message.payload.len() > MAX_MANUFACTURER_DATA_LEN {
            return Err(Error::InvalidLength);
        }
        if self.slots.is_full() {
            return Err(Error::ResourceExhausted);
        }

        let slot = self.encode(message)?;
        self.slots.push(slot)?;

        // Parameters may only change while stopped
        let params = if self.advertising.is_set() { None } else { Some(&self.config.params) };
        let data = Self::radio_data(self.slots.newest(), self.config.params.adv_type);
        if let Err(err) = self.broadcaster.configure(data, params) {
            error!("Advertising configure failed: {}", err);
            self.slots.discard_newest();
            return Err(err.into());
        }
        Ok(())
    }

    fn message_get(&mut self, _out: &mut [u8]) -> Result<usize> {
        Err(Error::NotSupported)
    }

    fn hooks(&self) -> &Hooks {
        &self.hooks
    }
}
