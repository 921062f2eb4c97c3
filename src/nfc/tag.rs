//! NFC tag channel
//!
//! [`NfcLink`] takes field and NDEF events from the tag peripheral's
//! interrupt and records them as sticky flags. [`NfcChannel`] does the
//! actual buffer work from the application loop, and only while no reader
//! field is present: with a field up the reader may be halfway through
//! reading or writing the NDEF file.

use core::sync::atomic::{AtomicUsize, Ordering};

use heapless::Vec;

use crate::core::channel::{Channel, ChannelKind, Hooks, Message};
use crate::core::error::{Error, Result};
use crate::core::flag::StickyFlag;

use super::ndef::{self, RecordDesc, RecordSpan, MAX_RECORDS};

/// Size of the emulated NDEF file, NLEN included
pub const NDEF_FILE_SIZE: usize = 256;
/// Largest data record `message_put` accepts
pub const NFC_DATA_BUF_SIZE: usize = 64;
pub const NFC_TEXT_BUF_SIZE: usize = 32;
pub const NFC_URI_BUF_SIZE: usize = 64;
pub const NFC_APP_BUF_SIZE: usize = 32;

/// Tag peripheral failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TagError {
    /// Emulation not running or payload not accepted in this state
    NotReady,
    /// NDEF message does not fit the tag file
    TooLarge,
    Internal,
}

impl From<TagError> for Error {
    fn from(err: TagError) -> Self {
        match err {
            TagError::NotReady => Error::InvalidState,
            TagError::TooLarge => Error::InvalidLength,
            TagError::Internal => Error::Internal,
        }
    }
}

/// Type 4 tag emulation backend. The NLEN prefix of the NDEF file is the
/// emulator's business; the channel only sees the bare NDEF message.
pub trait TagEmulator {
    fn start(&mut self) -> core::result::Result<(), TagError>;

    fn stop(&mut self) -> core::result::Result<(), TagError>;

    /// Copy the message last written by a reader into `out`, up to
    /// `out.len()` bytes. Returns the number of bytes copied.
    fn read_ndef(&mut self, out: &mut [u8]) -> core::result::Result<usize, TagError>;

    /// Replace the message the tag presents to readers
    fn write_ndef(&mut self, message: &[u8]) -> core::result::Result<(), TagError>;
}

/// Events raised by the tag peripheral
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TagEvent {
    FieldOn,
    FieldOff,
    /// Reader finished reading the NDEF file
    NdefRead,
    /// Reader wrote a new NDEF message of `len` bytes
    NdefUpdated { len: usize },
}

/// Interrupt-side state of the tag
pub struct NfcLink {
    connected: StickyFlag,
    rx_updated: StickyFlag,
    tx_updated: StickyFlag,
    configurable: StickyFlag,
    /// Length of a reader write not yet copied out, 0 when none
    rx_pending: AtomicUsize,
    hooks: Hooks,
}

impl NfcLink {
    pub const fn new() -> Self {
        Self {
            connected: StickyFlag::new(false),
            rx_updated: StickyFlag::new(false),
            tx_updated: StickyFlag::new(false),
            configurable: StickyFlag::new(true),
            rx_pending: AtomicUsize::new(0),
            hooks: Hooks::new(),
        }
    }

    pub fn handle_event(&self, event: TagEvent) {
        match event {
            TagEvent::FieldOn => {
                if !self.connected.replace(true) {
                    debug!("NFC: field on");
                    self.hooks.notify_connect();
                }
            }
            TagEvent::FieldOff => {
                if self.connected.replace(false) {
                    debug!("NFC: field off");
                    self.hooks.notify_disconnect();
                }
            }
            TagEvent::NdefRead => self.hooks.notify_tx(),
            // Readers zero NLEN before writing a new message
            TagEvent::NdefUpdated { len: 0 } => {}
            TagEvent::NdefUpdated { len } => {
                self.rx_pending.store(len, Ordering::Release);
                self.rx_updated.set();
                // Restore the staged content over a peer write
                if !self.configurable.is_set() {
                    self.tx_updated.set();
                }
                self.hooks.notify_rx();
            }
        }
    }

    pub fn is_field_present(&self) -> bool {
        self.connected.is_set()
    }

    pub fn rx_updated(&self) -> bool {
        self.rx_updated.is_set()
    }

    pub fn tx_updated(&self) -> bool {
        self.tx_updated.is_set()
    }

    /// Whether reader writes are allowed to stand
    pub fn is_configurable(&self) -> bool {
        self.configurable.is_set()
    }

    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }
}

impl Default for NfcLink {
    fn default() -> Self {
        Self::new()
    }
}

/// Foreground half of the NFC tag channel
pub struct NfcChannel<'a, E: TagEmulator> {
    link: &'a NfcLink,
    emulator: E,
    text: Vec<u8, NFC_TEXT_BUF_SIZE>,
    uri: Vec<u8, NFC_URI_BUF_SIZE>,
    app: Vec<u8, NFC_APP_BUF_SIZE>,
    data: Vec<u8, NFC_DATA_BUF_SIZE>,
    rx: Vec<u8, NDEF_FILE_SIZE>,
    records: Vec<RecordSpan, MAX_RECORDS>,
    cursor: usize,
    initialized: bool,
}

impl<'a, E: TagEmulator> NfcChannel<'a, E> {
    pub const fn new(link: &'a NfcLink, emulator: E) -> Self {
        Self {
            link,
            emulator,
            text: Vec::new(),
            uri: Vec::new(),
            app: Vec::new(),
            data: Vec::new(),
            rx: Vec::new(),
            records: Vec::new(),
            cursor: 0,
            initialized: false,
        }
    }

    pub fn link(&self) -> &NfcLink {
        self.link
    }

    pub fn emulator(&self) -> &E {
        &self.emulator
    }

    pub fn emulator_mut(&mut self) -> &mut E {
        &mut self.emulator
    }

    /// Raw bytes of the batch waiting to be read with `message_get`
    pub fn staged_rx(&self) -> &[u8] {
        &self.rx
    }

    pub fn set_text_record(&mut self, text: &[u8]) -> Result<()> {
        Self::stage(&mut self.text, text)?;
        self.link.tx_updated.set();
        Ok(())
    }

    /// URI record; `uri` is the address without its "https://" scheme
    pub fn set_uri_record(&mut self, uri: &[u8]) -> Result<()> {
        Self::stage(&mut self.uri, uri)?;
        self.link.tx_updated.set();
        Ok(())
    }

    /// Android application record with the given package name
    pub fn set_app_record(&mut self, package: &[u8]) -> Result<()> {
        Self::stage(&mut self.app, package)?;
        self.link.tx_updated.set();
        Ok(())
    }

    fn stage<const C: usize>(buf: &mut Vec<u8, C>, bytes: &[u8]) -> Result<()> {
        if bytes.len() > C {
            return Err(Error::InvalidLength);
        }
        buf.clear();
        buf.extend_from_slice(bytes).map_err(|_| Error::InvalidLength)
    }

    fn ensure_ready(&self) -> Result<()> {
        if !self.initialized || self.link.connected.is_set() {
            return Err(Error::InvalidState);
        }
        Ok(())
    }

    /// Copy a reader write into the RX staging buffer
    fn stage_received(&mut self) -> Result<()> {
        let pending = self.link.rx_pending.load(Ordering::Acquire);
        if pending == 0 {
            return Ok(());
        }
        if !self.rx.is_empty() {
            debug!("NFC: previous batch not drained, holding {} bytes", pending);
            return Err(Error::ResourceExhausted);
        }
        if pending > NDEF_FILE_SIZE {
            warn!("NFC: reader wrote {} bytes, dropping", pending);
            let _ = self
                .link
                .rx_pending
                .compare_exchange(pending, 0, Ordering::AcqRel, Ordering::Acquire);
            return Err(Error::InvalidLength);
        }

        self.rx.resize(pending, 0).map_err(|_| Error::InvalidLength)?;
        let copied = match self.emulator.read_ndef(&mut self.rx) {
            Ok(copied) => copied,
            Err(err) => {
                self.rx.clear();
                return Err(err.into());
            }
        };
        self.rx.truncate(copied);
        // A newer write may have landed meanwhile; it stays pending
        let _ = self
            .link
            .rx_pending
            .compare_exchange(pending, 0, Ordering::AcqRel, Ordering::Acquire);
        if copied == 0 {
            // Nothing readable behind the event, so no batch to drain
            self.reset_rx();
            return Ok(());
        }
        self.records.clear();
        self.cursor = 0;
        self.link.rx_updated.set();
        debug!("NFC: staged {} received bytes", copied);
        Ok(())
    }

    /// Re-encode the outward message when anything staged changed
    fn publish(&mut self) -> Result<()> {
        if !self.link.tx_updated.is_set() {
            return Ok(());
        }

        let mut records: Vec<RecordDesc<'_>, 4> = Vec::new();
        let candidates = [
            (!self.text.is_empty()).then(|| RecordDesc::text(&self.text)),
            (!self.uri.is_empty()).then(|| RecordDesc::https_uri(&self.uri)),
            (!self.app.is_empty()).then(|| RecordDesc::android_app(&self.app)),
            (!self.data.is_empty()).then(|| RecordDesc::data(&self.data)),
        ];
        for record in candidates.into_iter().flatten() {
            records.push(record).map_err(|_| Error::Internal)?;
        }

        let mut message = [0u8; NDEF_FILE_SIZE];
        let len = ndef::encode_message(&records, &mut message)?;
        self.emulator.write_ndef(&message[..len])?;
        self.link.tx_updated.clear();
        debug!("NFC: published {} records, {} bytes", records.len(), len);
        Ok(())
    }

    fn reset_rx(&mut self) {
        self.rx.clear();
        self.records.clear();
        self.cursor = 0;
        self.link.rx_updated.clear();
    }
}

impl<E: TagEmulator> Channel for NfcChannel<'_, E> {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Nfc
    }

    fn mtu(&self) -> usize {
        NFC_DATA_BUF_SIZE
    }

    fn init(&mut self) -> Result<()> {
        if self.initialized {
            return Err(Error::InvalidState);
        }
        self.link.rx_pending.store(0, Ordering::Release);
        self.reset_rx();
        self.data.clear();
        // Reader writes stand until a repeating put says otherwise
        self.link.configurable.set();
        self.emulator.start()?;
        self.initialized = true;
        info!("NFC channel initialized");
        Ok(())
    }

    fn uninit(&mut self) -> Result<()> {
        if !self.initialized {
            return Err(Error::InvalidState);
        }
        self.emulator.stop()?;
        self.reset_rx();
        self.text.clear();
        self.uri.clear();
        self.app.clear();
        self.data.clear();
        // Drop reader writes that were never picked up
        self.link.rx_pending.store(0, Ordering::Release);
        self.link.tx_updated.clear();
        self.link.configurable.set();
        self.initialized = false;
        info!("NFC channel released");
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn on_connect(&self) {
        self.link.handle_event(TagEvent::FieldOn);
    }

    fn on_disconnect(&self) {
        self.link.handle_event(TagEvent::FieldOff);
    }

    fn is_connected(&self) -> bool {
        self.link.is_field_present()
    }

    fn process_async(&mut self) -> Result<()> {
        self.ensure_ready()?;
        // Publish even when RX is refused; the RX error is reported first
        let received = self.stage_received();
        let published = self.publish();
        received.and(published)
    }

    fn process_sync(&mut self) -> Result<()> {
        Err(Error::NotSupported)
    }

    fn flush_tx(&mut self) {
        self.data.clear();
        self.link.tx_updated.set();
    }

    fn flush_rx(&mut self) {
        self.reset_rx();
    }

    fn message_put(&mut self, message: &Message<'_>) -> Result<()> {
        self.ensure_ready()?;
        if message.payload.len() > NFC_DATA_BUF_SIZE {
            return Err(Error::InvalidLength);
        }
        Self::stage(&mut self.data, message.payload)?;
        self.link.configurable.assign(!message.repeat);
        self.link.tx_updated.set();
        Ok(())
    }

    fn message_get(&mut self, out: &mut [u8]) -> Result<usize> {
        self.ensure_ready()?;
        if out.is_empty() {
            return Err(Error::Null);
        }
        if !self.link.rx_updated.is_set() || self.rx.is_empty() {
            return Err(Error::NotFound);
        }

        if self.cursor == 0 && self.records.is_empty() {
            if let Err(err) = ndef::parse_message(&self.rx, &mut self.records) {
                warn!("NFC: unparsable NDEF message: {}", err);
                self.reset_rx();
                return Err(err.into());
            }
        }

        let Some(span) = self.records.get(self.cursor).copied() else {
            self.reset_rx();
            return Err(Error::NotFound);
        };
        self.cursor += 1;

        let result = if span.len > out.len() {
            Err(Error::InvalidLength)
        } else {
            out[..span.len].copy_from_slice(span.payload(&self.rx));
            Ok(span.len)
        };

        if result.is_err() || self.cursor >= self.records.len() {
            self.reset_rx();
        }
        result
    }

    fn hooks(&self) -> &Hooks {
        self.link.hooks()
    }
}
