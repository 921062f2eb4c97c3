//! Channel contract
//!
//! One trait implemented by every transport: the GATT Nordic UART Service,
//! BLE advertisements and the NFC tag. Upstream tasks hold a
//! `&mut dyn Channel` and drive it with `process_async`/`process_sync` from
//! their own loop; radio events enter through `on_connect`, `on_disconnect`
//! and `tx_complete`.

use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

use super::error::Result;

/// Transport behind a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelKind {
    Gatt,
    Advertisement,
    Nfc,
}

/// Outgoing message handed to [`Channel::message_put`].
///
/// The payload is borrowed; the channel copies it into its own slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message<'a> {
    pub payload: &'a [u8],
    /// Keep sending the message until the TX side is flushed
    pub repeat: bool,
}

impl<'a> Message<'a> {
    /// One-shot message
    pub const fn new(payload: &'a [u8]) -> Self {
        Self { payload, repeat: false }
    }

    /// Message that cycles until `flush_tx`
    pub const fn repeating(payload: &'a [u8]) -> Self {
        Self { payload, repeat: true }
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Application callback; runs in whatever context raised the event
pub type Hook = fn();

/// Callbacks an application can attach to a channel
#[derive(Debug, Clone, Copy, Default)]
pub struct HookSet {
    pub on_connect: Option<Hook>,
    pub on_disconnect: Option<Hook>,
    pub on_rx: Option<Hook>,
    pub on_tx: Option<Hook>,
}

impl HookSet {
    pub const NONE: HookSet = HookSet {
        on_connect: None,
        on_disconnect: None,
        on_rx: None,
        on_tx: None,
    };
}

/// Hook storage shared between interrupt and foreground context
pub struct Hooks {
    set: Mutex<CriticalSectionRawMutex, Cell<HookSet>>,
}

impl Hooks {
    pub const fn new() -> Self {
        Self {
            set: Mutex::new(Cell::new(HookSet::NONE)),
        }
    }

    /// Replace all callbacks at once
    pub fn register(&self, hooks: HookSet) {
        self.set.lock(|set| set.set(hooks));
    }

    pub fn set_on_connect(&self, hook: Option<Hook>) {
        self.update(|set| set.on_connect = hook);
    }

    pub fn set_on_disconnect(&self, hook: Option<Hook>) {
        self.update(|set| set.on_disconnect = hook);
    }

    pub fn set_on_rx(&self, hook: Option<Hook>) {
        self.update(|set| set.on_rx = hook);
    }

    pub fn set_on_tx(&self, hook: Option<Hook>) {
        self.update(|set| set.on_tx = hook);
    }

    pub fn clear(&self) {
        self.register(HookSet::NONE);
    }

    pub fn current(&self) -> HookSet {
        self.set.lock(|set| set.get())
    }

    pub fn notify_connect(&self) {
        self.fire(|set| set.on_connect);
    }

    pub fn notify_disconnect(&self) {
        self.fire(|set| set.on_disconnect);
    }

    pub fn notify_rx(&self) {
        self.fire(|set| set.on_rx);
    }

    pub fn notify_tx(&self) {
        self.fire(|set| set.on_tx);
    }

    fn update(&self, f: impl FnOnce(&mut HookSet)) {
        self.set.lock(|set| {
            let mut hooks = set.get();
            f(&mut hooks);
            set.set(hooks);
        });
    }

    // Callbacks run outside the critical section
    fn fire(&self, select: impl FnOnce(&HookSet) -> Option<Hook>) {
        let hook = self.set.lock(|set| select(&set.get()));
        if let Some(hook) = hook {
            hook();
        }
    }
}

impl Default for Hooks {
    fn default() -> Self {
        Self::new()
    }
}

/// Uniform interface over every transport.
///
/// Lifecycle: uninitialized, then initialized (disconnected or connected),
/// then back to uninitialized through `uninit`. Operations other than `init`,
/// the flushes, `is_connected` and the event entry points fail with
/// [`Error::InvalidState`](super::error::Error::InvalidState) while the
/// channel is uninitialized.
pub trait Channel {
    fn kind(&self) -> ChannelKind;

    /// Largest payload `message_put` accepts
    fn mtu(&self) -> usize;

    /// Bind buffers and reset queues; fails if already initialized
    fn init(&mut self) -> Result<()>;

    /// Release the channel; queued data is dropped
    fn uninit(&mut self) -> Result<()>;

    fn is_initialized(&self) -> bool;

    /// Transport reported a new link or field
    fn on_connect(&self) {
        self.hooks().notify_connect();
    }

    /// Transport reported the link or field is gone
    fn on_disconnect(&self) {
        self.hooks().notify_disconnect();
    }

    fn is_connected(&self) -> bool;

    /// Move queued data onto the transport without blocking
    fn process_async(&mut self) -> Result<()>;

    /// Like `process_async`, but may wait for the transport
    fn process_sync(&mut self) -> Result<()>;

    /// Transport finished a transfer
    fn tx_complete(&self) {
        self.hooks().notify_tx();
    }

    /// Drop queued outgoing data without sending it
    fn flush_tx(&mut self);

    /// Drop received data without delivering it
    fn flush_rx(&mut self);

    /// Copy a message into the channel's TX queue
    fn message_put(&mut self, message: &Message<'_>) -> Result<()>;

    /// Copy the oldest received payload into `out` and return its length
    fn message_get(&mut self, out: &mut [u8]) -> Result<usize>;

    fn hooks(&self) -> &Hooks;
}
