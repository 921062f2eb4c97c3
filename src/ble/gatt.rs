//! GATT channel over the Nordic UART Service
//!
//! Two halves:
//! - [`GattLink`] lives in a `static` and receives stack events (connect,
//!   disconnect, CCCD writes, RX writes) from the BLE event handler.
//! - [`GattChannel`] owns the notify transport and the TX queue and is
//!   driven from the application loop.
//!
//! A link counts as connected only while a central is attached *and* has
//! enabled notifications on the TX characteristic.

use core::cell::RefCell;
use core::sync::atomic::{AtomicU16, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::Vec;

use crate::core::channel::{Channel, ChannelKind, Hooks, Message};
use crate::core::error::{Error, Result};
use crate::core::flag::StickyFlag;
use crate::core::ring_buffer::RingBuffer;

/// ATT MTU 247 minus opcode and handle
pub const NUS_MAX_DATA_LEN: usize = 244;

/// Default depth of the TX and RX queues
pub const GATT_QUEUE_LEN: usize = 8;

/// Connection handle value meaning "no link"
pub const CONN_HANDLE_INVALID: u16 = 0xFFFF;

/// One NUS frame as held in the queues
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattFrame {
    data: Vec<u8, NUS_MAX_DATA_LEN>,
    repeat: bool,
}

impl GattFrame {
    pub fn new(data: &[u8], repeat: bool) -> Result<Self> {
        let data = Vec::from_slice(data).map_err(|_| Error::InvalidLength)?;
        Ok(Self { data, repeat })
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn repeat(&self) -> bool {
        self.repeat
    }
}

/// Notify transport failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    /// The connection went away under the send
    Disconnected,
    /// Stack rejected the notification
    Internal,
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Disconnected => Error::InvalidState,
            TransportError::Internal => Error::Internal,
        }
    }
}

/// Sends NUS TX notifications.
///
/// `WouldBlock` means the stack has no free notification buffer right now;
/// the frame stays queued and is retried on the next process call.
pub trait NusTransport {
    fn send(&mut self, conn_handle: u16, data: &[u8]) -> nb::Result<(), TransportError>;
}

/// Stack events delivered to a [`GattLink`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GattEvent<'a> {
    Connected { conn_handle: u16 },
    Disconnected,
    /// CCCD write on the TX characteristic
    NotificationsChanged { enabled: bool },
    /// Write on the RX characteristic
    Received(&'a [u8]),
    /// Stack finished sending queued notifications
    TxComplete,
}

/// Interrupt-side state of one NUS link
pub struct GattLink<const N: usize = GATT_QUEUE_LEN> {
    conn_handle: AtomicU16,
    notifications: StickyFlag,
    rx_queue: Mutex<CriticalSectionRawMutex, RefCell<RingBuffer<GattFrame, N>>>,
    hooks: Hooks,
}

impl<const N: usize> GattLink<N> {
    pub const fn new() -> Self {
        Self {
            conn_handle: AtomicU16::new(CONN_HANDLE_INVALID),
            notifications: StickyFlag::new(false),
            rx_queue: Mutex::new(RefCell::new(RingBuffer::new())),
            hooks: Hooks::new(),
        }
    }

    /// Dispatch a stack event. Only `Received` can fail, when the frame is
    /// dropped.
    pub fn handle_event(&self, event: GattEvent<'_>) -> Result<()> {
        match event {
            GattEvent::Connected { conn_handle } => {
                info!("NUS: connected, handle {}", conn_handle);
                self.conn_handle.store(conn_handle, Ordering::Release);
                self.notifications.clear();
                self.hooks.notify_connect();
            }
            GattEvent::Disconnected => {
                info!("NUS: disconnected");
                self.conn_handle.store(CONN_HANDLE_INVALID, Ordering::Release);
                self.notifications.clear();
                self.hooks.notify_disconnect();
            }
            GattEvent::NotificationsChanged { enabled } => {
                debug!("NUS: notifications {}", enabled);
                self.notifications.assign(enabled);
            }
            GattEvent::Received(data) => {
                self.receive(data)?;
                self.hooks.notify_rx();
            }
            GattEvent::TxComplete => self.hooks.notify_tx(),
        }
        Ok(())
    }

    /// Handle of the attached central, subscribed or not
    pub fn conn_handle(&self) -> Option<u16> {
        match self.conn_handle.load(Ordering::Acquire) {
            CONN_HANDLE_INVALID => None,
            handle => Some(handle),
        }
    }

    pub fn notifications_enabled(&self) -> bool {
        self.notifications.is_set()
    }

    /// Handle to send on, if the central has subscribed
    pub fn subscribed_handle(&self) -> Option<u16> {
        self.conn_handle().filter(|_| self.notifications.is_set())
    }

    pub fn rx_count(&self) -> usize {
        self.rx_queue.lock(|queue| queue.borrow().count())
    }

    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    fn receive(&self, data: &[u8]) -> Result<()> {
        let frame = GattFrame::new(data, false).map_err(|err| {
            warn!("NUS: dropping {} byte frame, over MTU", data.len());
            err
        })?;
        self.rx_queue.lock(|queue| {
            queue.borrow_mut().push(frame).map_err(|err| {
                warn!("NUS: RX queue full, dropping frame");
                Error::from(err)
            })
        })
    }

    fn pop_received(&self, out: &mut [u8]) -> Result<usize> {
        self.rx_queue.lock(|queue| {
            let mut queue = queue.borrow_mut();
            let len = queue.peek_at(0).ok_or(Error::NotFound)?.as_slice().len();
            if len > out.len() {
                return Err(Error::InvalidLength);
            }
            let frame = queue.pop()?;
            out[..len].copy_from_slice(frame.as_slice());
            Ok(len)
        })
    }

    fn clear_received(&self) {
        self.rx_queue.lock(|queue| queue.borrow_mut().clear());
    }
}

impl<const N: usize> Default for GattLink<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Foreground half of the NUS channel
pub struct GattChannel<'a, T: NusTransport, const N: usize = GATT_QUEUE_LEN> {
    link: &'a GattLink<N>,
    transport: T,
    tx_queue: RingBuffer<GattFrame, N>,
    initialized: bool,
}

impl<'a, T: NusTransport, const N: usize> GattChannel<'a, T, N> {
    pub const fn new(link: &'a GattLink<N>, transport: T) -> Self {
        Self {
            link,
            transport,
            tx_queue: RingBuffer::new(),
            initialized: false,
        }
    }

    pub fn link(&self) -> &GattLink<N> {
        self.link
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn tx_count(&self) -> usize {
        self.tx_queue.count()
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(Error::InvalidState)
        }
    }

    /// Offer the oldest frame to the transport. On acceptance the frame
    /// leaves the head, and goes back to the tail if it repeats.
    fn send_head(&mut self, conn_handle: u16) -> nb::Result<(), Error> {
        let Some(frame) = self.tx_queue.peek_at(0) else {
            return Ok(());
        };
        self.transport
            .send(conn_handle, frame.as_slice())
            .map_err(|err| err.map(Error::from))?;

        let frame = self.tx_queue.pop().map_err(Error::from)?;
        trace!("NUS: sent {} bytes", frame.as_slice().len());
        if frame.repeat {
            self.tx_queue.push(frame).map_err(Error::from)?;
        }
        Ok(())
    }
}

impl<T: NusTransport, const N: usize> Channel for GattChannel<'_, T, N> {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Gatt
    }

    fn mtu(&self) -> usize {
        NUS_MAX_DATA_LEN
    }

    fn init(&mut self) -> Result<()> {
        if self.initialized {
            return Err(Error::InvalidState);
        }
        self.tx_queue.clear();
        self.link.clear_received();
        self.initialized = true;
        info!("NUS channel initialized");
        Ok(())
    }

    fn uninit(&mut self) -> Result<()> {
        self.ensure_initialized()?;
        self.flush_tx();
        self.flush_rx();
        self.initialized = false;
        info!("NUS channel released");
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn is_connected(&self) -> bool {
        self.link.subscribed_handle().is_some()
    }

    fn process_async(&mut self) -> Result<()> {
        self.ensure_initialized()?;
        let Some(conn_handle) = self.link.subscribed_handle() else {
            return Ok(());
        };

        // One pass over what was queued on entry; repeating frames wait for
        // the next call
        for _ in 0..self.tx_queue.count() {
            match self.send_head(conn_handle) {
                Ok(()) => {}
                Err(nb::Error::WouldBlock) => {
                    debug!("NUS: transport busy, {} frames pending", self.tx_queue.count());
                    break;
                }
                Err(nb::Error::Other(Error::InvalidState)) => {
                    debug!("NUS: link dropped during send");
                    break;
                }
                Err(nb::Error::Other(err)) => {
                    error!("NUS: send failed: {}", err);
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    fn process_sync(&mut self) -> Result<()> {
        self.ensure_initialized()?;
        if self.tx_queue.is_empty() {
            return Ok(());
        }
        let conn_handle = self.link.subscribed_handle().ok_or(Error::InvalidState)?;
        nb::block!(self.send_head(conn_handle))
    }

    fn flush_tx(&mut self) {
        self.tx_queue.clear();
    }

    fn flush_rx(&mut self) {
        self.link.clear_received();
    }

    fn message_put(&mut self, message: &Message<'_>) -> Result<()> {
        self.ensure_initialized()?;
        if message.payload.len() > NUS_MAX_DATA_LEN {
            return Err(Error::InvalidLength);
        }
        if self.tx_queue.is_full() {
            return Err(Error::ResourceExhausted);
        }
        let frame = GattFrame::new(message.payload, message.repeat)?;
        self.tx_queue.push(frame)?;
        Ok(())
    }

    fn message_get(&mut self, out: &mut [u8]) -> Result<usize> {
        self.ensure_initialized()?;
        if out.is_empty() {
            return Err(Error::Null);
        }
        self.link.pop_received(out)
    }

    fn hooks(&self) -> &Hooks {
        self.link.hooks()
    }
}
