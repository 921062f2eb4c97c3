mod common;

use std::sync::atomic::{AtomicUsize, Ordering};

use common::{MockBroadcaster, MockNus, MockTag};
use nrf_comm_channels::ble::advertising::{AdvChannel, AdvertisingConfig};
use nrf_comm_channels::ble::gatt::{GattChannel, GattEvent, GattLink};
use nrf_comm_channels::core::flag::StickyFlag;
use nrf_comm_channels::nfc::tag::{NfcChannel, NfcLink};
use nrf_comm_channels::{Channel, ChannelKind, Error, Message};

static GATT_LINK: GattLink = GattLink::new();
static NFC_LINK: NfcLink = NfcLink::new();

static CONNECTS: AtomicUsize = AtomicUsize::new(0);

fn count_connect() {
    CONNECTS.fetch_add(1, Ordering::SeqCst);
}

/// Drive any channel the way an upstream task does
fn put_and_process(channel: &mut dyn Channel, payload: &[u8]) -> Result<(), Error> {
    channel.message_put(&Message::new(payload))?;
    match channel.process_async() {
        Err(err) if err.is_fatal() => Err(err),
        _ => Ok(()),
    }
}

#[test]
fn test_dyn_dispatch_over_all_transports() {
    let mut gatt = GattChannel::new(&GATT_LINK, MockNus::new());
    let mut adv: AdvChannel<MockBroadcaster> = AdvChannel::new(MockBroadcaster::new(), AdvertisingConfig::default());
    let mut nfc = NfcChannel::new(&NFC_LINK, MockTag::new());

    let mut channels: [&mut dyn Channel; 3] = [&mut gatt, &mut adv, &mut nfc];
    let kinds: Vec<ChannelKind> = channels.iter().map(|channel| channel.kind()).collect();
    assert_eq!(kinds, vec![ChannelKind::Gatt, ChannelKind::Advertisement, ChannelKind::Nfc]);

    for channel in channels.iter_mut() {
        assert!(!channel.is_initialized());
        assert_eq!(channel.message_put(&Message::new(b"early")), Err(Error::InvalidState));
        channel.init().unwrap();
        channel.hooks().set_on_connect(Some(count_connect));
    }

    GATT_LINK.handle_event(GattEvent::Connected { conn_handle: 3 }).unwrap();
    GATT_LINK.handle_event(GattEvent::NotificationsChanged { enabled: true }).unwrap();

    for channel in channels.iter_mut() {
        put_and_process(&mut **channel, b"hello").unwrap();
        let oversize = vec![0u8; channel.mtu() + 1];
        assert_eq!(channel.message_put(&Message::new(&oversize)), Err(Error::InvalidLength));
        channel.flush_tx();
        channel.flush_rx();
    }

    for channel in channels.iter() {
        channel.on_connect();
    }
    // GATT fires its connect hook from the link event as well
    assert_eq!(CONNECTS.load(Ordering::SeqCst), 4);

    for channel in channels.iter_mut() {
        channel.uninit().unwrap();
        assert!(!channel.is_initialized());
    }

    assert_eq!(gatt.transport().payloads(), vec![b"hello".to_vec()]);
    assert!(adv.broadcaster().starts >= 1);
    assert_eq!(nfc.emulator().published.len(), 1);
}

#[test]
fn test_message_constructors() {
    let once = Message::new(b"abc");
    assert!(!once.repeat);
    assert_eq!(once.len(), 3);

    let repeating = Message::repeating(b"");
    assert!(repeating.repeat);
    assert!(repeating.is_empty());
}

#[test]
fn test_error_severity() {
    assert!(Error::Null.is_fatal());
    assert!(Error::Internal.is_fatal());
    for err in [
        Error::InvalidLength,
        Error::InvalidParam,
        Error::InvalidData,
        Error::ResourceExhausted,
        Error::NotFound,
        Error::InvalidState,
        Error::NotSupported,
    ] {
        assert!(!err.is_fatal(), "{} should be retryable", err);
    }
    assert_eq!(Error::ResourceExhausted.to_string(), "resources exhausted");
}

#[test]
fn test_sticky_flag() {
    let flag = StickyFlag::new(false);
    assert!(!flag.is_set());
    flag.set();
    flag.set();
    assert!(flag.is_set());
    assert!(flag.take());
    assert!(!flag.take());

    assert!(!flag.replace(true));
    assert!(flag.replace(false));
    flag.assign(true);
    flag.clear();
    assert!(!flag.is_set());
}
