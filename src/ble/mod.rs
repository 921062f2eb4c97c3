//! BLE transports
//!
//! The Nordic UART Service channel and the advertisement channel, plus the
//! SoftDevice backends for both when built with the `softdevice` feature.

pub mod adv_data;
pub mod advertising;
pub mod gatt;
#[cfg(feature = "softdevice")]
pub mod softdevice;

pub use advertising::{AdvChannel, AdvParams, AdvType, AdvertisingConfig, Broadcaster, RadioError};
pub use gatt::{GattChannel, GattEvent, GattLink, NusTransport, TransportError};
