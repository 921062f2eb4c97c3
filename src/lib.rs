#![no_std]

//! nRF52 Communication Channels
//!
//! Transport-independent message channels for nRF52 firmware, organized
//! into clear layers:
//!
//! - `core`: channel contract, error codes, ring buffer, sticky flags
//! - `ble`: Nordic UART Service and advertisement channels
//! - `nfc`: NFC type 4 tag channel and NDEF codec
//!
//! Radio access goes through small traits (`NusTransport`, `Broadcaster`,
//! `TagEmulator`); the `softdevice` feature provides S140 implementations.

// Must come first so the log macros are visible in every module
mod fmt;

pub mod ble;
pub mod core;
pub mod nfc;

pub use crate::core::channel::{Channel, ChannelKind, HookSet, Hooks, Message};
pub use crate::core::error::{Error, Result};
