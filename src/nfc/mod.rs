//! NFC tag transport
//!
//! Type 4 tag emulation as a passive channel: the application stages NDEF
//! records, the reader fetches whatever is staged when it polls, and NDEF
//! messages written by the reader are picked up once the field is gone.

pub mod ndef;
pub mod tag;

pub use tag::{NfcChannel, NfcLink, TagEmulator, TagError, TagEvent};
