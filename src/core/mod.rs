//! Core module containing transport-independent building blocks

pub mod channel;
pub mod error;
pub mod flag;
pub mod ring_buffer;
