//! NDEF message codec
//!
//! Just enough of NFC Forum NDEF to build the tag's outward message from a
//! handful of records and to split a message written by a reader into
//! record payloads. Chunked records are not supported.

use heapless::Vec;

use crate::core::error::Error;

/// Records parsed out of one received message
pub const MAX_RECORDS: usize = 4;

const FLAG_MB: u8 = 0x80;
const FLAG_ME: u8 = 0x40;
const FLAG_CF: u8 = 0x20;
const FLAG_SR: u8 = 0x10;
const FLAG_IL: u8 = 0x08;
const TNF_MASK: u8 = 0x07;

/// Text record status byte plus "dt" language code
const TEXT_PREFIX: &[u8] = &[0x02, b'd', b't'];
/// URI identifier code for "https://"
const URI_HTTPS_PREFIX: &[u8] = &[0x04];

pub const TEXT_TYPE: &[u8] = b"T";
pub const URI_TYPE: &[u8] = b"U";
pub const ANDROID_APP_TYPE: &[u8] = b"android.com:pkg";
pub const DATA_MEDIA_TYPE: &[u8] = b"application/octet-stream";

/// Type name format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Tnf {
    Empty,
    WellKnown,
    Media,
    AbsoluteUri,
    External,
    Unknown,
    Unchanged,
    Reserved,
}

impl Tnf {
    fn from_bits(bits: u8) -> Self {
        match bits & TNF_MASK {
            0 => Tnf::Empty,
            1 => Tnf::WellKnown,
            2 => Tnf::Media,
            3 => Tnf::AbsoluteUri,
            4 => Tnf::External,
            5 => Tnf::Unknown,
            6 => Tnf::Unchanged,
            _ => Tnf::Reserved,
        }
    }

    fn bits(self) -> u8 {
        match self {
            Tnf::Empty => 0,
            Tnf::WellKnown => 1,
            Tnf::Media => 2,
            Tnf::AbsoluteUri => 3,
            Tnf::External => 4,
            Tnf::Unknown => 5,
            Tnf::Unchanged => 6,
            Tnf::Reserved => 7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NdefError {
    /// Output buffer too small for the encoded message
    BufferTooSmall,
    /// Message is truncated or structurally invalid
    Malformed,
    /// Chunked record
    Unsupported,
    /// More records than [`MAX_RECORDS`]
    TooManyRecords,
}

impl From<NdefError> for Error {
    fn from(err: NdefError) -> Self {
        match err {
            NdefError::BufferTooSmall => Error::InvalidLength,
            NdefError::Malformed | NdefError::Unsupported | NdefError::TooManyRecords => Error::InvalidData,
        }
    }
}

/// Record to encode. `prefix` is written in front of `payload` and counts
/// towards the payload length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordDesc<'a> {
    pub tnf: Tnf,
    pub record_type: &'a [u8],
    pub id: &'a [u8],
    pub prefix: &'a [u8],
    pub payload: &'a [u8],
}

impl<'a> RecordDesc<'a> {
    pub const fn text(text: &'a [u8]) -> Self {
        Self::well_known(TEXT_TYPE, TEXT_PREFIX, text)
    }

    /// URI record; `uri` is the part after "https://"
    pub const fn https_uri(uri: &'a [u8]) -> Self {
        Self::well_known(URI_TYPE, URI_HTTPS_PREFIX, uri)
    }

    /// Android application record carrying a package name
    pub const fn android_app(package: &'a [u8]) -> Self {
        Self {
            tnf: Tnf::External,
            record_type: ANDROID_APP_TYPE,
            id: &[],
            prefix: &[],
            payload: package,
        }
    }

    /// Opaque binary payload
    pub const fn data(payload: &'a [u8]) -> Self {
        Self {
            tnf: Tnf::Media,
            record_type: DATA_MEDIA_TYPE,
            id: &[],
            prefix: &[],
            payload,
        }
    }

    const fn well_known(record_type: &'a [u8], prefix: &'a [u8], payload: &'a [u8]) -> Self {
        Self {
            tnf: Tnf::WellKnown,
            record_type,
            id: &[],
            prefix,
            payload,
        }
    }

    fn payload_len(&self) -> usize {
        self.prefix.len() + self.payload.len()
    }
}

/// Location of one record's payload inside a parsed buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RecordSpan {
    pub tnf: Tnf,
    pub offset: usize,
    pub len: usize,
}

impl RecordSpan {
    pub fn payload<'b>(&self, buf: &'b [u8]) -> &'b [u8] {
        &buf[self.offset..self.offset + self.len]
    }
}

struct Writer<'b> {
    buf: &'b mut [u8],
    pos: usize,
}

impl Writer<'_> {
    fn put(&mut self, bytes: &[u8]) -> Result<(), NdefError> {
        let end = self.pos + bytes.len();
        let dst = self.buf.get_mut(self.pos..end).ok_or(NdefError::BufferTooSmall)?;
        dst.copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }
}

/// Encode `records` as one message into `out`, returning its length.
/// An empty record list encodes to nothing.
pub fn encode_message(records: &[RecordDesc<'_>], out: &mut [u8]) -> Result<usize, NdefError> {
    let mut writer = Writer { buf: out, pos: 0 };
    let last = records.len().saturating_sub(1);

    for (index, record) in records.iter().enumerate() {
        let payload_len = record.payload_len();
        let type_len = u8::try_from(record.record_type.len()).map_err(|_| NdefError::Malformed)?;
        let id_len = u8::try_from(record.id.len()).map_err(|_| NdefError::Malformed)?;

        let mut header = record.tnf.bits();
        if index == 0 {
            header |= FLAG_MB;
        }
        if index == last {
            header |= FLAG_ME;
        }
        if payload_len < 256 {
            header |= FLAG_SR;
        }
        if id_len > 0 {
            header |= FLAG_IL;
        }

        writer.put(&[header, type_len])?;
        if payload_len < 256 {
            writer.put(&[payload_len as u8])?;
        } else {
            let payload_len = u32::try_from(payload_len).map_err(|_| NdefError::Malformed)?;
            writer.put(&payload_len.to_be_bytes())?;
        }
        if id_len > 0 {
            writer.put(&[id_len])?;
        }
        writer.put(record.record_type)?;
        writer.put(record.id)?;
        writer.put(record.prefix)?;
        writer.put(record.payload)?;
    }

    Ok(writer.pos)
}

/// Split a message into record payload spans. Bytes after the record
/// flagged ME are ignored; an empty buffer holds no records.
pub fn parse_message(buf: &[u8], records: &mut Vec<RecordSpan, MAX_RECORDS>) -> Result<(), NdefError> {
    records.clear();
    let mut pos = 0;

    while pos < buf.len() {
        let header = buf[pos];
        if records.is_empty() && header & FLAG_MB == 0 {
            return Err(NdefError::Malformed);
        }
        if header & FLAG_CF != 0 {
            return Err(NdefError::Unsupported);
        }

        let type_len = usize::from(*buf.get(pos + 1).ok_or(NdefError::Malformed)?);
        pos += 2;
        let payload_len = if header & FLAG_SR != 0 {
            let len = *buf.get(pos).ok_or(NdefError::Malformed)?;
            pos += 1;
            usize::from(len)
        } else {
            let bytes = buf.get(pos..pos + 4).ok_or(NdefError::Malformed)?;
            pos += 4;
            u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize
        };
        let id_len = if header & FLAG_IL != 0 {
            let len = *buf.get(pos).ok_or(NdefError::Malformed)?;
            pos += 1;
            usize::from(len)
        } else {
            0
        };

        let offset = pos + type_len + id_len;
        let end = offset.checked_add(payload_len).ok_or(NdefError::Malformed)?;
        if end > buf.len() {
            return Err(NdefError::Malformed);
        }

        records
            .push(RecordSpan {
                tnf: Tnf::from_bits(header),
                offset,
                len: payload_len,
            })
            .map_err(|_| NdefError::TooManyRecords)?;
        pos = end;

        if header & FLAG_ME != 0 {
            return Ok(());
        }
    }

    // Ran out of bytes before the ME record
    if records.is_empty() {
        Ok(())
    } else {
        Err(NdefError::Malformed)
    }
}
