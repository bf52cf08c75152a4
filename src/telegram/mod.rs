//! The decoder seam of the pipeline.
//!
//! A decoder turns the raw bytes of one telegram into the registers it
//! carries. Decoders are stateless: the same bytes always decode to the same
//! registers, and every failure is returned as a [`DecodeFault`].

use crate::config::{PayloadEncoding, TelegramProtocol};
use thiserror::Error;

/// One tagged reading from a telegram.
#[derive(Debug, Clone, PartialEq)]
pub struct Register {
    /// OBIS code in `A-B:C.D.E*F` form.
    pub code: String,
    pub value: f64,
    /// Unit symbol, empty if the meter sent none.
    pub unit: String,
}

impl Register {
    pub fn new(code: impl Into<String>, value: f64, unit: impl Into<String>) -> Self {
        Register { code: code.into(), value, unit: unit.into() }
    }
}

/// Why a telegram could not be decoded.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeFault {
    #[error("empty payload")]
    Empty,
    #[error("payload is not valid hex: {0}")]
    InvalidHex(String),
    #[error("no start sequence found")]
    MissingStart,
    #[error("telegram truncated: {0}")]
    Truncated(String),
    #[error("checksum mismatch: expected 0x{expected:04X}, calculated 0x{calculated:04X}")]
    ChecksumMismatch { expected: u16, calculated: u16 },
    #[error("unsupported protocol variant: {0}")]
    Unsupported(String),
    #[error("malformed telegram: {0}")]
    Malformed(String),
}

/// A meter protocol. Implementations must not keep state between calls.
pub trait TelegramDecoder: Send + Sync {
    fn decode(&self, raw: &[u8]) -> Result<Vec<Register>, DecodeFault>;

    fn name(&self) -> &'static str;
}

/// Wraps another decoder for transports that publish the telegram as a hex
/// string instead of raw bytes.
pub struct HexPayloadDecoder<D> {
    inner: D,
}

impl<D: TelegramDecoder> HexPayloadDecoder<D> {
    pub fn new(inner: D) -> Self {
        HexPayloadDecoder { inner }
    }
}

impl<D: TelegramDecoder> TelegramDecoder for HexPayloadDecoder<D> {
    fn decode(&self, raw: &[u8]) -> Result<Vec<Register>, DecodeFault> {
        let text = std::str::from_utf8(raw)
            .map_err(|e| DecodeFault::InvalidHex(e.to_string()))?;
        let text: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        if text.is_empty() {
            return Err(DecodeFault::Empty);
        }
        let bytes = hex::decode(&text).map_err(|e| DecodeFault::InvalidHex(e.to_string()))?;
        self.inner.decode(&bytes)
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}

fn wrap<D: TelegramDecoder + 'static>(decoder: D, encoding: &PayloadEncoding) -> Box<dyn TelegramDecoder> {
    match encoding {
        PayloadEncoding::Binary => Box::new(decoder),
        PayloadEncoding::Hex => Box::new(HexPayloadDecoder::new(decoder)),
    }
}

/// Returns `None` if the requested protocol was compiled out.
pub fn build_decoder(protocol: &TelegramProtocol, encoding: &PayloadEncoding, verify_crc: bool) -> Option<Box<dyn TelegramDecoder>> {
    match protocol {
        #[cfg(feature = "sml")]
        TelegramProtocol::Sml => Some(wrap(crate::metering_sml::SmlDecoder::new(verify_crc), encoding)),
        #[cfg(feature = "iec62056")]
        TelegramProtocol::Iec62056 => Some(wrap(crate::metering_62056::Iec62056Decoder::new(verify_crc), encoding)),
        #[allow(unreachable_patterns)]
        _ => None,
    }
}
