use crate::telegram::{DecodeFault, Register, TelegramDecoder};
use log::{debug, warn};

pub mod utils;
pub mod obis_parser;

use obis_parser::ObisLine;

/// Decoder for plain text IEC 62056-21 telegrams, including the DSMR P1
/// variant with its trailing CRC.
pub struct Iec62056Decoder {
    verify_crc: bool,
}

impl Iec62056Decoder {
    pub fn new(verify_crc: bool) -> Self {
        Self { verify_crc }
    }
}

impl TelegramDecoder for Iec62056Decoder {
    fn decode(&self, raw: &[u8]) -> Result<Vec<Register>, DecodeFault> {
        parse_iec62056_telegram(raw, self.verify_crc)
    }

    fn name(&self) -> &'static str {
        "iec62056"
    }
}

fn parse_iec62056_telegram(raw: &[u8], verify_crc: bool) -> Result<Vec<Register>, DecodeFault> {
    if raw.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(DecodeFault::Empty);
    }

    let telegram = std::str::from_utf8(raw)
        .map_err(|_| DecodeFault::Malformed("telegram is not valid text".to_string()))?;
    let telegram = telegram.trim_start();

    let end = telegram.find('!')
        .ok_or_else(|| DecodeFault::Truncated("end of telegram '!' missing".to_string()))?;

    if verify_crc {
        verify_trailing_crc(telegram, end)?;
    }

    let mut lines = telegram[..end].lines();
    let identification_line = lines.next().unwrap_or_default();
    let device_info = utils::parse_identification_line(identification_line.trim())?;
    debug!("Parsed device info: {:?}", device_info);

    let mut registers = Vec::new();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }

        match obis_parser::parse_obis_line(line) {
            Ok(ObisLine::Numeric(register)) => registers.push(register),
            Ok(ObisLine::Text(code)) => debug!("Skipping non numeric value of {}", code),
            Err(e) => warn!("Failed to parse OBIS line: {}", e),
        }
    }

    if registers.is_empty() {
        debug!("No numeric OBIS data found in telegram from {}", device_info.manufacturer);
    }

    Ok(registers)
}

// Plain IEC telegrams end at '!', DSMR appends four hex digits of CRC.
fn verify_trailing_crc(telegram: &str, end: usize) -> Result<(), DecodeFault> {
    let trailer = telegram[end + 1..].trim();
    if trailer.is_empty() {
        return Ok(());
    }

    let expected = trailer.get(..4)
        .and_then(|digits| u16::from_str_radix(digits, 16).ok())
        .ok_or_else(|| DecodeFault::Malformed(format!("invalid checksum trailer '{trailer}'")))?;
    let calculated = utils::calculate_checksum(&telegram.as_bytes()[..=end]);

    if expected != calculated {
        return Err(DecodeFault::ChecksumMismatch { expected, calculated });
    }
    Ok(())
}
