use crate::telegram::DecodeFault;
use crc16::{State, ARC};
use log::debug;

/// Contents of the `/XXXZ...` line that opens every telegram.
#[derive(Debug, Clone)]
pub struct DeviceIdentification {
    pub manufacturer: String,
    pub identification: String,
    pub mode: String,
}

pub fn parse_identification_line(line: &str) -> Result<DeviceIdentification, DecodeFault> {
    // Example formats:
    // /ELS5\@V5.3
    // /ISK5MT382-1000
    // /EBZ5DD3BL10-112 (EBZ meter example)

    let content = line.strip_prefix('/')
        .ok_or_else(|| DecodeFault::Malformed("missing identification line".to_string()))?;

    // Manufacturer flag is the first three characters
    let manufacturer = match content.get(..3) {
        Some(m) => m.to_string(),
        None => return Err(DecodeFault::Malformed(format!("identification line too short: {line}"))),
    };

    let identification = content.to_string();
    let mode = determine_protocol_mode(&identification);

    debug!("Parsed identification - Manufacturer: {}, ID: {}, Mode: {}",
           manufacturer, identification, mode);

    Ok(DeviceIdentification {
        manufacturer,
        identification,
        mode,
    })
}

fn determine_protocol_mode(identification: &str) -> String {
    if identification.contains('@') {
        "C".to_string() // Mode C typical for bidirectional communication
    } else if identification.len() > 10 {
        "D".to_string() // Mode D for push telegrams
    } else {
        "A".to_string()
    }
}

/// CRC-16/ARC over everything from `/` up to and including `!`, as appended
/// by DSMR 4+ meters.
pub fn calculate_checksum(data: &[u8]) -> u16 {
    State::<ARC>::calculate(data)
}

/// Parses the value group of a data line. Only groups that are entirely
/// numeric (apart from the unit) count, so timestamps such as
/// `101209113020W` are rejected.
pub fn extract_numeric_value(value_str: &str) -> Option<f64> {
    let number = match value_str.find('*') {
        Some(star_pos) => &value_str[..star_pos],
        None => value_str,
    };

    if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit() || c == '.' || c == '-' || c == '+') {
        return None;
    }

    number.parse::<f64>().ok()
}

pub fn extract_unit(value_str: &str) -> Option<String> {
    // Extract unit from strings like "123.456*kWh"
    if let Some(star_pos) = value_str.find('*') {
        let unit = &value_str[star_pos + 1..];
        let unit = unit.chars()
            .take_while(|c| c.is_alphanumeric() || *c == '/')
            .collect::<String>();
        if !unit.is_empty() {
            Some(unit)
        } else {
            None
        }
    } else {
        None
    }
}
