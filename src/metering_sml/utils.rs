use super::structs::*;
use crate::obis_utils::ObisCode;
use crate::telegram::Register;
use crc16::{State, X_25};
use log::debug;

pub fn format_obis_code(obis_bytes: &[u8]) -> String {
    match ObisCode::from_bytes(obis_bytes) {
        Some(obis) => obis.to_string(),
        // Fallback: format as hex
        None => hex::encode(obis_bytes),
    }
}

/// CRC-16/X-25 as used by both the SML transport and message layers.
pub fn crc16_x25(data: &[u8]) -> u16 {
    State::<X_25>::calculate(data)
}

pub fn apply_scaler(value: f64, scaler: Option<i8>) -> f64 {
    match scaler {
        // Dividing keeps values like 1832107 * 10^-2 exact to the last digit
        Some(s) if s < 0 => value / 10_f64.powi(-(s as i32)),
        Some(s) => value * 10_f64.powi(s as i32),
        None => value,
    }
}

/// Converts a list entry into a register. Entries without a code or without
/// a numeric value carry nothing this pipeline can use.
pub fn list_entry_to_register(entry: &SmlListEntry) -> Option<Register> {
    let code = format_obis_code(entry.obis_code.as_ref()?);

    let raw = match entry.value.as_ref().and_then(|v| v.as_f64()) {
        Some(v) => v,
        None => {
            debug!("Skipping non numeric SML entry {}", code);
            return None;
        }
    };

    let unit = match entry.unit {
        Some(u) => match get_sml_unit_name(u) {
            Some(name) => name.to_string(),
            None => {
                debug!("Unknown SML unit code {} on {}", u, code);
                String::new()
            }
        },
        None => String::new(),
    };

    Some(Register {
        code,
        value: apply_scaler(raw, entry.scaler),
        unit,
    })
}

pub fn format_server_id(server_id: &Option<Vec<u8>>) -> String {
    server_id.as_ref()
        .map(hex::encode)
        .unwrap_or_else(|| "unknown".to_string())
}
