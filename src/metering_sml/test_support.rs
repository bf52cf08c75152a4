//! Builders for SML telegrams used across the test suites.

use super::utils::crc16_x25;

pub const SERVER_ID: [u8; 10] = [0x0A, 0x01, 0x45, 0x4D, 0x48, 0x00, 0x00, 0x7A, 0xC5, 0x11];

pub fn octet(bytes: &[u8]) -> Vec<u8> {
    let total = bytes.len() + 1;
    let mut out = if total < 16 {
        vec![total as u8]
    } else {
        let total = bytes.len() + 2;
        vec![0x80 | ((total >> 4) as u8 & 0x0F), total as u8 & 0x0F]
    };
    out.extend_from_slice(bytes);
    out
}

pub fn absent() -> Vec<u8> {
    vec![0x01]
}

pub fn uint_value(v: u64) -> Vec<u8> {
    let mut out = vec![0x69];
    out.extend_from_slice(&v.to_be_bytes());
    out
}

pub fn int_value(v: i64) -> Vec<u8> {
    let mut out = vec![0x59];
    out.extend_from_slice(&v.to_be_bytes());
    out
}

pub fn list_entry(obis: &[u8], unit: Option<u8>, scaler: Option<i8>, value: &[u8]) -> Vec<u8> {
    let mut out = vec![0x77];
    out.extend(octet(obis));
    out.extend([0x65, 0x00, 0x1C, 0x01, 0x04]); // status
    out.extend(absent()); // valTime
    match unit {
        Some(u) => out.extend([0x62, u]),
        None => out.extend(absent()),
    }
    match scaler {
        Some(s) => out.extend([0x52, s as u8]),
        None => out.extend(absent()),
    }
    out.extend_from_slice(value);
    out.extend(absent()); // valueSignature
    out
}

pub fn message(tag: u16, choice: &[u8]) -> Vec<u8> {
    let mut out = vec![0x76];
    out.extend(octet(&[0x00, 0x41, 0x7A, 0x11]));
    out.extend([0x62, 0x00]); // groupNo
    out.extend([0x62, 0x00]); // abortOnError
    out.push(0x72);
    out.push(0x63);
    out.extend(tag.to_be_bytes());
    out.extend_from_slice(choice);
    let crc = crc16_x25(&out);
    out.push(0x63);
    out.extend(crc.to_le_bytes());
    out.push(0x00);
    out
}

pub fn open_message() -> Vec<u8> {
    let mut choice = vec![0x76];
    choice.extend(absent()); // codepage
    choice.extend(absent()); // clientId
    choice.extend(octet(&[0x00, 0x41, 0x7A]));
    choice.extend(octet(&SERVER_ID));
    choice.extend(absent()); // refTime
    choice.extend(absent()); // smlVersion
    message(0x0101, &choice)
}

pub fn close_message() -> Vec<u8> {
    let mut choice = vec![0x71];
    choice.extend(absent());
    message(0x0201, &choice)
}

pub fn get_list_message(entries: &[Vec<u8>]) -> Vec<u8> {
    assert!(entries.len() < 16);
    let mut choice = vec![0x77];
    choice.extend(absent()); // clientId
    choice.extend(octet(&SERVER_ID));
    choice.extend(octet(&[0x01, 0x00, 0x62, 0x0A, 0xFF, 0xFF]));
    choice.extend([0x72, 0x62, 0x01, 0x65, 0x00, 0x0D, 0x9E, 0x5A]); // actSensorTime
    choice.push(0x70 | entries.len() as u8);
    for entry in entries {
        choice.extend_from_slice(entry);
    }
    choice.extend(absent()); // listSignature
    choice.extend(absent()); // actGatewayTime
    message(0x0701, &choice)
}

/// Wraps a message stream into a transport v1 file with padding and CRC.
pub fn frame(body: &[u8]) -> Vec<u8> {
    let padding = (4 - body.len() % 4) % 4;
    let mut out = vec![0x1B, 0x1B, 0x1B, 0x1B, 0x01, 0x01, 0x01, 0x01];
    out.extend_from_slice(body);
    out.extend(std::iter::repeat(0x00).take(padding));
    out.extend([0x1B, 0x1B, 0x1B, 0x1B, 0x1A, padding as u8]);
    let crc = crc16_x25(&out);
    out.extend(crc.to_le_bytes());
    out
}

/// A complete file: open response, the given messages, close response.
pub fn sml_file(messages: &[Vec<u8>]) -> Vec<u8> {
    let mut body = open_message();
    for m in messages {
        body.extend_from_slice(m);
    }
    body.extend(close_message());
    frame(&body)
}

/// Unframed messages of the meter reading used throughout the tests:
/// 742.5 W and 18321.07 kWh, encoded the way an EMH meter sends them (W and
/// Wh with scalers).
pub fn reference_body() -> Vec<u8> {
    let get_list = get_list_message(&[
        list_entry(&[0x81, 0x81, 0xC7, 0x82, 0x03, 0xFF], None, None, &octet(b"EMH")),
        list_entry(&[1, 0, 1, 8, 0, 255], Some(30), Some(-1), &uint_value(183210700)),
        list_entry(&[1, 0, 2, 8, 0, 255], Some(30), Some(-1), &uint_value(5120)),
        list_entry(&[1, 0, 16, 7, 0, 255], Some(27), Some(-1), &int_value(7425)),
    ]);
    [open_message(), get_list, close_message()].concat()
}

pub fn reference_telegram() -> Vec<u8> {
    frame(&reference_body())
}

/// A message whose first element has a TL chain of seventeen bytes, which
/// would describe a length beyond any address space.
pub fn oversized_tl_body() -> Vec<u8> {
    let mut body = vec![0x76];
    body.extend(std::iter::repeat(0x8F).take(16));
    body.push(0x0F);
    body.extend([0x00; 8]);
    body
}
