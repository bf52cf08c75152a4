use super::structs::*;
use super::utils::crc16_x25;
use crate::telegram::DecodeFault;
use log::debug;

// SML Constants
const SML_ESCAPE: [u8; 4] = [0x1B, 0x1B, 0x1B, 0x1B];
const SML_VERSION_1: [u8; 4] = [0x01, 0x01, 0x01, 0x01];
const SML_END_MARKER: u8 = 0x1A;
const SML_MAX_DEPTH: usize = 16;
// Four TL bytes already address 64 KiB elements, far more than a meter sends
const SML_MAX_TL_BYTES: usize = 4;

// SML Message Type constants
const SML_OPEN_RESPONSE: u32 = 0x0101;
const SML_CLOSE_RESPONSE: u32 = 0x0201;
const SML_GET_LIST_RESPONSE: u32 = 0x0701;

// TL type nibbles
const TYPE_OCTET_STRING: u8 = 0x0;
const TYPE_BOOL: u8 = 0x4;
const TYPE_INTEGER: u8 = 0x5;
const TYPE_UNSIGNED: u8 = 0x6;
const TYPE_LIST: u8 = 0x7;

pub fn parse_sml_message(data: &[u8], verify_crc: bool) -> Result<SmlFile, DecodeFault> {
    debug!("Parsing SML message of {} bytes", data.len());

    if data.is_empty() {
        return Err(DecodeFault::Empty);
    }

    let start_pos = find_sml_start(data)?;
    let body = unframe(&data[start_pos..], verify_crc)?;

    let mut parser = SmlParser::new(&body, verify_crc);
    parser.parse_sml_file()
}

fn find_sml_start(data: &[u8]) -> Result<usize, DecodeFault> {
    let mut escape_seen = false;
    for i in 0..data.len().saturating_sub(7) {
        if data[i..i + 4] == SML_ESCAPE {
            if data[i + 4..i + 8] == SML_VERSION_1 {
                return Ok(i);
            }
            escape_seen = true;
        }
    }

    if escape_seen {
        Err(DecodeFault::Unsupported("SML start sequence without version 1 marker".to_string()))
    } else {
        Err(DecodeFault::MissingStart)
    }
}

/// Strips the transport layer: start and end escapes, doubled escapes inside
/// the body and the padding announced by the end sequence.
fn unframe(frame: &[u8], verify_crc: bool) -> Result<Vec<u8>, DecodeFault> {
    let mut body = Vec::with_capacity(frame.len());
    let mut pos = SML_ESCAPE.len() + SML_VERSION_1.len();

    loop {
        if pos + 4 > frame.len() {
            return Err(DecodeFault::Truncated("end sequence missing".to_string()));
        }

        let chunk = &frame[pos..pos + 4];
        if chunk != SML_ESCAPE {
            body.extend_from_slice(chunk);
            pos += 4;
            continue;
        }

        if pos + 8 > frame.len() {
            return Err(DecodeFault::Truncated("end sequence cut short".to_string()));
        }

        let command = &frame[pos + 4..pos + 8];
        if command == SML_ESCAPE {
            body.extend_from_slice(&SML_ESCAPE);
            pos += 8;
            continue;
        }

        if command[0] != SML_END_MARKER {
            return Err(DecodeFault::Unsupported(format!("escape command {}", hex::encode(command))));
        }

        let padding = command[1] as usize;
        if padding > 3 || padding > body.len() {
            return Err(DecodeFault::Malformed(format!("invalid padding count {padding}")));
        }

        if verify_crc {
            // The checksum covers everything up to and including the padding count
            let expected = u16::from_le_bytes([command[2], command[3]]);
            let calculated = crc16_x25(&frame[..pos + 6]);
            if expected != calculated {
                return Err(DecodeFault::ChecksumMismatch { expected, calculated });
            }
        }

        body.truncate(body.len() - padding);
        return Ok(body);
    }
}

struct SmlParser<'a> {
    data: &'a [u8],
    pos: usize,
    verify_crc: bool,
}

impl<'a> SmlParser<'a> {
    fn new(data: &'a [u8], verify_crc: bool) -> Self {
        Self { data, pos: 0, verify_crc }
    }

    fn parse_sml_file(&mut self) -> Result<SmlFile, DecodeFault> {
        let mut messages = Vec::new();

        while self.pos < self.data.len() {
            // Fill bytes between messages
            if self.data[self.pos] == 0x00 {
                self.pos += 1;
                continue;
            }
            messages.push(self.parse_sml_message()?);
        }

        if messages.is_empty() {
            return Err(DecodeFault::Malformed("no SML messages found".to_string()));
        }

        Ok(SmlFile { messages })
    }

    fn parse_sml_message(&mut self) -> Result<SmlMessage, DecodeFault> {
        let start = self.pos;
        let (type_field, length) = self.parse_type_length()?;
        if type_field != TYPE_LIST || length != 6 {
            return Err(self.malformed("message is not a list of 6"));
        }

        let transaction_id = self.parse_element(0)?.as_octets().unwrap_or_default();
        let group_no = self.parse_element(0)?.as_u64().unwrap_or(0) as u8;
        let abort_on_error = self.parse_element(0)?.as_u64().unwrap_or(0) as u8;
        let message_body = self.parse_message_body()?;

        let crc_pos = self.pos;
        let crc = self.parse_element(0)?
            .as_u64()
            .ok_or_else(|| self.malformed("message CRC is not an unsigned"))? as u16;

        if self.verify_crc {
            // Transmitted low byte first, like the transport checksum
            let calculated = crc16_x25(&self.data[start..crc_pos]);
            if crc.swap_bytes() != calculated {
                return Err(DecodeFault::ChecksumMismatch { expected: crc.swap_bytes(), calculated });
            }
        }

        match self.parse_element(0)? {
            SmlValue::EndOfMessage => {}
            _ => return Err(self.malformed("end of message missing")),
        }

        Ok(SmlMessage {
            transaction_id,
            group_no,
            abort_on_error,
            message_body,
            crc,
        })
    }

    fn parse_message_body(&mut self) -> Result<SmlMessageBody, DecodeFault> {
        let (type_field, length) = self.parse_type_length()?;
        if type_field != TYPE_LIST || length != 2 {
            return Err(self.malformed("message body is not a list of 2"));
        }

        let msg_type = self.parse_element(0)?
            .as_u64()
            .ok_or_else(|| self.malformed("message body tag is not an unsigned"))? as u32;
        let choice = self.parse_element(0)?;

        let body = match msg_type {
            SML_OPEN_RESPONSE => SmlMessageBody::OpenResponse,
            SML_CLOSE_RESPONSE => SmlMessageBody::CloseResponse,
            SML_GET_LIST_RESPONSE => SmlMessageBody::GetListResponse(self.get_list_response(&choice)?),
            _ => {
                debug!("Ignoring SML message type 0x{:04x}", msg_type);
                SmlMessageBody::Other(msg_type)
            }
        };

        Ok(body)
    }

    fn get_list_response(&self, choice: &SmlValue) -> Result<SmlGetListResponse, DecodeFault> {
        let fields = choice.as_list()
            .filter(|l| l.len() == 7)
            .ok_or_else(|| self.malformed("GetListResponse is not a list of 7"))?;

        let val_list = fields[4].as_list()
            .ok_or_else(|| self.malformed("valList is not a list"))?
            .iter()
            .map(|entry| self.list_entry(entry))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SmlGetListResponse {
            client_id: fields[0].as_octets(),
            server_id: fields[1].as_octets(),
            list_name: fields[2].as_octets(),
            act_sensor_time: sml_time(&fields[3]),
            val_list,
        })
    }

    fn list_entry(&self, entry: &SmlValue) -> Result<SmlListEntry, DecodeFault> {
        let fields = entry.as_list()
            .filter(|l| l.len() == 7)
            .ok_or_else(|| self.malformed("list entry is not a list of 7"))?;

        let value = if fields[5].is_absent() { None } else { Some(fields[5].clone()) };

        Ok(SmlListEntry {
            obis_code: fields[0].as_octets(),
            status: fields[1].as_u64(),
            unit: fields[3].as_u64().and_then(|u| u8::try_from(u).ok()),
            scaler: fields[4].as_i64().and_then(|s| i8::try_from(s).ok()),
            value,
        })
    }

    // Basic type parsers
    fn parse_type_length(&mut self) -> Result<(u8, usize), DecodeFault> {
        let (type_field, length, _) = self.parse_type_length_bytes()?;
        Ok((type_field, length))
    }

    fn parse_type_length_bytes(&mut self) -> Result<(u8, usize, usize), DecodeFault> {
        let first_byte = self.next_byte()?;
        let type_field = (first_byte >> 4) & 0x07;
        let mut length = (first_byte & 0x0F) as usize;
        let mut more = first_byte & 0x80 != 0;
        let mut tl_bytes = 1;

        while more {
            if tl_bytes >= SML_MAX_TL_BYTES {
                return Err(self.malformed("TL field too long"));
            }
            let next = self.next_byte()?;
            if next & 0x70 != 0 {
                return Err(self.malformed("invalid TL continuation byte"));
            }
            length = (length << 4) | (next & 0x0F) as usize;
            more = next & 0x80 != 0;
            tl_bytes += 1;
        }

        Ok((type_field, length, tl_bytes))
    }

    fn parse_element(&mut self, depth: usize) -> Result<SmlValue, DecodeFault> {
        if depth > SML_MAX_DEPTH {
            return Err(self.malformed("lists nested too deep"));
        }

        let (type_field, length, tl_bytes) = self.parse_type_length_bytes()?;

        if type_field == TYPE_LIST {
            let mut items = Vec::with_capacity(length.min(64));
            for _ in 0..length {
                items.push(self.parse_element(depth + 1)?);
            }
            return Ok(SmlValue::List(items));
        }

        if type_field == TYPE_OCTET_STRING && length == 0 {
            return Ok(SmlValue::EndOfMessage);
        }

        // Scalar lengths include the TL field itself
        let payload_len = length
            .checked_sub(tl_bytes)
            .ok_or_else(|| self.malformed("length shorter than its TL field"))?;
        let payload = self.take(payload_len)?;

        match type_field {
            TYPE_OCTET_STRING => Ok(SmlValue::OctetString(payload.to_vec())),
            TYPE_BOOL => match payload {
                [b] => Ok(SmlValue::Bool(*b != 0)),
                _ => Err(self.malformed("invalid bool length")),
            },
            TYPE_INTEGER => {
                if payload.is_empty() || payload.len() > 8 {
                    return Err(self.malformed("invalid integer length"));
                }
                // Sign extend from the first byte
                let fill = if payload[0] & 0x80 != 0 { 0xFF } else { 0x00 };
                let mut bytes = [fill; 8];
                bytes[8 - payload.len()..].copy_from_slice(payload);
                Ok(SmlValue::Int(i64::from_be_bytes(bytes)))
            }
            TYPE_UNSIGNED => {
                if payload.is_empty() || payload.len() > 8 {
                    return Err(self.malformed("invalid unsigned length"));
                }
                let mut bytes = [0u8; 8];
                bytes[8 - payload.len()..].copy_from_slice(payload);
                Ok(SmlValue::UInt(u64::from_be_bytes(bytes)))
            }
            _ => Err(self.malformed(&format!("unknown element type {type_field}"))),
        }
    }

    fn next_byte(&mut self) -> Result<u8, DecodeFault> {
        let byte = *self.data.get(self.pos)
            .ok_or_else(|| DecodeFault::Truncated(format!("unexpected end of data at {}", self.pos)))?;
        self.pos += 1;
        Ok(byte)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeFault> {
        let end = self.pos.checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| DecodeFault::Truncated(format!("element at {} extends beyond data", self.pos)))?;
        let data: &'a [u8] = self.data;
        let slice = &data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn malformed(&self, reason: &str) -> DecodeFault {
        DecodeFault::Malformed(format!("{} at offset {}", reason, self.pos))
    }
}

// SML_Time is either a choice list [secIndex | timestamp, value] or, from
// older meters, the bare seconds value.
fn sml_time(value: &SmlValue) -> Option<u32> {
    match value {
        SmlValue::List(items) if items.len() == 2 => items[1].as_u64().map(|v| v as u32),
        other => other.as_u64().map(|v| v as u32),
    }
}
