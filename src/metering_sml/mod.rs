use crate::telegram::{DecodeFault, Register, TelegramDecoder};
use log::debug;

pub mod structs;
pub mod parser;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;

use structs::*;
use parser::*;
use utils::*;

/// Decoder for SML (Smart Message Language) transport v1 files as sent by
/// most German smart meters over their optical interface.
pub struct SmlDecoder {
    verify_crc: bool,
}

impl SmlDecoder {
    pub fn new(verify_crc: bool) -> Self {
        Self { verify_crc }
    }
}

impl TelegramDecoder for SmlDecoder {
    fn decode(&self, raw: &[u8]) -> Result<Vec<Register>, DecodeFault> {
        debug!("Received SML message with {} bytes", raw.len());

        let sml_file = parse_sml_message(raw, self.verify_crc)?;
        let mut registers = Vec::new();

        for message in &sml_file.messages {
            if let SmlMessageBody::GetListResponse(response) = &message.message_body {
                debug!("Processing GetList response from server: {}", format_server_id(&response.server_id));
                registers.extend(response.val_list.iter().filter_map(list_entry_to_register));
            }
        }

        debug!("SML file with {} messages yielded {} registers", sml_file.messages.len(), registers.len());
        Ok(registers)
    }

    fn name(&self) -> &'static str {
        "sml"
    }
}
