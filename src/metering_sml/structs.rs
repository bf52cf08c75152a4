// SML Protocol Data Structures

#[derive(Debug, Clone)]
pub struct SmlFile {
    pub messages: Vec<SmlMessage>,
}

#[derive(Debug, Clone)]
pub struct SmlMessage {
    pub transaction_id: Vec<u8>,
    pub group_no: u8,
    pub abort_on_error: u8,
    pub message_body: SmlMessageBody,
    pub crc: u16,
}

#[derive(Debug, Clone)]
pub enum SmlMessageBody {
    OpenResponse,
    CloseResponse,
    GetListResponse(SmlGetListResponse),
    /// Any other body, kept only by its tag.
    Other(u32),
}

#[derive(Debug, Clone)]
pub struct SmlGetListResponse {
    pub client_id: Option<Vec<u8>>,
    pub server_id: Option<Vec<u8>>,
    pub list_name: Option<Vec<u8>>,
    pub act_sensor_time: Option<u32>,
    pub val_list: Vec<SmlListEntry>,
}

#[derive(Debug, Clone)]
pub struct SmlListEntry {
    pub obis_code: Option<Vec<u8>>,
    pub status: Option<u64>,
    pub unit: Option<u8>,
    pub scaler: Option<i8>,
    pub value: Option<SmlValue>,
}

/// A decoded SML element.
#[derive(Debug, Clone, PartialEq)]
pub enum SmlValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    /// An empty octet string is how SML encodes an absent optional field.
    OctetString(Vec<u8>),
    List(Vec<SmlValue>),
    EndOfMessage,
}

impl SmlValue {
    pub fn is_absent(&self) -> bool {
        matches!(self, SmlValue::OctetString(v) if v.is_empty())
    }

    pub fn as_octets(&self) -> Option<Vec<u8>> {
        match self {
            SmlValue::OctetString(v) if !v.is_empty() => Some(v.clone()),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            SmlValue::UInt(u) => Some(*u),
            SmlValue::Int(i) if *i >= 0 => Some(*i as u64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SmlValue::Int(i) => Some(*i),
            SmlValue::UInt(u) => i64::try_from(*u).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SmlValue::Int(i) => Some(*i as f64),
            SmlValue::UInt(u) => Some(*u as f64),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[SmlValue]> {
        match self {
            SmlValue::List(l) => Some(l),
            _ => None,
        }
    }
}

// DLMS unit codes (IEC 62056-62) as used in SML list entries
pub fn get_sml_unit_name(unit_code: u8) -> Option<&'static str> {
    match unit_code {
        1 => Some("a"),      // year
        2 => Some("mo"),     // month
        3 => Some("wk"),     // week
        4 => Some("d"),      // day
        5 => Some("h"),      // hour
        6 => Some("min"),    // minute
        7 => Some("s"),      // second
        8 => Some("°"),      // phase angle
        9 => Some("°C"),     // temperature
        11 => Some("m"),
        12 => Some("m/s"),
        13 => Some("m³"),
        14 => Some("m³"),    // corrected volume
        15 => Some("m³/h"),
        18 => Some("l/h"),
        19 => Some("kg"),
        20 => Some("N"),
        21 => Some("Nm"),
        22 => Some("Pa"),
        23 => Some("bar"),
        24 => Some("J"),
        25 => Some("J/h"),
        27 => Some("W"),     // active power
        28 => Some("VA"),    // apparent power
        29 => Some("var"),   // reactive power
        30 => Some("Wh"),    // active energy
        31 => Some("VAh"),   // apparent energy
        32 => Some("varh"),  // reactive energy
        33 => Some("A"),
        34 => Some("C"),
        35 => Some("V"),
        36 => Some("V/m"),
        37 => Some("F"),
        38 => Some("Ω"),
        44 => Some("Hz"),
        45 => Some("1/(Wh)"),
        46 => Some("1/(varh)"),
        47 => Some("1/(VAh)"),
        56 => Some("%"),
        255 => Some(""),     // count, no unit
        _ => None,
    }
}
