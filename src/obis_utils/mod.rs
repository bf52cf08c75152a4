use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;

/// Sum active instantaneous power, as emitted by most SML and DSMR meters.
pub const CURRENT_POWER_CODE: &str = "1-0:16.7.0*255";
/// Active energy import, all tariffs.
pub const TOTAL_ENERGY_CODE: &str = "1-0:1.8.0*255";

lazy_static! {
    // A-B:C.D.E*F with the A-B group and the F group being optional. Some
    // meters separate F with '.' or '&' instead of '*'.
    static ref OBIS_PATTERN: Regex = Regex::new(
        r"^(?:(\d{1,3})-(\d{1,3}):)?(\d{1,3})\.(\d{1,3})\.(\d{1,3})(?:[*.&](\d{1,3}))?$"
    ).unwrap();

    static ref OBIS_DESCRIPTIONS: HashMap<&'static str, &'static str> = get_standard_obis_descriptions();
}

/// Six group OBIS identifier (IEC 62056-61).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObisCode {
    pub medium: u8,      // 0: abstract, 1: electricity, etc.
    pub channel: u8,
    pub indicator: u8,   // Physical value indicator
    pub mode: u8,        // Processing method
    pub tariff: u8,
    pub previous: u8,    // Historical value indicator
}

impl ObisCode {
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() == 6 {
            Some(ObisCode {
                medium: bytes[0],
                channel: bytes[1],
                indicator: bytes[2],
                mode: bytes[3],
                tariff: bytes[4],
                previous: bytes[5],
            })
        } else {
            None
        }
    }

    /// Parses the textual form. Missing groups are filled with the values
    /// electricity meters use: `1-0:` for A-B and `255` for F.
    pub fn parse(code: &str) -> Option<Self> {
        let caps = OBIS_PATTERN.captures(code.trim())?;
        let group = |idx: usize, default: u8| -> Option<u8> {
            match caps.get(idx) {
                Some(m) => m.as_str().parse::<u8>().ok(),
                None => Some(default),
            }
        };

        Some(ObisCode {
            medium: group(1, 1)?,
            channel: group(2, 0)?,
            indicator: group(3, 0)?,
            mode: group(4, 0)?,
            tariff: group(5, 0)?,
            previous: group(6, 255)?,
        })
    }

    /// `A-B:C.D.E` without the storage group, used for description lookups.
    pub fn short_form(&self) -> String {
        format!("{}-{}:{}.{}.{}", self.medium, self.channel, self.indicator, self.mode, self.tariff)
    }
}

impl fmt::Display for ObisCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}:{}.{}.{}*{}",
            self.medium, self.channel,
            self.indicator, self.mode,
            self.tariff, self.previous)
    }
}

pub fn get_obis_description(obis_code: &str) -> Option<&'static str> {
    let code = ObisCode::parse(obis_code)?;
    OBIS_DESCRIPTIONS.get(code.short_form().as_str()).copied()
}

fn get_standard_obis_descriptions() -> HashMap<&'static str, &'static str> {
    let mut map = HashMap::new();

    // Energy values
    map.insert("1-0:1.8.0", "Active energy + (total)");
    map.insert("1-0:1.8.1", "Active energy + (tariff 1)");
    map.insert("1-0:1.8.2", "Active energy + (tariff 2)");
    map.insert("1-0:2.8.0", "Active energy - (total)");
    map.insert("1-0:2.8.1", "Active energy - (tariff 1)");
    map.insert("1-0:2.8.2", "Active energy - (tariff 2)");
    map.insert("1-0:15.8.0", "Absolute active energy total");

    // Power values
    map.insert("1-0:1.7.0", "Active power + (total)");
    map.insert("1-0:2.7.0", "Active power - (total)");
    map.insert("1-0:15.7.0", "Absolute active instantaneous power");
    map.insert("1-0:16.7.0", "Sum active instantaneous power");
    map.insert("1-0:21.7.0", "Active power + (L1)");
    map.insert("1-0:41.7.0", "Active power + (L2)");
    map.insert("1-0:61.7.0", "Active power + (L3)");
    map.insert("1-0:36.7.0", "Sum reactive instantaneous power");

    // Voltage and current
    map.insert("1-0:32.7.0", "Voltage (L1)");
    map.insert("1-0:52.7.0", "Voltage (L2)");
    map.insert("1-0:72.7.0", "Voltage (L3)");
    map.insert("1-0:31.7.0", "Current (L1)");
    map.insert("1-0:51.7.0", "Current (L2)");
    map.insert("1-0:71.7.0", "Current (L3)");

    map.insert("1-0:13.7.0", "Power factor");
    map.insert("1-0:14.7.0", "Supply frequency");

    // Identification
    map.insert("1-0:0.0.0", "Equipment identifier");
    map.insert("1-0:0.0.9", "Device ID");
    map.insert("1-0:96.1.0", "Meter serial number");
    map.insert("1-0:96.50.1", "Manufacturer");

    map
}

/// Brings a code into the canonical `A-B:C.D.E*F` form registers are keyed by.
pub fn normalize_obis_code(code: &str) -> Option<String> {
    ObisCode::parse(code).map(|c| c.to_string())
}
