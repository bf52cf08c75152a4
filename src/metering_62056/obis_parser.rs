use super::utils::{extract_numeric_value, extract_unit};
use crate::obis_utils;
use crate::telegram::Register;
use log::debug;

#[derive(Debug, PartialEq)]
pub enum ObisLine {
    Numeric(Register),
    /// Well formed, but the value is text (serial numbers, timestamps).
    Text(String),
}

pub fn parse_obis_line(line: &str) -> Result<ObisLine, String> {
    // Example formats:
    // 1-0:1.8.1(000123.456*kWh)
    // 1-0:15.7.0(001.234*kW)
    // 0-1:24.2.1(101209112500W)(12785.123*m3)

    let line = line.trim();

    let paren_start = line.find('(')
        .ok_or_else(|| format!("no value group in '{line}'"))?;
    if !line.ends_with(')') {
        return Err(format!("unterminated value group in '{line}'"));
    }

    let code = obis_utils::normalize_obis_code(&line[..paren_start])
        .ok_or_else(|| format!("invalid OBIS code in '{line}'"))?;

    // The last group holds the value, earlier ones are capture times
    let groups = &line[paren_start..];
    let value_start = groups.rfind('(').unwrap_or(0) + 1;
    let value_content = &groups[value_start..groups.len() - 1];

    let value = match extract_numeric_value(value_content) {
        Some(v) => v,
        None => return Ok(ObisLine::Text(code)),
    };
    let unit = extract_unit(value_content).unwrap_or_default();

    debug!("Parsed OBIS line - Code: {}, Value: {}, Unit: {}", code, value, unit);

    Ok(ObisLine::Numeric(Register { code, value, unit }))
}
