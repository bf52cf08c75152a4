use super::slots::{descriptor, SlotName};
use crate::config::{ConfigError, RegisterConfig};
use crate::obis_utils;
use crate::telegram::Register;
use log::{info, warn};
use std::collections::{BTreeMap, HashMap};

/// Maps decoded registers onto measurement slots through a fixed code table.
#[derive(Debug, Clone)]
pub struct RegisterExtractor {
    table: HashMap<String, SlotName>,
}

impl RegisterExtractor {
    pub fn new(config: &RegisterConfig) -> Result<Self, ConfigError> {
        Self::from_table(&[
            (config.current_power.as_str(), SlotName::CurrentPower),
            (config.total_energy.as_str(), SlotName::TotalEnergy),
        ])
    }

    pub fn from_table(entries: &[(&str, SlotName)]) -> Result<Self, ConfigError> {
        let mut table = HashMap::new();

        for (code, slot) in entries {
            let normalized = obis_utils::normalize_obis_code(code)
                .ok_or_else(|| ConfigError::InvalidObisCode { slot: *slot, code: code.to_string() })?;

            info!("Slot '{}' reads {} ({})", slot, normalized,
                obis_utils::get_obis_description(&normalized).unwrap_or("unknown register"));

            if table.insert(normalized.clone(), *slot).is_some() {
                return Err(ConfigError::DuplicateRegister(normalized));
            }
        }

        Ok(RegisterExtractor { table })
    }

    /// Slots this extractor can produce values for.
    pub fn slots(&self) -> Vec<SlotName> {
        let mut slots: Vec<SlotName> = self.table.values().copied().collect();
        slots.sort();
        slots.dedup();
        slots
    }

    pub fn code_for(&self, slot: SlotName) -> Option<&str> {
        self.table.iter()
            .find(|(_, s)| **s == slot)
            .map(|(code, _)| code.as_str())
    }

    /// Registers with unknown codes are dropped. When a code repeats, the
    /// later register wins.
    pub fn extract(&self, registers: &[Register]) -> BTreeMap<SlotName, f64> {
        let mut values = BTreeMap::new();

        for register in registers {
            if let Some(slot) = self.table.get(&register.code) {
                let value = reconcile_unit(register, descriptor(*slot).unit);
                values.insert(*slot, value);
            }
        }

        values
    }
}

// Base unit and decimal factor of the units meters report power and energy in.
fn unit_scale(unit: &str) -> Option<(&'static str, f64)> {
    match unit {
        "W" => Some(("W", 1.0)),
        "kW" => Some(("W", 1e3)),
        "MW" => Some(("W", 1e6)),
        "Wh" => Some(("Wh", 1.0)),
        "kWh" => Some(("Wh", 1e3)),
        "MWh" => Some(("Wh", 1e6)),
        _ => None,
    }
}

fn reconcile_unit(register: &Register, slot_unit: &str) -> f64 {
    if register.unit.is_empty() || register.unit == slot_unit {
        return register.value;
    }

    match (unit_scale(&register.unit), unit_scale(slot_unit)) {
        (Some((from_base, from_factor)), Some((to_base, to_factor))) if from_base == to_base => {
            register.value * from_factor / to_factor
        }
        _ => {
            warn!("Register {} reports unit '{}' but the slot expects '{}', passing the value through",
                register.code, register.unit, slot_unit);
            register.value
        }
    }
}
