use std::fmt;

/// The quantities exposed to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SlotName {
    CurrentPower,
    TotalEnergy,
}

impl SlotName {
    pub const ALL: [SlotName; 2] = [SlotName::CurrentPower, SlotName::TotalEnergy];

    pub fn as_str(&self) -> &'static str {
        match self {
            SlotName::CurrentPower => "current power",
            SlotName::TotalEnergy => "total energy",
        }
    }

    /// Short label used in log lines.
    pub fn label(&self) -> &'static str {
        match self {
            SlotName::CurrentPower => "Power",
            SlotName::TotalEnergy => "Energy",
        }
    }

    /// Identifier safe for JSON keys and MQTT object ids.
    pub fn key(&self) -> &'static str {
        match self {
            SlotName::CurrentPower => "current_power",
            SlotName::TotalEnergy => "total_energy",
        }
    }
}

impl fmt::Display for SlotName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericFormat {
    Float,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Read,
    Notify,
}

/// Everything the presentation layer needs to expose a slot.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotDescriptor {
    pub name: SlotName,
    /// Name of the characteristic as accessory frameworks know it.
    pub characteristic: &'static str,
    pub format: NumericFormat,
    pub unit: &'static str,
    pub permissions: &'static [Permission],
}

impl SlotDescriptor {
    pub fn allows(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }
}

const READ_NOTIFY: &[Permission] = &[Permission::Read, Permission::Notify];

pub static SLOT_TABLE: [SlotDescriptor; 2] = [
    SlotDescriptor {
        name: SlotName::CurrentPower,
        characteristic: "EvePower",
        format: NumericFormat::Float,
        unit: "W",
        permissions: READ_NOTIFY,
    },
    SlotDescriptor {
        name: SlotName::TotalEnergy,
        characteristic: "EveTotalConsumption",
        format: NumericFormat::Float,
        unit: "kWh",
        permissions: READ_NOTIFY,
    },
];

pub fn descriptor(slot: SlotName) -> &'static SlotDescriptor {
    match slot {
        SlotName::CurrentPower => &SLOT_TABLE[0],
        SlotName::TotalEnergy => &SLOT_TABLE[1],
    }
}
