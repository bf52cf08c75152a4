//! Smart meter telegram bridge
//!
//! Subscribes to raw meter telegrams on MQTT, decodes them (SML or
//! IEC 62056-21), and exposes current power and total energy through a
//! presentation layer such as Home Assistant discovery.

pub mod bridge;
pub mod config;
pub mod dispatcher;
pub mod measurement;
pub mod mqtt;
pub mod obis_utils;
pub mod telegram;
#[cfg(feature = "iec62056")]
pub mod metering_62056;
#[cfg(feature = "sml")]
pub mod metering_sml;

// Re-export common types for easier access
pub use bridge::{build_presentation, MeterBridge};
pub use config::{Config, ConfigError};
pub use dispatcher::{DispatchOutcome, UpdateDispatcher};
pub use measurement::{MeasurementRegistry, Presentation, RegisterExtractor, SlotName};
pub use mqtt::MqttManager;
pub use telegram::{DecodeFault, Register, TelegramDecoder};
