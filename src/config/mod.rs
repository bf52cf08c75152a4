use crate::measurement::{RegistryError, SlotName};
use crate::obis_utils::{CURRENT_POWER_CODE, TOTAL_ENERGY_CODE};
use log::info;
use serde::{Deserialize, Serialize};
use serde_yml;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// Environment variable pointing at an explicit config file.
pub const CONFIG_PATH_ENV: &str = "SMARTMETER_CONFIG";
const CONFIG_CANDIDATES: [&str; 2] = ["config/smartmeter.yaml", "smartmeter.yaml"];
const MQTT_DEFAULT_PORT: u16 = 1883;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unable to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("unable to parse config: {0}")]
    Yaml(#[from] serde_yml::Error),
    #[error("invalid MQTT url '{0}'")]
    InvalidUrl(String),
    #[error("invalid OBIS code '{code}' for slot '{slot}'")]
    InvalidObisCode { slot: SlotName, code: String },
    #[error("OBIS code {0} is mapped to more than one slot")]
    DuplicateRegister(String),
    #[error("protocol '{0}' is not compiled into this build")]
    UnsupportedProtocol(String),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum TelegramProtocol {
    Sml,
    Iec62056,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum PayloadEncoding {
    Binary,
    Hex,
}

fn mqtt_keep_alive_default() -> u64 { 5 }

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct MqttConfig {
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub pass: Option<String>,
    #[serde(default="mqtt_keep_alive_default")]
    pub keep_alive: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        MqttConfig {
            client_name: None,
            user: None,
            pass: None,
            keep_alive: mqtt_keep_alive_default(),
        }
    }
}

fn registers_current_power_default() -> String { CURRENT_POWER_CODE.to_string() }
fn registers_total_energy_default() -> String { TOTAL_ENERGY_CODE.to_string() }

/// OBIS codes feeding each slot.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct RegisterConfig {
    #[serde(default="registers_current_power_default")]
    pub current_power: String,
    #[serde(default="registers_total_energy_default")]
    pub total_energy: String,
}

impl Default for RegisterConfig {
    fn default() -> Self {
        RegisterConfig {
            current_power: registers_current_power_default(),
            total_energy: registers_total_energy_default(),
        }
    }
}

fn ha_enabled_default() -> bool { true }
fn ha_discovery_prefix_default() -> String { "homeassistant".to_string() }
fn ha_state_topic_default() -> String { "smartmeter/state".to_string() }

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct HomeAssistantConfig {
    #[serde(default="ha_enabled_default")]
    pub enabled: bool,
    #[serde(default="ha_discovery_prefix_default")]
    pub discovery_prefix: String,
    #[serde(default="ha_state_topic_default")]
    pub state_topic: String,
}

impl Default for HomeAssistantConfig {
    fn default() -> Self {
        HomeAssistantConfig {
            enabled: ha_enabled_default(),
            discovery_prefix: ha_discovery_prefix_default(),
            state_topic: ha_state_topic_default(),
        }
    }
}

fn name_default() -> String { "Smart Meter".to_string() }
fn mqtt_url_default() -> String { "mqtt://localhost".to_string() }
fn topic_default() -> String { "smartmeter/raw".to_string() }
fn protocol_default() -> TelegramProtocol { TelegramProtocol::Sml }
fn payload_encoding_default() -> PayloadEncoding { PayloadEncoding::Binary }
fn verify_crc_default() -> bool { true }

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Config {
    #[serde(default="name_default")]
    pub name: String,
    #[serde(default="mqtt_url_default", rename="mqttUrl", alias="mqtt_url")]
    pub mqtt_url: String,
    #[serde(default="topic_default")]
    pub topic: String,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default="protocol_default")]
    pub protocol: TelegramProtocol,
    #[serde(default="payload_encoding_default")]
    pub payload_encoding: PayloadEncoding,
    #[serde(default="verify_crc_default")]
    pub verify_crc: bool,
    #[serde(default)]
    pub registers: RegisterConfig,
    #[serde(default)]
    pub homeassistant: HomeAssistantConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            name: name_default(),
            mqtt_url: mqtt_url_default(),
            topic: topic_default(),
            mqtt: MqttConfig::default(),
            protocol: protocol_default(),
            payload_encoding: payload_encoding_default(),
            verify_crc: verify_crc_default(),
            registers: RegisterConfig::default(),
            homeassistant: HomeAssistantConfig::default(),
        }
    }
}

impl Config {
    /// Loads the file named by `SMARTMETER_CONFIG`, or the first of
    /// `config/smartmeter.yaml` and `smartmeter.yaml` that exists. Without
    /// any file every option takes its default.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Self::load_from(Path::new(&path));
        }

        let found: Option<PathBuf> = CONFIG_CANDIDATES.iter()
            .map(PathBuf::from)
            .find(|p| p.is_file());

        match found {
            Some(path) => Self::load_from(&path),
            None => {
                info!("No config file found, using defaults");
                Ok(Config::default())
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        info!("Loading config from {}", path.display());
        let contents = fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        if contents.trim().is_empty() {
            return Ok(Config::default());
        }
        Ok(serde_yml::from_str(contents)?)
    }

    /// Host and port from `mqtt://host[:port]` or `tcp://host[:port]`.
    pub fn broker_address(&self) -> Result<(String, u16), ConfigError> {
        let invalid = || ConfigError::InvalidUrl(self.mqtt_url.clone());

        let rest = match self.mqtt_url.split_once("://") {
            Some(("mqtt", rest)) | Some(("tcp", rest)) => rest,
            Some(_) => return Err(invalid()),
            None => self.mqtt_url.as_str(),
        };
        let authority = rest.split('/').next().unwrap_or_default();

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => (host, port.parse::<u16>().map_err(|_| invalid())?),
            None => (authority, MQTT_DEFAULT_PORT),
        };

        if host.is_empty() {
            return Err(invalid());
        }
        Ok((host.to_string(), port))
    }

    pub fn client_id(&self) -> String {
        match &self.mqtt.client_name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => format!("smartmeter-{}", &Uuid::new_v4().simple().to_string()[..8]),
        }
    }
}
