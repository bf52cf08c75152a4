use crate::config::Config;
use crate::measurement::{Permission, Presentation, SlotDescriptor, SlotName};
use crate::mqtt::{PublishData, Transmission};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::sync::Mutex;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::Sender;

#[derive(Serialize)]
pub struct HaDevice {
    ids: String,
    name: String,
    manufacturer: String,
    model: String,
}

#[derive(Serialize)]
pub struct HaOrigin {
    pub name: String,
    pub sw_version: String,
}

fn is_none_str(value: &String) -> bool {
    value.is_empty() || value == "NONE"
}

#[derive(Serialize)]
pub struct HaComponent {
    pub p: String,
    pub name: String,
    #[serde(skip_serializing_if = "is_none_str")]
    pub device_class: String,
    #[serde(skip_serializing_if = "is_none_str")]
    pub unit_of_measurement: String,
    pub value_template: String,
    pub unique_id: String,
    pub object_id: String,
    #[serde(skip_serializing_if = "is_none_str")]
    pub state_class: String,
}

impl HaComponent {
    /// Sensor for one measurement slot. Energy counters only ever grow,
    /// everything else is a plain measurement.
    pub fn for_slot(device: &str, descriptor: &SlotDescriptor) -> Self {
        let key = descriptor.name.key();
        let (device_class, state_class) = match descriptor.name {
            SlotName::CurrentPower => ("power", "measurement"),
            SlotName::TotalEnergy => ("energy", "total_increasing"),
        };

        HaComponent {
            p: "sensor".to_string(),
            name: descriptor.name.label().to_string(),
            device_class: device_class.to_string(),
            unit_of_measurement: descriptor.unit.to_string(),
            value_template: format!("{{{{ value_json.{key} }}}}"),
            unique_id: format!("sm2m_{device}_{key}").to_lowercase(),
            object_id: format!("{device}_{key}").to_lowercase(),
            state_class: state_class.to_string(),
        }
    }
}

#[derive(Serialize)]
pub struct HaDiscover {
    pub dev: HaDevice,
    pub o: HaOrigin,
    pub cmps: serde_json::Map<String, serde_json::Value>,
    pub state_topic: String,
    pub qos: u32,
    #[serde(skip_serializing)]
    pub discover_topic: String,
}

impl HaDiscover {
    pub fn new(device: &str, name: &str, discovery_prefix: &str, state_topic: &str) -> Self {
        HaDiscover {
            discover_topic: format!("{discovery_prefix}/device/sm2m_{device}/config"),
            dev: HaDevice {
                ids: format!("sm2m_{device}"),
                name: name.to_string(),
                manufacturer: "SmartMeter".to_string(),
                model: "MQTT-SML".to_string(),
            },
            o: HaOrigin {
                name: env!("CARGO_PKG_NAME").to_string(),
                sw_version: env!("CARGO_PKG_VERSION").to_string(),
            },
            cmps: serde_json::Map::new(),
            state_topic: state_topic.to_string(),
            qos: 1,
        }
    }

    pub fn add_component(&mut self, key: &str, component: HaComponent) {
        match serde_json::to_value(component) {
            Ok(value) => { self.cmps.insert(key.to_string(), value); },
            Err(e) => error!("Unable to serialize component {key}: {e}"),
        }
    }

    pub fn get_dev_id(&self) -> String {
        self.dev.ids.clone()
    }
}

/// Lowercase identifier built from a display name.
pub fn device_id(name: &str) -> String {
    let id: String = name.trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    if id.is_empty() { "smartmeter".to_string() } else { id }
}

/// Exposes the slots as one Home Assistant device over MQTT discovery and
/// publishes every value change as a JSON state document.
pub struct HaPresentation {
    device: String,
    sender: Sender<Transmission>,
    discover: Mutex<HaDiscover>,
    state: Mutex<serde_json::Map<String, serde_json::Value>>,
}

impl HaPresentation {
    pub fn new(config: &Config, sender: Sender<Transmission>) -> Self {
        let ha = &config.homeassistant;
        let device = device_id(&config.name);
        let discover = HaDiscover::new(&device, &config.name, &ha.discovery_prefix, &ha.state_topic);

        HaPresentation {
            device,
            sender,
            discover: Mutex::new(discover),
            state: Mutex::new(serde_json::Map::new()),
        }
    }

    fn publish(&self, topic: String, payload: String, retain: bool) {
        let data = PublishData { topic, payload, qos: 1, retain };
        match self.sender.try_send(Transmission::Publish(data)) {
            Ok(_) => {},
            Err(TrySendError::Full(_)) => warn!("MQTT queue full, dropping update"),
            Err(TrySendError::Closed(_)) => error!("MQTT queue closed, dropping update"),
        }
    }
}

impl Presentation for HaPresentation {
    fn register_slot(&self, descriptor: &SlotDescriptor) {
        if !descriptor.allows(Permission::Read) {
            debug!("Slot '{}' is not readable, not exposing it", descriptor.name);
            return;
        }
        let Ok(mut discover) = self.discover.lock() else { return };
        let component = HaComponent::for_slot(&self.device, descriptor);
        discover.add_component(descriptor.name.key(), component);

        if let Ok(mut state) = self.state.lock() {
            state.insert(descriptor.name.key().to_string(), serde_json::Value::from(0.0));
        }
    }

    fn registration_complete(&self) {
        let Ok(discover) = self.discover.lock() else { return };
        match serde_json::to_string(&*discover) {
            Ok(payload) => {
                info!("Publishing Home Assistant discovery for {}", discover.get_dev_id());
                self.publish(discover.discover_topic.clone(), payload, true);
            },
            Err(e) => error!("Unable to serialize discovery document: {e}"),
        }
    }

    fn notify(&self, slot: SlotName, value: f64) {
        let topic = match self.discover.lock() {
            Ok(discover) => discover.state_topic.clone(),
            Err(_) => return,
        };
        let payload = {
            let Ok(mut state) = self.state.lock() else { return };
            state.insert(slot.key().to_string(), serde_json::Value::from(value));
            serde_json::Value::Object(state.clone()).to_string()
        };

        debug!("State update {payload}");
        self.publish(topic, payload, false);
    }
}
