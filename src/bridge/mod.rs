use crate::config::{Config, ConfigError};
use crate::dispatcher::{DispatchOutcome, UpdateDispatcher};
use crate::measurement::{LogPresentation, MeasurementRegistry, Presentation, RegisterExtractor, SLOT_TABLE};
use crate::mqtt::ha_interface::HaPresentation;
use crate::mqtt::{SubscribeData, Transmission};
use crate::telegram;
use log::{debug, error, info};
use std::sync::Arc;
use tokio::sync::mpsc::Sender;

/// Picks the presentation layer the config asks for.
pub fn build_presentation(config: &Config, sender: Sender<Transmission>) -> Arc<dyn Presentation> {
    if config.homeassistant.enabled {
        Arc::new(HaPresentation::new(config, sender))
    } else {
        Arc::new(LogPresentation)
    }
}

/// Owns everything one meter needs: the subscription topic, the transport
/// sender and the dispatcher.
pub struct MeterBridge {
    topic: String,
    sender: Sender<Transmission>,
    dispatcher: UpdateDispatcher,
}

impl MeterBridge {
    pub fn new(config: &Config, sender: Sender<Transmission>, presentation: Arc<dyn Presentation>) -> Result<Self, ConfigError> {
        let decoder = telegram::build_decoder(&config.protocol, &config.payload_encoding, config.verify_crc)
            .ok_or_else(|| ConfigError::UnsupportedProtocol(format!("{:?}", config.protocol).to_lowercase()))?;
        let extractor = RegisterExtractor::new(&config.registers)?;
        let registry = MeasurementRegistry::new(&SLOT_TABLE, presentation);
        let dispatcher = UpdateDispatcher::new(decoder, extractor, registry)?;

        info!("Decoding {} telegrams from {}", dispatcher.decoder_name(), config.topic);

        Ok(MeterBridge {
            topic: config.topic.clone(),
            sender,
            dispatcher,
        })
    }

    pub fn dispatcher(&self) -> &UpdateDispatcher {
        &self.dispatcher
    }

    pub fn handle_payload(&mut self, payload: &[u8]) -> DispatchOutcome {
        let outcome = self.dispatcher.on_payload(payload);
        debug!("Payload of {} bytes: {:?}", payload.len(), outcome);
        outcome
    }

    pub async fn start_thread(&mut self) {
        info!("Starting meter bridge thread");

        let (sender, mut receiver) = tokio::sync::mpsc::channel(10);
        let register = Transmission::Subscribe(SubscribeData {
            topic: self.topic.clone(),
            sender,
        });

        if self.sender.send(register).await.is_err() {
            error!("MQTT manager is gone, unable to subscribe to {}", self.topic);
            return;
        }

        info!("Waiting for telegrams on {}", self.topic);
        while let Some(payload) = receiver.recv().await {
            self.handle_payload(&payload);
        }

        let stats = self.dispatcher.stats();
        info!("Subscription closed after {} telegrams ({} faults)", stats.received, stats.faults);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TelegramProtocol;
    use crate::measurement::SlotName;
    use crate::metering_sml::test_support::reference_telegram;

    #[test]
    fn test_bridge_from_default_config() {
        let (tx, _rx) = tokio::sync::mpsc::channel(10);
        let mut bridge = MeterBridge::new(&Config::default(), tx, Arc::new(LogPresentation)).unwrap();

        assert_eq!(bridge.dispatcher().decoder_name(), "sml");
        assert_eq!(bridge.handle_payload(&reference_telegram()), DispatchOutcome::Updated(2));
        assert_eq!(bridge.dispatcher().registry().value(SlotName::CurrentPower), Some(742.5));
    }

    #[test]
    fn test_bridge_with_hex_iec_config() {
        let mut config = Config::default();
        config.protocol = TelegramProtocol::Iec62056;
        config.payload_encoding = crate::config::PayloadEncoding::Hex;

        let (tx, _rx) = tokio::sync::mpsc::channel(10);
        let mut bridge = MeterBridge::new(&config, tx, Arc::new(LogPresentation)).unwrap();

        let telegram = "/EMH5\\@01LZQJ\r\n1-0:16.7.0(000742.5*W)\r\n1-0:1.8.0(018321.07*kWh)\r\n!\r\n";
        let payload = hex::encode(telegram);
        assert_eq!(bridge.handle_payload(payload.as_bytes()), DispatchOutcome::Updated(2));
        assert_eq!(bridge.dispatcher().registry().value(SlotName::TotalEnergy), Some(18321.07));
    }

    #[test]
    fn test_invalid_register_code_fails_startup() {
        let mut config = Config::default();
        config.registers.total_energy = "not an obis code".to_string();

        let (tx, _rx) = tokio::sync::mpsc::channel(10);
        let result = MeterBridge::new(&config, tx, Arc::new(LogPresentation));
        assert!(matches!(result, Err(ConfigError::InvalidObisCode { slot: SlotName::TotalEnergy, .. })));
    }

    #[test]
    fn test_build_presentation_uses_home_assistant_when_enabled() {
        let (tx, mut rx) = tokio::sync::mpsc::channel(10);
        let presentation = build_presentation(&Config::default(), tx);
        let _bridge = MeterBridge::new(&Config::default(), tokio::sync::mpsc::channel(1).0, presentation).unwrap();

        // Discovery document is queued as soon as the registry is built
        assert!(matches!(rx.try_recv(), Ok(Transmission::Publish(_))));
    }

    #[tokio::test]
    async fn test_start_thread_subscribes_and_dispatches() {
        let (tx, mut rx) = tokio::sync::mpsc::channel(10);
        let mut bridge = MeterBridge::new(&Config::default(), tx, Arc::new(LogPresentation)).unwrap();

        let handle = tokio::spawn(async move {
            bridge.start_thread().await;
            bridge.dispatcher().stats().clone()
        });

        let subscriber = match rx.recv().await {
            Some(Transmission::Subscribe(data)) => {
                assert_eq!(data.topic, "smartmeter/raw");
                data.sender
            },
            _ => panic!("expected a subscription"),
        };

        subscriber.send(reference_telegram()).await.unwrap();
        subscriber.send(Vec::new()).await.unwrap();
        drop(subscriber);

        let stats = handle.await.unwrap();
        assert_eq!(stats.received, 2);
        assert_eq!(stats.faults, 1);
        assert_eq!(stats.updates, 2);
    }
}
