use crate::measurement::{MeasurementRegistry, RegisterExtractor, RegistryError};
use crate::telegram::{DecodeFault, TelegramDecoder};
use chrono::{DateTime, Utc};
use log::{debug, error};

/// What happened to one payload.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Number of slots written.
    Updated(usize),
    /// Decoded fine, but no register of interest was present.
    NoMatch,
    Faulted(DecodeFault),
}

#[derive(Debug, Clone, Default)]
pub struct DispatchStats {
    pub received: u64,
    pub decoded: u64,
    pub faults: u64,
    pub updates: u64,
    pub last_fault: Option<String>,
    pub last_update: Option<DateTime<Utc>>,
}

/// Runs decode, extract and update for each inbound payload. A payload that
/// fails to decode is reported and leaves the registry untouched.
pub struct UpdateDispatcher {
    decoder: Box<dyn TelegramDecoder>,
    extractor: RegisterExtractor,
    registry: MeasurementRegistry,
    stats: DispatchStats,
}

impl UpdateDispatcher {
    pub fn new(decoder: Box<dyn TelegramDecoder>, extractor: RegisterExtractor, registry: MeasurementRegistry) -> Result<Self, RegistryError> {
        registry.validate(extractor.slots())?;

        Ok(UpdateDispatcher {
            decoder,
            extractor,
            registry,
            stats: DispatchStats::default(),
        })
    }

    pub fn on_payload(&mut self, raw: &[u8]) -> DispatchOutcome {
        self.stats.received += 1;

        let registers = match self.decoder.decode(raw) {
            Ok(registers) => registers,
            Err(fault) => {
                error!("{} parse error: {}", self.decoder.name(), fault);
                self.stats.faults += 1;
                self.stats.last_fault = Some(fault.to_string());
                return DispatchOutcome::Faulted(fault);
            }
        };
        self.stats.decoded += 1;

        let values = self.extractor.extract(&registers);
        if values.is_empty() {
            debug!("Telegram with {} registers carried nothing of interest", registers.len());
            return DispatchOutcome::NoMatch;
        }

        for (slot, value) in &values {
            self.registry.update(*slot, *value);
        }

        self.stats.updates += values.len() as u64;
        self.stats.last_update = Some(Utc::now());
        DispatchOutcome::Updated(values.len())
    }

    pub fn registry(&self) -> &MeasurementRegistry {
        &self.registry
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    pub fn decoder_name(&self) -> &'static str {
        self.decoder.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegisterConfig;
    use crate::measurement::{RecordingPresentation, SlotName, SLOT_TABLE};
    use crate::metering_sml::test_support::*;
    use crate::metering_sml::SmlDecoder;
    use crate::telegram::Register;
    use std::sync::Arc;

    /// Replays registers encoded as `code=value unit` lines, failing on
    /// anything it cannot read.
    struct ScriptedDecoder;

    impl TelegramDecoder for ScriptedDecoder {
        fn decode(&self, raw: &[u8]) -> Result<Vec<Register>, DecodeFault> {
            if raw.is_empty() {
                return Err(DecodeFault::Empty);
            }
            let text = std::str::from_utf8(raw).map_err(|e| DecodeFault::Malformed(e.to_string()))?;
            text.lines()
                .map(|line| {
                    let (code, rest) = line.split_once('=').ok_or_else(|| DecodeFault::Malformed(line.to_string()))?;
                    let (value, unit) = rest.split_once(' ').unwrap_or((rest, ""));
                    let value = value.parse::<f64>().map_err(|e| DecodeFault::Malformed(e.to_string()))?;
                    Ok(Register::new(code, value, unit))
                })
                .collect()
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    fn dispatcher(decoder: Box<dyn TelegramDecoder>) -> (UpdateDispatcher, Arc<RecordingPresentation>) {
        let presentation = Arc::new(RecordingPresentation::default());
        let registry = MeasurementRegistry::new(&SLOT_TABLE, presentation.clone());
        let extractor = RegisterExtractor::new(&RegisterConfig::default()).unwrap();
        (UpdateDispatcher::new(decoder, extractor, registry).unwrap(), presentation)
    }

    #[test]
    fn test_reference_scenario() {
        let (mut dispatcher, presentation) = dispatcher(Box::new(ScriptedDecoder));

        let outcome = dispatcher.on_payload(b"1-0:16.7.0*255=742.5 W\n1-0:1.8.0*255=18321.07 kWh");
        assert_eq!(outcome, DispatchOutcome::Updated(2));

        let mut notified = presentation.notifications();
        notified.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(notified, vec![
            (SlotName::CurrentPower, 742.5),
            (SlotName::TotalEnergy, 18321.07),
        ]);
        assert_eq!(dispatcher.stats().updates, 2);
        assert!(dispatcher.stats().last_update.is_some());
    }

    #[test]
    fn test_sml_telegram_end_to_end() {
        let (mut dispatcher, presentation) = dispatcher(Box::new(SmlDecoder::new(true)));

        assert_eq!(dispatcher.on_payload(&reference_telegram()), DispatchOutcome::Updated(2));
        assert_eq!(dispatcher.registry().value(SlotName::CurrentPower), Some(742.5));
        assert_eq!(dispatcher.registry().value(SlotName::TotalEnergy), Some(18321.07));
        assert_eq!(presentation.notifications().len(), 2);
    }

    #[test]
    fn test_empty_payload_is_reported_not_applied() {
        let (mut dispatcher, presentation) = dispatcher(Box::new(SmlDecoder::new(true)));

        assert_eq!(dispatcher.on_payload(&[]), DispatchOutcome::Faulted(DecodeFault::Empty));
        assert_eq!(dispatcher.stats().faults, 1);
        assert_eq!(dispatcher.stats().last_fault.as_deref(), Some("empty payload"));
        assert!(presentation.notifications().is_empty());
        assert_eq!(dispatcher.registry().value(SlotName::CurrentPower), Some(0.0));
    }

    #[test]
    fn test_malformed_payloads_leave_registry_unchanged() {
        let (mut dispatcher, _) = dispatcher(Box::new(SmlDecoder::new(true)));
        dispatcher.on_payload(&reference_telegram());
        let before = dispatcher.registry().snapshot();

        let mut corrupted = reference_telegram();
        corrupted[40] ^= 0xFF;
        let truncated = reference_telegram()[..30].to_vec();

        for payload in [corrupted, truncated, b"\x1b\x1b\x1b\x1b".to_vec(), vec![0u8; 64]] {
            assert!(matches!(dispatcher.on_payload(&payload), DispatchOutcome::Faulted(_)));
        }

        assert_eq!(dispatcher.registry().snapshot(), before);
        assert_eq!(dispatcher.stats().faults, 4);
        assert_eq!(dispatcher.stats().received, 5);
    }

    #[test]
    fn test_hostile_lengths_are_faults() {
        for verify_crc in [true, false] {
            let (mut dispatcher, presentation) = dispatcher(Box::new(SmlDecoder::new(verify_crc)));
            dispatcher.on_payload(&reference_telegram());
            let before = dispatcher.registry().snapshot();

            let payloads = [
                frame(&oversized_tl_body()),
                frame(&[0x76, 0x0F, 0x01, 0x02]),
                frame(&[0x76, 0x7F, 0x01]),
            ];
            for payload in payloads {
                assert!(matches!(dispatcher.on_payload(&payload), DispatchOutcome::Faulted(_)));
            }

            assert_eq!(dispatcher.registry().snapshot(), before);
            assert_eq!(presentation.notifications().len(), 2);
        }
    }

    #[test]
    fn test_truncated_bodies_never_corrupt_the_registry() {
        let (mut dispatcher, _) = dispatcher(Box::new(SmlDecoder::new(false)));
        let body = reference_body();

        for n in 0..body.len() - 1 {
            let outcome = dispatcher.on_payload(&frame(&body[..n]));
            assert!(!matches!(outcome, DispatchOutcome::Updated(_)) || dispatcher.registry().value(SlotName::CurrentPower) == Some(742.5),
                "prefix {n} gave {outcome:?}");
        }
        assert_eq!(dispatcher.stats().received as usize, body.len() - 1);
    }

    #[test]
    fn test_unknown_codes_cause_no_updates() {
        let (mut dispatcher, presentation) = dispatcher(Box::new(ScriptedDecoder));

        assert_eq!(dispatcher.on_payload(b"1-0:32.7.0*255=230.1 V"), DispatchOutcome::NoMatch);
        assert!(presentation.notifications().is_empty());
        assert_eq!(dispatcher.stats().decoded, 1);
    }

    #[test]
    fn test_fault_between_payloads_has_no_effect() {
        let a = b"1-0:16.7.0*255=500 W\n1-0:1.8.0*255=10 kWh".to_vec();
        let b = b"not a register".to_vec();
        let c = b"1-0:16.7.0*255=650 W".to_vec();

        let (mut with_fault, _) = dispatcher(Box::new(ScriptedDecoder));
        with_fault.on_payload(&a);
        with_fault.on_payload(&b);
        with_fault.on_payload(&c);

        let (mut without_fault, _) = dispatcher(Box::new(ScriptedDecoder));
        without_fault.on_payload(&a);
        without_fault.on_payload(&c);

        assert_eq!(with_fault.registry().snapshot(), without_fault.registry().snapshot());
        assert_eq!(with_fault.registry().value(SlotName::CurrentPower), Some(650.0));
        assert_eq!(with_fault.registry().value(SlotName::TotalEnergy), Some(10.0));
    }

    #[test]
    fn test_last_register_in_telegram_wins() {
        let (mut dispatcher, presentation) = dispatcher(Box::new(ScriptedDecoder));

        dispatcher.on_payload(b"1-0:16.7.0*255=100 W\n1-0:16.7.0*255=150 W");
        assert_eq!(presentation.notifications(), vec![(SlotName::CurrentPower, 150.0)]);
    }

    #[test]
    fn test_registry_missing_a_mapped_slot_is_rejected() {
        let presentation = Arc::new(RecordingPresentation::default());
        let registry = MeasurementRegistry::new(&SLOT_TABLE[..1], presentation);
        let extractor = RegisterExtractor::new(&RegisterConfig::default()).unwrap();

        let result = UpdateDispatcher::new(Box::new(ScriptedDecoder), extractor, registry);
        assert!(matches!(result, Err(RegistryError::UnknownSlot(SlotName::TotalEnergy))));
    }
}
