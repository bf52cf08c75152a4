use super::slots::{Permission, SlotDescriptor, SlotName};
use super::Presentation;
use log::{error, info};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("slot '{0}' is not registered")]
    UnknownSlot(SlotName),
}

struct SlotState {
    descriptor: SlotDescriptor,
    value: f64,
    sink: Arc<dyn Presentation>,
}

/// Holds the current value of every exposed slot. The slot set is fixed
/// when the registry is built.
pub struct MeasurementRegistry {
    slots: BTreeMap<SlotName, SlotState>,
}

impl MeasurementRegistry {
    /// Registers every descriptor with the presentation layer.
    pub fn new(descriptors: &[SlotDescriptor], presentation: Arc<dyn Presentation>) -> Self {
        let mut slots = BTreeMap::new();

        for descriptor in descriptors {
            presentation.register_slot(descriptor);
            slots.insert(descriptor.name, SlotState {
                descriptor: descriptor.clone(),
                value: 0.0,
                sink: presentation.clone(),
            });
        }
        presentation.registration_complete();

        MeasurementRegistry { slots }
    }

    /// Checks at startup that every slot something wants to write exists.
    pub fn validate<I: IntoIterator<Item = SlotName>>(&self, wanted: I) -> Result<(), RegistryError> {
        for slot in wanted {
            if !self.slots.contains_key(&slot) {
                return Err(RegistryError::UnknownSlot(slot));
            }
        }
        Ok(())
    }

    /// Stores the value and notifies the presentation layer if the slot
    /// allows it.
    ///
    /// The slot set is closed, so an unknown slot is a wiring bug: it panics
    /// in debug builds and is logged and ignored otherwise.
    pub fn update(&mut self, slot: SlotName, value: f64) {
        let state = match self.slots.get_mut(&slot) {
            Some(state) => state,
            None => {
                if cfg!(debug_assertions) {
                    panic!("{}", RegistryError::UnknownSlot(slot));
                }
                error!("Dropping update: {}", RegistryError::UnknownSlot(slot));
                return;
            }
        };

        state.value = value;
        info!("{}: {} {}", slot.label(), value, state.descriptor.unit);
        if state.descriptor.allows(Permission::Notify) {
            state.sink.notify(slot, value);
        }
    }

    pub fn value(&self, slot: SlotName) -> Option<f64> {
        self.slots.get(&slot).map(|s| s.value)
    }

    pub fn descriptor(&self, slot: SlotName) -> Option<&SlotDescriptor> {
        self.slots.get(&slot).map(|s| &s.descriptor)
    }

    pub fn snapshot(&self) -> BTreeMap<SlotName, f64> {
        self.slots.iter().map(|(name, s)| (*name, s.value)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::slots::{descriptor, SLOT_TABLE};
    use crate::measurement::RecordingPresentation;

    #[test]
    fn test_registration_exposes_every_slot() {
        let presentation = Arc::new(RecordingPresentation::default());
        let registry = MeasurementRegistry::new(&SLOT_TABLE, presentation.clone());

        let registered = presentation.registered();
        assert_eq!(registered, vec![SlotName::CurrentPower, SlotName::TotalEnergy]);
        assert!(presentation.is_complete());
        assert_eq!(registry.value(SlotName::CurrentPower), Some(0.0));
        assert_eq!(registry.descriptor(SlotName::TotalEnergy).map(|d| d.unit), Some("kWh"));
    }

    #[test]
    fn test_update_overwrites_and_notifies() {
        let presentation = Arc::new(RecordingPresentation::default());
        let mut registry = MeasurementRegistry::new(&SLOT_TABLE, presentation.clone());

        registry.update(SlotName::CurrentPower, 742.5);
        registry.update(SlotName::CurrentPower, 801.0);

        assert_eq!(registry.value(SlotName::CurrentPower), Some(801.0));
        assert_eq!(registry.value(SlotName::TotalEnergy), Some(0.0));
        assert_eq!(presentation.notifications(), vec![
            (SlotName::CurrentPower, 742.5),
            (SlotName::CurrentPower, 801.0),
        ]);
    }

    #[test]
    fn test_read_only_slot_is_stored_silently() {
        let presentation = Arc::new(RecordingPresentation::default());
        let read_only = SlotDescriptor {
            permissions: &[Permission::Read],
            ..descriptor(SlotName::TotalEnergy).clone()
        };
        let mut registry = MeasurementRegistry::new(&[read_only], presentation.clone());

        registry.update(SlotName::TotalEnergy, 18321.07);
        assert_eq!(registry.value(SlotName::TotalEnergy), Some(18321.07));
        assert!(presentation.notifications().is_empty());
    }

    #[test]
    fn test_validate_rejects_missing_slot() {
        let presentation = Arc::new(RecordingPresentation::default());
        let registry = MeasurementRegistry::new(&[descriptor(SlotName::CurrentPower).clone()], presentation);

        assert!(registry.validate([SlotName::CurrentPower]).is_ok());
        assert_eq!(registry.validate(SlotName::ALL), Err(RegistryError::UnknownSlot(SlotName::TotalEnergy)));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "not registered")]
    fn test_update_of_unknown_slot_panics_in_debug() {
        let presentation = Arc::new(RecordingPresentation::default());
        let mut registry = MeasurementRegistry::new(&[descriptor(SlotName::CurrentPower).clone()], presentation);
        registry.update(SlotName::TotalEnergy, 1.0);
    }
}
