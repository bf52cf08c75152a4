use log::info;

pub mod slots;
pub mod extractor;
pub mod registry;

pub use slots::{Permission, SlotDescriptor, SlotName, SLOT_TABLE};
pub use extractor::RegisterExtractor;
pub use registry::{MeasurementRegistry, RegistryError};

/// The layer that shows slot values to users.
///
/// `notify` is called on the ingestion path and must not block.
pub trait Presentation: Send + Sync {
    fn register_slot(&self, descriptor: &SlotDescriptor);

    /// Called once after every slot has been registered.
    fn registration_complete(&self) {}

    fn notify(&self, slot: SlotName, value: f64);
}

/// Presentation that only writes to the log, used when no other output is
/// configured.
pub struct LogPresentation;

impl Presentation for LogPresentation {
    fn register_slot(&self, descriptor: &SlotDescriptor) {
        info!("Exposing slot '{}' as {} ({:?}, {}, {:?})", descriptor.name, descriptor.characteristic,
            descriptor.format, descriptor.unit, descriptor.permissions);
    }

    fn notify(&self, _slot: SlotName, _value: f64) {}
}

#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingPresentation {
    registered: std::sync::Mutex<Vec<SlotName>>,
    complete: std::sync::atomic::AtomicBool,
    notifications: std::sync::Mutex<Vec<(SlotName, f64)>>,
}

#[cfg(test)]
impl RecordingPresentation {
    pub fn registered(&self) -> Vec<SlotName> {
        self.registered.lock().unwrap().clone()
    }

    pub fn is_complete(&self) -> bool {
        self.complete.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn notifications(&self) -> Vec<(SlotName, f64)> {
        self.notifications.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl Presentation for RecordingPresentation {
    fn register_slot(&self, descriptor: &SlotDescriptor) {
        self.registered.lock().unwrap().push(descriptor.name);
    }

    fn registration_complete(&self) {
        self.complete.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    fn notify(&self, slot: SlotName, value: f64) {
        self.notifications.lock().unwrap().push((slot, value));
    }
}
