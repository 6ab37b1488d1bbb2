//! Subscription handles returned by the event bus.

use std::any::TypeId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use super::bus::BusInner;

/// Owns one registration on the event bus.
///
/// Cancelling (or dropping) the handle guarantees that no *new* invocation
/// of the handler begins after the call returns; a delivery already in
/// progress on another thread may still complete.
#[derive(Debug)]
pub struct Subscription {
    pub(super) bus: Weak<BusInner>,
    pub(super) type_id: TypeId,
    pub(super) id: u64,
    pub(super) active: Arc<AtomicBool>,
}

impl Subscription {
    /// Deactivate the registration and unlink it from the bus.
    pub fn cancel(&self) {
        self.active.store(false, Ordering::SeqCst);
        if let Some(bus) = self.bus.upgrade() {
            bus.remove(self.type_id, self.id);
        }
    }

    /// Whether the handler can still be invoked.
    ///
    /// A once-subscription reports inactive after its single delivery.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}
