//! Typed publish/subscribe event bus.
//!
//! Subscriptions are keyed by the concrete event type, so a subscriber for
//! [`crate::monitor::MemoryPressureEvent`] never sees loader events and no
//! open-ended runtime dispatch is involved. Handlers run isolated: one
//! panicking subscriber never blocks the rest nor reaches the publisher.

pub mod bus;
pub mod subscription;

pub use bus::EventBus;
pub use subscription::Subscription;
