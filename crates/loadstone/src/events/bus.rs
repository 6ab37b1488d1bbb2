//! Event bus implementation.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{error, trace};

use super::subscription::Subscription;

/// Events are plain values; any `Clone + Send + Sync` type qualifies.
pub trait Event: Any + Send + Sync {}

impl<T: Any + Send + Sync> Event for T {}

type ErasedHandler = Box<dyn Fn(&dyn Any) + Send + Sync>;

struct Registration {
    id: u64,
    /// Cleared by `Subscription::cancel` and by the one-shot claim.
    active: Arc<AtomicBool>,
    /// One-shot registrations claim `active` before delivery so exactly
    /// one event fires even under concurrent publishers.
    once: bool,
    handler: ErasedHandler,
}

#[derive(Default)]
pub(super) struct BusInner {
    subscribers: Mutex<HashMap<TypeId, Vec<Arc<Registration>>>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for BusInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusInner").finish_non_exhaustive()
    }
}

impl BusInner {
    pub(super) fn remove(&self, type_id: TypeId, id: u64) {
        let mut subscribers = self.subscribers.lock().expect("subscriber map lock poisoned");
        if let Some(list) = subscribers.get_mut(&type_id) {
            list.retain(|reg| reg.id != id);
            if list.is_empty() {
                subscribers.remove(&type_id);
            }
        }
    }
}

/// Typed publish/subscribe dispatcher.
///
/// Cloning the bus yields another handle to the same subscriber registry;
/// components each hold their own clone.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a handler for every published event of type `E`.
    ///
    /// Delivery order among subscribers of the same type follows
    /// subscription order.
    pub fn subscribe<E, F>(&self, handler: F) -> Subscription
    where
        E: Event,
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.register::<E>(false, move |event| handler(event))
    }

    /// Subscribe a handler invoked only when `filter(event)` is true.
    ///
    /// A panicking filter counts as "no match": the handler is skipped and
    /// the event still reaches other subscribers.
    pub fn subscribe_filtered<E, P, F>(&self, filter: P, handler: F) -> Subscription
    where
        E: Event,
        P: Fn(&E) -> bool + Send + Sync + 'static,
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.register::<E>(false, move |event| {
            let matched = catch_unwind(AssertUnwindSafe(|| filter(event))).unwrap_or_else(|_| {
                trace!("subscription filter panicked; treating as no match");
                false
            });
            if matched {
                handler(event);
            }
        })
    }

    /// Subscribe a handler that fires for exactly the first event of type
    /// `E`, after which the registration deactivates itself. Cancelling the
    /// returned handle before any delivery is equivalent to never having
    /// subscribed.
    pub fn subscribe_once<E, F>(&self, handler: F) -> Subscription
    where
        E: Event,
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.register::<E>(true, move |event| handler(event))
    }

    /// Deliver an event to every current subscriber of its type, on the
    /// publishing thread. A handler panic is logged and isolated; remaining
    /// subscribers still receive the event and nothing propagates back to
    /// the caller.
    pub fn publish<E: Event>(&self, event: &E) {
        let snapshot: Vec<Arc<Registration>> = {
            let subscribers = self
                .inner
                .subscribers
                .lock()
                .expect("subscriber map lock poisoned");
            match subscribers.get(&TypeId::of::<E>()) {
                Some(list) => list.clone(),
                None => return,
            }
        };

        trace!(
            event_type = std::any::type_name::<E>(),
            subscribers = snapshot.len(),
            "publishing event"
        );

        let mut spent = false;
        for reg in &snapshot {
            if reg.once {
                // Claim-before-deliver: only one publisher wins.
                if !reg.active.swap(false, Ordering::SeqCst) {
                    continue;
                }
                spent = true;
            } else if !reg.active.load(Ordering::SeqCst) {
                continue;
            }

            if catch_unwind(AssertUnwindSafe(|| (reg.handler)(event))).is_err() {
                error!(
                    event_type = std::any::type_name::<E>(),
                    subscription_id = reg.id,
                    "event handler panicked; isolating failure"
                );
            }
        }

        if spent {
            self.sweep_spent::<E>();
        }
    }

    /// Deliver an event from a spawned task, returning immediately.
    ///
    /// Subscriber-visible semantics match [`EventBus::publish`]; handlers
    /// must not assume a particular thread identity.
    pub fn publish_async<E: Event + Clone>(&self, event: E) {
        let bus = self.clone();
        tokio::spawn(async move {
            bus.publish(&event);
        });
    }

    /// Number of live registrations for event type `E`.
    #[must_use]
    pub fn subscriber_count<E: Event>(&self) -> usize {
        let subscribers = self
            .inner
            .subscribers
            .lock()
            .expect("subscriber map lock poisoned");
        subscribers
            .get(&TypeId::of::<E>())
            .map_or(0, |list| list.iter().filter(|r| r.active.load(Ordering::SeqCst)).count())
    }

    fn register<E: Event>(
        &self,
        once: bool,
        erased: impl Fn(&E) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let active = Arc::new(AtomicBool::new(true));
        let registration = Arc::new(Registration {
            id,
            active: active.clone(),
            once,
            handler: Box::new(move |any: &dyn Any| {
                if let Some(event) = any.downcast_ref::<E>() {
                    erased(event);
                }
            }),
        });

        let mut subscribers = self
            .inner
            .subscribers
            .lock()
            .expect("subscriber map lock poisoned");
        subscribers
            .entry(TypeId::of::<E>())
            .or_default()
            .push(registration);

        Subscription {
            bus: Arc::downgrade(&self.inner),
            type_id: TypeId::of::<E>(),
            id,
            active,
        }
    }

    /// Drop registrations whose one-shot delivery already fired.
    fn sweep_spent<E: Event>(&self) {
        let mut subscribers = self
            .inner
            .subscribers
            .lock()
            .expect("subscriber map lock poisoned");
        if let Some(list) = subscribers.get_mut(&TypeId::of::<E>()) {
            list.retain(|reg| !(reg.once && !reg.active.load(Ordering::SeqCst)));
            if list.is_empty() {
                subscribers.remove(&TypeId::of::<E>());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;

    #[derive(Debug, Clone, PartialEq)]
    struct Ping(u32);

    #[derive(Debug, Clone, PartialEq)]
    struct Pong(&'static str);

    #[test]
    fn test_publish_reaches_only_matching_type() {
        let bus = EventBus::new();
        let pings = Arc::new(AtomicUsize::new(0));
        let pongs = Arc::new(AtomicUsize::new(0));

        let p = pings.clone();
        let _ping_sub = bus.subscribe::<Ping, _>(move |_| {
            p.fetch_add(1, Ordering::SeqCst);
        });
        let q = pongs.clone();
        let _pong_sub = bus.subscribe::<Pong, _>(move |_| {
            q.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(&Ping(1));
        bus.publish(&Ping(2));

        assert_eq!(pings.load(Ordering::SeqCst), 2);
        assert_eq!(pongs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_delivery_follows_subscription_order() {
        let bus = EventBus::new();
        let order = Arc::new(StdMutex::new(Vec::new()));

        let o1 = order.clone();
        let _first = bus.subscribe::<Ping, _>(move |_| o1.lock().unwrap().push("first"));
        let o2 = order.clone();
        let _second = bus.subscribe::<Ping, _>(move |_| o2.lock().unwrap().push("second"));

        bus.publish(&Ping(0));
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_panicking_handler_is_isolated() {
        let bus = EventBus::new();
        let reached = Arc::new(AtomicBool::new(false));

        let _bad = bus.subscribe::<Ping, _>(|_| panic!("handler blew up"));
        let r = reached.clone();
        let _good = bus.subscribe::<Ping, _>(move |_| r.store(true, Ordering::SeqCst));

        // Must not propagate to the publisher.
        bus.publish(&Ping(0));
        assert!(reached.load(Ordering::SeqCst));
    }

    #[test]
    fn test_filtered_subscription_skips_non_matching() {
        let bus = EventBus::new();
        let seen = Arc::new(StdMutex::new(Vec::new()));

        let s = seen.clone();
        let _sub = bus.subscribe_filtered::<Ping, _, _>(
            |event| event.0 % 2 == 0,
            move |event| s.lock().unwrap().push(event.0),
        );

        for n in 0..5 {
            bus.publish(&Ping(n));
        }
        assert_eq!(*seen.lock().unwrap(), vec![0, 2, 4]);
    }

    #[test]
    fn test_panicking_filter_counts_as_no_match() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c = count.clone();
        let _sub = bus.subscribe_filtered::<Ping, _, _>(
            |event| {
                assert!(event.0 != 1, "filter failure");
                true
            },
            move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            },
        );

        bus.publish(&Ping(0));
        bus.publish(&Ping(1)); // filter panics: no match
        bus.publish(&Ping(2));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_subscribe_once_fires_exactly_once() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c = count.clone();
        let sub = bus.subscribe_once::<Ping, _>(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(&Ping(0));
        bus.publish(&Ping(1));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!sub.is_active());
        assert_eq!(bus.subscriber_count::<Ping>(), 0);
    }

    #[test]
    fn test_cancelled_once_never_fires() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c = count.clone();
        let sub = bus.subscribe_once::<Ping, _>(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        sub.cancel();

        bus.publish(&Ping(0));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_no_invocation_after_cancel_returns() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c = count.clone();
        let sub = bus.subscribe::<Ping, _>(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(&Ping(0));
        sub.cancel();
        bus.publish(&Ping(1));
        bus.publish(&Ping(2));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count::<Ping>(), 0);
    }

    #[test]
    fn test_drop_acts_as_cancel() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c = count.clone();
        let sub = bus.subscribe::<Ping, _>(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        drop(sub);

        bus.publish(&Ping(0));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_publish_async_delivers() {
        let bus = EventBus::new();
        let (tx, rx) = tokio::sync::oneshot::channel::<Pong>();
        let tx = Arc::new(StdMutex::new(Some(tx)));

        let _sub = bus.subscribe::<Pong, _>(move |event| {
            if let Some(tx) = tx.lock().unwrap().take() {
                let _ = tx.send(event.clone());
            }
        });

        bus.publish_async(Pong("hello"));
        let received = tokio::time::timeout(std::time::Duration::from_secs(1), rx)
            .await
            .expect("async publish should deliver")
            .unwrap();
        assert_eq!(received, Pong("hello"));
    }
}
