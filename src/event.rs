//! # Notification Bus
//!
//! Typed publish/subscribe used by the registries to announce lifecycle changes.
//!
//! Handlers run on a fixed pool of worker threads, never on the publishing thread.
//! Each event names a partition; events that share a partition are handled by the
//! same worker and therefore in publish order. Nothing is guaranteed across
//! partitions.
//!
//! ## Usage
//! ```rust
//! use candlemc::event::{Event, EventBus};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! struct Ping;
//! impl Event for Ping {}
//!
//! let bus = EventBus::new(2);
//! let seen = Arc::new(AtomicUsize::new(0));
//! let counter = seen.clone();
//! bus.subscribe(move |_: &Ping| {
//!     counter.fetch_add(1, Ordering::SeqCst);
//! });
//!
//! bus.publish(Ping).wait_blocking();
//! assert_eq!(seen.load(Ordering::SeqCst), 1);
//! ```

use std::any::{Any, TypeId};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::task::{Context, Poll};
use std::thread;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

/// Worker count used by [`EventBus::default`].
pub const DEFAULT_WORKERS: usize = 4;

/// A notification that can travel over the [`EventBus`].
pub trait Event: Any + Send + Sync {
    /// Events with equal partitions are delivered in publish order.
    fn partition(&self) -> u64 {
        0
    }
}

/// Hash any key into a partition number.
pub fn partition_of<K: Hash + ?Sized>(key: &K) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type ErasedHandler = Arc<dyn Fn(&(dyn Any + Send + Sync)) + Send + Sync>;

struct Envelope {
    event: Box<dyn Any + Send + Sync>,
    handlers: Vec<ErasedHandler>,
    done: oneshot::Sender<()>,
}

struct Inner {
    handlers: RwLock<HashMap<TypeId, Vec<(SubscriptionId, ErasedHandler)>>>,
    workers: Vec<mpsc::UnboundedSender<Envelope>>,
    next_id: AtomicU64,
}

/// Cloneable handle to a shared notification pipeline.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("workers", &self.inner.workers.len())
            .finish()
    }
}

impl EventBus {
    /// Create a bus backed by `workers` delivery threads (at least one).
    ///
    /// The threads exit once every clone of the bus has been dropped.
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        let mut senders = Vec::with_capacity(workers);

        for index in 0..workers {
            let (tx, rx) = mpsc::unbounded_channel::<Envelope>();
            let spawned = thread::Builder::new()
                .name(format!("candlemc-events-{index}"))
                .spawn(move || deliver_loop(rx));
            match spawned {
                Ok(_) => senders.push(tx),
                Err(e) => error!(error = %e, index, "Failed to spawn event worker"),
            }
        }

        Self {
            inner: Arc::new(Inner {
                handlers: RwLock::new(HashMap::new()),
                workers: senders,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register `handler` for every future event of type `E`.
    pub fn subscribe<E, F>(&self, handler: F) -> SubscriptionId
    where
        E: Event,
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let erased: ErasedHandler = Arc::new(move |event: &(dyn Any + Send + Sync)| {
            if let Some(event) = event.downcast_ref::<E>() {
                handler(event);
            }
        });

        self.inner
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(TypeId::of::<E>())
            .or_default()
            .push((id, erased));
        id
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self
            .inner
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        for list in handlers.values_mut() {
            if let Some(pos) = list.iter().position(|(sid, _)| *sid == id) {
                list.remove(pos);
                return true;
            }
        }
        false
    }

    /// Hand `event` to its subscribers.
    ///
    /// Returns immediately; the [`Delivery`] resolves once every handler that was
    /// subscribed at publish time has run.
    pub fn publish<E: Event>(&self, event: E) -> Delivery {
        let (done, rx) = oneshot::channel();

        let handlers: Vec<ErasedHandler> = self
            .inner
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&TypeId::of::<E>())
            .map(|list| list.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default();

        if handlers.is_empty() || self.inner.workers.is_empty() {
            let _ = done.send(());
            return Delivery { rx };
        }

        let index = (event.partition() % self.inner.workers.len() as u64) as usize;
        let envelope = Envelope {
            event: Box::new(event),
            handlers,
            done,
        };

        if self.inner.workers[index].send(envelope).is_err() {
            // Dropping the envelope drops `done`, which resolves the delivery.
            warn!(worker = index, "Event worker is gone, notification dropped");
        }

        Delivery { rx }
    }
}

fn deliver_loop(mut rx: mpsc::UnboundedReceiver<Envelope>) {
    while let Some(envelope) = rx.blocking_recv() {
        for handler in &envelope.handlers {
            let event = envelope.event.as_ref();
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                error!("Event handler panicked");
            }
        }
        let _ = envelope.done.send(());
    }
    debug!("Event worker shutting down");
}

/// Completion signal for one published event.
///
/// Await it from async code, or call [`Delivery::wait_blocking`] from a plain thread.
#[derive(Debug)]
pub struct Delivery {
    rx: oneshot::Receiver<()>,
}

impl Delivery {
    /// Block the current thread until delivery completes.
    ///
    /// Must not be called from inside an async runtime.
    pub fn wait_blocking(self) {
        let _ = self.rx.blocking_recv();
    }
}

impl Future for Delivery {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        Pin::new(&mut self.rx).poll(cx).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug)]
    struct Numbered {
        key: u64,
        seq: u32,
    }

    impl Event for Numbered {
        fn partition(&self) -> u64 {
            self.key
        }
    }

    struct Other;
    impl Event for Other {}

    #[test]
    fn test_publish_without_subscribers_completes() {
        let bus = EventBus::new(1);
        bus.publish(Other).wait_blocking();
    }

    #[test]
    fn test_handlers_only_see_their_type() {
        let bus = EventBus::new(2);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.subscribe(move |e: &Numbered| sink.lock().unwrap().push(e.seq));

        bus.publish(Other).wait_blocking();
        bus.publish(Numbered { key: 1, seq: 7 }).wait_blocking();

        assert_eq!(*seen.lock().unwrap(), vec![7]);
    }

    #[test]
    fn test_same_partition_preserves_order() {
        let bus = EventBus::new(4);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.subscribe(move |e: &Numbered| sink.lock().unwrap().push(e.seq));

        let mut last = None;
        for seq in 0..200 {
            last = Some(bus.publish(Numbered { key: 42, seq }));
        }
        last.unwrap().wait_blocking();

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, (0..200).collect::<Vec<_>>());
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = EventBus::new(1);
        let count = Arc::new(AtomicU64::new(0));
        let counter = count.clone();
        let id = bus.subscribe(move |_: &Other| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(Other).wait_blocking();
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(Other).wait_blocking();

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_handler_does_not_kill_worker() {
        let bus = EventBus::new(1);
        let count = Arc::new(AtomicU64::new(0));
        bus.subscribe(|_: &Other| panic!("boom"));
        let counter = count.clone();
        bus.subscribe(move |_: &Other| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(Other).wait_blocking();
        bus.publish(Other).wait_blocking();

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_delivery_is_awaitable() {
        let bus = EventBus::new(1);
        let count = Arc::new(AtomicU64::new(0));
        let counter = count.clone();
        bus.subscribe(move |_: &Other| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(Other).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
