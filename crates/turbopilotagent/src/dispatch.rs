//! Per-session fan-out of events to subscribers
//!
//! Every subscriber owns an unbounded queue drained by its own task, so a
//! slow or panicking handler never delays the others or the session's router.
//! Delivery is serialized and in emission order per subscriber, concurrent
//! across subscribers.

use futures::StreamExt;
use futures::stream::BoxStream;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::{mpsc, oneshot};
use turbopilot_protocol::SessionEvent;
use uuid::Uuid;

/// Receives session events
///
/// Implemented for every `Fn(&SessionEvent) + Send + Sync + 'static`.
pub trait EventSubscriber: Send + Sync + 'static {
    /// Handle one event
    fn on_event(&self, event: &SessionEvent);
}

impl<F> EventSubscriber for F
where
    F: Fn(&SessionEvent) + Send + Sync + 'static,
{
    fn on_event(&self, event: &SessionEvent) {
        self(event)
    }
}

enum Delivery {
    Event(Arc<SessionEvent>),
    Flush(oneshot::Sender<()>),
}

struct Slot {
    id: Uuid,
    tx: mpsc::UnboundedSender<Delivery>,
}

/// Fans events out to the subscribers of one session
pub(crate) struct EventDispatcher {
    slots: Mutex<Vec<Slot>>,
    closed: AtomicBool,
}

impl EventDispatcher {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            slots: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    fn attach(self: &Arc<Self>) -> (Subscription, mpsc::UnboundedReceiver<Delivery>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        // A closed dispatcher hands out a detached queue that simply ends.
        if !self.closed.load(Ordering::Acquire)
            && let Ok(mut slots) = self.slots.lock()
        {
            slots.push(Slot { id, tx });
        }
        let subscription = Subscription {
            id,
            dispatcher: Arc::downgrade(self),
        };
        (subscription, rx)
    }

    /// Attach a handler running on its own delivery task
    pub(crate) fn subscribe<S: EventSubscriber>(self: &Arc<Self>, subscriber: S) -> Subscription {
        let (subscription, mut rx) = self.attach();
        let id = subscription.id;

        tokio::spawn(async move {
            while let Some(delivery) = rx.recv().await {
                match delivery {
                    Delivery::Event(event) => {
                        let handled =
                            catch_unwind(AssertUnwindSafe(|| subscriber.on_event(&event)));
                        if handled.is_err() {
                            tracing::warn!(
                                subscription = %id,
                                kind = %event.kind(),
                                "Event subscriber panicked"
                            );
                        }
                    }
                    Delivery::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            tracing::trace!(subscription = %id, "Subscriber delivery ended");
        });

        subscription
    }

    /// Attach a stream consumer; the slot is pruned once the stream is dropped
    pub(crate) fn stream(self: &Arc<Self>) -> BoxStream<'static, SessionEvent> {
        let (_subscription, rx) = self.attach();
        futures::stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await? {
                    Delivery::Event(event) => {
                        let event = Arc::unwrap_or_clone(event);
                        return Some((event, rx));
                    }
                    Delivery::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
        })
        .boxed()
    }

    /// Queue an event for every live subscriber
    pub(crate) fn dispatch(&self, event: impl Into<Arc<SessionEvent>>) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let event = event.into();
        if let Ok(mut slots) = self.slots.lock() {
            slots.retain(|slot| slot.tx.send(Delivery::Event(event.clone())).is_ok());
        }
    }

    /// Resolve once every handler has processed the events queued so far
    pub(crate) async fn flush(&self) {
        let waits: Vec<_> = match self.slots.lock() {
            Ok(slots) => slots
                .iter()
                .filter_map(|slot| {
                    let (done, wait) = oneshot::channel();
                    slot.tx.send(Delivery::Flush(done)).ok().map(|_| wait)
                })
                .collect(),
            Err(_) => Vec::new(),
        };
        for wait in waits {
            let _ = wait.await;
        }
    }

    fn detach(&self, id: Uuid) {
        if let Ok(mut slots) = self.slots.lock() {
            slots.retain(|slot| slot.id != id);
        }
    }

    /// Stop accepting events; queued deliveries still drain
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if let Ok(mut slots) = self.slots.lock() {
            slots.clear();
        }
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.slots.lock().map(|slots| slots.len()).unwrap_or(0)
    }
}

/// Handle to an attached subscriber
///
/// Dropping the handle leaves the subscriber attached; call
/// [`Subscription::unsubscribe`] to stop delivery.
#[derive(Debug)]
pub struct Subscription {
    id: Uuid,
    dispatcher: Weak<EventDispatcher>,
}

impl Subscription {
    /// Unique id of this subscription
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Stop delivering events to this subscriber
    ///
    /// Events already queued for it are still handled.
    pub fn unsubscribe(self) {
        if let Some(dispatcher) = self.dispatcher.upgrade() {
            dispatcher.detach(self.id);
        }
    }
}
