//! Strongly-typed event channels used to decouple the entity layer from the audio bridge.
//! - publish() is thread-safe and enqueues events.
//! - drain() is called by the owner (control loop) to deliver events deterministically.
//! - subscribe() returns an id; unsubscribe(id) removes the handler before the next drain.

use crossbeam_queue::SegQueue;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub type SubscriptionId = u64;

pub trait EventPayload: Send + Sync + 'static {}
impl<T: Send + Sync + 'static> EventPayload for T {}

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// A single-type event channel. One channel per event kind replaces a
/// type-erased bus, so handlers never downcast.
pub struct EventChannel<T: EventPayload> {
    queue: SegQueue<T>,
    subscribers: RwLock<Vec<(SubscriptionId, Handler<T>)>>,
    next_sub_id: AtomicU64,
}

impl<T: EventPayload> EventChannel<T> {
    pub fn new() -> Self {
        Self {
            queue: SegQueue::new(),
            subscribers: RwLock::new(Vec::new()),
            next_sub_id: AtomicU64::new(1),
        }
    }

    /// Enqueue an event for the next drain. Never blocks.
    pub fn publish(&self, payload: T) {
        self.queue.push(payload);
    }

    /// Subscribe a handler. Returns a SubscriptionId for later unsubscription.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let sub_id = self.next_sub_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().push((sub_id, Arc::new(handler)));
        sub_id
    }

    /// Remove a handler. Returns false if the id was not subscribed.
    pub fn unsubscribe(&self, subscription_id: SubscriptionId) -> bool {
        let mut subs = self.subscribers.write();
        let before = subs.len();
        subs.retain(|(id, _)| *id != subscription_id);
        subs.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Number of queued, undelivered events.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain queued events in publish order and invoke handlers synchronously
    /// on the caller thread. Returns the number of events drained.
    pub fn drain(&self) -> usize {
        let mut events = Vec::new();
        while let Some(ev) = self.queue.pop() {
            events.push(ev);
        }

        // Snapshot handlers so a handler may (un)subscribe without deadlocking.
        let handlers: Vec<Handler<T>> = self
            .subscribers
            .read()
            .iter()
            .map(|(_, h)| h.clone())
            .collect();

        let count = events.len();
        for ev in events {
            for handler in &handlers {
                handler(&ev);
            }
        }
        count
    }
}

impl<T: EventPayload> Default for EventChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    #[derive(Debug, PartialEq)]
    struct Ping(i32);

    #[test]
    fn publish_and_subscribe() {
        let channel = EventChannel::<Ping>::new();
        let called = Arc::new(Mutex::new(Vec::new()));
        let c2 = called.clone();
        channel.subscribe(move |p| c2.lock().unwrap().push(p.0));
        channel.publish(Ping(42));
        assert_eq!(channel.drain(), 1);
        assert_eq!(called.lock().unwrap().as_slice(), &[42]);
    }

    #[test]
    fn multiple_subscribers_and_unsubscribe() {
        let channel = EventChannel::<Ping>::new();
        let a = Arc::new(Mutex::new(Vec::new()));
        let b = Arc::new(Mutex::new(Vec::new()));
        let id1 = channel.subscribe({
            let a = a.clone();
            move |p| a.lock().unwrap().push(p.0)
        });
        let _id2 = channel.subscribe({
            let b = b.clone();
            move |p| b.lock().unwrap().push(p.0)
        });
        channel.publish(Ping(1));
        channel.publish(Ping(2));
        channel.drain();
        assert_eq!(&*a.lock().unwrap(), &[1, 2]);
        assert_eq!(&*b.lock().unwrap(), &[1, 2]);

        assert!(channel.unsubscribe(id1));
        assert!(!channel.unsubscribe(id1));
        assert_eq!(channel.subscriber_count(), 1);

        channel.publish(Ping(3));
        channel.drain();
        assert_eq!(&*a.lock().unwrap(), &[1, 2]);
        assert_eq!(&*b.lock().unwrap(), &[1, 2, 3]);
    }

    #[test]
    fn events_drain_in_publish_order_across_threads() {
        let channel = Arc::new(EventChannel::<u32>::new());
        let out = Arc::new(Mutex::new(Vec::new()));
        let out2 = out.clone();
        channel.subscribe(move |v| out2.lock().unwrap().push(*v));

        std::thread::spawn({
            let channel = channel.clone();
            move || (0..3).for_each(|v| channel.publish(v))
        })
        .join()
        .unwrap();
        channel.publish(3);
        assert_eq!(channel.len(), 4);

        assert_eq!(channel.drain(), 4);
        assert!(channel.is_empty());
        assert_eq!(*out.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn handler_can_unsubscribe_itself_during_drain() {
        let channel = Arc::new(EventChannel::<u8>::new());
        let hits = Arc::new(AtomicUsize::new(0));
        let id_slot = Arc::new(AtomicU64::new(0));
        let id = channel.subscribe({
            let channel = channel.clone();
            let hits = hits.clone();
            let id_slot = id_slot.clone();
            move |_| {
                hits.fetch_add(1, Ordering::Relaxed);
                channel.unsubscribe(id_slot.load(Ordering::Relaxed));
            }
        });
        id_slot.store(id, Ordering::Relaxed);

        channel.publish(1);
        channel.drain();
        channel.publish(2);
        channel.drain();
        assert_eq!(hits.load(Ordering::Relaxed), 1);
    }
}
