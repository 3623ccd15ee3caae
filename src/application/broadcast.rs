//! Fan-out of server messages to every live subscriber.
//!
//! Each subscriber owns a bounded queue drained by its connection's writer
//! task. Delivery never waits: a closed or full queue means the subscriber
//! is gone or not keeping up, and it is dropped from the set.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::domain::ServerMessage;

/// Encoded JSON message shared between all queues it is delivered to
pub type Frame = Arc<str>;

/// Messages a subscriber may lag behind before it is dropped
pub const DEFAULT_QUEUE_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

#[derive(Debug)]
struct Subscriber {
    origin: String,
    sender: mpsc::Sender<Frame>,
}

/// Registry of live subscribers. Cloning shares the same registry.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    subscribers: Arc<DashMap<SubscriberId, Subscriber>>,
    next_id: Arc<AtomicU64>,
    queue_depth: usize,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::with_queue_depth(DEFAULT_QUEUE_DEPTH)
    }

    pub fn with_queue_depth(queue_depth: usize) -> Self {
        Self {
            subscribers: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU64::new(1)),
            queue_depth: queue_depth.max(1),
        }
    }

    /// Register a subscriber. It stays registered until the returned
    /// [`Subscription`] is dropped or a delivery to it fails.
    #[allow(dead_code)]
    pub fn subscribe(&self, origin: impl Into<String>) -> (Subscription, mpsc::Receiver<Frame>) {
        self.register(origin.into(), None)
    }

    /// Register a subscriber whose queue already holds `first`.
    ///
    /// The frame is enqueued before the subscriber becomes visible to
    /// [`Self::broadcast`], so nothing can overtake it.
    pub fn subscribe_with(
        &self,
        origin: impl Into<String>,
        first: &ServerMessage,
    ) -> (Subscription, mpsc::Receiver<Frame>) {
        self.register(origin.into(), Some(first))
    }

    fn register(&self, origin: String, first: Option<&ServerMessage>) -> (Subscription, mpsc::Receiver<Frame>) {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::channel(self.queue_depth);

        if let Some(message) = first {
            match message.encode() {
                // Queue is empty and depth is at least 1
                Ok(json) => {
                    let _ = sender.try_send(json.into());
                }
                Err(e) => {
                    warn!(subscriber = %id, message_type = message.type_name(), error = %e, "Failed to encode message");
                }
            }
        }

        self.subscribers.insert(
            id,
            Subscriber {
                origin: origin.clone(),
                sender,
            },
        );
        debug!(subscriber = %id, origin = %origin, "Subscriber added");

        let subscription = Subscription {
            id,
            origin,
            admitted_at: Utc::now(),
            broadcaster: self.clone(),
        };

        (subscription, receiver)
    }

    /// Deregister a subscriber. Returns whether it was still registered.
    pub fn remove_subscriber(&self, id: SubscriberId) -> bool {
        let removed = self.subscribers.remove(&id).is_some();
        if removed {
            debug!(subscriber = %id, "Subscriber removed");
        }
        removed
    }

    /// Encode once and enqueue to every subscriber. Returns how many
    /// subscribers accepted the message.
    pub fn broadcast(&self, message: &ServerMessage) -> usize {
        let frame: Frame = match message.encode() {
            Ok(json) => json.into(),
            Err(e) => {
                warn!(message_type = message.type_name(), error = %e, "Failed to encode broadcast");
                return 0;
            }
        };

        // Copy the senders out so no map shard stays locked while delivering
        let targets: Vec<(SubscriberId, mpsc::Sender<Frame>)> = self
            .subscribers
            .iter()
            .map(|entry| (*entry.key(), entry.value().sender.clone()))
            .collect();

        let mut delivered = 0;
        for (id, sender) in targets {
            if sender.try_send(frame.clone()).is_ok() {
                delivered += 1;
            } else {
                self.drop_subscriber(id);
            }
        }

        delivered
    }

    /// Deliver to a single subscriber
    pub fn send_to(&self, id: SubscriberId, message: &ServerMessage) -> bool {
        let Some(sender) = self.subscribers.get(&id).map(|s| s.sender.clone()) else {
            return false;
        };

        let frame: Frame = match message.encode() {
            Ok(json) => json.into(),
            Err(e) => {
                warn!(subscriber = %id, message_type = message.type_name(), error = %e, "Failed to encode message");
                return false;
            }
        };

        if sender.try_send(frame).is_ok() {
            true
        } else {
            self.drop_subscriber(id);
            false
        }
    }

    /// Number of live subscribers
    pub fn count(&self) -> usize {
        self.subscribers.len()
    }

    fn drop_subscriber(&self, id: SubscriberId) {
        if let Some((_, subscriber)) = self.subscribers.remove(&id) {
            debug!(subscriber = %id, origin = %subscriber.origin, "Dropped unreachable subscriber");
        }
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// Membership of one connection. Dropping it deregisters the subscriber.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    origin: String,
    admitted_at: DateTime<Utc>,
    broadcaster: Broadcaster,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn admitted_at(&self) -> DateTime<Utc> {
        self.admitted_at
    }

    /// Deliver a message to this subscriber only
    pub fn send(&self, message: &ServerMessage) -> bool {
        self.broadcaster.send_to(self.id, message)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.broadcaster.remove_subscriber(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn frame_type(frame: &Frame) -> String {
        let value: Value = serde_json::from_str(frame).unwrap();
        value["type"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_subscriber() {
        let broadcaster = Broadcaster::new();
        let (_s1, mut rx1) = broadcaster.subscribe("10.0.0.1");
        let (_s2, mut rx2) = broadcaster.subscribe("10.0.0.2");

        assert_eq!(broadcaster.broadcast(&ServerMessage::Ports(vec![])), 2);

        let f1 = rx1.recv().await.unwrap();
        let f2 = rx2.recv().await.unwrap();
        assert_eq!(frame_type(&f1), "ports");
        assert!(Arc::ptr_eq(&f1, &f2));
    }

    #[tokio::test]
    async fn test_broken_subscriber_is_dropped_without_affecting_others() {
        let broadcaster = Broadcaster::new();
        let (_healthy, mut healthy_rx) = broadcaster.subscribe("10.0.0.1");
        let (broken, broken_rx) = broadcaster.subscribe("10.0.0.2");
        drop(broken_rx);

        assert_eq!(broadcaster.count(), 2);
        assert_eq!(broadcaster.broadcast(&ServerMessage::Storage(vec![])), 1);

        assert_eq!(frame_type(&healthy_rx.recv().await.unwrap()), "storage");
        assert_eq!(broadcaster.count(), 1);
        assert!(!broadcaster.remove_subscriber(broken.id()));
    }

    #[tokio::test]
    async fn test_slow_subscriber_is_dropped_when_queue_fills() {
        let broadcaster = Broadcaster::with_queue_depth(1);
        let (_fast, mut fast_rx) = broadcaster.subscribe("10.0.0.1");
        let (_slow, _slow_rx) = broadcaster.subscribe("10.0.0.2");

        assert_eq!(broadcaster.broadcast(&ServerMessage::Ports(vec![])), 2);
        fast_rx.recv().await.unwrap();

        assert_eq!(broadcaster.broadcast(&ServerMessage::Ports(vec![])), 1);
        assert_eq!(broadcaster.count(), 1);
    }

    #[tokio::test]
    async fn test_dropping_subscription_deregisters() {
        let broadcaster = Broadcaster::new();
        let (subscription, _rx) = broadcaster.subscribe("10.0.0.1");
        let id = subscription.id();
        assert_eq!(broadcaster.count(), 1);

        drop(subscription);
        assert_eq!(broadcaster.count(), 0);
        assert!(!broadcaster.remove_subscriber(id));
    }

    #[tokio::test]
    async fn test_send_to_targets_one_subscriber() {
        let broadcaster = Broadcaster::new();
        let (s1, mut rx1) = broadcaster.subscribe("10.0.0.1");
        let (_s2, mut rx2) = broadcaster.subscribe("10.0.0.2");

        assert!(s1.send(&ServerMessage::pong()));
        assert_eq!(frame_type(&rx1.recv().await.unwrap()), "pong");
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_messages_arrive_in_broadcast_order() {
        let broadcaster = Broadcaster::new();
        let (_s, mut rx) = broadcaster.subscribe("10.0.0.1");

        broadcaster.broadcast(&ServerMessage::Ports(vec![]));
        broadcaster.broadcast(&ServerMessage::Storage(vec![]));
        broadcaster.broadcast(&ServerMessage::Services(vec![]));

        let order: Vec<String> = vec![
            frame_type(&rx.recv().await.unwrap()),
            frame_type(&rx.recv().await.unwrap()),
            frame_type(&rx.recv().await.unwrap()),
        ];
        assert_eq!(order, vec!["ports", "storage", "services"]);
    }

    #[tokio::test]
    async fn test_subscribe_with_delivers_first_frame_before_broadcasts() {
        let broadcaster = Broadcaster::new();
        let (_s, mut rx) = broadcaster.subscribe_with("10.0.0.1", &ServerMessage::pong());
        broadcaster.broadcast(&ServerMessage::Ports(vec![]));

        assert_eq!(frame_type(&rx.recv().await.unwrap()), "pong");
        assert_eq!(frame_type(&rx.recv().await.unwrap()), "ports");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_first_frame_wins_against_concurrent_broadcasts() {
        use std::sync::atomic::AtomicBool;

        let broadcaster = Broadcaster::new();
        let running = Arc::new(AtomicBool::new(true));

        let publisher = {
            let broadcaster = broadcaster.clone();
            let running = Arc::clone(&running);
            std::thread::spawn(move || {
                while running.load(Ordering::Relaxed) {
                    broadcaster.broadcast(&ServerMessage::Ports(vec![]));
                }
            })
        };

        let mut overtaken = 0;
        for _ in 0..2000 {
            let (subscription, mut rx) = broadcaster.subscribe_with("10.0.0.1", &ServerMessage::pong());
            if frame_type(&rx.recv().await.unwrap()) != "pong" {
                overtaken += 1;
            }
            drop(subscription);
        }

        running.store(false, Ordering::Relaxed);
        publisher.join().unwrap();
        assert_eq!(overtaken, 0);
    }

    #[test]
    fn test_ids_are_unique() {
        let broadcaster = Broadcaster::new();
        let (a, _ra) = broadcaster.subscribe("x");
        let (b, _rb) = broadcaster.subscribe("x");
        assert_ne!(a.id(), b.id());
        assert_eq!(a.origin(), "x");
        assert!(a.admitted_at() <= Utc::now());
    }
}
