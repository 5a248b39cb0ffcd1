//! In-process channel: synchronous broadcast delivery per partition.
//!
//! Delivery is immediate and runs on the sender's thread: `send` snapshots
//! the partition's subscriber list, releases the lock, then invokes each
//! handler in subscription order. The snapshot makes fan-out safe against
//! handlers that re-enter the channel — a responder sends its response from
//! inside the delivery of the request — and against subscribe/unsubscribe
//! racing an in-flight broadcast.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::channel::{Channel, Subscriber, SubscriptionId};
use crate::protocol::Envelope;

#[derive(Clone)]
struct SubscriberEntry {
    id: SubscriptionId,
    agent_id: String,
    handler: Subscriber,
}

struct LogEntry {
    agent_id: String,
    name: String,
}

#[derive(Default)]
struct Partition {
    subscribers: Vec<SubscriberEntry>,
    /// Ordered registration history for agents still present.
    log: Vec<LogEntry>,
}

/// Shared in-process channel. One instance can host any number of isolated
/// partitions; agents on different partitions never see each other.
#[derive(Default)]
pub struct LocalChannel {
    partitions: Mutex<HashMap<String, Partition>>,
    next_subscription: AtomicU64,
}

impl LocalChannel {
    /// Create an empty channel with no partitions.
    pub fn new() -> Self {
        Self::default()
    }

    fn with_partition<R>(&self, partition: &str, f: impl FnOnce(&mut Partition) -> R) -> R {
        let mut partitions = self.partitions.lock();
        f(partitions.entry(partition.to_string()).or_default())
    }
}

impl Channel for LocalChannel {
    fn subscribe(
        &self,
        partition: &str,
        agent_id: &str,
        subscriber: Subscriber,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.with_partition(partition, |p| {
            p.subscribers.push(SubscriberEntry {
                id,
                agent_id: agent_id.to_string(),
                handler: subscriber,
            });
        });
        log::debug!("[LocalChannel] {agent_id} subscribed on partition `{partition}`");
        id
    }

    fn unsubscribe(&self, partition: &str, subscription: SubscriptionId) {
        self.with_partition(partition, |p| {
            p.subscribers.retain(|s| s.id != subscription);
        });
    }

    fn send(&self, partition: &str, envelope: &Envelope) {
        // Snapshot before fan-out; handlers may re-enter `send`.
        let subscribers: Vec<SubscriberEntry> = {
            let mut partitions = self.partitions.lock();
            match partitions.get_mut(partition) {
                Some(p) => p.subscribers.clone(),
                None => {
                    log::warn!("[LocalChannel] send on unknown partition `{partition}`");
                    return;
                }
            }
        };
        for entry in subscribers {
            (entry.handler)(envelope);
        }
    }

    fn register(&self, partition: &str, agent_id: &str, name: &str) {
        self.with_partition(partition, |p| {
            let seen = p
                .log
                .iter()
                .any(|e| e.agent_id == agent_id && e.name == name);
            if !seen {
                p.log.push(LogEntry {
                    agent_id: agent_id.to_string(),
                    name: name.to_string(),
                });
            }
        });
        log::trace!("[LocalChannel] registered `{agent_id}.{name}` on `{partition}`");
    }

    fn unregister(&self, partition: &str, agent_id: &str, name: &str) {
        self.with_partition(partition, |p| {
            p.log
                .retain(|e| !(e.agent_id == agent_id && e.name == name));
        });
    }

    fn unregister_agent(&self, partition: &str, agent_id: &str) {
        self.with_partition(partition, |p| {
            p.log.retain(|e| e.agent_id != agent_id);
        });
    }

    fn first_registrant(&self, partition: &str, name: &str) -> Option<String> {
        let partitions = self.partitions.lock();
        partitions.get(partition).and_then(|p| {
            p.log
                .iter()
                .find(|e| e.name == name)
                .map(|e| e.agent_id.clone())
        })
    }

    fn agent_ids(&self, partition: &str) -> Vec<String> {
        let partitions = self.partitions.lock();
        partitions
            .get(partition)
            .map(|p| p.subscribers.iter().map(|s| s.agent_id.clone()).collect())
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{RequestEnvelope, RequestKind};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use uuid::Uuid;

    fn probe() -> Envelope {
        Envelope::Request(RequestEnvelope {
            request_id: Uuid::new_v4(),
            target: None,
            name: "probe".into(),
            args: vec![],
            kind: RequestKind::Publish,
        })
    }

    #[test]
    fn test_send_reaches_every_subscriber_on_partition() {
        let channel = LocalChannel::new();
        let hits = Arc::new(AtomicUsize::new(0));
        for agent in ["a", "b", "c"] {
            let hits = hits.clone();
            channel.subscribe(
                "default",
                agent,
                Arc::new(move |_| {
                    hits.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }
        channel.send("default", &probe());
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_partitions_are_isolated() {
        let channel = LocalChannel::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        channel.subscribe(
            "g1",
            "a",
            Arc::new(move |_| {
                h.fetch_add(1, Ordering::SeqCst);
            }),
        );
        channel.send("g2", &probe());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(channel.agent_ids("g2").is_empty());
        assert_eq!(channel.agent_ids("g1"), vec!["a"]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let channel = LocalChannel::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let sub = channel.subscribe(
            "default",
            "a",
            Arc::new(move |_| {
                h.fetch_add(1, Ordering::SeqCst);
            }),
        );
        channel.send("default", &probe());
        channel.unsubscribe("default", sub);
        channel.send("default", &probe());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_first_registrant_follows_log_order() {
        let channel = LocalChannel::new();
        channel.register("default", "fn3a", "fn3");
        channel.register("default", "fn3b", "fn3");
        assert_eq!(
            channel.first_registrant("default", "fn3").as_deref(),
            Some("fn3a")
        );

        // Duplicate registration does not reorder.
        channel.register("default", "fn3a", "fn3");
        assert_eq!(
            channel.first_registrant("default", "fn3").as_deref(),
            Some("fn3a")
        );

        // First registrant leaving promotes the next.
        channel.unregister("default", "fn3a", "fn3");
        assert_eq!(
            channel.first_registrant("default", "fn3").as_deref(),
            Some("fn3b")
        );
    }

    #[test]
    fn test_unregister_agent_clears_all_names() {
        let channel = LocalChannel::new();
        channel.register("default", "a", "x");
        channel.register("default", "a", "y");
        channel.register("default", "b", "y");
        channel.unregister_agent("default", "a");
        assert_eq!(channel.first_registrant("default", "x"), None);
        assert_eq!(channel.first_registrant("default", "y").as_deref(), Some("b"));
    }

    #[test]
    fn test_reentrant_send_from_handler() {
        let channel = Arc::new(LocalChannel::new());
        let hits = Arc::new(AtomicUsize::new(0));

        let inner_hits = hits.clone();
        channel.subscribe(
            "default",
            "sink",
            Arc::new(move |env| {
                if let Envelope::Request(req) = env {
                    if req.name == "inner" {
                        inner_hits.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }),
        );

        let chan = channel.clone();
        channel.subscribe(
            "default",
            "relay",
            Arc::new(move |env| {
                if let Envelope::Request(req) = env {
                    if req.name == "probe" {
                        chan.send(
                            "default",
                            &Envelope::Request(RequestEnvelope {
                                request_id: Uuid::new_v4(),
                                target: None,
                                name: "inner".into(),
                                args: vec![],
                                kind: RequestKind::Publish,
                            }),
                        );
                    }
                }
            }),
        );

        channel.send("default", &probe());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
