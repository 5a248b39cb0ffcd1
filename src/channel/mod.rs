//! Channel abstraction: a partitionable broadcast medium.
//!
//! A channel hosts independent partitions keyed by `channelId`. Every
//! envelope sent on a partition is delivered to every current subscriber of
//! that partition, in subscription order; partitions never leak into each
//! other. Dispatchers must tolerate receiving their own broadcasts — a
//! self-call is an ordinary channel hop.
//!
//! Beyond delivery, each partition keeps an explicit ordered registration
//! log. Unqualified-name resolution ("first registrant answers") is a pure
//! function over that log rather than over message-arrival races, which
//! keeps responder selection deterministic. The log also records which agent
//! ids are addressable on the partition, backing qualified-address parsing.
//! A distributed channel implementation would replicate the log with its own
//! coordination; the in-process [`LocalChannel`] keeps it in memory.

mod local;

pub use local::LocalChannel;

use std::sync::Arc;

use crate::protocol::Envelope;

/// Handler invoked once per envelope delivered on a subscribed partition.
pub type Subscriber = Arc<dyn Fn(&Envelope) + Send + Sync>;

/// Opaque handle identifying one subscription, for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(crate) u64);

/// A partitioned broadcast medium with a per-partition registration log.
pub trait Channel: Send + Sync {
    /// Subscribe `agent_id`'s handler to a partition. The handler runs once
    /// per delivered envelope, in delivery order.
    fn subscribe(&self, partition: &str, agent_id: &str, subscriber: Subscriber)
        -> SubscriptionId;

    /// Remove a subscription. Unknown ids are ignored.
    fn unsubscribe(&self, partition: &str, subscription: SubscriptionId);

    /// Broadcast an envelope to every current subscriber of the partition.
    fn send(&self, partition: &str, envelope: &Envelope);

    /// Append a registration to the partition's ordered log. Re-registering
    /// the same `(agent_id, name)` pair is a no-op.
    fn register(&self, partition: &str, agent_id: &str, name: &str);

    /// Remove one `(agent_id, name)` entry from the partition's log.
    fn unregister(&self, partition: &str, agent_id: &str, name: &str);

    /// Remove every log entry and presence record for an agent (teardown).
    fn unregister_agent(&self, partition: &str, agent_id: &str);

    /// The agent that registered `name` earliest among agents still present
    /// on the partition. This is the unique unqualified responder.
    fn first_registrant(&self, partition: &str, name: &str) -> Option<String>;

    /// Ids of all agents currently subscribed on the partition.
    fn agent_ids(&self, partition: &str) -> Vec<String>;
}
