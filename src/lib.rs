//! # ax
//!
//! Addressable agent RPC and publish/subscribe over partitioned broadcast
//! channels.
//!
//! Independent agents expose named bindings — functions, or plain values
//! addressable as zero/one-argument accessors — on a shared channel
//! partition. Any agent on the partition can invoke a binding by bare name
//! (answered by whichever agent registered it first) or by qualified
//! `<agentId>.<name>` address; a trailing `!` turns the invocation into a
//! fire-and-forget publish that fans out to every owner of the name. Agents
//! on different partitions never see each other.
//!
//! ```no_run
//! use std::sync::Arc;
//! use ax::{Agent, AgentOptions, Binding, Channel, LocalChannel};
//! use serde_json::json;
//!
//! # async fn demo() -> Result<(), ax::AxError> {
//! let channel: Arc<dyn Channel> = Arc::new(LocalChannel::new());
//!
//! let adder = Agent::connect(
//!     vec![("add", Binding::callable(|args| {
//!         Ok(json!(args[0].as_i64().unwrap_or(0) + args[1].as_i64().unwrap_or(0)))
//!     }))],
//!     channel.clone(),
//!     AgentOptions { id: Some("adder".into()), ..Default::default() },
//! )?;
//!
//! let caller = Agent::connect(Vec::<(String, Binding)>::new(), channel, AgentOptions::default())?;
//! assert_eq!(caller.call("add", vec![json!(1), json!(2)]).await?, json!(3));
//! assert_eq!(caller.call("adder.add", vec![json!(2), json!(3)]).await?, json!(5));
//! # let _ = adder;
//! # Ok(())
//! # }
//! ```
//!
//! Calls are request/response with a bounded wait (no response within the
//! deadline fails with [`AxError::TimedOut`] — a name registered nowhere is
//! indistinguishable from channel silence by design). Discovery
//! ([`Agent::sync_registrations`]) collects every live agent's exposed name
//! list into a local snapshot. Delivery is best-effort broadcast: no
//! guaranteed delivery, no cross-agent ordering, no persistence.

pub mod agent;
pub mod channel;
pub mod dispatcher;
pub mod errors;
pub mod protocol;
pub mod registry;

pub use agent::{
    Agent, AgentOptions, DEFAULT_DISCOVERY_WINDOW, DEFAULT_PARTITION, DEFAULT_TIMEOUT,
};
pub use channel::{Channel, LocalChannel, Subscriber, SubscriptionId};
pub use dispatcher::Dispatcher;
pub use errors::AxError;
pub use protocol::{Envelope, RequestEnvelope, RequestKind, ResponseBody, ResponseEnvelope};
pub use registry::{Binding, Handler, Registry};
