//! Agent facade: the sole object exposed to calling code.
//!
//! An [`Agent`] joins a channel partition at construction, exposes an
//! initial set of bindings, and from then on every call/publish/get/set/
//! delete/enumerate operation funnels through it. The addressing grammar is
//! explicit string logic here:
//!
//! - a trailing `!` marks a fire-and-forget publish (`"fn4!"`),
//! - a `<agentId>.<name>` prefix targets a specific agent (`"fn3b.fn3"`),
//!   recognized only when the left part names an agent currently subscribed
//!   on this partition — otherwise the whole string is an unqualified name,
//! - anything else is an unqualified call answered by the partition's first
//!   registrant of the name.
//!
//! Registration (`set`/`delete`) is local and takes effect immediately;
//! discovery (`sync_registrations`) is the only operation that queries other
//! agents, and its snapshot goes stale until re-invoked. Dropping an agent
//! detaches it from the partition: its subscriber is removed, its
//! registration-log entries disappear, and a later registrant of a shared
//! name becomes the unqualified responder.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use uuid::Uuid;

use crate::channel::{Channel, SubscriptionId};
use crate::dispatcher::Dispatcher;
use crate::errors::AxError;
use crate::registry::Binding;

/// Default deadline for call responses.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(200);

/// Default collection window for discovery answers.
pub const DEFAULT_DISCOVERY_WINDOW: Duration = Duration::from_millis(50);

/// Partition used when no `channel_id` is supplied at construction.
pub const DEFAULT_PARTITION: &str = "default";

/// Construction options for an [`Agent`].
#[derive(Debug, Clone, Default)]
pub struct AgentOptions {
    /// Agent id; auto-generated (unique within the process) when unset.
    pub id: Option<String>,
    /// Channel partition to join; [`DEFAULT_PARTITION`] when unset.
    pub channel_id: Option<String>,
    /// Call deadline; [`DEFAULT_TIMEOUT`] when unset.
    pub timeout: Option<Duration>,
    /// Discovery collection window; [`DEFAULT_DISCOVERY_WINDOW`] when unset.
    pub discovery_window: Option<Duration>,
}

/// An agent on a channel partition, exposing named bindings and able to
/// invoke any binding reachable on the partition.
pub struct Agent {
    id: String,
    partition: String,
    channel: Arc<dyn Channel>,
    dispatcher: Arc<Dispatcher>,
    subscription: SubscriptionId,
    /// Last discovery snapshot: agent id → exposed names as declared.
    regs: Mutex<HashMap<String, Vec<String>>>,
}

impl Agent {
    /// Join a channel partition, exposing `bindings` in declaration order.
    ///
    /// Fails with [`AxError::InvalidName`] if any binding name cannot
    /// participate in the addressing grammar.
    pub fn connect<S, I>(
        bindings: I,
        channel: Arc<dyn Channel>,
        options: AgentOptions,
    ) -> Result<Agent, AxError>
    where
        S: Into<String>,
        I: IntoIterator<Item = (S, Binding)>,
    {
        let id = options
            .id
            .unwrap_or_else(|| format!("agent-{}", Uuid::new_v4()));
        let partition = options
            .channel_id
            .unwrap_or_else(|| DEFAULT_PARTITION.to_string());

        let mut staged = Vec::new();
        for (name, binding) in bindings {
            let name = name.into();
            validate_name(&name)?;
            staged.push((name, binding));
        }

        let dispatcher = Arc::new(Dispatcher::new(
            &id,
            &partition,
            channel.clone(),
            options.timeout.unwrap_or(DEFAULT_TIMEOUT),
            options.discovery_window.unwrap_or(DEFAULT_DISCOVERY_WINDOW),
        ));
        let inbox = dispatcher.clone();
        let subscription = channel.subscribe(&partition, &id, Arc::new(move |env| inbox.handle(env)));
        for (name, binding) in staged {
            dispatcher.bind(&name, binding);
        }

        Ok(Agent {
            id,
            partition,
            channel,
            dispatcher,
            subscription,
            regs: Mutex::new(HashMap::new()),
        })
    }

    /// This agent's id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The partition this agent is subscribed on.
    pub fn channel_id(&self) -> &str {
        &self.partition
    }

    // -----------------------------------------------------------------------
    // Invocation
    // -----------------------------------------------------------------------

    /// Invoke a name reachable on the partition and await the result.
    ///
    /// Zero arguments on a value binding reads it; exactly one argument
    /// writes it and returns the new value. A trailing `!` degrades the call
    /// to a publish, which resolves immediately with `Value::Null`.
    pub async fn call(&self, name: &str, args: Vec<Value>) -> Result<Value, AxError> {
        if let Some(stripped) = name.strip_suffix('!') {
            self.publish(stripped, args);
            return Ok(Value::Null);
        }
        let (target, name) = self.split_address(name);
        self.dispatcher.call(target, &name, args).await
    }

    /// Read a value binding (zero-argument call).
    pub async fn get(&self, name: &str) -> Result<Value, AxError> {
        self.call(name, vec![]).await
    }

    /// Fire-and-forget: every owner of the name on the partition (or only
    /// the qualified target) runs its binding. Returns immediately; a
    /// trailing `!` is accepted and ignored.
    pub fn publish(&self, name: &str, args: Vec<Value>) {
        let name = name.strip_suffix('!').unwrap_or(name);
        let (target, name) = self.split_address(name);
        self.dispatcher.publish(target, &name, args);
    }

    // -----------------------------------------------------------------------
    // Local registration table
    // -----------------------------------------------------------------------

    /// Add or replace a local binding; addressable as `name` and
    /// `<id>.name` from anywhere on the partition as soon as this returns.
    pub fn set(&self, name: &str, binding: impl Into<Binding>) -> Result<(), AxError> {
        validate_name(name)?;
        self.dispatcher.bind(name, binding.into());
        Ok(())
    }

    /// Remove a local binding. Subsequent calls addressed at it time out.
    pub fn delete(&self, name: &str) -> bool {
        self.dispatcher.unbind(name)
    }

    /// Local membership test; does not query remote agents.
    pub fn has(&self, name: &str) -> bool {
        self.dispatcher.has(name)
    }

    /// Locally registered names in declaration order.
    pub fn keys(&self) -> Vec<String> {
        self.dispatcher.keys()
    }

    // -----------------------------------------------------------------------
    // Discovery
    // -----------------------------------------------------------------------

    /// Broadcast a discovery probe, collect every live agent's exposed name
    /// list for the configured window, and cache the snapshot.
    pub async fn sync_registrations(&self) -> HashMap<String, Vec<String>> {
        let snapshot: HashMap<String, Vec<String>> =
            self.dispatcher.discover().await.into_iter().collect();
        *self.regs.lock() = snapshot.clone();
        snapshot
    }

    /// The last discovery snapshot. Not kept fresh automatically; call
    /// [`sync_registrations`](Self::sync_registrations) to refresh.
    pub fn registrations(&self) -> HashMap<String, Vec<String>> {
        self.regs.lock().clone()
    }

    // -----------------------------------------------------------------------
    // Addressing
    // -----------------------------------------------------------------------

    /// Split on the first `.`: qualified when the left part names an agent
    /// subscribed on this partition and the right part is non-empty.
    fn split_address(&self, name: &str) -> (Option<String>, String) {
        if let Some((left, right)) = name.split_once('.') {
            if !right.is_empty()
                && self
                    .channel
                    .agent_ids(&self.partition)
                    .iter()
                    .any(|id| id == left)
            {
                return (Some(left.to_string()), right.to_string());
            }
        }
        (None, name.to_string())
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        self.channel.unsubscribe(&self.partition, self.subscription);
        self.channel.unregister_agent(&self.partition, &self.id);
        log::debug!("[Agent:{}] detached from partition `{}`", self.id, self.partition);
    }
}

/// Names must survive the addressing grammar: non-empty, no qualified
/// separator, no publish suffix.
fn validate_name(name: &str) -> Result<(), AxError> {
    if name.is_empty() || name.contains('.') || name.contains('!') {
        return Err(AxError::InvalidName(name.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
