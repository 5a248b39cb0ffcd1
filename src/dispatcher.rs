//! Protocol engine bridging the agent facade and the channel.
//!
//! Outbound, the dispatcher builds request envelopes, parks a oneshot sender
//! in the pending map *before* broadcasting (the in-process channel may
//! deliver the response synchronously, inside `send`), then awaits the
//! response under a deadline. First outcome wins: a response resolves the
//! pending entry, the deadline elapsing removes it, and the loser of the
//! race is ignored — late responses are dropped silently.
//!
//! Inbound, it answers requests the resolution rule assigns to this agent:
//! the qualified target if addressed, the partition's first registrant of
//! the name otherwise. A call for a name this agent does not own gets no
//! answer at all; silence is the not-found signal and surfaces as the
//! requester's timeout. Discovery is the exception — every agent answers,
//! even with an empty name list.
//!
//! Binding failures never cross the process boundary as panics: execution
//! is wrapped in `catch_unwind` and failures travel back as an error
//! response to exactly the awaiting requester.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::channel::Channel;
use crate::errors::AxError;
use crate::protocol::{Envelope, RequestEnvelope, RequestKind, ResponseBody, ResponseEnvelope};
use crate::registry::{Binding, Registry};

/// Outcome delivered to a pending call: responder id plus its result.
type CallOutcome = (String, Result<Value, String>);

/// Per-agent protocol engine.
pub struct Dispatcher {
    agent_id: String,
    partition: String,
    channel: Arc<dyn Channel>,
    registry: RwLock<Registry>,
    /// Calls awaiting a response, keyed by request id.
    pending: DashMap<Uuid, oneshot::Sender<CallOutcome>>,
    /// Discovery probes still collecting answers, keyed by request id.
    discoveries: DashMap<Uuid, Vec<(String, Vec<String>)>>,
    timeout: Duration,
    discovery_window: Duration,
}

impl Dispatcher {
    /// Create a dispatcher for one agent on one partition.
    pub fn new(
        agent_id: impl Into<String>,
        partition: impl Into<String>,
        channel: Arc<dyn Channel>,
        timeout: Duration,
        discovery_window: Duration,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            partition: partition.into(),
            channel,
            registry: RwLock::new(Registry::new()),
            pending: DashMap::new(),
            discoveries: DashMap::new(),
            timeout,
            discovery_window,
        }
    }

    /// Id of the agent this dispatcher serves.
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    // -----------------------------------------------------------------------
    // Local registration table
    // -----------------------------------------------------------------------

    /// Insert or replace a local binding, mirroring new names into the
    /// partition's registration log.
    pub fn bind(&self, name: &str, binding: Binding) {
        let is_new = self.registry.write().insert(name, binding);
        if is_new {
            self.channel.register(&self.partition, &self.agent_id, name);
        }
    }

    /// Remove a local binding and its registration-log entry.
    pub fn unbind(&self, name: &str) -> bool {
        let removed = self.registry.write().remove(name).is_some();
        if removed {
            self.channel
                .unregister(&self.partition, &self.agent_id, name);
        }
        removed
    }

    /// Local membership test; never queries remote agents.
    pub fn has(&self, name: &str) -> bool {
        self.registry.read().contains(name)
    }

    /// Locally registered names in declaration order.
    pub fn keys(&self) -> Vec<String> {
        self.registry.read().keys()
    }

    // -----------------------------------------------------------------------
    // Outbound
    // -----------------------------------------------------------------------

    /// Issue a call and await its response or the deadline.
    pub async fn call(
        &self,
        target: Option<String>,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Value, AxError> {
        let request_id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        // Parked before the send: a synchronous channel resolves the entry
        // while `send` is still on the stack.
        self.pending.insert(request_id, tx);
        self.channel.send(
            &self.partition,
            &Envelope::Request(RequestEnvelope {
                request_id,
                target,
                name: name.to_string(),
                args,
                kind: RequestKind::Call,
            }),
        );

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok((_responder, Ok(value)))) => Ok(value),
            Ok(Ok((responder, Err(message)))) => {
                Err(AxError::RemoteExecution { responder, message })
            }
            Ok(Err(_closed)) => {
                self.pending.remove(&request_id);
                Err(AxError::TimedOut)
            }
            Err(_elapsed) => {
                // Deadline first: forget the entry so a late answer is
                // dropped instead of resolving a request nobody awaits.
                self.pending.remove(&request_id);
                log::debug!(
                    "[Dispatcher:{}] call `{name}` timed out after {:?}",
                    self.agent_id,
                    self.timeout
                );
                Err(AxError::TimedOut)
            }
        }
    }

    /// Broadcast a fire-and-forget publish. No pending entry, no deadline.
    pub fn publish(&self, target: Option<String>, name: &str, args: Vec<Value>) {
        self.channel.send(
            &self.partition,
            &Envelope::Request(RequestEnvelope {
                request_id: Uuid::new_v4(),
                target,
                name: name.to_string(),
                args,
                kind: RequestKind::Publish,
            }),
        );
    }

    /// Broadcast a discovery probe and collect answers for the configured
    /// window. Returns `(agent_id, names)` pairs in arrival order.
    pub async fn discover(&self) -> Vec<(String, Vec<String>)> {
        let request_id = Uuid::new_v4();
        self.discoveries.insert(request_id, Vec::new());
        self.channel.send(
            &self.partition,
            &Envelope::Request(RequestEnvelope {
                request_id,
                target: None,
                name: String::new(),
                args: vec![],
                kind: RequestKind::Discover,
            }),
        );
        tokio::time::sleep(self.discovery_window).await;
        self.discoveries
            .remove(&request_id)
            .map(|(_, collected)| collected)
            .unwrap_or_default()
    }

    // -----------------------------------------------------------------------
    // Inbound
    // -----------------------------------------------------------------------

    /// Entry point for every envelope delivered on the subscribed partition,
    /// including this agent's own broadcasts (a self-call is an ordinary
    /// channel hop).
    pub fn handle(&self, envelope: &Envelope) {
        match envelope {
            Envelope::Request(req) => self.handle_request(req),
            Envelope::Response(resp) => self.handle_response(resp),
        }
    }

    fn handle_request(&self, req: &RequestEnvelope) {
        match req.kind {
            RequestKind::Discover => {
                let names = self.registry.read().keys();
                self.respond(req.request_id, ResponseBody::Registrations(names));
            }
            RequestKind::Call => {
                if !self.answers_call(req) {
                    return;
                }
                let body = match self.execute(&req.name, &req.args) {
                    Ok(value) => ResponseBody::Ok(value),
                    Err(message) => ResponseBody::Err(message),
                };
                self.respond(req.request_id, body);
            }
            RequestKind::Publish => {
                let mine = match &req.target {
                    Some(target) => target == &self.agent_id,
                    None => true,
                };
                if !mine || !self.registry.read().contains(&req.name) {
                    return;
                }
                if let Err(message) = self.execute(&req.name, &req.args) {
                    log::warn!(
                        "[Dispatcher:{}] publish `{}` failed: {message}",
                        self.agent_id,
                        req.name
                    );
                }
            }
        }
    }

    /// Resolution rule for call requests: the qualified target answers, or
    /// the partition's first registrant of the name. A non-owner stays
    /// silent — the requester's timeout is the not-found signal.
    fn answers_call(&self, req: &RequestEnvelope) -> bool {
        let selected = match &req.target {
            Some(target) => target == &self.agent_id,
            None => {
                self.channel
                    .first_registrant(&self.partition, &req.name)
                    .as_deref()
                    == Some(self.agent_id.as_str())
            }
        };
        selected && self.registry.read().contains(&req.name)
    }

    fn handle_response(&self, resp: &ResponseEnvelope) {
        if let ResponseBody::Registrations(names) = &resp.body {
            if let Some(mut collected) = self.discoveries.get_mut(&resp.request_id) {
                collected.push((resp.responder.clone(), names.clone()));
            }
            return;
        }
        let outcome = match &resp.body {
            ResponseBody::Ok(value) => Ok(value.clone()),
            ResponseBody::Err(message) => Err(message.clone()),
            ResponseBody::Registrations(_) => return,
        };
        match self.pending.remove(&resp.request_id) {
            Some((_, tx)) => {
                // A send error means the requester already gave up; both
                // sides treat the race loser as a no-op.
                let _ = tx.send((resp.responder.clone(), outcome));
            }
            None => {
                log::trace!(
                    "[Dispatcher:{}] dropping unmatched response for {}",
                    self.agent_id,
                    resp.request_id
                );
            }
        }
    }

    /// Run a binding. Callables execute under `catch_unwind`; value bindings
    /// dispatch on arity — zero arguments reads, one argument writes and
    /// returns the new value.
    fn execute(&self, name: &str, args: &[Value]) -> Result<Value, String> {
        let binding = match self.registry.read().get(name) {
            Some(binding) => binding.clone(),
            None => return Err(format!("`{name}` is not registered")),
        };
        match binding {
            Binding::Callable(handler) => {
                match catch_unwind(AssertUnwindSafe(|| handler(args))) {
                    Ok(result) => result,
                    Err(_panic) => {
                        log::error!(
                            "[Dispatcher:{}] binding `{name}` panicked",
                            self.agent_id
                        );
                        Err(format!("binding `{name}` panicked"))
                    }
                }
            }
            Binding::Value(current) => match args.len() {
                0 => Ok(current),
                1 => {
                    let new_value = args[0].clone();
                    self.registry.write().write_value(name, new_value.clone());
                    Ok(new_value)
                }
                n => Err(format!(
                    "value binding `{name}` takes at most one argument, got {n}"
                )),
            },
        }
    }

    fn respond(&self, request_id: Uuid, body: ResponseBody) {
        self.channel.send(
            &self.partition,
            &Envelope::Response(ResponseEnvelope {
                request_id,
                responder: self.agent_id.clone(),
                body,
            }),
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
