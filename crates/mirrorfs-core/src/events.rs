//! Audit event bus.
//!
//! Every context publishes onto one shared [`AuditBus`]. Subscribers filter by
//! NATS-style subject patterns:
//! - `*` matches exactly one token: `context.*.created` matches every new context
//! - `>` matches one or more tokens (only at end): `context.>` matches everything
//! - Exact match: `context.<hex>.closed` only matches that context's close
//!
//! Subjects are `context.<hex>.created`, `context.<hex>.call` and
//! `context.<hex>.closed`, where `<hex>` is [`ContextId::to_hex`].
//!
//! Publishing never blocks and never fails: with no subscribers the event is
//! dropped, and a slow subscriber lags and skips ahead.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::flags::{FileAccess, FileMode, FileShare};
use crate::ids::ContextId;
use crate::record::CallRecord;

/// Default broadcast capacity.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Check if a subject matches a pattern.
///
/// ```
/// use mirrorfs_core::events::matches_pattern;
///
/// assert!(matches_pattern("context.*.call", "context.0190abcd.call"));
/// assert!(matches_pattern("context.>", "context.0190abcd.closed"));
/// assert!(!matches_pattern("context.*", "context.0190abcd.call"));
/// ```
pub fn matches_pattern(pattern: &str, subject: &str) -> bool {
    let pattern_tokens: Vec<&str> = pattern.split('.').collect();
    let subject_tokens: Vec<&str> = subject.split('.').collect();

    let mut pi = 0;
    let mut si = 0;

    while pi < pattern_tokens.len() && si < subject_tokens.len() {
        match pattern_tokens[pi] {
            // `>` must be last and swallows the remaining tokens
            ">" => return pi == pattern_tokens.len() - 1,
            "*" => {
                pi += 1;
                si += 1;
            }
            token => {
                if token != subject_tokens[si] {
                    return false;
                }
                pi += 1;
                si += 1;
            }
        }
    }

    pi == pattern_tokens.len() && si == subject_tokens.len()
}

/// What a subscriber learns about a context when it is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSummary {
    pub id: ContextId,
    pub path: String,
    pub process_id: u32,
    pub requestor: Option<String>,
    pub access: FileAccess,
    pub share: FileShare,
    pub mode: FileMode,
}

/// Events published by contexts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    /// A new context exists and will start producing calls.
    Created { context: ContextSummary },

    /// A record was appended, or a repeat was folded into the last one.
    ///
    /// `index` is the record's position in the context history; a folded
    /// repeat republishes the same index with a higher `repeat`.
    Call {
        context_id: ContextId,
        index: usize,
        record: CallRecord,
    },

    /// The context transitioned to closed. Fires once per context.
    Closed { context_id: ContextId, has_errors: bool },
}

impl AuditEvent {
    pub fn context_id(&self) -> ContextId {
        match self {
            Self::Created { context } => context.id,
            Self::Call { context_id, .. } | Self::Closed { context_id, .. } => *context_id,
        }
    }

    fn verb(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::Call { .. } => "call",
            Self::Closed { .. } => "closed",
        }
    }

    /// Subject string for this event.
    pub fn subject(&self) -> String {
        format!("context.{}.{}", self.context_id().to_hex(), self.verb())
    }
}

/// A message on the audit bus.
#[derive(Debug, Clone, Serialize)]
pub struct AuditMessage {
    pub subject: String,
    pub payload: AuditEvent,
    pub published_at: SystemTime,
}

impl AuditMessage {
    pub fn new(payload: AuditEvent) -> Self {
        Self {
            subject: payload.subject(),
            payload,
            published_at: SystemTime::now(),
        }
    }
}

/// Broadcast bus for audit events.
///
/// Cheap to clone; clones share the channel.
#[derive(Debug, Clone)]
pub struct AuditBus {
    tx: broadcast::Sender<AuditMessage>,
    capacity: usize,
}

impl AuditBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Publish an event. Returns how many subscribers received it.
    pub fn publish(&self, event: AuditEvent) -> usize {
        self.tx.send(AuditMessage::new(event)).unwrap_or(0)
    }

    /// Subscribe to events whose subject matches `pattern`.
    ///
    /// Only events published after this call are delivered.
    pub fn subscribe(&self, pattern: &str) -> Subscription {
        Subscription {
            pattern: pattern.to_string(),
            rx: self.tx.subscribe(),
        }
    }

    /// Subscribe to every event of one context.
    pub fn subscribe_context(&self, id: ContextId) -> Subscription {
        self.subscribe(&format!("context.{}.*", id.to_hex()))
    }
}

impl Default for AuditBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

/// A filtered view of the bus.
pub struct Subscription {
    pattern: String,
    rx: broadcast::Receiver<AuditMessage>,
}

impl Subscription {
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Wait for the next matching message. `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<AuditMessage> {
        loop {
            match self.rx.recv().await {
                Ok(msg) => {
                    if matches_pattern(&self.pattern, &msg.subject) {
                        return Some(msg);
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(n)) => self.lagged(n),
            }
        }
    }

    /// Blocking variant of [`recv`](Self::recv) for synchronous callers.
    ///
    /// Must not be called from inside an async runtime.
    pub fn blocking_recv(&mut self) -> Option<AuditMessage> {
        loop {
            match self.rx.blocking_recv() {
                Ok(msg) => {
                    if matches_pattern(&self.pattern, &msg.subject) {
                        return Some(msg);
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(n)) => self.lagged(n),
            }
        }
    }

    /// Next matching message already queued, without waiting.
    pub fn try_recv(&mut self) -> Option<AuditMessage> {
        loop {
            match self.rx.try_recv() {
                Ok(msg) => {
                    if matches_pattern(&self.pattern, &msg.subject) {
                        return Some(msg);
                    }
                }
                Err(broadcast::error::TryRecvError::Empty)
                | Err(broadcast::error::TryRecvError::Closed) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => self.lagged(n),
            }
        }
    }

    /// Everything matching that is currently queued.
    pub fn drain(&mut self) -> Vec<AuditMessage> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    fn lagged(&self, n: u64) {
        tracing::warn!(
            pattern = %self.pattern,
            lagged = n,
            "audit subscription lagged behind"
        );
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("pattern", &self.pattern)
            .finish_non_exhaustive()
    }
}
