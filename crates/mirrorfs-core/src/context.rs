//! Per-handle request contexts and the table that owns them.
//!
//! A [`RequestContext`] lives from the open that creates it until its close.
//! It owns at most one [`RealHandle`], keeps the ordered call history of the
//! handle, and publishes onto the audit bus as records are appended.
//!
//! The owned handle sits behind its own mutex, held only for the duration of
//! one native call. Release is `take()` under that mutex, so cleanup and close
//! racing on two threads release exactly once and never reuse the handle.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::events::{AuditBus, AuditEvent, ContextSummary};
use crate::ids::ContextId;
use crate::local::RealHandle;
use crate::record::CallRecord;
use crate::types::{HostFileInfo, OpenIntent};

/// How consecutive identical records are folded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepeatPolicy {
    pub collapse: bool,
    /// Highest counter a folded record reaches; 0 means unbounded.
    pub max_repeat: u32,
}

impl Default for RepeatPolicy {
    fn default() -> Self {
        Self {
            collapse: true,
            max_repeat: 0,
        }
    }
}

impl RepeatPolicy {
    fn folds(&self, last: &CallRecord, next: &CallRecord) -> bool {
        self.collapse
            && next.is_repeat_of(last)
            && (self.max_repeat == 0 || last.repeat < self.max_repeat)
    }
}

/// Mutable state for one open handle.
#[derive(Debug)]
pub struct RequestContext {
    id: ContextId,
    process_id: u32,
    requestor: Option<String>,
    path: String,
    intent: OpenIntent,
    handle: Mutex<Option<RealHandle>>,
    history: Mutex<Vec<CallRecord>>,
    policy: RepeatPolicy,
    bus: AuditBus,
    has_errors: AtomicBool,
    closed: AtomicBool,
    file_existed: AtomicBool,
    been_read: AtomicBool,
    been_written: AtomicBool,
}

impl RequestContext {
    /// Create a context and publish its creation.
    pub fn open(
        host: &HostFileInfo,
        path: &str,
        intent: OpenIntent,
        policy: RepeatPolicy,
        bus: AuditBus,
    ) -> Arc<Self> {
        let ctx = Arc::new(Self {
            id: ContextId::new(),
            process_id: host.process_id,
            requestor: host.requestor.clone(),
            path: path.to_string(),
            intent,
            handle: Mutex::new(None),
            history: Mutex::new(Vec::new()),
            policy,
            bus,
            has_errors: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            file_existed: AtomicBool::new(false),
            been_read: AtomicBool::new(false),
            been_written: AtomicBool::new(false),
        });
        ctx.bus.publish(AuditEvent::Created {
            context: ctx.summary(),
        });
        ctx
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn process_id(&self) -> u32 {
        self.process_id
    }

    pub fn requestor(&self) -> Option<&str> {
        self.requestor.as_deref()
    }

    /// Request path as the host sent it at open. Audit only: verbs resolve
    /// the path they are handed, which differs after a rename.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn intent(&self) -> &OpenIntent {
        &self.intent
    }

    pub fn summary(&self) -> ContextSummary {
        ContextSummary {
            id: self.id,
            path: self.path.clone(),
            process_id: self.process_id,
            requestor: self.requestor.clone(),
            access: self.intent.access,
            share: self.intent.share,
            mode: self.intent.mode,
        }
    }

    // ---- owned handle ----

    /// Give the context its handle. A handle already attached is released.
    pub fn attach(&self, handle: RealHandle) {
        let previous = self.handle.lock().replace(handle);
        drop(previous);
    }

    pub fn has_handle(&self) -> bool {
        self.handle.lock().is_some()
    }

    /// Run `f` on the owned handle while holding it exclusively.
    ///
    /// Returns `None` when there is no handle (never opened, or released).
    pub fn with_handle<R>(&self, f: impl FnOnce(&mut RealHandle) -> R) -> Option<R> {
        let mut guard = self.handle.lock();
        guard.as_mut().map(f)
    }

    /// Drop the owned handle. Returns whether this call did the release.
    pub fn release(&self) -> bool {
        let taken = self.handle.lock().take();
        let released = taken.is_some();
        drop(taken);
        if released {
            tracing::trace!(context = %self.id, path = %self.path, "released handle");
        }
        released
    }

    // ---- history ----

    /// Append `record`, or fold it into the last record as a repeat.
    ///
    /// The call event is published under the history lock so per-context
    /// subscribers see records in the order they were applied.
    pub fn record(&self, record: CallRecord) {
        if record.failed() {
            self.has_errors.store(true, Ordering::Release);
        }
        let mut history = self.history.lock();
        let folded = match history.last_mut() {
            Some(last) if self.policy.folds(last, &record) => {
                last.repeat = last.repeat.saturating_add(1);
                last.ended_at = record.ended_at;
                true
            }
            _ => false,
        };
        if !folded {
            history.push(record);
        }
        let index = history.len() - 1;
        self.bus.publish(AuditEvent::Call {
            context_id: self.id,
            index,
            record: history[index].clone(),
        });
    }

    /// Snapshot of the history.
    pub fn history(&self) -> Vec<CallRecord> {
        self.history.lock().clone()
    }

    pub fn last_record(&self) -> Option<CallRecord> {
        self.history.lock().last().cloned()
    }

    // ---- flags ----

    /// Mark closed. Publishes the closed event the first time only.
    pub fn mark_closed(&self) -> bool {
        // Same lock as `record` keeps the closed event after the last call event
        let _history = self.history.lock();
        let first = !self.closed.swap(true, Ordering::AcqRel);
        if first {
            self.bus.publish(AuditEvent::Closed {
                context_id: self.id,
                has_errors: self.has_errors(),
            });
        }
        first
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn has_errors(&self) -> bool {
        self.has_errors.load(Ordering::Acquire)
    }

    pub fn file_existed(&self) -> bool {
        self.file_existed.load(Ordering::Acquire)
    }

    pub fn set_file_existed(&self, existed: bool) {
        self.file_existed.store(existed, Ordering::Release);
    }

    pub fn been_read(&self) -> bool {
        self.been_read.load(Ordering::Acquire)
    }

    pub fn mark_read(&self) {
        self.been_read.store(true, Ordering::Release);
    }

    pub fn been_written(&self) -> bool {
        self.been_written.load(Ordering::Acquire)
    }

    pub fn mark_written(&self) {
        self.been_written.store(true, Ordering::Release);
    }
}

/// Live contexts keyed by the id handed to the host.
#[derive(Debug, Default)]
pub struct ContextTable {
    contexts: DashMap<ContextId, Arc<RequestContext>>,
}

impl ContextTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, ctx: Arc<RequestContext>) {
        self.contexts.insert(ctx.id(), ctx);
    }

    pub fn get(&self, id: &ContextId) -> Option<Arc<RequestContext>> {
        self.contexts.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, id: &ContextId) -> Option<Arc<RequestContext>> {
        self.contexts.remove(id).map(|(_, ctx)| ctx)
    }

    /// Remove and return every context.
    pub fn drain(&self) -> Vec<Arc<RequestContext>> {
        let ids: Vec<ContextId> = self.contexts.iter().map(|entry| *entry.key()).collect();
        ids.iter().filter_map(|id| self.remove(id)).collect()
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CapturedError;
    use crate::record::Operation;
    use crate::status::NtStatus;

    fn context(policy: RepeatPolicy, bus: &AuditBus) -> Arc<RequestContext> {
        RequestContext::open(
            &HostFileInfo::new(42),
            "\\f.txt",
            OpenIntent::default(),
            policy,
            bus.clone(),
        )
    }

    fn call(op: Operation, status: Option<NtStatus>) -> CallRecord {
        CallRecord::begin(op).finish(status, None)
    }

    #[test]
    fn test_identical_calls_fold() {
        let bus = AuditBus::default();
        let ctx = context(RepeatPolicy::default(), &bus);
        for _ in 0..5 {
            ctx.record(call(Operation::ReadFile, Some(NtStatus::Success)));
        }
        ctx.record(call(Operation::ReadFile, Some(NtStatus::AccessDenied)));
        let history = ctx.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].repeat, 5);
        assert_eq!(history[1].repeat, 1);
    }

    #[test]
    fn test_collapse_disabled() {
        let bus = AuditBus::default();
        let policy = RepeatPolicy {
            collapse: false,
            max_repeat: 0,
        };
        let ctx = context(policy, &bus);
        for _ in 0..3 {
            ctx.record(call(Operation::ReadFile, Some(NtStatus::Success)));
        }
        assert_eq!(ctx.history().len(), 3);
    }

    #[test]
    fn test_repeat_cap_starts_new_record() {
        let bus = AuditBus::default();
        let policy = RepeatPolicy {
            collapse: true,
            max_repeat: 2,
        };
        let ctx = context(policy, &bus);
        for _ in 0..5 {
            ctx.record(call(Operation::WriteFile, Some(NtStatus::Success)));
        }
        let repeats: Vec<u32> = ctx.history().iter().map(|r| r.repeat).collect();
        assert_eq!(repeats, vec![2, 2, 1]);
    }

    #[test]
    fn test_errors_flag_and_events() {
        let bus = AuditBus::default();
        let mut sub = bus.subscribe(">");
        let ctx = context(RepeatPolicy::default(), &bus);
        ctx.record(CallRecord::begin(Operation::ReadFile).finish(
            None,
            Some(CapturedError {
                kind: "Io".into(),
                message: "boom".into(),
                code: Some(5),
            }),
        ));
        assert!(ctx.has_errors());

        assert!(ctx.mark_closed());
        assert!(!ctx.mark_closed());
        assert!(ctx.is_closed());

        let subjects: Vec<String> = sub.drain().into_iter().map(|m| m.subject).collect();
        let hex = ctx.id().to_hex();
        assert_eq!(
            subjects,
            vec![
                format!("context.{hex}.created"),
                format!("context.{hex}.call"),
                format!("context.{hex}.closed"),
            ]
        );
    }

    #[test]
    fn test_folded_repeat_republishes_same_index() {
        let bus = AuditBus::default();
        let ctx = context(RepeatPolicy::default(), &bus);
        let mut sub = bus.subscribe_context(ctx.id());
        ctx.record(call(Operation::ReadFile, Some(NtStatus::Success)));
        ctx.record(call(Operation::ReadFile, Some(NtStatus::Success)));
        let calls: Vec<(usize, u32)> = sub
            .drain()
            .into_iter()
            .filter_map(|m| match m.payload {
                AuditEvent::Call { index, record, .. } => Some((index, record.repeat)),
                _ => None,
            })
            .collect();
        assert_eq!(calls, vec![(0, 1), (0, 2)]);
    }

    #[test]
    fn test_release_without_handle_is_noop() {
        let bus = AuditBus::default();
        let ctx = context(RepeatPolicy::default(), &bus);
        assert!(!ctx.has_handle());
        assert!(!ctx.release());
        assert!(!ctx.release());
        assert_eq!(ctx.with_handle(|_| ()), None);
    }

    #[test]
    fn test_table_drain() {
        let bus = AuditBus::default();
        let table = ContextTable::new();
        let a = context(RepeatPolicy::default(), &bus);
        let b = context(RepeatPolicy::default(), &bus);
        table.insert(Arc::clone(&a));
        table.insert(Arc::clone(&b));
        assert_eq!(table.get(&a.id()).map(|c| c.id()), Some(a.id()));
        assert_eq!(table.drain().len(), 2);
        assert!(table.is_empty());
    }
}
