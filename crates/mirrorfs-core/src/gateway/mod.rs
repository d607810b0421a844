//! The operation gateway.
//!
//! [`MirrorGateway`] implements every host verb against a [`LocalFs`]. Each
//! verb resolves its path, finds the request context for the handle in play,
//! runs the native work inside [`instrument`] and returns the outcome.
//!
//! Outcome policy:
//! - anticipated failures (not found, access denied, sharing violation, ...)
//!   come back as `Ok(status)`
//! - generic I/O failures the verb does not anticipate come back as `Err` so
//!   the host sees a real error
//!
//! Either way the call is already in the context's history by the time the
//! caller sees it.

mod create;
mod io;
mod meta;
mod namespace;
mod volume;

use std::sync::Arc;

use crate::config::{AuditConfig, MirrorConfig, VolumeConfig};
use crate::context::{ContextTable, RepeatPolicy, RequestContext};
use crate::error::{CapturedError, FsError, FsResult};
use crate::events::{AuditBus, Subscription};
use crate::ids::ContextId;
use crate::local::LocalFs;
use crate::record::{CallRecord, Operation, PendingCall};
use crate::status::{HasStatus, NtStatus, Reply};
use crate::types::{HostFileInfo, OpenIntent};

/// Passthrough gateway with a per-handle audit trail.
#[derive(Debug)]
pub struct MirrorGateway {
    fs: LocalFs,
    contexts: ContextTable,
    bus: AuditBus,
    audit: AuditConfig,
    volume: VolumeConfig,
    /// Audits the verbs that carry no path.
    volume_ctx: Arc<RequestContext>,
}

impl MirrorGateway {
    /// Build a gateway over `config.root`, which must be an existing directory.
    pub fn new(config: &MirrorConfig) -> FsResult<Self> {
        let fs = LocalFs::new(&config.root)?;
        let bus = AuditBus::new(config.audit.event_capacity);
        let policy = policy_of(&config.audit);
        let volume_ctx = RequestContext::open(
            &HostFileInfo::default(),
            "",
            OpenIntent::default(),
            policy,
            bus.clone(),
        );
        Ok(Self {
            fs,
            contexts: ContextTable::new(),
            bus,
            audit: config.audit.clone(),
            volume: config.volume.clone(),
            volume_ctx,
        })
    }

    pub fn local(&self) -> &LocalFs {
        &self.fs
    }

    pub fn bus(&self) -> &AuditBus {
        &self.bus
    }

    /// Subscribe to audit events matching `pattern`.
    pub fn subscribe(&self, pattern: &str) -> Subscription {
        self.bus.subscribe(pattern)
    }

    pub fn contexts(&self) -> &ContextTable {
        &self.contexts
    }

    /// A live context by id.
    pub fn context(&self, id: &ContextId) -> Option<Arc<RequestContext>> {
        self.contexts.get(id)
    }

    pub fn volume_context(&self) -> &Arc<RequestContext> {
        &self.volume_ctx
    }

    fn new_context(&self, host: &HostFileInfo, path: &str, intent: OpenIntent) -> Arc<RequestContext> {
        RequestContext::open(
            host,
            path,
            intent,
            policy_of(&self.audit),
            self.bus.clone(),
        )
    }

    /// Run one verb for the handle in `host`.
    ///
    /// Without a live context for the handle a detached one is made for this
    /// call alone and closed afterwards, so the call is still audited.
    fn run<T, F>(&self, host: &HostFileInfo, path: &str, operation: Operation, action: F) -> FsResult<T>
    where
        T: HasStatus,
        F: FnOnce(&RequestContext) -> FsResult<T>,
    {
        match host.context.and_then(|id| self.contexts.get(&id)) {
            Some(ctx) => instrument(&ctx, operation, || action(&ctx)),
            None => {
                let ctx = self.new_context(host, path, OpenIntent::default());
                let result = instrument(&ctx, operation, || action(&ctx));
                ctx.release();
                ctx.mark_closed();
                result
            }
        }
    }

    /// Run a verb that has no path against the volume context.
    fn run_volume<T, F>(&self, operation: Operation, action: F) -> FsResult<T>
    where
        T: HasStatus,
        F: FnOnce() -> FsResult<T>,
    {
        instrument(&self.volume_ctx, operation, action)
    }
}

fn policy_of(audit: &AuditConfig) -> RepeatPolicy {
    RepeatPolicy {
        collapse: audit.collapse_repeats,
        max_repeat: audit.max_repeat,
    }
}

/// Anticipated failures become outcomes; generic I/O failures propagate.
fn settle(err: FsError) -> FsResult<NtStatus> {
    match err {
        FsError::Io { .. } => Err(err),
        other => Ok(other.status()),
    }
}

/// [`settle`] for verbs that reply with a payload.
fn settle_reply<T: Default>(err: FsError) -> FsResult<Reply<T>> {
    settle(err).map(Reply::empty)
}

/// Time `action`, record its outcome on `ctx`, and hand the result back.
///
/// The record is appended by a drop guard, so it lands on every exit path,
/// including a panic unwinding out of `action`.
pub fn instrument<T, F>(ctx: &RequestContext, operation: Operation, action: F) -> FsResult<T>
where
    T: HasStatus,
    F: FnOnce() -> FsResult<T>,
{
    let mut guard = CallGuard {
        ctx,
        pending: Some(CallRecord::begin(operation)),
        outcome: None,
    };
    let result = action();
    guard.outcome = Some(match &result {
        Ok(value) => (Some(value.status()), None),
        Err(err) => (None, Some(CapturedError::from(err))),
    });
    drop(guard);
    result
}

struct CallGuard<'a> {
    ctx: &'a RequestContext,
    pending: Option<PendingCall>,
    outcome: Option<(Option<NtStatus>, Option<CapturedError>)>,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        let operation = pending.operation();
        let (status, error) = self
            .outcome
            .take()
            .unwrap_or_else(|| (None, Some(CapturedError::panicked(operation.name()))));
        let record = pending.finish(status, error);

        match (&record.status, &record.error) {
            (_, Some(error)) => tracing::warn!(
                context = %self.ctx.id(),
                operation = operation.name(),
                path = self.ctx.path(),
                kind = %error.kind,
                "{}",
                error.message
            ),
            (Some(status), None) => tracing::debug!(
                context = %self.ctx.id(),
                operation = operation.name(),
                path = self.ctx.path(),
                %status,
                elapsed_us = record.elapsed().as_micros() as u64,
                "call finished"
            ),
            (None, None) => {}
        }

        self.ctx.record(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::AuditEvent;
    use tempfile::TempDir;

    fn setup() -> (MirrorGateway, TempDir) {
        let dir = TempDir::new().unwrap();
        let gw = MirrorGateway::new(&MirrorConfig::with_root(dir.path())).unwrap();
        (gw, dir)
    }

    #[test]
    fn test_root_must_exist() {
        let dir = TempDir::new().unwrap();
        let missing = MirrorConfig::with_root(dir.path().join("absent"));
        assert!(MirrorGateway::new(&missing).is_err());
    }

    #[test]
    fn test_instrument_records_success() {
        let (gw, _dir) = setup();
        let ctx = gw.volume_context();
        let status = instrument(ctx, Operation::Mounted, || Ok(NtStatus::Success)).unwrap();
        assert_eq!(status, NtStatus::Success);
        let last = ctx.last_record().unwrap();
        assert_eq!(last.operation, Operation::Mounted);
        assert_eq!(last.status, Some(NtStatus::Success));
        assert!(last.ended_at >= last.started_at);
    }

    #[test]
    fn test_instrument_records_error_without_altering_it() {
        let (gw, _dir) = setup();
        let ctx = gw.volume_context();
        let result: FsResult<NtStatus> = instrument(ctx, Operation::GetDiskFreeSpace, || {
            Err(crate::error::translate(libc::EIO, "/"))
        });
        let err = result.unwrap_err();
        assert_eq!(err.code(), Some(libc::EIO));

        let last = ctx.last_record().unwrap();
        assert_eq!(last.status, None);
        assert_eq!(last.error.as_ref().map(|e| e.kind.as_str()), Some("Io"));
        assert!(ctx.has_errors());
    }

    #[test]
    fn test_instrument_records_panics() {
        let (gw, _dir) = setup();
        let ctx = Arc::clone(gw.volume_context());
        let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _: FsResult<NtStatus> = instrument(&ctx, Operation::Unmounted, || panic!("boom"));
        }));
        assert!(caught.is_err());
        let last = ctx.last_record().unwrap();
        assert_eq!(last.operation, Operation::Unmounted);
        assert_eq!(last.error.unwrap().kind, CapturedError::PANIC);
    }

    #[test]
    fn test_detached_context_is_audited_and_closed() {
        let (gw, _dir) = setup();
        let mut sub = gw.subscribe(">");
        let host = HostFileInfo::new(1);
        let status = gw.delete_directory("\\missing", &host);
        assert!(status.is_ok());

        let events: Vec<AuditEvent> = sub.drain().into_iter().map(|m| m.payload).collect();
        assert!(matches!(events.first(), Some(AuditEvent::Created { .. })));
        assert!(matches!(events.last(), Some(AuditEvent::Closed { .. })));
        assert!(gw.contexts().is_empty());
    }
}
