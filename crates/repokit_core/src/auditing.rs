//! Audit stamping hook for the session write path.
//!
//! # Responsibility
//! - Stamp creation and modification timestamps and actors right before a
//!   row is written.
//! - Resolve the current actor from a caller-supplied context.
//!
//! # Invariants
//! - `pre_persist` writes the same instant and actor to the created and
//!   updated fields.
//! - `pre_update` leaves `created_*` untouched.
//! - Actor resolution failures are logged and degrade to a null actor; they
//!   never fail the write.

use crate::model::audit::AuditFields;
use crate::model::entity::EntityMeta;
use crate::session::PersistHook;
use log::warn;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of audit timestamps in Unix epoch milliseconds.
pub trait Clock {
    fn now_millis(&self) -> i64;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(0)
    }
}

impl<F> Clock for F
where
    F: Fn() -> i64,
{
    fn now_millis(&self) -> i64 {
        self()
    }
}

/// Current actor could not be determined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorResolutionError {
    pub reason: String,
}

impl ActorResolutionError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl Display for ActorResolutionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "cannot resolve current actor: {}", self.reason)
    }
}

impl Error for ActorResolutionError {}

/// Supplies the actor recorded in `created_by` / `updated_by`.
pub trait ActorProvider {
    /// `Ok(None)` means "no actor"; the audit actor fields stay null.
    fn current_actor(&self) -> Result<Option<String>, ActorResolutionError>;
}

impl<F> ActorProvider for F
where
    F: Fn() -> Result<Option<String>, ActorResolutionError>,
{
    fn current_actor(&self) -> Result<Option<String>, ActorResolutionError> {
        self()
    }
}

/// Fixed actor for batch jobs and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticActor(pub Option<String>);

impl ActorProvider for StaticActor {
    fn current_actor(&self) -> Result<Option<String>, ActorResolutionError> {
        Ok(self.0.clone())
    }
}

/// Shared, mutable "who is acting" slot.
///
/// Clones share the same slot, so the caller keeps one handle and the hook
/// another.
#[derive(Debug, Clone, Default)]
pub struct ActorContext {
    current: Arc<RwLock<Option<String>>>,
}

impl ActorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, actor: impl Into<String>) -> Result<(), ActorResolutionError> {
        let mut slot = self
            .current
            .write()
            .map_err(|_| ActorResolutionError::new("actor context lock poisoned"))?;
        *slot = Some(actor.into());
        Ok(())
    }

    pub fn clear(&self) -> Result<(), ActorResolutionError> {
        let mut slot = self
            .current
            .write()
            .map_err(|_| ActorResolutionError::new("actor context lock poisoned"))?;
        *slot = None;
        Ok(())
    }
}

impl ActorProvider for ActorContext {
    fn current_actor(&self) -> Result<Option<String>, ActorResolutionError> {
        self.current
            .read()
            .map(|slot| slot.clone())
            .map_err(|_| ActorResolutionError::new("actor context lock poisoned"))
    }
}

/// `PersistHook` that fills `AuditFields`.
pub struct AuditingHook<C = SystemClock, A = ActorContext> {
    clock: C,
    actor: A,
}

impl<A: ActorProvider> AuditingHook<SystemClock, A> {
    /// Hook stamping wall-clock time.
    pub fn with_actor(actor: A) -> Self {
        Self::new(SystemClock, actor)
    }
}

impl<C: Clock, A: ActorProvider> AuditingHook<C, A> {
    pub fn new(clock: C, actor: A) -> Self {
        Self { clock, actor }
    }

    fn resolve_actor(&self, meta: &EntityMeta) -> Option<String> {
        match self.actor.current_actor() {
            Ok(actor) => actor,
            Err(err) => {
                warn!(
                    "event=audit_actor module=audit status=degraded entity={} error={err}",
                    meta.name
                );
                None
            }
        }
    }
}

impl<C: Clock, A: ActorProvider> PersistHook for AuditingHook<C, A> {
    fn pre_persist(&self, meta: &'static EntityMeta, audit: &mut AuditFields) {
        let now = self.clock.now_millis();
        let actor = self.resolve_actor(meta);
        audit.created_at = Some(now);
        audit.updated_at = Some(now);
        audit.created_by = actor.clone();
        audit.updated_by = actor;
    }

    fn pre_update(&self, meta: &'static EntityMeta, audit: &mut AuditFields) {
        audit.updated_at = Some(self.clock.now_millis());
        audit.updated_by = self.resolve_actor(meta);
    }
}

#[cfg(test)]
mod tests {
    use super::{ActorContext, ActorProvider, ActorResolutionError, AuditingHook, StaticActor};
    use crate::model::audit::AuditFields;
    use crate::model::member::MEMBER_META;
    use crate::session::PersistHook;
    use std::cell::Cell;

    #[test]
    fn pre_persist_stamps_created_and_updated_identically() {
        let hook = AuditingHook::new(|| 1_000_i64, StaticActor(Some("alice".to_string())));
        let mut audit = AuditFields::default();

        hook.pre_persist(&MEMBER_META, &mut audit);

        assert_eq!(audit.created_at, Some(1_000));
        assert_eq!(audit.created_at, audit.updated_at);
        assert_eq!(audit.created_by.as_deref(), Some("alice"));
        assert_eq!(audit.created_by, audit.updated_by);
    }

    #[test]
    fn pre_update_keeps_creation_fields() {
        let tick = Cell::new(1_000_i64);
        let context = ActorContext::new();
        let hook = AuditingHook::new(
            || {
                tick.set(tick.get() + 500);
                tick.get()
            },
            context.clone(),
        );
        let mut audit = AuditFields::default();

        context.set("alice").unwrap();
        hook.pre_persist(&MEMBER_META, &mut audit);
        context.set("bob").unwrap();
        hook.pre_update(&MEMBER_META, &mut audit);

        assert_eq!(audit.created_at, Some(1_500));
        assert_eq!(audit.updated_at, Some(2_000));
        assert_eq!(audit.created_by.as_deref(), Some("alice"));
        assert_eq!(audit.updated_by.as_deref(), Some("bob"));
    }

    #[test]
    fn failed_actor_resolution_degrades_to_null_actor() {
        let hook = AuditingHook::new(
            || 7_i64,
            || -> Result<Option<String>, ActorResolutionError> {
                Err(ActorResolutionError::new("no request scope"))
            },
        );
        let mut audit = AuditFields::default();

        hook.pre_persist(&MEMBER_META, &mut audit);

        assert_eq!(audit.created_at, Some(7));
        assert_eq!(audit.created_by, None);
        assert_eq!(audit.updated_by, None);
    }

    #[test]
    fn cleared_context_reports_no_actor() {
        let context = ActorContext::new();
        context.set("alice").unwrap();
        context.clear().unwrap();
        assert_eq!(context.current_actor().unwrap(), None);
    }
}
