//! Persistence session contract.
//!
//! # Responsibility
//! - Define the narrow interface the core calls into (`PersistenceSession`).
//! - Track entity lifecycle within one unit of work.
//!
//! # Invariants
//! - Lifecycle: `Transient -> Managed(New) -> Managed(Persisted) -> Detached`;
//!   no transition is reversed.
//! - Pre-persist/pre-update hooks run exactly once per written row, during
//!   `flush`.
//! - `execute_update` never refreshes managed entities; callers `clear` the
//!   session before re-reading rows touched by a bulk statement.
//! - A session is single-owner state. Share the backing store, never the
//!   session.

mod identity_map;
mod sqlite;

pub use identity_map::EntityKey;
pub use sqlite::SqliteSession;

use crate::model::audit::AuditFields;
use crate::model::entity::{Entity, EntityId, EntityMeta, Record};
use crate::query::Statement;
use crate::repo::RepoResult;

/// Lifecycle state of one entity relative to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    /// Never registered, no identifier.
    Transient,
    /// Registered, INSERT pending until the next flush.
    New,
    /// Backed by a row and tracked by the identity map.
    Persisted,
    /// Has an identifier but is not tracked by this session.
    Detached,
}

/// When pending writes reach the backing store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FlushMode {
    /// Before every query, count or bulk statement, and on explicit `flush`.
    #[default]
    Auto,
    /// Only on explicit `flush`.
    Explicit,
}

/// Write-path callback composed into a session.
///
/// Only entities exposing `Entity::audit_mut` are passed to hooks.
pub trait PersistHook {
    /// Runs once right before the INSERT of a new entity.
    fn pre_persist(&self, meta: &'static EntityMeta, audit: &mut AuditFields);

    /// Runs once right before the UPDATE of a modified persisted entity.
    fn pre_update(&self, meta: &'static EntityMeta, audit: &mut AuditFields);
}

/// Backing-store operations the core depends on.
pub trait PersistenceSession {
    /// Registers a transient entity (`Transient -> New`).
    ///
    /// Generated identifiers are allocated here and written back into
    /// `entity`. Fails with `ConstraintViolation` when the identifier is
    /// already tracked; duplicates of untracked rows surface at flush.
    fn insert<E: Entity>(&mut self, entity: &mut E) -> RepoResult<()>;

    /// Replaces the tracked state of an existing entity and schedules an
    /// UPDATE for the next flush. Untracked identifiers are merged when the
    /// row exists and fail with `NotFound` otherwise.
    fn update<E: Entity>(&mut self, entity: &E) -> RepoResult<()>;

    /// Identity-map lookup first, then a primary-key read.
    fn find_by_id<E: Entity>(&mut self, id: &EntityId) -> RepoResult<Option<E>>;

    /// Untyped variant of `find_by_id` used for reference resolution.
    fn find_record(&mut self, meta: &'static EntityMeta, id: &EntityId)
        -> RepoResult<Option<Record>>;

    /// Deletes the entity's row and stops tracking it.
    fn delete<E: Entity>(&mut self, entity: &E) -> RepoResult<()>;

    /// Stops tracking one entity without touching the store.
    fn detach<E: Entity>(&mut self, entity: &E);

    /// Merges a full entity row into the identity map. When the identifier
    /// is already tracked the tracked instance is returned unchanged.
    fn manage<E: Entity>(&mut self, record: Record) -> RepoResult<E>;

    fn state_of<E: Entity>(&self, entity: &E) -> EntityState;

    /// Number of tracked entities.
    fn managed_len(&self) -> usize;

    fn execute_query(&mut self, statement: &Statement) -> RepoResult<Vec<Record>>;

    fn execute_count(&mut self, statement: &Statement) -> RepoResult<u64>;

    /// Runs a set-based statement and returns the affected row count.
    fn execute_update(&mut self, statement: &Statement) -> RepoResult<usize>;

    /// Writes pending inserts (registration order) then pending updates.
    fn flush(&mut self) -> RepoResult<()>;

    /// Evicts every tracked entity; unflushed changes are discarded.
    fn clear(&mut self);
}
