//! Session-scoped identity map.
//!
//! One entry per `(table, identifier)`. Entries hold a type-erased copy of
//! the entity so that a single map serves every entity type.

use crate::model::audit::AuditFields;
use crate::model::entity::{Entity, EntityId, EntityMeta, Record};
use crate::session::EntityState;
use std::any::Any;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};

/// Identity of one tracked row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityKey {
    pub table: &'static str,
    pub id: EntityId,
}

impl EntityKey {
    pub fn new(meta: &'static EntityMeta, id: EntityId) -> Self {
        Self {
            table: meta.table,
            id,
        }
    }

    /// Key of an entity that already has an identifier.
    pub fn of<E: Entity>(entity: &E) -> Option<Self> {
        entity.id().map(|id| Self::new(E::meta(), id))
    }
}

impl Display for EntityKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.table, self.id)
    }
}

pub(crate) trait ManagedObject {
    fn meta(&self) -> &'static EntityMeta;
    fn record(&self) -> Record;
    fn audit_mut(&mut self) -> Option<&mut AuditFields>;
    fn as_any(&self) -> &dyn Any;
}

impl<E: Entity> ManagedObject for E {
    fn meta(&self) -> &'static EntityMeta {
        <E as Entity>::meta()
    }

    fn record(&self) -> Record {
        self.to_record()
    }

    fn audit_mut(&mut self) -> Option<&mut AuditFields> {
        Entity::audit_mut(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub(crate) struct ManagedEntry {
    pub(crate) object: Box<dyn ManagedObject>,
    pub(crate) state: EntityState,
    pub(crate) dirty: bool,
}

impl ManagedEntry {
    pub(crate) fn downcast<E: Entity>(&self) -> Option<E> {
        self.object.as_any().downcast_ref::<E>().cloned()
    }
}

#[derive(Default)]
pub(crate) struct IdentityMap {
    entries: HashMap<EntityKey, ManagedEntry>,
    /// Keys in `New` state, in registration order.
    pending: Vec<EntityKey>,
}

impl IdentityMap {
    pub(crate) fn contains(&self, key: &EntityKey) -> bool {
        self.entries.contains_key(key)
    }

    pub(crate) fn get(&self, key: &EntityKey) -> Option<&ManagedEntry> {
        self.entries.get(key)
    }

    pub(crate) fn get_mut(&mut self, key: &EntityKey) -> Option<&mut ManagedEntry> {
        self.entries.get_mut(key)
    }

    pub(crate) fn state(&self, key: &EntityKey) -> Option<EntityState> {
        self.entries.get(key).map(|entry| entry.state)
    }

    pub(crate) fn register_new(&mut self, key: EntityKey, object: Box<dyn ManagedObject>) {
        self.pending.push(key.clone());
        self.entries.insert(
            key,
            ManagedEntry {
                object,
                state: EntityState::New,
                dirty: false,
            },
        );
    }

    pub(crate) fn register_persisted(
        &mut self,
        key: EntityKey,
        object: Box<dyn ManagedObject>,
        dirty: bool,
    ) {
        self.entries.insert(
            key,
            ManagedEntry {
                object,
                state: EntityState::Persisted,
                dirty,
            },
        );
    }

    /// Swaps in a new entity image. Returns `false` when the key is untracked.
    pub(crate) fn replace(&mut self, key: &EntityKey, object: Box<dyn ManagedObject>) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.object = object;
                entry.dirty = entry.state == EntityState::Persisted;
                true
            }
            None => false,
        }
    }

    pub(crate) fn mark_persisted(&mut self, key: &EntityKey) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.state = EntityState::Persisted;
            entry.dirty = false;
        }
        self.pending.retain(|pending| pending != key);
    }

    pub(crate) fn remove(&mut self, key: &EntityKey) -> Option<ManagedEntry> {
        self.pending.retain(|pending| pending != key);
        self.entries.remove(key)
    }

    pub(crate) fn pending_inserts(&self) -> Vec<EntityKey> {
        self.pending.clone()
    }

    pub(crate) fn dirty_keys(&self) -> Vec<EntityKey> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.state == EntityState::Persisted && entry.dirty)
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub(crate) fn has_pending_writes(&self) -> bool {
        !self.pending.is_empty() || self.entries.values().any(|entry| entry.dirty)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.pending.clear();
    }
}
