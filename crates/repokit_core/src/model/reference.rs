//! Explicit many-to-one reference handle.
//!
//! A `Ref<T>` only carries the target identifier. Nothing is fetched until
//! the caller asks for it through a session.

use crate::model::entity::{Entity, EntityId};
use crate::repo::RepoResult;
use crate::session::PersistenceSession;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter};
use std::marker::PhantomData;

#[derive(Serialize, Deserialize)]
#[serde(transparent, bound = "")]
pub struct Ref<T> {
    id: EntityId,
    #[serde(skip)]
    _target: PhantomData<fn() -> T>,
}

impl<T: Entity> Ref<T> {
    pub fn new(id: impl Into<EntityId>) -> Self {
        Self {
            id: id.into(),
            _target: PhantomData,
        }
    }

    /// Reference to an entity that already has an identifier.
    pub fn to(entity: &T) -> Option<Self> {
        entity.id().map(Self::new)
    }

    pub fn id(&self) -> &EntityId {
        &self.id
    }

    /// Resolves the target through the session's identity map, falling back
    /// to a lookup by identifier.
    pub fn load<S: PersistenceSession>(&self, session: &mut S) -> RepoResult<Option<T>> {
        session.find_by_id::<T>(&self.id)
    }
}

impl<T> Clone for Ref<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            _target: PhantomData,
        }
    }
}

impl<T> PartialEq for Ref<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Ref<T> {}

impl<T> Debug for Ref<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Ref").field(&self.id).finish()
    }
}
