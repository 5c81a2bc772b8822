//! Generic entity repository.

use crate::bulk::{execute_bulk, BulkMutation};
use crate::model::entity::{Entity, EntityId, Record};
use crate::model::team::Team;
use crate::paging::{fetch_page, fetch_slice, Page, PageRequest, Slice};
use crate::projection::{
    map_native, project_record, Projection, ProjectionMappingError, ProjectionShape,
};
use crate::query::derive::{DerivedQuery, QueryKind};
use crate::query::params::Params;
use crate::query::sort::Sort;
use crate::query::{BoundQuery, QueryDescriptor};
use crate::repo::{RepoError, RepoResult};
use crate::session::{EntityState, PersistenceSession};
use std::marker::PhantomData;

pub type TeamRepository = EntityRepository<Team>;

/// CRUD and query operations for one entity type.
pub struct EntityRepository<E> {
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Default for EntityRepository<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> EntityRepository<E> {
    pub fn new() -> Self {
        Self {
            _entity: PhantomData,
        }
    }

    /// Registers a new entity or schedules an update of a known one.
    ///
    /// Newness is decided by the session state first, then by
    /// `Entity::is_new`, so an assigned identifier is never mistaken for an
    /// existing row.
    pub fn save<S: PersistenceSession>(&self, session: &mut S, entity: &mut E) -> RepoResult<()> {
        match session.state_of(entity) {
            EntityState::New | EntityState::Persisted => session.update(entity),
            EntityState::Transient | EntityState::Detached if entity.is_new() => {
                session.insert(entity)
            }
            EntityState::Transient | EntityState::Detached => session.update(entity),
        }
    }

    /// `save` followed by `flush`. On return `entity` carries the audit
    /// values that were written.
    pub fn save_and_flush<S: PersistenceSession>(
        &self,
        session: &mut S,
        entity: &mut E,
    ) -> RepoResult<()> {
        self.save(session, entity)?;
        session.flush()?;
        if let Some(id) = entity.id() {
            if let Some(written) = session.find_by_id::<E>(&id)? {
                *entity = written;
            }
        }
        Ok(())
    }

    pub fn find_by_id<S: PersistenceSession>(
        &self,
        session: &mut S,
        id: impl Into<EntityId>,
    ) -> RepoResult<Option<E>> {
        session.find_by_id::<E>(&id.into())
    }

    pub fn find_all<S: PersistenceSession>(&self, session: &mut S, sort: &Sort) -> RepoResult<Vec<E>> {
        let query = DerivedQuery::all(E::meta()).bind(&Params::None)?;
        self.load_entities(session, &query, sort)
    }

    pub fn count<S: PersistenceSession>(&self, session: &mut S) -> RepoResult<u64> {
        let query = DerivedQuery::all(E::meta()).bind(&Params::None)?;
        session.execute_count(&query.count())
    }

    pub fn delete<S: PersistenceSession>(&self, session: &mut S, entity: &E) -> RepoResult<()> {
        session.delete(entity)
    }

    /// Entities matching a declared query, in query order then `sort`.
    pub fn find_by<S: PersistenceSession>(
        &self,
        session: &mut S,
        query: &QueryDescriptor,
        params: &Params,
        sort: &Sort,
    ) -> RepoResult<Vec<E>> {
        let bound = self.bind_entity_query(query, params)?;
        self.load_entities(session, &bound, sort)
    }

    /// At most one entity; more than one match is `NonUniqueResult`.
    pub fn find_unique<S: PersistenceSession>(
        &self,
        session: &mut S,
        query: &QueryDescriptor,
        params: &Params,
    ) -> RepoResult<Option<E>> {
        let bound = self.bind_entity_query(query, params)?;
        let select = bound.select(&Sort::unsorted(), None)?;
        let mut rows = session.execute_query(&select)?;
        if rows.len() > 1 {
            return Err(RepoError::NonUniqueResult { actual: rows.len() });
        }
        match rows.pop() {
            Some(row) => session.manage::<E>(row).map(Some),
            None => Ok(None),
        }
    }

    /// Runs the count form of a declared query.
    pub fn count_by<S: PersistenceSession>(
        &self,
        session: &mut S,
        query: &QueryDescriptor,
        params: &Params,
    ) -> RepoResult<u64> {
        let bound = query.bind(params)?;
        session.execute_count(&bound.count())
    }

    /// Raw rows of a declared query; used for scalar and DTO results.
    pub fn find_records<S: PersistenceSession>(
        &self,
        session: &mut S,
        query: &QueryDescriptor,
        params: &Params,
        sort: &Sort,
    ) -> RepoResult<Vec<Record>> {
        let bound = query.bind(params)?;
        let select = bound.select(sort, None)?;
        session.execute_query(&select)
    }

    pub fn find_page<S: PersistenceSession>(
        &self,
        session: &mut S,
        query: &QueryDescriptor,
        params: &Params,
        request: &PageRequest,
    ) -> RepoResult<Page<E>> {
        let bound = self.bind_entity_query(query, params)?;
        fetch_page(session, &bound, request, None, |session, row| {
            session.manage::<E>(row)
        })
    }

    pub fn find_slice<S: PersistenceSession>(
        &self,
        session: &mut S,
        query: &QueryDescriptor,
        params: &Params,
        request: &PageRequest,
    ) -> RepoResult<Slice<E>> {
        let bound = self.bind_entity_query(query, params)?;
        fetch_slice(session, &bound, request, None, |session, row| {
            session.manage::<E>(row)
        })
    }

    /// Projected rows without materialising entities.
    ///
    /// Entity shapes read their source columns and resolve nested
    /// references through the session; native shapes map aliased columns
    /// by name.
    pub fn find_projected<S: PersistenceSession>(
        &self,
        session: &mut S,
        query: &QueryDescriptor,
        params: &Params,
        shape: &ProjectionShape,
        sort: &Sort,
    ) -> RepoResult<Vec<Projection>> {
        let bound = self.bind_projection_query(query, params, shape)?;
        let columns = shape.columns();
        let select = bound.select_columns(Some(columns.as_slice()), sort, None)?;
        let rows = session.execute_query(&select)?;

        let mut projections = Vec::with_capacity(rows.len());
        for row in rows {
            projections.push(self.project_row(session, shape, &row)?);
        }
        Ok(projections)
    }

    pub fn find_projected_page<S: PersistenceSession>(
        &self,
        session: &mut S,
        query: &QueryDescriptor,
        params: &Params,
        shape: &ProjectionShape,
        request: &PageRequest,
    ) -> RepoResult<Page<Projection>> {
        let bound = self.bind_projection_query(query, params, shape)?;
        let columns = shape.columns();
        fetch_page(session, &bound, request, Some(columns.as_slice()), |session, row| {
            self.project_row(session, shape, &row)
        })
    }

    /// Runs a bulk UPDATE/DELETE; managed entities are not refreshed.
    pub fn bulk<S: PersistenceSession>(
        &self,
        session: &mut S,
        mutation: &BulkMutation,
        params: &Params,
    ) -> RepoResult<usize> {
        execute_bulk(session, mutation, params)
    }

    fn project_row<S: PersistenceSession>(
        &self,
        session: &mut S,
        shape: &ProjectionShape,
        row: &Record,
    ) -> RepoResult<Projection> {
        match shape.meta() {
            Some(_) => project_record(session, shape, row),
            None => Ok(map_native(shape, row)?),
        }
    }

    fn bind_projection_query(
        &self,
        query: &QueryDescriptor,
        params: &Params,
        shape: &ProjectionShape,
    ) -> RepoResult<BoundQuery> {
        let bound = query.bind(params)?;
        if let (Some(source), Some(target)) = (shape.meta(), bound.target()) {
            if !source.same_as(target) {
                return Err(ProjectionMappingError::new(
                    shape.name(),
                    target.name,
                    "shape reads a different entity than the query",
                )
                .into());
            }
        }
        Ok(bound)
    }

    fn bind_entity_query(&self, query: &QueryDescriptor, params: &Params) -> RepoResult<BoundQuery> {
        let bound = query.bind(params)?;
        if bound.kind() == QueryKind::Count {
            return Err(RepoError::InvalidArgument(format!(
                "`{}` is a count query; use count_by",
                bound.label()
            )));
        }
        match bound.target() {
            Some(meta) if meta.same_as(E::meta()) => Ok(bound),
            Some(meta) => Err(RepoError::InvalidArgument(format!(
                "`{}` returns {} rows, not {}",
                bound.label(),
                meta.name,
                E::meta().name
            ))),
            None => Err(RepoError::InvalidArgument(format!(
                "`{}` does not declare an entity result; use find_records",
                bound.label()
            ))),
        }
    }

    fn load_entities<S: PersistenceSession>(
        &self,
        session: &mut S,
        query: &BoundQuery,
        sort: &Sort,
    ) -> RepoResult<Vec<E>> {
        let select = query.select(sort, None)?;
        let rows = session.execute_query(&select)?;
        rows.into_iter()
            .map(|row| session.manage::<E>(row))
            .collect()
    }
}
