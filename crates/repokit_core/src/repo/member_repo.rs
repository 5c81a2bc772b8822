//! Member repository with the declared member queries.
//!
//! # Invariants
//! - Every descriptor is parsed in `MemberRepository::new`; a typo in a
//!   method name or template fails there, before any call.

use crate::bulk::BulkMutation;
use crate::model::entity::Record;
use crate::model::member::{Member, MemberDto, MEMBER_META};
use crate::model::team::TEAM_META;
use crate::paging::{Page, PageRequest, Slice};
use crate::projection::{Projection, ProjectionShape};
use crate::query::derive::DerivedQuery;
use crate::query::params::{Arg, Params};
use crate::query::sort::Sort;
use crate::query::template::QueryTemplate;
use crate::query::QueryDescriptor;
use crate::repo::{EntityRepository, RepoError, RepoResult};
use crate::session::PersistenceSession;
use rusqlite::types::Value;
use std::ops::Deref;

const FIND_USER_SQL: &str =
    "SELECT * FROM members WHERE username = :username AND age = :age";
const USERNAME_LIST_SQL: &str = "SELECT username FROM members ORDER BY member_id";
const MEMBER_DTO_SQL: &str = "SELECT m.member_id AS id, m.username AS username, t.name AS team_name
FROM members m
JOIN teams t ON t.team_id = m.team_id
ORDER BY m.member_id";
const FIND_BY_NAMES_SQL: &str = "SELECT * FROM members WHERE username IN (:names)";
const BULK_AGE_PLUS_SQL: &str = "UPDATE members SET age = age + 1 WHERE age >= :age";
const NATIVE_PROJECTION_SQL: &str = "SELECT m.member_id AS id, m.username AS username, t.name AS team_name
FROM members m
LEFT JOIN teams t ON t.team_id = m.team_id";
const NATIVE_PROJECTION_COUNT_SQL: &str = "SELECT COUNT(*) FROM members";

/// `EntityRepository<Member>` plus the member-specific query methods.
pub struct MemberRepository {
    base: EntityRepository<Member>,
    by_username_and_age_greater_than: QueryDescriptor,
    find_user: QueryDescriptor,
    username_list: QueryDescriptor,
    member_dto: QueryDescriptor,
    by_names: QueryDescriptor,
    list_by_username: QueryDescriptor,
    member_by_username: QueryDescriptor,
    by_age: QueryDescriptor,
    slice_by_age: QueryDescriptor,
    count_by_age: QueryDescriptor,
    bulk_age_plus: BulkMutation,
    projections_by_username: QueryDescriptor,
    username_with_team: ProjectionShape,
    native_projection: QueryDescriptor,
    member_summary: ProjectionShape,
}

impl MemberRepository {
    pub fn new() -> RepoResult<Self> {
        let derived = |method: &str| -> RepoResult<QueryDescriptor> {
            Ok(DerivedQuery::parse(&MEMBER_META, method)?.into())
        };

        let team_name = ProjectionShape::builder(&TEAM_META).field("name").build()?;
        Ok(Self {
            base: EntityRepository::new(),
            by_username_and_age_greater_than: derived("findByUsernameAndAgeGreaterThan")?,
            find_user: QueryTemplate::new(FIND_USER_SQL)?
                .returning(&MEMBER_META)
                .into(),
            username_list: QueryTemplate::new(USERNAME_LIST_SQL)?.into(),
            member_dto: QueryTemplate::new(MEMBER_DTO_SQL)?.into(),
            by_names: QueryTemplate::new(FIND_BY_NAMES_SQL)?
                .returning(&MEMBER_META)
                .into(),
            list_by_username: derived("findListByUsername")?,
            member_by_username: derived("findMemberByUsername")?,
            by_age: derived("findByAge")?,
            slice_by_age: derived("findSliceByAge")?,
            count_by_age: derived("countByAge")?,
            bulk_age_plus: BulkMutation::template(QueryTemplate::new(BULK_AGE_PLUS_SQL)?),
            projections_by_username: derived("findProjectionsByUsername")?,
            username_with_team: ProjectionShape::builder(&MEMBER_META)
                .field("username")
                .nested("team", team_name)
                .build()?,
            native_projection: QueryTemplate::new(NATIVE_PROJECTION_SQL)?
                .with_count_query(NATIVE_PROJECTION_COUNT_SQL)?
                .into(),
            member_summary: ProjectionShape::native("MemberSummary", ["id", "username", "team_name"])?,
        })
    }

    pub fn find_by_username_and_age_greater_than<S: PersistenceSession>(
        &self,
        session: &mut S,
        username: &str,
        age: i64,
    ) -> RepoResult<Vec<Member>> {
        self.base.find_by(
            session,
            &self.by_username_and_age_greater_than,
            &Params::positional([Arg::from(username), Arg::from(age)]),
            &Sort::unsorted(),
        )
    }

    /// Literal query with named parameters.
    pub fn find_user<S: PersistenceSession>(
        &self,
        session: &mut S,
        username: &str,
        age: i64,
    ) -> RepoResult<Vec<Member>> {
        self.base.find_by(
            session,
            &self.find_user,
            &Params::named([("username", Arg::from(username)), ("age", Arg::from(age))]),
            &Sort::unsorted(),
        )
    }

    pub fn find_username_list<S: PersistenceSession>(&self, session: &mut S) -> RepoResult<Vec<String>> {
        let rows = self
            .base
            .find_records(session, &self.username_list, &Params::None, &Sort::unsorted())?;
        rows.iter().map(first_text).collect()
    }

    /// Members joined with their team; members without a team are skipped.
    pub fn find_member_dto<S: PersistenceSession>(&self, session: &mut S) -> RepoResult<Vec<MemberDto>> {
        let rows = self
            .base
            .find_records(session, &self.member_dto, &Params::None, &Sort::unsorted())?;
        rows.iter()
            .map(|row| MemberDto::from_record(row).map_err(RepoError::from))
            .collect()
    }

    /// `username IN (...)` with one bind value per name.
    pub fn find_by_names<S, I, T>(&self, session: &mut S, names: I) -> RepoResult<Vec<Member>>
    where
        S: PersistenceSession,
        I: IntoIterator<Item = T>,
        T: Into<Arg>,
    {
        let names = Arg::list(names);
        if matches!(&names, Arg::Many(values) if values.is_empty()) {
            return Ok(Vec::new());
        }
        self.base.find_by(
            session,
            &self.by_names,
            &Params::named([("names", names)]),
            &Sort::unsorted(),
        )
    }

    pub fn find_list_by_username<S: PersistenceSession>(
        &self,
        session: &mut S,
        username: &str,
    ) -> RepoResult<Vec<Member>> {
        self.base.find_by(
            session,
            &self.list_by_username,
            &Params::positional([username]),
            &Sort::unsorted(),
        )
    }

    /// Single result; two members with the same name is `NonUniqueResult`.
    pub fn find_member_by_username<S: PersistenceSession>(
        &self,
        session: &mut S,
        username: &str,
    ) -> RepoResult<Option<Member>> {
        self.base
            .find_unique(session, &self.member_by_username, &Params::positional([username]))
    }

    pub fn find_by_age<S: PersistenceSession>(
        &self,
        session: &mut S,
        age: i64,
        request: &PageRequest,
    ) -> RepoResult<Page<Member>> {
        self.base
            .find_page(session, &self.by_age, &Params::positional([age]), request)
    }

    pub fn find_slice_by_age<S: PersistenceSession>(
        &self,
        session: &mut S,
        age: i64,
        request: &PageRequest,
    ) -> RepoResult<Slice<Member>> {
        self.base
            .find_slice(session, &self.slice_by_age, &Params::positional([age]), request)
    }

    pub fn count_by_age<S: PersistenceSession>(&self, session: &mut S, age: i64) -> RepoResult<u64> {
        self.base
            .count_by(session, &self.count_by_age, &Params::positional([age]))
    }

    /// Adds one to the age of every member at or above `age`.
    ///
    /// Managed members keep their old age until the session is cleared.
    pub fn bulk_age_plus<S: PersistenceSession>(&self, session: &mut S, age: i64) -> RepoResult<usize> {
        self.base.bulk(
            session,
            &self.bulk_age_plus,
            &Params::named([("age", age)]),
        )
    }

    /// `username` plus a nested `{ name }` view of the member's team.
    pub fn find_projections_by_username<S: PersistenceSession>(
        &self,
        session: &mut S,
        username: &str,
    ) -> RepoResult<Vec<Projection>> {
        self.base.find_projected(
            session,
            &self.projections_by_username,
            &Params::positional([username]),
            &self.username_with_team,
            &Sort::unsorted(),
        )
    }

    /// Paged `{ id, username, team_name }` rows from a native join.
    pub fn find_by_native_projection<S: PersistenceSession>(
        &self,
        session: &mut S,
        request: &PageRequest,
    ) -> RepoResult<Page<Projection>> {
        self.base.find_projected_page(
            session,
            &self.native_projection,
            &Params::None,
            &self.member_summary,
            request,
        )
    }
}

impl Deref for MemberRepository {
    type Target = EntityRepository<Member>;

    fn deref(&self) -> &Self::Target {
        &self.base
    }
}

fn first_text(row: &Record) -> RepoResult<String> {
    match row.first() {
        Some(Value::Text(value)) => Ok(value.clone()),
        other => Err(RepoError::InvalidData(format!(
            "expected a text column, got {other:?}"
        ))),
    }
}
