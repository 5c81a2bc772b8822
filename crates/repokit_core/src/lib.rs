//! Declarative data access over SQLite: query derivation, paging and
//! slicing, projections, auditing and bulk mutation on top of an explicit
//! persistence session.

pub mod auditing;
pub mod bulk;
pub mod db;
pub mod logging;
pub mod model;
pub mod paging;
pub mod projection;
pub mod query;
pub mod repo;
pub mod session;

pub use auditing::{
    ActorContext, ActorProvider, ActorResolutionError, AuditingHook, Clock, StaticActor,
    SystemClock,
};
pub use bulk::{execute_bulk, BulkMutation, UpdateExpr};
pub use logging::{
    default_log_level, init_logging, init_logging_with, logging_status, LoggingConfig,
    LoggingError,
};
pub use model::audit::AuditFields;
pub use model::entity::{Entity, EntityId, EntityMeta, IdStrategy, Record, RecordError};
pub use model::item::Item;
pub use model::member::{Member, MemberDto};
pub use model::reference::Ref;
pub use model::team::Team;
pub use paging::{Page, PageRequest, Slice};
pub use projection::{
    ProjectedValue, Projection, ProjectionDepthError, ProjectionMappingError, ProjectionShape,
};
pub use query::derive::DerivedQuery;
pub use query::error::{DerivationError, ParameterBindingError};
pub use query::params::{Arg, Params};
pub use query::sort::{Direction, Order, Sort};
pub use query::template::QueryTemplate;
pub use query::QueryDescriptor;
pub use repo::{EntityRepository, MemberRepository, RepoError, RepoResult, TeamRepository};
pub use session::{EntityState, FlushMode, PersistHook, PersistenceSession, SqliteSession};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
