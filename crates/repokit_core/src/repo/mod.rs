//! Repository layer over a `PersistenceSession`.
//!
//! # Responsibility
//! - Offer CRUD plus declared-query operations per entity type.
//! - Keep SQL rendering in `query` and store access in `session`.
//!
//! # Invariants
//! - Repositories hold no session state; every call receives the session
//!   explicitly.
//! - Declared queries are validated when the repository is constructed,
//!   not when a method is first called.

mod entity_repo;
mod error;
mod member_repo;

pub use entity_repo::{EntityRepository, TeamRepository};
pub use error::{RepoError, RepoResult};
pub use member_repo::MemberRepository;
