//! Entity model for the declarative data-access layer.
//!
//! # Responsibility
//! - Define the `Entity` contract and the static table mapping it exposes.
//! - Provide the study domain: `Team`, `Member` (many-to-one `Team`) and
//!   `Item` (assigned identifier).
//!
//! # Invariants
//! - Every persisted entity is identified by one `EntityId`.
//! - References between entities are explicit `Ref<T>` handles.

pub mod audit;
pub mod entity;
pub mod item;
pub mod member;
pub mod reference;
pub mod team;
