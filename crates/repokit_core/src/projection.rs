//! Projection shapes and row-to-projection mapping.
//!
//! # Responsibility
//! - Describe a partial view of an entity (`ProjectionShape`), optionally
//!   with one nested view of a referenced entity.
//! - Copy only the declared fields out of a row, resolving nested
//!   references through the session.
//!
//! # Invariants
//! - Nesting deeper than one level is rejected when the shape is built
//!   (`ProjectionDepthError`), never while mapping rows.
//! - Native rows are matched to fields by name; a missing column is a
//!   `ProjectionMappingError`.
//! - Projections are read-only values and never enter the identity map.

use crate::model::entity::{Entity, EntityId, EntityMeta, Record};
use crate::repo::RepoResult;
use crate::session::PersistenceSession;
use rusqlite::types::Value;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Shape nests a reference below an already nested level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectionDepthError {
    pub shape: String,
    pub field: String,
}

impl Display for ProjectionDepthError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "projection `{}` nests `{}` deeper than one level",
            self.shape, self.field
        )
    }
}

impl Error for ProjectionDepthError {}

/// Declared field cannot be read from the shape's source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectionMappingError {
    pub shape: String,
    pub field: String,
    pub reason: &'static str,
}

impl ProjectionMappingError {
    pub(crate) fn new(shape: &str, field: &str, reason: &'static str) -> Self {
        Self {
            shape: shape.to_string(),
            field: field.to_string(),
            reason,
        }
    }
}

impl Display for ProjectionMappingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "cannot map `{}` of projection `{}`: {}",
            self.field, self.shape, self.reason
        )
    }
}

impl Error for ProjectionMappingError {}

#[derive(Debug, Clone)]
enum ShapeField {
    Column {
        name: String,
        column: String,
    },
    Nested {
        name: String,
        column: String,
        shape: ProjectionShape,
    },
}

impl ShapeField {
    fn name(&self) -> &str {
        match self {
            Self::Column { name, .. } | Self::Nested { name, .. } => name,
        }
    }

    fn column(&self) -> &str {
        match self {
            Self::Column { column, .. } | Self::Nested { column, .. } => column,
        }
    }
}

/// Validated projection shape.
#[derive(Debug, Clone)]
pub struct ProjectionShape {
    name: String,
    meta: Option<&'static EntityMeta>,
    fields: Vec<ShapeField>,
}

impl ProjectionShape {
    /// Starts a shape over `meta`'s fields.
    pub fn builder(meta: &'static EntityMeta) -> ProjectionShapeBuilder {
        ProjectionShapeBuilder {
            shape: Self {
                name: meta.name.to_string(),
                meta: Some(meta),
                fields: Vec::new(),
            },
            error: None,
        }
    }

    /// Flat shape for native rows: each field reads the column of the same
    /// name (use SQL aliases to line them up).
    pub fn native<I, S>(name: &str, fields: I) -> Result<Self, ProjectionMappingError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut shape = Self {
            name: name.to_string(),
            meta: None,
            fields: Vec::new(),
        };
        for field in fields {
            let field = field.into();
            if shape.fields.iter().any(|existing| existing.name() == field) {
                return Err(ProjectionMappingError::new(name, &field, "declared twice"));
            }
            shape.fields.push(ShapeField::Column {
                column: field.clone(),
                name: field,
            });
        }
        if shape.fields.is_empty() {
            return Err(ProjectionMappingError::new(name, "", "shape declares no fields"));
        }
        Ok(shape)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Entity the shape was built against; `None` for native shapes.
    pub fn meta(&self) -> Option<&'static EntityMeta> {
        self.meta
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(ShapeField::name).collect()
    }

    /// Source columns needed to fill this shape, reference columns included.
    pub fn columns(&self) -> Vec<&str> {
        self.fields.iter().map(ShapeField::column).collect()
    }

    pub fn is_flat(&self) -> bool {
        self.fields
            .iter()
            .all(|field| matches!(field, ShapeField::Column { .. }))
    }
}

/// Builder for entity-backed shapes; the first error wins.
#[derive(Debug, Clone)]
pub struct ProjectionShapeBuilder {
    shape: ProjectionShape,
    error: Option<ShapeBuildError>,
}

#[derive(Debug, Clone)]
enum ShapeBuildError {
    Depth(ProjectionDepthError),
    Mapping(ProjectionMappingError),
}

impl ProjectionShapeBuilder {
    pub fn field(mut self, name: &str) -> Self {
        let Some(meta) = self.shape.meta else {
            return self;
        };
        match meta.field(name) {
            Some(column) => self.shape.fields.push(ShapeField::Column {
                name: column.field.to_string(),
                column: column.column.to_string(),
            }),
            None => self.fail_mapping(name, "unknown field"),
        }
        self
    }

    /// Adds a nested view of the entity referenced by `name`.
    pub fn nested(mut self, name: &str, shape: ProjectionShape) -> Self {
        let Some(meta) = self.shape.meta else {
            return self;
        };
        let Some(column) = meta.field(name) else {
            self.fail_mapping(name, "unknown field");
            return self;
        };
        let Some(target) = column.references else {
            self.fail_mapping(name, "field is not a reference");
            return self;
        };
        let matches_target = shape.meta.is_some_and(|nested| nested.same_as(target));
        if !matches_target {
            self.fail_mapping(name, "nested shape targets a different entity");
            return self;
        }
        if !shape.is_flat() {
            if self.error.is_none() {
                self.error = Some(ShapeBuildError::Depth(ProjectionDepthError {
                    shape: self.shape.name.clone(),
                    field: name.to_string(),
                }));
            }
            return self;
        }

        self.shape.fields.push(ShapeField::Nested {
            name: column.field.to_string(),
            column: column.column.to_string(),
            shape,
        });
        self
    }

    pub fn build(self) -> RepoResult<ProjectionShape> {
        match self.error {
            Some(ShapeBuildError::Depth(err)) => Err(err.into()),
            Some(ShapeBuildError::Mapping(err)) => Err(err.into()),
            None if self.shape.fields.is_empty() => Err(ProjectionMappingError::new(
                &self.shape.name,
                "",
                "shape declares no fields",
            )
            .into()),
            None => Ok(self.shape),
        }
    }

    fn fail_mapping(&mut self, field: &str, reason: &'static str) {
        if self.error.is_none() {
            self.error = Some(ShapeBuildError::Mapping(ProjectionMappingError::new(
                &self.shape.name,
                field,
                reason,
            )));
        }
    }
}

/// One projected field value.
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectedValue {
    Value(Value),
    /// Nested view; `None` when the reference is empty.
    Nested(Option<Projection>),
}

/// Partial, read-only view of one row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Projection {
    values: Vec<(String, ProjectedValue)>,
}

impl Projection {
    pub fn get(&self, field: &str) -> Option<&ProjectedValue> {
        self.values
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    pub fn value(&self, field: &str) -> Option<&Value> {
        match self.get(field) {
            Some(ProjectedValue::Value(value)) => Some(value),
            _ => None,
        }
    }

    pub fn get_i64(&self, field: &str) -> Option<i64> {
        match self.value(field) {
            Some(Value::Integer(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn get_text(&self, field: &str) -> Option<&str> {
        match self.value(field) {
            Some(Value::Text(value)) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn nested(&self, field: &str) -> Option<&Projection> {
        match self.get(field) {
            Some(ProjectedValue::Nested(nested)) => nested.as_ref(),
            _ => None,
        }
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(name, _)| name.as_str())
    }

    fn push(&mut self, name: &str, value: ProjectedValue) {
        self.values.push((name.to_string(), value));
    }
}

impl Serialize for Projection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in &self.values {
            match value {
                ProjectedValue::Nested(nested) => map.serialize_entry(name, nested)?,
                ProjectedValue::Value(Value::Null) => map.serialize_entry(name, &None::<()>)?,
                ProjectedValue::Value(Value::Integer(value)) => map.serialize_entry(name, value)?,
                ProjectedValue::Value(Value::Real(value)) => map.serialize_entry(name, value)?,
                ProjectedValue::Value(Value::Text(value)) => map.serialize_entry(name, value)?,
                ProjectedValue::Value(Value::Blob(value)) => map.serialize_entry(name, value)?,
            }
        }
        map.end()
    }
}

/// Projects one row of the shape's entity, loading nested references
/// through the session (identity map first).
pub fn project_record<S: PersistenceSession>(
    session: &mut S,
    shape: &ProjectionShape,
    record: &Record,
) -> RepoResult<Projection> {
    let mut projection = Projection::default();
    for field in &shape.fields {
        match field {
            ShapeField::Column { name, column } => {
                let value = record.get(column).ok_or_else(|| {
                    ProjectionMappingError::new(&shape.name, name, "column missing from row")
                })?;
                projection.push(name, ProjectedValue::Value(value.clone()));
            }
            ShapeField::Nested {
                name,
                column,
                shape: nested,
            } => {
                let value = record.get(column).ok_or_else(|| {
                    ProjectionMappingError::new(&shape.name, name, "column missing from row")
                })?;
                let resolved = match (EntityId::from_value(value), nested.meta) {
                    (Some(id), Some(target)) => match session.find_record(target, &id)? {
                        Some(row) => Some(project_record(session, nested, &row)?),
                        None => None,
                    },
                    _ => None,
                };
                projection.push(name, ProjectedValue::Nested(resolved));
            }
        }
    }
    Ok(projection)
}

/// Projects an already materialised entity.
pub fn project_entity<S: PersistenceSession, E: Entity>(
    session: &mut S,
    shape: &ProjectionShape,
    entity: &E,
) -> RepoResult<Projection> {
    let matches_entity = shape.meta.is_some_and(|meta| meta.same_as(E::meta()));
    if !matches_entity {
        return Err(ProjectionMappingError::new(
            &shape.name,
            E::meta().name,
            "shape was built for a different entity",
        )
        .into());
    }
    project_record(session, shape, &entity.to_record())
}

/// Maps a native row by field name. Only flat shapes are accepted.
pub fn map_native(
    shape: &ProjectionShape,
    record: &Record,
) -> Result<Projection, ProjectionMappingError> {
    let mut projection = Projection::default();
    for field in &shape.fields {
        match field {
            ShapeField::Column { name, .. } => {
                let value = record.get(name).ok_or_else(|| {
                    ProjectionMappingError::new(&shape.name, name, "column missing from row")
                })?;
                projection.push(name, ProjectedValue::Value(value.clone()));
            }
            ShapeField::Nested { name, .. } => {
                return Err(ProjectionMappingError::new(
                    &shape.name,
                    name,
                    "nested fields need an entity query",
                ));
            }
        }
    }
    Ok(projection)
}
