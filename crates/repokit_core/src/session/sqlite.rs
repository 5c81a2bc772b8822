//! SQLite-backed persistence session.
//!
//! # Responsibility
//! - Own the identity map and the write-behind queue for one unit of work.
//! - Translate entity images into INSERT/UPDATE/DELETE statements.
//!
//! # Invariants
//! - Generated identifiers come from `id_sequences` and are assigned at
//!   registration, so callers see them before the row exists.
//! - A failed INSERT evicts the offending entry; the error is returned and
//!   later flushes do not retry it.
//! - Log lines carry table names, keys and counts only, never column values.

use crate::db::DbError;
use crate::model::audit::{CREATED_AT, CREATED_BY};
use crate::model::entity::{Entity, EntityId, EntityMeta, IdStrategy, Record};
use crate::query::Statement;
use crate::repo::{RepoError, RepoResult};
use crate::session::identity_map::{EntityKey, IdentityMap, ManagedEntry};
use crate::session::{EntityState, FlushMode, PersistHook, PersistenceSession};
use log::{debug, error, info};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use std::time::Instant;

const NEXT_ID_SQL: &str = "INSERT INTO id_sequences (name, next_val) VALUES (?1, 2)
ON CONFLICT(name) DO UPDATE SET next_val = next_val + 1
RETURNING next_val - 1;";

/// Unit of work over one borrowed connection.
pub struct SqliteSession<'conn> {
    conn: &'conn Connection,
    identity_map: IdentityMap,
    hooks: Vec<Box<dyn PersistHook + 'conn>>,
    flush_mode: FlushMode,
}

impl<'conn> SqliteSession<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self {
            conn,
            identity_map: IdentityMap::default(),
            hooks: Vec::new(),
            flush_mode: FlushMode::default(),
        }
    }

    /// Adds a write-path hook. Hooks run in registration order.
    pub fn with_hook(mut self, hook: impl PersistHook + 'conn) -> Self {
        self.hooks.push(Box::new(hook));
        self
    }

    pub fn with_flush_mode(mut self, flush_mode: FlushMode) -> Self {
        self.flush_mode = flush_mode;
        self
    }

    pub fn flush_mode(&self) -> FlushMode {
        self.flush_mode
    }

    pub fn connection(&self) -> &'conn Connection {
        self.conn
    }

    fn auto_flush(&mut self) -> RepoResult<()> {
        if self.flush_mode == FlushMode::Auto && self.identity_map.has_pending_writes() {
            self.flush()?;
        }
        Ok(())
    }
}

impl PersistenceSession for SqliteSession<'_> {
    fn insert<E: Entity>(&mut self, entity: &mut E) -> RepoResult<()> {
        let meta = E::meta();
        if entity.id().is_none() {
            match meta.id_strategy {
                IdStrategy::Generated => entity.assign_id(next_id(self.conn, meta)?),
                IdStrategy::Assigned => {
                    return Err(RepoError::InvalidArgument(format!(
                        "{} requires an assigned identifier before insert",
                        meta.name
                    )));
                }
            }
        }
        let key = require_key(entity)?;
        if self.identity_map.contains(&key) {
            return Err(RepoError::ConstraintViolation {
                target: key.to_string(),
                message: "identifier is already managed by this session".to_string(),
            });
        }

        debug!(
            "event=entity_register module=session status=ok entity={} key={key} state=new",
            meta.name
        );
        self.identity_map.register_new(key, Box::new(entity.clone()));
        Ok(())
    }

    fn update<E: Entity>(&mut self, entity: &E) -> RepoResult<()> {
        let meta = E::meta();
        let key = require_key(entity)?;
        if self.identity_map.replace(&key, Box::new(entity.clone())) {
            return Ok(());
        }
        if !row_exists(self.conn, meta, &key.id)? {
            return Err(RepoError::NotFound {
                table: meta.table,
                id: key.id,
            });
        }

        debug!(
            "event=entity_merge module=session status=ok entity={} key={key}",
            meta.name
        );
        self.identity_map
            .register_persisted(key, Box::new(entity.clone()), true);
        Ok(())
    }

    fn find_by_id<E: Entity>(&mut self, id: &EntityId) -> RepoResult<Option<E>> {
        let meta = E::meta();
        let key = EntityKey::new(meta, id.clone());
        if let Some(entry) = self.identity_map.get(&key) {
            return downcast_entry(entry, &key).map(Some);
        }

        let Some(record) = select_by_id(self.conn, meta, id)? else {
            return Ok(None);
        };
        let entity = E::from_record(&record)?;
        self.identity_map
            .register_persisted(key, Box::new(entity.clone()), false);
        Ok(Some(entity))
    }

    fn find_record(
        &mut self,
        meta: &'static EntityMeta,
        id: &EntityId,
    ) -> RepoResult<Option<Record>> {
        let key = EntityKey::new(meta, id.clone());
        if let Some(entry) = self.identity_map.get(&key) {
            return Ok(Some(entry.object.record()));
        }
        select_by_id(self.conn, meta, id)
    }

    fn delete<E: Entity>(&mut self, entity: &E) -> RepoResult<()> {
        let meta = E::meta();
        let key = require_key(entity)?;
        if self.identity_map.state(&key) == Some(EntityState::New) {
            // Never written; dropping the pending insert is enough.
            self.identity_map.remove(&key);
            return Ok(());
        }

        let sql = format!("DELETE FROM {} WHERE {} = ?1;", meta.table, meta.id_column);
        let changed = self
            .conn
            .execute(&sql, [key.id.to_value()])
            .map_err(|err| map_write_error(err, &key.to_string()))?;
        self.identity_map.remove(&key);
        if changed == 0 {
            return Err(RepoError::NotFound {
                table: meta.table,
                id: key.id,
            });
        }

        debug!(
            "event=entity_delete module=session status=ok entity={} key={key}",
            meta.name
        );
        Ok(())
    }

    fn detach<E: Entity>(&mut self, entity: &E) {
        if let Some(key) = EntityKey::of(entity) {
            self.identity_map.remove(&key);
        }
    }

    fn manage<E: Entity>(&mut self, record: Record) -> RepoResult<E> {
        let meta = E::meta();
        let id = record
            .get(meta.id_column)
            .and_then(EntityId::from_value)
            .ok_or_else(|| {
                RepoError::InvalidData(format!(
                    "row of `{}` has no identifier column `{}`",
                    meta.table, meta.id_column
                ))
            })?;
        let key = EntityKey::new(meta, id);
        if let Some(entry) = self.identity_map.get(&key) {
            return downcast_entry(entry, &key);
        }

        let entity = E::from_record(&record)?;
        self.identity_map
            .register_persisted(key, Box::new(entity.clone()), false);
        Ok(entity)
    }

    fn state_of<E: Entity>(&self, entity: &E) -> EntityState {
        let tracked = EntityKey::of(entity).and_then(|key| self.identity_map.state(&key));
        match tracked {
            Some(state) => state,
            None if entity.is_new() => EntityState::Transient,
            None => EntityState::Detached,
        }
    }

    fn managed_len(&self) -> usize {
        self.identity_map.len()
    }

    fn execute_query(&mut self, statement: &Statement) -> RepoResult<Vec<Record>> {
        self.auto_flush()?;
        let started_at = Instant::now();

        let mut stmt = self.conn.prepare(&statement.sql)?;
        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        let mut rows = stmt.query(params_from_iter(statement.values.iter()))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Record::new();
            for (index, column) in columns.iter().enumerate() {
                record.push(column.clone(), row.get::<_, Value>(index)?);
            }
            records.push(record);
        }

        debug!(
            "event=query_execute module=session status=ok kind=select rows={} duration_ms={}",
            records.len(),
            started_at.elapsed().as_millis()
        );
        Ok(records)
    }

    fn execute_count(&mut self, statement: &Statement) -> RepoResult<u64> {
        self.auto_flush()?;
        let started_at = Instant::now();

        let count: i64 = self.conn.query_row(
            &statement.sql,
            params_from_iter(statement.values.iter()),
            |row| row.get(0),
        )?;

        debug!(
            "event=query_execute module=session status=ok kind=count total={count} duration_ms={}",
            started_at.elapsed().as_millis()
        );
        u64::try_from(count)
            .map_err(|_| RepoError::InvalidData(format!("negative row count {count}")))
    }

    fn execute_update(&mut self, statement: &Statement) -> RepoResult<usize> {
        self.auto_flush()?;
        let started_at = Instant::now();

        let affected = self
            .conn
            .execute(&statement.sql, params_from_iter(statement.values.iter()))
            .map_err(|err| map_write_error(err, "bulk statement"))?;

        info!(
            "event=query_execute module=session status=ok kind=update affected={affected} duration_ms={}",
            started_at.elapsed().as_millis()
        );
        Ok(affected)
    }

    fn flush(&mut self) -> RepoResult<()> {
        let started_at = Instant::now();
        let mut inserted = 0usize;
        let mut updated = 0usize;

        for key in self.identity_map.pending_inserts() {
            let Some(entry) = self.identity_map.get_mut(&key) else {
                continue;
            };
            let meta = entry.object.meta();
            if let Some(audit) = entry.object.audit_mut() {
                for hook in &self.hooks {
                    hook.pre_persist(meta, audit);
                }
            }
            let record = entry.object.record();

            if let Err(err) = insert_row(self.conn, meta, &record, &key) {
                self.identity_map.remove(&key);
                error!(
                    "event=session_flush module=session status=error phase=insert key={key} error={err}"
                );
                return Err(err);
            }
            self.identity_map.mark_persisted(&key);
            inserted += 1;
        }

        for key in self.identity_map.dirty_keys() {
            let Some(entry) = self.identity_map.get_mut(&key) else {
                continue;
            };
            let meta = entry.object.meta();
            if let Some(audit) = entry.object.audit_mut() {
                for hook in &self.hooks {
                    hook.pre_update(meta, audit);
                }
            }
            let record = entry.object.record();

            if let Err(err) = update_row(self.conn, meta, &record, &key) {
                if matches!(err, RepoError::NotFound { .. }) {
                    self.identity_map.remove(&key);
                }
                error!(
                    "event=session_flush module=session status=error phase=update key={key} error={err}"
                );
                return Err(err);
            }
            self.identity_map.mark_persisted(&key);
            updated += 1;
        }

        if inserted > 0 || updated > 0 {
            info!(
                "event=session_flush module=session status=ok inserted={inserted} updated={updated} duration_ms={}",
                started_at.elapsed().as_millis()
            );
        }
        Ok(())
    }

    fn clear(&mut self) {
        let evicted = self.identity_map.len();
        self.identity_map.clear();
        info!("event=session_clear module=session status=ok evicted={evicted}");
    }
}

fn require_key<E: Entity>(entity: &E) -> RepoResult<EntityKey> {
    EntityKey::of(entity).ok_or_else(|| {
        RepoError::InvalidArgument(format!(
            "{} has no identifier; insert it first",
            E::meta().name
        ))
    })
}

fn downcast_entry<E: Entity>(entry: &ManagedEntry, key: &EntityKey) -> RepoResult<E> {
    entry.downcast::<E>().ok_or_else(|| {
        RepoError::InvalidData(format!("managed entry {key} has a different entity type"))
    })
}

fn next_id(conn: &Connection, meta: &EntityMeta) -> RepoResult<i64> {
    let id = conn.query_row(NEXT_ID_SQL, [meta.table], |row| row.get::<_, i64>(0))?;
    Ok(id)
}

fn select_by_id(
    conn: &Connection,
    meta: &EntityMeta,
    id: &EntityId,
) -> RepoResult<Option<Record>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE {} = ?1;",
        meta.select_list(),
        meta.table,
        meta.id_column
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([id.to_value()])?;
    let Some(row) = rows.next()? else {
        return Ok(None);
    };

    let mut record = Record::new();
    for (index, column) in meta.columns.iter().enumerate() {
        record.push(column.column, row.get::<_, Value>(index)?);
    }
    Ok(Some(record))
}

fn row_exists(conn: &Connection, meta: &EntityMeta, id: &EntityId) -> RepoResult<bool> {
    let sql = format!(
        "SELECT EXISTS(SELECT 1 FROM {} WHERE {} = ?1);",
        meta.table, meta.id_column
    );
    let exists: i64 = conn.query_row(&sql, [id.to_value()], |row| row.get(0))?;
    Ok(exists == 1)
}

fn insert_row(
    conn: &Connection,
    meta: &EntityMeta,
    record: &Record,
    key: &EntityKey,
) -> RepoResult<()> {
    let columns = record.columns().collect::<Vec<_>>();
    let marks = vec!["?"; columns.len()];
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({});",
        meta.table,
        columns.join(", "),
        marks.join(", ")
    );
    conn.execute(&sql, params_from_iter(record.values()))
        .map_err(|err| map_write_error(err, &key.to_string()))?;
    Ok(())
}

fn update_row(
    conn: &Connection,
    meta: &'static EntityMeta,
    record: &Record,
    key: &EntityKey,
) -> RepoResult<()> {
    let mut assignments = Vec::new();
    let mut values: Vec<Value> = Vec::new();
    for (column, value) in record.columns().zip(record.values()) {
        // Creation audit columns are insert-only.
        if column == meta.id_column || column == CREATED_AT || column == CREATED_BY {
            continue;
        }
        assignments.push(format!("{column} = ?"));
        values.push(value.clone());
    }
    if assignments.is_empty() {
        return Ok(());
    }
    values.push(key.id.to_value());

    let sql = format!(
        "UPDATE {} SET {} WHERE {} = ?;",
        meta.table,
        assignments.join(", "),
        meta.id_column
    );
    let changed = conn
        .execute(&sql, params_from_iter(values.iter()))
        .map_err(|err| map_write_error(err, &key.to_string()))?;
    if changed == 0 {
        return Err(RepoError::NotFound {
            table: meta.table,
            id: key.id.clone(),
        });
    }
    Ok(())
}

fn map_write_error(err: rusqlite::Error, target: &str) -> RepoError {
    let err = DbError::from(err);
    if err.is_constraint_violation() {
        return RepoError::ConstraintViolation {
            target: target.to_string(),
            message: err.to_string(),
        };
    }
    RepoError::Db(err)
}
