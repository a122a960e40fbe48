//! Session Module
//!
//! One unit of work: entity creation, saves and deletes, and every read
//! path, all sharing a per-session identity cache.
//!
//! ## Responsibilities
//! - Create entities and drive them through save / delete / refresh
//! - Fetch by primary key (cache first, batched misses)
//! - Fetch by unique or range-indexed column, delegating the rest to [`Query`]
//! - On-delete handling for inbound references
//! - Explicit teardown (`rollback` / `clear`)
//!
//! ## Identity Cache
//! ```text
//!   "<ns>:<id>" ──▶ Weak<entity state>
//!
//!   get(5) ──▶ hit? ──yes──▶ same instance as every earlier get(5)
//!                │
//!                no ──▶ HGETALL (batched) ──▶ rebuild ──▶ cache
//! ```
//! The cache never keeps an entity alive; dropping the last handle drops
//! the instance.

use std::collections::{HashMap, HashSet, VecDeque};
use std::ops::Bound;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::apply::apply_changes;
use crate::column::{Column, ColumnKind, OnDelete, Value};
use crate::config::Config;
use crate::delta::{ApplyMode, RawRow, Row};
use crate::entity::{Entity, EntityState};
use crate::error::{ModelError, Result};
use crate::keys;
use crate::query::Query;
use crate::schema::{Registry, Schema};
use crate::store::Store;

/// Value selector for [`Session::get_by`]
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// Single value
    Eq(Value),

    /// Any of several values (unique lookups return them in order)
    Any(Vec<Value>),

    /// Inclusive score range; `None` is open-ended
    Range(Option<Value>, Option<Value>),
}

/// Options for [`Session::get_by`]
#[derive(Debug, Clone, Copy, Default)]
pub struct GetByOptions {
    /// `(offset, count)` pagination for range scans and delegated queries
    pub limit: Option<(i64, i64)>,

    /// Prefer the range index over the unique index when a column has both
    pub numeric: bool,
}

impl GetByOptions {
    pub fn limit(offset: i64, count: i64) -> Self {
        Self {
            limit: Some((offset, count)),
            numeric: false,
        }
    }

    pub fn numeric(mut self) -> Self {
        self.numeric = true;
        self
    }
}

struct CacheEntry {
    schema: Arc<Schema>,
    state: Weak<Mutex<EntityState>>,
}

/// A unit of work over one database
pub struct Session {
    store: Arc<dyn Store>,
    registry: Arc<Registry>,
    config: Config,
    cache: Mutex<HashMap<String, CacheEntry>>,

    /// Created but never saved; held strongly until commit or rollback
    pending: Mutex<Vec<Entity>>,
}

impl Session {
    pub(crate) fn new(store: Arc<dyn Store>, registry: Arc<Registry>, config: Config) -> Self {
        Self {
            store,
            registry,
            config,
            cache: Mutex::new(HashMap::new()),
            pending: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn store(&self) -> &dyn Store {
        &*self.store
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Build a new, unsaved entity
    ///
    /// Values are type-checked, column defaults fill anything not given. The
    /// primary key is assigned by the store on first save and cannot be
    /// passed here.
    pub fn create<I, K, V>(&self, schema: &Arc<Schema>, fields: I) -> Result<Entity>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut data = Row::new();
        for (name, value) in fields {
            let name = name.into();
            let column = schema.column(&name).ok_or_else(|| {
                ModelError::Column(format!("{} has no column {:?}", schema.name(), name))
            })?;
            if column.is_primary_key() {
                return Err(ModelError::InvalidOperation(format!(
                    "Cannot set the primary key {}.{} of a new entity",
                    schema.name(),
                    name
                )));
            }
            if column.is_virtual() {
                return Err(ModelError::Column(format!(
                    "Cannot assign to OneToMany column {}.{}",
                    schema.name(),
                    name
                )));
            }
            let value = column.coerce(value.into())?;
            if !value.is_null() {
                data.insert(name, value);
            }
        }

        for (attr, column) in schema.stored_columns() {
            if data.contains_key(attr) {
                continue;
            }
            if let Some(default) = column.initial_value() {
                data.insert(attr.to_string(), column.coerce(default.clone())?);
            }
        }

        let entity = Entity::unsaved(Arc::clone(schema), data);
        self.pending.lock().push(entity.clone());
        Ok(entity)
    }

    /// Persist the entity's changes; returns the number of changed columns
    ///
    /// `full` rewrites every column instead of only the changed ones. New
    /// entities are always written in full.
    pub fn save(&self, entity: &Entity, full: bool) -> Result<usize> {
        if entity.is_deleted() {
            return Err(ModelError::InvalidOperation(
                "Cannot save a deleted entity".to_string(),
            ));
        }

        let schema = Arc::clone(entity.schema());
        let pkey = schema.pkey();
        let (mut data, last) = entity.snapshot();

        for attr in schema.required() {
            if attr != pkey && data.get(attr).map_or(true, Value::is_null) {
                return Err(ModelError::MissingColumn(format!("{}.{}", schema.name(), attr)));
            }
        }

        let is_new = entity.is_new();
        if is_new && data.get(pkey).map_or(true, Value::is_null) {
            let id = self.store.incr(&keys::counter_key(schema.namespace(), pkey))?;
            entity.with_state(|state| state.data.insert(pkey.to_string(), Value::Integer(id)));
            data.insert(pkey.to_string(), Value::Integer(id));
        }

        let mode = if full || is_new {
            ApplyMode::Full
        } else {
            ApplyMode::Partial
        };
        let (changes, raw) = apply_changes(
            &*self.store,
            &schema,
            &last,
            &data,
            mode,
            self.config.use_scripting,
        )?;

        entity.mark_saved(raw);
        self.pending.lock().retain(|e| !e.same_instance(entity));
        self.remember(entity);
        Ok(changes)
    }

    /// Delete the entity and everything it owns in the store
    ///
    /// The whole on-delete graph is walked first. A `Restrict` reference
    /// anywhere in it fails the delete before anything is written; then
    /// `SetNull` rows are saved and cascaded rows deleted, dependents first.
    pub fn delete(&self, entity: &Entity) -> Result<()> {
        if entity.is_deleted() {
            return Ok(());
        }
        if entity.is_new() {
            return Err(ModelError::InvalidOperation(format!(
                "Cannot delete an unsaved {}",
                entity.schema().name()
            )));
        }

        let plan = self.plan_delete(entity)?;
        for (_, other, columns) in &plan.set_null {
            for column in columns {
                other.set(column, Value::Null)?;
            }
            self.save(other, false)?;
        }
        for doomed in plan.delete.iter().rev() {
            self.delete_one(doomed)?;
        }
        Ok(())
    }

    fn delete_one(&self, entity: &Entity) -> Result<()> {
        if entity.is_deleted() {
            return Ok(());
        }
        let schema = Arc::clone(entity.schema());
        self.forget(entity);
        let (_, last) = entity.snapshot();
        apply_changes(
            &*self.store,
            &schema,
            &last,
            &Row::new(),
            ApplyMode::Delete,
            self.config.use_scripting,
        )?;
        entity.mark_deleted();
        tracing::debug!("deleted {}:{:?}", schema.namespace(), entity.id());
        Ok(())
    }

    /// Reload an entity from the store
    ///
    /// No-op for deleted entities. Unsaved entities cannot be refreshed, and
    /// modified ones only with `force`.
    pub fn refresh(&self, entity: &Entity, force: bool) -> Result<()> {
        if entity.is_deleted() {
            return Ok(());
        }
        if entity.is_new() {
            return Err(ModelError::InvalidOperation(
                "Cannot refresh a new entity".to_string(),
            ));
        }
        if entity.is_modified() && !force {
            return Err(ModelError::InvalidOperation(
                "Cannot refresh a modified entity without force".to_string(),
            ));
        }

        let Some(key) = entity.cache_key() else {
            return Err(ModelError::Column("Missing primary key value".to_string()));
        };
        let raw: RawRow = self.store.hgetall(&key)?.into_iter().collect();
        if raw.is_empty() {
            return Err(ModelError::InvalidOperation(format!("{} no longer exists", key)));
        }
        entity.reload(raw)
    }

    /// New unsaved entity with the same values, minus the primary key
    pub fn copy(&self, entity: &Entity) -> Result<Entity> {
        let schema = entity.schema();
        let mut data = entity.to_map();
        data.remove(schema.pkey());
        self.create(schema, data)
    }

    /// Save every pending or modified entity this session knows about
    ///
    /// Returns the number of entities written. Stops at the first error;
    /// entities saved before it stay saved.
    pub fn commit(&self) -> Result<usize> {
        let mut dirty: Vec<Entity> = self.pending.lock().clone();
        for entity in self.live_entities() {
            if !dirty.iter().any(|e| e.same_instance(&entity)) {
                dirty.push(entity);
            }
        }

        let mut saved = 0;
        for entity in dirty {
            if entity.is_deleted() || !(entity.is_new() || entity.is_modified()) {
                continue;
            }
            self.save(&entity, false)?;
            saved += 1;
        }
        tracing::debug!("session commit saved {} entities", saved);
        Ok(saved)
    }

    /// Drop pending entities and forget every cached instance
    pub fn rollback(&self) {
        self.pending.lock().clear();
        self.clear();
    }

    /// Forget every cached instance
    pub fn clear(&self) {
        self.cache.lock().clear();
    }

    // =========================================================================
    // Retrieval
    // =========================================================================

    /// Fetch one entity by primary key
    pub fn get(&self, schema: &Arc<Schema>, id: i64) -> Result<Option<Entity>> {
        Ok(self.get_many(schema, &[id])?.into_iter().next())
    }

    /// Fetch entities by primary key, in input order
    ///
    /// Cached instances are returned as-is; misses are loaded with batched
    /// HGETALLs. Ids that do not exist are left out.
    pub fn get_many(&self, schema: &Arc<Schema>, ids: &[i64]) -> Result<Vec<Entity>> {
        let ns = schema.namespace();
        let keys: Vec<String> = ids
            .iter()
            .map(|id| keys::row_key(ns, &id.to_string()))
            .collect();

        let mut out: Vec<Option<Entity>> = keys.iter().map(|key| self.cached(key)).collect();
        let misses: Vec<usize> = (0..out.len()).filter(|&i| out[i].is_none()).collect();
        tracing::trace!(
            "{} lookup: {} cached, {} to fetch",
            ns,
            ids.len() - misses.len(),
            misses.len()
        );

        for chunk in misses.chunks(self.config.fetch_batch_size) {
            let batch: Vec<String> = chunk.iter().map(|&i| keys[i].clone()).collect();
            let rows = self.store.hgetall_many(&batch)?;
            for (&i, raw) in chunk.iter().zip(rows) {
                if raw.is_empty() {
                    continue;
                }
                // Repeated ids resolve to the instance loaded first
                let entity = match self.cached(&keys[i]) {
                    Some(entity) => entity,
                    None => {
                        let entity = Entity::loaded(Arc::clone(schema), raw.into_iter().collect())?;
                        self.remember(&entity);
                        entity
                    }
                };
                out[i] = Some(entity);
            }
        }

        Ok(out.into_iter().flatten().collect())
    }

    /// Fetch entities through one unique or indexed column
    ///
    /// - unique column (unless `numeric` forces the range index): point
    ///   lookups in the unique hash
    /// - indexed column with a numeric value or a range: score scan
    /// - any other indexed lookup: delegated to [`Query`]
    pub fn get_by(
        &self,
        schema: &Arc<Schema>,
        column: &str,
        lookup: Lookup,
        options: GetByOptions,
    ) -> Result<Vec<Entity>> {
        let limit = match options.limit {
            Some((offset, count)) if offset < 0 || count < 0 => {
                return Err(ModelError::Request(format!(
                    "Limit offset and count must not be negative, got ({}, {})",
                    offset, count
                )))
            }
            Some((offset, count)) => Some((offset as usize, count as usize)),
            None => None,
        };
        let declared = schema.column(column).ok_or_else(|| {
            ModelError::Request(format!("{} has no column {:?}", schema.name(), column))
        })?;
        let ns = schema.namespace();

        if schema.is_unique(column) && (!schema.is_indexed(column) || !options.numeric) {
            let values = match lookup {
                Lookup::Eq(value) => vec![value],
                Lookup::Any(values) => values,
                Lookup::Range(..) => {
                    return Err(ModelError::Request(
                        "Cannot query a unique index with a range of values".to_string(),
                    ))
                }
            };
            let mut raw = Vec::with_capacity(values.len());
            for value in &values {
                if let Some(encoded) = declared.to_storage(value)? {
                    raw.push(encoded);
                }
            }
            if raw.is_empty() {
                return Ok(Vec::new());
            }
            let ids: Vec<i64> = self
                .store
                .hmget(&keys::unique_key(ns, column), &raw)?
                .into_iter()
                .flatten()
                .filter_map(|id| id.parse().ok())
                .collect();
            return self.get_many(schema, &ids);
        }

        if !schema.is_indexed(column) {
            return Err(ModelError::Request(format!(
                "Cannot query on column {}.{} without an index",
                schema.name(),
                column
            )));
        }

        let range = match &lookup {
            Lookup::Eq(value) if value.is_numeric() => Some((Some(value), Some(value))),
            Lookup::Range(min, max) => Some((min.as_ref(), max.as_ref())),
            _ => None,
        };
        if let Some((min, max)) = range {
            let min = score_bound(declared, min)?;
            let max = score_bound(declared, max)?;
            let ids: Vec<i64> = self
                .store
                .zrange_by_score(&keys::index_key(ns, column), min, max, limit)?
                .into_iter()
                .filter_map(|(id, _)| id.parse().ok())
                .collect();
            return self.get_many(schema, &ids);
        }

        let query = match lookup {
            Lookup::Any(values) => Query::new(schema).filter_any(column, values),
            Lookup::Eq(value) => Query::new(schema).filter(column, value),
            Lookup::Range(..) => {
                return Err(ModelError::Request(
                    "Range lookups need a numeric index".to_string(),
                ))
            }
        };
        match limit {
            Some((offset, count)) => query.limit(offset, count).all(self),
            None => query.all(self),
        }
    }

    /// Fetch at most one entity through a unique or indexed column
    pub fn get_one_by(
        &self,
        schema: &Arc<Schema>,
        column: &str,
        value: impl Into<Value>,
    ) -> Result<Option<Entity>> {
        Ok(self
            .get_by(schema, column, Lookup::Eq(value.into()), GetByOptions::default())?
            .into_iter()
            .next())
    }

    /// Resolve a OneToMany column to the entities referencing `entity`
    pub fn related(&self, entity: &Entity, column: &str) -> Result<Vec<Entity>> {
        let schema = entity.schema();
        let (target, join) = match schema.column(column).map(Column::kind) {
            Some(ColumnKind::OneToMany { target, column }) => (target, column),
            _ => {
                return Err(ModelError::Column(format!(
                    "{}.{} is not a OneToMany column",
                    schema.name(),
                    column
                )))
            }
        };
        let target = self.registry.get(target).ok_or_else(|| {
            ModelError::InvalidOperation(format!("Model {} is not registered", target))
        })?;
        let join = match join {
            Some(join) => join.clone(),
            None => back_reference(&target, schema.name())?,
        };

        match entity.id() {
            Some(id) => self.referencing(&target, &join, id),
            None => Ok(Vec::new()),
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn cached(&self, key: &str) -> Option<Entity> {
        if !self.config.identity_cache {
            return None;
        }
        let mut cache = self.cache.lock();
        let entry = cache.get(key)?;
        match Entity::upgrade(&entry.schema, &entry.state) {
            Some(entity) => Some(entity),
            None => {
                cache.remove(key);
                None
            }
        }
    }

    fn remember(&self, entity: &Entity) {
        if !self.config.identity_cache {
            return;
        }
        if let Some(key) = entity.cache_key() {
            self.cache.lock().insert(
                key,
                CacheEntry {
                    schema: Arc::clone(entity.schema()),
                    state: entity.downgrade(),
                },
            );
        }
    }

    fn forget(&self, entity: &Entity) {
        if let Some(key) = entity.cache_key() {
            self.cache.lock().remove(&key);
        }
    }

    fn live_entities(&self) -> Vec<Entity> {
        let mut cache = self.cache.lock();
        cache.retain(|_, entry| entry.state.strong_count() > 0);
        cache
            .values()
            .filter_map(|entry| Entity::upgrade(&entry.schema, &entry.state))
            .collect()
    }

    /// Entities of `source` whose reference `column` holds `id`
    fn referencing(&self, source: &Arc<Schema>, column: &str, id: i64) -> Result<Vec<Entity>> {
        let score = id as f64;
        let ids: Vec<i64> = self
            .store
            .zrange_by_score(
                &keys::index_key(source.namespace(), column),
                Bound::Included(score),
                Bound::Included(score),
                None,
            )?
            .into_iter()
            .filter_map(|(id, _)| id.parse().ok())
            .collect();
        self.get_many(source, &ids)
    }

    /// Walk inbound references breadth-first from `root`
    ///
    /// Rows are keyed by `<ns>:<id>` so reference cycles end. Restrictions
    /// are resolved once the walk is complete: a restricting row that is
    /// itself cascaded away does not block the delete.
    fn plan_delete(&self, root: &Entity) -> Result<DeletePlan> {
        let mut seen: HashSet<String> = root.cache_key().into_iter().collect();
        let mut plan = DeletePlan {
            delete: vec![root.clone()],
            set_null: Vec::new(),
        };
        let mut restricted: Vec<(String, String)> = Vec::new();
        let mut queue = VecDeque::from([root.clone()]);

        while let Some(current) = queue.pop_front() {
            let schema = Arc::clone(current.schema());
            let Some(id) = current.id() else {
                continue;
            };
            for reference in self.registry.references_to(schema.name()) {
                if reference.on_delete == OnDelete::NoAction {
                    continue;
                }
                let Some(source) = self.registry.get(&reference.namespace) else {
                    continue;
                };
                for other in self.referencing(&source, &reference.column, id)? {
                    let Some(key) = other.cache_key() else {
                        continue;
                    };
                    match reference.on_delete {
                        OnDelete::Cascade => {
                            if seen.insert(key) {
                                plan.delete.push(other.clone());
                                queue.push_back(other);
                            }
                        }
                        OnDelete::Restrict => {
                            let reason = format!(
                                "{}:{} is referenced by {} through {}.{}",
                                schema.namespace(),
                                id,
                                key,
                                source.name(),
                                reference.column
                            );
                            restricted.push((key, reason));
                        }
                        OnDelete::SetNull => {
                            match plan.set_null.iter_mut().find(|(k, _, _)| *k == key) {
                                Some((_, _, columns)) => columns.push(reference.column.clone()),
                                None => plan
                                    .set_null
                                    .push((key, other, vec![reference.column.clone()])),
                            }
                        }
                        OnDelete::NoAction => {}
                    }
                }
            }
        }

        if let Some((_, reason)) = restricted.into_iter().find(|(key, _)| !seen.contains(key)) {
            return Err(ModelError::Restrict(reason));
        }
        plan.set_null.retain(|(key, _, _)| !seen.contains(key));
        tracing::debug!(
            root = ?root.cache_key(),
            deletes = plan.delete.len(),
            set_null = plan.set_null.len(),
            "planned delete"
        );
        Ok(plan)
    }
}

/// Writes a delete expands to, decided before any of them runs
struct DeletePlan {
    /// Root first, then cascaded rows in discovery order
    delete: Vec<Entity>,

    /// Surviving rows keyed `<ns>:<id>`, with the columns to clear
    set_null: Vec<(String, Entity, Vec<String>)>,
}

/// The single reference column on `target` that points at `model`
fn back_reference(target: &Schema, model: &str) -> Result<String> {
    let candidates: Vec<&str> = target
        .columns()
        .filter(|(_, c)| c.kind().is_reference() && c.kind().target() == Some(model))
        .map(|(name, _)| name)
        .collect();
    match candidates.as_slice() {
        [only] => Ok(only.to_string()),
        [] => Err(ModelError::InvalidOperation(format!(
            "{} has no reference column to {}",
            target.name(),
            model
        ))),
        _ => Err(ModelError::InvalidOperation(format!(
            "{} has several reference columns to {}: {:?}",
            target.name(),
            model,
            candidates
        ))),
    }
}

/// Score bound for a range scan; `None` and `Null` are open-ended
fn score_bound(column: &Column, value: Option<&Value>) -> Result<Bound<f64>> {
    let Some(value) = value.filter(|v| !v.is_null()) else {
        return Ok(Bound::Unbounded);
    };
    match column.coerce(value.clone())?.as_f64() {
        Some(score) => Ok(Bound::Included(score)),
        None => Err(ModelError::Request(format!(
            "Range endpoints must be numeric, got {}",
            value
        ))),
    }
}
