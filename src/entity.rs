//! Entity handles
//!
//! An [`Entity`] is a cheap, cloneable handle to one instance of a model.
//! Clones share state, so the identity cache can hand out the same instance
//! to every caller within a session.
//!
//! ## State
//! ```text
//!   data  (column -> Value)   current values, edited through set()
//!   last  (column -> String)  raw values as of the last save/load
//!   flags                     new / modified / deleted
//! ```

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::column::Value;
use crate::delta::{RawRow, Row};
use crate::error::{ModelError, Result};
use crate::keys;
use crate::schema::Schema;

#[derive(Debug, Default)]
pub(crate) struct EntityState {
    pub(crate) data: Row,
    pub(crate) last: RawRow,
    pub(crate) new: bool,
    pub(crate) modified: bool,
    pub(crate) deleted: bool,
}

/// Handle to a model instance
#[derive(Clone)]
pub struct Entity {
    schema: Arc<Schema>,
    state: Arc<Mutex<EntityState>>,
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct(self.schema.name())
            .field("data", &state.data)
            .field("new", &state.new)
            .field("modified", &state.modified)
            .field("deleted", &state.deleted)
            .finish()
    }
}

impl Entity {
    /// New, unsaved instance; `data` is already coerced
    pub(crate) fn unsaved(schema: Arc<Schema>, data: Row) -> Self {
        Self {
            schema,
            state: Arc::new(Mutex::new(EntityState {
                data,
                last: RawRow::new(),
                new: true,
                modified: true,
                deleted: false,
            })),
        }
    }

    /// Rebuild an instance from its stored hash
    pub(crate) fn loaded(schema: Arc<Schema>, raw: RawRow) -> Result<Self> {
        let data = decode_row(&schema, &raw)?;
        Ok(Self {
            schema,
            state: Arc::new(Mutex::new(EntityState {
                data,
                last: raw,
                new: false,
                modified: false,
                deleted: false,
            })),
        })
    }

    pub(crate) fn downgrade(&self) -> Weak<Mutex<EntityState>> {
        Arc::downgrade(&self.state)
    }

    pub(crate) fn upgrade(schema: &Arc<Schema>, weak: &Weak<Mutex<EntityState>>) -> Option<Self> {
        weak.upgrade().map(|state| Self {
            schema: Arc::clone(schema),
            state,
        })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Primary key, `None` until the first save
    pub fn id(&self) -> Option<i64> {
        self.state
            .lock()
            .data
            .get(self.schema.pkey())
            .and_then(Value::as_i64)
    }

    /// Identity cache key, `None` until the first save
    pub(crate) fn cache_key(&self) -> Option<String> {
        self.id()
            .map(|id| keys::row_key(self.schema.namespace(), &id.to_string()))
    }

    pub fn is_new(&self) -> bool {
        self.state.lock().new
    }

    pub fn is_modified(&self) -> bool {
        self.state.lock().modified
    }

    pub fn is_deleted(&self) -> bool {
        self.state.lock().deleted
    }

    /// True when both handles point at the same instance
    pub fn same_instance(&self, other: &Entity) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    /// Current value of a stored column (`Null` when unset)
    pub fn get(&self, column: &str) -> Result<Value> {
        match self.schema.column(column) {
            Some(c) if !c.is_virtual() => {}
            Some(_) => {
                return Err(ModelError::Column(format!(
                    "{}.{} is a OneToMany column, resolve it through the session",
                    self.schema.name(),
                    column
                )))
            }
            None => return Err(unknown_column(&self.schema, column)),
        }
        Ok(self
            .state
            .lock()
            .data
            .get(column)
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// Assign a column value and mark the entity modified
    pub fn set(&self, column: &str, value: impl Into<Value>) -> Result<()> {
        let Some(declared) = self.schema.column(column) else {
            return Err(unknown_column(&self.schema, column));
        };
        if declared.is_virtual() {
            return Err(ModelError::Column(format!(
                "Cannot assign to OneToMany column {}.{}",
                self.schema.name(),
                column
            )));
        }
        let value = declared.coerce(value.into())?;

        let mut state = self.state.lock();
        if declared.is_primary_key() {
            let current = state.data.get(column).cloned().unwrap_or(Value::Null);
            if current != value {
                return Err(ModelError::InvalidOperation(format!(
                    "Cannot change the primary key of {}",
                    self.schema.name()
                )));
            }
            return Ok(());
        }
        state.data.insert(column.to_string(), value);
        state.modified = true;
        Ok(())
    }

    /// Copy of the current values, primary key included
    pub fn to_map(&self) -> Row {
        self.state.lock().data.clone()
    }

    // -------------------------------------------------------------------------
    // Session hooks
    // -------------------------------------------------------------------------

    /// Current values and last persisted raw values
    pub(crate) fn snapshot(&self) -> (Row, RawRow) {
        let state = self.state.lock();
        (state.data.clone(), state.last.clone())
    }

    pub(crate) fn with_state<T>(&self, f: impl FnOnce(&mut EntityState) -> T) -> T {
        f(&mut self.state.lock())
    }

    /// Record a successful save
    pub(crate) fn mark_saved(&self, raw: RawRow) {
        let mut state = self.state.lock();
        state.last = raw;
        state.new = false;
        state.modified = false;
        state.deleted = false;
    }

    pub(crate) fn mark_deleted(&self) {
        let mut state = self.state.lock();
        state.modified = true;
        state.deleted = true;
    }

    /// Replace every value with a freshly loaded hash
    pub(crate) fn reload(&self, raw: RawRow) -> Result<()> {
        let data = decode_row(&self.schema, &raw)?;
        let mut state = self.state.lock();
        state.data = data;
        state.last = raw;
        state.modified = false;
        Ok(())
    }
}

fn unknown_column(schema: &Schema, column: &str) -> ModelError {
    ModelError::Column(format!("{} has no column {:?}", schema.name(), column))
}

/// Decode a stored hash, ignoring fields the model no longer declares
fn decode_row(schema: &Schema, raw: &RawRow) -> Result<Row> {
    let mut row = Row::new();
    for (attr, column) in schema.stored_columns() {
        if let Some(value) = raw.get(attr) {
            row.insert(attr.to_string(), column.from_storage(value)?);
        }
    }
    Ok(row)
}
