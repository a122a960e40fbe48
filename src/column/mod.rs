//! Column Module
//!
//! Column declarations and the conversions between typed values and the
//! strings stored in entity hashes.
//!
//! ## Storage Forms
//! - Integers, primary keys, foreign keys: decimal
//! - Floats: shortest round-trip decimal
//! - Booleans: `"1"` / `"0"`
//! - Strings and text: verbatim
//!
//! Null values are never stored; a null field is absent from the hash.

mod keygen;
mod value;

pub use keygen::{prefix_score, reverse_token, Keygen, KeygenFn, Keys, PREFIX_SCORE_BYTES};
pub use value::Value;

use crate::error::{ModelError, Result};

/// What to do with referencing rows when their target is deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnDelete {
    /// Leave referencing rows untouched
    #[default]
    NoAction,

    /// Refuse the delete while references exist
    Restrict,

    /// Delete referencing rows too
    Cascade,

    /// Clear the reference and save the referencing row
    SetNull,
}

/// Column types
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnKind {
    /// Store-assigned integer id
    PrimaryKey,
    Integer,
    Float,
    Boolean,
    String,
    Text,

    /// Reference to another model's id
    ManyToOne { target: String, on_delete: OnDelete },

    /// Unique reference to another model's id
    OneToOne { target: String, on_delete: OnDelete },

    /// Virtual inverse of a ManyToOne/OneToOne on `target`; never stored
    OneToMany { target: String, column: Option<String> },
}

impl ColumnKind {
    /// Target model name for relationship columns
    pub fn target(&self) -> Option<&str> {
        match self {
            ColumnKind::ManyToOne { target, .. }
            | ColumnKind::OneToOne { target, .. }
            | ColumnKind::OneToMany { target, .. } => Some(target),
            _ => None,
        }
    }

    /// True for ManyToOne/OneToOne columns
    pub fn is_reference(&self) -> bool {
        matches!(self, ColumnKind::ManyToOne { .. } | ColumnKind::OneToOne { .. })
    }

    fn default_keygen(&self) -> Option<Keygen> {
        match self {
            ColumnKind::PrimaryKey
            | ColumnKind::Integer
            | ColumnKind::Float
            | ColumnKind::ManyToOne { .. }
            | ColumnKind::OneToOne { .. } => Some(Keygen::Numeric),
            ColumnKind::Boolean => Some(Keygen::Boolean),
            ColumnKind::String => Some(Keygen::Simple),
            ColumnKind::Text => Some(Keygen::FullText),
            ColumnKind::OneToMany { .. } => None,
        }
    }
}

/// A column declaration
#[derive(Debug, Clone)]
pub struct Column {
    kind: ColumnKind,
    required: bool,
    index: bool,
    unique: bool,
    prefix: bool,
    suffix: bool,
    default: Option<Value>,
    keygen: Option<Keygen>,
}

impl Column {
    fn of(kind: ColumnKind) -> Self {
        Self {
            kind,
            required: false,
            index: false,
            unique: false,
            prefix: false,
            suffix: false,
            default: None,
            keygen: None,
        }
    }

    pub fn primary_key() -> Self {
        Self::of(ColumnKind::PrimaryKey)
    }

    pub fn integer() -> Self {
        Self::of(ColumnKind::Integer)
    }

    pub fn float() -> Self {
        Self::of(ColumnKind::Float)
    }

    pub fn boolean() -> Self {
        Self::of(ColumnKind::Boolean)
    }

    pub fn string() -> Self {
        Self::of(ColumnKind::String)
    }

    pub fn text() -> Self {
        Self::of(ColumnKind::Text)
    }

    /// Reference to `target`, always range-indexed
    pub fn many_to_one(target: impl Into<String>) -> Self {
        let mut column = Self::of(ColumnKind::ManyToOne {
            target: target.into(),
            on_delete: OnDelete::NoAction,
        });
        column.index = true;
        column
    }

    /// Unique reference to `target`, always range-indexed
    pub fn one_to_one(target: impl Into<String>) -> Self {
        let mut column = Self::of(ColumnKind::OneToOne {
            target: target.into(),
            on_delete: OnDelete::NoAction,
        });
        column.index = true;
        column.unique = true;
        column
    }

    /// Virtual inverse of a reference column declared on `target`
    pub fn one_to_many(target: impl Into<String>) -> Self {
        Self::of(ColumnKind::OneToMany {
            target: target.into(),
            column: None,
        })
    }

    // -------------------------------------------------------------------------
    // Builder flags
    // -------------------------------------------------------------------------

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn index(mut self) -> Self {
        self.index = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn prefix(mut self) -> Self {
        self.prefix = true;
        self
    }

    pub fn suffix(mut self) -> Self {
        self.suffix = true;
        self
    }

    /// Value used when an entity is created without this column
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn keygen(mut self, keygen: Keygen) -> Self {
        self.keygen = Some(keygen);
        self
    }

    /// Set the delete behavior of a reference column (ignored otherwise)
    pub fn on_delete(mut self, behavior: OnDelete) -> Self {
        match &mut self.kind {
            ColumnKind::ManyToOne { on_delete, .. } | ColumnKind::OneToOne { on_delete, .. } => {
                *on_delete = behavior;
            }
            _ => {}
        }
        self
    }

    /// Name the reference column on the target of a OneToMany
    pub fn join_column(mut self, name: impl Into<String>) -> Self {
        if let ColumnKind::OneToMany { column, .. } = &mut self.kind {
            *column = Some(name.into());
        }
        self
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn kind(&self) -> &ColumnKind {
        &self.kind
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn is_indexed(&self) -> bool {
        self.index
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn is_prefix(&self) -> bool {
        self.prefix
    }

    pub fn is_suffix(&self) -> bool {
        self.suffix
    }

    pub fn is_primary_key(&self) -> bool {
        self.kind == ColumnKind::PrimaryKey
    }

    /// OneToMany columns hold no data of their own
    pub fn is_virtual(&self) -> bool {
        matches!(self.kind, ColumnKind::OneToMany { .. })
    }

    pub fn initial_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// Declared keygen, or the default for the column type
    pub fn effective_keygen(&self) -> Option<Keygen> {
        self.keygen.clone().or_else(|| self.kind.default_keygen())
    }

    // -------------------------------------------------------------------------
    // Conversions
    // -------------------------------------------------------------------------

    /// Type-check a value, widening integers for float columns
    pub fn coerce(&self, value: Value) -> Result<Value> {
        let coerced = match (&self.kind, value) {
            (_, Value::Null) => Value::Null,
            (ColumnKind::OneToMany { .. }, v) => {
                return Err(ModelError::Column(format!(
                    "Cannot assign {} to a OneToMany column",
                    v
                )))
            }
            (
                ColumnKind::PrimaryKey
                | ColumnKind::Integer
                | ColumnKind::ManyToOne { .. }
                | ColumnKind::OneToOne { .. },
                Value::Integer(i),
            ) => Value::Integer(i),
            (ColumnKind::Float, Value::Integer(i)) => Value::Float(i as f64),
            (ColumnKind::Float, Value::Float(f)) if f.is_finite() => Value::Float(f),
            (ColumnKind::Boolean, Value::Boolean(b)) => Value::Boolean(b),
            (ColumnKind::String | ColumnKind::Text, Value::String(s)) => Value::String(s),
            (kind, v) => {
                return Err(ModelError::Column(format!(
                    "Invalid {} value {} for {:?} column",
                    v.type_name(),
                    v,
                    kind
                )))
            }
        };
        Ok(coerced)
    }

    /// Encode a value for the entity hash; `None` for null
    pub fn to_storage(&self, value: &Value) -> Result<Option<String>> {
        let encoded = match self.coerce(value.clone())? {
            Value::Null => return Ok(None),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Boolean(b) => if b { "1" } else { "0" }.to_string(),
            Value::String(s) => s,
        };
        Ok(Some(encoded))
    }

    /// Decode a stored hash field
    pub fn from_storage(&self, raw: &str) -> Result<Value> {
        let invalid = || {
            ModelError::Column(format!(
                "Invalid stored value {:?} for {:?} column",
                raw, self.kind
            ))
        };

        let value = match &self.kind {
            ColumnKind::PrimaryKey
            | ColumnKind::Integer
            | ColumnKind::ManyToOne { .. }
            | ColumnKind::OneToOne { .. } => {
                Value::Integer(raw.parse().map_err(|_| invalid())?)
            }
            ColumnKind::Float => Value::Float(raw.parse().map_err(|_| invalid())?),
            ColumnKind::Boolean => match raw {
                "1" => Value::Boolean(true),
                "0" | "" => Value::Boolean(false),
                _ => return Err(invalid()),
            },
            ColumnKind::String | ColumnKind::Text => Value::String(raw.to_string()),
            ColumnKind::OneToMany { .. } => return Err(invalid()),
        };
        Ok(value)
    }
}
