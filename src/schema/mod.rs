//! Schema Module
//!
//! Model declarations and the immutable metadata derived from them.
//!
//! ## Flow
//! ```text
//! ModelDef (builder) ──register──▶ Registry ──▶ Arc<Schema>
//!                                     │
//!                                     └── inbound references per target
//! ```
//!
//! A schema is built once, validated once, and never mutated afterwards.

mod registry;

pub use registry::{Reference, Registry};

use std::collections::{BTreeSet, HashMap};

use crate::column::Column;
use crate::index::GeneralIndex;

/// Declaration of a model, consumed by [`Registry::register`]
#[derive(Debug, Clone)]
pub struct ModelDef {
    pub(crate) name: String,
    pub(crate) namespace: Option<String>,
    pub(crate) columns: Vec<(String, Column)>,
    pub(crate) unique_together: Vec<Vec<String>>,
}

impl ModelDef {
    /// Start a declaration for the model `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            columns: Vec::new(),
            unique_together: Vec::new(),
        }
    }

    /// Override the keyspace namespace (defaults to the model name)
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn column(mut self, name: impl Into<String>, column: Column) -> Self {
        self.columns.push((name.into(), column));
        self
    }

    /// Add a composite unique constraint over `columns`
    pub fn unique_together(mut self, columns: &[&str]) -> Self {
        self.unique_together
            .push(columns.iter().map(|c| c.to_string()).collect());
        self
    }
}

/// Validated, immutable model metadata
#[derive(Debug)]
pub struct Schema {
    name: String,
    namespace: String,
    pkey: String,
    columns: Vec<(String, Column)>,
    positions: HashMap<String, usize>,
    required: BTreeSet<String>,
    index: BTreeSet<String>,
    unique: BTreeSet<String>,
    prefix: BTreeSet<String>,
    suffix: BTreeSet<String>,
    composite_unique: Vec<Vec<String>>,
    gindex: GeneralIndex,
}

impl Schema {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Primary key column name
    pub fn pkey(&self) -> &str {
        &self.pkey
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.positions.get(name).map(|&i| &self.columns[i].1)
    }

    /// All columns in declaration order (synthesized `id` first)
    pub fn columns(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.columns.iter().map(|(n, c)| (n.as_str(), c))
    }

    /// Columns that hold data (everything except OneToMany)
    pub fn stored_columns(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.columns().filter(|(_, c)| !c.is_virtual())
    }

    pub fn required(&self) -> &BTreeSet<String> {
        &self.required
    }

    pub fn indexed(&self) -> &BTreeSet<String> {
        &self.index
    }

    pub fn unique(&self) -> &BTreeSet<String> {
        &self.unique
    }

    pub fn prefixed(&self) -> &BTreeSet<String> {
        &self.prefix
    }

    pub fn suffixed(&self) -> &BTreeSet<String> {
        &self.suffix
    }

    /// Composite unique groups, each sorted by column name
    pub fn composite_unique(&self) -> &[Vec<String>] {
        &self.composite_unique
    }

    /// Secondary index handle scoped to this namespace
    pub fn general_index(&self) -> &GeneralIndex {
        &self.gindex
    }

    pub fn is_indexed(&self, column: &str) -> bool {
        self.index.contains(column)
    }

    pub fn is_unique(&self, column: &str) -> bool {
        self.unique.contains(column)
    }
}
