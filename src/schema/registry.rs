//! Model registry
//!
//! Process-scoped table of registered models. Populated only through
//! `register`, read-only for everything else.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::column::{Column, ColumnKind, OnDelete};
use crate::error::{ModelError, Result};
use crate::index::GeneralIndex;

use super::{ModelDef, Schema};

/// An inbound foreign reference: `namespace.column` points at some model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub namespace: String,
    pub column: String,
    pub on_delete: OnDelete,
}

/// Registered models, keyed by both name and namespace
#[derive(Debug, Default)]
pub struct Registry {
    models: RwLock<HashMap<String, Arc<Schema>>>,

    /// Target model name -> references pointing at it
    referenced: RwLock<HashMap<String, Vec<Reference>>>,
}

fn schema_error(message: String) -> ModelError {
    ModelError::Schema(message)
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a model by name or namespace
    pub fn get(&self, name: &str) -> Option<Arc<Schema>> {
        self.models.read().get(name).cloned()
    }

    /// References pointing at the model `name`
    pub fn references_to(&self, name: &str) -> Vec<Reference> {
        self.referenced.read().get(name).cloned().unwrap_or_default()
    }

    /// Number of registered models
    pub fn len(&self) -> usize {
        let models = self.models.read();
        let unique: BTreeSet<&str> = models.values().map(|s| s.name()).collect();
        unique.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.read().is_empty()
    }

    /// Validate a declaration and register the resulting schema
    ///
    /// `use_scripting` gates the features only the atomic writer can
    /// maintain: prefix/suffix indexes, several unique columns, and
    /// composite uniqueness.
    pub fn register(&self, def: ModelDef, use_scripting: bool) -> Result<Arc<Schema>> {
        // Hold the write lock for the whole registration so two models
        // cannot claim the same name concurrently.
        let mut models = self.models.write();

        let ModelDef {
            name,
            namespace,
            columns: declared,
            unique_together,
        } = def;
        let namespace = namespace.unwrap_or_else(|| name.clone());

        if name.is_empty() || namespace.is_empty() {
            return Err(schema_error("Model name and namespace must not be empty".to_string()));
        }
        if models.contains_key(&name) || models.contains_key(&namespace) {
            return Err(schema_error(format!(
                "Cannot have two models with the same name ({}) or namespace ({})",
                name, namespace
            )));
        }

        // ---------------------------------------------------------------------
        // Columns and primary key
        // ---------------------------------------------------------------------
        let mut columns: Vec<(String, Column)> = Vec::with_capacity(declared.len() + 1);
        let mut pkey: Option<String> = None;

        for (attr, column) in declared {
            if attr.is_empty() || attr.contains(':') {
                return Err(schema_error(format!(
                    "Invalid column name {:?} on {} (must be non-empty without ':')",
                    attr, name
                )));
            }
            if columns.iter().any(|(n, _)| *n == attr) {
                return Err(schema_error(format!("Duplicate column {}.{}", name, attr)));
            }
            if column.is_primary_key() {
                if let Some(existing) = &pkey {
                    return Err(schema_error(format!(
                        "Only one primary key column allowed, you have: {} {}",
                        existing, attr
                    )));
                }
                pkey = Some(attr.clone());
            }
            columns.push((attr, column));
        }

        let pkey = match pkey {
            Some(pkey) => pkey,
            None => {
                if columns.iter().any(|(n, _)| n == "id") {
                    return Err(schema_error(format!(
                        "Cannot have non-primary key named 'id' on {} when no explicit primary key is defined",
                        name
                    )));
                }
                columns.insert(0, ("id".to_string(), Column::primary_key()));
                "id".to_string()
            }
        };

        // ---------------------------------------------------------------------
        // Flags
        // ---------------------------------------------------------------------
        let mut required = BTreeSet::new();
        let mut index = BTreeSet::new();
        let mut unique = BTreeSet::new();
        let mut prefix = BTreeSet::new();
        let mut suffix = BTreeSet::new();

        for (attr, column) in &columns {
            if column.is_virtual()
                && (column.is_required()
                    || column.is_indexed()
                    || column.is_unique()
                    || column.is_prefix()
                    || column.is_suffix())
            {
                return Err(schema_error(format!(
                    "OneToMany column {}.{} cannot be required, indexed, unique, prefix or suffix",
                    name, attr
                )));
            }
            if column.is_required() {
                required.insert(attr.clone());
            }
            if column.is_indexed() {
                index.insert(attr.clone());
            }
            if column.is_prefix() {
                if !use_scripting {
                    return Err(schema_error(format!(
                        "Atomic scripting must be enabled to support prefix indexes ({}.{})",
                        name, attr
                    )));
                }
                prefix.insert(attr.clone());
            }
            if column.is_suffix() {
                if !use_scripting {
                    return Err(schema_error(format!(
                        "Atomic scripting must be enabled to support suffix indexes ({}.{})",
                        name, attr
                    )));
                }
                suffix.insert(attr.clone());
            }
            if column.is_unique() {
                if !unique.is_empty() && !use_scripting {
                    return Err(schema_error(format!(
                        "Only one unique column allowed without atomic scripting, you have at least two: {} {:?}",
                        attr, unique
                    )));
                }
                unique.insert(attr.clone());
            }
        }

        // ---------------------------------------------------------------------
        // Relationships
        // ---------------------------------------------------------------------
        let mut outbound: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

        for (attr, column) in &columns {
            match column.kind() {
                ColumnKind::OneToMany { target, column: join } => {
                    let Some(foreign) = models.get(target) else {
                        continue;
                    };
                    let back_refs = back_references(foreign, &name);
                    match join {
                        None if back_refs.len() > 1 => {
                            return Err(schema_error(format!(
                                "Missing required join column on OneToMany {}.{}: {} references {} from {:?}",
                                name, attr, target, name, back_refs
                            )));
                        }
                        Some(join) if !back_refs.contains(&join.as_str()) => {
                            return Err(schema_error(format!(
                                "OneToMany {}.{} names join column {}.{} which does not reference {}",
                                name, attr, target, join, name
                            )));
                        }
                        _ => {}
                    }
                }
                kind if kind.is_reference() => {
                    if let Some(target) = kind.target() {
                        outbound.entry(target).or_default().push(attr);
                    }
                }
                _ => {}
            }
        }

        for (target, attrs) in &outbound {
            if attrs.len() < 2 {
                continue;
            }
            let Some(foreign) = models.get(*target) else {
                continue;
            };
            for (fattr, fcolumn) in foreign.columns() {
                if let ColumnKind::OneToMany { target: back, column: None } = fcolumn.kind() {
                    if *back == name {
                        return Err(schema_error(format!(
                            "Foreign model OneToMany attribute {}.{} missing join column argument",
                            target, fattr
                        )));
                    }
                }
            }
        }

        // ---------------------------------------------------------------------
        // Composite uniqueness
        // ---------------------------------------------------------------------
        if !unique_together.is_empty() && !use_scripting {
            return Err(schema_error(format!(
                "Atomic scripting must be enabled to support multi-column uniqueness constraints ({})",
                name
            )));
        }

        let mut composite_unique: Vec<Vec<String>> = Vec::new();
        for group in &unique_together {
            let key: Vec<String> = group
                .iter()
                .cloned()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            if key.len() == 1 {
                return Err(schema_error(format!(
                    "Single-column unique constraint {:?} should be declared with unique() on the {:?} column",
                    group, key[0]
                )));
            }
            if key.is_empty() {
                return Err(schema_error(format!("Empty unique constraint on {}", name)));
            }
            if composite_unique.contains(&key) {
                return Err(schema_error(format!(
                    "Multi-column unique constraint {:?} is not different from an earlier constraint",
                    group
                )));
            }
            for col in &key {
                match columns.iter().find(|(n, _)| n == col) {
                    Some((_, c)) if !c.is_virtual() => {}
                    _ => {
                        return Err(schema_error(format!(
                            "Multi-column unique constraint {:?} references non-existent column {:?}",
                            group, col
                        )))
                    }
                }
            }
            composite_unique.push(key);
        }

        // ---------------------------------------------------------------------
        // Build and publish
        // ---------------------------------------------------------------------
        let positions = columns
            .iter()
            .enumerate()
            .map(|(i, (n, _))| (n.clone(), i))
            .collect();

        let new_refs: Vec<(String, Reference)> = columns
            .iter()
            .filter_map(|(attr, column)| match column.kind() {
                ColumnKind::ManyToOne { target, on_delete }
                | ColumnKind::OneToOne { target, on_delete } => Some((
                    target.clone(),
                    Reference {
                        namespace: namespace.clone(),
                        column: attr.clone(),
                        on_delete: *on_delete,
                    },
                )),
                _ => None,
            })
            .collect();

        let schema = Arc::new(Schema {
            gindex: GeneralIndex::new(&namespace),
            name: name.clone(),
            namespace: namespace.clone(),
            pkey,
            columns,
            positions,
            required,
            index,
            unique,
            prefix,
            suffix,
            composite_unique,
        });

        {
            let mut referenced = self.referenced.write();
            for (target, reference) in new_refs {
                referenced.entry(target).or_default().push(reference);
            }
        }

        models.insert(name.clone(), Arc::clone(&schema));
        models.insert(namespace.clone(), Arc::clone(&schema));

        tracing::debug!(
            model = %name,
            namespace = %namespace,
            unique = schema.unique.len(),
            indexed = schema.index.len(),
            composite = schema.composite_unique.len(),
            "registered model"
        );

        Ok(schema)
    }
}

/// Reference columns on `foreign` that point at the model `name`
fn back_references<'a>(foreign: &'a Schema, name: &str) -> Vec<&'a str> {
    foreign
        .columns()
        .filter(|(_, c)| c.kind().is_reference() && c.kind().target() == Some(name))
        .map(|(attr, _)| attr)
        .collect()
}
