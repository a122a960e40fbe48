//! Query builder
//!
//! Multi-column filtering over the general index. Every filter resolves to a
//! set of ids; filters are intersected, the result sorted by id and limited
//! before the entities are loaded through the session.
//!
//! ```text
//! Query::new(&user)
//!     .filter("active", true)          set index     ─┐
//!     .startswith("email", "ali")      prefix zset   ─┼─▶ ∩ ─▶ sort ─▶ limit ─▶ get_many
//!     .limit(0, 10)                                   ─┘
//! ```

use std::collections::BTreeSet;
use std::ops::Bound;
use std::sync::Arc;

use crate::column::{reverse_token, Column, Keygen, Keys, Value};
use crate::entity::Entity;
use crate::error::{ModelError, Result};
use crate::index::Affix;
use crate::keys;
use crate::schema::Schema;
use crate::session::Session;
use crate::store::Store;

#[derive(Debug, Clone)]
enum Filter {
    /// Matches any of `values`
    Eq { column: String, values: Vec<Value> },

    /// Token starts (prefix) or ends (suffix) with `pattern`
    Affix {
        affix: Affix,
        column: String,
        pattern: String,
    },
}

/// Filter query over one model
#[derive(Debug, Clone)]
pub struct Query {
    schema: Arc<Schema>,
    filters: Vec<Filter>,
    limit: Option<(usize, usize)>,
}

impl Query {
    pub fn new(schema: &Arc<Schema>) -> Self {
        Self {
            schema: Arc::clone(schema),
            filters: Vec::new(),
            limit: None,
        }
    }

    /// Keep entities whose indexed `column` matches `value`
    pub fn filter(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter_any(column, vec![value.into()])
    }

    /// Keep entities whose indexed `column` matches any of `values`
    pub fn filter_any(mut self, column: &str, values: Vec<Value>) -> Self {
        self.filters.push(Filter::Eq {
            column: column.to_string(),
            values,
        });
        self
    }

    /// Keep entities with a `column` token starting with `prefix`
    pub fn startswith(mut self, column: &str, prefix: &str) -> Self {
        self.filters.push(Filter::Affix {
            affix: Affix::Prefix,
            column: column.to_string(),
            pattern: prefix.to_string(),
        });
        self
    }

    /// Keep entities with a `column` token ending with `suffix`
    pub fn endswith(mut self, column: &str, suffix: &str) -> Self {
        self.filters.push(Filter::Affix {
            affix: Affix::Suffix,
            column: column.to_string(),
            pattern: suffix.to_string(),
        });
        self
    }

    /// Skip `offset` matches and return at most `count`
    pub fn limit(mut self, offset: usize, count: usize) -> Self {
        self.limit = Some((offset, count));
        self
    }

    /// Matching ids, ascending, after the limit
    pub fn ids(&self, session: &Session) -> Result<Vec<i64>> {
        if self.filters.is_empty() {
            return Err(ModelError::Request(
                "A query needs at least one filter".to_string(),
            ));
        }

        let store = session.store();
        let mut matched: Option<BTreeSet<String>> = None;
        for filter in &self.filters {
            let ids = self.resolve(store, filter)?;
            matched = Some(match matched {
                None => ids,
                Some(acc) => acc.intersection(&ids).cloned().collect(),
            });
            if matched.as_ref().is_some_and(BTreeSet::is_empty) {
                break;
            }
        }

        let mut ids: Vec<i64> = matched
            .unwrap_or_default()
            .iter()
            .filter_map(|id| id.parse().ok())
            .collect();
        ids.sort_unstable();

        let (offset, count) = self.limit.unwrap_or((0, usize::MAX));
        Ok(ids.into_iter().skip(offset).take(count).collect())
    }

    /// Load the matching entities
    pub fn all(&self, session: &Session) -> Result<Vec<Entity>> {
        let ids = self.ids(session)?;
        tracing::trace!("{} query matched {} ids", self.schema.name(), ids.len());
        session.get_many(&self.schema, &ids)
    }

    /// Number of matches (after the limit)
    pub fn count(&self, session: &Session) -> Result<usize> {
        Ok(self.ids(session)?.len())
    }

    fn column(&self, name: &str) -> Result<&Column> {
        self.schema.column(name).ok_or_else(|| {
            ModelError::Request(format!("{} has no column {:?}", self.schema.name(), name))
        })
    }

    fn resolve(&self, store: &dyn Store, filter: &Filter) -> Result<BTreeSet<String>> {
        match filter {
            Filter::Eq { column, values } => {
                let declared = self.column(column)?;
                if !declared.is_indexed() {
                    return Err(ModelError::Request(format!(
                        "Cannot filter on column {}.{} without an index",
                        self.schema.name(),
                        column
                    )));
                }
                let mut ids = BTreeSet::new();
                for value in values {
                    ids.extend(self.resolve_value(store, column, declared, value)?);
                }
                Ok(ids)
            }
            Filter::Affix {
                affix,
                column,
                pattern,
            } => {
                let declared = self.column(column)?;
                let supported = match affix {
                    Affix::Prefix => declared.is_prefix(),
                    Affix::Suffix => declared.is_suffix(),
                };
                if !supported {
                    return Err(ModelError::Request(format!(
                        "Column {}.{} has no {:?} index",
                        self.schema.name(),
                        column,
                        affix
                    )));
                }

                let lowered = matches!(
                    declared.effective_keygen(),
                    Some(Keygen::CaseInsensitive | Keygen::FullText)
                );
                let pattern = if lowered {
                    pattern.to_lowercase()
                } else {
                    pattern.clone()
                };
                let token = match affix {
                    Affix::Prefix => pattern,
                    Affix::Suffix => reverse_token(&pattern),
                };
                self.schema
                    .general_index()
                    .affix_scan(store, *affix, column, &token)
            }
        }
    }

    /// Ids matching one value of an indexed column
    fn resolve_value(
        &self,
        store: &dyn Store,
        name: &str,
        column: &Column,
        value: &Value,
    ) -> Result<BTreeSet<String>> {
        let value = column.coerce(value.clone())?;
        if value.is_null() {
            return Err(ModelError::Request(format!(
                "Cannot filter {}.{} on null",
                self.schema.name(),
                name
            )));
        }
        let Some(keygen) = column.effective_keygen() else {
            return Ok(BTreeSet::new());
        };

        let gindex = self.schema.general_index();
        let ns = self.schema.namespace();
        match keygen.generate(&value)? {
            Keys::Tokens(tokens) => {
                let set_keys: Vec<String> = tokens
                    .iter()
                    .map(|token| format!("{}:{}", name, token))
                    .collect();
                Ok(gindex.intersect(store, &set_keys, &[])?.unwrap_or_default())
            }
            Keys::Scores(scores) => {
                let mut matched: Option<BTreeSet<String>> = None;
                for (token, score) in scores {
                    let ids: BTreeSet<String> = if token.is_empty() {
                        store
                            .zrange_by_score(
                                &keys::index_key(ns, name),
                                Bound::Included(score),
                                Bound::Included(score),
                                None,
                            )?
                            .into_iter()
                            .map(|(id, _)| id)
                            .collect()
                    } else {
                        let key = format!("{}:{}", name, token);
                        gindex.intersect(store, &[], &[key])?.unwrap_or_default()
                    };
                    matched = Some(match matched {
                        None => ids,
                        Some(acc) => acc.intersection(&ids).cloned().collect(),
                    });
                }
                Ok(matched.unwrap_or_default())
            }
            Keys::Empty => Ok(BTreeSet::new()),
        }
    }
}
