//! General secondary index
//!
//! Namespace-scoped index object used by the optimistic write path and by
//! queries. Writes are queued into a caller-owned batch so they commit with
//! the entity row in the same EXEC.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

use crate::column::prefix_score;
use crate::error::Result;
use crate::keys;
use crate::script::{AffixEntry, Manifest};
use crate::store::{Command, Store};

/// Which affix index to scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affix {
    Prefix,
    Suffix,
}

/// Secondary index for one namespace
#[derive(Debug, Clone)]
pub struct GeneralIndex {
    namespace: String,
}

impl GeneralIndex {
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Key that must be watched while reading and rewriting manifests
    pub fn manifest_key(&self) -> String {
        keys::manifest_key(&self.namespace)
    }

    /// Queue removal of every entry the stored manifest lists for `id`
    pub fn unindex(&self, store: &dyn Store, batch: &mut Vec<Command>, id: &str) -> Result<()> {
        let ns = self.namespace.as_str();
        let manifest_key = self.manifest_key();
        let Some(raw) = store.hget(&manifest_key, id)? else {
            return Ok(());
        };

        let old = Manifest::decode(&raw)?;
        for key in old.keys {
            batch.push(Command::SRem {
                key: keys::index_key(ns, &key),
                member: id.to_string(),
            });
        }
        for key in old.scored {
            batch.push(Command::ZRem {
                key: keys::index_key(ns, &key),
                member: id.to_string(),
            });
        }
        for (column, token) in old.prefix {
            batch.push(Command::ZRem {
                key: keys::prefix_key(ns, &column),
                member: keys::affix_member(&token, id),
            });
        }
        for (column, token) in old.suffix {
            batch.push(Command::ZRem {
                key: keys::suffix_key(ns, &column),
                member: keys::affix_member(&token, id),
            });
        }
        batch.push(Command::HDel {
            key: manifest_key,
            fields: vec![id.to_string()],
        });
        Ok(())
    }

    /// Queue a full reindex of `id`: drop old entries, add new ones, record
    /// the new manifest
    #[allow(clippy::too_many_arguments)]
    pub fn index(
        &self,
        store: &dyn Store,
        batch: &mut Vec<Command>,
        id: &str,
        set_keys: &[String],
        scores: &BTreeMap<String, f64>,
        prefix: &[AffixEntry],
        suffix: &[AffixEntry],
    ) -> Result<()> {
        let ns = self.namespace.as_str();
        self.unindex(store, batch, id)?;

        for key in set_keys {
            batch.push(Command::SAdd {
                key: keys::index_key(ns, key),
                member: id.to_string(),
            });
        }
        for (key, score) in scores {
            batch.push(Command::ZAdd {
                key: keys::index_key(ns, key),
                score: *score,
                member: id.to_string(),
            });
        }
        for entry in prefix {
            batch.push(Command::ZAdd {
                key: keys::prefix_key(ns, &entry.column),
                score: entry.score,
                member: keys::affix_member(&entry.token, id),
            });
        }
        for entry in suffix {
            batch.push(Command::ZAdd {
                key: keys::suffix_key(ns, &entry.column),
                score: entry.score,
                member: keys::affix_member(&entry.token, id),
            });
        }

        let manifest = Manifest {
            keys: set_keys.to_vec(),
            scored: scores.keys().cloned().collect(),
            prefix: prefix.iter().map(|e| (e.column.clone(), e.token.clone())).collect(),
            suffix: suffix.iter().map(|e| (e.column.clone(), e.token.clone())).collect(),
        };
        batch.push(Command::HSet {
            key: self.manifest_key(),
            fields: vec![(id.to_string(), manifest.encode()?)],
        });
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Lookups
    // -------------------------------------------------------------------------

    /// Ids present in every set index key and every sorted-set index key
    ///
    /// Returns `None` when no keys were given.
    pub fn intersect(
        &self,
        store: &dyn Store,
        set_keys: &[String],
        scored_keys: &[String],
    ) -> Result<Option<BTreeSet<String>>> {
        let ns = self.namespace.as_str();
        let mut result: Option<BTreeSet<String>> = None;

        let mut narrow = |ids: BTreeSet<String>| {
            result = Some(match result.take() {
                None => ids,
                Some(acc) => acc.intersection(&ids).cloned().collect(),
            });
        };

        for key in set_keys {
            narrow(store.smembers(&keys::index_key(ns, key))?);
        }
        for key in scored_keys {
            let ids = store
                .zrange_by_score(&keys::index_key(ns, key), Bound::Unbounded, Bound::Unbounded, None)?
                .into_iter()
                .map(|(id, _)| id)
                .collect();
            narrow(ids);
        }
        Ok(result)
    }

    /// Ids whose (possibly reversed) token in `column` starts with `token`
    ///
    /// The score range narrows the scan to the first few bytes; members are
    /// then matched exactly, since scores cannot tell long common prefixes
    /// apart.
    pub fn affix_scan(
        &self,
        store: &dyn Store,
        affix: Affix,
        column: &str,
        token: &str,
    ) -> Result<BTreeSet<String>> {
        let key = match affix {
            Affix::Prefix => keys::prefix_key(&self.namespace, column),
            Affix::Suffix => keys::suffix_key(&self.namespace, column),
        };
        let min = Bound::Included(prefix_score(token, false));
        let max = Bound::Excluded(prefix_score(token, true));

        Ok(store
            .zrange_by_score(&key, min, max, None)?
            .into_iter()
            .filter_map(|(member, _)| {
                let (stored, id) = keys::split_affix_member(&member)?;
                stored.starts_with(token).then(|| id.to_string())
            })
            .collect())
    }
}
