//! Optimistic writer
//!
//! WATCH the unique keys about to change (and the manifest hash the general
//! index reads), verify ownership, then queue every write into one EXEC.
//! A watch conflict restarts the attempt; a genuine unique conflict ends it.

use crate::delta::{ApplyMode, Delta, RawRow};
use crate::error::{ModelError, Result};
use crate::keys;
use crate::schema::Schema;
use crate::store::{Command, Store};

pub(super) fn write(
    store: &dyn Store,
    schema: &Schema,
    pk: &str,
    delta: Delta,
    mode: ApplyMode,
) -> Result<(usize, RawRow)> {
    let ns = schema.namespace();
    let gindex = schema.general_index();
    let row_key = keys::row_key(ns, pk);

    let mut watched: Vec<String> = delta
        .unique
        .keys()
        .map(|column| keys::unique_key(ns, column))
        .collect();
    watched.push(gindex.manifest_key());

    let mut attempt: u64 = 0;
    loop {
        attempt += 1;
        let watch = store.watch(&watched)?;

        // Candidate values must be free or already ours
        for (column, value) in &delta.unique {
            let owner = store.hget(&keys::unique_key(ns, column), value)?;
            if owner.as_deref().is_some_and(|owner| owner != pk) {
                // Dropping the watch is the UNWATCH
                return Err(ModelError::UniqueViolation {
                    namespace: ns.to_string(),
                    column: column.clone(),
                    value: value.clone(),
                });
            }
        }

        let mut batch = Vec::new();
        if !delta.deleted.is_empty() {
            batch.push(Command::HDel {
                key: row_key.clone(),
                fields: delta.deleted.clone(),
            });
        }
        for (column, value) in &delta.unique_removed {
            batch.push(Command::HDel {
                key: keys::unique_key(ns, column),
                fields: vec![value.clone()],
            });
        }

        if mode == ApplyMode::Delete {
            gindex.unindex(store, &mut batch, pk)?;
            batch.push(Command::Del {
                key: row_key.clone(),
            });
        } else {
            if !delta.write.is_empty() {
                batch.push(Command::HSet {
                    key: row_key.clone(),
                    fields: delta
                        .write
                        .iter()
                        .map(|(f, v)| (f.clone(), v.clone()))
                        .collect(),
                });
            }
            for (column, value) in &delta.unique {
                batch.push(Command::HSet {
                    key: keys::unique_key(ns, column),
                    fields: vec![(value.clone(), pk.to_string())],
                });
            }
            let set_keys: Vec<String> = delta.keys.iter().cloned().collect();
            gindex.index(
                store,
                &mut batch,
                pk,
                &set_keys,
                &delta.scores,
                &delta.prefix,
                &delta.suffix,
            )?;
        }

        match store.exec(Some(&watch), batch) {
            Ok(()) => {
                if attempt > 1 {
                    tracing::debug!("{} committed after {} attempts", row_key, attempt);
                }
                return Ok((delta.changes, delta.row));
            }
            Err(ModelError::TransientConflict) => {
                tracing::debug!("watch conflict on {} (attempt {}), retrying", row_key, attempt);
                continue;
            }
            Err(e) => return Err(e),
        }
    }
}
