//! Apply Module
//!
//! Commits one entity's delta to the store as a single all-or-nothing write.
//!
//! ## Protocols
//! ```text
//!                 ┌──────────────────┐
//!  old, new ────▶ │  compute_delta   │
//!                 └────────┬─────────┘
//!                          │
//!         use_scripting?   │
//!          ┌───────────────┴───────────────┐
//!          ▼                               ▼
//!   ┌─────────────┐                ┌───────────────┐
//!   │  scripted   │                │    watched    │
//!   │ (one EVAL)  │                │ WATCH / EXEC  │
//!   └─────────────┘                │  retry loop   │
//!                                  └───────────────┘
//! ```
//!
//! Both return the number of logically changed columns and the new raw
//! snapshot, which becomes the entity's last-persisted state.

mod scripted;
mod watched;

use crate::delta::{compute_delta, ApplyMode, RawRow, Row};
use crate::error::{ModelError, Result};
use crate::schema::Schema;
use crate::store::Store;

/// Apply the difference between `old` and `new` for one entity
pub fn apply_changes(
    store: &dyn Store,
    schema: &Schema,
    old: &RawRow,
    new: &Row,
    mode: ApplyMode,
    use_scripting: bool,
) -> Result<(usize, RawRow)> {
    let pkey = schema.pkey();
    let pk = match new.get(pkey).filter(|v| !v.is_null()) {
        Some(value) => schema
            .column(pkey)
            .map(|c| c.to_storage(value))
            .transpose()?
            .flatten(),
        None => None,
    }
    .or_else(|| old.get(pkey).cloned())
    .ok_or_else(|| ModelError::Column("Missing primary key value".to_string()))?;

    if !use_scripting {
        if schema.unique().len() > 1 {
            return Err(ModelError::Column(format!(
                "Only one unique column allowed without atomic scripting, you have: {:?}",
                schema.unique()
            )));
        }
        if !schema.composite_unique().is_empty() {
            return Err(ModelError::Column(
                "Cannot use multi-column unique constraints without atomic scripting".to_string(),
            ));
        }
        if !schema.prefixed().is_empty() || !schema.suffixed().is_empty() {
            return Err(ModelError::Column(
                "Cannot use prefix/suffix indexes without atomic scripting".to_string(),
            ));
        }
    }

    let delta = compute_delta(schema, old, new, mode)?;

    if delta.changes == 0 && mode != ApplyMode::Delete {
        tracing::trace!("{}:{} unchanged, skipping write", schema.namespace(), pk);
        return Ok((0, delta.row));
    }

    tracing::debug!(
        namespace = schema.namespace(),
        id = %pk,
        mode = ?mode,
        changes = delta.changes,
        scripted = use_scripting,
        "applying entity changes"
    );

    if use_scripting {
        scripted::write(store, schema, &pk, delta, mode)
    } else {
        watched::write(store, schema, &pk, delta, mode)
    }
}
