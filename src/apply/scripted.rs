//! Scripted writer
//!
//! Ships the whole delta to the store's writer script in one invocation.

use crate::delta::{ApplyMode, Delta, RawRow};
use crate::error::{ModelError, Result};
use crate::schema::Schema;
use crate::script::{ScriptReply, WriterArgs};
use crate::store::Store;

pub(super) fn write(
    store: &dyn Store,
    schema: &Schema,
    pk: &str,
    delta: Delta,
    mode: ApplyMode,
) -> Result<(usize, RawRow)> {
    let Delta {
        keys,
        scores,
        prefix,
        suffix,
        unique,
        unique_removed,
        write,
        deleted,
        changes,
        row,
    } = delta;

    let args = WriterArgs {
        namespace: schema.namespace().to_string(),
        id: pk.to_string(),
        unique,
        unique_removed,
        deleted,
        data: write.into_iter().collect(),
        keys: keys.into_iter().collect(),
        scores,
        prefix,
        suffix,
        is_delete: mode == ApplyMode::Delete,
    };

    match store.eval_writer(&args.encode()?)? {
        ScriptReply::Written(entries) => {
            tracing::trace!("{}:{} wrote {} index entries", schema.namespace(), pk, entries);
            Ok((changes, row))
        }
        ScriptReply::UniqueViolation(column) => {
            let value = args.unique.get(&column).cloned().unwrap_or_default();
            tracing::debug!(
                namespace = schema.namespace(),
                id = %pk,
                column = %column,
                value = %value,
                "unique violation"
            );
            Err(ModelError::UniqueViolation {
                namespace: schema.namespace().to_string(),
                column,
                value,
            })
        }
    }
}
