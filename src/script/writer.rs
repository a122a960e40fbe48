//! Writer script
//!
//! Reference execution of the entity writer. A store runs this while holding
//! exclusive access to every key it touches, so the whole sequence is one
//! atomic step from the point of view of other writers.

use crate::error::Result;
use crate::keys;

use super::{Manifest, ScriptContext, ScriptReply, WriterArgs};

/// Execute the writer script against `ctx`
///
/// Steps:
/// 1. Verify every new unique value is unowned or owned by this id; on
///    conflict return the column before anything is written
/// 2. Drop superseded unique entries still owned by this id, then claim the
///    new ones
/// 3. Remove deleted fields from the row
/// 4. Write changed fields to the row
/// 5. Remove every index entry listed in the stored manifest
/// 6. On delete, remove the row and its manifest and stop
/// 7. Write the new index entries and overwrite the manifest
pub fn run_writer<C: ScriptContext + ?Sized>(ctx: &mut C, args: &[String]) -> Result<ScriptReply> {
    let args = WriterArgs::decode(args)?;
    let ns = args.namespace.as_str();
    let id = args.id.as_str();

    // Step 1: unique checks, no writes yet
    for (column, value) in &args.unique {
        let key = keys::unique_key(ns, column);
        if let Some(owner) = ctx.hget(&key, value)? {
            if owner != id {
                return Ok(ScriptReply::UniqueViolation(column.clone()));
            }
        }
    }

    // Step 2: unique index maintenance
    for (column, value) in &args.unique_removed {
        let key = keys::unique_key(ns, column);
        if ctx.hget(&key, value)?.as_deref() == Some(id) {
            ctx.hdel(&key, value)?;
        }
    }
    for (column, value) in &args.unique {
        ctx.hset(&keys::unique_key(ns, column), value, id)?;
    }

    // Steps 3-4: row fields
    let row = keys::row_key(ns, id);
    for field in &args.deleted {
        ctx.hdel(&row, field)?;
    }
    for (field, value) in &args.data {
        ctx.hset(&row, field, value)?;
    }

    // Step 5: clear what the previous save indexed
    let manifest_key = keys::manifest_key(ns);
    if let Some(raw) = ctx.hget(&manifest_key, id)? {
        let old = Manifest::decode(&raw)?;
        for key in &old.keys {
            ctx.srem(&keys::index_key(ns, key), id)?;
        }
        for key in &old.scored {
            ctx.zrem(&keys::index_key(ns, key), id)?;
        }
        for (column, token) in &old.prefix {
            ctx.zrem(&keys::prefix_key(ns, column), &keys::affix_member(token, id))?;
        }
        for (column, token) in &old.suffix {
            ctx.zrem(&keys::suffix_key(ns, column), &keys::affix_member(token, id))?;
        }
    }

    // Step 6
    if args.is_delete {
        ctx.del(&row)?;
        ctx.hdel(&manifest_key, id)?;
        return Ok(ScriptReply::Written(0));
    }

    // Step 7: new index entries and manifest
    let mut manifest = Manifest::default();
    for key in &args.keys {
        ctx.sadd(&keys::index_key(ns, key), id)?;
        manifest.keys.push(key.clone());
    }
    for (key, score) in &args.scores {
        ctx.zadd(&keys::index_key(ns, key), *score, id)?;
        manifest.scored.push(key.clone());
    }
    for entry in &args.prefix {
        let member = keys::affix_member(&entry.token, id);
        ctx.zadd(&keys::prefix_key(ns, &entry.column), entry.score, &member)?;
        manifest.prefix.push((entry.column.clone(), entry.token.clone()));
    }
    for entry in &args.suffix {
        let member = keys::affix_member(&entry.token, id);
        ctx.zadd(&keys::suffix_key(ns, &entry.column), entry.score, &member)?;
        manifest.suffix.push((entry.column.clone(), entry.token.clone()));
    }
    ctx.hset(&manifest_key, id, &manifest.encode()?)?;

    Ok(ScriptReply::Written(manifest.len() as i64))
}
