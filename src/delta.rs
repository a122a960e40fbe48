//! Index delta computation
//!
//! Turns an entity's last-persisted raw fields and its current typed values
//! into everything a writer needs: field writes and deletions, unique index
//! claims and releases, and the complete set of index entries for the new
//! state. Pure; never touches the store.

use std::collections::{BTreeMap, BTreeSet};

use crate::column::{prefix_score, reverse_token, Keys, Value};
use crate::error::Result;
use crate::keys;
use crate::schema::Schema;
use crate::script::AffixEntry;

/// Typed field values by column
pub type Row = BTreeMap<String, Value>;

/// Encoded field values by column, as stored in the entity hash
pub type RawRow = BTreeMap<String, String>;

/// How much of the entity to write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    /// Write changed columns only
    Partial,

    /// Rewrite every column (first save, forced save)
    Full,

    /// Remove the entity and everything it owns
    Delete,
}

/// Everything one apply will change
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Delta {
    /// Set index keys (`column:token`)
    pub keys: BTreeSet<String>,

    /// Sorted-set index keys (`column` or `column:token`) with scores
    pub scores: BTreeMap<String, f64>,

    pub prefix: Vec<AffixEntry>,
    pub suffix: Vec<AffixEntry>,

    /// Unique entries to claim: column or group name -> encoded value
    pub unique: BTreeMap<String, String>,

    /// Unique entries to release
    pub unique_removed: BTreeMap<String, String>,

    /// Row fields to write
    pub write: BTreeMap<String, String>,

    /// Row fields to remove
    pub deleted: Vec<String>,

    /// Logically changed columns
    pub changes: usize,

    /// Complete raw snapshot of the new state
    pub row: RawRow,
}

/// Encode a composite unique value (JSON array of raw components)
pub fn encode_composite(values: &[&str]) -> Result<String> {
    Ok(serde_json::to_string(values)?)
}

/// Compute the delta between `old` (raw, last persisted) and `new` (typed)
pub fn compute_delta(schema: &Schema, old: &RawRow, new: &Row, mode: ApplyMode) -> Result<Delta> {
    let full = mode == ApplyMode::Full;
    let delete = mode == ApplyMode::Delete;
    let mut delta = Delta::default();

    for (attr, column) in schema.stored_columns() {
        let roval = old.get(attr);
        let nval = if delete {
            None
        } else {
            new.get(attr).filter(|v| !v.is_null())
        };
        let rnval = match nval {
            Some(value) => column.to_storage(value)?,
            None => None,
        };
        if let Some(raw) = &rnval {
            delta.row.insert(attr.to_string(), raw.clone());
        }

        if let Some(value) = nval {
            if column.is_indexed() || column.is_prefix() || column.is_suffix() {
                index_entries(schema, attr, value, &mut delta)?;
            }
        }

        if rnval.is_none() && roval.is_none() {
            continue;
        }
        if rnval.as_ref() == roval && !full {
            continue;
        }

        delta.changes += 1;

        let Some(rnval) = rnval else {
            // Removed column
            delta.deleted.push(attr.to_string());
            if let (true, Some(ro)) = (column.is_unique(), roval) {
                delta.unique_removed.insert(attr.to_string(), ro.clone());
            }
            continue;
        };

        if column.is_unique() {
            if let Some(ro) = roval.filter(|ro| **ro != rnval) {
                delta.unique_removed.insert(attr.to_string(), ro.clone());
            }
            delta.unique.insert(attr.to_string(), rnval.clone());
        }
        delta.write.insert(attr.to_string(), rnval);
    }

    for group in schema.composite_unique() {
        let name = keys::composite_name(group);
        let odata: Vec<Option<&str>> = group.iter().map(|c| old.get(c).map(String::as_str)).collect();
        let ndata: Vec<Option<&str>> = group
            .iter()
            .map(|c| delta.row.get(c).map(String::as_str))
            .collect();
        if odata == ndata {
            continue;
        }

        if let Some(values) = odata.iter().copied().collect::<Option<Vec<&str>>>() {
            delta
                .unique_removed
                .insert(name.clone(), encode_composite(&values)?);
        }
        if let Some(values) = ndata.iter().copied().collect::<Option<Vec<&str>>>() {
            let encoded = encode_composite(&values)?;
            delta.unique.insert(name, encoded);
        }
    }

    Ok(delta)
}

/// Run the column keygen and record the resulting index entries
fn index_entries(schema: &Schema, attr: &str, value: &Value, delta: &mut Delta) -> Result<()> {
    let Some(column) = schema.column(attr) else {
        return Ok(());
    };
    let Some(keygen) = column.effective_keygen() else {
        return Ok(());
    };

    match keygen.generate(value)? {
        Keys::Tokens(tokens) => {
            if column.is_indexed() {
                for token in &tokens {
                    delta.keys.insert(format!("{}:{}", attr, token));
                }
            }
            if column.is_prefix() {
                for token in &tokens {
                    delta.prefix.push(affix_entry(attr, token.clone()));
                }
            }
            if column.is_suffix() {
                for token in &tokens {
                    delta.suffix.push(affix_entry(attr, reverse_token(token)));
                }
            }
        }
        Keys::Scores(scores) => {
            if column.is_indexed() {
                for (token, score) in scores {
                    let key = if token.is_empty() {
                        attr.to_string()
                    } else {
                        format!("{}:{}", attr, token)
                    };
                    delta.scores.insert(key, score);
                }
            }
            if column.is_prefix() || column.is_suffix() {
                match keygen.affix_token(value) {
                    Some(token) => {
                        if column.is_suffix() {
                            delta.suffix.push(affix_entry(attr, reverse_token(&token)));
                        }
                        if column.is_prefix() {
                            delta.prefix.push(affix_entry(attr, token));
                        }
                    }
                    None => tracing::warn!(
                        "prefix/suffix indexes are not supported for keygen {:?} on {}.{}",
                        keygen,
                        schema.name(),
                        attr
                    ),
                }
            }
        }
        Keys::Empty => {}
    }
    Ok(())
}

fn affix_entry(attr: &str, token: String) -> AffixEntry {
    AffixEntry {
        column: attr.to_string(),
        score: prefix_score(&token, false),
        token,
    }
}
