//! Index manifest
//!
//! Record of exactly which index entries an entity's last save wrote, kept in
//! `<ns>::` under the entity id. Removal reads this record instead of
//! recomputing entries from the (possibly different) old values.

use serde::Deserialize;

use crate::error::Result;

/// Index entries written by one save
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    /// Set index keys (`column:token`)
    pub keys: Vec<String>,

    /// Sorted-set index keys (`column` or `column:token`)
    pub scored: Vec<String>,

    /// Prefix entries as `(column, token)`
    pub prefix: Vec<(String, String)>,

    /// Suffix entries as `(column, reversed token)`
    pub suffix: Vec<(String, String)>,
}

/// Stored shapes: the current 4-tuple, and the 2-tuple written before
/// prefix/suffix indexes existed
#[derive(Deserialize)]
#[serde(untagged)]
enum ManifestWire {
    Full(
        Vec<String>,
        Vec<String>,
        Vec<(String, String)>,
        Vec<(String, String)>,
    ),
    Legacy(Vec<String>, Vec<String>),
}

impl Manifest {
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.scored.is_empty() && self.prefix.is_empty() && self.suffix.is_empty()
    }

    /// Number of index entries recorded
    pub fn len(&self) -> usize {
        self.keys.len() + self.scored.len() + self.prefix.len() + self.suffix.len()
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(&(
            &self.keys,
            &self.scored,
            &self.prefix,
            &self.suffix,
        ))?)
    }

    pub fn decode(raw: &str) -> Result<Self> {
        let manifest = match serde_json::from_str(raw)? {
            ManifestWire::Full(keys, scored, prefix, suffix) => Self {
                keys,
                scored,
                prefix,
                suffix,
            },
            ManifestWire::Legacy(keys, scored) => Self {
                keys,
                scored,
                ..Self::default()
            },
        };
        Ok(manifest)
    }
}
