//! Writer script arguments
//!
//! The writer is invoked with eleven positional string arguments:
//!
//! ```text
//! 1  namespace
//! 2  id
//! 3  unique           {"col": "encoded", ...}
//! 4  unique removals  {"col": "encoded", ...}
//! 5  deleted fields   ["col", ...]
//! 6  data             ["col", "value", "col", "value", ...]
//! 7  set keys         ["col:token", ...]
//! 8  scores           {"col" | "col:token": score, ...}
//! 9  prefix           [["col", "token", score], ...]
//! 10 suffix           [["col", "reversed token", score], ...]
//! 11 is_delete        true | false
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// Number of positional writer arguments
pub const WRITER_ARG_COUNT: usize = 11;

/// One prefix or suffix index entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "(String, String, f64)", into = "(String, String, f64)")]
pub struct AffixEntry {
    pub column: String,
    pub token: String,
    pub score: f64,
}

impl From<(String, String, f64)> for AffixEntry {
    fn from((column, token, score): (String, String, f64)) -> Self {
        Self {
            column,
            token,
            score,
        }
    }
}

impl From<AffixEntry> for (String, String, f64) {
    fn from(entry: AffixEntry) -> Self {
        (entry.column, entry.token, entry.score)
    }
}

/// Decoded writer arguments
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriterArgs {
    pub namespace: String,
    pub id: String,
    pub unique: BTreeMap<String, String>,
    pub unique_removed: BTreeMap<String, String>,
    pub deleted: Vec<String>,
    pub data: Vec<(String, String)>,
    pub keys: Vec<String>,
    pub scores: BTreeMap<String, f64>,
    pub prefix: Vec<AffixEntry>,
    pub suffix: Vec<AffixEntry>,
    pub is_delete: bool,
}

impl WriterArgs {
    /// Encode into positional script arguments
    pub fn encode(&self) -> Result<Vec<String>> {
        let flat_data: Vec<&str> = self
            .data
            .iter()
            .flat_map(|(field, value)| [field.as_str(), value.as_str()])
            .collect();

        Ok(vec![
            self.namespace.clone(),
            self.id.clone(),
            serde_json::to_string(&self.unique)?,
            serde_json::to_string(&self.unique_removed)?,
            serde_json::to_string(&self.deleted)?,
            serde_json::to_string(&flat_data)?,
            serde_json::to_string(&self.keys)?,
            serde_json::to_string(&self.scores)?,
            serde_json::to_string(&self.prefix)?,
            serde_json::to_string(&self.suffix)?,
            serde_json::to_string(&self.is_delete)?,
        ])
    }

    /// Decode positional script arguments
    pub fn decode(args: &[String]) -> Result<Self> {
        if args.len() != WRITER_ARG_COUNT {
            return Err(ModelError::Connectivity(format!(
                "writer script expects {} arguments, got {}",
                WRITER_ARG_COUNT,
                args.len()
            )));
        }

        let flat_data: Vec<String> = serde_json::from_str(&args[5])?;
        if flat_data.len() % 2 != 0 {
            return Err(ModelError::Connectivity(format!(
                "writer script data has an odd number of items ({})",
                flat_data.len()
            )));
        }
        let data = flat_data
            .chunks_exact(2)
            .map(|pair| (pair[0].clone(), pair[1].clone()))
            .collect();

        Ok(Self {
            namespace: args[0].clone(),
            id: args[1].clone(),
            unique: serde_json::from_str(&args[2])?,
            unique_removed: serde_json::from_str(&args[3])?,
            deleted: serde_json::from_str(&args[4])?,
            data,
            keys: serde_json::from_str(&args[6])?,
            scores: serde_json::from_str(&args[7])?,
            prefix: serde_json::from_str(&args[8])?,
            suffix: serde_json::from_str(&args[9])?,
            is_delete: serde_json::from_str(&args[10])?,
        })
    }
}
