//! Store Module
//!
//! The connection-level interface to the key-value store.
//!
//! ## Responsibilities
//! - Hash, set and sorted-set reads
//! - Id allocation (INCR)
//! - Optimistic batches: WATCH keys, queue commands, EXEC
//! - Running the atomic writer script with exclusive key access
//!
//! ## Keyspace Layout
//! ```text
//! <ns>:<id>                 hash        column -> encoded value
//! <ns>:<column>:uidx        hash        encoded value -> id
//! <ns>:<key>:idx            set / zset  ids
//! <ns>:<column>:pre|suf     zset        "<token>\0<id>"
//! <ns>::                    hash        id -> index manifest
//! <ns>:<pk>:                counter     last assigned id
//! ```

mod command;
mod memory;

pub use command::Command;
pub use memory::MemoryStore;

use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;

use crate::error::Result;
use crate::script::ScriptReply;

/// Versions of watched keys, captured by [`Store::watch`]
#[derive(Debug, Clone, Default)]
pub struct Watch {
    versions: Vec<(String, u64)>,
}

impl Watch {
    pub fn new(versions: Vec<(String, u64)>) -> Self {
        Self { versions }
    }

    /// Watched keys with the version seen at WATCH time
    pub fn versions(&self) -> &[(String, u64)] {
        &self.versions
    }
}

/// Handle to the remote key-value store
///
/// Implementations must be safe to share between units of work; every
/// call is one round trip.
pub trait Store: Send + Sync {
    /// HGET
    fn hget(&self, key: &str, field: &str) -> Result<Option<String>>;

    /// HMGET, one slot per requested field
    fn hmget(&self, key: &str, fields: &[String]) -> Result<Vec<Option<String>>>;

    /// Pipelined HGETALL over several keys (empty map for missing keys)
    fn hgetall_many(&self, keys: &[String]) -> Result<Vec<HashMap<String, String>>>;

    /// HGETALL
    fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        let mut rows = self.hgetall_many(&[key.to_string()])?;
        Ok(rows.pop().unwrap_or_default())
    }

    /// SMEMBERS
    fn smembers(&self, key: &str) -> Result<BTreeSet<String>>;

    /// ZRANGEBYSCORE ... WITHSCORES [LIMIT offset count]
    fn zrange_by_score(
        &self,
        key: &str,
        min: Bound<f64>,
        max: Bound<f64>,
        limit: Option<(usize, usize)>,
    ) -> Result<Vec<(String, f64)>>;

    /// INCR
    fn incr(&self, key: &str) -> Result<i64>;

    /// EXISTS
    fn exists(&self, key: &str) -> Result<bool>;

    /// WATCH: remember the current version of `keys`
    fn watch(&self, keys: &[String]) -> Result<Watch>;

    /// MULTI + queued commands + EXEC
    ///
    /// Fails with `ModelError::TransientConflict` and applies nothing when
    /// any watched key changed since `watch`.
    fn exec(&self, watch: Option<&Watch>, batch: Vec<Command>) -> Result<()>;

    /// Run the pre-loaded writer script with positional arguments
    fn eval_writer(&self, args: &[String]) -> Result<ScriptReply>;
}
