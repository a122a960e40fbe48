//! Script Module
//!
//! The atomic entity writer: its positional argument contract, the index
//! manifest it maintains, and a reference execution over store primitives.
//!
//! The client-side delta computation (`crate::delta`) and this writer must
//! change in lockstep; the argument layout in [`args`] is the contract.

mod args;
mod manifest;
mod writer;

pub use args::{AffixEntry, WriterArgs, WRITER_ARG_COUNT};
pub use manifest::Manifest;
pub use writer::run_writer;

use crate::error::Result;

/// Result of a writer invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptReply {
    /// Committed; number of index entries written
    Written(i64),

    /// Aborted without effect; names the conflicting unique column or group
    UniqueViolation(String),
}

/// Store primitives available to the writer while it holds exclusive access
pub trait ScriptContext {
    fn hget(&mut self, key: &str, field: &str) -> Result<Option<String>>;
    fn hset(&mut self, key: &str, field: &str, value: &str) -> Result<()>;
    fn hdel(&mut self, key: &str, field: &str) -> Result<()>;
    fn del(&mut self, key: &str) -> Result<()>;
    fn sadd(&mut self, key: &str, member: &str) -> Result<()>;
    fn srem(&mut self, key: &str, member: &str) -> Result<()>;
    fn zadd(&mut self, key: &str, score: f64, member: &str) -> Result<()>;
    fn zrem(&mut self, key: &str, member: &str) -> Result<()>;
}
