//! Command definitions
//!
//! Write commands queued into a transactional batch (MULTI ... EXEC).

/// A queued write command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Set one or more hash fields
    HSet {
        key: String,
        fields: Vec<(String, String)>,
    },

    /// Remove hash fields
    HDel { key: String, fields: Vec<String> },

    /// Remove a whole key
    Del { key: String },

    /// Add a set member
    SAdd { key: String, member: String },

    /// Remove a set member
    SRem { key: String, member: String },

    /// Add or rescore a sorted-set member
    ZAdd {
        key: String,
        score: f64,
        member: String,
    },

    /// Remove a sorted-set member
    ZRem { key: String, member: String },
}

impl Command {
    /// Key touched by this command
    pub fn key(&self) -> &str {
        match self {
            Command::HSet { key, .. }
            | Command::HDel { key, .. }
            | Command::Del { key }
            | Command::SAdd { key, .. }
            | Command::SRem { key, .. }
            | Command::ZAdd { key, .. }
            | Command::ZRem { key, .. } => key,
        }
    }

    /// Wire name of the command
    pub fn name(&self) -> &'static str {
        match self {
            Command::HSet { .. } => "HSET",
            Command::HDel { .. } => "HDEL",
            Command::Del { .. } => "DEL",
            Command::SAdd { .. } => "SADD",
            Command::SRem { .. } => "SREM",
            Command::ZAdd { .. } => "ZADD",
            Command::ZRem { .. } => "ZREM",
        }
    }
}
