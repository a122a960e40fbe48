//! In-memory store
//!
//! A process-local implementation of [`Store`] with the same observable
//! semantics as the remote store: typed keys, empty containers vanish,
//! WATCH versions per key, sorted sets ordered by (score, member), and
//! scripts that run with exclusive access.
//!
//! ## Concurrency
//! - All state lives behind one `RwLock`
//! - Reads take the read lock
//! - EXEC and scripts take the write lock for their whole duration

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;

use parking_lot::RwLock;

use crate::error::{ModelError, Result};
use crate::script::{run_writer, ScriptContext, ScriptReply};

use super::{Command, Store, Watch};

/// In-memory key-value store
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Keyspace>,
}

/// Sorted-set score with a total order
#[derive(Debug, Clone, Copy)]
struct Score(f64);

impl PartialEq for Score {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[derive(Debug, Default)]
struct SortedSet {
    scores: HashMap<String, f64>,
    order: BTreeSet<(Score, String)>,
}

impl SortedSet {
    fn insert(&mut self, score: f64, member: &str) {
        if let Some(old) = self.scores.insert(member.to_string(), score) {
            self.order.remove(&(Score(old), member.to_string()));
        }
        self.order.insert((Score(score), member.to_string()));
    }

    fn remove(&mut self, member: &str) {
        if let Some(old) = self.scores.remove(member) {
            self.order.remove(&(Score(old), member.to_string()));
        }
    }

    fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

#[derive(Debug)]
enum Entry {
    Hash(HashMap<String, String>),
    Set(BTreeSet<String>),
    SortedSet(SortedSet),
    Counter(i64),
}

impl Entry {
    fn type_name(&self) -> &'static str {
        match self {
            Entry::Hash(_) => "hash",
            Entry::Set(_) => "set",
            Entry::SortedSet(_) => "zset",
            Entry::Counter(_) => "string",
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Entry::Hash(h) => h.is_empty(),
            Entry::Set(s) => s.is_empty(),
            Entry::SortedSet(z) => z.is_empty(),
            Entry::Counter(_) => false,
        }
    }
}

#[derive(Debug, Default)]
struct Keyspace {
    data: HashMap<String, Entry>,

    /// Last modification stamp per key; survives key deletion
    versions: HashMap<String, u64>,
    clock: u64,

    /// Mutating commands applied so far
    writes: u64,
}

fn wrong_type(key: &str, found: &Entry) -> ModelError {
    ModelError::Connectivity(format!(
        "WRONGTYPE operation against key {:?} holding a {}",
        key,
        found.type_name()
    ))
}

impl Keyspace {
    fn touch(&mut self, key: &str) {
        self.clock += 1;
        self.writes += 1;
        self.versions.insert(key.to_string(), self.clock);
    }

    fn version(&self, key: &str) -> u64 {
        self.versions.get(key).copied().unwrap_or(0)
    }

    /// Drop a container that became empty
    fn prune(&mut self, key: &str) {
        if self.data.get(key).is_some_and(Entry::is_empty) {
            self.data.remove(key);
        }
    }

    fn hash(&self, key: &str) -> Result<Option<&HashMap<String, String>>> {
        match self.data.get(key) {
            None => Ok(None),
            Some(Entry::Hash(h)) => Ok(Some(h)),
            Some(other) => Err(wrong_type(key, other)),
        }
    }

    fn hash_mut(&mut self, key: &str) -> Result<&mut HashMap<String, String>> {
        let entry = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Entry::Hash(HashMap::new()));
        match entry {
            Entry::Hash(h) => Ok(h),
            other => Err(wrong_type(key, other)),
        }
    }

    fn set_mut(&mut self, key: &str) -> Result<&mut BTreeSet<String>> {
        let entry = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Entry::Set(BTreeSet::new()));
        match entry {
            Entry::Set(s) => Ok(s),
            other => Err(wrong_type(key, other)),
        }
    }

    fn zset_mut(&mut self, key: &str) -> Result<&mut SortedSet> {
        let entry = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Entry::SortedSet(SortedSet::default()));
        match entry {
            Entry::SortedSet(z) => Ok(z),
            other => Err(wrong_type(key, other)),
        }
    }

    fn apply(&mut self, command: &Command) -> Result<()> {
        match command {
            Command::HSet { key, fields } => {
                for (field, value) in fields {
                    self.hset(key, field, value)?;
                }
            }
            Command::HDel { key, fields } => {
                for field in fields {
                    self.hdel(key, field)?;
                }
            }
            Command::Del { key } => self.del(key)?,
            Command::SAdd { key, member } => self.sadd(key, member)?,
            Command::SRem { key, member } => self.srem(key, member)?,
            Command::ZAdd { key, score, member } => self.zadd(key, *score, member)?,
            Command::ZRem { key, member } => self.zrem(key, member)?,
        }
        Ok(())
    }

    /// Type-check a batch before applying any of it
    fn check_types(&self, batch: &[Command]) -> Result<()> {
        for command in batch {
            let key = command.key();
            let Some(found) = self.data.get(key) else {
                continue;
            };
            let ok = match command {
                Command::HSet { .. } | Command::HDel { .. } => matches!(found, Entry::Hash(_)),
                Command::SAdd { .. } | Command::SRem { .. } => matches!(found, Entry::Set(_)),
                Command::ZAdd { .. } | Command::ZRem { .. } => matches!(found, Entry::SortedSet(_)),
                Command::Del { .. } => true,
            };
            if !ok {
                return Err(wrong_type(key, found));
            }
        }
        Ok(())
    }
}

impl ScriptContext for Keyspace {
    fn hget(&mut self, key: &str, field: &str) -> Result<Option<String>> {
        Ok(self.hash(key)?.and_then(|h| h.get(field).cloned()))
    }

    fn hset(&mut self, key: &str, field: &str, value: &str) -> Result<()> {
        self.hash_mut(key)?.insert(field.to_string(), value.to_string());
        self.touch(key);
        Ok(())
    }

    fn hdel(&mut self, key: &str, field: &str) -> Result<()> {
        if self.hash(key)?.is_none() {
            return Ok(());
        }
        if self.hash_mut(key)?.remove(field).is_some() {
            self.touch(key);
            self.prune(key);
        }
        Ok(())
    }

    fn del(&mut self, key: &str) -> Result<()> {
        if self.data.remove(key).is_some() {
            self.touch(key);
        }
        Ok(())
    }

    fn sadd(&mut self, key: &str, member: &str) -> Result<()> {
        if self.set_mut(key)?.insert(member.to_string()) {
            self.touch(key);
        }
        Ok(())
    }

    fn srem(&mut self, key: &str, member: &str) -> Result<()> {
        match self.data.get_mut(key) {
            None => return Ok(()),
            Some(Entry::Set(s)) => {
                if !s.remove(member) {
                    return Ok(());
                }
            }
            Some(other) => return Err(wrong_type(key, other)),
        }
        self.touch(key);
        self.prune(key);
        Ok(())
    }

    fn zadd(&mut self, key: &str, score: f64, member: &str) -> Result<()> {
        self.zset_mut(key)?.insert(score, member);
        self.touch(key);
        Ok(())
    }

    fn zrem(&mut self, key: &str, member: &str) -> Result<()> {
        match self.data.get_mut(key) {
            None => return Ok(()),
            Some(Entry::SortedSet(z)) => {
                if !z.scores.contains_key(member) {
                    return Ok(());
                }
                z.remove(member);
            }
            Some(other) => return Err(wrong_type(key, other)),
        }
        self.touch(key);
        self.prune(key);
        Ok(())
    }
}

fn above(score: f64, min: Bound<f64>) -> bool {
    match min {
        Bound::Included(m) => score >= m,
        Bound::Excluded(m) => score > m,
        Bound::Unbounded => true,
    }
}

fn below(score: f64, max: Bound<f64>) -> bool {
    match max {
        Bound::Included(m) => score <= m,
        Bound::Excluded(m) => score < m,
        Bound::Unbounded => true,
    }
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Total mutating commands applied (EXEC and scripts)
    pub fn write_count(&self) -> u64 {
        self.inner.read().writes
    }

    /// Number of live keys
    pub fn key_count(&self) -> usize {
        self.inner.read().data.len()
    }

    /// Live keys starting with `prefix`, sorted
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let inner = self.inner.read();
        let mut keys: Vec<String> = inner
            .data
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Drop every key
    pub fn flush_all(&self) {
        let mut inner = self.inner.write();
        let keys: Vec<String> = inner.data.keys().cloned().collect();
        for key in keys {
            inner.data.remove(&key);
            inner.touch(&key);
        }
    }

    /// Apply commands outside of any watch (test setup, tooling)
    pub fn apply(&self, batch: Vec<Command>) -> Result<()> {
        self.exec(None, batch)
    }
}

impl Store for MemoryStore {
    fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        let inner = self.inner.read();
        Ok(inner.hash(key)?.and_then(|h| h.get(field).cloned()))
    }

    fn hmget(&self, key: &str, fields: &[String]) -> Result<Vec<Option<String>>> {
        let inner = self.inner.read();
        let hash = inner.hash(key)?;
        Ok(fields
            .iter()
            .map(|f| hash.and_then(|h| h.get(f).cloned()))
            .collect())
    }

    fn hgetall_many(&self, keys: &[String]) -> Result<Vec<HashMap<String, String>>> {
        let inner = self.inner.read();
        keys.iter()
            .map(|key| Ok(inner.hash(key)?.cloned().unwrap_or_default()))
            .collect()
    }

    fn smembers(&self, key: &str) -> Result<BTreeSet<String>> {
        let inner = self.inner.read();
        match inner.data.get(key) {
            None => Ok(BTreeSet::new()),
            Some(Entry::Set(s)) => Ok(s.clone()),
            Some(other) => Err(wrong_type(key, other)),
        }
    }

    fn zrange_by_score(
        &self,
        key: &str,
        min: Bound<f64>,
        max: Bound<f64>,
        limit: Option<(usize, usize)>,
    ) -> Result<Vec<(String, f64)>> {
        let inner = self.inner.read();
        let zset = match inner.data.get(key) {
            None => return Ok(Vec::new()),
            Some(Entry::SortedSet(z)) => z,
            Some(other) => return Err(wrong_type(key, other)),
        };

        let (offset, count) = limit.unwrap_or((0, usize::MAX));
        Ok(zset
            .order
            .iter()
            .skip_while(|(s, _)| !above(s.0, min))
            .take_while(|(s, _)| below(s.0, max))
            .skip(offset)
            .take(count)
            .map(|(s, m)| (m.clone(), s.0))
            .collect())
    }

    fn incr(&self, key: &str) -> Result<i64> {
        let mut inner = self.inner.write();
        let entry = inner
            .data
            .entry(key.to_string())
            .or_insert(Entry::Counter(0));
        let next = match entry {
            Entry::Counter(n) => {
                *n += 1;
                *n
            }
            other => return Err(wrong_type(key, other)),
        };
        inner.touch(key);
        Ok(next)
    }

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.inner.read().data.contains_key(key))
    }

    fn watch(&self, keys: &[String]) -> Result<Watch> {
        let inner = self.inner.read();
        Ok(Watch::new(
            keys.iter()
                .map(|k| (k.clone(), inner.version(k)))
                .collect(),
        ))
    }

    fn exec(&self, watch: Option<&Watch>, batch: Vec<Command>) -> Result<()> {
        let mut inner = self.inner.write();

        if let Some(watch) = watch {
            let changed = watch
                .versions()
                .iter()
                .any(|(key, seen)| inner.version(key) != *seen);
            if changed {
                return Err(ModelError::TransientConflict);
            }
        }

        inner.check_types(&batch)?;
        for command in &batch {
            tracing::trace!("EXEC {} {}", command.name(), command.key());
            inner.apply(command)?;
        }
        Ok(())
    }

    fn eval_writer(&self, args: &[String]) -> Result<ScriptReply> {
        let mut inner = self.inner.write();
        run_writer(&mut *inner, args)
    }
}
