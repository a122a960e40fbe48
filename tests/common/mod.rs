//! Shared setup for the integration test targets

#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use kvmodel::script::ScriptReply;
use kvmodel::store::{Command, Watch};
use kvmodel::{
    Column, Config, Database, Entity, MemoryStore, ModelDef, Result, Schema, Session, Store, Value,
};
use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

/// Route `tracing` output through the test harness (RUST_LOG to enable)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Fresh in-memory store and database
pub fn memory_db(use_scripting: bool) -> (Arc<MemoryStore>, Database) {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let config = Config::builder().use_scripting(use_scripting).build();
    let db = Database::open(config, store.clone());
    (store, db)
}

/// `User`: unique email, a range-indexed age, a string name, a flag
pub fn user_model() -> ModelDef {
    ModelDef::new("User")
        .column("email", Column::string().required().unique())
        .column("name", Column::string().index())
        .column("age", Column::integer().index())
        .column("score", Column::float().index())
        .column("active", Column::boolean().index().default_value(true))
}

/// Create and save an entity in one step
pub fn insert(session: &Session, schema: &Arc<Schema>, fields: &[(&str, Value)]) -> Entity {
    let entity = session
        .create(schema, fields.iter().map(|(k, v)| (*k, v.clone())))
        .unwrap();
    session.save(&entity, false).unwrap();
    entity
}

/// Id of a saved entity
pub fn id_of(entity: &Entity) -> i64 {
    entity.id().expect("entity has been saved")
}

// =============================================================================
// Interfering store
// =============================================================================

/// Store wrapper that lets a competing client write between WATCH and EXEC
///
/// The queued interference is applied to the inner store right before the
/// first EXEC, so the watched keys change under the writer's feet.
pub struct InterferingStore {
    inner: Arc<MemoryStore>,
    interference: Mutex<Option<Vec<Command>>>,
    execs: AtomicUsize,
}

impl InterferingStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            interference: Mutex::new(None),
            execs: AtomicUsize::new(0),
        }
    }

    /// Apply `batch` from a competing client before the next EXEC
    pub fn interfere(&self, batch: Vec<Command>) {
        *self.interference.lock() = Some(batch);
    }

    /// Number of EXEC attempts seen
    pub fn exec_count(&self) -> usize {
        self.execs.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }
}

impl Store for InterferingStore {
    fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        self.inner.hget(key, field)
    }

    fn hmget(&self, key: &str, fields: &[String]) -> Result<Vec<Option<String>>> {
        self.inner.hmget(key, fields)
    }

    fn hgetall_many(&self, keys: &[String]) -> Result<Vec<HashMap<String, String>>> {
        self.inner.hgetall_many(keys)
    }

    fn smembers(&self, key: &str) -> Result<BTreeSet<String>> {
        self.inner.smembers(key)
    }

    fn zrange_by_score(
        &self,
        key: &str,
        min: Bound<f64>,
        max: Bound<f64>,
        limit: Option<(usize, usize)>,
    ) -> Result<Vec<(String, f64)>> {
        self.inner.zrange_by_score(key, min, max, limit)
    }

    fn incr(&self, key: &str) -> Result<i64> {
        self.inner.incr(key)
    }

    fn exists(&self, key: &str) -> Result<bool> {
        self.inner.exists(key)
    }

    fn watch(&self, keys: &[String]) -> Result<Watch> {
        self.inner.watch(keys)
    }

    fn exec(&self, watch: Option<&Watch>, batch: Vec<Command>) -> Result<()> {
        self.execs.fetch_add(1, Ordering::SeqCst);
        if let Some(competing) = self.interference.lock().take() {
            self.inner.apply(competing)?;
        }
        self.inner.exec(watch, batch)
    }

    fn eval_writer(&self, args: &[String]) -> Result<ScriptReply> {
        self.inner.eval_writer(args)
    }
}
