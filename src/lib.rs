//! # kvmodel
//!
//! An object-to-key-value mapping layer with:
//! - Typed models validated once at registration
//! - Unique, composite-unique, range, prefix and suffix indexes kept by the
//!   client on a store that has none
//! - All-or-nothing entity writes (atomic writer script, or WATCH/MULTI/EXEC)
//! - Per-session identity cache
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Database                             │
//! │              (Config, Registry, Store handle)               │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ session()
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                        Session                              │
//! │        (lifecycle, retrieval, identity cache, Query)        │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ save / delete
//!          ┌────────────┴────────────┐
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │    Delta    │ ───────▶ │    Apply    │
//!   │  (pure)     │          │ script/WATCH│
//!   └─────────────┘          └──────┬──────┘
//!                                   │
//!                                   ▼
//!                           ┌─────────────┐
//!                           │    Store    │
//!                           │ (Memory...) │
//!                           └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod column;
pub mod keys;
pub mod store;
pub mod script;
pub mod schema;
pub mod index;
pub mod delta;
pub mod apply;
pub mod entity;
pub mod query;
pub mod session;
pub mod database;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{ModelError, Result};
pub use config::Config;
pub use column::{Column, Keygen, Keys, OnDelete, Value};
pub use schema::{ModelDef, Schema};
pub use entity::Entity;
pub use query::Query;
pub use session::{GetByOptions, Lookup, Session};
pub use database::Database;
pub use store::{MemoryStore, Store};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of kvmodel
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
