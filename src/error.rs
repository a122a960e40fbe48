//! Error types for kvmodel
//!
//! Provides a unified error type for registration, persistence and lookups.

use thiserror::Error;

/// Result type alias using ModelError
pub type Result<T> = std::result::Result<T, ModelError>;

/// Unified error type for kvmodel operations
#[derive(Debug, Error)]
pub enum ModelError {
    // -------------------------------------------------------------------------
    // Declaration Errors
    // -------------------------------------------------------------------------
    /// Bad model declaration, raised only by registration
    #[error("Schema error: {0}")]
    Schema(String),

    // -------------------------------------------------------------------------
    // Column Errors
    // -------------------------------------------------------------------------
    #[error("Column error: {0}")]
    Column(String),

    #[error("Missing required column: {0}")]
    MissingColumn(String),

    // -------------------------------------------------------------------------
    // Request Errors
    // -------------------------------------------------------------------------
    /// Malformed query (argument count, range misuse, non-indexed column)
    #[error("Request error: {0}")]
    Request(String),

    // -------------------------------------------------------------------------
    // Constraint Errors
    // -------------------------------------------------------------------------
    #[error("Value {value:?} for {namespace}:{column}:uidx is not distinct")]
    UniqueViolation {
        namespace: String,
        column: String,
        value: String,
    },

    #[error("Restricted delete: {0}")]
    Restrict(String),

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    // -------------------------------------------------------------------------
    // Store Errors
    // -------------------------------------------------------------------------
    /// A watched key changed before EXEC; retried by the optimistic writer
    #[error("Watched key changed concurrently")]
    TransientConflict,

    #[error("Connectivity error: {0}")]
    Connectivity(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ModelError {
    /// True for constraint failures that must reach the caller untouched
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, ModelError::UniqueViolation { .. })
    }
}
