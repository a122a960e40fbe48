//! Configuration for kvmodel
//!
//! Centralized configuration with sensible defaults.

/// Main configuration for a kvmodel database handle
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Write Path Configuration
    // -------------------------------------------------------------------------
    /// Commit entity writes through the atomic writer script.
    ///
    /// When disabled, writes fall back to WATCH/MULTI/EXEC and models are
    /// limited to a single plain unique column without prefix/suffix
    /// indexes or composite uniqueness. Checked at registration time.
    pub use_scripting: bool,

    // -------------------------------------------------------------------------
    // Session Configuration
    // -------------------------------------------------------------------------
    /// Keep a per-session identity map of loaded entities
    pub identity_cache: bool,

    /// Max rows fetched per batched HGETALL round trip
    ///
    /// Cache misses up to this size load in a single round trip; larger
    /// lookups are split into consecutive batches of this size.
    pub fetch_batch_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            use_scripting: true,
            identity_cache: true,
            fetch_batch_size: 100,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Enable or disable the atomic writer script
    pub fn use_scripting(mut self, enabled: bool) -> Self {
        self.config.use_scripting = enabled;
        self
    }

    /// Enable or disable the per-session identity map
    pub fn identity_cache(mut self, enabled: bool) -> Self {
        self.config.identity_cache = enabled;
        self
    }

    /// Set the max number of rows per batched fetch (minimum 1)
    pub fn fetch_batch_size(mut self, size: usize) -> Self {
        self.config.fetch_batch_size = size.max(1);
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
