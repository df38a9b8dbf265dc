//! Table configuration that downstream crates can serialize/deserialize.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    /// Worker threads in the task pool. The dispatch strategy never asks for more.
    pub thread_pool_size: usize,

    /// Row count at or below which every operation runs serially.
    pub multithread_threshold: usize,

    /// Column count above which per-column work is split into pooled chunks.
    pub min_parallel_columns: usize,

    /// Optional seed for deterministic shuffles.
    pub seed: Option<u64>,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            thread_pool_size: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            multithread_threshold: 1_000,
            min_parallel_columns: 3,
            seed: None,
        }
    }
}

impl TableConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `TABULA_THREAD_POOL_SIZE`: worker threads
    /// - `TABULA_MT_THRESHOLD`: rows before parallel dispatch is considered
    /// - `TABULA_MIN_PARALLEL_COLUMNS`: columns before per-column work is chunked
    /// - `TABULA_SEED`: shuffle seed
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("TABULA_THREAD_POOL_SIZE") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.thread_pool_size = v;
            }
        }

        if let Ok(s) = std::env::var("TABULA_MT_THRESHOLD") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.multithread_threshold = v;
            }
        }

        if let Ok(s) = std::env::var("TABULA_MIN_PARALLEL_COLUMNS") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.min_parallel_columns = v;
            }
        }

        if let Ok(s) = std::env::var("TABULA_SEED") {
            if let Ok(v) = s.parse::<u64>() {
                cfg.seed = Some(v);
            }
        }

        cfg
    }

    /// Config that never leaves the calling thread.
    pub fn serial() -> Self {
        Self {
            thread_pool_size: 1,
            multithread_threshold: usize::MAX,
            ..Self::default()
        }
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.thread_pool_size = threads;
        self
    }

    pub fn with_threshold(mut self, rows: usize) -> Self {
        self.multithread_threshold = rows;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.thread_pool_size == 0 {
            return Err(Error::Config("thread_pool_size must be at least 1".into()));
        }
        Ok(())
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }
}
