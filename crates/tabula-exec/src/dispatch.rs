//! Size-adaptive serial/parallel decision.
//!
//! A thread level is only computed once the row count exceeds the configured
//! threshold; small tables always run serially. Parallel dispatch is used
//! only when the level exceeds 2.

use tabula_core::config::TableConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Serial,
    Parallel { threads: usize },
}

impl Dispatch {
    pub fn is_parallel(&self) -> bool {
        matches!(self, Dispatch::Parallel { .. })
    }

    /// Chunk length that spreads `items` across the dispatched threads.
    pub fn chunk_len(&self, items: usize) -> usize {
        match self {
            Dispatch::Serial => items.max(1),
            Dispatch::Parallel { threads } => items.div_ceil(*threads).max(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchStrategy {
    threshold: usize,
    pool_threads: usize,
    min_parallel_columns: usize,
}

impl DispatchStrategy {
    pub fn new(cfg: &TableConfig, pool_threads: usize) -> Self {
        Self {
            threshold: cfg.multithread_threshold,
            pool_threads: pool_threads.min(cfg.thread_pool_size.max(1)),
            min_parallel_columns: cfg.min_parallel_columns,
        }
    }

    /// Usable parallelism for `rows`; zero below the threshold.
    pub fn thread_level(&self, rows: usize) -> usize {
        if rows > self.threshold {
            self.pool_threads
        } else {
            0
        }
    }

    /// Mode for row-parallel work (the sort comparison itself).
    pub fn for_rows(&self, rows: usize) -> Dispatch {
        let level = self.thread_level(rows);
        if level > 2 {
            Dispatch::Parallel { threads: level }
        } else {
            Dispatch::Serial
        }
    }

    /// Mode for column-parallel work over `columns` affected columns.
    pub fn for_columns(&self, rows: usize, columns: usize) -> Dispatch {
        match self.for_rows(rows) {
            Dispatch::Parallel { threads } if columns > 1 => Dispatch::Parallel {
                threads: threads.min(columns),
            },
            _ => Dispatch::Serial,
        }
    }

    /// Mode for applying a sort permutation; only worth splitting past a
    /// small fixed number of columns.
    pub fn for_permutation(&self, rows: usize, columns: usize) -> Dispatch {
        if columns > self.min_parallel_columns {
            self.for_columns(rows, columns)
        } else {
            Dispatch::Serial
        }
    }
}
