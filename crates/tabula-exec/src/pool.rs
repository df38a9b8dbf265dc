//! Fixed-size task pool backed by rayon.
//!
//! Three entry points cover everything the engines need:
//! - `submit` runs one owned unit of work and returns a `TaskHandle`.
//! - `parallel_sort` is the row-parallel primitive used by the sort engine.
//! - `parallel_for` / `parallel_map` run borrowed per-chunk work and join it
//!   before returning.
//!
//! Panics inside pooled work are caught and surfaced as `Error::Task` on join.

use std::any::Any;
use std::cmp::Ordering;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{self, AtomicUsize};
use std::sync::mpsc;
use std::sync::Arc;

use once_cell::sync::Lazy;
use rayon::prelude::*;

use tabula_core::config::TableConfig;
use tabula_core::error::{Error, Result};
use tabula_core::id::TaskId;

static GLOBAL_POOL: Lazy<Arc<TaskPool>> = Lazy::new(|| {
    let cfg = TableConfig::from_env();
    Arc::new(TaskPool::new_or_inline(cfg.thread_pool_size))
});

pub struct TaskPool {
    // None means the pool could not be built; everything runs inline.
    pool: Option<rayon::ThreadPool>,
    threads: usize,
    next_task: AtomicUsize,
}

impl std::fmt::Debug for TaskPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskPool")
            .field("threads", &self.threads)
            .field("inline", &self.pool.is_none())
            .finish()
    }
}

impl TaskPool {
    pub fn new(threads: usize) -> Result<Self> {
        if threads == 0 {
            return Err(Error::Config("task pool needs at least one thread".into()));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("tabula-worker-{i}"))
            .build()
            .map_err(|e| Error::Config(format!("thread pool: {e}")))?;
        Ok(Self {
            pool: Some(pool),
            threads,
            next_task: AtomicUsize::new(0),
        })
    }

    /// Build a pool, falling back to inline execution if threads cannot be spawned.
    pub fn new_or_inline(threads: usize) -> Self {
        match Self::new(threads.max(1)) {
            Ok(pool) => pool,
            Err(e) => {
                tracing::warn!(error = %e, "falling back to inline task execution");
                Self::inline()
            }
        }
    }

    /// A pool that runs every task on the calling thread.
    pub fn inline() -> Self {
        Self {
            pool: None,
            threads: 1,
            next_task: AtomicUsize::new(0),
        }
    }

    /// Process-wide pool sized from `TableConfig::from_env()`.
    pub fn global() -> Arc<TaskPool> {
        Arc::clone(&GLOBAL_POOL)
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    fn next_id(&self) -> TaskId {
        TaskId::new(self.next_task.fetch_add(1, atomic::Ordering::Relaxed))
    }

    /// Run `work` and return a handle to its result.
    ///
    /// With `is_async == false` the work runs on the calling thread before this
    /// returns; the handle is already resolved.
    pub fn submit<R, F>(&self, is_async: bool, work: F) -> TaskHandle<R>
    where
        R: Send + 'static,
        F: FnOnce() -> Result<R> + Send + 'static,
    {
        let id = self.next_id();
        let pool = match (&self.pool, is_async) {
            (Some(pool), true) => pool,
            _ => {
                tracing::trace!(task = %id, "running task inline");
                return TaskHandle::ready(id, run_caught(work));
            }
        };

        let (tx, rx) = mpsc::sync_channel(1);
        tracing::trace!(task = %id, "submitting task");
        pool.spawn(move || {
            // The receiver may already be gone; the result is simply discarded.
            let _ = tx.send(run_caught(work));
        });
        TaskHandle {
            id,
            state: HandleState::Pending(rx),
        }
    }

    /// Stable sort of `items` using the pool's workers.
    pub fn parallel_sort<T, F>(&self, items: &mut [T], cmp: F)
    where
        T: Send,
        F: Fn(&T, &T) -> Ordering + Send + Sync,
    {
        match &self.pool {
            Some(pool) => pool.install(|| items.par_sort_by(cmp)),
            None => items.sort_by(cmp),
        }
    }

    /// Split `items` into chunks of `chunk_len`, run `body` once per chunk,
    /// and join every chunk before returning.
    ///
    /// A failing chunk does not stop its siblings; the first error (in chunk
    /// order) is returned after all of them finish.
    pub fn parallel_for<T, F>(&self, items: &mut [T], chunk_len: usize, body: F) -> Result<()>
    where
        T: Send,
        F: Fn(usize, &mut [T]) -> Result<()> + Sync,
    {
        let chunk_len = chunk_len.max(1);
        let results: Vec<Result<()>> = match &self.pool {
            Some(pool) => pool.install(|| {
                items
                    .par_chunks_mut(chunk_len)
                    .enumerate()
                    .map(|(i, chunk)| {
                        tracing::trace!(chunk = i, len = chunk.len(), "parallel chunk");
                        run_caught(|| body(i, chunk))
                    })
                    .collect()
            }),
            None => items
                .chunks_mut(chunk_len)
                .enumerate()
                .map(|(i, chunk)| run_caught(|| body(i, chunk)))
                .collect(),
        };
        results.into_iter().collect::<Result<Vec<()>>>().map(|_| ())
    }

    /// Map every item through `f` on the pool, preserving input order.
    pub fn parallel_map<T, R, F>(&self, items: &[T], f: F) -> Result<Vec<R>>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> Result<R> + Sync,
    {
        let results: Vec<Result<R>> = match &self.pool {
            Some(pool) => pool.install(|| items.par_iter().map(|item| run_caught(|| f(item))).collect()),
            None => items.iter().map(|item| run_caught(|| f(item))).collect(),
        };
        results.into_iter().collect()
    }
}

fn run_caught<R>(work: impl FnOnce() -> Result<R>) -> Result<R> {
    match panic::catch_unwind(AssertUnwindSafe(work)) {
        Ok(result) => result,
        Err(payload) => Err(Error::Task(panic_message(payload))),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}

enum HandleState<R> {
    Ready(Result<R>),
    Pending(mpsc::Receiver<Result<R>>),
}

/// Handle to a submitted task. Resolving it consumes the handle, so each
/// result (or failure) is observed exactly once.
pub struct TaskHandle<R> {
    id: TaskId,
    state: HandleState<R>,
}

impl<R> TaskHandle<R> {
    pub fn ready(id: TaskId, result: Result<R>) -> Self {
        Self {
            id,
            state: HandleState::Ready(result),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Block until the task finishes and return its result.
    pub fn get(self) -> Result<R> {
        match self.state {
            HandleState::Ready(result) => result,
            HandleState::Pending(rx) => rx
                .recv()
                .unwrap_or_else(|_| Err(Error::Task(format!("{} dropped its result", self.id)))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_async_and_join() {
        let pool = TaskPool::new(2).unwrap();
        let handle = pool.submit(true, || Ok(21 * 2));
        assert_eq!(handle.get().unwrap(), 42);
    }

    #[test]
    fn submit_sync_is_resolved_immediately() {
        let pool = TaskPool::new(2).unwrap();
        let handle = pool.submit(false, || Ok::<_, Error>("done"));
        assert!(matches!(handle.state, HandleState::Ready(_)));
        assert_eq!(handle.get().unwrap(), "done");
    }

    #[test]
    fn failures_propagate_on_join() {
        let pool = TaskPool::new(2).unwrap();
        let handle = pool.submit(true, || -> Result<()> {
            Err(Error::ColumnNotFound("missing".into()))
        });
        assert_eq!(
            handle.get(),
            Err(Error::ColumnNotFound("missing".into()))
        );

        let handle = pool.submit(true, || -> Result<()> { panic!("boom") });
        assert_eq!(handle.get(), Err(Error::Task("boom".into())));
    }

    #[test]
    fn parallel_for_runs_every_chunk() {
        let pool = TaskPool::new(4).unwrap();
        let mut items: Vec<u32> = (0..100).collect();
        pool.parallel_for(&mut items, 7, |_, chunk| {
            for v in chunk.iter_mut() {
                *v *= 2;
            }
            Ok(())
        })
        .unwrap();
        assert_eq!(items, (0..100).map(|v| v * 2).collect::<Vec<_>>());
    }

    #[test]
    fn parallel_for_finishes_siblings_of_failed_chunk() {
        let pool = TaskPool::new(4).unwrap();
        let mut items = vec![0u32; 8];
        let err = pool
            .parallel_for(&mut items, 2, |i, chunk| {
                chunk.iter_mut().for_each(|v| *v = 1);
                if i == 1 {
                    Err(Error::NotImplemented("chunk 1".into()))
                } else {
                    Ok(())
                }
            })
            .unwrap_err();
        assert_eq!(err, Error::NotImplemented("chunk 1".into()));
        assert!(items.iter().all(|v| *v == 1));
    }

    #[test]
    fn parallel_sort_is_stable() {
        let pool = TaskPool::new(4).unwrap();
        let mut pairs: Vec<(u8, usize)> = (0..1000).map(|i| ((i % 3) as u8, i)).collect();
        pool.parallel_sort(&mut pairs, |a, b| a.0.cmp(&b.0));
        for w in pairs.windows(2) {
            assert!(w[0].0 < w[1].0 || (w[0].0 == w[1].0 && w[0].1 < w[1].1));
        }
    }

    #[test]
    fn inline_pool_behaves_like_threaded_pool() {
        let pool = TaskPool::inline();
        assert_eq!(pool.threads(), 1);
        let out = pool.parallel_map(&[1, 2, 3], |v| Ok(v * 10)).unwrap();
        assert_eq!(out, vec![10, 20, 30]);
        assert_eq!(pool.submit(true, || Ok(5)).get().unwrap(), 5);
    }
}
