#![forbid(unsafe_code)]
//! tabula-exec: task pool, dispatch strategy, table lock, and metrics hooks.
//!
//! The table engines never spawn threads themselves. They ask the
//! `DispatchStrategy` how to run, then hand chunks of work to a `TaskPool`
//! while the caller holds the table's `SpinGuard`.

pub mod dispatch;
pub mod lock;
pub mod metrics;
pub mod pool;

pub use dispatch::{Dispatch, DispatchStrategy};
pub use lock::{SpinGuard, SpinLock};
pub use pool::{TaskHandle, TaskPool};
