#![forbid(unsafe_code)]
//! tabula-frame: the column-oriented table and its bulk engines.
//!
//! Design intent:
//! - A `Table<I>` owns one index of type `I` and any number of independently
//!   typed columns behind `dyn ColumnData`.
//! - Every bulk operation takes the table lock once, asks the dispatch
//!   strategy for a mode, and either loops serially or hands column chunks
//!   (or the sort permutation) to the task pool.
//! - Engines live in their own modules as `impl Table<I>` blocks.

pub mod column;
pub mod table;
pub mod visitor;

pub mod group;
pub mod missing;
pub mod sort;
pub mod transform;

pub use column::ColumnData;
pub use group::{BucketSpec, COUNTS_COLUMN, MAX_GROUP_KEYS};
pub use missing::{DropPolicy, FillPolicy};
pub use sort::{SortKey, SortOrder, MAX_SORT_KEYS};
pub use table::{LengthPolicy, Table};
pub use visitor::{
    first_index, last_index, Aggregation, Count, First, FnVisitor, IndexVisitor, Last, Max, Mean,
    Min, Sum, Visitor,
};
