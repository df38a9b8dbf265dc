#![forbid(unsafe_code)]
//! tabula: an in-memory, column-oriented table engine.
//!
//! This facade re-exports the workspace crates so tests, benches and
//! downstream users depend on one name.

pub use tabula_core::prelude::{Error, Result, TableConfig, INDEX_NAME};
pub use tabula_frame::Table;

pub mod prelude {
    pub use tabula_core::prelude::*;
    pub use tabula_exec::{SpinLock, TaskHandle, TaskPool};
    pub use tabula_frame::{
        first_index, last_index, Aggregation, BucketSpec, ColumnData, Count, DropPolicy,
        FillPolicy, First, FnVisitor, IndexVisitor, Last, LengthPolicy, Max, Mean, Min, SortKey,
        SortOrder, Sum, Table, Visitor, COUNTS_COLUMN,
    };
}
