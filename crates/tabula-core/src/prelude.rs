//! Convenient re-exports for downstream crates.

pub use crate::config::TableConfig;
pub use crate::error::{Error, Result};
pub use crate::id::{SlotId, TaskId};
pub use crate::types::Element;
pub use crate::INDEX_NAME;
