//! Strongly-typed identifiers used across the engine.
//!
//! Downstream crates should *not* pass raw integers for slots or tasks.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! new_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd,
        )]
        #[serde(transparent)]
        pub struct $name(usize);

        impl $name {
            pub const fn new(v: usize) -> Self {
                Self(v)
            }
            pub const fn get(self) -> usize {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

// Internal storage position of a column; not its external order.
new_id!(SlotId);
new_id!(TaskId);
