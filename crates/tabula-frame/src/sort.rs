//! Multi-key sort.
//!
//! Builds an identity permutation over rows, sorts it with one chained
//! comparator over up to five (key, order) pairs, then applies the resulting
//! permutation to every column (and to the index unless it is ignored).
//! Both the serial and the pooled sort are stable, so equal keys keep their
//! original relative order on either path.

use std::cmp::Ordering;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use tabula_core::error::{Error, Result};
use tabula_core::types::Element;
use tabula_exec::metrics::op_span;
use tabula_exec::{Dispatch, TaskHandle};

use crate::column::ColumnData;
use crate::table::{KeySource, Table};

pub const MAX_SORT_KEYS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
    AbsAscending,
    AbsDescending,
}

impl SortOrder {
    fn compare(self, column: &dyn ColumnData, a: usize, b: usize) -> Ordering {
        match self {
            SortOrder::Ascending => column.cmp_rows(a, b, false),
            SortOrder::Descending => column.cmp_rows(b, a, false),
            SortOrder::AbsAscending => column.cmp_rows(a, b, true),
            SortOrder::AbsDescending => column.cmp_rows(b, a, true),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub name: String,
    pub order: SortOrder,
}

impl SortKey {
    pub fn new(name: &str, order: SortOrder) -> Self {
        Self {
            name: name.to_string(),
            order,
        }
    }

    pub fn asc(name: &str) -> Self {
        Self::new(name, SortOrder::Ascending)
    }

    pub fn desc(name: &str) -> Self {
        Self::new(name, SortOrder::Descending)
    }

    pub fn abs_asc(name: &str) -> Self {
        Self::new(name, SortOrder::AbsAscending)
    }

    pub fn abs_desc(name: &str) -> Self {
        Self::new(name, SortOrder::AbsDescending)
    }
}

/// Compare rows `a` and `b` key by key, falling through only on equality.
pub(crate) fn chained_cmp(keys: &[(&dyn ColumnData, SortOrder)], a: usize, b: usize) -> Ordering {
    for (column, order) in keys {
        match order.compare(*column, a, b) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

impl<I: Element> Table<I> {
    /// Sort rows by `keys`, reordering the index along with them.
    pub fn sort(&mut self, keys: &[SortKey]) -> Result<()> {
        self.sort_with(keys, false)
    }

    /// Sort rows by `keys`.
    ///
    /// With `ignore_index` the index keeps its current order; naming the index
    /// among the keys reorders it regardless.
    pub fn sort_with(&mut self, keys: &[SortKey], ignore_index: bool) -> Result<()> {
        if keys.is_empty() || keys.len() > MAX_SORT_KEYS {
            return Err(Error::InconsistentData(format!(
                "sort takes 1 to {MAX_SORT_KEYS} keys, got {}",
                keys.len()
            )));
        }

        let _guard = self.lock().acquire();
        let sources = keys
            .iter()
            .map(|k| self.key_source(&k.name).map(|s| (s, k.order)))
            .collect::<Result<Vec<_>>>()?;
        let reorder_index = !ignore_index || sources.iter().any(|(s, _)| *s == KeySource::Index);

        self.make_consistent_unlocked();
        let rows = self.num_rows();
        let mode = self.strategy().for_rows(rows);
        let _span = op_span("sort", rows, self.columns.len(), mode);

        let perm = self.sort_permutation(&sources, mode);
        if reorder_index {
            self.index.permute(&perm);
        }
        self.apply_permutation(&perm)
    }

    /// Sort on the pool and hand the table back through a handle.
    ///
    /// The table moves into the task; on failure it is dropped and the error
    /// is returned from `get()`.
    pub fn sort_async(self, keys: Vec<SortKey>) -> TaskHandle<Table<I>> {
        let pool = Arc::clone(self.pool());
        pool.submit(true, move || {
            let mut table = self;
            table.sort(&keys)?;
            Ok(table)
        })
    }

    /// Row order that sorts the table by `sources`. Reads only; the caller
    /// holds the lock.
    pub(crate) fn sort_permutation(
        &self,
        sources: &[(KeySource, SortOrder)],
        mode: Dispatch,
    ) -> Vec<usize> {
        let keys: Vec<(&dyn ColumnData, SortOrder)> = sources
            .iter()
            .map(|(source, order)| (self.source(*source), *order))
            .collect();
        let mut perm: Vec<usize> = (0..self.num_rows()).collect();
        let cmp = |a: &usize, b: &usize| chained_cmp(&keys, *a, *b);

        if mode.is_parallel() {
            self.pool().parallel_sort(&mut perm, cmp);
        } else {
            perm.sort_by(cmp);
        }
        perm
    }

    /// Reorder every column by `perm`, split across the pool when there are
    /// enough columns to be worth it.
    pub(crate) fn apply_permutation(&mut self, perm: &[usize]) -> Result<()> {
        let mode = self
            .strategy()
            .for_permutation(perm.len(), self.columns.len());
        if !mode.is_parallel() {
            for column in self.columns.iter_mut() {
                column.permute(perm);
            }
            return Ok(());
        }

        let pool = Arc::clone(self.pool());
        let chunk = mode.chunk_len(self.columns.len());
        pool.parallel_for(&mut self.columns, chunk, |_, columns| {
            for column in columns.iter_mut() {
                column.permute(perm);
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::LengthPolicy;
    use tabula_core::INDEX_NAME;

    fn table() -> Table<u32> {
        let mut t = Table::from_index(vec![0, 1, 2, 3, 4]);
        t.load_column("k", vec![3i32, -1, 3, 2, -5], LengthPolicy::Strict).unwrap();
        t.load_column("s", vec!["c", "a", "b", "d", "e"].into_iter().map(String::from).collect::<Vec<_>>(), LengthPolicy::Strict)
            .unwrap();
        t
    }

    #[test]
    fn ascending_keeps_rows_aligned() {
        let mut t = table();
        t.sort(&[SortKey::asc("k")]).unwrap();
        assert_eq!(t.column::<i32>("k").unwrap(), &[-5, -1, 2, 3, 3]);
        assert_eq!(t.index(), &[4, 1, 3, 0, 2]);
        let s: Vec<&str> = t.column::<String>("s").unwrap().iter().map(|s| s.as_str()).collect();
        assert_eq!(s, vec!["e", "a", "d", "c", "b"]);
    }

    #[test]
    fn abs_orders() {
        let mut t = table();
        t.sort(&[SortKey::abs_asc("k")]).unwrap();
        assert_eq!(t.column::<i32>("k").unwrap(), &[-1, 2, 3, 3, -5]);

        t.sort(&[SortKey::abs_desc("k")]).unwrap();
        assert_eq!(t.column::<i32>("k").unwrap(), &[-5, 3, 3, 2, -1]);
    }

    #[test]
    fn second_key_breaks_ties() {
        let mut t = table();
        t.sort(&[SortKey::desc("k"), SortKey::desc("s")]).unwrap();
        assert_eq!(t.column::<i32>("k").unwrap(), &[3, 3, 2, -1, -5]);
        assert_eq!(t.column::<String>("s").unwrap()[0], "c");
        assert_eq!(t.column::<String>("s").unwrap()[1], "b");
    }

    #[test]
    fn ignore_index_unless_index_is_a_key() {
        let mut t = table();
        t.sort_with(&[SortKey::asc("k")], true).unwrap();
        assert_eq!(t.index(), &[0, 1, 2, 3, 4]);

        t.sort_with(&[SortKey::desc(INDEX_NAME)], true).unwrap();
        assert_eq!(t.index(), &[4, 3, 2, 1, 0]);
    }

    #[test]
    fn key_count_and_names_validated() {
        let mut t = table();
        assert!(matches!(t.sort(&[]), Err(Error::InconsistentData(_))));
        let six: Vec<SortKey> = (0..6).map(|_| SortKey::asc("k")).collect();
        assert!(matches!(t.sort(&six), Err(Error::InconsistentData(_))));
        assert!(matches!(t.sort(&[SortKey::asc("nope")]), Err(Error::ColumnNotFound(_))));
    }

    #[test]
    fn keys_deserialize_from_json() {
        let keys: Vec<SortKey> =
            serde_json::from_str(r#"[{"name":"k","order":"AbsDescending"},{"name":"s","order":"Ascending"}]"#)
                .unwrap();
        assert_eq!(keys, vec![SortKey::abs_desc("k"), SortKey::asc("s")]);
    }

    #[test]
    fn short_columns_are_padded_before_sorting() {
        let mut t = table();
        t.load_column("short", vec![1.5f64], LengthPolicy::Truncate).unwrap();
        t.sort(&[SortKey::desc(INDEX_NAME)]).unwrap();
        let short = t.column::<f64>("short").unwrap();
        assert_eq!(short.len(), 5);
        assert_eq!(short[4], 1.5);
        assert!(short[..4].iter().all(|v| v.is_nan()));
    }
}
