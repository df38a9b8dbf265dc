//! Row and column transforms: value replacement, transpose and shuffle.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use tabula_core::error::{Error, Result};
use tabula_core::types::Element;
use tabula_core::INDEX_NAME;
use tabula_exec::metrics::op_span;

use crate::column::{downcast_mut, downcast_ref, ColumnData};
use crate::table::Table;

/// Replace values equal to `old[k]` with `new[k]`, scanning in row order,
/// until `budget` replacements have been made.
fn replace_values<T: Element>(values: &mut [T], old: &[T], new: &[T], budget: usize) -> usize {
    let mut replaced = 0;
    for value in values.iter_mut() {
        if replaced == budget {
            break;
        }
        if let Some(k) = old.iter().position(|o| o.cmp_value(value) == Ordering::Equal) {
            *value = new[k].clone();
            replaced += 1;
        }
    }
    replaced
}

fn visit_while<I, T>(keys: &[I], values: &mut [T], f: &mut impl FnMut(&I, &mut T) -> bool) -> usize {
    let mut visited = 0;
    for (key, value) in keys.iter().zip(values.iter_mut()) {
        if !f(key, value) {
            break;
        }
        visited += 1;
    }
    visited
}

fn check_pairs<T>(old: &[T], new: &[T]) -> Result<()> {
    if old.len() != new.len() {
        return Err(Error::InconsistentData(format!(
            "{} old values but {} replacements",
            old.len(),
            new.len()
        )));
    }
    Ok(())
}

impl<I: Element> Table<I> {
    /// Replace values of one column (or the index) by lookup in `old`/`new`.
    ///
    /// Missing values can be targeted by listing the sentinel in `old`.
    /// `limit` caps the total number of replacements; negative means
    /// unbounded. Returns the number of values replaced.
    pub fn replace<T: Element>(&mut self, name: &str, old: &[T], new: &[T], limit: i64) -> Result<usize> {
        check_pairs(old, new)?;
        let _guard = self.lock().acquire();
        let values = self.column_mut::<T>(name)?;
        let replaced = replace_values(values, old, new, usize::try_from(limit).unwrap_or(usize::MAX));
        tracing::debug!(column = name, replaced, "replaced values");
        Ok(replaced)
    }

    /// `replace` over several columns of the same type, with `limit` applied
    /// to each column separately. Returns the total number replaced.
    pub fn replace_columns<T: Element>(
        &mut self,
        names: &[&str],
        old: &[T],
        new: &[T],
        limit: i64,
    ) -> Result<usize> {
        check_pairs(old, new)?;
        if names.contains(&INDEX_NAME) {
            return Err(Error::InconsistentData(
                "use replace to rewrite the index".into(),
            ));
        }

        let _guard = self.lock().acquire();
        let slots = names
            .iter()
            .map(|name| self.slot_of(name))
            .collect::<Result<Vec<_>>>()?;
        let rows = self.num_rows();
        let mode = self.strategy().for_columns(rows, slots.len());
        let _span = op_span("replace", rows, slots.len(), mode);
        let pool = Arc::clone(self.pool());
        let budget = usize::try_from(limit).unwrap_or(usize::MAX);

        let mut targets: Vec<(&str, &mut Box<dyn ColumnData>)> = self
            .columns
            .iter_mut()
            .enumerate()
            .filter_map(|(i, column)| {
                slots
                    .iter()
                    .position(|s| s.get() == i)
                    .map(|at| (names[at], column))
            })
            .collect();

        let replaced = AtomicUsize::new(0);
        let body = |_: usize, part: &mut [(&str, &mut Box<dyn ColumnData>)]| {
            let mut first_err = None;
            for (name, column) in part.iter_mut() {
                match downcast_mut::<T>(column.as_mut(), name) {
                    Ok(values) => {
                        let n = replace_values(values, old, new, budget);
                        replaced.fetch_add(n, AtomicOrdering::Relaxed);
                    }
                    Err(e) => {
                        first_err.get_or_insert(e);
                    }
                }
            }
            first_err.map_or(Ok(()), Err)
        };

        if mode.is_parallel() {
            pool.parallel_for(&mut targets, mode.chunk_len(slots.len()), body)?;
        } else {
            body(0, targets.as_mut_slice())?;
        }
        Ok(replaced.into_inner())
    }

    /// Visit rows in order with `f(index value, &mut value)` until it
    /// returns `false`. Returns the number of rows for which it returned `true`.
    ///
    /// A short column is padded to the index length first. On the index
    /// itself, `f` sees each key as it was before the pass began.
    pub fn replace_with<T, F>(&mut self, name: &str, mut f: F) -> Result<usize>
    where
        T: Element,
        F: FnMut(&I, &mut T) -> bool,
    {
        let _guard = self.lock().acquire();
        if name == INDEX_NAME {
            let keys = self.index.clone();
            let values = self.column_mut::<T>(name)?;
            return Ok(visit_while(&keys, values, &mut f));
        }

        let rows = self.num_rows();
        let slot = self.slot_of(name)?;
        let values = downcast_mut::<T>(self.columns[slot.get()].as_mut(), name)?;
        if values.len() < rows {
            values.resize(rows, T::na());
        }
        Ok(visit_while(&self.index, values, &mut f))
    }

    /// Swap rows and columns. Every column must hold `T`.
    ///
    /// The result has one row per column, in column order, indexed by
    /// `new_index`, and one column per row, named by `new_names`. Values past
    /// a short column's stored length come out missing.
    pub fn transpose<T: Element, J: Element>(
        &self,
        new_index: Vec<J>,
        new_names: &[&str],
    ) -> Result<Table<J>> {
        let _guard = self.lock().acquire();
        let (rows, columns) = self.shape();
        if new_names.len() != rows {
            return Err(Error::InconsistentData(format!(
                "{} new column names for {rows} rows",
                new_names.len()
            )));
        }
        if new_index.len() != columns {
            return Err(Error::InconsistentData(format!(
                "{} new index values for {columns} columns",
                new_index.len()
            )));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = new_names.iter().find(|n| !seen.insert(**n)) {
            return Err(Error::InconsistentData(format!("duplicate column name '{dup}'")));
        }
        let _span = op_span("transpose", rows, columns, self.strategy().for_rows(rows));

        let sources = self
            .ordered_slots()
            .iter()
            .map(|(name, slot)| downcast_ref::<T>(self.columns[slot.get()].as_ref(), name))
            .collect::<Result<Vec<_>>>()?;

        let mut out = self.empty_like::<J>();
        out.index = new_index;
        for (row, name) in new_names.iter().enumerate() {
            let values: Vec<T> = sources
                .iter()
                .map(|column| column.get(row).cloned().unwrap_or_else(T::na))
                .collect();
            out.insert_boxed(name, Box::new(values));
        }
        Ok(out)
    }

    /// Shuffle the named columns, and the index when `also_index` is set,
    /// each independently. Seeded from the table config when it has a seed.
    pub fn shuffle(&mut self, names: &[&str], also_index: bool) -> Result<()> {
        let master = match self.config().seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.shuffle_with(names, also_index, master)
    }

    /// `shuffle` with an explicit seed; the same seed gives the same result
    /// on the serial and the pooled path.
    pub fn shuffle_seeded(&mut self, names: &[&str], also_index: bool, seed: u64) -> Result<()> {
        self.shuffle_with(names, also_index, StdRng::seed_from_u64(seed))
    }

    fn shuffle_with(&mut self, names: &[&str], also_index: bool, mut master: StdRng) -> Result<()> {
        let also_index = also_index || names.contains(&INDEX_NAME);
        let names: Vec<&str> = names.iter().copied().filter(|n| *n != INDEX_NAME).collect();

        let _guard = self.lock().acquire();
        let slots = names
            .iter()
            .map(|name| self.slot_of(name))
            .collect::<Result<Vec<_>>>()?;

        // Sub-seeds are drawn in a fixed order: index first, then names.
        let index_seed: Option<u64> = also_index.then(|| master.gen());
        let seeds: Vec<u64> = slots.iter().map(|_| master.gen()).collect();

        if let Some(seed) = index_seed {
            self.index.shuffle(&mut StdRng::seed_from_u64(seed));
        }

        let rows = self.num_rows();
        let mode = self.strategy().for_columns(rows, slots.len());
        let _span = op_span("shuffle", rows, slots.len(), mode);
        let pool = Arc::clone(self.pool());

        let mut targets: Vec<(u64, &mut Box<dyn ColumnData>)> = self
            .columns
            .iter_mut()
            .enumerate()
            .filter_map(|(i, column)| {
                slots
                    .iter()
                    .position(|s| s.get() == i)
                    .map(|at| (seeds[at], column))
            })
            .collect();

        if mode.is_parallel() {
            pool.parallel_for(&mut targets, mode.chunk_len(slots.len()), |_, part| {
                for (seed, column) in part.iter_mut() {
                    column.shuffle(&mut StdRng::seed_from_u64(*seed));
                }
                Ok(())
            })
        } else {
            for (seed, column) in targets.iter_mut() {
                column.shuffle(&mut StdRng::seed_from_u64(*seed));
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::LengthPolicy;

    #[test]
    fn replace_honours_total_limit() {
        let mut t = Table::<u32>::from_index(vec![0, 1, 2]);
        t.load_column("x", vec![1i32, 1, 1], LengthPolicy::Strict).unwrap();
        assert_eq!(t.replace("x", &[1], &[9], 1).unwrap(), 1);
        assert_eq!(t.column::<i32>("x").unwrap(), &[9, 1, 1]);
        assert_eq!(t.replace("x", &[1, 9], &[2, 3], -1).unwrap(), 3);
        assert_eq!(t.column::<i32>("x").unwrap(), &[3, 2, 2]);
        assert!(matches!(t.replace("x", &[1], &[], -1), Err(Error::InconsistentData(_))));
    }

    #[test]
    fn replace_can_target_missing_and_index() {
        let mut t = Table::<u32>::from_index(vec![0, 1, 2]);
        t.load_column("f", vec![f64::NAN, 1.0, f64::NAN], LengthPolicy::Strict).unwrap();
        assert_eq!(t.replace("f", &[f64::NAN], &[0.0], -1).unwrap(), 2);
        assert_eq!(t.column::<f64>("f").unwrap(), &[0.0, 1.0, 0.0]);
        assert_eq!(t.replace(INDEX_NAME, &[1u32], &[7], -1).unwrap(), 1);
        assert_eq!(t.index(), &[0, 7, 2]);
    }

    #[test]
    fn replace_columns_limits_each_column() {
        let mut t = Table::<u32>::from_index(vec![0, 1]);
        t.load_column("a", vec![5u8, 5], LengthPolicy::Strict).unwrap();
        t.load_column("b", vec![5u8, 6], LengthPolicy::Strict).unwrap();
        t.load_column("c", vec!["x".to_string(), "y".to_string()], LengthPolicy::Strict)
            .unwrap();
        assert_eq!(t.replace_columns(&["a", "b"], &[5u8], &[0], 1).unwrap(), 2);
        assert_eq!(t.column::<u8>("a").unwrap(), &[0, 5]);
        assert_eq!(t.column::<u8>("b").unwrap(), &[0, 6]);

        // The typed column is still rewritten when a sibling has another type.
        let err = t.replace_columns(&["c", "a"], &[5u8], &[1], -1).unwrap_err();
        assert!(matches!(err, Error::ColumnNotFound(_)));
        assert_eq!(t.column::<u8>("a").unwrap(), &[0, 1]);
    }

    #[test]
    fn replace_with_stops_at_first_false() {
        let mut t = Table::<u32>::from_index(vec![10, 20, 30, 40]);
        t.load_column("x", vec![1i64, 2, 3], LengthPolicy::Truncate).unwrap();
        let visited = t
            .replace_with::<i64, _>("x", |key, value| {
                if *key > 20 {
                    return false;
                }
                *value *= 100;
                true
            })
            .unwrap();
        assert_eq!(visited, 2);
        assert_eq!(t.column::<i64>("x").unwrap(), &[100, 200, 3, i64::MIN]);

        let n = t
            .replace_with::<u32, _>(INDEX_NAME, |key, value| {
                *value = key + 1;
                true
            })
            .unwrap();
        assert_eq!(n, 4);
        assert_eq!(t.index(), &[11, 21, 31, 41]);
    }

    #[test]
    fn transpose_swaps_axes() {
        let mut t = Table::<u32>::from_index(vec![0, 1, 2]);
        t.load_column("a", vec![1.0, 2.0, 3.0], LengthPolicy::Strict).unwrap();
        t.load_column("b", vec![4.0], LengthPolicy::Truncate).unwrap();

        let tt = t
            .transpose::<f64, String>(vec!["a".into(), "b".into()], &["r0", "r1", "r2"])
            .unwrap();
        assert_eq!(tt.shape(), (2, 3));
        assert_eq!(tt.column_names(), vec!["r0", "r1", "r2"]);
        assert_eq!(tt.column::<f64>("r0").unwrap(), &[1.0, 4.0]);
        let r2 = tt.column::<f64>("r2").unwrap();
        assert_eq!(r2[0], 3.0);
        assert!(r2[1].is_nan());
    }

    #[test]
    fn transpose_checks_shape_and_types() {
        let mut t = Table::<u32>::from_index(vec![0, 1]);
        t.load_column("a", vec![1i32, 2], LengthPolicy::Strict).unwrap();
        assert!(matches!(
            t.transpose::<i32, u32>(vec![0], &["x"]),
            Err(Error::InconsistentData(_))
        ));
        assert!(matches!(
            t.transpose::<i32, u32>(vec![0, 1], &["x", "y"]),
            Err(Error::InconsistentData(_))
        ));
        assert!(matches!(
            t.transpose::<i32, u32>(vec![0], &["x", "x"]),
            Err(Error::InconsistentData(_))
        ));
        assert!(matches!(
            t.transpose::<f64, u32>(vec![0], &["x", "y"]),
            Err(Error::ColumnNotFound(_))
        ));
    }

    #[test]
    fn seeded_shuffle_is_reproducible() {
        let build = || {
            let mut t = Table::<u32>::from_index((0..64).collect());
            t.load_column("a", (0..64).collect::<Vec<u64>>(), LengthPolicy::Strict).unwrap();
            t.load_column("b", (0..64).collect::<Vec<u64>>(), LengthPolicy::Strict).unwrap();
            t
        };
        let mut x = build();
        let mut y = build();
        x.shuffle_seeded(&["a", "b"], true, 11).unwrap();
        y.shuffle_seeded(&["a", "b"], true, 11).unwrap();
        assert_eq!(x.index(), y.index());
        assert_eq!(x.column::<u64>("a").unwrap(), y.column::<u64>("a").unwrap());

        // Columns get independent permutations of the same values.
        assert_ne!(x.column::<u64>("a").unwrap(), x.column::<u64>("b").unwrap());
        let mut a = x.column::<u64>("a").unwrap().to_vec();
        a.sort();
        assert_eq!(a, (0..64).collect::<Vec<u64>>());
    }

    #[test]
    fn shuffle_uses_config_seed() {
        let cfg = tabula_core::config::TableConfig::serial().with_seed(3);
        let build = || {
            let mut t = Table::<u32>::with_config(cfg.clone()).unwrap();
            t.load_index((0..32).collect());
            t
        };
        let mut x = build();
        let mut y = build();
        x.shuffle(&[INDEX_NAME], false).unwrap();
        y.shuffle(&[], true).unwrap();
        assert_eq!(x.index(), y.index());
        assert!(x.shuffle(&["nope"], false).is_err());
    }
}
