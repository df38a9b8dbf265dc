//! Missing-data engine: fill policies, cross-table fill, missingness masks
//! and row dropping.
//!
//! A value is missing when it equals its type's sentinel, or when its row
//! lies past the column's stored length.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use tabula_core::error::{Error, Result};
use tabula_core::types::Element;
use tabula_core::INDEX_NAME;
use tabula_exec::metrics::op_span;
use tabula_exec::TaskHandle;

use crate::column::{downcast_mut, ColumnData};
use crate::table::Table;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FillPolicy<T> {
    Value(T),
    FillForward,
    FillBackward,
    /// Numeric column and numeric index; runs touching either edge are left alone.
    LinearInterpolate,
    /// Mean of the two neighbours; runs touching either edge are left alone.
    MidPoint,
}

impl<T> FillPolicy<T> {
    fn needs_numeric_values(&self) -> bool {
        matches!(self, FillPolicy::LinearInterpolate | FillPolicy::MidPoint)
    }

    fn name(&self) -> &'static str {
        match self {
            FillPolicy::Value(_) => "value",
            FillPolicy::FillForward => "fill_forward",
            FillPolicy::FillBackward => "fill_backward",
            FillPolicy::LinearInterpolate => "linear_interpolate",
            FillPolicy::MidPoint => "mid_point",
        }
    }
}

/// Which rows `drop_missing` removes, by their count of missing columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DropPolicy {
    /// Every column is missing. A table without columns keeps all rows.
    All,
    /// At least one column is missing.
    Any,
    /// At least `k` columns are missing; `k` must be positive.
    Threshold(usize),
}

impl DropPolicy {
    fn drops(&self, missing: usize, columns: usize) -> bool {
        match *self {
            DropPolicy::All => columns > 0 && missing == columns,
            DropPolicy::Any => missing > 0,
            DropPolicy::Threshold(k) => missing >= k,
        }
    }
}

fn is_numeric<T: Element>() -> bool {
    T::from_f64(0.0).is_some()
}

/// Fill budget for one column; negative means unbounded.
fn budget(limit: i64) -> usize {
    usize::try_from(limit).unwrap_or(usize::MAX)
}

/// Apply `policy` to one column in place. Returns the number of values filled.
pub(crate) fn fill_values<T: Element, I: Element>(
    values: &mut [T],
    index: &[I],
    policy: &FillPolicy<T>,
    limit: i64,
) -> usize {
    let budget = budget(limit);
    let mut filled = 0;

    match policy {
        FillPolicy::Value(v) => {
            for slot in values.iter_mut().filter(|x| x.is_na()) {
                if filled == budget {
                    break;
                }
                *slot = v.clone();
                filled += 1;
            }
        }
        FillPolicy::FillForward => carry(values.iter_mut(), budget, &mut filled),
        FillPolicy::FillBackward => carry(values.iter_mut().rev(), budget, &mut filled),
        FillPolicy::LinearInterpolate | FillPolicy::MidPoint => {
            let linear = matches!(policy, FillPolicy::LinearInterpolate);
            for run in missing_runs(values) {
                if run.start == 0 || run.end == values.len() {
                    continue;
                }
                let (Some(y0), Some(y1)) = (values[run.start - 1].to_f64(), values[run.end].to_f64())
                else {
                    continue;
                };
                let x0 = index.get(run.start - 1).and_then(Element::to_f64);
                let x1 = index.get(run.end).and_then(Element::to_f64);
                for row in run {
                    if filled == budget {
                        return filled;
                    }
                    let y = if linear {
                        match (x0, x1, index.get(row).and_then(Element::to_f64)) {
                            (Some(x0), Some(x1), Some(x)) if x1 != x0 => {
                                y0 + (x - x0) * (y1 - y0) / (x1 - x0)
                            }
                            _ => y0,
                        }
                    } else {
                        (y0 + y1) / 2.0
                    };
                    if let Some(v) = T::from_f64(y) {
                        values[row] = v;
                        filled += 1;
                    }
                }
            }
        }
    }
    filled
}

/// Copy the last seen value into the missing slots that follow it.
fn carry<'a, T: Element>(slots: impl Iterator<Item = &'a mut T>, budget: usize, filled: &mut usize) {
    let mut last: Option<T> = None;
    for slot in slots {
        if !slot.is_na() {
            last = Some(slot.clone());
            continue;
        }
        if *filled == budget {
            return;
        }
        if let Some(prev) = &last {
            *slot = prev.clone();
            *filled += 1;
        }
    }
}

/// Maximal ranges of consecutive missing values.
fn missing_runs<T: Element>(values: &[T]) -> Vec<std::ops::Range<usize>> {
    let mut runs = Vec::new();
    let mut row = 0;
    while row < values.len() {
        if values[row].is_na() {
            let start = row;
            while row < values.len() && values[row].is_na() {
                row += 1;
            }
            runs.push(start..row);
        } else {
            row += 1;
        }
    }
    runs
}

/// For every row of `ours`, the first row of `theirs` with an equal index value.
fn match_rows<I: Element>(ours: &[I], theirs: &[I]) -> Vec<Option<usize>> {
    let mut sorted: Vec<usize> = (0..theirs.len()).collect();
    sorted.sort_by(|a, b| theirs[*a].cmp_value(&theirs[*b]));
    ours.iter()
        .map(|key| {
            let at = sorted.partition_point(|&p| theirs[p].cmp_value(key) == Ordering::Less);
            sorted
                .get(at)
                .copied()
                .filter(|&p| theirs[p].cmp_value(key) == Ordering::Equal)
        })
        .collect()
}

impl<I: Element> Table<I> {
    /// Fill missing values of the named columns, all of element type `T`.
    ///
    /// `limit` caps the number of values filled per column; negative means
    /// unbounded. Returns the total number of values filled.
    pub fn fill_missing<T: Element>(
        &mut self,
        names: &[&str],
        policy: FillPolicy<T>,
        limit: i64,
    ) -> Result<usize> {
        if names.contains(&INDEX_NAME) {
            return Err(Error::InconsistentData("fill_missing does not apply to the index".into()));
        }
        if policy.needs_numeric_values() && !is_numeric::<T>() {
            return Err(Error::NotImplemented(format!(
                "{} on non-numeric {}",
                policy.name(),
                T::type_label()
            )));
        }
        if matches!(policy, FillPolicy::LinearInterpolate) && !is_numeric::<I>() {
            return Err(Error::NotImplemented(format!(
                "linear_interpolate over non-numeric index {}",
                I::type_label()
            )));
        }

        let _guard = self.lock().acquire();
        let slots = names
            .iter()
            .map(|name| self.slot_of(name))
            .collect::<Result<Vec<_>>>()?;
        let rows = self.num_rows();
        let mode = self.strategy().for_columns(rows, slots.len());
        let _span = op_span("fill_missing", rows, slots.len(), mode);
        let pool = Arc::clone(self.pool());

        let index = &self.index;
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

        let filled = AtomicUsize::new(0);
        let fill_one = |name: &str, column: &mut Box<dyn ColumnData>| -> Result<()> {
            let values = downcast_mut::<T>(column.as_mut(), name)?;
            if values.len() < rows {
                values.resize(rows, T::na());
            }
            let n = fill_values(values.as_mut_slice(), index.as_slice(), &policy, limit);
            filled.fetch_add(n, AtomicOrdering::Relaxed);
            tracing::trace!(column = name, filled = n, "filled column");
            Ok(())
        };

        if mode.is_parallel() {
            let chunk = mode.chunk_len(targets.len());
            pool.parallel_for(&mut targets, chunk, |_, part| {
                part.iter_mut()
                    .try_for_each(|(name, column)| fill_one(*name, &mut **column))
            })?;
        } else {
            // Keep going past a failed column so siblings still complete.
            let mut first_err = None;
            for (name, column) in targets.iter_mut() {
                if let Err(e) = fill_one(*name, &mut **column) {
                    first_err.get_or_insert(e);
                }
            }
            if let Some(e) = first_err {
                return Err(e);
            }
        }
        Ok(filled.into_inner())
    }

    /// Fill missing values from `other`, matching rows by equal index value,
    /// for every column both tables share. Returns the number of values filled.
    pub fn fill_missing_from(&mut self, other: &Table<I>) -> Result<usize> {
        let _guard = self.lock().acquire();
        let rows = self.num_rows();
        let matched = match_rows(&self.index, &other.index);

        let shared: Vec<(String, usize, usize)> = self
            .ordered_slots()
            .iter()
            .filter_map(|(name, slot)| {
                other
                    .slot_of(name)
                    .ok()
                    .map(|theirs| (name.clone(), slot.get(), theirs.get()))
            })
            .collect();
        let mode = self.strategy().for_columns(rows, shared.len());
        let _span = op_span("fill_missing_from", rows, shared.len(), mode);
        let pool = Arc::clone(self.pool());

        let mut targets: Vec<(&str, &mut Box<dyn ColumnData>, &dyn ColumnData)> = self
            .columns
            .iter_mut()
            .enumerate()
            .filter_map(|(i, column)| {
                shared
                    .iter()
                    .find(|(_, ours, _)| *ours == i)
                    .map(|(name, _, theirs)| (name.as_str(), column, other.columns[*theirs].as_ref()))
            })
            .collect();

        let filled = AtomicUsize::new(0);
        let chunk = mode.chunk_len(targets.len());
        let body = |_: usize, part: &mut [(&str, &mut Box<dyn ColumnData>, &dyn ColumnData)]| {
            let mut first_err = None;
            for (name, column, source) in part.iter_mut() {
                match column.fill_from(&matched, *source, *name) {
                    Ok(n) => {
                        filled.fetch_add(n, AtomicOrdering::Relaxed);
                    }
                    Err(e) => {
                        first_err.get_or_insert(e);
                    }
                }
            }
            first_err.map_or(Ok(()), Err)
        };

        if mode.is_parallel() {
            pool.parallel_for(&mut targets, chunk, body)?;
        } else {
            body(0, targets.as_mut_slice())?;
        }
        Ok(filled.into_inner())
    }

    /// Per-row missingness of one column (or the index).
    pub fn missing_mask(&self, name: &str) -> Result<Vec<bool>> {
        let _guard = self.lock().acquire();
        let source = self.source(self.key_source(name)?);
        Ok((0..self.num_rows()).map(|row| source.is_na_at(row)).collect())
    }

    pub fn count_missing(&self, name: &str) -> Result<usize> {
        Ok(self.missing_mask(name)?.into_iter().filter(|m| *m).count())
    }

    /// Drop rows according to `policy`, keeping index and columns aligned.
    /// Returns the number of rows removed.
    pub fn drop_missing(&mut self, policy: DropPolicy) -> Result<usize> {
        if policy == DropPolicy::Threshold(0) {
            return Err(Error::InconsistentData("drop threshold must be positive".into()));
        }

        let _guard = self.lock().acquire();
        self.make_consistent_unlocked();
        let rows = self.num_rows();
        let columns = self.columns.len();
        let mode = self.strategy().for_columns(rows, columns);
        let _span = op_span("drop_missing", rows, columns, mode);
        let pool = Arc::clone(self.pool());

        let counts = if mode.is_parallel() {
            let chunks: Vec<&[Box<dyn ColumnData>]> =
                self.columns.chunks(mode.chunk_len(columns)).collect();
            let partials = pool.parallel_map(&chunks, |chunk| {
                let mut counts = vec![0usize; rows];
                for column in chunk.iter() {
                    column.mark_missing(&mut counts);
                }
                Ok(counts)
            })?;
            partials.into_iter().fold(vec![0usize; rows], |mut acc, part| {
                acc.iter_mut().zip(part).for_each(|(a, p)| *a += p);
                acc
            })
        } else {
            let mut counts = vec![0usize; rows];
            for column in self.columns.iter() {
                column.mark_missing(&mut counts);
            }
            counts
        };

        let keep: Vec<bool> = counts.iter().map(|&c| !policy.drops(c, columns)).collect();
        let dropped = keep.iter().filter(|k| !**k).count();
        if dropped == 0 {
            return Ok(0);
        }

        self.index.retain_rows(&keep);
        if mode.is_parallel() {
            let chunk = mode.chunk_len(columns);
            pool.parallel_for(&mut self.columns, chunk, |_, part| {
                part.iter_mut().for_each(|column| column.retain_rows(&keep));
                Ok(())
            })?;
        } else {
            self.columns.iter_mut().for_each(|column| column.retain_rows(&keep));
        }
        tracing::debug!(dropped, remaining = self.num_rows(), "dropped rows");
        Ok(dropped)
    }

    /// `drop_missing` on the pool; the table moves in and comes back on join.
    pub fn drop_missing_async(self, policy: DropPolicy) -> TaskHandle<Table<I>> {
        let pool = Arc::clone(self.pool());
        pool.submit(true, move || {
            let mut table = self;
            table.drop_missing(policy)?;
            Ok(table)
        })
    }
}
