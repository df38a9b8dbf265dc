//! Group-by, value counts and bucketize.
//!
//! Group-by is sort-then-partition: rows are stably sorted by the key tuple,
//! each maximal run of equal tuples is one group, and every aggregation
//! reduces its column one group at a time. Bucketize skips the sort and cuts
//! the rows, in their current order, into contiguous buckets.

use std::cmp::Ordering;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use tabula_core::error::{Error, Result};
use tabula_core::types::Element;
use tabula_core::INDEX_NAME;
use tabula_exec::metrics::op_span;
use tabula_exec::Dispatch;

use crate::column::ColumnData;
use crate::sort::{chained_cmp, SortOrder};
use crate::table::{KeySource, Table};
use crate::visitor::{Aggregation, IndexVisitor};

pub const MAX_GROUP_KEYS: usize = 3;

/// Name of the single column produced by `value_counts`.
pub const COUNTS_COLUMN: &str = "counts";

/// How `bucketize` cuts rows into buckets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BucketSpec {
    /// Every bucket holds this many rows; the last may hold fewer.
    ByCount(usize),
    /// A bucket extends while the index stays within this distance of the
    /// bucket's first index value. Needs a numeric index.
    ByDistance(f64),
}

/// Maximal runs of positions `0..len` where `same(prev, next)` holds.
fn runs(len: usize, same: impl Fn(usize, usize) -> bool) -> Vec<Range<usize>> {
    let mut out = Vec::new();
    let mut start = 0;
    for pos in 1..=len {
        if pos == len || !same(pos - 1, pos) {
            out.push(start..pos);
            start = pos;
        }
    }
    out
}

impl<I: Element> Table<I> {
    /// Group rows by 1 to 3 keys (the index or columns).
    ///
    /// The output has one row per distinct key tuple, in ascending key order.
    /// Its index comes from `index_visitor` over each group's index values;
    /// every non-index key contributes a column holding the group's key value,
    /// and every aggregation contributes one reduced column.
    pub fn groupby<V: IndexVisitor<I>>(
        &self,
        keys: &[&str],
        index_visitor: V,
        aggregations: &[Aggregation<I>],
    ) -> Result<Table<I>> {
        if keys.is_empty() || keys.len() > MAX_GROUP_KEYS {
            return Err(Error::InconsistentData(format!(
                "groupby takes 1 to {MAX_GROUP_KEYS} keys, got {}",
                keys.len()
            )));
        }
        check_targets(aggregations)?;

        let _guard = self.lock().acquire();
        let sources = keys
            .iter()
            .map(|name| self.key_source(name).map(|s| (s, SortOrder::Ascending)))
            .collect::<Result<Vec<_>>>()?;
        let rows = self.num_rows();
        let _span = op_span("groupby", rows, aggregations.len(), self.strategy().for_rows(rows));

        let perm = self.sort_permutation(&sources, self.strategy().for_rows(rows));
        let key_columns: Vec<(&dyn ColumnData, SortOrder)> = sources
            .iter()
            .map(|(source, order)| (self.source(*source), *order))
            .collect();
        let groups = runs(perm.len(), |a, b| {
            chained_cmp(&key_columns, perm[a], perm[b]) == Ordering::Equal
        });
        tracing::debug!(groups = groups.len(), "partitioned rows");

        let sorted_index: Vec<I> = perm.iter().map(|&row| self.index[row].clone()).collect();
        let firsts: Vec<usize> = groups.iter().map(|g| perm[g.start]).collect();

        let mut out = self.empty_like::<I>();
        out.index = groups
            .iter()
            .map(|g| index_visitor.visit(&sorted_index[g.clone()]))
            .collect();
        for (name, (source, _)) in keys.iter().zip(&sources) {
            if *source != KeySource::Index {
                out.insert_boxed(name, self.source(*source).gather(&firsts));
            }
        }

        let mode = self.strategy().for_columns(rows, aggregations.len());
        let reduced = self.reduce_groups(Some(&perm), &sorted_index, &groups, aggregations, mode)?;
        for (agg, column) in aggregations.iter().zip(reduced) {
            out.insert_boxed(agg.target(), column);
        }
        Ok(out)
    }

    /// Count occurrences of each distinct value of one column (or the index).
    ///
    /// The result is indexed by the distinct values in ascending order with a
    /// single `counts` column. Missing values are counted together and, if
    /// any, appended as the last row under the sentinel.
    pub fn value_counts<T: Element>(&self, name: &str) -> Result<Table<T>> {
        let _guard = self.lock().acquire();
        let values = self.column::<T>(name)?;
        let rows = self.num_rows();
        let mode = self.strategy().for_rows(rows);
        let _span = op_span("value_counts", rows, 1, mode);

        let mut present: Vec<usize> = (0..values.len().min(rows))
            .filter(|&row| !values[row].is_na())
            .collect();
        let missing = rows - present.len();

        let cmp = |a: &usize, b: &usize| values[*a].cmp_value(&values[*b]);
        if mode.is_parallel() {
            self.pool().parallel_sort(&mut present, cmp);
        } else {
            present.sort_by(cmp);
        }

        let distinct = runs(present.len(), |a, b| {
            values[present[a]].cmp_value(&values[present[b]]) == Ordering::Equal
        });
        let mut index: Vec<T> = distinct.iter().map(|r| values[present[r.start]].clone()).collect();
        let mut counts: Vec<usize> = distinct.iter().map(|r| r.len()).collect();
        if missing > 0 {
            index.push(T::na());
            counts.push(missing);
        }

        let mut out = self.empty_like::<T>();
        out.index = index;
        out.insert_boxed(COUNTS_COLUMN, Box::new(counts));
        Ok(out)
    }

    /// Cut the rows, in their current order, into contiguous buckets and
    /// reduce each one like a group.
    pub fn bucketize<V: IndexVisitor<I>>(
        &self,
        spec: BucketSpec,
        index_visitor: V,
        aggregations: &[Aggregation<I>],
    ) -> Result<Table<I>> {
        check_targets(aggregations)?;
        let _guard = self.lock().acquire();
        let rows = self.num_rows();

        let buckets = match spec {
            BucketSpec::ByCount(0) => {
                return Err(Error::InconsistentData("bucket size must be positive".into()));
            }
            BucketSpec::ByCount(n) => (0..rows)
                .step_by(n)
                .map(|start| start..(start + n).min(rows))
                .collect::<Vec<_>>(),
            BucketSpec::ByDistance(width) if width.is_nan() || width <= 0.0 => {
                return Err(Error::InconsistentData(format!(
                    "bucket width must be positive, got {width}"
                )));
            }
            BucketSpec::ByDistance(width) => {
                let xs = self
                    .index
                    .iter()
                    .map(Element::to_f64)
                    .collect::<Option<Vec<f64>>>()
                    .ok_or_else(|| {
                        Error::NotImplemented(format!(
                            "distance buckets over non-numeric index {}",
                            I::type_label()
                        ))
                    })?;
                let mut buckets = Vec::new();
                let mut start = 0;
                for row in 1..=rows {
                    if row == rows || !(xs[row] - xs[start] < width) {
                        buckets.push(start..row);
                        start = row;
                    }
                }
                buckets
            }
        };

        let mode = self.strategy().for_columns(rows, aggregations.len());
        let _span = op_span("bucketize", rows, aggregations.len(), mode);
        tracing::debug!(buckets = buckets.len(), "cut rows");

        let mut out = self.empty_like::<I>();
        out.index = buckets
            .iter()
            .map(|b| index_visitor.visit(&self.index[b.clone()]))
            .collect();
        let reduced = self.reduce_groups(None, &self.index, &buckets, aggregations, mode)?;
        for (agg, column) in aggregations.iter().zip(reduced) {
            out.insert_boxed(agg.target(), column);
        }
        Ok(out)
    }

    /// Run every aggregation over `groups`. With `order`, rows are first
    /// gathered into that order; otherwise they are used as stored, padded to
    /// the index length. `index` must already be in the same row order.
    fn reduce_groups(
        &self,
        order: Option<&[usize]>,
        index: &[I],
        groups: &[Range<usize>],
        aggregations: &[Aggregation<I>],
        mode: Dispatch,
    ) -> Result<Vec<Box<dyn ColumnData>>> {
        let rows = self.num_rows();
        let jobs = aggregations
            .iter()
            .map(|agg| self.key_source(agg.source()).map(|source| (agg, source)))
            .collect::<Result<Vec<_>>>()?;

        let reduce_one = |(agg, source): &(&Aggregation<I>, KeySource)| {
            let column = self.source(*source);
            let aligned = match order {
                Some(perm) => column.gather(perm),
                None => column.slice(0..rows),
            };
            agg.reduce(index, aligned.as_ref(), groups)
        };

        if mode.is_parallel() {
            self.pool().parallel_map(&jobs, reduce_one)
        } else {
            jobs.iter().map(reduce_one).collect()
        }
    }
}

fn check_targets<I: Element>(aggregations: &[Aggregation<I>]) -> Result<()> {
    match aggregations.iter().find(|a| a.target() == INDEX_NAME) {
        Some(_) => Err(Error::InconsistentData(
            "aggregation output cannot be named after the index".into(),
        )),
        None => Ok(()),
    }
}
