//! Type-erased column storage.
//!
//! Every column lives in the table as a `Box<dyn ColumnData>` whose concrete
//! type is `Vec<T>` for some `T: Element`. The index is a plain `Vec<I>` and
//! implements the same trait, so row-level engines (permute, retain, compare)
//! treat it uniformly without reinterpreting memory. Typed access goes
//! through `as_any`/`as_any_mut` downcasts and fails cleanly on mismatch.
//!
//! Positions at or past a column's stored length read as the type's sentinel.

use std::any::Any;
use std::cmp::Ordering;
use std::fmt;
use std::ops::Range;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use tabula_core::error::{Error, Result};
use tabula_core::types::Element;

pub trait ColumnData: Any + Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn type_label(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn clone_box(&self) -> Box<dyn ColumnData>;

    /// Pad with the sentinel or truncate to exactly `len`.
    fn resize_na(&mut self, len: usize);

    fn is_na_at(&self, row: usize) -> bool;

    /// Add one to `counts[row]` for every missing row in `0..counts.len()`.
    fn mark_missing(&self, counts: &mut [usize]);

    fn cmp_rows(&self, a: usize, b: usize, abs: bool) -> Ordering;

    /// Reorder so that new row `i` holds old row `perm[i]`.
    fn permute(&mut self, perm: &[usize]);

    /// New column holding the listed rows, in order.
    fn gather(&self, rows: &[usize]) -> Box<dyn ColumnData>;

    /// Keep row `i` iff `keep[i]`; rows past `keep.len()` are dropped.
    fn retain_rows(&mut self, keep: &[bool]);

    fn slice(&self, rows: Range<usize>) -> Box<dyn ColumnData>;

    /// Fisher-Yates shuffle of the stored values.
    fn shuffle(&mut self, rng: &mut StdRng);

    /// Fill missing rows from `other`, where `rows[i]` names the row of
    /// `other` matching row `i` of this column. Returns the number filled.
    fn fill_from(&mut self, rows: &[Option<usize>], other: &dyn ColumnData, name: &str)
        -> Result<usize>;
}

impl fmt::Debug for dyn ColumnData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Column")
            .field("type", &self.type_label())
            .field("len", &self.len())
            .finish()
    }
}

impl<T: Element> ColumnData for Vec<T> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn type_label(&self) -> &'static str {
        T::type_label()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn clone_box(&self) -> Box<dyn ColumnData> {
        Box::new(self.clone())
    }

    fn resize_na(&mut self, len: usize) {
        self.resize(len, T::na());
    }

    fn is_na_at(&self, row: usize) -> bool {
        self.get(row).map_or(true, Element::is_na)
    }

    fn mark_missing(&self, counts: &mut [usize]) {
        for (row, count) in counts.iter_mut().enumerate() {
            if self.is_na_at(row) {
                *count += 1;
            }
        }
    }

    fn cmp_rows(&self, a: usize, b: usize, abs: bool) -> Ordering {
        let na = T::na();
        let x = self.get(a).unwrap_or(&na);
        let y = self.get(b).unwrap_or(&na);
        if abs {
            x.cmp_abs(y)
        } else {
            x.cmp_value(y)
        }
    }

    fn permute(&mut self, perm: &[usize]) {
        let reordered: Vec<T> = perm
            .iter()
            .map(|&row| self.get(row).cloned().unwrap_or_else(T::na))
            .collect();
        *self = reordered;
    }

    fn gather(&self, rows: &[usize]) -> Box<dyn ColumnData> {
        let picked: Vec<T> = rows
            .iter()
            .map(|&row| self.get(row).cloned().unwrap_or_else(T::na))
            .collect();
        Box::new(picked)
    }

    fn retain_rows(&mut self, keep: &[bool]) {
        let mut row = 0;
        self.retain(|_| {
            let kept = keep.get(row).copied().unwrap_or(false);
            row += 1;
            kept
        });
    }

    fn slice(&self, rows: Range<usize>) -> Box<dyn ColumnData> {
        let end = rows.end.min(Vec::len(self));
        let start = rows.start.min(end);
        let mut part = self[start..end].to_vec();
        // Rows past the stored length stay logically missing.
        part.resize(rows.end.saturating_sub(rows.start), T::na());
        Box::new(part)
    }

    fn shuffle(&mut self, rng: &mut StdRng) {
        self.as_mut_slice().shuffle(rng);
    }

    fn fill_from(
        &mut self,
        rows: &[Option<usize>],
        other: &dyn ColumnData,
        name: &str,
    ) -> Result<usize> {
        let source = other
            .as_any()
            .downcast_ref::<Vec<T>>()
            .ok_or_else(|| Error::type_mismatch(name, other.type_label(), T::type_label()))?;

        if Vec::len(self) < rows.len() {
            self.resize(rows.len(), T::na());
        }

        let mut filled = 0;
        for (value, matched) in self.iter_mut().zip(rows) {
            if !value.is_na() {
                continue;
            }
            if let Some(candidate) = matched.and_then(|row| source.get(row)) {
                if !candidate.is_na() {
                    *value = candidate.clone();
                    filled += 1;
                }
            }
        }
        Ok(filled)
    }
}

/// Borrow the concrete vector behind a column.
pub fn downcast_ref<'a, T: Element>(column: &'a dyn ColumnData, name: &str) -> Result<&'a Vec<T>> {
    column
        .as_any()
        .downcast_ref::<Vec<T>>()
        .ok_or_else(|| Error::type_mismatch(name, column.type_label(), T::type_label()))
}

pub fn downcast_mut<'a, T: Element>(
    column: &'a mut dyn ColumnData,
    name: &str,
) -> Result<&'a mut Vec<T>> {
    let stored = column.type_label();
    column
        .as_any_mut()
        .downcast_mut::<Vec<T>>()
        .ok_or_else(|| Error::type_mismatch(name, stored, T::type_label()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn short_columns_read_as_missing() {
        let col: Vec<f64> = vec![1.0, f64::NAN];
        assert!(!col.is_na_at(0));
        assert!(col.is_na_at(1));
        assert!(col.is_na_at(5));

        let mut counts = vec![0usize; 4];
        col.mark_missing(&mut counts);
        assert_eq!(counts, vec![0, 1, 1, 1]);
    }

    #[test]
    fn permute_and_gather() {
        let mut col: Vec<i32> = vec![10, 20, 30];
        col.permute(&[2, 0, 1]);
        assert_eq!(col, vec![30, 10, 20]);

        let picked = col.gather(&[1, 4]);
        let picked = downcast_ref::<i32>(picked.as_ref(), "picked").unwrap();
        assert_eq!(picked, &vec![10, i32::MIN]);
    }

    #[test]
    fn retain_and_slice() {
        let mut col: Vec<String> = vec!["a".into(), "b".into(), "c".into()];
        col.retain_rows(&[true, false, true]);
        assert_eq!(col, vec!["a".to_string(), "c".to_string()]);

        let part = col.slice(1..3);
        let part = downcast_ref::<String>(part.as_ref(), "part").unwrap();
        assert_eq!(part, &vec!["c".to_string(), String::new()]);
    }

    #[test]
    fn downcast_reports_type_mismatch() {
        let col: Box<dyn ColumnData> = Box::new(vec![1u8, 2]);
        let err = downcast_ref::<f64>(col.as_ref(), "bytes").unwrap_err();
        assert!(matches!(err, Error::ColumnNotFound(msg) if msg.contains("bytes")));
    }

    #[test]
    fn shuffle_is_seeded() {
        let mut a: Vec<u32> = (0..50).collect();
        let mut b = a.clone();
        SliceRandom::shuffle(a.as_mut_slice(), &mut StdRng::seed_from_u64(9));
        ColumnData::shuffle(&mut b, &mut StdRng::seed_from_u64(9));
        assert_eq!(a, b);
        let mut sorted = a.clone();
        sorted.sort();
        assert_eq!(sorted, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn fill_from_matching_rows() {
        let mut col: Vec<f64> = vec![f64::NAN, 2.0];
        let other: Vec<f64> = vec![7.0, 8.0, 9.0];
        let filled = col
            .fill_from(&[Some(2), Some(0), None], &other, "x")
            .unwrap();
        assert_eq!(filled, 1);
        assert_eq!(col[0], 9.0);
        assert_eq!(col[1], 2.0);
        assert!(col[2].is_nan());
    }
}
