//! Aggregation visitors for group-by and bucketize.
//!
//! The engines only decide which slices a visitor sees; what it computes is up
//! to the visitor. A handful of common reducers are provided.

use std::marker::PhantomData;
use std::ops::Range;

use tabula_core::error::Result;
use tabula_core::types::Element;

use crate::column::{downcast_ref, ColumnData};

/// Reduce one group's values (and the matching index slice) to one value.
pub trait Visitor<I>: Send + Sync {
    type Input: Element;
    type Output: Element;

    fn visit(&self, index: &[I], values: &[Self::Input]) -> Self::Output;
}

/// Produce the output index value for one group.
pub trait IndexVisitor<I>: Send + Sync {
    fn visit(&self, index: &[I]) -> I;
}

impl<I, F> IndexVisitor<I> for F
where
    F: Fn(&[I]) -> I + Send + Sync,
{
    fn visit(&self, index: &[I]) -> I {
        self(index)
    }
}

pub fn first_index<I: Element>(index: &[I]) -> I {
    index.first().cloned().unwrap_or_else(I::na)
}

pub fn last_index<I: Element>(index: &[I]) -> I {
    index.last().cloned().unwrap_or_else(I::na)
}

/// Type-erased reducer so aggregations over different column types can share
/// one list.
trait Reduce<I>: Send + Sync {
    fn reduce(
        &self,
        index: &[I],
        source: &dyn ColumnData,
        groups: &[Range<usize>],
        name: &str,
    ) -> Result<Box<dyn ColumnData>>;
}

struct VisitorReduce<V>(V);

impl<I, V> Reduce<I> for VisitorReduce<V>
where
    I: Element,
    V: Visitor<I>,
{
    fn reduce(
        &self,
        index: &[I],
        source: &dyn ColumnData,
        groups: &[Range<usize>],
        name: &str,
    ) -> Result<Box<dyn ColumnData>> {
        let values = downcast_ref::<V::Input>(source, name)?;
        let out: Vec<V::Output> = groups
            .iter()
            .map(|g| self.0.visit(&index[g.clone()], &values[g.clone()]))
            .collect();
        Ok(Box::new(out))
    }
}

/// One output column of a group-by or bucketize: read `source`, reduce each
/// group with a visitor, store under `target`.
pub struct Aggregation<I> {
    source: String,
    target: String,
    reducer: Box<dyn Reduce<I>>,
}

impl<I: Element> Aggregation<I> {
    /// Aggregate `source` into an output column of the same name.
    pub fn new<V: Visitor<I> + 'static>(source: &str, visitor: V) -> Self {
        Self::named(source, source, visitor)
    }

    pub fn named<V: Visitor<I> + 'static>(source: &str, target: &str, visitor: V) -> Self {
        Self {
            source: source.to_string(),
            target: target.to_string(),
            reducer: Box::new(VisitorReduce(visitor)),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// `index` and `source` must already be in group order and full length.
    pub(crate) fn reduce(
        &self,
        index: &[I],
        source: &dyn ColumnData,
        groups: &[Range<usize>],
    ) -> Result<Box<dyn ColumnData>> {
        self.reducer.reduce(index, source, groups, &self.source)
    }
}

impl<I> std::fmt::Debug for Aggregation<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregation")
            .field("source", &self.source)
            .field("target", &self.target)
            .finish()
    }
}

macro_rules! marker_visitor {
    ($name:ident) => {
        pub struct $name<T>(PhantomData<fn() -> T>);

        impl<T> $name<T> {
            pub fn new() -> Self {
                Self(PhantomData)
            }
        }

        impl<T> Default for $name<T> {
            fn default() -> Self {
                Self::new()
            }
        }
    };
}

marker_visitor!(Count);
marker_visitor!(Sum);
marker_visitor!(Mean);
marker_visitor!(Min);
marker_visitor!(Max);
marker_visitor!(First);
marker_visitor!(Last);

/// Number of non-missing values.
impl<I, T: Element> Visitor<I> for Count<T> {
    type Input = T;
    type Output = usize;

    fn visit(&self, _index: &[I], values: &[T]) -> usize {
        values.iter().filter(|v| !v.is_na()).count()
    }
}

/// Sum of non-missing values, added in the column's own type.
///
/// Yields the sentinel for non-numeric types, and for integers when the sum
/// overflows (or would land on the sentinel itself).
impl<I, T: Element> Visitor<I> for Sum<T> {
    type Input = T;
    type Output = T;

    fn visit(&self, _index: &[I], values: &[T]) -> T {
        let Some(zero) = T::from_f64(0.0) else {
            return T::na();
        };
        values
            .iter()
            .filter(|v| !v.is_na())
            .try_fold(zero, |acc, v| acc.try_add(v))
            .unwrap_or_else(T::na)
    }
}

/// Mean of non-missing values; NaN when there are none.
impl<I, T: Element> Visitor<I> for Mean<T> {
    type Input = T;
    type Output = f64;

    fn visit(&self, _index: &[I], values: &[T]) -> f64 {
        let nums: Vec<f64> = values
            .iter()
            .filter(|v| !v.is_na())
            .filter_map(Element::to_f64)
            .collect();
        if nums.is_empty() {
            f64::NAN
        } else {
            nums.iter().sum::<f64>() / nums.len() as f64
        }
    }
}

impl<I, T: Element> Visitor<I> for Min<T> {
    type Input = T;
    type Output = T;

    fn visit(&self, _index: &[I], values: &[T]) -> T {
        values
            .iter()
            .filter(|v| !v.is_na())
            .min_by(|a, b| a.cmp_value(b))
            .cloned()
            .unwrap_or_else(T::na)
    }
}

impl<I, T: Element> Visitor<I> for Max<T> {
    type Input = T;
    type Output = T;

    fn visit(&self, _index: &[I], values: &[T]) -> T {
        values
            .iter()
            .filter(|v| !v.is_na())
            .max_by(|a, b| a.cmp_value(b))
            .cloned()
            .unwrap_or_else(T::na)
    }
}

impl<I, T: Element> Visitor<I> for First<T> {
    type Input = T;
    type Output = T;

    fn visit(&self, _index: &[I], values: &[T]) -> T {
        values.first().cloned().unwrap_or_else(T::na)
    }
}

impl<I, T: Element> Visitor<I> for Last<T> {
    type Input = T;
    type Output = T;

    fn visit(&self, _index: &[I], values: &[T]) -> T {
        values.last().cloned().unwrap_or_else(T::na)
    }
}

/// Adapter turning a closure over (index slice, value slice) into a visitor.
pub struct FnVisitor<T, O, F> {
    f: F,
    _marker: PhantomData<fn(&T) -> O>,
}

impl<T, O, F> FnVisitor<T, O, F> {
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }
}

impl<I, T, O, F> Visitor<I> for FnVisitor<T, O, F>
where
    T: Element,
    O: Element,
    F: Fn(&[I], &[T]) -> O + Send + Sync,
{
    type Input = T;
    type Output = O;

    fn visit(&self, index: &[I], values: &[T]) -> O {
        (self.f)(index, values)
    }
}
