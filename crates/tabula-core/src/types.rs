//! Element types a column (or the index) may hold.
//!
//! Every element type carries a not-available sentinel so that short columns,
//! padding, and missing-data policies can work without a separate validity
//! mask. Numeric types additionally expose an `f64` view used by the
//! interpolating fill policies and by distance-based bucketing.

use std::cmp::Ordering;
use std::fmt;

pub trait Element: Clone + PartialEq + Send + Sync + fmt::Debug + 'static {
    /// The type's not-available sentinel.
    fn na() -> Self;

    fn is_na(&self) -> bool;

    /// Total order used by sort and group-by. Sentinels order deterministically.
    fn cmp_value(&self, other: &Self) -> Ordering;

    /// Order by magnitude. Non-numeric types fall back to `cmp_value`.
    fn cmp_abs(&self, other: &Self) -> Ordering {
        self.cmp_value(other)
    }

    /// Numeric view; `None` for non-numeric types.
    fn to_f64(&self) -> Option<f64> {
        None
    }

    /// Build a value from a numeric result; `None` for non-numeric types.
    fn from_f64(_v: f64) -> Option<Self> {
        None
    }

    /// Exact addition. `None` for non-numeric types, and for integers when the
    /// result overflows or lands on the sentinel.
    fn try_add(&self, _other: &Self) -> Option<Self> {
        None
    }

    fn type_label() -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// NaN sorts after every number and equal to itself.
fn float_cmp(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

macro_rules! float_element {
    ($t:ty) => {
        impl Element for $t {
            fn na() -> Self {
                <$t>::NAN
            }
            fn is_na(&self) -> bool {
                self.is_nan()
            }
            fn cmp_value(&self, other: &Self) -> Ordering {
                float_cmp(*self as f64, *other as f64)
            }
            fn cmp_abs(&self, other: &Self) -> Ordering {
                float_cmp(self.abs() as f64, other.abs() as f64)
            }
            fn to_f64(&self) -> Option<f64> {
                Some(*self as f64)
            }
            fn from_f64(v: f64) -> Option<Self> {
                Some(v as $t)
            }
            fn try_add(&self, other: &Self) -> Option<Self> {
                Some(*self + *other)
            }
        }
    };
}

// Signed integers reserve MIN as the sentinel. It still sorts last, like NaN.
macro_rules! signed_element {
    ($t:ty) => {
        impl Element for $t {
            fn na() -> Self {
                <$t>::MIN
            }
            fn is_na(&self) -> bool {
                *self == <$t>::MIN
            }
            fn cmp_value(&self, other: &Self) -> Ordering {
                match (self.is_na(), other.is_na()) {
                    (true, true) => Ordering::Equal,
                    (true, false) => Ordering::Greater,
                    (false, true) => Ordering::Less,
                    (false, false) => self.cmp(other),
                }
            }
            fn cmp_abs(&self, other: &Self) -> Ordering {
                self.unsigned_abs().cmp(&other.unsigned_abs())
            }
            fn to_f64(&self) -> Option<f64> {
                Some(*self as f64)
            }
            fn from_f64(v: f64) -> Option<Self> {
                if v.is_nan() {
                    return None;
                }
                Some(v.round() as $t)
            }
            fn try_add(&self, other: &Self) -> Option<Self> {
                <$t>::checked_add(*self, *other).filter(|v| !v.is_na())
            }
        }
    };
}

// Unsigned integers reserve MAX as the sentinel.
macro_rules! unsigned_element {
    ($t:ty) => {
        impl Element for $t {
            fn na() -> Self {
                <$t>::MAX
            }
            fn is_na(&self) -> bool {
                *self == <$t>::MAX
            }
            fn cmp_value(&self, other: &Self) -> Ordering {
                self.cmp(other)
            }
            fn to_f64(&self) -> Option<f64> {
                Some(*self as f64)
            }
            fn from_f64(v: f64) -> Option<Self> {
                if v.is_nan() || v < 0.0 {
                    return None;
                }
                Some(v.round() as $t)
            }
            fn try_add(&self, other: &Self) -> Option<Self> {
                <$t>::checked_add(*self, *other).filter(|v| !v.is_na())
            }
        }
    };
}

float_element!(f32);
float_element!(f64);
signed_element!(i8);
signed_element!(i16);
signed_element!(i32);
signed_element!(i64);
unsigned_element!(u8);
unsigned_element!(u16);
unsigned_element!(u32);
unsigned_element!(u64);
unsigned_element!(usize);

impl Element for String {
    fn na() -> Self {
        String::new()
    }
    fn is_na(&self) -> bool {
        self.is_empty()
    }
    fn cmp_value(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }
}

/// Booleans have no spare bit pattern: padding yields `false` and nothing is
/// ever reported missing. Use `Option<bool>` when missingness matters.
impl Element for bool {
    fn na() -> Self {
        false
    }
    fn is_na(&self) -> bool {
        false
    }
    fn cmp_value(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }
}

/// `None` is the sentinel and sorts last, like NaN.
impl<T: Element> Element for Option<T> {
    fn na() -> Self {
        None
    }
    fn is_na(&self) -> bool {
        self.is_none()
    }
    fn cmp_value(&self, other: &Self) -> Ordering {
        match (self, other) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => a.cmp_value(b),
        }
    }
    fn cmp_abs(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Some(a), Some(b)) => a.cmp_abs(b),
            _ => self.cmp_value(other),
        }
    }
    fn to_f64(&self) -> Option<f64> {
        self.as_ref().and_then(Element::to_f64)
    }
    fn from_f64(v: f64) -> Option<Self> {
        T::from_f64(v).map(Some)
    }
    fn try_add(&self, other: &Self) -> Option<Self> {
        match (self, other) {
            (Some(a), Some(b)) => a.try_add(b).map(Some),
            _ => None,
        }
    }
}
