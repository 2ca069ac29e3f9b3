//! Key comparison policy for ordered task sets.
//!
//! Integers compare as integers. Reals compare with IEEE semantics, so `-0.0` and `0.0` are the same key. NaN is a
//! caller error: it is ordered with `total_cmp` so a set containing it stays internally consistent, but its position
//! relative to other keys is unspecified.

use std::cmp::Ordering;
use std::fmt::{Debug, Display};

/// Represent a key that orders the tasks of one test case.
///
/// Implemented for every primitive integer type, `f32` and `f64`.
pub trait TaskKey: Copy + Debug + Display + Send + Sync + 'static {
    /// Compare two keys.
    ///
    /// ## Returns
    /// - (`Ordering`): the execution order of `self` relative to `other`.
    fn compare(&self, other: &Self) -> Ordering;
}

macro_rules! impl_integer_key {
    ($($ty:ty),* $(,)?) => {
        $(
            impl TaskKey for $ty {
                #[inline]
                fn compare(&self, other: &Self) -> Ordering {
                    self.cmp(other)
                }
            }
        )*
    };
}

impl_integer_key!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);

macro_rules! impl_real_key {
    ($($ty:ty),* $(,)?) => {
        $(
            impl TaskKey for $ty {
                #[inline]
                fn compare(&self, other: &Self) -> Ordering {
                    // Falls back to the total order only when a NaN is involved.
                    self.partial_cmp(other).unwrap_or_else(|| self.total_cmp(other))
                }
            }
        )*
    };
}

impl_real_key!(f32, f64);
