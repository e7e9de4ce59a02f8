//! Utility functions and traits.

use crate::{
    consts::MAX_PREFIX_SUM_VALUES_RANGE,
    error::{HarpError, Result},
};

use rand::prelude::*;

use std::{
    any::Any,
    fmt::Display,
    ops::{Add, AddAssign},
};

/// Utility trait that helps getting runtime information about types implementing it.
pub trait Object {
    fn as_any(&self) -> &dyn Any;
}

/// Runtime type-checking utility.
pub fn is_of_type<T: 'static>(x: &dyn Object) -> bool {
    x.as_any().is::<T>()
}

impl Object for f32 {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Object for f64 {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Utility trait that generalizes floating-point types used by the elementwise addition kernels.
///
/// Also provides a generic way of generating floating-point vectors in the wanted type.
pub trait HarpFloat:
    num::Float + Default + Add + AddAssign + Display + Send + Sync + Object
{
    /// Produces a random vector of type `T` and length `n`, filled with values in the range
    /// [0.0, 100.0).
    fn rand_vector(n: usize, seed: Option<u64>) -> Vec<Self>;

    /// Whether `expected` and `actual` are equal up to the relative tolerance `tol`.
    fn approx_eq(expected: Self, actual: Self, tol: f64) -> bool;
}

impl HarpFloat for f32 {
    fn rand_vector(n: usize, seed: Option<u64>) -> Vec<Self> {
        let seed = seed.unwrap_or(0);
        let mut rng = rand::rngs::SmallRng::seed_from_u64(seed);
        let between = rand::distributions::Uniform::new(0.0_f32, 100.0_f32);
        (0..n).map(|_| between.sample(&mut rng)).collect()
    }

    fn approx_eq(expected: Self, actual: Self, tol: f64) -> bool {
        f64::approx_eq(expected.into(), actual.into(), tol)
    }
}

impl HarpFloat for f64 {
    fn rand_vector(n: usize, seed: Option<u64>) -> Vec<Self> {
        let seed = seed.unwrap_or(0);
        let mut rng = rand::rngs::SmallRng::seed_from_u64(seed);
        let between = rand::distributions::Uniform::new(0.0_f64, 100.0_f64);
        (0..n).map(|_| between.sample(&mut rng)).collect()
    }

    fn approx_eq(expected: Self, actual: Self, tol: f64) -> bool {
        (expected - actual).abs() <= tol * expected.abs().max(1.0)
    }
}

/// Rounds `n` up to the next multiple of `multiple`.
pub fn round_up(n: usize, multiple: usize) -> usize {
    n.div_ceil(multiple) * multiple
}

/// Converts a host length to the `uint` expected by the kernels.
pub fn to_cl_uint(n: usize) -> Result<u32> {
    u32::try_from(n).map_err(|_| {
        HarpError::InvalidConfig(format!("{n} does not fit in an OpenCL `uint` argument"))
    })
}

/// Magnitude bound of the max prefix sum input values for a given length, chosen so that no
/// prefix sum of `n` values can overflow an `i32`.
pub fn prefix_sum_values_range(n: usize) -> i32 {
    let per_elem = i32::try_from(n).map_or(0, |n| i32::MAX / n.max(1));
    MAX_PREFIX_SUM_VALUES_RANGE.min(per_elem)
}

/// Produces a random vector of length `n` with values uniformly drawn in `[-range, range]`.
///
/// When no seed is given the length itself seeds the generator, so that every length of a sweep
/// gets its own reproducible input.
pub fn rand_prefix_sum_input(n: usize, range: i32, seed: Option<u64>) -> Vec<i32> {
    let seed = seed.unwrap_or(n as u64);
    let mut rng = rand::rngs::SmallRng::seed_from_u64(seed);
    let between = rand::distributions::Uniform::new_inclusive(-range, range);
    (0..n).map(|_| between.sample(&mut rng)).collect()
}

/// Produces a random vector of length `n` with values uniformly drawn in `[0, u32::MAX / n]`, so
/// that the total never overflows a `u32`.
pub fn rand_sum_input(n: usize, seed: u64) -> Vec<u32> {
    let max = u32::try_from(n).map_or(0, |n| u32::MAX / n.max(1));
    let mut rng = rand::rngs::SmallRng::seed_from_u64(seed);
    let between = rand::distributions::Uniform::new_inclusive(0, max);
    (0..n).map(|_| between.sample(&mut rng)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_up_to_work_group() {
        assert_eq!(round_up(1, 256), 256);
        assert_eq!(round_up(256, 256), 256);
        assert_eq!(round_up(257, 256), 512);
        assert_eq!(round_up(10, 3), 12);
    }

    #[test]
    fn cl_uint_conversion() {
        assert_eq!(to_cl_uint(256).unwrap(), 256);
        assert!(matches!(
            to_cl_uint(usize::MAX),
            Err(HarpError::InvalidConfig(_))
        ));
    }

    #[test]
    fn values_range_prevents_overflow() {
        assert_eq!(prefix_sum_values_range(2), 1023);
        assert_eq!(prefix_sum_values_range(1 << 24), 127);
        let n = 1 << 24;
        let worst = i64::from(prefix_sum_values_range(n)) * n as i64;
        assert!(worst <= i64::from(i32::MAX));
    }

    #[test]
    fn prefix_sum_input_is_reproducible_and_bounded() {
        let a = rand_prefix_sum_input(1000, 7, None);
        let b = rand_prefix_sum_input(1000, 7, None);
        assert_eq!(a, b);
        assert!(a.iter().all(|v| (-7..=7).contains(v)));
        assert_ne!(a, rand_prefix_sum_input(1000, 7, Some(1)));
    }

    #[test]
    fn sum_input_total_fits() {
        let x = rand_sum_input(10_000, 42);
        let total: u64 = x.iter().map(|&v| u64::from(v)).sum();
        assert!(total <= u64::from(u32::MAX));
    }

    #[test]
    fn float_tolerance() {
        assert!(f32::approx_eq(1.0, 1.0 + 1e-8, 1e-6));
        assert!(!f64::approx_eq(100.0, 100.1, 1e-6));
        assert!(is_of_type::<f32>(&1.0_f32));
        assert!(!is_of_type::<f32>(&1.0_f64));
    }
}
