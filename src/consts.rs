//! Crate-level constants.

/// Default number of timed iterations performed when benchmarking a kernel.
pub const BENCHMARKING_ITERATIONS: u8 = 10;

/// Default work-group size used by every device kernel.
pub const WORK_GROUP_SIZE: usize = 256;

/// Default upper bound (as a power of two) of the max prefix sum length sweep.
pub const MAX_PREFIX_SUM_MAX_LOG2: u8 = 24;

/// Default length of the global sum input.
pub const SUM_LENGTH: usize = 100 * 1000 * 1000;

/// Default seed of the global sum input generator.
pub const SUM_SEED: u64 = 42;

/// Upper bound on the magnitude of the max prefix sum input values.
pub const MAX_PREFIX_SUM_VALUES_RANGE: i32 = 1023;

/// Relative tolerance used when checking floating-point device results.
pub const FLOAT_TOLERANCE: f64 = 1e-6;
