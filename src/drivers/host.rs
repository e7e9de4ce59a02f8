//! Host kernel drivers.
//!
//! This module implements the driver functions responsible for profiling the chosen kernels on the
//! host (CPU). Every run is checked against the reference result.

use crate::{
    consts::FLOAT_TOLERANCE,
    error::{ensure_same, ensure_same_at, HarpError, Result},
    kernels::host,
    perf_report::*,
    reduction::{host::HostPassBackend, MaxPrefixSumEngine, PrefixSummary},
    utils::*,
};

use std::time::Instant;

/// Checks an elementwise addition result against the reference, reporting the first difference.
pub fn check_add<T: HarpFloat>(expected: &[T], actual: &[T], what: &str) -> Result<()> {
    ensure_same(expected.len(), actual.len(), what)?;
    match expected
        .iter()
        .zip(actual)
        .position(|(e, a)| !T::approx_eq(*e, *a, FLOAT_TOLERANCE))
    {
        Some(i) => ensure_same_at(expected[i], actual[i], what, Some(i)),
        None => Ok(()),
    }
}

/// Checks a max prefix sum result against the reference.
pub fn check_max_prefix_sum(
    expected: &PrefixSummary,
    actual: &PrefixSummary,
    what: &str,
) -> Result<()> {
    ensure_same(expected.max, actual.max, &format!("{what} max prefix sum"))?;
    ensure_same(expected.argmax, actual.argmax, &format!("{what} max prefix index"))
}

fn unsupported(kernel: KernelKind, variant: HostKernelVariant) -> HarpError {
    HarpError::InvalidConfig(format!("no `{variant}` host implementation of {kernel}"))
}

/// Host driver for the generic elementwise addition kernel.
///
/// This function selects the correct host kernel given `variant` and profiles it.
pub fn add<T: HarpFloat>(
    a: &[T],
    b: &[T],
    expected: &[T],
    iterations: u8,
    variant: HostKernelVariant,
) -> Result<PerfReport<HostKernelVariant>> {
    let kind = match is_of_type::<f32>(&T::default()) {
        true => KernelKind::Sadd,
        false => KernelKind::Dadd,
    };

    // Match on given kernel variant
    let kernel = match variant {
        HostKernelVariant::SeqNaive => host::add::<T>,
        HostKernelVariant::SeqIter => host::iter_add::<T>,
        HostKernelVariant::ParIter => host::par_iter_add::<T>,
        HostKernelVariant::SeqMultiPass => return Err(unsupported(kind, variant)),
    };

    let mut c = vec![T::default(); a.len()];

    // Measure execution time of kernel
    let mut durations = Vec::with_capacity(iterations.into());
    for _ in 0..durations.capacity() {
        let dur = Instant::now();
        kernel(a, b, &mut c);
        durations.push(dur.elapsed().as_secs_f64());
        check_add(expected, &c, "CPU result")?;
    }

    Ok(PerfReport::new(
        TargetKind::Host,
        kind,
        variant,
        a.len(),
        &mut durations,
    ))
}

/// Host driver for the 32-bit unsigned integer global sum kernel.
pub fn sum(
    x: &[u32],
    expected: u32,
    iterations: u8,
    variant: HostKernelVariant,
) -> Result<PerfReport<HostKernelVariant>> {
    let kernel = match variant {
        HostKernelVariant::SeqNaive => host::sum,
        HostKernelVariant::SeqIter => host::iter_sum,
        HostKernelVariant::ParIter => host::par_sum,
        HostKernelVariant::SeqMultiPass => return Err(unsupported(KernelKind::Sum, variant)),
    };

    let mut durations = Vec::with_capacity(iterations.into());
    for _ in 0..durations.capacity() {
        let dur = Instant::now();
        let res = std::hint::black_box(kernel(x));
        durations.push(dur.elapsed().as_secs_f64());
        ensure_same(expected, res, "CPU sum")?;
    }

    Ok(PerfReport::new(
        TargetKind::Host,
        KernelKind::Sum,
        variant,
        x.len(),
        &mut durations,
    ))
}

/// Host driver for the 32-bit integer max prefix sum kernel.
///
/// `group_size` is only used by [`HostKernelVariant::SeqMultiPass`].
pub fn max_prefix_sum(
    x: &[i32],
    expected: &PrefixSummary,
    iterations: u8,
    variant: HostKernelVariant,
    group_size: usize,
) -> Result<PerfReport<HostKernelVariant>> {
    let kernel = match variant {
        HostKernelVariant::SeqNaive => host::max_prefix_sum,
        HostKernelVariant::SeqIter => host::iter_max_prefix_sum,
        HostKernelVariant::ParIter => host::par_max_prefix_sum,
        HostKernelVariant::SeqMultiPass => {
            return multi_pass_max_prefix_sum(x, expected, iterations, group_size)
        }
    };

    let mut durations = Vec::with_capacity(iterations.into());
    for _ in 0..durations.capacity() {
        let dur = Instant::now();
        let res = std::hint::black_box(kernel(x));
        durations.push(dur.elapsed().as_secs_f64());
        check_max_prefix_sum(expected, &res, "CPU")?;
    }

    Ok(PerfReport::new(
        TargetKind::Host,
        KernelKind::MaxPrefixSum,
        variant,
        x.len(),
        &mut durations,
    ))
}

/// Runs the multi-pass reduction engine on the host, with the same buffer discipline as on the
/// device: the buffer sets are seeded once and restored before every timed run.
fn multi_pass_max_prefix_sum(
    x: &[i32],
    expected: &PrefixSummary,
    iterations: u8,
    group_size: usize,
) -> Result<PerfReport<HostKernelVariant>> {
    let mut engine = MaxPrefixSumEngine::new(HostPassBackend::new(group_size), x)?;

    let mut durations = Vec::with_capacity(iterations.into());
    for _ in 0..durations.capacity() {
        engine.reseed()?;
        let dur = Instant::now();
        engine.run_passes()?;
        durations.push(dur.elapsed().as_secs_f64());
        check_max_prefix_sum(expected, &engine.read_result()?, "CPU multi-pass")?;
    }

    Ok(PerfReport::new(
        TargetKind::Host,
        KernelKind::MaxPrefixSum,
        HostKernelVariant::SeqMultiPass,
        engine.len(),
        &mut durations,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const VARIANTS: [HostKernelVariant; 3] = [
        HostKernelVariant::SeqNaive,
        HostKernelVariant::SeqIter,
        HostKernelVariant::ParIter,
    ];

    #[test]
    fn every_host_variant_is_checked() {
        let x = rand_prefix_sum_input(10_000, 1023, Some(11));
        let expected = host::max_prefix_sum(&x);
        for variant in VARIANTS.into_iter().chain([HostKernelVariant::SeqMultiPass]) {
            let report = max_prefix_sum(&x, &expected, 3, variant, 16).unwrap();
            assert_eq!(report.nb_bytes(), 12 * x.len());
        }

        let y = rand_sum_input(10_000, 1);
        for variant in VARIANTS {
            sum(&y, host::sum(&y), 2, variant).unwrap();
        }

        let a = f32::rand_vector(1000, Some(1));
        let b = f32::rand_vector(1000, Some(2));
        let mut c = vec![0.0; 1000];
        host::add(&a, &b, &mut c);
        for variant in VARIANTS {
            add(&a, &b, &c, 2, variant).unwrap();
        }
    }

    #[test]
    fn wrong_reference_is_reported() {
        let x = [3, -3, 3];
        let wrong = PrefixSummary {
            sum: 3,
            max: 3,
            argmax: 3,
        };
        for variant in [HostKernelVariant::SeqNaive, HostKernelVariant::SeqMultiPass] {
            let err = max_prefix_sum(&x, &wrong, 2, variant, 2).unwrap_err();
            assert!(matches!(err, HarpError::Mismatch { .. }));
            assert!(err.to_string().contains("max prefix index"));
        }
    }

    #[test]
    fn multi_pass_only_exists_for_max_prefix_sum() {
        let y = rand_sum_input(100, 3);
        assert!(matches!(
            sum(&y, host::sum(&y), 2, HostKernelVariant::SeqMultiPass),
            Err(HarpError::InvalidConfig(_))
        ));
    }

    #[test]
    fn add_mismatch_reports_first_index() {
        let expected = [1.0_f64, 2.0, 3.0, 4.0];
        let actual = [1.0_f64, 2.0, 3.5, 4.5];
        match check_add(&expected, &actual, "GPU result") {
            Err(HarpError::Mismatch { index, .. }) => assert_eq!(index, Some(2)),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
