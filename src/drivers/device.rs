//! Device kernel drivers.
//!
//! This module implements the driver functions responsible for profiling the chosen kernels on
//! the selected OpenCL device, through the [`ocl`][1] crate.
//!
//! Only the kernel executions are timed: uploads, output resets and read-backs happen outside of
//! the measured region. Every run is read back and checked against the host reference.
//!
//! [1]: https://crates.io/crates/ocl

use crate::{
    device::DeviceContext,
    drivers::host::{check_add, check_max_prefix_sum},
    error::{ensure_same, HarpError, Result},
    kernels::device::{DeviceKernel, CL_SUM_ATOMIC, CL_SUM_TREE},
    perf_report::*,
    reduction::{device::ClPassBackend, pass_count, MaxPrefixSumEngine, PrefixSummary},
    utils::{is_of_type, round_up, to_cl_uint, HarpFloat},
};

use ocl::{Buffer, Kernel, OclPrm};
use tracing::debug;

use std::time::Instant;

/// OpenCL device driver for the generic elementwise addition kernel.
pub fn ocl_add<T: HarpFloat + OclPrm>(
    ctx: &DeviceContext,
    kernel_info: &DeviceKernel,
    h_a: &[T],
    h_b: &[T],
    expected: &[T],
    iterations: u8,
    group_size: usize,
) -> Result<PerfReport<DeviceKernelVariant>> {
    ensure_same(h_a.len(), h_b.len(), "input lengths")?;
    let len = h_a.len();
    let queue = ctx.queue();
    let program = ctx.build_program(kernel_info, group_size)?;

    // Create device vectors
    let d_a = Buffer::builder()
        .queue(queue.clone())
        .len(len)
        .copy_host_slice(h_a)
        .build()?;
    let d_b = Buffer::builder()
        .queue(queue.clone())
        .len(len)
        .copy_host_slice(h_b)
        .build()?;
    let d_c = Buffer::<T>::builder()
        .queue(queue.clone())
        .len(len)
        .fill_val(T::default())
        .build()?;

    let kernel = Kernel::builder()
        .program(&program)
        .name(kernel_info.name())
        .queue(queue.clone())
        .global_work_size(round_up(len, group_size))
        .local_work_size(group_size)
        .arg(&d_a)
        .arg(&d_b)
        .arg(&d_c)
        .arg(to_cl_uint(len)?)
        .build()?;

    // Measure execution time of device kernel
    let mut h_c = vec![T::default(); len];
    let mut durations = Vec::with_capacity(iterations.into());
    for _ in 0..durations.capacity() {
        let dur = Instant::now();
        unsafe {
            kernel.enq()?;
        }
        queue.finish()?;
        durations.push(dur.elapsed().as_secs_f64());

        d_c.read(&mut h_c[..]).enq()?;
        check_add(expected, &h_c, "GPU result")?;
    }

    let kind = match is_of_type::<f32>(&T::default()) {
        true => KernelKind::Sadd,
        false => KernelKind::Dadd,
    };
    Ok(PerfReport::new(
        TargetKind::Device,
        kind,
        DeviceKernelVariant::ClNaive,
        len,
        &mut durations,
    ))
}

/// OpenCL device driver for the global sum kernels.
///
/// `variant` selects between one atomic per element ([`DeviceKernelVariant::ClAtomic`]) and one
/// atomic per work-group ([`DeviceKernelVariant::ClTree`]).
pub fn ocl_sum(
    ctx: &DeviceContext,
    variant: DeviceKernelVariant,
    h_x: &[u32],
    expected: u32,
    iterations: u8,
    group_size: usize,
) -> Result<PerfReport<DeviceKernelVariant>> {
    let kernel_info = match variant {
        DeviceKernelVariant::ClAtomic => &CL_SUM_ATOMIC,
        DeviceKernelVariant::ClTree => &CL_SUM_TREE,
        other => {
            return Err(HarpError::InvalidConfig(format!(
                "no global sum kernel for variant `{other}`"
            )))
        }
    };
    let len = h_x.len();
    let queue = ctx.queue();
    let program = ctx.build_program(kernel_info, group_size)?;

    let d_x = Buffer::builder()
        .queue(queue.clone())
        .len(len)
        .copy_host_slice(h_x)
        .build()?;
    let d_sum = Buffer::<u32>::builder()
        .queue(queue.clone())
        .len(1)
        .fill_val(0)
        .build()?;

    let kernel = Kernel::builder()
        .program(&program)
        .name(kernel_info.name())
        .queue(queue.clone())
        .global_work_size(round_up(len, group_size))
        .local_work_size(group_size)
        .arg(&d_x)
        .arg(&d_sum)
        .arg(to_cl_uint(len)?)
        .build()?;

    let mut h_sum = [0_u32];
    let mut durations = Vec::with_capacity(iterations.into());
    for _ in 0..durations.capacity() {
        // The kernels accumulate into the output cell
        d_sum.write(&[0_u32][..]).enq()?;
        queue.finish()?;

        let dur = Instant::now();
        unsafe {
            kernel.enq()?;
        }
        queue.finish()?;
        durations.push(dur.elapsed().as_secs_f64());

        d_sum.read(&mut h_sum[..]).enq()?;
        ensure_same(expected, h_sum[0], "GPU sum")?;
    }

    Ok(PerfReport::new(
        TargetKind::Device,
        KernelKind::Sum,
        variant,
        len,
        &mut durations,
    ))
}

/// OpenCL device driver for the multi-pass max prefix sum reduction.
///
/// The buffer sets are allocated and seeded once; every iteration restores the seed with a
/// device-to-device copy and times the pass loop alone.
pub fn ocl_max_prefix_sum(
    ctx: &DeviceContext,
    h_x: &[i32],
    expected: &PrefixSummary,
    iterations: u8,
    group_size: usize,
) -> Result<PerfReport<DeviceKernelVariant>> {
    let backend = ClPassBackend::new(ctx, group_size)?;
    let mut engine = MaxPrefixSumEngine::new(backend, h_x)?;
    debug!(
        len = h_x.len(),
        passes = pass_count(h_x.len(), group_size),
        "max prefix sum engine ready"
    );

    let mut durations = Vec::with_capacity(iterations.into());
    for _ in 0..durations.capacity() {
        engine.reseed()?;
        ctx.queue().finish()?;

        let dur = Instant::now();
        engine.run_passes()?;
        durations.push(dur.elapsed().as_secs_f64());

        let res = engine.read_result()?;
        check_max_prefix_sum(expected, &res, "GPU")?;
    }

    Ok(PerfReport::new(
        TargetKind::Device,
        KernelKind::MaxPrefixSum,
        DeviceKernelVariant::ClMultiPass,
        h_x.len(),
        &mut durations,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        device::DeviceConfig,
        kernels::{device::CL_SADD, host},
        utils::{prefix_sum_values_range, rand_prefix_sum_input, rand_sum_input},
    };

    #[test]
    #[ignore = "requires an OpenCL device"]
    fn device_sum_matches_host_sum() {
        let ctx = DeviceContext::new(&DeviceConfig::default()).unwrap();
        for len in [1, 255, 1000, 1 << 20] {
            let x = rand_sum_input(len, 42);
            let expected = host::sum(&x);
            for variant in [DeviceKernelVariant::ClAtomic, DeviceKernelVariant::ClTree] {
                ocl_sum(&ctx, variant, &x, expected, 2, 256).unwrap();
            }
        }
    }

    #[test]
    #[ignore = "requires an OpenCL device"]
    fn device_sum_rejects_wrong_reference() {
        let ctx = DeviceContext::new(&DeviceConfig::default()).unwrap();
        let x = rand_sum_input(1024, 1);
        let wrong = host::sum(&x).wrapping_add(1);
        assert!(matches!(
            ocl_sum(&ctx, DeviceKernelVariant::ClTree, &x, wrong, 2, 256),
            Err(HarpError::Mismatch { .. })
        ));
    }

    #[test]
    #[ignore = "requires an OpenCL device"]
    fn device_add_and_max_prefix_sum() {
        let ctx = DeviceContext::new(&DeviceConfig::default()).unwrap();
        let a = f32::rand_vector(3000, Some(1));
        let b = f32::rand_vector(3000, Some(2));
        let mut c = vec![0.0; 3000];
        host::add(&a, &b, &mut c);
        ocl_add(&ctx, &CL_SADD, &a, &b, &c, 2, 256).unwrap();

        let n = 100_000;
        let x = rand_prefix_sum_input(n, prefix_sum_values_range(n), None);
        let report = ocl_max_prefix_sum(&ctx, &x, &host::max_prefix_sum(&x), 3, 256).unwrap();
        assert_eq!(report.nb_bytes(), 12 * n);
    }
}
