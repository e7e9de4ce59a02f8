//! Kernel drivers.
//!
//! This module provides the API for appropriately initializing and profiling the kernels, as well
//! as post-processing the results. It acts as a layer abstracting over the kernel's target: either
//! the host (CPU) or the OpenCL device.
//!
//! # High-level approach for kernel profiling
//! ## 1. Data initialization
//! Inputs are generated from a seeded RNG, so that every run of the harness benchmarks the same
//! data. The reference result is computed once per input with the serial host kernel.
//!
//! ## 2. Performance evaluation
//! This step consists in measuring the execution time of the chosen kernel, repeated over a number
//! of iterations (see [`crate::consts`] for the default and [`crate::cli`] for overriding it from
//! the command-line). Every iteration is checked against the reference: the first mismatch aborts
//! the whole run.
//!
//! ## 3. Post-processing
//! This step consists in extracting performance metrics from the recorded execution times of the
//! kernel and information about the manipulated data: throughput (in millions of elements per
//! second) and memory bandwidth (in GiB/s).
//!
//! The resulting metrics are then outputted to `stdout`, or a file if specified (see
//! [`crate::cli`] for specifying an output file from the command-line).

mod device;
mod host;

use crate::{
    cli::*,
    consts::SUM_SEED,
    device::{list_devices, DeviceContext},
    error::Result,
    kernels::{device::*, host as reference},
    perf_report::*,
    utils::*,
};

use ocl::OclPrm;
use tracing::info;

use std::{
    fs::OpenOptions,
    io::{stdout, Write},
    path::Path,
};

const HOST_VARIANTS: [HostKernelVariant; 3] = [
    HostKernelVariant::SeqNaive,
    HostKernelVariant::SeqIter,
    HostKernelVariant::ParIter,
];

fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(name) => Box::new(
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(name)?,
        ),
        None => Box::new(stdout()),
    })
}

fn write_reports(
    output: Option<&Path>,
    host_perf_reports: &[PerfReport<HostKernelVariant>],
    device_perf_reports: &[PerfReport<DeviceKernelVariant>],
) -> Result<()> {
    let mut output = open_output(output)?;
    PerfReport::<()>::print_csv_header(&mut output)?;
    for report in host_perf_reports {
        writeln!(output, "{report}")?;
    }
    for report in device_perf_reports {
        writeln!(output, "{report}")?;
    }
    output.flush()?;
    Ok(())
}

/// Prints the available OpenCL platforms and devices.
pub fn devices(args: CliArgs) -> Result<()> {
    let mut output = open_output(args.output_file.as_deref())?;
    list_devices(&mut output)?;
    output.flush()?;
    Ok(())
}

/// Driver function responsible for initializing the data for the elementwise addition kernel and
/// forwarding it to the dedicated target drivers. It gathers the results for each benchmarked
/// kernel variant and generates an output summary.
pub fn add<T: HarpFloat + OclPrm>(args: CliArgs) -> Result<()> {
    let lengths = match args.kernel {
        KernelCmd::Sadd { ref lengths } | KernelCmd::Dadd { ref lengths } => lengths,
        _ => unreachable!(),
    };

    let ctx = DeviceContext::new(&args.device_config())?;
    let mut host_perf_reports = Vec::new();
    let mut device_perf_reports = Vec::new();

    // Runtime check of the type of `T` (either `f32`, or `f64`)
    let cl_kern = match is_of_type::<f32>(&T::default()) {
        true => &CL_SADD,
        false => &CL_DADD,
    };

    let seed_a = args.seed.unwrap_or_default();
    for &len in lengths {
        info!(len, kernel = cl_kern.name(), "benchmarking elementwise addition");
        let a = T::rand_vector(len, Some(seed_a));
        let b = T::rand_vector(len, Some(seed_a.wrapping_add(1)));
        let mut expected = vec![T::default(); len];
        reference::add(&a, &b, &mut expected);

        for variant in HOST_VARIANTS {
            host_perf_reports.push(host::add(&a, &b, &expected, args.iterations, variant)?);
        }
        device_perf_reports.push(device::ocl_add(
            &ctx,
            cl_kern,
            &a,
            &b,
            &expected,
            args.iterations,
            args.work_group_size,
        )?);
    }

    write_reports(
        args.output_file.as_deref(),
        &host_perf_reports,
        &device_perf_reports,
    )
}

/// Driver function for the 32-bit unsigned integer global sum.
pub fn sum(args: CliArgs) -> Result<()> {
    let lengths = match args.kernel {
        KernelCmd::Sum { ref lengths } => lengths,
        _ => unreachable!(),
    };

    let ctx = DeviceContext::new(&args.device_config())?;
    let mut host_perf_reports = Vec::new();
    let mut device_perf_reports = Vec::new();

    for &len in lengths {
        info!(len, "benchmarking global sum");
        let x = rand_sum_input(len, args.seed.unwrap_or(SUM_SEED));
        let expected = reference::sum(&x);

        for variant in HOST_VARIANTS {
            host_perf_reports.push(host::sum(&x, expected, args.iterations, variant)?);
        }
        for variant in [DeviceKernelVariant::ClAtomic, DeviceKernelVariant::ClTree] {
            device_perf_reports.push(device::ocl_sum(
                &ctx,
                variant,
                &x,
                expected,
                args.iterations,
                args.work_group_size,
            )?);
        }
    }

    write_reports(
        args.output_file.as_deref(),
        &host_perf_reports,
        &device_perf_reports,
    )
}

/// Driver function for the 32-bit integer max prefix sum.
///
/// Without explicit lengths, sweeps every power of two up to `2^max_log2`.
pub fn max_prefix_sum(args: CliArgs) -> Result<()> {
    let lengths = match args.kernel {
        KernelCmd::MaxPrefixSum {
            ref lengths,
            max_log2,
        } => KernelCmd::prefix_sum_lengths(lengths, max_log2),
        _ => unreachable!(),
    };

    let ctx = DeviceContext::new(&args.device_config())?;
    let mut host_perf_reports = Vec::new();
    let mut device_perf_reports = Vec::new();

    for len in lengths {
        let range = prefix_sum_values_range(len);
        info!(len, range, "benchmarking max prefix sum");
        let x = rand_prefix_sum_input(len, range, args.seed);
        let expected = reference::max_prefix_sum(&x);

        for variant in HOST_VARIANTS {
            host_perf_reports.push(host::max_prefix_sum(
                &x,
                &expected,
                args.iterations,
                variant,
                args.work_group_size,
            )?);
        }
        host_perf_reports.push(host::max_prefix_sum(
            &x,
            &expected,
            args.iterations,
            HostKernelVariant::SeqMultiPass,
            args.work_group_size,
        )?);
        let report = device::ocl_max_prefix_sum(
            &ctx,
            &x,
            &expected,
            args.iterations,
            args.work_group_size,
        )?;
        info!(
            len,
            max = expected.max,
            argmax = expected.argmax,
            throughput = report.throughput(),
            bandwidth = report.memory_bandwidth(),
            "GPU results verified"
        );
        device_perf_reports.push(report);
    }

    write_reports(
        args.output_file.as_deref(),
        &host_perf_reports,
        &device_perf_reports,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::{env, fs, process};

    #[test]
    fn reports_are_written_as_csv() {
        let path = env::temp_dir().join(format!("harp-reduce-{}.csv", process::id()));
        let x = rand_prefix_sum_input(1000, 100, Some(4));
        let expected = reference::max_prefix_sum(&x);
        let host_reports: Vec<_> = HOST_VARIANTS
            .into_iter()
            .map(|variant| host::max_prefix_sum(&x, &expected, 2, variant, 256).unwrap())
            .collect();

        write_reports(Some(path.as_path()), &host_reports, &[]).unwrap();
        let csv = fs::read_to_string(&path).unwrap();
        fs::remove_file(&path).unwrap();

        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines.len(), 1 + HOST_VARIANTS.len());
        assert!(lines[0].starts_with("target,kernel,variant,elems,Bytes"));
        assert!(lines[1..]
            .iter()
            .all(|line| line.starts_with("host,max_prefix_sum,")));
    }
}
