//! Benchmark reports.
//!
//! A [`PerfReport`] summarizes the timed iterations of one (target, kernel, variant, length)
//! configuration: runtime statistics, throughput in millions of elements per second and memory
//! bandwidth in GiB/s, the latter from the bytes each kernel moves ([`KernelKind::nb_bytes`]).
//! Reports are printed as CSV lines matching [`PerfReport::print_csv_header`].

use statistical::{mean, standard_deviation};

use std::{fmt, io::Write, mem::size_of};

/// Where a kernel runs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TargetKind {
    Host,
    Device,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => write!(f, "host"),
            Self::Device => write!(f, "device"),
        }
    }
}

/// List of implemented kernels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum KernelKind {
    Sadd,
    Dadd,
    Sum,
    MaxPrefixSum,
}

impl KernelKind {
    /// Number of bytes moved by one run of the kernel over `nb_elems` elements.
    pub fn nb_bytes(&self, nb_elems: usize) -> usize {
        match self {
            // Two inputs and one output.
            Self::Sadd => 3 * size_of::<f32>() * nb_elems,
            Self::Dadd => 3 * size_of::<f64>() * nb_elems,
            Self::Sum => size_of::<u32>() * nb_elems,
            // Sum, max and argmax buffers.
            Self::MaxPrefixSum => (2 * size_of::<i32>() + size_of::<u32>()) * nb_elems,
        }
    }
}

impl fmt::Display for KernelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sadd => write!(f, "sadd"),
            Self::Dadd => write!(f, "dadd"),
            Self::Sum => write!(f, "sum"),
            Self::MaxPrefixSum => write!(f, "max_prefix_sum"),
        }
    }
}

/// Marker trait for kernel implementations.
pub trait KernelVariant {}

/// Host-specific possible kernel implementations.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum HostKernelVariant {
    SeqNaive,
    SeqIter,
    ParIter,
    SeqMultiPass,
}

impl KernelVariant for HostKernelVariant {}

impl fmt::Display for HostKernelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SeqNaive => write!(f, "Sequential naive"),
            Self::SeqIter => write!(f, "Sequential w/ iterators"),
            Self::ParIter => write!(f, "Parallel w/ iterators"),
            Self::SeqMultiPass => write!(f, "Sequential multi-pass"),
        }
    }
}

/// Device-specific possible kernel implementations.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DeviceKernelVariant {
    ClNaive,
    ClAtomic,
    ClTree,
    ClMultiPass,
}

impl KernelVariant for DeviceKernelVariant {}

impl fmt::Display for DeviceKernelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClNaive => write!(f, "OpenCL naive"),
            Self::ClAtomic => write!(f, "OpenCL atomic"),
            Self::ClTree => write!(f, "OpenCL work-group tree"),
            Self::ClMultiPass => write!(f, "OpenCL multi-pass"),
        }
    }
}

/// Performance information and statistics of a benchmark.
#[derive(Debug)]
pub struct PerfReport<V> {
    /// Target platform: either `Host` or `Device`.
    target: TargetKind,
    /// Benchmarked kernel.
    kernel: KernelKind,
    /// Implementation variant of the kernel.
    variant: V,
    /// Number of processed elements.
    nb_elems: usize,
    /// Size in bytes.
    nb_bytes: usize,
    /// Minimum recorded runtime in milliseconds.
    min_time: f64,
    /// Median recorded runtime in milliseconds.
    median_time: f64,
    /// Maximum recorded runtime in milliseconds.
    max_time: f64,
    /// Average runtime in milliseconds.
    avg_time: f64,
    /// Runtime standard deviation in milliseconds.
    stddev_time: f64,
    /// Throughput in millions of elements per second.
    throughput: f64,
    /// Memory bandwidth in GiB/s.
    memory_bandwidth: f64,
}

impl<V> PerfReport<V> {
    pub fn print_csv_header(output: &mut dyn Write) -> std::io::Result<()> {
        writeln!(
            output,
            "target,kernel,variant,elems,Bytes,min_runtime,median_runtime,max_runtime,avg_runtime,stddev,Melems/s,GiB/s"
        )
    }

    pub fn throughput(&self) -> f64 {
        self.throughput
    }

    pub fn memory_bandwidth(&self) -> f64 {
        self.memory_bandwidth
    }

    pub fn nb_bytes(&self) -> usize {
        self.nb_bytes
    }
}

impl<V> PerfReport<V>
where
    V: KernelVariant,
{
    /// Creates a new `PerfReport` given a target, a kernel, its variant, the number of processed
    /// elements and the recorded execution times (in seconds).
    pub fn new(
        target: TargetKind,
        kernel: KernelKind,
        variant: V,
        nb_elems: usize,
        durations: &mut [f64],
    ) -> Self {
        // Sort durations to avoid having to do two passes to get both min and max elements
        durations.sort_by(|a, b| a.total_cmp(b));

        let min_time = durations.first().copied().unwrap_or_default() * 1e3;
        let median_time = durations
            .get(durations.len() / 2)
            .copied()
            .unwrap_or_default()
            * 1e3;
        let max_time = durations.last().copied().unwrap_or_default() * 1e3;
        let avg_time = if durations.is_empty() {
            0.0
        } else {
            mean(durations)
        };
        let stddev_time = if durations.len() < 2 {
            0.0
        } else {
            standard_deviation(durations, Some(avg_time))
        };

        let nb_bytes = kernel.nb_bytes(nb_elems);
        let (throughput, memory_bandwidth) = if avg_time > 0.0 {
            (
                nb_elems as f64 / 1e6 / avg_time,
                nb_bytes as f64 / 1024_f64.powi(3) / avg_time,
            )
        } else {
            (0.0, 0.0)
        };

        Self {
            target,
            kernel,
            variant,
            nb_elems,
            nb_bytes,
            min_time,
            median_time,
            max_time,
            avg_time: avg_time * 1e3,
            stddev_time: stddev_time * 1e3,
            throughput,
            memory_bandwidth,
        }
    }
}

impl<V: fmt::Display> fmt::Display for PerfReport<V>
where
    V: KernelVariant,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{},{:18.15},{:18.15},{:18.15},{:18.15},{},{},{}",
            self.target,
            self.kernel,
            self.variant,
            self.nb_elems,
            self.nb_bytes,
            self.min_time,
            self.median_time,
            self.max_time,
            self.avg_time,
            self.stddev_time,
            self.throughput,
            self.memory_bandwidth,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_per_kernel() {
        assert_eq!(KernelKind::Sadd.nb_bytes(10), 120);
        assert_eq!(KernelKind::Dadd.nb_bytes(10), 240);
        assert_eq!(KernelKind::Sum.nb_bytes(10), 40);
        assert_eq!(KernelKind::MaxPrefixSum.nb_bytes(10), 120);
    }

    #[test]
    fn throughput_and_bandwidth() {
        let mut durations = [0.5, 0.25, 0.75, 0.5];
        let report = PerfReport::new(
            TargetKind::Device,
            KernelKind::Sum,
            DeviceKernelVariant::ClTree,
            1 << 28,
            &mut durations,
        );
        assert_eq!(durations, [0.25, 0.5, 0.5, 0.75]);
        // 2^28 u32 in 0.5 s on average.
        assert!((report.memory_bandwidth() - 2.0).abs() < 1e-9);
        assert!((report.throughput() - 268.435456 * 2.0).abs() < 1e-6);
        assert_eq!(report.nb_bytes(), 1 << 30);
    }

    #[test]
    fn csv_line_matches_header() {
        let mut header = Vec::new();
        PerfReport::<()>::print_csv_header(&mut header).unwrap();
        let header = String::from_utf8(header).unwrap();

        let report = PerfReport::new(
            TargetKind::Host,
            KernelKind::MaxPrefixSum,
            HostKernelVariant::ParIter,
            1024,
            &mut [1e-3, 2e-3, 3e-3],
        );
        let line = report.to_string();
        assert_eq!(
            line.split(',').count(),
            header.trim_end().split(',').count()
        );
        assert!(line.starts_with("host,max_prefix_sum,Parallel w/ iterators,1024,12288,"));
    }
}
