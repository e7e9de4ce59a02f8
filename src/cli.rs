//! Command-Line Interface related code.
//!
//! Command-line arguments are parsed with the [`clap`][1] crate. Global options (iterations,
//! work-group size, seed, output file and device selection) come before the kernel subcommand;
//! every default lives in [`crate::consts`].
//!
//! [1]: https://crates.io/crates/clap

use crate::{consts, device::DeviceConfig};

use clap::{Parser, Subcommand};

use std::path::PathBuf;

/// GPU reduction benchmarking harness.
///
/// Runs elementwise addition, global sum and max prefix sum kernels on an OpenCL device, checks
/// every result against CPU implementations (serial and parallel) and reports their throughput
/// and memory bandwidth.
#[derive(Clone, Debug, Parser)]
#[command(name = "harp-reduce")]
pub struct CliArgs {
    /// Number of timed iterations per configuration.
    #[arg(
        short,
        long,
        value_name = "ITERS",
        default_value_t = consts::BENCHMARKING_ITERATIONS,
        value_parser = clap::value_parser!(u8).range(2..u8::MAX.into()),
    )]
    pub iterations: u8,

    /// Work-group size of the device kernels.
    #[arg(
        short = 'g',
        long,
        value_name = "SIZE",
        default_value_t = consts::WORK_GROUP_SIZE,
        value_parser = parse_work_group_size,
    )]
    pub work_group_size: usize,

    /// Kernel command to run.
    #[command(subcommand)]
    pub kernel: KernelCmd,

    /// Output file, defaults to `stdout` if unspecified.
    #[arg(short, long)]
    pub output_file: Option<PathBuf>,

    /// Seed for the random number generator (RNG).
    #[arg(short, long, value_name = "SEED")]
    pub seed: Option<u64>,

    /// Index of the OpenCL platform to use (see the `devices` command).
    #[arg(short, long, value_name = "INDEX")]
    pub platform: Option<usize>,

    /// Index of the OpenCL device to use, among the devices of the selected platform if any.
    /// Defaults to the first GPU.
    #[arg(short, long, value_name = "INDEX")]
    pub device: Option<usize>,
}

impl CliArgs {
    /// Device selection requested on the command line.
    pub fn device_config(&self) -> DeviceConfig {
        DeviceConfig {
            platform: self.platform,
            device: self.device,
        }
    }
}

/// List of available kernels to profile.
#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum KernelCmd {
    /// List the available OpenCL platforms and devices
    Devices,
    /// Single-precision elementwise addition: `c = a + b`
    Sadd {
        /// Lengths of the vectors.
        #[arg(
            short,
            long,
            required = true,
            num_args = 1..,
            value_parser = parse_length,
        )]
        lengths: Vec<usize>,
    },
    /// Double-precision elementwise addition: `c = a + b`
    Dadd {
        /// Lengths of the vectors.
        #[arg(
            short,
            long,
            required = true,
            num_args = 1..,
            value_parser = parse_length,
        )]
        lengths: Vec<usize>,
    },
    /// 32-bit unsigned integer global sum
    Sum {
        /// Lengths of the input.
        #[arg(
            short,
            long,
            num_args = 1..,
            default_values_t = [consts::SUM_LENGTH],
            value_parser = parse_length,
        )]
        lengths: Vec<usize>,
    },
    /// 32-bit integer max prefix sum (multi-pass reduction)
    MaxPrefixSum {
        /// Explicit lengths of the input, replacing the power-of-two sweep.
        #[arg(
            short,
            long,
            num_args = 1..,
            value_parser = parse_length,
        )]
        lengths: Vec<usize>,
        /// Sweep the lengths 2, 4, ..., 2^MAX_LOG2.
        #[arg(
            short,
            long,
            value_name = "MAX_LOG2",
            default_value_t = consts::MAX_PREFIX_SUM_MAX_LOG2,
            value_parser = clap::value_parser!(u8).range(1..=30),
            conflicts_with = "lengths",
        )]
        max_log2: u8,
    },
}

impl KernelCmd {
    /// Lengths benchmarked by the max prefix sum command.
    pub fn prefix_sum_lengths(lengths: &[usize], max_log2: u8) -> Vec<usize> {
        if lengths.is_empty() {
            (1..=max_log2).map(|log2| 1 << log2).collect()
        } else {
            lengths.to_vec()
        }
    }
}

fn parse_length(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("length must be at least 1".into()),
        Ok(len) if u32::try_from(len).is_err() => {
            Err(format!("length must not exceed {}", u32::MAX))
        }
        Ok(len) => Ok(len),
        Err(err) => Err(err.to_string()),
    }
}

fn parse_work_group_size(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(size) if (2..=4096).contains(&size) => Ok(size),
        Ok(_) => Err("work-group size must be between 2 and 4096".into()),
        Err(err) => Err(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = CliArgs::try_parse_from(["harp-reduce", "max-prefix-sum"]).unwrap();
        assert_eq!(args.iterations, consts::BENCHMARKING_ITERATIONS);
        assert_eq!(args.work_group_size, consts::WORK_GROUP_SIZE);
        assert_eq!(args.device_config(), DeviceConfig::default());
        match args.kernel {
            KernelCmd::MaxPrefixSum { lengths, max_log2 } => {
                assert!(lengths.is_empty());
                assert_eq!(max_log2, consts::MAX_PREFIX_SUM_MAX_LOG2);
                let sweep = KernelCmd::prefix_sum_lengths(&lengths, max_log2);
                assert_eq!(sweep.first(), Some(&2));
                assert_eq!(sweep.last(), Some(&(1 << 24)));
                assert_eq!(sweep.len(), 24);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn sum_default_length() {
        let args = CliArgs::try_parse_from(["harp-reduce", "sum"]).unwrap();
        assert_eq!(
            args.kernel,
            KernelCmd::Sum {
                lengths: vec![consts::SUM_LENGTH]
            }
        );
    }

    #[test]
    fn device_selection_and_options() {
        let args = CliArgs::try_parse_from([
            "harp-reduce",
            "-p",
            "1",
            "-d",
            "2",
            "-g",
            "64",
            "-i",
            "20",
            "-s",
            "7",
            "sadd",
            "-l",
            "1000",
            "2000",
        ])
        .unwrap();
        assert_eq!(
            args.device_config(),
            DeviceConfig {
                platform: Some(1),
                device: Some(2)
            }
        );
        assert_eq!(args.work_group_size, 64);
        assert_eq!(args.iterations, 20);
        assert_eq!(args.seed, Some(7));
        assert_eq!(
            args.kernel,
            KernelCmd::Sadd {
                lengths: vec![1000, 2000]
            }
        );
    }

    #[test]
    fn rejects_invalid_values() {
        let invalid: [&[&str]; 6] = [
            &["harp-reduce", "-g", "1", "sum"],
            &["harp-reduce", "-i", "1", "sum"],
            &["harp-reduce", "sum", "-l", "0"],
            &["harp-reduce", "dadd"],
            &["harp-reduce", "max-prefix-sum", "-m", "31"],
            &["harp-reduce", "max-prefix-sum", "-m", "4", "-l", "5"],
        ];
        for argv in invalid {
            assert!(
                CliArgs::try_parse_from(argv.iter().copied()).is_err(),
                "{argv:?}"
            );
        }
    }

    #[test]
    fn explicit_prefix_sum_lengths() {
        assert_eq!(KernelCmd::prefix_sum_lengths(&[3, 5], 24), vec![3, 5]);
        assert_eq!(KernelCmd::prefix_sum_lengths(&[], 3), vec![2, 4, 8]);
    }
}
