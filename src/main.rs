//! harp-reduce - GPU reduction benchmarking harness
//!
//! # About
//! harp-reduce runs small data-parallel kernels on an OpenCL device, checks every result against
//! CPU implementations and reports the achieved throughput and memory bandwidth. It covers:
//! - elementwise addition (`c = a + b`) in single and double precision;
//! - global sum of 32-bit unsigned integers (atomic and work-group tree variants);
//! - max prefix sum of 32-bit integers, computed by a multi-pass tournament reduction that folds
//!   groups of (sum, max, argmax) triples until a single one describes the whole input.
//!
//! # Quickstart
//! ## Pre-requisites
//! Make sure an [OpenCL 1.2+][1] library and at least one platform (ICD) are installed on your
//! system before beginning.
//!
//! ## Build
//! As any Rust-based project, harp-reduce is built and run with `cargo`:
//! ```sh
//! cargo build --release
//! ```
//!
//! ## Help
//! To see the help usage:
//! ```sh
//! cargo run -- help
//!
//! Usage: harp-reduce [OPTIONS] <COMMAND>
//!
//! Commands:
//!   devices         List the available OpenCL platforms and devices
//!   sadd            Single-precision elementwise addition: `c = a + b`
//!   dadd            Double-precision elementwise addition: `c = a + b`
//!   sum             32-bit unsigned integer global sum
//!   max-prefix-sum  32-bit integer max prefix sum (multi-pass reduction)
//!   help            Print this message or the help of the given subcommand(s)
//! ```
//!
//! ## Example run
//! To sweep the max prefix sum over every power of two up to 2^20 on the second device:
//! ```sh
//! cargo run --release -- --device 1 max-prefix-sum --max-log2 20
//! ```
//!
//! Reports are written as CSV to `stdout` (or `--output-file`); logs go to `stderr` and are
//! filtered with `RUST_LOG` (defaults to `info`).
//!
//! [1]: https://www.khronos.org/opencl/

pub mod cli;
pub mod consts;
pub mod device;
pub mod drivers;
pub mod error;
pub mod kernels;
pub mod perf_report;
pub mod reduction;
pub mod utils;

use crate::cli::{CliArgs, KernelCmd};

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use std::process::ExitCode;

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    setup_logging();
    let args = CliArgs::parse();

    let res = match args.kernel {
        KernelCmd::Devices => drivers::devices(args),
        KernelCmd::Sadd { .. } => drivers::add::<f32>(args),
        KernelCmd::Dadd { .. } => drivers::add::<f64>(args),
        KernelCmd::Sum { .. } => drivers::sum(args),
        KernelCmd::MaxPrefixSum { .. } => drivers::max_prefix_sum(args),
    };

    match res {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
