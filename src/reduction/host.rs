//! Host emulation of the max prefix sum pass kernel.
//!
//! Buffers are plain vectors and each pass runs [`crate::kernels::host::max_prefix_sum_pass`],
//! which follows the exact contract of the OpenCL kernel. It allows validating the engine's pass
//! loop and buffer rotation without a device.

use super::{PassBackend, PassSeed, PrefixSummary};
use crate::{error::Result, kernels::host};

/// Host-resident buffer set.
#[derive(Clone, Debug, Default)]
pub struct HostTriple {
    sum: Vec<i32>,
    max: Vec<i32>,
    argmax: Vec<u32>,
}

/// Pass backend running on the host.
#[derive(Debug)]
pub struct HostPassBackend {
    group_size: usize,
    allocations: usize,
    work_sizes: Vec<usize>,
}

impl HostPassBackend {
    pub fn new(group_size: usize) -> Self {
        Self {
            group_size,
            allocations: 0,
            work_sizes: Vec::new(),
        }
    }

    /// Number of buffer sets allocated so far.
    pub fn allocations(&self) -> usize {
        self.allocations
    }

    /// Active element count of every pass executed so far.
    pub fn work_sizes(&self) -> &[usize] {
        &self.work_sizes
    }
}

impl PassBackend for HostPassBackend {
    type Triple = HostTriple;

    fn group_size(&self) -> usize {
        self.group_size
    }

    fn allocate(&mut self, capacity: usize) -> Result<HostTriple> {
        self.allocations += 1;
        Ok(HostTriple {
            sum: vec![0; capacity],
            max: vec![0; capacity],
            argmax: vec![0; capacity],
        })
    }

    fn upload(&mut self, triple: &mut HostTriple, seed: &PassSeed) -> Result<()> {
        triple.sum.copy_from_slice(&seed.sum);
        triple.max.copy_from_slice(&seed.max);
        triple.argmax.copy_from_slice(&seed.argmax);
        Ok(())
    }

    fn copy(&mut self, src: &HostTriple, dst: &mut HostTriple, len: usize) -> Result<()> {
        dst.sum[..len].copy_from_slice(&src.sum[..len]);
        dst.max[..len].copy_from_slice(&src.max[..len]);
        dst.argmax[..len].copy_from_slice(&src.argmax[..len]);
        Ok(())
    }

    fn pass(&mut self, input: &HostTriple, output: &mut HostTriple, active: usize) -> Result<()> {
        self.work_sizes.push(active);
        host::max_prefix_sum_pass(
            &input.sum,
            &input.max,
            &input.argmax,
            &mut output.sum,
            &mut output.max,
            &mut output.argmax,
            active,
            self.group_size,
        );
        Ok(())
    }

    fn read_head(&mut self, triple: &HostTriple) -> Result<PrefixSummary> {
        Ok(PrefixSummary {
            sum: triple.sum[0],
            max: triple.max[0],
            argmax: triple.argmax[0],
        })
    }
}
