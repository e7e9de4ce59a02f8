//! OpenCL implementation of the max prefix sum passes.

use super::{PassBackend, PassSeed, PrefixSummary};
use crate::{
    device::DeviceContext,
    error::Result,
    kernels::device::CL_MAX_PREFIX_SUM,
    utils::{round_up, to_cl_uint},
};

use ocl::{Buffer, Event, Kernel, Queue};
use tracing::debug;

/// Device-resident buffer set.
pub struct DeviceTriple {
    sum: Buffer<i32>,
    max: Buffer<i32>,
    argmax: Buffer<u32>,
}

/// Pass backend launching `max_prefix_sum` on an OpenCL device.
///
/// The kernel is compiled once with `WORK_GROUP_SIZE` set to the group size; its buffer arguments
/// are rebound before every pass since the input and output sets alternate.
pub struct ClPassBackend {
    queue: Queue,
    kernel: Kernel,
    group_size: usize,
}

impl ClPassBackend {
    pub fn new(ctx: &DeviceContext, group_size: usize) -> Result<Self> {
        let program = ctx.build_program(&CL_MAX_PREFIX_SUM, group_size)?;
        let kernel = Kernel::builder()
            .program(&program)
            .name(CL_MAX_PREFIX_SUM.name())
            .queue(ctx.queue().clone())
            .arg_named("in_sum", None::<&Buffer<i32>>)
            .arg_named("in_max", None::<&Buffer<i32>>)
            .arg_named("in_argmax", None::<&Buffer<u32>>)
            .arg_named("out_sum", None::<&Buffer<i32>>)
            .arg_named("out_max", None::<&Buffer<i32>>)
            .arg_named("out_argmax", None::<&Buffer<u32>>)
            .arg_named("active_count", 0_u32)
            .build()?;

        Ok(Self {
            queue: ctx.queue().clone(),
            kernel,
            group_size,
        })
    }

    fn buffer<T: ocl::OclPrm + Default>(&self, capacity: usize) -> Result<Buffer<T>> {
        Ok(Buffer::builder()
            .queue(self.queue.clone())
            .len(capacity)
            .fill_val(T::default())
            .build()?)
    }
}

impl PassBackend for ClPassBackend {
    type Triple = DeviceTriple;

    fn group_size(&self) -> usize {
        self.group_size
    }

    fn allocate(&mut self, capacity: usize) -> Result<DeviceTriple> {
        Ok(DeviceTriple {
            sum: self.buffer(capacity)?,
            max: self.buffer(capacity)?,
            argmax: self.buffer(capacity)?,
        })
    }

    fn upload(&mut self, triple: &mut DeviceTriple, seed: &PassSeed) -> Result<()> {
        triple.sum.write(&seed.sum[..]).enq()?;
        triple.max.write(&seed.max[..]).enq()?;
        triple.argmax.write(&seed.argmax[..]).enq()?;
        Ok(())
    }

    fn copy(&mut self, src: &DeviceTriple, dst: &mut DeviceTriple, len: usize) -> Result<()> {
        src.sum.copy(&dst.sum, None, Some(len)).enq()?;
        src.max.copy(&dst.max, None, Some(len)).enq()?;
        src.argmax.copy(&dst.argmax, None, Some(len)).enq()?;
        Ok(())
    }

    fn pass(
        &mut self,
        input: &DeviceTriple,
        output: &mut DeviceTriple,
        active: usize,
    ) -> Result<()> {
        let active_count = to_cl_uint(active)?;
        self.kernel.set_arg("in_sum", &input.sum)?;
        self.kernel.set_arg("in_max", &input.max)?;
        self.kernel.set_arg("in_argmax", &input.argmax)?;
        self.kernel.set_arg("out_sum", &output.sum)?;
        self.kernel.set_arg("out_max", &output.max)?;
        self.kernel.set_arg("out_argmax", &output.argmax)?;
        self.kernel.set_arg("active_count", &active_count)?;

        let global_work_size = round_up(active, self.group_size);
        debug!(active, global_work_size, "launching max_prefix_sum");

        // The next pass reads this pass' output: wait for completion before returning.
        let mut event = Event::empty();
        unsafe {
            self.kernel
                .cmd()
                .global_work_size(global_work_size)
                .local_work_size(self.group_size)
                .enew(&mut event)
                .enq()?;
        }
        event.wait_for().map_err(ocl::Error::from)?;
        Ok(())
    }

    fn read_head(&mut self, triple: &DeviceTriple) -> Result<PrefixSummary> {
        let mut sum = [0_i32];
        let mut max = [0_i32];
        let mut argmax = [0_u32];
        triple.sum.read(&mut sum[..]).enq()?;
        triple.max.read(&mut max[..]).enq()?;
        triple.argmax.read(&mut argmax[..]).enq()?;
        Ok(PrefixSummary {
            sum: sum[0],
            max: max[0],
            argmax: argmax[0],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        device::{DeviceConfig, DeviceContext},
        kernels::host,
        reduction::MaxPrefixSumEngine,
        utils::{prefix_sum_values_range, rand_prefix_sum_input},
    };

    #[test]
    #[ignore = "requires an OpenCL device"]
    fn device_engine_matches_host_reference() {
        let ctx = DeviceContext::new(&DeviceConfig::default()).unwrap();
        for n in [1, 2, 3, 255, 256, 257, 10_000, 1 << 20] {
            let x = rand_prefix_sum_input(n, prefix_sum_values_range(n), None);
            let expected = host::max_prefix_sum(&x);
            let backend = ClPassBackend::new(&ctx, 256).unwrap();
            let mut engine = MaxPrefixSumEngine::new(backend, &x).unwrap();
            for _ in 0..3 {
                let res = engine.reduce().unwrap();
                assert_eq!((res.max, res.argmax), (expected.max, expected.argmax), "n = {n}");
            }
        }
    }

    #[test]
    #[ignore = "requires an OpenCL device"]
    fn device_engine_small_groups() {
        let ctx = DeviceContext::new(&DeviceConfig::default()).unwrap();
        let x = [3, -3, 3, -5, 1, 1, 1, 1, -2];
        let expected = host::max_prefix_sum(&x);
        for group_size in [2, 4, 8] {
            let backend = ClPassBackend::new(&ctx, group_size).unwrap();
            let res = MaxPrefixSumEngine::new(backend, &x)
                .unwrap()
                .reduce()
                .unwrap();
            assert_eq!((res.max, res.argmax), (expected.max, expected.argmax));
        }
    }
}
