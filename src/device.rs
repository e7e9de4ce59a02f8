//! OpenCL device selection and context management.
//!
//! Devices are numbered in enumeration order: every device of the first platform, then every
//! device of the second one, and so on. When a platform is given, only its devices are numbered.
//! Without an explicit device, the first GPU is chosen, falling back to the first device.
//!
//! All handles are owned by [`DeviceContext`] and released by `ocl` when it is dropped.

use crate::{
    error::{HarpError, Result},
    kernels::device::DeviceKernel,
};

use ocl::{
    enums::{DeviceInfo, DeviceInfoResult},
    flags::DeviceType,
    Context, Device, Platform, Program, Queue,
};
use tracing::info;

use std::io::Write;

/// Which platform and device to run on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Index of the platform, all platforms if unspecified.
    pub platform: Option<usize>,
    /// Index of the device among the devices of the selected platform(s).
    pub device: Option<usize>,
}

/// Context and in-order command queue bound to a single device.
pub struct DeviceContext {
    platform: Platform,
    device: Device,
    context: Context,
    queue: Queue,
}

fn device_info(device: &Device, kind: DeviceInfo) -> Result<DeviceInfoResult> {
    Ok(device.info(kind).map_err(ocl::Error::from)?)
}

fn is_gpu(device: &Device) -> bool {
    matches!(
        device_info(device, DeviceInfo::Type),
        Ok(DeviceInfoResult::Type(kind)) if kind.contains(DeviceType::GPU)
    )
}

/// Lists the (platform, device) pairs eligible for selection.
fn candidates(only: Option<usize>) -> Result<Vec<(Platform, Device)>> {
    let platforms = Platform::list();
    if let Some(index) = only {
        if index >= platforms.len() {
            return Err(HarpError::InvalidConfig(format!(
                "no OpenCL platform at index {index} ({} available)",
                platforms.len()
            )));
        }
    }

    let mut candidates = Vec::new();
    for (index, platform) in platforms.into_iter().enumerate() {
        if only.is_some_and(|wanted| wanted != index) {
            continue;
        }
        for device in Device::list_all(&platform).map_err(ocl::Error::from)? {
            candidates.push((platform, device));
        }
    }
    Ok(candidates)
}

impl DeviceContext {
    /// Selects a device according to `config` and creates a context and a queue for it.
    pub fn new(config: &DeviceConfig) -> Result<Self> {
        let candidates = candidates(config.platform)?;
        let (platform, device) = match config.device {
            Some(index) => candidates.get(index).cloned().ok_or_else(|| {
                HarpError::InvalidConfig(format!(
                    "no OpenCL device at index {index} ({} available)",
                    candidates.len()
                ))
            })?,
            None => candidates
                .iter()
                .find(|(_, device)| is_gpu(device))
                .or_else(|| candidates.first())
                .cloned()
                .ok_or_else(|| HarpError::InvalidConfig("no OpenCL device available".into()))?,
        };

        let context = Context::builder()
            .platform(platform)
            .devices(device)
            .build()?;
        let queue = Queue::new(&context, device, None)?;

        let ctx = Self {
            platform,
            device,
            context,
            queue,
        };
        info!(
            device = %ctx.device_name()?,
            platform = %ctx.platform.name().map_err(ocl::Error::from)?,
            "selected OpenCL device"
        );
        Ok(ctx)
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    pub fn device_name(&self) -> Result<String> {
        Ok(self.device.name().map_err(ocl::Error::from)?)
    }

    /// Compiles `kernel` for the selected device, defining `WORK_GROUP_SIZE`.
    ///
    /// A build failure carries the compiler log.
    pub fn build_program(&self, kernel: &DeviceKernel, work_group_size: usize) -> Result<Program> {
        let work_group_size = i32::try_from(work_group_size).map_err(|_| {
            HarpError::InvalidConfig(format!("work-group size {work_group_size} is too large"))
        })?;
        Ok(Program::builder()
            .src(kernel.source())
            .devices(self.device)
            .cmplr_def("WORK_GROUP_SIZE", work_group_size)
            .build(&self.context)?)
    }
}

/// Prints every platform and device with their main capabilities.
pub fn list_devices(output: &mut dyn Write) -> Result<()> {
    let platforms = Platform::list();
    writeln!(output, "Number of OpenCL platforms: {}", platforms.len())?;

    let mut device_index = 0;
    for (platform_index, platform) in platforms.iter().enumerate() {
        writeln!(output, "Platform #{platform_index}")?;
        writeln!(
            output,
            "    Platform name: {}",
            platform.name().map_err(ocl::Error::from)?
        )?;
        writeln!(
            output,
            "    Platform vendor: {}",
            platform.vendor().map_err(ocl::Error::from)?
        )?;

        let devices = Device::list_all(platform).map_err(ocl::Error::from)?;
        writeln!(output, "    Number of OpenCL devices: {}", devices.len())?;
        for (local_index, device) in devices.iter().enumerate() {
            writeln!(
                output,
                "    Device #{local_index} (global #{device_index}): {}",
                device.name().map_err(ocl::Error::from)?
            )?;
            writeln!(
                output,
                "        Type: {}",
                device_info(device, DeviceInfo::Type)?
            )?;
            if let DeviceInfoResult::GlobalMemSize(bytes) =
                device_info(device, DeviceInfo::GlobalMemSize)?
            {
                writeln!(output, "        Global memory size: {} MB", bytes / 1024 / 1024)?;
            }
            if let DeviceInfoResult::MaxMemAllocSize(bytes) =
                device_info(device, DeviceInfo::MaxMemAllocSize)?
            {
                writeln!(
                    output,
                    "        Max memory alloc size: {} MB",
                    bytes / 1024 / 1024
                )?;
            }
            if let DeviceInfoResult::MaxWorkGroupSize(size) =
                device_info(device, DeviceInfo::MaxWorkGroupSize)?
            {
                writeln!(output, "        Max work group size: {size}")?;
            }
            device_index += 1;
        }
    }
    Ok(())
}
