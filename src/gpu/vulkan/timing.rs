use ash::vk;

use crate::gpu::error::{GpuError, Result};

/// Two-timestamp query pool bracketing one submission.
pub(crate) struct GpuTimer {
    pool: vk::QueryPool,
}

impl GpuTimer {
    pub(crate) fn new(device: &ash::Device) -> Result<Self, GpuError> {
        let info = vk::QueryPoolCreateInfo::builder()
            .query_count(2)
            .query_type(vk::QueryType::TIMESTAMP)
            .build();
        let pool = unsafe { device.create_query_pool(&info, None)? };
        Ok(Self { pool })
    }

    pub(crate) unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_query_pool(self.pool, None);
    }

    pub(crate) unsafe fn begin(&self, device: &ash::Device, cmd: vk::CommandBuffer) {
        device.cmd_reset_query_pool(cmd, self.pool, 0, 2);
        device.cmd_write_timestamp(cmd, vk::PipelineStageFlags::TOP_OF_PIPE, self.pool, 0);
    }

    pub(crate) unsafe fn end(&self, device: &ash::Device, cmd: vk::CommandBuffer) {
        device.cmd_write_timestamp(cmd, vk::PipelineStageFlags::BOTTOM_OF_PIPE, self.pool, 1);
    }

    /// Milliseconds between the two timestamps.
    pub(crate) fn resolve(&self, device: &ash::Device, period: f32) -> Result<f32, GpuError> {
        let mut data = [0u64; 2];
        unsafe {
            device.get_query_pool_results(
                self.pool,
                0,
                2,
                &mut data,
                vk::QueryResultFlags::TYPE_64 | vk::QueryResultFlags::WAIT,
            )?;
        }
        let diff = data[1].saturating_sub(data[0]);
        Ok(diff as f32 * period / 1_000_000.0)
    }
}
