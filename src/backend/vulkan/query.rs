use std::sync::Arc;

use anyhow::Result;
use ash::vk;

/// A single timestamp query. Each query owns a one-entry `VkQueryPool`, reset right before it is written.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct VulkanTimestampQuery {
    #[derivative(Debug = "ignore")]
    device: Arc<ash::Device>,
    pool: vk::QueryPool,
}

impl VulkanTimestampQuery {
    pub(crate) fn new(device: Arc<ash::Device>) -> Result<Self> {
        let info = vk::QueryPoolCreateInfo::builder()
            .query_type(vk::QueryType::TIMESTAMP)
            .query_count(1);
        let pool = unsafe { device.create_query_pool(&info, None)? };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkQueryPool {pool:p}");
        Ok(Self {
            device,
            pool,
        })
    }

    pub fn pool(&self) -> vk::QueryPool {
        self.pool
    }

    /// Raw tick value, or `None` if the GPU has not written it yet.
    pub(crate) fn read_ticks(&self) -> Result<Option<u64>> {
        let mut data = [0u64; 1];
        let result = unsafe {
            self.device
                .get_query_pool_results(self.pool, 0, 1, &mut data, vk::QueryResultFlags::TYPE_64)
        };
        match result {
            Ok(()) => Ok(Some(data[0])),
            Err(vk::Result::NOT_READY) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

impl Drop for VulkanTimestampQuery {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkQueryPool {:p}", self.pool);
        unsafe {
            self.device.destroy_query_pool(self.pool, None);
        }
    }
}

/// Converts raw timestamps into nanoseconds.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TimestampConverter {
    /// Nanoseconds per tick.
    pub period: f32,
    pub valid_bits: u32,
}

impl TimestampConverter {
    pub fn nanoseconds(&self, ticks: u64) -> u64 {
        // Bits above `valid_bits` are undefined
        let mask = match self.valid_bits {
            0 | 64.. => u64::MAX,
            bits => u64::MAX >> (u64::BITS - bits),
        };
        ((ticks & mask) as f64 * self.period as f64) as u64
    }
}
