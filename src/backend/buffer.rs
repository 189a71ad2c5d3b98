// GPU buffer helpers
//
// Buffers are backed by gpu-allocator allocations. The upload path used by
// the demo is fully synchronous: stage, copy, fence wait.

use anyhow::{Context, Result};
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use std::sync::Arc;

use super::VulkanDevice;

/// A Vulkan buffer together with its memory allocation.
pub struct Buffer {
    pub buffer: vk::Buffer,
    allocation: Option<Allocation>,
    pub size: vk::DeviceSize,
    device: Arc<VulkanDevice>,
}

impl Buffer {
    pub fn new(
        device: &Arc<VulkanDevice>,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        name: &str,
    ) -> Result<Self> {
        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe {
            device
                .device
                .create_buffer(&buffer_info, None)
                .context("Failed to create buffer")?
        };

        let requirements = unsafe { device.device.get_buffer_memory_requirements(buffer) };

        let allocation = device.allocator().allocate(&AllocationCreateDesc {
            name,
            requirements,
            location,
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;

        unsafe {
            device
                .device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
                .context("Failed to bind buffer memory")?;
        }

        Ok(Self {
            buffer,
            allocation: Some(allocation),
            size,
            device: device.clone(),
        })
    }

    /// Write `data` into a host-visible buffer through its persistent mapping.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        let allocation = self
            .allocation
            .as_mut()
            .context("Buffer has no allocation")?;
        let mapped = allocation
            .mapped_slice_mut()
            .context("Buffer memory is not host-visible")?;
        mapped[..data.len()].copy_from_slice(data);
        Ok(())
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            let _ = self.device.allocator().free(allocation);
        }
        unsafe {
            self.device.device.destroy_buffer(self.buffer, None);
        }
    }
}

/// Create a device-local buffer and fill it with `data`.
///
/// The copy goes through a staging buffer and a one-time command buffer
/// submitted to the graphics queue. The function blocks on a fence until the
/// device has finished the transfer, so the buffer is fully uploaded when it
/// returns.
pub fn upload_to_device_local<T: bytemuck::Pod>(
    device: &Arc<VulkanDevice>,
    command_pool: vk::CommandPool,
    usage: vk::BufferUsageFlags,
    data: &[T],
    name: &str,
) -> Result<Buffer> {
    let bytes: &[u8] = bytemuck::cast_slice(data);
    let size = bytes.len() as vk::DeviceSize;

    let mut staging = Buffer::new(
        device,
        size,
        vk::BufferUsageFlags::TRANSFER_SRC,
        MemoryLocation::CpuToGpu,
        "staging",
    )?;
    staging.write(bytes)?;

    let buffer = Buffer::new(
        device,
        size,
        usage | vk::BufferUsageFlags::TRANSFER_DST,
        MemoryLocation::GpuOnly,
        name,
    )?;

    // Record and submit the copy, then wait on the host for completion
    let alloc_info = vk::CommandBufferAllocateInfo::default()
        .command_pool(command_pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(1);

    let cmd = unsafe { device.device.allocate_command_buffers(&alloc_info)? }[0];

    let fence = unsafe {
        device
            .device
            .create_fence(&vk::FenceCreateInfo::default(), None)?
    };

    let result = (|| -> Result<()> {
        unsafe {
            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device.device.begin_command_buffer(cmd, &begin_info)?;

            let region = vk::BufferCopy::default().size(size);
            device
                .device
                .cmd_copy_buffer(cmd, staging.buffer, buffer.buffer, &[region]);

            device.device.end_command_buffer(cmd)?;

            let command_buffers = [cmd];
            let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
            device
                .device
                .queue_submit(device.graphics_queue, &[submit_info], fence)?;

            device
                .device
                .wait_for_fences(&[fence], true, u64::MAX)
                .context("Timed out waiting for buffer upload")?;
        }
        Ok(())
    })();

    unsafe {
        device.device.destroy_fence(fence, None);
        device.device.free_command_buffers(command_pool, &[cmd]);
    }

    result?;
    Ok(buffer)
}
