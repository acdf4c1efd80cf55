// GPU buffers and the depth attachment
//
// Buffer memory comes from gpu-allocator. Host-visible buffers are written
// through their persistent mapping, device-local buffers go through a
// staging copy on the graphics queue.

use super::VulkanDevice;
use anyhow::{Context, Result};
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;

/// A vk::Buffer together with its backing allocation
pub struct AllocatedBuffer {
    pub buffer: vk::Buffer,
    allocation: Option<Allocation>,
    pub size: vk::DeviceSize,
}

impl AllocatedBuffer {
    pub fn new(
        device: &VulkanDevice,
        name: &str,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
    ) -> Result<Self> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.device.create_buffer(&buffer_info, None) }
            .context("Failed to create buffer")?;

        let requirements = unsafe { device.device.get_buffer_memory_requirements(buffer) };

        let allocation = device.allocate(&AllocationCreateDesc {
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
        }
        .context("Failed to bind buffer memory")?;

        Ok(Self {
            buffer,
            allocation: Some(allocation),
            size,
        })
    }

    /// Copy `data` into a host-visible buffer through its mapping
    pub fn write<T: Copy>(&mut self, data: &[T]) -> Result<()> {
        let byte_count = std::mem::size_of_val(data);
        if byte_count as vk::DeviceSize > self.size {
            anyhow::bail!(
                "Write of {} bytes exceeds buffer size {}",
                byte_count,
                self.size
            );
        }

        let allocation = self
            .allocation
            .as_ref()
            .context("Buffer already destroyed")?;
        let mapping = allocation
            .mapped_ptr()
            .context("Buffer is not host-visible")?;

        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr() as *const u8,
                mapping.as_ptr() as *mut u8,
                byte_count,
            );
        }
        Ok(())
    }

    pub fn destroy(&mut self, device: &VulkanDevice) {
        if let Some(allocation) = self.allocation.take() {
            if let Err(e) = device.free_allocation(allocation) {
                log::warn!("Failed to free buffer allocation: {:#}", e);
            }
        }
        unsafe { device.device.destroy_buffer(self.buffer, None) };
        self.buffer = vk::Buffer::null();
    }
}

/// Upload `data` into a device-local buffer via a staging copy
pub fn create_device_local_buffer<T: Copy>(
    device: &VulkanDevice,
    command_pool: vk::CommandPool,
    name: &str,
    usage: vk::BufferUsageFlags,
    data: &[T],
) -> Result<AllocatedBuffer> {
    let size = std::mem::size_of_val(data) as vk::DeviceSize;

    let mut staging = AllocatedBuffer::new(
        device,
        "staging",
        size,
        vk::BufferUsageFlags::TRANSFER_SRC,
        MemoryLocation::CpuToGpu,
    )?;
    staging.write(data)?;

    let mut buffer = AllocatedBuffer::new(
        device,
        name,
        size,
        usage | vk::BufferUsageFlags::TRANSFER_DST,
        MemoryLocation::GpuOnly,
    )?;

    let copied = copy_buffer(device, command_pool, staging.buffer, buffer.buffer, size);
    staging.destroy(device);
    match copied {
        Ok(()) => Ok(buffer),
        Err(e) => {
            buffer.destroy(device);
            Err(e)
        }
    }
}

/// Record and submit a one-shot copy, then wait for the graphics queue.
/// The wait keeps the staging buffer valid until the transfer has finished.
fn copy_buffer(
    device: &VulkanDevice,
    command_pool: vk::CommandPool,
    src: vk::Buffer,
    dst: vk::Buffer,
    size: vk::DeviceSize,
) -> Result<()> {
    let alloc_info = vk::CommandBufferAllocateInfo::builder()
        .command_pool(command_pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(1);

    let command_buffer = unsafe { device.device.allocate_command_buffers(&alloc_info) }?[0];

    let begin_info =
        vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

    unsafe {
        device
            .device
            .begin_command_buffer(command_buffer, &begin_info)?;
        let region = vk::BufferCopy::builder().size(size).build();
        device
            .device
            .cmd_copy_buffer(command_buffer, src, dst, &[region]);
        device.device.end_command_buffer(command_buffer)?;

        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);
        device.device.queue_submit(
            device.graphics_queue,
            &[submit_info.build()],
            vk::Fence::null(),
        )?;
        device.device.queue_wait_idle(device.graphics_queue)?;

        device
            .device
            .free_command_buffers(command_pool, &command_buffers);
    }
    Ok(())
}

/// Depth attachment matching the swapchain extent
pub struct DepthBuffer {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub format: vk::Format,
    allocation: Option<Allocation>,
}

impl DepthBuffer {
    /// First depth format the GPU supports for optimal-tiling attachments
    pub fn find_format(device: &VulkanDevice) -> Result<vk::Format> {
        let candidates = [
            vk::Format::D32_SFLOAT,
            vk::Format::D32_SFLOAT_S8_UINT,
            vk::Format::D24_UNORM_S8_UINT,
        ];

        candidates
            .into_iter()
            .find(|&format| {
                let props = unsafe {
                    device
                        .instance
                        .get_physical_device_format_properties(device.physical_device, format)
                };
                props
                    .optimal_tiling_features
                    .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
            })
            .context("No supported depth format")
    }

    pub fn new(device: &VulkanDevice, extent: vk::Extent2D) -> Result<Self> {
        let format = Self::find_format(device)?;

        // Create depth image
        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let image = unsafe { device.device.create_image(&image_info, None) }
            .context("Failed to create depth image")?;

        let requirements = unsafe { device.device.get_image_memory_requirements(image) };

        let allocation = device.allocate(&AllocationCreateDesc {
            name: "depth buffer",
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;

        unsafe {
            device
                .device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
        }
        .context("Failed to bind depth image memory")?;

        // Create image view
        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::DEPTH,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        let view = unsafe { device.device.create_image_view(&view_info, None) }
            .context("Failed to create depth image view")?;

        Ok(Self {
            image,
            view,
            format,
            allocation: Some(allocation),
        })
    }

    pub fn destroy(&mut self, device: &VulkanDevice) {
        unsafe {
            device.device.destroy_image_view(self.view, None);
            device.device.destroy_image(self.image, None);
        }
        if let Some(allocation) = self.allocation.take() {
            if let Err(e) = device.free_allocation(allocation) {
                log::warn!("Failed to free depth allocation: {:#}", e);
            }
        }
        self.view = vk::ImageView::null();
        self.image = vk::Image::null();
    }
}
