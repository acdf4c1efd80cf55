// =============================================================================
// VULKAN MODEL VIEWER
// =============================================================================
//
// Loads an OBJ model into GPU buffers and renders it with depth testing and
// basic camera controls.
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  winit event loop (window, input)                               │
// │    └── Vulkan Device + Swapchain                                │
// │          └── Pipeline + per-image Command Buffers               │
// │                └── Synchronization (fences, semaphores)         │
// └─────────────────────────────────────────────────────────────────┘
//
// FRAME FLOW:
// 1. Acquire swapchain image
// 2. Wait for the frame that last used this sync slot
// 3. Step the camera, write this image's scene uniforms
// 4. Submit the pre-recorded command buffer
// 5. Present rendered image to screen
//
// =============================================================================

mod backend;
mod camera;
mod config;
mod mesh;

use anyhow::{Context, Result};
use ash::vk;
use backend::buffer::{self, AllocatedBuffer, DepthBuffer};
use backend::sync::FrameSync;
use backend::{pipeline, shader, Swapchain, VulkanDevice};
use camera::Camera;
use config::Config;
use glam::{Mat4, Vec2, Vec3};
use gpu_allocator::MemoryLocation;
use mesh::{DrawRange, ImportOptions, MeshData, VertexComponent, VertexLayout};
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::sync::Arc;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    event::{MouseButton, MouseScrollDelta, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Fullscreen, Window, WindowAttributes},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    // Logging first so configuration warnings are visible
    init_logging();

    // Load configuration from config.toml
    let config = Config::load();

    log::info!("Starting model viewer");
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        if config.window.fullscreen {
            "fullscreen"
        } else {
            "windowed"
        }
    );
    log::info!("Model: {}", config.model.path);

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;
    Ok(())
}

fn init_logging() {
    use env_logger::Builder;
    use log::LevelFilter;

    let mut builder = Builder::from_default_env();
    builder.filter_level(LevelFilter::Info);
    builder.init();
}

// =============================================================================
// SCENE UNIFORMS
// =============================================================================

/// Uniform block read by the vertex shader. Mat4 is 16-byte aligned so the
/// layout matches std140 without padding.
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct SceneUniforms {
    model: Mat4,
    view: Mat4,
    projection: Mat4,
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// Main application struct holding all Vulkan resources.
///
/// IMPORTANT: Resources must be destroyed in reverse order of creation to
/// avoid use-after-free. Drop and destroy_swapchain_resources do this by hand.
struct App {
    // ─────────────────────────────────────────────────────────────────────────
    // CONFIGURATION
    // ─────────────────────────────────────────────────────────────────────────
    config: Config,
    fullscreen_key: KeyCode,
    quit_key: KeyCode,

    // ─────────────────────────────────────────────────────────────────────────
    // WINDOW
    // ─────────────────────────────────────────────────────────────────────────
    window: Option<Arc<Window>>,
    is_fullscreen: bool,

    // ─────────────────────────────────────────────────────────────────────────
    // VULKAN CORE
    // ─────────────────────────────────────────────────────────────────────────
    device: Option<Arc<VulkanDevice>>,
    swapchain: Option<Swapchain>,

    // ─────────────────────────────────────────────────────────────────────────
    // GEOMETRY (uploaded once, lives for the whole run)
    // ─────────────────────────────────────────────────────────────────────────
    vertex_layout: VertexLayout,
    vertex_buffer: Option<AllocatedBuffer>,
    index_buffer: Option<AllocatedBuffer>,
    draw_ranges: Vec<DrawRange>,

    // ─────────────────────────────────────────────────────────────────────────
    // PER-SWAPCHAIN RESOURCES (torn down and rebuilt on resize)
    // ─────────────────────────────────────────────────────────────────────────
    depth_buffer: Option<DepthBuffer>,
    render_pass: vk::RenderPass,
    pipeline: vk::Pipeline,
    pipeline_layout: vk::PipelineLayout,
    framebuffers: Vec<vk::Framebuffer>,
    uniform_buffers: Vec<AllocatedBuffer>,
    descriptor_pool: vk::DescriptorPool,
    descriptor_sets: Vec<vk::DescriptorSet>,

    /// Survives swapchain recreation, the binding shape never changes
    descriptor_set_layout: vk::DescriptorSetLayout,

    // ─────────────────────────────────────────────────────────────────────────
    // COMMANDS
    // ─────────────────────────────────────────────────────────────────────────
    command_pool: Option<vk::CommandPool>,
    /// One command buffer per swapchain image (pre-recorded)
    command_buffers: Vec<vk::CommandBuffer>,

    // ─────────────────────────────────────────────────────────────────────────
    // SYNCHRONIZATION
    // ─────────────────────────────────────────────────────────────────────────
    /// Sync objects for each frame in flight
    frame_sync: Vec<FrameSync>,
    /// Which sync slot we're currently using (0 to max_frames_in_flight-1)
    current_frame: usize,

    /// Pre-allocated to avoid a per-frame heap allocation
    wait_stages: [vk::PipelineStageFlags; 1],

    // ─────────────────────────────────────────────────────────────────────────
    // CAMERA & INPUT
    // ─────────────────────────────────────────────────────────────────────────
    camera: Camera,
    /// Left mouse button held, cursor motion rotates the camera
    rotating: bool,
    last_cursor: Option<(f64, f64)>,
    last_update: Instant,

    // ─────────────────────────────────────────────────────────────────────────
    // STATE FLAGS
    // ─────────────────────────────────────────────────────────────────────────
    /// Set to true when window is resized - triggers swapchain recreation
    needs_resize: bool,
    /// Set to true when window is minimized (size = 0) - skip rendering
    is_minimized: bool,

    // ─────────────────────────────────────────────────────────────────────────
    // FPS TRACKING
    // ─────────────────────────────────────────────────────────────────────────
    frame_count: u32,
    last_fps_update: Instant,
    last_frame_time: Instant,
}

impl App {
    fn new(config: Config) -> Self {
        let is_fullscreen = config.window.fullscreen;
        let fullscreen_key = config.controls.fullscreen_keycode();
        let quit_key = config.controls.quit_keycode();

        let mut camera = Camera::new(config.camera.camera_mode());
        camera.movement_speed = config.camera.movement_speed;
        camera.rotation_speed = config.camera.rotation_speed;
        camera.set_position(Vec3::from(config.camera.position));
        camera.set_rotation(Vec3::from(config.camera.rotation));

        // The packing order here has to match the vertex shader inputs
        let vertex_layout = VertexLayout::new(vec![
            VertexComponent::Position,
            VertexComponent::Normal,
            VertexComponent::Color,
        ]);

        let now = Instant::now();
        Self {
            config,
            fullscreen_key,
            quit_key,
            window: None,
            is_fullscreen,
            device: None,
            swapchain: None,
            vertex_layout,
            vertex_buffer: None,
            index_buffer: None,
            draw_ranges: Vec::new(),
            depth_buffer: None,
            render_pass: vk::RenderPass::null(),
            pipeline: vk::Pipeline::null(),
            pipeline_layout: vk::PipelineLayout::null(),
            framebuffers: Vec::new(),
            uniform_buffers: Vec::new(),
            descriptor_pool: vk::DescriptorPool::null(),
            descriptor_sets: Vec::new(),
            descriptor_set_layout: vk::DescriptorSetLayout::null(),
            command_pool: None,
            command_buffers: Vec::new(),
            frame_sync: Vec::new(),
            current_frame: 0,
            wait_stages: [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT],
            camera,
            rotating: false,
            last_cursor: None,
            last_update: now,
            needs_resize: false,
            is_minimized: false,
            frame_count: 0,
            last_fps_update: now,
            last_frame_time: now,
        }
    }

    // =========================================================================
    // INITIALIZATION
    // =========================================================================

    /// Initialize all Vulkan resources.
    ///
    /// Called once when the window is created. Everything created here stays
    /// alive until shutdown, only the swapchain-sized resources are rebuilt
    /// on resize.
    fn init_vulkan(&mut self, window: Arc<Window>) -> Result<()> {
        log::info!("Initializing Vulkan...");

        // ─────────────────────────────────────────────────────────────────────
        // STEP 1: Create Vulkan device (instance, surface, queues, allocator)
        // ─────────────────────────────────────────────────────────────────────
        // Enable validation layers based on config (and debug build)
        let enable_validation = cfg!(debug_assertions) && self.config.debug.validation_layers;
        let device = VulkanDevice::new(
            &self.config.window.title,
            enable_validation,
            window.raw_display_handle(),
            window.raw_window_handle(),
        )?;
        log::info!("Rendering on {}", device.device_name());
        self.device = Some(device.clone());

        // ─────────────────────────────────────────────────────────────────────
        // STEP 2: Create command pool
        // ─────────────────────────────────────────────────────────────────────
        // Buffers are recorded once and replayed, no reset or transient flags
        let pool_info =
            vk::CommandPoolCreateInfo::builder().queue_family_index(device.graphics_queue_family);
        let command_pool = unsafe { device.device.create_command_pool(&pool_info, None)? };
        self.command_pool = Some(command_pool);

        // ─────────────────────────────────────────────────────────────────────
        // STEP 3: Load the model and upload it to device-local buffers
        // ─────────────────────────────────────────────────────────────────────
        self.load_model(&device, command_pool)?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 4: Descriptor set layout
        // ─────────────────────────────────────────────────────────────────────
        self.descriptor_set_layout = pipeline::create_descriptor_set_layout(&device)?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 5: Swapchain and everything sized to it
        // ─────────────────────────────────────────────────────────────────────
        self.create_swapchain_resources(&window)?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 6: Create synchronization primitives
        // ─────────────────────────────────────────────────────────────────────
        // These don't need to be recreated on resize
        let max_frames = self.config.graphics.max_frames_in_flight.max(1);
        let frame_sync = (0..max_frames)
            .map(|_| FrameSync::new(&device))
            .collect::<Result<Vec<_>>>()?;
        self.frame_sync = frame_sync;

        log::info!("Vulkan initialized successfully!");
        Ok(())
    }

    /// Import the configured model and upload it through a staging copy
    fn load_model(
        &mut self,
        device: &Arc<VulkanDevice>,
        command_pool: vk::CommandPool,
    ) -> Result<()> {
        let model = &self.config.model;
        let options = ImportOptions {
            scale: Vec3::from(model.scale),
            center: Vec3::from(model.center),
            uv_scale: Vec2::from(model.uv_scale),
        };

        let mesh = MeshData::load(&model.path, &options)
            .with_context(|| format!("Failed to load model {}", model.path))?;
        log::info!(
            "Loaded {}: {} meshes, {} vertices, {} indices",
            model.path,
            mesh.entries.len(),
            mesh.vertex_count,
            mesh.index_count
        );
        log::debug!("Model bounds: {:?}", mesh.dimension);

        let vertex_data = mesh.pack_vertices(&self.vertex_layout);
        let (index_data, draw_ranges) = mesh.flatten_indices();

        let vertex_buffer = buffer::create_device_local_buffer(
            device,
            command_pool,
            "vertex buffer",
            vk::BufferUsageFlags::VERTEX_BUFFER,
            &vertex_data,
        )?;
        let index_buffer = buffer::create_device_local_buffer(
            device,
            command_pool,
            "index buffer",
            vk::BufferUsageFlags::INDEX_BUFFER,
            &index_data,
        )?;

        self.vertex_buffer = Some(vertex_buffer);
        self.index_buffer = Some(index_buffer);
        self.draw_ranges = draw_ranges;
        Ok(())
    }

    /// Create the swapchain and everything sized to it: depth buffer, render
    /// pass, pipeline, framebuffers, uniform buffers, descriptor sets and the
    /// pre-recorded command buffers.
    ///
    /// Separated from init_vulkan because it runs again on every resize.
    fn create_swapchain_resources(&mut self, window: &Window) -> Result<()> {
        let device = self.device.clone().context("Device not initialized")?;

        // Get current window size
        let size = window.inner_size();

        // Don't create a swapchain while minimized (size = 0)
        if size.width == 0 || size.height == 0 {
            self.is_minimized = true;
            return Ok(());
        }
        self.is_minimized = false;

        // The surface can only have one swapchain at a time, and the old
        // pipeline and framebuffers reference the old images
        self.destroy_swapchain_resources();

        let swapchain = Swapchain::new(
            device.clone(),
            size.width,
            size.height,
            self.config.graphics.vk_present_mode(),
        )?;

        // Depth buffer matching the swapchain extent
        let depth_buffer = DepthBuffer::new(&device, swapchain.extent)?;

        // Render pass and pipeline
        let render_pass =
            pipeline::create_render_pass(&device, swapchain.format, depth_buffer.format)?;

        let vert = shader::load_shader_module(&device, &self.config.shaders.vertex)?;
        let frag = shader::load_shader_module(&device, &self.config.shaders.fragment)?;
        let pipeline_result = pipeline::create_graphics_pipeline(
            &device,
            render_pass,
            swapchain.extent,
            self.descriptor_set_layout,
            &self.vertex_layout,
            vert,
            frag,
        );
        // The modules can go as soon as the pipeline exists
        unsafe {
            device.device.destroy_shader_module(vert, None);
            device.device.destroy_shader_module(frag, None);
        }
        let (graphics_pipeline, pipeline_layout) = pipeline_result?;

        let framebuffers = pipeline::create_framebuffers(
            &device,
            &swapchain.image_views,
            depth_buffer.view,
            render_pass,
            swapchain.extent,
        )?;

        // One uniform buffer and descriptor set per swapchain image, so a
        // frame never writes uniforms another in-flight frame is reading
        let image_count = swapchain.images.len();
        let mut uniform_buffers = Vec::with_capacity(image_count);
        for i in 0..image_count {
            uniform_buffers.push(AllocatedBuffer::new(
                &device,
                &format!("scene uniforms {}", i),
                std::mem::size_of::<SceneUniforms>() as vk::DeviceSize,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                MemoryLocation::CpuToGpu,
            )?);
        }
        let (descriptor_pool, descriptor_sets) =
            self.create_descriptor_sets(&device, &uniform_buffers)?;

        // The projection follows the actual swapchain extent, which may
        // differ from the requested window size
        self.camera.set_perspective(
            self.config.camera.fov,
            swapchain.extent.width as f32 / swapchain.extent.height as f32,
            self.config.camera.znear,
            self.config.camera.zfar,
        );

        // Allocate command buffers (one per swapchain image)
        let command_pool = self.command_pool.context("Command pool not initialized")?;
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(image_count as u32);
        let command_buffers = unsafe { device.device.allocate_command_buffers(&alloc_info)? };

        self.swapchain = Some(swapchain);
        self.depth_buffer = Some(depth_buffer);
        self.render_pass = render_pass;
        self.pipeline = graphics_pipeline;
        self.pipeline_layout = pipeline_layout;
        self.framebuffers = framebuffers;
        self.uniform_buffers = uniform_buffers;
        self.descriptor_pool = descriptor_pool;
        self.descriptor_sets = descriptor_sets;
        self.command_buffers = command_buffers;

        self.record_command_buffers(&device)?;
        log::info!("Created {} pre-recorded command buffers", image_count);

        self.needs_resize = false;
        Ok(())
    }

    /// Tear down everything create_swapchain_resources made, newest first.
    /// Safe to call with nothing created yet.
    fn destroy_swapchain_resources(&mut self) {
        let Some(device) = self.device.clone() else {
            return;
        };

        unsafe {
            if !self.command_buffers.is_empty() {
                if let Some(pool) = self.command_pool {
                    device
                        .device
                        .free_command_buffers(pool, &self.command_buffers);
                }
                self.command_buffers.clear();
            }
            for framebuffer in self.framebuffers.drain(..) {
                device.device.destroy_framebuffer(framebuffer, None);
            }
            if self.pipeline != vk::Pipeline::null() {
                device.device.destroy_pipeline(self.pipeline, None);
                self.pipeline = vk::Pipeline::null();
            }
            if self.pipeline_layout != vk::PipelineLayout::null() {
                device
                    .device
                    .destroy_pipeline_layout(self.pipeline_layout, None);
                self.pipeline_layout = vk::PipelineLayout::null();
            }
            if self.render_pass != vk::RenderPass::null() {
                device.device.destroy_render_pass(self.render_pass, None);
                self.render_pass = vk::RenderPass::null();
            }
            if self.descriptor_pool != vk::DescriptorPool::null() {
                // Also frees the sets allocated from it
                device
                    .device
                    .destroy_descriptor_pool(self.descriptor_pool, None);
                self.descriptor_pool = vk::DescriptorPool::null();
                self.descriptor_sets.clear();
            }
        }
        for mut buffer in self.uniform_buffers.drain(..) {
            buffer.destroy(&device);
        }
        if let Some(mut depth) = self.depth_buffer.take() {
            depth.destroy(&device);
        }
        // Swapchain last, its Drop destroys the image views and the swapchain
        self.swapchain = None;
    }

    fn create_descriptor_sets(
        &self,
        device: &VulkanDevice,
        uniform_buffers: &[AllocatedBuffer],
    ) -> Result<(vk::DescriptorPool, Vec<vk::DescriptorSet>)> {
        let count = uniform_buffers.len() as u32;

        let pool_sizes = [vk::DescriptorPoolSize::builder()
            .ty(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(count)
            .build()];
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .pool_sizes(&pool_sizes)
            .max_sets(count);
        let pool = unsafe { device.device.create_descriptor_pool(&pool_info, None) }
            .context("Failed to create descriptor pool")?;

        let layouts = vec![self.descriptor_set_layout; uniform_buffers.len()];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(pool)
            .set_layouts(&layouts);
        let sets = unsafe { device.device.allocate_descriptor_sets(&alloc_info) }
            .context("Failed to allocate descriptor sets")?;

        // Point each set at its image's uniform buffer
        for (set, uniform_buffer) in sets.iter().zip(uniform_buffers) {
            let buffer_info = [vk::DescriptorBufferInfo::builder()
                .buffer(uniform_buffer.buffer)
                .offset(0)
                .range(std::mem::size_of::<SceneUniforms>() as vk::DeviceSize)
                .build()];
            let write = vk::WriteDescriptorSet::builder()
                .dst_set(*set)
                .dst_binding(0)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .buffer_info(&buffer_info)
                .build();
            unsafe { device.device.update_descriptor_sets(&[write], &[]) };
        }

        Ok((pool, sets))
    }

    /// Recreate swapchain after window resize.
    fn recreate_swapchain(&mut self) -> Result<()> {
        // Wait for GPU to finish all work before destroying resources
        if let Some(ref device) = self.device {
            device.wait_idle()?;
        }

        // Clone the window Arc to avoid borrow conflict
        let window = self.window.clone();
        if let Some(ref win) = window {
            self.create_swapchain_resources(win)?;
        }

        Ok(())
    }

    // =========================================================================
    // COMMAND RECORDING
    // =========================================================================

    /// Pre-record one command buffer per swapchain image.
    ///
    /// The draw commands never change between frames, only the uniform
    /// contents do, so recording once per swapchain is enough.
    fn record_command_buffers(&self, device: &VulkanDevice) -> Result<()> {
        let swapchain = self
            .swapchain
            .as_ref()
            .context("Swapchain not initialized")?;
        let vertex_buffer = self
            .vertex_buffer
            .as_ref()
            .context("Vertex buffer not initialized")?;
        let index_buffer = self
            .index_buffer
            .as_ref()
            .context("Index buffer not initialized")?;

        // Clear color from config (RGBA, 0-1 range), depth clears to the far
        // plane
        let color = self.config.graphics.clear_color;
        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue { float32: color },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ];

        for (i, &cmd) in self.command_buffers.iter().enumerate() {
            unsafe {
                let begin_info = vk::CommandBufferBeginInfo::builder();
                device.device.begin_command_buffer(cmd, &begin_info)?;

                let render_pass_begin = vk::RenderPassBeginInfo::builder()
                    .render_pass(self.render_pass)
                    .framebuffer(self.framebuffers[i])
                    .render_area(vk::Rect2D {
                        offset: vk::Offset2D { x: 0, y: 0 },
                        extent: swapchain.extent,
                    })
                    .clear_values(&clear_values);

                device.device.cmd_begin_render_pass(
                    cmd,
                    &render_pass_begin,
                    vk::SubpassContents::INLINE,
                );
                device
                    .device
                    .cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline);
                device
                    .device
                    .cmd_bind_vertex_buffers(cmd, 0, &[vertex_buffer.buffer], &[0]);
                device.device.cmd_bind_index_buffer(
                    cmd,
                    index_buffer.buffer,
                    0,
                    vk::IndexType::UINT32,
                );
                device.device.cmd_bind_descriptor_sets(
                    cmd,
                    vk::PipelineBindPoint::GRAPHICS,
                    self.pipeline_layout,
                    0,
                    &[self.descriptor_sets[i]],
                    &[],
                );

                // One indexed draw per mesh out of the shared buffers
                for range in &self.draw_ranges {
                    device.device.cmd_draw_indexed(
                        cmd,
                        range.index_count,
                        1,
                        range.first_index,
                        range.vertex_offset,
                        0,
                    );
                }

                device.device.cmd_end_render_pass(cmd);
                device.device.end_command_buffer(cmd)?;
            }
        }

        Ok(())
    }

    // =========================================================================
    // RENDER LOOP
    // =========================================================================

    /// Render a single frame. This is the hot path - called every frame.
    fn render_frame(&mut self) -> Result<bool> {
        // Skip rendering if minimized
        if self.is_minimized {
            return Ok(false);
        }

        // Handle resize if needed
        if self.needs_resize {
            self.recreate_swapchain()?;
            if self.is_minimized || self.needs_resize {
                return Ok(false);
            }
        }

        let device = self.device.clone().context("Device not initialized")?;
        // Copy of the handles, the slot itself stays in frame_sync
        let sync = self.frame_sync[self.current_frame];

        // ─────────────────────────────────────────────────────────────────────
        // STEP 1: Acquire next swapchain image
        // ─────────────────────────────────────────────────────────────────────
        let acquired = {
            let swapchain = self
                .swapchain
                .as_ref()
                .context("Swapchain not initialized")?;
            swapchain.acquire_next_image(u64::MAX, sync.image_available)?
        };
        let Some((image_index, suboptimal)) = acquired else {
            // Out of date, recreate and try again next frame
            self.needs_resize = true;
            return Ok(false);
        };
        if suboptimal {
            self.needs_resize = true;
        }

        // ─────────────────────────────────────────────────────────────────────
        // STEP 2: Wait for the frame that last used this sync slot
        // ─────────────────────────────────────────────────────────────────────
        // Only after the fence may we touch this image's uniform buffer
        unsafe {
            device
                .device
                .wait_for_fences(&[sync.in_flight_fence], true, u64::MAX)?;
            device.device.reset_fences(&[sync.in_flight_fence])?;
        }

        // ─────────────────────────────────────────────────────────────────────
        // STEP 3: Step the camera and write this image's uniforms
        // ─────────────────────────────────────────────────────────────────────
        let now = Instant::now();
        let delta_time = now.duration_since(self.last_update).as_secs_f32();
        self.last_update = now;
        self.camera.update(delta_time);
        self.update_uniforms(image_index as usize)?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 4: Submit the pre-recorded command buffer
        // ─────────────────────────────────────────────────────────────────────
        let cmd = self.command_buffers[image_index as usize];

        let wait_semaphores = [sync.image_available];
        let signal_semaphores = [sync.render_finished];
        let command_buffers = [cmd];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores) // Wait for image to be available
            .wait_dst_stage_mask(&self.wait_stages) // Which stage waits
            .command_buffers(&command_buffers) // Commands to execute
            .signal_semaphores(&signal_semaphores); // Signal when done

        unsafe {
            device.device.queue_submit(
                device.graphics_queue,
                &[submit_info.build()],
                sync.in_flight_fence, // Signal this fence when GPU is done
            )?;
        }

        // ─────────────────────────────────────────────────────────────────────
        // STEP 5: Present the image on the present queue
        // ─────────────────────────────────────────────────────────────────────
        let present_result = {
            let swapchain = self
                .swapchain
                .as_ref()
                .context("Swapchain not initialized")?;
            swapchain.present(device.present_queue, image_index, &[sync.render_finished])
        };

        match present_result {
            Ok(suboptimal) => {
                if suboptimal {
                    self.needs_resize = true;
                }
            }
            Err(_) => {
                self.needs_resize = true;
            }
        }

        // ─────────────────────────────────────────────────────────────────────
        // STEP 6: Advance to next frame
        // ─────────────────────────────────────────────────────────────────────
        self.current_frame = (self.current_frame + 1) % self.frame_sync.len();

        Ok(true)
    }

    fn update_uniforms(&mut self, image_index: usize) -> Result<()> {
        let uniforms = SceneUniforms {
            model: Mat4::IDENTITY,
            view: self.camera.view(),
            projection: self.camera.perspective(),
        };
        self.uniform_buffers[image_index].write(&[uniforms])
    }

    // =========================================================================
    // FULLSCREEN TOGGLE
    // =========================================================================

    fn toggle_fullscreen(&mut self) {
        if let Some(ref window) = self.window {
            self.is_fullscreen = !self.is_fullscreen;

            if self.is_fullscreen {
                // Enter fullscreen (use current monitor)
                window.set_fullscreen(Some(Fullscreen::Borderless(None)));
                log::info!("Entered fullscreen mode");
            } else {
                // Exit fullscreen
                window.set_fullscreen(None);
                log::info!("Exited fullscreen mode");
            }

            self.needs_resize = true;
        }
    }

    // =========================================================================
    // FPS TRACKING
    // =========================================================================

    fn update_fps(&mut self) {
        if !self.config.debug.show_fps {
            return;
        }

        let now = Instant::now();
        let frame_time = now.duration_since(self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;
        self.frame_count += 1;

        // Update title every second
        if now.duration_since(self.last_fps_update).as_secs_f32() >= 1.0 {
            let elapsed = now.duration_since(self.last_fps_update).as_secs_f32();
            let fps = self.frame_count as f32 / elapsed;

            if let Some(ref window) = self.window {
                let mode = if self.is_fullscreen {
                    "fullscreen"
                } else {
                    "windowed"
                };
                window.set_title(&format!(
                    "{} - {:.0} FPS ({:.2}ms) [{}]",
                    self.config.window.title,
                    fps,
                    frame_time * 1000.0,
                    mode
                ));
            }

            self.frame_count = 0;
            self.last_fps_update = now;
        }
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        // Create window with settings from config
        let mut window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));

        // Set fullscreen if configured
        if self.config.window.fullscreen {
            window_attributes =
                window_attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                log::error!("Failed to create window: {:?}", e);
                event_loop.exit();
                return;
            }
        };

        // Initialize Vulkan, there is no fallback if this fails
        if let Err(e) = self.init_vulkan(window.clone()) {
            log::error!("Failed to initialize Vulkan: {:?}", e);
            event_loop.exit();
            return;
        }

        self.window = Some(window);
    }

    /// Handle window events.
    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            // ─────────────────────────────────────────────────────────────────
            // CLOSE REQUEST
            // ─────────────────────────────────────────────────────────────────
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                if let Some(ref device) = self.device {
                    let _ = device.wait_idle();
                }
                event_loop.exit();
            }

            // ─────────────────────────────────────────────────────────────────
            // WINDOW RESIZED
            // ─────────────────────────────────────────────────────────────────
            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);

                if size.width == 0 || size.height == 0 {
                    self.is_minimized = true;
                } else {
                    self.is_minimized = false;
                    self.needs_resize = true;
                }
            }

            // ─────────────────────────────────────────────────────────────────
            // REDRAW REQUESTED
            // ─────────────────────────────────────────────────────────────────
            WindowEvent::RedrawRequested => match self.render_frame() {
                Ok(rendered) => {
                    if rendered {
                        self.update_fps();
                    }
                }
                Err(e) => {
                    log::error!("Render error: {:?}", e);
                }
            },

            // ─────────────────────────────────────────────────────────────────
            // KEYBOARD INPUT
            // ─────────────────────────────────────────────────────────────────
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key) = event.physical_key {
                    let pressed = event.state.is_pressed();

                    // Movement keys are level-triggered, the camera tracks
                    // their held state
                    match key {
                        KeyCode::KeyW | KeyCode::ArrowUp => self.camera.keys.up = pressed,
                        KeyCode::KeyS | KeyCode::ArrowDown => self.camera.keys.down = pressed,
                        KeyCode::KeyA | KeyCode::ArrowLeft => self.camera.keys.left = pressed,
                        KeyCode::KeyD | KeyCode::ArrowRight => self.camera.keys.right = pressed,
                        _ => {}
                    }

                    if pressed && !event.repeat {
                        if key == self.quit_key {
                            log::info!("Quit key pressed, exiting...");
                            event_loop.exit();
                        } else if key == self.fullscreen_key {
                            self.toggle_fullscreen();
                        }
                    }
                }
            }

            // ─────────────────────────────────────────────────────────────────
            // MOUSE - drag to rotate, wheel to zoom
            // ─────────────────────────────────────────────────────────────────
            WindowEvent::MouseInput { state, button, .. } => {
                if button == MouseButton::Left {
                    self.rotating = state.is_pressed();
                    // Forget the anchor so the next drag doesn't jump
                    self.last_cursor = None;
                }
            }

            WindowEvent::CursorMoved { position, .. } => {
                if self.rotating {
                    if let Some((last_x, last_y)) = self.last_cursor {
                        let dx = (position.x - last_x) as f32;
                        let dy = (position.y - last_y) as f32;
                        let speed = self.camera.rotation_speed;
                        self.camera.rotate(Vec3::new(dy * speed, -dx * speed, 0.0));
                    }
                    self.last_cursor = Some((position.x, position.y));
                }
            }

            WindowEvent::MouseWheel { delta, .. } => {
                // One line notch is 120 wheel units
                let scroll = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y * 120.0,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32,
                };
                self.camera.translate(Vec3::new(0.0, 0.0, scroll * 0.005));
            }

            _ => {}
        }
    }

    /// Called when the event loop is about to block waiting for events.
    /// We use this to request continuous redraws.
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}

// =============================================================================
// CLEANUP
// =============================================================================

impl Drop for App {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");

        let Some(device) = self.device.clone() else {
            return;
        };

        // Wait for GPU to finish before destroying anything
        let _ = device.wait_idle();

        // Destroy in reverse order of creation

        // 1. Sync objects
        for sync in &self.frame_sync {
            sync.destroy(&device.device);
        }
        self.frame_sync.clear();

        // 2. Swapchain-sized resources (pipeline, framebuffers, uniforms,
        //    depth, swapchain itself)
        self.destroy_swapchain_resources();

        // 3. Descriptor set layout and command pool
        unsafe {
            if self.descriptor_set_layout != vk::DescriptorSetLayout::null() {
                device
                    .device
                    .destroy_descriptor_set_layout(self.descriptor_set_layout, None);
                self.descriptor_set_layout = vk::DescriptorSetLayout::null();
            }
            if let Some(pool) = self.command_pool.take() {
                device.device.destroy_command_pool(pool, None);
            }
        }

        // 4. Geometry buffers
        if let Some(mut vertex_buffer) = self.vertex_buffer.take() {
            vertex_buffer.destroy(&device);
        }
        if let Some(mut index_buffer) = self.index_buffer.take() {
            index_buffer.destroy(&device);
        }

        // 5. Device last, its Drop tears down allocator, surface and instance
        self.device = None;

        log::info!("Cleanup complete");
    }
}
