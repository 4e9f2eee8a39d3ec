//! Vulkan backend on top of `ash` and the AMD memory allocator.
//!
//! The context owns instance, device, one graphics queue and a command pool.
//! Resource uploads go through staging buffers on one-shot command buffers;
//! submission records the encoded stream into a transient primary command
//! buffer and blocks on its fence, so callers observe the synchronous model
//! the abstract interface documents.

use std::ffi::{c_char, c_void, CStr, CString};
use std::mem::ManuallyDrop;

use ash::vk;
use ash::Entry;
use log::{debug, error, warn};
use vk_mem::Alloc;

use crate::gpu::driver::command::*;
use crate::gpu::error::{GpuError, Result};
use crate::gpu::structs::*;
use crate::gpu::validate;
use crate::utils::handle::retype;
use crate::utils::{Handle, Pool, Release};

mod conversions;
use conversions as conv;

mod swapchain;
pub(crate) use swapchain::VkSwapchain;

mod timing;
pub(crate) use timing::GpuTimer;

/// Names of debugging layers enabled when validation is requested.
pub const DEBUG_LAYER_NAMES: [*const c_char; 1] =
    [b"VK_LAYER_KHRONOS_validation\0".as_ptr() as *const c_char];

unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut c_void,
) -> vk::Bool32 {
    let message = unsafe { CStr::from_ptr((*p_callback_data).p_message) };
    eprintln!(
        "[{:?}][{:?}] {}",
        message_severity,
        message_type,
        message.to_string_lossy()
    );
    vk::FALSE
}

pub(crate) struct VkBuffer {
    raw: vk::Buffer,
    alloc: vk_mem::Allocation,
    byte_size: u32,
    mappable: bool,
}

pub(crate) struct VkTexture {
    raw: vk::Image,
    alloc: Option<vk_mem::Allocation>,
    view: vk::ImageView,
    format: Format,
    vk_format: vk::Format,
    dim: [u32; 3],
    layers: u32,
    mip_levels: u32,
}

pub(crate) struct VkSampler {
    raw: vk::Sampler,
}

pub(crate) struct VkProgram {
    stages: Vec<(ShaderStage, vk::ShaderModule, CString)>,
}

pub(crate) struct VkBindGroupLayout {
    raw: vk::DescriptorSetLayout,
    pool: vk::DescriptorPool,
    ranges: Vec<DescriptorRange>,
    block_bindings: Vec<Option<u32>>,
}

pub(crate) struct VkBindGroup {
    set: vk::DescriptorSet,
    layout: Handle<BindGroupLayout>,
    bindings: Vec<ResourceBinding>,
}

pub(crate) struct VkRenderPass {
    raw: vk::RenderPass,
    color_count: u32,
}

pub(crate) struct VkVertexArray {
    buffers: Vec<Handle<Buffer>>,
    index_buffer: Option<Handle<Buffer>>,
    index_type: IndexType,
}

pub(crate) struct VkGraphicsPipeline {
    raw: vk::Pipeline,
    pipeline_layout: vk::PipelineLayout,
    program: Handle<ShaderProgram>,
    layouts: [Option<Handle<BindGroupLayout>>; MAX_BIND_GROUPS],
    render_pass: Handle<RenderPass>,
    #[allow(dead_code)]
    patch_control_points: Option<u8>,
}

pub(crate) struct VkComputePipeline {
    raw: vk::Pipeline,
    pipeline_layout: vk::PipelineLayout,
    program: Handle<ShaderProgram>,
    layouts: [Option<Handle<BindGroupLayout>>; MAX_BIND_GROUPS],
}

pub struct VulkanContext {
    pub(crate) entry: Entry,
    pub(crate) instance: ash::Instance,
    pub(crate) pdevice: vk::PhysicalDevice,
    pub(crate) device: ash::Device,
    properties: vk::PhysicalDeviceProperties,
    allocator: ManuallyDrop<vk_mem::Allocator>,
    pub(crate) queue: vk::Queue,
    pub(crate) queue_family: u32,
    cmd_pool: vk::CommandPool,
    debug_utils: Option<ash::extensions::ext::DebugUtils>,
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
    empty_set_layout: vk::DescriptorSetLayout,
    limits: DeviceLimits,
    timer: Option<GpuTimer>,
    last_submit_ms: Option<f32>,
    headless: bool,

    buffers: Pool<VkBuffer>,
    textures: Pool<VkTexture>,
    samplers: Pool<VkSampler>,
    programs: Pool<VkProgram>,
    bind_group_layouts: Pool<VkBindGroupLayout>,
    bind_groups: Pool<VkBindGroup>,
    render_passes: Pool<VkRenderPass>,
    vertex_arrays: Pool<VkVertexArray>,
    graphics_pipelines: Pool<VkGraphicsPipeline>,
    compute_pipelines: Pool<VkComputePipeline>,
    pub(crate) swapchains: Pool<VkSwapchain>,
}

impl VulkanContext {
    pub fn new(info: &ContextInfo) -> Result<Self> {
        Self::init(info, true)
    }

    /// Compute- or test-oriented construction without surface extensions.
    pub fn headless(info: &ContextInfo) -> Result<Self> {
        Self::init(info, false)
    }

    fn init(info: &ContextInfo, windowed: bool) -> Result<Self> {
        let entry = unsafe { Entry::load() }?;
        let app_name = CString::new(info.app_name.clone()).unwrap();
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .api_version(vk::API_VERSION_1_1)
            .build();

        let mut inst_exts = Vec::new();
        let mut inst_layers = Vec::new();
        if info.validation {
            inst_exts.push(ash::extensions::ext::DebugUtils::name().as_ptr());
            let available_layers = entry.enumerate_instance_layer_properties()?;
            for &layer in &DEBUG_LAYER_NAMES {
                let name = unsafe { CStr::from_ptr(layer) };
                if available_layers
                    .iter()
                    .any(|prop| unsafe { CStr::from_ptr(prop.layer_name.as_ptr()) == name })
                {
                    inst_layers.push(layer);
                }
            }
        }
        if windowed {
            inst_exts.push(ash::extensions::khr::Surface::name().as_ptr());
            #[cfg(target_os = "linux")]
            {
                inst_exts.push(ash::extensions::khr::XlibSurface::name().as_ptr());
                inst_exts.push(ash::extensions::khr::WaylandSurface::name().as_ptr());
            }
            #[cfg(target_os = "windows")]
            inst_exts.push(ash::extensions::khr::Win32Surface::name().as_ptr());
        }

        let instance = unsafe {
            entry.create_instance(
                &vk::InstanceCreateInfo::builder()
                    .application_info(&app_info)
                    .enabled_extension_names(&inst_exts)
                    .enabled_layer_names(&inst_layers)
                    .build(),
                None,
            )
        }?;

        let (debug_utils, debug_messenger) = if info.validation {
            let debug_utils = ash::extensions::ext::DebugUtils::new(&entry, &instance);
            let messenger_ci = vk::DebugUtilsMessengerCreateInfoEXT::builder()
                .message_severity(
                    vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                        | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
                )
                .message_type(
                    vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                        | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                        | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
                )
                .pfn_user_callback(Some(vulkan_debug_callback));
            let messenger = unsafe {
                debug_utils.create_debug_utils_messenger(&messenger_ci, None)?
            };
            (Some(debug_utils), Some(messenger))
        } else {
            (None, None)
        };

        let pdevices = unsafe { instance.enumerate_physical_devices() }?;
        let mut chosen = None;
        for pdevice in pdevices {
            let queue_props =
                unsafe { instance.get_physical_device_queue_family_properties(pdevice) };
            if let Some(family) = queue_props
                .iter()
                .position(|p| p.queue_flags.contains(vk::QueueFlags::GRAPHICS))
            {
                chosen = Some((pdevice, family as u32));
                break;
            }
        }
        let (pdevice, queue_family) =
            chosen.ok_or(GpuError::MissingCapability("graphics-capable device"))?;
        let properties = unsafe { instance.get_physical_device_properties(pdevice) };
        let features = unsafe { instance.get_physical_device_features(pdevice) };

        let mut device_exts = Vec::new();
        if windowed {
            device_exts.push(ash::extensions::khr::Swapchain::name().as_ptr());
        }
        let enabled_features = vk::PhysicalDeviceFeatures::builder()
            .tessellation_shader(features.tessellation_shader == vk::TRUE)
            .sampler_anisotropy(features.sampler_anisotropy == vk::TRUE)
            .multi_draw_indirect(features.multi_draw_indirect == vk::TRUE)
            .build();

        let priorities = [1.0f32];
        let queue_infos = [vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(queue_family)
            .queue_priorities(&priorities)
            .build()];
        let device = unsafe {
            instance.create_device(
                pdevice,
                &vk::DeviceCreateInfo::builder()
                    .queue_create_infos(&queue_infos)
                    .enabled_extension_names(&device_exts)
                    .enabled_features(&enabled_features)
                    .build(),
                None,
            )
        }?;
        let queue = unsafe { device.get_device_queue(queue_family, 0) };

        let allocator =
            vk_mem::Allocator::new(vk_mem::AllocatorCreateInfo::new(&instance, &device, pdevice))?;

        let cmd_pool = unsafe {
            device.create_command_pool(
                &vk::CommandPoolCreateInfo::builder()
                    .queue_family_index(queue_family)
                    .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
                    .build(),
                None,
            )
        }?;

        let empty_set_layout = unsafe {
            device.create_descriptor_set_layout(
                &vk::DescriptorSetLayoutCreateInfo::builder().build(),
                None,
            )
        }?;

        let timestamps_supported = properties.limits.timestamp_period > 0.0;
        let limits = DeviceLimits {
            max_color_attachments: properties
                .limits
                .max_color_attachments
                .min(MAX_COLOR_ATTACHMENTS as u32),
            max_patch_control_points: if features.tessellation_shader == vk::TRUE {
                properties
                    .limits
                    .max_tessellation_patch_size
                    .min(MAX_PATCH_CONTROL_POINTS as u32)
            } else {
                0
            },
            max_anisotropy: properties.limits.max_sampler_anisotropy,
            timestamps_supported,
        };
        debug!(
            "vulkan backend: device '{}', {} color attachments, {} patch vertices",
            unsafe { CStr::from_ptr(properties.device_name.as_ptr()).to_string_lossy() },
            limits.max_color_attachments,
            limits.max_patch_control_points
        );

        let timer = if timestamps_supported {
            Some(GpuTimer::new(&device)?)
        } else {
            None
        };

        Ok(Self {
            entry,
            instance,
            pdevice,
            device,
            properties,
            allocator: ManuallyDrop::new(allocator),
            queue,
            queue_family,
            cmd_pool,
            debug_utils,
            debug_messenger,
            empty_set_layout,
            limits,
            timer,
            last_submit_ms: None,
            headless: !windowed,
            buffers: Pool::default(),
            textures: Pool::default(),
            samplers: Pool::default(),
            programs: Pool::default(),
            bind_group_layouts: Pool::default(),
            bind_groups: Pool::default(),
            render_passes: Pool::default(),
            vertex_arrays: Pool::default(),
            graphics_pipelines: Pool::default(),
            compute_pipelines: Pool::default(),
            swapchains: Pool::default(),
        })
    }

    pub fn limits(&self) -> DeviceLimits {
        self.limits
    }

    /// GPU duration of the most recent submission, when timestamps exist.
    pub fn last_submit_duration_ms(&self) -> Option<f32> {
        self.last_submit_ms
    }

    fn set_name<T>(&self, obj: T, name: &str, ty: vk::ObjectType)
    where
        T: vk::Handle,
    {
        if let Some(utils) = &self.debug_utils {
            if name.is_empty() {
                return;
            }
            let name = CString::new(name).unwrap_or_default();
            unsafe {
                let _ = utils.set_debug_utils_object_name(
                    self.device.handle(),
                    &vk::DebugUtilsObjectNameInfoEXT::builder()
                        .object_name(&name)
                        .object_type(ty)
                        .object_handle(vk::Handle::as_raw(obj))
                        .build(),
                );
            }
        }
    }

    /// Record and synchronously execute a one-shot command buffer.
    fn one_shot<F: FnOnce(&ash::Device, vk::CommandBuffer)>(&self, record: F) -> Result<()> {
        unsafe {
            let cmd = self.device.allocate_command_buffers(
                &vk::CommandBufferAllocateInfo::builder()
                    .command_pool(self.cmd_pool)
                    .level(vk::CommandBufferLevel::PRIMARY)
                    .command_buffer_count(1)
                    .build(),
            )?[0];
            self.device.begin_command_buffer(
                cmd,
                &vk::CommandBufferBeginInfo::builder()
                    .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)
                    .build(),
            )?;
            record(&self.device, cmd);
            self.device.end_command_buffer(cmd)?;

            let fence = self
                .device
                .create_fence(&vk::FenceCreateInfo::builder().build(), None)?;
            let cmds = [cmd];
            let submit = vk::SubmitInfo::builder().command_buffers(&cmds).build();
            self.device.queue_submit(self.queue, &[submit], fence)?;
            self.device.wait_for_fences(&[fence], true, u64::MAX)?;
            self.device.destroy_fence(fence, None);
            self.device.free_command_buffers(self.cmd_pool, &cmds);
        }
        Ok(())
    }

    //===------------------------------------------------------------------===//
    // Buffers
    //===------------------------------------------------------------------===//

    pub fn make_buffer(&mut self, info: &BufferInfo) -> Result<Handle<Buffer>> {
        validate::buffer_info(info)?;
        if self.buffers.is_full() {
            return Err(GpuError::Exhausted("buffer"));
        }
        let usage = vk::BufferUsageFlags::VERTEX_BUFFER
            | vk::BufferUsageFlags::INDEX_BUFFER
            | vk::BufferUsageFlags::UNIFORM_BUFFER
            | vk::BufferUsageFlags::STORAGE_BUFFER
            | vk::BufferUsageFlags::INDIRECT_BUFFER
            | vk::BufferUsageFlags::TRANSFER_SRC
            | vk::BufferUsageFlags::TRANSFER_DST;
        let mappable = matches!(info.visibility, MemoryVisibility::CpuAndGpu);
        let create_info = vk_mem::AllocationCreateInfo {
            usage: if mappable {
                vk_mem::MemoryUsage::AutoPreferHost
            } else {
                vk_mem::MemoryUsage::Auto
            },
            flags: if mappable {
                vk_mem::AllocationCreateFlags::HOST_ACCESS_RANDOM
            } else {
                vk_mem::AllocationCreateFlags::empty()
            },
            ..Default::default()
        };
        let (buffer, allocation) = unsafe {
            self.allocator.create_buffer(
                &vk::BufferCreateInfo::builder()
                    .size(info.byte_size as u64)
                    .usage(usage)
                    .sharing_mode(vk::SharingMode::EXCLUSIVE)
                    .build(),
                &create_info,
            )
        }?;
        self.set_name(buffer, info.debug_name, vk::ObjectType::BUFFER);

        let handle = retype(
            self.buffers
                .insert(VkBuffer {
                    raw: buffer,
                    alloc: allocation,
                    byte_size: info.byte_size,
                    mappable,
                })
                .expect("pool fullness checked above"),
        );

        if let Some(data) = info.initial_data {
            self.write_buffer(handle, 0, data)?;
        }
        Ok(handle)
    }

    pub fn write_buffer(&mut self, handle: Handle<Buffer>, offset: u32, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Err(GpuError::InvalidInfo("zero-byte buffer write"));
        }
        let (mappable, byte_size) = {
            let buf = self
                .buffers
                .get_ref(retype(handle))
                .ok_or(GpuError::InvalidHandle("buffer"))?;
            (buf.mappable, buf.byte_size)
        };
        if offset + data.len() as u32 > byte_size {
            return Err(GpuError::InvalidInfo("buffer write out of bounds"));
        }

        if mappable {
            let buf = self.buffers.get_mut_ref(retype(handle)).unwrap();
            unsafe {
                let mapped = self.allocator.map_memory(&mut buf.alloc)?;
                std::ptr::copy_nonoverlapping(
                    data.as_ptr(),
                    mapped.add(offset as usize),
                    data.len(),
                );
                self.allocator.unmap_memory(&mut buf.alloc);
            }
            return Ok(());
        }

        // Device-local: stage and copy.
        let staging = self.make_buffer(&BufferInfo {
            debug_name: "staging",
            byte_size: data.len() as u32,
            visibility: MemoryVisibility::CpuAndGpu,
            usage: BufferUsage::Uniform,
            indirect_flags: IndirectBufferFlags::empty(),
            initial_data: Some(data),
        })?;
        let src = self.buffers.get_ref(retype(staging)).unwrap().raw;
        let dst = self.buffers.get_ref(retype(handle)).unwrap().raw;
        let size = data.len() as u64;
        self.one_shot(|device, cmd| unsafe {
            device.cmd_copy_buffer(
                cmd,
                src,
                dst,
                &[vk::BufferCopy {
                    src_offset: 0,
                    dst_offset: offset as u64,
                    size,
                }],
            );
        })?;
        self.release_buffer(staging)
    }

    pub fn read_buffer(&mut self, handle: Handle<Buffer>, offset: u32, len: u32) -> Result<Vec<u8>> {
        if len == 0 {
            return Err(GpuError::InvalidInfo("zero-byte buffer read"));
        }
        let (mappable, byte_size, raw) = {
            let buf = self
                .buffers
                .get_ref(retype(handle))
                .ok_or(GpuError::InvalidHandle("buffer"))?;
            (buf.mappable, buf.byte_size, buf.raw)
        };
        if offset + len > byte_size {
            return Err(GpuError::InvalidInfo("buffer read out of bounds"));
        }

        if mappable {
            let buf = self.buffers.get_mut_ref(retype(handle)).unwrap();
            let mut out = vec![0u8; len as usize];
            unsafe {
                let mapped = self.allocator.map_memory(&mut buf.alloc)?;
                std::ptr::copy_nonoverlapping(
                    mapped.add(offset as usize),
                    out.as_mut_ptr(),
                    len as usize,
                );
                self.allocator.unmap_memory(&mut buf.alloc);
            }
            return Ok(out);
        }

        let staging = self.make_buffer(&BufferInfo {
            debug_name: "readback",
            byte_size: len,
            visibility: MemoryVisibility::CpuAndGpu,
            usage: BufferUsage::Uniform,
            indirect_flags: IndirectBufferFlags::empty(),
            initial_data: None,
        })?;
        let dst = self.buffers.get_ref(retype(staging)).unwrap().raw;
        self.one_shot(|device, cmd| unsafe {
            device.cmd_copy_buffer(
                cmd,
                raw,
                dst,
                &[vk::BufferCopy {
                    src_offset: offset as u64,
                    dst_offset: 0,
                    size: len as u64,
                }],
            );
        })?;
        let out = self.read_buffer(staging, 0, len)?;
        self.release_buffer(staging)?;
        Ok(out)
    }

    pub fn buffer_size(&self, handle: Handle<Buffer>) -> Result<u32> {
        self.buffers
            .get_ref(retype(handle))
            .map(|b| b.byte_size)
            .ok_or(GpuError::InvalidHandle("buffer"))
    }

    pub fn add_ref_buffer(&mut self, handle: Handle<Buffer>) -> Result<()> {
        self.buffers
            .add_ref(retype(handle))
            .map(|_| ())
            .ok_or(GpuError::InvalidHandle("buffer"))
    }

    pub fn release_buffer(&mut self, handle: Handle<Buffer>) -> Result<()> {
        match self.buffers.release(retype::<Buffer, VkBuffer>(handle)) {
            None => Err(GpuError::InvalidHandle("buffer")),
            Some(Release::Alive(_)) => Ok(()),
            Some(Release::Destroyed(mut buf)) => {
                unsafe { self.allocator.destroy_buffer(buf.raw, &mut buf.alloc) };
                Ok(())
            }
        }
    }

    //===------------------------------------------------------------------===//
    // Textures & samplers
    //===------------------------------------------------------------------===//

    fn final_layout(format: Format, flags: TextureFlags) -> vk::ImageLayout {
        if format.is_depth_stencil() {
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        } else if flags.contains(TextureFlags::UNORDERED_ACCESS) {
            vk::ImageLayout::GENERAL
        } else if flags.contains(TextureFlags::RENDER_TARGET)
            && !flags.contains(TextureFlags::SHADER_RESOURCE)
        {
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        } else {
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        }
    }

    pub fn make_texture(&mut self, info: &TextureInfo) -> Result<Handle<Texture>> {
        let plan = validate::texture_info(info)?;
        if self.textures.is_full() {
            return Err(GpuError::Exhausted("texture"));
        }
        let vk_format = conv::image_format(info.format);
        let mut usage =
            vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_SRC | vk::ImageUsageFlags::TRANSFER_DST;
        if info.format.is_depth_stencil() {
            usage |= vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
        } else if info.flags.contains(TextureFlags::RENDER_TARGET) {
            usage |= vk::ImageUsageFlags::COLOR_ATTACHMENT;
        }
        if info.flags.contains(TextureFlags::UNORDERED_ACCESS) {
            usage |= vk::ImageUsageFlags::STORAGE;
        }

        let (image, allocation) = unsafe {
            self.allocator.create_image(
                &vk::ImageCreateInfo::builder()
                    .extent(vk::Extent3D {
                        width: info.dim[0],
                        height: info.dim[1],
                        depth: info.dim[2].max(1),
                    })
                    .array_layers(info.layers)
                    .format(vk_format)
                    .mip_levels(info.mip_levels)
                    .initial_layout(vk::ImageLayout::UNDEFINED)
                    .usage(usage)
                    .image_type(vk::ImageType::TYPE_2D)
                    .samples(info.sample_count.into())
                    .tiling(vk::ImageTiling::OPTIMAL)
                    .sharing_mode(vk::SharingMode::EXCLUSIVE)
                    .build(),
                &vk_mem::AllocationCreateInfo {
                    usage: vk_mem::MemoryUsage::Auto,
                    ..Default::default()
                },
            )
        }?;
        self.set_name(image, info.debug_name, vk::ObjectType::IMAGE);

        let view = unsafe {
            self.device.create_image_view(
                &vk::ImageViewCreateInfo::builder()
                    .image(image)
                    .format(vk_format)
                    .view_type(if info.layers > 1 {
                        vk::ImageViewType::TYPE_2D_ARRAY
                    } else {
                        vk::ImageViewType::TYPE_2D
                    })
                    .subresource_range(
                        vk::ImageSubresourceRange::builder()
                            .aspect_mask(conv::aspect_mask(info.format))
                            .base_mip_level(0)
                            .level_count(info.mip_levels)
                            .base_array_layer(0)
                            .layer_count(info.layers)
                            .build(),
                    )
                    .build(),
                None,
            )
        }?;

        self.init_texture(image, info, &plan)?;

        match self.textures.insert(VkTexture {
            raw: image,
            alloc: Some(allocation),
            view,
            format: info.format,
            vk_format,
            dim: info.dim,
            layers: info.layers,
            mip_levels: info.mip_levels,
        }) {
            Some(handle) => Ok(retype(handle)),
            None => {
                unsafe {
                    self.device.destroy_image_view(view, None);
                }
                Err(GpuError::Exhausted("texture"))
            }
        }
    }

    /// Upload the provided mip chain (level-major, layers contiguous per
    /// level) and transition the image into its steady-state layout,
    /// generating the remaining chain with blits when requested.
    fn init_texture(
        &mut self,
        image: vk::Image,
        info: &TextureInfo,
        plan: &validate::MipPlan,
    ) -> Result<()> {
        let aspect = conv::aspect_mask(info.format);
        let final_layout = Self::final_layout(info.format, info.flags);
        let mip_levels = info.mip_levels;
        let layers = info.layers;
        let dim = info.dim;
        let format = info.format;
        let generate = plan.generate;
        let upload_levels = plan.upload_levels;

        let range_all = vk::ImageSubresourceRange::builder()
            .aspect_mask(aspect)
            .base_mip_level(0)
            .level_count(mip_levels)
            .base_array_layer(0)
            .layer_count(layers)
            .build();

        let Some(data) = info.initial_data else {
            // No upload, a single transition into the steady state.
            return self.one_shot(|device, cmd| unsafe {
                let barrier = vk::ImageMemoryBarrier::builder()
                    .image(image)
                    .old_layout(vk::ImageLayout::UNDEFINED)
                    .new_layout(final_layout)
                    .src_access_mask(vk::AccessFlags::empty())
                    .dst_access_mask(vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE)
                    .subresource_range(range_all)
                    .build();
                device.cmd_pipeline_barrier(
                    cmd,
                    vk::PipelineStageFlags::TOP_OF_PIPE,
                    vk::PipelineStageFlags::ALL_COMMANDS,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[barrier],
                );
            });
        };

        let staging = self.make_buffer(&BufferInfo {
            debug_name: "texture staging",
            byte_size: data.len() as u32,
            visibility: MemoryVisibility::CpuAndGpu,
            usage: BufferUsage::Uniform,
            indirect_flags: IndirectBufferFlags::empty(),
            initial_data: Some(data),
        })?;
        let staging_raw = self.buffers.get_ref(retype(staging)).unwrap().raw;

        self.one_shot(|device, cmd| unsafe {
            let to_transfer = vk::ImageMemoryBarrier::builder()
                .image(image)
                .old_layout(vk::ImageLayout::UNDEFINED)
                .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .src_access_mask(vk::AccessFlags::empty())
                .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                .subresource_range(range_all)
                .build();
            device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::TRANSFER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[to_transfer],
            );

            // Walk the chain, halving dimensions per level.
            let mut offset = 0u64;
            for level in 0..upload_levels {
                let (w, h) = mip_extent(dim[0], dim[1], level);
                let level_bytes = format.mip_byte_size(w, h) as u64 * dim[2].max(1) as u64;
                let copy = vk::BufferImageCopy::builder()
                    .buffer_offset(offset)
                    .image_subresource(
                        vk::ImageSubresourceLayers::builder()
                            .aspect_mask(aspect)
                            .mip_level(level)
                            .base_array_layer(0)
                            .layer_count(layers)
                            .build(),
                    )
                    .image_extent(vk::Extent3D {
                        width: w,
                        height: h,
                        depth: dim[2].max(1),
                    })
                    .build();
                device.cmd_copy_buffer_to_image(
                    cmd,
                    staging_raw,
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[copy],
                );
                offset += level_bytes * layers as u64;
            }

            if generate {
                // Blit the chain downward one level at a time.
                for level in 1..mip_levels {
                    let src_to_read = vk::ImageMemoryBarrier::builder()
                        .image(image)
                        .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                        .new_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
                        .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                        .dst_access_mask(vk::AccessFlags::TRANSFER_READ)
                        .subresource_range(
                            vk::ImageSubresourceRange::builder()
                                .aspect_mask(aspect)
                                .base_mip_level(level - 1)
                                .level_count(1)
                                .base_array_layer(0)
                                .layer_count(layers)
                                .build(),
                        )
                        .build();
                    device.cmd_pipeline_barrier(
                        cmd,
                        vk::PipelineStageFlags::TRANSFER,
                        vk::PipelineStageFlags::TRANSFER,
                        vk::DependencyFlags::empty(),
                        &[],
                        &[],
                        &[src_to_read],
                    );

                    let (sw, sh) = mip_extent(dim[0], dim[1], level - 1);
                    let (dw, dh) = mip_extent(dim[0], dim[1], level);
                    let blit = vk::ImageBlit::builder()
                        .src_subresource(
                            vk::ImageSubresourceLayers::builder()
                                .aspect_mask(aspect)
                                .mip_level(level - 1)
                                .base_array_layer(0)
                                .layer_count(layers)
                                .build(),
                        )
                        .src_offsets([
                            vk::Offset3D { x: 0, y: 0, z: 0 },
                            vk::Offset3D {
                                x: sw as i32,
                                y: sh as i32,
                                z: 1,
                            },
                        ])
                        .dst_subresource(
                            vk::ImageSubresourceLayers::builder()
                                .aspect_mask(aspect)
                                .mip_level(level)
                                .base_array_layer(0)
                                .layer_count(layers)
                                .build(),
                        )
                        .dst_offsets([
                            vk::Offset3D { x: 0, y: 0, z: 0 },
                            vk::Offset3D {
                                x: dw as i32,
                                y: dh as i32,
                                z: 1,
                            },
                        ])
                        .build();
                    device.cmd_blit_image(
                        cmd,
                        image,
                        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                        image,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        &[blit],
                        vk::Filter::LINEAR,
                    );
                }

                // Levels 0..n-1 are TRANSFER_SRC, the last is TRANSFER_DST.
                let read_levels = vk::ImageMemoryBarrier::builder()
                    .image(image)
                    .old_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
                    .new_layout(final_layout)
                    .src_access_mask(vk::AccessFlags::TRANSFER_READ)
                    .dst_access_mask(vk::AccessFlags::MEMORY_READ)
                    .subresource_range(
                        vk::ImageSubresourceRange::builder()
                            .aspect_mask(aspect)
                            .base_mip_level(0)
                            .level_count(mip_levels - 1)
                            .base_array_layer(0)
                            .layer_count(layers)
                            .build(),
                    )
                    .build();
                let last_level = vk::ImageMemoryBarrier::builder()
                    .image(image)
                    .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                    .new_layout(final_layout)
                    .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                    .dst_access_mask(vk::AccessFlags::MEMORY_READ)
                    .subresource_range(
                        vk::ImageSubresourceRange::builder()
                            .aspect_mask(aspect)
                            .base_mip_level(mip_levels - 1)
                            .level_count(1)
                            .base_array_layer(0)
                            .layer_count(layers)
                            .build(),
                    )
                    .build();
                device.cmd_pipeline_barrier(
                    cmd,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::PipelineStageFlags::ALL_COMMANDS,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[read_levels, last_level],
                );
            } else {
                let to_final = vk::ImageMemoryBarrier::builder()
                    .image(image)
                    .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                    .new_layout(final_layout)
                    .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                    .dst_access_mask(vk::AccessFlags::MEMORY_READ)
                    .subresource_range(range_all)
                    .build();
                device.cmd_pipeline_barrier(
                    cmd,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::PipelineStageFlags::ALL_COMMANDS,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[to_final],
                );
            }
        })?;

        self.release_buffer(staging)
    }

    pub fn add_ref_texture(&mut self, handle: Handle<Texture>) -> Result<()> {
        self.textures
            .add_ref(retype(handle))
            .map(|_| ())
            .ok_or(GpuError::InvalidHandle("texture"))
    }

    pub fn release_texture(&mut self, handle: Handle<Texture>) -> Result<()> {
        match self.textures.release(retype::<Texture, VkTexture>(handle)) {
            None => Err(GpuError::InvalidHandle("texture")),
            Some(Release::Alive(_)) => Ok(()),
            Some(Release::Destroyed(mut tex)) => {
                unsafe {
                    self.device.destroy_image_view(tex.view, None);
                    if let Some(alloc) = tex.alloc.as_mut() {
                        self.allocator.destroy_image(tex.raw, alloc);
                    }
                }
                Ok(())
            }
        }
    }

    pub fn make_sampler(&mut self, info: &SamplerInfo) -> Result<Handle<Sampler>> {
        if info.anisotropy_enable && info.max_anisotropy > self.limits.max_anisotropy {
            return Err(GpuError::InvalidInfo("anisotropy exceeds device limit"));
        }
        let sampler = unsafe {
            self.device.create_sampler(
                &vk::SamplerCreateInfo::builder()
                    .mag_filter(info.mag_filter.into())
                    .min_filter(info.min_filter.into())
                    .mipmap_mode(info.mipmap_filter.into())
                    .address_mode_u(info.address_mode_u.into())
                    .address_mode_v(info.address_mode_v.into())
                    .address_mode_w(info.address_mode_w.into())
                    .anisotropy_enable(info.anisotropy_enable)
                    .max_anisotropy(info.max_anisotropy)
                    .compare_enable(info.compare.is_some())
                    .compare_op(info.compare.unwrap_or(CompareOp::Always).into())
                    .min_lod(info.min_lod)
                    .max_lod(info.max_lod)
                    .border_color(info.border_color.into())
                    .build(),
                None,
            )
        }?;
        self.set_name(sampler, info.debug_name, vk::ObjectType::SAMPLER);

        match self.samplers.insert(VkSampler { raw: sampler }) {
            Some(handle) => Ok(retype(handle)),
            None => {
                unsafe { self.device.destroy_sampler(sampler, None) };
                Err(GpuError::Exhausted("sampler"))
            }
        }
    }

    pub fn add_ref_sampler(&mut self, handle: Handle<Sampler>) -> Result<()> {
        self.samplers
            .add_ref(retype(handle))
            .map(|_| ())
            .ok_or(GpuError::InvalidHandle("sampler"))
    }

    pub fn release_sampler(&mut self, handle: Handle<Sampler>) -> Result<()> {
        match self.samplers.release(retype::<Sampler, VkSampler>(handle)) {
            None => Err(GpuError::InvalidHandle("sampler")),
            Some(Release::Alive(_)) => Ok(()),
            Some(Release::Destroyed(s)) => {
                unsafe { self.device.destroy_sampler(s.raw, None) };
                Ok(())
            }
        }
    }

    //===------------------------------------------------------------------===//
    // Shader programs
    //===------------------------------------------------------------------===//

    pub fn make_shader_program(&mut self, info: &ShaderProgramInfo) -> Result<Handle<ShaderProgram>> {
        if info.stages.is_empty() {
            return Err(GpuError::InvalidInfo("shader program needs at least one stage"));
        }
        let mut stages = Vec::with_capacity(info.stages.len());
        for stage in info.stages {
            let words = match stage.source {
                ShaderSource::SpirV(words) => words,
                ShaderSource::Glsl(_) => {
                    for (_, module, _) in &stages {
                        unsafe { self.device.destroy_shader_module(*module, None) };
                    }
                    return Err(GpuError::MissingCapability(
                        "GLSL source on the Vulkan backend; supply SPIR-V",
                    ));
                }
            };
            if words.is_empty() {
                for (_, module, _) in &stages {
                    unsafe { self.device.destroy_shader_module(*module, None) };
                }
                return Err(GpuError::InvalidInfo("empty SPIR-V module"));
            }
            let module = unsafe {
                self.device.create_shader_module(
                    &vk::ShaderModuleCreateInfo::builder().code(words).build(),
                    None,
                )
            };
            let module = match module {
                Ok(module) => module,
                Err(res) => {
                    error!("shader '{}' ({:?}): module creation failed: {}", info.debug_name, stage.stage, res);
                    for (_, module, _) in &stages {
                        unsafe { self.device.destroy_shader_module(*module, None) };
                    }
                    return Err(res.into());
                }
            };
            self.set_name(module, info.debug_name, vk::ObjectType::SHADER_MODULE);
            let entry = CString::new(stage.entry_point).unwrap_or_else(|_| CString::new("main").unwrap());
            stages.push((stage.stage, module, entry));
        }

        match self.programs.insert(VkProgram { stages }) {
            Some(handle) => Ok(retype(handle)),
            None => Err(GpuError::Exhausted("shader program")),
        }
    }

    pub fn add_ref_shader_program(&mut self, handle: Handle<ShaderProgram>) -> Result<()> {
        self.programs
            .add_ref(retype(handle))
            .map(|_| ())
            .ok_or(GpuError::InvalidHandle("shader program"))
    }

    pub fn release_shader_program(&mut self, handle: Handle<ShaderProgram>) -> Result<()> {
        match self.programs.release(retype::<ShaderProgram, VkProgram>(handle)) {
            None => Err(GpuError::InvalidHandle("shader program")),
            Some(Release::Alive(_)) => Ok(()),
            Some(Release::Destroyed(program)) => {
                for (_, module, _) in program.stages {
                    unsafe { self.device.destroy_shader_module(module, None) };
                }
                Ok(())
            }
        }
    }

    //===------------------------------------------------------------------===//
    // Binding model
    //===------------------------------------------------------------------===//

    pub fn make_bind_group_layout(
        &mut self,
        info: &BindGroupLayoutInfo,
    ) -> Result<Handle<BindGroupLayout>> {
        if info.ranges.is_empty() {
            return Err(GpuError::InvalidInfo("bind group layout needs ranges"));
        }
        let bindings: Vec<vk::DescriptorSetLayoutBinding> = info
            .ranges
            .iter()
            .map(|range| {
                vk::DescriptorSetLayoutBinding::builder()
                    .binding(range.binding)
                    .descriptor_type(range.ty.into())
                    .descriptor_count(range.count.max(1))
                    .stage_flags(range.visibility.into())
                    .build()
            })
            .collect();

        let layout = unsafe {
            self.device.create_descriptor_set_layout(
                &vk::DescriptorSetLayoutCreateInfo::builder()
                    .bindings(&bindings)
                    .build(),
                None,
            )
        }?;
        self.set_name(layout, info.debug_name, vk::ObjectType::DESCRIPTOR_SET_LAYOUT);

        let pool_sizes: Vec<vk::DescriptorPoolSize> = bindings
            .iter()
            .map(|binding| {
                vk::DescriptorPoolSize::builder()
                    .ty(binding.descriptor_type)
                    .descriptor_count(binding.descriptor_count * 64)
                    .build()
            })
            .collect();
        let pool = unsafe {
            self.device.create_descriptor_pool(
                &vk::DescriptorPoolCreateInfo::builder()
                    .pool_sizes(&pool_sizes)
                    .max_sets(64)
                    .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
                    .build(),
                None,
            )
        }?;

        match self.bind_group_layouts.insert(VkBindGroupLayout {
            raw: layout,
            pool,
            ranges: info.ranges.to_vec(),
            block_bindings: uniform_block_bindings(info.ranges),
        }) {
            Some(handle) => Ok(retype(handle)),
            None => {
                unsafe {
                    self.device.destroy_descriptor_pool(pool, None);
                    self.device.destroy_descriptor_set_layout(layout, None);
                }
                Err(GpuError::Exhausted("bind group layout"))
            }
        }
    }

    pub fn add_ref_bind_group_layout(&mut self, handle: Handle<BindGroupLayout>) -> Result<()> {
        self.bind_group_layouts
            .add_ref(retype(handle))
            .map(|_| ())
            .ok_or(GpuError::InvalidHandle("bind group layout"))
    }

    pub fn release_bind_group_layout(&mut self, handle: Handle<BindGroupLayout>) -> Result<()> {
        match self
            .bind_group_layouts
            .release(retype::<BindGroupLayout, VkBindGroupLayout>(handle))
        {
            None => Err(GpuError::InvalidHandle("bind group layout")),
            Some(Release::Alive(_)) => Ok(()),
            Some(Release::Destroyed(layout)) => {
                unsafe {
                    self.device.destroy_descriptor_pool(layout.pool, None);
                    self.device.destroy_descriptor_set_layout(layout.raw, None);
                }
                Ok(())
            }
        }
    }

    pub fn bind_group_layout_blocks(
        &self,
        handle: Handle<BindGroupLayout>,
    ) -> Result<Vec<Option<u32>>> {
        self.bind_group_layouts
            .get_ref(retype(handle))
            .map(|l| l.block_bindings.clone())
            .ok_or(GpuError::InvalidHandle("bind group layout"))
    }

    pub fn make_bind_group(&mut self, info: &BindGroupInfo) -> Result<Handle<BindGroup>> {
        if info.parameter_index >= MAX_BIND_GROUPS as u32 {
            return Err(GpuError::InvalidInfo("root parameter index out of range"));
        }
        let (set_layout, pool, ranges) = {
            let layout = self
                .bind_group_layouts
                .get_ref(retype(info.layout))
                .ok_or(GpuError::InvalidHandle("bind group layout"))?;
            (layout.raw, layout.pool, layout.ranges.clone())
        };
        validate::bind_group_bindings(&ranges, info.bindings)?;
        if info
            .bindings
            .iter()
            .any(|b| matches!(b, ResourceBinding::StorageTexture(_)))
        {
            return Err(GpuError::MissingCapability(
                "storage textures in unordered-access ranges on this backend",
            ));
        }

        let layouts = [set_layout];
        let set = unsafe {
            self.device.allocate_descriptor_sets(
                &vk::DescriptorSetAllocateInfo::builder()
                    .descriptor_pool(pool)
                    .set_layouts(&layouts)
                    .build(),
            )
        }?[0];
        self.set_name(set, info.debug_name, vk::ObjectType::DESCRIPTOR_SET);

        // Buffer/image info arrays must outlive the write submission, and
        // the writes hold raw pointers into them, so neither vec may grow
        // past its reserved capacity.
        let mut buffer_infos: Vec<Vec<vk::DescriptorBufferInfo>> = Vec::with_capacity(ranges.len());
        let mut image_infos: Vec<Vec<vk::DescriptorImageInfo>> = Vec::with_capacity(ranges.len());
        let mut writes: Vec<vk::WriteDescriptorSet> = Vec::new();
        let mut entry = 0usize;
        for range in &ranges {
            let count = range.count.max(1) as usize;
            let slice = &info.bindings[entry..entry + count];
            entry += count;
            match range.ty {
                DescriptorRangeType::UniformBuffer | DescriptorRangeType::UnorderedAccess => {
                    let mut infos = Vec::with_capacity(count);
                    for binding in slice {
                        let handle = match binding {
                            ResourceBinding::UniformBuffer(h) | ResourceBinding::StorageBuffer(h) => *h,
                            _ => unreachable!("validated against the range type"),
                        };
                        let buf = self
                            .buffers
                            .get_ref(retype(handle))
                            .ok_or(GpuError::InvalidHandle("bind group buffer"))?;
                        infos.push(
                            vk::DescriptorBufferInfo::builder()
                                .buffer(buf.raw)
                                .offset(0)
                                .range(buf.byte_size as u64)
                                .build(),
                        );
                    }
                    buffer_infos.push(infos);
                    writes.push(
                        vk::WriteDescriptorSet::builder()
                            .dst_set(set)
                            .dst_binding(range.binding)
                            .descriptor_type(range.ty.into())
                            .buffer_info(buffer_infos.last().unwrap())
                            .build(),
                    );
                }
                DescriptorRangeType::ShaderResource => {
                    let mut infos = Vec::with_capacity(count);
                    for binding in slice {
                        let handle = match binding {
                            ResourceBinding::SampledTexture(h) => *h,
                            _ => unreachable!("validated against the range type"),
                        };
                        let tex = self
                            .textures
                            .get_ref(retype(handle))
                            .ok_or(GpuError::InvalidHandle("bind group texture"))?;
                        infos.push(
                            vk::DescriptorImageInfo::builder()
                                .image_view(tex.view)
                                .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                                .build(),
                        );
                    }
                    image_infos.push(infos);
                    writes.push(
                        vk::WriteDescriptorSet::builder()
                            .dst_set(set)
                            .dst_binding(range.binding)
                            .descriptor_type(vk::DescriptorType::SAMPLED_IMAGE)
                            .image_info(image_infos.last().unwrap())
                            .build(),
                    );
                }
                DescriptorRangeType::Sampler => {
                    let mut infos = Vec::with_capacity(count);
                    for binding in slice {
                        let handle = match binding {
                            ResourceBinding::Sampler(h) => *h,
                            _ => unreachable!("validated against the range type"),
                        };
                        let sampler = self
                            .samplers
                            .get_ref(retype(handle))
                            .ok_or(GpuError::InvalidHandle("bind group sampler"))?;
                        infos.push(
                            vk::DescriptorImageInfo::builder()
                                .sampler(sampler.raw)
                                .build(),
                        );
                    }
                    image_infos.push(infos);
                    writes.push(
                        vk::WriteDescriptorSet::builder()
                            .dst_set(set)
                            .dst_binding(range.binding)
                            .descriptor_type(vk::DescriptorType::SAMPLER)
                            .image_info(image_infos.last().unwrap())
                            .build(),
                    );
                }
            }
        }
        unsafe { self.device.update_descriptor_sets(&writes, &[]) };

        self.bind_group_layouts.add_ref(retype(info.layout));
        for binding in info.bindings {
            match binding {
                ResourceBinding::UniformBuffer(h) | ResourceBinding::StorageBuffer(h) => {
                    self.buffers.add_ref(retype::<Buffer, VkBuffer>(*h));
                }
                ResourceBinding::SampledTexture(h) | ResourceBinding::StorageTexture(h) => {
                    self.textures.add_ref(retype::<Texture, VkTexture>(*h));
                }
                ResourceBinding::Sampler(h) => {
                    self.samplers.add_ref(retype::<Sampler, VkSampler>(*h));
                }
            }
        }

        match self.bind_groups.insert(VkBindGroup {
            set,
            layout: info.layout,
            bindings: info.bindings.to_vec(),
        }) {
            Some(handle) => Ok(retype(handle)),
            None => {
                self.release_bind_group_children(info.layout, info.bindings);
                let _ = unsafe { self.device.free_descriptor_sets(pool, &[set]) };
                Err(GpuError::Exhausted("bind group"))
            }
        }
    }

    fn release_bind_group_children(
        &mut self,
        layout: Handle<BindGroupLayout>,
        bindings: &[ResourceBinding],
    ) {
        let _ = self.release_bind_group_layout(layout);
        for binding in bindings.to_vec() {
            let _ = match binding {
                ResourceBinding::UniformBuffer(h) | ResourceBinding::StorageBuffer(h) => {
                    self.release_buffer(h)
                }
                ResourceBinding::SampledTexture(h) | ResourceBinding::StorageTexture(h) => {
                    self.release_texture(h)
                }
                ResourceBinding::Sampler(h) => self.release_sampler(h),
            };
        }
    }

    pub fn add_ref_bind_group(&mut self, handle: Handle<BindGroup>) -> Result<()> {
        self.bind_groups
            .add_ref(retype(handle))
            .map(|_| ())
            .ok_or(GpuError::InvalidHandle("bind group"))
    }

    pub fn release_bind_group(&mut self, handle: Handle<BindGroup>) -> Result<()> {
        match self.bind_groups.release(retype::<BindGroup, VkBindGroup>(handle)) {
            None => Err(GpuError::InvalidHandle("bind group")),
            Some(Release::Alive(_)) => Ok(()),
            Some(Release::Destroyed(group)) => {
                if let Some(layout) = self.bind_group_layouts.get_ref(retype(group.layout)) {
                    let _ = unsafe {
                        self.device.free_descriptor_sets(layout.pool, &[group.set])
                    };
                }
                self.release_bind_group_children(group.layout, &group.bindings);
                Ok(())
            }
        }
    }

    //===------------------------------------------------------------------===//
    // Render passes, vertex arrays, pipelines
    //===------------------------------------------------------------------===//

    pub fn make_render_pass(&mut self, info: &RenderPassInfo) -> Result<Handle<RenderPass>> {
        validate::render_pass_info(info)?;
        if info.color_formats.len() as u32 > self.limits.max_color_attachments {
            return Err(GpuError::MissingCapability("color attachment count"));
        }

        let mut attachments = Vec::new();
        let mut color_refs = Vec::new();
        for (i, format) in info.color_formats.iter().enumerate() {
            attachments.push(
                vk::AttachmentDescription::builder()
                    .format(conv::image_format(*format))
                    .samples(info.samples.into())
                    .load_op(vk::AttachmentLoadOp::LOAD)
                    .store_op(vk::AttachmentStoreOp::STORE)
                    .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                    .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .initial_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                    .final_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                    .build(),
            );
            color_refs.push(
                vk::AttachmentReference::builder()
                    .attachment(i as u32)
                    .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                    .build(),
            );
        }
        let depth_ref = info.depth_stencil_format.map(|format| {
            attachments.push(
                vk::AttachmentDescription::builder()
                    .format(conv::image_format(format))
                    .samples(info.samples.into())
                    .load_op(vk::AttachmentLoadOp::LOAD)
                    .store_op(vk::AttachmentStoreOp::STORE)
                    .stencil_load_op(vk::AttachmentLoadOp::LOAD)
                    .stencil_store_op(vk::AttachmentStoreOp::STORE)
                    .initial_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                    .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                    .build(),
            );
            vk::AttachmentReference::builder()
                .attachment(attachments.len() as u32 - 1)
                .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                .build()
        });

        let mut subpass = vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs);
        if let Some(depth_ref) = depth_ref.as_ref() {
            subpass = subpass.depth_stencil_attachment(depth_ref);
        }
        let subpasses = [subpass.build()];

        let render_pass = unsafe {
            self.device.create_render_pass(
                &vk::RenderPassCreateInfo::builder()
                    .attachments(&attachments)
                    .subpasses(&subpasses)
                    .build(),
                None,
            )
        }?;
        self.set_name(render_pass, info.debug_name, vk::ObjectType::RENDER_PASS);

        match self.render_passes.insert(VkRenderPass {
            raw: render_pass,
            color_count: info.color_formats.len() as u32,
        }) {
            Some(handle) => Ok(retype(handle)),
            None => {
                unsafe { self.device.destroy_render_pass(render_pass, None) };
                Err(GpuError::Exhausted("render pass"))
            }
        }
    }

    pub fn add_ref_render_pass(&mut self, handle: Handle<RenderPass>) -> Result<()> {
        self.render_passes
            .add_ref(retype(handle))
            .map(|_| ())
            .ok_or(GpuError::InvalidHandle("render pass"))
    }

    pub fn release_render_pass(&mut self, handle: Handle<RenderPass>) -> Result<()> {
        match self
            .render_passes
            .release(retype::<RenderPass, VkRenderPass>(handle))
        {
            None => Err(GpuError::InvalidHandle("render pass")),
            Some(Release::Alive(_)) => Ok(()),
            Some(Release::Destroyed(rp)) => {
                unsafe { self.device.destroy_render_pass(rp.raw, None) };
                Ok(())
            }
        }
    }

    pub fn make_vertex_array(&mut self, info: &VertexArrayInfo) -> Result<Handle<VertexArray>> {
        for binding in info.buffers {
            if !self.buffers.is_live(retype(binding.buffer)) {
                return Err(GpuError::InvalidHandle("vertex buffer"));
            }
        }
        if let Some(index) = info.index_buffer {
            if !self.buffers.is_live(retype(index)) {
                return Err(GpuError::InvalidHandle("index buffer"));
            }
        }

        for binding in info.buffers {
            self.buffers.add_ref(retype::<Buffer, VkBuffer>(binding.buffer));
        }
        if let Some(index) = info.index_buffer {
            self.buffers.add_ref(retype::<Buffer, VkBuffer>(index));
        }

        match self.vertex_arrays.insert(VkVertexArray {
            buffers: info.buffers.iter().map(|b| b.buffer).collect(),
            index_buffer: info.index_buffer,
            index_type: info.index_type,
        }) {
            Some(handle) => Ok(retype(handle)),
            None => {
                for binding in info.buffers {
                    let _ = self.release_buffer(binding.buffer);
                }
                if let Some(index) = info.index_buffer {
                    let _ = self.release_buffer(index);
                }
                Err(GpuError::Exhausted("vertex array"))
            }
        }
    }

    pub fn add_ref_vertex_array(&mut self, handle: Handle<VertexArray>) -> Result<()> {
        self.vertex_arrays
            .add_ref(retype(handle))
            .map(|_| ())
            .ok_or(GpuError::InvalidHandle("vertex array"))
    }

    pub fn release_vertex_array(&mut self, handle: Handle<VertexArray>) -> Result<()> {
        match self
            .vertex_arrays
            .release(retype::<VertexArray, VkVertexArray>(handle))
        {
            None => Err(GpuError::InvalidHandle("vertex array")),
            Some(Release::Alive(_)) => Ok(()),
            Some(Release::Destroyed(va)) => {
                for buffer in va.buffers {
                    let _ = self.release_buffer(buffer);
                }
                if let Some(index) = va.index_buffer {
                    let _ = self.release_buffer(index);
                }
                Ok(())
            }
        }
    }

    fn create_pipeline_layout(
        &self,
        layouts: &[Option<Handle<BindGroupLayout>>; MAX_BIND_GROUPS],
    ) -> Result<vk::PipelineLayout> {
        let last = layouts.iter().rposition(Option::is_some).map_or(0, |i| i + 1);
        let mut raw_layouts = Vec::with_capacity(last);
        for layout in &layouts[..last] {
            match layout {
                Some(handle) => raw_layouts.push(
                    self.bind_group_layouts
                        .get_ref(retype(*handle))
                        .ok_or(GpuError::InvalidHandle("bind group layout"))?
                        .raw,
                ),
                None => raw_layouts.push(self.empty_set_layout),
            }
        }
        Ok(unsafe {
            self.device.create_pipeline_layout(
                &vk::PipelineLayoutCreateInfo::builder()
                    .set_layouts(&raw_layouts)
                    .build(),
                None,
            )
        }?)
    }

    pub fn make_graphics_pipeline(
        &mut self,
        info: &GraphicsPipelineInfo,
    ) -> Result<Handle<GraphicsPipeline>> {
        let patch_control_points = validate::topology(info.topology, &self.limits)?;
        let (render_pass_raw, pass_colors) = {
            let rp = self
                .render_passes
                .get_ref(retype(info.render_pass))
                .ok_or(GpuError::InvalidHandle("render pass"))?;
            (rp.raw, rp.color_count)
        };
        if !info.blend.is_empty() && info.blend.len() as u32 != pass_colors {
            return Err(GpuError::InvalidInfo("blend state count does not match render pass"));
        }

        let shader_stages: Vec<vk::PipelineShaderStageCreateInfo> = {
            let program = self
                .programs
                .get_ref(retype(info.program))
                .ok_or(GpuError::InvalidHandle("shader program"))?;
            program
                .stages
                .iter()
                .map(|(stage, module, entry)| {
                    vk::PipelineShaderStageCreateInfo::builder()
                        .stage((*stage).into())
                        .module(*module)
                        .name(entry)
                        .build()
                })
                .collect()
        };

        let vertex_bindings: Vec<vk::VertexInputBindingDescription> = info
            .vertex_buffers
            .iter()
            .enumerate()
            .map(|(i, layout)| {
                vk::VertexInputBindingDescription::builder()
                    .binding(i as u32)
                    .stride(layout.stride)
                    .input_rate(match layout.step {
                        VertexStepRate::Vertex => vk::VertexInputRate::VERTEX,
                        VertexStepRate::Instance => vk::VertexInputRate::INSTANCE,
                    })
                    .build()
            })
            .collect();
        let vertex_attribs: Vec<vk::VertexInputAttributeDescription> = info
            .vertex_attributes
            .iter()
            .map(|attr| {
                vk::VertexInputAttributeDescription::builder()
                    .location(attr.location)
                    .binding(attr.buffer_index)
                    .format(attr.format.into())
                    .offset(attr.offset)
                    .build()
            })
            .collect();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&vertex_bindings)
            .vertex_attribute_descriptions(&vertex_attribs)
            .build();

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(conv::primitive_topology(info.topology))
            .primitive_restart_enable(false)
            .build();
        let tessellation = vk::PipelineTessellationStateCreateInfo::builder()
            .patch_control_points(patch_control_points.unwrap_or(0) as u32)
            .build();

        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1)
            .build();

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(info.rasterizer.depth_clamp)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(info.rasterizer.cull.into())
            .front_face(info.rasterizer.front_face.into())
            .depth_bias_enable(
                info.rasterizer.depth_bias != 0.0 || info.rasterizer.slope_scaled_depth_bias != 0.0,
            )
            .depth_bias_constant_factor(info.rasterizer.depth_bias)
            .depth_bias_slope_factor(info.rasterizer.slope_scaled_depth_bias)
            .line_width(1.0)
            .build();

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .build();

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(info.depth_stencil.depth_test)
            .depth_write_enable(info.depth_stencil.depth_write)
            .depth_compare_op(info.depth_stencil.compare.into())
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0)
            .build();

        let blend_states: Vec<vk::PipelineColorBlendAttachmentState> = if info.blend.is_empty() {
            (0..pass_colors)
                .map(|_| ColorBlendState::default().into())
                .collect()
        } else {
            info.blend.iter().map(|b| (*b).into()).collect()
        };
        let color_blend = vk::PipelineColorBlendStateCreateInfo::builder()
            .attachments(&blend_states)
            .build();

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder()
            .dynamic_states(&dynamic_states)
            .build();

        let pipeline_layout = self.create_pipeline_layout(&info.bind_group_layouts)?;
        self.set_name(pipeline_layout, info.debug_name, vk::ObjectType::PIPELINE_LAYOUT);

        let mut pipeline_ci = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic_state)
            .layout(pipeline_layout)
            .render_pass(render_pass_raw)
            .subpass(0);
        if patch_control_points.is_some() {
            pipeline_ci = pipeline_ci.tessellation_state(&tessellation);
        }

        let pipeline = unsafe {
            self.device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_ci.build()], None)
                .map_err(|(_, res)| GpuError::from(res))?[0]
        };
        self.set_name(pipeline, info.debug_name, vk::ObjectType::PIPELINE);

        self.programs.add_ref(retype::<ShaderProgram, VkProgram>(info.program));
        self.render_passes
            .add_ref(retype::<RenderPass, VkRenderPass>(info.render_pass));
        for layout in info.bind_group_layouts.iter().flatten() {
            self.bind_group_layouts
                .add_ref(retype::<BindGroupLayout, VkBindGroupLayout>(*layout));
        }

        match self.graphics_pipelines.insert(VkGraphicsPipeline {
            raw: pipeline,
            pipeline_layout,
            program: info.program,
            layouts: info.bind_group_layouts,
            render_pass: info.render_pass,
            patch_control_points,
        }) {
            Some(handle) => Ok(retype(handle)),
            None => {
                unsafe {
                    self.device.destroy_pipeline(pipeline, None);
                    self.device.destroy_pipeline_layout(pipeline_layout, None);
                }
                self.release_pipeline_children(
                    info.program,
                    Some(info.render_pass),
                    &info.bind_group_layouts,
                );
                Err(GpuError::Exhausted("graphics pipeline"))
            }
        }
    }

    fn release_pipeline_children(
        &mut self,
        program: Handle<ShaderProgram>,
        render_pass: Option<Handle<RenderPass>>,
        layouts: &[Option<Handle<BindGroupLayout>>; MAX_BIND_GROUPS],
    ) {
        let _ = self.release_shader_program(program);
        if let Some(rp) = render_pass {
            let _ = self.release_render_pass(rp);
        }
        for layout in layouts.iter().flatten() {
            let _ = self.release_bind_group_layout(*layout);
        }
    }

    pub fn add_ref_graphics_pipeline(&mut self, handle: Handle<GraphicsPipeline>) -> Result<()> {
        self.graphics_pipelines
            .add_ref(retype(handle))
            .map(|_| ())
            .ok_or(GpuError::InvalidHandle("graphics pipeline"))
    }

    pub fn release_graphics_pipeline(&mut self, handle: Handle<GraphicsPipeline>) -> Result<()> {
        match self
            .graphics_pipelines
            .release(retype::<GraphicsPipeline, VkGraphicsPipeline>(handle))
        {
            None => Err(GpuError::InvalidHandle("graphics pipeline")),
            Some(Release::Alive(_)) => Ok(()),
            Some(Release::Destroyed(pso)) => {
                unsafe {
                    self.device.destroy_pipeline(pso.raw, None);
                    self.device.destroy_pipeline_layout(pso.pipeline_layout, None);
                }
                self.release_pipeline_children(pso.program, Some(pso.render_pass), &pso.layouts);
                Ok(())
            }
        }
    }

    pub fn make_compute_pipeline(
        &mut self,
        info: &ComputePipelineInfo,
    ) -> Result<Handle<ComputePipeline>> {
        let stage = {
            let program = self
                .programs
                .get_ref(retype(info.program))
                .ok_or(GpuError::InvalidHandle("shader program"))?;
            let Some((_, module, entry)) = program
                .stages
                .iter()
                .find(|(stage, _, _)| *stage == ShaderStage::Compute)
            else {
                return Err(GpuError::InvalidInfo("compute pipeline needs a compute stage"));
            };
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::COMPUTE)
                .module(*module)
                .name(entry)
                .build()
        };

        let pipeline_layout = self.create_pipeline_layout(&info.bind_group_layouts)?;
        let pipeline = unsafe {
            self.device
                .create_compute_pipelines(
                    vk::PipelineCache::null(),
                    &[vk::ComputePipelineCreateInfo::builder()
                        .layout(pipeline_layout)
                        .stage(stage)
                        .build()],
                    None,
                )
                .map_err(|(_, res)| GpuError::from(res))?[0]
        };
        self.set_name(pipeline, info.debug_name, vk::ObjectType::PIPELINE);

        self.programs.add_ref(retype::<ShaderProgram, VkProgram>(info.program));
        for layout in info.bind_group_layouts.iter().flatten() {
            self.bind_group_layouts
                .add_ref(retype::<BindGroupLayout, VkBindGroupLayout>(*layout));
        }

        match self.compute_pipelines.insert(VkComputePipeline {
            raw: pipeline,
            pipeline_layout,
            program: info.program,
            layouts: info.bind_group_layouts,
        }) {
            Some(handle) => Ok(retype(handle)),
            None => {
                unsafe {
                    self.device.destroy_pipeline(pipeline, None);
                    self.device.destroy_pipeline_layout(pipeline_layout, None);
                }
                self.release_pipeline_children(info.program, None, &info.bind_group_layouts);
                Err(GpuError::Exhausted("compute pipeline"))
            }
        }
    }

    pub fn add_ref_compute_pipeline(&mut self, handle: Handle<ComputePipeline>) -> Result<()> {
        self.compute_pipelines
            .add_ref(retype(handle))
            .map(|_| ())
            .ok_or(GpuError::InvalidHandle("compute pipeline"))
    }

    pub fn release_compute_pipeline(&mut self, handle: Handle<ComputePipeline>) -> Result<()> {
        match self
            .compute_pipelines
            .release(retype::<ComputePipeline, VkComputePipeline>(handle))
        {
            None => Err(GpuError::InvalidHandle("compute pipeline")),
            Some(Release::Alive(_)) => Ok(()),
            Some(Release::Destroyed(pso)) => {
                unsafe {
                    self.device.destroy_pipeline(pso.raw, None);
                    self.device.destroy_pipeline_layout(pso.pipeline_layout, None);
                }
                self.release_pipeline_children(pso.program, None, &pso.layouts);
                Ok(())
            }
        }
    }

    //===------------------------------------------------------------------===//
    // Submission
    //===------------------------------------------------------------------===//

    pub fn submit(&mut self, encoder: &CommandEncoder) -> Result<()> {
        if encoder.marker_depth() != 0 {
            return Err(GpuError::InvalidInfo("unbalanced debug marker scopes"));
        }
        let cmd = unsafe {
            self.device.allocate_command_buffers(
                &vk::CommandBufferAllocateInfo::builder()
                    .command_pool(self.cmd_pool)
                    .level(vk::CommandBufferLevel::PRIMARY)
                    .command_buffer_count(1)
                    .build(),
            )
        }?[0];
        unsafe {
            self.device.begin_command_buffer(
                cmd,
                &vk::CommandBufferBeginInfo::builder()
                    .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)
                    .build(),
            )
        }?;
        if let Some(timer) = &self.timer {
            unsafe { timer.begin(&self.device, cmd) };
        }

        let (used_swapchain, pending_framebuffers) = {
            let mut sink = VkSink {
                ctx: self,
                cmd,
                gfx_layout: vk::PipelineLayout::null(),
                compute_layout: vk::PipelineLayout::null(),
                pass_extent: vk::Extent2D::default(),
                has_depth: false,
                color_count: 0,
                used_swapchain: None,
                pending_framebuffers: Vec::new(),
            };
            encoder.submit(&mut sink);
            (sink.used_swapchain, sink.pending_framebuffers)
        };

        if let Some(timer) = &self.timer {
            unsafe { timer.end(&self.device, cmd) };
        }
        unsafe { self.device.end_command_buffer(cmd) }?;

        // When the stream rendered into a backbuffer the submission waits
        // for the acquire semaphore and signals the present semaphore.
        let mut wait_sems = Vec::new();
        let mut signal_sems = Vec::new();
        if let Some(sc_handle) = used_swapchain {
            if let Some(sc) = self.swapchains.get_ref(retype(sc_handle)) {
                wait_sems.push(sc.acquire_semaphore());
                signal_sems.push(sc.render_semaphore());
            }
        }
        let wait_stages = vec![vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT; wait_sems.len()];
        let cmds = [cmd];
        let submit = vk::SubmitInfo::builder()
            .command_buffers(&cmds)
            .wait_semaphores(&wait_sems)
            .wait_dst_stage_mask(&wait_stages)
            .signal_semaphores(&signal_sems)
            .build();
        let fence = unsafe {
            self.device
                .create_fence(&vk::FenceCreateInfo::builder().build(), None)
        }?;
        unsafe {
            self.device.queue_submit(self.queue, &[submit], fence)?;
            self.device.wait_for_fences(&[fence], true, u64::MAX)?;
            self.device.destroy_fence(fence, None);
            self.device.free_command_buffers(self.cmd_pool, &cmds);
            for fb in pending_framebuffers {
                self.device.destroy_framebuffer(fb, None);
            }
        }

        if let Some(timer) = &self.timer {
            self.last_submit_ms = timer
                .resolve(&self.device, self.properties.limits.timestamp_period)
                .ok();
        }
        Ok(())
    }

    pub fn destroy(mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
        }
        // Shutdown sweep: force-destroy anything the application leaked.
        for handle in self.swapchains.live_handles() {
            if let Some(sc) = self.swapchains.evict(handle) {
                warn!("swapchain leaked at context shutdown");
                sc.destroy(&self.device);
            }
        }
        for handle in self.graphics_pipelines.live_handles() {
            if let Some(pso) = self.graphics_pipelines.evict(handle) {
                unsafe {
                    self.device.destroy_pipeline(pso.raw, None);
                    self.device.destroy_pipeline_layout(pso.pipeline_layout, None);
                }
            }
        }
        for handle in self.compute_pipelines.live_handles() {
            if let Some(pso) = self.compute_pipelines.evict(handle) {
                unsafe {
                    self.device.destroy_pipeline(pso.raw, None);
                    self.device.destroy_pipeline_layout(pso.pipeline_layout, None);
                }
            }
        }
        for handle in self.bind_group_layouts.live_handles() {
            if let Some(layout) = self.bind_group_layouts.evict(handle) {
                unsafe {
                    self.device.destroy_descriptor_pool(layout.pool, None);
                    self.device.destroy_descriptor_set_layout(layout.raw, None);
                }
            }
        }
        for handle in self.render_passes.live_handles() {
            if let Some(rp) = self.render_passes.evict(handle) {
                unsafe { self.device.destroy_render_pass(rp.raw, None) };
            }
        }
        for handle in self.programs.live_handles() {
            if let Some(program) = self.programs.evict(handle) {
                for (_, module, _) in program.stages {
                    unsafe { self.device.destroy_shader_module(module, None) };
                }
            }
        }
        for handle in self.samplers.live_handles() {
            if let Some(sampler) = self.samplers.evict(handle) {
                unsafe { self.device.destroy_sampler(sampler.raw, None) };
            }
        }
        for handle in self.textures.live_handles() {
            if let Some(mut tex) = self.textures.evict(handle) {
                unsafe {
                    self.device.destroy_image_view(tex.view, None);
                    if let Some(alloc) = tex.alloc.as_mut() {
                        self.allocator.destroy_image(tex.raw, alloc);
                    }
                }
            }
        }
        for handle in self.buffers.live_handles() {
            if let Some(mut buf) = self.buffers.evict(handle) {
                unsafe { self.allocator.destroy_buffer(buf.raw, &mut buf.alloc) };
            }
        }
        unsafe {
            if let Some(timer) = self.timer.take() {
                timer.destroy(&self.device);
            }
            self.device
                .destroy_descriptor_set_layout(self.empty_set_layout, None);
            self.device.destroy_command_pool(self.cmd_pool, None);
            ManuallyDrop::drop(&mut self.allocator);
            self.device.destroy_device(None);
            if let (Some(utils), Some(messenger)) = (&self.debug_utils, self.debug_messenger) {
                utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Command sink that records the abstract stream into a Vulkan command
/// buffer.
struct VkSink<'a> {
    ctx: &'a mut VulkanContext,
    cmd: vk::CommandBuffer,
    gfx_layout: vk::PipelineLayout,
    compute_layout: vk::PipelineLayout,
    pass_extent: vk::Extent2D,
    has_depth: bool,
    color_count: u32,
    used_swapchain: Option<Handle<Swapchain>>,
    pending_framebuffers: Vec<vk::Framebuffer>,
}

impl<'a> CommandSink for VkSink<'a> {
    fn begin_render_pass(&mut self, cmd: &BeginRenderPassCmd) {
        if cmd.to_backbuffer != 0 {
            match self.ctx.acquire_backbuffer(cmd.swapchain) {
                Ok((render_pass, framebuffer, extent)) => {
                    self.used_swapchain = Some(cmd.swapchain);
                    self.pass_extent = extent;
                    self.has_depth = false;
                    self.color_count = 1;
                    unsafe {
                        self.ctx.device.cmd_begin_render_pass(
                            self.cmd,
                            &vk::RenderPassBeginInfo::builder()
                                .render_pass(render_pass)
                                .framebuffer(framebuffer)
                                .render_area(vk::Rect2D {
                                    offset: vk::Offset2D { x: 0, y: 0 },
                                    extent,
                                })
                                .build(),
                            vk::SubpassContents::INLINE,
                        );
                    }
                }
                Err(err) => error!("backbuffer acquisition failed: {}", err),
            }
            return;
        }

        let Some(rp) = self.ctx.render_passes.get_ref(retype(cmd.render_pass)) else {
            error!("begin_render_pass with a dead render pass");
            return;
        };
        let rp_raw = rp.raw;
        let mut views = Vec::new();
        let mut extent = vk::Extent2D::default();
        for color in &cmd.colors[..cmd.color_count as usize] {
            if let Some(tex) = self.ctx.textures.get_ref(retype(*color)) {
                views.push(tex.view);
                extent = vk::Extent2D {
                    width: tex.dim[0],
                    height: tex.dim[1],
                };
            }
        }
        if cmd.has_depth != 0 {
            if let Some(tex) = self.ctx.textures.get_ref(retype(cmd.depth)) {
                views.push(tex.view);
                if extent.width == 0 {
                    extent = vk::Extent2D {
                        width: tex.dim[0],
                        height: tex.dim[1],
                    };
                }
            }
        }
        let framebuffer = unsafe {
            self.ctx.device.create_framebuffer(
                &vk::FramebufferCreateInfo::builder()
                    .render_pass(rp_raw)
                    .attachments(&views)
                    .width(extent.width)
                    .height(extent.height)
                    .layers(1)
                    .build(),
                None,
            )
        };
        let framebuffer = match framebuffer {
            Ok(fb) => fb,
            Err(res) => {
                error!("framebuffer creation failed: {}", res);
                return;
            }
        };
        self.pending_framebuffers.push(framebuffer);
        self.pass_extent = extent;
        self.has_depth = cmd.has_depth != 0;
        self.color_count = cmd.color_count;
        unsafe {
            self.ctx.device.cmd_begin_render_pass(
                self.cmd,
                &vk::RenderPassBeginInfo::builder()
                    .render_pass(rp_raw)
                    .framebuffer(framebuffer)
                    .render_area(vk::Rect2D {
                        offset: vk::Offset2D { x: 0, y: 0 },
                        extent,
                    })
                    .build(),
                vk::SubpassContents::INLINE,
            );
        }
    }

    fn end_render_pass(&mut self, _cmd: &EndRenderPassCmd) {
        unsafe { self.ctx.device.cmd_end_render_pass(self.cmd) };
    }

    fn bind_pipeline(&mut self, cmd: &BindPipelineCmd) {
        let Some(pso) = self.ctx.graphics_pipelines.get_ref(retype(cmd.pipeline)) else {
            warn!("bind of a dead graphics pipeline, skipping");
            return;
        };
        self.gfx_layout = pso.pipeline_layout;
        unsafe {
            self.ctx
                .device
                .cmd_bind_pipeline(self.cmd, vk::PipelineBindPoint::GRAPHICS, pso.raw)
        };
    }

    fn bind_compute_pipeline(&mut self, cmd: &BindComputePipelineCmd) {
        let Some(pso) = self.ctx.compute_pipelines.get_ref(retype(cmd.pipeline)) else {
            warn!("bind of a dead compute pipeline, skipping");
            return;
        };
        self.compute_layout = pso.pipeline_layout;
        unsafe {
            self.ctx
                .device
                .cmd_bind_pipeline(self.cmd, vk::PipelineBindPoint::COMPUTE, pso.raw)
        };
    }

    fn bind_group(&mut self, cmd: &BindGroupCmd) {
        let Some(group) = self.ctx.bind_groups.get_ref(retype(cmd.group)) else {
            warn!("bind of a dead bind group, skipping");
            return;
        };
        let set = group.set;
        if self.gfx_layout != vk::PipelineLayout::null() {
            unsafe {
                self.ctx.device.cmd_bind_descriptor_sets(
                    self.cmd,
                    vk::PipelineBindPoint::GRAPHICS,
                    self.gfx_layout,
                    cmd.parameter_index,
                    &[set],
                    &[],
                );
            }
        }
        if self.compute_layout != vk::PipelineLayout::null() {
            unsafe {
                self.ctx.device.cmd_bind_descriptor_sets(
                    self.cmd,
                    vk::PipelineBindPoint::COMPUTE,
                    self.compute_layout,
                    cmd.parameter_index,
                    &[set],
                    &[],
                );
            }
        }
        if self.gfx_layout == vk::PipelineLayout::null()
            && self.compute_layout == vk::PipelineLayout::null()
        {
            warn!("bind group before any pipeline, skipping");
        }
    }

    fn bind_vertex_array(&mut self, cmd: &BindVertexArrayCmd) {
        let Some(va) = self.ctx.vertex_arrays.get_ref(retype(cmd.vertex_array)) else {
            warn!("bind of a dead vertex array, skipping");
            return;
        };
        let mut raw = Vec::with_capacity(va.buffers.len());
        for buffer in &va.buffers {
            match self.ctx.buffers.get_ref(retype(*buffer)) {
                Some(buf) => raw.push(buf.raw),
                None => {
                    warn!("vertex array references a dead buffer, skipping bind");
                    return;
                }
            }
        }
        let offsets = vec![0u64; raw.len()];
        unsafe {
            if !raw.is_empty() {
                self.ctx
                    .device
                    .cmd_bind_vertex_buffers(self.cmd, 0, &raw, &offsets);
            }
            if let Some(index) = va.index_buffer {
                if let Some(buf) = self.ctx.buffers.get_ref(retype(index)) {
                    self.ctx.device.cmd_bind_index_buffer(
                        self.cmd,
                        buf.raw,
                        0,
                        va.index_type.into(),
                    );
                }
            }
        }
    }

    fn set_viewport(&mut self, cmd: &SetViewportCmd) {
        let vp = cmd.viewport;
        unsafe {
            self.ctx.device.cmd_set_viewport(
                self.cmd,
                0,
                &[vk::Viewport {
                    x: vp.x,
                    y: vp.y,
                    width: vp.w,
                    height: vp.h,
                    min_depth: vp.min_depth,
                    max_depth: vp.max_depth,
                }],
            );
        }
    }

    fn set_scissor(&mut self, cmd: &SetScissorCmd) {
        unsafe {
            self.ctx.device.cmd_set_scissor(
                self.cmd,
                0,
                &[vk::Rect2D {
                    offset: vk::Offset2D {
                        x: cmd.rect.x,
                        y: cmd.rect.y,
                    },
                    extent: vk::Extent2D {
                        width: cmd.rect.w,
                        height: cmd.rect.h,
                    },
                }],
            );
        }
    }

    fn clear_attachments(&mut self, cmd: &ClearAttachmentsCmd) {
        let mut attachments = Vec::new();
        if cmd.flags.contains(ClearFlags::COLOR) {
            for i in 0..self.color_count {
                attachments.push(
                    vk::ClearAttachment::builder()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .color_attachment(i)
                        .clear_value(vk::ClearValue {
                            color: vk::ClearColorValue {
                                float32: cmd.color,
                            },
                        })
                        .build(),
                );
            }
        }
        let mut ds_aspect = vk::ImageAspectFlags::empty();
        if cmd.flags.contains(ClearFlags::DEPTH) {
            ds_aspect |= vk::ImageAspectFlags::DEPTH;
        }
        if cmd.flags.contains(ClearFlags::STENCIL) {
            ds_aspect |= vk::ImageAspectFlags::STENCIL;
        }
        if !ds_aspect.is_empty() && self.has_depth {
            attachments.push(
                vk::ClearAttachment::builder()
                    .aspect_mask(ds_aspect)
                    .clear_value(vk::ClearValue {
                        depth_stencil: vk::ClearDepthStencilValue {
                            depth: cmd.depth,
                            stencil: cmd.stencil,
                        },
                    })
                    .build(),
            );
        }
        if attachments.is_empty() {
            return;
        }
        let rect = vk::ClearRect::builder()
            .rect(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: self.pass_extent,
            })
            .base_array_layer(0)
            .layer_count(1)
            .build();
        unsafe {
            self.ctx
                .device
                .cmd_clear_attachments(self.cmd, &attachments, &[rect])
        };
    }

    fn draw(&mut self, cmd: &DrawCmd) {
        unsafe {
            self.ctx.device.cmd_draw(
                self.cmd,
                cmd.vertex_count,
                cmd.instance_count,
                cmd.first_vertex,
                cmd.first_instance,
            )
        };
    }

    fn draw_indexed(&mut self, cmd: &DrawIndexedCmd) {
        unsafe {
            self.ctx.device.cmd_draw_indexed(
                self.cmd,
                cmd.index_count,
                cmd.instance_count,
                cmd.first_index,
                cmd.base_vertex,
                cmd.first_instance,
            )
        };
    }

    fn draw_indirect(&mut self, cmd: &DrawIndirectCmd) {
        let Some(buf) = self.ctx.buffers.get_ref(retype(cmd.buffer)) else {
            warn!("indirect draw from a dead buffer, skipping");
            return;
        };
        unsafe {
            self.ctx.device.cmd_draw_indirect(
                self.cmd,
                buf.raw,
                cmd.offset as u64,
                cmd.draw_count,
                cmd.stride,
            )
        };
    }

    fn draw_indexed_indirect(&mut self, cmd: &DrawIndexedIndirectCmd) {
        let Some(buf) = self.ctx.buffers.get_ref(retype(cmd.buffer)) else {
            warn!("indirect draw from a dead buffer, skipping");
            return;
        };
        unsafe {
            self.ctx.device.cmd_draw_indexed_indirect(
                self.cmd,
                buf.raw,
                cmd.offset as u64,
                cmd.draw_count,
                cmd.stride,
            )
        };
    }

    fn dispatch(&mut self, cmd: &DispatchCmd) {
        unsafe { self.ctx.device.cmd_dispatch(self.cmd, cmd.x, cmd.y, cmd.z) };
    }

    fn copy_buffer(&mut self, cmd: &CopyBufferCmd) {
        let (Some(src), Some(dst)) = (
            self.ctx.buffers.get_ref(retype(cmd.src)),
            self.ctx.buffers.get_ref(retype(cmd.dst)),
        ) else {
            warn!("copy between dead buffers, skipping");
            return;
        };
        unsafe {
            self.ctx.device.cmd_copy_buffer(
                self.cmd,
                src.raw,
                dst.raw,
                &[vk::BufferCopy {
                    src_offset: cmd.src_offset as u64,
                    dst_offset: cmd.dst_offset as u64,
                    size: cmd.size as u64,
                }],
            )
        };
    }

    fn debug_marker_begin(&mut self, cmd: &DebugMarkerCmd) {
        if let Some(utils) = &self.ctx.debug_utils {
            let label = CString::new(cmd.text()).unwrap_or_default();
            unsafe {
                utils.cmd_begin_debug_utils_label(
                    self.cmd,
                    &vk::DebugUtilsLabelEXT::builder().label_name(&label).build(),
                )
            };
        }
    }

    fn debug_marker_end(&mut self, _cmd: &DebugMarkerEndCmd) {
        if let Some(utils) = &self.ctx.debug_utils {
            unsafe { utils.cmd_end_debug_utils_label(self.cmd) };
        }
    }

    fn debug_marker_insert(&mut self, cmd: &DebugMarkerCmd) {
        if let Some(utils) = &self.ctx.debug_utils {
            let label = CString::new(cmd.text()).unwrap_or_default();
            unsafe {
                utils.cmd_insert_debug_utils_label(
                    self.cmd,
                    &vk::DebugUtilsLabelEXT::builder().label_name(&label).build(),
                )
            };
        }
    }
}
