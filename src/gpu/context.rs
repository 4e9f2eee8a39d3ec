//! Public GPU context facade that dispatches to the selected backend.
//!
//! The backend is chosen once at creation and never re-checked per call;
//! every method is a straight match into the active backend's
//! implementation of the same operation.

use raw_window_handle::HasRawWindowHandle;

use crate::gpu::driver::command::CommandEncoder;
use crate::gpu::error::{GpuError, Result};
use crate::gpu::null::NullContext;
use crate::gpu::profiler::FrameProfiler;
use crate::gpu::structs::*;
use crate::utils::Handle;

#[cfg(feature = "nori-gl")]
use crate::gpu::gl::{GlContext, GlPresentTarget};
#[cfg(feature = "nori-vulkan")]
use crate::gpu::vulkan::VulkanContext;

/// Where a swapchain presents.
pub enum SurfaceTarget<'a> {
    /// Bookkeeping only; the Null backend counts frames.
    Headless,
    /// A native window handle, consumed by the Vulkan backend.
    RawWindow(&'a dyn HasRawWindowHandle),
    /// A caller-owned GL surface that knows how to swap its buffers.
    #[cfg(feature = "nori-gl")]
    Gl(Box<dyn GlPresentTarget>),
}

enum ContextBackend {
    Null(NullContext),
    #[cfg(feature = "nori-gl")]
    Gl(GlContext),
    #[cfg(feature = "nori-vulkan")]
    Vulkan(VulkanContext),
}

macro_rules! dispatch {
    ($self:expr, $ctx:ident => $body:expr) => {
        match &$self.backend {
            ContextBackend::Null($ctx) => $body,
            #[cfg(feature = "nori-gl")]
            ContextBackend::Gl($ctx) => $body,
            #[cfg(feature = "nori-vulkan")]
            ContextBackend::Vulkan($ctx) => $body,
        }
    };
    (mut $self:expr, $ctx:ident => $body:expr) => {
        match &mut $self.backend {
            ContextBackend::Null($ctx) => $body,
            #[cfg(feature = "nori-gl")]
            ContextBackend::Gl($ctx) => $body,
            #[cfg(feature = "nori-vulkan")]
            ContextBackend::Vulkan($ctx) => $body,
        }
    };
}

pub struct Context {
    backend: ContextBackend,
    profiler: FrameProfiler,
}

impl Context {
    /// Select and initialize a backend once. The OpenGL backend needs a
    /// loaded function table and goes through [`Context::from_gl`] instead.
    pub fn new(info: &ContextInfo) -> Result<Self> {
        let backend = match info.backend {
            BackendKind::Null => ContextBackend::Null(NullContext::new(info)),
            BackendKind::OpenGl => {
                return Err(GpuError::InvalidInfo(
                    "the GL backend wraps a loaded function table; use Context::from_gl",
                ))
            }
            #[cfg(feature = "nori-vulkan")]
            BackendKind::Vulkan => ContextBackend::Vulkan(VulkanContext::new(info)?),
            #[cfg(not(feature = "nori-vulkan"))]
            BackendKind::Vulkan => return Err(GpuError::BackendUnavailable("vulkan")),
        };
        Ok(Self {
            backend,
            profiler: FrameProfiler::default(),
        })
    }

    /// Construct without presentation support.
    pub fn headless(info: &ContextInfo) -> Result<Self> {
        let backend = match info.backend {
            BackendKind::Null => ContextBackend::Null(NullContext::new(info)),
            BackendKind::OpenGl => {
                return Err(GpuError::InvalidInfo(
                    "the GL backend wraps a loaded function table; use Context::from_gl",
                ))
            }
            #[cfg(feature = "nori-vulkan")]
            BackendKind::Vulkan => ContextBackend::Vulkan(VulkanContext::headless(info)?),
            #[cfg(not(feature = "nori-vulkan"))]
            BackendKind::Vulkan => return Err(GpuError::BackendUnavailable("vulkan")),
        };
        Ok(Self {
            backend,
            profiler: FrameProfiler::default(),
        })
    }

    /// Wrap an already-loaded OpenGL / OpenGL ES function table.
    #[cfg(feature = "nori-gl")]
    pub fn from_gl(gl: glow::Context, info: &ContextInfo) -> Result<Self> {
        Ok(Self {
            backend: ContextBackend::Gl(GlContext::new(gl, info)?),
            profiler: FrameProfiler::default(),
        })
    }

    pub fn limits(&self) -> DeviceLimits {
        dispatch!(self, ctx => ctx.limits())
    }

    pub fn profiler(&mut self) -> &mut FrameProfiler {
        &mut self.profiler
    }

    /// The Null backend's bookkeeping surface, when active. Tests use this
    /// to inspect the native-call log.
    pub fn null(&self) -> Option<&NullContext> {
        match &self.backend {
            ContextBackend::Null(ctx) => Some(ctx),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }

    pub fn null_mut(&mut self) -> Option<&mut NullContext> {
        match &mut self.backend {
            ContextBackend::Null(ctx) => Some(ctx),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }

    //===------------------------------------------------------------------===//
    // Resource factories
    //===------------------------------------------------------------------===//

    pub fn make_buffer(&mut self, info: &BufferInfo) -> Result<Handle<Buffer>> {
        dispatch!(mut self, ctx => ctx.make_buffer(info))
    }

    pub fn write_buffer(&mut self, handle: Handle<Buffer>, offset: u32, data: &[u8]) -> Result<()> {
        dispatch!(mut self, ctx => ctx.write_buffer(handle, offset, data))
    }

    pub fn read_buffer(&mut self, handle: Handle<Buffer>, offset: u32, len: u32) -> Result<Vec<u8>> {
        dispatch!(mut self, ctx => ctx.read_buffer(handle, offset, len))
    }

    pub fn buffer_size(&self, handle: Handle<Buffer>) -> Result<u32> {
        dispatch!(self, ctx => ctx.buffer_size(handle))
    }

    pub fn make_texture(&mut self, info: &TextureInfo) -> Result<Handle<Texture>> {
        dispatch!(mut self, ctx => ctx.make_texture(info))
    }

    pub fn make_sampler(&mut self, info: &SamplerInfo) -> Result<Handle<Sampler>> {
        dispatch!(mut self, ctx => ctx.make_sampler(info))
    }

    pub fn make_shader_program(&mut self, info: &ShaderProgramInfo) -> Result<Handle<ShaderProgram>> {
        dispatch!(mut self, ctx => ctx.make_shader_program(info))
    }

    pub fn make_bind_group_layout(
        &mut self,
        info: &BindGroupLayoutInfo,
    ) -> Result<Handle<BindGroupLayout>> {
        dispatch!(mut self, ctx => ctx.make_bind_group_layout(info))
    }

    /// Per-entry uniform-block binding indices of a layout's parameter slot.
    pub fn bind_group_layout_blocks(
        &self,
        handle: Handle<BindGroupLayout>,
    ) -> Result<Vec<Option<u32>>> {
        dispatch!(self, ctx => ctx.bind_group_layout_blocks(handle))
    }

    pub fn make_bind_group(&mut self, info: &BindGroupInfo) -> Result<Handle<BindGroup>> {
        dispatch!(mut self, ctx => ctx.make_bind_group(info))
    }

    pub fn make_render_pass(&mut self, info: &RenderPassInfo) -> Result<Handle<RenderPass>> {
        dispatch!(mut self, ctx => ctx.make_render_pass(info))
    }

    pub fn make_vertex_array(&mut self, info: &VertexArrayInfo) -> Result<Handle<VertexArray>> {
        dispatch!(mut self, ctx => ctx.make_vertex_array(info))
    }

    pub fn make_graphics_pipeline(
        &mut self,
        info: &GraphicsPipelineInfo,
    ) -> Result<Handle<GraphicsPipeline>> {
        dispatch!(mut self, ctx => ctx.make_graphics_pipeline(info))
    }

    pub fn make_compute_pipeline(
        &mut self,
        info: &ComputePipelineInfo,
    ) -> Result<Handle<ComputePipeline>> {
        dispatch!(mut self, ctx => ctx.make_compute_pipeline(info))
    }

    //===------------------------------------------------------------------===//
    // Reference counting
    //===------------------------------------------------------------------===//

    pub fn add_ref_buffer(&mut self, handle: Handle<Buffer>) -> Result<()> {
        dispatch!(mut self, ctx => ctx.add_ref_buffer(handle))
    }

    pub fn release_buffer(&mut self, handle: Handle<Buffer>) -> Result<()> {
        dispatch!(mut self, ctx => ctx.release_buffer(handle))
    }

    pub fn add_ref_texture(&mut self, handle: Handle<Texture>) -> Result<()> {
        dispatch!(mut self, ctx => ctx.add_ref_texture(handle))
    }

    pub fn release_texture(&mut self, handle: Handle<Texture>) -> Result<()> {
        dispatch!(mut self, ctx => ctx.release_texture(handle))
    }

    pub fn add_ref_sampler(&mut self, handle: Handle<Sampler>) -> Result<()> {
        dispatch!(mut self, ctx => ctx.add_ref_sampler(handle))
    }

    pub fn release_sampler(&mut self, handle: Handle<Sampler>) -> Result<()> {
        dispatch!(mut self, ctx => ctx.release_sampler(handle))
    }

    pub fn add_ref_shader_program(&mut self, handle: Handle<ShaderProgram>) -> Result<()> {
        dispatch!(mut self, ctx => ctx.add_ref_shader_program(handle))
    }

    pub fn release_shader_program(&mut self, handle: Handle<ShaderProgram>) -> Result<()> {
        dispatch!(mut self, ctx => ctx.release_shader_program(handle))
    }

    pub fn add_ref_bind_group_layout(&mut self, handle: Handle<BindGroupLayout>) -> Result<()> {
        dispatch!(mut self, ctx => ctx.add_ref_bind_group_layout(handle))
    }

    pub fn release_bind_group_layout(&mut self, handle: Handle<BindGroupLayout>) -> Result<()> {
        dispatch!(mut self, ctx => ctx.release_bind_group_layout(handle))
    }

    pub fn add_ref_bind_group(&mut self, handle: Handle<BindGroup>) -> Result<()> {
        dispatch!(mut self, ctx => ctx.add_ref_bind_group(handle))
    }

    pub fn release_bind_group(&mut self, handle: Handle<BindGroup>) -> Result<()> {
        dispatch!(mut self, ctx => ctx.release_bind_group(handle))
    }

    pub fn add_ref_render_pass(&mut self, handle: Handle<RenderPass>) -> Result<()> {
        dispatch!(mut self, ctx => ctx.add_ref_render_pass(handle))
    }

    pub fn release_render_pass(&mut self, handle: Handle<RenderPass>) -> Result<()> {
        dispatch!(mut self, ctx => ctx.release_render_pass(handle))
    }

    pub fn add_ref_vertex_array(&mut self, handle: Handle<VertexArray>) -> Result<()> {
        dispatch!(mut self, ctx => ctx.add_ref_vertex_array(handle))
    }

    pub fn release_vertex_array(&mut self, handle: Handle<VertexArray>) -> Result<()> {
        dispatch!(mut self, ctx => ctx.release_vertex_array(handle))
    }

    pub fn add_ref_graphics_pipeline(&mut self, handle: Handle<GraphicsPipeline>) -> Result<()> {
        dispatch!(mut self, ctx => ctx.add_ref_graphics_pipeline(handle))
    }

    pub fn release_graphics_pipeline(&mut self, handle: Handle<GraphicsPipeline>) -> Result<()> {
        dispatch!(mut self, ctx => ctx.release_graphics_pipeline(handle))
    }

    pub fn add_ref_compute_pipeline(&mut self, handle: Handle<ComputePipeline>) -> Result<()> {
        dispatch!(mut self, ctx => ctx.add_ref_compute_pipeline(handle))
    }

    pub fn release_compute_pipeline(&mut self, handle: Handle<ComputePipeline>) -> Result<()> {
        dispatch!(mut self, ctx => ctx.release_compute_pipeline(handle))
    }

    //===------------------------------------------------------------------===//
    // Swapchain & submission
    //===------------------------------------------------------------------===//

    pub fn make_swapchain(
        &mut self,
        info: &SwapchainInfo,
        surface: SurfaceTarget,
    ) -> Result<Handle<Swapchain>> {
        match (&mut self.backend, surface) {
            (ContextBackend::Null(ctx), _) => ctx.make_swapchain(info),
            #[cfg(feature = "nori-gl")]
            (ContextBackend::Gl(ctx), SurfaceTarget::Gl(target)) => {
                ctx.make_swapchain(info, target)
            }
            #[cfg(feature = "nori-gl")]
            (ContextBackend::Gl(_), _) => Err(GpuError::InvalidInfo(
                "the GL backend presents through a SurfaceTarget::Gl",
            )),
            #[cfg(feature = "nori-vulkan")]
            (ContextBackend::Vulkan(ctx), SurfaceTarget::RawWindow(window)) => {
                ctx.make_swapchain(info, window)
            }
            #[cfg(feature = "nori-vulkan")]
            (ContextBackend::Vulkan(_), _) => Err(GpuError::InvalidInfo(
                "the Vulkan backend presents through a SurfaceTarget::RawWindow",
            )),
        }
    }

    pub fn present(&mut self, handle: Handle<Swapchain>) -> Result<()> {
        dispatch!(mut self, ctx => ctx.present(handle))
    }

    pub fn resize_swapchain(&mut self, handle: Handle<Swapchain>, extent: Extent) -> Result<()> {
        dispatch!(mut self, ctx => ctx.resize_swapchain(handle, extent))
    }

    pub fn swapchain_extent(&self, handle: Handle<Swapchain>) -> Result<Extent> {
        dispatch!(self, ctx => ctx.swapchain_extent(handle))
    }

    pub fn release_swapchain(&mut self, handle: Handle<Swapchain>) -> Result<()> {
        dispatch!(mut self, ctx => ctx.release_swapchain(handle))
    }

    /// Replay a filled command stream into the active backend. The stream
    /// may be submitted again afterwards.
    pub fn submit(&mut self, encoder: &CommandEncoder) -> Result<()> {
        dispatch!(mut self, ctx => ctx.submit(encoder))
    }

    /// Explicitly destroy the context and release backend resources.
    pub fn destroy(self) {
        match self.backend {
            ContextBackend::Null(ctx) => ctx.destroy(),
            #[cfg(feature = "nori-gl")]
            ContextBackend::Gl(ctx) => ctx.destroy(),
            #[cfg(feature = "nori-vulkan")]
            ContextBackend::Vulkan(ctx) => ctx.destroy(),
        }
    }
}
