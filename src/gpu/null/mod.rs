//! Bookkeeping backend with no native API behind it.
//!
//! Resource lifecycles run exactly as on the hardware backends (pools, ID
//! recycling, reference counts, validation), and submitted command streams
//! are translated into a typed [`NativeCall`] log instead of driver calls.
//! That log is what the integration tests assert against.

use log::{debug, warn};

use crate::gpu::driver::command::*;
use crate::gpu::error::{GpuError, Result};
use crate::gpu::structs::*;
use crate::gpu::validate;
use crate::utils::handle::retype;
use crate::utils::{Handle, Pool, Release};

pub(crate) struct NullBuffer {
    byte_size: u32,
    usage: BufferUsage,
    indirect_flags: IndirectBufferFlags,
    data: Vec<u8>,
}

pub(crate) struct NullTexture {
    format: Format,
    mip_levels: u32,
    uploaded_levels: u32,
    mips_generated: bool,
}

pub(crate) struct NullSampler {
    _max_anisotropy: f32,
}

pub(crate) struct NullProgram {
    stages: Vec<ShaderStage>,
}

pub(crate) struct NullBindGroupLayout {
    ranges: Vec<DescriptorRange>,
    block_bindings: Vec<Option<u32>>,
}

pub(crate) struct NullBindGroup {
    layout: Handle<BindGroupLayout>,
    bindings: Vec<ResourceBinding>,
}

pub(crate) struct NullRenderPass {
    color_count: u32,
}

pub(crate) struct NullVertexArray {
    buffers: Vec<Handle<Buffer>>,
    index_buffer: Option<Handle<Buffer>>,
}

pub(crate) struct NullGraphicsPipeline {
    program: Handle<ShaderProgram>,
    layouts: [Option<Handle<BindGroupLayout>>; MAX_BIND_GROUPS],
    render_pass: Handle<RenderPass>,
    patch_control_points: Option<u8>,
}

pub(crate) struct NullComputePipeline {
    program: Handle<ShaderProgram>,
    layouts: [Option<Handle<BindGroupLayout>>; MAX_BIND_GROUPS],
}

pub(crate) struct NullSwapchain {
    extent: Extent,
    frames_presented: u64,
}

/// One entry per native call the backend would have issued.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeCall {
    BeginRenderPass {
        render_pass: u16,
        colors: Vec<u16>,
        depth: Option<u16>,
        backbuffer: bool,
    },
    EndRenderPass,
    BindPipeline {
        pipeline: u16,
    },
    BindComputePipeline {
        pipeline: u16,
    },
    BindGroup {
        parameter_index: u32,
        group: u16,
    },
    BindVertexArray {
        vertex_array: u16,
    },
    SetViewport(Viewport),
    SetScissor(Rect2D),
    Clear {
        flags: ClearFlags,
        color: [f32; 4],
        depth: f32,
        stencil: u32,
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    },
    DrawIndirect {
        buffer: u16,
        offset: u32,
        draw_count: u32,
    },
    DrawIndexedIndirect {
        buffer: u16,
        offset: u32,
        draw_count: u32,
    },
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },
    CopyBuffer {
        src: u16,
        dst: u16,
        size: u32,
    },
    MarkerBegin(String),
    MarkerEnd,
    MarkerInsert(String),
    Present {
        swapchain: u16,
        frame: u64,
    },
}

pub struct NullContext {
    limits: DeviceLimits,
    buffers: Pool<NullBuffer>,
    textures: Pool<NullTexture>,
    samplers: Pool<NullSampler>,
    programs: Pool<NullProgram>,
    bind_group_layouts: Pool<NullBindGroupLayout>,
    bind_groups: Pool<NullBindGroup>,
    render_passes: Pool<NullRenderPass>,
    vertex_arrays: Pool<NullVertexArray>,
    graphics_pipelines: Pool<NullGraphicsPipeline>,
    compute_pipelines: Pool<NullComputePipeline>,
    swapchains: Pool<NullSwapchain>,
    calls: Vec<NativeCall>,
    marker_depth: u32,
}

impl NullContext {
    pub fn new(_info: &ContextInfo) -> Self {
        debug!("null backend: all limits defaulted, no device probed");
        Self {
            limits: DeviceLimits {
                timestamps_supported: false,
                ..Default::default()
            },
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
            calls: Vec::new(),
            marker_depth: 0,
        }
    }

    pub fn limits(&self) -> DeviceLimits {
        self.limits
    }

    //===------------------------------------------------------------------===//
    // Buffers
    //===------------------------------------------------------------------===//

    pub fn make_buffer(&mut self, info: &BufferInfo) -> Result<Handle<Buffer>> {
        validate::buffer_info(info)?;
        let mut data = vec![0u8; info.byte_size as usize];
        if let Some(src) = info.initial_data {
            data[..src.len()].copy_from_slice(src);
        }
        let handle = self
            .buffers
            .insert(NullBuffer {
                byte_size: info.byte_size,
                usage: info.usage,
                indirect_flags: info.indirect_flags,
                data,
            })
            .ok_or(GpuError::Exhausted("buffer"))?;
        Ok(retype(handle))
    }

    pub fn write_buffer(&mut self, handle: Handle<Buffer>, offset: u32, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Err(GpuError::InvalidInfo("zero-byte buffer write"));
        }
        let buf = self
            .buffers
            .get_mut_ref(retype(handle))
            .ok_or(GpuError::InvalidHandle("buffer"))?;
        let end = offset as usize + data.len();
        if end > buf.byte_size as usize {
            return Err(GpuError::InvalidInfo("buffer write out of bounds"));
        }
        buf.data[offset as usize..end].copy_from_slice(data);
        Ok(())
    }

    pub fn read_buffer(&self, handle: Handle<Buffer>, offset: u32, len: u32) -> Result<Vec<u8>> {
        if len == 0 {
            return Err(GpuError::InvalidInfo("zero-byte buffer read"));
        }
        let buf = self
            .buffers
            .get_ref(retype(handle))
            .ok_or(GpuError::InvalidHandle("buffer"))?;
        let end = (offset + len) as usize;
        if end > buf.byte_size as usize {
            return Err(GpuError::InvalidInfo("buffer read out of bounds"));
        }
        Ok(buf.data[offset as usize..end].to_vec())
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
        match self.buffers.release(retype::<Buffer, NullBuffer>(handle)) {
            None => Err(GpuError::InvalidHandle("buffer")),
            Some(Release::Alive(_)) => Ok(()),
            Some(Release::Destroyed(_)) => {
                debug!("buffer {} destroyed", handle.slot);
                Ok(())
            }
        }
    }

    pub fn buffer_ref_count(&self, handle: Handle<Buffer>) -> Option<u32> {
        self.buffers.ref_count(retype(handle))
    }

    pub fn buffer_is_live(&self, handle: Handle<Buffer>) -> bool {
        self.buffers.is_live(retype(handle))
    }

    //===------------------------------------------------------------------===//
    // Textures & samplers
    //===------------------------------------------------------------------===//

    pub fn make_texture(&mut self, info: &TextureInfo) -> Result<Handle<Texture>> {
        let plan = validate::texture_info(info)?;
        // The upload would walk the chain level by level; the bookkeeping
        // records how far it got so tests can observe the strategy taken.
        let handle = self
            .textures
            .insert(NullTexture {
                format: info.format,
                mip_levels: info.mip_levels,
                uploaded_levels: plan.upload_levels,
                mips_generated: plan.generate,
            })
            .ok_or(GpuError::Exhausted("texture"))?;
        Ok(retype(handle))
    }

    pub fn add_ref_texture(&mut self, handle: Handle<Texture>) -> Result<()> {
        self.textures
            .add_ref(retype(handle))
            .map(|_| ())
            .ok_or(GpuError::InvalidHandle("texture"))
    }

    pub fn release_texture(&mut self, handle: Handle<Texture>) -> Result<()> {
        match self.textures.release(retype::<Texture, NullTexture>(handle)) {
            None => Err(GpuError::InvalidHandle("texture")),
            Some(_) => Ok(()),
        }
    }

    pub fn texture_mip_state(&self, handle: Handle<Texture>) -> Option<(u32, u32, bool)> {
        self.textures
            .get_ref(retype(handle))
            .map(|t| (t.mip_levels, t.uploaded_levels, t.mips_generated))
    }

    pub fn texture_format(&self, handle: Handle<Texture>) -> Option<Format> {
        self.textures.get_ref(retype(handle)).map(|t| t.format)
    }

    pub fn make_sampler(&mut self, info: &SamplerInfo) -> Result<Handle<Sampler>> {
        if info.anisotropy_enable && info.max_anisotropy > self.limits.max_anisotropy {
            return Err(GpuError::InvalidInfo("anisotropy exceeds device limit"));
        }
        let handle = self
            .samplers
            .insert(NullSampler {
                _max_anisotropy: info.max_anisotropy,
            })
            .ok_or(GpuError::Exhausted("sampler"))?;
        Ok(retype(handle))
    }

    pub fn add_ref_sampler(&mut self, handle: Handle<Sampler>) -> Result<()> {
        self.samplers
            .add_ref(retype(handle))
            .map(|_| ())
            .ok_or(GpuError::InvalidHandle("sampler"))
    }

    pub fn release_sampler(&mut self, handle: Handle<Sampler>) -> Result<()> {
        match self.samplers.release(retype::<Sampler, NullSampler>(handle)) {
            None => Err(GpuError::InvalidHandle("sampler")),
            Some(_) => Ok(()),
        }
    }

    //===------------------------------------------------------------------===//
    // Shader programs
    //===------------------------------------------------------------------===//

    pub fn make_shader_program(&mut self, info: &ShaderProgramInfo) -> Result<Handle<ShaderProgram>> {
        if info.stages.is_empty() {
            return Err(GpuError::InvalidInfo("shader program needs at least one stage"));
        }
        let handle = self
            .programs
            .insert(NullProgram {
                stages: info.stages.iter().map(|s| s.stage).collect(),
            })
            .ok_or(GpuError::Exhausted("shader program"))?;
        Ok(retype(handle))
    }

    pub fn add_ref_shader_program(&mut self, handle: Handle<ShaderProgram>) -> Result<()> {
        self.programs
            .add_ref(retype(handle))
            .map(|_| ())
            .ok_or(GpuError::InvalidHandle("shader program"))
    }

    pub fn release_shader_program(&mut self, handle: Handle<ShaderProgram>) -> Result<()> {
        match self.programs.release(retype::<ShaderProgram, NullProgram>(handle)) {
            None => Err(GpuError::InvalidHandle("shader program")),
            Some(_) => Ok(()),
        }
    }

    pub fn program_is_live(&self, handle: Handle<ShaderProgram>) -> bool {
        self.programs.is_live(retype(handle))
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
        let handle = self
            .bind_group_layouts
            .insert(NullBindGroupLayout {
                ranges: info.ranges.to_vec(),
                block_bindings: uniform_block_bindings(info.ranges),
            })
            .ok_or(GpuError::Exhausted("bind group layout"))?;
        Ok(retype(handle))
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
            .release(retype::<BindGroupLayout, NullBindGroupLayout>(handle))
        {
            None => Err(GpuError::InvalidHandle("bind group layout")),
            Some(_) => Ok(()),
        }
    }

    /// Per-entry uniform-block binding indices of a layout, for tests and
    /// the GL backend's numbering scheme.
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
        let ranges = self
            .bind_group_layouts
            .get_ref(retype(info.layout))
            .ok_or(GpuError::InvalidHandle("bind group layout"))?
            .ranges
            .clone();
        validate::bind_group_bindings(&ranges, info.bindings)?;

        // Resolve every bound resource before taking references so a
        // failure leaves the inputs untouched.
        for binding in info.bindings {
            let live = match binding {
                ResourceBinding::UniformBuffer(h) | ResourceBinding::StorageBuffer(h) => {
                    self.buffers.is_live(retype(*h))
                }
                ResourceBinding::SampledTexture(h) | ResourceBinding::StorageTexture(h) => {
                    self.textures.is_live(retype(*h))
                }
                ResourceBinding::Sampler(h) => self.samplers.is_live(retype(*h)),
            };
            if !live {
                return Err(GpuError::InvalidHandle("bind group resource"));
            }
        }

        self.bind_group_layouts.add_ref(retype(info.layout));
        for binding in info.bindings {
            match binding {
                ResourceBinding::UniformBuffer(h) | ResourceBinding::StorageBuffer(h) => {
                    self.buffers.add_ref(retype::<Buffer, NullBuffer>(*h));
                }
                ResourceBinding::SampledTexture(h) | ResourceBinding::StorageTexture(h) => {
                    self.textures.add_ref(retype::<Texture, NullTexture>(*h));
                }
                ResourceBinding::Sampler(h) => {
                    self.samplers.add_ref(retype::<Sampler, NullSampler>(*h));
                }
            }
        }

        match self.bind_groups.insert(NullBindGroup {
            layout: info.layout,
            bindings: info.bindings.to_vec(),
        }) {
            Some(handle) => Ok(retype(handle)),
            None => {
                // Roll the references back so a full pool leaks nothing.
                self.release_bind_group_children(info.layout, info.bindings);
                Err(GpuError::Exhausted("bind group"))
            }
        }
    }

    fn release_bind_group_children(
        &mut self,
        layout: Handle<BindGroupLayout>,
        bindings: &[ResourceBinding],
    ) {
        self.bind_group_layouts
            .release(retype::<BindGroupLayout, NullBindGroupLayout>(layout));
        for binding in bindings {
            match binding {
                ResourceBinding::UniformBuffer(h) | ResourceBinding::StorageBuffer(h) => {
                    self.buffers.release(retype::<Buffer, NullBuffer>(*h));
                }
                ResourceBinding::SampledTexture(h) | ResourceBinding::StorageTexture(h) => {
                    self.textures.release(retype::<Texture, NullTexture>(*h));
                }
                ResourceBinding::Sampler(h) => {
                    self.samplers.release(retype::<Sampler, NullSampler>(*h));
                }
            }
        }
    }

    pub fn add_ref_bind_group(&mut self, handle: Handle<BindGroup>) -> Result<()> {
        self.bind_groups
            .add_ref(retype(handle))
            .map(|_| ())
            .ok_or(GpuError::InvalidHandle("bind group"))
    }

    pub fn release_bind_group(&mut self, handle: Handle<BindGroup>) -> Result<()> {
        match self.bind_groups.release(retype::<BindGroup, NullBindGroup>(handle)) {
            None => Err(GpuError::InvalidHandle("bind group")),
            Some(Release::Alive(_)) => Ok(()),
            Some(Release::Destroyed(group)) => {
                self.release_bind_group_children(group.layout, &group.bindings);
                Ok(())
            }
        }
    }

    //===------------------------------------------------------------------===//
    // Render passes & vertex arrays
    //===------------------------------------------------------------------===//

    pub fn make_render_pass(&mut self, info: &RenderPassInfo) -> Result<Handle<RenderPass>> {
        validate::render_pass_info(info)?;
        let handle = self
            .render_passes
            .insert(NullRenderPass {
                color_count: info.color_formats.len() as u32,
            })
            .ok_or(GpuError::Exhausted("render pass"))?;
        Ok(retype(handle))
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
            .release(retype::<RenderPass, NullRenderPass>(handle))
        {
            None => Err(GpuError::InvalidHandle("render pass")),
            Some(_) => Ok(()),
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

        // The array holds references, not ownership; they drop again when
        // the array is destroyed.
        for binding in info.buffers {
            self.buffers.add_ref(retype::<Buffer, NullBuffer>(binding.buffer));
        }
        if let Some(index) = info.index_buffer {
            self.buffers.add_ref(retype::<Buffer, NullBuffer>(index));
        }

        match self.vertex_arrays.insert(NullVertexArray {
            buffers: info.buffers.iter().map(|b| b.buffer).collect(),
            index_buffer: info.index_buffer,
        }) {
            Some(handle) => Ok(retype(handle)),
            None => {
                for binding in info.buffers {
                    self.buffers.release(retype::<Buffer, NullBuffer>(binding.buffer));
                }
                if let Some(index) = info.index_buffer {
                    self.buffers.release(retype::<Buffer, NullBuffer>(index));
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
            .release(retype::<VertexArray, NullVertexArray>(handle))
        {
            None => Err(GpuError::InvalidHandle("vertex array")),
            Some(Release::Alive(_)) => Ok(()),
            Some(Release::Destroyed(va)) => {
                for buffer in va.buffers {
                    self.buffers.release(retype::<Buffer, NullBuffer>(buffer));
                }
                if let Some(index) = va.index_buffer {
                    self.buffers.release(retype::<Buffer, NullBuffer>(index));
                }
                Ok(())
            }
        }
    }

    //===------------------------------------------------------------------===//
    // Pipelines
    //===------------------------------------------------------------------===//

    pub fn make_graphics_pipeline(
        &mut self,
        info: &GraphicsPipelineInfo,
    ) -> Result<Handle<GraphicsPipeline>> {
        let patch_control_points = validate::topology(info.topology, &self.limits)?;
        if !self.programs.is_live(retype(info.program)) {
            return Err(GpuError::InvalidHandle("shader program"));
        }
        let pass_colors = self
            .render_passes
            .get_ref(retype(info.render_pass))
            .ok_or(GpuError::InvalidHandle("render pass"))?
            .color_count;
        if !info.blend.is_empty() && info.blend.len() as u32 != pass_colors {
            return Err(GpuError::InvalidInfo("blend state count does not match render pass"));
        }
        for layout in info.bind_group_layouts.iter().flatten() {
            if !self.bind_group_layouts.is_live(retype(*layout)) {
                return Err(GpuError::InvalidHandle("bind group layout"));
            }
        }

        self.programs.add_ref(retype::<ShaderProgram, NullProgram>(info.program));
        self.render_passes
            .add_ref(retype::<RenderPass, NullRenderPass>(info.render_pass));
        for layout in info.bind_group_layouts.iter().flatten() {
            self.bind_group_layouts
                .add_ref(retype::<BindGroupLayout, NullBindGroupLayout>(*layout));
        }

        match self.graphics_pipelines.insert(NullGraphicsPipeline {
            program: info.program,
            layouts: info.bind_group_layouts,
            render_pass: info.render_pass,
            patch_control_points,
        }) {
            Some(handle) => Ok(retype(handle)),
            None => {
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
        self.programs.release(retype::<ShaderProgram, NullProgram>(program));
        if let Some(rp) = render_pass {
            self.render_passes.release(retype::<RenderPass, NullRenderPass>(rp));
        }
        for layout in layouts.iter().flatten() {
            self.bind_group_layouts
                .release(retype::<BindGroupLayout, NullBindGroupLayout>(*layout));
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
            .release(retype::<GraphicsPipeline, NullGraphicsPipeline>(handle))
        {
            None => Err(GpuError::InvalidHandle("graphics pipeline")),
            Some(Release::Alive(_)) => Ok(()),
            Some(Release::Destroyed(pso)) => {
                self.release_pipeline_children(pso.program, Some(pso.render_pass), &pso.layouts);
                Ok(())
            }
        }
    }

    pub fn pipeline_patch_control_points(
        &self,
        handle: Handle<GraphicsPipeline>,
    ) -> Option<Option<u8>> {
        self.graphics_pipelines
            .get_ref(retype(handle))
            .map(|p| p.patch_control_points)
    }

    pub fn make_compute_pipeline(
        &mut self,
        info: &ComputePipelineInfo,
    ) -> Result<Handle<ComputePipeline>> {
        let program = self
            .programs
            .get_ref(retype(info.program))
            .ok_or(GpuError::InvalidHandle("shader program"))?;
        if !program.stages.contains(&ShaderStage::Compute) {
            return Err(GpuError::InvalidInfo("compute pipeline needs a compute stage"));
        }
        for layout in info.bind_group_layouts.iter().flatten() {
            if !self.bind_group_layouts.is_live(retype(*layout)) {
                return Err(GpuError::InvalidHandle("bind group layout"));
            }
        }

        self.programs.add_ref(retype::<ShaderProgram, NullProgram>(info.program));
        for layout in info.bind_group_layouts.iter().flatten() {
            self.bind_group_layouts
                .add_ref(retype::<BindGroupLayout, NullBindGroupLayout>(*layout));
        }

        match self.compute_pipelines.insert(NullComputePipeline {
            program: info.program,
            layouts: info.bind_group_layouts,
        }) {
            Some(handle) => Ok(retype(handle)),
            None => {
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
            .release(retype::<ComputePipeline, NullComputePipeline>(handle))
        {
            None => Err(GpuError::InvalidHandle("compute pipeline")),
            Some(Release::Alive(_)) => Ok(()),
            Some(Release::Destroyed(pso)) => {
                self.release_pipeline_children(pso.program, None, &pso.layouts);
                Ok(())
            }
        }
    }

    //===------------------------------------------------------------------===//
    // Swapchain
    //===------------------------------------------------------------------===//

    pub fn make_swapchain(&mut self, info: &SwapchainInfo) -> Result<Handle<Swapchain>> {
        if info.extent.width == 0 || info.extent.height == 0 {
            return Err(GpuError::InvalidInfo("swapchain extent must be non-zero"));
        }
        let handle = self
            .swapchains
            .insert(NullSwapchain {
                extent: info.extent,
                frames_presented: 0,
            })
            .ok_or(GpuError::Exhausted("swapchain"))?;
        Ok(retype(handle))
    }

    pub fn present(&mut self, handle: Handle<Swapchain>) -> Result<()> {
        let sc = self
            .swapchains
            .get_mut_ref(retype(handle))
            .ok_or(GpuError::InvalidHandle("swapchain"))?;
        sc.frames_presented += 1;
        let frame = sc.frames_presented;
        self.calls.push(NativeCall::Present {
            swapchain: handle.slot,
            frame,
        });
        Ok(())
    }

    pub fn resize_swapchain(&mut self, handle: Handle<Swapchain>, extent: Extent) -> Result<()> {
        if extent.width == 0 || extent.height == 0 {
            return Err(GpuError::InvalidInfo("swapchain extent must be non-zero"));
        }
        let sc = self
            .swapchains
            .get_mut_ref(retype(handle))
            .ok_or(GpuError::InvalidHandle("swapchain"))?;
        sc.extent = extent;
        Ok(())
    }

    pub fn swapchain_extent(&self, handle: Handle<Swapchain>) -> Result<Extent> {
        self.swapchains
            .get_ref(retype(handle))
            .map(|sc| sc.extent)
            .ok_or(GpuError::InvalidHandle("swapchain"))
    }

    pub fn release_swapchain(&mut self, handle: Handle<Swapchain>) -> Result<()> {
        match self.swapchains.release(retype::<Swapchain, NullSwapchain>(handle)) {
            None => Err(GpuError::InvalidHandle("swapchain")),
            Some(_) => Ok(()),
        }
    }

    //===------------------------------------------------------------------===//
    // Submission
    //===------------------------------------------------------------------===//

    pub fn submit(&mut self, encoder: &CommandEncoder) -> Result<()> {
        if encoder.marker_depth() != 0 {
            return Err(GpuError::InvalidInfo("unbalanced debug marker scopes"));
        }
        encoder.submit(self);
        if self.marker_depth != 0 {
            warn!("submitted stream left {} marker scopes open", self.marker_depth);
            self.marker_depth = 0;
        }
        Ok(())
    }

    /// The native-call log, in dispatch order.
    pub fn native_calls(&self) -> &[NativeCall] {
        &self.calls
    }

    pub fn clear_native_calls(&mut self) {
        self.calls.clear();
    }

    pub fn destroy(mut self) {
        for pool_len in [
            self.buffers.live_count(),
            self.textures.live_count(),
            self.graphics_pipelines.live_count(),
        ] {
            if pool_len > 0 {
                warn!("null context destroyed with {} live resources in a pool", pool_len);
            }
        }
        self.calls.clear();
    }
}

impl CommandSink for NullContext {
    fn begin_render_pass(&mut self, cmd: &BeginRenderPassCmd) {
        self.calls.push(NativeCall::BeginRenderPass {
            render_pass: cmd.render_pass.slot,
            colors: cmd.colors[..cmd.color_count as usize]
                .iter()
                .map(|h| h.slot)
                .collect(),
            depth: (cmd.has_depth != 0).then_some(cmd.depth.slot),
            backbuffer: cmd.to_backbuffer != 0,
        });
    }

    fn end_render_pass(&mut self, _cmd: &EndRenderPassCmd) {
        self.calls.push(NativeCall::EndRenderPass);
    }

    fn bind_pipeline(&mut self, cmd: &BindPipelineCmd) {
        self.calls.push(NativeCall::BindPipeline {
            pipeline: cmd.pipeline.slot,
        });
    }

    fn bind_compute_pipeline(&mut self, cmd: &BindComputePipelineCmd) {
        self.calls.push(NativeCall::BindComputePipeline {
            pipeline: cmd.pipeline.slot,
        });
    }

    fn bind_group(&mut self, cmd: &BindGroupCmd) {
        self.calls.push(NativeCall::BindGroup {
            parameter_index: cmd.parameter_index,
            group: cmd.group.slot,
        });
    }

    fn bind_vertex_array(&mut self, cmd: &BindVertexArrayCmd) {
        self.calls.push(NativeCall::BindVertexArray {
            vertex_array: cmd.vertex_array.slot,
        });
    }

    fn set_viewport(&mut self, cmd: &SetViewportCmd) {
        self.calls.push(NativeCall::SetViewport(cmd.viewport));
    }

    fn set_scissor(&mut self, cmd: &SetScissorCmd) {
        self.calls.push(NativeCall::SetScissor(cmd.rect));
    }

    fn clear_attachments(&mut self, cmd: &ClearAttachmentsCmd) {
        self.calls.push(NativeCall::Clear {
            flags: cmd.flags,
            color: cmd.color,
            depth: cmd.depth,
            stencil: cmd.stencil,
        });
    }

    fn draw(&mut self, cmd: &DrawCmd) {
        self.calls.push(NativeCall::Draw {
            vertex_count: cmd.vertex_count,
            instance_count: cmd.instance_count,
            first_vertex: cmd.first_vertex,
            first_instance: cmd.first_instance,
        });
    }

    fn draw_indexed(&mut self, cmd: &DrawIndexedCmd) {
        self.calls.push(NativeCall::DrawIndexed {
            index_count: cmd.index_count,
            instance_count: cmd.instance_count,
            first_index: cmd.first_index,
            base_vertex: cmd.base_vertex,
            first_instance: cmd.first_instance,
        });
    }

    fn draw_indirect(&mut self, cmd: &DrawIndirectCmd) {
        self.calls.push(NativeCall::DrawIndirect {
            buffer: cmd.buffer.slot,
            offset: cmd.offset,
            draw_count: cmd.draw_count,
        });
    }

    fn draw_indexed_indirect(&mut self, cmd: &DrawIndexedIndirectCmd) {
        self.calls.push(NativeCall::DrawIndexedIndirect {
            buffer: cmd.buffer.slot,
            offset: cmd.offset,
            draw_count: cmd.draw_count,
        });
    }

    fn dispatch(&mut self, cmd: &DispatchCmd) {
        self.calls.push(NativeCall::Dispatch {
            x: cmd.x,
            y: cmd.y,
            z: cmd.z,
        });
    }

    fn copy_buffer(&mut self, cmd: &CopyBufferCmd) {
        // The null backend performs the copy so read-back tests observe it.
        let data = match self.buffers.get_ref(retype(cmd.src)) {
            Some(src) => {
                let end = (cmd.src_offset + cmd.size) as usize;
                if end <= src.data.len() {
                    src.data[cmd.src_offset as usize..end].to_vec()
                } else {
                    warn!("copy source range out of bounds, skipping");
                    return;
                }
            }
            None => {
                warn!("copy from a dead buffer, skipping");
                return;
            }
        };
        if let Some(dst) = self.buffers.get_mut_ref(retype(cmd.dst)) {
            let end = (cmd.dst_offset + cmd.size) as usize;
            if end <= dst.data.len() {
                dst.data[cmd.dst_offset as usize..end].copy_from_slice(&data);
            } else {
                warn!("copy destination range out of bounds, skipping");
                return;
            }
        } else {
            warn!("copy into a dead buffer, skipping");
            return;
        }
        self.calls.push(NativeCall::CopyBuffer {
            src: cmd.src.slot,
            dst: cmd.dst.slot,
            size: cmd.size,
        });
    }

    fn debug_marker_begin(&mut self, cmd: &DebugMarkerCmd) {
        self.marker_depth += 1;
        self.calls.push(NativeCall::MarkerBegin(cmd.text().to_string()));
    }

    fn debug_marker_end(&mut self, _cmd: &DebugMarkerEndCmd) {
        self.marker_depth = self.marker_depth.saturating_sub(1);
        self.calls.push(NativeCall::MarkerEnd);
    }

    fn debug_marker_insert(&mut self, cmd: &DebugMarkerCmd) {
        self.calls.push(NativeCall::MarkerInsert(cmd.text().to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> NullContext {
        NullContext::new(&ContextInfo::default())
    }

    #[test]
    fn buffer_contents_round_trip() {
        let mut ctx = ctx();
        let buf = ctx
            .make_buffer(&BufferInfo {
                byte_size: 16,
                initial_data: Some(&[1, 2, 3, 4]),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(ctx.read_buffer(buf, 0, 4).unwrap(), vec![1, 2, 3, 4]);
        ctx.write_buffer(buf, 4, &[9, 9]).unwrap();
        assert_eq!(ctx.read_buffer(buf, 4, 2).unwrap(), vec![9, 9]);
        assert!(ctx.read_buffer(buf, 12, 8).is_err());
    }

    #[test]
    fn generate_mips_is_recorded() {
        let mut ctx = ctx();
        let level0 = vec![0u8; 4 * 4 * 4];
        let tex = ctx
            .make_texture(&TextureInfo {
                dim: [4, 4, 1],
                mip_levels: 3,
                flags: TextureFlags::SHADER_RESOURCE | TextureFlags::GENERATE_MIPMAPS,
                initial_data: Some(&level0),
                ..Default::default()
            })
            .unwrap();
        let (levels, uploaded, generated) = ctx.texture_mip_state(tex).unwrap();
        assert_eq!(levels, 3);
        assert_eq!(uploaded, 1);
        assert!(generated);
    }

    #[test]
    fn copy_buffer_moves_bytes_at_submit_time() {
        let mut ctx = ctx();
        let src = ctx
            .make_buffer(&BufferInfo {
                byte_size: 8,
                initial_data: Some(&[5, 6, 7, 8]),
                ..Default::default()
            })
            .unwrap();
        let dst = ctx
            .make_buffer(&BufferInfo {
                byte_size: 8,
                ..Default::default()
            })
            .unwrap();

        let mut enc = CommandEncoder::new();
        enc.copy_buffer(src, dst, 0, 4, 4);
        // Deferred: nothing moved before submission.
        assert_eq!(ctx.read_buffer(dst, 4, 4).unwrap(), vec![0, 0, 0, 0]);
        ctx.submit(&enc).unwrap();
        assert_eq!(ctx.read_buffer(dst, 4, 4).unwrap(), vec![5, 6, 7, 8]);
    }
}
